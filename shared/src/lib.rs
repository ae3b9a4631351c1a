// Shared library untuk semua services Parfum Store

pub mod models {
    pub mod claims;
}

pub mod utils {
    pub mod jwt;
    pub mod token_extraction;
    pub mod validation;
}
