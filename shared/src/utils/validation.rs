use regex::Regex;

// Validate alamat pengiriman (minimal 10 karakter, maksimal 500)
pub fn is_valid_shipping_address(address: &str) -> bool {
    let trimmed = address.trim();
    trimmed.chars().count() >= 10 && trimmed.chars().count() <= 500
}

// Validate nomor resi ekspedisi (huruf besar/angka/strip, 6-40 karakter)
pub fn is_valid_tracking_number(tracking_number: &str) -> bool {
    let tracking_regex = Regex::new(r"^[A-Za-z0-9-]{6,40}$").unwrap();
    tracking_regex.is_match(tracking_number.trim())
}

// Validate jumlah item per baris order
pub fn is_valid_quantity(quantity: i32) -> bool {
    (1..=1000).contains(&quantity)
}

// Sanitize string untuk prevent XSS
pub fn sanitize_html(input: &str) -> String {
    input
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
