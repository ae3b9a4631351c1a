pub mod midtrans_service;
pub mod order_handler;
pub mod payment_handler;
