pub mod order_service;
pub mod reconciliation;
pub mod stock_ledger;

#[cfg(test)]
pub mod test_support;
