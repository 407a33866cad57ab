use std::collections::HashMap;
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct PriceEntry {
    pub timestamp: i64,
    pub price: Decimal,
}

#[derive(Deserialize, Debug)]
pub struct PriceResponse {
    pub success: bool,
    #[serde(default)]
    pub data: HashMap<String, Vec<PriceEntry>>,
}
