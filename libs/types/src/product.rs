//! Tradable product records as listed by the product registry

use crate::ids::ProductId;
use serde::{Deserialize, Serialize};

/// A product the exchange matches orders for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    #[serde(default)]
    pub base_currency: String,
    #[serde(default)]
    pub quote_currency: String,
}

impl Product {
    pub fn new(id: ProductId) -> Self {
        let (base, quote) = match id.as_str().split_once('-') {
            Some((base, quote)) => (base.to_string(), quote.to_string()),
            None => (id.as_str().to_string(), String::new()),
        };
        Self {
            id,
            base_currency: base,
            quote_currency: quote,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_currencies_from_id() {
        let product = Product::new(ProductId::new("BTC-USDT"));
        assert_eq!(product.base_currency, "BTC");
        assert_eq!(product.quote_currency, "USDT");
    }

    #[test]
    fn test_product_deserialize_id_only() {
        let product: Product = serde_json::from_str(r#"{"id":"ETH-USDC"}"#).unwrap();
        assert_eq!(product.id.as_str(), "ETH-USDC");
        assert!(product.base_currency.is_empty());
    }
}
