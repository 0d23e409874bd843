//! Product registry
//!
//! The supervisor asks the registry for the full product list on every poll
//! and starts whatever it has not seen yet. Products are never removed.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use types::ids::ProductId;
use types::product::Product;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("cannot read product list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid product list {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of tradable products
#[async_trait]
pub trait ProductRegistry: Send + Sync {
    async fn list_products(&self) -> Result<Vec<Product>, RegistryError>;
}

/// Fixed product list
pub struct StaticRegistry {
    products: Vec<Product>,
}

impl StaticRegistry {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    pub fn from_ids(ids: impl IntoIterator<Item = ProductId>) -> Self {
        Self::new(ids.into_iter().map(Product::new).collect())
    }
}

#[async_trait]
impl ProductRegistry for StaticRegistry {
    async fn list_products(&self) -> Result<Vec<Product>, RegistryError> {
        Ok(self.products.clone())
    }
}

/// JSON array of products, re-read on every call
///
/// ```json
/// [{"id": "BTC-USDT", "base_currency": "BTC", "quote_currency": "USDT"}]
/// ```
pub struct FileRegistry {
    path: PathBuf,
}

impl FileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ProductRegistry for FileRegistry {
    async fn list_products(&self) -> Result<Vec<Product>, RegistryError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| RegistryError::Io {
                path: self.path.clone(),
                source,
            })?;
        serde_json::from_str(&raw).map_err(|source| RegistryError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}
