//! In-app product catalog.
//!
//! The catalog is owned by an external collaborator; storeprep only reads it.
//! A run without a catalog source simply cannot export prices.

pub mod currency;
pub mod exporter;

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreprepError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    #[default]
    Consumable,
    NonConsumable,
    Subscription,
}

impl ProductKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProductKind::Consumable => "consumable",
            ProductKind::NonConsumable => "non_consumable",
            ProductKind::Subscription => "subscription",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub category_id: String,
    pub kind: ProductKind,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Price in the base currency as authored, e.g. `"$0.99"`.
    pub base_price: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCatalog {
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub products: Vec<Product>,
}

/// Read-only view over a product catalog.
pub trait CatalogSource: Send + Sync {
    fn categories(&self) -> &[Category];
    fn products(&self) -> &[Product];
}

impl CatalogSource for ProductCatalog {
    fn categories(&self) -> &[Category] {
        &self.categories
    }

    fn products(&self) -> &[Product] {
        &self.products
    }
}

/// Catalog loaded from a JSON document.
#[derive(Debug, Clone)]
pub struct JsonCatalogSource {
    catalog: ProductCatalog,
}

impl JsonCatalogSource {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| StoreprepError::io(path, e))?;
        Ok(Self {
            catalog: serde_json::from_str(&raw)?,
        })
    }
}

impl CatalogSource for JsonCatalogSource {
    fn categories(&self) -> &[Category] {
        &self.catalog.categories
    }

    fn products(&self) -> &[Product] {
        &self.catalog.products
    }
}

/// Operator's choice of product group: a zero-based position or a category id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategorySelector {
    Index(usize),
    Id(String),
}

impl CategorySelector {
    pub fn resolve<'a>(&self, categories: &'a [Category]) -> Result<&'a Category> {
        let found = match self {
            CategorySelector::Index(i) => categories.get(*i),
            CategorySelector::Id(id) => categories.iter().find(|c| &c.id == id),
        };
        found.ok_or_else(|| {
            StoreprepError::MissingInput(format!(
                "category {} not found among {} categories",
                self,
                categories.len()
            ))
        })
    }
}

impl fmt::Display for CategorySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategorySelector::Index(i) => write!(f, "#{i}"),
            CategorySelector::Id(id) => write!(f, "'{id}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories() -> Vec<Category> {
        vec![
            Category { id: "coins".to_string() },
            Category { id: "gems".to_string() },
        ]
    }

    #[test]
    fn test_selector_by_index_and_id() {
        let cats = categories();
        assert_eq!(CategorySelector::Index(1).resolve(&cats).unwrap().id, "gems");
        assert_eq!(
            CategorySelector::Id("coins".to_string()).resolve(&cats).unwrap().id,
            "coins"
        );
    }

    #[test]
    fn test_selector_out_of_range() {
        let err = CategorySelector::Index(5).resolve(&categories()).unwrap_err();
        assert!(matches!(err, StoreprepError::MissingInput(_)));
        assert!(err.to_string().contains("#5"));
    }

    #[test]
    fn test_selector_serde_untagged() {
        let idx: CategorySelector = serde_json::from_str("2").unwrap();
        assert_eq!(idx, CategorySelector::Index(2));
        let id: CategorySelector = serde_json::from_str("\"gems\"").unwrap();
        assert_eq!(id, CategorySelector::Id("gems".to_string()));
    }

    #[test]
    fn test_json_catalog_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{
              "categories": [{ "id": "coins" }],
              "products": [{ "id": "coins_100", "category_id": "coins", "kind": "consumable",
                             "title": "100 Coins", "base_price": "$0.99" }]
            }"#,
        )
        .unwrap();

        let source = JsonCatalogSource::load(&path).unwrap();
        assert_eq!(source.categories().len(), 1);
        assert_eq!(source.products()[0].kind, ProductKind::Consumable);
        assert_eq!(source.products()[0].description, "");
    }
}
