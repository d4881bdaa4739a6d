use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Money;

/// A purchasable variant of a simple product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductVariant {
    pub id: i64,
    pub name: String,
    pub regular_price: Option<Money>,
    pub sale_price: Option<Money>,
    /// Units on hand at read time; `None` means stock is not tracked.
    pub stock: Option<i32>,
}

/// Simple product as returned by the catalog lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogProduct {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub image_urls: Vec<String>,
    pub is_active: bool,
    pub variants: Vec<ProductVariant>,
}

impl CatalogProduct {
    pub fn variant(&self, variant_id: i64) -> Option<&ProductVariant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundleMember {
    pub product_id: i64,
    pub name: String,
}

/// Bundle of products sold at one aggregate price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogBundle {
    pub id: i64,
    pub name: String,
    pub price: Option<Money>,
    pub sale_price: Option<Money>,
    pub image_urls: Vec<String>,
    pub is_active: bool,
    pub members: Vec<BundleMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Customer {
    pub id: i64,
    pub uuid: Uuid,
}
