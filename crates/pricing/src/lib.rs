//! Server-side cart pricing.
//!
//! Turns submitted cart lines plus resolved catalog data into priced
//! snapshot lines and a subtotal. Everything here is deterministic and free of
//! I/O so the same computation can run at checkout and for re-verification.

use std::collections::HashMap;

use model::{CartLine, CatalogBundle, CatalogProduct, Money, OrderAmounts, ProductSnapshot};
use thiserror::Error;

mod voucher;

pub use voucher::{VoucherRejection, evaluate_voucher};

/// Reasons a cart cannot be priced. Any of them fails the whole cart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("cart has no lines")]
    EmptyCart,
    #[error("line {line}: quantity must be at least 1, got {quantity}")]
    InvalidQuantity { line: usize, quantity: i32 },
    #[error("product {0} does not exist")]
    ProductNotFound(i64),
    #[error("product {0} is not active")]
    ProductInactive(i64),
    #[error("bundle {0} does not exist")]
    BundleNotFound(i64),
    #[error("bundle {0} is not active")]
    BundleInactive(i64),
    #[error("product {0} requires a variant selection")]
    MissingVariant(i64),
    #[error("variant {variant_id} does not belong to product {product_id}")]
    VariantNotFound { product_id: i64, variant_id: i64 },
    #[error("{0} has no valid price")]
    InvalidPrice(String),
    #[error("variant {variant_id}: requested {requested}, only {available} in stock")]
    InsufficientStock {
        variant_id: i64,
        requested: i32,
        available: i32,
    },
    #[error("amount overflow")]
    Overflow,
}

/// Cart priced against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedCart {
    /// One snapshot per cart line, in submission order.
    pub lines: Vec<ProductSnapshot>,
    pub subtotal: Money,
}

impl PricedCart {
    /// Distinct product ids of simple-product lines.
    pub fn product_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.lines.iter().filter_map(|line| line.product_id)
    }
}

/// Prices every line of `lines` and sums them.
///
/// `products` and `bundles` must contain every catalog entity the cart
/// references; a missing or inactive entity rejects the cart.
pub fn price_cart(
    lines: &[CartLine],
    products: &[CatalogProduct],
    bundles: &[CatalogBundle],
) -> Result<PricedCart, PricingError> {
    if lines.is_empty() {
        return Err(PricingError::EmptyCart);
    }

    let products: HashMap<i64, &CatalogProduct> = products.iter().map(|p| (p.id, p)).collect();
    let bundles: HashMap<i64, &CatalogBundle> = bundles.iter().map(|b| (b.id, b)).collect();

    let mut priced = Vec::with_capacity(lines.len());
    let mut subtotal: Money = 0;

    for (index, line) in lines.iter().enumerate() {
        let quantity = line.quantity();
        if quantity < 1 {
            return Err(PricingError::InvalidQuantity {
                line: index,
                quantity,
            });
        }

        let snapshot = match line {
            CartLine::Product {
                product_id,
                variant_id,
                ..
            } => {
                let product = products
                    .get(product_id)
                    .ok_or(PricingError::ProductNotFound(*product_id))?;
                price_product(product, *variant_id, line)?
            }
            CartLine::Bundle { bundle_id, .. } => {
                let bundle = bundles
                    .get(bundle_id)
                    .ok_or(PricingError::BundleNotFound(*bundle_id))?;
                price_bundle(bundle, line)?
            }
        };

        subtotal = subtotal
            .checked_add(snapshot.line_total)
            .ok_or(PricingError::Overflow)?;
        priced.push(snapshot);
    }

    Ok(PricedCart {
        lines: priced,
        subtotal,
    })
}

/// `subtotal - discount + delivery_fee`.
pub fn order_amounts(
    subtotal: Money,
    voucher_discount: Money,
    delivery_fee: Money,
) -> Result<OrderAmounts, PricingError> {
    let total = subtotal
        .checked_sub(voucher_discount)
        .and_then(|t| t.checked_add(delivery_fee))
        .ok_or(PricingError::Overflow)?;

    Ok(OrderAmounts {
        subtotal,
        voucher_discount,
        delivery_fee,
        total,
    })
}

fn price_product(
    product: &CatalogProduct,
    variant_id: Option<i64>,
    line: &CartLine,
) -> Result<ProductSnapshot, PricingError> {
    if !product.is_active {
        return Err(PricingError::ProductInactive(product.id));
    }

    let variant_id = variant_id.ok_or(PricingError::MissingVariant(product.id))?;
    let variant = product
        .variant(variant_id)
        .ok_or(PricingError::VariantNotFound {
            product_id: product.id,
            variant_id,
        })?;

    let unit_price = effective_price(variant.sale_price, variant.regular_price)
        .ok_or_else(|| PricingError::InvalidPrice(format!("variant {variant_id}")))?;

    let quantity = line.quantity();
    if let Some(available) = variant.stock {
        if quantity > available {
            return Err(PricingError::InsufficientStock {
                variant_id,
                requested: quantity,
                available,
            });
        }
    }

    Ok(ProductSnapshot {
        product_id: Some(product.id),
        bundle_id: None,
        variant_id: Some(variant.id),
        name: product.name.clone(),
        category: Some(product.category.clone()),
        variant_name: Some(variant.name.clone()),
        bundle_members: Vec::new(),
        unit_price,
        quantity,
        line_total: line_total(unit_price, quantity)?,
        image_urls: product.image_urls.clone(),
        device_id: line.device_id().map(str::to_string),
    })
}

fn price_bundle(bundle: &CatalogBundle, line: &CartLine) -> Result<ProductSnapshot, PricingError> {
    if !bundle.is_active {
        return Err(PricingError::BundleInactive(bundle.id));
    }

    let unit_price = effective_price(bundle.sale_price, bundle.price)
        .ok_or_else(|| PricingError::InvalidPrice(format!("bundle {}", bundle.id)))?;
    let quantity = line.quantity();

    Ok(ProductSnapshot {
        product_id: None,
        bundle_id: Some(bundle.id),
        variant_id: None,
        name: bundle.name.clone(),
        category: None,
        variant_name: None,
        bundle_members: bundle.members.iter().map(|m| m.name.clone()).collect(),
        unit_price,
        quantity,
        line_total: line_total(unit_price, quantity)?,
        image_urls: bundle.image_urls.clone(),
        device_id: line.device_id().map(str::to_string),
    })
}

/// Sale price when set, regular price otherwise. Non-positive prices are
/// treated as missing.
fn effective_price(sale: Option<Money>, regular: Option<Money>) -> Option<Money> {
    sale.or(regular).filter(|price| *price > 0)
}

fn line_total(unit_price: Money, quantity: i32) -> Result<Money, PricingError> {
    unit_price
        .checked_mul(Money::from(quantity))
        .ok_or(PricingError::Overflow)
}
