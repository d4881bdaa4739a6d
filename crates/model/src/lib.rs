//! Domain model shared by every crate of the order backend.
//!
//! Types here are plain data: catalog entities as read from the catalog
//! collaborator, cart lines submitted by the client, vouchers, orders with
//! their product snapshots, and the payment reference that ties an order to
//! a provider-side payment request.

mod cart;
mod catalog;
mod order;
mod payment;
mod voucher;

pub use cart::{CartLine, ContactInfo, CreateOrderRequest};
pub use catalog::{BundleMember, CatalogBundle, CatalogProduct, Customer, ProductVariant};
pub use order::{
    AdvanceOrderRequest, DeviceIdUpdate, NewOrder, NewOrderProduct, Order, OrderAmounts,
    OrderDetails, OrderFilter, OrderKey, OrderProduct, OrderStatus, ProductSnapshot,
    UnknownOrderStatus,
};
pub use payment::{PaymentChannel, PaymentReference};
pub use voucher::{Voucher, VoucherStatus, VoucherType};

/// Amounts are whole currency units; there is no fractional part.
pub type Money = i64;
