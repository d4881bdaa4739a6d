//! Business logic layer for order management.
//!
//! This crate defines the [`OrderService`] and [`PaymentWebhookService`]
//! traits and their implementation [`OrderServiceImpl`], which coordinates
//! pricing, voucher evaluation, payment dispatch and transactional
//! persistence of orders.
//!
//! # Features
//! - Server-side recomputation of every money field, with client-submitted
//!   amounts rejected on any mismatch before a payment request is opened.
//! - Atomic persistence of an order, its product snapshot, its payment
//!   reference and the voucher quota it consumes.
//! - Lazy expiry: every read of an order that is waiting for payment past its
//!   deadline cancels it and gives its voucher quota back.
//! - Idempotent reconciliation of provider payment callbacks.
//! - Well-typed error handling via [`ServiceError`].

use payment::{DispatchError, WebhookPayloadError};
use pricing::{PricingError, VoucherRejection};
use repository::RepositoryError;
use thiserror::Error;

mod clock;
mod expiry;
mod orders;
mod webhook;

pub use clock::{Clock, ManualClock, SystemClock};
pub use orders::{OrderService, OrderServiceImpl, OrderSettings};
pub use webhook::{PaymentWebhookService, ReconciliationOutcome};

/// The main error type for all operations in [`OrderService`] and
/// [`PaymentWebhookService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request is structurally or semantically invalid.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),
    /// The cart could not be priced against the catalog.
    #[error("Pricing failed: {0}")]
    Pricing(#[from] PricingError),
    #[error("Voucher rejected: {0}")]
    Voucher(#[from] VoucherRejection),
    /// A client-submitted amount differs from the server computation.
    #[error("Submitted {field} {submitted} does not match computed {computed}")]
    AmountMismatch {
        field: &'static str,
        submitted: i64,
        computed: i64,
    },
    #[error("Invalid payment callback: {0}")]
    InvalidCallback(#[from] WebhookPayloadError),
    #[error("{0} not found")]
    NotFound(String),
    /// The operation conflicts with the current state of the order or voucher.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The payment method is unknown or the provider call failed.
    #[error("Payment error: {0}")]
    Payment(#[from] DispatchError),
    #[error("Invalid callback token")]
    Unauthorized,
    /// A repository (database) operation failed.
    #[error("Database error: {0}")]
    Db(#[from] RepositoryError),
}

/// Coarse classification of [`ServiceError`] for transport adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    ExternalGateway,
    Unauthorized,
    Internal,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidOrder(_)
            | Self::Pricing(_)
            | Self::AmountMismatch { .. }
            | Self::InvalidCallback(_) => ErrorKind::Validation,
            Self::Voucher(rejection) if rejection.is_conflict() => ErrorKind::Conflict,
            Self::Voucher(_) => ErrorKind::Validation,
            Self::NotFound(_) | Self::Db(RepositoryError::NotFound) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Payment(DispatchError::UnknownMethod(_) | DispatchError::AmbiguousMethod { .. }) => {
                ErrorKind::Validation
            }
            Self::Payment(_) => ErrorKind::ExternalGateway,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Db(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use payment::GatewayError;

    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ServiceError::Pricing(PricingError::EmptyCart).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ServiceError::Voucher(VoucherRejection::QuotaExhausted).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            ServiceError::Voucher(VoucherRejection::Ended).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ServiceError::Payment(DispatchError::UnknownMethod("CASH".into())).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ServiceError::Payment(DispatchError::Gateway(GatewayError::Timeout)).kind(),
            ErrorKind::ExternalGateway
        );
        assert_eq!(ServiceError::Unauthorized.kind(), ErrorKind::Unauthorized);
        assert_eq!(
            ServiceError::Db(RepositoryError::TransactionClosed).kind(),
            ErrorKind::Internal
        );
    }
}
