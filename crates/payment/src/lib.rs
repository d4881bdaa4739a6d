//! Payment Channel Dispatcher.
//!
//! Classifies payment method codes into channel families, talks to the
//! payment provider through the [`PaymentGateway`] port, normalizes the five
//! response shapes into a [`model::PaymentReference`], and classifies inbound
//! provider callbacks back onto the same [`model::PaymentChannel`] enum.

mod channel;
mod dispatcher;
mod gateway;
mod http;
mod webhook;

pub use channel::{DispatchError, classify_method};
pub use dispatcher::{PaymentDispatcher, PaymentRequest};
pub use gateway::*;
pub use http::HttpPaymentGateway;
pub use webhook::{
    CALLBACK_TOKEN_HEADER, ClassifiedCallback, ProviderCallback, WebhookPayloadError,
    classify_callback, verify_callback_token,
};
