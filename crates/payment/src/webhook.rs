//! Inbound provider callbacks.

use model::{Money, PaymentChannel};
use serde::Deserialize;
use thiserror::Error;

use crate::channel::RETAIL_OUTLET_CODES;

/// Header carrying the shared secret on every provider callback.
pub const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

const EWALLET_CAPTURE_EVENT: &str = "ewallet.capture";
const QR_PAYMENT_EVENT: &str = "qr.payment";
const PAYLATER_PAYMENT_EVENT: &str = "paylater.payment";

#[derive(Debug, Error)]
pub enum WebhookPayloadError {
    #[error("malformed callback payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("callback payload does not match any payment channel")]
    Unclassifiable,
    #[error("callback payload matches several payment channels: {0:?}")]
    Ambiguous(Vec<PaymentChannel>),
    #[error("{0} callback carries no reference id")]
    MissingReference(PaymentChannel),
}

/// Union of the fields the provider sends across all callback shapes.
///
/// Virtual account and retail outlet callbacks are flat; e-wallet, QR and
/// paylater callbacks wrap their body in `event` + `data`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderCallback {
    pub payment_id: Option<String>,
    pub callback_virtual_account_id: Option<String>,
    pub external_id: Option<String>,
    pub retail_outlet_name: Option<String>,
    pub amount: Option<f64>,
    pub event: Option<String>,
    pub data: Option<CallbackData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackData {
    pub id: Option<String>,
    pub reference_id: Option<String>,
    pub qr_id: Option<String>,
    pub status: Option<String>,
    pub amount: Option<f64>,
    pub capture_amount: Option<f64>,
}

/// A callback resolved to its channel and the value of that channel's
/// reference field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedCallback {
    pub channel: PaymentChannel,
    pub reference: String,
    /// Amount the provider reports as paid, when the payload carries one.
    pub paid_amount: Option<Money>,
}

impl ProviderCallback {
    fn matches(&self, channel: PaymentChannel) -> bool {
        let event = self.event.as_deref();
        match channel {
            PaymentChannel::VirtualAccount => {
                self.payment_id.is_some() && self.callback_virtual_account_id.is_some()
            }
            PaymentChannel::EWallet => event == Some(EWALLET_CAPTURE_EVENT),
            PaymentChannel::QrCode => event == Some(QR_PAYMENT_EVENT),
            PaymentChannel::Paylater => event == Some(PAYLATER_PAYMENT_EVENT),
            PaymentChannel::RetailOutlet => self
                .retail_outlet_name
                .as_deref()
                .is_some_and(|name| RETAIL_OUTLET_CODES.contains(&name)),
        }
    }

    fn reference(&self, channel: PaymentChannel) -> Option<&str> {
        let data = self.data.as_ref();
        let reference = match channel {
            PaymentChannel::VirtualAccount | PaymentChannel::RetailOutlet => {
                self.external_id.as_deref()
            }
            PaymentChannel::EWallet | PaymentChannel::Paylater => {
                data.and_then(|d| d.reference_id.as_deref())
            }
            PaymentChannel::QrCode => data.and_then(|d| d.qr_id.as_deref()),
        };
        reference.filter(|r| !r.is_empty())
    }

    fn paid_amount(&self) -> Option<Money> {
        let amount = match &self.data {
            Some(data) => data.capture_amount.or(data.amount),
            None => self.amount,
        };
        amount
            .filter(|a| a.is_finite())
            .map(|a| a.round() as Money)
    }
}

/// Parses a raw callback body and resolves it onto exactly one channel.
pub fn classify_callback(payload: &[u8]) -> Result<ClassifiedCallback, WebhookPayloadError> {
    let callback: ProviderCallback = serde_json::from_slice(payload)?;

    let matched: Vec<PaymentChannel> = PaymentChannel::ALL
        .into_iter()
        .filter(|channel| callback.matches(*channel))
        .collect();

    let channel = match matched.as_slice() {
        [channel] => *channel,
        [] => return Err(WebhookPayloadError::Unclassifiable),
        _ => return Err(WebhookPayloadError::Ambiguous(matched)),
    };

    let reference = callback
        .reference(channel)
        .ok_or(WebhookPayloadError::MissingReference(channel))?
        .to_string();

    Ok(ClassifiedCallback {
        channel,
        reference,
        paid_amount: callback.paid_amount(),
    })
}

/// Compares the configured callback token with the one the caller sent.
///
/// Runs in time independent of where the two differ. An unset expected
/// token rejects every callback.
pub fn verify_callback_token(expected: &str, provided: Option<&str>) -> bool {
    let Some(provided) = provided else {
        return false;
    };
    if expected.is_empty() {
        return false;
    }

    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
