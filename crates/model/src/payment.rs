use std::fmt;

use serde::{Deserialize, Serialize};

/// The five mutually exclusive payment channel families.
///
/// Checkout dispatch and webhook matching both switch on this enum.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentChannel {
    VirtualAccount,
    EWallet,
    QrCode,
    Paylater,
    RetailOutlet,
}

impl PaymentChannel {
    pub const ALL: [PaymentChannel; 5] = [
        Self::VirtualAccount,
        Self::EWallet,
        Self::QrCode,
        Self::Paylater,
        Self::RetailOutlet,
    ];

    /// Name of the sparse per-channel reference field that identifies an
    /// order's payment request for this channel.
    pub fn reference_field(self) -> &'static str {
        match self {
            Self::VirtualAccount => "external_id",
            Self::EWallet => "reference_id",
            Self::QrCode => "qr_reference_id",
            Self::Paylater => "paylater_reference_id",
            Self::RetailOutlet => "retail_outlet_reference_id",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::VirtualAccount => "VIRTUAL_ACCOUNT",
            Self::EWallet => "E_WALLET",
            Self::QrCode => "QR_CODE",
            Self::Paylater => "PAYLATER",
            Self::RetailOutlet => "RETAIL_OUTLET",
        }
    }
}

impl fmt::Display for PaymentChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-issued identifiers for one order's payment request.
///
/// `reference` holds the value of the channel's reference field (see
/// [`PaymentChannel::reference_field`]); the other four reference fields are
/// implicitly null. The remaining fields are channel-specific checkout data
/// and stay `None` where they do not apply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentReference {
    pub channel: PaymentChannel,
    pub reference: String,
    /// Provider's own id for the request, needed to invalidate it later.
    pub provider_id: Option<String>,
    /// Virtual account number.
    pub account_number: Option<String>,
    /// E-wallet or paylater hosted checkout.
    pub checkout_url: Option<String>,
    pub qr_string: Option<String>,
    /// Retail outlet payment code.
    pub payment_code: Option<String>,
}

impl PaymentReference {
    pub fn new(channel: PaymentChannel, reference: impl Into<String>) -> Self {
        Self {
            channel,
            reference: reference.into(),
            provider_id: None,
            account_number: None,
            checkout_url: None,
            qr_string: None,
            payment_code: None,
        }
    }

    /// Value of the given channel's reference field, `None` for the four
    /// fields that do not apply.
    pub fn reference_for(&self, channel: PaymentChannel) -> Option<&str> {
        (self.channel == channel).then_some(self.reference.as_str())
    }
}
