use model::PaymentChannel;
use thiserror::Error;

use crate::GatewayError;

const VIRTUAL_ACCOUNT_CODES: &[&str] = &[
    "BCA", "BNI", "BRI", "MANDIRI", "PERMATA", "BSI", "CIMB", "BJB",
];
const EWALLET_CODES: &[&str] = &[
    "ID_OVO",
    "ID_DANA",
    "ID_LINKAJA",
    "ID_SHOPEEPAY",
    "ID_ASTRAPAY",
];
const QR_CODES: &[&str] = &["QRIS"];
const PAYLATER_CODES: &[&str] = &["ID_KREDIVO", "ID_AKULAKU", "ID_ATOME", "ID_INDODANA"];
pub(crate) const RETAIL_OUTLET_CODES: &[&str] = &["ALFAMART", "INDOMARET"];

fn members(channel: PaymentChannel) -> &'static [&'static str] {
    match channel {
        PaymentChannel::VirtualAccount => VIRTUAL_ACCOUNT_CODES,
        PaymentChannel::EWallet => EWALLET_CODES,
        PaymentChannel::QrCode => QR_CODES,
        PaymentChannel::Paylater => PAYLATER_CODES,
        PaymentChannel::RetailOutlet => RETAIL_OUTLET_CODES,
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown payment method: {0}")]
    UnknownMethod(String),
    #[error("payment method {code} matches several channels: {channels:?}")]
    AmbiguousMethod {
        code: String,
        channels: Vec<PaymentChannel>,
    },
    #[error("payment provider error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("payment provider response is missing {0}")]
    IncompleteResponse(&'static str),
}

/// Maps a payment method code onto exactly one channel family.
pub fn classify_method(code: &str) -> Result<PaymentChannel, DispatchError> {
    let matched: Vec<PaymentChannel> = PaymentChannel::ALL
        .into_iter()
        .filter(|channel| members(*channel).contains(&code))
        .collect();

    match matched.as_slice() {
        [channel] => Ok(*channel),
        [] => Err(DispatchError::UnknownMethod(code.to_string())),
        _ => Err(DispatchError::AmbiguousMethod {
            code: code.to_string(),
            channels: matched,
        }),
    }
}
