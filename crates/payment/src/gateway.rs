//! Payment provider port and its wire types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use model::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The provider did not answer within the configured timeout.
    #[error("payment provider timed out")]
    Timeout,
    #[error("payment provider unreachable: {0}")]
    Transport(String),
    #[error("payment provider rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected payment provider response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualAccountRequest {
    pub external_id: String,
    pub bank_code: String,
    pub name: String,
    pub expected_amount: Money,
    pub is_closed: bool,
    pub is_single_use: bool,
    pub expiration_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualAccountResponse {
    pub id: String,
    pub external_id: String,
    pub account_number: String,
    pub bank_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EWalletChannelProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_number: Option<String>,
    pub success_redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EWalletChargeRequest {
    pub reference_id: String,
    pub currency: String,
    pub amount: Money,
    pub checkout_method: String,
    pub channel_code: String,
    pub channel_properties: EWalletChannelProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EWalletActions {
    pub desktop_web_checkout_url: Option<String>,
    pub mobile_web_checkout_url: Option<String>,
    pub mobile_deeplink_checkout_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EWalletChargeResponse {
    pub id: String,
    pub reference_id: String,
    pub status: String,
    #[serde(default)]
    pub actions: Option<EWalletActions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrCodeRequest {
    pub reference_id: String,
    #[serde(rename = "type")]
    pub qr_type: String,
    pub currency: String,
    pub amount: Money,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrCodeResponse {
    pub id: String,
    pub reference_id: String,
    pub qr_string: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndividualDetail {
    pub given_names: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaylaterCustomerRequest {
    pub reference_id: String,
    #[serde(rename = "type")]
    pub customer_type: String,
    pub individual_detail: IndividualDetail,
    pub email: String,
    pub mobile_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaylaterCustomerResponse {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaylaterOrderItem {
    #[serde(rename = "type")]
    pub item_type: String,
    pub reference_id: String,
    pub name: String,
    pub net_unit_amount: Money,
    pub quantity: i32,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaylaterPlanRequest {
    pub customer_id: String,
    pub channel_code: String,
    pub currency: String,
    pub amount: Money,
    pub order_items: Vec<PaylaterOrderItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaylaterPlanResponse {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaylaterChargeRequest {
    pub plan_id: String,
    pub reference_id: String,
    pub checkout_method: String,
    pub success_redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaylaterAction {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaylaterChargeResponse {
    pub id: String,
    pub reference_id: String,
    #[serde(default)]
    pub actions: Vec<PaylaterAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetailOutletRequest {
    pub external_id: String,
    pub retail_outlet_name: String,
    pub name: String,
    pub expected_amount: Money,
    pub is_single_use: bool,
    pub expiration_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetailOutletResponse {
    pub id: String,
    pub external_id: String,
    pub payment_code: String,
}

/// Operations the payment provider exposes.
///
/// Every call is bounded by the implementation's timeout; a timeout is
/// reported as [`GatewayError::Timeout`] and never retried here.
#[automock]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_virtual_account(
        &self,
        request: &VirtualAccountRequest,
    ) -> Result<VirtualAccountResponse, GatewayError>;

    async fn charge_ewallet(
        &self,
        request: &EWalletChargeRequest,
    ) -> Result<EWalletChargeResponse, GatewayError>;

    async fn create_qr_code(&self, request: &QrCodeRequest)
    -> Result<QrCodeResponse, GatewayError>;

    async fn create_paylater_customer(
        &self,
        request: &PaylaterCustomerRequest,
    ) -> Result<PaylaterCustomerResponse, GatewayError>;

    async fn create_paylater_plan(
        &self,
        request: &PaylaterPlanRequest,
    ) -> Result<PaylaterPlanResponse, GatewayError>;

    async fn charge_paylater(
        &self,
        request: &PaylaterChargeRequest,
    ) -> Result<PaylaterChargeResponse, GatewayError>;

    async fn create_retail_outlet_payment(
        &self,
        request: &RetailOutletRequest,
    ) -> Result<RetailOutletResponse, GatewayError>;

    /// Closes an outstanding virtual account so it can no longer be paid.
    async fn invalidate_virtual_account(&self, provider_id: &str) -> Result<(), GatewayError>;
}
