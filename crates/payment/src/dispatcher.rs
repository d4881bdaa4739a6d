use std::sync::Arc;

use chrono::{DateTime, Utc};
use model::{ContactInfo, Money, PaymentChannel, PaymentReference, ProductSnapshot};
use tracing::{info, instrument};

use crate::channel::{DispatchError, classify_method};
use crate::gateway::*;

const CURRENCY: &str = "IDR";
const ONE_TIME_PAYMENT: &str = "ONE_TIME_PAYMENT";

/// Everything the dispatcher needs to open a payment request for an order.
#[derive(Debug, Clone)]
pub struct PaymentRequest<'a> {
    /// Used as the merchant-side reference on every channel.
    pub track_id: &'a str,
    pub method_code: &'a str,
    pub amount: Money,
    pub contact: &'a ContactInfo,
    pub expires_at: DateTime<Utc>,
    pub items: &'a [ProductSnapshot],
}

/// Routes payment creation to the right provider operation and normalizes
/// its response.
#[derive(Clone)]
pub struct PaymentDispatcher {
    gateway: Arc<dyn PaymentGateway>,
    success_redirect_url: String,
}

impl PaymentDispatcher {
    pub fn new(gateway: Arc<dyn PaymentGateway>, success_redirect_url: impl Into<String>) -> Self {
        Self {
            gateway,
            success_redirect_url: success_redirect_url.into(),
        }
    }

    /// Opens a provider-side payment request.
    ///
    /// # Errors
    /// [`DispatchError::UnknownMethod`]/[`DispatchError::AmbiguousMethod`] if
    /// the code does not map onto exactly one channel, or
    /// [`DispatchError::Gateway`] if any provider call fails.
    #[instrument(skip(self, request), fields(track_id = %request.track_id, method = %request.method_code))]
    pub async fn create_payment(
        &self,
        request: &PaymentRequest<'_>,
    ) -> Result<PaymentReference, DispatchError> {
        let channel = classify_method(request.method_code)?;

        let reference = match channel {
            PaymentChannel::VirtualAccount => self.create_virtual_account(request).await?,
            PaymentChannel::EWallet => self.charge_ewallet(request).await?,
            PaymentChannel::QrCode => self.create_qr_code(request).await?,
            PaymentChannel::Paylater => self.charge_paylater(request).await?,
            PaymentChannel::RetailOutlet => self.create_retail_outlet(request).await?,
        };

        info!(channel = %channel, reference = %reference.reference, "Payment request created");
        Ok(reference)
    }

    /// Cancels an outstanding payment request where the channel supports it.
    ///
    /// Only virtual accounts can be invalidated; other channels expire on
    /// the provider side and this is a no-op for them.
    #[instrument(skip(self, reference), fields(channel = %reference.channel))]
    pub async fn invalidate(&self, reference: &PaymentReference) -> Result<(), DispatchError> {
        match (reference.channel, reference.provider_id.as_deref()) {
            (PaymentChannel::VirtualAccount, Some(provider_id)) => {
                self.gateway.invalidate_virtual_account(provider_id).await?;
                info!(provider_id, "Virtual account invalidated");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn create_virtual_account(
        &self,
        request: &PaymentRequest<'_>,
    ) -> Result<PaymentReference, DispatchError> {
        let response = self
            .gateway
            .create_virtual_account(&VirtualAccountRequest {
                external_id: request.track_id.to_string(),
                bank_code: request.method_code.to_string(),
                name: request.contact.name.clone(),
                expected_amount: request.amount,
                is_closed: true,
                is_single_use: true,
                expiration_date: request.expires_at,
            })
            .await?;

        let mut reference = PaymentReference::new(PaymentChannel::VirtualAccount, response.external_id);
        reference.provider_id = Some(response.id);
        reference.account_number = Some(response.account_number);
        Ok(reference)
    }

    async fn charge_ewallet(
        &self,
        request: &PaymentRequest<'_>,
    ) -> Result<PaymentReference, DispatchError> {
        let mobile_number =
            (request.method_code == "ID_OVO").then(|| request.contact.phone.clone());

        let response = self
            .gateway
            .charge_ewallet(&EWalletChargeRequest {
                reference_id: request.track_id.to_string(),
                currency: CURRENCY.to_string(),
                amount: request.amount,
                checkout_method: ONE_TIME_PAYMENT.to_string(),
                channel_code: request.method_code.to_string(),
                channel_properties: EWalletChannelProperties {
                    mobile_number,
                    success_redirect_url: self.success_redirect_url.clone(),
                },
            })
            .await?;

        let actions = response.actions.unwrap_or_default();
        let mut reference = PaymentReference::new(PaymentChannel::EWallet, response.reference_id);
        reference.provider_id = Some(response.id);
        reference.checkout_url = actions
            .mobile_web_checkout_url
            .or(actions.desktop_web_checkout_url)
            .or(actions.mobile_deeplink_checkout_url);
        Ok(reference)
    }

    async fn create_qr_code(
        &self,
        request: &PaymentRequest<'_>,
    ) -> Result<PaymentReference, DispatchError> {
        let response = self
            .gateway
            .create_qr_code(&QrCodeRequest {
                reference_id: request.track_id.to_string(),
                qr_type: "DYNAMIC".to_string(),
                currency: CURRENCY.to_string(),
                amount: request.amount,
                expires_at: request.expires_at,
            })
            .await?;

        // QR callbacks carry the provider's QR id, not our reference.
        let mut reference = PaymentReference::new(PaymentChannel::QrCode, response.id.clone());
        reference.provider_id = Some(response.id);
        reference.qr_string = Some(response.qr_string);
        Ok(reference)
    }

    /// Customer profile, then plan, then charge. A failure after the first
    /// call leaves the earlier provider objects behind.
    async fn charge_paylater(
        &self,
        request: &PaymentRequest<'_>,
    ) -> Result<PaymentReference, DispatchError> {
        let customer = self
            .gateway
            .create_paylater_customer(&PaylaterCustomerRequest {
                reference_id: format!("{}-customer", request.track_id),
                customer_type: "INDIVIDUAL".to_string(),
                individual_detail: IndividualDetail {
                    given_names: request.contact.name.clone(),
                },
                email: request.contact.email.clone(),
                mobile_number: request.contact.phone.clone(),
            })
            .await?;

        let order_items = request
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| PaylaterOrderItem {
                item_type: "PHYSICAL_PRODUCT".to_string(),
                reference_id: format!("{}-{}", request.track_id, index + 1),
                name: item.name.clone(),
                net_unit_amount: item.unit_price,
                quantity: item.quantity,
                category: item.category.clone().unwrap_or_else(|| "BUNDLE".to_string()),
            })
            .collect();

        let plan = self
            .gateway
            .create_paylater_plan(&PaylaterPlanRequest {
                customer_id: customer.id,
                channel_code: request.method_code.to_string(),
                currency: CURRENCY.to_string(),
                amount: request.amount,
                order_items,
            })
            .await?;

        let charge = self
            .gateway
            .charge_paylater(&PaylaterChargeRequest {
                plan_id: plan.id,
                reference_id: request.track_id.to_string(),
                checkout_method: ONE_TIME_PAYMENT.to_string(),
                success_redirect_url: self.success_redirect_url.clone(),
            })
            .await?;

        let mut reference = PaymentReference::new(PaymentChannel::Paylater, charge.reference_id);
        reference.provider_id = Some(charge.id);
        reference.checkout_url = charge.actions.into_iter().next().map(|action| action.url);
        Ok(reference)
    }

    async fn create_retail_outlet(
        &self,
        request: &PaymentRequest<'_>,
    ) -> Result<PaymentReference, DispatchError> {
        let response = self
            .gateway
            .create_retail_outlet_payment(&RetailOutletRequest {
                external_id: request.track_id.to_string(),
                retail_outlet_name: request.method_code.to_string(),
                name: request.contact.name.clone(),
                expected_amount: request.amount,
                is_single_use: true,
                expiration_date: request.expires_at,
            })
            .await?;

        if response.payment_code.is_empty() {
            return Err(DispatchError::IncompleteResponse("payment_code"));
        }

        let mut reference = PaymentReference::new(PaymentChannel::RetailOutlet, response.external_id);
        reference.provider_id = Some(response.id);
        reference.payment_code = Some(response.payment_code);
        Ok(reference)
    }
}
