//! reqwest-backed [`PaymentGateway`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use tracing::{debug, instrument};

use crate::gateway::*;

const QR_API_VERSION: &str = "2022-07-31";

/// Talks to the provider's REST API with HTTP basic auth (secret key as the
/// user name, empty password).
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl HttpPaymentGateway {
    /// Builds a gateway whose every request is bounded by `timeout`.
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .basic_auth(&self.secret_key, Some(""))
    }

    async fn send<Req, Res>(&self, builder: RequestBuilder, body: &Req) -> Result<Res, GatewayError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let response = builder.json(body).send().await.map_err(map_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Res>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

fn map_transport(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(err.to_string())
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(external_id = %request.external_id))]
    async fn create_virtual_account(
        &self,
        request: &VirtualAccountRequest,
    ) -> Result<VirtualAccountResponse, GatewayError> {
        debug!("Creating virtual account");
        self.send(self.request(Method::POST, "/callback_virtual_accounts"), request)
            .await
    }

    #[instrument(skip(self, request), fields(reference_id = %request.reference_id))]
    async fn charge_ewallet(
        &self,
        request: &EWalletChargeRequest,
    ) -> Result<EWalletChargeResponse, GatewayError> {
        debug!("Creating e-wallet charge");
        self.send(self.request(Method::POST, "/ewallets/charges"), request)
            .await
    }

    #[instrument(skip(self, request), fields(reference_id = %request.reference_id))]
    async fn create_qr_code(
        &self,
        request: &QrCodeRequest,
    ) -> Result<QrCodeResponse, GatewayError> {
        debug!("Creating QR code");
        let builder = self
            .request(Method::POST, "/qr_codes")
            .header("api-version", QR_API_VERSION);
        self.send(builder, request).await
    }

    #[instrument(skip(self, request), fields(reference_id = %request.reference_id))]
    async fn create_paylater_customer(
        &self,
        request: &PaylaterCustomerRequest,
    ) -> Result<PaylaterCustomerResponse, GatewayError> {
        self.send(self.request(Method::POST, "/customers"), request)
            .await
    }

    #[instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    async fn create_paylater_plan(
        &self,
        request: &PaylaterPlanRequest,
    ) -> Result<PaylaterPlanResponse, GatewayError> {
        self.send(self.request(Method::POST, "/paylater/plans"), request)
            .await
    }

    #[instrument(skip(self, request), fields(reference_id = %request.reference_id))]
    async fn charge_paylater(
        &self,
        request: &PaylaterChargeRequest,
    ) -> Result<PaylaterChargeResponse, GatewayError> {
        self.send(self.request(Method::POST, "/paylater/charges"), request)
            .await
    }

    #[instrument(skip(self, request), fields(external_id = %request.external_id))]
    async fn create_retail_outlet_payment(
        &self,
        request: &RetailOutletRequest,
    ) -> Result<RetailOutletResponse, GatewayError> {
        self.send(self.request(Method::POST, "/fixed_payment_code"), request)
            .await
    }

    #[instrument(skip(self))]
    async fn invalidate_virtual_account(&self, provider_id: &str) -> Result<(), GatewayError> {
        let path = format!("/callback_virtual_accounts/{provider_id}");
        let body = json!({ "expiration_date": Utc::now() });
        let _: serde_json::Value = self.send(self.request(Method::PATCH, &path), &body).await?;
        Ok(())
    }
}
