use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};

use crate::errors::{ServiceError, ServiceResult};

/// Hosted checkout session created for web clients; the client is
/// redirected to the provider using this id.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub id: String,
}

/// Payment intent created for mobile clients; the client confirms it
/// in-app with the secret.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

/// Provider-side state of a payment, reduced to what the order flow
/// cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentState {
    Succeeded,
    Processing,
    Failed,
}

/// Card payment gateway boundary. Orders are created before any call
/// here, so a provider failure always leaves a pending, payable order.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_session(
        &self,
        amount_minor: i64,
        currency: &str,
        order_id: i64,
        user_id: i64,
    ) -> ServiceResult<PaymentSession>;

    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        description: &str,
        receipt_email: Option<&str>,
    ) -> ServiceResult<PaymentIntent>;

    async fn session_status(&self, session_id: &str) -> ServiceResult<PaymentState>;

    async fn intent_status(&self, intent_id: &str) -> ServiceResult<PaymentState>;
}

const STRIPE_API: &str = "https://api.stripe.com/v1";

/// Stripe over its form-encoded HTTP API.
pub struct StripeProvider {
    client: reqwest::Client,
    secret_key: String,
    website_base_url: String,
}

#[derive(Deserialize)]
struct StripeIntentResponse {
    id: String,
    client_secret: Option<String>,
    status: String,
}

#[derive(Deserialize)]
struct StripeSessionResponse {
    id: String,
    payment_status: Option<String>,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeProvider {
    pub fn new(secret_key: String, website_base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key,
            website_base_url,
        }
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> ServiceResult<T> {
        let response = self
            .client
            .post(format!("{}/{}", STRIPE_API, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;
        if !response.status().is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| "payment gateway rejected the request".to_string());
            error!(%message, "stripe call failed");
            return Err(ServiceError::PaymentInitiationFailed(message));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> ServiceResult<T> {
        let response = self
            .client
            .get(format!("{}/{}", STRIPE_API, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "stripe returned {}",
                response.status()
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_session(
        &self,
        amount_minor: i64,
        currency: &str,
        order_id: i64,
        user_id: i64,
    ) -> ServiceResult<PaymentSession> {
        let form = vec![
            (
                "success_url".to_string(),
                format!(
                    "{}/order-success?session_id={{CHECKOUT_SESSION_ID}}",
                    self.website_base_url
                ),
            ),
            (
                "cancel_url".to_string(),
                format!(
                    "{}/order-failed?session_id={{CHECKOUT_SESSION_ID}}",
                    self.website_base_url
                ),
            ),
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                currency.to_lowercase(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                amount_minor.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                format!("Order #{}", order_id),
            ),
            ("metadata[order_id]".to_string(), order_id.to_string()),
            ("metadata[user_id]".to_string(), user_id.to_string()),
        ];
        let session: StripeSessionResponse = self.post_form("checkout/sessions", &form).await?;
        info!(order_id, session_id = %session.id, "created checkout session");
        Ok(PaymentSession { id: session.id })
    }

    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        description: &str,
        receipt_email: Option<&str>,
    ) -> ServiceResult<PaymentIntent> {
        let mut form = vec![
            ("amount".to_string(), amount_minor.to_string()),
            ("currency".to_string(), currency.to_lowercase()),
            ("description".to_string(), description.to_string()),
            (
                "confirmation_method".to_string(),
                "automatic".to_string(),
            ),
        ];
        if let Some(email) = receipt_email {
            form.push(("receipt_email".to_string(), email.to_string()));
        }
        let intent: StripeIntentResponse = self.post_form("payment_intents", &form).await?;
        let client_secret = intent.client_secret.ok_or_else(|| {
            ServiceError::PaymentInitiationFailed("payment intent has no client secret".into())
        })?;
        Ok(PaymentIntent {
            id: intent.id,
            client_secret,
        })
    }

    async fn session_status(&self, session_id: &str) -> ServiceResult<PaymentState> {
        let session: StripeSessionResponse = self
            .get(&format!("checkout/sessions/{}", session_id))
            .await?;
        Ok(match session.payment_status.as_deref() {
            Some("paid") | Some("no_payment_required") => PaymentState::Succeeded,
            _ => PaymentState::Processing,
        })
    }

    async fn intent_status(&self, intent_id: &str) -> ServiceResult<PaymentState> {
        let intent: StripeIntentResponse =
            self.get(&format!("payment_intents/{}", intent_id)).await?;
        Ok(match intent.status.as_str() {
            "succeeded" => PaymentState::Succeeded,
            "canceled" => PaymentState::Failed,
            _ => PaymentState::Processing,
        })
    }
}

/// Installed when no gateway is configured. Cash-on-delivery keeps
/// working; card checkouts fail with a clear message.
pub struct DisabledPaymentProvider;

#[async_trait]
impl PaymentProvider for DisabledPaymentProvider {
    async fn create_session(
        &self,
        _amount_minor: i64,
        _currency: &str,
        _order_id: i64,
        _user_id: i64,
    ) -> ServiceResult<PaymentSession> {
        Err(ServiceError::PaymentInitiationFailed(
            "card payments are not configured".into(),
        ))
    }

    async fn create_intent(
        &self,
        _amount_minor: i64,
        _currency: &str,
        _description: &str,
        _receipt_email: Option<&str>,
    ) -> ServiceResult<PaymentIntent> {
        Err(ServiceError::PaymentInitiationFailed(
            "card payments are not configured".into(),
        ))
    }

    async fn session_status(&self, _session_id: &str) -> ServiceResult<PaymentState> {
        Err(ServiceError::ExternalServiceError(
            "card payments are not configured".into(),
        ))
    }

    async fn intent_status(&self, _intent_id: &str) -> ServiceResult<PaymentState> {
        Err(ServiceError::ExternalServiceError(
            "card payments are not configured".into(),
        ))
    }
}
