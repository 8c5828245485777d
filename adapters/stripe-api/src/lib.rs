//! stripe-api — `PaymentProvider` adapter over Stripe's REST API.
//!
//! Purpose
//! - Create checkout sessions, customers, ephemeral keys and payment intents
//!   with form-encoded `POST`s authenticated by the secret key.
//! - Map Stripe error bodies to `StripeError`, then to `CoreError::Provider`
//!   at the port boundary.
//!
//! Configuration (see `StripeConfig::from_env`)
//! - `STRIPE_SECRET_KEY` (required)
//! - `STRIPE_API_BASE` (default `https://api.stripe.com`)
//! - `STRIPE_EPHEMERAL_KEY_API_VERSION` (default `2020-08-27`)
//!
//! Notes
//! - One request per call, no retries and no idempotency keys. Timeouts are
//!   the `reqwest` defaults.

pub mod form;

use domain::{
    CheckoutSession, CoreError, Customer, EphemeralKey, NewCheckoutSession, NewCustomer,
    NewPaymentIntent, PaymentIntent, PaymentProvider, ProviderStep,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";
/// API version pinned by the mobile payment sheet for ephemeral keys.
pub const DEFAULT_EPHEMERAL_KEY_VERSION: &str = "2020-08-27";

#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    #[error("missing configuration: {0}")]
    Config(&'static str),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("stripe api error ({status}, {kind}): {message}")]
    Api {
        status: u16,
        kind: String,
        code: Option<String>,
        message: String,
    },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl StripeError {
    /// Wrap as a domain provider error for `step`.
    pub fn into_core(self, step: ProviderStep) -> CoreError {
        CoreError::provider(step, self.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeConfig {
    pub secret_key: String,
    pub api_base: String,
    pub ephemeral_key_version: String,
}

impl StripeConfig {
    pub fn new<S: Into<String>>(secret_key: S) -> Self {
        Self {
            secret_key: secret_key.into(),
            api_base: DEFAULT_API_BASE.into(),
            ephemeral_key_version: DEFAULT_EPHEMERAL_KEY_VERSION.into(),
        }
    }

    pub fn from_env() -> Result<Self, StripeError> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(StripeError::Config("STRIPE_SECRET_KEY"))?;
        let mut cfg = Self::new(secret_key);
        if let Ok(base) = std::env::var("STRIPE_API_BASE") {
            if !base.is_empty() {
                cfg.api_base = base;
            }
        }
        if let Ok(ver) = std::env::var("STRIPE_EPHEMERAL_KEY_API_VERSION") {
            if !ver.is_empty() {
                cfg.ephemeral_key_version = ver;
            }
        }
        Ok(cfg)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionObject {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CustomerObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct EphemeralKeyObject {
    id: String,
    secret: String,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentObject {
    id: String,
    client_secret: Option<String>,
}

/// Thin Stripe REST client. Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> Result<Self, StripeError> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &form::Params,
        stripe_version: Option<&str>,
    ) -> Result<T, StripeError> {
        let url = format!("{}{}", self.config.api_base.trim_end_matches('/'), path);
        let mut req = self
            .http
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .form(params);
        if let Some(ver) = stripe_version {
            req = req.header("Stripe-Version", ver);
        }
        debug!(path, "stripe request");
        let resp = req.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &bytes));
        }
        serde_json::from_slice(&bytes).map_err(|e| StripeError::Decode(e.to_string()))
    }

    pub async fn create_checkout_session(
        &self,
        session: &NewCheckoutSession,
    ) -> Result<CheckoutSession, StripeError> {
        let obj: SessionObject = self
            .post(
                "/v1/checkout/sessions",
                &form::checkout_session_params(session),
                None,
            )
            .await?;
        let url = obj
            .url
            .ok_or_else(|| StripeError::Decode("checkout session has no url".into()))?;
        info!(session_id = %obj.id, "stripe checkout session created");
        Ok(CheckoutSession { id: obj.id, url })
    }

    pub async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, StripeError> {
        let obj: CustomerObject = self
            .post("/v1/customers", &form::customer_params(customer), None)
            .await?;
        info!(customer_id = %obj.id, "stripe customer created");
        Ok(Customer { id: obj.id })
    }

    pub async fn create_ephemeral_key(
        &self,
        customer_id: &str,
    ) -> Result<EphemeralKey, StripeError> {
        let obj: EphemeralKeyObject = self
            .post(
                "/v1/ephemeral_keys",
                &form::ephemeral_key_params(customer_id),
                Some(&self.config.ephemeral_key_version),
            )
            .await?;
        Ok(EphemeralKey {
            id: obj.id,
            secret: obj.secret,
        })
    }

    pub async fn create_payment_intent(
        &self,
        intent: &NewPaymentIntent,
    ) -> Result<PaymentIntent, StripeError> {
        let obj: PaymentIntentObject = self
            .post(
                "/v1/payment_intents",
                &form::payment_intent_params(intent),
                None,
            )
            .await?;
        let client_secret = obj
            .client_secret
            .ok_or_else(|| StripeError::Decode("payment intent has no client_secret".into()))?;
        info!(payment_intent_id = %obj.id, "stripe payment intent created");
        Ok(PaymentIntent {
            id: obj.id,
            client_secret,
        })
    }
}

fn api_error(status: u16, body: &[u8]) -> StripeError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(b) => StripeError::Api {
            status,
            kind: b.error.kind,
            code: b.error.code,
            message: b
                .error
                .message
                .unwrap_or_else(|| "no message".to_string()),
        },
        Err(_) => StripeError::Api {
            status,
            kind: "unknown".into(),
            code: None,
            message: String::from_utf8_lossy(body).chars().take(200).collect(),
        },
    }
}

#[async_trait::async_trait]
impl PaymentProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        session: &NewCheckoutSession,
    ) -> Result<CheckoutSession, CoreError> {
        StripeClient::create_checkout_session(self, session)
            .await
            .map_err(|e| e.into_core(ProviderStep::CheckoutSession))
    }

    async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, CoreError> {
        StripeClient::create_customer(self, customer)
            .await
            .map_err(|e| e.into_core(ProviderStep::Customer))
    }

    async fn create_ephemeral_key(&self, customer_id: &str) -> Result<EphemeralKey, CoreError> {
        StripeClient::create_ephemeral_key(self, customer_id)
            .await
            .map_err(|e| e.into_core(ProviderStep::EphemeralKey))
    }

    async fn create_payment_intent(
        &self,
        intent: &NewPaymentIntent,
    ) -> Result<PaymentIntent, CoreError> {
        StripeClient::create_payment_intent(self, intent)
            .await
            .map_err(|e| e.into_core(ProviderStep::PaymentIntent))
    }
}
