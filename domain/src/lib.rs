//! Domain library for the storefront payment handlers.
//!
//! Holds the checkout/payment types, the payment provider port, input
//! validation, and the error type shared by every adapter and app. Keep HTTP
//! and provider wire concerns out of this crate.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Identity of the authenticated caller (the auth provider's uid).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallerId(String);

impl CallerId {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        if val.trim().is_empty() {
            return Err(CoreError::Unauthenticated);
        }
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One cart line as sent by the client. `price` is in major currency units.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: String,
    pub size: String,
    pub quantity: u64,
    pub price: f64,
}

impl CartItem {
    /// Convert to a provider line item priced in minor units.
    pub fn to_line_item(&self, currency: &str) -> Result<LineItem, CoreError> {
        Ok(LineItem {
            name: self.product_id.clone(),
            description: format!("Size: {}", self.size),
            product_id: self.product_id.clone(),
            size: self.size.clone(),
            currency: currency.to_string(),
            unit_amount: money::to_minor_units(self.price)?,
            quantity: self.quantity,
        })
    }
}

/// Provider-facing checkout line with an inline price.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineItem {
    pub name: String,
    pub description: String,
    pub product_id: String,
    pub size: String,
    pub currency: String,
    /// Unit price in minor currency units.
    pub unit_amount: u64,
    pub quantity: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
pub struct Address {
    #[serde(default)]
    pub line1: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
pub struct ShippingDetails {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub address: Address,
}

/// Validated input of the payment intent handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentRequest {
    /// Amount in minor currency units, always > 0.
    pub amount: u64,
    pub shipping: ShippingDetails,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCheckoutSession {
    pub line_items: Vec<LineItem>,
    pub success_url: String,
    pub cancel_url: String,
    pub client_reference_id: CallerId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    /// Hosted payment page the client is redirected to.
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCustomer {
    pub user_id: CallerId,
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Customer {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EphemeralKey {
    pub id: String,
    pub secret: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPaymentIntent {
    pub amount: u64,
    pub currency: String,
    pub customer: String,
    pub shipping: ShippingDetails,
    pub user_id: CallerId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

/// Output of the checkout session handler.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct CheckoutSessionOut {
    pub url: String,
}

impl From<CheckoutSession> for CheckoutSessionOut {
    fn from(session: CheckoutSession) -> Self {
        Self { url: session.url }
    }
}

/// Output of the payment intent handler, consumed by the mobile payment sheet.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSheet {
    pub client_secret: String,
    pub customer: String,
    pub ephemeral_key: String,
}

/// Provider call that produced a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderStep {
    CheckoutSession,
    Customer,
    EphemeralKey,
    PaymentIntent,
}

impl ProviderStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStep::CheckoutSession => "checkout_session",
            ProviderStep::Customer => "customer",
            ProviderStep::EphemeralKey => "ephemeral_key",
            ProviderStep::PaymentIntent => "payment_intent",
        }
    }
}

/// Payment provider port. Each call is a single provider request with no retry.
#[async_trait::async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        session: &NewCheckoutSession,
    ) -> Result<CheckoutSession, CoreError>;
    async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, CoreError>;
    /// Ephemeral key scoped to `customer_id` for the mobile SDK.
    async fn create_ephemeral_key(&self, customer_id: &str) -> Result<EphemeralKey, CoreError>;
    async fn create_payment_intent(
        &self,
        intent: &NewPaymentIntent,
    ) -> Result<PaymentIntent, CoreError>;
}

/// Callable error code surfaced to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    Unauthenticated,
    InvalidArgument,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::InvalidArgument => "invalid-argument",
            ErrorCode::Internal => "internal",
        }
    }
}

/// Core domain errors (no external error crates in this crate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    Unauthenticated,
    InvalidArgument(String),
    Provider { step: ProviderStep, message: String },
}

impl CoreError {
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        CoreError::InvalidArgument(msg.into())
    }

    pub fn provider<S: Into<String>>(step: ProviderStep, msg: S) -> Self {
        CoreError::Provider {
            step,
            message: msg.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::Unauthenticated => ErrorCode::Unauthenticated,
            CoreError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            CoreError::Provider { .. } => ErrorCode::Internal,
        }
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::Unauthenticated => write!(f, "caller is not authenticated"),
            CoreError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            CoreError::Provider { step, message } => {
                write!(f, "provider error at {}: {}", step.as_str(), message)
            }
        }
    }
}

impl Error for CoreError {}

pub mod adapters;
pub mod money;
pub mod service;
pub mod validate;
