use std::fmt;

use serde_json::Value;

use crate::validate::{parse_checkout_items, parse_payment_request};
use crate::{
    CallerId, CheckoutSession, CoreError, LineItem, NewCheckoutSession, NewCustomer,
    NewPaymentIntent, PaymentProvider, PaymentSheet,
};

/// Fixed settings applied to every checkout/payment request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutSettings {
    /// Lower-case ISO currency code, e.g. `usd`.
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            currency: "usd".into(),
            success_url: "https://example.com/success".into(),
            cancel_url: "https://example.com/cancel".into(),
        }
    }
}

impl CheckoutSettings {
    /// Read `CHECKOUT_CURRENCY`, `CHECKOUT_SUCCESS_URL` and `CHECKOUT_CANCEL_URL`
    /// through `get`, falling back to the defaults for unset or empty values.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(get: F) -> Result<Self, SettingsError> {
        let var = |key: &str| get(key).filter(|s| !s.is_empty());
        let defaults = Self::default();

        let currency = var("CHECKOUT_CURRENCY")
            .map(|c| c.to_ascii_lowercase())
            .unwrap_or(defaults.currency);
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(SettingsError {
                field: "CHECKOUT_CURRENCY",
                message: format!("Expected a 3-letter ISO code, got '{}'", currency),
            });
        }
        let success_url = var("CHECKOUT_SUCCESS_URL").unwrap_or(defaults.success_url);
        let cancel_url = var("CHECKOUT_CANCEL_URL").unwrap_or(defaults.cancel_url);
        for (field, url) in [
            ("CHECKOUT_SUCCESS_URL", &success_url),
            ("CHECKOUT_CANCEL_URL", &cancel_url),
        ] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(SettingsError {
                    field,
                    message: format!("Must be an http(s) URL, got '{}'", url),
                });
            }
        }

        Ok(Self {
            currency,
            success_url,
            cancel_url,
        })
    }

    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Invalid checkout setting, named by its environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for SettingsError {}

/// Application service behind the two payment handlers.
///
/// Stateless apart from its settings: every call authenticates, validates,
/// then issues provider requests in sequence. Nothing is retried and nothing
/// is rolled back when a later provider call fails.
pub struct CheckoutService<P: PaymentProvider> {
    provider: P,
    settings: CheckoutSettings,
}

impl<P: PaymentProvider> CheckoutService<P> {
    pub fn new(provider: P, settings: CheckoutSettings) -> Self {
        Self { provider, settings }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }


    /// Create a hosted checkout session for the caller's cart.
    ///
    /// Handlers return only the session URL to the client.
    pub async fn create_checkout_session(
        &self,
        caller: Option<&CallerId>,
        data: &Value,
    ) -> Result<CheckoutSession, CoreError> {
        let caller = caller.ok_or(CoreError::Unauthenticated)?;
        let items = parse_checkout_items(data)?;
        let line_items = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.to_line_item(&self.settings.currency)
                    .map_err(|e| match e {
                        CoreError::InvalidArgument(msg) => {
                            CoreError::invalid(format!("items[{}]: {}", i, msg))
                        }
                        other => other,
                    })
            })
            .collect::<Result<Vec<LineItem>, CoreError>>()?;

        self.provider
            .create_checkout_session(&NewCheckoutSession {
                line_items,
                success_url: self.settings.success_url.clone(),
                cancel_url: self.settings.cancel_url.clone(),
                client_reference_id: caller.clone(),
            })
            .await
    }

    /// Create customer, ephemeral key and payment intent, in that order.
    ///
    /// A failure after the customer exists leaves that customer behind; the
    /// returned `CoreError::Provider` names the step that failed.
    pub async fn create_payment_intent(
        &self,
        caller: Option<&CallerId>,
        data: &Value,
    ) -> Result<PaymentSheet, CoreError> {
        let caller = caller.ok_or(CoreError::Unauthenticated)?;
        let req = parse_payment_request(data)?;

        let customer = self
            .provider
            .create_customer(&NewCustomer {
                user_id: caller.clone(),
                name: Some(req.shipping.name.clone()),
                phone: req.shipping.phone.clone(),
            })
            .await?;
        let key = self.provider.create_ephemeral_key(&customer.id).await?;
        let intent = self
            .provider
            .create_payment_intent(&NewPaymentIntent {
                amount: req.amount,
                currency: self.settings.currency.clone(),
                customer: customer.id.clone(),
                shipping: req.shipping,
                user_id: caller.clone(),
            })
            .await?;

        Ok(PaymentSheet {
            client_secret: intent.client_secret,
            customer: customer.id,
            ephemeral_key: key.secret,
        })
    }
}
