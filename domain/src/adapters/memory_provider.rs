use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::{
    CheckoutSession, CoreError, Customer, EphemeralKey, NewCheckoutSession, NewCustomer,
    NewPaymentIntent, PaymentIntent, PaymentProvider, ProviderStep,
};

/// A provider request as observed by [`InMemoryPaymentProvider`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderCall {
    CheckoutSession(NewCheckoutSession),
    Customer(NewCustomer),
    /// Customer id the key was scoped to.
    EphemeralKey(String),
    PaymentIntent(NewPaymentIntent),
}

/// In-process payment provider for tests and local development.
///
/// Issues Stripe-shaped ids from a counter, records every request in order,
/// and can be told to fail at one step to exercise partial failures.
pub struct InMemoryPaymentProvider {
    calls: Mutex<Vec<ProviderCall>>,
    fail_at: Mutex<Option<ProviderStep>>,
    next_id: AtomicU64,
    checkout_base: String,
}

impl InMemoryPaymentProvider {
    pub fn new() -> Self {
        Self::with_checkout_base("https://checkout.local/pay")
    }

    /// Hosted-page URLs become `<base>/<session id>`.
    pub fn with_checkout_base<S: Into<String>>(base: S) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_at: Mutex::new(None),
            next_id: AtomicU64::new(1),
            checkout_base: base.into(),
        }
    }

    /// Make every subsequent request at `step` fail.
    pub fn fail_at(&self, step: ProviderStep) {
        if let Ok(mut g) = self.fail_at.lock() {
            *g = Some(step);
        }
    }

    /// Snapshot of all requests seen so far, failed ones included.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().map(|g| g.clone()).unwrap_or_default()
    }

    fn record(&self, step: ProviderStep, call: ProviderCall) -> Result<u64, CoreError> {
        self.calls
            .lock()
            .map_err(|_| CoreError::provider(step, "mutex poisoned"))?
            .push(call);
        let failing = self
            .fail_at
            .lock()
            .map_err(|_| CoreError::provider(step, "mutex poisoned"))?;
        if *failing == Some(step) {
            return Err(CoreError::provider(step, "injected failure"));
        }
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for InMemoryPaymentProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PaymentProvider for InMemoryPaymentProvider {
    async fn create_checkout_session(
        &self,
        session: &NewCheckoutSession,
    ) -> Result<CheckoutSession, CoreError> {
        let n = self.record(
            ProviderStep::CheckoutSession,
            ProviderCall::CheckoutSession(session.clone()),
        )?;
        let id = format!("cs_test_{:06}", n);
        Ok(CheckoutSession {
            url: format!("{}/{}", self.checkout_base.trim_end_matches('/'), id),
            id,
        })
    }

    async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, CoreError> {
        let n = self.record(ProviderStep::Customer, ProviderCall::Customer(customer.clone()))?;
        Ok(Customer {
            id: format!("cus_{:06}", n),
        })
    }

    async fn create_ephemeral_key(&self, customer_id: &str) -> Result<EphemeralKey, CoreError> {
        let n = self.record(
            ProviderStep::EphemeralKey,
            ProviderCall::EphemeralKey(customer_id.to_string()),
        )?;
        Ok(EphemeralKey {
            id: format!("ephkey_{:06}", n),
            secret: format!("ek_test_{:06}", n),
        })
    }

    async fn create_payment_intent(
        &self,
        intent: &NewPaymentIntent,
    ) -> Result<PaymentIntent, CoreError> {
        let n = self.record(
            ProviderStep::PaymentIntent,
            ProviderCall::PaymentIntent(intent.clone()),
        )?;
        let id = format!("pi_{:06}", n);
        Ok(PaymentIntent {
            client_secret: format!("{}_secret_{:06}", id, n),
            id,
        })
    }
}
