//! Runs `StripeClient` against a fake Stripe served on an ephemeral port.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Form, Json, Router};
use domain::service::{CheckoutService, CheckoutSettings};
use domain::{CallerId, CoreError, ProviderStep};
use serde_json::{json, Value};
use stripe_api::{StripeClient, StripeConfig};

#[derive(Clone, Debug)]
struct Seen {
    path: &'static str,
    params: Vec<(String, String)>,
    auth: Option<String>,
    stripe_version: Option<String>,
}

#[derive(Clone, Default)]
struct Fake {
    seen: Arc<Mutex<Vec<Seen>>>,
    reject_intents: bool,
}

impl Fake {
    fn record(&self, path: &'static str, headers: &HeaderMap, params: Vec<(String, String)>) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.seen.lock().unwrap().push(Seen {
            path,
            params,
            auth: header("authorization"),
            stripe_version: header("stripe-version"),
        });
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

fn param<'a>(s: &'a Seen, key: &str) -> Option<&'a str> {
    s.params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

async fn sessions(
    State(fake): State<Fake>,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> Json<Value> {
    fake.record("/v1/checkout/sessions", &headers, params);
    Json(json!({"id": "cs_test_1", "object": "checkout.session", "url": "https://checkout.stripe.com/c/pay/cs_test_1"}))
}

async fn customers(
    State(fake): State<Fake>,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> Json<Value> {
    fake.record("/v1/customers", &headers, params);
    Json(json!({"id": "cus_test_1", "object": "customer"}))
}

async fn ephemeral_keys(
    State(fake): State<Fake>,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> Json<Value> {
    fake.record("/v1/ephemeral_keys", &headers, params);
    Json(json!({"id": "ephkey_1", "object": "ephemeral_key", "secret": "ek_test_secret"}))
}

async fn payment_intents(
    State(fake): State<Fake>,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> (StatusCode, Json<Value>) {
    let reject = fake.reject_intents;
    fake.record("/v1/payment_intents", &headers, params);
    if reject {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"type": "invalid_request_error", "code": "amount_too_small", "message": "Amount must be at least 50 cents"}})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"id": "pi_test_1", "object": "payment_intent", "client_secret": "pi_test_1_secret_abc"})),
    )
}

async fn start(fake: Fake) -> StripeClient {
    let app = Router::new()
        .route("/v1/checkout/sessions", post(sessions))
        .route("/v1/customers", post(customers))
        .route("/v1/ephemeral_keys", post(ephemeral_keys))
        .route("/v1/payment_intents", post(payment_intents))
        .with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut cfg = StripeConfig::new("sk_test_fake");
    cfg.api_base = format!("http://{}", addr);
    StripeClient::new(cfg)
}

fn shipping_payload(amount: u64) -> Value {
    json!({
        "amount": amount,
        "shipping": {
            "name": "Ada Lovelace",
            "phone": "+15550001111",
            "address": {"line1": "1 Main St", "city": "Springfield", "postal_code": "12345", "country": "US"}
        }
    })
}

#[tokio::test]
async fn checkout_session_round_trip() {
    let fake = Fake::default();
    let svc = CheckoutService::new(start(fake.clone()).await, CheckoutSettings::default());
    let caller = CallerId::new("uid-7").unwrap();

    let out = svc
        .create_checkout_session(
            Some(&caller),
            &json!({"items": [{"productId": "tee", "size": "M", "quantity": 2, "price": 19.99}]}),
        )
        .await
        .unwrap();
    assert_eq!(out.id, "cs_test_1");
    assert_eq!(out.url, "https://checkout.stripe.com/c/pay/cs_test_1");

    let seen = fake.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].path, "/v1/checkout/sessions");
    assert_eq!(seen[0].auth.as_deref(), Some("Bearer sk_test_fake"));
    assert_eq!(
        param(&seen[0], "line_items[0][price_data][unit_amount]"),
        Some("1999")
    );
    assert_eq!(param(&seen[0], "client_reference_id"), Some("uid-7"));
}

#[tokio::test]
async fn payment_intent_sequence_and_headers() {
    let fake = Fake::default();
    let svc = CheckoutService::new(start(fake.clone()).await, CheckoutSettings::default());
    let caller = CallerId::new("uid-8").unwrap();

    let sheet = svc
        .create_payment_intent(Some(&caller), &shipping_payload(2599))
        .await
        .unwrap();
    assert_eq!(sheet.client_secret, "pi_test_1_secret_abc");
    assert_eq!(sheet.customer, "cus_test_1");
    assert_eq!(sheet.ephemeral_key, "ek_test_secret");

    let seen = fake.seen();
    let paths: Vec<&str> = seen.iter().map(|s| s.path).collect();
    assert_eq!(
        paths,
        vec!["/v1/customers", "/v1/ephemeral_keys", "/v1/payment_intents"]
    );
    assert_eq!(seen[1].stripe_version.as_deref(), Some("2020-08-27"));
    assert_eq!(param(&seen[1], "customer"), Some("cus_test_1"));
    assert_eq!(seen[2].stripe_version, None);
    assert_eq!(param(&seen[2], "amount"), Some("2599"));
    assert_eq!(param(&seen[2], "customer"), Some("cus_test_1"));
    assert_eq!(param(&seen[2], "metadata[userId]"), Some("uid-8"));
    assert_eq!(
        param(&seen[2], "shipping[address][city]"),
        Some("Springfield")
    );
}

#[tokio::test]
async fn provider_rejection_surfaces_as_internal_after_customer_creation() {
    let fake = Fake {
        reject_intents: true,
        ..Fake::default()
    };
    let svc = CheckoutService::new(start(fake.clone()).await, CheckoutSettings::default());
    let caller = CallerId::new("uid-9").unwrap();

    let err = svc
        .create_payment_intent(Some(&caller), &shipping_payload(10))
        .await
        .unwrap_err();
    match &err {
        CoreError::Provider { step, message } => {
            assert_eq!(*step, ProviderStep::PaymentIntent);
            assert!(message.contains("amount_too_small") || message.contains("50 cents"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(err.code().as_str(), "internal");

    // No rollback: the customer request already went out.
    let customers = fake
        .seen()
        .iter()
        .filter(|s| s.path == "/v1/customers")
        .count();
    assert_eq!(customers, 1);
}
