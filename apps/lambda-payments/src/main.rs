//! lambda-payments — AWS Lambda entrypoint for the storefront payment handlers.
//!
//! Purpose
//! - Handle API Gateway HTTP API (v2) events for:
//!   - `POST /createCheckoutSession` — hosted checkout page URL for a cart.
//!   - `POST /createPaymentIntent` — payment sheet values for the mobile app.
//! - Use `CheckoutService` with the Stripe adapter.
//! - Initialize structured logging compatible with Lambda.
//!
//! Security
//! - Every call must carry `Authorization: Bearer <Firebase ID token>`.
//! - If `FIREBASE_AUTH_INSECURE_SKIP_SIGNATURE` is truthy or
//!   `FIREBASE_AUTH_EMULATOR_HOST` is set, tokens are accepted without a
//!   signature check; a WARN is emitted at startup.
//!
//! Configuration
//! - `FIREBASE_PROJECT_ID` (required), `STRIPE_SECRET_KEY` (required).
//! - `CHECKOUT_CURRENCY`, `CHECKOUT_SUCCESS_URL`, `CHECKOUT_CANCEL_URL`, validated
//!   at cold start.

use std::sync::Arc;

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use domain::service::{CheckoutService, CheckoutSettings};
use domain::{CallerId, CheckoutSessionOut, CoreError, PaymentProvider, ProviderStep};
use firebase_auth::{FirebaseVerifier, VerifyMode};
use http_common::lambda::{resp, resp_result, resp_with_error, with_cors};
use http_common::{bearer_token, error_parts, parse_callable_body, CallableStatus};
use stripe_api::StripeClient;

struct AppState<P: PaymentProvider> {
    svc: CheckoutService<P>,
    verifier: FirebaseVerifier,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let project_id = std::env::var("FIREBASE_PROJECT_ID")
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or("FIREBASE_PROJECT_ID is required")?;
    let verifier = FirebaseVerifier::from_env(project_id)
        .map_err(|e| format!("firebase auth init error: {e}"))?;
    if verifier.mode() == VerifyMode::ClaimsOnly {
        warn!("Firebase ID token signature verification is DISABLED. DO NOT USE IN PRODUCTION.");
    }

    let settings = CheckoutSettings::from_env()?;
    let stripe = StripeClient::from_env().map_err(|e| format!("stripe init error: {e}"))?;
    let state = Arc::new(AppState {
        svc: CheckoutService::new(stripe, settings),
        verifier,
    });

    let handler = service_fn(move |req: Request| {
        let st = state.clone();
        async move { route(&*st, req).await }
    });
    run(handler).await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json().with_target(true).with_writer(std::io::stdout))
        .init();
}

async fn route<P: PaymentProvider>(
    state: &AppState<P>,
    req: Request,
) -> Result<Response<Body>, Error> {
    // API Gateway HTTP API includes the stage prefix in rawPath (e.g. /dev/createPaymentIntent)
    let path = req.uri().path();
    let function = path.rsplit('/').next().unwrap_or_default().to_string();
    let method = req.method().as_str().to_string();

    if function != "createCheckoutSession" && function != "createPaymentIntent" {
        return Ok(with_cors(resp_with_error(
            CallableStatus::NotFound,
            "Function not found",
        )));
    }
    match method.as_str() {
        "OPTIONS" => Ok(with_cors(resp(204, None))),
        "POST" => Ok(with_cors(call(state, &function, req).await)),
        _ => Ok(with_cors(resp(405, None))),
    }
}

async fn call<P: PaymentProvider>(
    state: &AppState<P>,
    function: &str,
    req: Request,
) -> Response<Body> {
    let caller = authenticate(&state.verifier, &req).await;
    // Unauthenticated callers skip body parsing so auth is reported first.
    let data = match caller {
        Some(_) => match parse_callable_body(req.body().as_ref()) {
            Ok(d) => d,
            Err(e) => return error_response(function, &e),
        },
        None => serde_json::Value::Null,
    };

    let uid = caller.as_ref().map(|c| c.as_str()).unwrap_or("-");
    let outcome = if function == "createCheckoutSession" {
        state
            .svc
            .create_checkout_session(caller.as_ref(), &data)
            .await
            .map(|session| {
                info!(function, uid, session_id = %session.id, "call ok");
                serde_json::json!(CheckoutSessionOut::from(session))
            })
    } else {
        state
            .svc
            .create_payment_intent(caller.as_ref(), &data)
            .await
            .map(|sheet| {
                info!(function, uid, customer = %sheet.customer, "call ok");
                serde_json::json!(sheet)
            })
    };

    match outcome {
        Ok(value) => resp_result(value),
        Err(e) => error_response(function, &e),
    }
}

async fn authenticate(verifier: &FirebaseVerifier, req: &Request) -> Option<CallerId> {
    let header = req
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let token = bearer_token(header)?;
    match verifier.verify(token).await {
        Ok(caller) => CallerId::new(caller.uid).ok(),
        Err(e) => {
            warn!(err = ?e, "auth failed");
            None
        }
    }
}

fn error_response(function: &str, err: &CoreError) -> Response<Body> {
    match err {
        CoreError::Unauthenticated => warn!(function, "unauthenticated call"),
        CoreError::InvalidArgument(msg) => warn!(function, reason = %msg, "invalid argument"),
        CoreError::Provider { step, message } => {
            error!(function, step = step.as_str(), err = %message, "provider error");
            if matches!(step, ProviderStep::EphemeralKey | ProviderStep::PaymentIntent) {
                warn!(
                    function,
                    step = step.as_str(),
                    "customer record left without a payment intent"
                );
            }
        }
    }
    let (status, message) = error_parts(err);
    resp_with_error(status, &message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use domain::adapters::memory_provider::{InMemoryPaymentProvider, ProviderCall};

    const PROJECT: &str = "demo-shop";

    fn state() -> AppState<InMemoryPaymentProvider> {
        AppState {
            svc: CheckoutService::new(InMemoryPaymentProvider::new(), CheckoutSettings::default()),
            verifier: FirebaseVerifier::new(PROJECT, VerifyMode::ClaimsOnly),
        }
    }

    fn id_token(uid: &str) -> String {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let claims = serde_json::json!({
            "sub": uid,
            "aud": PROJECT,
            "iss": format!("https://securetoken.google.com/{PROJECT}"),
            "exp": now + 3600,
            "auth_time": now - 10,
        });
        let enc = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        format!(
            "{}.{}.",
            enc.encode(b"{\"alg\":\"none\"}"),
            enc.encode(claims.to_string())
        )
    }

    fn request(method: &str, path: &str, token: Option<&str>, body: &str) -> Request {
        let mut rb = http::Request::builder().method(method).uri(path);
        if let Some(t) = token {
            rb = rb.header("authorization", format!("Bearer {t}"));
        }
        rb.body(Body::from(body.to_string())).unwrap()
    }

    fn body_json(resp: &Response<Body>) -> serde_json::Value {
        serde_json::from_slice(resp.body().as_ref()).unwrap()
    }

    #[tokio::test]
    async fn checkout_session_with_stage_prefix() {
        let st = state();
        let token = id_token("uid-7");
        let resp = route(
            &st,
            request(
                "POST",
                "/prod/createCheckoutSession",
                Some(&token),
                r#"{"data": {"items": [{"productId": "hoodie", "size": "L", "quantity": 2, "price": 19.99}]}}"#,
            ),
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), 200);
        assert!(body_json(&resp)["result"]["url"].is_string());
        match &st.svc.provider().calls()[0] {
            ProviderCall::CheckoutSession(s) => {
                assert_eq!(s.client_reference_id.as_str(), "uid-7");
                assert_eq!(s.line_items[0].unit_amount, 1999);
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_token_is_unauthenticated() {
        let st = state();
        let resp = route(&st, request("POST", "/createPaymentIntent", None, "{}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);
        assert_eq!(body_json(&resp)["error"]["status"], "UNAUTHENTICATED");
        assert!(st.svc.provider().calls().is_empty());
    }

    #[tokio::test]
    async fn token_for_other_project_is_unauthenticated() {
        let st = AppState {
            svc: CheckoutService::new(InMemoryPaymentProvider::new(), CheckoutSettings::default()),
            verifier: FirebaseVerifier::new("other-project", VerifyMode::ClaimsOnly),
        };
        let token = id_token("uid-7");
        let resp = route(
            &st,
            request("POST", "/createCheckoutSession", Some(&token), r#"{"data": {"items": []}}"#),
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), 401);
    }

    #[tokio::test]
    async fn payment_intent_round_trip() {
        let st = state();
        let token = id_token("uid-8");
        let body = r#"{"data": {"amount": 2500, "shipping": {"name": "Grace", "address": {"line1": "2 Elm", "city": "Paris", "postal_code": "75001", "country": "FR"}}}}"#;
        let resp = route(&st, request("POST", "/createPaymentIntent", Some(&token), body))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let result = &body_json(&resp)["result"];
        assert!(result["clientSecret"].is_string());
        assert!(result["customer"].is_string());
        assert!(result["ephemeralKey"].is_string());
        assert_eq!(st.svc.provider().calls().len(), 3);
    }

    #[tokio::test]
    async fn invalid_shipping_is_bad_request() {
        let st = state();
        let token = id_token("uid-8");
        let body = r#"{"data": {"amount": 2500, "shipping": {"name": "Grace", "address": {"city": "Paris", "postal_code": "75001"}}}}"#;
        let resp = route(&st, request("POST", "/createPaymentIntent", Some(&token), body))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert_eq!(body_json(&resp)["error"]["code"], "invalid-argument");
        assert!(st.svc.provider().calls().is_empty());
    }

    #[tokio::test]
    async fn preflight_wrong_method_and_unknown_paths() {
        let st = state();
        let resp = route(&st, request("OPTIONS", "/createPaymentIntent", None, ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), 204);
        assert_eq!(resp.headers()["access-control-allow-methods"], "OPTIONS, POST");

        let resp = route(&st, request("GET", "/prod/createPaymentIntent", None, ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), 405);

        let resp = route(&st, request("POST", "/deleteEverything", None, ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
        assert_eq!(body_json(&resp)["error"]["status"], "NOT_FOUND");
    }
}
