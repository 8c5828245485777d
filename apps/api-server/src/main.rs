//! api-server — HTTP server for the storefront payment handlers.
//!
//! Serves the two callable endpoints the mobile app uses at checkout:
//! - `POST /createCheckoutSession` — hosted checkout page URL for a cart.
//! - `POST /createPaymentIntent` — customer, ephemeral key and payment intent
//!   for the in-app payment sheet.
//!
//! Supports local dev with:
//! - Auth: Firebase ID token verification or disabled (debug) mode via X-Debug-User.
//! - Payments: Stripe (default, `stripe` feature) or an in-memory fake provider.
//! - CORS: Configurable via CORS_ALLOW_ORIGIN.
//!
//! Run:
//! ```bash
//! # in-memory payments, debug auth; PORT optional
//! PAYMENT_PROVIDER=memory cargo run -p api-server
//!
//! # Stripe test mode behind Firebase auth
//! AUTH_PROVIDER=firebase FIREBASE_PROJECT_ID=my-shop \
//! STRIPE_SECRET_KEY=sk_test_... cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.
//!

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::HeaderValue;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use domain::adapters::memory_provider::InMemoryPaymentProvider;
use domain::service::CheckoutService;
use domain::{
    CallerId, CheckoutSession, CheckoutSessionOut, CoreError, Customer, EphemeralKey,
    NewCheckoutSession, NewCustomer, NewPaymentIntent, PaymentIntent, PaymentProvider,
    ProviderStep,
};
use firebase_auth::FirebaseVerifier;
use http_common::{callable_error, callable_result, error_parts, parse_callable_body};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Provider selected at startup (Stripe is feature-gated).
enum AnyProvider {
    Memory(InMemoryPaymentProvider),
    #[cfg(feature = "stripe")]
    Stripe(stripe_api::StripeClient),
}

#[async_trait::async_trait]
impl PaymentProvider for AnyProvider {
    async fn create_checkout_session(
        &self,
        session: &NewCheckoutSession,
    ) -> Result<CheckoutSession, CoreError> {
        match self {
            AnyProvider::Memory(p) => p.create_checkout_session(session).await,
            #[cfg(feature = "stripe")]
            AnyProvider::Stripe(p) => PaymentProvider::create_checkout_session(p, session).await,
        }
    }

    async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, CoreError> {
        match self {
            AnyProvider::Memory(p) => p.create_customer(customer).await,
            #[cfg(feature = "stripe")]
            AnyProvider::Stripe(p) => PaymentProvider::create_customer(p, customer).await,
        }
    }

    async fn create_ephemeral_key(&self, customer_id: &str) -> Result<EphemeralKey, CoreError> {
        match self {
            AnyProvider::Memory(p) => p.create_ephemeral_key(customer_id).await,
            #[cfg(feature = "stripe")]
            AnyProvider::Stripe(p) => PaymentProvider::create_ephemeral_key(p, customer_id).await,
        }
    }

    async fn create_payment_intent(
        &self,
        intent: &NewPaymentIntent,
    ) -> Result<PaymentIntent, CoreError> {
        match self {
            AnyProvider::Memory(p) => p.create_payment_intent(intent).await,
            #[cfg(feature = "stripe")]
            AnyProvider::Stripe(p) => PaymentProvider::create_payment_intent(p, intent).await,
        }
    }
}

/// How callers are identified.
enum Authenticator {
    /// Trust the X-Debug-User header as the caller uid.
    Debug,
    Firebase(FirebaseVerifier),
}

#[derive(Clone)]
struct AppState {
    svc: Arc<CheckoutService<AnyProvider>>,
    auth: Arc<Authenticator>,
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_insecure();

    let provider = match build_provider(&cfg) {
        Ok(p) => p,
        Err(msg) => {
            error!(%msg, "payment provider init failed");
            std::process::exit(1);
        }
    };
    let auth = match build_authenticator(&cfg) {
        Ok(a) => a,
        Err(msg) => {
            error!(%msg, "authenticator init failed");
            std::process::exit(1);
        }
    };
    let state = AppState {
        svc: Arc::new(CheckoutService::new(provider, cfg.checkout.clone())),
        auth: Arc::new(auth),
    };

    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let mut app = routes()
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .with_state(state);

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin.clone()]))
            .allow_methods([axum::http::Method::POST, axum::http::Method::OPTIONS])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
                axum::http::HeaderName::from_static(http_common::DEBUG_USER_HEADER),
            ])
    };
    app = app.layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    info!(%addr, "api-server listening");
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, err = %e, "bind failed");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!(err = %e, "server error");
        std::process::exit(1);
    }
}

fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/createCheckoutSession",
            post(create_checkout_session).options(preflight),
        )
        .route(
            "/createPaymentIntent",
            post(create_payment_intent).options(preflight),
        )
        .route("/healthz", get(healthz))
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

// Construct the payment provider based on config and feature flags.
fn build_provider(cfg: &config::Config) -> Result<AnyProvider, String> {
    match cfg.payment_backend {
        config::PaymentBackend::Memory => Ok(AnyProvider::Memory(InMemoryPaymentProvider::new())),
        #[cfg(feature = "stripe")]
        config::PaymentBackend::Stripe => stripe_api::StripeClient::from_env()
            .map(AnyProvider::Stripe)
            .map_err(|e| format!("stripe init error: {e}")),
        #[cfg(not(feature = "stripe"))]
        config::PaymentBackend::Stripe => Err(
            "PAYMENT_PROVIDER=stripe but api-server was built without the `stripe` feature".into(),
        ),
    }
}

fn build_authenticator(cfg: &config::Config) -> Result<Authenticator, String> {
    match (&cfg.auth_provider, &cfg.firebase_project_id) {
        (config::AuthProvider::Firebase, Some(project)) => {
            FirebaseVerifier::from_env(project.clone())
                .map(Authenticator::Firebase)
                .map_err(|e| format!("firebase auth init error: {e}"))
        }
        _ => Ok(Authenticator::Debug),
    }
}

/// Resolve the caller identity; `None` means unauthenticated.
async fn authenticate(auth: &Authenticator, headers: &HeaderMap) -> Option<CallerId> {
    match auth {
        Authenticator::Debug => headers
            .get(http_common::DEBUG_USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|uid| CallerId::new(uid).ok()),
        Authenticator::Firebase(verifier) => {
            let token = http_common::bearer_token(
                headers
                    .get(axum::http::header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok()),
            )?;
            match verifier.verify(token).await {
                Ok(caller) => CallerId::new(caller.uid).ok(),
                Err(e) => {
                    warn!(err = ?e, "auth failed");
                    None
                }
            }
        }
    }
}

/// Unwrap the callable body. Unauthenticated callers skip body parsing so the
/// service reports `unauthenticated` ahead of any input error.
fn callable_input(caller: Option<&CallerId>, body: &[u8]) -> Result<serde_json::Value, CoreError> {
    match caller {
        Some(_) => parse_callable_body(body),
        None => Ok(serde_json::Value::Null),
    }
}

fn error_response(function: &'static str, err: &CoreError) -> Response {
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
    let code =
        StatusCode::from_u16(status.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (code, Json(callable_error(status, &message))).into_response()
}

async fn create_checkout_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let caller = authenticate(&state.auth, &headers).await;
    let data = match callable_input(caller.as_ref(), &body) {
        Ok(d) => d,
        Err(e) => return error_response("createCheckoutSession", &e),
    };
    match state.svc.create_checkout_session(caller.as_ref(), &data).await {
        Ok(session) => {
            info!(
                uid = caller.as_ref().map(|c| c.as_str()).unwrap_or("-"),
                session_id = %session.id,
                "checkout session ok"
            );
            let out = CheckoutSessionOut::from(session);
            (StatusCode::OK, Json(callable_result(serde_json::json!(out)))).into_response()
        }
        Err(e) => error_response("createCheckoutSession", &e),
    }
}

async fn create_payment_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let caller = authenticate(&state.auth, &headers).await;
    let data = match callable_input(caller.as_ref(), &body) {
        Ok(d) => d,
        Err(e) => return error_response("createPaymentIntent", &e),
    };
    match state.svc.create_payment_intent(caller.as_ref(), &data).await {
        Ok(sheet) => {
            info!(
                uid = caller.as_ref().map(|c| c.as_str()).unwrap_or("-"),
                customer = %sheet.customer,
                "payment intent ok"
            );
            (StatusCode::OK, Json(callable_result(serde_json::json!(sheet)))).into_response()
        }
        Err(e) => error_response("createPaymentIntent", &e),
    }
}

async fn preflight() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}
