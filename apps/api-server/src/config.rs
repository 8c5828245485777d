//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use axum::http::HeaderValue;
use domain::service::CheckoutSettings;
use std::env;
use std::fmt;

/// Authentication provider mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthProvider {
    /// Debug mode: accepts X-Debug-User header as the caller uid (DO NOT USE IN PRODUCTION)
    None,
    /// Firebase: verifies Firebase ID tokens
    Firebase,
}

impl AuthProvider {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("firebase") {
            Self::Firebase
        } else {
            Self::None
        }
    }
}

/// Payment backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentBackend {
    /// In-process fake provider (nothing leaves the process)
    Memory,
    /// Stripe REST API
    Stripe,
}

impl PaymentBackend {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("memory") {
            Self::Memory
        } else {
            Self::Stripe
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 5001)
    pub port: u16,
    /// Authentication provider
    pub auth_provider: AuthProvider,
    /// Firebase project id (required for Firebase auth)
    pub firebase_project_id: Option<String>,
    /// Whether ID tokens are checked without signatures (dev/emulator only)
    pub insecure_skip_signature: bool,
    /// CORS allow origin
    pub cors_allow_origin: HeaderValue,
    /// Payment backend
    pub payment_backend: PaymentBackend,
    /// Currency and redirect URLs for checkout
    pub checkout: CheckoutSettings,
    /// Log format
    pub log_format: LogFormat,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(get: F) -> Result<Self, ConfigError> {
        let var = |key: &str| get(key).filter(|s| !s.is_empty());

        let port = match var("PORT") {
            Some(s) => s.parse().map_err(|_| ConfigError {
                field: "PORT",
                message: format!("Invalid port '{}'", s),
            })?,
            None => 5001,
        };

        let auth_provider =
            AuthProvider::from_str(&var("AUTH_PROVIDER").unwrap_or_else(|| "none".into()));
        let firebase_project_id = var("FIREBASE_PROJECT_ID");
        if auth_provider == AuthProvider::Firebase && firebase_project_id.is_none() {
            return Err(ConfigError {
                field: "FIREBASE_PROJECT_ID",
                message: "Required when AUTH_PROVIDER=firebase".into(),
            });
        }

        let skip_sig = var("FIREBASE_AUTH_INSECURE_SKIP_SIGNATURE").unwrap_or_default();
        let insecure_skip_signature =
            matches!(skip_sig.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
                || var("FIREBASE_AUTH_EMULATOR_HOST").is_some();

        let cors_origin_str = var("CORS_ALLOW_ORIGIN").unwrap_or_else(|| "*".into());
        let cors_allow_origin = if cors_origin_str == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(&cors_origin_str).map_err(|e| ConfigError {
                field: "CORS_ALLOW_ORIGIN",
                message: format!("Invalid header value '{}': {}", cors_origin_str, e),
            })?
        };

        let payment_backend =
            PaymentBackend::from_str(&var("PAYMENT_PROVIDER").unwrap_or_else(|| "stripe".into()));
        // The key itself is read by the Stripe adapter; only its presence is checked here.
        if payment_backend == PaymentBackend::Stripe && var("STRIPE_SECRET_KEY").is_none() {
            return Err(ConfigError {
                field: "STRIPE_SECRET_KEY",
                message: "Required when PAYMENT_PROVIDER=stripe".into(),
            });
        }

        let checkout = CheckoutSettings::from_lookup(&get).map_err(|e| ConfigError {
            field: e.field,
            message: e.message,
        })?;

        let log_format =
            LogFormat::from_str(&var("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        Ok(Self {
            port,
            auth_provider,
            firebase_project_id,
            insecure_skip_signature,
            cors_allow_origin,
            payment_backend,
            checkout,
            log_format,
        })
    }

    /// Log warnings about insecure configuration.
    pub fn warn_if_insecure(&self) {
        if self.auth_provider == AuthProvider::None {
            tracing::warn!(
                "AUTH_PROVIDER=none: Using debug authentication via X-Debug-User header. \
                 DO NOT USE IN PRODUCTION."
            );
        }
        if self.auth_provider == AuthProvider::Firebase && self.insecure_skip_signature {
            tracing::warn!(
                "Firebase ID token signature verification is DISABLED \
                 (insecure flag or auth emulator). DO NOT USE IN PRODUCTION."
            );
        }
        if self.payment_backend == PaymentBackend::Memory {
            tracing::warn!("PAYMENT_PROVIDER=memory: payments are simulated in-process.");
        }
    }
}
