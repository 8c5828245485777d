//! firebase-auth — Firebase ID token verification (claims + JWKS signature).
//!
//! Purpose
//! - Identify the caller of the payment handlers from the `Authorization:
//!   Bearer <id token>` header the mobile SDK attaches to callable requests.
//! - By default, verifies the RS256 signature against Google's secure-token
//!   JWKS and validates audience (project id), issuer and expiry.
//! - Signature verification is skipped (claims only) when
//!   `FIREBASE_AUTH_INSECURE_SKIP_SIGNATURE=1|true|yes|on` or when
//!   `FIREBASE_AUTH_EMULATOR_HOST` is set, since emulator tokens are unsigned.
//!
//! API
//! - `FirebaseVerifier::from_env(project_id)?` then `verify(id_token)` →
//!   `Result<VerifiedCaller, AuthError>`
//!
//! Notes
//! - JWKS keys are cached per verifier with a short TTL to follow key rotation.
//!   The cache lock is never held across the fetch.

use base64::Engine;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

const JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const JWKS_TTL: Duration = Duration::from_secs(15 * 60);
const ISSUER_PREFIX: &str = "https://securetoken.google.com/";
const CLOCK_SKEW_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCaller {
    pub uid: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing or malformed token")]
    Malformed,
    #[error("invalid token payload: {0}")]
    InvalidPayload(&'static str),
    #[error("signature invalid")]
    SignatureInvalid,
    #[error("token expired")]
    Expired,
    #[error("audience mismatch")]
    BadAudience,
    #[error("issuer mismatch")]
    BadIssuer,
    #[error("network or jwks fetch error")]
    Network,
    #[error("jwks document is not valid JSON")]
    InvalidJwks,
}

/// How tokens are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    /// RS256 signature against the JWKS, plus claims.
    Signature,
    /// Claims only. For development and the auth emulator.
    ClaimsOnly,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    aud: String,
    iss: String,
    exp: Option<u64>,
    auth_time: Option<u64>,
}

struct JwksCache {
    fetched_at: SystemTime,
    keys: HashMap<String, DecodingKey>,
}

/// Verifies Firebase ID tokens for one project.
pub struct FirebaseVerifier {
    project_id: String,
    mode: VerifyMode,
    jwks_override: Option<HashMap<String, DecodingKey>>,
    cache: Mutex<JwksCache>,
    http: reqwest::Client,
}

impl FirebaseVerifier {
    pub fn new<S: Into<String>>(project_id: S, mode: VerifyMode) -> Self {
        Self {
            project_id: project_id.into(),
            mode,
            jwks_override: None,
            cache: Mutex::new(JwksCache {
                fetched_at: UNIX_EPOCH,
                keys: HashMap::new(),
            }),
            http: reqwest::Client::new(),
        }
    }

    /// Build from environment toggles (insecure mode, emulator, JWKS override).
    ///
    /// An override that does not parse is an error rather than a silent
    /// fallback to Google's keys.
    pub fn from_env<S: Into<String>>(project_id: S) -> Result<Self, AuthError> {
        let mode = if is_truthy_env("FIREBASE_AUTH_INSECURE_SKIP_SIGNATURE")
            || std::env::var("FIREBASE_AUTH_EMULATOR_HOST").is_ok_and(|v| !v.is_empty())
        {
            VerifyMode::ClaimsOnly
        } else {
            VerifyMode::Signature
        };
        let verifier = Self::new(project_id, mode);
        match std::env::var("FIREBASE_AUTH_JWKS_OVERRIDE") {
            Ok(json) if !json.is_empty() => verifier.with_jwks_json(&json),
            _ => Ok(verifier),
        }
    }

    /// Use a fixed JWKS document instead of fetching Google's keys.
    pub fn with_jwks_json(mut self, json: &str) -> Result<Self, AuthError> {
        self.jwks_override = Some(parse_jwks(json).map_err(|_| AuthError::InvalidJwks)?);
        Ok(self)
    }

    pub fn mode(&self) -> VerifyMode {
        self.mode
    }

    fn issuer(&self) -> String {
        format!("{}{}", ISSUER_PREFIX, self.project_id)
    }

    /// Verify an ID token and return the caller it identifies.
    pub async fn verify(&self, id_token: &str) -> Result<VerifiedCaller, AuthError> {
        if self.mode == VerifyMode::ClaimsOnly {
            trace!("firebase-auth: claims-only mode – skipping signature verification");
            return self.verify_claims_only(id_token);
        }

        let header = decode_header(id_token).map_err(|_| AuthError::Malformed)?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::Malformed);
        }
        let kid = header.kid.ok_or(AuthError::Malformed)?;
        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.project_id.as_str()]);
        validation.set_issuer(&[self.issuer()]);
        validation.leeway = CLOCK_SKEW_SECS;

        let token_data = decode::<Claims>(id_token, &key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidToken
                | jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::SignatureInvalid,
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidAudience => AuthError::BadAudience,
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => AuthError::BadIssuer,
                _ => AuthError::Malformed,
            }
        })?;

        check_subject(token_data.claims)
    }

    fn verify_claims_only(&self, id_token: &str) -> Result<VerifiedCaller, AuthError> {
        let parts: Vec<&str> = id_token.split('.').collect();
        if parts.len() != 3 {
            return Err(AuthError::Malformed);
        }
        let payload_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(parts[1].as_bytes())
            .map_err(|_| AuthError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&payload_bytes)
            .map_err(|_| AuthError::InvalidPayload("json"))?;

        if claims.aud != self.project_id {
            return Err(AuthError::BadAudience);
        }
        if claims.iss != self.issuer() {
            return Err(AuthError::BadIssuer);
        }
        if let Some(exp) = claims.exp {
            if exp + CLOCK_SKEW_SECS <= now_secs() {
                return Err(AuthError::Expired);
            }
        }

        check_subject(claims)
    }

    async fn key_for(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        if let Some(keys) = &self.jwks_override {
            return keys.get(kid).cloned().ok_or(AuthError::SignatureInvalid);
        }

        {
            let cache = self.lock_cache();
            if cache.fetched_at + JWKS_TTL > SystemTime::now() {
                if let Some(k) = cache.keys.get(kid) {
                    return Ok(k.clone());
                }
            }
        }

        // Fetch outside the lock
        let keys = self.fetch_jwks().await.map_err(|e| {
            debug!(err = %e, "firebase-auth: jwks fetch failed");
            AuthError::Network
        })?;
        let mut cache = self.lock_cache();
        cache.keys = keys;
        cache.fetched_at = SystemTime::now();
        cache.keys.get(kid).cloned().ok_or(AuthError::SignatureInvalid)
    }

    fn lock_cache(&self) -> MutexGuard<'_, JwksCache> {
        // Poisoning is ignored; a stale cache is refetched after the TTL.
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn fetch_jwks(&self) -> Result<HashMap<String, DecodingKey>, reqwest::Error> {
        let jwks: Jwks = self
            .http
            .get(JWKS_URL)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(jwks_to_keys(jwks))
    }
}

fn check_subject(claims: Claims) -> Result<VerifiedCaller, AuthError> {
    if claims.sub.is_empty() || claims.sub.len() > 128 {
        return Err(AuthError::InvalidPayload("sub"));
    }
    if let Some(auth_time) = claims.auth_time {
        if auth_time > now_secs() + CLOCK_SKEW_SECS {
            return Err(AuthError::InvalidPayload("auth_time"));
        }
    }
    Ok(VerifiedCaller { uid: claims.sub })
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    n: Option<String>,
    e: Option<String>,
}

fn parse_jwks(json: &str) -> Result<HashMap<String, DecodingKey>, serde_json::Error> {
    let jwks: Jwks = serde_json::from_str(json)?;
    Ok(jwks_to_keys(jwks))
}

fn jwks_to_keys(jwks: Jwks) -> HashMap<String, DecodingKey> {
    let mut map = HashMap::new();
    for k in jwks.keys.into_iter() {
        if k.kty == "RSA" {
            if let (Some(n), Some(e)) = (k.n.as_deref(), k.e.as_deref()) {
                if let Ok(key) = DecodingKey::from_rsa_components(n, e) {
                    map.insert(k.kid, key);
                }
            }
        }
    }
    map
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn is_truthy_env(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => ["1", "true", "yes", "on"]
            .iter()
            .any(|t| v.eq_ignore_ascii_case(t)),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = "storefront-test";

    fn token_with_payload(payload: &serde_json::Value) -> String {
        let header = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\"}");
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{payload}.") // emulator-style unsigned token
    }

    fn claims(exp_offset: i64) -> serde_json::Value {
        let now = now_secs() as i64;
        serde_json::json!({
            "sub": "uid-42",
            "aud": PROJECT,
            "iss": format!("https://securetoken.google.com/{PROJECT}"),
            "exp": now + exp_offset,
            "auth_time": now - 10,
            "email": "shopper@example.com"
        })
    }

    fn claims_only() -> FirebaseVerifier {
        FirebaseVerifier::new(PROJECT, VerifyMode::ClaimsOnly)
    }

    #[tokio::test]
    async fn claims_only_accepts_valid_token() {
        let tok = token_with_payload(&claims(300));
        let caller = claims_only().verify(&tok).await.unwrap();
        assert_eq!(caller.uid, "uid-42");
    }

    #[tokio::test]
    async fn claims_only_rejects_other_project() {
        let mut c = claims(300);
        c["aud"] = serde_json::json!("someone-else");
        let err = claims_only().verify(&token_with_payload(&c)).await.unwrap_err();
        assert_eq!(err, AuthError::BadAudience);

        let mut c = claims(300);
        c["iss"] = serde_json::json!("https://accounts.google.com");
        let err = claims_only().verify(&token_with_payload(&c)).await.unwrap_err();
        assert_eq!(err, AuthError::BadIssuer);
    }

    #[tokio::test]
    async fn claims_only_rejects_expired_and_garbage() {
        let err = claims_only()
            .verify(&token_with_payload(&claims(-3600)))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Expired);

        let err = claims_only().verify("not-a-jwt").await.unwrap_err();
        assert_eq!(err, AuthError::Malformed);

        let mut c = claims(300);
        c["sub"] = serde_json::json!("");
        let err = claims_only().verify(&token_with_payload(&c)).await.unwrap_err();
        assert_eq!(err, AuthError::InvalidPayload("sub"));
    }

    #[tokio::test]
    async fn signature_mode_rejects_unsigned_token() {
        let verifier = FirebaseVerifier::new(PROJECT, VerifyMode::Signature)
            .with_jwks_json(r#"{"keys": []}"#)
            .unwrap();
        let err = verifier
            .verify(&token_with_payload(&claims(300)))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Malformed);
    }

    #[test]
    fn unparsable_jwks_override_is_rejected() {
        let err = FirebaseVerifier::new(PROJECT, VerifyMode::Signature)
            .with_jwks_json("{not json")
            .err();
        assert_eq!(err, Some(AuthError::InvalidJwks));
    }

    // Signature path using a synthetic RSA keypair and a JWKS override
    #[tokio::test]
    async fn signature_verification_success_and_failures() {
        use rsa::pkcs1::EncodeRsaPrivateKey;
        use rsa::traits::PublicKeyParts;
        use rsa::RsaPrivateKey;

        let mut rng = rand::thread_rng();
        let priv_key = RsaPrivateKey::new(&mut rng, 2048).expect("keys");
        let pub_key = priv_key.to_public_key();

        let n = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(pub_key.n().to_bytes_be());
        let e = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(pub_key.e().to_bytes_be());
        let jwks_json = serde_json::json!({
            "keys": [ { "kid": "test1", "kty": "RSA", "alg": "RS256", "n": n, "e": e } ]
        })
        .to_string();

        let pem = priv_key.to_pkcs1_pem(Default::default()).unwrap();
        let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
        let sign = |kid: &str, payload: &serde_json::Value| {
            let header = jsonwebtoken::Header {
                kid: Some(kid.into()),
                alg: jsonwebtoken::Algorithm::RS256,
                ..Default::default()
            };
            jsonwebtoken::encode(&header, payload, &encoding_key).unwrap()
        };

        let verifier = FirebaseVerifier::new(PROJECT, VerifyMode::Signature)
            .with_jwks_json(&jwks_json)
            .unwrap();

        // Success
        let out = verifier.verify(&sign("test1", &claims(300))).await.expect("verified");
        assert_eq!(out.uid, "uid-42");

        // Unknown key id
        let err = verifier
            .verify(&sign("rotated-away", &claims(300)))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::SignatureInvalid);

        // Token minted for a different project
        let other = FirebaseVerifier::new("other-project", VerifyMode::Signature)
            .with_jwks_json(&jwks_json)
            .unwrap();
        let err = other.verify(&sign("test1", &claims(300))).await.unwrap_err();
        assert!(matches!(err, AuthError::BadAudience | AuthError::BadIssuer));
    }
}
