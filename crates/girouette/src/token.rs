//! Session tokens.
//!
//! A token is `base64url(claims).base64url(mac)`: JSON claims (tenant,
//! session, issue time, expiry, nonce) authenticated with a keyed blake3
//! hash under the tenant's signing key. Verification accepts the current
//! key and, within a grace interval, the previously rotated-out key - and
//! re-checks the embedded tenant id after the signature passes.
//!
//! Every verification failure surfaces as the same uniform error; the
//! comparison itself is constant-time (`blake3::Hash` equality).

use crate::error::EngineError;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use girouette_protocol::{SessionId, TenantId};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// A 256-bit tenant signing key.
#[derive(Clone)]
pub struct SigningKey([u8; 32]);

impl SigningKey {
    /// A fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        getrandom::fill(&mut bytes).expect("OS randomness unavailable");
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.write_str("SigningKey(..)")
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    tenant: TenantId,
    session: SessionId,
    iat: i64,
    exp: i64,
    nonce: String,
}

struct RetiredKey {
    key: SigningKey,
    retire_at: Instant,
}

/// Signs and verifies this tenant's session tokens.
pub(crate) struct TokenService {
    tenant: TenantId,
    current: SigningKey,
    previous: Option<RetiredKey>,
    ttl: Duration,
}

impl TokenService {
    pub(crate) fn new(tenant: TenantId, key: SigningKey, ttl: Duration) -> Self {
        Self {
            tenant,
            current: key,
            previous: None,
            ttl,
        }
    }

    /// Issue a signed token for a session of this tenant.
    pub(crate) fn issue(&self, session: &SessionId) -> String {
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            tenant: self.tenant.clone(),
            session: session.clone(),
            iat: now,
            exp: now + self.ttl.as_secs() as i64,
            nonce: random_nonce(),
        };
        let payload = serde_json::to_vec(&claims).expect("claims serialize");
        let mac = blake3::keyed_hash(&self.current.0, &payload);
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(mac.as_bytes()),
        )
    }

    /// Verify a token and return the session it names.
    ///
    /// All failures collapse into [`EngineError::TokenRejected`].
    pub(crate) fn verify(&self, token: &str) -> Result<SessionId, EngineError> {
        self.verify_inner(token).ok_or(EngineError::TokenRejected)
    }

    fn verify_inner(&self, token: &str) -> Option<SessionId> {
        let (payload_b64, mac_b64) = token.split_once('.')?;
        let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
        let mac: [u8; 32] = URL_SAFE_NO_PAD
            .decode(mac_b64)
            .ok()?
            .try_into()
            .ok()?;

        let current_ok = blake3::keyed_hash(&self.current.0, &payload) == mac;
        let previous_ok = match &self.previous {
            Some(retired) if Instant::now() < retired.retire_at => {
                blake3::keyed_hash(&retired.key.0, &payload) == mac
            }
            _ => false,
        };
        if !current_ok && !previous_ok {
            return None;
        }

        let claims: TokenClaims = serde_json::from_slice(&payload).ok()?;
        // The tenant id is re-checked after signature success: a valid
        // signature under a rotated-in key never crosses tenants.
        if claims.tenant != self.tenant {
            return None;
        }
        if claims.exp < Utc::now().timestamp() {
            return None;
        }
        Some(claims.session)
    }

    /// Install a new signing key. The old key keeps verifying for the
    /// grace interval, then is retired.
    pub(crate) fn rotate(&mut self, new: SigningKey, grace: Duration) {
        let old = std::mem::replace(&mut self.current, new);
        self.previous = Some(RetiredKey {
            key: old,
            retire_at: Instant::now() + grace,
        });
    }
}

/// 128 random bits, base64url.
fn random_nonce() -> String {
    let mut bytes = [0u8; 16];
    getrandom::fill(&mut bytes).expect("OS randomness unavailable");
    URL_SAFE_NO_PAD.encode(bytes)
}

/// A fresh random session identifier.
pub(crate) fn random_session_id() -> SessionId {
    let mut bytes = [0u8; 16];
    getrandom::fill(&mut bytes).expect("OS randomness unavailable");
    SessionId::new(URL_SAFE_NO_PAD.encode(bytes))
}
