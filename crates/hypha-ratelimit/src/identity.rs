//! Client identity for quota keys.
//!
//! Authenticated callers are keyed by token subject (`user:<sub>`), so one
//! user shares a quota across addresses. Everyone else is keyed by address
//! (`ip:<addr>`), taking the first `X-Forwarded-For` hop when present.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use tracing::debug;

/// The request attributes identity is derived from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestIdentity {
    /// Raw `Authorization` header.
    pub authorization: Option<String>,
    /// Raw `X-Forwarded-For` header.
    pub forwarded_for: Option<String>,
    /// Peer address of the connection.
    pub remote_addr: Option<String>,
}

impl RequestIdentity {
    /// Token from an `Authorization: Bearer <token>` header.
    pub fn bearer_token(&self) -> Option<&str> {
        let header = self.authorization.as_deref()?.trim();
        let (scheme, token) = header.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    }

    /// Client address, preferring the first forwarded hop.
    pub fn client_addr(&self) -> Option<&str> {
        self.forwarded_for
            .as_deref()
            .and_then(|h| h.split(',').next())
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .or(self.remote_addr.as_deref())
    }
}

/// Verified caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    /// Token subject.
    pub subject: String,
    /// Role claim, if any.
    pub role: Option<String>,
}

/// Checks bearer credentials.
pub trait CredentialVerifier: Send + Sync {
    /// `Some` if `token` is valid.
    fn verify(&self, token: &str) -> Option<Principal>;
}

#[derive(Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    role: Option<String>,
}

/// HS256 JWT verifier. Tokens must carry `sub` and an unexpired `exp`.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Verifier for tokens signed with `secret`.
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl CredentialVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Option<Principal> {
        match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => Some(Principal {
                subject: data.claims.sub,
                role: data.claims.role,
            }),
            Err(e) => {
                debug!(error = %e, "bearer token rejected");
                None
            }
        }
    }
}

/// Quota identity for `request`.
pub fn client_identity(
    request: &RequestIdentity,
    verifier: Option<&dyn CredentialVerifier>,
) -> String {
    if let Some(principal) = verifier
        .zip(request.bearer_token())
        .and_then(|(verifier, token)| verifier.verify(token))
    {
        return format!("user:{}", principal.subject);
    }
    format!("ip:{}", request.client_addr().unwrap_or("unknown"))
}
