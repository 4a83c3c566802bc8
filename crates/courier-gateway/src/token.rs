use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use courier_types::api::Claims;
use courier_types::models::UserId;

/// The caller identity extracted from a verified session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
}

/// Every verification failure (bad signature, expired, malformed) collapses
/// into this one error so the reason never reaches the wire.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid token")]
pub struct InvalidToken;

/// HS256 session token verifier. Pure in-memory check, no I/O.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Identity, InvalidToken> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!("Token rejected: {}", e);
            InvalidToken
        })?;

        Ok(Identity {
            user_id: data.claims.sub,
        })
    }

    /// Sign a token the way the identity service does. Used by tests and
    /// local tooling; production tokens come from the identity service.
    pub fn issue(&self, user_id: UserId, ttl: chrono::Duration) -> anyhow::Result<String> {
        let exp = (chrono::Utc::now() + ttl).timestamp();
        let claims = Claims {
            sub: user_id,
            exp: usize::try_from(exp)?,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }
}
