//! RS256 token signing and verification
//!
//! Tokens are self-describing: the payload carries the PEM public key that
//! verifies the signature. `decode_unverified` exists so the engine can
//! recover that key (and the user it names) before it knows whether the
//! token is genuine; callers must never trust its output on its own.

use std::collections::HashSet;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::Error as JwtError, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::error::ApiResult;
use crate::models::{TokenClaims, TokenKind, TokenPayload};

/// Stateless RS256 codec
#[derive(Debug, Clone, Default)]
pub struct TokenCodec {
    /// Seconds of clock skew tolerated on `exp`
    leeway_secs: u64,
}

impl TokenCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_leeway(leeway_secs: u64) -> Self {
        Self { leeway_secs }
    }

    /// Sign `payload` with a PEM RSA private key, expiring after `ttl`
    pub fn sign(
        &self,
        payload: &TokenPayload,
        kind: TokenKind,
        private_key_pem: &str,
        ttl: Duration,
    ) -> ApiResult<String> {
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            payload: payload.clone(),
            typ: kind,
            iat: now,
            exp: now + ttl.num_seconds(),
        };

        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())?;
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &key)?)
    }

    /// Read the claims without checking signature or expiry
    pub fn decode_unverified(&self, token: &str) -> Result<TokenClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();

        Ok(decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)?.claims)
    }

    /// Verify signature (RS256 only) and expiry against an SPKI public key
    pub fn verify(&self, token: &str, public_key_pem: &str) -> Result<TokenClaims, JwtError> {
        let key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = self.leeway_secs;
        validation.set_required_spec_claims(&["exp"]);

        Ok(decode::<TokenClaims>(token, &key, &validation)?.claims)
    }
}
