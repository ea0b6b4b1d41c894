use std::str::FromStr;

use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Token expired")]
    Expired,
    #[error("Invalid token: {0}")]
    Invalid(String),
    #[error("Failed to sign token: {0}")]
    Encode(String),
    #[error("Unsupported JWT algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Claims carried by an access token. `sub` is the user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// HMAC algorithms accepted for access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HmacAlgorithm {
    #[default]
    Hs256,
    Hs384,
    Hs512,
}

impl HmacAlgorithm {
    fn as_algorithm(self) -> Algorithm {
        match self {
            HmacAlgorithm::Hs256 => Algorithm::HS256,
            HmacAlgorithm::Hs384 => Algorithm::HS384,
            HmacAlgorithm::Hs512 => Algorithm::HS512,
        }
    }
}

impl FromStr for HmacAlgorithm {
    type Err = JwtError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "HS256" => Ok(HmacAlgorithm::Hs256),
            "HS384" => Ok(HmacAlgorithm::Hs384),
            "HS512" => Ok(HmacAlgorithm::Hs512),
            other => Err(JwtError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: HmacAlgorithm,
    expires_in: Duration,
    validation: Validation,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("algorithm", &self.algorithm)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

impl JwtService {
    pub fn new(secret: &[u8], algorithm: HmacAlgorithm, expires_in: Duration) -> Self {
        let mut validation = Validation::new(algorithm.as_algorithm());
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm,
            expires_in,
            validation,
        }
    }

    pub fn expires_in(&self) -> Duration {
        self.expires_in
    }

    pub fn issue(&self, user_id: Uuid, email: &str) -> Result<String, JwtError> {
        let now = Utc::now();
        self.issue_at(user_id, email, now.timestamp())
    }

    fn issue_at(&self, user_id: Uuid, email: &str, issued_at: i64) -> Result<String, JwtError> {
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: issued_at,
            exp: issued_at + self.expires_in.num_seconds(),
        };
        encode(
            &Header::new(self.algorithm.as_algorithm()),
            &claims,
            &self.encoding_key,
        )
        .map_err(|err| JwtError::Encode(err.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Invalid(err.to_string()),
            })
    }
}
