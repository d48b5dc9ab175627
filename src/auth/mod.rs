// Auth module - bearer token verification and caller identity

pub mod middleware;

use axum::http::{header, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::models::UserId;

pub use middleware::{require_token, AuthState};

/// JWT claims carried by a bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Caller's user id
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Authenticated caller, inserted into request extensions by [`require_token`]
#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub id: UserId,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingToken,

    #[error("Authorization header must use Bearer token format")]
    MalformedHeader,

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token: {message}")]
    InvalidToken { message: String },

    #[error("Token subject is not a valid user id")]
    InvalidSubject,

    #[error("Signing secret is not configured")]
    MissingSecret,

    #[error("Failed to issue token: {message}")]
    Issue { message: String },
}

impl AuthError {
    /// Label used for the `reason` dimension of `auth_failures_total`
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::MalformedHeader => "malformed_header",
            AuthError::Expired => "expired",
            AuthError::InvalidToken { .. } => "invalid_token",
            AuthError::InvalidSubject => "invalid_subject",
            AuthError::MissingSecret | AuthError::Issue { .. } => "configuration",
        }
    }
}

/// Verifies (and, for tooling and tests, issues) HS256 bearer tokens
pub struct TokenVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str, leeway_seconds: u64) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::MissingSecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_seconds;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Sign a token for `user` that expires after `ttl`
    pub fn issue(&self, user: &UserId, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            AuthError::Issue {
                message: e.to_string(),
            }
        })
    }

    /// Check the signature and expiry of `token` and resolve its subject
    pub fn verify(&self, token: &str) -> Result<Caller, AuthError> {
        let token_data =
            decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::Expired,
                    _ => AuthError::InvalidToken {
                        message: e.to_string(),
                    },
                }
            })?;

        let id = UserId::parse(&token_data.claims.sub).map_err(|_| AuthError::InvalidSubject)?;
        Ok(Caller { id })
    }
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithms", &self.validation.algorithms)
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MalformedHeader)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedHeader);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn verifier() -> TokenVerifier {
        TokenVerifier::new("test-secret", 0).unwrap()
    }

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let verifier = verifier();
        let token = verifier.issue(&user("user-a"), Duration::minutes(5)).unwrap();

        let caller = verifier.verify(&token).unwrap();
        assert_eq!(caller.id, user("user-a"));
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        let verifier = verifier();
        let token = verifier
            .issue(&user("user-a"), Duration::minutes(-5))
            .unwrap();

        assert!(matches!(verifier.verify(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn test_verify_rejects_other_secret() {
        let token = TokenVerifier::new("other-secret", 0)
            .unwrap()
            .issue(&user("user-a"), Duration::minutes(5))
            .unwrap();

        assert!(matches!(
            verifier().verify(&token),
            Err(AuthError::InvalidToken { .. })
        ));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let err = verifier().verify("not.a.token").unwrap_err();
        assert_eq!(err.reason(), "invalid_token");
    }

    #[test]
    fn test_verify_trims_subject() {
        let verifier = verifier();
        let claims = Claims {
            sub: " User-A ".to_string(),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            iat: Utc::now().timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert_eq!(verifier.verify(&token).unwrap().id, user("User-A"));
        assert_ne!(verifier.verify(&token).unwrap().id, user("user-a"));
    }

    #[test]
    fn test_verify_rejects_blank_subject() {
        let claims = Claims {
            sub: "  ".to_string(),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            iat: Utc::now().timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(matches!(
            verifier().verify(&token),
            Err(AuthError::InvalidSubject)
        ));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(
            TokenVerifier::new("", 30),
            Err(AuthError::MissingSecret)
        ));
    }

    #[test]
    fn test_debug_hides_keys() {
        let rendered = format!("{:?}", verifier());
        assert!(rendered.contains("TokenVerifier"));
        assert!(!rendered.contains("test-secret"));
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            extract_bearer_token(&headers),
            Err(AuthError::MissingToken)
        ));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def");

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def");

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert!(matches!(
            extract_bearer_token(&headers),
            Err(AuthError::MalformedHeader)
        ));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer"));
        assert!(matches!(
            extract_bearer_token(&headers),
            Err(AuthError::MalformedHeader)
        ));
    }
}
