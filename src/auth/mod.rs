pub mod mailer;
pub mod otp;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub use mailer::{LogMailer, MailError, Mailer, OutgoingMail, WebhookMailer};
pub use otp::{Clock, OtpError, OtpService, SystemClock};

/// Longest lifetime accepted for tokens and one-time codes (one year)
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Lifetime in seconds as a `Duration`, if within `1..=MAX_TTL_SECS`
pub fn ttl_from_secs(secs: u64) -> Option<Duration> {
    if secs == 0 || secs > MAX_TTL_SECS {
        return None;
    }
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}

/// Identity asserted by a bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),
    #[error("Invalid JWT secret")]
    InvalidSecret,
    #[error("Token TTL of {0}s is outside 1..={max}s", max = MAX_TTL_SECS)]
    InvalidTtl(u64),
    #[error("Invalid JWT token: {0}")]
    Invalid(String),
}

/// Signs and checks HS256 bearer tokens
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_secs: u64) -> Result<Self, JwtError> {
        if secret.is_empty() {
            return Err(JwtError::InvalidSecret);
        }
        let ttl = ttl_from_secs(ttl_secs).ok_or(JwtError::InvalidTtl(ttl_secs))?;
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        })
    }

    pub fn issue(&self, email: &str, now: DateTime<Utc>) -> Result<String, JwtError> {
        let claims = Claims {
            email: email.to_string(),
            exp: (now + self.ttl).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(|e| JwtError::TokenGeneration(e.to_string()))
    }

    /// Signature and expiry check; expiry is the only way a token stops being valid
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| JwtError::Invalid(e.to_string()))
    }
}

/// Emails allowed to log in, compared case-insensitively
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    emails: HashSet<String>,
}

impl UserDirectory {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            emails: emails.into_iter().map(|e| normalize_email(e.as_ref())).collect(),
        }
    }

    pub fn contains(&self, email: &str) -> bool {
        self.emails.contains(&normalize_email(email))
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
