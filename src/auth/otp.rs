use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::mailer::{MailError, Mailer, OutgoingMail};
use super::{normalize_email, ttl_from_secs, JwtError, TokenIssuer, UserDirectory, MAX_TTL_SECS};
use crate::config::MailConfig;

const CODE_RANGE: std::ops::RangeInclusive<u32> = 100_000..=999_999;

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("User not found")]
    UserNotFound,

    #[error("Invalid OTP")]
    InvalidOtp,

    #[error("Failed to send OTP: {0}")]
    DeliveryFailed(#[source] MailError),

    #[error("OTP TTL of {0}s is outside 1..={max}s", max = MAX_TTL_SECS)]
    InvalidTtl(u64),

    #[error(transparent)]
    Token(#[from] JwtError),
}

/// Time source, injected so expiry can be tested
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OtpEntry {
    digest: [u8; 32],
    issued_at: DateTime<Utc>,
}

fn digest(code: &str) -> [u8; 32] {
    Sha256::digest(code.as_bytes()).into()
}

/// Owns the live one-time codes (one per email) and turns a correct code into a bearer token.
///
/// Codes live only in memory, expire after `ttl`, and are consumed by the first
/// successful verification. A wrong guess leaves the code in place.
pub struct OtpService {
    entries: Mutex<HashMap<String, OtpEntry>>,
    directory: UserDirectory,
    mailer: Arc<dyn Mailer>,
    tokens: TokenIssuer,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    sender: String,
    subject: String,
}

impl OtpService {
    pub fn new(
        directory: UserDirectory,
        mailer: Arc<dyn Mailer>,
        tokens: TokenIssuer,
        clock: Arc<dyn Clock>,
        ttl_secs: u64,
        mail: &MailConfig,
    ) -> Result<Self, OtpError> {
        let ttl = ttl_from_secs(ttl_secs).ok_or(OtpError::InvalidTtl(ttl_secs))?;
        Ok(Self {
            entries: Mutex::new(HashMap::new()),
            directory,
            mailer,
            tokens,
            clock,
            ttl,
            sender: mail.sender.clone(),
            subject: mail.subject.clone(),
        })
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Issue a fresh code for a known email and mail it, replacing any live code
    pub async fn request(&self, email: &str) -> Result<(), OtpError> {
        let email = normalize_email(email);
        if !self.directory.contains(&email) {
            tracing::warn!("OTP requested for unknown user {}", email);
            return Err(OtpError::UserNotFound);
        }

        let code = rand::thread_rng().gen_range(CODE_RANGE).to_string();
        let entry = OtpEntry {
            digest: digest(&code),
            issued_at: self.clock.now(),
        };
        self.lock().insert(email.clone(), entry.clone());
        tracing::info!("Generated OTP for {}", email);

        let mail = OutgoingMail {
            from: self.sender.clone(),
            to: email.clone(),
            subject: self.subject.clone(),
            text: format!("Your OTP code is {}", code),
        };

        if let Err(e) = self.mailer.send(&mail).await {
            tracing::error!("Error sending OTP to {}: {}", email, e);
            // Withdraw the undelivered code unless a newer request already replaced it
            let mut entries = self.lock();
            if entries.get(&email) == Some(&entry) {
                entries.remove(&email);
            }
            return Err(OtpError::DeliveryFailed(e));
        }

        Ok(())
    }

    /// Consume a matching, unexpired code and return a bearer token for the email
    pub fn verify(&self, email: &str, code: &str) -> Result<String, OtpError> {
        let email = normalize_email(email);
        let now = self.clock.now();

        {
            let mut entries = self.lock();
            let Some(entry) = entries.get(&email) else {
                return Err(OtpError::InvalidOtp);
            };

            if now - entry.issued_at > self.ttl {
                entries.remove(&email);
                tracing::info!("Expired OTP presented for {}", email);
                return Err(OtpError::InvalidOtp);
            }

            if entry.digest != digest(code.trim()) {
                tracing::info!("Wrong OTP presented for {}", email);
                return Err(OtpError::InvalidOtp);
            }

            entries.remove(&email);
        }

        tracing::info!("OTP verified for {}", email);
        Ok(self.tokens.issue(&email, now)?)
    }

    /// Number of emails with a stored code, expired or not
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, OtpEntry>> {
        // The map holds plain data, so a panic elsewhere cannot leave it half-written
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<OutgoingMail>>,
        fail: bool,
    }

    impl Outbox {
        fn last_code(&self) -> String {
            let sent = self.sent.lock().unwrap();
            let text = &sent.last().expect("no mail sent").text;
            text.rsplit(' ').next().unwrap().to_string()
        }

        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Mailer for Outbox {
        async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
            if self.fail {
                return Err(MailError::Rejected(502));
            }
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn advance(&self, by: Duration) {
            *self.0.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn mail_config() -> MailConfig {
        MailConfig {
            sender: "no-reply@localhost".to_string(),
            subject: "Your OTP Code".to_string(),
            webhook_url: None,
        }
    }

    fn service_with_ttl(outbox: Arc<Outbox>, clock: Arc<ManualClock>, ttl_secs: u64) -> Result<OtpService, OtpError> {
        OtpService::new(
            UserDirectory::new(["ada@example.com"]),
            outbox,
            TokenIssuer::new("secret", 3600).unwrap(),
            clock,
            ttl_secs,
            &mail_config(),
        )
    }

    fn service(outbox: Arc<Outbox>, clock: Arc<ManualClock>) -> OtpService {
        service_with_ttl(outbox, clock, 300).unwrap()
    }

    fn setup() -> (OtpService, Arc<Outbox>, Arc<ManualClock>) {
        let outbox = Arc::new(Outbox::default());
        let clock = Arc::new(ManualClock(Mutex::new(Utc::now())));
        (service(outbox.clone(), clock.clone()), outbox, clock)
    }

    #[tokio::test]
    async fn code_verifies_exactly_once() {
        let (otp, outbox, _) = setup();
        otp.request("ada@example.com").await.unwrap();

        let code = outbox.last_code();
        assert_eq!(code.len(), 6);

        let token = otp.verify("ada@example.com", &code).unwrap();
        assert_eq!(otp.tokens().verify(&token).unwrap().email, "ada@example.com");
        assert!(matches!(otp.verify("ada@example.com", &code), Err(OtpError::InvalidOtp)));
    }

    #[tokio::test]
    async fn unknown_user_gets_no_mail() {
        let (otp, outbox, _) = setup();
        assert!(matches!(otp.request("eve@example.com").await, Err(OtpError::UserNotFound)));
        assert_eq!(outbox.count(), 0);
        assert_eq!(otp.pending(), 0);
    }

    #[tokio::test]
    async fn wrong_code_keeps_live_code() {
        let (otp, outbox, _) = setup();
        otp.request("ada@example.com").await.unwrap();
        let code = outbox.last_code();
        let wrong = if code == "123456" { "654321" } else { "123456" };

        assert!(matches!(otp.verify("ada@example.com", wrong), Err(OtpError::InvalidOtp)));
        assert!(otp.verify("ada@example.com", &code).is_ok());
    }

    #[tokio::test]
    async fn new_request_replaces_previous_code() {
        let (otp, outbox, _) = setup();
        otp.request("ada@example.com").await.unwrap();
        let first = outbox.last_code();
        otp.request("Ada@Example.com").await.unwrap();
        let second = outbox.last_code();

        assert_eq!(otp.pending(), 1);
        if first != second {
            assert!(otp.verify("ada@example.com", &first).is_err());
        }
        assert!(otp.verify("ada@example.com", &second).is_ok());
    }

    #[tokio::test]
    async fn expired_code_is_rejected_and_cleared() {
        let (otp, outbox, clock) = setup();
        otp.request("ada@example.com").await.unwrap();
        let code = outbox.last_code();

        clock.advance(Duration::seconds(301));
        assert!(matches!(otp.verify("ada@example.com", &code), Err(OtpError::InvalidOtp)));
        assert_eq!(otp.pending(), 0);
    }

    #[tokio::test]
    async fn failed_delivery_withdraws_code() {
        let outbox = Arc::new(Outbox { fail: true, ..Default::default() });
        let clock = Arc::new(ManualClock(Mutex::new(Utc::now())));
        let otp = service(outbox, clock);

        assert!(matches!(otp.request("ada@example.com").await, Err(OtpError::DeliveryFailed(_))));
        assert_eq!(otp.pending(), 0);
    }

    #[tokio::test]
    async fn out_of_range_ttl_is_refused() {
        let outbox = Arc::new(Outbox::default());
        let clock = Arc::new(ManualClock(Mutex::new(Utc::now())));

        for ttl in [0, u64::MAX, 100_000_000_000_000_000] {
            assert!(matches!(
                service_with_ttl(outbox.clone(), clock.clone(), ttl),
                Err(OtpError::InvalidTtl(t)) if t == ttl
            ));
        }

        let otp = service_with_ttl(outbox.clone(), clock.clone(), MAX_TTL_SECS).unwrap();
        otp.request("ada@example.com").await.unwrap();
        clock.advance(Duration::days(30));
        assert!(otp.verify("ada@example.com", &outbox.last_code()).is_ok());
    }
}
