#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

use formbase_api::app::{cors_layer, router, AppState};
use formbase_api::auth::{MailError, Mailer, OtpService, OutgoingMail, SystemClock, TokenIssuer, UserDirectory};
use formbase_api::config::AppConfig;
use formbase_api::registry::Registry;
use formbase_api::store::{DocumentStore, MemoryDocumentStore};

/// The registry shipped with the repository
pub const REGISTRY: &str = include_str!("../../collections.yaml");

/// The only address allowed to log in
pub const ADMIN: &str = "admin@example.com";

/// Mailer that keeps every message instead of sending it
#[derive(Clone, Default)]
pub struct Outbox {
    sent: Arc<Mutex<Vec<OutgoingMail>>>,
}

impl Outbox {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    /// Code from the most recent message to `email`
    pub fn last_code(&self, email: &str) -> Option<String> {
        self.sent()
            .iter()
            .rev()
            .find(|m| m.to == email)
            .and_then(|m| m.text.split_whitespace().last().map(str::to_string))
    }
}

#[async_trait]
impl Mailer for Outbox {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub outbox: Outbox,
    pub store: MemoryDocumentStore,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Serve the app in-process on a free port with a fresh in-memory store
    pub async fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = AppConfig::development();
        let registry = Registry::from_yaml_str(REGISTRY)?;

        let store = MemoryDocumentStore::new();
        store.prepare(&registry).await?;

        let outbox = Outbox::default();
        let tokens = TokenIssuer::new(&config.security.jwt_secret, config.security.token_ttl_secs)?;
        let otp = OtpService::new(
            UserDirectory::new([ADMIN]),
            Arc::new(outbox.clone()),
            tokens,
            Arc::new(SystemClock),
            config.security.otp_ttl_secs,
            &config.mail,
        )?;

        let state = AppState::new(registry, Arc::new(store.clone()), otp);
        let app = router(state, cors_layer(&config));

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("failed to bind {}", base_url))?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            port,
            base_url,
            outbox,
            store,
            client: reqwest::Client::new(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Run the OTP flow for `ADMIN` and return the bearer token
    pub async fn login(&self) -> Result<String> {
        let res = self
            .client
            .post(self.url("/auth/request-otp"))
            .json(&json!({ "email": ADMIN }))
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::OK, "request-otp returned {}", res.status());

        let code = self.outbox.last_code(ADMIN).context("no OTP was mailed")?;
        let res = self
            .client
            .post(self.url("/auth/verify-otp"))
            .json(&json!({ "email": ADMIN, "otp": code }))
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::OK, "verify-otp returned {}", res.status());

        let body = res.json::<Value>().await?;
        body["token"]
            .as_str()
            .map(str::to_string)
            .context("login response has no token")
    }

    /// Logged-in client calls
    pub async fn get(&self, token: &str, path: &str) -> Result<reqwest::Response> {
        Ok(self.client.get(self.url(path)).bearer_auth(token).send().await?)
    }

    pub async fn post(&self, token: &str, path: &str, body: &Value) -> Result<reqwest::Response> {
        Ok(self.client.post(self.url(path)).bearer_auth(token).json(body).send().await?)
    }

    pub async fn patch(&self, token: &str, path: &str, body: &Value) -> Result<reqwest::Response> {
        Ok(self.client.patch(self.url(path)).bearer_auth(token).json(body).send().await?)
    }

    pub async fn delete(&self, token: &str, path: &str) -> Result<reqwest::Response> {
        Ok(self.client.delete(self.url(path)).bearer_auth(token).send().await?)
    }

    /// Create a record and return its id
    pub async fn create(&self, token: &str, collection: &str, body: Value) -> Result<String> {
        let res = self.post(token, &format!("/{}", collection), &body).await?;
        anyhow::ensure!(res.status() == StatusCode::CREATED, "create returned {}", res.status());
        let body = res.json::<Value>().await?;
        body["insertedId"]
            .as_str()
            .map(str::to_string)
            .context("insert result has no insertedId")
    }
}
