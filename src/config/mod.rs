use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// Which `DocumentStore` backs the record routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl std::str::FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreKind::Postgres),
            "memory" | "mem" => Ok(StoreKind::Memory),
            other => Err(format!("unknown store kind '{}' (expected postgres or memory)", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub registry_path: PathBuf,
    pub store: StoreKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub otp_ttl_secs: u64,
    /// Emails allowed to request a login code
    pub allowed_users: Vec<String>,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub sender: String,
    pub subject: String,
    /// Relay endpoint for outgoing mail; when unset, messages are only logged
    pub webhook_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Some(v) = env::var("FORMBASE_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("REGISTRY_PATH") {
            self.server.registry_path = PathBuf::from(v);
        }
        if let Ok(v) = env::var("STORE_KIND") {
            self.server.store = v.parse().unwrap_or(self.server.store);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_TOKEN_TTL_SECS") {
            self.security.token_ttl_secs = v.parse().unwrap_or(self.security.token_ttl_secs);
        }
        if let Ok(v) = env::var("SECURITY_OTP_TTL_SECS") {
            self.security.otp_ttl_secs = v.parse().unwrap_or(self.security.otp_ttl_secs);
        }
        if let Ok(v) = env::var("AUTH_USERS") {
            self.security.allowed_users = split_list(&v);
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = split_list(&v);
        }

        // Mail overrides
        if let Ok(v) = env::var("MAIL_SENDER") {
            self.mail.sender = v;
        }
        if let Ok(v) = env::var("MAIL_SUBJECT") {
            self.mail.subject = v;
        }
        if let Ok(v) = env::var("MAIL_WEBHOOK_URL") {
            self.mail.webhook_url = Some(v).filter(|s| !s.trim().is_empty());
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 5050,
                registry_path: PathBuf::from("collections.yaml"),
                store: StoreKind::Memory,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            security: SecurityConfig {
                jwt_secret: "formbase-development-secret".to_string(),
                token_ttl_secs: 60 * 60,
                otp_ttl_secs: 5 * 60,
                allowed_users: Vec::new(),
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
            mail: MailConfig {
                sender: "no-reply@localhost".to_string(),
                subject: "Your OTP Code".to_string(),
                webhook_url: None,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                port: 5050,
                registry_path: PathBuf::from("collections.yaml"),
                store: StoreKind::Postgres,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                token_ttl_secs: 60 * 60,
                otp_ttl_secs: 5 * 60,
                allowed_users: Vec::new(),
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
            mail: MailConfig {
                sender: "no-reply@staging.example.com".to_string(),
                subject: "Your OTP Code".to_string(),
                webhook_url: None,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 5050,
                registry_path: PathBuf::from("collections.yaml"),
                store: StoreKind::Postgres,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                token_ttl_secs: 60 * 60,
                otp_ttl_secs: 5 * 60,
                allowed_users: Vec::new(),
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
            mail: MailConfig {
                sender: "no-reply@example.com".to_string(),
                subject: "Your OTP Code".to_string(),
                webhook_url: None,
            },
        }
    }

    /// Settings that must be present before the server accepts traffic
    pub fn check(&self) -> Result<(), String> {
        if self.security.jwt_secret.is_empty() {
            return Err("JWT_SECRET is not configured".to_string());
        }
        if self.server.store == StoreKind::Postgres && self.database.url.is_none() {
            return Err("DATABASE_URL is required for the postgres store".to_string());
        }
        if self.environment == Environment::Production && self.mail.webhook_url.is_none() {
            return Err("MAIL_WEBHOOK_URL is required in production".to_string());
        }
        for (name, secs) in [
            ("SECURITY_TOKEN_TTL_SECS", self.security.token_ttl_secs),
            ("SECURITY_OTP_TTL_SECS", self.security.otp_ttl_secs),
        ] {
            if crate::auth::ttl_from_secs(secs).is_none() {
                return Err(format!(
                    "{} must be between 1 and {} seconds, got {}",
                    name,
                    crate::auth::MAX_TTL_SECS,
                    secs
                ));
            }
        }
        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
