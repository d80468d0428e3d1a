pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod registry;
pub mod schema;
pub mod search;
pub mod store;
pub mod types;
