// handlers/mod.rs - HTTP handlers grouped by concern
//
// auth:    OTP login (public) and whoami (bearer token)
// meta:    service description and health (public), registry description (bearer token)
// records: generic CRUD bound per collection (bearer token)
pub mod auth;
pub mod meta;
pub mod records;

pub use records::CollectionContext;
