pub mod registry;
pub mod serve;
