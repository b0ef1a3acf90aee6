//! Citizen lookups used by the letter form.

pub mod handlers;

pub use handlers::config;
