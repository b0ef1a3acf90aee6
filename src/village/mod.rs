//! Village profile endpoints.

pub mod handlers;

pub use handlers::config;
