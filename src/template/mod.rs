//! Letter template management: upload, listing and soft delete.

pub mod handlers;
pub mod upload;

pub use handlers::config;
