//! Population statistics and data-quality warnings for the admin dashboard.

pub mod handlers;
pub mod model;

pub use handlers::config;
pub use model::{Breakdown, Criterion};
