//! Letter (surat) generation pipeline.
//!
//! A letter is produced by merging a Word template with citizen and village
//! data, converting the result to PDF, and recording who printed it:
//! - `renderer` - placeholder substitution inside the .docx package
//! - `fields` - builds the token map from citizen and village records
//! - `converter` - remote job service or local soffice conversion to PDF
//! - `service` - orchestrates the steps and writes the history entry
//! - `store` - the data seams the pipeline consumes

pub mod converter;
pub mod fields;
pub mod handlers;
pub mod metrics;
pub mod model;
pub mod renderer;
pub mod service;
pub mod store;

pub use converter::{build_converter, FormatConverter};
pub use fields::DataMap;
pub use renderer::DocxRenderer;
pub use service::{GeneratedLetter, LetterService};

use actix_web::http::StatusCode;
use thiserror::Error;

/// Every failure the pipeline reports to its callers.
#[derive(Debug, Error)]
pub enum LetterError {
    #[error("{0}")]
    NotFound(String),
    #[error("invalid template: {0}")]
    InvalidTemplate(String),
    #[error("failed to render template: {message}")]
    TemplateRender {
        message: String,
        missing: Vec<String>,
    },
    #[error("conversion backend error: {message}")]
    ConversionBackend {
        status: Option<u16>,
        message: String,
    },
    #[error("conversion did not finish after {attempts} attempts")]
    ConversionTimeout { attempts: u32 },
    #[error("conversion failed: {0}")]
    ConversionFailed(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl LetterError {
    pub fn missing_tokens(missing: Vec<String>) -> Self {
        Self::TemplateRender {
            message: format!("template uses unknown placeholder(s): {}", missing.join(", ")),
            missing,
        }
    }

    pub fn corrupt_template(message: impl Into<String>) -> Self {
        Self::TemplateRender {
            message: message.into(),
            missing: Vec::new(),
        }
    }

    pub fn backend(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::ConversionBackend {
            status,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTemplate(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short error kind used in `ErrorResponse::error`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::InvalidTemplate(_) => "InvalidTemplate",
            Self::TemplateRender { .. } => "TemplateRenderError",
            Self::ConversionBackend { .. } => "ConversionBackendError",
            Self::ConversionTimeout { .. } => "ConversionTimeoutError",
            Self::ConversionFailed(_) => "ConversionFailedError",
            Self::Storage(_) | Self::Database(_) => "InternalServerError",
        }
    }

    /// Whether retrying the whole request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConversionBackend { .. } | Self::ConversionTimeout { .. } | Self::ConversionFailed(_)
        )
    }

    /// Converts the error into the public response body. Details of server-side
    /// failures are only exposed when `expose_details` is set.
    pub fn to_response(&self, expose_details: bool) -> crate::ErrorResponse {
        let message = match self.status_code() {
            StatusCode::INTERNAL_SERVER_ERROR if !expose_details => match self {
                Self::TemplateRender { .. } => "Gagal memproses template surat".to_string(),
                Self::Storage(_) | Self::Database(_) => "Terjadi kesalahan pada server".to_string(),
                _ => "Gagal membuat PDF".to_string(),
            },
            _ => self.to_string(),
        };
        crate::ErrorResponse::new(self.kind(), &message)
    }
}
