//! Conversion of rendered .docx letters into PDF.
//!
//! Two backends implement [`FormatConverter`]; the one in use is chosen once
//! from configuration and the rest of the pipeline never knows which:
//! - `remote` - job-based HTTP service (submit, poll, download, delete)
//! - `local` - headless LibreOffice invoked on the server

pub mod local;
pub mod remote;

pub use local::LocalConverter;
pub use remote::{ConversionJob, ConversionJobApi, JobStatus, RemoteJobConverter, ZamzarApi};

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::LetterError;
use crate::config::{ConverterConfig, ConverterKind};

pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[async_trait]
pub trait FormatConverter: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Converts `docx` to PDF bytes. Cancelling `cancel` aborts the
    /// conversion after releasing any backend resources.
    async fn convert(
        &self,
        docx: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, LetterError>;
}

pub fn build_converter(
    config: &ConverterConfig,
    http_client: reqwest::Client,
) -> Arc<dyn FormatConverter> {
    match config.kind {
        ConverterKind::Remote => {
            log::info!("Using remote conversion service at {}", config.remote.endpoint);
            let api = ZamzarApi::new(
                http_client,
                config.remote.endpoint.clone(),
                config.remote.api_key.clone(),
            );
            Arc::new(RemoteJobConverter::new(
                api,
                config.remote.poll_interval,
                config.remote.max_attempts,
            ))
        }
        ConverterKind::Local => {
            log::info!("Using local conversion via {}", config.local.soffice_bin);
            Arc::new(LocalConverter::new(config.local.soffice_bin.clone()))
        }
    }
}
