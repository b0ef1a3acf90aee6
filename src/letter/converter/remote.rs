//! Job-based remote conversion (Zamzar-compatible API).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{FormatConverter, DOCX_MIME};
use crate::letter::LetterError;

/// Lifecycle state reported by the conversion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Initialising,
    Queued,
    Processing,
    Successful,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Unknown states are treated as still in progress.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "initialising" | "initializing" => Self::Initialising,
            "queued" => Self::Queued,
            "successful" => Self::Successful,
            "failed" => Self::Failed,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Processing,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Successful | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initialising => "initialising",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A conversion job as last seen by the converter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub id: String,
    pub status: JobStatus,
    pub source_file_id: Option<String>,
    pub target_file_ids: Vec<String>,
}

impl ConversionJob {
    /// Folds a fresh status response in, keeping file ids already known so
    /// cleanup can reach them.
    fn absorb(&mut self, latest: ConversionJob) {
        self.status = latest.status;
        if latest.source_file_id.is_some() {
            self.source_file_id = latest.source_file_id;
        }
        if !latest.target_file_ids.is_empty() {
            self.target_file_ids = latest.target_file_ids;
        }
    }
}

/// The four remote operations the polling converter is built on.
#[async_trait]
pub trait ConversionJobApi: Send + Sync {
    async fn submit(&self, docx: Vec<u8>) -> Result<ConversionJob, LetterError>;

    async fn status(&self, job_id: &str) -> Result<ConversionJob, LetterError>;

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, LetterError>;

    /// Deletes every remote file belonging to `job`.
    async fn cleanup(&self, job: &ConversionJob) -> Result<(), LetterError>;
}

/// Submits a job, polls it on a fixed interval, downloads the result and
/// always deletes the remote artifacts afterwards.
pub struct RemoteJobConverter<A> {
    api: A,
    poll_interval: Duration,
    max_attempts: u32,
}

impl<A: ConversionJobApi> RemoteJobConverter<A> {
    pub fn new(api: A, poll_interval: Duration, max_attempts: u32) -> Self {
        Self {
            api,
            poll_interval,
            max_attempts: max_attempts.max(1),
        }
    }

    async fn poll_and_fetch(
        &self,
        job: &mut ConversionJob,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, LetterError> {
        for attempt in 1..=self.max_attempts {
            let latest = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(LetterError::ConversionTimeout { attempts: attempt - 1 });
                }
                latest = self.api.status(&job.id) => latest?,
            };
            job.absorb(latest);
            log::debug!(
                "Conversion job {} is {} (poll {}/{})",
                job.id,
                job.status,
                attempt,
                self.max_attempts
            );

            match job.status {
                JobStatus::Successful => {
                    let file_id = job.target_file_ids.first().cloned().ok_or_else(|| {
                        LetterError::backend(None, format!("job {} finished without output", job.id))
                    })?;
                    return tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(LetterError::ConversionTimeout { attempts: attempt }),
                        pdf = self.api.download(&file_id) => pdf,
                    };
                }
                JobStatus::Failed | JobStatus::Cancelled => {
                    return Err(LetterError::ConversionFailed(format!(
                        "job {} ended with status {}",
                        job.id, job.status
                    )));
                }
                _ => {}
            }

            if attempt < self.max_attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(LetterError::ConversionTimeout { attempts: attempt });
                    }
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        Err(LetterError::ConversionTimeout {
            attempts: self.max_attempts,
        })
    }
}

#[async_trait]
impl<A: ConversionJobApi> FormatConverter for RemoteJobConverter<A> {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn convert(
        &self,
        docx: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, LetterError> {
        let mut job = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LetterError::ConversionTimeout { attempts: 0 }),
            job = self.api.submit(docx) => job?,
        };
        log::info!("Submitted conversion job {}", job.id);

        let result = self.poll_and_fetch(&mut job, cancel).await;

        if let Err(e) = self.api.cleanup(&job).await {
            log::warn!("Failed to clean up conversion job {}: {}", job.id, e);
        }

        match &result {
            Ok(pdf) => log::info!("Conversion job {} produced {} bytes", job.id, pdf.len()),
            Err(e) => log::error!("Conversion job {} failed: {}", job.id, e),
        }
        result
    }
}

#[derive(Debug, Deserialize)]
struct ZamzarFile {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct ZamzarJob {
    id: u64,
    status: String,
    source_file: Option<ZamzarFile>,
    #[serde(default)]
    target_files: Vec<ZamzarFile>,
}

impl From<ZamzarJob> for ConversionJob {
    fn from(job: ZamzarJob) -> Self {
        Self {
            id: job.id.to_string(),
            status: JobStatus::parse(&job.status),
            source_file_id: job.source_file.map(|f| f.id.to_string()),
            target_file_ids: job.target_files.into_iter().map(|f| f.id.to_string()).collect(),
        }
    }
}

/// HTTP client for the Zamzar v1 API.
pub struct ZamzarApi {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl ZamzarApi {
    pub fn new(client: reqwest::Client, endpoint: String, api_key: String) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<reqwest::Response, LetterError> {
        let response = request
            .basic_auth(&self.api_key, Some(""))
            .send()
            .await
            .map_err(|e| {
                LetterError::backend(
                    e.status().map(|s| s.as_u16()),
                    format!("{} request failed: {}", operation, e),
                )
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(LetterError::backend(
            Some(status.as_u16()),
            format!("{} returned {}: {}", operation, status, body.trim()),
        ))
    }

    async fn job_from(
        &self,
        response: reqwest::Response,
        operation: &str,
    ) -> Result<ConversionJob, LetterError> {
        let job: ZamzarJob = response.json().await.map_err(|e| {
            LetterError::backend(None, format!("{} returned an unreadable job: {}", operation, e))
        })?;
        Ok(job.into())
    }
}

#[async_trait]
impl ConversionJobApi for ZamzarApi {
    async fn submit(&self, docx: Vec<u8>) -> Result<ConversionJob, LetterError> {
        let file = Part::bytes(docx)
            .file_name("document.docx")
            .mime_str(DOCX_MIME)
            .map_err(|e| LetterError::backend(None, e.to_string()))?;
        let form = Form::new()
            .part("source_file", file)
            .text("target_format", "pdf");

        let response = self
            .send(self.client.post(self.url("/jobs")).multipart(form), "submit job")
            .await?;
        self.job_from(response, "submit job").await
    }

    async fn status(&self, job_id: &str) -> Result<ConversionJob, LetterError> {
        let response = self
            .send(self.client.get(self.url(&format!("/jobs/{}", job_id))), "job status")
            .await?;
        self.job_from(response, "job status").await
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, LetterError> {
        let response = self
            .send(
                self.client.get(self.url(&format!("/files/{}/content", file_id))),
                "download",
            )
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| LetterError::backend(None, format!("download interrupted: {}", e)))?;
        Ok(bytes.to_vec())
    }

    async fn cleanup(&self, job: &ConversionJob) -> Result<(), LetterError> {
        let mut first_error = None;
        let files = job.target_file_ids.iter().chain(job.source_file_id.iter());
        for file_id in files {
            let request = self.client.delete(self.url(&format!("/files/{}", file_id)));
            if let Err(e) = self.send(request, "delete file").await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
