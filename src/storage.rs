//! File storage backends for template documents and logos.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::CloudinaryConfig;

/// Where an uploaded object ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Key to pass back to `read_file` / `delete_file`.
    pub key: String,
    pub url: String,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload_file(&self, filename: &str, file_data: &[u8]) -> Result<StoredObject, String>;
    async fn read_file(&self, key: &str) -> Result<Vec<u8>, String>;
    async fn delete_file(&self, key: &str) -> Result<(), String>;
    fn get_asset_url(&self, key: &str) -> String;
}

/// Stores objects as plain files under one directory.
pub struct LocalStorage {
    root: PathBuf,
    public_prefix: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.into(),
        }
    }

    /// Keys are single path components; anything else is rejected.
    fn path_for(&self, key: &str) -> Result<PathBuf, String> {
        if key.is_empty() || key.starts_with('.') || sanitize_filename::sanitize(key) != key {
            return Err(format!("Invalid storage key: {}", key));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn upload_file(&self, filename: &str, file_data: &[u8]) -> Result<StoredObject, String> {
        let path = self.path_for(filename)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| format!("Failed to create {}: {}", self.root.display(), e))?;
        tokio::fs::write(&path, file_data)
            .await
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
        log::debug!("Stored {} ({} bytes)", path.display(), file_data.len());
        Ok(StoredObject {
            key: filename.to_string(),
            url: self.get_asset_url(filename),
        })
    }

    async fn read_file(&self, key: &str) -> Result<Vec<u8>, String> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))
    }

    async fn delete_file(&self, key: &str) -> Result<(), String> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("Failed to delete {}: {}", path.display(), e)),
        }
    }

    fn get_asset_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_prefix.trim_end_matches('/'), key)
    }
}

const CLOUDINARY_API: &str = "https://api.cloudinary.com/v1_1";
const LOGO_FOLDER: &str = "logos";

/// Image storage on Cloudinary using signed upload and destroy calls.
pub struct CloudinaryStorage {
    config: CloudinaryConfig,
    client: reqwest::Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

impl CloudinaryStorage {
    pub fn new(config: CloudinaryConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            api_base: CLOUDINARY_API.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/{}/image/{}",
            self.api_base.trim_end_matches('/'),
            self.config.cloud_name,
            action
        )
    }

    fn signed_form(&self, params: Vec<(&'static str, String)>) -> reqwest::multipart::Form {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let mut signed = params;
        signed.push(("timestamp", timestamp));
        let signature = sign_params(&signed, &self.config.api_secret);

        let mut form = reqwest::multipart::Form::new()
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (name, value) in signed {
            form = form.text(name, value);
        }
        form
    }

    async fn post(
        &self,
        action: &str,
        form: reqwest::multipart::Form,
    ) -> Result<reqwest::Response, String> {
        let response = self
            .client
            .post(self.endpoint(action))
            .multipart(form)
            .send()
            .await
            .map_err(|e| format!("Cloudinary {} request failed: {}", action, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Cloudinary {} returned {}: {}", action, status, body));
        }
        Ok(response)
    }
}

/// Cloudinary request signature: parameters sorted by name, joined as
/// `k=v&k=v`, the API secret appended, then hashed.
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl ObjectStorage for CloudinaryStorage {
    async fn upload_file(&self, filename: &str, file_data: &[u8]) -> Result<StoredObject, String> {
        let mime = mime_guess::from_path(filename).first_or_octet_stream();
        let part = reqwest::multipart::Part::bytes(file_data.to_vec())
            .file_name(filename.to_string())
            .mime_str(mime.essence_str())
            .map_err(|e| format!("Invalid content type for {}: {}", filename, e))?;
        let form = self
            .signed_form(vec![("folder", LOGO_FOLDER.to_string())])
            .part("file", part);

        let uploaded: UploadResponse = self
            .post("upload", form)
            .await?
            .json()
            .await
            .map_err(|e| format!("Unexpected Cloudinary upload response: {}", e))?;
        log::info!("Uploaded {} to Cloudinary as {}", filename, uploaded.public_id);
        Ok(StoredObject {
            key: uploaded.public_id,
            url: uploaded.secure_url,
        })
    }

    async fn read_file(&self, key: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .get(self.get_asset_url(key))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| format!("Failed to fetch {} from Cloudinary: {}", key, e))?;
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| format!("Failed to read {} from Cloudinary: {}", key, e))
    }

    async fn delete_file(&self, key: &str) -> Result<(), String> {
        let form = self.signed_form(vec![("public_id", key.to_string())]);
        let destroyed: DestroyResponse = self
            .post("destroy", form)
            .await?
            .json()
            .await
            .map_err(|e| format!("Unexpected Cloudinary destroy response: {}", e))?;
        match destroyed.result.as_str() {
            "ok" | "not found" => Ok(()),
            other => Err(format!("Cloudinary refused to delete {}: {}", key, other)),
        }
    }

    fn get_asset_url(&self, key: &str) -> String {
        format!(
            "https://res.cloudinary.com/{}/image/upload/{}",
            self.config.cloud_name, key
        )
    }
}
