//! Local conversion through a headless LibreOffice (`soffice`) process.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::FormatConverter;
use crate::letter::LetterError;

const INPUT_FILE: &str = "letter.docx";
const OUTPUT_FILE: &str = "letter.pdf";

pub struct LocalConverter {
    soffice_bin: String,
}

impl LocalConverter {
    pub fn new(soffice_bin: impl Into<String>) -> Self {
        Self {
            soffice_bin: soffice_bin.into(),
        }
    }
}

fn io_error(context: &str, err: std::io::Error) -> LetterError {
    LetterError::backend(None, format!("{}: {}", context, err))
}

#[async_trait]
impl FormatConverter for LocalConverter {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn convert(
        &self,
        docx: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, LetterError> {
        // Private per-request directory; removed when `work_dir` drops.
        let work_dir = tempfile::tempdir()
            .map_err(|e| io_error("failed to create temporary directory", e))?;
        let input = work_dir.path().join(INPUT_FILE);
        tokio::fs::write(&input, &docx)
            .await
            .map_err(|e| io_error("failed to write document", e))?;

        // Each run gets its own profile so parallel conversions do not
        // contend for the LibreOffice profile lock.
        let profile = work_dir.path().join("profile");
        let mut command = Command::new(&self.soffice_bin);
        command
            .arg(format!("-env:UserInstallation=file://{}", profile.display()))
            .arg("--headless")
            .arg("--norestore")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(work_dir.path())
            .arg(&input)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| io_error(&format!("failed to start {}", self.soffice_bin), e))?;

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::warn!("Local conversion cancelled, killing {}", self.soffice_bin);
                return Err(LetterError::ConversionTimeout { attempts: 0 });
            }
            output = child.wait_with_output() => {
                output.map_err(|e| io_error("failed to wait for converter", e))?
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LetterError::backend(
                None,
                format!(
                    "{} exited with status {}: {}",
                    self.soffice_bin,
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            ));
        }

        let pdf = tokio::fs::read(work_dir.path().join(OUTPUT_FILE))
            .await
            .map_err(|e| io_error("converter produced no PDF", e))?;
        log::info!("Local conversion produced {} bytes", pdf.len());
        Ok(pdf)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-soffice");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_successful_conversion_reads_output() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(
            dir.path(),
            r#"prev=""
for arg in "$@"; do
  if [ "$prev" = "--outdir" ]; then outdir="$arg"; fi
  prev="$arg"
done
printf '%%PDF-1.7 fake' > "$outdir/letter.pdf""#,
        );
        let converter = LocalConverter::new(bin.to_string_lossy());
        let pdf = converter
            .convert(b"docx".to_vec(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(pdf, b"%PDF-1.7 fake");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_backend_error() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "echo 'source file could not be loaded' >&2\nexit 3");
        let err = LocalConverter::new(bin.to_string_lossy())
            .convert(vec![], &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            LetterError::ConversionBackend { message, .. } => {
                assert!(message.contains("status 3"));
                assert!(message.contains("could not be loaded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_backend_error() {
        let err = LocalConverter::new("/nonexistent/soffice")
            .convert(vec![], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LetterError::ConversionBackend { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "sleep 30");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = LocalConverter::new(bin.to_string_lossy())
            .convert(vec![], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, LetterError::ConversionTimeout { .. }));
    }
}
