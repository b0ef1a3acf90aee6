//! Letter generation orchestrator.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::converter::FormatConverter;
use super::fields::{filename_slug, letter_data_map, today};
use super::metrics::{CONVERSION_FAILURES, CONVERSION_SECONDS, LETTERS_GENERATED};
use super::model::{Citizen, LetterTemplate, NewHistoryEntry, VillageInfo};
use super::renderer::DocxRenderer;
use super::store::{CitizenDirectory, HistoryLog, TemplateStore, VillageDirectory};
use super::LetterError;

/// A finished PDF plus what it was made from.
#[derive(Debug, Clone)]
pub struct GeneratedLetter {
    pub filename: String,
    pub pdf: Vec<u8>,
    pub template_id: Uuid,
    pub template_name: String,
    pub nik: String,
    pub citizen_name: String,
}

impl GeneratedLetter {
    /// Inline form used by the preview endpoint.
    pub fn data_uri(&self) -> String {
        preview_data_uri(&self.pdf)
    }
}

pub fn preview_data_uri(pdf: &[u8]) -> String {
    format!("data:application/pdf;base64,{}", STANDARD.encode(pdf))
}

enum CitizenRef {
    Id(Uuid),
    Nik(String),
}

/// Everything loaded before rendering starts.
struct LetterInputs {
    template: LetterTemplate,
    template_path: String,
    citizen: Citizen,
    village: VillageInfo,
}

#[derive(Clone)]
pub struct LetterService {
    templates: Arc<dyn TemplateStore>,
    citizens: Arc<dyn CitizenDirectory>,
    village: Arc<dyn VillageDirectory>,
    history: Arc<dyn HistoryLog>,
    converter: Arc<dyn FormatConverter>,
    renderer: DocxRenderer,
}

impl LetterService {
    pub fn new(
        templates: Arc<dyn TemplateStore>,
        citizens: Arc<dyn CitizenDirectory>,
        village: Arc<dyn VillageDirectory>,
        history: Arc<dyn HistoryLog>,
        converter: Arc<dyn FormatConverter>,
    ) -> Self {
        Self {
            templates,
            citizens,
            village,
            history,
            converter,
            renderer: DocxRenderer::new(),
        }
    }

    pub fn history(&self) -> &Arc<dyn HistoryLog> {
        &self.history
    }

    /// Produces the PDF and records one history entry for `user_id`.
    pub async fn generate(
        &self,
        template_id: Uuid,
        citizen_id: Uuid,
        user_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<GeneratedLetter, LetterError> {
        let letter = self
            .produce(template_id, CitizenRef::Id(citizen_id), cancel)
            .await?;

        let entry = NewHistoryEntry {
            template_id,
            nik: letter.nik.clone(),
            full_name: letter.citizen_name.clone(),
            printed_by: user_id,
        };
        match self.history.append(entry).await {
            Ok(saved) => log::info!(
                "Letter {} printed for {} by {} (history {})",
                letter.template_name,
                letter.nik,
                user_id,
                saved.id
            ),
            Err(e) => log::error!(
                "Letter for {} was generated but history could not be saved: {}",
                letter.nik,
                e
            ),
        }
        LETTERS_GENERATED.inc();
        Ok(letter)
    }

    /// Same pipeline as [`generate`](Self::generate) without a history entry.
    pub async fn preview(
        &self,
        template_id: Uuid,
        citizen_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<GeneratedLetter, LetterError> {
        self.produce(template_id, CitizenRef::Id(citizen_id), cancel)
            .await
    }

    /// Re-creates a letter from its history entry. No new entry is written.
    pub async fn reprint(
        &self,
        history_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<GeneratedLetter, LetterError> {
        let entry = self
            .history
            .get(history_id)
            .await?
            .ok_or_else(|| LetterError::NotFound("Surat tidak ditemukan".into()))?;
        self.produce(entry.template_id, CitizenRef::Nik(entry.nik), cancel)
            .await
    }

    async fn produce(
        &self,
        template_id: Uuid,
        citizen: CitizenRef,
        cancel: &CancellationToken,
    ) -> Result<GeneratedLetter, LetterError> {
        let inputs = self.load_inputs(template_id, citizen).await?;
        let parent_occupation = self.parent_occupation(&inputs.citizen).await;

        let template_bytes = self
            .templates
            .read_template_file(&inputs.template_path)
            .await
            .map_err(|e| {
                log::error!("Template file {} unreadable: {}", inputs.template_path, e);
                LetterError::InvalidTemplate("File template surat tidak dapat dibaca".into())
            })?;

        let data = letter_data_map(&inputs.citizen, &inputs.village, &parent_occupation, today());
        let renderer = self.renderer;
        let docx = tokio::task::spawn_blocking(move || renderer.render(&template_bytes, &data))
            .await
            .map_err(|e| LetterError::corrupt_template(format!("render task failed: {}", e)))??;

        let started = Instant::now();
        let pdf = match self.converter.convert(docx, cancel).await {
            Ok(pdf) => pdf,
            Err(e) => {
                CONVERSION_FAILURES.with_label_values(&[e.kind()]).inc();
                return Err(e);
            }
        };
        CONVERSION_SECONDS.observe(started.elapsed().as_secs_f64());
        log::debug!(
            "Converted {} via {} in {:?}",
            inputs.template.name,
            self.converter.name(),
            started.elapsed()
        );

        Ok(GeneratedLetter {
            filename: format!(
                "surat_{}_{}.pdf",
                filename_slug(&inputs.template.name, "surat"),
                filename_slug(&inputs.citizen.nama, "penduduk")
            ),
            pdf,
            template_id,
            template_name: inputs.template.name,
            nik: inputs.citizen.nik,
            citizen_name: inputs.citizen.nama,
        })
    }

    /// Loads template, citizen and village in that order, failing on the
    /// first one that is absent.
    async fn load_inputs(
        &self,
        template_id: Uuid,
        citizen: CitizenRef,
    ) -> Result<LetterInputs, LetterError> {
        let template = self
            .templates
            .get_template(template_id)
            .await?
            .filter(|t| t.deleted_at.is_none())
            .ok_or_else(|| LetterError::NotFound("Template tidak ditemukan".into()))?;
        let citizen = match citizen {
            CitizenRef::Id(id) => self.citizens.get_citizen(id).await?,
            CitizenRef::Nik(nik) => self.citizens.get_citizen_by_nik(&nik).await?,
        }
        .ok_or_else(|| LetterError::NotFound("Data penduduk tidak ditemukan".into()))?;
        let village = self
            .village
            .get_village_info()
            .await?
            .ok_or_else(|| LetterError::NotFound("Data desa tidak ditemukan".into()))?;
        let template_path = template
            .template_path
            .clone()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                LetterError::InvalidTemplate("File template surat tidak ditemukan".into())
            })?;

        Ok(LetterInputs {
            template,
            template_path,
            citizen,
            village,
        })
    }

    /// Best effort: a failed or empty lookup yields an empty string.
    async fn parent_occupation(&self, citizen: &Citizen) -> String {
        if citizen.nama_ayah.trim().is_empty() {
            return String::new();
        }
        match self
            .citizens
            .find_parent_occupation(&citizen.no_kk, &citizen.nama_ayah)
            .await
        {
            Ok(found) => found.unwrap_or_default(),
            Err(e) => {
                log::warn!("Parent occupation lookup failed for {}: {}", citizen.nik, e);
                String::new()
            }
        }
    }
}

/// Runs one generation on its own task with a deadline.
///
/// The task receives a child token that is cancelled when the deadline passes
/// or the caller goes away, so the converter can release remote jobs before
/// the task ends.
pub async fn run_detached<F, Fut>(deadline: Duration, job: F) -> Result<GeneratedLetter, LetterError>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<GeneratedLetter, LetterError>> + Send + 'static,
{
    let token = CancellationToken::new();
    let _guard = token.clone().drop_guard();
    let handle = tokio::spawn(job(token.child_token()));

    match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(LetterError::backend(
            None,
            format!("letter task aborted: {}", join_error),
        )),
        Err(_) => {
            log::warn!("Letter generation exceeded {:?}, cancelling", deadline);
            token.cancel();
            Err(LetterError::ConversionTimeout { attempts: 0 })
        }
    }
}
