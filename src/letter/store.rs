//! Data seams consumed by the letter pipeline.
//!
//! The Postgres implementations live in `crate::db`; tests plug in
//! in-memory versions.

use async_trait::async_trait;
use uuid::Uuid;

use super::model::{
    Citizen, HistoryEntry, HistoryFilter, LetterStats, LetterTemplate, NewHistoryEntry, Page,
    PageRequest, VillageInfo,
};
use super::LetterError;

#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Returns the template unless it is missing or soft-deleted.
    async fn get_template(&self, id: Uuid) -> Result<Option<LetterTemplate>, LetterError>;

    /// Reads the bytes behind `LetterTemplate::template_path`.
    async fn read_template_file(&self, path: &str) -> Result<Vec<u8>, LetterError>;
}

#[async_trait]
pub trait CitizenDirectory: Send + Sync {
    async fn get_citizen(&self, id: Uuid) -> Result<Option<Citizen>, LetterError>;

    async fn get_citizen_by_nik(&self, nik: &str) -> Result<Option<Citizen>, LetterError>;

    /// Occupation of the family member in `no_kk` whose name is `name`.
    async fn find_parent_occupation(
        &self,
        no_kk: &str,
        name: &str,
    ) -> Result<Option<String>, LetterError>;
}

#[async_trait]
pub trait VillageDirectory: Send + Sync {
    async fn get_village_info(&self) -> Result<Option<VillageInfo>, LetterError>;
}

/// Append-only audit trail of printed letters.
#[async_trait]
pub trait HistoryLog: Send + Sync {
    async fn append(&self, entry: NewHistoryEntry) -> Result<HistoryEntry, LetterError>;

    async fn query(
        &self,
        filter: &HistoryFilter,
        page: PageRequest,
    ) -> Result<Page<HistoryEntry>, LetterError>;

    async fn get(&self, id: Uuid) -> Result<Option<HistoryEntry>, LetterError>;

    async fn stats(&self) -> Result<LetterStats, LetterError>;
}
