use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// A Word template that letters are rendered from.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct LetterTemplate {
    pub id: Uuid,
    #[schema(example = "Surat Keterangan Domisili")]
    pub name: String,
    /// Storage key of the .docx file; `None` when no file was uploaded.
    pub template_path: Option<String>,
    pub use_logo: bool,
    pub logo_url: Option<String>,
    pub logo_public_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Citizen record as stored in the registry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Citizen {
    pub id: Uuid,
    pub no_kk: String,
    #[schema(example = "3171234567890123")]
    pub nik: String,
    #[schema(example = "BUDI SANTOSO")]
    pub nama: String,
    pub tempat_lahir: String,
    pub tanggal_lahir: Option<NaiveDate>,
    pub umur: Option<i32>,
    /// `B` belum kawin, `S` sudah kawin, `P` pernah kawin.
    pub status_perkawinan: String,
    /// `L` or `P`.
    pub jenis_kelamin: String,
    pub dusun: String,
    pub rt: String,
    pub nama_ibu: String,
    pub nama_ayah: String,
    pub status_hubungan_keluarga: String,
    pub agama: String,
    pub pendidikan: String,
    pub pekerjaan: String,
    pub status_mandiri: bool,
    pub status_pt: bool,
    pub status_belum: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The singleton village profile printed on letter headers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct VillageInfo {
    pub id: Uuid,
    pub village_name: String,
    pub district_name: String,
    pub regency_name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub head_name: String,
    pub head_position: String,
    pub signature_path: Option<String>,
}

/// One printed letter. Rows are never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub template_id: Uuid,
    pub template_name: Option<String>,
    pub nik: String,
    pub full_name: String,
    pub printed_by: Uuid,
    pub printed_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub template_id: Uuid,
    pub nik: String,
    pub full_name: String,
    pub printed_by: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct HistoryFilter {
    /// Matches NIK, citizen name or template name.
    pub search: Option<String>,
    /// Inclusive lower bound on the print date.
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound on the print date.
    pub end_date: Option<NaiveDate>,
    pub template_id: Option<Uuid>,
}

impl HistoryFilter {
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl PageRequest {
    /// Clamps out-of-range values instead of rejecting them.
    pub fn normalized(self) -> Self {
        let page = if self.page < 1 { default_page() } else { self.page };
        let limit = if self.limit < 1 {
            default_limit()
        } else {
            self.limit.min(MAX_PAGE_SIZE)
        };
        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total_items: i64,
    pub total_pages: i64,
    pub current_page: i64,
    pub page_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total_items: i64, request: PageRequest) -> Self {
        let total_pages = if total_items == 0 {
            0
        } else {
            (total_items + request.limit - 1) / request.limit
        };
        Self {
            data,
            pagination: Pagination {
                total_items,
                total_pages,
                current_page: request.page,
                page_size: request.limit,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct TemplateUsage {
    pub template_id: Uuid,
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct MonthlyCount {
    /// `YYYY-MM`
    pub month: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LetterStats {
    pub template_stats: Vec<TemplateUsage>,
    pub monthly_stats: Vec<MonthlyCount>,
}
