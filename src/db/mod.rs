//! Database module - AppState and database operations
//!
//! Queries live on [`PgRepository`], split by table:
//! - `template` - letter templates
//! - `citizen` - citizen lookups
//! - `dashboard` - population statistics and data-quality warnings
//! - `village` - the village profile (cached)
//! - `letter` - printed-letter history and statistics
//! - `user` - login accounts

mod citizen;
mod dashboard;
mod letter;
mod template;
mod user;
mod village;

pub use template::TemplateChanges;
pub use village::VillageUpdate;

use moka::future::Cache;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::JwtKeys;
use crate::config::AppConfig;
use crate::letter::model::VillageInfo;
use crate::letter::{build_converter, FormatConverter, LetterService};
use crate::storage::{CloudinaryStorage, LocalStorage, ObjectStorage};

const VILLAGE_CACHE_KEY: &str = "village";

/// Postgres access shared by the handlers and the letter pipeline.
#[derive(Clone)]
pub struct PgRepository {
    pub pool: PgPool,
    village_cache: Cache<&'static str, VillageInfo>,
    template_files: Arc<dyn ObjectStorage>,
}

impl PgRepository {
    pub fn new(pool: PgPool, template_files: Arc<dyn ObjectStorage>) -> Self {
        let village_cache = Cache::builder()
            .time_to_live(Duration::from_secs(10 * 60))
            .max_capacity(1)
            .build();

        Self {
            pool,
            village_cache,
            template_files,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub repo: Arc<PgRepository>,
    pub http_client: reqwest::Client,
    pub jwt: JwtKeys,
    /// Template documents.
    pub storage: Arc<dyn ObjectStorage>,
    /// Template logos; `None` when Cloudinary is not configured.
    pub logo_storage: Option<Arc<dyn ObjectStorage>>,
    pub letters: LetterService,
    pub letter_timeout: Duration,
    pub expose_error_details: bool,
}

impl AppState {
    pub async fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(900))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        log::info!("Database migrations applied");

        let http_client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(900))
            .user_agent("desa-admin-server/1.0")
            .build()?;

        let storage: Arc<dyn ObjectStorage> = Arc::new(LocalStorage::new(
            config.template_dir.clone(),
            "/uploads/templates",
        ));
        let logo_storage = config.cloudinary.clone().map(|cloudinary| {
            Arc::new(CloudinaryStorage::new(cloudinary, http_client.clone())) as Arc<dyn ObjectStorage>
        });
        if logo_storage.is_none() {
            log::warn!("Cloudinary is not configured, template logos are disabled");
        }

        let converter = build_converter(&config.converter, http_client.clone());
        Ok(Self::from_parts(
            pool,
            http_client,
            JwtKeys::from_secret(&config.jwt_secret),
            storage,
            logo_storage,
            converter,
            config.letter_timeout,
            config.expose_error_details,
        ))
    }

    /// Wires the state from already-built resources.
    pub fn from_parts(
        pool: PgPool,
        http_client: reqwest::Client,
        jwt: JwtKeys,
        storage: Arc<dyn ObjectStorage>,
        logo_storage: Option<Arc<dyn ObjectStorage>>,
        converter: Arc<dyn FormatConverter>,
        letter_timeout: Duration,
        expose_error_details: bool,
    ) -> Self {
        let repo = Arc::new(PgRepository::new(pool.clone(), storage.clone()));
        let letters = LetterService::new(
            repo.clone(),
            repo.clone(),
            repo.clone(),
            repo.clone(),
            converter,
        );

        Self {
            pool,
            repo,
            http_client,
            jwt,
            storage,
            logo_storage,
            letters,
            letter_timeout,
            expose_error_details,
        }
    }

    /// Replaces the letter pipeline, keeping everything else.
    pub fn with_letter_service(mut self, letters: LetterService) -> Self {
        self.letters = letters;
        self
    }
}
