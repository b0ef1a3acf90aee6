//! Letter template queries

use async_trait::async_trait;
use uuid::Uuid;

use super::PgRepository;
use crate::letter::model::{LetterTemplate, PageRequest};
use crate::letter::store::TemplateStore;
use crate::letter::LetterError;

const TEMPLATE_COLUMNS: &str = "id, name, template_path, use_logo, logo_url, logo_public_id, \
     created_at, updated_at, deleted_at";

/// Fields replaced by a template update. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct TemplateChanges {
    pub name: Option<String>,
    pub template_path: Option<String>,
    pub logo_url: Option<String>,
    pub logo_public_id: Option<String>,
}

impl PgRepository {
    /// Active templates, most recently updated first.
    pub async fn list_templates(
        &self,
        page: PageRequest,
    ) -> Result<(Vec<LetterTemplate>, i64), sqlx::Error> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM letter_templates WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        let templates = sqlx::query_as::<_, LetterTemplate>(&format!(
            "SELECT {} FROM letter_templates WHERE deleted_at IS NULL \
             ORDER BY updated_at DESC LIMIT $1 OFFSET $2",
            TEMPLATE_COLUMNS
        ))
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((templates, total))
    }

    pub async fn find_template(&self, id: Uuid) -> Result<Option<LetterTemplate>, sqlx::Error> {
        sqlx::query_as::<_, LetterTemplate>(&format!(
            "SELECT {} FROM letter_templates WHERE id = $1 AND deleted_at IS NULL",
            TEMPLATE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn create_template(
        &self,
        name: &str,
        template_path: &str,
        logo_url: Option<&str>,
        logo_public_id: Option<&str>,
    ) -> Result<LetterTemplate, sqlx::Error> {
        sqlx::query_as::<_, LetterTemplate>(&format!(
            "INSERT INTO letter_templates (id, name, template_path, use_logo, logo_url, logo_public_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            TEMPLATE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(template_path)
        .bind(logo_url.is_some())
        .bind(logo_url)
        .bind(logo_public_id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn update_template(
        &self,
        id: Uuid,
        changes: &TemplateChanges,
    ) -> Result<Option<LetterTemplate>, sqlx::Error> {
        sqlx::query_as::<_, LetterTemplate>(&format!(
            "UPDATE letter_templates SET \
                name = COALESCE($2, name), \
                template_path = COALESCE($3, template_path), \
                logo_url = COALESCE($4, logo_url), \
                logo_public_id = COALESCE($5, logo_public_id), \
                use_logo = COALESCE($4, logo_url) IS NOT NULL, \
                updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {}",
            TEMPLATE_COLUMNS
        ))
        .bind(id)
        .bind(changes.name.as_deref())
        .bind(changes.template_path.as_deref())
        .bind(changes.logo_url.as_deref())
        .bind(changes.logo_public_id.as_deref())
        .fetch_optional(&self.pool)
        .await
    }

    /// Tombstones the template. History rows keep pointing at it.
    pub async fn soft_delete_template(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE letter_templates SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TemplateStore for PgRepository {
    async fn get_template(&self, id: Uuid) -> Result<Option<LetterTemplate>, LetterError> {
        Ok(self.find_template(id).await?)
    }

    async fn read_template_file(&self, path: &str) -> Result<Vec<u8>, LetterError> {
        self.template_files
            .read_file(path)
            .await
            .map_err(LetterError::Storage)
    }
}
