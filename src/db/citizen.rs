//! Citizen lookups

use async_trait::async_trait;
use uuid::Uuid;

use super::PgRepository;
use crate::letter::model::Citizen;
use crate::letter::store::CitizenDirectory;
use crate::letter::LetterError;

const SEARCH_LIMIT: i64 = 20;

impl PgRepository {
    pub async fn find_citizen(&self, id: Uuid) -> Result<Option<Citizen>, sqlx::Error> {
        sqlx::query_as::<_, Citizen>("SELECT * FROM citizens WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_citizen_by_nik(&self, nik: &str) -> Result<Option<Citizen>, sqlx::Error> {
        sqlx::query_as::<_, Citizen>("SELECT * FROM citizens WHERE nik = $1")
            .bind(nik)
            .fetch_optional(&self.pool)
            .await
    }

    /// Name or NIK match for the letter form's citizen picker.
    pub async fn search_citizens(&self, term: &str) -> Result<Vec<Citizen>, sqlx::Error> {
        let pattern = format!("%{}%", escape_like(term.trim()));
        sqlx::query_as::<_, Citizen>(
            "SELECT * FROM citizens WHERE nama ILIKE $1 OR nik LIKE $1 \
             ORDER BY nama LIMIT $2",
        )
        .bind(pattern)
        .bind(SEARCH_LIMIT)
        .fetch_all(&self.pool)
        .await
    }
}

/// Escapes LIKE wildcards so user input matches literally.
pub(crate) fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[async_trait]
impl CitizenDirectory for PgRepository {
    async fn get_citizen(&self, id: Uuid) -> Result<Option<Citizen>, LetterError> {
        Ok(self.find_citizen(id).await?)
    }

    async fn get_citizen_by_nik(&self, nik: &str) -> Result<Option<Citizen>, LetterError> {
        Ok(self.find_citizen_by_nik(nik).await?)
    }

    async fn find_parent_occupation(
        &self,
        no_kk: &str,
        name: &str,
    ) -> Result<Option<String>, LetterError> {
        let occupation: Option<String> = sqlx::query_scalar(
            "SELECT pekerjaan FROM citizens WHERE no_kk = $1 AND nama = $2 LIMIT 1",
        )
        .bind(no_kk)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(occupation)
    }
}
