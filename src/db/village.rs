//! Village profile, read through a short-lived cache

use async_trait::async_trait;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{PgRepository, VILLAGE_CACHE_KEY};
use crate::letter::model::VillageInfo;
use crate::letter::store::VillageDirectory;
use crate::letter::LetterError;

const VILLAGE_COLUMNS: &str = "id, village_name, district_name, regency_name, address, phone, \
     email, head_name, head_position, signature_path";

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VillageUpdate {
    pub village_name: String,
    pub district_name: String,
    pub regency_name: String,
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    pub head_name: String,
    pub head_position: String,
}

impl VillageUpdate {
    /// Names of required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("village_name", &self.village_name),
            ("district_name", &self.district_name),
            ("regency_name", &self.regency_name),
            ("address", &self.address),
            ("head_name", &self.head_name),
            ("head_position", &self.head_position),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

impl PgRepository {
    pub async fn find_village_info(&self) -> Result<Option<VillageInfo>, sqlx::Error> {
        if let Some(info) = self.village_cache.get(VILLAGE_CACHE_KEY).await {
            log::debug!("Village info served from cache");
            return Ok(Some(info));
        }

        let info = sqlx::query_as::<_, VillageInfo>(&format!(
            "SELECT {} FROM village_info ORDER BY updated_at DESC LIMIT 1",
            VILLAGE_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(info) = &info {
            self.village_cache
                .insert(VILLAGE_CACHE_KEY, info.clone())
                .await;
        }
        Ok(info)
    }

    /// Updates the singleton row, creating it on first use.
    pub async fn save_village_info(
        &self,
        update: &VillageUpdate,
    ) -> Result<VillageInfo, sqlx::Error> {
        let existing: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM village_info ORDER BY updated_at DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;

        let sql = match existing {
            Some(_) => format!(
                "UPDATE village_info SET village_name = $2, district_name = $3, regency_name = $4, \
                 address = $5, phone = $6, email = $7, head_name = $8, head_position = $9, \
                 updated_at = NOW() WHERE id = $1 RETURNING {}",
                VILLAGE_COLUMNS
            ),
            None => format!(
                "INSERT INTO village_info (id, village_name, district_name, regency_name, address, \
                 phone, email, head_name, head_position) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
                VILLAGE_COLUMNS
            ),
        };

        let info = sqlx::query_as::<_, VillageInfo>(&sql)
            .bind(existing.unwrap_or_else(Uuid::new_v4))
            .bind(&update.village_name)
            .bind(&update.district_name)
            .bind(&update.regency_name)
            .bind(&update.address)
            .bind(&update.phone)
            .bind(&update.email)
            .bind(&update.head_name)
            .bind(&update.head_position)
            .fetch_one(&self.pool)
            .await?;

        self.village_cache.invalidate(VILLAGE_CACHE_KEY).await;
        log::info!("Village info updated");
        Ok(info)
    }
}

#[async_trait]
impl VillageDirectory for PgRepository {
    async fn get_village_info(&self) -> Result<Option<VillageInfo>, LetterError> {
        Ok(self.find_village_info().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_reports_blank_required_values() {
        let update: VillageUpdate = serde_json::from_value(serde_json::json!({
            "village_name": "Rejomulyo",
            "district_name": " ",
            "regency_name": "Klaten",
            "address": "Jl. Raya 1",
            "head_name": "",
            "head_position": "Kepala Desa"
        }))
        .unwrap();
        assert_eq!(update.missing_fields(), vec!["district_name", "head_name"]);
        assert_eq!(update.phone, "");
    }
}
