//! Printed-letter history

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::citizen::escape_like;
use super::PgRepository;
use crate::letter::model::{
    HistoryEntry, HistoryFilter, LetterStats, MonthlyCount, NewHistoryEntry, Page, PageRequest,
    TemplateUsage,
};
use crate::letter::store::HistoryLog;
use crate::letter::LetterError;

const HISTORY_SELECT: &str = "SELECT l.id, l.template_id, t.name AS template_name, l.nik, \
     l.full_name, l.printed_by, u.full_name AS printed_by_name, l.created_at \
     FROM letters l \
     LEFT JOIN letter_templates t ON t.id = l.template_id \
     LEFT JOIN users u ON u.id = l.printed_by";

/// Appends the WHERE clause for `filter` to a query over `letters l`.
fn push_history_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &HistoryFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(term) = filter.search_term() {
        let pattern = format!("%{}%", escape_like(term));
        builder
            .push(" AND (l.nik ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR l.full_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR t.name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(start) = filter.start_date {
        builder.push(" AND l.created_at::date >= ").push_bind(start);
    }
    if let Some(end) = filter.end_date {
        builder.push(" AND l.created_at::date <= ").push_bind(end);
    }
    if let Some(template_id) = filter.template_id {
        builder.push(" AND l.template_id = ").push_bind(template_id);
    }
}

#[async_trait]
impl HistoryLog for PgRepository {
    async fn append(&self, entry: NewHistoryEntry) -> Result<HistoryEntry, LetterError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO letters (id, template_id, nik, full_name, printed_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(entry.template_id)
        .bind(&entry.nik)
        .bind(&entry.full_name)
        .bind(entry.printed_by)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| LetterError::Storage(format!("history entry {} vanished", id)))
    }

    async fn query(
        &self,
        filter: &HistoryFilter,
        page: PageRequest,
    ) -> Result<Page<HistoryEntry>, LetterError> {
        let page = page.normalized();

        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM letters l LEFT JOIN letter_templates t ON t.id = l.template_id",
        );
        push_history_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(HISTORY_SELECT);
        push_history_filter(&mut select, filter);
        select
            .push(" ORDER BY l.created_at DESC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset());
        let entries = select
            .build_query_as::<HistoryEntry>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(entries, total, page))
    }

    async fn get(&self, id: Uuid) -> Result<Option<HistoryEntry>, LetterError> {
        let entry = sqlx::query_as::<_, HistoryEntry>(&format!("{} WHERE l.id = $1", HISTORY_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entry)
    }

    async fn stats(&self) -> Result<LetterStats, LetterError> {
        let template_stats = sqlx::query_as::<_, TemplateUsage>(
            "SELECT t.id AS template_id, t.name, COUNT(l.id) AS count \
             FROM letter_templates t LEFT JOIN letters l ON l.template_id = t.id \
             WHERE t.deleted_at IS NULL \
             GROUP BY t.id, t.name ORDER BY count DESC, t.name",
        )
        .fetch_all(&self.pool)
        .await?;

        let monthly_stats = sqlx::query_as::<_, MonthlyCount>(
            "SELECT to_char(date_trunc('month', created_at), 'YYYY-MM') AS month, COUNT(*) AS count \
             FROM letters WHERE created_at >= date_trunc('month', NOW()) - INTERVAL '11 months' \
             GROUP BY 1 ORDER BY 1",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(LetterStats {
            template_stats,
            monthly_stats,
        })
    }
}
