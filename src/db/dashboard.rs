//! Read-only aggregations over citizens and letters

use sqlx::{Postgres, QueryBuilder};

use super::citizen::escape_like;
use super::PgRepository;
use crate::dashboard::model::{
    collapse, AgeBracket, BreakdownTable, BucketCount, CitizenWarning, DashboardSummary,
    DusunCount, GenderStats, WarningSearch, AGE_BRACKETS,
};
use crate::dashboard::{Breakdown, Criterion};
use crate::letter::model::{Page, PageRequest};

const DUSUN_EXPR: &str = "COALESCE(NULLIF(TRIM(dusun), ''), '-')";

/// Field checks behind the citizen warning list, as (condition, message).
const WARNING_CHECKS: &[(&str, &str)] = &[
    ("LENGTH(TRIM(no_kk)) <> 16", "Nomor KK tidak valid"),
    ("LENGTH(TRIM(nik)) <> 16", "NIK tidak valid"),
    ("LENGTH(TRIM(nama)) < 3", "Nama tidak valid"),
    ("TRIM(tempat_lahir) = ''", "Tempat Lahir kosong"),
    ("tanggal_lahir IS NULL", "Tanggal Lahir kosong"),
    (
        "status_perkawinan NOT IN ('B', 'S', 'P')",
        "Status Perkawinan tidak valid",
    ),
    ("jenis_kelamin NOT IN ('L', 'P')", "Jenis Kelamin tidak valid"),
    ("TRIM(dusun) IN ('', '-')", "Dusun kosong"),
    ("TRIM(rt) = ''", "RT kosong"),
    ("TRIM(nama_ibu) = ''", "Nama Ibu kosong"),
    ("TRIM(nama_ayah) = ''", "Nama Ayah kosong"),
    ("TRIM(agama) = ''", "Agama kosong"),
    ("TRIM(pendidikan) = ''", "Pendidikan kosong"),
    ("TRIM(pekerjaan) = ''", "Pekerjaan kosong"),
];

#[derive(sqlx::FromRow)]
struct SummaryCounts {
    total_citizens: i64,
    total_families: i64,
    total_letters: i64,
    total_templates: i64,
    male: i64,
    female: i64,
}

/// Counts citizens per (criterion, dusun) split by gender.
fn bucket_query(criteria: &[Criterion]) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT ");
    if criteria.is_empty() {
        builder.push("NULL::text");
    } else {
        builder.push("CASE");
        for criterion in criteria {
            match *criterion {
                Criterion::AgeBetween { label, min, max } => {
                    builder
                        .push(" WHEN umur BETWEEN ")
                        .push_bind(min)
                        .push(" AND ")
                        .push_bind(max)
                        .push(" THEN ")
                        .push_bind(label);
                }
                Criterion::Equals {
                    label,
                    column,
                    value,
                } => {
                    builder
                        .push(format!(" WHEN {} = ", column))
                        .push_bind(value)
                        .push(" THEN ")
                        .push_bind(label);
                }
            }
        }
        builder.push(" END");
    }
    builder.push(format!(
        " AS kriteria, {} AS dusun, \
         COUNT(*) FILTER (WHERE jenis_kelamin = 'L') AS male, \
         COUNT(*) FILTER (WHERE jenis_kelamin = 'P') AS female, \
         COUNT(*) AS total \
         FROM citizens GROUP BY 1, 2",
        DUSUN_EXPR
    ));
    builder
}

fn warnings_expr() -> String {
    let cases: Vec<String> = WARNING_CHECKS
        .iter()
        .map(|(condition, message)| format!("CASE WHEN {} THEN '{}' END", condition, message))
        .collect();
    format!("array_remove(ARRAY[{}], NULL)", cases.join(", "))
}

/// Builds `<select> FROM checked ...` over citizens with at least one warning.
fn warning_query(select: &str, search: Option<&str>) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "WITH checked AS (SELECT id, nama, nik, dusun, rt, {} AS warnings FROM citizens) \
         {} FROM checked WHERE cardinality(warnings) > 0",
        warnings_expr(),
        select
    ));
    if let Some(term) = search {
        let pattern = format!("%{}%", escape_like(term));
        builder
            .push(" AND (nama ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR nik ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    builder
}

impl PgRepository {
    pub async fn dashboard_summary(&self) -> Result<DashboardSummary, sqlx::Error> {
        let counts = sqlx::query_as::<_, SummaryCounts>(
            "SELECT \
             (SELECT COUNT(*) FROM citizens) AS total_citizens, \
             (SELECT COUNT(DISTINCT no_kk) FROM citizens) AS total_families, \
             (SELECT COUNT(*) FROM letters) AS total_letters, \
             (SELECT COUNT(*) FROM letter_templates WHERE deleted_at IS NULL) AS total_templates, \
             (SELECT COUNT(*) FROM citizens WHERE jenis_kelamin = 'L') AS male, \
             (SELECT COUNT(*) FROM citizens WHERE jenis_kelamin = 'P') AS female",
        )
        .fetch_one(&self.pool)
        .await?;

        let dusun_stats = sqlx::query_as::<_, DusunCount>(&format!(
            "SELECT {0} AS dusun, COUNT(*) AS total FROM citizens GROUP BY 1 ORDER BY 1",
            DUSUN_EXPR
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(DashboardSummary {
            total_citizens: counts.total_citizens,
            total_families: counts.total_families,
            total_letters: counts.total_letters,
            total_templates: counts.total_templates,
            gender_stats: GenderStats {
                male: counts.male,
                female: counts.female,
            },
            dusun_stats,
        })
    }

    async fn bucket_counts(&self, criteria: &[Criterion]) -> Result<Vec<BucketCount>, sqlx::Error> {
        bucket_query(criteria)
            .build_query_as::<BucketCount>()
            .fetch_all(&self.pool)
            .await
    }

    pub async fn age_distribution(&self) -> Result<Vec<AgeBracket>, sqlx::Error> {
        let counts = self.bucket_counts(AGE_BRACKETS).await?;
        Ok(collapse(AGE_BRACKETS, &counts))
    }

    pub async fn breakdown(&self, breakdown: Breakdown) -> Result<BreakdownTable, sqlx::Error> {
        let criteria = breakdown.criteria();
        let counts = self.bucket_counts(criteria).await?;
        Ok(BreakdownTable::build(criteria, &counts))
    }

    pub async fn citizen_warnings(
        &self,
        search: &WarningSearch,
        page: PageRequest,
    ) -> Result<Page<CitizenWarning>, sqlx::Error> {
        let page = page.normalized();

        let total: i64 = warning_query("SELECT COUNT(*)", search.term())
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut select = warning_query("SELECT id, nama, nik, dusun, rt, warnings", search.term());
        select
            .push(" ORDER BY nama ASC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = select
            .build_query_as::<CitizenWarning>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(rows, total, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::model::MARRIAGE_STATUSES;

    #[test]
    fn test_bucket_query_for_age() {
        let builder = bucket_query(&AGE_BRACKETS[..2]);
        assert_eq!(
            builder.sql(),
            "SELECT CASE WHEN umur BETWEEN $1 AND $2 THEN $3 WHEN umur BETWEEN $4 AND $5 THEN $6 END \
             AS kriteria, COALESCE(NULLIF(TRIM(dusun), ''), '-') AS dusun, \
             COUNT(*) FILTER (WHERE jenis_kelamin = 'L') AS male, \
             COUNT(*) FILTER (WHERE jenis_kelamin = 'P') AS female, \
             COUNT(*) AS total FROM citizens GROUP BY 1, 2"
        );
    }

    #[test]
    fn test_bucket_query_binds_values() {
        let builder = bucket_query(MARRIAGE_STATUSES);
        let sql = builder.sql();
        assert!(sql.starts_with("SELECT CASE WHEN status_perkawinan = $1 THEN $2"));
        assert!(sql.contains("WHEN status_perkawinan = $5 THEN $6 END"));
        assert!(!sql.contains("'B'"));
    }

    #[test]
    fn test_warning_query_lists_every_check() {
        let builder = warning_query("SELECT COUNT(*)", None);
        let sql = builder.sql();
        for (_, message) in WARNING_CHECKS {
            assert!(sql.contains(&format!("THEN '{}' END", message)));
        }
        assert!(sql.ends_with("SELECT COUNT(*) FROM checked WHERE cardinality(warnings) > 0"));
        assert!(!sql.contains('$'));
    }

    #[test]
    fn test_warning_query_search_is_bound() {
        let builder = warning_query("SELECT COUNT(*)", Some("bud_i"));
        assert!(builder
            .sql()
            .ends_with("cardinality(warnings) > 0 AND (nama ILIKE $1 OR nik ILIKE $2)"));
    }
}
