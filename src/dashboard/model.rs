use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// One row label of a breakdown table and the citizens it selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    /// `umur` within `min..=max`.
    AgeBetween {
        label: &'static str,
        min: i32,
        max: i32,
    },
    /// `column = value`. `column` is always one of our own column names.
    Equals {
        label: &'static str,
        column: &'static str,
        value: &'static str,
    },
}

impl Criterion {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AgeBetween { label, .. } | Self::Equals { label, .. } => label,
        }
    }
}

const fn age(label: &'static str, min: i32, max: i32) -> Criterion {
    Criterion::AgeBetween { label, min, max }
}

const fn marriage(label: &'static str, value: &'static str) -> Criterion {
    Criterion::Equals {
        label,
        column: "status_perkawinan",
        value,
    }
}

const fn education(label: &'static str, value: &'static str) -> Criterion {
    Criterion::Equals {
        label,
        column: "pendidikan",
        value,
    }
}

pub const AGE_BRACKETS: &[Criterion] = &[
    age("0-4 th", 0, 4),
    age("5-11 th", 5, 11),
    age("12-17 th", 12, 17),
    age("18-25 th", 18, 25),
    age("26-45 th", 26, 45),
    age("46-65 th", 46, 65),
    age("65+ th", 66, i32::MAX),
];

pub const AGE_GROUPS: &[Criterion] = &[
    age("Balita (0-4)", 0, 4),
    age("Anak (5-11)", 5, 11),
    age("Remaja (12-17)", 12, 17),
    age("Pemuda (18-25)", 18, 25),
    age("Dewasa (26-45)", 26, 45),
    age("Lansia (46+)", 46, i32::MAX),
];

pub const MARRIAGE_STATUSES: &[Criterion] = &[
    marriage("Belum Kawin", "B"),
    marriage("Kawin", "S"),
    marriage("Pernah Kawin", "P"),
];

pub const EDUCATION_LEVELS: &[Criterion] = &[
    education("Tidak/Belum Sekolah", "TIDAK/BELUM SEKOLAH"),
    education("Belum Tamat SD/Sederajat", "BELUM TAMAT SD/SEDERAJAT"),
    education("Tamat SD/Sederajat", "TAMAT SD/SEDERAJAT"),
    education("SLTP/Sederajat", "SLTP/SEDERAJAT"),
    education("SLTA/Sederajat", "SLTA/SEDERAJAT"),
    education("Diploma I/II", "DIPLOMA I/II"),
    education(
        "Akademi/Diploma III/Sarjana Muda",
        "AKADEMI/DIPLOMA III/SARJANA MUDA",
    ),
    education("Diploma IV/Strata I", "DIPLOMA IV/STRATA I"),
    education("Strata II", "STRATA II"),
    education("Strata III", "STRATA III"),
];

/// Per-dusun tables shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Breakdown {
    Age,
    Marriage,
    Education,
}

impl Breakdown {
    pub fn criteria(self) -> &'static [Criterion] {
        match self {
            Self::Age => AGE_GROUPS,
            Self::Marriage => MARRIAGE_STATUSES,
            Self::Education => EDUCATION_LEVELS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct GenderStats {
    pub male: i64,
    pub female: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow, PartialEq, Eq)]
pub struct DusunCount {
    pub dusun: String,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_citizens: i64,
    pub total_families: i64,
    pub total_letters: i64,
    pub total_templates: i64,
    pub gender_stats: GenderStats,
    pub dusun_stats: Vec<DusunCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct AgeBracket {
    pub label: String,
    pub count: i64,
}

/// Male, female and overall counts of one table cell.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct GenderTotals {
    #[serde(rename = "L")]
    pub male: i64,
    #[serde(rename = "P")]
    pub female: i64,
    #[serde(rename = "JML")]
    pub total: i64,
}

impl std::ops::AddAssign for GenderTotals {
    fn add_assign(&mut self, other: Self) {
        self.male += other.male;
        self.female += other.female;
        self.total += other.total;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownLine {
    pub kriteria: String,
    /// One cell per entry of [`BreakdownTable::dusun`], then the row total.
    pub values: Vec<GenderTotals>,
    pub is_total: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BreakdownTable {
    pub dusun: Vec<String>,
    pub rows: Vec<BreakdownLine>,
}

/// Citizens counted per (criterion, dusun). `kriteria` is `None` for
/// citizens no criterion selects.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BucketCount {
    pub kriteria: Option<String>,
    pub dusun: String,
    pub male: i64,
    pub female: i64,
    pub total: i64,
}

impl BucketCount {
    fn totals(&self) -> GenderTotals {
        GenderTotals {
            male: self.male,
            female: self.female,
            total: self.total,
        }
    }
}

impl BreakdownTable {
    /// Lays `counts` out as one row per criterion plus a closing total row
    /// that also counts citizens outside every criterion.
    pub fn build(criteria: &[Criterion], counts: &[BucketCount]) -> Self {
        let mut dusun: Vec<String> = counts.iter().map(|c| c.dusun.clone()).collect();
        dusun.sort();
        dusun.dedup();

        let line = |kriteria: &str, is_total: bool, selected: &dyn Fn(&BucketCount) -> bool| {
            let mut values = vec![GenderTotals::default(); dusun.len() + 1];
            for count in counts.iter().filter(|c| selected(c)) {
                if let Ok(column) = dusun.binary_search(&count.dusun) {
                    values[column] += count.totals();
                }
                values[dusun.len()] += count.totals();
            }
            BreakdownLine {
                kriteria: kriteria.to_string(),
                values,
                is_total,
            }
        };

        let mut rows: Vec<BreakdownLine> = criteria
            .iter()
            .map(|criterion| {
                line(criterion.label(), false, &|c: &BucketCount| {
                    c.kriteria.as_deref() == Some(criterion.label())
                })
            })
            .collect();
        rows.push(line("Total", true, &|_: &BucketCount| true));

        Self { dusun, rows }
    }
}

/// Sums `counts` per criterion across all dusun.
pub fn collapse(criteria: &[Criterion], counts: &[BucketCount]) -> Vec<AgeBracket> {
    criteria
        .iter()
        .map(|criterion| AgeBracket {
            label: criterion.label().to_string(),
            count: counts
                .iter()
                .filter(|c| c.kriteria.as_deref() == Some(criterion.label()))
                .map(|c| c.total)
                .sum(),
        })
        .collect()
}

/// A citizen record with incomplete or malformed fields.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct CitizenWarning {
    pub id: Uuid,
    pub nama: String,
    pub nik: String,
    pub dusun: String,
    pub rt: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WarningSearch {
    /// Part of a name or NIK.
    pub search: Option<String>,
}

impl WarningSearch {
    pub fn term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}
