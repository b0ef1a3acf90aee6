//! Token map construction and Indonesian display formatting.

use std::collections::BTreeMap;

use chrono::{Datelike, Local, NaiveDate};

use super::model::{Citizen, VillageInfo};

const MONTHS: [&str; 12] = [
    "Januari",
    "Februari",
    "Maret",
    "April",
    "Mei",
    "Juni",
    "Juli",
    "Agustus",
    "September",
    "Oktober",
    "November",
    "Desember",
];

/// Flat token name to display string mapping fed to the renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataMap(BTreeMap<String, String>);

impl DataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn extend(&mut self, other: DataMap) {
        self.0.extend(other.0);
    }

    /// Adds the combined tokens built from primitive fields, leaving any value
    /// the caller already supplied untouched.
    pub fn with_composites(mut self) -> Self {
        let composites = [
            (
                "tempat_tanggal_lahir",
                self.pair("tempat_lahir", "tanggal_lahir")
                    .map(|(place, date)| format!("{}, {}", place, date)),
            ),
            (
                "alamat",
                self.pair("dusun", "rt")
                    .map(|(dusun, rt)| format!("{} RT {}", dusun, rt)),
            ),
            (
                "nama_orang_tua",
                self.pair("nama_ayah", "nama_ibu")
                    .map(|(ayah, ibu)| format!("{} / {}", ayah, ibu)),
            ),
        ];

        for (key, value) in composites {
            if let Some(value) = value {
                self.0.entry(key.to_string()).or_insert(value);
            }
        }
        self
    }

    fn pair(&self, a: &str, b: &str) -> Option<(&str, &str)> {
        Some((self.get(a)?, self.get(b)?))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DataMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Long date, e.g. "19 Oktober 2026".
pub fn format_long_date(date: NaiveDate) -> String {
    let month = MONTHS[(date.month0() as usize).min(MONTHS.len() - 1)];
    format!("{} {} {}", date.day(), month, date.year())
}

/// Short date as printed by the id-ID locale, e.g. "5/1/1990".
pub fn format_short_date(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.day(), date.month(), date.year())
}

/// Today's date in the server's local timezone.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn yes_no(value: bool) -> &'static str {
    if value {
        "Ya"
    } else {
        "Tidak"
    }
}

pub fn gender_label(code: &str) -> &'static str {
    if code.trim().eq_ignore_ascii_case("L") {
        "Laki-laki"
    } else {
        "Perempuan"
    }
}

pub fn marital_status_label(code: &str) -> String {
    match code.trim() {
        "B" => "Belum Kawin".to_string(),
        "S" => "Sudah Kawin".to_string(),
        "P" => "Pernah Kawin".to_string(),
        other => other.to_string(),
    }
}

/// Primitive citizen tokens. Composite tokens are added by the renderer.
pub fn citizen_fields(citizen: &Citizen, parent_occupation: &str) -> DataMap {
    let mut map = DataMap::new();
    map.insert("nik", citizen.nik.as_str());
    map.insert("no_kk", citizen.no_kk.as_str());
    map.insert("nama", citizen.nama.as_str());
    map.insert("tempat_lahir", citizen.tempat_lahir.as_str());
    map.insert(
        "tanggal_lahir",
        citizen.tanggal_lahir.map(format_short_date).unwrap_or_default(),
    );
    map.insert(
        "umur",
        citizen.umur.map(|u| u.to_string()).unwrap_or_default(),
    );
    map.insert("jenis_kelamin", gender_label(&citizen.jenis_kelamin));
    map.insert(
        "status_perkawinan",
        marital_status_label(&citizen.status_perkawinan),
    );
    map.insert("dusun", citizen.dusun.as_str());
    map.insert("rt", citizen.rt.as_str());
    map.insert("nama_ibu", citizen.nama_ibu.as_str());
    map.insert("nama_ayah", citizen.nama_ayah.as_str());
    map.insert(
        "status_hubungan_keluarga",
        citizen.status_hubungan_keluarga.as_str(),
    );
    map.insert("agama", citizen.agama.as_str());
    map.insert("pendidikan", citizen.pendidikan.as_str());
    map.insert("pekerjaan", citizen.pekerjaan.as_str());
    map.insert("pekerjaan_orang_tua", parent_occupation);
    map.insert("status_mandiri", yes_no(citizen.status_mandiri));
    map.insert("status_pt", yes_no(citizen.status_pt));
    map.insert("status_belum", yes_no(citizen.status_belum));
    map.insert(
        "created_at",
        format_short_date(citizen.created_at.date_naive()),
    );
    map.insert(
        "updated_at",
        format_short_date(citizen.updated_at.date_naive()),
    );
    map
}

pub fn village_fields(village: &VillageInfo) -> DataMap {
    let mut map = DataMap::new();
    map.insert("village_name", village.village_name.to_uppercase());
    map.insert("district_name", village.district_name.to_uppercase());
    map.insert("regency_name", village.regency_name.to_uppercase());
    map.insert("address", village.address.as_str());
    map.insert("village_address", village.address.to_uppercase());
    map.insert("village_phone", village.phone.as_str());
    map.insert("village_email", village.email.as_str());
    map.insert("head_name", village.head_name.to_uppercase());
    map.insert("head_position", village.head_position.to_uppercase());
    map.insert(
        "signature_path",
        village.signature_path.clone().unwrap_or_default(),
    );
    map
}

/// Full token map for one letter; `tanggal_surat` is taken from `today`.
pub fn letter_data_map(
    citizen: &Citizen,
    village: &VillageInfo,
    parent_occupation: &str,
    today: NaiveDate,
) -> DataMap {
    let mut map = citizen_fields(citizen, parent_occupation);
    map.extend(village_fields(village));
    map.insert("nomor_surat", "");
    map.insert("tanggal_surat", format_long_date(today));
    map
}

/// Lower-case filename slug. Path separators and reserved characters are
/// removed by `sanitize-filename`, then the remaining words are joined by `-`.
pub fn filename_slug(name: &str, fallback: &str) -> String {
    let cleaned = sanitize_filename::sanitize(name.trim());
    let words: Vec<String> = cleaned
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .map(|word| {
            word.chars()
                .filter(char::is_ascii_alphanumeric)
                .map(|c| c.to_ascii_lowercase())
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect();

    if words.is_empty() {
        fallback.to_string()
    } else {
        words.join("-")
    }
}
