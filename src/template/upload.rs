//! Multipart parsing for template create/update forms.

use std::io::Cursor;
use std::path::Path;

use actix_multipart::Multipart;
use futures_util::TryStreamExt;
use sanitize_filename::sanitize;
use uuid::Uuid;

pub const MAX_TEMPLATE_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_LOGO_BYTES: usize = 2 * 1024 * 1024;
const MAX_TEXT_BYTES: usize = 4 * 1024;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub extension: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    /// Collision-free storage name keeping the original extension.
    pub fn storage_name(&self, prefix: &str) -> String {
        format!("{}-{}.{}", prefix, Uuid::new_v4(), self.extension)
    }
}

#[derive(Debug, Default)]
pub struct TemplateForm {
    pub name: Option<String>,
    pub template: Option<UploadedFile>,
    pub logo: Option<UploadedFile>,
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Checks that `data` is an OOXML word-processing package.
pub fn is_word_package(data: &[u8]) -> bool {
    zip::ZipArchive::new(Cursor::new(data))
        .map(|archive| archive.index_for_name("word/document.xml").is_some())
        .unwrap_or(false)
}

pub fn validate_template(file: &UploadedFile) -> Result<(), String> {
    if file.extension != "docx" {
        return Err("Hanya file Word (.docx) yang diperbolehkan!".to_string());
    }
    if !is_word_package(&file.data) {
        return Err("File template bukan dokumen Word yang valid".to_string());
    }
    Ok(())
}

pub fn validate_logo(file: &UploadedFile) -> Result<(), String> {
    match file.extension.as_str() {
        "jpg" | "jpeg" | "png" => Ok(()),
        _ => Err("Hanya file gambar (jpg, jpeg, png) yang diperbolehkan!".to_string()),
    }
}

async fn read_field(
    field: &mut actix_multipart::Field,
    limit: usize,
    too_large: &str,
) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(|e| e.to_string())? {
        if bytes.len() + chunk.len() > limit {
            return Err(too_large.to_string());
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Reads the `name`, `template` and `logo` fields. Unknown fields are skipped
/// and size limits are enforced while streaming.
pub async fn read_template_form(mut payload: Multipart) -> Result<TemplateForm, String> {
    let mut form = TemplateForm::default();

    while let Some(mut field) = payload.try_next().await.map_err(|e| e.to_string())? {
        let content_disposition = field
            .content_disposition()
            .ok_or("Content-Disposition not set")?
            .clone();
        let field_name = content_disposition
            .get_name()
            .ok_or_else(|| "No field name".to_string())?;

        match field_name {
            "name" => {
                let bytes = read_field(&mut field, MAX_TEXT_BYTES, "Nama template terlalu panjang")
                    .await?;
                let value = String::from_utf8(bytes).map_err(|e| e.to_string())?;
                form.name = Some(value.trim().to_string()).filter(|v| !v.is_empty());
            }
            "template" | "logo" => {
                let original_name = sanitize(content_disposition.get_filename().unwrap_or(""));
                let (limit, too_large) = if field_name == "logo" {
                    (MAX_LOGO_BYTES, "Ukuran logo tidak boleh lebih dari 2MB")
                } else {
                    (MAX_TEMPLATE_BYTES, "Ukuran file template tidak boleh lebih dari 10MB")
                };
                let data = read_field(&mut field, limit, too_large).await?;
                let file = UploadedFile {
                    extension: extension_of(&original_name),
                    original_name,
                    data,
                };
                if field_name == "logo" {
                    validate_logo(&file)?;
                    form.logo = Some(file);
                } else {
                    validate_template(&file)?;
                    form.template = Some(file);
                }
            }
            other => {
                log::debug!("Ignoring multipart field {}", other);
            }
        }
    }

    Ok(form)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) fn minimal_docx() -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer
            .write_all(br#"<w:document><w:body><w:p><w:r><w:t>{nama}</w:t></w:r></w:p></w:body></w:document>"#)
            .unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn file(name: &str, data: Vec<u8>) -> UploadedFile {
        UploadedFile {
            original_name: name.to_string(),
            extension: extension_of(name),
            data,
        }
    }

    #[test]
    fn test_template_must_be_docx_package() {
        assert!(validate_template(&file("SKU.DOCX", minimal_docx())).is_ok());
        assert!(validate_template(&file("sku.doc", minimal_docx())).is_err());
        assert!(validate_template(&file("sku.docx", b"not a zip".to_vec())).is_err());
    }

    #[test]
    fn test_logo_extensions() {
        assert!(validate_logo(&file("logo.png", vec![])).is_ok());
        assert!(validate_logo(&file("logo.JPEG", vec![])).is_ok());
        assert!(validate_logo(&file("logo.gif", vec![])).is_err());
        assert!(validate_logo(&file("logo", vec![])).is_err());
    }

    #[test]
    fn test_storage_name_keeps_extension() {
        let name = file("Surat Usaha.docx", vec![]).storage_name("template");
        assert!(name.starts_with("template-"));
        assert!(name.ends_with(".docx"));
        assert_eq!(sanitize(&name), name);
    }
}
