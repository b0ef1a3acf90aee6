use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::upload::{read_template_form, UploadedFile};
use crate::auth::{require_role, Role};
use crate::db::{AppState, TemplateChanges};
use crate::letter::converter::DOCX_MIME;
use crate::letter::fields::filename_slug;
use crate::letter::model::{LetterTemplate, Page, PageRequest};
use crate::storage::{ObjectStorage, StoredObject};

const STAFF: &[Role] = &[Role::Admin, Role::SuperAdmin];

#[derive(Serialize, ToSchema)]
pub struct TemplateResponse {
    pub message: String,
    pub template: LetterTemplate,
}

/// Multipart body of template create and update.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct TemplateUploadRequest {
    name: String,
    #[schema(value_type = String, format = Binary)]
    template: Vec<u8>,
    #[schema(value_type = Option<String>, format = Binary)]
    logo: Option<Vec<u8>>,
}

fn logo_store(state: &AppState) -> Result<&Arc<dyn ObjectStorage>, HttpResponse> {
    state.logo_storage.as_ref().ok_or_else(|| {
        HttpResponse::BadRequest().json(crate::ErrorResponse::bad_request(
            "Upload logo tidak tersedia karena penyimpanan gambar belum dikonfigurasi",
        ))
    })
}

async fn upload(
    storage: &Arc<dyn ObjectStorage>,
    file: &UploadedFile,
    prefix: &str,
) -> Result<StoredObject, HttpResponse> {
    storage
        .upload_file(&file.storage_name(prefix), &file.data)
        .await
        .map_err(|e| {
            log::error!("Failed to store {}: {}", file.original_name, e);
            HttpResponse::InternalServerError()
                .json(crate::ErrorResponse::internal_error("Gagal menyimpan file"))
        })
}

/// Best-effort removal of stored objects that are no longer referenced.
async fn discard(storage: &Arc<dyn ObjectStorage>, key: &str) {
    if let Err(e) = storage.delete_file(key).await {
        log::warn!("Failed to delete stored object {}: {}", key, e);
    }
}

/// List active templates
#[utoipa::path(
    get,
    path = "/api/templates",
    tag = "Templates",
    params(PageRequest),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Template page", body = Page<LetterTemplate>),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_templates(
    req: HttpRequest,
    state: web::Data<AppState>,
    page: web::Query<PageRequest>,
) -> impl Responder {
    if let Err(e) = require_role(&req, STAFF) {
        return e.error_response();
    }

    let page = page.into_inner().normalized();
    match state.repo.list_templates(page).await {
        Ok((templates, total)) => HttpResponse::Ok().json(Page::new(templates, total, page)),
        Err(e) => {
            log::error!("Failed to list templates: {:?}", e);
            HttpResponse::InternalServerError()
                .json(crate::ErrorResponse::internal_error("Terjadi kesalahan pada server"))
        }
    }
}

/// Get one template
#[utoipa::path(
    get,
    path = "/api/templates/{id}",
    tag = "Templates",
    params(("id" = Uuid, Path, description = "Template ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Template", body = LetterTemplate),
        (status = 404, description = "Template not found", body = crate::ErrorResponse)
    )
)]
pub async fn get_template(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> impl Responder {
    if let Err(e) = require_role(&req, STAFF) {
        return e.error_response();
    }

    match state.repo.find_template(path.into_inner()).await {
        Ok(Some(template)) => HttpResponse::Ok().json(template),
        Ok(None) => HttpResponse::NotFound()
            .json(crate::ErrorResponse::not_found("Template tidak ditemukan")),
        Err(e) => {
            log::error!("Failed to load template: {:?}", e);
            HttpResponse::InternalServerError()
                .json(crate::ErrorResponse::internal_error("Terjadi kesalahan pada server"))
        }
    }
}

/// Create a template from an uploaded Word document
#[utoipa::path(
    post,
    path = "/api/templates",
    tag = "Templates",
    request_body(content = TemplateUploadRequest, content_type = "multipart/form-data"),
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Template created", body = TemplateResponse),
        (status = 400, description = "Invalid form", body = crate::ErrorResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn create_template(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: Multipart,
) -> impl Responder {
    if let Err(e) = require_role(&req, STAFF) {
        return e.error_response();
    }

    let form = match read_template_form(payload).await {
        Ok(form) => form,
        Err(e) => return HttpResponse::BadRequest().json(crate::ErrorResponse::bad_request(&e)),
    };
    let Some(name) = form.name else {
        return HttpResponse::BadRequest()
            .json(crate::ErrorResponse::bad_request("Nama template harus diisi"));
    };
    let Some(template_file) = form.template else {
        return HttpResponse::BadRequest().json(crate::ErrorResponse::bad_request(
            "File template Word harus diupload",
        ));
    };

    let logo = match &form.logo {
        Some(file) => {
            let store = match logo_store(&state) {
                Ok(store) => store,
                Err(resp) => return resp,
            };
            match upload(store, file, "logo").await {
                Ok(stored) => Some(stored),
                Err(resp) => return resp,
            }
        }
        None => None,
    };

    let stored = match upload(&state.storage, &template_file, "template").await {
        Ok(stored) => stored,
        Err(resp) => {
            if let (Some(logo), Some(store)) = (&logo, &state.logo_storage) {
                discard(store, &logo.key).await;
            }
            return resp;
        }
    };

    match state
        .repo
        .create_template(
            &name,
            &stored.key,
            logo.as_ref().map(|l| l.url.as_str()),
            logo.as_ref().map(|l| l.key.as_str()),
        )
        .await
    {
        Ok(template) => {
            log::info!("Template {} created as {}", template.name, template.id);
            HttpResponse::Created().json(TemplateResponse {
                message: "Template berhasil dibuat".to_string(),
                template,
            })
        }
        Err(e) => {
            log::error!("Failed to create template: {:?}", e);
            discard(&state.storage, &stored.key).await;
            if let (Some(logo), Some(store)) = (&logo, &state.logo_storage) {
                discard(store, &logo.key).await;
            }
            HttpResponse::InternalServerError()
                .json(crate::ErrorResponse::internal_error("Terjadi kesalahan pada server"))
        }
    }
}

/// Update a template; uploaded files replace the stored ones
#[utoipa::path(
    put,
    path = "/api/templates/{id}",
    tag = "Templates",
    params(("id" = Uuid, Path, description = "Template ID")),
    request_body(content = TemplateUploadRequest, content_type = "multipart/form-data"),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Template updated", body = TemplateResponse),
        (status = 400, description = "Invalid form", body = crate::ErrorResponse),
        (status = 404, description = "Template not found", body = crate::ErrorResponse)
    )
)]
pub async fn update_template(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    payload: Multipart,
) -> impl Responder {
    if let Err(e) = require_role(&req, STAFF) {
        return e.error_response();
    }

    let id = path.into_inner();
    let existing = match state.repo.find_template(id).await {
        Ok(Some(template)) => template,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(crate::ErrorResponse::not_found("Template tidak ditemukan"))
        }
        Err(e) => {
            log::error!("Failed to load template {}: {:?}", id, e);
            return HttpResponse::InternalServerError()
                .json(crate::ErrorResponse::internal_error("Terjadi kesalahan pada server"));
        }
    };

    let form = match read_template_form(payload).await {
        Ok(form) => form,
        Err(e) => return HttpResponse::BadRequest().json(crate::ErrorResponse::bad_request(&e)),
    };

    let mut changes = TemplateChanges {
        name: form.name,
        ..Default::default()
    };

    let new_logo = match &form.logo {
        Some(file) => {
            let store = match logo_store(&state) {
                Ok(store) => store,
                Err(resp) => return resp,
            };
            match upload(store, file, "logo").await {
                Ok(stored) => Some(stored),
                Err(resp) => return resp,
            }
        }
        None => None,
    };
    if let Some(logo) = &new_logo {
        changes.logo_url = Some(logo.url.clone());
        changes.logo_public_id = Some(logo.key.clone());
    }

    let new_file = match &form.template {
        Some(file) => match upload(&state.storage, file, "template").await {
            Ok(stored) => Some(stored),
            Err(resp) => {
                if let (Some(logo), Some(store)) = (&new_logo, &state.logo_storage) {
                    discard(store, &logo.key).await;
                }
                return resp;
            }
        },
        None => None,
    };
    changes.template_path = new_file.as_ref().map(|f| f.key.clone());

    match state.repo.update_template(id, &changes).await {
        Ok(Some(template)) => {
            if let (Some(_), Some(old)) = (&new_file, &existing.template_path) {
                discard(&state.storage, old).await;
            }
            if let (Some(_), Some(old), Some(store)) =
                (&new_logo, &existing.logo_public_id, &state.logo_storage)
            {
                discard(store, old).await;
            }
            log::info!("Template {} updated", id);
            HttpResponse::Ok().json(TemplateResponse {
                message: "Template berhasil diupdate".to_string(),
                template,
            })
        }
        result => {
            if let Err(e) = &result {
                log::error!("Failed to update template {}: {:?}", id, e);
            }
            if let Some(file) = &new_file {
                discard(&state.storage, &file.key).await;
            }
            if let (Some(logo), Some(store)) = (&new_logo, &state.logo_storage) {
                discard(store, &logo.key).await;
            }
            match result {
                Ok(_) => HttpResponse::NotFound()
                    .json(crate::ErrorResponse::not_found("Template tidak ditemukan")),
                Err(_) => HttpResponse::InternalServerError()
                    .json(crate::ErrorResponse::internal_error("Terjadi kesalahan pada server")),
            }
        }
    }
}

/// Soft-delete a template
#[utoipa::path(
    delete,
    path = "/api/templates/{id}",
    tag = "Templates",
    params(("id" = Uuid, Path, description = "Template ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Template deleted"),
        (status = 404, description = "Template not found", body = crate::ErrorResponse)
    )
)]
pub async fn delete_template(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> impl Responder {
    if let Err(e) = require_role(&req, STAFF) {
        return e.error_response();
    }

    let id = path.into_inner();
    match state.repo.soft_delete_template(id).await {
        Ok(true) => {
            log::info!("Template {} deleted", id);
            HttpResponse::Ok().json(serde_json::json!({ "message": "Template berhasil dihapus" }))
        }
        Ok(false) => HttpResponse::NotFound()
            .json(crate::ErrorResponse::not_found("Template tidak ditemukan")),
        Err(e) => {
            log::error!("Failed to delete template {}: {:?}", id, e);
            HttpResponse::InternalServerError()
                .json(crate::ErrorResponse::internal_error("Terjadi kesalahan pada server"))
        }
    }
}

/// Download the Word document behind a template
#[utoipa::path(
    get,
    path = "/api/templates/{id}/file",
    tag = "Templates",
    params(("id" = Uuid, Path, description = "Template ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Template document", content_type = "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        (status = 404, description = "Template or file not found", body = crate::ErrorResponse)
    )
)]
pub async fn download_template_file(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> impl Responder {
    if let Err(e) = require_role(&req, STAFF) {
        return e.error_response();
    }

    let template = match state.repo.find_template(path.into_inner()).await {
        Ok(Some(template)) => template,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(crate::ErrorResponse::not_found("Template tidak ditemukan"))
        }
        Err(e) => {
            log::error!("Failed to load template: {:?}", e);
            return HttpResponse::InternalServerError()
                .json(crate::ErrorResponse::internal_error("Failed to get template file"));
        }
    };
    let Some(key) = template.template_path.as_deref() else {
        return HttpResponse::NotFound()
            .json(crate::ErrorResponse::not_found("File template surat tidak ditemukan"));
    };

    match state.storage.read_file(key).await {
        Ok(bytes) => HttpResponse::Ok()
            .content_type(DOCX_MIME)
            .insert_header((
                header::CONTENT_DISPOSITION,
                format!(
                    "attachment; filename=\"{}.docx\"",
                    filename_slug(&template.name, "template")
                ),
            ))
            .body(bytes),
        Err(e) => {
            log::error!("Failed to read template file {}: {}", key, e);
            HttpResponse::InternalServerError()
                .json(crate::ErrorResponse::internal_error("Failed to get template file"))
        }
    }
}

/// Configure template routes
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/templates")
            .route("", web::get().to(list_templates))
            .route("", web::post().to(create_template))
            .route("/{id}", web::get().to(get_template))
            .route("/{id}", web::put().to(update_template))
            .route("/{id}", web::delete().to(delete_template))
            .route("/{id}/file", web::get().to(download_template_file)),
    );
}
