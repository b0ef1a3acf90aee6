mod common;

use std::io::{Cursor, Read};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use common::{app_state, bearer, MemoryRegistry, StubConverter, FAKE_PDF};
use desa_admin_server::auth::Role;
use desa_admin_server::letter::handlers::PreviewResponse;
use desa_admin_server::letter::model::{HistoryEntry, LetterStats, Page};
use desa_admin_server::ErrorResponse;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn document_xml(docx: &[u8]) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(docx)).unwrap();
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();
    xml
}

macro_rules! init_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .service(web::scope("/api").configure(desa_admin_server::routes)),
        )
        .await
    };
}

#[actix_web::test]
async fn test_generate_requires_token() {
    let registry = Arc::new(MemoryRegistry::with_template(&["{nama}"]));
    let converter = Arc::new(StubConverter::default());
    let app = init_app!(app_state(registry.clone(), converter.clone(), Duration::from_secs(5)));

    let req = test::TestRequest::post()
        .uri("/api/letters/generate")
        .set_json(json!({ "templateId": registry.template_id(), "citizenId": registry.citizen_id() }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(converter.calls(), 0);
    assert_eq!(registry.history_len(), 0);
}

#[actix_web::test]
async fn test_generate_returns_pdf_and_records_history() {
    let registry = Arc::new(MemoryRegistry::with_template(&[
        "Yang bertanda tangan di bawah ini menerangkan bahwa:",
        "Nama: {nama}",
        "NIK: {nik}",
    ]));
    let converter = Arc::new(StubConverter::default());
    let app = init_app!(app_state(registry.clone(), converter.clone(), Duration::from_secs(5)));
    let user_id = Uuid::new_v4();

    let req = test::TestRequest::post()
        .uri("/api/letters/generate")
        .insert_header((header::AUTHORIZATION, bearer(Role::Admin, user_id)))
        .set_json(json!({ "templateId": registry.template_id(), "citizenId": registry.citizen_id() }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/pdf"
    );
    let disposition = resp
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("inline;"));
    assert!(disposition.contains("surat-keterangan-domisili"));
    let body = test::read_body(resp).await;
    assert_eq!(&body[..], FAKE_PDF);

    // The converter received the filled document.
    let docx = converter.last_docx.lock().unwrap().clone().unwrap();
    let xml = document_xml(&docx);
    assert!(xml.contains("Nama: BUDI"));
    assert!(xml.contains("NIK: 1234567890123456"));
    assert!(xml.contains("Yang bertanda tangan di bawah ini menerangkan bahwa:"));

    let history = registry.history.lock().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].template_id, registry.template_id());
    assert_eq!(history[0].nik, "1234567890123456");
    assert_eq!(history[0].printed_by, user_id);
}

#[actix_web::test]
async fn test_preview_returns_data_uri_without_history() {
    let registry = Arc::new(MemoryRegistry::with_template(&["{nama}"]));
    let converter = Arc::new(StubConverter::default());
    let app = init_app!(app_state(registry.clone(), converter.clone(), Duration::from_secs(5)));

    let req = test::TestRequest::post()
        .uri("/api/letters/preview")
        .insert_header((header::AUTHORIZATION, bearer(Role::Admin, Uuid::new_v4())))
        .set_json(json!({ "templateId": registry.template_id(), "citizenId": registry.citizen_id() }))
        .to_request();
    let body: PreviewResponse = test::call_and_read_body_json(&app, req).await;

    assert!(body.content.starts_with("data:application/pdf;base64,"));
    assert_eq!(converter.calls(), 1);
    assert_eq!(registry.history_len(), 0);
}

#[actix_web::test]
async fn test_unknown_template_is_404_and_skips_converter() {
    let registry = Arc::new(MemoryRegistry::with_template(&["{nama}"]));
    let converter = Arc::new(StubConverter::default());
    let app = init_app!(app_state(registry.clone(), converter.clone(), Duration::from_secs(5)));

    let req = test::TestRequest::post()
        .uri("/api/letters/generate")
        .insert_header((header::AUTHORIZATION, bearer(Role::SuperAdmin, Uuid::new_v4())))
        .set_json(json!({ "templateId": Uuid::new_v4(), "citizenId": registry.citizen_id() }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(body.error, "NotFound");
    assert_eq!(converter.calls(), 0);
    assert_eq!(registry.history_len(), 0);
}

#[actix_web::test]
async fn test_missing_placeholder_is_500_without_detail() {
    let registry = Arc::new(MemoryRegistry::with_template(&["{nama} {kode_rahasia}"]));
    let converter = Arc::new(StubConverter::default());
    let app = init_app!(app_state(registry.clone(), converter.clone(), Duration::from_secs(5)));

    let req = test::TestRequest::post()
        .uri("/api/letters/generate")
        .insert_header((header::AUTHORIZATION, bearer(Role::Admin, Uuid::new_v4())))
        .set_json(json!({ "templateId": registry.template_id(), "citizenId": registry.citizen_id() }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(resp.headers().get(header::RETRY_AFTER).is_none());
    let body: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(body.error, "TemplateRenderError");
    assert!(!body.message.contains("kode_rahasia"));
    assert_eq!(converter.calls(), 0);
}

#[actix_web::test]
async fn test_deadline_cancels_conversion() {
    let registry = Arc::new(MemoryRegistry::with_template(&["{nama}"]));
    let converter = Arc::new(StubConverter::hanging());
    let app = init_app!(app_state(
        registry.clone(),
        converter.clone(),
        Duration::from_millis(100)
    ));

    let req = test::TestRequest::post()
        .uri("/api/letters/generate")
        .insert_header((header::AUTHORIZATION, bearer(Role::Admin, Uuid::new_v4())))
        .set_json(json!({ "templateId": registry.template_id(), "citizenId": registry.citizen_id() }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers().get(header::RETRY_AFTER).unwrap(), "10");
    let body: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(body.error, "ConversionTimeoutError");

    // The detached task observes the cancellation and cleans up.
    for _ in 0..50 {
        if converter.cleanups.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(converter.cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(registry.history_len(), 0);
}

#[actix_web::test]
async fn test_history_stats_and_download() {
    let registry = Arc::new(MemoryRegistry::with_template(&["{nama}"]));
    let converter = Arc::new(StubConverter::default());
    let app = init_app!(app_state(registry.clone(), converter.clone(), Duration::from_secs(5)));
    let auth = bearer(Role::Admin, Uuid::new_v4());

    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/api/letters/generate")
            .insert_header((header::AUTHORIZATION, auth.clone()))
            .set_json(json!({ "templateId": registry.template_id(), "citizenId": registry.citizen_id() }))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());
    }

    let req = test::TestRequest::get()
        .uri("/api/letters/history?search=budi&page=1&limit=1")
        .insert_header((header::AUTHORIZATION, auth.clone()))
        .to_request();
    let page: Page<HistoryEntry> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.pagination.total_items, 2);
    assert_eq!(page.pagination.total_pages, 2);

    let req = test::TestRequest::get()
        .uri("/api/letters/stats")
        .insert_header((header::AUTHORIZATION, auth.clone()))
        .to_request();
    let stats: LetterStats = test::call_and_read_body_json(&app, req).await;
    assert_eq!(stats.template_stats[0].count, 2);

    let entry_id = page.data[0].id;
    let req = test::TestRequest::get()
        .uri(&format!("/api/letters/{}", entry_id))
        .insert_header((header::AUTHORIZATION, auth.clone()))
        .to_request();
    let entry: HistoryEntry = test::call_and_read_body_json(&app, req).await;
    assert_eq!(entry.full_name, "BUDI");

    let req = test::TestRequest::get()
        .uri(&format!("/api/letters/{}/download", entry_id))
        .insert_header((header::AUTHORIZATION, auth.clone()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("attachment;"));
    // Reprinting does not add history.
    assert_eq!(registry.history_len(), 2);

    let req = test::TestRequest::get()
        .uri(&format!("/api/letters/{}", Uuid::new_v4()))
        .insert_header((header::AUTHORIZATION, auth))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_concurrent_generations_do_not_serialize() {
    let registry = Arc::new(MemoryRegistry::with_template(&["{nama} {nik}"]));
    // Neither conversion can finish until both are running.
    let converter = Arc::new(StubConverter::rendezvous(2));
    let state = app_state(registry.clone(), converter.clone(), Duration::from_secs(5));
    let user = Uuid::new_v4();
    let generate_cancel = CancellationToken::new();
    let preview_cancel = CancellationToken::new();

    let joined = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(
            state.letters.generate(
                registry.template_id(),
                registry.citizen_id(),
                user,
                &generate_cancel
            ),
            state
                .letters
                .preview(registry.template_id(), registry.citizen_id(), &preview_cancel),
        )
    })
    .await;

    let (generated, previewed) = joined.expect("letter requests ran one after another");
    assert!(generated.is_ok());
    assert!(previewed.is_ok());
    assert_eq!(converter.calls(), 2);
    assert_eq!(registry.history_len(), 1);
}
