use actix_cors::Cors;
use actix_web::middleware::Compress;
use actix_web::{http::header, web, App, HttpServer};
use actix_web_prometheus::{PrometheusMetrics, PrometheusMetricsBuilder};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod citizen;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod letter;
pub mod storage;
pub mod template;
pub mod village;

pub use crate::db::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_type: &str, message: &str) -> Self {
        Self {
            error: error_type.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self::new("NotFound", message)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new("BadRequest", message)
    }

    pub fn internal_error(message: &str) -> Self {
        Self::new("InternalServerError", message)
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::me,
        crate::letter::handlers::generate_letter,
        crate::letter::handlers::preview_letter,
        crate::letter::handlers::get_history,
        crate::letter::handlers::get_stats,
        crate::letter::handlers::get_letter,
        crate::letter::handlers::download_letter,
        crate::template::handlers::list_templates,
        crate::template::handlers::get_template,
        crate::template::handlers::create_template,
        crate::template::handlers::update_template,
        crate::template::handlers::delete_template,
        crate::template::handlers::download_template_file,
        crate::village::handlers::get_village_info,
        crate::village::handlers::update_village_info,
        crate::citizen::handlers::search_citizens,
        crate::citizen::handlers::get_warnings,
        crate::citizen::handlers::get_citizen,
        crate::dashboard::handlers::get_dashboard_stats,
        crate::dashboard::handlers::get_age_stats,
        crate::dashboard::handlers::get_dusun_stats,
        crate::dashboard::handlers::get_marriage_stats,
        crate::dashboard::handlers::get_education_stats
    ),
    components(
        schemas(
            ErrorResponse,
            auth::model::LoginRequest,
            auth::model::TokenResponse,
            auth::model::UserInfo,
            auth::model::Role,
            letter::handlers::LetterRequest,
            letter::handlers::PreviewResponse,
            letter::model::LetterTemplate,
            letter::model::Citizen,
            letter::model::VillageInfo,
            letter::model::HistoryEntry,
            letter::model::Pagination,
            letter::model::LetterStats,
            letter::model::TemplateUsage,
            letter::model::MonthlyCount,
            template::handlers::TemplateResponse,
            template::handlers::TemplateUploadRequest,
            db::VillageUpdate,
            dashboard::model::DashboardSummary,
            dashboard::model::GenderStats,
            dashboard::model::DusunCount,
            dashboard::model::AgeBracket,
            dashboard::model::GenderTotals,
            dashboard::model::BreakdownLine,
            dashboard::model::BreakdownTable,
            dashboard::model::CitizenWarning,
        )
    ),
    tags(
        (name = "Authentication", description = "Login and current user."),
        (name = "Letters", description = "Letter generation, preview and history."),
        (name = "Templates", description = "Letter template management."),
        (name = "Village", description = "Village profile printed on letters."),
        (name = "Citizens", description = "Citizen lookup for the letter form."),
        (name = "Dashboard", description = "Population statistics.")
    ),
    servers(
        (url = "http://127.0.0.1:8080", description = "Local server")
    )
)]
pub struct ApiDoc;

pub async fn run() -> std::io::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    env_logger::init();

    let config = match config::AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let app_state = match AppState::new(&config).await {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            log::error!("Failed to initialise application state. Please check DATABASE_URL in .env and ensure the database is running. Error: {:#}", e);
            std::process::exit(1);
        }
    };

    let prometheus = metrics_middleware()?;

    log::info!("Starting server at http://{}", config.bind_addr);

    HttpServer::new(move || {
        let app_state = app_state.clone();
        let prometheus = prometheus.clone();
        let cors = Cors::default()
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://127.0.0.1:8080")
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
            ])
            .expose_headers(vec![header::CONTENT_DISPOSITION])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Compress::default())
            .wrap(prometheus)
            .wrap(cors)
            .app_data(app_state)
            .service(web::scope("/api").configure(routes))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
    })
    .keep_alive(actix_web::http::KeepAlive::Os)
    .bind(&config.bind_addr)?
    .run()
    .await
}

/// Request metrics served at `/metrics`, sharing one registry with the
/// letter pipeline collectors.
pub fn metrics_middleware() -> std::io::Result<PrometheusMetrics> {
    let registry = prometheus::Registry::new();
    letter::metrics::register(&registry);

    PrometheusMetricsBuilder::new("desa_admin_server")
        .registry(registry)
        .endpoint("/metrics")
        .build()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

/// Registers every `/api` route.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(auth::config)
        .configure(letter::handlers::config)
        .configure(template::config)
        .configure(village::config)
        .configure(citizen::config)
        .configure(dashboard::config);
}
