use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

mod clock;
mod color;
mod compose;
mod config;
mod datauri;
mod generator;
mod page;
mod presenter;
mod qr;
mod session;
mod storage;
mod validate;

use clock::SystemClock;
use config::Config;
use session::{SessionResponse, SessionService, SessionView, SetColorsRequest, SetLogoRequest, SetTextRequest};
use storage::StorageStats;

#[derive(Serialize)]
struct ServerInfo {
    message: String,
    status: String,
    version: String,
    sessions: StorageStats,
}

// Страница генератора
async fn index(session_service: web::Data<SessionService>) -> HttpResponse {
    let html = page::render(session_service.config(), session_service.clock());
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html)
}

async fn info(session_service: web::Data<SessionService>) -> Result<HttpResponse> {
    match session_service.stats().await {
        Ok(sessions) => Ok(HttpResponse::Ok().json(ServerInfo {
            message: "QR Studio 🦀".to_string(),
            status: "running".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            sessions,
        })),
        Err(e) => Ok(HttpResponse::InternalServerError().json(serde_json::json!({"error": e.to_string()}))),
    }
}

/// Общий ответ для операций над сессией: 404 для неизвестной сессии, 400 для плохого ввода
fn session_response(session_id: &str, result: anyhow::Result<Option<SessionView>>) -> HttpResponse {
    match result {
        Ok(Some(view)) => HttpResponse::Ok().json(SessionResponse {
            success: true,
            data: Some(view),
            error: None,
        }),
        Ok(None) => HttpResponse::NotFound().json(SessionResponse {
            success: false,
            data: None,
            error: Some("Session not found".to_string()),
        }),
        Err(e) => {
            log::warn!("Session {} request rejected: {}", session_id, e);
            HttpResponse::BadRequest().json(SessionResponse {
                success: false,
                data: None,
                error: Some(e.to_string()),
            })
        }
    }
}

async fn create_session(session_service: web::Data<SessionService>) -> Result<HttpResponse> {
    match session_service.create_session().await {
        Ok(view) => Ok(HttpResponse::Ok().json(SessionResponse {
            success: true,
            data: Some(view),
            error: None,
        })),
        Err(e) => {
            log::error!("Session creation failed: {}", e);
            Ok(HttpResponse::InternalServerError().json(SessionResponse {
                success: false,
                data: None,
                error: Some(e.to_string()),
            }))
        }
    }
}

async fn get_session(
    session_service: web::Data<SessionService>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session_id = path.into_inner();
    let result = session_service.get_session(&session_id).await;
    Ok(session_response(&session_id, result))
}

async fn delete_session(
    session_service: web::Data<SessionService>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session_id = path.into_inner();
    match session_service.delete_session(&session_id).await {
        Ok(true) => Ok(HttpResponse::NoContent().finish()),
        Ok(false) => Ok(HttpResponse::NotFound().json(serde_json::json!({"error": "Session not found"}))),
        Err(e) => Ok(HttpResponse::InternalServerError().json(serde_json::json!({"error": e.to_string()}))),
    }
}

async fn set_text(
    session_service: web::Data<SessionService>,
    path: web::Path<String>,
    req: web::Json<SetTextRequest>,
) -> Result<HttpResponse> {
    let session_id = path.into_inner();
    let result = session_service.set_text(&session_id, req.into_inner()).await;
    Ok(session_response(&session_id, result))
}

async fn set_colors(
    session_service: web::Data<SessionService>,
    path: web::Path<String>,
    req: web::Json<SetColorsRequest>,
) -> Result<HttpResponse> {
    let session_id = path.into_inner();
    let result = session_service.set_colors(&session_id, req.into_inner()).await;
    Ok(session_response(&session_id, result))
}

async fn set_logo(
    session_service: web::Data<SessionService>,
    path: web::Path<String>,
    req: web::Json<SetLogoRequest>,
) -> Result<HttpResponse> {
    let session_id = path.into_inner();
    let result = session_service.set_logo(&session_id, req.into_inner()).await;
    Ok(session_response(&session_id, result))
}

async fn clear_logo(
    session_service: web::Data<SessionService>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session_id = path.into_inner();
    let result = session_service.clear_logo(&session_id).await;
    Ok(session_response(&session_id, result))
}

// Отдаём PNG как файл, это же выставляет флаг "скачано"
async fn download(
    session_service: web::Data<SessionService>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session_id = path.into_inner();

    match session_service.download(&session_id).await {
        Ok(Some(file)) => Ok(HttpResponse::Ok()
            .content_type(file.content_type)
            .append_header((
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", file.file_name),
            ))
            .body(file.bytes)),
        Ok(None) => Ok(HttpResponse::NotFound().json(serde_json::json!({"error": "Nothing to download"}))),
        Err(e) => {
            log::error!("Download failed for session {}: {}", session_id, e);
            Ok(HttpResponse::InternalServerError().json(serde_json::json!({"error": e.to_string()})))
        }
    }
}

fn routes(cfg: &mut web::ServiceConfig, max_logo_bytes: usize) {
    // base64 раздувает логотип на треть, плюс запас на JSON обёртку
    let json_limit = max_logo_bytes / 3 * 4 + 64 * 1024;

    cfg.app_data(web::JsonConfig::default().limit(json_limit))
        .route("/", web::get().to(index))
        .service(
            web::scope("/api")
                .route("/info", web::get().to(info))
                .route("/session", web::post().to(create_session))
                .route("/session/{id}", web::get().to(get_session))
                .route("/session/{id}", web::delete().to(delete_session))
                .route("/session/{id}/text", web::put().to(set_text))
                .route("/session/{id}/colors", web::put().to(set_colors))
                .route("/session/{id}/logo", web::put().to(set_logo))
                .route("/session/{id}/logo", web::delete().to(clear_logo))
                .route("/session/{id}/download", web::get().to(download)),
        );
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();
    println!("🦀 Starting QR Studio...");

    let config = Config::load()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    let session_service = SessionService::new(config.clone(), Arc::new(SystemClock));

    let host = config.server.host.clone();
    let port = config.server.port;
    let max_logo_bytes = config.generator.max_logo_bytes;

    println!("🚀 Server starting on http://{}:{}", host, port);
    println!(
        "🎨 Default colors: {} on {}",
        config.generator.default_colors.dark, config.generator.default_colors.light
    );

    // Фоновая очистка просроченных сессий
    let cleanup_service = session_service.clone();
    let cleanup_every = Duration::from_secs(config.session.cleanup_interval_secs);
    actix_web::rt::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_every);
        loop {
            interval.tick().await;
            if let Err(e) = cleanup_service.cleanup_expired_sessions().await {
                log::warn!("Session cleanup failed: {}", e);
            }
        }
    });

    HttpServer::new(move || {
        let cors = Cors::default().allow_any_origin().allow_any_method().allow_any_header().max_age(3600);
        App::new()
            .app_data(web::Data::new(session_service.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .configure(|cfg| routes(cfg, max_logo_bytes))
    })
        .bind(format!("{}:{}", host, port))?
        .run()
        .await
}
