use crate::app::AppContext;
use actix_web::{error, web, HttpResponse, Responder, Result};
use classroom_system::serde_json::json;

pub fn configure_admin_handlers(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin").service(
            web::resource("/status")
                .name("admin_status")
                .route(web::get().to(show_status)),
        ),
    );
}

/// Live connections, active sessions, known courses and the current snapshot.
pub async fn show_status(app: web::Data<AppContext>) -> Result<impl Responder> {
    let hub_status = app
        .hub()
        .status()
        .await
        .map_err(|_| error::ErrorInternalServerError("Internal Server Error"))?;
    let sessions = app.state.sessions.list().await;
    let courses = app.state.courses.list().await;
    let course_detail = app.state.course_detail.read().await.clone();

    Ok(HttpResponse::Ok().json(json!({
        "connections": hub_status.connections,
        "sessions": sessions,
        "courses": courses,
        "courseDetail": course_detail,
    })))
}
