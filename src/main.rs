/*!
Here we go!
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    middleware,
    Router,
    routing::{delete, get, post, put},
};
use simplelog::{ColorChoice, TerminalMode, TermLogger};
use tower_http::cors::CorsLayer;

use matric::config;
use matric::inter::{self, admin, logs, student};

static DEFAULT_CONFIG_PATH: &str = "matric.toml";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("matric")
        .build();
    TermLogger::init(
        matric::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ).unwrap();
    log::info!("Logging started.");

    let config_path = std::env::args().nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_owned());
    let glob = config::load_configuration(&config_path).await.unwrap();
    let addr = glob.addr;
    let glob = Arc::new(glob);

    let app = Router::new()
        // Public.
        .route("/api/register", post(student::register))
        .route("/api/register-admin", post(student::register_admin))
        .route("/api/login", post(student::login))
        // Any signed-in account.
        .route("/api/courses", get(student::courses))
        .route("/api/instructors", get(student::instructors))
        .route("/api/students", get(student::students))
        // Students, about themselves.
        .route(
            "/api/enrollment",
            post(student::enroll).put(student::replace_enrollment)
        )
        .route("/api/me", get(student::profile))
        .route("/api/me/enrollments", get(student::my_enrollments))
        .route("/api/me/classmates/:course_id", get(student::classmates))
        // Admin management surface.
        .route("/api/admin/students", get(admin::students))
        .route("/api/admin/students/:id", delete(admin::delete_student))
        .route(
            "/api/admin/instructors",
            get(admin::instructors).post(admin::add_instructor)
        )
        .route(
            "/api/admin/instructors/:id",
            put(admin::update_instructor).delete(admin::delete_instructor)
        )
        .route(
            "/api/admin/courses",
            get(admin::courses).post(admin::add_course)
        )
        .route(
            "/api/admin/courses/:id",
            put(admin::update_course).delete(admin::delete_course)
        )
        .route("/api/admin/enrollments", get(admin::enrollments))
        .route("/api/admin/stats", get(admin::stats))
        // Admin log views.
        .route("/api/logs/dashboard", get(logs::dashboard))
        .route("/api/logs/recent", get(logs::recent))
        .route("/api/logs/errors", get(logs::errors))
        .route("/api/logs/export", get(logs::export))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(inter::log_requests))
        .layer(Extension(glob));

    log::info!("Listening on {}", &addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
