/*!
Interoperation between the client and the rule engines.

(Not the application and the database; that's covered by `store`.)

Handlers here are deliberately thin: pull the bearer token apart, let
the auth engine say who's asking, hand the real work to the enrollment
or auth rules or the store, and map whatever comes back onto an HTTP
status and a JSON body. Every typed rule failure maps 1:1 onto an
`ErrorBody` so the client can tell the user exactly which rule bit
them.
*/
use std::sync::Arc;
use std::time::Instant;

use axum::{
    http::{header::HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    account::Role,
    auth::{AuthError, Claims},
    config::Glob,
    enroll::EnrollError,
};

pub mod admin;
pub mod logs;
pub mod student;

static TEXT_500: &str = "An internal server error occurred. Please try again later.";

/// The JSON error shape every failure path speaks.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub error_code: String,
    pub message: String,
}

pub fn error_response(
    code: StatusCode,
    error_code: &str,
    message: String,
) -> Response {
    let body = ErrorBody {
        status_code: code.as_u16(),
        error_code: error_code.to_owned(),
        message,
    };

    (code, Json(body)).into_response()
}

pub fn respond_bad_request(msg: String) -> Response {
    log::trace!("respond_bad_request( {:?} ) called.", &msg);

    error_response(StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", msg)
}

pub fn respond_not_found(msg: String) -> Response {
    log::trace!("respond_not_found( {:?} ) called.", &msg);

    error_response(StatusCode::NOT_FOUND, "NOT_FOUND", msg)
}

pub fn respond_internal_error() -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_SERVER_ERROR",
        TEXT_500.to_owned(),
    )
}

/// Maps an auth rule failure onto its HTTP shape. Infrastructure
/// failures get logged here and leave as an anonymous 500; everything
/// else passes its message through.
pub fn respond_auth_error(e: AuthError) -> Response {
    log::trace!("respond_auth_error( {:?} ) called.", &e);

    let (code, error_code) = match &e {
        AuthError::EmailTaken =>
            (StatusCode::BAD_REQUEST, "EMAIL_TAKEN"),
        AuthError::InvalidAdminCode =>
            (StatusCode::UNAUTHORIZED, "INVALID_ADMIN_CODE"),
        AuthError::InvalidCredentials =>
            (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
        AuthError::InvalidToken =>
            (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
        AuthError::Forbidden =>
            (StatusCode::FORBIDDEN, "FORBIDDEN"),
        AuthError::Db(dbe) => {
            log::error!("Auth operation store error: {}", dbe);
            return respond_internal_error();
        },
        AuthError::Internal(msg) => {
            log::error!("Auth operation internal error: {}", msg);
            return respond_internal_error();
        },
    };

    error_response(code, error_code, format!("{}", &e))
}

/// Same, for the enrollment rules. All four rule failures are the
/// client's to correct, so they're all 400s.
pub fn respond_enroll_error(e: EnrollError) -> Response {
    log::trace!("respond_enroll_error( {:?} ) called.", &e);

    let error_code = match &e {
        EnrollError::InvalidSelectionSize => "INVALID_SELECTION_SIZE",
        EnrollError::UnknownCourse => "UNKNOWN_COURSE",
        EnrollError::DuplicateInstructor => "DUPLICATE_INSTRUCTOR",
        EnrollError::AlreadyEnrolled => "ALREADY_ENROLLED",
        EnrollError::Db(dbe) => {
            log::error!("Enrollment operation store error: {}", dbe);
            return respond_internal_error();
        },
    };

    error_response(StatusCode::BAD_REQUEST, error_code, format!("{}", &e))
}

/// Plucks the token out of an `Authorization: Bearer ...` header.
pub fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers.get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

/**
Gatekeeper for role-guarded handlers.

Returns the verified claims, or the complete error `Response` to send
back: no token and bad token are both 401s, a good token with the wrong
role is a 403.
*/
pub fn require_role(
    glob: &Glob,
    headers: &HeaderMap,
    allowed: &[Role],
) -> Result<Claims, Response> {
    let token = match bearer(headers) {
        Some(t) => t,
        None => {
            return Err(error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Request must carry a valid bearer token.".to_owned(),
            ));
        },
    };

    glob.auth.authorize(token, allowed)
        .map_err(respond_auth_error)
}

/// Like `require_role`, but for operations a student may only perform
/// on their own account.
pub fn require_self(
    glob: &Glob,
    headers: &HeaderMap,
    account: &Uuid,
) -> Result<Claims, Response> {
    let token = match bearer(headers) {
        Some(t) => t,
        None => {
            return Err(error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Request must carry a valid bearer token.".to_owned(),
            ));
        },
    };

    glob.auth.authorize_account(token, account)
        .map_err(respond_auth_error)
}

/**
Writes an audit/security event to the log table.

A request must never fail because its log row didn't land, so store
trouble here gets downgraded to a terminal warning and swallowed.
*/
pub async fn audit(
    glob: &Glob,
    level: &str,
    message: &str,
    account: Option<&str>,
    detail: Option<&str>,
) {
    if let Err(e) = glob.store.record_log(level, message, account, detail).await {
        log::warn!(
            "Failed to record log event {:?} ({:?}): {}",
            message, level, &e
        );
    }
}

/// Middleware: times every request and records it, to the terminal and
/// to the log table. 5xx responses are recorded at Error level.
pub async fn log_requests<B>(
    req: Request<B>,
    next: Next<B>,
) -> Response {
    let glob: Arc<Glob> = match req.extensions().get::<Arc<Glob>>() {
        Some(g) => g.clone(),
        None => {
            // No state, no logging; don't eat the request over it.
            log::error!("log_requests middleware found no Glob extension.");
            return next.run(req).await;
        },
    };

    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(req).await;

    let elapsed_ms = start.elapsed().as_millis();
    let status = response.status().as_u16();
    let message = format!(
        "HTTP {} {} responded {} in {} ms",
        &method, &path, &status, &elapsed_ms
    );

    if status >= 500 {
        log::error!("{}", &message);
        audit(&glob, "Error", &message, None, None).await;
    } else {
        log::info!("{}", &message);
        audit(&glob, "Info", &message, None, None).await;
    }

    response
}
