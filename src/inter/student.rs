/*!
Handlers for the public endpoints (register, login) and everything a
signed-in student can do.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::{header::HeaderMap, StatusCode},
    Json,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::account::Role;
use crate::config::Glob;
use crate::enroll;
use super::*;

#[derive(Debug, Deserialize)]
pub struct RegisterData {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRegisterData {
    pub name: String,
    pub email: String,
    pub password: String,
    pub admin_code: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginData {
    pub email: String,
    pub password: String,
}

/// The enrollment request body: who, and which three courses.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentSelection {
    pub account_id: Uuid,
    pub course_ids: Vec<i64>,
}

pub async fn register(
    Extension(glob): Extension<Arc<Glob>>,
    Json(dto): Json<RegisterData>,
) -> Response {
    log::trace!("register( {:?} ) called.", &dto.email);

    match glob.auth.register(
        &glob.store, &dto.name, &dto.email, &dto.password
    ).await {
        Ok(id) => {
            audit(
                &glob, "Info", "student registered",
                Some(&id.to_string()), Some(&dto.email)
            ).await;
            (
                StatusCode::OK,
                Json(json!({
                    "id": id,
                    "message": "Registration successful."
                })),
            ).into_response()
        },
        Err(e) => {
            audit(
                &glob, "Warn", "student registration refused",
                None, Some(&dto.email)
            ).await;
            respond_auth_error(e)
        },
    }
}

pub async fn register_admin(
    Extension(glob): Extension<Arc<Glob>>,
    Json(dto): Json<AdminRegisterData>,
) -> Response {
    log::trace!("register_admin( {:?} ) called.", &dto.email);

    match glob.auth.register_admin(
        &glob.store, &dto.name, &dto.email, &dto.password, &dto.admin_code
    ).await {
        Ok(id) => {
            audit(
                &glob, "Info", "admin registered",
                Some(&id.to_string()), Some(&dto.email)
            ).await;
            (
                StatusCode::OK,
                Json(json!({
                    "id": id,
                    "message": "Administrator registered successfully."
                })),
            ).into_response()
        },
        Err(e) => {
            audit(
                &glob, "Warn", "admin registration refused",
                None, Some(&dto.email)
            ).await;
            respond_auth_error(e)
        },
    }
}

pub async fn login(
    Extension(glob): Extension<Arc<Glob>>,
    Json(dto): Json<LoginData>,
) -> Response {
    log::trace!("login( {:?} ) called.", &dto.email);

    match glob.auth.login(&glob.store, &dto.email, &dto.password).await {
        Ok(session) => {
            audit(
                &glob, "Info", "login succeeded",
                None, Some(&dto.email)
            ).await;
            (StatusCode::OK, Json(session)).into_response()
        },
        Err(e) => {
            audit(
                &glob, "Warn", "login failed",
                None, Some(&dto.email)
            ).await;
            respond_auth_error(e)
        },
    }
}

pub async fn courses(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = require_role(
        &glob, &headers, &[Role::Student, Role::Admin]
    ) {
        return resp;
    }

    match glob.store.get_courses().await {
        Ok(courses) => (StatusCode::OK, Json(courses)).into_response(),
        Err(e) => {
            log::error!("Error fetching courses: {}", &e);
            respond_internal_error()
        },
    }
}

pub async fn instructors(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = require_role(
        &glob, &headers, &[Role::Student, Role::Admin]
    ) {
        return resp;
    }

    match glob.store.get_instructors().await {
        Ok(instructors) => (StatusCode::OK, Json(instructors)).into_response(),
        Err(e) => {
            log::error!("Error fetching instructors: {}", &e);
            respond_internal_error()
        },
    }
}

pub async fn students(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = require_role(
        &glob, &headers, &[Role::Student, Role::Admin]
    ) {
        return resp;
    }

    match glob.store.get_accounts().await {
        Ok(profiles) => (StatusCode::OK, Json(profiles)).into_response(),
        Err(e) => {
            log::error!("Error fetching accounts: {}", &e);
            respond_internal_error()
        },
    }
}

/// POST: first-time enrollment. A student may only enroll themself;
/// enrolling anybody else is Forbidden no matter how good the token is.
pub async fn enroll(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
    Json(dto): Json<EnrollmentSelection>,
) -> Response {
    log::trace!("enroll( {:?} ) called.", &dto);

    let claims = match require_self(&glob, &headers, &dto.account_id) {
        Ok(c) => c,
        Err(resp) => {
            audit(
                &glob, "Warn", "enrollment refused at the door",
                None, Some(&dto.account_id.to_string())
            ).await;
            return resp;
        },
    };

    match enroll::enroll(&glob.store, dto.account_id, &dto.course_ids).await {
        Ok(()) => {
            audit(
                &glob, "Info", "enrollment committed",
                Some(&claims.sub.to_string()),
                Some(&format!("courses {:?}", &dto.course_ids))
            ).await;
            (
                StatusCode::OK,
                Json(json!({ "message": "Enrollment successful." })),
            ).into_response()
        },
        Err(e) => respond_enroll_error(e),
    }
}

/// PUT: wholesale replacement of an existing enrollment set. Same
/// identity scoping as POST.
pub async fn replace_enrollment(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
    Json(dto): Json<EnrollmentSelection>,
) -> Response {
    log::trace!("replace_enrollment( {:?} ) called.", &dto);

    let claims = match require_self(&glob, &headers, &dto.account_id) {
        Ok(c) => c,
        Err(resp) => {
            audit(
                &glob, "Warn", "enrollment update refused at the door",
                None, Some(&dto.account_id.to_string())
            ).await;
            return resp;
        },
    };

    match enroll::replace_enrollment(
        &glob.store, dto.account_id, &dto.course_ids
    ).await {
        Ok(()) => {
            audit(
                &glob, "Info", "enrollment replaced",
                Some(&claims.sub.to_string()),
                Some(&format!("courses {:?}", &dto.course_ids))
            ).await;
            (
                StatusCode::OK,
                Json(json!({ "message": "Enrollment updated successfully." })),
            ).into_response()
        },
        Err(e) => respond_enroll_error(e),
    }
}

/// The signed-in student's own profile, enrolled course names included.
pub async fn profile(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
) -> Response {
    let claims = match require_role(&glob, &headers, &[Role::Student]) {
        Ok(c) => c,
        Err(resp) => { return resp; },
    };

    match glob.store.account_profile(&claims.sub).await {
        Ok(Some(profile)) => (StatusCode::OK, Json(profile)).into_response(),
        Ok(None) => {
            // A valid token for a deleted account.
            respond_not_found("No profile found for this account.".to_owned())
        },
        Err(e) => {
            log::error!("Error fetching profile for {}: {}", &claims.sub, &e);
            respond_internal_error()
        },
    }
}

pub async fn my_enrollments(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
) -> Response {
    let claims = match require_role(&glob, &headers, &[Role::Student]) {
        Ok(c) => c,
        Err(resp) => { return resp; },
    };

    match glob.store.enrollments_for_account_detailed(&claims.sub).await {
        Ok(details) => (StatusCode::OK, Json(details)).into_response(),
        Err(e) => {
            log::error!("Error fetching enrollments for {}: {}", &claims.sub, &e);
            respond_internal_error()
        },
    }
}

/// Who else is in one of my courses? Only answerable about courses the
/// asking student is actually enrolled in.
pub async fn classmates(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
    Path(course_id): Path<i64>,
) -> Response {
    log::trace!("classmates( {} ) called.", course_id);

    let claims = match require_role(&glob, &headers, &[Role::Student]) {
        Ok(c) => c,
        Err(resp) => { return resp; },
    };

    let mine = match glob.store.enrollments_for_account(&claims.sub).await {
        Ok(v) => v,
        Err(e) => {
            log::error!("Error fetching enrollments for {}: {}", &claims.sub, &e);
            return respond_internal_error();
        },
    };

    if !mine.iter().any(|e| e.course == course_id) {
        audit(
            &glob, "Warn", "classmate listing refused",
            Some(&claims.sub.to_string()),
            Some(&format!("course {}", course_id))
        ).await;
        return error_response(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "You are not enrolled in this course.".to_owned(),
        );
    }

    match glob.store.classmates(course_id, &claims.sub).await {
        Ok(names) => (StatusCode::OK, Json(names)).into_response(),
        Err(e) => {
            log::error!("Error fetching classmates: {}", &e);
            respond_internal_error()
        },
    }
}
