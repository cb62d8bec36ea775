/*!
Handlers for interoperation with Admin users: account, instructor, and
course management, plus the enrollment overview and dashboard counts.

Every handler here is gated on an Admin token before anything else
happens.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::{header::HeaderMap, StatusCode},
    Json,
    response::{IntoResponse, Response},
};
use serde_json::json;
use uuid::Uuid;

use crate::account::Role;
use crate::catalog::{CourseData, InstructorData, DEFAULT_CREDITS};
use crate::config::Glob;
use super::*;

pub async fn students(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = require_role(&glob, &headers, &[Role::Admin]) {
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

pub async fn delete_student(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
    Path(account_id): Path<Uuid>,
) -> Response {
    log::trace!("delete_student( {} ) called.", &account_id);

    let claims = match require_role(&glob, &headers, &[Role::Admin]) {
        Ok(c) => c,
        Err(resp) => { return resp; },
    };

    match glob.store.delete_account(&account_id).await {
        Ok(true) => {
            audit(
                &glob, "Info", "account deleted",
                Some(&claims.sub.to_string()),
                Some(&account_id.to_string())
            ).await;
            (
                StatusCode::OK,
                Json(json!({ "message": "Student deleted successfully." })),
            ).into_response()
        },
        Ok(false) => respond_not_found("Student not found.".to_owned()),
        Err(e) => {
            log::error!("Error deleting account {}: {}", &account_id, &e);
            respond_internal_error()
        },
    }
}

pub async fn instructors(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = require_role(&glob, &headers, &[Role::Admin]) {
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

pub async fn add_instructor(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
    Json(dto): Json<InstructorData>,
) -> Response {
    log::trace!("add_instructor( {:?} ) called.", &dto);

    let claims = match require_role(&glob, &headers, &[Role::Admin]) {
        Ok(c) => c,
        Err(resp) => { return resp; },
    };

    match glob.store.insert_instructor(&dto.name).await {
        Ok(instructor) => {
            audit(
                &glob, "Info", "instructor added",
                Some(&claims.sub.to_string()),
                Some(&format!("{} ({})", &instructor.name, &instructor.id))
            ).await;
            (StatusCode::CREATED, Json(instructor)).into_response()
        },
        Err(e) => {
            log::error!("Error inserting instructor: {}", &e);
            respond_internal_error()
        },
    }
}

pub async fn update_instructor(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
    Path(instructor_id): Path<i64>,
    Json(dto): Json<InstructorData>,
) -> Response {
    log::trace!("update_instructor( {}, {:?} ) called.", instructor_id, &dto);

    let claims = match require_role(&glob, &headers, &[Role::Admin]) {
        Ok(c) => c,
        Err(resp) => { return resp; },
    };

    match glob.store.update_instructor(instructor_id, &dto.name).await {
        Ok(true) => {
            audit(
                &glob, "Info", "instructor updated",
                Some(&claims.sub.to_string()),
                Some(&format!("{} -> {:?}", instructor_id, &dto.name))
            ).await;
            (
                StatusCode::OK,
                Json(json!({ "message": "Instructor updated successfully." })),
            ).into_response()
        },
        Ok(false) => respond_not_found("Instructor not found.".to_owned()),
        Err(e) => {
            log::error!("Error updating instructor {}: {}", instructor_id, &e);
            respond_internal_error()
        },
    }
}

/// Deleting an instructor also deletes their courses and all the
/// enrollments in those courses; the store does it in one transaction.
pub async fn delete_instructor(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
    Path(instructor_id): Path<i64>,
) -> Response {
    log::trace!("delete_instructor( {} ) called.", instructor_id);

    let claims = match require_role(&glob, &headers, &[Role::Admin]) {
        Ok(c) => c,
        Err(resp) => { return resp; },
    };

    match glob.store.delete_instructor(instructor_id).await {
        Ok(true) => {
            audit(
                &glob, "Info", "instructor deleted",
                Some(&claims.sub.to_string()),
                Some(&instructor_id.to_string())
            ).await;
            (
                StatusCode::OK,
                Json(json!({ "message": "Instructor deleted successfully." })),
            ).into_response()
        },
        Ok(false) => respond_not_found("Instructor not found.".to_owned()),
        Err(e) => {
            log::error!("Error deleting instructor {}: {}", instructor_id, &e);
            respond_internal_error()
        },
    }
}

pub async fn courses(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = require_role(&glob, &headers, &[Role::Admin]) {
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

pub async fn add_course(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
    Json(dto): Json<CourseData>,
) -> Response {
    log::trace!("add_course( {:?} ) called.", &dto);

    let claims = match require_role(&glob, &headers, &[Role::Admin]) {
        Ok(c) => c,
        Err(resp) => { return resp; },
    };

    let credits = dto.credits.unwrap_or(DEFAULT_CREDITS);
    match glob.store.insert_course(&dto.name, credits, dto.instructor_id).await {
        Ok(course) => {
            audit(
                &glob, "Info", "course added",
                Some(&claims.sub.to_string()),
                Some(&format!("{} ({})", &course.name, &course.id))
            ).await;
            (StatusCode::CREATED, Json(course)).into_response()
        },
        Err(e) => {
            // Most likely a nonexistent instructor id; the store's
            // foreign key refused it.
            log::warn!("Error inserting course: {}", &e);
            respond_bad_request(
                "Could not add course; check the instructor id.".to_owned()
            )
        },
    }
}

pub async fn update_course(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
    Path(course_id): Path<i64>,
    Json(dto): Json<CourseData>,
) -> Response {
    log::trace!("update_course( {}, {:?} ) called.", course_id, &dto);

    let claims = match require_role(&glob, &headers, &[Role::Admin]) {
        Ok(c) => c,
        Err(resp) => { return resp; },
    };

    let credits = dto.credits.unwrap_or(DEFAULT_CREDITS);
    match glob.store.update_course(
        course_id, &dto.name, credits, dto.instructor_id
    ).await {
        Ok(true) => {
            audit(
                &glob, "Info", "course updated",
                Some(&claims.sub.to_string()),
                Some(&format!("{} -> {:?}", course_id, &dto.name))
            ).await;
            (
                StatusCode::OK,
                Json(json!({ "message": "Course updated successfully." })),
            ).into_response()
        },
        Ok(false) => respond_not_found("Course not found.".to_owned()),
        Err(e) => {
            log::warn!("Error updating course {}: {}", course_id, &e);
            respond_bad_request(
                "Could not update course; check the instructor id.".to_owned()
            )
        },
    }
}

pub async fn delete_course(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
    Path(course_id): Path<i64>,
) -> Response {
    log::trace!("delete_course( {} ) called.", course_id);

    let claims = match require_role(&glob, &headers, &[Role::Admin]) {
        Ok(c) => c,
        Err(resp) => { return resp; },
    };

    match glob.store.delete_course(course_id).await {
        Ok(true) => {
            audit(
                &glob, "Info", "course deleted",
                Some(&claims.sub.to_string()),
                Some(&course_id.to_string())
            ).await;
            (
                StatusCode::OK,
                Json(json!({ "message": "Course deleted successfully." })),
            ).into_response()
        },
        Ok(false) => respond_not_found("Course not found.".to_owned()),
        Err(e) => {
            log::error!("Error deleting course {}: {}", course_id, &e);
            respond_internal_error()
        },
    }
}

pub async fn enrollments(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = require_role(&glob, &headers, &[Role::Admin]) {
        return resp;
    }

    match glob.store.get_enrollments().await {
        Ok(details) => (StatusCode::OK, Json(details)).into_response(),
        Err(e) => {
            log::error!("Error fetching enrollments: {}", &e);
            respond_internal_error()
        },
    }
}

/// Headline counts for the admin dashboard.
pub async fn stats(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = require_role(&glob, &headers, &[Role::Admin]) {
        return resp;
    }

    let accounts = match glob.store.get_accounts().await {
        Ok(v) => v,
        Err(e) => {
            log::error!("Error fetching accounts for stats: {}", &e);
            return respond_internal_error();
        },
    };
    let instructors = match glob.store.get_instructors().await {
        Ok(v) => v,
        Err(e) => {
            log::error!("Error fetching instructors for stats: {}", &e);
            return respond_internal_error();
        },
    };
    let courses = match glob.store.get_courses().await {
        Ok(v) => v,
        Err(e) => {
            log::error!("Error fetching courses for stats: {}", &e);
            return respond_internal_error();
        },
    };
    let enrollments = match glob.store.get_enrollments().await {
        Ok(v) => v,
        Err(e) => {
            log::error!("Error fetching enrollments for stats: {}", &e);
            return respond_internal_error();
        },
    };

    let n_students = accounts.iter()
        .filter(|a| a.role == Role::Student)
        .count();
    let n_enrolled = accounts.iter()
        .filter(|a| !a.courses.is_empty())
        .count();

    (
        StatusCode::OK,
        Json(json!({
            "totalStudents": n_students,
            "enrolledStudents": n_enrolled,
            "totalInstructors": instructors.len(),
            "totalCourses": courses.len(),
            "totalEnrollments": enrollments.len(),
        })),
    ).into_response()
}
