/*!
Handlers for the admin log views: dashboard tallies, paginated record
listings, and CSV export. Admin-token-only, like the rest of the admin
surface.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::{header, header::HeaderMap, StatusCode},
    Json,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use time::{format_description::well_known::Rfc3339, OffsetDateTime, Time};

use crate::account::Role;
use crate::config::Glob;
use crate::store::logs::LogRecord;
use super::*;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    page: Option<i64>,
    page_size: Option<i64>,
}

impl PageParams {
    /// 1-based page and a sane page size, whatever the query string
    /// tried to say.
    fn normalize(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let page_size = self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, page_size)
    }
}

fn paginated_body(
    records: Vec<LogRecord>,
    page: i64,
    page_size: i64,
    total: i64,
) -> Response {
    let total_pages = if total == 0 {
        0
    } else {
        (total + page_size - 1) / page_size
    };

    (
        StatusCode::OK,
        Json(json!({
            "logs": records,
            "pagination": {
                "currentPage": page,
                "pageSize": page_size,
                "totalCount": total,
                "totalPages": total_pages,
                "hasNextPage": page < total_pages,
                "hasPreviousPage": page > 1,
            },
        })),
    ).into_response()
}

/// Headline numbers for the log dashboard: totals, today's share of
/// them, and a per-level breakdown.
pub async fn dashboard(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = require_role(&glob, &headers, &[Role::Admin]) {
        return resp;
    }

    let total = match glob.store.count_logs().await {
        Ok(n) => n,
        Err(e) => {
            log::error!("Error counting logs: {}", &e);
            return respond_internal_error();
        },
    };
    let total_errors = match glob.store.count_error_logs().await {
        Ok(n) => n,
        Err(e) => {
            log::error!("Error counting error logs: {}", &e);
            return respond_internal_error();
        },
    };

    let midnight = OffsetDateTime::now_utc().replace_time(Time::MIDNIGHT);
    let (today, today_errors) = match glob.store.count_logs_since(midnight).await {
        Ok(pair) => pair,
        Err(e) => {
            log::error!("Error counting today's logs: {}", &e);
            return respond_internal_error();
        },
    };

    let by_level = match glob.store.log_level_counts().await {
        Ok(v) => v,
        Err(e) => {
            log::error!("Error tallying log levels: {}", &e);
            return respond_internal_error();
        },
    };

    (
        StatusCode::OK,
        Json(json!({
            "totalLogs": total,
            "todayLogs": today,
            "totalErrors": total_errors,
            "todayErrors": today_errors,
            "logsByLevel": by_level,
        })),
    ).into_response()
}

/// A page of recent records, newest first.
pub async fn recent(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
    Query(params): Query<PageParams>,
) -> Response {
    log::trace!("logs::recent( {:?} ) called.", &params);

    if let Err(resp) = require_role(&glob, &headers, &[Role::Admin]) {
        return resp;
    }

    let (page, page_size) = params.normalize();

    let total = match glob.store.count_logs().await {
        Ok(n) => n,
        Err(e) => {
            log::error!("Error counting logs: {}", &e);
            return respond_internal_error();
        },
    };
    match glob.store.recent_logs(page, page_size).await {
        Ok(records) => paginated_body(records, page, page_size, total),
        Err(e) => {
            log::error!("Error fetching recent logs: {}", &e);
            respond_internal_error()
        },
    }
}

/// Like `recent`, filtered down to Error-level records.
pub async fn errors(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
    Query(params): Query<PageParams>,
) -> Response {
    log::trace!("logs::errors( {:?} ) called.", &params);

    if let Err(resp) = require_role(&glob, &headers, &[Role::Admin]) {
        return resp;
    }

    let (page, page_size) = params.normalize();

    let total = match glob.store.count_error_logs().await {
        Ok(n) => n,
        Err(e) => {
            log::error!("Error counting error logs: {}", &e);
            return respond_internal_error();
        },
    };
    match glob.store.error_logs(page, page_size).await {
        Ok(records) => paginated_body(records, page, page_size, total),
        Err(e) => {
            log::error!("Error fetching error logs: {}", &e);
            respond_internal_error()
        },
    }
}

/// The whole log table as a CSV download.
pub async fn export(
    Extension(glob): Extension<Arc<Glob>>,
    headers: HeaderMap,
) -> Response {
    log::trace!("logs::export() called.");

    let claims = match require_role(&glob, &headers, &[Role::Admin]) {
        Ok(c) => c,
        Err(resp) => { return resp; },
    };

    let records = match glob.store.all_logs().await {
        Ok(v) => v,
        Err(e) => {
            log::error!("Error fetching logs for export: {}", &e);
            return respond_internal_error();
        },
    };

    let mut wtr = csv::Writer::from_writer(Vec::new());
    if let Err(e) = wtr.write_record(
        ["id", "stamp", "level", "message", "account", "detail"]
    ) {
        log::error!("Error writing CSV header: {}", &e);
        return respond_internal_error();
    }
    for r in records.iter() {
        let stamp = match r.stamp.format(&Rfc3339) {
            Ok(s) => s,
            Err(e) => {
                log::error!("Error formatting log stamp {:?}: {}", &r.stamp, &e);
                return respond_internal_error();
            },
        };
        if let Err(e) = wtr.write_record([
            r.id.to_string().as_str(),
            stamp.as_str(),
            r.level.as_str(),
            r.message.as_str(),
            r.account.as_deref().unwrap_or(""),
            r.detail.as_deref().unwrap_or(""),
        ]) {
            log::error!("Error writing CSV record: {}", &e);
            return respond_internal_error();
        }
    }

    let bytes = match wtr.into_inner() {
        Ok(b) => b,
        Err(e) => {
            log::error!("Error finalizing CSV export: {}", &e);
            return respond_internal_error();
        },
    };

    audit(
        &glob, "Info", "log table exported",
        Some(&claims.sub.to_string()),
        Some(&format!("{} records", records.len()))
    ).await;

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"matric-logs.csv\"",
            ),
        ],
        bytes,
    ).into_response()
}
