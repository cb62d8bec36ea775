/*
`Store` methods et. al. for the operational log table.

```sql
CREATE TABLE logs (
    id      BIGSERIAL PRIMARY KEY,
    stamp   TIMESTAMPTZ NOT NULL,
    level   TEXT NOT NULL,      /* 'Info', 'Warn', or 'Error' */
    message TEXT NOT NULL,
    account TEXT,               /* acting account id, if known */
    detail  TEXT
);
```

Request and audit events land here so the admin log views have
something to page through. Failure to write a log row is never allowed
to fail the request that produced it; callers downgrade to a terminal
warning instead (see `inter::audit`).
*/
use time::OffsetDateTime;
use tokio_postgres::Row;
use serde::Serialize;

use super::{Store, DbError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub stamp: OffsetDateTime,
    pub level: String,
    pub message: String,
    pub account: Option<String>,
    pub detail: Option<String>,
}

/// Per-level row counts for the dashboard.
#[derive(Debug, Serialize)]
pub struct LevelCount {
    pub level: String,
    pub count: i64,
}

fn log_from_row(row: &Row) -> Result<LogRecord, DbError> {
    Ok(LogRecord {
        id: row.try_get("id")?,
        stamp: row.try_get("stamp")?,
        level: row.try_get("level")?,
        message: row.try_get("message")?,
        account: row.try_get("account")?,
        detail: row.try_get("detail")?,
    })
}

static LOG_COLUMNS: &str = "id, stamp, level, message, account, detail";

impl Store {
    pub async fn record_log(
        &self,
        level: &str,
        message: &str,
        account: Option<&str>,
        detail: Option<&str>,
    ) -> Result<(), DbError> {
        log::trace!(
            "Store::record_log( {:?}, {:?}, {:?}, {:?} ) called.",
            level, message, account, detail
        );

        let client = self.connect().await?;
        client.execute(
            "INSERT INTO logs (stamp, level, message, account, detail)
                VALUES ($1, $2, $3, $4, $5)",
            &[&OffsetDateTime::now_utc(), &level, &message, &account, &detail]
        ).await.map_err(|e| DbError::from(e)
            .annotate("Error inserting log record"))?;

        Ok(())
    }

    /// A page of log records, newest first. Pages are 1-based, as the
    /// client counts them.
    pub async fn recent_logs(
        &self,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<LogRecord>, DbError> {
        log::trace!("Store::recent_logs( {}, {} ) called.", page, page_size);

        let offset = (page - 1).max(0) * page_size;
        let client = self.connect().await?;
        let query = format!(
            "SELECT {} FROM logs
                ORDER BY stamp DESC, id DESC
                LIMIT $1 OFFSET $2",
            LOG_COLUMNS
        );
        let rows = client.query(query.as_str(), &[&page_size, &offset]).await?;

        let mut records: Vec<LogRecord> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            records.push(log_from_row(row)?);
        }

        Ok(records)
    }

    /// Like `recent_logs()`, but only Error-level records.
    pub async fn error_logs(
        &self,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<LogRecord>, DbError> {
        log::trace!("Store::error_logs( {}, {} ) called.", page, page_size);

        let offset = (page - 1).max(0) * page_size;
        let client = self.connect().await?;
        let query = format!(
            "SELECT {} FROM logs
                WHERE level = 'Error'
                ORDER BY stamp DESC, id DESC
                LIMIT $1 OFFSET $2",
            LOG_COLUMNS
        );
        let rows = client.query(query.as_str(), &[&page_size, &offset]).await?;

        let mut records: Vec<LogRecord> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            records.push(log_from_row(row)?);
        }

        Ok(records)
    }

    pub async fn count_logs(&self) -> Result<i64, DbError> {
        log::trace!("Store::count_logs() called.");

        let client = self.connect().await?;
        let row = client.query_one("SELECT count(*) FROM logs", &[]).await?;
        Ok(row.try_get(0)?)
    }

    pub async fn count_error_logs(&self) -> Result<i64, DbError> {
        log::trace!("Store::count_error_logs() called.");

        let client = self.connect().await?;
        let row = client.query_one(
            "SELECT count(*) FROM logs WHERE level = 'Error'",
            &[]
        ).await?;
        Ok(row.try_get(0)?)
    }

    /// Counts of all records (and Error records) stamped at or after
    /// the given instant; the dashboard passes midnight UTC.
    pub async fn count_logs_since(
        &self,
        since: OffsetDateTime,
    ) -> Result<(i64, i64), DbError> {
        log::trace!("Store::count_logs_since( {} ) called.", since);

        let client = self.connect().await?;
        let row = client.query_one(
            "SELECT count(*),
                    count(*) FILTER (WHERE level = 'Error')
                FROM logs WHERE stamp >= $1",
            &[&since]
        ).await?;
        Ok((row.try_get(0)?, row.try_get(1)?))
    }

    pub async fn log_level_counts(&self) -> Result<Vec<LevelCount>, DbError> {
        log::trace!("Store::log_level_counts() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT level, count(*) FROM logs
                GROUP BY level ORDER BY level",
            &[]
        ).await?;

        let mut counts: Vec<LevelCount> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            counts.push(LevelCount {
                level: row.try_get(0)?,
                count: row.try_get(1)?,
            });
        }

        Ok(counts)
    }

    /// The whole table, oldest first, for CSV export.
    pub async fn all_logs(&self) -> Result<Vec<LogRecord>, DbError> {
        log::trace!("Store::all_logs() called.");

        let client = self.connect().await?;
        let query = format!(
            "SELECT {} FROM logs ORDER BY stamp, id",
            LOG_COLUMNS
        );
        let rows = client.query(query.as_str(), &[]).await?;

        let mut records: Vec<LogRecord> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            records.push(log_from_row(row)?);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::tests::ensure_logging;
    use crate::store::tests::TEST_CONNECTION;

    static EVENTS: &[(&str, &str)] = &[
        ("Info",  "HTTP POST /api/login responded 200 in 3 ms"),
        ("Info",  "account registered"),
        ("Warn",  "login failed"),
        ("Error", "HTTP GET /api/courses responded 500 in 1 ms"),
        ("Info",  "enrollment committed"),
        ("Error", "store unreachable"),
    ];

    #[tokio::test]
    #[serial]
    async fn record_page_and_tally() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        for (level, message) in EVENTS.iter() {
            db.record_log(level, message, Some("tester"), None)
                .await.unwrap();
        }

        assert_eq!(db.count_logs().await.unwrap(), EVENTS.len() as i64);
        assert_eq!(db.count_error_logs().await.unwrap(), 2);

        // Everything was just written, so "since midnight" is all of it.
        let midnight = OffsetDateTime::now_utc()
            .replace_time(time::Time::MIDNIGHT);
        let (today, today_errors) =
            db.count_logs_since(midnight).await.unwrap();
        assert_eq!((today, today_errors), (EVENTS.len() as i64, 2));

        // Newest first, and pages don't overlap.
        let page1 = db.recent_logs(1, 4).await.unwrap();
        assert_eq!(page1.len(), 4);
        assert_eq!(page1[0].message.as_str(), "store unreachable");
        let page2 = db.recent_logs(2, 4).await.unwrap();
        assert_eq!(page2.len(), 2);
        assert!(page1.iter().all(|r| page2.iter().all(|s| s.id != r.id)));

        let errors = db.error_logs(1, 50).await.unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|r| r.level == "Error"));

        let counts = db.log_level_counts().await.unwrap();
        let info = counts.iter().find(|c| c.level == "Info").unwrap();
        assert_eq!(info.count, 3);

        let all = db.all_logs().await.unwrap();
        assert_eq!(all.len(), EVENTS.len());
        assert_eq!(all[0].message.as_str(), EVENTS[0].1);

        db.nuke_database().await.unwrap();
    }
}
