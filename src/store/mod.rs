/*!
Database interaction module.

The Postgres database to which this connects is meant to have the
following tables.

```sql

CREATE TABLE accounts (
    id     UUID PRIMARY KEY,
    name   TEXT NOT NULL,
    email  TEXT UNIQUE NOT NULL,   /* exact-case match everywhere */
    pwhash TEXT NOT NULL,
    role   TEXT NOT NULL           /* one of { 'Student', 'Admin' } */
);

CREATE TABLE instructors (
    id   BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE courses (
    id         BIGSERIAL PRIMARY KEY,
    name       TEXT NOT NULL,
    credits    SMALLINT NOT NULL,
    instructor BIGINT NOT NULL REFERENCES instructors(id)
);

CREATE TABLE enrollments (
    id      BIGSERIAL PRIMARY KEY,
    account UUID NOT NULL REFERENCES accounts(id),
    course  BIGINT NOT NULL REFERENCES courses(id)
);

CREATE TABLE logs (
    id      BIGSERIAL PRIMARY KEY,
    stamp   TIMESTAMPTZ NOT NULL,
    level   TEXT NOT NULL,
    message TEXT NOT NULL,
    account TEXT,
    detail  TEXT
);
```

Deletes never leave dangling enrollment rows; the `delete_*` methods
remove dependent rows in the same transaction rather than leaning on
`ON DELETE CASCADE`, so the row counts can be logged.
*/
use std::fmt::Write;

use tokio_postgres::{Client, NoTls};

pub mod accounts;
pub mod catalog;
pub mod enrollments;
pub mod logs;
pub mod seed;

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'accounts'",
        "CREATE TABLE accounts (
            id     UUID PRIMARY KEY,
            name   TEXT NOT NULL,
            email  TEXT UNIQUE NOT NULL,
            pwhash TEXT NOT NULL,
            role   TEXT NOT NULL
        )",
        "DROP TABLE accounts",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'instructors'",
        "CREATE TABLE instructors (
            id   BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL
        )",
        "DROP TABLE instructors",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'courses'",
        "CREATE TABLE courses (
            id         BIGSERIAL PRIMARY KEY,
            name       TEXT NOT NULL,
            credits    SMALLINT NOT NULL,
            instructor BIGINT NOT NULL REFERENCES instructors(id)
        )",
        "DROP TABLE courses",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'enrollments'",
        "CREATE TABLE enrollments (
            id      BIGSERIAL PRIMARY KEY,
            account UUID NOT NULL REFERENCES accounts(id),
            course  BIGINT NOT NULL REFERENCES courses(id)
        )",
        "DROP TABLE enrollments",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'logs'",
        "CREATE TABLE logs (
            id      BIGSERIAL PRIMARY KEY,
            stamp   TIMESTAMPTZ NOT NULL,
            level   TEXT NOT NULL,
            message TEXT NOT NULL,
            account TEXT,
            detail  TEXT
        )",
        "DROP TABLE logs",
    ),
];

#[derive(Debug, PartialEq)]
pub struct DbError(pub String);

impl DbError {
    /// Prepend some contextual `annotation` for the error.
    pub fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }

    pub fn display(&self) -> &str { &self.0 }
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl From<tokio_postgres::error::Error> for DbError {
    fn from(e: tokio_postgres::error::Error) -> DbError {
        let mut s = format!("Data DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            write!(&mut s, "; {}", dbe).unwrap();
        }
        DbError(s)
    }
}

impl From<String> for DbError {
    fn from(s: String) -> DbError { DbError(s) }
}

pub struct Store {
    connection_string: String,
}

impl Store {
    pub fn new(connection_string: String) -> Self {
        log::trace!("Store::new( {:?} ) called.", &connection_string);

        Self { connection_string }
    }

    async fn connect(&self) -> Result<Client, DbError> {
        log::trace!(
            "Store::connect() called w/connection string {:?}",
            &self.connection_string
        );

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                log::trace!("    ...connection successful.");
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("Data DB connection error: {}", &e);
                    } else {
                        log::trace!("tokio connection runtime drops.");
                    }
                });
                Ok(client)
            },
            Err(e) => {
                let dberr = DbError::from(e);
                log::trace!("    ...connection failed: {:?}", &dberr);
                Err(dberr.annotate("Unable to connect"))
            }
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), DbError> {
        log::trace!("Store::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("Data DB unable to begin transaction"))?;

        for (test_stmt, create_stmt, _) in SCHEMA.iter() {
            if t.query_opt(test_stmt.to_owned(), &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to insert table.",
                    test_stmt
                );
                t.execute(create_stmt.to_owned(), &[]).await?;
            }
        }

        t.commit().await
            .map_err(|e| DbError::from(e)
                .annotate("Error committing transaction"))
    }

    /**
    Drop all database tables to fully reset database state.

    This is only meant for cleanup after testing. It is advisable to look
    at the ERROR level log output when testing to ensure this method did
    its job.
    */
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), DbError> {
        log::trace!("Store::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(drop_stmt.to_owned(), &[]).await {
                let err = DbError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err.display());
            }
        }

        log::trace!("    ...nuking complete.");
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    /*!
    These tests assume you have a Postgres instance running on your local
    machine with resources named according to what you see in the
    `pub static TEST_CONNECTION: &str`:

    ```text
    user: matric_test
    password: matric_test

    with write access to:

    database: matric_test
    ```
    */
    use super::*;
    use crate::tests::ensure_logging;

    use serial_test::serial;

    pub static TEST_CONNECTION: &str = "host=localhost user=matric_test password='matric_test' dbname=matric_test";

    /**
    This function is for getting the database back in a blank slate state
    if a test panics partway through and leaves it munged.

    ```bash
    cargo test reset_store -- --ignored
    ```
    */
    #[tokio::test]
    #[ignore]
    #[serial]
    async fn reset_store() {
        ensure_logging();
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn create_store() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        db.nuke_database().await.unwrap();
    }
}
