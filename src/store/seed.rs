/*
Starter catalog data.

A fresh database is useless until an admin builds a catalog, so startup
plants a small one: five instructors teaching two courses each, three
credits apiece. If any instructor row exists the store is assumed to be
somebody's real data and is left entirely alone.
*/
use tokio_postgres::types::Type;

use super::{Store, DbError};
use crate::catalog::DEFAULT_CREDITS;

static SEED_INSTRUCTORS: &[(&str, [&str; 2])] = &[
    ("Dr. Carlos Mendoza",  ["Mathematics I", "Physics I"]),
    ("Dr. Ana Garcia",      ["Programming I", "Databases"]),
    ("Ing. Roberto Silva",  ["Technical English", "Communication"]),
    ("Lic. Maria Lopez",    ["Statistics", "Research Methods"]),
    ("MSc. Juan Perez",     ["Professional Ethics", "Project Management"]),
];

impl Store {
    /**
    Seeds the starter catalog if, and only if, the instructor table is
    empty. Returns the number of courses planted (0 on the no-op path).
    */
    pub async fn ensure_seed_catalog(&self) -> Result<usize, DbError> {
        log::trace!("Store::ensure_seed_catalog() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("Data DB unable to begin transaction"))?;

        if t.query_opt("SELECT id FROM instructors LIMIT 1", &[])
            .await?.is_some()
        {
            log::trace!("Instructors present; not seeding.");
            return Ok(0);
        }

        let instructor_stmt = t.prepare_typed(
            "INSERT INTO instructors (name) VALUES ($1) RETURNING id",
            &[Type::TEXT]
        ).await?;
        let course_stmt = t.prepare_typed(
            "INSERT INTO courses (name, credits, instructor)
                VALUES ($1, $2, $3)",
            &[Type::TEXT, Type::INT2, Type::INT8]
        ).await?;

        let mut n_courses: usize = 0;
        for (instructor_name, course_names) in SEED_INSTRUCTORS.iter() {
            let row = t.query_one(&instructor_stmt, &[instructor_name]).await?;
            let instructor_id: i64 = row.try_get("id")?;

            for course_name in course_names.iter() {
                t.execute(
                    &course_stmt,
                    &[course_name, &DEFAULT_CREDITS, &instructor_id]
                ).await?;
                n_courses += 1;
            }
        }

        t.commit().await
            .map_err(|e| DbError::from(e)
                .annotate("Error committing seed data"))?;

        log::info!(
            "Seeded {} instructors and {} courses.",
            SEED_INSTRUCTORS.len(), &n_courses
        );
        Ok(n_courses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::tests::ensure_logging;
    use crate::store::tests::TEST_CONNECTION;

    #[tokio::test]
    #[serial]
    async fn seeding_is_idempotent() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        assert_eq!(db.ensure_seed_catalog().await.unwrap(), 10);

        let instructors = db.get_instructors().await.unwrap();
        assert_eq!(instructors.len(), 5);
        for i in instructors.iter() {
            assert_eq!(i.courses.len(), 2);
        }
        let courses = db.get_courses().await.unwrap();
        assert_eq!(courses.len(), 10);
        assert!(courses.iter().all(|c| c.credits == DEFAULT_CREDITS));

        // Going again plants nothing new.
        assert_eq!(db.ensure_seed_catalog().await.unwrap(), 0);
        assert_eq!(db.get_courses().await.unwrap().len(), 10);

        db.nuke_database().await.unwrap();
    }
}
