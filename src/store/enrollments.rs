/*
`Store` methods et. al. for enrollment rows.

```sql
CREATE TABLE enrollments (
    id      BIGSERIAL PRIMARY KEY,
    account UUID NOT NULL REFERENCES accounts(id),
    course  BIGINT NOT NULL REFERENCES courses(id)
);
```

The two mutating methods here are the commit half of the enrollment
rule: `insert_enrollments()` re-checks the zero-rows precondition under
a SERIALIZABLE transaction so racing calls can't both land, and
`replace_enrollments()` does its delete+insert pair inside one
transaction so readers see the old set or the new set and nothing in
between.
*/
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_postgres::{IsolationLevel, Row, Transaction, types::{ToSql, Type}};
use uuid::Uuid;

use super::{Store, DbError};
use crate::enroll::{Enrollment, EnrollmentDetail};

fn enrollment_from_row(row: &Row) -> Result<Enrollment, DbError> {
    Ok(Enrollment {
        id: row.try_get("id")?,
        account: row.try_get("account")?,
        course: row.try_get("course")?,
    })
}

fn detail_from_row(row: &Row) -> Result<EnrollmentDetail, DbError> {
    Ok(EnrollmentDetail {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        account_name: row.try_get("account_name")?,
        account_email: row.try_get("account_email")?,
        course_id: row.try_get("course_id")?,
        course_name: row.try_get("course_name")?,
        course_credits: row.try_get("course_credits")?,
        instructor_id: row.try_get("instructor_id")?,
        instructor_name: row.try_get("instructor_name")?,
    })
}

static DETAIL_QUERY: &str =
    "SELECT e.id, e.account AS account_id, a.name AS account_name,
            a.email AS account_email, e.course AS course_id,
            c.name AS course_name, c.credits AS course_credits,
            c.instructor AS instructor_id, i.name AS instructor_name
        FROM enrollments e
        JOIN accounts a ON e.account = a.id
        JOIN courses c ON e.course = c.id
        JOIN instructors i ON c.instructor = i.id";

/// Inserts one enrollment row per course id, concurrently, on the given
/// transaction. Commit is the caller's job.
async fn insert_rows(
    t: &Transaction<'_>,
    account: &Uuid,
    courses: &[i64],
) -> Result<u64, DbError> {
    let insert_stmt = t.prepare_typed(
        "INSERT INTO enrollments (account, course) VALUES ($1, $2)",
        &[Type::UUID, Type::INT8]
    ).await?;

    /*
    The parameters referenced in the insert statements must be in a
    slice of references, and those slices have to be bound _outside_ the
    async calls being pushed into `FuturesUnordered`, or the borrow
    checker balks. Hence this little parameter-array vector dance.
    */
    let mut n_inserted: u64 = 0;
    {
        let pvec: Vec<[&(dyn ToSql + Sync); 2]> = courses.iter()
            .map(|course_id| {
                let p: [&(dyn ToSql + Sync); 2] = [account, course_id];
                p
            }).collect();

        let mut inserts = FuturesUnordered::new();
        for params in pvec.iter() {
            inserts.push(
                t.execute(&insert_stmt, params)
            );
        }

        while let Some(res) = inserts.next().await {
            match res {
                Ok(_) => { n_inserted += 1; },
                Err(e) => {
                    let estr = format!(
                        "Error inserting enrollment into database: {}", &e
                    );
                    return Err(DbError(estr));
                },
            }
        }
    }

    Ok(n_inserted)
}

impl Store {
    pub async fn enrollments_for_account(
        &self,
        account: &Uuid,
    ) -> Result<Vec<Enrollment>, DbError> {
        log::trace!("Store::enrollments_for_account( {} ) called.", account);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT id, account, course FROM enrollments
                WHERE account = $1",
            &[account]
        ).await?;

        let mut enrollments: Vec<Enrollment> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            enrollments.push(enrollment_from_row(row)?);
        }

        Ok(enrollments)
    }

    /**
    Inserts enrollment rows for the given account, but only if the
    account has none.

    The existence check runs inside the same SERIALIZABLE transaction as
    the inserts, so of two concurrent calls for one account, exactly one
    commits. Returns `Ok(false)` when rows already existed (nothing is
    inserted); all rows land or none do.
    */
    pub async fn insert_enrollments(
        &self,
        account: &Uuid,
        courses: &[i64],
    ) -> Result<bool, DbError> {
        log::trace!(
            "Store::insert_enrollments( {}, {:?} ) called.",
            account, courses
        );

        let mut client = self.connect().await?;
        let t = client.build_transaction()
            .isolation_level(IsolationLevel::Serializable)
            .start().await
            .map_err(|e| DbError::from(e)
                .annotate("Data DB unable to begin transaction"))?;

        let row = t.query_one(
            "SELECT count(*) FROM enrollments WHERE account = $1",
            &[account]
        ).await?;
        let n_existing: i64 = row.try_get(0)?;
        if n_existing > 0 {
            // Dropping the transaction rolls it back.
            return Ok(false);
        }

        let n = insert_rows(&t, account, courses).await?;

        t.commit().await
            .map_err(|e| DbError::from(e)
                .annotate("Error committing enrollment insert"))?;

        log::trace!("Inserted {} enrollment rows for {}.", &n, account);
        Ok(true)
    }

    /**
    Replaces all of an account's enrollment rows with rows for the given
    courses: delete-all-then-insert-all, one transaction. Readers see
    the old set or the new one, never the gap between.
    */
    pub async fn replace_enrollments(
        &self,
        account: &Uuid,
        courses: &[i64],
    ) -> Result<(), DbError> {
        log::trace!(
            "Store::replace_enrollments( {}, {:?} ) called.",
            account, courses
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("Data DB unable to begin transaction"))?;

        let n_old = t.execute(
            "DELETE FROM enrollments WHERE account = $1",
            &[account]
        ).await?;

        let n_new = insert_rows(&t, account, courses).await?;

        t.commit().await
            .map_err(|e| DbError::from(e)
                .annotate("Error committing enrollment replacement"))?;

        log::trace!(
            "Replaced {} enrollment rows with {} for {}.",
            &n_old, &n_new, account
        );
        Ok(())
    }

    /// Every enrollment in the system, joined with account, course, and
    /// instructor detail. The admin's view.
    pub async fn get_enrollments(&self) -> Result<Vec<EnrollmentDetail>, DbError> {
        log::trace!("Store::get_enrollments() called.");

        let client = self.connect().await?;
        let query = format!("{} ORDER BY e.id", DETAIL_QUERY);
        let rows = client.query(query.as_str(), &[]).await?;

        let mut details: Vec<EnrollmentDetail> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            details.push(detail_from_row(row)?);
        }

        Ok(details)
    }

    /// One account's enrollments in the same joined shape.
    pub async fn enrollments_for_account_detailed(
        &self,
        account: &Uuid,
    ) -> Result<Vec<EnrollmentDetail>, DbError> {
        log::trace!(
            "Store::enrollments_for_account_detailed( {} ) called.",
            account
        );

        let client = self.connect().await?;
        let query = format!("{} WHERE e.account = $1 ORDER BY e.id", DETAIL_QUERY);
        let rows = client.query(query.as_str(), &[account]).await?;

        let mut details: Vec<EnrollmentDetail> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            details.push(detail_from_row(row)?);
        }

        Ok(details)
    }

    /// Names of everyone else enrolled in a course; the asking account
    /// is left out of their own classmate list.
    pub async fn classmates(
        &self,
        course: i64,
        except: &Uuid,
    ) -> Result<Vec<String>, DbError> {
        log::trace!(
            "Store::classmates( {}, {} ) called.",
            course, except
        );

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT a.name FROM enrollments e
                JOIN accounts a ON e.account = a.id
                WHERE e.course = $1 AND e.account <> $2
                ORDER BY a.name",
            &[&course, except]
        ).await?;

        let mut names: Vec<String> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            names.push(row.try_get(0)?);
        }

        Ok(names)
    }
}
