/*!
The enrollment rule: a student takes exactly three courses, from three
different instructors, and holds at most one such set at a time.

`enroll()` and `replace_enrollment()` run the same gauntlet of checks in
the same order; they differ only in whether an existing enrollment set is
grounds for refusal (`enroll`) or for replacement (`replace_enrollment`).
Every way a request can fail comes back as a distinct `EnrollError`
variant so the caller can tell the user exactly which rule they tripped.
*/
use std::collections::HashSet;

use serde::Serialize;
use uuid::Uuid;

use crate::store::{DbError, Store};

pub const SELECTION_SIZE: usize = 3;

/// One seat: this account occupies this course.
#[derive(Clone, Debug, Serialize)]
pub struct Enrollment {
    pub id: i64,
    pub account: Uuid,
    pub course: i64,
}

/// An enrollment joined with account, course, and instructor detail,
/// the shape the admin views and the student's own listing want.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentDetail {
    pub id: i64,
    pub account_id: Uuid,
    pub account_name: String,
    pub account_email: String,
    pub course_id: i64,
    pub course_name: String,
    pub course_credits: i16,
    pub instructor_id: i64,
    pub instructor_name: String,
}

#[derive(Debug, PartialEq)]
pub enum EnrollError {
    /// The submitted list didn't have exactly 3 entries.
    InvalidSelectionSize,
    /// At least one submitted id matched no course. Duplicate ids
    /// collapse under set resolution and land here too.
    UnknownCourse,
    /// Two of the three selected courses share an instructor.
    DuplicateInstructor,
    /// The account already holds an enrollment set (enroll only).
    AlreadyEnrolled,
    /// The store fell over; nothing about the selection itself.
    Db(DbError),
}

impl std::fmt::Display for EnrollError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            EnrollError::InvalidSelectionSize => write!(
                f, "You must select exactly 3 courses."
            ),
            EnrollError::UnknownCourse => write!(
                f, "One or more selected courses do not exist. Please check your selection."
            ),
            EnrollError::DuplicateInstructor => write!(
                f, "You cannot take two courses from the same instructor. Select courses from 3 different instructors."
            ),
            EnrollError::AlreadyEnrolled => write!(
                f, "You already have an active enrollment. Use the update option to change your courses."
            ),
            EnrollError::Db(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl From<DbError> for EnrollError {
    fn from(e: DbError) -> EnrollError { EnrollError::Db(e) }
}

/// Runs the selection checks shared by both operations and returns the
/// resolved course ids on success.
async fn validate_selection(
    store: &Store,
    course_ids: &[i64],
) -> Result<Vec<i64>, EnrollError> {
    log::trace!("validate_selection( Store, {:?} ) called.", course_ids);

    if course_ids.len() != SELECTION_SIZE {
        return Err(EnrollError::InvalidSelectionSize);
    }

    // Set resolution: duplicates collapse, so a duplicated id shows up
    // as a short resolved list, same as an id that matches nothing.
    let courses = store.resolve_courses(course_ids).await?;
    if courses.len() != SELECTION_SIZE {
        return Err(EnrollError::UnknownCourse);
    }

    let instructors: HashSet<i64> = courses.iter()
        .map(|c| c.instructor)
        .collect();
    if instructors.len() != SELECTION_SIZE {
        return Err(EnrollError::DuplicateInstructor);
    }

    Ok(courses.iter().map(|c| c.id).collect())
}

/**
Enrolls an account in the three submitted courses.

Checks, in order: exactly 3 ids submitted; all 3 resolve to existing
courses; the 3 courses have 3 distinct instructors; the account has no
existing enrollments. The no-existing-enrollments condition is checked
again by the store inside the transaction that inserts, so two
concurrent calls for the same account cannot both commit.
*/
pub async fn enroll(
    store: &Store,
    account: Uuid,
    course_ids: &[i64],
) -> Result<(), EnrollError> {
    log::trace!("enroll( Store, {}, {:?} ) called.", account, course_ids);

    let resolved = validate_selection(store, course_ids).await?;

    let current = store.enrollments_for_account(&account).await?;
    if !current.is_empty() {
        return Err(EnrollError::AlreadyEnrolled);
    }

    if !store.insert_enrollments(&account, &resolved).await? {
        // Somebody else's insert landed between our check and ours.
        return Err(EnrollError::AlreadyEnrolled);
    }

    log::trace!("enroll() committed {} rows for {}.", resolved.len(), account);
    Ok(())
}

/**
Replaces an account's enrollment set with the three submitted courses.

Same selection checks as `enroll()`, but an existing set is expected
rather than refused: the old rows are deleted and the new ones inserted
in a single transaction, so no reader ever sees a half-changed set. It
is also valid when the account has no enrollments yet.
*/
pub async fn replace_enrollment(
    store: &Store,
    account: Uuid,
    course_ids: &[i64],
) -> Result<(), EnrollError> {
    log::trace!(
        "replace_enrollment( Store, {}, {:?} ) called.",
        account, course_ids
    );

    let resolved = validate_selection(store, course_ids).await?;

    store.replace_enrollments(&account, &resolved).await?;

    log::trace!("replace_enrollment() committed for {}.", account);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::account::Role;
    use crate::tests::ensure_logging;
    use crate::store::tests::TEST_CONNECTION;

    /// Five instructors teaching two courses each; returns the course
    /// ids grouped per instructor.
    async fn seed_catalog(db: &Store) -> Vec<[i64; 2]> {
        let mut by_instructor: Vec<[i64; 2]> = Vec::new();
        for n in 0..5 {
            let i = db.insert_instructor(&format!("Instructor {}", n))
                .await.unwrap();
            let a = db.insert_course(&format!("Course {}a", n), 3, i.id)
                .await.unwrap();
            let b = db.insert_course(&format!("Course {}b", n), 3, i.id)
                .await.unwrap();
            by_instructor.push([a.id, b.id]);
        }
        by_instructor
    }

    async fn test_student(db: &Store, email: &str) -> Uuid {
        db.insert_account("Test Student", email, "x", Role::Student)
            .await.unwrap()
    }

    #[tokio::test]
    #[serial]
    async fn selection_size_is_checked_first() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        let courses = seed_catalog(&db).await;
        let stud = test_student(&db, "size@matric.test").await;

        for ids in [
            vec![],
            vec![courses[0][0]],
            vec![courses[0][0], courses[1][0]],
            vec![courses[0][0], courses[1][0], courses[2][0], courses[3][0]],
        ] {
            assert_eq!(
                enroll(&db, stud, &ids).await,
                Err(EnrollError::InvalidSelectionSize)
            );
            assert_eq!(
                replace_enrollment(&db, stud, &ids).await,
                Err(EnrollError::InvalidSelectionSize)
            );
        }
        assert!(db.enrollments_for_account(&stud).await.unwrap().is_empty());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn unknown_and_duplicate_ids() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        let courses = seed_catalog(&db).await;
        let stud = test_student(&db, "unknown@matric.test").await;

        // One id matches nothing.
        assert_eq!(
            enroll(&db, stud, &[courses[0][0], courses[1][0], 999_999]).await,
            Err(EnrollError::UnknownCourse)
        );

        // A duplicated id collapses under set resolution and reports
        // the same way as an unknown one.
        assert_eq!(
            enroll(&db, stud, &[courses[0][0], courses[0][0], courses[1][0]]).await,
            Err(EnrollError::UnknownCourse)
        );
        assert_eq!(
            replace_enrollment(
                &db, stud,
                &[courses[0][0], courses[0][0], courses[1][0]]
            ).await,
            Err(EnrollError::UnknownCourse)
        );

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn instructors_must_be_distinct() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        let courses = seed_catalog(&db).await;
        let stud = test_student(&db, "distinct@matric.test").await;

        // {C1 -> A, C2 -> B, C3 -> A}: instructor A repeated.
        assert_eq!(
            enroll(
                &db, stud,
                &[courses[0][0], courses[1][0], courses[0][1]]
            ).await,
            Err(EnrollError::DuplicateInstructor)
        );
        assert!(db.enrollments_for_account(&stud).await.unwrap().is_empty());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn enroll_once_and_only_once() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        let courses = seed_catalog(&db).await;
        let stud = test_student(&db, "once@matric.test").await;

        let first = [courses[0][0], courses[1][0], courses[2][0]];
        enroll(&db, stud, &first).await.unwrap();

        let rows = db.enrollments_for_account(&stud).await.unwrap();
        assert_eq!(rows.len(), 3);

        // A second valid, distinct-instructor selection still bounces,
        // and the first set stays put.
        let second = [courses[2][1], courses[3][0], courses[4][0]];
        assert_eq!(
            enroll(&db, stud, &second).await,
            Err(EnrollError::AlreadyEnrolled)
        );

        let mut after: Vec<i64> = db.enrollments_for_account(&stud)
            .await.unwrap()
            .iter().map(|e| e.course).collect();
        after.sort();
        let mut expected = first.to_vec();
        expected.sort();
        assert_eq!(after, expected);

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn replacement_is_wholesale() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        let courses = seed_catalog(&db).await;
        let stud = test_student(&db, "replace@matric.test").await;

        let first = [courses[0][0], courses[1][0], courses[2][0]];
        enroll(&db, stud, &first).await.unwrap();

        // {C4 -> C, C5 -> D, C6 -> E}: all distinct, all valid.
        let second = [courses[2][1], courses[3][0], courses[4][0]];
        replace_enrollment(&db, stud, &second).await.unwrap();

        let mut after: Vec<i64> = db.enrollments_for_account(&stud)
            .await.unwrap()
            .iter().map(|e| e.course).collect();
        assert_eq!(after.len(), 3);
        after.sort();
        let mut expected = second.to_vec();
        expected.sort();
        assert_eq!(after, expected);

        // Replacing again leaves exactly the latest set, never an
        // accumulation.
        let third = [courses[0][1], courses[1][1], courses[3][1]];
        replace_enrollment(&db, stud, &third).await.unwrap();
        let after = db.enrollments_for_account(&stud).await.unwrap();
        assert_eq!(after.len(), 3);

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn replace_works_without_prior_enrollment() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        let courses = seed_catalog(&db).await;
        let stud = test_student(&db, "fresh@matric.test").await;

        let set = [courses[0][0], courses[1][0], courses[2][0]];
        replace_enrollment(&db, stud, &set).await.unwrap();
        assert_eq!(
            db.enrollments_for_account(&stud).await.unwrap().len(),
            3
        );

        db.nuke_database().await.unwrap();
    }
}
