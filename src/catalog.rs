/*!
The course catalog: instructors and the courses they teach.

Each course is taught by exactly one instructor; an instructor may teach
any number of courses. Course and instructor ids are assigned by the
store.
*/
use serde::{Deserialize, Serialize};

pub const DEFAULT_CREDITS: i16 = 3;

#[derive(Clone, Debug, Serialize)]
pub struct Instructor {
    pub id: i64,
    pub name: String,
}

/// An instructor plus the names of the courses they teach, for listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructorDetail {
    pub id: i64,
    pub name: String,
    pub courses: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub credits: i16,
    /// id of the owning instructor.
    pub instructor: i64,
}

/// A course joined with its instructor's name, for listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDetail {
    pub id: i64,
    pub name: String,
    pub credits: i16,
    pub instructor_id: i64,
    pub instructor_name: String,
}

/// Admin-supplied data for inserting or updating a course.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseData {
    pub name: String,
    pub credits: Option<i16>,
    pub instructor_id: i64,
}

/// Admin-supplied data for inserting or updating an instructor.
#[derive(Debug, Deserialize)]
pub struct InstructorData {
    pub name: String,
}
