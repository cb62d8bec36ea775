/*
`Store` methods et. al. for the course catalog.

```sql
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
```
*/
use std::collections::HashMap;

use tokio_postgres::{Row, types::Type};

use super::{Store, DbError};
use crate::catalog::{Course, CourseDetail, Instructor, InstructorDetail};

fn course_from_row(row: &Row) -> Result<Course, DbError> {
    Ok(Course {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        credits: row.try_get("credits")?,
        instructor: row.try_get("instructor")?,
    })
}

impl Store {
    /**
    Resolves a list of course ids to the courses that actually exist.

    The query has set semantics: duplicate ids in the input collapse to
    a single row in the output, and ids matching nothing contribute
    nothing. Callers that care whether everything resolved compare
    lengths themselves.
    */
    pub async fn resolve_courses(
        &self,
        ids: &[i64],
    ) -> Result<Vec<Course>, DbError> {
        log::trace!("Store::resolve_courses( {:?} ) called.", ids);

        let client = self.connect().await?;
        let stmt = client.prepare_typed(
            "SELECT id, name, credits, instructor FROM courses
                WHERE id = ANY($1)",
            &[Type::INT8_ARRAY]
        ).await?;

        let id_vec: Vec<i64> = ids.to_vec();
        let rows = client.query(&stmt, &[&id_vec]).await?;

        let mut courses: Vec<Course> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            courses.push(course_from_row(row)?);
        }

        log::trace!(
            "Store::resolve_courses() resolved {} of {} submitted ids.",
            courses.len(), ids.len()
        );
        Ok(courses)
    }

    pub async fn get_courses(&self) -> Result<Vec<CourseDetail>, DbError> {
        log::trace!("Store::get_courses() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT c.id, c.name, c.credits, c.instructor,
                    i.name AS instructor_name
                FROM courses c
                JOIN instructors i ON c.instructor = i.id
                ORDER BY c.id",
            &[]
        ).await?;

        let mut courses: Vec<CourseDetail> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            courses.push(CourseDetail {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                credits: row.try_get("credits")?,
                instructor_id: row.try_get("instructor")?,
                instructor_name: row.try_get("instructor_name")?,
            });
        }

        Ok(courses)
    }

    pub async fn course_by_id(
        &self,
        id: i64,
    ) -> Result<Option<Course>, DbError> {
        log::trace!("Store::course_by_id( {} ) called.", id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT id, name, credits, instructor FROM courses
                WHERE id = $1",
            &[&id]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(course_from_row(&row)?)),
        }
    }

    /// Inserts a course; errors if the owning instructor doesn't exist
    /// (the foreign key sees to that).
    pub async fn insert_course(
        &self,
        name: &str,
        credits: i16,
        instructor: i64,
    ) -> Result<Course, DbError> {
        log::trace!(
            "Store::insert_course( {:?}, {}, {} ) called.",
            name, credits, instructor
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO courses (name, credits, instructor)
                VALUES ($1, $2, $3)
                RETURNING id",
            &[&name, &credits, &instructor]
        ).await.map_err(|e| DbError::from(e)
            .annotate("Error inserting course"))?;

        let id: i64 = row.try_get("id")?;
        log::trace!("Inserted course {} ({:?}).", id, name);

        Ok(Course { id, name: name.to_owned(), credits, instructor })
    }

    pub async fn update_course(
        &self,
        id: i64,
        name: &str,
        credits: i16,
        instructor: i64,
    ) -> Result<bool, DbError> {
        log::trace!(
            "Store::update_course( {}, {:?}, {}, {} ) called.",
            id, name, credits, instructor
        );

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE courses SET name = $2, credits = $3, instructor = $4
                WHERE id = $1",
            &[&id, &name, &credits, &instructor]
        ).await.map_err(|e| DbError::from(e)
            .annotate("Error updating course"))?;

        Ok(n == 1)
    }

    /**
    Deletes a course and all enrollments in it, in one transaction.

    Returns `Ok(false)` if there is no course with the given id.
    */
    pub async fn delete_course(&self, id: i64) -> Result<bool, DbError> {
        log::trace!("Store::delete_course( {} ) called.", id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n_enr = t.execute(
            "DELETE FROM enrollments WHERE course = $1",
            &[&id]
        ).await?;

        let n = t.execute(
            "DELETE FROM courses WHERE id = $1",
            &[&id]
        ).await?;

        if n == 0 {
            return Ok(false);
        }

        t.commit().await?;
        log::trace!(
            "Deleted course {} and {} enrollment rows.",
            id, &n_enr
        );
        Ok(true)
    }

    pub async fn get_instructors(&self) -> Result<Vec<InstructorDetail>, DbError> {
        log::trace!("Store::get_instructors() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT i.id, i.name, c.name AS course_name
                FROM instructors i
                LEFT JOIN courses c ON c.instructor = i.id
                ORDER BY i.id, c.id",
            &[]
        ).await?;

        let mut map: HashMap<i64, InstructorDetail> = HashMap::new();
        let mut order: Vec<i64> = Vec::new();

        for row in rows.iter() {
            let id: i64 = row.try_get("id")?;
            if !map.contains_key(&id) {
                map.insert(id, InstructorDetail {
                    id,
                    name: row.try_get("name")?,
                    courses: Vec::new(),
                });
                order.push(id);
            }
            let course_name: Option<String> = row.try_get("course_name")?;
            if let Some(course_name) = course_name {
                map.get_mut(&id).unwrap().courses.push(course_name);
            }
        }

        let instructors: Vec<InstructorDetail> = order.iter()
            .map(|id| map.remove(id).unwrap())
            .collect();

        Ok(instructors)
    }

    pub async fn insert_instructor(
        &self,
        name: &str,
    ) -> Result<Instructor, DbError> {
        log::trace!("Store::insert_instructor( {:?} ) called.", name);

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO instructors (name) VALUES ($1) RETURNING id",
            &[&name]
        ).await.map_err(|e| DbError::from(e)
            .annotate("Error inserting instructor"))?;

        let id: i64 = row.try_get("id")?;
        log::trace!("Inserted instructor {} ({:?}).", id, name);

        Ok(Instructor { id, name: name.to_owned() })
    }

    pub async fn update_instructor(
        &self,
        id: i64,
        name: &str,
    ) -> Result<bool, DbError> {
        log::trace!("Store::update_instructor( {}, {:?} ) called.", id, name);

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE instructors SET name = $2 WHERE id = $1",
            &[&id, &name]
        ).await.map_err(|e| DbError::from(e)
            .annotate("Error updating instructor"))?;

        Ok(n == 1)
    }

    /**
    Deletes an instructor, their courses, and all enrollments in those
    courses, in one transaction.

    Returns `Ok(false)` if there is no instructor with the given id.
    */
    pub async fn delete_instructor(&self, id: i64) -> Result<bool, DbError> {
        log::trace!("Store::delete_instructor( {} ) called.", id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n_enr = t.execute(
            "DELETE FROM enrollments WHERE course IN
                (SELECT id FROM courses WHERE instructor = $1)",
            &[&id]
        ).await?;

        let n_crs = t.execute(
            "DELETE FROM courses WHERE instructor = $1",
            &[&id]
        ).await?;

        let n = t.execute(
            "DELETE FROM instructors WHERE id = $1",
            &[&id]
        ).await?;

        if n == 0 {
            return Ok(false);
        }

        t.commit().await?;
        log::trace!(
            "Deleted instructor {}, {} courses, and {} enrollment rows.",
            id, &n_crs, &n_enr
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::tests::ensure_logging;
    use crate::store::tests::TEST_CONNECTION;

    static INSTRUCTORS: &[&str] = &[
        "Dr. Carla Mendez",
        "Dr. Anna Garber",
        "Mr. Rob Silva",
    ];

    #[tokio::test]
    #[serial]
    async fn catalog_crud() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let mut instructors: Vec<Instructor> = Vec::new();
        for name in INSTRUCTORS.iter() {
            instructors.push(db.insert_instructor(name).await.unwrap());
        }

        let c1 = db.insert_course("Algebra", 3, instructors[0].id)
            .await.unwrap();
        let c2 = db.insert_course("Geometry", 4, instructors[0].id)
            .await.unwrap();
        let c3 = db.insert_course("Rhetoric", 3, instructors[1].id)
            .await.unwrap();

        // A course can't belong to an instructor that isn't there.
        assert!(db.insert_course("Phantom Studies", 3, 999_999)
            .await.is_err());

        let listed = db.get_courses().await.unwrap();
        assert_eq!(listed.len(), 3);
        let geo = listed.iter().find(|c| c.id == c2.id).unwrap();
        assert_eq!(
            (geo.name.as_str(), geo.credits, geo.instructor_name.as_str()),
            ("Geometry", 4, INSTRUCTORS[0])
        );

        let resolved = db.resolve_courses(&[c1.id, c2.id, c3.id])
            .await.unwrap();
        assert_eq!(resolved.len(), 3);
        // Duplicates collapse; unknowns contribute nothing.
        let resolved = db.resolve_courses(&[c1.id, c1.id, 999_999])
            .await.unwrap();
        assert_eq!(resolved.len(), 1);

        assert!(db.update_course(c3.id, "Advanced Rhetoric", 4, instructors[2].id)
            .await.unwrap());
        let c3_after = db.course_by_id(c3.id).await.unwrap().unwrap();
        assert_eq!(
            (c3_after.name.as_str(), c3_after.credits, c3_after.instructor),
            ("Advanced Rhetoric", 4, instructors[2].id)
        );
        assert!(!db.update_course(999_999, "x", 3, instructors[0].id)
            .await.unwrap());

        assert!(db.update_instructor(instructors[1].id, "Dr. Anna Garber-Hale")
            .await.unwrap());
        let detail = db.get_instructors().await.unwrap();
        assert_eq!(detail.len(), 3);
        assert_eq!(
            detail.iter().find(|i| i.id == instructors[0].id)
                .unwrap().courses.len(),
            2
        );

        assert!(db.delete_course(c2.id).await.unwrap());
        assert!(!db.delete_course(c2.id).await.unwrap());
        assert!(db.course_by_id(c2.id).await.unwrap().is_none());

        // Deleting an instructor takes their courses with them.
        assert!(db.delete_instructor(instructors[2].id).await.unwrap());
        assert!(db.course_by_id(c3.id).await.unwrap().is_none());
        assert!(!db.delete_instructor(instructors[2].id).await.unwrap());

        db.nuke_database().await.unwrap();
    }
}
