/*
`Store` methods et. al. for dealing with account rows.

```sql
CREATE TABLE accounts (
    id     UUID PRIMARY KEY,
    name   TEXT NOT NULL,
    email  TEXT UNIQUE NOT NULL,
    pwhash TEXT NOT NULL,
    role   TEXT NOT NULL    /* one of { 'Student', 'Admin' } */
);
```

Email matching is exact-case everywhere; the store never normalizes what
it is given.
*/
use std::collections::HashMap;

use tokio_postgres::Row;
use uuid::Uuid;

use super::{Store, DbError};
use crate::account::{Account, AccountProfile, Role};

fn account_from_row(row: &Row) -> Result<Account, DbError> {
    log::trace!("account_from_row( {:?} ) called.", row);

    let role_str: &str = row.try_get("role")?;
    let a = Account {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        pwhash: row.try_get("pwhash")?,
        role: role_str.parse()?,
    };

    log::trace!("    ...account_from_row() returning {:?}", &a);
    Ok(a)
}

impl Store {
    /// Exact-match existence check on the email column.
    pub async fn email_exists(&self, email: &str) -> Result<bool, DbError> {
        log::trace!("Store::email_exists( {:?} ) called.", email);

        let client = self.connect().await?;
        let row = client.query_opt(
            "SELECT 1 FROM accounts WHERE email = $1",
            &[&email]
        ).await?;

        Ok(row.is_some())
    }

    /// Inserts a new account row and returns the freshly-assigned id.
    ///
    /// The email-uniqueness rule is enforced twice: the auth engine checks
    /// before calling this, and the UNIQUE constraint catches whatever
    /// races past that check.
    pub async fn insert_account(
        &self,
        name: &str,
        email: &str,
        pwhash: &str,
        role: Role,
    ) -> Result<Uuid, DbError> {
        log::trace!(
            "Store::insert_account( {:?}, {:?}, [ pwhash ], {} ) called.",
            name, email, role
        );

        let id = Uuid::new_v4();
        let client = self.connect().await?;
        client.execute(
            "INSERT INTO accounts (id, name, email, pwhash, role)
                VALUES ($1, $2, $3, $4, $5)",
            &[&id, &name, &email, &pwhash, &role.to_string()]
        ).await.map_err(|e| DbError::from(e)
            .annotate("Error inserting account"))?;

        log::trace!("Inserted {} {:?} ({}).", role, name, email);
        Ok(id)
    }

    pub async fn account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Account>, DbError> {
        log::trace!("Store::account_by_email( {:?} ) called.", email);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT id, name, email, pwhash, role FROM accounts
                WHERE email = $1",
            &[&email]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(account_from_row(&row)?)),
        }
    }

    pub async fn account_by_id(
        &self,
        id: &Uuid,
    ) -> Result<Option<Account>, DbError> {
        log::trace!("Store::account_by_id( {} ) called.", id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT id, name, email, pwhash, role FROM accounts
                WHERE id = $1",
            &[id]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(account_from_row(&row)?)),
        }
    }

    /**
    Returns every account as an `AccountProfile` (no password digest),
    each with the names of the courses it is enrolled in.

    A student is enrolled in exactly 3 courses or none at all, so the
    course-name lists come back with length 3 or 0.
    */
    pub async fn get_accounts(&self) -> Result<Vec<AccountProfile>, DbError> {
        log::trace!("Store::get_accounts() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT a.id, a.name, a.email, a.role, c.name AS course_name
                FROM accounts a
                LEFT JOIN enrollments e ON e.account = a.id
                LEFT JOIN courses c ON e.course = c.id
                ORDER BY a.name",
            &[]
        ).await?;

        let mut map: HashMap<Uuid, AccountProfile> = HashMap::new();
        let mut order: Vec<Uuid> = Vec::new();

        for row in rows.iter() {
            let id: Uuid = row.try_get("id")?;
            if !map.contains_key(&id) {
                let role_str: &str = row.try_get("role")?;
                map.insert(id, AccountProfile {
                    id,
                    name: row.try_get("name")?,
                    email: row.try_get("email")?,
                    role: role_str.parse()?,
                    courses: Vec::new(),
                });
                order.push(id);
            }
            let course_name: Option<String> = row.try_get("course_name")?;
            if let Some(course_name) = course_name {
                // Unwrapping is fine; we just ensured the entry exists.
                map.get_mut(&id).unwrap().courses.push(course_name);
            }
        }

        let profiles: Vec<AccountProfile> = order.iter()
            .map(|id| map.remove(id).unwrap())
            .collect();

        log::trace!("Store::get_accounts() returns {} profiles.", profiles.len());
        Ok(profiles)
    }

    /// Same shape as `get_accounts()`, but for a single account.
    pub async fn account_profile(
        &self,
        id: &Uuid,
    ) -> Result<Option<AccountProfile>, DbError> {
        log::trace!("Store::account_profile( {} ) called.", id);

        let a = match self.account_by_id(id).await? {
            None => { return Ok(None); },
            Some(a) => a,
        };

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT c.name FROM enrollments e
                JOIN courses c ON e.course = c.id
                WHERE e.account = $1",
            &[id]
        ).await?;

        let mut courses: Vec<String> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            courses.push(row.try_get(0)?);
        }

        Ok(Some(AccountProfile {
            id: a.id,
            name: a.name,
            email: a.email,
            role: a.role,
            courses,
        }))
    }

    /**
    Deletes an account and everything hanging off it.

    Enrollment rows referencing the account go first, then the account
    row itself, all in one transaction. Returns `Ok(false)` if there is
    no account with the given id.
    */
    pub async fn delete_account(&self, id: &Uuid) -> Result<bool, DbError> {
        log::trace!("Store::delete_account( {} ) called.", id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n_enr = t.execute(
            "DELETE FROM enrollments WHERE account = $1",
            &[id]
        ).await?;

        let n = t.execute(
            "DELETE FROM accounts WHERE id = $1",
            &[id]
        ).await?;

        if n == 0 {
            // The transaction rolls back on drop, not that there is
            // anything to roll back if the account never existed.
            return Ok(false);
        }

        t.commit().await?;
        log::trace!(
            "Deleted account {} and {} enrollment rows.",
            id, &n_enr
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

    static ACCOUNTS: &[(&str, &str, Role)] = &[
        ("Thelma Warner", "thelma@matric.test", Role::Admin),
        ("Dan Jones",     "dan@matric.test",    Role::Student),
        ("Berro Nguyen",  "berro@matric.test",  Role::Student),
    ];

    #[tokio::test]
    #[serial]
    async fn insert_and_fetch_accounts() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let mut ids: Vec<Uuid> = Vec::new();
        for (name, email, role) in ACCOUNTS.iter() {
            assert!(!db.email_exists(email).await.unwrap());
            let id = db.insert_account(name, email, "x", *role).await.unwrap();
            assert!(db.email_exists(email).await.unwrap());
            ids.push(id);
        }

        // Email matching is exact-case.
        assert!(!db.email_exists("THELMA@matric.test").await.unwrap());

        for ((name, email, role), id) in ACCOUNTS.iter().zip(ids.iter()) {
            let a = db.account_by_email(email).await.unwrap().unwrap();
            assert_eq!(
                (*name, *email, *role, *id),
                (a.name.as_str(), a.email.as_str(), a.role, a.id)
            );
            let a = db.account_by_id(id).await.unwrap().unwrap();
            assert_eq!(*email, a.email.as_str());
        }

        let profiles = db.get_accounts().await.unwrap();
        assert_eq!(profiles.len(), ACCOUNTS.len());
        for p in profiles.iter() {
            assert!(p.courses.is_empty());
        }

        for id in ids.iter() {
            assert!(db.delete_account(id).await.unwrap());
            assert!(db.account_by_id(id).await.unwrap().is_none());
        }
        assert!(!db.delete_account(&Uuid::new_v4()).await.unwrap());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn duplicate_email_insert_fails() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let id = db.insert_account(
            "First Holder", "taken@matric.test", "x", Role::Student
        ).await.unwrap();

        // The UNIQUE constraint is the backstop behind the engine's
        // email_exists() precheck.
        assert!(db.insert_account(
            "Second Comer", "taken@matric.test", "x", Role::Student
        ).await.is_err());

        assert!(db.delete_account(&id).await.unwrap());
        db.nuke_database().await.unwrap();
    }
}
