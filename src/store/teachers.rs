/*!
`Store` methods for teacher accounts.

```sql
CREATE TABLE teachers (
    email           TEXT PRIMARY KEY,
    status          TEXT NOT NULL,
    is_logged_in    BOOL NOT NULL,
    honorific       TEXT,
    firstname       TEXT NOT NULL,
    middlename      TEXT,
    surname         TEXT NOT NULL,
    suffix          TEXT,
    post_nominals   TEXT
);
```
*/
use tokio_postgres::Row;

use super::{Store, DbError};
use crate::{
    feed::Change,
    user::{Profile, Status, Teacher},
};

fn teacher_from_row(row: &Row) -> Result<Teacher, DbError> {
    log::trace!("teacher_from_row( {:?} ) called", row);

    let status_str: &str = row.try_get("status")?;
    let profile = Profile {
        honorific: row.try_get("honorific")?,
        firstname: row.try_get("firstname")?,
        middlename: row.try_get("middlename")?,
        surname: row.try_get("surname")?,
        suffix: row.try_get("suffix")?,
        post_nominals: row.try_get("post_nominals")?,
    };

    Ok(Teacher {
        email: row.try_get("email")?,
        status: status_str.parse()?,
        is_logged_in: row.try_get("is_logged_in")?,
        profile,
    })
}

impl Store {
    /**
    Add a new teacher with status `Pending`.

    Returns `false` (and changes nothing) if there's already a teacher
    with that email address.
    */
    pub async fn insert_teacher(
        &self,
        email: &str,
        profile: &Profile,
    ) -> Result<bool, DbError> {
        log::trace!("Store::insert_teacher( {:?}, {:?} ) called.", email, profile);

        let client = self.connect().await?;
        let n = client.execute(
            "INSERT INTO teachers (
                email, status, is_logged_in,
                honorific, firstname, middlename, surname, suffix, post_nominals
            )
            VALUES ($1, $2, FALSE, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (email) DO NOTHING",
            &[
                &email, &Status::Pending.to_string(),
                &profile.honorific, &profile.firstname, &profile.middlename,
                &profile.surname, &profile.suffix, &profile.post_nominals,
            ]
        ).await?;

        if n == 0 {
            log::trace!("Teacher {:?} already exists.", email);
            Ok(false)
        } else {
            log::trace!("Inserted Teacher {:?}.", email);
            Ok(true)
        }
    }

    pub async fn get_teacher(&self, email: &str) -> Result<Option<Teacher>, DbError> {
        log::trace!("Store::get_teacher( {:?} ) called.", email);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM teachers WHERE email = $1",
            &[&email]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(teacher_from_row(&row)?)),
        }
    }

    /// All teachers with the given status, by surname.
    pub async fn teachers_with_status(&self, status: Status) -> Result<Vec<Teacher>, DbError> {
        log::trace!("Store::teachers_with_status( {} ) called.", &status);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM teachers WHERE status = $1
                ORDER BY surname, firstname, email",
            &[&status.to_string()]
        ).await?;

        let mut teachers: Vec<Teacher> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            teachers.push(teacher_from_row(row)?);
        }
        Ok(teachers)
    }

    /// Replace a teacher's profile, returning the updated record.
    pub async fn update_profile(
        &self,
        email: &str,
        profile: &Profile,
    ) -> Result<Option<Teacher>, DbError> {
        log::trace!("Store::update_profile( {:?}, {:?} ) called.", email, profile);

        let client = self.connect().await?;
        let row = client.query_opt(
            "UPDATE teachers SET
                honorific = $1, firstname = $2, middlename = $3,
                surname = $4, suffix = $5, post_nominals = $6
            WHERE email = $7
            RETURNING *",
            &[
                &profile.honorific, &profile.firstname, &profile.middlename,
                &profile.surname, &profile.suffix, &profile.post_nominals,
                &email,
            ]
        ).await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let t = teacher_from_row(&row)?;
                self.feed.publish(Change::Profile { email: email.to_owned() });
                Ok(Some(t))
            },
        }
    }

    pub async fn set_logged_in(&self, email: &str, logged_in: bool) -> Result<(), DbError> {
        log::trace!("Store::set_logged_in( {:?}, {} ) called.", email, logged_in);

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE teachers SET is_logged_in = $1 WHERE email = $2",
            &[&logged_in, &email]
        ).await?;

        if n == 0 {
            Err(DbError(format!("There is no teacher {:?}.", email)))
        } else {
            Ok(())
        }
    }

    pub async fn set_status(&self, email: &str, status: Status) -> Result<(), DbError> {
        log::trace!("Store::set_status( {:?}, {} ) called.", email, &status);

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE teachers SET status = $1 WHERE email = $2",
            &[&status.to_string(), &email]
        ).await?;

        if n == 0 {
            Err(DbError(format!("There is no teacher {:?}.", email)))
        } else {
            Ok(())
        }
    }

    pub async fn delete_teacher(&self, email: &str) -> Result<(), DbError> {
        log::trace!("Store::delete_teacher( {:?} ) called.", email);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM teachers WHERE email = $1",
            &[&email]
        ).await?;

        if n == 0 {
            Err(DbError(format!("There is no teacher {:?}.", email)))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::tests::ensure_logging;
    use crate::store::tests::test_store;

    fn liza() -> Profile {
        Profile {
            honorific: Some("Ms.".to_owned()),
            firstname: "Liza".to_owned(),
            middlename: Some("Mercado".to_owned()),
            surname: "Reyes".to_owned(),
            suffix: None,
            post_nominals: Some("LPT".to_owned()),
        }
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn teacher_lifecycle() {
        ensure_logging();

        let db = test_store();
        db.ensure_db_schema().await.unwrap();
        let mut changes = db.feed().subscribe();

        let email = "liza@school.edu.ph";
        assert!(db.insert_teacher(email, &liza()).await.unwrap());
        assert!(!db.insert_teacher(email, &liza()).await.unwrap());

        let t = db.get_teacher(email).await.unwrap().unwrap();
        assert_eq!(t.status, Status::Pending);
        assert!(!t.is_logged_in);
        assert_eq!(t.profile, liza());

        let pending = db.teachers_with_status(Status::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].email, email);
        assert!(db.teachers_with_status(Status::Approved).await.unwrap().is_empty());

        db.set_status(email, Status::Approved).await.unwrap();
        db.set_logged_in(email, true).await.unwrap();
        let t = db.get_teacher(email).await.unwrap().unwrap();
        assert_eq!(t.status, Status::Approved);
        assert!(t.is_logged_in);
        assert!(db.teachers_with_status(Status::Pending).await.unwrap().is_empty());

        let mut p = liza();
        p.surname = "Reyes-Santos".to_owned();
        let t = db.update_profile(email, &p).await.unwrap().unwrap();
        assert_eq!(t.profile.surname, "Reyes-Santos");
        assert_eq!(
            changes.try_recv().unwrap(),
            Change::Profile { email: email.to_owned() }
        );

        assert!(db.get_teacher("nobody@school.edu.ph").await.unwrap().is_none());
        assert!(db.update_profile("nobody@school.edu.ph", &p).await.unwrap().is_none());
        assert!(db.set_status("nobody@school.edu.ph", Status::Approved).await.is_err());

        db.delete_teacher(email).await.unwrap();
        db.nuke_database().await.unwrap();
    }
}
