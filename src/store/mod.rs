/*!
Database interaction module.

The Postgres data database holds everything except credentials (for
those, see `auth`).

```sql
CREATE TABLE teachers (
    email           TEXT PRIMARY KEY,
    status          TEXT NOT NULL,  /* one of { 'Pending', 'Approved', 'Rejected' } */
    is_logged_in    BOOL NOT NULL,
    honorific       TEXT,
    firstname       TEXT NOT NULL,
    middlename      TEXT,
    surname         TEXT NOT NULL,
    suffix          TEXT,
    post_nominals   TEXT
);

CREATE TABLE students (
    lrn             TEXT PRIMARY KEY,
    fname           TEXT NOT NULL,
    mname           TEXT,
    lname           TEXT NOT NULL,
    ename           TEXT,
    sex             TEXT,
    strand          TEXT NOT NULL,
    grade_level     SMALLINT NOT NULL,
    section         TEXT NOT NULL,
    roster          TEXT NOT NULL,  /* one of { 'Regular', 'ALS' } */
    bday            DATE,
    age             SMALLINT,
    indigenous      BOOL NOT NULL,
    four_ps         BOOL NOT NULL,
    house_number    TEXT,
    street          TEXT,
    barangay        TEXT,
    municipality    TEXT,
    province        TEXT,
    father_last     TEXT,
    father_first    TEXT,
    father_number   TEXT,
    mother_last     TEXT,
    mother_first    TEXT,
    mother_number   TEXT,
    guardian_last   TEXT,
    guardian_first  TEXT,
    guardian_number TEXT
);

CREATE TABLE sections (
    id              BIGSERIAL PRIMARY KEY,
    strand          TEXT NOT NULL,
    year_level      SMALLINT NOT NULL,
    section_name    TEXT NOT NULL,
    section_type    TEXT NOT NULL,
    adviser         TEXT            /* display name, NULL if unassigned */
);

CREATE TABLE subjects (
    id              BIGSERIAL PRIMARY KEY,
    subject_title   TEXT NOT NULL,
    semester        TEXT NOT NULL,
    teacher_email   TEXT NOT NULL
);

CREATE TABLE schedules (
    id              BIGSERIAL PRIMARY KEY,
    day             TEXT NOT NULL,
    time_slot       TEXT NOT NULL,
    subject_id      BIGINT REFERENCES subjects(id),
    section_id      BIGINT REFERENCES sections(id)
);

CREATE TABLE grades (
    id              BIGSERIAL PRIMARY KEY,
    student_lrn     TEXT REFERENCES students(lrn),
    section_id      BIGINT REFERENCES sections(id),
    subject_id      BIGINT REFERENCES subjects(id),
    q1              REAL,
    q2              REAL,
    q3              REAL,
    q4              REAL,
    UNIQUE (student_lrn, section_id, subject_id)
);
```
*/
use std::fmt::Write;

use tokio_postgres::{Client, NoTls};

use crate::feed::Feed;

pub mod grades;
pub mod schedules;
pub mod students;
pub mod teachers;

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'teachers'",
        "CREATE TABLE teachers (
            email           TEXT PRIMARY KEY,
            status          TEXT NOT NULL,
            is_logged_in    BOOL NOT NULL DEFAULT FALSE,
            honorific       TEXT,
            firstname       TEXT NOT NULL,
            middlename      TEXT,
            surname         TEXT NOT NULL,
            suffix          TEXT,
            post_nominals   TEXT
        )",
        "DROP TABLE teachers",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'students'",
        "CREATE TABLE students (
            lrn             TEXT PRIMARY KEY,
            fname           TEXT NOT NULL,
            mname           TEXT,
            lname           TEXT NOT NULL,
            ename           TEXT,
            sex             TEXT,
            strand          TEXT NOT NULL,
            grade_level     SMALLINT NOT NULL,
            section         TEXT NOT NULL,
            roster          TEXT NOT NULL,
            bday            DATE,
            age             SMALLINT,
            indigenous      BOOL NOT NULL DEFAULT FALSE,
            four_ps         BOOL NOT NULL DEFAULT FALSE,
            house_number    TEXT,
            street          TEXT,
            barangay        TEXT,
            municipality    TEXT,
            province        TEXT,
            father_last     TEXT,
            father_first    TEXT,
            father_number   TEXT,
            mother_last     TEXT,
            mother_first    TEXT,
            mother_number   TEXT,
            guardian_last   TEXT,
            guardian_first  TEXT,
            guardian_number TEXT
        )",
        "DROP TABLE students",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'sections'",
        "CREATE TABLE sections (
            id              BIGSERIAL PRIMARY KEY,
            strand          TEXT NOT NULL,
            year_level      SMALLINT NOT NULL,
            section_name    TEXT NOT NULL,
            section_type    TEXT NOT NULL,
            adviser         TEXT
        )",
        "DROP TABLE sections",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'subjects'",
        "CREATE TABLE subjects (
            id              BIGSERIAL PRIMARY KEY,
            subject_title   TEXT NOT NULL,
            semester        TEXT NOT NULL,
            teacher_email   TEXT NOT NULL
        )",
        "DROP TABLE subjects",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'schedules'",
        "CREATE TABLE schedules (
            id              BIGSERIAL PRIMARY KEY,
            day             TEXT NOT NULL,
            time_slot       TEXT NOT NULL,
            subject_id      BIGINT REFERENCES subjects(id),
            section_id      BIGINT REFERENCES sections(id)
        )",
        "DROP TABLE schedules",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'grades'",
        "CREATE TABLE grades (
            id              BIGSERIAL PRIMARY KEY,
            student_lrn     TEXT REFERENCES students(lrn),
            section_id      BIGINT REFERENCES sections(id),
            subject_id      BIGINT REFERENCES subjects(id),
            q1              REAL,
            q2              REAL,
            q3              REAL,
            q4              REAL,
            UNIQUE (student_lrn, section_id, subject_id)
        )",
        "DROP TABLE grades",
    ),
];

#[derive(Debug, PartialEq)]
pub struct DbError(String);

impl DbError {
    /// Prepend some contextual `annotation` for the error.
    pub fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }

    pub fn display(&self) -> &str { &self.0 }
}

impl From<tokio_postgres::error::Error> for DbError {
    fn from(e: tokio_postgres::error::Error) -> DbError {
        let mut s = format!("DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            // Writing to a String can't fail.
            let _ = write!(&mut s, "; {}", dbe);
        }
        DbError(s)
    }
}

impl From<String> for DbError {
    fn from(s: String) -> DbError { DbError(s) }
}

pub struct Store {
    connection_string: String,
    feed: Feed,
}

impl Store {
    pub fn new(connection_string: String, feed: Feed) -> Self {
        log::trace!("Store::new( {:?} ) called.", &connection_string);

        Self { connection_string, feed }
    }

    /// The `Feed` on which this `Store` announces changes.
    pub fn feed(&self) -> &Feed { &self.feed }

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
                Err(dberr.annotate("Unable to connect to Data DB"))
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
            if t.query_opt(*test_stmt, &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to insert table.",
                    test_stmt
                );
                t.execute(*create_stmt, &[]).await?;
            }
        }

        t.commit().await
            .map_err(|e| DbError::from(e)
                .annotate("Error committing transaction"))
    }

    /**
    Drop all database tables to fully reset database state.

    This is only meant for cleanup after testing. It is advisable to look at
    the ERROR level log output when testing to ensure this method did its job.
    */
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), DbError> {
        log::trace!("Store::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(*drop_stmt, &[]).await {
                let err = DbError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err.display());
            }
        }

        log::trace!("    ....nuking complete.");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    /*!
    These tests assume you have a Postgres instance running on your local
    machine with resources named according to what you see in the
    `static TEST_CONNECTION &str`:

    ```text
    user: lis_test
    password: lis_test

    with write access to:

    database: lis_store_test
    ```

    They are ignored by default; run them with

    ```bash
    cargo test -- --ignored
    ```
    */
    use super::*;
    use crate::tests::ensure_logging;

    use serial_test::serial;

    pub static TEST_CONNECTION: &str = "host=localhost user=lis_test password='lis_test' dbname=lis_store_test";

    pub fn test_store() -> Store {
        Store::new(TEST_CONNECTION.to_owned(), Feed::new())
    }

    /**
    This function is for getting the database back in a blank slate state if
    a test panics partway through and leaves it munged.

    ```bash
    cargo test reset_store -- --ignored
    ```
    */
    #[tokio::test]
    #[ignore]
    #[serial]
    async fn reset_store() {
        ensure_logging();
        let db = test_store();
        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn create_store() {
        ensure_logging();

        let db = test_store();
        db.ensure_db_schema().await.unwrap();
        // Idempotent.
        db.ensure_db_schema().await.unwrap();
        db.nuke_database().await.unwrap();
    }

    #[test]
    fn annotations() {
        let e = DbError::from("no such row".to_owned()).annotate("Looking up LRN");
        assert_eq!(e.display(), "Looking up LRN: no such row");
    }
}
