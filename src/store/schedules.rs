/*!
`Store` methods for sections, subjects, and the weekly schedule.
*/
use time::Weekday;
use tokio_postgres::Row;

use super::{Store, DbError};
use crate::school::{clean_semester, ScheduleEntry, Section, Subject, TimetableRow};

fn section_from_row(row: &Row) -> Result<Section, DbError> {
    Ok(Section {
        id: row.try_get("id")?,
        strand: row.try_get("strand")?,
        year_level: row.try_get("year_level")?,
        section_name: row.try_get("section_name")?,
        section_type: row.try_get("section_type")?,
        adviser: row.try_get("adviser")?,
    })
}

fn subject_from_row(row: &Row) -> Result<Subject, DbError> {
    Ok(Subject {
        id: row.try_get("id")?,
        subject_title: row.try_get("subject_title")?,
        semester: row.try_get("semester")?,
        teacher_email: row.try_get("teacher_email")?,
    })
}

/// Rows from the joined query in `Store::day_schedule()`.
fn entry_from_row(row: &Row) -> Result<ScheduleEntry, DbError> {
    Ok(ScheduleEntry {
        id: row.try_get("sched_id")?,
        day: row.try_get("day")?,
        time_slot: row.try_get("time_slot")?,
        subject: Subject {
            id: row.try_get("subj_id")?,
            subject_title: row.try_get("subject_title")?,
            semester: row.try_get("semester")?,
            teacher_email: row.try_get("teacher_email")?,
        },
        section: Section {
            id: row.try_get("sect_id")?,
            strand: row.try_get("strand")?,
            year_level: row.try_get("year_level")?,
            section_name: row.try_get("section_name")?,
            section_type: row.try_get("section_type")?,
            adviser: row.try_get("adviser")?,
        },
    })
}

impl Store {
    /// Insert a section, returning its newly-assigned id. `sect.id` is ignored.
    pub async fn insert_section(&self, sect: &Section) -> Result<i64, DbError> {
        log::trace!("Store::insert_section( {:?} ) called.", sect);

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO sections (strand, year_level, section_name, section_type, adviser)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id",
            &[
                &sect.strand, &sect.year_level, &sect.section_name,
                &sect.section_type, &sect.adviser,
            ]
        ).await?;

        let id: i64 = row.try_get("id")?;
        Ok(id)
    }

    /// Insert a subject, returning its newly-assigned id. `subj.id` is ignored.
    pub async fn insert_subject(&self, subj: &Subject) -> Result<i64, DbError> {
        log::trace!("Store::insert_subject( {:?} ) called.", subj);

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO subjects (subject_title, semester, teacher_email)
                VALUES ($1, $2, $3)
                RETURNING id",
            &[&subj.subject_title, &subj.semester, &subj.teacher_email]
        ).await?;

        let id: i64 = row.try_get("id")?;
        Ok(id)
    }

    pub async fn insert_schedule(
        &self,
        day: Weekday,
        time_slot: &str,
        subject_id: i64,
        section_id: i64,
    ) -> Result<i64, DbError> {
        log::trace!(
            "Store::insert_schedule( {}, {:?}, {}, {} ) called.",
            &day, time_slot, &subject_id, &section_id
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO schedules (day, time_slot, subject_id, section_id)
                VALUES ($1, $2, $3, $4)
                RETURNING id",
            &[&day.to_string(), &time_slot, &subject_id, &section_id]
        ).await?;

        let id: i64 = row.try_get("id")?;
        Ok(id)
    }

    /**
    Load a timetable, creating whatever sections and subjects it mentions
    that don't already exist. Loading the same timetable twice changes
    nothing the second time. A row that names an adviser (re)assigns that
    section's adviser.

    Returns the number of new schedule entries. All or nothing.
    */
    pub async fn load_timetable(&self, rows: &[TimetableRow]) -> Result<usize, DbError> {
        log::trace!("Store::load_timetable( [ {} rows ] ) called.", rows.len());

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e).annotate("Unable to begin transaction"))?;

        let mut n_new: usize = 0;
        for row in rows.iter() {
            let sect = &row.section;
            let section_id: i64 = match t.query_opt(
                "UPDATE sections SET adviser = COALESCE($4, adviser)
                    WHERE strand = $1 AND year_level = $2 AND section_name = $3
                    RETURNING id",
                &[&sect.strand, &sect.year_level, &sect.section_name, &sect.adviser]
            ).await? {
                Some(r) => r.try_get("id")?,
                None => t.query_one(
                    "INSERT INTO sections (strand, year_level, section_name, section_type, adviser)
                        VALUES ($1, $2, $3, $4, $5)
                        RETURNING id",
                    &[
                        &sect.strand, &sect.year_level, &sect.section_name,
                        &sect.section_type, &sect.adviser,
                    ]
                ).await?.try_get("id")?,
            };

            let subj = &row.subject;
            let subject_id: i64 = match t.query_opt(
                "SELECT id FROM subjects
                    WHERE subject_title = $1 AND semester = $2 AND teacher_email = $3",
                &[&subj.subject_title, &subj.semester, &subj.teacher_email]
            ).await? {
                Some(r) => r.try_get("id")?,
                None => t.query_one(
                    "INSERT INTO subjects (subject_title, semester, teacher_email)
                        VALUES ($1, $2, $3)
                        RETURNING id",
                    &[&subj.subject_title, &subj.semester, &subj.teacher_email]
                ).await?.try_get("id")?,
            };

            let day = row.day.to_string();
            let existing = t.query_opt(
                "SELECT id FROM schedules
                    WHERE day = $1 AND time_slot = $2 AND subject_id = $3 AND section_id = $4",
                &[&day, &row.time_slot, &subject_id, &section_id]
            ).await?;
            if existing.is_none() {
                t.execute(
                    "INSERT INTO schedules (day, time_slot, subject_id, section_id)
                        VALUES ($1, $2, $3, $4)",
                    &[&day, &row.time_slot, &subject_id, &section_id]
                ).await?;
                n_new += 1;
            }
        }

        t.commit().await
            .map_err(|e| DbError::from(e).annotate("Error committing transaction"))?;

        log::info!("Loaded timetable: {} new schedule entries.", &n_new);
        Ok(n_new)
    }

    /// Sections in which `email` teaches at least one scheduled subject.
    pub async fn sections_for_teacher(&self, email: &str) -> Result<Vec<Section>, DbError> {
        log::trace!("Store::sections_for_teacher( {:?} ) called.", email);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT DISTINCT se.* FROM sections se
                JOIN schedules sc ON sc.section_id = se.id
                JOIN subjects su ON sc.subject_id = su.id
                WHERE su.teacher_email = $1
                ORDER BY se.year_level, se.strand, se.section_name",
            &[&email]
        ).await?;

        let mut sections: Vec<Section> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            sections.push(section_from_row(row)?);
        }
        Ok(sections)
    }

    /**
    Subjects `email` teaches in section `section_id` during `semester`.

    Only the first word of a semester is compared, so "1st" and
    "1st Semester" are the same semester.
    */
    pub async fn subjects_for(
        &self,
        email: &str,
        section_id: i64,
        semester: &str,
    ) -> Result<Vec<Subject>, DbError> {
        log::trace!(
            "Store::subjects_for( {:?}, {}, {:?} ) called.",
            email, &section_id, semester
        );

        let semester = clean_semester(semester);
        let client = self.connect().await?;
        let rows = client.query(
            "SELECT DISTINCT su.* FROM subjects su
                JOIN schedules sc ON sc.subject_id = su.id
                WHERE su.teacher_email = $1
                AND sc.section_id = $2
                AND split_part(su.semester, ' ', 1) = $3
                ORDER BY su.subject_title",
            &[&email, &section_id, &semester]
        ).await?;

        let mut subjects: Vec<Subject> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            subjects.push(subject_from_row(row)?);
        }
        Ok(subjects)
    }

    /// `email`'s schedule for `day`, in no particular order.
    pub async fn day_schedule(
        &self,
        email: &str,
        day: Weekday,
    ) -> Result<Vec<ScheduleEntry>, DbError> {
        log::trace!("Store::day_schedule( {:?}, {} ) called.", email, &day);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT sc.id AS sched_id, sc.day, sc.time_slot,
                    su.id AS subj_id, su.subject_title, su.semester, su.teacher_email,
                    se.id AS sect_id, se.strand, se.year_level, se.section_name,
                    se.section_type, se.adviser
                FROM schedules sc
                JOIN subjects su ON sc.subject_id = su.id
                JOIN sections se ON sc.section_id = se.id
                WHERE su.teacher_email = $1 AND sc.day = $2",
            &[&email, &day.to_string()]
        ).await?;

        let mut entries: Vec<ScheduleEntry> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            entries.push(entry_from_row(row)?);
        }
        Ok(entries)
    }
}
