/*!
`Store` methods for reading and saving quarterly grades.

```sql
CREATE TABLE grades (
    id          BIGSERIAL PRIMARY KEY,
    student_lrn TEXT REFERENCES students(lrn),
    section_id  BIGINT REFERENCES sections(id),
    subject_id  BIGINT REFERENCES subjects(id),
    q1          REAL,
    q2          REAL,
    q3          REAL,
    q4          REAL,
    UNIQUE (student_lrn, section_id, subject_id)
);
```
*/
use std::collections::HashMap;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_postgres::{Row, types::{ToSql, Type}};

use super::{Store, DbError};
use crate::{
    feed::Change,
    grade::{validate_all, GradeRecord, Quarters},
};

fn grade_from_row(row: &Row) -> Result<GradeRecord, DbError> {
    Ok(GradeRecord {
        id: row.try_get("id")?,
        lrn: row.try_get("student_lrn")?,
        section_id: row.try_get("section_id")?,
        subject_id: row.try_get("subject_id")?,
        quarters: Quarters {
            q1: row.try_get("q1")?,
            q2: row.try_get("q2")?,
            q3: row.try_get("q3")?,
            q4: row.try_get("q4")?,
        },
    })
}

impl Store {
    pub async fn get_grades(
        &self,
        section_id: i64,
        subject_id: i64,
    ) -> Result<Vec<GradeRecord>, DbError> {
        log::trace!("Store::get_grades( {}, {} ) called.", &section_id, &subject_id);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM grades WHERE section_id = $1 AND subject_id = $2",
            &[&section_id, &subject_id]
        ).await?;

        let mut records: Vec<GradeRecord> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            records.push(grade_from_row(row)?);
        }
        Ok(records)
    }

    /**
    Save a batch of grades for one (section, subject).

    Each student's row is created if it doesn't exist yet; otherwise all
    four of its quarters are overwritten, absent ones with NULL. The whole
    batch is checked first, and nothing is written if any score is out of
    range. Returns the number of rows written.
    */
    pub async fn upsert_grades(
        &self,
        section_id: i64,
        subject_id: i64,
        grades: &HashMap<String, Quarters>,
    ) -> Result<usize, DbError> {
        log::trace!(
            "Store::upsert_grades( {}, {}, [ {} grades ] ) called.",
            &section_id, &subject_id, grades.len()
        );

        if grades.is_empty() {
            return Ok(0);
        }
        validate_all(grades)?;

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let upsert_stmt = t.prepare_typed(
            "INSERT INTO grades (student_lrn, section_id, subject_id, q1, q2, q3, q4)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (student_lrn, section_id, subject_id) DO UPDATE SET
                q1 = EXCLUDED.q1,
                q2 = EXCLUDED.q2,
                q3 = EXCLUDED.q3,
                q4 = EXCLUDED.q4",
            &[
                Type::TEXT, Type::INT8, Type::INT8,
                Type::FLOAT4, Type::FLOAT4, Type::FLOAT4, Type::FLOAT4,
            ]
        ).await?;

        let pvec: Vec<[&(dyn ToSql + Sync); 7]> = grades.iter()
            .map(|(lrn, q)| {
                let p: [&(dyn ToSql + Sync); 7] = [
                    lrn, &section_id, &subject_id,
                    &q.q1, &q.q2, &q.q3, &q.q4,
                ];
                p
            }).collect();

        let mut n_written: u64 = 0;
        {
            let mut upserts = FuturesUnordered::new();
            for params in pvec.iter() {
                upserts.push(t.execute(&upsert_stmt, params));
            }

            while let Some(res) = upserts.next().await {
                match res {
                    Ok(n) => { n_written += n; },
                    Err(e) => {
                        return Err(DbError::from(e).annotate("Error saving grade"));
                    },
                }
            }
        }

        t.commit().await?;

        log::trace!("Wrote {} grade rows.", &n_written);
        self.feed.publish(Change::Grades { section_id, subject_id });
        Ok(n_written as usize)
    }
}
