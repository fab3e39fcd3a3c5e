/*!
`Store` methods for student records and masterlist queries.
*/
use std::fmt::Write;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_postgres::{Row, types::{ToSql, Type}};

use super::{Store, DbError};
use crate::{
    grade::StudentName,
    masterlist::ClassKey,
    user::{Address, Contact, Roster, Student},
};

fn contact_from_row(row: &Row, who: &str) -> Result<Contact, DbError> {
    Ok(Contact {
        last: row.try_get(format!("{}_last", who).as_str())?,
        first: row.try_get(format!("{}_first", who).as_str())?,
        number: row.try_get(format!("{}_number", who).as_str())?,
    })
}

fn student_from_row(row: &Row) -> Result<Student, DbError> {
    let roster_str: &str = row.try_get("roster")?;

    Ok(Student {
        lrn: row.try_get("lrn")?,
        fname: row.try_get("fname")?,
        mname: row.try_get("mname")?,
        lname: row.try_get("lname")?,
        ename: row.try_get("ename")?,
        sex: row.try_get("sex")?,
        strand: row.try_get("strand")?,
        grade_level: row.try_get("grade_level")?,
        section: row.try_get("section")?,
        roster: roster_str.parse()?,
        bday: row.try_get("bday")?,
        age: row.try_get("age")?,
        indigenous: row.try_get("indigenous")?,
        four_ps: row.try_get("four_ps")?,
        address: Address {
            house_number: row.try_get("house_number")?,
            street: row.try_get("street")?,
            barangay: row.try_get("barangay")?,
            municipality: row.try_get("municipality")?,
            province: row.try_get("province")?,
        },
        father: contact_from_row(row, "father")?,
        mother: contact_from_row(row, "mother")?,
        guardian: contact_from_row(row, "guardian")?,
    })
}

fn name_from_row(row: &Row) -> Result<StudentName, DbError> {
    Ok(StudentName {
        lrn: row.try_get("lrn")?,
        lname: row.try_get("lname")?,
        fname: row.try_get("fname")?,
        mname: row.try_get("mname")?,
        ename: row.try_get("ename")?,
    })
}

const N_STUDENT_COLUMNS: usize = 28;

impl Store {
    /**
    Insert a batch of students in a single transaction.

    If any of the LRNs is already in the database, nothing is inserted and
    the error message lists the offenders.
    */
    pub async fn insert_students(
        &self,
        students: &[Student],
    ) -> Result<usize, DbError> {
        log::trace!("Store::insert_students( [ {} students ] ) called.", students.len());

        let new_lrns: Vec<&str> = students.iter()
            .map(|s| s.lrn.as_str())
            .collect();

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let preexisting_query = t.prepare_typed(
            "SELECT lrn, lname, fname FROM students WHERE lrn = ANY($1)",
            &[Type::TEXT_ARRAY]
        ).await?;
        let preexisting_rows = t.query(&preexisting_query, &[&new_lrns]).await?;
        if !preexisting_rows.is_empty() {
            let mut estr = String::from("Database already contains students with the following LRNs:\n");
            for row in preexisting_rows.iter() {
                let lrn: &str = row.try_get("lrn")?;
                let lname: &str = row.try_get("lname")?;
                let fname: &str = row.try_get("fname")?;
                writeln!(&mut estr, "{} ({}, {})", lrn, lname, fname)
                    .map_err(|e| format!(
                        "There was an error preparing an error message: {}", &e
                    ))?;
            }
            return Err(DbError(estr));
        }

        let insert_stmt = t.prepare_typed(
            "INSERT INTO students (
                lrn, fname, mname, lname, ename,
                sex, strand, grade_level, section, roster,
                bday, age, indigenous, four_ps,
                house_number, street, barangay, municipality, province,
                father_last, father_first, father_number,
                mother_last, mother_first, mother_number,
                guardian_last, guardian_first, guardian_number
            )
            VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8, $9, $10,
                $11, $12, $13, $14,
                $15, $16, $17, $18, $19,
                $20, $21, $22,
                $23, $24, $25,
                $26, $27, $28
            )",
            &[
                Type::TEXT, Type::TEXT, Type::TEXT, Type::TEXT, Type::TEXT,
                Type::TEXT, Type::TEXT, Type::INT2, Type::TEXT, Type::TEXT,
                Type::DATE, Type::INT2, Type::BOOL, Type::BOOL,
                Type::TEXT, Type::TEXT, Type::TEXT, Type::TEXT, Type::TEXT,
                Type::TEXT, Type::TEXT, Type::TEXT,
                Type::TEXT, Type::TEXT, Type::TEXT,
                Type::TEXT, Type::TEXT, Type::TEXT,
            ]
        ).await?;

        // The parameter arrays borrow from `rosters`, so it has to outlive
        // the inserts.
        let rosters: Vec<String> = students.iter()
            .map(|s| s.roster.to_string())
            .collect();
        let pvec: Vec<[&(dyn ToSql + Sync); N_STUDENT_COLUMNS]> = students.iter()
            .zip(rosters.iter())
            .map(|(s, roster)| {
                let p: [&(dyn ToSql + Sync); N_STUDENT_COLUMNS] = [
                    &s.lrn, &s.fname, &s.mname, &s.lname, &s.ename,
                    &s.sex, &s.strand, &s.grade_level, &s.section, roster,
                    &s.bday, &s.age, &s.indigenous, &s.four_ps,
                    &s.address.house_number, &s.address.street,
                    &s.address.barangay, &s.address.municipality,
                    &s.address.province,
                    &s.father.last, &s.father.first, &s.father.number,
                    &s.mother.last, &s.mother.first, &s.mother.number,
                    &s.guardian.last, &s.guardian.first, &s.guardian.number,
                ];
                p
            }).collect();

        let mut n_inserted: u64 = 0;
        {
            let mut inserts = FuturesUnordered::new();
            for params in pvec.iter() {
                inserts.push(t.execute(&insert_stmt, params));
            }

            while let Some(res) = inserts.next().await {
                match res {
                    Ok(_) => { n_inserted += 1; },
                    Err(e) => {
                        let estr = format!(
                            "Error inserting student into database: {}", &e
                        );
                        return Err(DbError(estr));
                    },
                }
            }
        }

        t.commit().await?;

        log::trace!("Inserted {} students.", &n_inserted);
        Ok(n_inserted as usize)
    }

    /// Every student in `class` on the given `roster`.
    pub async fn get_class(
        &self,
        class: &ClassKey,
        roster: Roster,
    ) -> Result<Vec<Student>, DbError> {
        log::trace!("Store::get_class( {:?}, {} ) called.", class, &roster);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM students
                WHERE strand = $1 AND section = $2 AND grade_level = $3
                AND roster = $4",
            &[&class.strand, &class.section, &class.year_level, &roster.to_string()]
        ).await?;

        let mut students: Vec<Student> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            students.push(student_from_row(row)?);
        }
        Ok(students)
    }

    /**
    Look up the adviser of the section that matches `class`.

    `None` means there is no such section; `Some(None)` means the section
    exists but has no adviser assigned.
    */
    pub async fn get_adviser(
        &self,
        class: &ClassKey,
    ) -> Result<Option<Option<String>>, DbError> {
        log::trace!("Store::get_adviser( {:?} ) called.", class);

        let client = self.connect().await?;
        let row = client.query_opt(
            "SELECT adviser FROM sections
                WHERE strand = $1 AND section_name = $2 AND year_level = $3
                LIMIT 1",
            &[&class.strand, &class.section, &class.year_level]
        ).await?;

        match row {
            None => Ok(None),
            Some(row) => Ok(Some(row.try_get("adviser")?)),
        }
    }

    /**
    Students to put on the grading sheet for a section: everybody enrolled
    in it, plus anybody who already has a grade recorded there.
    */
    pub async fn students_in_section(
        &self,
        section_id: i64,
    ) -> Result<Vec<StudentName>, DbError> {
        log::trace!("Store::students_in_section( {} ) called.", &section_id);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT st.lrn, st.lname, st.fname, st.mname, st.ename
                FROM students st JOIN sections se
                    ON st.strand = se.strand
                    AND st.grade_level = se.year_level
                    AND st.section = se.section_name
                WHERE se.id = $1
            UNION
            SELECT st.lrn, st.lname, st.fname, st.mname, st.ename
                FROM students st JOIN grades g ON st.lrn = g.student_lrn
                WHERE g.section_id = $1",
            &[&section_id]
        ).await?;

        let mut names: Vec<StudentName> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            names.push(name_from_row(row)?);
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::tests::ensure_logging;
    use crate::store::tests::test_store;
    use crate::school::Section;

    static STUDENT_CSV: &str = "\
100000000001, Cruz,     Ana,    Santos, ,    F, STEM, 11, A, Regular, 2008-03-14, 16
100000000002, Bautista, Paolo,  ,       Jr., M, STEM, 11, A, Regular, 2008-07-02, 16
100000000003, Dela Paz, Carmen, Ramos,  ,    F, STEM, 11, A, ALS
100000000004, Villanueva, Ramon, ,      ,    M, ABM,  11, A, Regular
";

    fn students() -> Vec<Student> {
        Student::vec_from_csv_reader(STUDENT_CSV.as_bytes()).unwrap()
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn insert_and_query() {
        ensure_logging();

        let db = test_store();
        db.ensure_db_schema().await.unwrap();

        let studs = students();
        assert_eq!(db.insert_students(&studs).await.unwrap(), studs.len());
        assert!(db.insert_students(&studs[..1]).await.is_err());

        let class = ClassKey {
            strand: "STEM".to_owned(),
            section: "A".to_owned(),
            year_level: 11,
        };

        let mut regular = db.get_class(&class, Roster::Regular).await.unwrap();
        regular.sort_by(|a, b| a.lrn.cmp(&b.lrn));
        assert_eq!(regular, vec![studs[0].clone(), studs[1].clone()]);

        let als = db.get_class(&class, Roster::Als).await.unwrap();
        assert_eq!(als, vec![studs[2].clone()]);

        assert_eq!(db.get_adviser(&class).await.unwrap(), None);
        db.insert_section(&Section {
            id: 0,
            strand: "STEM".to_owned(),
            year_level: 11,
            section_name: "A".to_owned(),
            section_type: "Regular".to_owned(),
            adviser: None,
        }).await.unwrap();
        assert_eq!(db.get_adviser(&class).await.unwrap(), Some(None));

        db.nuke_database().await.unwrap();
    }
}
