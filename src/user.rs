/*!
Teachers (the users of the system) and the students they teach.
*/
use std::io::Read;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::blank_means_none;

/// Approval status of a teacher account.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub enum Status {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Status::Pending  => "Pending",
            Status::Approved => "Approved",
            Status::Rejected => "Rejected",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending"  => Ok(Status::Pending),
            "Approved" => Ok(Status::Approved),
            "Rejected" => Ok(Status::Rejected),
            _ => Err(format!("{:?} is not a valid Status.", s)),
        }
    }
}

/// The editable part of a teacher's record.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Profile {
    #[serde(default)]
    pub honorific: Option<String>,
    pub firstname: String,
    #[serde(default)]
    pub middlename: Option<String>,
    pub surname: String,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub post_nominals: Option<String>,
}

impl Profile {
    /// Name as it should appear on screen, e.g. "Ms. Liza M. Reyes, LPT".
    pub fn display_name(&self) -> String {
        let mut name = String::new();
        if let Some(h) = blank_means_none(self.honorific.as_deref()) {
            name.push_str(h);
            name.push(' ');
        }
        name.push_str(self.firstname.trim());
        if let Some(m) = blank_means_none(self.middlename.as_deref()) {
            name.push(' ');
            name.push_str(m);
        }
        name.push(' ');
        name.push_str(self.surname.trim());
        if let Some(s) = blank_means_none(self.suffix.as_deref()) {
            name.push(' ');
            name.push_str(s);
        }
        if let Some(p) = blank_means_none(self.post_nominals.as_deref()) {
            name.push_str(", ");
            name.push_str(p);
        }
        name
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Teacher {
    pub email: String,
    pub status: Status,
    pub is_logged_in: bool,
    #[serde(flatten)]
    pub profile: Profile,
}

/// Which masterlist a student belongs to.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub enum Roster {
    Regular,
    #[serde(rename = "ALS")]
    Als,
}

impl Default for Roster {
    fn default() -> Self { Roster::Regular }
}

impl std::fmt::Display for Roster {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Roster::Regular => "Regular",
            Roster::Als     => "ALS",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Roster {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Regular" => Ok(Roster::Regular),
            "ALS"     => Ok(Roster::Als),
            _ => Err(format!("{:?} is not a valid Roster.", s)),
        }
    }
}

/// Name and contact number of a parent or guardian.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Contact {
    pub last: Option<String>,
    pub first: Option<String>,
    pub number: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Address {
    pub house_number: Option<String>,
    pub street: Option<String>,
    pub barangay: Option<String>,
    pub municipality: Option<String>,
    pub province: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Student {
    /// Learner Reference Number.
    pub lrn: String,
    pub fname: String,
    pub mname: Option<String>,
    pub lname: String,
    /// Name extension ("Jr.", "III", ...).
    pub ename: Option<String>,
    pub sex: Option<String>,
    pub strand: String,
    pub grade_level: i16,
    pub section: String,
    pub roster: Roster,
    pub bday: Option<Date>,
    pub age: Option<i16>,
    pub indigenous: bool,
    pub four_ps: bool,
    pub address: Address,
    pub father: Contact,
    pub mother: Contact,
    pub guardian: Contact,
}

fn owned(s: Option<&str>) -> Option<String> {
    blank_means_none(s).map(|s| s.to_owned())
}

/// Any text at all other than "n"/"no"/"false"/"0" counts as true.
fn flag(s: Option<&str>) -> bool {
    match blank_means_none(s) {
        None => false,
        Some(s) => !matches!(
            s.to_ascii_lowercase().as_str(),
            "n" | "no" | "false" | "0"
        ),
    }
}

const BDAY_FMT: &[time::format_description::FormatItem] =
    time::macros::format_description!("[year]-[month]-[day]");

impl Student {
    /**
    Student .csv rows should look like this

    ```csv
    #lrn,         lname, fname, mname,  ename, sex, strand, level, section, roster, bday,       age, ip, 4ps, house, street,  barangay, municipality, province, fatherLN, fatherFN, fatherCN,    motherLN, motherFN, motherCN, guardianLN, guardianFN, guardianCN
    123456789012, Cruz,  Ana,   Santos, ,      F,   STEM,   11,    A,       Regular, 2008-03-14, 16,  ,   x,   12,    Rizal,   Poblacion, Kalibo,     Aklan,    Cruz,     Jose,     09171234567, Cruz,     Maria,    09181234567, ,         ,
    ```

    Only the first nine columns are required; a missing roster means
    `Regular`.
    */
    pub fn from_csv_line(
        row: &csv::StringRecord
    ) -> Result<Student, String> {
        log::trace!("Student::from_csv_line( {:?} ) called.", row);

        let required = |n: usize, what: &str| -> Result<String, String> {
            match blank_means_none(row.get(n)) {
                Some(s) => Ok(s.to_owned()),
                None => Err(format!("no {}", what)),
            }
        };

        let lrn = required(0, "LRN")?;
        let lname = required(1, "last name")?;
        let fname = required(2, "first name")?;
        let strand = required(6, "strand")?;
        let grade_level: i16 = {
            let s = required(7, "grade level")?;
            s.parse().map_err(|_| format!("unable to parse {:?} as grade level", &s))?
        };
        let section = required(8, "section")?;

        let roster = match blank_means_none(row.get(9)) {
            Some(s) => s.parse()?,
            None => Roster::Regular,
        };
        let bday = match blank_means_none(row.get(10)) {
            Some(s) => Some(
                Date::parse(s, BDAY_FMT)
                    .map_err(|e| format!("unable to parse {:?} as date: {}", s, &e))?
            ),
            None => None,
        };
        let age = match blank_means_none(row.get(11)) {
            Some(s) => Some(
                s.parse::<i16>().map_err(|_| format!("unable to parse {:?} as age", s))?
            ),
            None => None,
        };

        let contact = |n: usize| Contact {
            last: owned(row.get(n)),
            first: owned(row.get(n + 1)),
            number: owned(row.get(n + 2)),
        };

        let stud = Student {
            lrn,
            fname,
            mname: owned(row.get(3)),
            lname,
            ename: owned(row.get(4)),
            sex: owned(row.get(5)),
            strand,
            grade_level,
            section,
            roster,
            bday,
            age,
            indigenous: flag(row.get(12)),
            four_ps: flag(row.get(13)),
            address: Address {
                house_number: owned(row.get(14)),
                street: owned(row.get(15)),
                barangay: owned(row.get(16)),
                municipality: owned(row.get(17)),
                province: owned(row.get(18)),
            },
            father: contact(19),
            mother: contact(22),
            guardian: contact(25),
        };
        Ok(stud)
    }

    pub fn vec_from_csv_reader<R: Read>(r: R) -> Result<Vec<Student>, String> {
        log::trace!("Student::vec_from_csv_reader(...) called.");

        let mut csv_reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .flexible(true)
            .has_headers(false)
            .from_reader(r);

        let mut students: Vec<Student> = Vec::new();

        for (n, res) in csv_reader.records().enumerate() {
            match res {
                Ok(record) => match Student::from_csv_line(&record) {
                    Ok(stud) => { students.push(stud); },
                    Err(e) => {
                        let estr = match record.position() {
                            Some(p) => format!(
                                "Error on line {}: {}",
                                p.line(), &e
                            ),
                            None => format!(
                                "Error in CSV record {}: {}", &n, &e
                            ),
                        };
                        return Err(estr);
                    },
                },
                Err(e) => {
                    let estr = match e.position() {
                        Some(p) => format!(
                            "Error on line {}: {}", p.line(), &e
                        ),
                        None => format!(
                            "Error in CSV record {}: {}", &n, &e
                        ),
                    };
                    return Err(estr);
                }
            }
        }

        log::trace!(
            "Student::vec_from_csv_reader() returns {} Students.",
            students.len()
        );
        Ok(students)
    }
}
