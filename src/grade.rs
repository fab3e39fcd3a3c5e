/*!
Quarterly grades and the values derived from them.

Only the four quarter scores are ever stored. Semester averages, the final
average, and the remark are computed whenever a grade is read.
*/
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Rounded final averages at or above this pass.
pub const PASSING: f32 = 75.0;

/// What gets displayed in place of an average that can't be computed yet.
pub const UNAVAILABLE: &str = "-";

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Quarters {
    #[serde(default, alias = "first_grading")]
    pub q1: Option<f32>,
    #[serde(default, alias = "second_grading")]
    pub q2: Option<f32>,
    #[serde(default, alias = "third_grading")]
    pub q3: Option<f32>,
    #[serde(default, alias = "fourth_grading")]
    pub q4: Option<f32>,
}

fn mean(xs: &[Option<f32>]) -> Option<f32> {
    let mut tot = 0.0_f32;
    for x in xs.iter() {
        tot += (*x)?;
    }
    Some(tot / xs.len() as f32)
}

/// Render an average as a whole number, rounding halves up, or "-".
pub fn display(avg: Option<f32>) -> String {
    match avg {
        Some(x) => format!("{}", x.round() as i64),
        None => UNAVAILABLE.to_owned(),
    }
}

impl Quarters {
    pub fn as_array(&self) -> [Option<f32>; 4] {
        [self.q1, self.q2, self.q3, self.q4]
    }

    pub fn first_semester(&self) -> Option<f32> {
        mean(&[self.q1, self.q2])
    }

    pub fn second_semester(&self) -> Option<f32> {
        mean(&[self.q3, self.q4])
    }

    /// Defined only when all four quarters are present.
    pub fn final_average(&self) -> Option<f32> {
        mean(&self.as_array())
    }

    pub fn remark(&self) -> Remark {
        match self.final_average() {
            None => Remark::Pending,
            Some(x) => if x.round() >= PASSING {
                Remark::Passed
            } else {
                Remark::Failed
            },
        }
    }

    /// Every score present must be a finite number from 0 to 100.
    pub fn validate(&self) -> Result<(), String> {
        for (n, q) in self.as_array().iter().enumerate() {
            if let Some(x) = q {
                if !x.is_finite() || *x < 0.0 || *x > 100.0 {
                    return Err(format!(
                        "Quarter {} score {} is not between 0 and 100.",
                        n + 1, x
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Remark {
    Passed,
    Failed,
    Pending,
}

impl std::fmt::Display for Remark {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Remark::Passed  => "PASSED",
            Remark::Failed  => "FAILED",
            Remark::Pending => "PENDING",
        };

        write!(f, "{}", token)
    }
}

/// One stored grade row; unique per (`lrn`, `section_id`, `subject_id`).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GradeRecord {
    pub id: i64,
    pub lrn: String,
    pub section_id: i64,
    pub subject_id: i64,
    #[serde(flatten)]
    pub quarters: Quarters,
}

/// Just enough of a student to label a row of the grading sheet.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct StudentName {
    pub lrn: String,
    pub lname: String,
    pub fname: String,
    pub mname: Option<String>,
    pub ename: Option<String>,
}

impl StudentName {
    /// Case-insensitive match against "first last lrn".
    pub fn matches(&self, term: &str) -> bool {
        let hay = format!("{} {} {}", &self.fname, &self.lname, &self.lrn)
            .to_lowercase();
        hay.contains(&term.to_lowercase())
    }
}

/// A row of the grading sheet as sent to the client.
#[derive(Debug, Serialize)]
pub struct GradeRow<'a> {
    #[serde(flatten)]
    pub student: &'a StudentName,
    #[serde(flatten)]
    pub quarters: Quarters,
    pub sem1: String,
    pub sem2: String,
    #[serde(rename = "final")]
    pub final_avg: String,
    pub remark: Remark,
}

impl<'a> GradeRow<'a> {
    pub fn new(student: &'a StudentName, quarters: Quarters) -> GradeRow<'a> {
        GradeRow {
            student,
            quarters,
            sem1: display(quarters.first_semester()),
            sem2: display(quarters.second_semester()),
            final_avg: display(quarters.final_average()),
            remark: quarters.remark(),
        }
    }
}

/**
Build the grading sheet for a class: one row per student (sorted by name),
students with no grade record yet getting an empty row, filtered by
`search` if it isn't empty.
*/
pub fn sheet<'a>(
    students: &'a [StudentName],
    records: &[GradeRecord],
    search: &str,
) -> Vec<GradeRow<'a>> {
    let by_lrn: HashMap<&str, Quarters> = records.iter()
        .map(|r| (r.lrn.as_str(), r.quarters))
        .collect();

    let mut rows: Vec<GradeRow> = students.iter()
        .filter(|s| search.is_empty() || s.matches(search))
        .map(|s| GradeRow::new(
            s,
            by_lrn.get(s.lrn.as_str()).copied().unwrap_or_default()
        ))
        .collect();

    rows.sort_by(|a, b| {
        let ka = (a.student.lname.to_lowercase(), a.student.fname.to_lowercase());
        let kb = (b.student.lname.to_lowercase(), b.student.fname.to_lowercase());
        ka.cmp(&kb).then_with(|| a.student.lrn.cmp(&b.student.lrn))
    });
    rows
}

/// Validate an entire save request before anything is written.
pub fn validate_all(grades: &HashMap<String, Quarters>) -> Result<(), String> {
    for (lrn, q) in grades.iter() {
        if lrn.trim().is_empty() {
            return Err("Grades submitted for a blank LRN.".to_owned());
        }
        q.validate().map_err(|e| format!("LRN {}: {}", lrn, &e))?;
    }
    Ok(())
}
