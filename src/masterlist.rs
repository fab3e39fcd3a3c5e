/*!
Masterlist filtering, searching, and sorting.

Everything here is a pure function of its inputs; the database query that
selects the class lives in `store::students`.
*/
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{blank_means_none, user::{Roster, Student}};

/// Identifies a class: (strand, section, year level).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ClassKey {
    pub strand: String,
    pub section: String,
    pub year_level: i16,
}

impl ClassKey {
    pub fn contains(&self, s: &Student) -> bool {
        s.strand == self.strand
            && s.section == self.section
            && s.grade_level == self.year_level
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortColumn {
    Name,
    Gender,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn flip(self) -> Direction {
        match self {
            Direction::Asc => Direction::Desc,
            Direction::Desc => Direction::Asc,
        }
    }
}

/// Current sort state of a masterlist view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sort {
    pub column: SortColumn,
    pub direction: Direction,
}

impl Default for Sort {
    fn default() -> Self {
        Sort { column: SortColumn::Name, direction: Direction::Asc }
    }
}

impl Sort {
    /**
    The result of clicking on `column`'s header: the same column flips
    direction, a different column starts out ascending.
    */
    pub fn toggle(self, column: SortColumn) -> Sort {
        if column == self.column {
            Sort { column, direction: self.direction.flip() }
        } else {
            Sort { column, direction: Direction::Asc }
        }
    }
}

pub fn format_sex(sex: Option<&str>) -> String {
    let sex = match blank_means_none(sex) {
        None => { return "Unknown".to_owned(); },
        Some(s) => s,
    };

    match sex.to_lowercase().as_str() {
        "m" | "male" => "Male".to_owned(),
        "f" | "female" => "Female".to_owned(),
        _ => sex.to_owned(),
    }
}

/**
What to show as a class's adviser, given the result of looking up its
section: `None` if there is no such section, `Some(None)` if the section
has nobody assigned.
*/
pub fn adviser_label(found: Option<Option<String>>) -> String {
    match found {
        None => "Not found".to_owned(),
        Some(adviser) => match blank_means_none(adviser.as_deref()) {
            Some(name) => name.to_owned(),
            None => "Not assigned yet".to_owned(),
        },
    }
}

/// "Last[, Ext], First[ Middle]"
pub fn format_name(s: &Student) -> String {
    let mut name = s.lname.clone();
    if let Some(e) = blank_means_none(s.ename.as_deref()) {
        name.push_str(", ");
        name.push_str(e);
    }
    name.push_str(", ");
    name.push_str(&s.fname);
    if let Some(m) = blank_means_none(s.mname.as_deref()) {
        name.push(' ');
        name.push_str(m);
    }
    name
}

/// "First Middle Last Ext", skipping whatever's blank.
pub fn spoken_name(s: &Student) -> String {
    [
        Some(s.fname.as_str()),
        s.mname.as_deref(),
        Some(s.lname.as_str()),
        s.ename.as_deref(),
    ].into_iter()
        .filter_map(blank_means_none)
        .collect::<Vec<&str>>()
        .join(" ")
}

/**
Case-insensitive search: either form of the student's full name contains
`term`, or their formatted gender starts with it. (So "m" finds all the
Males, but not the Females, even though "female" contains an "m".)
*/
pub fn matches(s: &Student, term: &str) -> bool {
    let term = term.to_lowercase();
    let gender = format_sex(s.sex.as_deref()).to_lowercase();
    format_name(s).to_lowercase().contains(&term)
        || spoken_name(s).to_lowercase().contains(&term)
        || gender.starts_with(&term)
}

pub fn search<'a>(students: &'a [Student], term: &str) -> Vec<&'a Student> {
    let term = term.trim();
    if term.is_empty() {
        return students.iter().collect();
    }
    students.iter().filter(|s| matches(s, term)).collect()
}

fn sort_key(s: &Student, column: SortColumn) -> String {
    match column {
        SortColumn::Name => format_name(s).to_lowercase(),
        SortColumn::Gender => format_sex(s.sex.as_deref()).to_lowercase(),
    }
}

/**
Sort in place. Ties are broken by name and then LRN so the order is total,
which makes a descending sort exactly the reverse of an ascending one.
*/
pub fn sort(students: &mut Vec<&Student>, by: Sort) {
    students.sort_by(|a, b| {
        let ord = sort_key(a, by.column).cmp(&sort_key(b, by.column));
        let ord = match ord {
            Ordering::Equal => sort_key(a, SortColumn::Name)
                .cmp(&sort_key(b, SortColumn::Name))
                .then_with(|| a.lrn.cmp(&b.lrn)),
            x => x,
        };
        match by.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        }
    });
}

/// Masterlist entry as sent to the client.
#[derive(Debug, Serialize)]
pub struct Entry<'a> {
    pub name: String,
    pub gender: String,
    #[serde(flatten)]
    pub student: &'a Student,
}

/// The whole pipeline: restrict to the class and roster, search, sort.
pub fn view<'a>(
    students: &'a [Student],
    class: &ClassKey,
    roster: Roster,
    term: &str,
    by: Sort,
) -> Vec<Entry<'a>> {
    let mut found: Vec<&Student> = search(students, term).into_iter()
        .filter(|s| s.roster == roster && class.contains(s))
        .collect();
    sort(&mut found, by);

    found.into_iter()
        .map(|s| Entry {
            name: format_name(s),
            gender: format_sex(s.sex.as_deref()),
            student: s,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::{Address, Contact};

    fn stud(lrn: &str, fname: &str, lname: &str, sex: Option<&str>) -> Student {
        Student {
            lrn: lrn.to_owned(),
            fname: fname.to_owned(),
            mname: None,
            lname: lname.to_owned(),
            ename: None,
            sex: sex.map(|s| s.to_owned()),
            strand: "STEM".to_owned(),
            grade_level: 11,
            section: "A".to_owned(),
            roster: Roster::Regular,
            bday: None,
            age: None,
            indigenous: false,
            four_ps: false,
            address: Address::default(),
            father: Contact::default(),
            mother: Contact::default(),
            guardian: Contact::default(),
        }
    }

    fn class() -> ClassKey {
        ClassKey { strand: "STEM".to_owned(), section: "A".to_owned(), year_level: 11 }
    }

    fn roster() -> Vec<Student> {
        let mut other_section = stud("9", "Zed", "Abad", Some("M"));
        other_section.section = "B".to_owned();
        let mut als = stud("8", "Yna", "Abad", Some("F"));
        als.roster = Roster::Als;

        vec![
            stud("1", "Ana", "Cruz", Some("F")),
            stud("2", "Ben", "Santos", Some("male")),
            stud("3", "Carla", "Diaz", None),
            stud("4", "Dino", "Cruz", Some("m")),
            stud("5", "Ana", "Cruz", Some("Female")),
            other_section,
            als,
        ]
    }

    fn lrns(v: &[&Student]) -> Vec<String> {
        v.iter().map(|s| s.lrn.clone()).collect()
    }

    #[test]
    fn sexes() {
        assert_eq!(format_sex(Some("M")), "Male");
        assert_eq!(format_sex(Some("female")), "Female");
        assert_eq!(format_sex(Some("")), "Unknown");
        assert_eq!(format_sex(None), "Unknown");
        assert_eq!(format_sex(Some("X")), "X");
    }

    #[test]
    fn names() {
        let mut s = stud("1", "Ana", "Cruz", None);
        assert_eq!(format_name(&s), "Cruz, Ana");
        s.mname = Some("Santos".to_owned());
        s.ename = Some("Jr.".to_owned());
        assert_eq!(format_name(&s), "Cruz, Jr., Ana Santos");
    }

    #[test]
    fn search_by_name_and_gender() {
        let ana = stud("1", "Ana", "Cruz", Some("F"));
        assert!(matches(&ana, "cruz"));
        assert!(matches(&ana, "CRUZ, a"));
        assert!(!matches(&ana, "m"));
        assert!(matches(&ana, "fem"));
    }

    #[test]
    fn search_by_name_as_spoken() {
        let mut ana = stud("1", "Ana", "Cruz", Some("F"));
        assert_eq!(spoken_name(&ana), "Ana Cruz");
        assert!(matches(&ana, "ana cruz"));
        assert!(matches(&ana, "Ana C"));

        ana.mname = Some("Santos".to_owned());
        ana.ename = Some(" ".to_owned());
        assert_eq!(spoken_name(&ana), "Ana Santos Cruz");
        assert!(matches(&ana, "ana santos cruz"));
        assert!(!matches(&ana, "ana cruz"));

        ana.ename = Some("Jr.".to_owned());
        assert!(matches(&ana, "santos cruz jr"));
        assert!(!matches(&ana, "cruz ana"));
    }

    #[test]
    fn search_is_subset_and_blank_is_everything() {
        let studs = roster();
        assert_eq!(search(&studs, "").len(), studs.len());
        assert_eq!(search(&studs, "  ").len(), studs.len());

        for term in ["a", "cruz", "m", "f", "unknown", "zzz"] {
            let found = search(&studs, term);
            assert!(found.len() <= studs.len());
            for s in found.iter() {
                assert!(studs.iter().any(|t| t.lrn == s.lrn));
            }
        }

        let males = lrns(&search(&studs, "m"));
        assert_eq!(males, vec!["2", "4", "9"]);
    }

    #[test]
    fn view_restricts_to_class_and_roster() {
        let studs = roster();
        let v = view(&studs, &class(), Roster::Regular, "", Sort::default());
        assert_eq!(v.len(), 5);
        for e in v.iter() {
            assert_eq!(e.student.strand, "STEM");
            assert_eq!(e.student.section, "A");
            assert_eq!(e.student.grade_level, 11);
            assert_eq!(e.student.roster, Roster::Regular);
        }

        let v = view(&studs, &class(), Roster::Als, "", Sort::default());
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].name, "Abad, Yna");
        assert_eq!(v[0].gender, "Female");
    }

    #[test]
    fn toggling_reverses_exactly() {
        let studs = roster();
        for column in [SortColumn::Name, SortColumn::Gender] {
            let asc = Sort { column, direction: Direction::Asc };
            let desc = asc.toggle(column);
            assert_eq!(desc.direction, Direction::Desc);

            let mut a = search(&studs, "");
            sort(&mut a, asc);
            let mut d = search(&studs, "");
            sort(&mut d, desc);

            let mut a = lrns(&a);
            a.reverse();
            assert_eq!(a, lrns(&d));
        }
    }

    #[test]
    fn new_column_starts_ascending() {
        let s = Sort { column: SortColumn::Name, direction: Direction::Desc };
        assert_eq!(
            s.toggle(SortColumn::Gender),
            Sort { column: SortColumn::Gender, direction: Direction::Asc }
        );
    }

    #[test]
    fn sort_by_name() {
        let studs = roster();
        let mut v = search(&studs, "");
        sort(&mut v, Sort::default());
        assert_eq!(lrns(&v), vec!["8", "9", "1", "5", "4", "3", "2"]);
    }

    #[test]
    fn advisers() {
        assert_eq!(adviser_label(None), "Not found");
        assert_eq!(adviser_label(Some(None)), "Not assigned yet");
        assert_eq!(adviser_label(Some(Some(" ".to_owned()))), "Not assigned yet");
        assert_eq!(
            adviser_label(Some(Some("Ms. Liza Reyes".to_owned()))),
            "Ms. Liza Reyes"
        );
    }
}
