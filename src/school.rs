/*!
Sections, subjects, and the weekly class schedule.
*/
use std::io::Read;

use serde::{Deserialize, Serialize};
use time::{Time, Weekday};

use crate::blank_means_none;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Section {
    pub id: i64,
    pub strand: String,
    pub year_level: i16,
    pub section_name: String,
    pub section_type: String,
    pub adviser: Option<String>,
}

impl Section {
    /// e.g. "STEM 11-A"
    pub fn label(&self) -> String {
        format!("{} {}-{}", &self.strand, self.year_level, &self.section_name)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Subject {
    pub id: i64,
    pub subject_title: String,
    pub semester: String,
    pub teacher_email: String,
}

/// "1st Semester" and "1st" both mean "1st".
pub fn clean_semester(sem: &str) -> &str {
    sem.split_whitespace().next().unwrap_or("")
}

/// The school week. Classes don't meet on weekends.
pub static DAYS: &[Weekday] = &[
    Weekday::Monday,
    Weekday::Tuesday,
    Weekday::Wednesday,
    Weekday::Thursday,
    Weekday::Friday,
];

pub fn parse_day(s: &str) -> Result<Weekday, String> {
    let lower = s.trim().to_lowercase();
    for d in DAYS.iter() {
        if d.to_string().to_lowercase() == lower {
            return Ok(*d);
        }
    }
    Err(format!("{:?} is not a school day.", s))
}

/// Parse "7:30 AM", "12:05 pm", or 24-hour "13:00".
pub fn parse_clock(s: &str) -> Result<Time, String> {
    let s = s.trim();
    let (hm, period) = match s.rsplit_once(' ') {
        Some((hm, p)) => (hm.trim(), Some(p.trim().to_ascii_uppercase())),
        None => (s, None),
    };
    let (h, m) = hm.split_once(':')
        .ok_or_else(|| format!("{:?} is not a time of day.", s))?;
    let mut h: u8 = h.trim().parse()
        .map_err(|_| format!("Bad hour in {:?}.", s))?;
    let m: u8 = m.trim().parse()
        .map_err(|_| format!("Bad minute in {:?}.", s))?;

    match period.as_deref() {
        None => {},
        Some("AM") | Some("PM") => {
            if h == 0 || h > 12 {
                return Err(format!("Bad hour in {:?}.", s));
            }
            if h == 12 { h = 0; }
            if period.as_deref() == Some("PM") { h += 12; }
        },
        Some(x) => { return Err(format!("{:?} is neither AM nor PM.", x)); },
    }

    Time::from_hms(h, m, 0)
        .map_err(|e| format!("{:?} is not a time of day: {}", s, &e))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeSlot {
    pub start: Time,
    pub end: Time,
}

impl TimeSlot {
    /// Parse "7:30 AM - 8:30 AM".
    pub fn parse(s: &str) -> Result<TimeSlot, String> {
        let (a, b) = s.split_once('-')
            .ok_or_else(|| format!("{:?} is not a time slot.", s))?;
        Ok(TimeSlot { start: parse_clock(a)?, end: parse_clock(b)? })
    }

    pub fn contains(&self, t: Time) -> bool {
        self.start <= t && t <= self.end
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ScheduleEntry {
    pub id: i64,
    pub day: String,
    pub time_slot: String,
    pub subject: Subject,
    pub section: Section,
}

/**
Order a day's entries: the class in session at `now` goes first, then the
rest by start time. Entries whose time slot doesn't parse go last, in their
original order.
*/
pub fn order_day(entries: &mut [ScheduleEntry], now: Time) {
    entries.sort_by_cached_key(|e| match TimeSlot::parse(&e.time_slot) {
        Ok(slot) => (!slot.contains(now), false, slot.start),
        Err(err) => {
            log::warn!("Schedule entry {}: {}", e.id, &err);
            (true, true, Time::MIDNIGHT)
        },
    });
}

/// Whether anything on today's schedule has yet to finish.
pub fn day_remaining(entries: &[ScheduleEntry], now: Time) -> bool {
    entries.iter()
        .filter_map(|e| TimeSlot::parse(&e.time_slot).ok())
        .any(|slot| now <= slot.end)
}

/// One class meeting, as loaded from a timetable .csv file.
#[derive(Clone, Debug, PartialEq)]
pub struct TimetableRow {
    pub section: Section,
    pub subject: Subject,
    pub day: Weekday,
    pub time_slot: String,
}

impl TimetableRow {
    /**
    Timetable .csv rows should look like this

    ```csv
    #strand, level, section, type,    adviser,        subject,             semester,     teacher,            day,    time
    STEM,    11,    A,       Regular, Ms. Liza Reyes, General Mathematics, 1st Semester, liza@school.edu.ph, Monday, 7:30 AM - 8:30 AM
    ```

    A blank section type means `Regular`; the adviser may be blank.
    */
    pub fn from_csv_line(row: &csv::StringRecord) -> Result<TimetableRow, String> {
        log::trace!("TimetableRow::from_csv_line( {:?} ) called.", row);

        let required = |n: usize, what: &str| -> Result<String, String> {
            match blank_means_none(row.get(n)) {
                Some(s) => Ok(s.to_owned()),
                None => Err(format!("no {}", what)),
            }
        };

        let year_level: i16 = {
            let s = required(1, "year level")?;
            s.parse().map_err(|_| format!("unable to parse {:?} as year level", &s))?
        };
        let section = Section {
            id: 0,
            strand: required(0, "strand")?,
            year_level,
            section_name: required(2, "section")?,
            section_type: blank_means_none(row.get(3)).unwrap_or("Regular").to_owned(),
            adviser: blank_means_none(row.get(4)).map(|s| s.to_owned()),
        };
        let subject = Subject {
            id: 0,
            subject_title: required(5, "subject")?,
            semester: required(6, "semester")?,
            teacher_email: required(7, "teacher")?,
        };
        let day = parse_day(&required(8, "day")?)?;
        let time_slot = required(9, "time slot")?;
        TimeSlot::parse(&time_slot)?;

        Ok(TimetableRow { section, subject, day, time_slot })
    }

    pub fn vec_from_csv_reader<R: Read>(r: R) -> Result<Vec<TimetableRow>, String> {
        log::trace!("TimetableRow::vec_from_csv_reader(...) called.");

        let mut csv_reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .flexible(true)
            .has_headers(false)
            .from_reader(r);

        let mut rows: Vec<TimetableRow> = Vec::new();

        for (n, res) in csv_reader.records().enumerate() {
            let parsed = res.map_err(|e| (e.position().map(|p| p.line()), e.to_string()))
                .and_then(|record| TimetableRow::from_csv_line(&record)
                    .map_err(|e| (record.position().map(|p| p.line()), e)));
            match parsed {
                Ok(row) => { rows.push(row); },
                Err((Some(line), e)) => {
                    return Err(format!("Error on line {}: {}", &line, &e));
                },
                Err((None, e)) => {
                    return Err(format!("Error in CSV record {}: {}", &n, &e));
                },
            }
        }

        log::trace!(
            "TimetableRow::vec_from_csv_reader() returns {} rows.",
            rows.len()
        );
        Ok(rows)
    }
}
