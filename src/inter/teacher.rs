/*!
Subcrate for interoperation with Teacher users.

Every request is a `POST /teacher` with an `x-lis-action` header naming
what's wanted and (for most actions) a JSON body with the particulars.
By the time a request gets here `key_authenticate()` has already checked
its `x-lis-email` and `x-lis-key`.
*/
use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::HeaderMap, StatusCode},
    response::Response,
};
use serde::{Deserialize, Serialize};
use time::{Time, Weekday};
use tokio::sync::RwLock;

use crate::{
    blank_means_none,
    config::Glob,
    grade::{sheet, validate_all, Quarters},
    masterlist::{adviser_label, view, ClassKey, Direction, Sort, SortColumn},
    school::{day_remaining, order_day, parse_day, ScheduleEntry, DAYS},
    user::{Profile, Roster, Status},
};
use super::*;

pub async fn api(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let email: &str = match header_str(&headers, "x-lis-email") {
        Ok(s) => s,
        Err(r) => { return r; },
    };

    let action = match header_str(&headers, "x-lis-action") {
        Ok(s) => s,
        Err(r) => { return r; },
    };
    log::trace!("teacher::api( [ Glob ], {:?}, {:?} ) called.", email, action);

    let teacher = {
        let glob = glob.read().await;
        let res = glob.data().read().await.get_teacher(email).await;
        match res {
            Err(e) => {
                log::error!("Store::get_teacher( {:?} ): {}", email, e.display());
                return respond_500();
            },
            Ok(None) => {
                log::warn!("Valid key presented for nonexistent teacher {:?}.", email);
                return json_error(StatusCode::UNAUTHORIZED, "User not found");
            },
            Ok(Some(t)) => t,
        }
    };

    if teacher.status != Status::Approved {
        return json_error(
            StatusCode::FORBIDDEN,
            &format!("Account is {}.", &teacher.status)
        );
    }

    match action {
        "profile" => respond_action("profile", &teacher),
        "update-profile" => update_profile(email, &body, glob.clone()).await,
        "sections" => sections(email, glob.clone()).await,
        "subjects" => subjects(email, &body, glob.clone()).await,
        "schedule" => schedule(email, &body, glob.clone()).await,
        "masterlist" => masterlist(&body, glob.clone()).await,
        "grades" => grades(&body, glob.clone()).await,
        "save-grades" => save_grades(&body, glob.clone()).await,
        x => respond_bad_request(
            format!("{:?} is not a recognized x-lis-action value.", &x)
        ),
    }
}

async fn update_profile(email: &str, body: &str, glob: Arc<RwLock<Glob>>) -> Response {
    let mut profile: Profile = match parse_body(body) {
        Ok(p) => p,
        Err(r) => { return r; },
    };
    profile.firstname = profile.firstname.trim().to_owned();
    profile.surname = profile.surname.trim().to_owned();
    if profile.firstname.is_empty() || profile.surname.is_empty() {
        return respond_bad_request("First name and surname are required.".to_owned());
    }

    let glob = glob.read().await;
    let res = glob.data().read().await.update_profile(email, &profile).await;
    match res {
        Err(e) => {
            log::error!("Store::update_profile( {:?}, ... ): {}", email, e.display());
            respond_500()
        },
        Ok(None) => json_error(StatusCode::NOT_FOUND, "User not found"),
        Ok(Some(t)) => respond_action("update-profile", &t),
    }
}

async fn sections(email: &str, glob: Arc<RwLock<Glob>>) -> Response {
    let glob = glob.read().await;
    let res = glob.data().read().await.sections_for_teacher(email).await;
    match res {
        Err(e) => {
            log::error!("Store::sections_for_teacher( {:?} ): {}", email, e.display());
            respond_500()
        },
        Ok(sections) => respond_action("sections", &sections),
    }
}

#[derive(Deserialize)]
struct SubjectsQuery {
    section_id: i64,
    semester: String,
}

async fn subjects(email: &str, body: &str, glob: Arc<RwLock<Glob>>) -> Response {
    let q: SubjectsQuery = match parse_body(body) {
        Ok(q) => q,
        Err(r) => { return r; },
    };

    let glob = glob.read().await;
    let res = glob.data().read().await
        .subjects_for(email, q.section_id, &q.semester).await;
    match res {
        Err(e) => {
            log::error!(
                "Store::subjects_for( {:?}, {}, {:?} ): {}",
                email, &q.section_id, &q.semester, e.display()
            );
            respond_500()
        },
        Ok(subjects) => respond_action("subjects", &subjects),
    }
}

#[derive(Deserialize)]
struct ScheduleQuery {
    #[serde(default)]
    day: Option<String>,
}

#[derive(Serialize)]
struct ScheduleData {
    day: String,
    /// Whether anything on today's schedule has yet to finish.
    remaining: bool,
    entries: Vec<ScheduleEntry>,
}

async fn schedule(email: &str, body: &str, glob: Arc<RwLock<Glob>>) -> Response {
    let q: ScheduleQuery = match parse_body(body) {
        Ok(q) => q,
        Err(r) => { return r; },
    };

    let glob = glob.read().await;
    let now = glob.local_now();

    let (day, today): (Weekday, bool) = match blank_means_none(q.day.as_deref()) {
        Some(s) => match parse_day(s) {
            Ok(d) => (d, d == now.weekday()),
            Err(e) => { return respond_bad_request(e); },
        },
        None => (now.weekday(), true),
    };

    if !DAYS.contains(&day) {
        let data = ScheduleData { day: day.to_string(), remaining: false, entries: Vec::new() };
        return respond_action("schedule", &data);
    }

    let res = glob.data().read().await.day_schedule(email, day).await;
    let mut entries = match res {
        Err(e) => {
            log::error!("Store::day_schedule( {:?}, {} ): {}", email, &day, e.display());
            return respond_500();
        },
        Ok(entries) => entries,
    };

    // On days other than today nothing is "in session"; order by start time.
    let t = if today { now.time() } else { Time::MIDNIGHT };
    order_day(&mut entries, t);
    let remaining = today && day_remaining(&entries, t);

    let data = ScheduleData { day: day.to_string(), remaining, entries };
    respond_action("schedule", &data)
}

#[derive(Deserialize)]
struct MasterlistQuery {
    strand: String,
    section: String,
    year_level: i16,
    #[serde(default)]
    roster: Roster,
    #[serde(default)]
    search: String,
    sort: Option<SortColumn>,
    direction: Option<Direction>,
}

async fn masterlist(body: &str, glob: Arc<RwLock<Glob>>) -> Response {
    let q: MasterlistQuery = match parse_body(body) {
        Ok(q) => q,
        Err(r) => { return r; },
    };
    let class = ClassKey {
        strand: q.strand,
        section: q.section,
        year_level: q.year_level,
    };
    let by = Sort {
        column: q.sort.unwrap_or(SortColumn::Name),
        direction: q.direction.unwrap_or(Direction::Asc),
    };

    let glob = glob.read().await;
    let data_db = glob.data();
    let data_db = data_db.read().await;

    let (students, adviser) = tokio::join!(
        data_db.get_class(&class, q.roster),
        data_db.get_adviser(&class),
    );
    let students = match students {
        Err(e) => {
            log::error!("Store::get_class( {:?}, {} ): {}", &class, &q.roster, e.display());
            return respond_500();
        },
        Ok(s) => s,
    };
    let adviser = match adviser {
        Err(e) => {
            log::error!("Store::get_adviser( {:?} ): {}", &class, e.display());
            return respond_500();
        },
        Ok(a) => adviser_label(a),
    };

    let entries = view(&students, &class, q.roster, &q.search, by);
    respond_action("masterlist", serde_json::json!({
        "adviser": adviser,
        "students": entries,
    }))
}

#[derive(Deserialize)]
struct GradesQuery {
    section_id: i64,
    subject_id: i64,
    #[serde(default)]
    search: String,
}

async fn grades(body: &str, glob: Arc<RwLock<Glob>>) -> Response {
    let q: GradesQuery = match parse_body(body) {
        Ok(q) => q,
        Err(r) => { return r; },
    };

    let glob = glob.read().await;
    let data_db = glob.data();
    let data_db = data_db.read().await;

    let (names, records) = tokio::join!(
        data_db.students_in_section(q.section_id),
        data_db.get_grades(q.section_id, q.subject_id),
    );
    let names = match names {
        Err(e) => {
            log::error!("Store::students_in_section( {} ): {}", &q.section_id, e.display());
            return respond_500();
        },
        Ok(n) => n,
    };
    let records = match records {
        Err(e) => {
            log::error!(
                "Store::get_grades( {}, {} ): {}",
                &q.section_id, &q.subject_id, e.display()
            );
            return respond_500();
        },
        Ok(r) => r,
    };

    let rows = sheet(&names, &records, q.search.trim());
    respond_action("grades", &rows)
}

#[derive(Deserialize)]
struct SaveGradesData {
    section_id: i64,
    subject_id: i64,
    #[serde(default)]
    grades: HashMap<String, Quarters>,
}

async fn save_grades(body: &str, glob: Arc<RwLock<Glob>>) -> Response {
    let data: SaveGradesData = match parse_body(body) {
        Ok(d) => d,
        Err(r) => { return r; },
    };
    if let Err(e) = validate_all(&data.grades) {
        return respond_bad_request(e);
    }

    let glob = glob.read().await;
    let res = glob.data().read().await
        .upsert_grades(data.section_id, data.subject_id, &data.grades).await;
    match res {
        Err(e) => {
            log::error!(
                "Store::upsert_grades( {}, {}, [ {} grades ] ): {}",
                &data.section_id, &data.subject_id, data.grades.len(), e.display()
            );
            respond_500()
        },
        Ok(n) => respond_action("save-grades", serde_json::json!({ "saved": n })),
    }
}
