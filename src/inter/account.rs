/*!
Teacher registration, login, and logout.
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    Json,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;

use crate::{
    auth::{strength, AuthResult, Strength},
    blank_means_none,
    config::Glob,
    user::{Profile, Status},
};
use super::*;

#[derive(Deserialize)]
struct RegisterData {
    email: Option<String>,
    password: Option<String>,
    #[serde(alias = "confirmPassword")]
    confirm_password: Option<String>,
    honorific: Option<String>,
    firstname: Option<String>,
    middlename: Option<String>,
    #[serde(alias = "lastname")]
    surname: Option<String>,
    suffix: Option<String>,
    post_nominals: Option<String>,
}

#[derive(Deserialize)]
struct LoginData {
    email: Option<String>,
    password: Option<String>,
}

fn owned(s: Option<&str>) -> Option<String> {
    blank_means_none(s).map(|s| s.to_owned())
}

pub async fn register(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    body: String,
) -> Response {
    log::trace!("account::register( [ Glob ], [ body ] ) called.");

    let data: RegisterData = match parse_body(&body) {
        Ok(d) => d,
        Err(r) => { return r; },
    };

    let (email, password, confirm, firstname, surname) = match (
        blank_means_none(data.email.as_deref()),
        data.password.as_deref().filter(|p| !p.is_empty()),
        data.confirm_password.as_deref(),
        blank_means_none(data.firstname.as_deref()),
        blank_means_none(data.surname.as_deref()),
    ) {
        (Some(e), Some(p), Some(c), Some(f), Some(s)) => (e, p, c, f, s),
        _ => {
            return json_error(StatusCode::BAD_REQUEST, "Please fill in all required fields");
        },
    };

    if password != confirm {
        return json_error(StatusCode::BAD_REQUEST, "Passwords do not match");
    }
    if strength(password) == Strength::Poor {
        return json_error(StatusCode::BAD_REQUEST, WEAK_PASSWORD);
    }

    let profile = Profile {
        honorific: owned(data.honorific.as_deref()),
        firstname: firstname.to_owned(),
        middlename: owned(data.middlename.as_deref()),
        surname: surname.to_owned(),
        suffix: owned(data.suffix.as_deref()),
        post_nominals: owned(data.post_nominals.as_deref()),
    };

    let glob = glob.read().await;
    let data_db = glob.data();
    let data_db = data_db.read().await;

    match data_db.insert_teacher(email, &profile).await {
        Err(e) => {
            log::error!("Store::insert_teacher( {:?}, ... ): {}", email, e.display());
            return respond_500();
        },
        Ok(false) => {
            return json_error(StatusCode::CONFLICT, "Email is already registered");
        },
        Ok(true) => {},
    }

    let added = glob.auth().read().await.add_user(email, password).await;
    if let Err(e) = added {
        log::error!("auth::Db::add_user( {:?}, [ password ] ): {}", email, e.display());
        if let Err(e) = data_db.delete_teacher(email).await {
            log::error!(
                "Also unable to remove half-registered teacher {:?}: {}",
                email, e.display()
            );
        }
        return respond_500();
    }

    log::info!("Registered new teacher {:?}.", email);
    (
        StatusCode::OK,
        Json(json!({
            "message": "Registration successful; please wait for your account to be approved.",
            "status": Status::Pending,
        }))
    ).into_response()
}

pub async fn login(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    body: String,
) -> Response {
    log::trace!("account::login( [ Glob ], [ body ] ) called.");

    let data: LoginData = match parse_body(&body) {
        Ok(d) => d,
        Err(r) => { return r; },
    };
    let (email, password) = match (
        blank_means_none(data.email.as_deref()),
        data.password.as_deref().filter(|p| !p.is_empty()),
    ) {
        (Some(e), Some(p)) => (e, p),
        _ => {
            return json_error(StatusCode::BAD_REQUEST, "Email and password are required");
        },
    };

    let glob = glob.read().await;
    let data_db = glob.data();
    let data_db = data_db.read().await;

    let teacher = match data_db.get_teacher(email).await {
        Err(e) => {
            log::error!("Store::get_teacher( {:?} ): {}", email, e.display());
            return respond_500();
        },
        Ok(None) => { return json_error(StatusCode::UNAUTHORIZED, "User not found"); },
        Ok(Some(t)) => t,
    };

    match teacher.status {
        Status::Approved => {},
        Status::Pending => {
            return json_error(StatusCode::FORBIDDEN, "Account is pending approval");
        },
        Status::Rejected => {
            return json_error(StatusCode::FORBIDDEN, "Account has been rejected");
        },
    }

    let auth_response = glob.auth().read().await
        .check_password_and_issue_key(email, password).await;

    let key = match auth_response {
        Err(e) => {
            log::error!(
                "auth::Db::check_password_and_issue_key( {:?}, [ password ] ): {}",
                email, e.display()
            );
            return respond_500();
        },
        Ok(AuthResult::Key(k)) => k,
        Ok(AuthResult::BadPassword) => {
            return json_error(StatusCode::UNAUTHORIZED, "Incorrect password");
        },
        Ok(AuthResult::NoSuchUser) => {
            log::warn!("Teacher {:?} has no password in the auth DB.", email);
            return json_error(StatusCode::UNAUTHORIZED, "User not found");
        },
        Ok(x) => {
            log::warn!(
                "auth::Db::check_password_and_issue_key( {:?}, [ password ] ) returned {:?}, which shouldn't ever happen.",
                email, &x
            );
            return respond_500();
        },
    };

    if let Err(e) = data_db.set_logged_in(email, true).await {
        log::warn!("Unable to set login flag of {:?}: {}", email, e.display());
    }

    log::info!("Teacher {:?} logged in.", email);
    (
        StatusCode::OK,
        Json(json!({
            "email": email,
            "key": &key,
            "name": teacher.profile.display_name(),
        }))
    ).into_response()
}

pub async fn logout(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    headers: HeaderMap,
) -> Response {
    log::trace!("account::logout( [ Glob ], [ headers ] ) called.");

    let email = match header_str(&headers, "x-lis-email") {
        Ok(s) => s,
        Err(r) => { return r; },
    };
    let key = match header_str(&headers, "x-lis-key") {
        Ok(s) => s,
        Err(r) => { return r; },
    };

    let glob = glob.read().await;
    let revoked = glob.auth().read().await.revoke_key(email, key).await;
    if let Err(e) = revoked {
        log::error!("auth::Db::revoke_key( {:?}, [ key ] ): {}", email, e.display());
        return respond_500();
    }
    if let Err(e) = glob.data().read().await.set_logged_in(email, false).await {
        log::warn!("Unable to clear login flag of {:?}: {}", email, e.display());
    }

    json_message("Logged out")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inter::tests::{add_teacher, db_glob, key_headers, nuke, test_glob, unpack};
    use crate::mail::MemMailer;
    use crate::tests::ensure_logging;

    use serial_test::serial;

    fn glob() -> Extension<Arc<RwLock<Glob>>> {
        Extension(test_glob(Arc::new(MemMailer::default())))
    }

    async fn register_with(body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        unpack(register(glob(), body.to_string()).await).await
    }

    #[tokio::test]
    async fn registration_validation() {
        let (code, v) = register_with(json!({
            "email": "liza@school.edu.ph",
            "password": "Sampaguita7",
            "confirmPassword": "Sampaguita7",
            "firstname": "Liza",
        })).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"], "Please fill in all required fields");

        let (code, v) = register_with(json!({
            "email": "liza@school.edu.ph",
            "password": "Sampaguita7",
            "confirmPassword": "Sampaguita8",
            "firstname": "Liza",
            "surname": "Reyes",
        })).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"], "Passwords do not match");

        let (code, v) = register_with(json!({
            "email": "liza@school.edu.ph",
            "password": "sampaguita",
            "confirm_password": "sampaguita",
            "firstname": "Liza",
            "lastname": "Reyes",
        })).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"], WEAK_PASSWORD);
    }

    #[tokio::test]
    async fn login_validation() {
        let (code, v) = unpack(login(glob(), r#"{"email": "liza@school.edu.ph"}"#.to_owned()).await).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"], "Email and password are required");
    }

    #[tokio::test]
    async fn logout_needs_headers() {
        let (code, _) = unpack(logout(glob(), HeaderMap::new()).await).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
    }

    async fn login_as(
        glob: &Arc<RwLock<Glob>>,
        email: &str,
        password: &str,
    ) -> (StatusCode, serde_json::Value) {
        let body = json!({ "email": email, "password": password }).to_string();
        unpack(login(Extension(glob.clone()), body).await).await
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn registration_and_duplicates() {
        ensure_logging();
        let glob = db_glob(Arc::new(MemMailer::default())).await;
        let body = json!({
            "email": "liza@school.edu.ph",
            "password": "Sampaguita7",
            "confirmPassword": "Sampaguita7",
            "firstname": "Liza",
            "surname": "Reyes",
        }).to_string();

        let (code, v) = unpack(register(Extension(glob.clone()), body.clone()).await).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(v["status"], "Pending");

        let (code, v) = unpack(register(Extension(glob.clone()), body).await).await;
        assert_eq!(code, StatusCode::CONFLICT);
        assert_eq!(v["error"], "Email is already registered");

        // Registered, but not yet approved.
        let (code, v) = login_as(&glob, "liza@school.edu.ph", "Sampaguita7").await;
        assert_eq!(code, StatusCode::FORBIDDEN);
        assert_eq!(v["error"], "Account is pending approval");

        nuke(&glob).await;
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn login_gates() {
        ensure_logging();
        let glob = db_glob(Arc::new(MemMailer::default())).await;
        let liza = "liza@school.edu.ph";
        let ramon = "ramon@school.edu.ph";
        add_teacher(&glob, liza, "Sampaguita7", Status::Approved).await;
        add_teacher(&glob, ramon, "Narra1234", Status::Rejected).await;

        let (code, v) = login_as(&glob, "nobody@school.edu.ph", "Sampaguita7").await;
        assert_eq!(code, StatusCode::UNAUTHORIZED);
        assert_eq!(v["error"], "User not found");

        let (code, v) = login_as(&glob, ramon, "Narra1234").await;
        assert_eq!(code, StatusCode::FORBIDDEN);
        assert_eq!(v["error"], "Account has been rejected");

        let (code, v) = login_as(&glob, liza, "Sampaguita8").await;
        assert_eq!(code, StatusCode::UNAUTHORIZED);
        assert_eq!(v["error"], "Incorrect password");

        let (code, v) = login_as(&glob, liza, "Sampaguita7").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(v["email"], liza);
        assert_eq!(v["name"], "Ms. Liza Reyes");
        let key = v["key"].as_str().unwrap().to_owned();
        {
            let glob = glob.read().await;
            let t = glob.data().read().await.get_teacher(liza).await.unwrap().unwrap();
            assert!(t.is_logged_in);
        }

        let (code, v) = unpack(logout(Extension(glob.clone()), key_headers(liza, &key)).await).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(v["message"], "Logged out");
        {
            let glob = glob.read().await;
            let t = glob.data().read().await.get_teacher(liza).await.unwrap().unwrap();
            assert!(!t.is_logged_in);
            assert_eq!(
                glob.auth().read().await.check_key(liza, &key).await.unwrap(),
                AuthResult::InvalidKey
            );
        }

        nuke(&glob).await;
    }
}
