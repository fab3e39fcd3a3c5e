/*!
Interoperation between the client (user) and server.

(Not the application and the database; that's covered by `auth` and `store`.)

Every response body is JSON: `{"message": ...}` or `{"error": ...}` for the
simple endpoints, and whatever data was requested for the teacher API.
*/
use std::sync::Arc;

use axum::{
    http::{Request, StatusCode},
    http::header::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tokio::sync::RwLock;

use crate::auth::AuthResult;
use crate::config::Glob;

pub mod account;
pub mod reset;
pub mod teacher;

pub static WEAK_PASSWORD: &str =
    "Password must be at least 6 characters and contain an uppercase letter and a digit";

/// `{"error": msg}` with the given status.
pub fn json_error(code: StatusCode, msg: &str) -> Response {
    log::trace!("json_error( {}, {:?} ) called.", &code, msg);

    (
        code,
        Json(json!({ "error": msg }))
    ).into_response()
}

/// `{"message": msg}` with status 200.
pub fn json_message(msg: &str) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "message": msg }))
    ).into_response()
}

/// `{"error": "Internal server error"}` with status 500. Whatever went
/// wrong should already have been logged.
pub fn respond_500() -> Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

pub fn respond_bad_request(msg: String) -> Response {
    log::trace!("respond_bad_request( {:?} ) called.", &msg);

    json_error(StatusCode::BAD_REQUEST, &msg)
}

pub fn respond_bad_key() -> Response {
    log::trace!("respond_bad_key() called.");

    json_error(StatusCode::UNAUTHORIZED, "Invalid authorization key.")
}

/// Deserialize a JSON request body, or produce the 400 to send back.
pub fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, Response> {
    let body = if body.trim().is_empty() { "{}" } else { body };
    serde_json::from_str(body).map_err(|e| {
        log::trace!("Unable to deserialize request body {:?}: {}", body, &e);
        respond_bad_request(format!("Unable to read request body: {}", &e))
    })
}

/// Fetch a header's value as a `&str`.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, Response> {
    match headers.get(name) {
        Some(val) => val.to_str().map_err(|e| {
            log::error!("Failed converting {} value {:?} to &str: {}", name, val, &e);
            respond_bad_request(format!("{} value unrecognizable.", name))
        }),
        None => Err(respond_bad_request(
            format!("Request must have an {} header.", name)
        )),
    }
}

/// A 200 response with a JSON body, labeled with the `x-lis-action` that
/// produced it.
pub fn respond_action<S: Serialize>(action: &'static str, data: S) -> Response {
    (
        StatusCode::OK,
        [(
            HeaderName::from_static("x-lis-action"),
            HeaderValue::from_static(action)
        )],
        Json(data)
    ).into_response()
}

/**
Check that `headers` carry a valid `x-lis-email` and `x-lis-key` pair,
producing the response to send back if they don't.
*/
pub async fn check_headers(glob: &RwLock<Glob>, headers: &HeaderMap) -> Result<(), Response> {
    let key = header_str(headers, "x-lis-key")?;
    let email = header_str(headers, "x-lis-email")?;

    // Bind the result first so the locks release before we match on it.
    let auth = glob.read().await.auth();
    let res = auth.read().await.check_key(email, key).await;

    match res {
        Err(e) => {
            log::error!(
                "auth::Db::check_key( {:?}, [ key ] ) returned error: {}",
                email, e.display()
            );
            Err(respond_500())
        },
        Ok(AuthResult::InvalidKey) => Err(respond_bad_key()),
        Ok(AuthResult::Ok) => Ok(()),
        Ok(x) => {
            log::warn!(
                "auth::Db::check_key() returned {:?}, which should never happen.",
                &x
            );
            Err(respond_500())
        },
    }
}

/**
Middleware function to ensure requests carry a valid `x-lis-email` and
`x-lis-key` pair before being passed on.
*/
pub async fn key_authenticate<B>(
    req: Request<B>,
    next: Next<B>,
) -> Response {
    let glob: Arc<RwLock<Glob>> = match req.extensions().get::<Arc<RwLock<Glob>>>() {
        Some(glob) => glob.clone(),
        None => {
            log::error!("key_authenticate(): request has no Glob extension.");
            return respond_500();
        },
    };

    // The request body isn't Sync, so don't hold a borrow of it across awaits.
    let headers = req.headers().clone();
    if let Err(r) = check_headers(&glob, &headers).await {
        return r;
    }

    next.run(req).await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use axum::body::HttpBody;
    use serial_test::serial;

    use crate::config::Cfg;
    use crate::mail::MemMailer;
    use crate::tests::ensure_logging;
    use crate::user::{Profile, Status};

    /// A `Glob` pointed at databases that shouldn't exist; for exercising
    /// paths that must be decided before any database is touched.
    pub fn test_glob(mailer: Arc<MemMailer>) -> Arc<RwLock<Glob>> {
        let cfg = Cfg {
            auth_db_connect_string: "host=localhost port=1 user=nobody dbname=nothing connect_timeout=1".to_owned(),
            data_db_connect_string: "host=localhost port=1 user=nobody dbname=nothing connect_timeout=1".to_owned(),
            ..Default::default()
        };
        Arc::new(RwLock::new(Glob::new(&cfg, mailer)))
    }

    /**
    A `Glob` pointed at the test databases (see `auth::tests` and
    `store::tests`), with their schemas in place. Tests that use this
    should be `#[ignore]` and `#[serial]`, and call `nuke()` when done.
    */
    pub async fn db_glob(mailer: Arc<MemMailer>) -> Arc<RwLock<Glob>> {
        let glob = Glob::new(&Cfg::default(), mailer);
        glob.auth().read().await.ensure_db_schema().await.unwrap();
        glob.data().read().await.ensure_db_schema().await.unwrap();
        Arc::new(RwLock::new(glob))
    }

    pub async fn nuke(glob: &RwLock<Glob>) {
        let glob = glob.read().await;
        glob.auth().read().await.nuke_database().await.unwrap();
        glob.data().read().await.nuke_database().await.unwrap();
    }

    /// Register `email` with `password` directly through the databases,
    /// with the given status.
    pub async fn add_teacher(glob: &RwLock<Glob>, email: &str, password: &str, status: Status) {
        let profile = Profile {
            honorific: Some("Ms.".to_owned()),
            firstname: "Liza".to_owned(),
            middlename: None,
            surname: "Reyes".to_owned(),
            suffix: None,
            post_nominals: None,
        };
        let glob = glob.read().await;
        let data = glob.data();
        let data = data.read().await;
        assert!(data.insert_teacher(email, &profile).await.unwrap());
        data.set_status(email, status).await.unwrap();
        glob.auth().read().await.add_user(email, password).await.unwrap();
    }

    pub fn key_headers(email: &str, key: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("x-lis-email", HeaderValue::from_str(email).unwrap());
        h.insert("x-lis-key", HeaderValue::from_str(key).unwrap());
        h
    }

    /// Status and JSON body of a response.
    pub async fn unpack(r: Response) -> (StatusCode, serde_json::Value) {
        let status = r.status();
        let mut body = r.into_body();
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = body.data().await {
            bytes.extend_from_slice(&chunk.unwrap());
        }
        let val = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, val)
    }

    #[tokio::test]
    async fn errors_are_json() {
        let (code, v) = unpack(json_error(StatusCode::NOT_FOUND, "Email not found")).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
        assert_eq!(v, json!({ "error": "Email not found" }));

        let (code, v) = unpack(json_message("OTP sent to email")).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(v["message"], "OTP sent to email");

        let (code, v) = unpack(respond_500()).await;
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(v, json!({ "error": "Internal server error" }));
    }

    #[tokio::test]
    async fn keyless_requests_refused() {
        let glob = test_glob(Arc::new(MemMailer::default()));

        let r = check_headers(&glob, &HeaderMap::new()).await.unwrap_err();
        let (code, v) = unpack(r).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"], "Request must have an x-lis-key header.");

        let mut h = HeaderMap::new();
        h.insert("x-lis-key", HeaderValue::from_static("abc"));
        let r = check_headers(&glob, &h).await.unwrap_err();
        assert_eq!(r.status(), StatusCode::BAD_REQUEST);

        // Well-formed, but there's no database to check them against.
        let r = check_headers(&glob, &key_headers("a@b.c", "abc")).await.unwrap_err();
        let (code, v) = unpack(r).await;
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(v["error"], "Internal server error");
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn keys_checked() {
        ensure_logging();
        let glob = db_glob(Arc::new(MemMailer::default())).await;
        let liza = "liza@school.edu.ph";
        add_teacher(&glob, liza, "Sampaguita7", Status::Approved).await;
        let key = glob.read().await.auth().read().await.issue_key(liza).await.unwrap();

        assert!(check_headers(&glob, &key_headers(liza, &key)).await.is_ok());

        let r = check_headers(&glob, &key_headers(liza, "not-the-key")).await.unwrap_err();
        let (code, v) = unpack(r).await;
        assert_eq!(code, StatusCode::UNAUTHORIZED);
        assert_eq!(v["error"], "Invalid authorization key.");

        // Somebody else's key doesn't work either.
        let r = check_headers(&glob, &key_headers("ramon@school.edu.ph", &key)).await.unwrap_err();
        assert_eq!(r.status(), StatusCode::UNAUTHORIZED);

        glob.read().await.auth().read().await.revoke_key(liza, &key).await.unwrap();
        let r = check_headers(&glob, &key_headers(liza, &key)).await.unwrap_err();
        assert_eq!(r.status(), StatusCode::UNAUTHORIZED);

        nuke(&glob).await;
    }

    #[test]
    fn headers() {
        let mut h = HeaderMap::new();
        h.insert("x-lis-email", HeaderValue::from_static("liza@school.edu.ph"));
        assert_eq!(header_str(&h, "x-lis-email").unwrap(), "liza@school.edu.ph");
        let r = header_str(&h, "x-lis-key").unwrap_err();
        assert_eq!(r.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn bodies() {
        #[derive(serde::Deserialize)]
        struct B { email: Option<String> }

        let b: B = parse_body("").unwrap();
        assert!(b.email.is_none());
        let b: B = parse_body(r#"{"email": "a@b.c"}"#).unwrap();
        assert_eq!(b.email.as_deref(), Some("a@b.c"));
        assert_eq!(
            parse_body::<B>("{not json").err().unwrap().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
