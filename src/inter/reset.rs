/*!
Password reset by emailed one-time password.

The client walks through three endpoints in order:

  * `POST /api/send-otp` `{"email"}`
  * `POST /api/otp-verification` `{"email", "otp"}`
  * `POST /api/reset-pass` `{"email", "newPassword"}`
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::{
    auth::{strength, Strength},
    blank_means_none,
    config::Glob,
    feed::Change,
    mail::otp_message,
    otp::{generate_code, well_formed, OtpRecord, OtpResult},
};
use super::*;

#[derive(Debug, Deserialize)]
struct SendOtpData {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    email: Option<String>,
    otp: Option<String>,
}

#[derive(Deserialize)]
struct ResetData {
    email: Option<String>,
    #[serde(rename = "newPassword")]
    new_password: Option<String>,
}

pub async fn send_otp(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    body: String,
) -> Response {
    log::trace!("reset::send_otp( [ Glob ], {:?} ) called.", &body);

    let data: SendOtpData = match parse_body(&body) {
        Ok(d) => d,
        Err(r) => { return r; },
    };
    let email = match blank_means_none(data.email.as_deref()) {
        Some(email) => email,
        None => { return json_error(StatusCode::BAD_REQUEST, "Email is required"); },
    };

    let glob = glob.read().await;

    let teacher = glob.data().read().await.get_teacher(email).await;
    match teacher {
        Err(e) => {
            log::error!("Store::get_teacher( {:?} ): {}", email, e.display());
            return respond_500();
        },
        Ok(None) => { return json_error(StatusCode::NOT_FOUND, "Email not found"); },
        Ok(Some(_)) => {},
    }

    let code = generate_code();
    let otp = OtpRecord::issue(email, code.clone(), OffsetDateTime::now_utc(), glob.otp_lifetime);
    let stored = glob.auth().read().await.store_otp(&otp).await;
    if let Err(e) = stored {
        log::error!("auth::Db::store_otp( {:?} ): {}", email, e.display());
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store OTP");
    }

    let msg = match otp_message(email, &code, glob.otp_lifetime.whole_minutes()) {
        Ok(msg) => msg,
        Err(e) => {
            log::error!("{}", &e);
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to send OTP email");
        },
    };
    if let Err(e) = glob.mailer.send(msg).await {
        log::error!("Error mailing OTP to {:?}: {}", email, &e);
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to send OTP email");
    }

    log::info!("Password reset OTP sent to {:?}.", email);
    json_message("OTP sent to email")
}

pub async fn otp_verification(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    body: String,
) -> Response {
    log::trace!("reset::otp_verification( [ Glob ], [ body ] ) called.");

    let data: VerifyData = match parse_body(&body) {
        Ok(d) => d,
        Err(r) => { return r; },
    };
    let (email, code) = match (
        blank_means_none(data.email.as_deref()),
        blank_means_none(data.otp.as_deref()),
    ) {
        (Some(email), Some(code)) => (email, code),
        _ => { return json_error(StatusCode::BAD_REQUEST, "Email and OTP are required"); },
    };

    if !well_formed(code) {
        return json_error(StatusCode::BAD_REQUEST, "Invalid OTP");
    }

    let auth = glob.read().await.auth();
    let res = auth.read().await.verify_otp(email, code, OffsetDateTime::now_utc()).await;

    match res {
        Err(e) => {
            log::error!("auth::Db::verify_otp( {:?}, [ code ] ): {}", email, e.display());
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error while verifying OTP")
        },
        Ok(OtpResult::Ok) => json_message("OTP verified successfully"),
        Ok(OtpResult::Expired) => json_error(StatusCode::BAD_REQUEST, "OTP expired"),
        Ok(_) => json_error(StatusCode::BAD_REQUEST, "Invalid OTP"),
    }
}

pub async fn reset_pass(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    body: String,
) -> Response {
    log::trace!("reset::reset_pass( [ Glob ], [ body ] ) called.");

    let data: ResetData = match parse_body(&body) {
        Ok(d) => d,
        Err(r) => { return r; },
    };
    let email = blank_means_none(data.email.as_deref());
    let new_password = data.new_password.as_deref().filter(|p| !p.is_empty());
    let (email, new_password) = match (email, new_password) {
        (Some(email), Some(pw)) => (email, pw),
        _ => {
            return json_error(
                StatusCode::BAD_REQUEST,
                "Email and new password are required"
            );
        },
    };

    if strength(new_password) == Strength::Poor {
        return json_error(StatusCode::BAD_REQUEST, WEAK_PASSWORD);
    }

    let glob = glob.read().await;
    let res = glob.auth().read().await.redeem_otp_and_set_password(
        email, new_password, OffsetDateTime::now_utc(), glob.otp_lifetime
    ).await;

    match res {
        Err(e) => {
            log::error!(
                "auth::Db::redeem_otp_and_set_password( {:?}, [ password ] ): {}",
                email, e.display()
            );
            return respond_500();
        },
        Ok(OtpResult::Ok) => {},
        Ok(OtpResult::Unverified) => {
            return json_error(StatusCode::BAD_REQUEST, "OTP verification required");
        },
        Ok(OtpResult::Expired) => {
            return json_error(StatusCode::BAD_REQUEST, "OTP expired");
        },
        Ok(OtpResult::NoSuchEmail) => {
            return json_error(StatusCode::NOT_FOUND, "Email not found");
        },
        Ok(OtpResult::Invalid) => {
            return json_error(StatusCode::BAD_REQUEST, "Invalid OTP");
        },
    }

    // All their keys are gone, so they aren't logged in anywhere anymore.
    if let Err(e) = glob.data().read().await.set_logged_in(email, false).await {
        log::warn!("Unable to clear login flag of {:?}: {}", email, e.display());
    }
    glob.feed.publish(Change::Password { email: email.to_owned() });

    log::info!("Password of {:?} reset.", email);
    json_message("Password successfully updated!")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inter::tests::{add_teacher, db_glob, nuke, test_glob, unpack};
    use crate::mail::MemMailer;
    use crate::tests::ensure_logging;
    use crate::user::Status;

    use serde_json::json;
    use serial_test::serial;

    async fn call<F, Fut>(handler: F, body: &str) -> (StatusCode, serde_json::Value)
    where
        F: FnOnce(Extension<Arc<RwLock<Glob>>>, String) -> Fut,
        Fut: std::future::Future<Output = Response>,
    {
        let glob = test_glob(Arc::new(MemMailer::default()));
        unpack(handler(Extension(glob), body.to_owned()).await).await
    }

    #[tokio::test]
    async fn send_otp_needs_email() {
        let (code, v) = call(send_otp, "{}").await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(v, json!({ "error": "Email is required" }));

        let (code, _) = call(send_otp, r#"{"email": "  "}"#).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);

        let (code, _) = call(send_otp, "email=a@b.c").await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn verification_needs_both() {
        let (code, v) = call(otp_verification, r#"{"email": "a@b.c"}"#).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"], "Email and OTP are required");

        let (code, v) = call(otp_verification, r#"{"otp": "123456"}"#).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"], "Email and OTP are required");
    }

    #[tokio::test]
    async fn malformed_otp_is_invalid() {
        for otp in ["12345", "1234567", "12a456"] {
            let body = json!({ "email": "a@b.c", "otp": otp }).to_string();
            let (code, v) = call(otp_verification, &body).await;
            assert_eq!(code, StatusCode::BAD_REQUEST);
            assert_eq!(v["error"], "Invalid OTP");
        }
    }

    #[tokio::test]
    async fn reset_needs_both() {
        let (code, v) = call(reset_pass, r#"{"email": "a@b.c"}"#).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"], "Email and new password are required");

        let (code, _) = call(reset_pass, r#"{"email": "a@b.c", "newPassword": ""}"#).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn weak_passwords_refused() {
        for pw in ["short", "alllowercase1", "NODIGITSHERE"] {
            let body = json!({ "email": "a@b.c", "newPassword": pw }).to_string();
            let (code, v) = call(reset_pass, &body).await;
            assert_eq!(code, StatusCode::BAD_REQUEST, "{}", pw);
            assert!(v["error"].as_str().unwrap().starts_with("Password must"));
        }
    }

    #[tokio::test]
    async fn unreachable_database_is_500() {
        let (code, v) = call(send_otp, r#"{"email": "a@b.c"}"#).await;
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(v["error"], "Internal server error");
    }

    async fn post<F, Fut>(
        handler: F,
        glob: &Arc<RwLock<Glob>>,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value)
    where
        F: FnOnce(Extension<Arc<RwLock<Glob>>>, String) -> Fut,
        Fut: std::future::Future<Output = Response>,
    {
        unpack(handler(Extension(glob.clone()), body.to_string()).await).await
    }

    /// The code from the last message `mailer` was asked to send.
    fn mailed_code(mailer: &MemMailer) -> String {
        let sent = mailer.sent.lock().unwrap();
        let msg = sent.last().unwrap();
        msg.body.lines()
            .map(|line| line.trim())
            .find(|line| well_formed(line))
            .unwrap()
            .to_owned()
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn reset_flow() {
        ensure_logging();
        let mailer = Arc::new(MemMailer::default());
        let glob = db_glob(mailer.clone()).await;
        let liza = "liza@school.edu.ph";
        add_teacher(&glob, liza, "Sampaguita7", Status::Approved).await;
        let mut changes = glob.read().await.feed.subscribe();

        let (code, v) = post(send_otp, &glob, json!({ "email": "nobody@school.edu.ph" })).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
        assert_eq!(v, json!({ "error": "Email not found" }));
        assert!(mailer.sent.lock().unwrap().is_empty());

        let (code, v) = post(send_otp, &glob, json!({ "email": liza })).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(v["message"], "OTP sent to email");
        let otp = mailed_code(&mailer);

        let reset = json!({ "email": liza, "newPassword": "Ilang-Ilang8" });
        let (code, v) = post(reset_pass, &glob, reset.clone()).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"], "OTP verification required");

        let wrong = if otp == "000000" { "111111" } else { "000000" };
        let (code, v) = post(otp_verification, &glob, json!({ "email": liza, "otp": wrong })).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"], "Invalid OTP");

        let (code, v) = post(otp_verification, &glob, json!({ "email": liza, "otp": &otp })).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(v["message"], "OTP verified successfully");

        let (code, v) = post(otp_verification, &glob, json!({ "email": liza, "otp": &otp })).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"], "Invalid OTP");

        let (code, v) = post(reset_pass, &glob, reset.clone()).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(v["message"], "Password successfully updated!");
        assert_eq!(
            changes.try_recv().unwrap(),
            Change::Password { email: liza.to_owned() }
        );

        let (code, v) = post(reset_pass, &glob, reset).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"], "OTP verification required");

        {
            let glob = glob.read().await;
            let auth = glob.auth();
            let auth = auth.read().await;
            assert_eq!(
                auth.check_password(liza, "Ilang-Ilang8").await.unwrap(),
                crate::auth::AuthResult::Ok
            );
            assert_eq!(
                auth.check_password(liza, "Sampaguita7").await.unwrap(),
                crate::auth::AuthResult::BadPassword
            );
        }

        nuke(&glob).await;
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn undeliverable_otp() {
        ensure_logging();
        let mailer = Arc::new(MemMailer { fail: true, ..Default::default() });
        let glob = db_glob(mailer).await;
        let liza = "liza@school.edu.ph";
        add_teacher(&glob, liza, "Sampaguita7", Status::Approved).await;

        let (code, v) = post(send_otp, &glob, json!({ "email": liza })).await;
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(v, json!({ "error": "Failed to send OTP email" }));

        nuke(&glob).await;
    }
}
