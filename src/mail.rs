/*!
Outgoing email.

Actual delivery is somebody else's job; anything that implements `Mailer`
can be plugged into the `Glob`. The bundled `LogMailer` just writes the
rendered message to the log, which is what you want in development.
*/
use std::sync::Mutex;

use async_trait::async_trait;
use handlebars::Handlebars;
use once_cell::sync::OnceCell;
use serde::Serialize;

static TEMPLATES: OnceCell<Handlebars> = OnceCell::new();

static OTP_SUBJECT: &str = "Your LIS password reset code";

static OTP_TEMPLATE: &str = "\
Good day!

Someone (hopefully you) asked to reset the password of the LIS account
belonging to {{email}}.

Your one-time code is:

    {{code}}

It is valid for {{minutes}} minutes. If you didn't ask for this, you can
safely ignore this message; your password has not been changed.
";

fn templates() -> Result<&'static Handlebars<'static>, String> {
    TEMPLATES.get_or_try_init(|| {
        let mut h = Handlebars::new();
        h.set_strict_mode(true);
        h.register_escape_fn(handlebars::no_escape);
        h.register_template_string("otp", OTP_TEMPLATE)
            .map_err(|e| format!("Error registering OTP email template: {}", &e))?;
        Ok(h)
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
struct OtpData<'a> {
    email: &'a str,
    code: &'a str,
    minutes: i64,
}

/// Compose the email that delivers an OTP.
pub fn otp_message(email: &str, code: &str, minutes: i64) -> Result<Message, String> {
    let data = OtpData { email, code, minutes };
    let body = templates()?.render("otp", &data)
        .map_err(|e| format!("Error rendering OTP email for {:?}: {}", email, &e))?;

    Ok(Message {
        to: email.to_owned(),
        subject: OTP_SUBJECT.to_owned(),
        body,
    })
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, msg: Message) -> Result<(), String>;
}

/// Writes messages to the log instead of sending them.
pub struct LogMailer {
    pub from: String,
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, msg: Message) -> Result<(), String> {
        log::info!(
            "Mail from {} to {}: {}\n{}",
            &self.from, &msg.to, &msg.subject, &msg.body
        );
        Ok(())
    }
}

/// Keeps every message it's asked to send; optionally refuses them all.
#[derive(Default)]
pub struct MemMailer {
    pub sent: Mutex<Vec<Message>>,
    pub fail: bool,
}

#[async_trait]
impl Mailer for MemMailer {
    async fn send(&self, msg: Message) -> Result<(), String> {
        if self.fail {
            return Err(format!("Refusing to send mail to {}.", &msg.to));
        }
        self.sent.lock()
            .map_err(|e| format!("Mailbox poisoned: {}", &e))?
            .push(msg);
        Ok(())
    }
}
