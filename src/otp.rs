/*!
One-time passwords for resetting a forgotten password.

The lifecycle of an OTP row (one per email address):

  1. `request`: a fresh code is generated and stored, overwriting whatever
     was there before.
  2. `verify`: the submitted code is checked; on success the code is cleared,
     the row is marked used, and the verification time is recorded.
  3. `redeem`: a password reset is allowed once, within the reset window,
     after a successful verification.
*/
use rand::Rng;
use time::{Duration, OffsetDateTime};

pub const CODE_LENGTH: usize = 6;
pub const DEFAULT_LIFETIME_MINUTES: i64 = 15;

/// Generate a code of `CODE_LENGTH` uniformly random decimal digits.
///
/// Leading zeros are allowed, so every one of the 10^6 codes is equally
/// likely.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Whether `code` even looks like something we might have issued.
pub fn well_formed(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Clone, Debug, PartialEq)]
pub struct OtpRecord {
    pub email: String,
    /// `None` once the code has been consumed.
    pub code: Option<String>,
    pub created_at: OffsetDateTime,
    pub expires_at: Option<OffsetDateTime>,
    pub used: bool,
    pub verified_at: Option<OffsetDateTime>,
    pub redeemed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtpResult {
    Ok,
    /// No account (or no OTP row) for that email.
    NoSuchEmail,
    /// Wrong code, or one that has already been used.
    Invalid,
    Expired,
    /// Asked to reset a password without a usable verification.
    Unverified,
}

impl OtpRecord {
    /// A freshly-issued record.
    pub fn issue(email: &str, code: String, now: OffsetDateTime, lifetime: Duration) -> OtpRecord {
        OtpRecord {
            email: email.to_owned(),
            code: Some(code),
            created_at: now,
            expires_at: Some(now + lifetime),
            used: false,
            verified_at: None,
            redeemed: false,
        }
    }

    /**
    Check a submitted code against this record at time `now`.

    This does not change the record; see `consume()`.
    */
    pub fn check(&self, submitted: &str, now: OffsetDateTime) -> OtpResult {
        if self.used {
            return OtpResult::Invalid;
        }
        match &self.code {
            Some(code) if code == submitted => {},
            _ => { return OtpResult::Invalid; },
        }
        if let Some(exp) = self.expires_at {
            if exp < now {
                return OtpResult::Expired;
            }
        }
        OtpResult::Ok
    }

    /// Mark a successfully-checked code as spent so it can't be replayed.
    pub fn consume(&mut self, now: OffsetDateTime) {
        self.code = None;
        self.used = true;
        self.verified_at = Some(now);
    }

    /// Whether this record currently authorizes a password reset.
    pub fn may_redeem(&self, now: OffsetDateTime, window: Duration) -> OtpResult {
        if self.redeemed {
            return OtpResult::Unverified;
        }
        match self.verified_at {
            None => OtpResult::Unverified,
            Some(t) => if t + window < now {
                OtpResult::Expired
            } else {
                OtpResult::Ok
            },
        }
    }
}
