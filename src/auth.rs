/*!
The authentication database: password hashes, session keys, and password
reset OTPs.

This is kept apart from the data database (`store`) so that nothing which
reads class lists or grades ever touches a credential.

```sql
CREATE TABLE passwords (
    email   TEXT PRIMARY KEY,
    hash    TEXT NOT NULL       /* Argon2 PHC string */
);

CREATE TABLE keys (
    key     TEXT PRIMARY KEY,
    email   TEXT NOT NULL,
    expires TIMESTAMPTZ NOT NULL
);

CREATE TABLE reset_otps (
    email       TEXT PRIMARY KEY,
    code        TEXT,           /* NULL once consumed */
    created_at  TIMESTAMPTZ NOT NULL,
    expires_at  TIMESTAMPTZ,
    used        BOOL NOT NULL,
    verified_at TIMESTAMPTZ,
    redeemed    BOOL NOT NULL
);
```
*/
use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        rand_core::OsRng,
    },
};
use rand::{Rng, distributions::Alphanumeric};
use time::{Duration, OffsetDateTime};
use tokio_postgres::{Client, NoTls, Row};

use crate::otp::{OtpRecord, OtpResult};
use crate::store::DbError;

const KEY_LENGTH: usize = 32;

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'passwords'",
        "CREATE TABLE passwords (
            email   TEXT PRIMARY KEY,
            hash    TEXT NOT NULL
        )",
        "DROP TABLE passwords",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'keys'",
        "CREATE TABLE keys (
            key     TEXT PRIMARY KEY,
            email   TEXT NOT NULL,
            expires TIMESTAMPTZ NOT NULL
        )",
        "DROP TABLE keys",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'reset_otps'",
        "CREATE TABLE reset_otps (
            email       TEXT PRIMARY KEY,
            code        TEXT,
            created_at  TIMESTAMPTZ NOT NULL,
            expires_at  TIMESTAMPTZ,
            used        BOOL NOT NULL DEFAULT FALSE,
            verified_at TIMESTAMPTZ,
            redeemed    BOOL NOT NULL DEFAULT FALSE
        )",
        "DROP TABLE reset_otps",
    ),
];

#[derive(Debug, PartialEq)]
pub enum AuthResult {
    Ok,
    NoSuchUser,
    BadPassword,
    Key(String),
    InvalidKey,
}

/// Hash `password` with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| format!("Error hashing password: {}", &e))
}

/// Whether `password` matches the stored PHC-format `hash`.
///
/// An unparseable hash matches nothing.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::error!("Stored password hash is unparseable: {}", &e);
            false
        },
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strength {
    Poor,
    Good,
    Strong,
}

/**
Classify a candidate password.

Fewer than 6 characters, or no uppercase letter, or no digit, is `Poor`.
Anything else is `Good`, unless it also has a symbol and is at least 10
characters long, in which case it's `Strong`.
*/
pub fn strength(password: &str) -> Strength {
    let n_chars = password.chars().count();
    if n_chars < 6 {
        return Strength::Poor;
    }
    let upper = password.chars().any(|c| c.is_ascii_uppercase());
    let digit = password.chars().any(|c| c.is_ascii_digit());
    if !(upper && digit) {
        return Strength::Poor;
    }
    let symbol = password.chars().any(|c| !c.is_ascii_alphanumeric());
    if symbol && n_chars >= 10 {
        Strength::Strong
    } else {
        Strength::Good
    }
}

fn generate_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_LENGTH)
        .map(char::from)
        .collect()
}

fn otp_from_row(row: &Row) -> Result<OtpRecord, DbError> {
    Ok(OtpRecord {
        email: row.try_get("email")?,
        code: row.try_get("code")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        used: row.try_get("used")?,
        verified_at: row.try_get("verified_at")?,
        redeemed: row.try_get("redeemed")?,
    })
}

pub struct Db {
    connection_string: String,
    key_lifetime: Duration,
}

impl Db {
    pub fn new(connection_string: String, key_lifetime: Duration) -> Self {
        log::trace!("auth::Db::new( {:?}, {} ) called.", &connection_string, &key_lifetime);

        Self { connection_string, key_lifetime }
    }

    async fn connect(&self) -> Result<Client, DbError> {
        log::trace!(
            "auth::Db::connect() called w/connection string {:?}",
            &self.connection_string
        );

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                log::trace!("    ...connection successful.");
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("Auth DB connection error: {}", &e);
                    }
                });
                Ok(client)
            },
            Err(e) => {
                let dberr = DbError::from(e);
                log::trace!("    ...connection failed: {:?}", &dberr);
                Err(dberr.annotate("Unable to connect to Auth DB"))
            }
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), DbError> {
        log::trace!("auth::Db::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("Auth DB unable to begin transaction"))?;

        for (test_stmt, create_stmt, _) in SCHEMA.iter() {
            if t.query_opt(*test_stmt, &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to insert table.",
                    test_stmt
                );
                t.execute(*create_stmt, &[]).await?;
            }
        }

        t.commit().await
            .map_err(|e| DbError::from(e)
                .annotate("Error committing transaction"))
    }

    /// Drop all tables. Only for cleaning up after tests.
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), DbError> {
        log::trace!("auth::Db::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(*drop_stmt, &[]).await {
                let err = DbError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err.display());
            }
        }

        Ok(())
    }

    /// Store a hash of `password` for a new user `email`.
    pub async fn add_user(&self, email: &str, password: &str) -> Result<(), DbError> {
        log::trace!("auth::Db::add_user( {:?}, [ password ] ) called.", email);

        let hash = hash_password(password)?;
        let client = self.connect().await?;
        let n = client.execute(
            "INSERT INTO passwords (email, hash) VALUES ($1, $2)
                ON CONFLICT (email) DO NOTHING",
            &[&email, &hash]
        ).await?;

        if n == 0 {
            Err(DbError::from(format!("{:?} already has a password.", email)))
        } else {
            Ok(())
        }
    }

    /// Removes a user's password and all their keys.
    pub async fn delete_user(&self, email: &str) -> Result<(), DbError> {
        log::trace!("auth::Db::delete_user( {:?} ) called.", email);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;
        t.execute("DELETE FROM keys WHERE email = $1", &[&email]).await?;
        t.execute("DELETE FROM reset_otps WHERE email = $1", &[&email]).await?;
        t.execute("DELETE FROM passwords WHERE email = $1", &[&email]).await?;
        t.commit().await?;
        Ok(())
    }

    pub async fn check_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthResult, DbError> {
        log::trace!("auth::Db::check_password( {:?}, [ password ] ) called.", email);

        let client = self.connect().await?;
        let row = match client.query_opt(
            "SELECT hash FROM passwords WHERE email = $1",
            &[&email]
        ).await? {
            None => { return Ok(AuthResult::NoSuchUser); },
            Some(row) => row,
        };
        let hash: String = row.try_get("hash")?;

        if verify_password(password, &hash) {
            Ok(AuthResult::Ok)
        } else {
            Ok(AuthResult::BadPassword)
        }
    }

    /// Issue a new session key for `email`, valid for the key lifetime.
    pub async fn issue_key(&self, email: &str) -> Result<String, DbError> {
        log::trace!("auth::Db::issue_key( {:?} ) called.", email);

        let key = generate_key();
        let expires = OffsetDateTime::now_utc() + self.key_lifetime;

        let client = self.connect().await?;
        // Opportunistic cleanup; failure here isn't worth failing a login over.
        if let Err(e) = client.execute(
            "DELETE FROM keys WHERE expires < $1",
            &[&OffsetDateTime::now_utc()]
        ).await {
            log::warn!("Error purging expired keys: {}", &e);
        }
        client.execute(
            "INSERT INTO keys (key, email, expires) VALUES ($1, $2, $3)",
            &[&key, &email, &expires]
        ).await?;

        Ok(key)
    }

    pub async fn check_password_and_issue_key(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthResult, DbError> {
        log::trace!(
            "auth::Db::check_password_and_issue_key( {:?}, [ password ] ) called.",
            email
        );

        match self.check_password(email, password).await? {
            AuthResult::Ok => {},
            x => { return Ok(x); },
        }

        let key = self.issue_key(email).await?;
        Ok(AuthResult::Key(key))
    }

    pub async fn check_key(&self, email: &str, key: &str) -> Result<AuthResult, DbError> {
        log::trace!("auth::Db::check_key( {:?}, {:?} ) called.", email, key);

        let client = self.connect().await?;
        let row = client.query_opt(
            "SELECT email, expires FROM keys WHERE key = $1",
            &[&key]
        ).await?;

        let row = match row {
            None => { return Ok(AuthResult::InvalidKey); },
            Some(row) => row,
        };
        let key_email: &str = row.try_get("email")?;
        let expires: OffsetDateTime = row.try_get("expires")?;

        if key_email != email || expires < OffsetDateTime::now_utc() {
            Ok(AuthResult::InvalidKey)
        } else {
            Ok(AuthResult::Ok)
        }
    }

    pub async fn revoke_key(&self, email: &str, key: &str) -> Result<(), DbError> {
        log::trace!("auth::Db::revoke_key( {:?}, {:?} ) called.", email, key);

        let client = self.connect().await?;
        client.execute(
            "DELETE FROM keys WHERE key = $1 AND email = $2",
            &[&key, &email]
        ).await?;
        Ok(())
    }

    /// Store a freshly-issued OTP, replacing any prior one for that email.
    pub async fn store_otp(&self, otp: &OtpRecord) -> Result<(), DbError> {
        log::trace!("auth::Db::store_otp( {:?} ) called.", &otp.email);

        let client = self.connect().await?;
        client.execute(
            "INSERT INTO reset_otps
                (email, code, created_at, expires_at, used, verified_at, redeemed)
                VALUES ($1, $2, $3, $4, FALSE, NULL, FALSE)
            ON CONFLICT (email) DO UPDATE SET
                code = EXCLUDED.code,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at,
                used = FALSE,
                verified_at = NULL,
                redeemed = FALSE",
            &[&otp.email, &otp.code, &otp.created_at, &otp.expires_at]
        ).await
            .map_err(|e| DbError::from(e).annotate("Unable to store OTP"))?;

        Ok(())
    }

    pub async fn get_otp(&self, email: &str) -> Result<Option<OtpRecord>, DbError> {
        log::trace!("auth::Db::get_otp( {:?} ) called.", email);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM reset_otps WHERE email = $1",
            &[&email]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(otp_from_row(&row)?)),
        }
    }

    /**
    Check `code` against the stored OTP for `email`, consuming it on
    success.

    The row is locked for the duration, so two simultaneous submissions of
    the same code can't both succeed.
    */
    pub async fn verify_otp(
        &self,
        email: &str,
        code: &str,
        now: OffsetDateTime,
    ) -> Result<OtpResult, DbError> {
        log::trace!("auth::Db::verify_otp( {:?}, {:?} ) called.", email, code);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let mut otp = match t.query_opt(
            "SELECT * FROM reset_otps WHERE email = $1 FOR UPDATE",
            &[&email]
        ).await? {
            None => { return Ok(OtpResult::Invalid); },
            Some(row) => otp_from_row(&row)?,
        };

        match otp.check(code, now) {
            OtpResult::Ok => {},
            x => { return Ok(x); },
        }

        otp.consume(now);
        t.execute(
            "UPDATE reset_otps SET code = $1, used = $2, verified_at = $3
                WHERE email = $4",
            &[&otp.code, &otp.used, &otp.verified_at, &email]
        ).await?;
        t.commit().await?;

        Ok(OtpResult::Ok)
    }

    /**
    Set a new password for `email`, provided it has a verified, unredeemed
    OTP no older than `window`. All of the user's session keys are revoked.
    */
    pub async fn redeem_otp_and_set_password(
        &self,
        email: &str,
        new_password: &str,
        now: OffsetDateTime,
        window: Duration,
    ) -> Result<OtpResult, DbError> {
        log::trace!(
            "auth::Db::redeem_otp_and_set_password( {:?}, [ password ] ) called.",
            email
        );

        let hash = hash_password(new_password)?;

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let otp = match t.query_opt(
            "SELECT * FROM reset_otps WHERE email = $1 FOR UPDATE",
            &[&email]
        ).await? {
            None => { return Ok(OtpResult::Unverified); },
            Some(row) => otp_from_row(&row)?,
        };

        match otp.may_redeem(now, window) {
            OtpResult::Ok => {},
            x => { return Ok(x); },
        }

        let n = t.execute(
            "UPDATE passwords SET hash = $1 WHERE email = $2",
            &[&hash, &email]
        ).await?;
        if n == 0 {
            return Ok(OtpResult::NoSuchEmail);
        }

        t.execute(
            "UPDATE reset_otps SET redeemed = TRUE WHERE email = $1",
            &[&email]
        ).await?;
        t.execute("DELETE FROM keys WHERE email = $1", &[&email]).await?;
        t.commit().await?;

        Ok(OtpResult::Ok)
    }
}
