/*!
Structs to hold configuration data and global variables.
*/
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use time::{Duration, OffsetDateTime, UtcOffset};
use tokio::sync::RwLock;

use crate::{
    auth,
    feed::Feed,
    mail::{LogMailer, Mailer},
    otp::DEFAULT_LIFETIME_MINUTES,
    store::Store,
};

#[derive(Deserialize)]
struct ConfigFile {
    auth_db_connect_string: Option<String>,
    data_db_connect_string: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    otp_lifetime_minutes: Option<i64>,
    session_lifetime_hours: Option<i64>,
    utc_offset_hours: Option<i8>,
    mail_from: Option<String>,
    static_dir: Option<String>,
    index_file: Option<String>,
}

#[derive(Debug)]
pub struct Cfg {
    pub auth_db_connect_string: String,
    pub data_db_connect_string: String,
    pub addr: SocketAddr,
    pub otp_lifetime: Duration,
    pub session_lifetime: Duration,
    pub utc_offset: UtcOffset,
    pub mail_from: String,
    pub static_dir: PathBuf,
    pub index_file: PathBuf,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            auth_db_connect_string: "host=localhost user=lis_test password='lis_test' dbname=lis_auth_test".to_owned(),
            data_db_connect_string: "host=localhost user=lis_test password='lis_test' dbname=lis_store_test".to_owned(),
            addr: SocketAddr::from(([0, 0, 0, 0], 8001)),
            otp_lifetime: Duration::minutes(DEFAULT_LIFETIME_MINUTES),
            session_lifetime: Duration::hours(12),
            // Philippine Standard Time
            utc_offset: UtcOffset::from_whole_seconds(8 * 60 * 60)
                .unwrap_or(UtcOffset::UTC),
            mail_from: "lis@school.not.an.address".to_owned(),
            static_dir: PathBuf::from("static"),
            index_file: PathBuf::from("data/index.html"),
        }
    }
}

impl Cfg {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file {}: {}", path.display(), &e))?;
        Self::from_toml(&file_contents)
    }

    /// Overlay whatever is specified in `text` onto the defaults.
    pub fn from_toml(text: &str) -> Result<Self, String> {
        let cf: ConfigFile = toml::from_str(text)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.auth_db_connect_string {
            c.auth_db_connect_string = s;
        }
        if let Some(s) = cf.data_db_connect_string {
            c.data_db_connect_string = s;
        }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }
        if let Some(n) = cf.otp_lifetime_minutes {
            if n < 1 {
                return Err(format!("otp_lifetime_minutes must be positive (not {}).", &n));
            }
            c.otp_lifetime = Duration::minutes(n);
        }
        if let Some(n) = cf.session_lifetime_hours {
            if n < 1 {
                return Err(format!("session_lifetime_hours must be positive (not {}).", &n));
            }
            c.session_lifetime = Duration::hours(n);
        }
        if let Some(n) = cf.utc_offset_hours {
            c.utc_offset = UtcOffset::from_hms(n, 0, 0)
                .map_err(|e| format!("Bad utc_offset_hours {}: {}", &n, &e))?;
        }
        if let Some(s) = cf.mail_from {
            c.mail_from = s;
        }
        if let Some(s) = cf.static_dir {
            c.static_dir = PathBuf::from(s);
        }
        if let Some(s) = cf.index_file {
            c.index_file = PathBuf::from(s);
        }

        Ok(c)
    }
}

/**
This guy will haul around some global variables and be passed in an
`axum::Extension` to the handlers who need him.
*/
pub struct Glob {
    auth: Arc<RwLock<auth::Db>>,
    data: Arc<RwLock<Store>>,
    pub mailer: Arc<dyn Mailer>,
    pub feed: Feed,
    pub addr: SocketAddr,
    pub otp_lifetime: Duration,
    pub utc_offset: UtcOffset,
}

impl Glob {
    /// Assemble a `Glob` from `cfg` without touching either database.
    pub fn new(cfg: &Cfg, mailer: Arc<dyn Mailer>) -> Glob {
        let feed = Feed::new();
        let auth = auth::Db::new(cfg.auth_db_connect_string.clone(), cfg.session_lifetime);
        let data = Store::new(cfg.data_db_connect_string.clone(), feed.clone());

        Glob {
            auth: Arc::new(RwLock::new(auth)),
            data: Arc::new(RwLock::new(data)),
            mailer,
            feed,
            addr: cfg.addr,
            otp_lifetime: cfg.otp_lifetime,
            utc_offset: cfg.utc_offset,
        }
    }

    pub fn auth(&self) -> Arc<RwLock<auth::Db>> { self.auth.clone() }

    pub fn data(&self) -> Arc<RwLock<Store>> { self.data.clone() }

    /// The current moment in the school's time zone.
    pub fn local_now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.utc_offset)
    }
}

/// Loads system configuration and ensures all appropriate database tables
/// exist.
pub async fn load_configuration<P: AsRef<Path>>(path: P) -> Result<(Cfg, Glob), String> {
    let path = path.as_ref();
    let cfg = if path.exists() {
        Cfg::from_file(path)?
    } else {
        log::warn!(
            "Config file {} doesn't exist; using default configuration.",
            path.display()
        );
        Cfg::default()
    };
    log::info!("Configuration:\n{:#?}", &cfg);

    let mailer = Arc::new(LogMailer { from: cfg.mail_from.clone() });
    let glob = Glob::new(&cfg, mailer);

    log::trace!("Checking state of auth DB...");
    if let Err(e) = glob.auth().read().await.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of auth DB: {}", &e.display());
        return Err(estr);
    }
    log::trace!("...auth DB okay.");

    log::trace!("Checking state of data DB...");
    if let Err(e) = glob.data().read().await.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of data DB: {}", &e.display());
        return Err(estr);
    }
    log::trace!("...data DB okay.");

    Ok((cfg, glob))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_default() {
        let c = Cfg::from_toml("").unwrap();
        let d = Cfg::default();
        assert_eq!(c.addr, d.addr);
        assert_eq!(c.otp_lifetime, Duration::minutes(15));
        assert_eq!(c.session_lifetime, Duration::hours(12));
        assert_eq!(c.utc_offset.whole_hours(), 8);
        assert_eq!(c.index_file, PathBuf::from("data/index.html"));
    }

    #[test]
    fn overlay() {
        let text = r#"
data_db_connect_string = "host=db user=lis dbname=lis"
host = "127.0.0.1"
port = 8080
otp_lifetime_minutes = 5
utc_offset_hours = -5
static_dir = "/srv/lis/static"
"#;
        let c = Cfg::from_toml(text).unwrap();
        assert_eq!(c.data_db_connect_string, "host=db user=lis dbname=lis");
        assert_eq!(c.auth_db_connect_string, Cfg::default().auth_db_connect_string);
        assert_eq!(c.addr, SocketAddr::from(([127, 0, 0, 1], 8080)));
        assert_eq!(c.otp_lifetime, Duration::minutes(5));
        assert_eq!(c.utc_offset.whole_hours(), -5);
        assert_eq!(c.static_dir, PathBuf::from("/srv/lis/static"));
    }

    #[test]
    fn bad_values() {
        assert!(Cfg::from_toml("host = \"localhost:80\"").is_err());
        assert!(Cfg::from_toml("otp_lifetime_minutes = 0").is_err());
        assert!(Cfg::from_toml("utc_offset_hours = 30").is_err());
        assert!(Cfg::from_toml("port = \"eighty\"").is_err());
    }
}
