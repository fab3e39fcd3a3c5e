/*!
Administrative chores that have no web interface.

```bash
lis-admin config.toml pending
lis-admin config.toml approve liza@school.edu.ph
lis-admin config.toml reject liza@school.edu.ph
lis-admin config.toml timetable timetable.csv
```

New registrations are `Pending` and can't log in until approved. See
`TimetableRow::from_csv_line()` for the timetable format; loading one
creates the sections and subjects it mentions and is all or nothing.
*/
use std::fs::File;

use simplelog::{ColorChoice, TerminalMode, TermLogger};

use lis::{
    config::Cfg,
    feed::Feed,
    school::TimetableRow,
    store::Store,
    user::Status,
};

static USAGE: &str = "CONFIG_FILE ( pending | approve EMAIL | reject EMAIL | timetable CSV_FILE )";

#[derive(Debug, PartialEq)]
enum Command {
    Pending,
    SetStatus(String, Status),
    Timetable(String),
}

impl Command {
    /// `args` are the ones following the config file.
    fn parse(args: &[String]) -> Result<Command, String> {
        let words: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
        match words.as_slice() {
            ["pending"] => Ok(Command::Pending),
            ["approve", email] => Ok(Command::SetStatus(email.to_string(), Status::Approved)),
            ["reject", email] => Ok(Command::SetStatus(email.to_string(), Status::Rejected)),
            ["timetable", path] => Ok(Command::Timetable(path.to_string())),
            [] => Err("No command given.".to_owned()),
            [cmd, ..] => Err(format!("Unrecognized command or wrong arguments: {:?}", cmd)),
        }
    }
}

async fn run(config_path: &str, cmd: Command) -> Result<String, String> {
    let cfg = Cfg::from_file(config_path)?;
    log::info!("Configuration:\n{:#?}", &cfg);

    let db = Store::new(cfg.data_db_connect_string.clone(), Feed::new());
    db.ensure_db_schema().await
        .map_err(|e| format!("Unable to ensure state of data DB: {}", e.display()))?;

    match cmd {
        Command::Pending => {
            let teachers = db.teachers_with_status(Status::Pending).await
                .map_err(|e| e.display().to_owned())?;
            let lines: Vec<String> = teachers.iter()
                .map(|t| format!("{}\t{}", &t.email, t.profile.display_name()))
                .collect();
            Ok(format!("{} pending.\n{}", lines.len(), lines.join("\n")))
        },
        Command::SetStatus(email, status) => {
            db.set_status(&email, status).await
                .map_err(|e| e.display().to_owned())?;
            log::info!("Set status of {:?} to {}.", &email, &status);
            Ok(format!("{} is now {}.", &email, &status))
        },
        Command::Timetable(path) => {
            let f = File::open(&path)
                .map_err(|e| format!("Unable to open {:?}: {}", &path, &e))?;
            let rows = TimetableRow::vec_from_csv_reader(f)?;
            log::info!("Read {} timetable rows from {:?}.", rows.len(), &path);
            let n = db.load_timetable(&rows).await
                .map_err(|e| e.display().to_owned())?;
            Ok(format!("Inserted {} schedule entries.", &n))
        },
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("lis")
        .build();
    if let Err(e) = TermLogger::init(
        lis::log_level_from_env(),
        log_cfg,
        TerminalMode::Stderr,
        ColorChoice::Auto
    ) {
        eprintln!("Unable to start logging: {}", &e);
    }

    let args: Vec<String> = std::env::args().collect();
    let me = args.first().map(|s| s.as_str()).unwrap_or("lis-admin");
    let (config_path, cmd) = match args.get(1) {
        Some(path) => match Command::parse(&args[2..]) {
            Ok(cmd) => (path, cmd),
            Err(e) => {
                eprintln!("{}\nusage: {} {}", &e, me, USAGE);
                std::process::exit(2);
            },
        },
        None => {
            eprintln!("usage: {} {}", me, USAGE);
            std::process::exit(2);
        },
    };

    match run(config_path, cmd).await {
        Ok(msg) => { println!("{}", &msg); },
        Err(e) => {
            eprintln!("{}", &e);
            std::process::exit(1);
        },
    }
}
