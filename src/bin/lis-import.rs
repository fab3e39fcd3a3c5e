/*!
Load students from a .csv file into the data database.

```bash
lis-import config.toml students.csv
```

See `Student::from_csv_line()` for the expected format. The import is all
or nothing: if any line fails to parse, or any LRN is already in the
database, nothing is inserted.
*/
use std::fs::File;

use simplelog::{ColorChoice, TerminalMode, TermLogger};

use lis::{config::Cfg, feed::Feed, store::Store, user::Student};

async fn run(config_path: &str, csv_path: &str) -> Result<usize, String> {
    let cfg = Cfg::from_file(config_path)?;
    log::info!("Configuration:\n{:#?}", &cfg);

    let f = File::open(csv_path)
        .map_err(|e| format!("Unable to open {:?}: {}", csv_path, &e))?;
    let students = Student::vec_from_csv_reader(f)?;
    log::info!("Read {} students from {:?}.", students.len(), csv_path);

    let db = Store::new(cfg.data_db_connect_string.clone(), Feed::new());
    db.ensure_db_schema().await
        .map_err(|e| format!("Unable to ensure state of data DB: {}", e.display()))?;
    let n = db.insert_students(&students).await
        .map_err(|e| e.display().to_owned())?;

    Ok(n)
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
    if args.len() != 3 {
        let me = args.first().map(|s| s.as_str()).unwrap_or("lis-import");
        eprintln!("usage: {} CONFIG_FILE STUDENTS_CSV", me);
        std::process::exit(2);
    }

    match run(&args[1], &args[2]).await {
        Ok(n) => { println!("Inserted {} students.", &n); },
        Err(e) => {
            eprintln!("{}", &e);
            std::process::exit(1);
        },
    }
}
