/*!
Here we go!

```bash
lis [ config.toml ]
```
*/
use std::sync::Arc;

use axum::{
    Extension,
    middleware,
    Router,
    routing::post,
};
use simplelog::{ColorChoice, TerminalMode, TermLogger};
use tokio::sync::RwLock;
use tower_http::services::fs::{ServeDir, ServeFile};

use lis::{config, feed, inter};

static DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("lis")
        .build();
    if let Err(e) = TermLogger::init(
        lis::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ) {
        eprintln!("Unable to start logging: {}", &e);
    }
    log::info!("Logging started.");

    let config_path = std::env::args().nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_owned());
    let (cfg, glob) = match config::load_configuration(&config_path).await {
        Ok(x) => x,
        Err(e) => {
            log::error!("Error loading configuration from {:?}: {}", &config_path, &e);
            std::process::exit(1);
        },
    };

    tokio::spawn(feed::log_changes(glob.feed.subscribe()));

    let addr = glob.addr;
    let glob = Arc::new(RwLock::new(glob));

    let authenticated = Router::new()
        .route("/teacher", post(inter::teacher::api))
        .route("/logout", post(inter::account::logout))
        .route_layer(middleware::from_fn(inter::key_authenticate));

    let app = Router::new()
        .route_service("/", ServeFile::new(&cfg.index_file))
        .nest_service("/static", ServeDir::new(&cfg.static_dir))
        .route("/api/send-otp", post(inter::reset::send_otp))
        .route("/api/otp-verification", post(inter::reset::otp_verification))
        .route("/api/reset-pass", post(inter::reset::reset_pass))
        .route("/register", post(inter::account::register))
        .route("/login", post(inter::account::login))
        .merge(authenticated)
        .layer(Extension(glob));

    log::info!("Listening on {}", &addr);

    if let Err(e) = axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
    {
        log::error!("Server error: {}", &e);
        std::process::exit(1);
    }
}
