//! Fisheye Lens Undistortion
//!
//! Entry point for the defisheye application.

use anyhow::Context;
use defisheye::app::App;
use defisheye::config::AppConfig;

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("Defisheye starting...");

    let result = AppConfig::load()
        .context("Failed to load configuration")
        .and_then(|config| App::new(config).run());

    match result {
        Ok(outputs) => {
            for path in outputs {
                println!("{}", path.display());
            }
            log::info!("Defisheye finished");
        }
        Err(e) => {
            log::error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
