use std::env;

use dotenvy::dotenv;

use linkgate::config::StaticConfig;
use linkgate::runtime;
use linkgate::system::logging;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--generate-config") {
        return generate_config(&args);
    }

    let config = StaticConfig::load();

    // The guard must outlive the server so buffered log lines flush on exit.
    let _logging_guard = logging::init_logging(&config.logging);

    runtime::run_server(config).await
}

/// `--generate-config [path]`: prints a commented sample config, or writes
/// it to `path` when given.
fn generate_config(args: &[String]) -> anyhow::Result<()> {
    let position = args
        .iter()
        .position(|a| a == "--generate-config")
        .unwrap_or(0);

    match args.get(position + 1) {
        Some(path) if !path.starts_with('-') => {
            StaticConfig::default()
                .save_to_file(path)
                .map_err(|e| anyhow::anyhow!("Failed to write sample config: {e}"))?;
            println!("Sample config written to {path}");
        }
        _ => print!("{}", StaticConfig::generate_sample_config()),
    }

    Ok(())
}
