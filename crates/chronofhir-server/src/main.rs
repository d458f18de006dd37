use std::env;

use chronofhir_server::config::loader::{DEFAULT_CONFIG_FILE, load_config};
use chronofhir_server::{ProtocolRequest, ServerBuilder};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From CHRONOFHIR_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (chronofhir.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (CHRONOFHIR_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    chronofhir_server::init_tracing();

    let (config_path, source) = resolve_config_path();
    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    tracing::info!(path = %config_path, source = %source, "Configuration loaded");
    chronofhir_server::apply_logging_level(&cfg.logging.level);

    if let Err(e) = run(cfg).await {
        eprintln!("Error: {e:#}");
        std::process::exit(2);
    }
}

async fn run(cfg: chronofhir_server::config::AppConfig) -> anyhow::Result<()> {
    let server = ServerBuilder::new().with_config(cfg).build().await?;

    let output = match batch_file_arg() {
        Some(path) => {
            let raw = tokio::fs::read_to_string(&path).await?;
            let bundle: serde_json::Value = serde_json::from_str(&raw)?;
            let ctx = server.request_context().build();
            let response = server
                .dispatcher()
                .handle(ProtocolRequest::batch(bundle), &ctx)
                .await;
            tracing::info!(
                path = %path,
                status = %response.status,
                "batch finished"
            );
            response.body_json().unwrap_or_default()
        }
        None => server.facade().capabilities().to_value(),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn flag_value(flag: &str) -> Option<String> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == flag {
            return args.next();
        }
    }
    None
}

fn batch_file_arg() -> Option<String> {
    flag_value("--batch")
}

fn resolve_config_path() -> (String, ConfigSource) {
    // 1. CLI: --config <path>
    if let Some(path) = flag_value("--config") {
        return (path, ConfigSource::CliArgument);
    }

    // 2. Environment variable
    if let Ok(path) = env::var("CHRONOFHIR_CONFIG") {
        if !path.is_empty() {
            return (path, ConfigSource::EnvironmentVariable);
        }
    }

    // 3. Default
    (DEFAULT_CONFIG_FILE.to_string(), ConfigSource::Default)
}
