//! AGRIna - Soil Telemetry Dashboard Binary
//!
//! Serves the dashboard backed by the in-memory store, optionally seeded with
//! demo devices and a simulator.

use agrina::simulator::{DEMO_ADMIN_EMAIL, DEMO_ADMIN_PASSWORD};
use agrina::{
    seed_demo, start_web_server, AppState, DataStore, LocalAuth, MemoryStore, ReadingSimulator,
    WebConfig,
};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::{filter::LevelFilter, EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "agrina")]
#[command(about = "🌱 AGRIna - Soil Telemetry Dashboard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "AGRIna Team")]
#[command(long_about = "A web dashboard for live and historical soil readings from field devices")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Web server bind address [default: 0.0.0.0]
    #[arg(long, global = true)]
    host: Option<String>,

    /// Web server port [default: 8080]
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// TOML configuration file; flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Key used to sign session tokens
    #[arg(long, global = true, env = "AGRINA_SESSION_SECRET", hide_env_values = true)]
    session_secret: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server (default)
    Serve(ServeArgs),

    /// Print the effective configuration as TOML and exit
    Config,
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Static files directory (optional)
    #[arg(long)]
    static_dir: Option<String>,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,

    /// Maximum WebSocket connections
    #[arg(long)]
    max_connections: Option<usize>,

    /// Seed demo devices, readings and an admin account, and simulate telemetry
    #[arg(long)]
    demo: bool,

    /// Demo simulator interval in milliseconds
    #[arg(long)]
    simulate_interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    init_logging(&cli)?;

    match &cli.command {
        Some(Commands::Serve(args)) => {
            print_banner();
            serve_command(&cli, args).await?;
        }
        Some(Commands::Config) => {
            config_command(&cli)?;
        }
        None => {
            // Default to serve command
            print_banner();
            serve_command(&cli, &ServeArgs::default()).await?;
        }
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let subscriber = build_subscriber(env_filter(log_level(cli), rust_log.as_deref()));
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn log_level(cli: &Cli) -> Level {
    if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    }
}

/// `RUST_LOG` directives when set and valid, else the flag level.
fn env_filter(level: Level, rust_log: Option<&str>) -> EnvFilter {
    let from_flags = || EnvFilter::default().add_directive(LevelFilter::from_level(level).into());
    match rust_log.map(str::trim).filter(|directives| !directives.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|e| {
            eprintln!("Ignoring invalid {}: {}", EnvFilter::DEFAULT_ENV, e);
            from_flags()
        }),
        None => from_flags(),
    }
}

fn build_subscriber(filter: EnvFilter) -> impl tracing::Subscriber + Send + Sync {
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish()
}

fn print_banner() {
    println!("🌱 AGRIna - Soil Telemetry Dashboard");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!("   Live pH, temperature and NPK readings from the field");
    println!();
}

/// Configuration file (or defaults), then global flags, then serve flags.
fn build_config(
    cli: &Cli,
    args: Option<&ServeArgs>,
) -> Result<WebConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            WebConfig::load_from_file(path)?
        }
        None => WebConfig::default(),
    };

    if let Some(host) = &cli.host {
        config = config.with_host(host.clone());
    }
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }
    if let Some(secret) = &cli.session_secret {
        config = config.with_session_secret(secret.clone());
    }

    if let Some(args) = args {
        if let Some(static_dir) = &args.static_dir {
            config = config.with_static_path(Some(static_dir.clone()));
        }
        if args.no_cors {
            config = config.with_cors(false);
        }
        if let Some(max) = args.max_connections {
            config = config.with_max_websocket_connections(max);
        }
        if let Some(interval) = args.simulate_interval {
            config = config.with_simulate_interval(interval);
        }
    }

    config.validate()?;
    Ok(config)
}

async fn serve_command(cli: &Cli, args: &ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting AGRIna dashboard...");
    let config = build_config(cli, Some(args))?;

    if config.session_secret.is_none() {
        warn!("No session secret configured; sessions will not survive a restart");
    }
    let auth = Arc::new(LocalAuth::new(
        &config.resolve_session_secret(),
        config.session_ttl(),
    ));
    let store: Arc<dyn DataStore> = Arc::new(MemoryStore::new());

    let _simulator = if args.demo {
        let seed = seed_demo(store.as_ref(), auth.as_ref(), Utc::now()).await?;
        info!(
            "Demo data: {} devices, {} readings",
            seed.device_ids.len(),
            seed.readings
        );
        println!("   Demo sign-in: {} / {}", DEMO_ADMIN_EMAIL, DEMO_ADMIN_PASSWORD);
        println!();
        Some(
            ReadingSimulator::new(store.clone())
                .spawn(Duration::from_millis(config.simulate_interval_ms)),
        )
    } else {
        None
    };

    info!("Web server configuration:");
    info!("  - Bind address: {}", config.bind_address());
    info!("  - CORS enabled: {}", config.enable_cors);
    info!("  - Max WebSocket connections: {}", config.max_websocket_connections);
    info!(
        "  - Live poll / status interval: {}ms / {}ms",
        config.poll_interval_ms, config.status_interval_ms
    );
    info!("  - Offline tolerance per device: {}s", config.offline_secs_per_device);

    let state = AppState::new(store, auth, config);
    start_web_server(state).await?;

    Ok(())
}

fn config_command(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(cli, None)?;
    print!("{}", config.to_redacted_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrina::DEFAULT_WEB_PORT;

    fn enabled_levels(filter: EnvFilter) -> [bool; 3] {
        tracing::subscriber::with_default(build_subscriber(filter), || {
            [
                tracing::enabled!(Level::DEBUG),
                tracing::enabled!(Level::INFO),
                tracing::enabled!(Level::WARN),
            ]
        })
    }

    #[test]
    fn test_logging_filter() {
        let quiet = Cli::try_parse_from(["agrina"]).unwrap();
        let verbose = Cli::try_parse_from(["agrina", "--verbose"]).unwrap();
        let debug = Cli::try_parse_from(["agrina", "serve", "--debug"]).unwrap();
        assert_eq!(log_level(&quiet), Level::WARN);
        assert_eq!(log_level(&verbose), Level::INFO);
        assert_eq!(log_level(&debug), Level::DEBUG);

        assert_eq!(enabled_levels(env_filter(Level::WARN, None)), [false, false, true]);
        assert_eq!(enabled_levels(env_filter(Level::INFO, None)), [false, true, true]);
        assert_eq!(enabled_levels(env_filter(Level::DEBUG, Some(""))), [true, true, true]);

        // RUST_LOG wins over the flags unless it cannot be parsed
        assert_eq!(enabled_levels(env_filter(Level::WARN, Some("debug"))), [true, true, true]);
        assert_eq!(enabled_levels(env_filter(Level::DEBUG, Some("error"))), [false, false, false]);
        assert_eq!(
            enabled_levels(env_filter(Level::INFO, Some("agrina=loud"))),
            [false, true, true]
        );
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["agrina", "--port", "9090"]).unwrap();
        assert_eq!(cli.port, Some(9090));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_default_values() {
        let cli = Cli::try_parse_from(["agrina"]).unwrap();
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.port, DEFAULT_WEB_PORT);
        assert_eq!(config.host, "0.0.0.0");
        assert!(config.enable_cors);
    }

    #[test]
    fn test_serve_flags_override_config() {
        let cli = Cli::try_parse_from([
            "agrina",
            "serve",
            "--no-cors",
            "--max-connections",
            "5",
            "--demo",
            "--simulate-interval",
            "250",
            "--host",
            "127.0.0.1",
        ])
        .unwrap();
        let Some(Commands::Serve(args)) = &cli.command else {
            panic!("expected serve subcommand");
        };
        assert!(args.demo);

        let config = build_config(&cli, Some(args)).unwrap();
        assert!(!config.enable_cors);
        assert_eq!(config.max_websocket_connections, 5);
        assert_eq!(config.simulate_interval_ms, 250);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_config_subcommand() {
        let cli = Cli::try_parse_from(["agrina", "config", "--session-secret", "0123456789abcdef-x"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Config)));
        let config = build_config(&cli, None).unwrap();
        assert!(!config.to_redacted_toml().unwrap().contains("0123456789abcdef-x"));
    }
}
