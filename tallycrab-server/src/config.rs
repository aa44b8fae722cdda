//! Server configuration and CLI argument parsing
//!
//! This module handles all server configuration through a flexible system that supports:
//! - Command-line arguments
//! - Environment variables (with TALLYCRAB_ prefix)
//!
//! # Configuration Priority
//!
//! The configuration system follows this precedence order:
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Default values (lowest priority)
//!
//! # Example Usage
//!
//! ```bash
//! # Using CLI arguments
//! tallycrab --http-port 9090 --store postgres --database-url postgres://localhost/tallycrab
//!
//! # Using environment variables
//! export TALLYCRAB_HTTP_PORT=8080
//! export TALLYCRAB_STORE=memory
//! tallycrab
//!
//! # Mixed (CLI overrides env)
//! export TALLYCRAB_HTTP_PORT=8080
//! tallycrab --http-port 9090  # Uses port 9090
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Parser;

/// Main configuration structure for the server
///
/// This structure is built from CLI arguments and environment variables,
/// and contains all settings needed to run the server.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listener configuration
    pub http: HttpConfig,
    /// Counter store configuration
    pub store: StoreConfig,
    /// Admission gate and per-address limits
    pub limits: LimitsConfig,
    /// Credential cache configuration
    pub cache: CacheConfig,
    /// Interval between maintenance sweeps of the gate and cache
    pub sweep_interval: Duration,
    /// Directory of static files to serve alongside the API
    pub web_dir: Option<PathBuf>,
    /// Self-reporting target, if enabled
    pub report: Option<ReportConfig>,
    /// Logging level (error, warn, info, debug, trace)
    pub log_level: String,
}

/// HTTP listener configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

/// Counter store configuration
///
/// The memory store keeps everything in process and loses it on restart.
/// The postgres store persists applications and counters and requires
/// a `database_url`.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Which store backs applications and counters
    pub kind: StoreKind,
    /// Postgres connection string, required for the postgres store
    pub database_url: Option<String>,
}

/// Admission gate and per-address limits
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// Maximum number of applications one address may create
    pub max_apps_per_ip: i64,
    /// Minimum spacing between requests sharing a gate key
    pub admission_interval: Duration,
    /// Initial capacity of the admission gate
    pub gate_capacity: usize,
}

/// Credential cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a cached credential stays valid
    pub ttl: Duration,
    /// Initial capacity of the credential cache
    pub capacity: usize,
}

/// Self-reporting configuration
///
/// When set, the server reports its own usage (applications created,
/// actions recorded, queries answered) to another tallycrab instance,
/// which can be itself.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Base URL of the receiving instance (e.g., "http://localhost:8080")
    pub url: String,
    /// Application id to report under
    pub app_id: String,
    /// Token for that application
    pub token: String,
}

/// Available store backends
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoreKind {
    /// In-process hash maps, lost on restart
    Memory,
    /// Postgres tables, survives restarts
    Postgres,
}

impl std::str::FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "postgres" => Ok(StoreKind::Postgres),
            _ => Err(anyhow!(
                "Invalid store kind: {}. Valid options are: memory, postgres",
                s
            )),
        }
    }
}

/// Command-line arguments for the server
///
/// All arguments can also be set via environment variables with the
/// TALLYCRAB_ prefix. CLI arguments take precedence over environment variables.
///
/// # Examples
///
/// In-memory store on the default port:
/// ```bash
/// tallycrab
/// ```
///
/// Postgres store with a higher app cap:
/// ```bash
/// tallycrab --store postgres --database-url postgres://localhost/tallycrab --max-apps-per-ip 10
/// ```
///
/// Serve a static dashboard next to the API:
/// ```bash
/// tallycrab --web-dir ./public
/// ```
#[derive(Parser, Debug)]
#[command(
    name = "tallycrab",
    about = "Multi-tenant action counting server",
    long_about = "A multi-tenant action counting server with per-address rate limiting and token auth.\n\nEnvironment variables with TALLYCRAB_ prefix are supported. CLI arguments take precedence over environment variables."
)]
pub struct Args {
    // HTTP listener
    #[arg(
        long,
        value_name = "HOST",
        help = "HTTP host",
        default_value = "127.0.0.1",
        env = "TALLYCRAB_HTTP_HOST"
    )]
    pub http_host: String,
    #[arg(
        long,
        value_name = "PORT",
        help = "HTTP port",
        default_value_t = 8080,
        env = "TALLYCRAB_HTTP_PORT"
    )]
    pub http_port: u16,

    // Store configuration
    #[arg(
        long,
        value_name = "KIND",
        help = "Store kind: memory, postgres",
        default_value = "memory",
        env = "TALLYCRAB_STORE"
    )]
    pub store: StoreKind,
    #[arg(
        long,
        value_name = "URL",
        help = "Postgres connection string (required for --store postgres)",
        env = "TALLYCRAB_DATABASE_URL"
    )]
    pub database_url: Option<String>,

    // Limits
    #[arg(
        long,
        value_name = "N",
        help = "Maximum applications per address",
        default_value_t = 5,
        env = "TALLYCRAB_MAX_APPS_PER_IP"
    )]
    pub max_apps_per_ip: i64,
    #[arg(
        long,
        value_name = "MILLIS",
        help = "Admission gate interval per key (milliseconds)",
        default_value_t = 1000,
        env = "TALLYCRAB_ADMISSION_INTERVAL_MS"
    )]
    pub admission_interval_ms: u64,
    #[arg(
        long,
        value_name = "SIZE",
        help = "Initial admission gate capacity",
        default_value_t = 100_000,
        env = "TALLYCRAB_GATE_CAPACITY"
    )]
    pub gate_capacity: usize,

    // Credential cache
    #[arg(
        long,
        value_name = "SECS",
        help = "Credential cache TTL (seconds)",
        default_value_t = 86_400,
        env = "TALLYCRAB_CREDENTIAL_TTL"
    )]
    pub credential_ttl: u64,
    #[arg(
        long,
        value_name = "SIZE",
        help = "Initial credential cache capacity",
        default_value_t = 100_000,
        env = "TALLYCRAB_CREDENTIAL_CAPACITY"
    )]
    pub credential_capacity: usize,

    // Maintenance
    #[arg(
        long,
        value_name = "SECS",
        help = "Interval between gate and cache sweeps (seconds)",
        default_value_t = 300,
        env = "TALLYCRAB_SWEEP_INTERVAL"
    )]
    pub sweep_interval: u64,

    // Static file hosting
    #[arg(
        long,
        value_name = "DIR",
        help = "Serve static files from this directory",
        env = "TALLYCRAB_WEB_DIR"
    )]
    pub web_dir: Option<PathBuf>,

    // Self-reporting
    #[arg(
        long,
        value_name = "URL",
        help = "Report own usage to this tallycrab instance",
        env = "TALLYCRAB_REPORT_URL"
    )]
    pub report_url: Option<String>,
    #[arg(
        long,
        value_name = "ID",
        help = "Application id for self-reporting",
        env = "TALLYCRAB_REPORT_APP_ID"
    )]
    pub report_app_id: Option<String>,
    #[arg(
        long,
        value_name = "TOKEN",
        help = "Token for self-reporting",
        env = "TALLYCRAB_REPORT_TOKEN"
    )]
    pub report_token: Option<String>,

    // General options
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "TALLYCRAB_LOG_LEVEL"
    )]
    pub log_level: String,

    // Utility options
    #[arg(
        long,
        help = "List all environment variables and exit",
        action = clap::ArgAction::SetTrue
    )]
    pub list_env_vars: bool,
}

impl Config {
    /// Build configuration from environment variables and CLI arguments
    ///
    /// This method:
    /// 1. Parses CLI arguments (with env var fallback via clap)
    /// 2. Handles special flags like --list-env-vars
    /// 3. Builds the configuration structure
    /// 4. Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The postgres store is selected without a database URL
    /// - Self-reporting settings are only partially supplied
    pub fn from_env_and_args() -> Result<Self> {
        // Clap automatically handles environment variables with the precedence:
        // 1. CLI arguments (highest priority)
        // 2. Environment variables
        // 3. Default values (lowest priority)
        let args = Args::parse();

        // Handle --list-env-vars
        if args.list_env_vars {
            Self::print_env_vars();
            std::process::exit(0);
        }

        // Self-reporting needs all three settings or none of them
        let report = match (args.report_url, args.report_app_id, args.report_token) {
            (Some(url), Some(app_id), Some(token)) => Some(ReportConfig { url, app_id, token }),
            (None, None, None) => None,
            _ => {
                return Err(anyhow!(
                    "Self-reporting requires all of --report-url, --report-app-id and --report-token"
                ));
            }
        };

        // Build config from parsed args (which already include env vars)
        let config = Config {
            http: HttpConfig {
                host: args.http_host,
                port: args.http_port,
            },
            store: StoreConfig {
                kind: args.store,
                database_url: args.database_url,
            },
            limits: LimitsConfig {
                max_apps_per_ip: args.max_apps_per_ip,
                admission_interval: Duration::from_millis(args.admission_interval_ms),
                gate_capacity: args.gate_capacity,
            },
            cache: CacheConfig {
                ttl: Duration::from_secs(args.credential_ttl),
                capacity: args.credential_capacity,
            },
            sweep_interval: Duration::from_secs(args.sweep_interval),
            web_dir: args.web_dir,
            report,
            log_level: args.log_level,
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    fn validate(&self) -> Result<()> {
        if self.store.kind == StoreKind::Postgres && self.store.database_url.is_none() {
            return Err(anyhow!(
                "The postgres store requires a database URL.\n\n\
                Example:\n  \
                tallycrab --store postgres --database-url postgres://localhost/tallycrab\n\n\
                For more information, try '--help'"
            ));
        }

        // The sweep task drives a tokio interval, which rejects a zero period
        if self.sweep_interval < Duration::from_secs(1) {
            return Err(anyhow!("Sweep interval must be at least 1 second"));
        }

        if self.limits.max_apps_per_ip < 1 {
            return Err(anyhow!("Maximum applications per address must be at least 1"));
        }

        Ok(())
    }

    /// Print all available environment variables and their descriptions
    ///
    /// This is called when the --list-env-vars flag is used.
    /// It provides a comprehensive reference for all environment variables
    /// that can be used to configure the server.
    fn print_env_vars() {
        println!("Tallycrab Environment Variables");
        println!("===============================");
        println!();
        println!("All environment variables use the TALLYCRAB_ prefix.");
        println!("CLI arguments take precedence over environment variables.");
        println!();

        println!("HTTP Configuration:");
        println!("  TALLYCRAB_HTTP_HOST=<host>            HTTP host [default: 127.0.0.1]");
        println!("  TALLYCRAB_HTTP_PORT=<port>            HTTP port [default: 8080]");
        println!();

        println!("Store Configuration:");
        println!("  TALLYCRAB_STORE=<kind>                Store kind: memory, postgres [default: memory]");
        println!("  TALLYCRAB_DATABASE_URL=<url>          Postgres connection string");
        println!();

        println!("Limits:");
        println!("  TALLYCRAB_MAX_APPS_PER_IP=<n>         Maximum applications per address [default: 5]");
        println!(
            "  TALLYCRAB_ADMISSION_INTERVAL_MS=<ms>  Admission gate interval per key [default: 1000]"
        );
        println!("  TALLYCRAB_GATE_CAPACITY=<size>        Initial gate capacity [default: 100000]");
        println!();

        println!("Credential Cache:");
        println!("  TALLYCRAB_CREDENTIAL_TTL=<secs>       Credential cache TTL [default: 86400]");
        println!(
            "  TALLYCRAB_CREDENTIAL_CAPACITY=<size>  Initial cache capacity [default: 100000]"
        );
        println!();

        println!("Maintenance:");
        println!("  TALLYCRAB_SWEEP_INTERVAL=<secs>       Gate and cache sweep interval [default: 300]");
        println!();

        println!("Static Files:");
        println!("  TALLYCRAB_WEB_DIR=<dir>               Serve static files from this directory");
        println!();

        println!("Self-Reporting:");
        println!("  TALLYCRAB_REPORT_URL=<url>            Report own usage to this instance");
        println!("  TALLYCRAB_REPORT_APP_ID=<id>          Application id for self-reporting");
        println!("  TALLYCRAB_REPORT_TOKEN=<token>        Token for self-reporting");
        println!();

        println!("General Configuration:");
        println!(
            "  TALLYCRAB_LOG_LEVEL=<level>           Log level: error, warn, info, debug, trace [default: info]"
        );
        println!();

        println!("Examples:");
        println!("  # Persist counters in Postgres");
        println!("  export TALLYCRAB_STORE=postgres");
        println!("  export TALLYCRAB_DATABASE_URL=postgres://localhost/tallycrab");
        println!();
        println!("  # Raise the per-address application cap");
        println!("  export TALLYCRAB_MAX_APPS_PER_IP=10");
        println!();
        println!("  # Run server (CLI args override env vars)");
        println!("  tallycrab --http-port 9090  # Will use port 9090");
    }
}
