use clap::{Args, Parser, Subcommand, ValueEnum};
use infrastructure::config::{LogFormat, LogLevel};
use infrastructure::constants::{DEFAULT_CONFIG_PATH, DEFAULT_HTTP_PORT};

#[derive(Parser, Debug)]
#[command(
    name = "conntrack-watch",
    about = "Watches conntrack for new NAT connections and answers tuple lookups",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "CONNTRACK_WATCH_CONFIG")]
    pub config: String,

    /// Log level override (takes precedence over config file)
    #[arg(short, long)]
    pub log_level: Option<LogLevel>,

    /// Log format: json (default, production) or text (development)
    #[arg(long)]
    pub log_format: Option<LogFormat>,

    /// Output format
    #[arg(short, long, default_value = "table", global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table (default)
    Table,
    /// Raw JSON from the API
    Json,
}

/// Connection parameters for reaching a running watcher.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Watcher API host
    #[arg(long, default_value = "127.0.0.1", env = "CONNTRACK_WATCH_HOST")]
    pub host: String,

    /// Watcher API port
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT, env = "CONNTRACK_WATCH_PORT")]
    pub port: u16,
}

/// Tuple to look up, as seen from the reply direction.
#[derive(Args, Debug, Clone)]
pub struct TupleArgs {
    /// tcp or udp
    #[arg(long, default_value = "tcp")]
    pub protocol: String,

    #[arg(long)]
    pub src_ip: String,

    #[arg(long)]
    pub dst_ip: String,

    #[arg(long)]
    pub src_port: u16,

    #[arg(long)]
    pub dst_port: u16,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Display version and build information
    Version,

    /// Check watcher liveness and readiness
    Health {
        #[command(flatten)]
        conn: ConnectionArgs,
    },

    /// Look up a connection in a running watcher
    Query {
        #[command(flatten)]
        tuple: TupleArgs,

        #[command(flatten)]
        conn: ConnectionArgs,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}
