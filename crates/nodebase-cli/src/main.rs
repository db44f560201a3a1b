//! nodebase: app process supervisor and instance tunnel CLI.
//!
//! Supervises named app processes driven by control lines on stdin, and
//! hosts, joins or lists instances on a tunnel relay.

mod commands;
mod config;

use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// nodebase: app supervisor and instance tunnel
#[derive(Parser)]
#[command(name = "nodebase", version = "0.1.0", about = "Supervise app processes and host or join relay instances")]
struct Cli {
    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Relay WebSocket URL (overrides config)
    #[arg(long, global = true)]
    relay: Option<String>,

    /// Token the relay requires (overrides config)
    #[arg(long = "server-token", global = true)]
    server_token: Option<String>,

    /// Grace period before a stopped process is killed, in milliseconds
    #[arg(long = "grace-ms", global = true)]
    grace_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the supervisor, reading control lines from stdin
    Supervise {
        /// Control token (overrides config)
        #[arg(long)]
        token: Option<String>,

        /// Discard the output of supervised processes
        #[arg(short, long)]
        quiet: bool,
    },

    /// Print the tokens of a command line, one per line
    Argv {
        /// Command line to tokenize
        command: String,
    },

    /// Generate a random control token
    Token,

    /// List instances for a service on the relay
    Instances {
        /// Service name
        service: String,
    },

    /// Host an instance; stdin lines are broadcast to members
    Host {
        /// Service name
        service: String,

        /// Instance name
        #[arg(short, long, default_value = nodebase_tunnel::host::DEFAULT_INSTANCE_NAME)]
        name: String,

        /// UUID of a previous instance to reclaim
        #[arg(long)]
        reclaim: Option<String>,

        /// Token members must present to join
        #[arg(long)]
        token: Option<String>,
    },

    /// Join an instance by UUID; stdin lines are sent to the host
    Join {
        /// Service name
        service: String,

        /// Instance UUID
        uuid: String,

        /// User id (generated when omitted)
        #[arg(short, long)]
        user: Option<String>,

        /// Instance join token
        #[arg(long)]
        token: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "nodebase=debug,nodebase_cli=debug,nodebase_supervisor=debug,nodebase_tunnel=debug,nodebase_core=debug"
    } else {
        "nodebase=info,nodebase_supervisor=warn,nodebase_tunnel=warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    // Load config file.
    let config_path = cli.config.clone().unwrap_or_else(config::Config::default_path);
    let cfg = match config::Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("nodebase: {e:#}");
            std::process::exit(1);
        }
    };

    // CLI overrides config.
    let relay = cli.relay.clone().unwrap_or_else(|| cfg.relay.url.clone());
    let server_token = cli.server_token.clone().or_else(|| cfg.relay.server_token.clone());
    let grace = cli
        .grace_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| cfg.supervisor.grace_period());

    let result = match cli.command {
        Command::Supervise { token, quiet } => {
            let token = token.or_else(|| cfg.control.token.clone());
            commands::supervise::run(&cfg.apps, grace, token, quiet).await
        }
        Command::Argv { command } => commands::argv::run(&command),
        Command::Token => commands::token::run(),
        Command::Instances { service } => {
            commands::instances::run(&relay, &service, server_token.as_deref()).await
        }
        Command::Host {
            service,
            name,
            reclaim,
            token,
        } => {
            commands::host::run(&relay, server_token.as_deref(), &service, &name, reclaim, token)
                .await
        }
        Command::Join {
            service,
            uuid,
            user,
            token,
        } => {
            commands::join::run(&relay, server_token.as_deref(), &service, &uuid, user, token).await
        }
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("nodebase: {e:#}");
        std::process::exit(1);
    }
}
