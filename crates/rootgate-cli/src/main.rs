use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use rootgate_core::{Decision, RequestId};

mod commands;

use commands::daemon::DaemonAction;
use commands::log::LogAction;
use commands::pending::PendingAction;
use commands::policy::PolicyAction;
use commands::Session;

#[derive(Parser, Debug)]
#[command(
    name = "rootgate",
    version,
    about = "Decide, remember and audit superuser requests"
)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Init {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        force: bool,
    },
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
    /// Stored per-app decisions
    Policy {
        #[command(subcommand)]
        action: PolicyCommand,
    },
    /// Audit log of past decisions
    Log {
        #[command(subcommand)]
        action: LogCommand,
    },
    /// Requests waiting for confirmation
    Pending {
        #[command(subcommand)]
        action: PendingCommand,
    },
    Daemon {
        #[command(subcommand)]
        action: DaemonCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Print,
}

#[derive(Subcommand, Debug)]
enum PolicyCommand {
    List {
        /// User profile whose apps to list.
        #[arg(long, default_value_t = 0)]
        user: i32,
    },
    Revoke {
        uid: i32,
    },
    Logging {
        uid: i32,
        state: Toggle,
    },
    Notify {
        uid: i32,
        state: Toggle,
    },
    /// Remove expired policies
    Cleanup,
}

#[derive(Subcommand, Debug)]
enum LogCommand {
    Show {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Drop entries older than the configured retention
    Prune,
    Clear,
}

#[derive(Subcommand, Debug)]
enum PendingCommand {
    List,
    Respond {
        id: RequestId,
        decision: Decision,
        /// Remember for this many minutes; 0 remembers forever, negative
        /// answers this request only.
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        minutes: i64,
    },
}

#[derive(Subcommand, Debug)]
enum DaemonCommand {
    Start {
        #[arg(long)]
        socket: Option<PathBuf>,
        #[arg(long)]
        pid: Option<PathBuf>,
    },
    Stop {
        #[arg(long)]
        pid: Option<PathBuf>,
    },
    Ping {
        #[arg(long)]
        socket: Option<PathBuf>,
    },
    Status {
        #[arg(long)]
        socket: Option<PathBuf>,
    },
    Reload {
        #[arg(long)]
        socket: Option<PathBuf>,
    },
    SocketPath,
    PidPath,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn enabled(self) -> bool {
        matches!(self, Toggle::On)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path, force } => commands::config::init(path, force),
        Commands::Config {
            action: ConfigCommand::Print,
        } => commands::config::print_effective(cli.config),
        Commands::Policy { action } => {
            let session = Session::load(cli.config)?;
            let action = match action {
                PolicyCommand::List { user } => PolicyAction::List { user },
                PolicyCommand::Revoke { uid } => PolicyAction::Revoke { uid },
                PolicyCommand::Logging { uid, state } => PolicyAction::Logging {
                    uid,
                    enabled: state.enabled(),
                },
                PolicyCommand::Notify { uid, state } => PolicyAction::Notify {
                    uid,
                    enabled: state.enabled(),
                },
                PolicyCommand::Cleanup => PolicyAction::Cleanup,
            };
            commands::policy::execute(&session, action)
        }
        Commands::Log { action } => {
            let session = Session::load(cli.config)?;
            let action = match action {
                LogCommand::Show { limit, json } => LogAction::Show { limit, json },
                LogCommand::Prune => LogAction::Prune,
                LogCommand::Clear => LogAction::Clear,
            };
            commands::log::execute(&session, action)
        }
        Commands::Pending { action } => {
            let session = Session::load(cli.config)?;
            let action = match action {
                PendingCommand::List => PendingAction::List,
                PendingCommand::Respond {
                    id,
                    decision,
                    minutes,
                } => PendingAction::Respond {
                    id,
                    decision,
                    minutes,
                },
            };
            commands::pending::execute(&session, action)
        }
        Commands::Daemon { action } => {
            let session = Session::load(cli.config.clone())?;
            let action = match action {
                DaemonCommand::Start { socket, pid } => DaemonAction::Start {
                    socket,
                    pid,
                    config: cli.config,
                },
                DaemonCommand::Stop { pid } => DaemonAction::Stop { pid },
                DaemonCommand::Ping { socket } => DaemonAction::Ping { socket },
                DaemonCommand::Status { socket } => DaemonAction::Status { socket },
                DaemonCommand::Reload { socket } => DaemonAction::Reload { socket },
                DaemonCommand::SocketPath => DaemonAction::SocketPath,
                DaemonCommand::PidPath => DaemonAction::PidPath,
            };
            commands::daemon::execute(&session, action)
        }
    }
}
