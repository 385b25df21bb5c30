//! MqGate admin tool
//!
//! Out-of-band provisioning of the gate's durable state: device records,
//! permission rules and retained messages. The broker hook path only reads
//! what this tool writes.
//!
//! Usage:
//!   mqgate [OPTIONS] <COMMAND>
//!
//! Options:
//!   -c, --config <FILE>    Configuration file path
//!   -l, --log-level        Log level (error, warn, info, debug, trace)
//!   -h, --help             Print help

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mqgate::config::Config;
use mqgate::{
    open_backend, Action, DeviceTracker, PermissionRule, RetainedStore, RuleAction,
    RuleResolver, StorageBackend,
};

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    #[default]
    Warn,
    /// Informational messages
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// Rule action as typed on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum RuleActionArg {
    Publish,
    Subscribe,
    Both,
}

impl From<RuleActionArg> for RuleAction {
    fn from(arg: RuleActionArg) -> Self {
        match arg {
            RuleActionArg::Publish => RuleAction::Publish,
            RuleActionArg::Subscribe => RuleAction::Subscribe,
            RuleActionArg::Both => RuleAction::PublishAndSubscribe,
        }
    }
}

/// Action to dry-run
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ActionArg {
    Publish,
    Subscribe,
}

impl From<ActionArg> for Action {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Publish => Action::Publish,
            ActionArg::Subscribe => Action::Subscribe,
        }
    }
}

/// MqGate - MQTT topic access control admin tool
#[derive(Parser, Debug)]
#[command(name = "mqgate")]
#[command(version)]
#[command(about = "Manage devices, permission rules and retained messages of MqGate")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage device records
    #[command(subcommand)]
    Device(DeviceCommand),
    /// Manage permission rules
    #[command(subcommand)]
    Rule(RuleCommand),
    /// Inspect retained messages
    #[command(subcommand)]
    Retained(RetainedCommand),
    /// Check whether a role may publish or subscribe to a topic
    Check {
        role: String,
        topic: String,
        #[arg(value_enum)]
        action: ActionArg,
    },
}

#[derive(Subcommand, Debug)]
enum DeviceCommand {
    /// Provision a device (or reset it to Offline)
    Add {
        connection_id: String,
        device_id: String,
    },
    /// List all devices
    List,
    /// Show one device
    Show { connection_id: String },
    /// Block a device from connecting
    Disconnect { connection_id: String },
    /// Mark a device deleted
    Delete { connection_id: String },
}

#[derive(Subcommand, Debug)]
enum RuleCommand {
    /// Add or replace a rule
    Add {
        role: String,
        filter: String,
        #[arg(value_enum)]
        action: RuleActionArg,
    },
    /// Remove a rule
    Remove { role: String, filter: String },
    /// List rules, optionally for one role
    List { role: Option<String> },
}

#[derive(Subcommand, Debug)]
enum RetainedCommand {
    /// List retained messages
    List,
    /// Clear the retained message of a topic
    Remove { topic: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load the configuration file if specified; MQGATE__* overrides apply either way
    let file_config = match Config::load_for_admin(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Setup logging - CLI overrides config, config overrides default (warn)
    let log_level = args.log_level.unwrap_or_else(|| {
        match file_config.log.level.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Warn,
        }
    });

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    let backend = open_backend(&file_config.persistence)?;
    let timeout = file_config.persistence.timeout;

    let result = match args.command {
        Command::Device(cmd) => run_device(cmd, backend.clone(), timeout).await,
        Command::Rule(cmd) => run_rule(cmd, backend.as_ref()).await,
        Command::Retained(cmd) => run_retained(cmd, backend.clone(), timeout).await,
        Command::Check {
            role,
            topic,
            action,
        } => run_check(&role, &topic, action.into(), backend.clone(), timeout).await,
    };

    backend.close().await?;
    result
}

async fn run_device(
    cmd: DeviceCommand,
    backend: Arc<dyn StorageBackend>,
    timeout: std::time::Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let tracker = DeviceTracker::new(backend, timeout);

    match cmd {
        DeviceCommand::Add {
            connection_id,
            device_id,
        } => {
            let record = tracker.provision(&connection_id, &device_id).await?;
            println!("{} ({}) {}", record.connection_id, record.device_id, record.status);
        }
        DeviceCommand::List => {
            for record in tracker.list().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    record.connection_id, record.device_id, record.status, record.last_seen_secs
                );
            }
        }
        DeviceCommand::Show { connection_id } => match tracker.get(&connection_id).await? {
            Some(record) => println!("{:#?}", record),
            None => {
                eprintln!("Device {} not found", connection_id);
                std::process::exit(1);
            }
        },
        DeviceCommand::Disconnect { connection_id } => {
            if !tracker.force_disconnect(&connection_id).await? {
                eprintln!("Device {} not found", connection_id);
                std::process::exit(1);
            }
        }
        DeviceCommand::Delete { connection_id } => {
            if !tracker.delete(&connection_id).await? {
                eprintln!("Device {} not found", connection_id);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn run_rule(
    cmd: RuleCommand,
    backend: &dyn StorageBackend,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        RuleCommand::Add {
            role,
            filter,
            action,
        } => {
            if let Err(e) = mqgate::topic::validate_topic_filter(&filter) {
                eprintln!("Invalid topic filter '{}': {}", filter, e);
                std::process::exit(1);
            }
            let rule = PermissionRule::new(role, filter, action.into());
            backend.put_rule(&rule).await?;
            info!("Stored rule {} {} {}", rule.role, rule.topic_filter, rule.action);
        }
        RuleCommand::Remove { role, filter } => {
            if !backend.delete_rule(&role, &filter).await? {
                eprintln!("No rule '{}' for role '{}'", filter, role);
                std::process::exit(1);
            }
        }
        RuleCommand::List { role } => {
            let rules = match role {
                Some(role) => backend.rules_for_role(&role).await?,
                None => backend.list_rules().await?,
            };
            for rule in rules {
                println!("{}\t{}\t{}", rule.role, rule.topic_filter, rule.action);
            }
        }
    }

    Ok(())
}

async fn run_retained(
    cmd: RetainedCommand,
    backend: Arc<dyn StorageBackend>,
    timeout: std::time::Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = RetainedStore::new(backend, timeout);

    match cmd {
        RetainedCommand::List => {
            for entry in store.list().await? {
                println!(
                    "{}\tqos={}\t{} bytes\t{}",
                    entry.topic,
                    entry.qos,
                    entry.payload.len(),
                    entry.updated_at_secs
                );
            }
        }
        RetainedCommand::Remove { topic } => store.remove(&topic).await?,
    }

    Ok(())
}

async fn run_check(
    role: &str,
    topic: &str,
    action: Action,
    backend: Arc<dyn StorageBackend>,
    timeout: std::time::Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let resolver = RuleResolver::new(backend, timeout);
    resolver.reload().await?;

    match resolver.authorize(Some(role), topic, action) {
        Ok(()) => println!("allow: {} may {} '{}'", role, action, topic),
        Err(e) => {
            println!("deny: {} may not {} '{}' ({})", role, action, topic, e);
            std::process::exit(2);
        }
    }

    Ok(())
}
