//! rsprovision - MongoDB Replica Set Provisioner
//!
//! Lifecycle hooks run by the container entrypoint.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rsprovision::client::ShellClient;
use rsprovision::config::ProvisionConfig;
use rsprovision::error::Result;
use rsprovision::node::MongodProcess;
use rsprovision::orchestrator::{self, Orchestrator, RunContext};
use rsprovision::replset::ReplicaSetMode;
use rsprovision::summary;

/// rsprovision - MongoDB Replica Set Provisioner
#[derive(Parser)]
#[command(name = "rsprovision")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "rsprovision.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare directories after the package is unpacked
    PostUnpack,

    /// Converge this instance on its declared replica set role
    PostInstallation {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "rsprovision.toml")]
        output: PathBuf,

        /// Replica set mode to pre-fill
        #[arg(long)]
        replica_set_mode: Option<ReplicaSetMode>,
    },

    /// Validate configuration file
    Validate {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Show provisioning information
    Info,
}

/// Command line values taking precedence over the configuration file
#[derive(Args, Default)]
struct Overrides {
    /// Replica set mode (primary, secondary, arbiter, dynamic)
    #[arg(long)]
    replica_set_mode: Option<ReplicaSetMode>,

    /// Replica set name
    #[arg(long)]
    replica_set_name: Option<String>,

    /// Primary node host, for secondary and arbiter nodes
    #[arg(long)]
    primary_host: Option<String>,

    /// Primary node port
    #[arg(long)]
    primary_port: Option<u16>,

    /// Root password of the primary node
    #[arg(long, env = "MONGODB_PRIMARY_ROOT_PASSWORD", hide_env_values = true)]
    primary_root_password: Option<String>,

    /// Shared replica set key
    #[arg(long, env = "MONGODB_REPLICA_SET_KEY", hide_env_values = true)]
    replica_set_key: Option<String>,

    /// Root password of this node
    #[arg(long, env = "MONGODB_ROOT_PASSWORD", hide_env_values = true)]
    root_password: Option<String>,

    /// Hostname other members reach this node on
    #[arg(long)]
    advertised_hostname: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut ProvisionConfig) {
        let rs = &mut config.replica_set;
        if let Some(mode) = self.replica_set_mode {
            rs.mode = Some(mode);
        }
        if let Some(name) = self.replica_set_name {
            rs.name = name;
        }
        if let Some(port) = self.primary_port {
            rs.primary_port = port;
        }
        rs.primary_host = self.primary_host.or(rs.primary_host.take());
        rs.primary_root_password = self.primary_root_password.or(rs.primary_root_password.take());
        rs.key = self.replica_set_key.or(rs.key.take());
        config.auth.root_password = self.root_password.or(config.auth.root_password.take());
        config.node.advertised_hostname = self.advertised_hostname.or(config.node.advertised_hostname.take());
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        if !tracing::dispatcher::has_been_set() {
            init_logging("info", "pretty");
        }
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output, replica_set_mode } => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), "pretty");
            run_init(output, replica_set_mode)
        }
        Commands::PostUnpack => {
            let config = load_config(&cli.config, Overrides::default())?;
            init_logging_from(&config, cli.log_level.as_deref());
            run_post_unpack(config)
        }
        Commands::PostInstallation { overrides } => {
            let config = load_config(&cli.config, overrides)?;
            init_logging_from(&config, cli.log_level.as_deref());
            run_post_installation(config).await
        }
        Commands::Validate { overrides } => run_validate(&cli.config, overrides),
        Commands::Info => run_info(&cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn init_logging_from(config: &ProvisionConfig, level: Option<&str>) {
    init_logging(level.unwrap_or(&config.logging.level), &config.logging.format);
}

/// Load the configuration file, falling back to defaults when it is absent
fn load_config(path: &Path, overrides: Overrides) -> Result<ProvisionConfig> {
    let mut config = if path.exists() {
        ProvisionConfig::from_file(path)?
    } else {
        ProvisionConfig::default()
    };

    overrides.apply(&mut config);
    config.normalize();
    config.validate()?;
    Ok(config)
}

fn run_post_unpack(config: ProvisionConfig) -> Result<()> {
    tracing::info!("==> Preparing directories...");
    orchestrator::post_unpack(&config)
}

async fn run_post_installation(config: ProvisionConfig) -> Result<()> {
    let client = ShellClient::new(&config.paths.bin_dir);
    let node = MongodProcess::new(&config.paths.bin_dir, config.paths.conf_file(), config.node.port);
    let ctx = RunContext::observe(config)?;

    tracing::debug!("Convergence state: {:?}", ctx.state);
    Orchestrator::new(&ctx, &client, &node).post_installation().await?;
    tracing::info!("==> MongoDB provisioning complete");
    Ok(())
}

/// Initialize a new configuration file
fn run_init(output: PathBuf, replica_set_mode: Option<ReplicaSetMode>) -> Result<()> {
    let mode_line = match replica_set_mode {
        Some(mode) => format!("mode = \"{}\"", mode),
        None => "# mode = \"primary\"".to_string(),
    };

    let config_content = format!(r#"# rsprovision Configuration
# Generated configuration file

[node]
port = 27017
# advertised_hostname = "mongodb-0.mongodb"
system_user = "mongo"
system_group = "mongo"

[paths]
bin_dir = "/opt/mongodb/bin"
conf_dir = "/opt/mongodb/conf"
data_dir = "/opt/mongodb/data"
persist_dir = "/persist/mongodb"
logs_dir = "/opt/mongodb/logs"
tmp_dir = "/opt/mongodb/tmp"

[auth]
# root_password = "changeme"
# username = "app"
# password = "changeme"
# database = "app"

[replica_set]
{mode_line}
name = "replicaset"
# key = "shared-replica-set-key"
# primary_host = "mongodb-primary"
primary_port = 27017
primary_root_user = "root"
enable_majority_read_concern = true
sync_wait_timeout_secs = 10

[defaults]
enable_ipv6 = false
enable_directory_per_db = false
disable_system_log = false

[poll]
timeout_secs = 90
step_secs = 5

[logging]
level = "info"
format = "pretty"
"#);

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to configure the node role and credentials.");
    println!("Then run: rsprovision --config {} post-installation", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: &Path, overrides: Overrides) -> Result<()> {
    let checked = load_config(config_path, overrides)
        .and_then(|config| orchestrator::validate_inputs(&config).map(|_| config));

    match checked {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Port: {}", config.node.port);
            println!("  Replica Set: {}", config.replica_set.name);
            println!(
                "  Mode: {}",
                config.replica_set.mode.map(|m| m.to_string()).unwrap_or_else(|| "(standalone)".into())
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show provisioning information
fn run_info(config_path: &Path) -> Result<()> {
    let config = load_config(config_path, Overrides::default())?;
    let paths = &config.paths;

    println!("rsprovision Node Information");
    println!("============================");
    println!();
    println!("Port:             {}", config.node.port);
    println!(
        "Advertised As:    {}",
        config.node.advertised_hostname.as_deref().unwrap_or("(machine IP)")
    );
    println!("System User:      {}:{}", config.node.system_user, config.node.system_group);
    println!();
    println!("Paths:");
    println!("  Config File:    {}", paths.conf_file().display());
    println!("  Data:           {}", paths.data_dir.display());
    println!("  Persisted Data: {}", paths.persisted_db_dir().display());
    println!("  Log File:       {}", paths.log_file().display());
    println!("  Key File:       {}", paths.key_file().display());
    println!();
    println!("Polling:");
    println!("  Timeout:        {} s", config.poll.timeout_secs);
    println!("  Step:           {} s", config.poll.step_secs);
    println!();
    println!("Settings:");
    println!("{}", summary::render(&summary::summary_properties(&config)));

    Ok(())
}
