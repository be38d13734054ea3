//! Convergence Orchestrator
//!
//! Entry point invoked by the host environment on every instance boot. The
//! fresh-vs-restart decision is taken once from what is on disk; everything
//! after that is a single pass with no checkpoints of its own. A failed run
//! is retried as a whole by whoever restarts the container.

use crate::client::{ClusterClient, ConnectionProperties, LegacyTextProtocol};
use crate::conf_file::{ConfFile, ConfigProvider};
use crate::config::ProvisionConfig;
use crate::error::{Error, Result};
use crate::fsperm::{self, Modes, Owner};
use crate::node::NodeService;
use crate::poller::PollPolicy;
use crate::replset::{self, NodeIdentity, PrimaryTarget, ReplicaSetMode, ReplicaSetSpec, RoleConfigurator};
use crate::summary;
use crate::supervisor;
use crate::volume::Volume;

const REPLICA_SET_AUTH_MESSAGE: &str = "In order to configure MongoDB replica set authentication \
    you need to provide the --replicaSetKey on every node, \
    specify --rootPassword in the primary node and --primaryRootPassword in the rest of nodes";

/// What the data directory and config file looked like at entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergenceState {
    pub data_dir_exists: bool,
    pub data_dir_empty: bool,
    pub local_config_file_exists: bool,
    pub repl_set_name_matches: bool,
}

impl ConvergenceState {
    pub fn observe(volume: &Volume, conf_file: &ConfFile, set_name: &str) -> Result<Self> {
        let db_dir = volume.persisted_data_dir().join("db");
        let local_config_file_exists = conf_file.exists();
        let repl_set_name_matches = local_config_file_exists && conf_file.has_repl_set_name(set_name)?;

        Ok(Self {
            data_dir_exists: db_dir.exists(),
            data_dir_empty: volume.is_fresh(),
            local_config_file_exists,
            repl_set_name_matches,
        })
    }

    /// No persisted database files, deploy from scratch
    pub fn is_fresh(&self) -> bool {
        !self.data_dir_exists || self.data_dir_empty
    }

    /// An operator-mounted config file is never edited
    pub fn config_provider(&self) -> ConfigProvider {
        if self.local_config_file_exists {
            ConfigProvider::External
        } else {
            ConfigProvider::Generated
        }
    }
}

/// Immutable inputs of one orchestration run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: ProvisionConfig,
    pub state: ConvergenceState,
    /// Owner applied to created files, set when running as root
    pub owner: Option<Owner>,
    pub conf_file: ConfFile,
    pub volume: Volume,
}

impl RunContext {
    /// Observe the instance, resolving the system user when running as root
    pub fn observe(config: ProvisionConfig) -> Result<Self> {
        let owner = if fsperm::running_as_root() {
            Some(Owner::lookup(&config.node.system_user, Some(&config.node.system_group))?)
        } else {
            None
        };
        Self::with_owner(config, owner)
    }

    pub fn with_owner(config: ProvisionConfig, owner: Option<Owner>) -> Result<Self> {
        let conf_file = ConfFile::new(config.paths.conf_file());
        let volume = Volume::new(config.paths.data_dir.clone(), config.paths.persist_dir.clone());
        let state = ConvergenceState::observe(&volume, &conf_file, &config.replica_set.name)?;

        Ok(Self {
            config,
            state,
            owner,
            conf_file,
            volume,
        })
    }

    pub fn replica_set_spec(&self) -> Option<ReplicaSetSpec> {
        let rs = &self.config.replica_set;
        rs.mode.map(|mode| ReplicaSetSpec {
            name: rs.name.clone(),
            mode,
            enable_majority_read_concern: rs.enable_majority_read_concern,
        })
    }

    fn provider(&self) -> ConfigProvider {
        self.state.config_provider()
    }

    fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(self.config.poll_timeout(), self.config.poll_step())
    }

    /// Password used for `root` on this run: the primary's when joining
    fn root_password(&self) -> Option<&str> {
        self.config
            .replica_set
            .primary_root_password
            .as_deref()
            .or(self.config.auth.root_password.as_deref())
    }

    /// Local node, authenticated as root when a password is known
    fn local_connection(&self) -> ConnectionProperties {
        ConnectionProperties::local(self.config.node.port).with_credentials("root", self.root_password())
    }

    fn primary_target(&self) -> Result<PrimaryTarget> {
        let rs = &self.config.replica_set;
        let host = rs.primary_host.clone().ok_or_else(|| {
            Error::Validation("secondary and arbiter nodes need a primary host".into())
        })?;
        let base = ConnectionProperties {
            host,
            port: rs.primary_port,
            database: "admin".to_string(),
            user: None,
            password: None,
        };

        Ok(PrimaryTarget {
            connection: base.clone().with_credentials("root", self.root_password()),
            root: base.with_credentials(&rs.primary_root_user, rs.primary_root_password.as_deref()),
        })
    }
}

/// Reject role/auth combinations before anything is touched
pub fn validate_inputs(config: &ProvisionConfig) -> Result<()> {
    let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());

    let auth = &config.auth;
    if set(&auth.username) {
        if !set(&auth.password) || !set(&auth.database) {
            return Err(Error::Validation(
                "If you defined an username you must define a password and a database too".into(),
            ));
        }
    } else if set(&auth.password) || set(&auth.database) {
        return Err(Error::Validation(
            "If you defined a password or a database you should define an username too".into(),
        ));
    }

    let rs = &config.replica_set;
    let Some(mode) = rs.mode else {
        return Ok(());
    };

    let root_password = set(&config.auth.root_password);
    let primary_root_password = set(&rs.primary_root_password);
    let key = set(&rs.key);

    if mode.joins_primary() && !set(&rs.primary_host) {
        return Err(Error::Validation(
            "In order to configure MongoDB as secondary or arbiter node \
             you need to provide the --primaryHost property"
                .into(),
        ));
    }

    let consistent = match mode {
        ReplicaSetMode::Secondary | ReplicaSetMode::Arbiter => primary_root_password == key && !root_password,
        ReplicaSetMode::Primary => root_password == key && !primary_root_password,
        ReplicaSetMode::Dynamic => true,
    };
    if !consistent {
        return Err(Error::Validation(REPLICA_SET_AUTH_MESSAGE.into()));
    }

    Ok(())
}

/// One-time setup after the deployment artifact is unpacked
pub fn post_unpack(config: &ProvisionConfig) -> Result<()> {
    for dir in [&config.paths.tmp_dir, &config.paths.logs_dir] {
        fsperm::mkdir(dir, None)?;
    }
    Ok(())
}

/// Drives one instance from its on-disk state to its declared role
pub struct Orchestrator<'a> {
    ctx: &'a RunContext,
    client: &'a dyn ClusterClient,
    node: &'a dyn NodeService,
}

impl<'a> Orchestrator<'a> {
    pub fn new(ctx: &'a RunContext, client: &'a dyn ClusterClient, node: &'a dyn NodeService) -> Self {
        Self { ctx, client, node }
    }

    /// Run the whole provisioning pass and return the summary shown to the operator
    pub async fn post_installation(&self) -> Result<String> {
        let ctx = self.ctx;
        let paths = &ctx.config.paths;

        for dir in [&paths.tmp_dir, &paths.logs_dir] {
            fsperm::mkdir(dir, ctx.owner.as_ref())?;
        }

        if ctx.state.is_fresh() {
            self.deploy_fresh().await?;
        } else {
            self.deploy_persisted().await?;
        }

        self.apply_permissions()?;
        self.write_supervisor_files()?;

        let summary = summary::render(&summary::summary_properties(&ctx.config));
        for line in summary.lines() {
            tracing::info!("{}", line);
        }
        Ok(summary)
    }

    async fn deploy_fresh(&self) -> Result<()> {
        let ctx = self.ctx;
        let config = &ctx.config;
        tracing::info!("==> Deploying MongoDB from scratch...");

        validate_inputs(config)?;
        fsperm::mkdir(&config.paths.db_dir(), ctx.owner.as_ref())?;
        ctx.conf_file
            .ensure_default(&config.paths, &config.defaults, config.node.port)?;
        self.node.start().await?;

        self.create_users().await?;
        if let Some(spec) = ctx.replica_set_spec() {
            if let Some(key) = &config.replica_set.key {
                self.configure_key_file(key)?;
            }
            self.configure_replica_set(&spec).await?;
        }

        self.node.stop().await?;
        ctx.volume.prepare_data_to_persist()
    }

    async fn deploy_persisted(&self) -> Result<()> {
        let ctx = self.ctx;
        let config = &ctx.config;
        tracing::info!("==> Deploying MongoDB with persisted data...");

        ctx.volume.restore_persisted_data()?;
        ctx.conf_file
            .ensure_default(&config.paths, &config.defaults, config.node.port)?;

        if let Some(spec) = ctx.replica_set_spec() {
            if spec.mode == ReplicaSetMode::Dynamic && !ctx.state.repl_set_name_matches {
                tracing::info!("==> ReplicaSetMode set to \"dynamic\" and replSetName different from config file.");
                tracing::info!("==> Dropping local database ...");
                self.node.start().await?;
                self.drop_local_database().await?;
                self.node.stop().await?;
            }

            if let Some(key) = &config.replica_set.key {
                self.configure_key_file(key)?;
            }
            self.enable_replica_set_mode(&spec)?;
        }

        self.enable_auth()
    }

    /// Create the root and application users, then switch authorization on
    pub async fn create_users(&self) -> Result<()> {
        let config = &self.ctx.config;
        let auth = &config.auth;
        let joins_primary = config.replica_set.mode.is_some_and(|m| m.joins_primary());

        if let (Some(root_password), false) = (&auth.root_password, joins_primary) {
            tracing::info!("==> Creating root user...");
            let command = LegacyTextProtocol::create_user("root", root_password, "root")?;
            self.client
                .execute(&command, &ConnectionProperties::local(config.node.port))
                .await?;
        }

        self.enable_auth()?;

        // Completeness of the application user is checked by validate_inputs
        if let (Some(username), Some(password), Some(database)) = (&auth.username, &auth.password, &auth.database) {
            tracing::info!("==> Creating {} user...", username);
            let command = LegacyTextProtocol::create_scoped_user(username, password, "readWrite", database)?;
            let connection = ConnectionProperties::local(config.node.port)
                .with_credentials("root", auth.root_password.as_deref())
                .with_database(database);
            self.client.execute(&command, &connection).await?;
        }
        Ok(())
    }

    /// Turn authorization on in a generated config file
    pub fn enable_auth(&self) -> Result<()> {
        let ctx = self.ctx;
        let auth = &ctx.config.auth;
        if auth.root_password.is_none() && auth.password.is_none() {
            return Ok(());
        }

        match ctx.provider() {
            ConfigProvider::Generated => {
                if !ctx.conf_file.authorization_disabled()? {
                    tracing::info!("==> Enabling authentication...");
                    ctx.conf_file.configure(&[
                        ("authorization", "enabled".to_string()),
                        ("enableLocalhostAuthBypass", "false".to_string()),
                    ])?;
                }
            }
            ConfigProvider::External => {
                tracing::warn!("==> You are mounting a configuration file and setting the mongodb password or root password.");
                tracing::warn!("==> Remember to enable authentication in your config file for those password to be valid.");
            }
        }
        Ok(())
    }

    /// Write the shared key and point the config file at it
    pub fn configure_key_file(&self, key: &str) -> Result<()> {
        let ctx = self.ctx;
        let key_file = ctx.config.paths.key_file();
        crate::keyfile::write_key_file(&key_file, key, ctx.owner.as_ref())?;

        if ctx.provider() == ConfigProvider::Generated {
            ctx.conf_file.configure(&[
                ("authorization", "enabled".to_string()),
                ("keyFile", key_file.display().to_string()),
            ])?;
        }
        Ok(())
    }

    /// Set the replica set name in a generated config file
    pub fn enable_replica_set_mode(&self, spec: &ReplicaSetSpec) -> Result<()> {
        tracing::info!("==> Enabling MongoDB replica set name");
        if self.ctx.provider() == ConfigProvider::Generated {
            self.ctx.conf_file.configure(&[
                ("replication", String::new()),
                ("replSetName", spec.name.clone()),
                ("enableMajorityReadConcern", spec.enable_majority_read_concern.to_string()),
            ])?;
        }
        Ok(())
    }

    /// Restart with replication enabled and converge on the declared role
    pub async fn configure_replica_set(&self, spec: &ReplicaSetSpec) -> Result<()> {
        let ctx = self.ctx;
        let config = &ctx.config;
        tracing::info!("==> Configuring MongoDB replica set");

        self.enable_replica_set_mode(spec)?;
        let identity = NodeIdentity::resolve(config.node.advertised_hostname.as_deref(), config.node.port)?;
        self.node.restart().await?;

        let configurator = RoleConfigurator::new(self.client, self.node, ctx.poll_policy());
        match spec.mode {
            ReplicaSetMode::Primary => {
                configurator
                    .configure_primary(&identity, &spec.name, &ctx.local_connection())
                    .await?;
            }
            ReplicaSetMode::Secondary => {
                configurator.configure_secondary(&identity, &ctx.primary_target()?).await?;
            }
            ReplicaSetMode::Arbiter => {
                configurator.configure_arbiter(&identity, &ctx.primary_target()?).await?;
            }
            ReplicaSetMode::Dynamic => {}
        }

        // Stopping a secondary mid-sync can leave its data unusable
        if spec.mode == ReplicaSetMode::Secondary {
            replset::wait_until_sync_complete(&config.paths.log_file(), config.sync_wait_timeout()).await;
        }
        Ok(())
    }

    /// Forget the stored membership so the node can join under a new set name
    pub async fn drop_local_database(&self) -> Result<()> {
        tracing::info!("==> Drop local database to reset replica set setup");
        self.client
            .execute(
                LegacyTextProtocol::DROP_LOCAL,
                &ConnectionProperties::local(self.ctx.config.node.port),
            )
            .await?;
        Ok(())
    }

    fn apply_permissions(&self) -> Result<()> {
        let ctx = self.ctx;
        let paths = &ctx.config.paths;

        if let Some(owner) = ctx.owner.as_ref() {
            for dir in [&paths.tmp_dir, &paths.logs_dir] {
                fsperm::configure_permissions(dir, Some(owner), None)?;
            }
        }

        let data_dir = std::fs::canonicalize(&paths.data_dir)?;
        fsperm::configure_permissions(&data_dir, ctx.owner.as_ref(), Some(Modes::default()))
    }

    fn write_supervisor_files(&self) -> Result<()> {
        let paths = &self.ctx.config.paths;
        supervisor::write_stanza(
            &paths.monit_file,
            &supervisor::monit_stanza(
                "mongodb",
                &paths.pid_file(),
                &paths.bin_dir.join("mongod"),
                &paths.conf_file(),
            ),
        )?;
        supervisor::write_stanza(&paths.logrotate_file, &supervisor::logrotate_stanza(&paths.logs_dir.join("*log")))
    }
}
