//! Role Configurator
//!
//! Drives a started node into its declared replica set role. Every wait goes
//! through the bounded poller; undeliverable commands count as pending.

use std::path::Path;
use std::time::Duration;

use super::{NodeIdentity, ReplicaSetMode};
use crate::client::{ClusterClient, ConnectionProperties, LegacyTextProtocol};
use crate::error::{Error, Result};
use crate::node::NodeService;
use crate::poller::{retry_while, Outcome, PollPolicy};

/// Priority given to the initiating member so it is preferred as primary
pub const PRIMARY_PRIORITY: u32 = 5;

/// Marker the daemon logs once a new member finished copying data
const SYNC_DONE_MARKER: &str = "initial sync done";

/// Reply of `rs.initiate` on a set that already exists
const ALREADY_INITIALIZED: &str = "already initialized";

/// Progress of the primary path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryState {
    Unconfigured,
    WaitLocalServiceUp,
    Initiating,
    Initiated,
}

/// Progress of the secondary and arbiter paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    Unconfigured,
    WaitPrimaryReady,
    Joining,
    WaitMembershipConfirmed,
    Joined,
}

fn advance<S: std::fmt::Debug + Copy>(from: S, to: S) -> S {
    tracing::debug!("Replica set state {:?} -> {:?}", from, to);
    to
}

/// Connections used to reach the primary while joining
#[derive(Debug, Clone)]
pub struct PrimaryTarget {
    /// Connection membership commands are sent over
    pub connection: ConnectionProperties,
    /// Primary root credentials checked once before polling
    pub root: ConnectionProperties,
}

/// Per-role convergence procedures
pub struct RoleConfigurator<'a> {
    client: &'a dyn ClusterClient,
    node: &'a dyn NodeService,
    policy: PollPolicy,
}

impl<'a> RoleConfigurator<'a> {
    pub fn new(client: &'a dyn ClusterClient, node: &'a dyn NodeService, policy: PollPolicy) -> Self {
        Self { client, node, policy }
    }

    /// Initiate a single-member set on the local node
    ///
    /// Re-running against an initiated set succeeds immediately.
    pub async fn configure_primary(
        &self,
        identity: &NodeIdentity,
        set_name: &str,
        local: &ConnectionProperties,
    ) -> Result<PrimaryState> {
        tracing::info!("==> Configuring MongoDB primary node");
        let mut state = PrimaryState::Unconfigured;

        state = advance(state, PrimaryState::WaitLocalServiceUp);
        self.node.wait_until_ready().await?;

        state = advance(state, PrimaryState::Initiating);
        let command = LegacyTextProtocol::initiate(set_name, &identity.member(), PRIMARY_PRIORITY)?;
        let initiated = retry_while(&self.policy, || initiate_probe(self.client, &command, local)).await?;
        if !initiated {
            return Err(Error::RetryExhausted {
                operation: format!("replica set '{}' to be initiated on {}", set_name, identity),
            });
        }

        Ok(advance(state, PrimaryState::Initiated))
    }

    /// Join the set as a data-bearing member
    pub async fn configure_secondary(&self, identity: &NodeIdentity, primary: &PrimaryTarget) -> Result<JoinState> {
        tracing::info!("==> Configuring MongoDB secondary node");
        self.join(identity, ReplicaSetMode::Secondary, primary).await
    }

    /// Join the set as a voting-only member
    pub async fn configure_arbiter(&self, identity: &NodeIdentity, primary: &PrimaryTarget) -> Result<JoinState> {
        tracing::info!("==> Configuring MongoDB arbiter node");
        self.join(identity, ReplicaSetMode::Arbiter, primary).await
    }

    async fn join(&self, identity: &NodeIdentity, mode: ReplicaSetMode, primary: &PrimaryTarget) -> Result<JoinState> {
        let member = identity.member();
        let command = match mode {
            ReplicaSetMode::Arbiter => LegacyTextProtocol::add_arbiter(&member),
            _ => LegacyTextProtocol::add(&member),
        };
        let mut state = JoinState::Unconfigured;

        state = advance(state, JoinState::WaitPrimaryReady);
        self.wait_for_primary(primary).await?;

        state = advance(state, JoinState::Joining);
        let conn = &primary.connection;
        let added = retry_while(&self.policy, || add_probe(self.client, &command, &member, conn)).await?;
        if !added {
            return Err(Error::RetryExhausted {
                operation: format!("{} to be added as {} through {}", member, mode, conn.host),
            });
        }

        state = advance(state, JoinState::WaitMembershipConfirmed);
        self.wait_confirmation(identity, primary).await?;

        Ok(advance(state, JoinState::Joined))
    }

    /// Wait until the configured primary reports itself as master
    ///
    /// Wrong root credentials fail immediately instead of polling.
    pub async fn wait_for_primary(&self, primary: &PrimaryTarget) -> Result<()> {
        tracing::debug!("Waiting for primary node...");
        self.client.check_connection(&primary.root).await?;

        let conn = &primary.connection;
        let up = retry_while(&self.policy, || primary_probe(self.client, conn)).await?;
        if !up {
            return Err(Error::PrimaryUnreachable { host: conn.host.clone() });
        }
        Ok(())
    }

    /// Wait until the primary lists this node among the set members
    pub async fn wait_confirmation(&self, identity: &NodeIdentity, primary: &PrimaryTarget) -> Result<()> {
        let member = identity.member();
        tracing::trace!("Waiting until {} is added to the replica set", member);

        let conn = &primary.connection;
        let confirmed = retry_while(&self.policy, || member_probe(self.client, &member, conn)).await?;
        if !confirmed {
            return Err(Error::MembershipNotConfirmed { node: member });
        }
        Ok(())
    }
}

async fn initiate_probe(client: &dyn ClusterClient, command: &str, local: &ConnectionProperties) -> Outcome {
    Outcome::from_probe(client.execute(command, local).await.map(|out| {
        LegacyTextProtocol::is_ok(&out.stdout) || out.stdout.contains(ALREADY_INITIALIZED)
    }))
}

async fn primary_probe(client: &dyn ClusterClient, primary: &ConnectionProperties) -> Outcome {
    tracing::debug!("==> Validating {} as primary node...", primary.host);
    Outcome::from_probe(
        client
            .execute(LegacyTextProtocol::IS_MASTER, primary)
            .await
            .map(|out| LegacyTextProtocol::is_true(&out.stdout)),
    )
}

async fn member_probe(client: &dyn ClusterClient, member: &str, primary: &ConnectionProperties) -> Outcome {
    Outcome::from_probe(
        client
            .execute(LegacyTextProtocol::STATUS_MEMBERS, primary)
            .await
            .map(|out| LegacyTextProtocol::lists_member(&out.stdout, member)),
    )
}

/// A rejected add counts as done when the node is already a member
async fn add_probe(
    client: &dyn ClusterClient,
    command: &str,
    member: &str,
    primary: &ConnectionProperties,
) -> Outcome {
    match client.execute(command, primary).await {
        Ok(out) if LegacyTextProtocol::is_ok(&out.stdout) => Outcome::Satisfied,
        Ok(_) => member_probe(client, member, primary).await,
        Err(e) => Outcome::from_probe(Err(e)),
    }
}

/// Wait for the daemon log to report the end of the initial sync
///
/// Best effort: returns whether the marker was seen, never fails.
pub async fn wait_until_sync_complete(log_file: &Path, limit: Duration) -> bool {
    tracing::info!("==> Waiting until initial data sync is complete");

    let done = retry_while(&PollPolicy::per_second(limit), move || async move {
        match tokio::fs::read_to_string(log_file).await {
            Ok(contents) if contents.contains(SYNC_DONE_MARKER) => Outcome::Satisfied,
            Ok(_) => Outcome::Pending,
            Err(e) => {
                tracing::trace!("Unable to read {:?}: {}", log_file, e);
                Outcome::Pending
            }
        }
    })
    .await
    .unwrap_or(false);

    if !done {
        tracing::info!("==> Initial data sync did not finish after {} seconds!", limit.as_secs());
    }
    done
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingNode, Reply, ScriptedClient};

    fn primary_target() -> PrimaryTarget {
        let connection = ConnectionProperties {
            host: "mongodb-primary".into(),
            port: 27017,
            database: "admin".into(),
            user: Some("root".into()),
            password: Some("pw".into()),
        };
        PrimaryTarget {
            root: connection.clone(),
            connection,
        }
    }

    fn secondary() -> NodeIdentity {
        NodeIdentity::new("mongodb-secondary-0", 27017)
    }

    const MEMBERS_WITH_SECONDARY: &str =
        "[ { \"_id\" : 0, \"name\" : \"mongodb-primary:27017\" }, { \"_id\" : 1, \"name\" : \"mongodb-secondary-0:27017\" } ]";
    const MEMBERS_PRIMARY_ONLY: &str = "[ { \"_id\" : 0, \"name\" : \"mongodb-primary:27017\" } ]";

    #[tokio::test(start_paused = true)]
    async fn test_primary_initiates_after_retries() {
        let client = ScriptedClient::new().on(
            "rs.initiate(",
            vec![Reply::Unreachable, Reply::not_ok(), Reply::ok()],
        );
        let node = RecordingNode::new();
        let configurator = RoleConfigurator::new(&client, &node, PollPolicy::convergence());

        let state = configurator
            .configure_primary(
                &NodeIdentity::new("10.0.0.5", 27017),
                "rs0",
                &ConnectionProperties::local(27017),
            )
            .await
            .unwrap();

        assert_eq!(state, PrimaryState::Initiated);
        assert_eq!(node.events(), vec!["ready"]);
        assert_eq!(client.count("rs.initiate("), 3);
        assert!(client.calls().iter().all(|(_, addr)| addr == "127.0.0.1:27017"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_initiation_is_idempotent() {
        let client = ScriptedClient::new().on(
            "rs.initiate(",
            vec![
                Reply::ok(),
                Reply::out("{ \"ok\" : 0, \"errmsg\" : \"already initialized\", \"code\" : 23 }"),
            ],
        );
        let node = RecordingNode::new();
        let configurator = RoleConfigurator::new(&client, &node, PollPolicy::convergence());
        let identity = NodeIdentity::new("10.0.0.5", 27017);
        let local = ConnectionProperties::local(27017);

        configurator.configure_primary(&identity, "rs0", &local).await.unwrap();
        configurator.configure_primary(&identity, "rs0", &local).await.unwrap();

        assert_eq!(client.count("rs.initiate("), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_initiation_exhaustion_is_an_error() {
        let client = ScriptedClient::new().on("rs.initiate(", vec![Reply::not_ok()]);
        let node = RecordingNode::new();
        let configurator = RoleConfigurator::new(&client, &node, PollPolicy::convergence());

        let err = configurator
            .configure_primary(
                &NodeIdentity::new("10.0.0.5", 27017),
                "rs0",
                &ConnectionProperties::local(27017),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RetryExhausted { .. }));
        assert_eq!(client.count("rs.initiate("), 18);
    }

    #[tokio::test(start_paused = true)]
    async fn test_secondary_join_sequence() {
        let client = ScriptedClient::new()
            .on("db.isMaster()", vec![Reply::Unreachable, Reply::out("false"), Reply::out("true")])
            .on("rs.add(", vec![Reply::not_ok(), Reply::ok()])
            .on(
                "rs.status()",
                vec![Reply::out(MEMBERS_PRIMARY_ONLY), Reply::out(MEMBERS_WITH_SECONDARY)],
            );
        let node = RecordingNode::new();
        let configurator = RoleConfigurator::new(&client, &node, PollPolicy::convergence());

        let state = configurator
            .configure_secondary(&secondary(), &primary_target())
            .await
            .unwrap();

        assert_eq!(state, JoinState::Joined);
        assert_eq!(client.count("db.isMaster()"), 3);
        assert_eq!(client.count("rs.add('mongodb-secondary-0:27017')"), 2);
        assert!(client.calls().iter().all(|(_, addr)| addr == "mongodb-primary:27017"));
        assert!(node.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoin_of_existing_member_succeeds() {
        let client = ScriptedClient::new()
            .on("db.isMaster()", vec![Reply::out("true")])
            .on(
                "rs.add(",
                vec![Reply::out("{ \"ok\" : 0, \"errmsg\" : \"Found two member configurations with same host field\" }")],
            )
            .on("rs.status()", vec![Reply::out(MEMBERS_WITH_SECONDARY)]);
        let node = RecordingNode::new();
        let configurator = RoleConfigurator::new(&client, &node, PollPolicy::convergence());

        let state = configurator
            .configure_secondary(&secondary(), &primary_target())
            .await
            .unwrap();

        assert_eq!(state, JoinState::Joined);
        assert_eq!(client.count("rs.add("), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arbiter_uses_add_arb() {
        let client = ScriptedClient::new()
            .on("db.isMaster()", vec![Reply::out("true")])
            .on("rs.addArb(", vec![Reply::ok()])
            .on(
                "rs.status()",
                vec![Reply::out("[ { \"name\" : \"mongodb-arbiter:27017\" } ]")],
            );
        let node = RecordingNode::new();
        let configurator = RoleConfigurator::new(&client, &node, PollPolicy::convergence());

        configurator
            .configure_arbiter(&NodeIdentity::new("mongodb-arbiter", 27017), &primary_target())
            .await
            .unwrap();

        assert_eq!(client.count("rs.addArb('mongodb-arbiter:27017')"), 1);
        assert_eq!(client.count("rs.add('"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_primary() {
        let client = ScriptedClient::new().on("db.isMaster()", vec![Reply::Unreachable]);
        let node = RecordingNode::new();
        let configurator = RoleConfigurator::new(&client, &node, PollPolicy::convergence());

        let err = configurator
            .configure_secondary(&secondary(), &primary_target())
            .await
            .unwrap_err();

        match err {
            Error::PrimaryUnreachable { host } => assert_eq!(host, "mongodb-primary"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.count("db.isMaster()"), 18);
        assert_eq!(client.count("rs.add("), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_primary_credentials_fail_fast() {
        let client = ScriptedClient::new()
            .on("db.isMaster()", vec![Reply::out("true")])
            .refusing_connections();
        let node = RecordingNode::new();
        let configurator = RoleConfigurator::new(&client, &node, PollPolicy::convergence());

        let err = configurator
            .configure_secondary(&secondary(), &primary_target())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Connectivity { .. }));
        assert!(client.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_membership_never_confirmed() {
        let client = ScriptedClient::new()
            .on("db.isMaster()", vec![Reply::out("true")])
            .on("rs.add(", vec![Reply::ok()])
            .on("rs.status()", vec![Reply::out(MEMBERS_PRIMARY_ONLY)]);
        let node = RecordingNode::new();
        let configurator = RoleConfigurator::new(&client, &node, PollPolicy::convergence());

        let err = configurator
            .configure_secondary(&secondary(), &primary_target())
            .await
            .unwrap_err();

        match err {
            Error::MembershipNotConfirmed { node } => assert_eq!(node, "mongodb-secondary-0:27017"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.count("rs.status()"), 18);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_wait_sees_marker() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("mongodb.log");
        std::fs::write(&log, "REPL [replication-0] initial sync done; took 3s.\n").unwrap();

        assert!(wait_until_sync_complete(&log, Duration::from_secs(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_wait_gives_up_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("missing.log");

        assert!(!wait_until_sync_complete(&log, Duration::from_secs(3)).await);
    }
}
