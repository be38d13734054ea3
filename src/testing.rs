//! Test doubles for the cluster control channel and the node lifecycle

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{ClusterClient, CommandOutput, ConnectionProperties};
use crate::error::{Error, Result};
use crate::node::NodeService;

/// Canned reply to a command
#[derive(Debug, Clone)]
pub enum Reply {
    /// Command delivered, this is its stdout
    Out(String),
    /// Command could not be delivered
    Unreachable,
}

impl Reply {
    pub fn out(stdout: &str) -> Self {
        Reply::Out(stdout.to_string())
    }

    pub fn ok() -> Self {
        Reply::out("{ \"ok\" : 1 }")
    }

    pub fn not_ok() -> Self {
        Reply::out("{ \"ok\" : 0, \"errmsg\" : \"not ready\" }")
    }
}

/// Cluster client answering from a script keyed by command prefix
///
/// Each prefix owns a queue of replies; the last reply repeats once the
/// queue is drained. Commands without a script are unreachable.
#[derive(Default)]
pub struct ScriptedClient {
    script: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(String, String)>>,
    users: Mutex<Vec<Option<String>>>,
    refuse_connection: bool,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, prefix: &str, replies: Vec<Reply>) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(prefix.to_string(), replies.into_iter().collect());
        self
    }

    pub fn refusing_connections(mut self) -> Self {
        self.refuse_connection = true;
        self
    }

    /// Every executed command with the address it was sent to
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// User each command authenticated as, in execution order
    pub fn users(&self) -> Vec<Option<String>> {
        self.users.lock().unwrap().clone()
    }

    /// Number of executed commands starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(command, _)| command.starts_with(prefix))
            .count()
    }

    fn next_reply(&self, command: &str) -> Option<Reply> {
        let mut script = self.script.lock().unwrap();
        let (_, queue) = script
            .iter_mut()
            .filter(|(prefix, _)| command.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl ClusterClient for ScriptedClient {
    async fn execute(&self, command: &str, connection: &ConnectionProperties) -> Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((command.to_string(), connection.address()));
        self.users.lock().unwrap().push(connection.user.clone());

        match self.next_reply(command) {
            Some(Reply::Out(stdout)) => Ok(CommandOutput::stdout(stdout)),
            Some(Reply::Unreachable) | None => Err(Error::execution(command, "connection refused")),
        }
    }

    async fn check_connection(&self, connection: &ConnectionProperties) -> Result<()> {
        if self.refuse_connection {
            return Err(Error::Connectivity {
                host: connection.host.clone(),
                port: connection.port,
                reason: "Authentication failed".into(),
            });
        }
        Ok(())
    }
}

/// Node lifecycle that only records what was asked of it
#[derive(Default)]
pub struct RecordingNode {
    events: Mutex<Vec<&'static str>>,
}

impl RecordingNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl NodeService for RecordingNode {
    async fn start(&self) -> Result<()> {
        self.events.lock().unwrap().push("start");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.events.lock().unwrap().push("stop");
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        self.events.lock().unwrap().push("restart");
        Ok(())
    }

    async fn wait_until_ready(&self) -> Result<()> {
        self.events.lock().unwrap().push("ready");
        Ok(())
    }
}
