//! Textual command protocol
//!
//! Renders the administrative shell commands and reads success out of their
//! rendered output. Kept in one place so a structured driver can replace it
//! without touching the role state machines.

use serde_json::json;

use crate::error::Result;

/// Command strings and success predicates of the administrative shell
pub struct LegacyTextProtocol;

impl LegacyTextProtocol {
    /// Ok indicator as printed by the legacy shell
    pub const OK_MARKER: &'static str = "\"ok\" : 1";
    /// Ok indicator as printed by the newer shell
    pub const OK_MARKER_COMPACT: &'static str = "ok: 1";

    pub const IS_MASTER: &'static str = "db.isMaster().ismaster";
    pub const STATUS_MEMBERS: &'static str = "rs.status().members";
    pub const PING: &'static str = "db.runCommand({ ping: 1 })";
    pub const DROP_LOCAL: &'static str = "db.getSiblingDB('local').dropDatabase()";

    /// Command output reports success
    pub fn is_ok(stdout: &str) -> bool {
        stdout.contains(Self::OK_MARKER) || stdout.contains(Self::OK_MARKER_COMPACT)
    }

    /// Command output is exactly the boolean `true`
    pub fn is_true(stdout: &str) -> bool {
        stdout.trim() == "true"
    }

    /// Membership listing mentions `member` (`host:port`)
    pub fn lists_member(stdout: &str, member: &str) -> bool {
        stdout.contains(member)
    }

    /// Single member set definition with this node preferred as primary
    pub fn initiate(set_name: &str, member: &str, priority: u32) -> Result<String> {
        let cfg = json!({
            "_id": set_name,
            "members": [{ "_id": 0, "host": member, "priority": priority }],
        });
        Ok(format!("rs.initiate({})", serde_json::to_string(&cfg)?))
    }

    pub fn add(member: &str) -> String {
        format!("rs.add('{}')", member)
    }

    pub fn add_arbiter(member: &str) -> String {
        format!("rs.addArb('{}')", member)
    }

    /// `db.createUser` with a plain role name (`root`)
    pub fn create_user(user: &str, password: &str, role: &str) -> Result<String> {
        let spec = json!({ "user": user, "pwd": password, "roles": [role] });
        Ok(format!("db.createUser({})", serde_json::to_string(&spec)?))
    }

    /// `db.createUser` with a role scoped to `database`
    pub fn create_scoped_user(user: &str, password: &str, role: &str, database: &str) -> Result<String> {
        let spec = json!({
            "user": user,
            "pwd": password,
            "roles": [{ "role": role, "db": database }],
        });
        Ok(format!("db.createUser({})", serde_json::to_string(&spec)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_marker() {
        assert!(LegacyTextProtocol::is_ok("{ \"ok\" : 1, \"operationTime\" : 1 }"));
        assert!(LegacyTextProtocol::is_ok("{ ok: 1 }"));
        assert!(!LegacyTextProtocol::is_ok(
            "{ \"ok\" : 0, \"errmsg\" : \"already initialized\" }"
        ));
    }

    #[test]
    fn test_is_true_requires_equality() {
        assert!(LegacyTextProtocol::is_true("true\n"));
        assert!(!LegacyTextProtocol::is_true("false"));
        assert!(!LegacyTextProtocol::is_true("true false"));
    }

    #[test]
    fn test_initiate_names_member_with_priority() {
        let cmd = LegacyTextProtocol::initiate("rs0", "10.0.0.5:27017", 5).unwrap();
        assert!(cmd.starts_with("rs.initiate("));
        assert!(cmd.contains("\"_id\":\"rs0\""));
        assert!(cmd.contains("\"host\":\"10.0.0.5:27017\""));
        assert!(cmd.contains("\"priority\":5"));
    }

    #[test]
    fn test_join_commands() {
        assert_eq!(LegacyTextProtocol::add("db-1:27017"), "rs.add('db-1:27017')");
        assert_eq!(LegacyTextProtocol::add_arbiter("db-2:27017"), "rs.addArb('db-2:27017')");
    }

    #[test]
    fn test_scoped_user() {
        let cmd = LegacyTextProtocol::create_scoped_user("app", "pw", "readWrite", "shop").unwrap();
        assert!(cmd.contains("\"role\":\"readWrite\""));
        assert!(cmd.contains("\"db\":\"shop\""));
    }
}
