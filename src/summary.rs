//! Human-readable summary of the applied settings

use crate::config::ProvisionConfig;
use crate::replset::ReplicaSetMode;

const MASK: &str = "**********";

fn masked(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => MASK.to_string(),
        _ => String::new(),
    }
}

/// Settings worth showing to the operator, in display order
pub fn summary_properties(config: &ProvisionConfig) -> Vec<(&'static str, String)> {
    let mut properties = Vec::new();
    let mode = config.replica_set.mode;

    let shows_root = !matches!(
        mode,
        Some(ReplicaSetMode::Secondary | ReplicaSetMode::Arbiter | ReplicaSetMode::Dynamic)
    );
    if shows_root {
        properties.push(("Root Password", masked(config.auth.root_password.as_deref())));
    }

    if let (Some(user), Some(_), Some(db)) = (&config.auth.username, &config.auth.password, &config.auth.database) {
        properties.push(("Username", user.clone()));
        properties.push(("Password", masked(config.auth.password.as_deref())));
        properties.push(("Database", db.clone()));
    }

    if let Some(mode) = mode {
        properties.push(("Replication Mode", mode.to_string()));
        if mode.joins_primary() {
            let rs = &config.replica_set;
            properties.push(("Primary Host", rs.primary_host.clone().unwrap_or_default()));
            properties.push(("Primary Port", rs.primary_port.to_string()));
            properties.push(("Primary Root User", rs.primary_root_user.clone()));
            properties.push(("Primary Root Password", masked(rs.primary_root_password.as_deref())));
        }
    }

    properties
}

/// Aligned `Name: value` lines
pub fn render(properties: &[(&'static str, String)]) -> String {
    let width = properties.iter().map(|(k, _)| k.len()).max().unwrap_or(0) + 1;
    properties
        .iter()
        .map(|(key, value)| format!("  {:<width$} {}", format!("{}:", key), value, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(config: &ProvisionConfig) -> Vec<&'static str> {
        summary_properties(config).into_iter().map(|(k, _)| k).collect()
    }

    #[test]
    fn test_standalone_shows_root_password_masked() {
        let mut config = ProvisionConfig::default();
        config.auth.root_password = Some("hunter2".into());

        let props = summary_properties(&config);
        assert_eq!(props, vec![("Root Password", MASK.to_string())]);
        assert!(!render(&props).contains("hunter2"));
    }

    #[test]
    fn test_secondary_shows_primary_details() {
        let mut config = ProvisionConfig::default();
        config.replica_set.mode = Some(ReplicaSetMode::Secondary);
        config.replica_set.primary_host = Some("mongodb-primary".into());

        assert_eq!(
            keys(&config),
            vec![
                "Replication Mode",
                "Primary Host",
                "Primary Port",
                "Primary Root User",
                "Primary Root Password",
            ]
        );
    }

    #[test]
    fn test_app_user_needs_all_three() {
        let mut config = ProvisionConfig::default();
        config.auth.username = Some("app".into());
        config.auth.password = Some("pw".into());
        assert!(!keys(&config).contains(&"Username"));

        config.auth.database = Some("shop".into());
        assert!(keys(&config).contains(&"Username"));
        assert!(keys(&config).contains(&"Database"));
    }
}
