//! Process supervision and log rotation stanzas

use std::path::Path;

use crate::error::Result;

/// monit check for the daemon pid file
pub fn monit_stanza(service: &str, pid_file: &Path, daemon: &Path, conf_file: &Path) -> String {
    format!(
        "check process {service}\n  \
         with pidfile \"{pid}\"\n  \
         start program = \"{daemon} --config {conf} --fork\" with timeout 90 seconds\n  \
         stop program = \"{daemon} --config {conf} --shutdown\" with timeout 90 seconds\n",
        service = service,
        pid = pid_file.display(),
        daemon = daemon.display(),
        conf = conf_file.display(),
    )
}

/// logrotate rule for every file matching `log_glob`
pub fn logrotate_stanza(log_glob: &Path) -> String {
    format!(
        "{} {{\n  weekly\n  rotate 150\n  dateext\n  compress\n  copytruncate\n  missingok\n}}\n",
        log_glob.display()
    )
}

/// Write `content` to `path`, creating parent directories
pub fn write_stanza(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    tracing::debug!("Wrote {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monit_stanza() {
        let stanza = monit_stanza(
            "mongodb",
            Path::new("/opt/mongodb/tmp/mongodb.pid"),
            Path::new("/opt/mongodb/bin/mongod"),
            Path::new("/opt/mongodb/conf/mongodb.conf"),
        );
        assert!(stanza.starts_with("check process mongodb\n"));
        assert!(stanza.contains("with pidfile \"/opt/mongodb/tmp/mongodb.pid\""));
        assert!(stanza.contains(
            "start program = \"/opt/mongodb/bin/mongod --config /opt/mongodb/conf/mongodb.conf --fork\""
        ));
    }

    #[test]
    fn test_logrotate_stanza() {
        let stanza = logrotate_stanza(Path::new("/opt/mongodb/logs/*log"));
        assert!(stanza.starts_with("/opt/mongodb/logs/*log {\n"));
        assert!(stanza.contains("copytruncate"));
    }
}
