//! Replica set key file
//!
//! The shared secret members authenticate each other with. The daemon
//! refuses key files readable by anyone but the owner, so the file always
//! ends up with mode 0400.

use std::path::Path;

use crate::error::{Error, Result};
use crate::fsperm::{set_mode, Owner};

/// Mode the daemon requires on the key file
pub const KEY_FILE_MODE: u32 = 0o400;

/// Write `key` to `path`, restrict it to the owner and hand it to `owner`
pub fn write_key_file(path: &Path, key: &str, owner: Option<&Owner>) -> Result<()> {
    tracing::info!("==> Writing keyfile for replica set authentication");

    let unwritable = |e: std::io::Error| Error::Permission {
        path: path.to_path_buf(),
        reason: format!("Unable to write key: {}", e),
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(unwritable)?;
    }
    // A previous run left the file read-only
    if path.exists() {
        set_mode(path, 0o600)?;
    }
    std::fs::write(path, key).map_err(unwritable)?;

    set_mode(path, KEY_FILE_MODE)?;
    if let Some(owner) = owner {
        owner.apply(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    #[test]
    fn test_key_file_is_owner_read_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("keyfile");

        write_key_file(&path, "s3cr3tkey", None).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "s3cr3tkey");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, KEY_FILE_MODE);
    }

    #[test]
    fn test_key_file_can_be_rewritten() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keyfile");

        write_key_file(&path, "first", None).unwrap();
        write_key_file(&path, "second", None).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }
}
