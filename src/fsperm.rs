//! Ownership and permissions of the working directories

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use nix::unistd::{chown, Gid, Group, Uid, User};

use crate::error::{Error, Result};

/// Whether the provisioner runs with root privileges
pub fn running_as_root() -> bool {
    Uid::effective().is_root()
}

/// Resolved owner applied with chown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub uid: Uid,
    pub gid: Option<Gid>,
}

impl Owner {
    /// Look up `user` and optionally `group` in the system databases
    pub fn lookup(user: &str, group: Option<&str>) -> Result<Self> {
        let found = User::from_name(user)
            .map_err(|e| Error::Config(format!("Unable to look up user '{}': {}", user, e)))?
            .ok_or_else(|| Error::Config(format!("User '{}' does not exist", user)))?;

        let gid = match group {
            Some(name) => Some(
                Group::from_name(name)
                    .map_err(|e| Error::Config(format!("Unable to look up group '{}': {}", name, e)))?
                    .ok_or_else(|| Error::Config(format!("Group '{}' does not exist", name)))?
                    .gid,
            ),
            None => None,
        };

        Ok(Self { uid: found.uid, gid })
    }

    pub fn apply(&self, path: &Path) -> Result<()> {
        chown(path, Some(self.uid), self.gid).map_err(|e| Error::Permission {
            path: path.to_path_buf(),
            reason: format!("chown failed: {}", e),
        })
    }
}

/// Permission bits for directories and regular files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modes {
    pub directory: u32,
    pub file: u32,
}

impl Default for Modes {
    fn default() -> Self {
        Self {
            directory: 0o755,
            file: 0o644,
        }
    }
}

/// Create `path` (and parents) owned by `owner`
pub fn mkdir(path: &Path, owner: Option<&Owner>) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::Permission {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if let Some(owner) = owner {
        owner.apply(path)?;
    }
    Ok(())
}

pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| Error::Permission {
        path: path.to_path_buf(),
        reason: format!("chmod {:o} failed: {}", mode, e),
    })
}

/// Recursively apply `owner` and, when given, `modes` below `root`
///
/// Symlinks are neither followed nor modified.
pub fn configure_permissions(root: &Path, owner: Option<&Owner>, modes: Option<Modes>) -> Result<()> {
    let meta = std::fs::symlink_metadata(root)?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }

    if let Some(owner) = owner {
        owner.apply(root)?;
    }

    if meta.is_dir() {
        if let Some(modes) = modes {
            set_mode(root, modes.directory)?;
        }
        for entry in std::fs::read_dir(root)? {
            configure_permissions(&entry?.path(), owner, modes)?;
        }
    } else if let Some(modes) = modes {
        set_mode(root, modes.file)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn mode_of(path: &Path) -> u32 {
        std::fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn test_recursive_modes() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("db").join("journal");
        mkdir(&nested, None).unwrap();
        let file = nested.join("WiredTigerLog.0000000001");
        std::fs::write(&file, b"x").unwrap();
        set_mode(&file, 0o600).unwrap();
        set_mode(&nested, 0o700).unwrap();

        configure_permissions(dir.path(), None, Some(Modes::default())).unwrap();

        assert_eq!(mode_of(&nested), 0o755);
        assert_eq!(mode_of(&file), 0o644);
    }

    #[test]
    fn test_owner_only_without_modes_leaves_bits() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("mongod.lock");
        std::fs::write(&file, b"").unwrap();
        set_mode(&file, 0o600).unwrap();

        configure_permissions(dir.path(), None, None).unwrap();

        assert_eq!(mode_of(&file), 0o600);
    }
}
