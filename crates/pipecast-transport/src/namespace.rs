use std::fs::DirBuilder;
use std::os::unix::fs::{DirBuilderExt, FileTypeExt};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, TransportError};

/// Environment variable overriding the pipe namespace directory.
pub const NAMESPACE_DIR_ENV: &str = "PIPECAST_PIPE_DIR";

const SOCKET_EXT: &str = "sock";
const LOCK_EXT: &str = "lock";
const DIR_MODE: u32 = 0o700;

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// The directory holding every named endpoint of this host's pipecast channels.
///
/// Channel `N` lives at `<dir>/N.sock`, guarded by an advisory lock on
/// `<dir>/N.lock`. Listing the directory is how the host enumerates bound
/// endpoints, the same way `\\.\pipe\` is enumerated for Windows pipes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeNamespace {
    dir: PathBuf,
}

impl PipeNamespace {
    /// Use an explicit namespace directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Resolve the namespace directory from the environment.
    ///
    /// Order: `$PIPECAST_PIPE_DIR`, `$XDG_RUNTIME_DIR/pipecast`, then
    /// `<tmp>/pipecast-<uid>`.
    pub fn from_env() -> Self {
        if let Some(dir) = non_empty_var(NAMESPACE_DIR_ENV) {
            return Self::new(dir);
        }
        if let Some(runtime_dir) = non_empty_var("XDG_RUNTIME_DIR") {
            return Self::new(PathBuf::from(runtime_dir).join("pipecast"));
        }

        // SAFETY: getuid has no preconditions and always succeeds.
        let uid = unsafe { libc::getuid() };
        Self::new(std::env::temp_dir().join(format!("pipecast-{uid}")))
    }

    /// The namespace directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Socket path for a channel name, after validating the name.
    pub fn endpoint_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;

        let path = self.dir.join(format!("{name}.{SOCKET_EXT}"));
        let len = path.as_os_str().len();
        if len >= MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len,
                max: MAX_PATH_LEN,
            });
        }
        Ok(path)
    }

    pub(crate) fn lock_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{LOCK_EXT}"))
    }

    pub(crate) fn ensure_dir(&self) -> std::io::Result<()> {
        DirBuilder::new()
            .recursive(true)
            .mode(DIR_MODE)
            .create(&self.dir)
    }

    /// Names of all socket endpoints currently present, sorted.
    ///
    /// A namespace directory that does not exist yet is simply empty.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(TransportError::Io(err)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_socket() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SOCKET_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Whether any bound endpoint name contains `name` (case-sensitive).
    ///
    /// Point-in-time and advisory: the listener may go away right after.
    pub fn contains(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        match self.list() {
            Ok(names) => names.iter().any(|bound| bound.contains(name)),
            Err(err) => {
                debug!(dir = ?self.dir, %err, "namespace listing failed");
                false
            }
        }
    }
}

impl Default for PipeNamespace {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Check that a channel name can be used as an endpoint file name.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "must not be empty"
    } else if name.trim().is_empty() {
        "must not be blank"
    } else if name.contains('/') {
        "must not contain '/'"
    } else if name.contains('\0') {
        "must not contain NUL"
    } else {
        return Ok(());
    };

    Err(TransportError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

fn non_empty_var(key: &str) -> Option<std::ffi::OsString> {
    std::env::var_os(key).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    fn temp_namespace(tag: &str) -> PipeNamespace {
        PipeNamespace::new(std::env::temp_dir().join(format!(
            "pcns-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        )))
    }

    #[test]
    fn rejects_unusable_names() {
        for name in ["", "   ", "a/b", "nul\0byte"] {
            assert!(
                matches!(validate_name(name), Err(TransportError::InvalidName { .. })),
                "{name:?} should be rejected"
            );
        }
        assert!(validate_name("app-1920.control").is_ok());
    }

    #[test]
    fn endpoint_path_appends_socket_extension() {
        let ns = PipeNamespace::new("/tmp/pipecast-test");
        let path = ns.endpoint_path("alpha").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/pipecast-test/alpha.sock"));
        assert_eq!(
            ns.lock_path("alpha"),
            PathBuf::from("/tmp/pipecast-test/alpha.lock")
        );
    }

    #[test]
    fn endpoint_path_too_long() {
        let ns = PipeNamespace::new("/tmp");
        let result = ns.endpoint_path(&"a".repeat(200));
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn missing_directory_lists_empty() {
        let ns = temp_namespace("missing");
        assert!(ns.list().unwrap().is_empty());
        assert!(!ns.contains("anything"));
    }

    #[test]
    fn list_only_reports_sockets() {
        let ns = temp_namespace("list");
        ns.ensure_dir().unwrap();

        let _a = std::os::unix::net::UnixListener::bind(ns.dir().join("beta.sock")).unwrap();
        let _b = std::os::unix::net::UnixListener::bind(ns.dir().join("alpha.sock")).unwrap();
        std::fs::write(ns.dir().join("gamma.sock"), b"not a socket").unwrap();
        std::fs::write(ns.dir().join("alpha.lock"), b"").unwrap();

        assert_eq!(ns.list().unwrap(), vec!["alpha", "beta"]);
        assert!(ns.contains("alph"));
        assert!(!ns.contains("Alpha"));
        assert!(!ns.contains("gamma"));
        assert!(!ns.contains(""));

        let _ = std::fs::remove_dir_all(ns.dir());
    }

    #[test]
    fn ensure_dir_is_private() {
        let ns = temp_namespace("mode");
        ns.ensure_dir().unwrap();
        let mode = std::fs::metadata(ns.dir()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, DIR_MODE);
        let _ = std::fs::remove_dir_all(ns.dir());
    }
}
