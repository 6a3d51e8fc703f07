use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::os::unix::fs::{FileTypeExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::namespace::PipeNamespace;
use crate::stream::PipeStream;

/// Largest accepted server instance limit (listen backlog).
pub const MAX_INSTANCES: u32 = 254;

/// Exclusive, async listener bound to one channel name.
///
/// Holds an advisory lock for the channel while alive, so a second bind of
/// the same name fails with [`TransportError::AlreadyBound`] instead of
/// silently stealing the endpoint. The socket file is removed on drop.
pub struct PipeListener {
    listener: UnixListener,
    name: String,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
    // Released when the listener drops, after the socket file is cleaned up.
    _lock: File,
}

impl PipeListener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

    /// Bind `name` inside `namespace` with a backlog of `max_instances`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(namespace: &PipeNamespace, name: &str, max_instances: u32) -> Result<Self> {
        let path = namespace.endpoint_path(name)?;
        namespace.ensure_dir().map_err(|e| bind_error(&path, e))?;

        let lock = acquire_lock(&namespace.lock_path(name), name, &path)?;

        // The lock is ours, so whatever socket sits at the path is stale.
        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(|e| bind_error(&path, e))?;
            } else {
                return Err(bind_error(
                    &path,
                    std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                ));
            }
        }

        let std_listener =
            std::os::unix::net::UnixListener::bind(&path).map_err(|e| bind_error(&path, e))?;
        std::fs::set_permissions(
            &path,
            std::fs::Permissions::from_mode(Self::DEFAULT_SOCKET_MODE),
        )
        .map_err(|e| bind_error(&path, e))?;
        set_backlog(&std_listener, max_instances).map_err(|e| bind_error(&path, e))?;
        std_listener
            .set_nonblocking(true)
            .map_err(|e| bind_error(&path, e))?;

        let created_metadata = std::fs::symlink_metadata(&path).map_err(|e| bind_error(&path, e))?;
        let created_inode = Some((created_metadata.dev(), created_metadata.ino()));

        let listener = UnixListener::from_std(std_listener).map_err(|e| bind_error(&path, e))?;

        info!(channel = name, ?path, max_instances, "listening on pipe endpoint");

        Ok(Self {
            listener,
            name: name.to_string(),
            path,
            created_inode,
            _lock: lock,
        })
    }

    /// Wait for the next client connection.
    pub async fn accept(&self) -> Result<PipeStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        debug!(channel = %self.name, "accepted connection");
        Ok(PipeStream::from_unix(stream))
    }

    /// The channel name this listener is bound to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The socket path this listener is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PipeListener {
    fn drop(&mut self) {
        if let Some((expected_dev, expected_ino)) = self.created_inode {
            if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
                if metadata.file_type().is_socket()
                    && metadata.dev() == expected_dev
                    && metadata.ino() == expected_ino
                {
                    debug!(path = ?self.path, "cleaning up socket file");
                    let _ = std::fs::remove_file(&self.path);
                } else {
                    debug!(
                        path = ?self.path,
                        "socket path identity changed; skipping cleanup"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for PipeListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeListener")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

/// Connect once to the listener bound to `name` in `namespace`.
///
/// A missing or refusing endpoint fails immediately; see
/// [`TransportError::is_listener_absent`] for telling that apart from real faults.
pub async fn connect(namespace: &PipeNamespace, name: &str) -> Result<PipeStream> {
    let path = namespace.endpoint_path(name)?;
    let stream = UnixStream::connect(&path)
        .await
        .map_err(|e| TransportError::Connect {
            path: path.clone(),
            source: e,
        })?;
    debug!(channel = name, ?path, "connected to pipe endpoint");
    Ok(PipeStream::from_unix(stream))
}

fn acquire_lock(lock_path: &Path, name: &str, socket_path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .mode(PipeListener::DEFAULT_SOCKET_MODE)
        .open(lock_path)
        .map_err(|e| bind_error(socket_path, e))?;

    // SAFETY: `file` owns an open descriptor for the duration of the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(file);
    }

    let err = std::io::Error::last_os_error();
    if err.kind() == std::io::ErrorKind::WouldBlock {
        Err(TransportError::AlreadyBound {
            name: name.to_string(),
        })
    } else {
        Err(bind_error(socket_path, err))
    }
}

fn set_backlog(listener: &std::os::unix::net::UnixListener, backlog: u32) -> std::io::Result<()> {
    let backlog = backlog.min(libc::c_int::MAX as u32) as libc::c_int;
    // SAFETY: the descriptor is a bound, listening socket owned by `listener`;
    // listen() on a listening socket only updates its backlog.
    let rc = unsafe { libc::listen(listener.as_raw_fd(), backlog) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

fn bind_error(path: &Path, source: std::io::Error) -> TransportError {
    TransportError::Bind {
        path: path.to_path_buf(),
        source,
    }
}
