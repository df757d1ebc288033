use std::io;
use std::os::unix::net::UnixListener;
use std::path::Path;

/// Binds the server's listening socket at `socket_path` (§4.6, §6).
///
/// Removes any stale socket file left behind by a crashed previous run
/// before binding — a fresh `bind()` on a path that already has a socket
/// file fails with `AddrInUse` otherwise.
pub fn bind(socket_path: &Path) -> io::Result<UnixListener> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    UnixListener::bind(socket_path)
}

/// Removes the socket file on clean shutdown (§6: "unlinked on clean
/// shutdown"). Tolerates the file already being gone.
pub fn unlink(socket_path: &Path) {
    if let Err(e) = std::fs::remove_file(socket_path) {
        if e.kind() != io::ErrorKind::NotFound {
            log::warn!("failed to remove socket file {}: {e}", socket_path.display());
        }
    }
}
