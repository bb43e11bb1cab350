use std::path::{Path, PathBuf};

pub const DAEMON_SOCKET: &str = "tally.sock";

pub fn tally_root(home: &Path) -> PathBuf {
    home.join(".tally")
}

/// Default parent of every namespace directory.
pub fn namespaces_root(home: &Path) -> PathBuf {
    tally_root(home).join("namespaces")
}

pub fn socket_path(home: &Path) -> PathBuf {
    tally_root(home).join(DAEMON_SOCKET)
}
