//! Locating UAPI sockets on disk.

use std::io;
use std::path::{Path, PathBuf};

use tracing::trace;

/// Directory userspace implementations create their sockets in.
pub const DEFAULT_SOCKET_DIR: &str = "/var/run/wireguard";

/// Sandbox container used by the macOS network extension.
#[cfg(target_os = "macos")]
const MACOS_EXTENSION_DATA: &str = "Library/Containers/com.wireguard.macos.network-extension/Data";

/// Socket directories searched by default on this platform.
#[must_use]
pub fn default_dirs() -> Vec<PathBuf> {
    #[allow(unused_mut)]
    let mut dirs = vec![PathBuf::from(DEFAULT_SOCKET_DIR)];

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            dirs.push(PathBuf::from(home).join(MACOS_EXTENSION_DATA));
        }
    }

    dirs
}

/// The device a socket belongs to: its file name without extension.
#[must_use]
pub fn device_name(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_owned)
}

/// Lists the UNIX sockets directly inside `dirs`, sorted per directory.
///
/// Directories that do not exist are skipped.
///
/// # Errors
///
/// Returns any other error from reading a directory.
pub fn find_sockets(dirs: &[PathBuf]) -> io::Result<Vec<PathBuf>> {
    let mut sockets = Vec::new();

    for dir in dirs {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!(dir = %dir.display(), "socket directory missing");
                continue;
            }
            Err(e) => return Err(e),
        };

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry?;
            if is_socket(&entry.file_type()?) {
                found.push(entry.path());
            }
        }
        found.sort();
        sockets.extend(found);
    }

    Ok(sockets)
}

#[cfg(unix)]
fn is_socket(ft: &std::fs::FileType) -> bool {
    use std::os::unix::fs::FileTypeExt;
    ft.is_socket()
}

#[cfg(not(unix))]
fn is_socket(_ft: &std::fs::FileType) -> bool {
    false
}
