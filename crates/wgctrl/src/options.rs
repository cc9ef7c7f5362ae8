//! Client configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use wgctrl_types::WgError;

/// A transport a [`Client`](crate::Client) can chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Linux kernel module over generic netlink.
    Netlink,
    /// OpenBSD `wg(4)` over ioctls.
    OpenBsd,
    /// Userspace implementations over UAPI sockets.
    Userspace,
}

impl BackendKind {
    /// All kinds, in the order they are usually tried.
    pub const ALL: [Self; 3] = [Self::Netlink, Self::OpenBsd, Self::Userspace];

    /// Lowercase name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Netlink => "netlink",
            Self::OpenBsd => "openbsd",
            Self::Userspace => "userspace",
        }
    }

    /// The backends tried by default on this OS.
    #[must_use]
    pub fn platform_defaults() -> Vec<Self> {
        if cfg!(target_os = "linux") {
            vec![Self::Netlink, Self::Userspace]
        } else if cfg!(target_os = "openbsd") {
            vec![Self::OpenBsd, Self::Userspace]
        } else {
            vec![Self::Userspace]
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = WgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| WgError::InvalidArgument(format!("unknown backend: {s}")))
    }
}

/// Options for [`Client::with_options`](crate::Client::with_options).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Backends to chain, in the order they are tried.
    pub backends: Vec<BackendKind>,
    /// Directories searched for UAPI sockets.
    pub socket_dirs: Vec<PathBuf>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            backends: BackendKind::platform_defaults(),
            socket_dirs: wgctrl_uapi::default_dirs(),
        }
    }
}

impl ClientOptions {
    /// Replaces the backend list.
    #[must_use]
    pub fn with_backends(mut self, backends: impl IntoIterator<Item = BackendKind>) -> Self {
        self.backends = backends.into_iter().collect();
        self
    }

    /// Replaces the UAPI socket directories.
    #[must_use]
    pub fn with_socket_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.socket_dirs = dirs.into_iter().collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("netlink", BackendKind::Netlink)]
    #[test_case("OpenBSD", BackendKind::OpenBsd)]
    #[test_case("userspace", BackendKind::Userspace)]
    fn parses_backend_names(s: &str, want: BackendKind) {
        assert_eq!(s.parse::<BackendKind>().expect("parse"), want);
    }

    #[test]
    fn unknown_backend_rejected() {
        let err = "wintun".parse::<BackendKind>().expect_err("unknown");
        assert!(matches!(err, WgError::InvalidArgument(_)));
    }

    #[test]
    fn display_round_trips() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.to_string().parse::<BackendKind>().expect("parse"), kind);
        }
    }

    #[test]
    fn userspace_is_always_a_default() {
        assert_eq!(
            BackendKind::platform_defaults().last(),
            Some(&BackendKind::Userspace)
        );
    }

    #[test]
    fn options_from_partial_json() {
        let opts: ClientOptions =
            serde_json::from_str(r#"{"socket_dirs": ["/tmp/wg"]}"#).expect("json");
        assert_eq!(opts.socket_dirs, vec![PathBuf::from("/tmp/wg")]);
        assert_eq!(opts.backends, BackendKind::platform_defaults());

        let opts: ClientOptions =
            serde_json::from_str(r#"{"backends": ["openbsd", "userspace"]}"#).expect("json");
        assert_eq!(opts.backends, vec![BackendKind::OpenBsd, BackendKind::Userspace]);
    }
}
