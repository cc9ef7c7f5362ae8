//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use wgctrl::{BackendKind, ClientOptions};

/// Inspect WireGuard devices and generate keys.
#[derive(Parser, Debug, Clone)]
#[command(name = "wgctrl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory searched for userspace UAPI sockets (repeatable).
    #[arg(long = "socket-dir", env = "WGCTRL_SOCKET_DIR", value_delimiter = ',', global = true)]
    pub socket_dirs: Vec<PathBuf>,

    /// Backend to try, in order (repeatable): netlink, openbsd, userspace.
    #[arg(short, long = "backend", value_delimiter = ',', global = true)]
    pub backends: Vec<BackendKind>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table, global = true)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Client options from the flags, falling back to platform defaults.
    #[must_use]
    pub fn client_options(&self) -> ClientOptions {
        let mut opts = ClientOptions::default();
        if !self.backends.is_empty() {
            opts = opts.with_backends(self.backends.iter().copied());
        }
        if !self.socket_dirs.is_empty() {
            opts = opts.with_socket_dirs(self.socket_dirs.iter().cloned());
        }
        opts
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable, in the style of wg(8).
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show one device, or every device.
    Show(ShowArgs),

    /// Generate a private key and print it in base64.
    Genkey,

    /// Generate a preshared key and print it in base64.
    Genpsk,

    /// Read a private key from stdin and print its public key.
    Pubkey,
}

/// Arguments for the show command.
#[derive(Args, Debug, Clone, Default)]
pub struct ShowArgs {
    /// Interface to show; all devices when omitted.
    pub name: Option<String>,

    /// Print private and preshared keys instead of hiding them.
    #[arg(long)]
    pub show_keys: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_show_with_name() {
        let cli = Cli::parse_from(["wgctrl", "show", "wg0"]);
        match cli.command {
            Commands::Show(args) => {
                assert_eq!(args.name.as_deref(), Some("wg0"));
                assert!(!args.show_keys);
            }
            _ => panic!("expected show command"),
        }
        assert_eq!(cli.format, Format::Table);
    }

    #[test]
    fn backends_keep_order() {
        let cli = Cli::parse_from(["wgctrl", "--backend", "userspace,netlink", "show"]);
        assert_eq!(
            cli.client_options().backends,
            vec![BackendKind::Userspace, BackendKind::Netlink]
        );
    }

    #[test]
    fn socket_dirs_override_defaults() {
        let cli = Cli::parse_from([
            "wgctrl",
            "--socket-dir",
            "/tmp/a",
            "--socket-dir",
            "/tmp/b",
            "show",
        ]);
        assert_eq!(
            cli.client_options().socket_dirs,
            vec![PathBuf::from("/tmp/a"), PathBuf::from("/tmp/b")]
        );
    }

    #[test]
    fn defaults_without_flags() {
        let cli = Cli::parse_from(["wgctrl", "genkey"]);
        assert_eq!(cli.client_options().backends, BackendKind::platform_defaults());
    }

    #[test]
    fn unknown_backend_rejected() {
        assert!(Cli::try_parse_from(["wgctrl", "--backend", "wintun", "show"]).is_err());
    }

    #[test]
    fn format_is_global() {
        let cli = Cli::parse_from(["wgctrl", "show", "--format", "json"]);
        assert_eq!(cli.format, Format::Json);
    }
}
