//! # wgctrl-cli
//!
//! The `wgctrl` command: shows WireGuard devices through whichever backend
//! owns them and generates keys.
//!
//! ```text
//! wgctrl show [NAME]     devices, as a table or JSON
//! wgctrl genkey          new private key
//! wgctrl genpsk          new preshared key
//! wgctrl pubkey          public key for the private key on stdin
//! ```

#![forbid(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format, ShowArgs};
pub use error::CliError;
pub use output::OutputFormat;
