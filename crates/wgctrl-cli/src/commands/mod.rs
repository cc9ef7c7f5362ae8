//! Command implementations.

mod keys;
mod show;

pub use keys::{KeyCommand, KeyKind};
pub use show::ShowCommand;
