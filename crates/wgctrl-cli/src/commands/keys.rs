//! Key generation commands.

use std::io::{BufRead, Write};

use wgctrl::Key;

use crate::error::CliError;

/// Which key a [`KeyCommand`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// A fresh clamped private key.
    Private,
    /// A fresh random preshared key.
    Preshared,
    /// The public key of a private key read from input.
    Public,
}

/// Prints one base64 key per invocation.
#[derive(Debug, Clone, Copy)]
pub struct KeyCommand {
    kind: KeyKind,
}

impl KeyCommand {
    /// Create a key command.
    #[must_use]
    pub const fn new(kind: KeyKind) -> Self {
        Self { kind }
    }

    /// Execute the command. Only [`KeyKind::Public`] reads `input`.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a base64 key or output fails.
    pub fn execute<R: BufRead, W: Write>(&self, input: R, writer: &mut W) -> Result<(), CliError> {
        let key = match self.kind {
            KeyKind::Private => Key::generate_private(),
            KeyKind::Preshared => Key::generate(),
            KeyKind::Public => read_key(input)?.public_key(),
        };
        writeln!(writer, "{key}")?;
        Ok(())
    }
}

fn read_key<R: BufRead>(mut input: R) -> Result<Key, CliError> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Key::from_base64(line.trim())
        .map_err(|e| CliError::InvalidInput(format!("private key on stdin: {e}")))
}
