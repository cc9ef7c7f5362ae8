//! The `show` command.

use std::io::Write;

use tracing::debug;
use wgctrl::{Backend, Client, ClientOptions, Device, WgError};

use crate::cli::ShowArgs;
use crate::error::CliError;
use crate::output::{DeviceView, OutputFormat};

/// Show command executor.
#[derive(Debug)]
pub struct ShowCommand {
    options: ClientOptions,
}

impl ShowCommand {
    /// Create a show command querying the backends in `options`.
    #[must_use]
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }

    /// Execute the show command.
    ///
    /// # Errors
    ///
    /// Returns an error if no backend can be opened, the named device does
    /// not exist, or output fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &ShowArgs,
    ) -> Result<(), CliError> {
        let mut client = Client::with_options(&self.options)?;
        debug!(backends = ?client.backend_names(), "querying devices");

        let fetched = fetch(&mut client, args.name.as_deref());
        let closed = client.close();
        let devices = fetched?;
        closed?;

        let views: Vec<DeviceView> = devices
            .iter()
            .map(|d| DeviceView::new(d, args.show_keys))
            .collect();
        match &args.name {
            Some(_) => {
                for view in &views {
                    format.write(writer, view)?;
                }
            }
            None => format.write(writer, &views)?,
        }
        Ok(())
    }
}

fn fetch(client: &mut Client, name: Option<&str>) -> Result<Vec<Device>, CliError> {
    match name {
        None => Ok(client.devices()?),
        Some(name) => match client.device(name) {
            Ok(d) => Ok(vec![d]),
            Err(WgError::NotExist) => Err(CliError::DeviceNotFound(name.to_owned())),
            Err(e) => Err(e.into()),
        },
    }
}
