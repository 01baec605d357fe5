//! Serial port discovery.
//!
//! The coin controller shows up as a USB serial adapter. On macOS those are
//! named `/dev/tty.usbserial-*` or `/dev/tty.usbmodem*`, so the default
//! prefix is [`DEFAULT_PORT_PREFIX`]. Linux hosts usually want
//! `/dev/ttyUSB` or `/dev/ttyACM` instead.

use coinlink_core::error::{Error, Result};

/// Path prefix of the USB serial adapters the controller enumerates as.
pub const DEFAULT_PORT_PREFIX: &str = "/dev/tty.usb";

/// List the names of every serial port the OS reports, sorted.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports().map_err(|e| {
        tracing::error!(error = %e, "Failed to enumerate serial ports");
        Error::Transport(format!("Failed to enumerate serial ports: {}", e))
    })?;

    let mut names: Vec<String> = ports.into_iter().map(|p| p.port_name).collect();
    names.sort();
    tracing::debug!(count = names.len(), "Enumerated serial ports");
    Ok(names)
}

/// Filter `names` down to those starting with `prefix`, preserving order.
pub fn matching_ports<I, S>(names: I, prefix: &str) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter(|name| name.as_ref().starts_with(prefix))
        .map(|name| name.as_ref().to_string())
        .collect()
}

/// Return the first enumerated port whose path starts with `prefix`.
pub fn first_matching_port(prefix: &str) -> Result<Option<String>> {
    let found = matching_ports(list_ports()?, prefix).into_iter().next();
    match &found {
        Some(port) => tracing::debug!(port = %port, prefix, "Discovered serial port"),
        None => tracing::debug!(prefix, "No serial port matches prefix"),
    }
    Ok(found)
}
