//! Serial port discovery for TMCL modules.

use std::time::Duration;

use serialport::{ClearBuffer, SerialPort, SerialPortType};

use crate::error::{HwError, Result};
use crate::tmcl::TmclModule;

/// Per-read timeout of the OS port; the reply deadline is enforced above it.
const READ_SLICE: Duration = Duration::from_millis(10);

pub type SerialTmcl = TmclModule<Box<dyn SerialPort>>;

#[derive(Debug, Clone)]
pub struct PortSettings {
    /// Explicit device path; auto-detected from `description` when `None`.
    pub path: Option<String>,
    /// USB product string to match, e.g. "Trinamic Stepper Device".
    pub description: String,
    pub baud: u32,
    pub address: u8,
    pub reply_timeout: Duration,
}

/// Name of the first USB serial port whose product string contains `description`.
pub fn find_port(description: &str) -> Result<String> {
    let ports = serialport::available_ports().map_err(|e| HwError::Serial(e.to_string()))?;
    for p in &ports {
        tracing::debug!(port = %p.port_name, kind = ?p.port_type, "serial port");
    }
    ports
        .into_iter()
        .find(|p| match &p.port_type {
            SerialPortType::UsbPort(info) => info
                .product
                .as_deref()
                .is_some_and(|prod| prod.contains(description)),
            _ => false,
        })
        .map(|p| p.port_name)
        .ok_or_else(|| HwError::PortNotFound(description.to_string()))
}

/// Open the module's port and wrap it in a TMCL connection.
pub fn open(settings: &PortSettings) -> Result<SerialTmcl> {
    let path = match &settings.path {
        Some(p) => p.clone(),
        None => find_port(&settings.description)?,
    };
    tracing::info!(port = %path, baud = settings.baud, address = settings.address, "opening motor port");
    let port = serialport::new(&path, settings.baud)
        .timeout(READ_SLICE)
        .open()
        .map_err(|e| HwError::Serial(format!("{path}: {e}")))?;
    port.clear(ClearBuffer::All)
        .map_err(|e| HwError::Serial(format!("{path}: {e}")))?;
    Ok(TmclModule::new(port, settings.address, settings.reply_timeout))
}
