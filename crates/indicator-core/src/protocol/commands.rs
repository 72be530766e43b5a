//! Protocol commands
//!
//! Commands understood by the Indicator device console.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ProtocolError, DEFAULT_TIMEOUT_MS};

/// Commands sent to the device as text lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceCommand {
    /// Query MAC, serial number and wallet (`Read_Device_Info`)
    ReadDeviceInfo,

    /// Store serial number and wallet (`Device_PIN -s <sn> -w <wallet>`)
    Provision {
        /// Device serial number
        serial_number: String,
        /// Wallet address bound to the device
        wallet: String,
    },
}

impl DeviceCommand {
    /// Build a provisioning command, rejecting values that would corrupt the line
    pub fn provision(
        serial_number: impl Into<String>,
        wallet: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        let serial_number = serial_number.into();
        let wallet = wallet.into();
        validate_argument("serial number", &serial_number)?;
        validate_argument("wallet", &wallet)?;
        Ok(DeviceCommand::Provision {
            serial_number,
            wallet,
        })
    }

    /// Console keyword for this command
    pub fn keyword(&self) -> &'static str {
        match self {
            DeviceCommand::ReadDeviceInfo => "Read_Device_Info",
            DeviceCommand::Provision { .. } => "Device_PIN",
        }
    }

    /// Full command line including the CR+LF terminator
    pub fn to_line(&self) -> String {
        match self {
            DeviceCommand::ReadDeviceInfo => format!("{}\r\n", self.keyword()),
            DeviceCommand::Provision {
                serial_number,
                wallet,
            } => format!("{} -s {} -w {}\r\n", self.keyword(), serial_number, wallet),
        }
    }

    /// Expected response timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(DEFAULT_TIMEOUT_MS)
    }
}

/// Arguments are passed as bare words, so whitespace or an empty value would
/// change how the device splits the line
fn validate_argument(name: &str, value: &str) -> Result<(), ProtocolError> {
    if value.is_empty() {
        return Err(ProtocolError::InvalidArgument(format!("{} is empty", name)));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ProtocolError::InvalidArgument(format!(
            "{} contains whitespace or control characters: {:?}",
            name, value
        )));
    }
    Ok(())
}
