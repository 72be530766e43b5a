//! Device information flows
//!
//! Reading the identity of an Indicator device and writing its provisioning
//! data. Both are single commands on a [`SerialSession`]; this module formats
//! the command and interprets the payload.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::protocol::classifier::trim_one_space;
use crate::protocol::{Connector, DeviceCommand, ProtocolError, ResponseOutcome, SerialSession};

/// Identity reported by `Read_Device_Info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Network MAC address
    #[serde(rename = "MAC")]
    pub mac: String,
    /// Device serial number
    #[serde(rename = "SN")]
    pub serial_number: String,
    /// Wallet address bound to the device
    #[serde(rename = "Wallet")]
    pub wallet: String,
}

impl DeviceInfo {
    /// Parse a `mac, sn, wallet` payload.
    ///
    /// The last two commas separate the fields, so a MAC written with commas
    /// still parses. One leading whitespace character is dropped per field.
    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        let mut fields = payload.rsplitn(3, ',');
        let (Some(wallet), Some(serial_number), Some(mac)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(ProtocolError::InvalidResponse(format!(
                "expected 'mac, sn, wallet', got '{}'",
                payload
            )));
        };

        Ok(Self {
            mac: trim_one_space(mac).to_string(),
            serial_number: trim_one_space(serial_number).to_string(),
            wallet: trim_one_space(wallet).to_string(),
        })
    }
}

/// Provisioning data written with `Device_PIN`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provisioning {
    /// Serial number to store
    #[serde(rename = "SN")]
    pub serial_number: String,
    /// Wallet address to store
    #[serde(rename = "Wallet")]
    pub wallet: String,
}

/// Read the device identity
pub async fn read_device_info<C: Connector>(
    session: &SerialSession<C>,
) -> Result<DeviceInfo, ProtocolError> {
    info!("reading device info");
    match session.execute_command(&DeviceCommand::ReadDeviceInfo).await? {
        ResponseOutcome::Ok(payload) => {
            let device = DeviceInfo::parse(&payload)?;
            debug!(?device, "device info");
            Ok(device)
        }
        ResponseOutcome::OkEmpty => Err(ProtocolError::InvalidResponse(
            "empty device info response".to_string(),
        )),
        ResponseOutcome::Err(reason) => {
            warn!(%reason, "device rejected Read_Device_Info");
            Err(ProtocolError::DeviceError(reason))
        }
    }
}

/// Write serial number and wallet to the device
pub async fn write_provisioning<C: Connector>(
    session: &SerialSession<C>,
    data: &Provisioning,
) -> Result<(), ProtocolError> {
    let command = DeviceCommand::provision(data.serial_number.as_str(), data.wallet.as_str())?;
    info!(serial_number = %data.serial_number, "writing provisioning data");

    match session.execute_command(&command).await? {
        ResponseOutcome::Err(reason) => {
            warn!(%reason, "device rejected Device_PIN");
            Err(ProtocolError::DeviceError(reason))
        }
        ResponseOutcome::Ok(_) | ResponseOutcome::OkEmpty => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_info() {
        let info = DeviceInfo::parse("34:85:18:aa:bb:cc, SN123456, io1qyqsyqcy").unwrap();
        assert_eq!(info.mac, "34:85:18:aa:bb:cc");
        assert_eq!(info.serial_number, "SN123456");
        assert_eq!(info.wallet, "io1qyqsyqcy");
    }

    #[test]
    fn test_parse_splits_on_last_two_commas() {
        let info = DeviceInfo::parse("a,b,c,d").unwrap();
        assert_eq!(info.mac, "a,b");
        assert_eq!(info.serial_number, "c");
        assert_eq!(info.wallet, "d");
    }

    #[test]
    fn test_parse_keeps_empty_fields() {
        let info = DeviceInfo::parse(",,").unwrap();
        assert_eq!(info.mac, "");
        assert_eq!(info.serial_number, "");
        assert_eq!(info.wallet, "");
    }

    #[test]
    fn test_parse_rejects_short_payload() {
        assert!(matches!(
            DeviceInfo::parse("only, two"),
            Err(ProtocolError::InvalidResponse(_))
        ));
        assert!(DeviceInfo::parse("").is_err());
    }
}
