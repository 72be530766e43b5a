mod common;

use common::{init_tracing, open_session, test_config, DuplexConnector};
use indicator_core::device::{read_device_info, write_provisioning, DeviceInfo, Provisioning};
use indicator_core::protocol::{ProtocolError, SerialSession};
use pretty_assertions::assert_eq;

fn provisioning(serial_number: &str, wallet: &str) -> Provisioning {
    Provisioning {
        serial_number: serial_number.to_string(),
        wallet: wallet.to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_read_device_info() {
    let (session, mut device, _devices) = open_session(test_config()).await;

    let (info, line) = tokio::join!(read_device_info(&session), async {
        let line = device.recv_line().await;
        device
            .send("CMD_RESP:OK, 34:85:18:aa:bb:cc, SN0001, io1qyqsyqcyq5rqwzqf\r\n")
            .await;
        line
    });

    assert_eq!(line.as_deref(), Some("Read_Device_Info"));
    assert_eq!(
        info.unwrap(),
        DeviceInfo {
            mac: "34:85:18:aa:bb:cc".to_string(),
            serial_number: "SN0001".to_string(),
            wallet: "io1qyqsyqcyq5rqwzqf".to_string(),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_read_device_info_device_error() {
    let (session, mut device, _devices) = open_session(test_config()).await;

    let (info, _) = tokio::join!(read_device_info(&session), async {
        device.recv_line().await;
        device.send("CMD_RESP:ERR, not provisioned\r\n").await;
    });

    match info {
        Err(ProtocolError::DeviceError(reason)) => assert_eq!(reason, "not provisioned"),
        other => panic!("expected DeviceError, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_read_device_info_malformed_payload() {
    let (session, mut device, _devices) = open_session(test_config()).await;

    let (info, _) = tokio::join!(read_device_info(&session), async {
        device.recv_line().await;
        device.send("CMD_RESP:OK\r\n").await;
    });

    assert!(matches!(info, Err(ProtocolError::InvalidResponse(_))));
}

#[tokio::test(start_paused = true)]
async fn test_write_provisioning() {
    let (session, mut device, _devices) = open_session(test_config()).await;
    let data = provisioning("SN0001", "io1qyqsyqcy");

    let (result, line) = tokio::join!(write_provisioning(&session, &data), async {
        let line = device.recv_line().await;
        device.send("CMD_RESP:OK\r\n").await;
        line
    });

    result.unwrap();
    assert_eq!(line.as_deref(), Some("Device_PIN -s SN0001 -w io1qyqsyqcy"));
}

#[tokio::test(start_paused = true)]
async fn test_write_provisioning_rejected() {
    let (session, mut device, _devices) = open_session(test_config()).await;
    let data = provisioning("SN0001", "io1qyqsyqcy");

    let (result, _) = tokio::join!(write_provisioning(&session, &data), async {
        device.recv_line().await;
        device.send("CMD_RESP:ERR, locked\r\n").await;
    });

    assert!(matches!(result, Err(ProtocolError::DeviceError(ref r)) if r == "locked"));
}

#[tokio::test]
async fn test_write_provisioning_validates_before_sending() {
    init_tracing();
    let (connector, _devices) = DuplexConnector::new();
    let session = SerialSession::new(connector, test_config());

    let err = write_provisioning(&session, &provisioning("SN 1", "io1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidArgument(_)));
    assert_eq!(session.stats().tx_bytes, 0);
}

#[test]
fn test_device_info_json_uses_tool_field_names() {
    let info = DeviceInfo {
        mac: "aa".to_string(),
        serial_number: "sn".to_string(),
        wallet: "w".to_string(),
    };
    let json = serde_json::to_string(&info).unwrap();
    assert_eq!(json, r#"{"MAC":"aa","SN":"sn","Wallet":"w"}"#);
}
