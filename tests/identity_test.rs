use em540_exporter::error::{ExporterError, Result};
use em540_exporter::identity::{DeviceIdentity, Firmware, model_name};
use em540_exporter::modbus::RegisterSource;
use std::collections::HashMap;

struct MapSource(HashMap<u16, Vec<u16>>);

#[async_trait::async_trait]
impl RegisterSource for MapSource {
    async fn read_holding_registers(
        &mut self,
        _unit_id: u8,
        address: u16,
        _count: u16,
    ) -> Result<Vec<u16>> {
        self.0
            .get(&address)
            .cloned()
            .ok_or_else(|| ExporterError::transport("illegal data address"))
    }
}

fn em540_registers() -> HashMap<u16, Vec<u16>> {
    HashMap::from([
        (0x000b, vec![0x06e1]),
        // "KA23456789012" + filler byte, then production year
        (
            0x5000,
            vec![0x4B41, 0x3233, 0x3435, 0x3637, 0x3839, 0x3031, 0x325A, 23],
        ),
        (0x0302, vec![0x0A21]),
        (0x1002, vec![1]),
        (0x1103, vec![2]),
    ])
}

#[test]
fn device_code_lookup() {
    assert_eq!(model_name(0x06e1).unwrap(), "EM540DINAV23XS1PFA");
    assert!(matches!(
        model_name(0x0001),
        Err(ExporterError::UnknownDeviceCode { table: "device", .. })
    ));
}

#[tokio::test]
async fn reads_full_identity() {
    let mut source = MapSource(em540_registers());
    let id = DeviceIdentity::read(&mut source, 1).await.unwrap();

    assert_eq!(id.model_code, 0x06e1);
    assert_eq!(id.model, "EM540DINAV23XS1PFA");
    // The 14th byte is not part of the serial
    assert_eq!(id.serial, "KA23456789012");
    assert_eq!(id.production_year, 23);
    assert_eq!(
        id.firmware,
        Firmware {
            major: 2,
            minor: 1,
            revision: 10
        }
    );
    assert_eq!(id.measuring_system, "3P");
    assert_eq!(id.measuring_mode, "C mode (bidirectional)");

    let lines = id.report_lines();
    assert_eq!(lines[0], "Device       : EM540DINAV23XS1PFA");
    assert!(lines.contains(&"Firmware     : 2.1".to_string()));
    assert!(lines.contains(&"Revision     : 10".to_string()));
}

#[tokio::test]
async fn unknown_model_is_fatal() {
    let mut regs = em540_registers();
    regs.insert(0x000b, vec![0x0700]);
    let err = DeviceIdentity::read(&mut MapSource(regs), 1)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Unknown device code: 0x0700");
}

#[tokio::test]
async fn unknown_measuring_mode_is_fatal() {
    let mut regs = em540_registers();
    regs.insert(0x1103, vec![7]);
    let err = DeviceIdentity::read(&mut MapSource(regs), 1)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExporterError::UnknownDeviceCode {
            table: "measuring mode",
            code: 7
        }
    ));
}

#[tokio::test]
async fn unreachable_device_is_transport_error() {
    let err = DeviceIdentity::read(&mut MapSource(HashMap::new()), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ExporterError::Transport { .. }));
}
