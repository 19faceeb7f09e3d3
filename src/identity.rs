//! One-shot device identification read at startup
//!
//! Confirms the meter is an EM530/EM540 before the poll loop trusts the
//! register map, and collects what an operator wants to see in the banner.

use crate::error::{ExporterError, Result};
use crate::modbus::{RegisterSource, fetch};
use serde::Serialize;

const MODEL_CODE_ADDR: u16 = 0x000b;
const SERIAL_BLOCK_ADDR: u16 = 0x5000;
const SERIAL_BLOCK_WORDS: u16 = 8;
const SERIAL_WORDS: usize = 7;
/// The serial is 13 characters; the 14th byte of its 7 words is filler
const SERIAL_CHARS: usize = 13;
const FIRMWARE_ADDR: u16 = 0x0302;
const MEASURING_SYSTEM_ADDR: u16 = 0x1002;
const MEASURING_MODE_ADDR: u16 = 0x1103;

/// Model names by device code
pub const DEVICE_MODELS: [(u16, &str); 8] = [
    (0x06d0, "EM530DINAV53XS1X"),
    (0x06d1, "EM530DINAV53XS1PFA"),
    (0x06d2, "EM530DINAV53XS1PFB"),
    (0x06d3, "EM530DINAV53XS1PFC"),
    (0x06e0, "EM540DINAV23XS1X"),
    (0x06e1, "EM540DINAV23XS1PFA"),
    (0x06e2, "EM540DINAV23XS1PFB"),
    (0x06e3, "EM540DINAV23XS1PFC"),
];

pub const MEASURING_SYSTEMS: [(u16, &str); 3] = [(0, "3Pn"), (1, "3P"), (2, "2P")];

pub const MEASURING_MODES: [(u16, &str); 3] = [
    (0, "A mode (absolute)"),
    (1, "B mode (counters accumulation by phase)"),
    (2, "C mode (bidirectional)"),
];

fn lookup(table: &'static [(u16, &'static str)], name: &'static str, code: u16) -> Result<&'static str> {
    table
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, n)| *n)
        .ok_or_else(|| ExporterError::unknown_code(name, code))
}

/// Resolve a device code to its model name
pub fn model_name(code: u16) -> Result<&'static str> {
    lookup(&DEVICE_MODELS, "device", code)
}

pub fn measuring_system_name(code: u16) -> Result<&'static str> {
    lookup(&MEASURING_SYSTEMS, "measuring system", code)
}

pub fn measuring_mode_name(code: u16) -> Result<&'static str> {
    lookup(&MEASURING_MODES, "measuring mode", code)
}

/// Firmware version packed into one register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Firmware {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
}

impl Firmware {
    /// Low nibble is minor, next nibble major, high byte revision
    pub fn from_register(word: u16) -> Self {
        let [revision, low] = word.to_be_bytes();
        Self {
            major: low >> 4,
            minor: low & 0x0f,
            revision,
        }
    }
}

/// What the meter reports about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub model_code: u16,
    pub model: &'static str,
    pub serial: String,
    pub production_year: u16,
    pub firmware: Firmware,
    pub measuring_system: &'static str,
    pub measuring_mode: &'static str,
}

impl DeviceIdentity {
    /// Read and resolve every identification register. Any read failure or
    /// unknown code is returned as an error.
    pub async fn read<S>(source: &mut S, unit_id: u8) -> Result<Self>
    where
        S: RegisterSource + ?Sized,
    {
        let block = fetch(source, unit_id, MODEL_CODE_ADDR, 1).await?;
        let model_code = block.cursor().decode_u16()?;
        let model = model_name(model_code)?;

        let block = fetch(source, unit_id, SERIAL_BLOCK_ADDR, SERIAL_BLOCK_WORDS).await?;
        let mut cursor = block.cursor();
        let serial: String = cursor
            .decode_fixed_string(SERIAL_WORDS)?
            .chars()
            .take(SERIAL_CHARS)
            .collect();
        let production_year = cursor.decode_u16()?;

        let block = fetch(source, unit_id, FIRMWARE_ADDR, 1).await?;
        let firmware = Firmware::from_register(block.cursor().decode_u16()?);

        let block = fetch(source, unit_id, MEASURING_SYSTEM_ADDR, 1).await?;
        let measuring_system = measuring_system_name(block.cursor().decode_u16()?)?;

        let block = fetch(source, unit_id, MEASURING_MODE_ADDR, 1).await?;
        let measuring_mode = measuring_mode_name(block.cursor().decode_u16()?)?;

        Ok(Self {
            model_code,
            model,
            serial,
            production_year,
            firmware,
            measuring_system,
            measuring_mode,
        })
    }

    /// Operator banner lines, in display order
    pub fn report_lines(&self) -> Vec<String> {
        vec![
            format!("Device       : {}", self.model),
            format!("Serial       : {}", self.serial),
            format!("Year         : {}", self.production_year),
            format!(
                "Firmware     : {}.{}",
                self.firmware.major, self.firmware.minor
            ),
            format!("Revision     : {}", self.firmware.revision),
            format!("Meas. system : {}", self.measuring_system),
            format!("Meas. mode   : {}", self.measuring_mode),
        ]
    }
}
