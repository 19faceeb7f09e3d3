//! Modbus RTU client for EM540 communication
//!
//! This module owns the serial session to the meter and turns block reads
//! into [`RegisterBlock`]s. Reads are never retried here; the poll loop
//! decides what a failed read means.

use crate::config::SerialConfig;
use crate::error::{ExporterError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::payload::RegisterBlock;
use std::time::Duration;
use tokio::time::timeout;
use tokio_modbus::client::rtu;
use tokio_modbus::prelude::*;
use tokio_serial::SerialStream;

/// Anything that can answer holding-register reads
#[async_trait::async_trait]
pub trait RegisterSource: Send {
    async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>>;
}

/// Read one block of `count` registers starting at `start`.
///
/// The reply must cover exactly `[start, start + count)`; a short or long
/// answer is rejected before anything decodes it.
pub async fn fetch<S>(source: &mut S, unit_id: u8, start: u16, count: u16) -> Result<RegisterBlock>
where
    S: RegisterSource + ?Sized,
{
    let words = source.read_holding_registers(unit_id, start, count).await?;
    let expected = usize::from(count);
    if words.len() != expected {
        return Err(ExporterError::block_length(start, expected, words.len()));
    }
    Ok(RegisterBlock::new(start, words))
}

/// Modbus RTU client over a serial port
pub struct ModbusClient {
    /// Modbus RTU client context
    client: Option<tokio_modbus::client::Context>,

    /// Configuration
    config: SerialConfig,

    /// Operation timeout
    operation_timeout: Duration,

    /// Logger
    logger: StructuredLogger,
}

impl ModbusClient {
    /// Create a new Modbus client
    pub fn new(config: &SerialConfig) -> Self {
        let logger = get_logger_with_context(
            LogContext::new("modbus")
                .with_unit_id(config.unit_id)
                .with_field("port", config.port.clone()),
        );
        Self {
            client: None,
            config: config.clone(),
            operation_timeout: Duration::from_millis(config.read_timeout_ms),
            logger,
        }
    }

    /// Open the serial port and attach to the configured unit
    pub fn connect(&mut self) -> Result<()> {
        self.logger.info(&format!(
            "Opening serial port {} at {} baud",
            self.config.port, self.config.baud_rate
        ));

        let builder = tokio_serial::new(&self.config.port, self.config.baud_rate)
            .parity(parse_parity(&self.config.parity))
            .data_bits(parse_data_bits(self.config.data_bits))
            .stop_bits(parse_stop_bits(self.config.stop_bits))
            .timeout(self.operation_timeout);

        let port = SerialStream::open(&builder).map_err(|e| {
            let error_msg = format!("Failed to open serial port {}: {}", self.config.port, e);
            self.logger.error(&error_msg);
            ExporterError::transport(error_msg)
        })?;

        self.client = Some(rtu::attach_slave(port, Slave(self.config.unit_id)));
        self.logger.info("Serial port opened");
        Ok(())
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Get client reference or error if not connected
    fn get_client(&mut self) -> Result<&mut tokio_modbus::client::Context> {
        self.client
            .as_mut()
            .ok_or_else(|| ExporterError::transport("Not connected to serial port"))
    }
}

#[async_trait::async_trait]
impl RegisterSource for ModbusClient {
    async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        let timeout_duration = self.operation_timeout;

        self.logger.debug(&format!(
            "Reading {} registers from address {:#06x} on unit {}",
            count, address, unit_id
        ));

        let client = self.get_client()?;
        client.set_slave(Slave(unit_id));
        let request = client.read_holding_registers(address, count);

        match timeout(timeout_duration, request).await {
            Ok(Ok(Ok(response))) => {
                self.logger
                    .trace(&format!("Read {} registers: {:?}", response.len(), response));
                Ok(response)
            }
            Ok(Ok(Err(exception))) => {
                let error_msg = format!(
                    "Exception response reading {:#06x}: {}",
                    address, exception
                );
                self.logger.warn(&error_msg);
                Err(ExporterError::transport(error_msg))
            }
            Ok(Err(e)) => {
                self.logger
                    .warn(&format!("Failed to read holding registers: {}", e));
                Err(e.into())
            }
            Err(_) => {
                let error_msg = format!("Read of {:#06x} timed out", address);
                self.logger.warn(&error_msg);
                Err(ExporterError::timeout(error_msg))
            }
        }
    }
}

fn parse_parity(parity: &str) -> tokio_serial::Parity {
    match parity.to_lowercase().as_str() {
        "even" => tokio_serial::Parity::Even,
        "odd" => tokio_serial::Parity::Odd,
        _ => tokio_serial::Parity::None,
    }
}

fn parse_data_bits(bits: u8) -> tokio_serial::DataBits {
    match bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    }
}

fn parse_stop_bits(bits: u8) -> tokio_serial::StopBits {
    match bits {
        2 => tokio_serial::StopBits::Two,
        _ => tokio_serial::StopBits::One,
    }
}
