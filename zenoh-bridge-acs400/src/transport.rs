//! Modbus transport.
//!
//! The gateway talks to the drive through [`RegisterTransport`], which takes
//! 0-based wire addresses. [`ModbusRtuTransport`] is the serial
//! implementation; framing, CRC and timing are handled by `tokio-modbus`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_modbus::client::{Context, Reader, Writer};
use tokio_modbus::prelude::*;
use tracing::{debug, info};

/// Error type for a single transport round-trip.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("device exception: {0}")]
    Exception(String),
    #[error("no response within {0} ms")]
    Timeout(u64),
    #[error("short response: expected {expected} registers, got {got}")]
    ShortResponse { expected: u16, got: usize },
}

/// Holding-register access over a field bus.
#[async_trait]
pub trait RegisterTransport: Send {
    /// Read `count` holding registers starting at the 0-based `address`.
    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;

    /// Write one holding register at the 0-based `address`.
    async fn write_single_register(&mut self, address: u16, value: u16)
    -> Result<(), TransportError>;
}

/// Serial line settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB1" or "COM3")
    pub port: String,
    /// Baud rate (default: 9600)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Data bits (default: 8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Parity: "none", "even", or "odd" (default: "none")
    #[serde(default = "default_parity")]
    pub parity: String,
    /// Stop bits: 1 or 2 (default: 1)
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

impl SerialConfig {
    fn builder(&self) -> tokio_serial::SerialPortBuilder {
        let parity = match self.parity.to_lowercase().as_str() {
            "even" => tokio_serial::Parity::Even,
            "odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        };

        let stop_bits = match self.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };

        let data_bits = match self.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };

        tokio_serial::new(&self.port, self.baud_rate)
            .parity(parity)
            .stop_bits(stop_bits)
            .data_bits(data_bits)
    }
}

/// Modbus RTU over a serial port.
///
/// The port is opened on first use. After an I/O failure or timeout the
/// context is dropped and the next call reopens the port; nothing is retried
/// within a call.
pub struct ModbusRtuTransport {
    serial: SerialConfig,
    unit_id: u8,
    timeout: Duration,
    ctx: Option<Context>,
}

impl ModbusRtuTransport {
    pub fn new(serial: SerialConfig, unit_id: u8, timeout: Duration) -> Self {
        Self {
            serial,
            unit_id,
            timeout,
            ctx: None,
        }
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    fn context(&mut self) -> Result<&mut Context, TransportError> {
        if self.ctx.is_none() {
            let stream = tokio_serial::SerialStream::open(&self.serial.builder()).map_err(|e| {
                TransportError::Connection(format!("open {} failed: {}", self.serial.port, e))
            })?;
            info!(
                port = %self.serial.port,
                baud_rate = self.serial.baud_rate,
                unit_id = self.unit_id,
                "Opened Modbus RTU link"
            );
            self.ctx = Some(rtu::attach_slave(stream, Slave(self.unit_id)));
        }

        self.ctx
            .as_mut()
            .ok_or_else(|| TransportError::Connection("link not open".to_string()))
    }

    /// Drop the link after a failure that may have desynchronized it.
    fn reset_on(&mut self, error: &TransportError) {
        if matches!(error, TransportError::Io(_) | TransportError::Timeout(_)) {
            debug!(port = %self.serial.port, error = %error, "Dropping Modbus link");
            self.ctx = None;
        }
    }
}

#[async_trait]
impl RegisterTransport for ModbusRtuTransport {
    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let timeout = self.timeout;
        let timeout_ms = self.timeout_ms();
        let ctx = self.context()?;

        let result = match tokio::time::timeout(timeout, ctx.read_holding_registers(address, count))
            .await
        {
            Err(_) => Err(TransportError::Timeout(timeout_ms)),
            Ok(Err(e)) => Err(TransportError::Io(e.to_string())),
            Ok(Ok(Err(exception))) => Err(TransportError::Exception(format!("{:?}", exception))),
            Ok(Ok(Ok(words))) if words.len() < count as usize => {
                Err(TransportError::ShortResponse {
                    expected: count,
                    got: words.len(),
                })
            }
            Ok(Ok(Ok(words))) => Ok(words),
        };

        if let Err(e) = &result {
            self.reset_on(e);
        }
        result
    }

    async fn write_single_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<(), TransportError> {
        let timeout = self.timeout;
        let timeout_ms = self.timeout_ms();
        let ctx = self.context()?;

        let result =
            match tokio::time::timeout(timeout, ctx.write_single_register(address, value)).await {
                Err(_) => Err(TransportError::Timeout(timeout_ms)),
                Ok(Err(e)) => Err(TransportError::Io(e.to_string())),
                Ok(Ok(Err(exception))) => {
                    Err(TransportError::Exception(format!("{:?}", exception)))
                }
                Ok(Ok(Ok(()))) => Ok(()),
            };

        if let Err(e) = &result {
            self.reset_on(e);
        }
        result
    }
}
