use std::time::Duration;

use serde::{Deserialize, Serialize};
use crate::config::types::{DataBits, Parity, StopBits};
#[cfg(feature = "rts")]
use crate::config::types::RtsType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub device: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,

    /// Flow control settings for the serial port
    #[cfg(feature = "rts")]
    pub rts_type: RtsType,
    #[cfg(feature = "rts")]
    pub rts_delay_us: u64,

    /// Whether to flush the serial port after writing
    pub flush_after_write: bool,

    /// Bound on how long a whole request/response transaction may take,
    /// including retries
    #[serde(with = "humantime_serde")]
    pub transaction_timeout: Duration,

    /// Bound on a single `recv` call on the serial port
    #[serde(with = "humantime_serde")]
    pub serial_timeout: Duration,

    /// Largest RTU frame the framer will allocate for; protects against a
    /// corrupt byte-count field driving an unbounded read
    pub max_frame_size: usize,

    /// Some USB-RS485 adapters echo every byte they transmit back onto the
    /// receive line; when set the transport strips its own outbound frame
    /// off the front of the next read before framing.
    pub handle_local_echo: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: "/dev/ttyAMA0".to_string(),
            baud_rate: 9600,
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            #[cfg(feature = "rts")]
            rts_type: RtsType::default(),
            #[cfg(feature = "rts")]
            rts_delay_us: 3500,
            flush_after_write: true,
            transaction_timeout: Duration::from_secs(3),
            serial_timeout: Duration::from_secs(1),
            max_frame_size: 256,
            handle_local_echo: false,
        }
    }
}

impl Config {
    pub fn serial_port_info(&self) -> String {
        format!(
            "{} ({} baud, {} data bits, {} parity, {} stop bits)",
            self.device,
            self.baud_rate,
            self.data_bits,
            self.parity,
            self.stop_bits
        )
    }
}
