use std::net::SocketAddr;
use std::time::Duration;

use serialport::SerialPort;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::RtuConfig;
use crate::modbus::transport::Transport;

/// The serial link to the RTU slave device. Implements [`Transport`] so the
/// transaction [`crate::modbus::Dispatcher`] can drive it the same way it
/// would drive a TCP socket; framing, retries, and the inter-frame gap all
/// live above this layer.
pub struct RtuTransport {
    port: Mutex<Box<dyn SerialPort>>,
    config: RtuConfig,
    #[cfg(feature = "rts")]
    rts_type: crate::RtsType,
    #[cfg(feature = "rts")]
    rts_delay: Duration,
    /// Bytes still expected to be the local echo of our own last write,
    /// seen only when `config.handle_local_echo` is set.
    echo_remaining: usize,
}

impl RtuTransport {
    pub fn new(config: &RtuConfig) -> Result<Self, serialport::Error> {
        let port = Self::open(config)?;

        Ok(Self {
            port: Mutex::new(port),
            config: config.clone(),
            #[cfg(feature = "rts")]
            rts_type: config.rts_type,
            #[cfg(feature = "rts")]
            rts_delay: Duration::from_micros(config.rts_delay_us),
            echo_remaining: 0,
        })
    }

    fn open(config: &RtuConfig) -> Result<Box<dyn SerialPort>, serialport::Error> {
        serialport::new(&config.device, config.baud_rate)
            .data_bits(config.data_bits.into())
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .timeout(config.serial_timeout)
            .open()
    }

    #[cfg(feature = "rts")]
    async fn set_rts(&self, port: &mut Box<dyn SerialPort>, transmitting: bool) -> std::io::Result<()> {
        let level = self.rts_type.to_signal_level(transmitting);
        port.write_request_to_send(level)?;
        if !self.rts_delay.is_zero() {
            tokio::time::sleep(self.rts_delay).await;
        }
        Ok(())
    }
}

impl Transport for RtuTransport {
    async fn send(&mut self, buf: &[u8]) -> std::io::Result<()> {
        {
            let mut port = self.port.lock().await;

            #[cfg(feature = "rts")]
            self.set_rts(&mut port, true).await?;

            port.write_all(buf)?;
            port.flush()?;

            #[cfg(feature = "rts")]
            self.set_rts(&mut port, false).await?;
        }

        if self.config.handle_local_echo {
            self.echo_remaining = buf.len();
        }

        debug!("Wrote {} bytes to serial port", buf.len());
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        // The serial port itself is opened with a read timeout of
        // `serial_timeout`, so a stalled line surfaces as TimedOut here
        // rather than blocking forever.
        let mut port = self.port.lock().await;
        loop {
            let n = port.read(buf)?;
            if self.echo_remaining == 0 || n == 0 {
                return Ok(n);
            }
            let discard = self.echo_remaining.min(n);
            self.echo_remaining -= discard;
            if discard == n {
                // The whole read was our own echoed frame; loop for the
                // reply itself rather than reporting a spurious empty read.
                continue;
            }
            buf.copy_within(discard..n, 0);
            return Ok(n - discard);
        }
    }

    fn peer_address(&self) -> Option<SocketAddr> {
        None
    }

    async fn reconnect(&mut self) -> std::io::Result<()> {
        let new_port = Self::open(&self.config).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
        })?;
        *self.port.lock().await = new_port;
        self.echo_remaining = 0;
        debug!("Reopened serial port {}", self.config.device);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_reports_missing_device() {
        let mut config = RtuConfig::default();
        config.device = "/dev/does-not-exist-modbus-relay-test".to_string();
        assert!(RtuTransport::new(&config).is_err());
    }
}
