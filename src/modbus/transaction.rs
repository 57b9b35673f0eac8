//! The transaction dispatcher: pairs outbound requests with inbound
//! responses under retries, timeouts, broadcast semantics, and the RTU
//! silent-interval timing rule.
//!
//! At most one request is ever in flight on a given connection, so the
//! "transaction table" collapses to the single request this call is
//! waiting on rather than a keyed map.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::{BackoffConfig, DispatchConfig};
use crate::connection::BackoffStrategy;
use crate::modbus::encoder;
use crate::modbus::error::{DecodeError, ModbusError};
use crate::modbus::framer::rtu::{RtuFramer, SlaveFilter as RtuSlaveFilter};
use crate::modbus::framer::socket::{SlaveFilter as MbapSlaveFilter, SocketFramer};
use crate::modbus::framer::{FrameEvent, Framer};
use crate::modbus::pdu::{Direction, Pdu, PduBody};
use crate::modbus::transport::{Clock, TokioClock, Transport};

/// What `execute` resolves to. Broadcast requests never have a reply to
/// report, so they resolve to a sentinel variant instead of a `Pdu`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteOutcome {
    Response(Pdu),
    Broadcast,
}

enum CarrierFramer {
    Rtu(RtuFramer),
    Mbap(SocketFramer),
}

impl CarrierFramer {
    fn process_incoming(&mut self, bytes: &[u8], on_frame: &mut dyn FnMut(FrameEvent)) {
        match self {
            CarrierFramer::Rtu(f) => f.process_incoming(bytes, on_frame),
            CarrierFramer::Mbap(f) => f.process_incoming(bytes, on_frame),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchKey {
    Rtu(u8),
    Mbap(u16),
}

impl MatchKey {
    fn matches(&self, pdu: &Pdu) -> bool {
        match self {
            MatchKey::Rtu(uid) => pdu.slave_id == *uid,
            MatchKey::Mbap(tid) => pdu.transaction_id == *tid,
        }
    }

    /// Same idea as `matches`, but for a `DecodeFailed` event that carries
    /// identity fields instead of a full `Pdu`.
    fn matches_failure(&self, slave_id: Option<u8>, transaction_id: Option<u16>) -> bool {
        match self {
            MatchKey::Rtu(uid) => slave_id == Some(*uid),
            MatchKey::Mbap(tid) => transaction_id == Some(*tid),
        }
    }
}

enum WaitError {
    Timeout,
    ConnectionClosed,
    Io(std::io::Error),
    Decode {
        function_code: u8,
        source: DecodeError,
    },
}

/// Drives one transport end-to-end: encodes and sends requests, enforces
/// RTU's inter-frame gap, retries on timeout, and matches replies.
pub struct Dispatcher<T: Transport> {
    transport: T,
    framer: CarrierFramer,
    config: DispatchConfig,
    silent_interval: Duration,
    last_frame_end: Option<Instant>,
    next_transaction_id: u16,
    clock: Arc<dyn Clock>,
    /// Reconnect backoff, reused from the same strategy the connection
    /// manager uses for its own retry policy, parameterized from
    /// `config.reconnect_delay`/`reconnect_delay_max`.
    backoff: BackoffStrategy,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new_rtu(transport: T, baud_rate: u32, config: DispatchConfig, is_valid_slave: RtuSlaveFilter) -> Self {
        Self::new_rtu_with_clock(transport, baud_rate, config, is_valid_slave, Arc::new(TokioClock))
    }

    pub fn new_rtu_with_clock(
        transport: T,
        baud_rate: u32,
        config: DispatchConfig,
        is_valid_slave: RtuSlaveFilter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let char_time = Duration::from_secs_f64(11.0 / baud_rate as f64);
        let backoff = reconnect_backoff(&config);
        Self {
            transport,
            framer: CarrierFramer::Rtu(RtuFramer::new(Direction::Response, is_valid_slave)),
            config,
            silent_interval: char_time.mul_f64(3.5),
            last_frame_end: None,
            next_transaction_id: 1,
            clock,
            backoff,
        }
    }

    pub fn new_mbap(
        transport: T,
        config: DispatchConfig,
        is_valid_slave: MbapSlaveFilter,
        peer_addr: Option<std::net::SocketAddr>,
    ) -> Self {
        Self::new_mbap_with_clock(transport, config, is_valid_slave, peer_addr, Arc::new(TokioClock))
    }

    pub fn new_mbap_with_clock(
        transport: T,
        config: DispatchConfig,
        is_valid_slave: MbapSlaveFilter,
        peer_addr: Option<std::net::SocketAddr>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let backoff = reconnect_backoff(&config);
        Self {
            transport,
            framer: CarrierFramer::Mbap(SocketFramer::new(Direction::Response, is_valid_slave, peer_addr)),
            config,
            silent_interval: Duration::ZERO,
            last_frame_end: None,
            next_transaction_id: 1,
            clock,
            backoff,
        }
    }

    fn next_tid(&mut self) -> u16 {
        let tid = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
        if self.next_transaction_id == 0 {
            self.next_transaction_id = 1;
        }
        tid
    }

    async fn enforce_silent_interval(&mut self) {
        if !self.config.strict || self.silent_interval.is_zero() {
            return;
        }
        match self.last_frame_end {
            Some(last) => {
                let elapsed = last.elapsed();
                if elapsed < self.silent_interval {
                    tokio::time::sleep(self.silent_interval - elapsed).await;
                }
            }
            None => tokio::time::sleep(self.silent_interval).await,
        }
    }

    fn encode(&self, pdu: &Pdu) -> Vec<u8> {
        match &self.framer {
            CarrierFramer::Rtu(_) => encoder::encode_rtu(pdu),
            CarrierFramer::Mbap(_) => encoder::encode_mbap(pdu),
        }
    }

    /// Reopens the transport under exponential backoff, per
    /// `config.reconnect_delay`/`reconnect_delay_max`. Gives up once the
    /// backoff strategy is exhausted, returning the last IO error seen.
    async fn reconnect_with_backoff(&mut self) -> Result<(), ModbusError> {
        self.backoff.reset();
        loop {
            match self.transport.reconnect().await {
                Ok(()) => {
                    self.backoff.reset();
                    self.last_frame_end = None;
                    return Ok(());
                }
                Err(e) => match self.backoff.next_backoff() {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => return Err(ModbusError::Io(e)),
                },
            }
        }
    }

    async fn wait_for_reply(&mut self, key: MatchKey, timeout: Duration) -> Result<Pdu, WaitError> {
        tokio::time::timeout(timeout, async {
            let mut buf = [0u8; 1024];
            loop {
                let n = self
                    .transport
                    .recv(&mut buf)
                    .await
                    .map_err(WaitError::Io)?;
                if n == 0 {
                    if self.config.retry_on_empty {
                        // Treat as "nothing to read yet" rather than a
                        // closed connection, and keep waiting.
                        continue;
                    }
                    return Err(WaitError::ConnectionClosed);
                }
                let mut matched = None;
                self.framer.process_incoming(&buf[..n], &mut |event| {
                    if matched.is_some() {
                        return;
                    }
                    match event {
                        FrameEvent::Frame(pdu) => {
                            // A late reply to a transaction we've already
                            // given up on is dropped silently, never
                            // surfaced.
                            if key.matches(&pdu) {
                                matched = Some(Ok(pdu));
                            }
                        }
                        FrameEvent::DecodeFailed {
                            function_code,
                            source,
                            slave_id,
                            transaction_id,
                        } => {
                            if key.matches_failure(slave_id, transaction_id) {
                                matched = Some(Err(WaitError::Decode { function_code, source }));
                            }
                        }
                    }
                });
                if let Some(result) = matched {
                    return result;
                }
            }
        })
        .await
        .unwrap_or(Err(WaitError::Timeout))
    }

    /// Sends one request and waits for its matching response, retrying per
    /// the configured policy. `slave_id = 0` triggers the broadcast rule
    /// when `broadcast_enable` is set: send once, never await a reply.
    pub async fn execute(
        &mut self,
        slave_id: u8,
        function_code: u8,
        body: PduBody,
    ) -> Result<ExecuteOutcome, ModbusError> {
        let mut pdu = Pdu::new(function_code, slave_id, body);

        if slave_id == 0 && self.config.broadcast_enable {
            if matches!(self.framer, CarrierFramer::Rtu(_)) {
                self.enforce_silent_interval().await;
            }
            pdu.transaction_id = slave_id as u16;
            let frame = self.encode(&pdu);
            self.transport.send(&frame).await.map_err(ModbusError::Io)?;
            self.last_frame_end = Some(self.clock.now());
            return Ok(ExecuteOutcome::Broadcast);
        }

        let key = match &self.framer {
            CarrierFramer::Rtu(_) => {
                pdu.transaction_id = slave_id as u16;
                MatchKey::Rtu(slave_id)
            }
            CarrierFramer::Mbap(_) => {
                let tid = self.next_tid();
                pdu.transaction_id = tid;
                MatchKey::Mbap(tid)
            }
        };
        if let CarrierFramer::Mbap(framer) = &mut self.framer {
            framer.set_expected_transaction_id(Some(match key {
                MatchKey::Mbap(tid) => tid,
                MatchKey::Rtu(_) => unreachable!("mbap carrier always yields a Mbap match key"),
            }));
        }

        let total_attempts = self.config.retries as u32 + 1;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if matches!(self.framer, CarrierFramer::Rtu(_)) {
                self.enforce_silent_interval().await;
            }
            let frame = self.encode(&pdu);
            if let Err(e) = self.transport.send(&frame).await {
                if self.config.close_comm_on_error {
                    self.reconnect_with_backoff().await?;
                }
                if attempt >= total_attempts {
                    return Err(ModbusError::Io(e));
                }
                continue;
            }
            self.last_frame_end = Some(self.clock.now());

            match self.wait_for_reply(key, self.config.timeout).await {
                Ok(reply) => return Ok(ExecuteOutcome::Response(reply)),
                Err(WaitError::Decode { function_code, source }) => {
                    return Err(ModbusError::Decode { function_code, source });
                }
                Err(WaitError::Io(e)) => {
                    if self.config.close_comm_on_error {
                        self.reconnect_with_backoff().await?;
                    }
                    if attempt >= total_attempts {
                        return Err(ModbusError::Io(e));
                    }
                }
                Err(WaitError::ConnectionClosed) => {
                    if self.config.close_comm_on_error {
                        self.reconnect_with_backoff().await?;
                    }
                    if attempt >= total_attempts {
                        return Err(ModbusError::NotConnected);
                    }
                }
                Err(WaitError::Timeout) => {
                    if attempt >= total_attempts {
                        return Err(ModbusError::Timeout {
                            timeout: self.config.timeout,
                            attempts: attempt as u8,
                        });
                    }
                }
            }
        }
    }
}

/// Builds the reconnect backoff from the dispatcher's own config knobs: the
/// multiplier and retry bound aren't user-configurable separately from
/// `retries`, so reconnect attempts share the same cardinality as response
/// retries, scaled between `reconnect_delay` and `reconnect_delay_max`.
fn reconnect_backoff(config: &DispatchConfig) -> BackoffStrategy {
    BackoffStrategy::new(BackoffConfig {
        initial_interval: config.reconnect_delay,
        max_interval: config.reconnect_delay_max,
        multiplier: 2.0,
        max_retries: config.retries as usize + 1,
    })
}
