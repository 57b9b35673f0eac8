pub mod config;
pub mod connection;
pub mod errors;
pub mod http_api;
pub mod logging;
pub mod modbus;
pub mod modbus_relay;
pub mod rtu_transport;
mod utils;

pub use config::{
    ConnectionConfig, DispatchConfig, HttpConfig, LoggingConfig, RelayConfig, RtuConfig,
    StatsConfig, TcpConfig,
};
pub use config::{DataBits, Parity, RtsType, StopBits};
pub use connection::BackoffStrategy;
pub use connection::{ClientStats, ConnectionStats, IpStats};
pub use connection::{ConnectionGuard, ConnectionManager, StatsManager};
pub use errors::{
    BackoffError, ClientErrorKind, ConfigValidationError, ConnectionError, FrameErrorKind,
    IoOperation, ProtocolErrorKind, RelayError, RtsError, SerialErrorKind, TransportError,
};
pub use http_api::start_http_server;
pub use logging::setup_logging;
pub use modbus::{Dispatcher, ExecuteOutcome, ModbusError};
pub use modbus_relay::ModbusRelay;
pub use rtu_transport::RtuTransport;
