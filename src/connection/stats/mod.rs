mod client;
mod connection;
mod ip;

pub use client::Stats as ClientStats;
pub use connection::Stats as ConnectionStats;
pub use ip::Stats as IpStats;
