//! Command client for the daemon's local text channel.
//!
//! The daemon is reachable only through a unix socket speaking a one-shot
//! line protocol: send a NUL-terminated command, read response lines until
//! the daemon closes the channel. [`CommandTransport`] is the seam; the
//! typed helpers on [`NodeClient`] turn specific commands into structured
//! data, tolerating the line-shape differences between daemon versions.

mod client;
mod data;
mod error;
mod transport;

pub use client::{is_block_command_parameter, NodeClient};
pub use data::{ConnectionInfo, MinerInfo, PoolConfig, StatValue};
pub use error::ClientError;
pub use transport::{CommandTransport, LineStream, UnixSocketTransport};
