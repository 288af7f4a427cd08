//! Typed command helpers over a [`CommandTransport`].

use crate::data::{self, ConnectionInfo, MinerInfo, PoolConfig, StatValue};
use crate::{ClientError, CommandTransport, LineStream};
use oxpool_types::{Amount, MinerAddress};
use std::collections::BTreeMap;

/// Client for the daemon's command channel.
pub struct NodeClient<T: CommandTransport> {
    transport: T,
}

impl<T: CommandTransport> NodeClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Raw line stream for a command.
    pub fn command_stream(&self, command: &str) -> Result<LineStream, ClientError> {
        self.transport.send(command)
    }

    /// Whole command output as one string.
    pub fn command(&self, command: &str) -> Result<String, ClientError> {
        let lines = self.command_stream(command)?.collect::<Result<Vec<_>, _>>()?;
        Ok(lines.join("\n"))
    }

    /// Output of the `state` command.
    pub fn state(&self) -> Result<String, ClientError> {
        self.command("state")
    }

    /// Whether the node is in a state where commands are reliable.
    pub fn is_ready(&self) -> Result<bool, ClientError> {
        let state = self.state()?.to_lowercase();
        Ok(state.contains("normal operation") || state.contains("transfer to complete"))
    }

    fn ensure_ready(&self) -> Result<(), ClientError> {
        if self.is_ready()? {
            Ok(())
        } else {
            Err(ClientError::NodeNotReady)
        }
    }

    /// Addresses from the `account` command, up to `limit` of them.
    ///
    /// Each well-formed line carries an address plus three numeric fields;
    /// anything else — wrong field count, unparseable address — is skipped.
    pub fn list_accounts(
        &self,
        limit: u64,
    ) -> Result<Box<dyn Iterator<Item = Result<MinerAddress, ClientError>>>, ClientError> {
        self.ensure_ready()?;
        let lines = self.command_stream(&format!("account {}", limit.max(1)))?;
        Ok(Box::new(lines.filter_map(|line| match line {
            Ok(line) => {
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() != 4 {
                    return None;
                }
                match fields[0].parse::<MinerAddress>() {
                    Ok(address) => Some(Ok(address)),
                    Err(_) => {
                        tracing::debug!(%line, "skipping malformed account line");
                        None
                    }
                }
            }
            Err(e) => Some(Err(e)),
        })))
    }

    /// Balance of one address via the `balance` command.
    pub fn balance(&self, address: &MinerAddress) -> Result<Amount, ClientError> {
        self.ensure_ready()?;
        let output = self.command(&format!("balance {address}"))?;
        let amount = output
            .split_whitespace()
            .nth(1)
            .unwrap_or("0.000000000")
            .parse()
            .unwrap_or(Amount::ZERO);
        Ok(amount)
    }

    /// Raw line stream for the `block` command. `param` must be a valid
    /// address or block hash.
    pub fn block_lines(&self, param: &str) -> Result<LineStream, ClientError> {
        if !is_block_command_parameter(param) {
            return Err(ClientError::InvalidParameter(param.to_string()));
        }
        self.ensure_ready()?;
        self.command_stream(&format!("block {param}"))
    }

    /// Pool configuration from the `pool` command.
    pub fn pool_config(&self) -> Result<PoolConfig, ClientError> {
        Ok(data::parse_pool_config(&self.command("pool")?))
    }

    /// Connection list from the `net conn` command.
    pub fn connections(&self) -> Result<Vec<ConnectionInfo>, ClientError> {
        let mut connections = Vec::new();
        for line in self.command_stream("net conn")? {
            if let Some(conn) = data::parse_connection(&line?) {
                connections.push(conn);
            }
        }
        Ok(connections)
    }

    /// Key/value statistics from the `stats` command.
    pub fn stats(&self) -> Result<BTreeMap<String, StatValue>, ClientError> {
        let mut stats = BTreeMap::new();
        for line in self.command_stream("stats")? {
            data::parse_stats_line(&line?, &mut stats);
        }
        Ok(stats)
    }

    /// Miner list from the `miners` command, tolerating both table shapes.
    pub fn miners(&self) -> Result<Vec<MinerInfo>, ClientError> {
        let mut parser = data::MinersParser::new();
        for line in self.command_stream("miners")? {
            parser.push_line(&line?);
        }
        Ok(parser.finish())
    }
}

/// Whether `param` may be passed to the `block` command: a miner address or
/// a block hash.
pub fn is_block_command_parameter(param: &str) -> bool {
    param.parse::<MinerAddress>().is_ok() || param.parse::<oxpool_types::BlockHash>().is_ok()
}
