//! Typed shapes parsed from daemon command output, with the line parsers.
//!
//! Response lines are daemon-version-dependent free text; every parser here
//! skips lines it does not recognize instead of failing.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Pool configuration reported by the `pool` command.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PoolConfig {
    pub max_conn: u32,
    pub max_ip: u32,
    pub max_addr: u32,
    pub fee: f64,
    pub reward: f64,
    pub direct: f64,
    pub fund: f64,
}

/// Parse the `pool` command output.
///
/// Daemons since 0.2.2 report seven colon-delimited fields; older versions
/// report six with a different field order. Anything else yields the zeroed
/// default.
pub fn parse_pool_config(output: &str) -> PoolConfig {
    let Some((_, value)) = output.split_once(": ") else {
        return PoolConfig::default();
    };

    let fields: Vec<&str> = value.trim().split(':').collect();
    let int = |i: usize| fields[i].trim().parse::<u32>().unwrap_or(0);
    let float = |i: usize| fields[i].trim().parse::<f64>().unwrap_or(0.0);

    match fields.len() {
        // 0.2.2 and later
        7 => PoolConfig {
            max_conn: int(0),
            max_ip: int(1),
            max_addr: int(2),
            fee: float(3),
            reward: float(4),
            direct: float(5),
            fund: float(6),
        },
        // earlier than 0.2.2
        6 => PoolConfig {
            max_conn: int(0),
            max_ip: int(5),
            max_addr: int(5),
            fee: float(1),
            reward: float(2),
            direct: float(3),
            fund: float(4),
        },
        _ => PoolConfig::default(),
    }
}

/// One row of `net conn` output.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub host: String,
    pub seconds: u64,
    pub in_out_bytes: (u64, u64),
    pub in_out_packets: (u64, u64),
    pub in_out_dropped: (u64, u64),
}

fn parse_pair(field: &str) -> (u64, u64) {
    let mut parts = field.splitn(2, '/');
    let first = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let second = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    (first, second)
}

/// Parse one `net conn` line; `None` for anything but the 11-field rows.
pub fn parse_connection(line: &str) -> Option<ConnectionInfo> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 11 {
        return None;
    }
    Some(ConnectionInfo {
        host: fields[1].to_string(),
        seconds: fields[2].parse().unwrap_or(0),
        in_out_bytes: parse_pair(fields[4]),
        in_out_packets: parse_pair(fields[7]),
        in_out_dropped: parse_pair(fields[9]),
    })
}

/// A value from the `stats` output: scalar or an `X of Y` pair.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Integer(u64),
    Float(f64),
    Text(String),
    Pair(Vec<StatValue>),
}

fn coerce_scalar(raw: &str) -> StatValue {
    if raw.chars().all(|c| c.is_ascii_digit()) && !raw.is_empty() {
        if let Ok(n) = raw.parse::<u64>() {
            return StatValue::Integer(n);
        }
    }
    if let Ok(f) = raw.parse::<f64>() {
        return StatValue::Float(f);
    }
    StatValue::Text(raw.to_string())
}

/// Accumulate one `stats` line into the map.
///
/// Keys are lowercased with spaces collapsed to underscores. A hashrate
/// line additionally yields a derived `hashrate` entry scaled from MH/s to
/// H/s, the shape downstream consumers expect.
pub fn parse_stats_line(line: &str, stats: &mut BTreeMap<String, StatValue>) {
    let Some((raw_key, raw_value)) = line.split_once(':') else {
        return;
    };
    let key = raw_key.trim().to_lowercase().replace(' ', "_");
    if key.is_empty() {
        return;
    }
    let raw_value = raw_value.trim().to_lowercase();

    let values: Vec<&str> = raw_value.split(" of ").collect();
    if values.len() == 2 {
        let pair: Vec<StatValue> = values.iter().map(|v| coerce_scalar(v)).collect();
        if key.contains("hashrate") && !stats.contains_key("hashrate") {
            let scaled: Vec<StatValue> = pair
                .iter()
                .map(|v| match v {
                    StatValue::Integer(n) => StatValue::Integer(n * 1024 * 1024),
                    StatValue::Float(f) => StatValue::Float(f * 1024.0 * 1024.0),
                    other => other.clone(),
                })
                .collect();
            stats.insert("hashrate".to_string(), StatValue::Pair(scaled));
        }
        stats.insert(key, StatValue::Pair(pair));
    } else {
        stats.insert(key, coerce_scalar(&raw_value));
    }
}

/// One miner as reported by the `miners` command.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MinerInfo {
    pub address: String,
    pub status: String,
    pub ip_and_port: String,
    pub in_out_bytes: (u64, u64),
    pub unpaid_shares: f64,
}

fn miner_index_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^C?[0-9]+\.$").expect("static regex"))
}

/// Streaming parser for `miners` output.
///
/// Two table shapes exist. The old output lists one row per miner. The new
/// output lists an `active` miner row followed by `C`-prefixed connection
/// rows that lose the miner's address, state and unpaid shares — those are
/// inherited from the preceding active row, and the unpaid shares are
/// attributed to the first connection only so the per-miner sum matches.
#[derive(Default)]
pub struct MinersParser {
    miners: Vec<MinerInfo>,
    last_miner: Option<Vec<String>>,
}

impl MinersParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, line: &str) {
        let mut fields: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if fields.len() != 6 {
            return;
        }
        if fields[0] == "-1." {
            return;
        }
        if !miner_index_re().is_match(&fields[0]) {
            return;
        }

        match self.last_miner.as_mut() {
            Some(last) if fields[0].starts_with('C') => {
                fields[1] = last[1].clone();
                fields[2] = last[2].clone();
                fields[5] = last[5].clone();
                // Count the unpaid shares only for the first connection row.
                last[5] = "0".to_string();
            }
            _ => self.last_miner = Some(fields.clone()),
        }

        // A disconnected miner in the new output loses its IP and byte
        // counters; substitute placeholders.
        if fields[2] != "active" && fields[3] == "-" {
            fields[3] = "0.0.0.0:0".to_string();
            fields[4] = "0/0".to_string();
        }

        // Active rows in the new output keep `-` in the IP column and are
        // superseded by their connection rows.
        if fields[3] != "-" {
            self.miners.push(MinerInfo {
                address: fields[1].clone(),
                status: fields[2].clone(),
                ip_and_port: fields[3].clone(),
                in_out_bytes: parse_pair(&fields[4]),
                unpaid_shares: fields[5].parse().unwrap_or(0.0),
            });
        }
    }

    pub fn finish(self) -> Vec<MinerInfo> {
        self.miners
    }
}
