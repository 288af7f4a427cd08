//! Parser for the daemon's `block` command output.
//!
//! The output is three sections — header properties, the block's own ledger
//! entries, and the address-level entries used to walk payout chains — each
//! with a fixed line grammar. Section headers advance a three-state scan;
//! a stream that never reaches the final section is malformed.
//!
//! Keys and values are lowercased and trimmed before storage. The daemon's
//! casing is inconsistent across versions, so case-insensitivity here is
//! intentional.

use oxpool_client::{ClientError, CommandTransport, NodeClient};
use oxpool_store::{AddressEntry, BlockStore, Direction, Payout, StoredBlock, Transfer};
use oxpool_types::{Amount, BlockHash, MinerAddress, Timestamp};
use regex::Regex;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlockError {
    /// The daemon reported that the block does not exist.
    #[error("block not found")]
    NotFound,

    /// The line stream never reached the terminal section.
    #[error("invalid block markup")]
    Malformed,

    #[error("node command failed: {0}")]
    Client(#[from] ClientError),

    #[error("storage error: {0}")]
    Store(#[from] oxpool_store::StoreError),
}

/// A parsed block: header properties, ledger entries, address entries and
/// (for fully paid-out main blocks) the resolved miner payouts.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block {
    properties: BTreeMap<String, String>,
    transactions: Vec<Transfer>,
    addresses: Vec<AddressEntry>,
    payouts: Vec<Payout>,
}

/// Flags value marking a consensus/reward-eligible main block.
const MAIN_BLOCK_FLAGS: &str = "1f";

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Properties,
    Transactions,
    Addresses,
}

fn property_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(.*): (.*)$").expect("static regex"))
}

fn transaction_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(fee|input|output|earning): ([a-zA-Z0-9/+]{32})\s*([0-9]*\.[0-9]*)")
            .expect("static regex")
    })
}

fn address_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(fee|input|output|earning): ([a-zA-Z0-9/+]{32})\s*([0-9]*\.[0-9]*)\s*(.*)$",
        )
        .expect("static regex")
    })
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

impl Block {
    /// Run the three-state scan over a `block` command line stream.
    pub fn parse<I>(lines: I) -> Result<Self, BlockError>
    where
        I: IntoIterator<Item = Result<String, ClientError>>,
    {
        let mut block = Block::default();
        let mut state = ScanState::Properties;

        for line in lines {
            let line = line?;
            match state {
                ScanState::Properties => {
                    if contains_ignore_case(&line, "block is not found") {
                        return Err(BlockError::NotFound);
                    }
                    if contains_ignore_case(&line, "block as transaction: details") {
                        state = ScanState::Transactions;
                        continue;
                    }
                    if let Some(caps) = property_re().captures(&line) {
                        let key = caps[1].trim().to_lowercase();
                        let raw_value = caps[2].trim().to_string();
                        let mut value = raw_value.to_lowercase();

                        // The balance line carries the block's own address
                        // before the amount; the address keeps its case.
                        if key == "balance" {
                            let mut parts = raw_value.split(' ');
                            if let Some(address) = parts.next() {
                                block
                                    .properties
                                    .insert("balance_address".to_string(), address.to_string());
                            }
                            if let Some(amount) = raw_value.split(' ').next_back() {
                                value = amount.to_lowercase();
                            }
                        }

                        block.properties.insert(key, value);
                    }
                }
                ScanState::Transactions => {
                    if contains_ignore_case(&line, "block as address: details") {
                        state = ScanState::Addresses;
                        continue;
                    }
                    if let Some(caps) = transaction_re().captures(&line) {
                        if let Some(transfer) = parse_transfer(&caps[1], &caps[2], &caps[3]) {
                            block.transactions.push(transfer);
                        }
                    }
                }
                ScanState::Addresses => {
                    if let Some(caps) = address_re().captures(&line) {
                        if let Some(transfer) = parse_transfer(&caps[1], &caps[2], &caps[3]) {
                            block.addresses.push(AddressEntry {
                                direction: transfer.direction,
                                address: transfer.address,
                                amount: transfer.amount,
                                time: caps[4].trim().to_lowercase(),
                            });
                        }
                    }
                }
            }
        }

        if state != ScanState::Addresses {
            return Err(BlockError::Malformed);
        }
        Ok(block)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn transactions(&self) -> &[Transfer] {
        &self.transactions
    }

    pub fn addresses(&self) -> &[AddressEntry] {
        &self.addresses
    }

    pub fn payouts(&self) -> &[Payout] {
        &self.payouts
    }

    /// The block's hash property, when well-formed.
    pub fn hash(&self) -> Option<BlockHash> {
        self.property("hash").and_then(|h| h.parse().ok())
    }

    /// The block's reported time, when well-formed.
    pub fn time(&self) -> Option<Timestamp> {
        self.property("time")
            .and_then(|t| Timestamp::parse_flexible(t).ok())
    }

    // The derived facts below are recomputed on every access, never cached.

    /// Whether the flags mark this as a main (reward-eligible) block.
    pub fn is_main_block(&self) -> bool {
        self.property("flags") == Some(MAIN_BLOCK_FLAGS)
    }

    /// Whether this main block carries its self-payment of the full reward.
    pub fn has_earning(&self, reward: Amount) -> bool {
        if self.addresses.is_empty() || !self.is_main_block() {
            return false;
        }
        self.addresses
            .iter()
            .any(|entry| entry.direction == Direction::Earning && entry.amount == reward)
    }

    /// Whether the reward has already been distributed onward: the block has
    /// its earning but the remaining on-chain balance dropped below it.
    pub fn is_paid_out(&self, reward: Amount) -> bool {
        if !self.has_earning(reward) {
            return false;
        }
        match self.property("balance").map(str::parse::<Amount>) {
            Some(Ok(balance)) => balance < reward,
            _ => false,
        }
    }

    /// Sum of the resolved payouts.
    pub fn payouts_sum(&self) -> Amount {
        self.payouts
            .iter()
            .fold(Amount::ZERO, |acc, p| acc.saturating_add(p.amount))
    }

    /// Resolve miner payouts for a paid-out main block.
    ///
    /// Walks an explicit worklist of the `output` address entries: each
    /// referenced block is fetched once and its own `output` transfers are
    /// copied as payouts, with the time inherited from the outer entry.
    /// Referenced blocks are not walked further, and a visited set makes
    /// cycles from malformed chains harmless. Entries that fail to resolve
    /// are skipped, never fatal.
    pub fn resolve_payouts<F>(&mut self, reward: Amount, mut fetch: F)
    where
        F: FnMut(&MinerAddress) -> Result<Block, BlockError>,
    {
        if !self.is_paid_out(reward) {
            return;
        }

        let mut worklist: VecDeque<(MinerAddress, String)> = self
            .addresses
            .iter()
            .filter(|entry| entry.direction == Direction::Output)
            .map(|entry| (entry.address.clone(), entry.time.clone()))
            .collect();
        let mut visited: HashSet<MinerAddress> = HashSet::new();

        while let Some((address, time)) = worklist.pop_front() {
            if !visited.insert(address.clone()) {
                continue;
            }
            let referenced = match fetch(&address) {
                Ok(block) => block,
                Err(e) => {
                    tracing::debug!(address = %address, error = %e, "skipping unresolvable payout block");
                    continue;
                }
            };
            for transfer in referenced
                .transactions
                .iter()
                .filter(|t| t.direction == Direction::Output)
            {
                self.payouts.push(Payout {
                    address: transfer.address.clone(),
                    time: time.clone(),
                    amount: transfer.amount,
                });
            }
        }
    }

    /// Convert to the persisted form. Partial persistence (the default for
    /// durable storage) drops the bulk per-transaction and per-address
    /// detail to bound storage growth.
    pub fn to_stored(&self, partial: bool) -> StoredBlock {
        StoredBlock {
            properties: self.properties.clone(),
            transactions: (!partial).then(|| self.transactions.clone()),
            addresses: (!partial).then(|| self.addresses.clone()),
            payouts: self.payouts.clone(),
        }
    }
}

fn parse_transfer(direction: &str, address: &str, amount: &str) -> Option<Transfer> {
    Some(Transfer {
        direction: direction.trim().to_lowercase().parse().ok()?,
        address: address.trim().parse().ok()?,
        amount: amount.trim().parse().ok()?,
    })
}

/// Fetch, parse and resolve one block through the node client; a resolved
/// paid-out main block is persisted (partial) keyed by its hash.
pub fn fetch_block<T, B>(
    client: &NodeClient<T>,
    blocks: &B,
    param: &str,
    reward: Amount,
) -> Result<Block, BlockError>
where
    T: CommandTransport,
    B: BlockStore,
{
    let mut block = Block::parse(client.block_lines(param)?)?;
    block.resolve_payouts(reward, |address| {
        Block::parse(client.block_lines(address.as_str())?)
    });

    if block.is_paid_out(reward) {
        let hash = block.hash().ok_or(BlockError::Malformed)?;
        blocks.save(&hash, &block.to_stored(true))?;
    }

    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "74c7e08b2e8f0700d47ef880779ecfeeae1f937a5f304e0a22ffd0d5e4406e56";
    const ADDR_A: &str = "gKNRtSL1pUaTpzMuPMznKw49ILtP6qX3";
    const ADDR_B: &str = "ab/cd+EF0123456789abcdefABCDEF01";
    const MINER_1: &str = "M1nerM1nerM1nerM1nerM1nerM1ner01";
    const MINER_2: &str = "M2nerM2nerM2nerM2nerM2nerM2ner02";

    fn reward() -> Amount {
        Amount::from_coins(1024)
    }

    fn lines(text: &str) -> Vec<Result<String, ClientError>> {
        text.lines().map(|l| Ok(l.to_string())).collect()
    }

    fn main_block_text(balance: &str) -> String {
        format!(
            "      time: 2024-01-01 00:00:00.866\n\
             timestamp: 16a6f7e8d99\n\
                 flags: 1f\n\
                 state: Main\n\
                  hash: {HASH}\n\
               balance: {ADDR_A} {balance}\n\
             -----------------------------------------------------------------------------------------\n\
                            block as transaction: details\n\
              direction  address                                    amount\n\
                   fee: {ADDR_B}           0.001000000\n\
             -----------------------------------------------------------------------------------------\n\
                            block as address: details\n\
              direction  address                                    amount      time\n\
                earning: {ADDR_A}        1024.000000000  2024-01-01 00:10:30.430\n\
                 output: {ADDR_B}        1023.000000000  2024-01-01 00:20:00.001\n"
        )
    }

    #[test]
    fn parses_properties_transactions_and_addresses() {
        let block = Block::parse(lines(&main_block_text("0.000000000"))).unwrap();

        assert_eq!(block.property("flags"), Some("1f"));
        assert_eq!(block.property("state"), Some("main"));
        assert_eq!(block.property("hash"), Some(HASH));
        // balance line splits into the block's address and the amount
        assert_eq!(block.property("balance_address"), Some(ADDR_A));
        assert_eq!(block.property("balance"), Some("0.000000000"));

        assert_eq!(block.transactions().len(), 1);
        assert_eq!(block.transactions()[0].direction, Direction::Fee);

        assert_eq!(block.addresses().len(), 2);
        assert_eq!(block.addresses()[0].direction, Direction::Earning);
        assert_eq!(block.addresses()[0].time, "2024-01-01 00:10:30.430");
    }

    #[test]
    fn not_found_line_is_its_own_error() {
        let result = Block::parse(lines("Block is not found.\n"));
        assert!(matches!(result, Err(BlockError::NotFound)));
    }

    #[test]
    fn stream_ending_early_is_malformed() {
        let result = Block::parse(lines("      time: 2024-01-01 00:00:00\n flags: 1f\n"));
        assert!(matches!(result, Err(BlockError::Malformed)));

        let result = Block::parse(lines(
            " flags: 1f\n   block as transaction: details\n fee: x 1.0\n",
        ));
        assert!(matches!(result, Err(BlockError::Malformed)));
    }

    #[test]
    fn main_block_predicates() {
        let block = Block::parse(lines(&main_block_text("0.000000000"))).unwrap();
        assert!(block.is_main_block());
        assert!(block.has_earning(reward()));
        assert!(block.is_paid_out(reward()));

        // full balance still on-chain: not paid out yet
        let unpaid = Block::parse(lines(&main_block_text("1024.000000000"))).unwrap();
        assert!(unpaid.has_earning(reward()));
        assert!(!unpaid.is_paid_out(reward()));
    }

    #[test]
    fn earning_must_match_the_configured_reward() {
        let block = Block::parse(lines(&main_block_text("0.000000000"))).unwrap();
        assert!(!block.has_earning(Amount::from_coins(512)));
    }

    #[test]
    fn non_main_block_has_no_earning() {
        let text = main_block_text("0.000000000").replace("flags: 1f", "flags: 02");
        let block = Block::parse(lines(&text)).unwrap();
        assert!(!block.is_main_block());
        assert!(!block.has_earning(reward()));
        assert!(!block.is_paid_out(reward()));
    }

    #[test]
    fn resolve_payouts_copies_output_transfers_with_inherited_time() {
        let mut block = Block::parse(lines(&main_block_text("0.000000000"))).unwrap();

        let inner_text = format!(
            " flags: 05\n\
              hash: {HASH}\n\
                block as transaction: details\n\
             output: {MINER_1}          1000.000000000\n\
             output: {MINER_2}            11.498000000\n\
              input: {ADDR_A}            1011.498000000\n\
                block as address: details\n"
        );
        let mut fetched: Vec<MinerAddress> = Vec::new();
        block.resolve_payouts(reward(), |address| {
            fetched.push(address.clone());
            Block::parse(lines(&inner_text))
        });

        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].as_str(), ADDR_B);

        let payouts = block.payouts();
        assert_eq!(payouts.len(), 2);
        assert_eq!(payouts[0].address.as_str(), MINER_1);
        // time inherited from the outer address entry, not the inner block
        assert_eq!(payouts[0].time, "2024-01-01 00:20:00.001");
        assert_eq!(
            block.payouts_sum(),
            "1011.498000000".parse::<Amount>().unwrap()
        );
    }

    #[test]
    fn resolve_payouts_skips_unresolvable_blocks() {
        let mut block = Block::parse(lines(&main_block_text("0.000000000"))).unwrap();
        block.resolve_payouts(reward(), |_| Err(BlockError::NotFound));
        assert!(block.payouts().is_empty());
    }

    #[test]
    fn resolve_payouts_fetches_each_address_once() {
        // Duplicate output entries (or a malformed cycle) must not refetch.
        let text = main_block_text("0.000000000")
            + &format!("  output: {ADDR_B}           1.000000000  2024-01-01 00:30:00.000\n");
        let mut block = Block::parse(lines(&text)).unwrap();

        let mut fetches = 0;
        block.resolve_payouts(reward(), |_| {
            fetches += 1;
            Err(BlockError::NotFound)
        });
        assert_eq!(fetches, 1);
    }

    #[test]
    fn skips_resolution_for_blocks_that_are_not_paid_out() {
        let mut block = Block::parse(lines(&main_block_text("1024.000000000"))).unwrap();
        let mut fetches = 0;
        block.resolve_payouts(reward(), |_| {
            fetches += 1;
            Err(BlockError::NotFound)
        });
        assert_eq!(fetches, 0);
        assert!(block.payouts().is_empty());
    }

    #[test]
    fn stored_form_drops_bulk_sections_when_partial() {
        let block = Block::parse(lines(&main_block_text("0.000000000"))).unwrap();

        let partial = block.to_stored(true);
        assert!(partial.transactions.is_none());
        assert!(partial.addresses.is_none());
        assert_eq!(partial.properties, *block.properties());

        let full = block.to_stored(false);
        assert_eq!(full.transactions.as_deref(), Some(block.transactions()));
        assert_eq!(full.addresses.as_deref(), Some(block.addresses()));
    }

    #[test]
    fn uppercase_daemon_output_is_folded() {
        let text = main_block_text("0.000000000")
            .replace("flags: 1f", "FLAGS: 1F")
            .replace("block as transaction", "BLOCK AS TRANSACTION")
            .replace("block as address", "BLOCK AS ADDRESS");
        let block = Block::parse(lines(&text)).unwrap();
        assert!(block.is_main_block());
    }
}
