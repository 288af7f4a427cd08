//! The account lifecycle engine.
//!
//! Owns the durable state of every tracked address and drives the
//! gather → inspect → validate/invalidate → export transitions. Every
//! record mutation is persisted before the loop moves on, so a crash
//! mid-pass loses nothing; the next invocation resumes from persisted
//! truth. Inter-process overlap is serialized by two lock domains: a
//! long-running inspect pass never blocks a concurrent gather, while
//! inspect and the export operations never run against each other.

use crate::block::{fetch_block, BlockError};
use crate::config::EngineConfig;
use crate::lock::{ExclusiveLock, GATHER_LOCK, PROCESS_LOCK};
use crate::EngineError;
use oxpool_client::{ClientError, CommandTransport, NodeClient};
use oxpool_store::{
    AccountFilter, AccountRecord, AccountStore, BlockStore, PoolStore, StoreError,
};
use oxpool_types::{Amount, Clock, MinerAddress, Timestamp};
use serde::Serialize;
use std::ops::ControlFlow;

/// Outcome of a gather pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GatherStats {
    /// Addresses listed by the node.
    pub listed: u64,
    /// New records created (pre-existing records are left untouched).
    pub created: u64,
}

/// Outcome of an inspect pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InspectStats {
    /// Records examined (after skip rules).
    pub inspected: u64,
    /// Records newly invalidated.
    pub invalidated: u64,
    /// Previously invalidated records restored.
    pub validated: u64,
}

/// Database summary counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub not_fully_inspected: u64,
    pub pending_export: u64,
    pub pending_invalidated_export: u64,
    pub has_hash: u64,
    pub invalidated: u64,
    pub total: u64,
}

/// The lifecycle engine over one storage backend and one node client.
pub struct AccountsEngine<'a, P: PoolStore, T: CommandTransport> {
    store: &'a P,
    client: &'a NodeClient<T>,
    clock: &'a dyn Clock,
    config: &'a EngineConfig,
}

impl<'a, P: PoolStore, T: CommandTransport> AccountsEngine<'a, P, T> {
    pub fn new(
        store: &'a P,
        client: &'a NodeClient<T>,
        clock: &'a dyn Clock,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            store,
            client,
            clock,
            config,
        }
    }

    /// List addresses from the node and create a New record for any address
    /// not already tracked. Idempotent: existing records are never touched.
    ///
    /// A fresh install (nothing tracked yet) seeds the configured extra
    /// accounts and forces an unbounded gather regardless of `all`.
    pub fn gather(&self, all: bool) -> Result<GatherStats, EngineError> {
        let _lock = ExclusiveLock::obtain(
            self.store.locks(),
            self.clock,
            GATHER_LOCK,
            self.config.lock_ttl_secs,
        )?;

        let fresh_install = self.store.accounts().count(AccountFilter::All)? == 0;
        if fresh_install {
            self.seed_extra_accounts()?;
        }

        let limit = if fresh_install || all {
            self.config.gather_unbounded_limit
        } else {
            self.config.gather_limit
        };

        let mut stats = GatherStats::default();
        for address in self.client.list_accounts(limit)? {
            let address = address?;
            stats.listed += 1;
            if self.store.accounts().exists(&address)? {
                continue;
            }
            self.store.accounts().insert(&AccountRecord::new(address))?;
            stats.created += 1;
        }

        tracing::info!(
            listed = stats.listed,
            created = stats.created,
            fresh_install,
            "gather finished"
        );
        Ok(stats)
    }

    fn seed_extra_accounts(&self) -> Result<(), EngineError> {
        for raw in &self.config.extra_accounts {
            let address: MinerAddress = match raw.parse() {
                Ok(address) => address,
                Err(_) => {
                    tracing::warn!(%raw, "skipping invalid extra account");
                    continue;
                }
            };
            match self.store.accounts().insert(&AccountRecord::new(address)) {
                Ok(()) | Err(StoreError::Duplicate(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Inspect pending records (or every record when `all`): fetch each
    /// address's block, derive its facts and advance the lifecycle fields.
    pub fn inspect(&self, all: bool) -> Result<InspectStats, EngineError> {
        let _lock = ExclusiveLock::obtain(
            self.store.locks(),
            self.clock,
            PROCESS_LOCK,
            self.config.lock_ttl_secs,
        )?;

        let filter = if all {
            AccountFilter::All
        } else {
            AccountFilter::PendingInspection
        };

        let mut stats = InspectStats::default();
        // Engine-level failures inside the visitor abort the pass; progress
        // persisted so far is kept.
        let mut failure: Option<EngineError> = None;

        self.store.accounts().for_each(filter, &mut |record| {
            match self.inspect_one(record, all, &mut stats) {
                Ok(()) => Ok(ControlFlow::Continue(())),
                Err(e) => {
                    failure = Some(e);
                    Ok(ControlFlow::Break(()))
                }
            }
        })?;

        if let Some(e) = failure {
            return Err(e);
        }

        tracing::info!(
            inspected = stats.inspected,
            invalidated = stats.invalidated,
            validated = stats.validated,
            all,
            "inspect finished"
        );
        Ok(stats)
    }

    fn inspect_one(
        &self,
        mut record: AccountRecord,
        all: bool,
        stats: &mut InspectStats,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();

        // Addresses stuck for longer than the cutoff were inspected enough;
        // stop spending daemon calls on them.
        if let Some(first) = record.first_inspected_at {
            if first.is_older_than(self.config.inspect_cutoff_secs(), now) {
                return Ok(());
            }
        }

        // A recently found block was already re-checked moments ago; give
        // the downstream payout process time to act before checking again.
        if !all {
            if let (Some(last), Some(found)) = (record.last_inspected_at, record.found_at) {
                if !last.is_older_than(self.config.inspect_backoff_secs, now)
                    && !found.is_older_than(self.config.recent_found_secs, now)
                {
                    return Ok(());
                }
            }
        }

        if record.first_inspected_at.is_none() {
            record.first_inspected_at = Some(now);
        }
        record.last_inspected_at = Some(now);
        stats.inspected += 1;

        let block = match fetch_block(
            self.client,
            self.store.blocks(),
            record.address.as_str(),
            self.config.reward,
        ) {
            Ok(block) => block,
            Err(BlockError::NotFound)
            | Err(BlockError::Client(ClientError::InvalidParameter(_))) => {
                self.invalidate(&mut record, now, stats)?;
                self.store.accounts().update(&record)?;
                return Ok(());
            }
            Err(BlockError::Malformed) => {
                // A hard failure of this inspection attempt only.
                tracing::warn!(address = %record.address, "block markup was malformed, skipping");
                self.store.accounts().update(&record)?;
                return Ok(());
            }
            Err(BlockError::Client(e)) => return Err(e.into()),
            Err(BlockError::Store(e)) => return Err(e.into()),
        };

        if !block.has_earning(self.config.reward) {
            self.invalidate(&mut record, now, stats)?;
            self.store.accounts().update(&record)?;
            return Ok(());
        }

        if record.invalidated_at.is_some() {
            self.validate(&mut record, stats);
        }

        if !block.is_paid_out(self.config.reward) {
            self.store.accounts().update(&record)?;
            return Ok(());
        }

        record.inspected_times += 1;
        record.hash = block.hash();
        match block.time() {
            Some(found_at) => record.found_at = Some(found_at),
            None => {
                tracing::warn!(address = %record.address, "block time is unparseable, keeping previous found_at");
            }
        }

        let sum = block.payouts_sum();
        if sum != record.payouts_sum && record.exported_at.is_some() {
            // The payout data changed after export; force a re-export with
            // the corrected figures.
            record.exported_at = None;
        }
        record.payouts_sum = sum;
        record.fee_percent_guessed = fee_percent_guessed(self.config.reward, sum);

        self.store.accounts().update(&record)?;
        Ok(())
    }

    /// Mark a record invalidated. When nothing was ever exported for it, no
    /// retraction is owed downstream, so the retraction is pre-satisfied in
    /// the same step. The backing block record is deleted either way.
    fn invalidate(
        &self,
        record: &mut AccountRecord,
        now: Timestamp,
        stats: &mut InspectStats,
    ) -> Result<(), EngineError> {
        if record.invalidated_at.is_none() {
            record.invalidated_at = Some(now);
            if record.exported_at.is_none() {
                record.invalidated_exported_at = Some(now);
            }
            stats.invalidated += 1;
        }

        if let Some(hash) = record.hash.clone() {
            self.store.blocks().remove(&hash)?;
        }
        Ok(())
    }

    /// Restore a previously invalidated record whose block has its earning
    /// again. If the retraction was already emitted downstream, the record
    /// starts over from scratch so the block is announced afresh; if not,
    /// the prior progress still stands and only the invalidation is lifted.
    fn validate(&self, record: &mut AccountRecord, stats: &mut InspectStats) {
        if record.invalidated_exported_at.is_some() {
            record.hash = None;
            record.found_at = None;
            record.inspected_times = 0;
            record.exported_at = None;
        }
        record.invalidated_at = None;
        record.invalidated_exported_at = None;
        stats.validated += 1;
    }

    /// Emit the oldest confirmed found block: mark it exported and return
    /// the persisted block payload. `Ok(None)` when no candidate qualifies.
    pub fn export(&self) -> Result<Option<String>, EngineError> {
        let _lock = ExclusiveLock::obtain(
            self.store.locks(),
            self.clock,
            PROCESS_LOCK,
            self.config.lock_ttl_secs,
        )?;

        let mut candidate: Option<(MinerAddress, Option<Timestamp>)> = None;
        self.store
            .accounts()
            .for_each(AccountFilter::PendingExport, &mut |record| {
                let older = match &candidate {
                    None => true,
                    // Strictly older wins; ties keep the first encountered.
                    // A missing found_at sorts oldest.
                    Some((_, best)) => match (record.found_at, best) {
                        (Some(found), Some(best)) => found < *best,
                        (None, Some(_)) => true,
                        _ => false,
                    },
                };
                if older {
                    candidate = Some((record.address.clone(), record.found_at));
                }
                Ok(ControlFlow::Continue(()))
            })?;

        let Some((address, _)) = candidate else {
            return Ok(None);
        };

        let mut record = self.store.accounts().load(&address)?;
        let hash = record.hash.clone().ok_or_else(|| {
            StoreError::Corruption(format!("export candidate {address} has no hash"))
        })?;
        let block = self.store.blocks().load(&hash)?;
        let payload = serde_json::to_string_pretty(&block)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        record.exported_at = Some(self.clock.now());
        self.store.accounts().update(&record)?;

        tracing::info!(address = %address, hash = %hash, "exported found block");
        Ok(Some(payload))
    }

    /// Emit one retraction notice for an invalidated, previously announced
    /// block. `Ok(None)` when no retraction is owed.
    pub fn export_invalidated(&self) -> Result<Option<String>, EngineError> {
        let _lock = ExclusiveLock::obtain(
            self.store.locks(),
            self.clock,
            PROCESS_LOCK,
            self.config.lock_ttl_secs,
        )?;

        let mut candidate: Option<AccountRecord> = None;
        self.store
            .accounts()
            .for_each(AccountFilter::PendingRetraction, &mut |record| {
                candidate = Some(record);
                Ok(ControlFlow::Break(()))
            })?;

        let Some(mut record) = candidate else {
            return Ok(None);
        };
        let hash = record.hash.clone().ok_or_else(|| {
            StoreError::Corruption(format!("retraction candidate {} has no hash", record.address))
        })?;

        record.invalidated_exported_at = Some(self.clock.now());
        self.store.accounts().update(&record)?;

        let notice = serde_json::json!({ "invalidateBlock": hash.as_str() });
        tracing::info!(address = %record.address, hash = %hash, "exported invalidated block");
        Ok(Some(notice.to_string()))
    }

    /// Clear `exported_at` on every exported, still-valid record so export
    /// calls emit them again. Operational tooling, not part of the cadence.
    pub fn reset_export(&self) -> Result<u64, EngineError> {
        self.reset(AccountFilter::Exported, |record| record.exported_at = None)
    }

    /// Clear `invalidated_exported_at` on every retracted record.
    pub fn reset_export_invalidated(&self) -> Result<u64, EngineError> {
        self.reset(AccountFilter::RetractionSent, |record| {
            record.invalidated_exported_at = None
        })
    }

    fn reset(
        &self,
        filter: AccountFilter,
        clear: impl Fn(&mut AccountRecord),
    ) -> Result<u64, EngineError> {
        let _lock = ExclusiveLock::obtain(
            self.store.locks(),
            self.clock,
            PROCESS_LOCK,
            self.config.lock_ttl_secs,
        )?;

        let mut cleared = 0u64;
        self.store.accounts().for_each(filter, &mut |mut record| {
            clear(&mut record);
            self.store.accounts().update(&record)?;
            cleared += 1;
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(cleared)
    }

    /// Counts of the tracked records by lifecycle predicate.
    pub fn summary(&self) -> Result<Summary, EngineError> {
        let accounts = self.store.accounts();
        Ok(Summary {
            not_fully_inspected: accounts.count(AccountFilter::PendingInspection)?,
            pending_export: accounts.count(AccountFilter::PendingExport)?,
            pending_invalidated_export: accounts.count(AccountFilter::PendingRetraction)?,
            has_hash: accounts.count(AccountFilter::HasHash)?,
            invalidated: accounts.count(AccountFilter::Invalidated)?,
            total: accounts.count(AccountFilter::All)?,
        })
    }

    /// Delete all tracked state and start fresh. Debug tooling.
    pub fn truncate(&self) -> Result<(), EngineError> {
        let _lock = ExclusiveLock::obtain(
            self.store.locks(),
            self.clock,
            PROCESS_LOCK,
            self.config.lock_ttl_secs,
        )?;
        self.store.accounts().truncate()?;
        self.store.blocks().truncate()?;
        tracing::info!("tracked state deleted");
        Ok(())
    }
}

/// Estimated pool fee in percent, rounded to three decimals.
///
/// An estimate only: a single payout transaction can bundle fees from
/// multiple blocks, so a sum of zero or one exceeding the reward makes the
/// figure meaningless — those yield `None`.
fn fee_percent_guessed(reward: Amount, payouts_sum: Amount) -> Option<f64> {
    if reward.is_zero() || payouts_sum.is_zero() || payouts_sum > reward {
        return None;
    }
    let percent =
        (reward.as_coins_f64() - payouts_sum.as_coins_f64()) / reward.as_coins_f64() * 100.0;
    Some((percent * 1000.0).round() / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_percent_rounds_to_three_decimals() {
        let reward = Amount::from_coins(1024);
        let sum: Amount = "1011.498000000".parse().unwrap();
        assert_eq!(fee_percent_guessed(reward, sum), Some(1.221));
    }

    #[test]
    fn fee_percent_is_inconclusive_for_zero_or_excess_sums() {
        let reward = Amount::from_coins(1024);
        assert_eq!(fee_percent_guessed(reward, Amount::ZERO), None);
        assert_eq!(
            fee_percent_guessed(reward, "1025.000000000".parse().unwrap()),
            None
        );
        assert_eq!(fee_percent_guessed(Amount::ZERO, Amount::ZERO), None);
    }

    #[test]
    fn fee_percent_full_sum_means_zero_fee() {
        let reward = Amount::from_coins(1024);
        assert_eq!(fee_percent_guessed(reward, reward), Some(0.0));
    }
}
