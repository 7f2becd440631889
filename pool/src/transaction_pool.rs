// Copyright 2020 The GrinPP Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Transaction pool implementation leveraging the three sub-pools:
//! the mempool (broadcastable), the stempool (Dandelion stem phase) and the
//! joinpool (aggregation staging before a collective fluff).

use crate::core::core::hash::{Hash, Hashed};
use crate::core::core::id::ShortId;
use crate::core::core::verifier_cache::VerifierCache;
use crate::core::core::{transaction, Block, Transaction, Weighting};
use crate::pool::Pool;
use crate::types::{
	BlockChain, DandelionStatus, PoolAdapter, PoolConfig, PoolEntry, PoolError, PoolType,
	TxSource, DANDELION_EMBARGO_JITTER_SECS,
};
use crate::util::RwLock;
use chrono::prelude::Utc;
use chrono::Duration;
use rand::{thread_rng, Rng};
use std::sync::Arc;

/// Transaction pool implementation.
pub struct TransactionPool {
	/// Pool Config
	pub config: PoolConfig,
	/// The broadcastable transaction pool.
	pub mempool: Pool,
	/// The pool of transactions in their Dandelion stem phase.
	pub stempool: Pool,
	/// Aggregation staging area: transactions waiting to be joined into a
	/// single aggregate before relay.
	pub joinpool: Pool,
	/// The blockchain
	pub blockchain: Arc<dyn BlockChain>,
	/// Cache of previously verified rangeproofs and kernel signatures.
	pub verifier_cache: Arc<RwLock<dyn VerifierCache>>,
	/// The pool adapter
	pub adapter: Arc<dyn PoolAdapter>,
}

impl TransactionPool {
	/// Create a new transaction pool
	pub fn new(
		config: PoolConfig,
		chain: Arc<dyn BlockChain>,
		verifier_cache: Arc<RwLock<dyn VerifierCache>>,
		adapter: Arc<dyn PoolAdapter>,
	) -> TransactionPool {
		TransactionPool {
			config,
			mempool: Pool::new(chain.clone(), verifier_cache.clone(), "mempool".to_string()),
			stempool: Pool::new(chain.clone(), verifier_cache.clone(), "stempool".to_string()),
			joinpool: Pool::new(chain.clone(), verifier_cache.clone(), "joinpool".to_string()),
			blockchain: chain,
			verifier_cache,
			adapter,
		}
	}

	/// Does the pool contain this transaction in any of its sub-pools?
	pub fn contains_tx(&self, hash: Hash) -> bool {
		self.mempool.contains_tx(hash)
			|| self.stempool.contains_tx(hash)
			|| self.joinpool.contains_tx(hash)
	}

	/// Get the total size of the pool across all sub-pools.
	pub fn total_size(&self) -> usize {
		self.mempool.size() + self.stempool.size() + self.joinpool.size()
	}

	// Check this transaction is acceptable to the pool: capacity and
	// minimum relay fee based on its weight.
	fn is_acceptable(&self, tx: &Transaction) -> Result<(), PoolError> {
		if self.total_size() > self.config.max_pool_size {
			return Err(PoolError::OverCapacity);
		}

		if self.config.accept_fee_base > 0 {
			let threshold = tx.tx_weight().saturating_mul(self.config.accept_fee_base);
			if tx.fee() < threshold {
				return Err(PoolError::LowFeeTransaction(threshold));
			}
		}
		Ok(())
	}

	/// Add a new transaction to the pool.
	/// Validation of the tx is performed here: fee, lock heights, full
	/// transaction validation and a check against the current chain state.
	pub fn add_to_pool(
		&mut self,
		src: TxSource,
		tx: Transaction,
		pool_type: PoolType,
	) -> Result<(), PoolError> {
		// Quick check to deal with common case of seeing the *same* tx
		// broadcast from multiple peers simultaneously.
		if self.contains_tx(tx.hash()) {
			return Err(PoolError::DuplicateTx);
		}

		// Do we have the capacity to accept this transaction and does it pay
		// the minimum relay fee?
		self.is_acceptable(&tx)?;

		// Make sure the transaction is valid before anything else.
		tx.validate(Weighting::AsTransaction, self.verifier_cache.clone())
			.map_err(PoolError::InvalidTx)?;

		// Check the tx lock_height is less than or equal to the next block
		// height and any coinbase being spent has sufficiently matured.
		self.blockchain.verify_tx_lock_height(&tx)?;
		self.blockchain.verify_coinbase_maturity(&tx)?;

		let dandelion_status = match pool_type {
			PoolType::Mempool => DandelionStatus::Fluffed,
			PoolType::Stempool => {
				// Flip the stem coin: keep stemming with stem_probability,
				// otherwise fluff immediately.
				let random = thread_rng().gen_range(0, 100);
				if random < self.config.stem_probability {
					DandelionStatus::ToStem
				} else {
					DandelionStatus::ToFluff
				}
			}
			PoolType::Joinpool => DandelionStatus::ToFluff,
		};

		let entry = PoolEntry {
			dandelion_status,
			src,
			tx_at: Utc::now(),
			tx: tx.clone(),
		};

		match pool_type {
			PoolType::Mempool => {
				self.mempool.add_to_pool(entry, vec![])?;
				self.adapter.tx_accepted(&tx);
			}
			PoolType::Stempool => {
				// The stempool sits on top of the mempool: entries must be
				// consistent with everything already broadcastable.
				let extra_txs = self.mempool.all_transactions();
				self.stempool.add_to_pool(entry, extra_txs)?;
				if dandelion_status == DandelionStatus::ToStem {
					self.adapter.stem_tx_accepted(&tx)?;
				}
			}
			PoolType::Joinpool => {
				let extra_txs = self.mempool.all_transactions();
				self.joinpool.add_to_pool(entry, extra_txs)?;
			}
		}

		Ok(())
	}

	/// The joinpool "fluff" path: aggregate everything staged in the
	/// joinpool into a single multi-kernel transaction and move it to the
	/// stempool tagged ToFluff. Note it deliberately does not go straight
	/// into the mempool; it becomes Fluffed only once broadcast.
	pub fn fluff_joinpool(&mut self) -> Result<Option<Transaction>, PoolError> {
		let agg_tx = match self.joinpool.all_transactions_aggregate()? {
			Some(tx) => tx,
			None => return Ok(None),
		};

		agg_tx
			.validate(Weighting::AsTransaction, self.verifier_cache.clone())
			.map_err(PoolError::InvalidTx)?;

		let entry = PoolEntry {
			dandelion_status: DandelionStatus::ToFluff,
			src: TxSource {
				debug_name: "joinpool".to_string(),
				identifier: "?.?.?.?".to_string(),
			},
			tx_at: Utc::now(),
			tx: agg_tx.clone(),
		};

		let extra_txs = self.mempool.all_transactions();
		self.stempool.add_to_pool(entry, extra_txs)?;
		self.joinpool.entries.clear();

		Ok(Some(agg_tx))
	}

	/// Take all ToFluff entries out of the stempool and move them to the
	/// mempool as Fluffed, broadcastable transactions. Returns the moved
	/// transactions so the caller can broadcast them.
	pub fn fluff_stempool(&mut self) -> Result<Vec<Transaction>, PoolError> {
		let to_fluff: Vec<PoolEntry> = self
			.stempool
			.entries
			.iter()
			.filter(|x| x.dandelion_status == DandelionStatus::ToFluff)
			.cloned()
			.collect();

		let mut fluffed = vec![];
		for entry in to_fluff {
			let hash = entry.tx.hash();
			let mut entry = entry;
			entry.dandelion_status = DandelionStatus::Fluffed;
			self.mempool.add_to_pool(entry.clone(), vec![])?;
			self.stempool.entries.retain(|x| x.tx.hash() != hash);
			self.adapter.tx_accepted(&entry.tx);
			fluffed.push(entry.tx);
		}
		Ok(fluffed)
	}

	/// Mark the provided stem transaction as relayed to the next hop.
	pub fn mark_stemmed(&mut self, hash: Hash) {
		for entry in self
			.stempool
			.entries
			.iter_mut()
			.filter(|x| x.tx.hash() == hash)
		{
			entry.dandelion_status = DandelionStatus::Stemmed;
		}
	}

	/// Promote any stem entries older than the embargo (plus a random
	/// jitter) to ToFluff. Returns the promoted transactions.
	pub fn expire_embargoed(&mut self) -> Vec<Transaction> {
		let embargo_secs =
			self.config.dandelion_embargo_secs + thread_rng().gen_range(0, DANDELION_EMBARGO_JITTER_SECS);
		let cutoff = Utc::now() - Duration::seconds(embargo_secs as i64);

		let mut expired = vec![];
		for entry in self.stempool.entries.iter_mut() {
			let stem_phase = entry.dandelion_status == DandelionStatus::ToStem
				|| entry.dandelion_status == DandelionStatus::Stemmed;
			if stem_phase && entry.tx_at < cutoff {
				entry.dandelion_status = DandelionStatus::ToFluff;
				expired.push(entry.tx.clone());
			}
		}
		if !expired.is_empty() {
			debug!("expire_embargoed: promoted {} stem txs", expired.len());
		}
		expired
	}

	/// Reconcile the transaction pool (both txpool and stempool) against the
	/// provided block: evict anything confirmed or conflicted.
	pub fn reconcile_block(&mut self, block: &Block) -> Result<(), PoolError> {
		self.mempool.reconcile_block(block);
		self.stempool.reconcile_block(block);
		self.joinpool.reconcile_block(block);
		Ok(())
	}

	/// Retrieve individual transactions from the mempool based on kernel
	/// short_ids, used by compact block hydration. Returns the matched txs
	/// and any short_ids that went unmatched.
	pub fn retrieve_transactions(
		&self,
		block_hash: Hash,
		nonce: u64,
		kern_ids: &[ShortId],
	) -> (Vec<Transaction>, Vec<ShortId>) {
		self.mempool.retrieve_transactions(block_hash, nonce, kern_ids)
	}

	/// Returns a single aggregate tx representing the entire mempool, for
	/// block building.
	pub fn mempool_aggregate(&self) -> Result<Option<Transaction>, PoolError> {
		self.mempool.all_transactions_aggregate()
	}

	/// All broadcastable transactions, for block building.
	pub fn prepare_mineable_transactions(&self) -> Result<Vec<Transaction>, PoolError> {
		let txs = self.mempool.all_transactions();
		// The aggregate of everything we hand to the miner must itself be a
		// valid (weight-limited) transaction.
		if !txs.is_empty() {
			let agg = transaction::aggregate(txs.clone())?;
			agg.validate(Weighting::AsBlock, self.verifier_cache.clone())
				.map_err(PoolError::InvalidTx)?;
		}
		Ok(txs)
	}
}
