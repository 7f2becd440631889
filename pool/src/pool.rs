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

//! A single sub-pool of transactions: ordered entries with their Dandelion
//! status, validated as one big aggregate against the chain state.

use crate::core::core::hash::{Hash, Hashed};
use crate::core::core::id::{ShortId, ShortIdentifiable};
use crate::core::core::verifier_cache::VerifierCache;
use crate::core::core::{transaction, Block, Transaction, TxKernel, Weighting};
use crate::types::{BlockChain, PoolEntry, PoolError};
use crate::util::secp::pedersen::Commitment;
use crate::util::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

/// An unordered collection of valid transactions, all consistent with each
/// other and the current chain state (the aggregate of all entries is itself
/// a valid transaction).
pub struct Pool {
	/// Entries in the pool (tx + info + timer) in insertion order.
	pub entries: Vec<PoolEntry>,
	/// The blockchain
	pub blockchain: Arc<dyn BlockChain>,
	/// Cache of previously verified rangeproofs and kernel signatures.
	pub verifier_cache: Arc<RwLock<dyn VerifierCache>>,
	/// Pool name for logging.
	pub name: String,
}

impl Pool {
	/// Build a new pool backed by the provided chain.
	pub fn new(
		chain: Arc<dyn BlockChain>,
		verifier_cache: Arc<RwLock<dyn VerifierCache>>,
		name: String,
	) -> Pool {
		Pool {
			entries: vec![],
			blockchain: chain,
			verifier_cache,
			name,
		}
	}

	/// Does the pool contain this transaction?
	pub fn contains_tx(&self, hash: Hash) -> bool {
		self.entries.iter().any(|x| x.tx.hash() == hash)
	}

	/// Lookup a transaction in the pool by hash.
	pub fn get_tx(&self, hash: Hash) -> Option<Transaction> {
		self.entries
			.iter()
			.find(|x| x.tx.hash() == hash)
			.map(|x| x.tx.clone())
	}

	/// Query the tx pool for all known txs based on kernel short_ids
	/// from the provided compact_block.
	/// Note: does not validate that we return the full set of required txs.
	/// The caller will need to validate that themselves.
	pub fn retrieve_transactions(
		&self,
		hash: Hash,
		nonce: u64,
		kern_ids: &[ShortId],
	) -> (Vec<Transaction>, Vec<ShortId>) {
		let mut txs = vec![];
		let mut found_ids = vec![];

		// Rehash all entries in the pool using short_ids based on provided
		// hash and nonce.
		'outer: for x in &self.entries {
			for k in x.tx.kernels() {
				// rehash each kernel to calculate the block specific short_id
				let short_id = k.short_id(&hash, nonce);
				if kern_ids.contains(&short_id) {
					txs.push(x.tx.clone());
					found_ids.push(short_id);
				}
				if found_ids.len() == kern_ids.len() {
					break 'outer;
				}
			}
		}
		txs.dedup();
		(
			txs,
			kern_ids
				.iter()
				.filter(|id| !found_ids.contains(id))
				.cloned()
				.collect(),
		)
	}

	/// All transactions in this pool, in insertion order.
	pub fn all_transactions(&self) -> Vec<Transaction> {
		self.entries.iter().map(|x| x.tx.clone()).collect()
	}

	/// A single aggregate tx representing the entire pool, if the pool is
	/// not empty.
	pub fn all_transactions_aggregate(&self) -> Result<Option<Transaction>, PoolError> {
		let txs = self.all_transactions();
		if txs.is_empty() {
			return Ok(None);
		}
		let tx = transaction::aggregate(txs)?;
		Ok(Some(tx))
	}

	/// Add a new entry to the pool after validating the aggregate of
	/// everything already in the pool plus the new transaction. Double
	/// spends across pool entries surface as duplicate inputs failing the
	/// aggregate validation.
	pub fn add_to_pool(
		&mut self,
		entry: PoolEntry,
		extra_txs: Vec<Transaction>,
	) -> Result<(), PoolError> {
		// Combine all the txs from the pool, any extra txs provided and the
		// new entry into one big aggregate.
		let mut txs = self.all_transactions();
		txs.extend(extra_txs);
		txs.push(entry.tx.clone());

		let agg_tx = transaction::aggregate(txs)?;
		agg_tx.validate(Weighting::NoLimit, self.verifier_cache.clone())?;

		// Validate the aggregate against the current chain state: every
		// input spending a valid unspent output, no duplicate outputs.
		self.blockchain.validate_tx(&agg_tx)?;

		debug!(
			"add_to_pool [{}]: {} ({} entries)",
			self.name,
			entry.tx.hash(),
			self.entries.len() + 1,
		);
		self.entries.push(entry);

		Ok(())
	}

	/// Quick reconciliation step: evict any txs in the pool where inputs or
	/// kernels intersect with the block.
	pub fn reconcile_block(&mut self, block: &Block) {
		let block_inputs: HashSet<Commitment> =
			block.inputs().iter().map(|x| x.commitment()).collect();
		let block_kernels: HashSet<Hash> = block.kernels().iter().map(|x| x.hash()).collect();

		let before = self.entries.len();
		self.entries
			.retain(|x| !Pool::should_evict(&x.tx, &block_inputs, &block_kernels));
		let evicted = before - self.entries.len();
		if evicted > 0 {
			debug!(
				"reconcile_block [{}]: evicted {} of {} entries",
				self.name, evicted, before,
			);
		}
	}

	// A tx is evicted if any of its kernels appears in the block (it was
	// confirmed) or any of its inputs was spent by a different tx in the
	// block (it conflicts).
	fn should_evict(
		tx: &Transaction,
		block_inputs: &HashSet<Commitment>,
		block_kernels: &HashSet<Hash>,
	) -> bool {
		for kernel in tx.kernels() {
			if block_kernels.contains(&kernel.hash()) {
				return true;
			}
		}
		for input in tx.inputs() {
			if block_inputs.contains(&input.commitment()) {
				return true;
			}
		}
		false
	}

	/// All the kernels in the pool, useful for matching against compact
	/// blocks.
	pub fn kernels(&self) -> Vec<TxKernel> {
		self.entries
			.iter()
			.flat_map(|x| x.tx.kernels().clone())
			.collect()
	}

	/// Size of the pool in number of transactions.
	pub fn size(&self) -> usize {
		self.entries.len()
	}

	/// Whether the pool is empty.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Total weight of everything in the pool.
	pub fn total_weight(&self) -> u64 {
		self.entries
			.iter()
			.map(|x| x.tx.tx_weight_as_block())
			.sum()
	}
}
