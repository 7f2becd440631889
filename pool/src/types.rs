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

//! The primary types used in the transaction pool.

use crate::core::core::transaction::{self, Transaction};
use crate::core::core::BlockHeader;
use chrono::prelude::{DateTime, Utc};
use failure::Fail;

/// Base fee, in nanogrin, charged per unit of transaction weight for the
/// transaction to be accepted for relay.
pub const DEFAULT_ACCEPT_FEE_BASE: u64 = 1_000_000;

/// Probability (in percent) of a stem transaction being forwarded another
/// hop rather than fluffed.
pub const DEFAULT_STEM_PROBABILITY: u64 = 90;

/// How long a stem transaction is kept in its stem phase before the embargo
/// expires and it gets fluffed regardless, in seconds. A random jitter is
/// added on top so nodes don't fluff in lockstep.
pub const DEFAULT_DANDELION_EMBARGO_SECS: u64 = 180;

/// Jitter range added to the embargo, in seconds.
pub const DANDELION_EMBARGO_JITTER_SECS: u64 = 30;

/// Maximum number of transactions kept across the pools.
pub const DEFAULT_MAX_POOL_SIZE: usize = 50_000;

/// Transaction pool configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PoolConfig {
	/// Base fee for a transaction to be accepted by the pool. The transaction
	/// weight is computed from its number of inputs, outputs and kernels and
	/// multiplied by the base fee to compare to the actual fee.
	#[serde(default = "default_accept_fee_base")]
	pub accept_fee_base: u64,

	/// Maximum capacity of the pool in number of transactions
	#[serde(default = "default_max_pool_size")]
	pub max_pool_size: usize,

	/// Probability (in percent) for a stem transaction to keep stemming
	/// another hop instead of fluffing.
	#[serde(default = "default_stem_probability")]
	pub stem_probability: u64,

	/// Embargo timer in seconds after which a stem transaction is fluffed
	/// regardless.
	#[serde(default = "default_dandelion_embargo_secs")]
	pub dandelion_embargo_secs: u64,
}

impl Default for PoolConfig {
	fn default() -> PoolConfig {
		PoolConfig {
			accept_fee_base: default_accept_fee_base(),
			max_pool_size: default_max_pool_size(),
			stem_probability: default_stem_probability(),
			dandelion_embargo_secs: default_dandelion_embargo_secs(),
		}
	}
}

fn default_accept_fee_base() -> u64 {
	DEFAULT_ACCEPT_FEE_BASE
}
fn default_max_pool_size() -> usize {
	DEFAULT_MAX_POOL_SIZE
}
fn default_stem_probability() -> u64 {
	DEFAULT_STEM_PROBABILITY
}
fn default_dandelion_embargo_secs() -> u64 {
	DEFAULT_DANDELION_EMBARGO_SECS
}

/// The Dandelion relay status of a pool entry.
///
/// The state machine, as implemented by the original node:
///
/// ```text
///   add(Stempool) --90%--> ToStem --relayed--> Stemmed
///        |                    |
///        +-------10%----------+--embargo expired / fluff decision
///        |                    |
///        v                    v
///     ToFluff --broadcast--> Fluffed          add(Mempool) --> Fluffed
/// ```
///
/// Note the joinpool "fluff" path re-adds its aggregated transaction as
/// ToFluff (in the stempool) rather than injecting it into the mempool
/// directly; it only becomes Fluffed once broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DandelionStatus {
	/// Tx to be sent to the next Dandelion relay.
	ToStem,
	/// Tx previously sent to a Dandelion relay, awaiting its embargo.
	Stemmed,
	/// Tx to be broadcast to the network.
	ToFluff,
	/// Tx broadcast to the network, in the mempool.
	Fluffed,
}

/// Which of the sub-pools a transaction is being added to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolType {
	/// The broadcastable mempool.
	Mempool,
	/// The Dandelion stempool.
	Stempool,
	/// The aggregation staging joinpool.
	Joinpool,
}

/// A single (possibly aggregated) transaction in the pool.
#[derive(Clone, Debug)]
pub struct PoolEntry {
	/// The Dandelion relay status of this entry.
	pub dandelion_status: DandelionStatus,
	/// Info on where this tx originated (useful for testing).
	pub src: TxSource,
	/// Timestamp of when this tx was originally added to the pool.
	pub tx_at: DateTime<Utc>,
	/// The transaction itself.
	pub tx: Transaction,
}

/// Used to make decisions based on transaction acceptance priority from
/// various sources. For example, a node may want to bypass the size
/// restrictions of the transaction pool for transactions from the local
/// wallet.
#[derive(Clone, Debug)]
pub struct TxSource {
	/// Human-readable name used for logging and errors.
	pub debug_name: String,
	/// Unique identifier used to distinguish this peer from others.
	pub identifier: String,
}

impl TxSource {
	/// A pool entry of unspecified provenance.
	pub fn unknown() -> TxSource {
		TxSource {
			debug_name: "unknown".to_string(),
			identifier: "?.?.?.?".to_string(),
		}
	}
}

/// Possible errors when interacting with the transaction pool.
#[derive(Debug, Fail, PartialEq)]
pub enum PoolError {
	/// An invalid pool entry caused by underlying tx validation error
	#[fail(display = "Invalid Tx {}", _0)]
	InvalidTx(transaction::Error),
	/// Attempt to add a transaction to the pool with lock_height
	/// greater than height of current block
	#[fail(display = "Immature transaction")]
	ImmatureTransaction,
	/// Attempt to spend a coinbase output before it has sufficiently matured.
	#[fail(display = "Immature coinbase")]
	ImmatureCoinbase,
	/// Transaction pool is over capacity, can't accept more transactions
	#[fail(display = "Over capacity")]
	OverCapacity,
	/// Transaction fee is too low given its weight
	#[fail(display = "Low fee transaction {}", _0)]
	LowFeeTransaction(u64),
	/// Attempt to add a duplicate transaction to the pool.
	#[fail(display = "Duplicate tx")]
	DuplicateTx,
	/// The transaction conflicts with the current UTXO set or another pool
	/// entry (double spend, duplicate output).
	#[fail(display = "Invalid against current chain state")]
	InvalidAgainstChain,
	/// Other kinds of error (not yet pulled out into meaningful errors).
	#[fail(display = "General pool error {}", _0)]
	Other(String),
}

impl From<transaction::Error> for PoolError {
	fn from(e: transaction::Error) -> PoolError {
		PoolError::InvalidTx(e)
	}
}

/// Interface that the pool requires from a blockchain implementation.
pub trait BlockChain: Sync + Send {
	/// Get the header of the current confirmed chain tip.
	fn chain_head(&self) -> Result<BlockHeader, PoolError>;

	/// Validate a transaction against the current UTXO set: all inputs
	/// spending valid unspent outputs, no duplicate outputs.
	fn validate_tx(&self, tx: &Transaction) -> Result<(), PoolError>;

	/// Verify any coinbase outputs being spent have sufficiently matured.
	fn verify_coinbase_maturity(&self, tx: &Transaction) -> Result<(), PoolError>;

	/// Verify the tx contains no kernels with future-dated lock heights.
	fn verify_tx_lock_height(&self, tx: &Transaction) -> Result<(), PoolError>;
}

/// Bridge between the transaction pool and the rest of the system. Handles
/// downstream processing of valid transactions by the rest of the system,
/// most importantly the broadcasting of transactions to our peers.
pub trait PoolAdapter: Send + Sync {
	/// The transaction pool has accepted this transaction as valid.
	fn tx_accepted(&self, tx: &Transaction);
	/// The stem transaction pool has accepted this transaction as valid,
	/// it should be relayed to the next Dandelion hop.
	fn stem_tx_accepted(&self, tx: &Transaction) -> Result<(), PoolError>;
}

/// Dummy adapter used as a placeholder for real implementations
pub struct NoopPoolAdapter {}

impl PoolAdapter for NoopPoolAdapter {
	fn tx_accepted(&self, _tx: &Transaction) {}
	fn stem_tx_accepted(&self, _tx: &Transaction) -> Result<(), PoolError> {
		Ok(())
	}
}
