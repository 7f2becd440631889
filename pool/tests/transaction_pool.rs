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

use grinpp_core as core;
use grinpp_pool as pool;
use grinpp_util as util;

use crate::core::core::hash::Hashed;
use crate::core::core::id::ShortIdentifiable;
use crate::core::core::verifier_cache::{LruVerifierCache, VerifierCache};
use crate::core::core::{Block, BlockHeader, Transaction};
use crate::core::libtx::build;
use crate::core::{consensus, global};
use crate::pool::{
	BlockChain, DandelionStatus, NoopPoolAdapter, PoolConfig, PoolError, PoolType,
	TransactionPool, TxSource,
};
use crate::util::secp::key::SecretKey;
use crate::util::secp::pedersen::Commitment;
use crate::util::RwLock;
use chrono::Duration;
use rand::thread_rng;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone)]
struct MockChain {
	inner: Arc<RwLock<MockChainInner>>,
}

struct MockChainInner {
	head: BlockHeader,
	utxo: HashSet<Commitment>,
}

impl MockChain {
	fn new(height: u64) -> MockChain {
		let mut head = BlockHeader::default();
		head.height = height;
		MockChain {
			inner: Arc::new(RwLock::new(MockChainInner {
				head,
				utxo: HashSet::new(),
			})),
		}
	}

	fn add_utxo(&self, commit: Commitment) {
		self.inner.write().utxo.insert(commit);
	}
}

impl BlockChain for MockChain {
	fn chain_head(&self) -> Result<BlockHeader, PoolError> {
		Ok(self.inner.read().head.clone())
	}

	fn validate_tx(&self, tx: &Transaction) -> Result<(), PoolError> {
		let inner = self.inner.read();
		for input in tx.inputs() {
			if !inner.utxo.contains(&input.commitment()) {
				return Err(PoolError::InvalidAgainstChain);
			}
		}
		for output in tx.outputs() {
			if inner.utxo.contains(&output.commitment()) {
				return Err(PoolError::InvalidAgainstChain);
			}
		}
		Ok(())
	}

	fn verify_coinbase_maturity(&self, _tx: &Transaction) -> Result<(), PoolError> {
		Ok(())
	}

	fn verify_tx_lock_height(&self, tx: &Transaction) -> Result<(), PoolError> {
		let head = self.chain_head()?;
		if tx.lock_height() <= head.height + 1 {
			Ok(())
		} else {
			Err(PoolError::ImmatureTransaction)
		}
	}
}

fn new_secret_key() -> SecretKey {
	let secp = util::static_secp_instance();
	let secp = secp.lock();
	SecretKey::new(&secp, &mut thread_rng())
}

fn commit(value: u64, key: &SecretKey) -> Commitment {
	let secp = util::static_secp_instance();
	let secp = secp.lock();
	secp.commit(value, key.clone()).unwrap()
}

const INPUT_VALUE: u64 = 100 * consensus::GRIN_BASE;
const FEE: u64 = 50_000_000;

// Builds a valid transaction spending a fresh (value, key) input registered
// in the mock chain utxo set.
fn valid_tx(chain: &MockChain) -> Transaction {
	let in_key = new_secret_key();
	chain.add_utxo(commit(INPUT_VALUE, &in_key));
	build::transaction(
		vec![(INPUT_VALUE, in_key)],
		vec![(INPUT_VALUE - FEE, new_secret_key())],
		FEE,
	)
	.unwrap()
}

fn test_setup(chain: &MockChain, config: PoolConfig) -> TransactionPool {
	global::set_local_chain_type(global::ChainTypes::AutomatedTesting);
	let verifier_cache: Arc<RwLock<dyn VerifierCache>> =
		Arc::new(RwLock::new(LruVerifierCache::new()));
	TransactionPool::new(
		config,
		Arc::new(chain.clone()),
		verifier_cache,
		Arc::new(NoopPoolAdapter {}),
	)
}

#[test]
fn add_to_mempool() {
	let chain = MockChain::new(10);
	let mut pool = test_setup(&chain, PoolConfig::default());

	let tx = valid_tx(&chain);
	pool.add_to_pool(TxSource::unknown(), tx.clone(), PoolType::Mempool)
		.unwrap();

	assert_eq!(pool.total_size(), 1);
	assert_eq!(
		pool.mempool.entries[0].dandelion_status,
		DandelionStatus::Fluffed
	);
	assert!(pool.contains_tx(tx.hash()));
}

#[test]
fn duplicate_tx_rejected() {
	let chain = MockChain::new(10);
	let mut pool = test_setup(&chain, PoolConfig::default());

	let tx = valid_tx(&chain);
	pool.add_to_pool(TxSource::unknown(), tx.clone(), PoolType::Mempool)
		.unwrap();
	assert_eq!(
		pool.add_to_pool(TxSource::unknown(), tx, PoolType::Mempool),
		Err(PoolError::DuplicateTx)
	);
	assert_eq!(pool.total_size(), 1);
}

#[test]
fn low_fee_tx_rejected() {
	let chain = MockChain::new(10);
	let mut pool = test_setup(&chain, PoolConfig::default());

	let in_key = new_secret_key();
	chain.add_utxo(commit(INPUT_VALUE, &in_key));
	// fee of 1000 nanogrin is well below base fee times weight
	let tx = build::transaction(
		vec![(INPUT_VALUE, in_key)],
		vec![(INPUT_VALUE - 1000, new_secret_key())],
		1000,
	)
	.unwrap();

	match pool.add_to_pool(TxSource::unknown(), tx, PoolType::Mempool) {
		Err(PoolError::LowFeeTransaction(_)) => {}
		other => panic!("expected LowFeeTransaction, got {:?}", other),
	}
}

#[test]
fn future_lock_height_rejected() {
	let chain = MockChain::new(10);
	let mut pool = test_setup(&chain, PoolConfig::default());

	let in_key = new_secret_key();
	chain.add_utxo(commit(INPUT_VALUE, &in_key));
	// lock height 12 while the next block is 11
	let tx = build::transaction_with_lock_height(
		vec![(INPUT_VALUE, in_key)],
		vec![(INPUT_VALUE - FEE, new_secret_key())],
		FEE,
		12,
	)
	.unwrap();

	assert_eq!(
		pool.add_to_pool(TxSource::unknown(), tx, PoolType::Mempool),
		Err(PoolError::ImmatureTransaction)
	);

	// lock height 11 is acceptable for the next block
	let in_key = new_secret_key();
	chain.add_utxo(commit(INPUT_VALUE, &in_key));
	let tx = build::transaction_with_lock_height(
		vec![(INPUT_VALUE, in_key)],
		vec![(INPUT_VALUE - FEE, new_secret_key())],
		FEE,
		11,
	)
	.unwrap();
	pool.add_to_pool(TxSource::unknown(), tx, PoolType::Mempool)
		.unwrap();
}

#[test]
fn double_spend_across_pool_entries_rejected() {
	let chain = MockChain::new(10);
	let mut pool = test_setup(&chain, PoolConfig::default());

	let in_key = new_secret_key();
	chain.add_utxo(commit(INPUT_VALUE, &in_key));

	let tx1 = build::transaction(
		vec![(INPUT_VALUE, in_key.clone())],
		vec![(INPUT_VALUE - FEE, new_secret_key())],
		FEE,
	)
	.unwrap();
	// spends the same input to a different output
	let tx2 = build::transaction(
		vec![(INPUT_VALUE, in_key)],
		vec![(INPUT_VALUE - FEE, new_secret_key())],
		FEE,
	)
	.unwrap();

	pool.add_to_pool(TxSource::unknown(), tx1, PoolType::Mempool)
		.unwrap();
	assert!(pool
		.add_to_pool(TxSource::unknown(), tx2, PoolType::Mempool)
		.is_err());
	assert_eq!(pool.total_size(), 1);
}

#[test]
fn stem_coin_flip() {
	let chain = MockChain::new(10);

	// always stem
	let mut config = PoolConfig::default();
	config.stem_probability = 100;
	let mut pool = test_setup(&chain, config);
	let tx = valid_tx(&chain);
	pool.add_to_pool(TxSource::unknown(), tx, PoolType::Stempool)
		.unwrap();
	assert_eq!(
		pool.stempool.entries[0].dandelion_status,
		DandelionStatus::ToStem
	);

	// never stem
	let mut config = PoolConfig::default();
	config.stem_probability = 0;
	let mut pool = test_setup(&chain, config);
	let tx = valid_tx(&chain);
	pool.add_to_pool(TxSource::unknown(), tx, PoolType::Stempool)
		.unwrap();
	assert_eq!(
		pool.stempool.entries[0].dandelion_status,
		DandelionStatus::ToFluff
	);
}

#[test]
fn joinpool_fluff_goes_via_stempool() {
	let chain = MockChain::new(10);
	let mut pool = test_setup(&chain, PoolConfig::default());

	let tx1 = valid_tx(&chain);
	let tx2 = valid_tx(&chain);
	pool.add_to_pool(TxSource::unknown(), tx1, PoolType::Joinpool)
		.unwrap();
	pool.add_to_pool(TxSource::unknown(), tx2, PoolType::Joinpool)
		.unwrap();
	assert_eq!(pool.joinpool.size(), 2);

	// The joinpool aggregate lands in the stempool as a single ToFluff
	// entry, not in the mempool.
	let agg = pool.fluff_joinpool().unwrap().unwrap();
	assert_eq!(agg.kernels().len(), 2);
	assert_eq!(pool.joinpool.size(), 0);
	assert_eq!(pool.mempool.size(), 0);
	assert_eq!(pool.stempool.size(), 1);
	assert_eq!(
		pool.stempool.entries[0].dandelion_status,
		DandelionStatus::ToFluff
	);

	// Fluffing the stempool moves it to the mempool as broadcastable.
	let fluffed = pool.fluff_stempool().unwrap();
	assert_eq!(fluffed.len(), 1);
	assert_eq!(pool.stempool.size(), 0);
	assert_eq!(pool.mempool.size(), 1);
	assert_eq!(
		pool.mempool.entries[0].dandelion_status,
		DandelionStatus::Fluffed
	);
}

#[test]
fn embargo_expiry_promotes_to_fluff() {
	let chain = MockChain::new(10);
	let mut config = PoolConfig::default();
	config.stem_probability = 100;
	let mut pool = test_setup(&chain, config);

	let tx = valid_tx(&chain);
	pool.add_to_pool(TxSource::unknown(), tx, PoolType::Stempool)
		.unwrap();
	assert_eq!(
		pool.stempool.entries[0].dandelion_status,
		DandelionStatus::ToStem
	);

	// nothing expires while the entry is fresh
	assert!(pool.expire_embargoed().is_empty());

	// backdate the entry beyond the embargo (plus max jitter)
	pool.stempool.entries[0].tx_at =
		chrono::Utc::now() - Duration::seconds(60 * 60);
	let expired = pool.expire_embargoed();
	assert_eq!(expired.len(), 1);
	assert_eq!(
		pool.stempool.entries[0].dandelion_status,
		DandelionStatus::ToFluff
	);
}

#[test]
fn reconcile_block_evicts_confirmed_and_conflicting() {
	let chain = MockChain::new(10);
	let mut pool = test_setup(&chain, PoolConfig::default());

	let tx1 = valid_tx(&chain);
	let tx2 = valid_tx(&chain);
	pool.add_to_pool(TxSource::unknown(), tx1.clone(), PoolType::Mempool)
		.unwrap();
	pool.add_to_pool(TxSource::unknown(), tx2.clone(), PoolType::Mempool)
		.unwrap();
	assert_eq!(pool.mempool.size(), 2);

	// build a block carrying tx1 (its kernel shows up in the block body)
	let mut block = Block::default();
	block.body = tx1.body.clone();
	pool.reconcile_block(&block).unwrap();

	assert_eq!(pool.mempool.size(), 1);
	assert!(pool.contains_tx(tx2.hash()));
	assert!(!pool.contains_tx(tx1.hash()));
}

#[test]
fn retrieve_transactions_by_short_id() {
	let chain = MockChain::new(10);
	let mut pool = test_setup(&chain, PoolConfig::default());

	let tx = valid_tx(&chain);
	pool.add_to_pool(TxSource::unknown(), tx.clone(), PoolType::Mempool)
		.unwrap();

	let block_hash = BlockHeader::default().hash();
	let nonce = 42;
	let kern_ids: Vec<_> = tx
		.kernels()
		.iter()
		.map(|k| k.short_id(&block_hash, nonce))
		.collect();

	let (found, missing) = pool.retrieve_transactions(block_hash, nonce, &kern_ids);
	assert_eq!(found.len(), 1);
	assert_eq!(found[0].hash(), tx.hash());
	assert!(missing.is_empty());

	// an unknown short id goes unmatched
	let bogus = vec![crate::core::core::ShortId::zero()];
	let (found, missing) = pool.retrieve_transactions(block_hash, nonce, &bogus);
	assert!(found.is_empty());
	assert_eq!(missing.len(), 1);
}
