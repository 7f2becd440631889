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

use grinpp_chain as chain;
use grinpp_core as core;
use grinpp_util as util;

use crate::chain::{BlockStatus, Chain, ChainIndex, ErrorKind, NoopAdapter, Options};
use crate::core::core::hash::Hashed;
use crate::core::core::verifier_cache::LruVerifierCache;
use crate::core::core::{Block, BlockHeader, OutputFeatures, Transaction};
use crate::core::libtx::{build, reward};
use crate::core::pow::Difficulty;
use crate::core::{consensus, genesis, global, pow};
use crate::util::secp::key::SecretKey;
use crate::util::RwLock;
use rand::thread_rng;
use std::fs;
use std::sync::Arc;

fn clean_output_dir(dir_name: &str) {
	let _ = fs::remove_dir_all(dir_name);
}

fn setup(dir_name: &str) -> Chain {
	util::init_test_logger();
	clean_output_dir(dir_name);
	global::set_local_chain_type(global::ChainTypes::AutomatedTesting);
	let genesis_block = genesis::genesis_dev();
	let verifier_cache = Arc::new(RwLock::new(LruVerifierCache::new()));
	Chain::init(
		dir_name.to_string(),
		Arc::new(NoopAdapter {}),
		genesis_block,
		pow::verify_size,
		verifier_cache,
	)
	.unwrap()
}

fn new_secret_key() -> SecretKey {
	let secp = util::static_secp_instance();
	let secp = secp.lock();
	SecretKey::new(&secp, &mut thread_rng())
}

// Build the next block on the provided header with the given txs, returning
// the block and the key of its coinbase output.
fn prepare_block_with_key(
	chain: &Chain,
	prev: &BlockHeader,
	txs: Vec<Transaction>,
	diff: u64,
) -> (Block, SecretKey) {
	let key = new_secret_key();
	let fees = txs.iter().map(|tx| tx.fee()).sum();
	let reward_output = reward::output(&key, fees).unwrap();
	let mut b = Block::new(prev, txs, Difficulty::from_num(diff), reward_output).unwrap();
	chain.set_txhashset_roots(&mut b).unwrap();
	(b, key)
}

fn prepare_block(chain: &Chain, prev: &BlockHeader, txs: Vec<Transaction>, diff: u64) -> Block {
	prepare_block_with_key(chain, prev, txs, diff).0
}

fn process(chain: &Chain, b: &Block) -> Result<BlockStatus, chain::Error> {
	chain.process_block(b.clone(), Options::SKIP_POW)
}

#[test]
fn mine_empty_chain() {
	let chain_dir = ".grinpp_mine_empty";
	let chain = setup(chain_dir);

	let mut prev = chain.head_header().unwrap();
	let mut hashes = vec![];
	for _ in 0..3 {
		let b = prepare_block(&chain, &prev, vec![], 3);
		hashes.push(b.hash());
		let status = process(&chain, &b).unwrap();
		assert_eq!(status, BlockStatus::Next);
		prev = b.header.clone();
	}

	// Confirmed tip is the last block mined.
	let head = chain.head().unwrap();
	assert_eq!(head.height, 3);
	assert_eq!(head.last_block_h, hashes[2]);

	// height index serves each block on the confirmed chain
	for (i, hash) in hashes.iter().enumerate() {
		let header = chain
			.get_header_by_height(ChainIndex::Confirmed, (i + 1) as u64)
			.unwrap();
		assert_eq!(header.hash(), *hash);
	}

	// candidate chain followed along
	let candidate = chain.tip(ChainIndex::Candidate).unwrap();
	assert_eq!(candidate.height, 3);

	clean_output_dir(chain_dir);
}

#[test]
fn mine_block_with_tx() {
	let chain_dir = ".grinpp_mine_with_tx";
	let chain = setup(chain_dir);

	let prev = chain.head_header().unwrap();
	let (b1, key1) = prepare_block_with_key(&chain, &prev, vec![], 3);
	process(&chain, &b1).unwrap();

	// Mine enough blocks for the coinbase in b1 to mature.
	let mut prev = b1.header.clone();
	for _ in 0..global::coinbase_maturity() {
		let b = prepare_block(&chain, &prev, vec![], 3);
		process(&chain, &b).unwrap();
		prev = b.header.clone();
	}

	// Now spend the matured coinbase.
	let out_key = new_secret_key();
	let tx = build::transaction_ext(
		vec![(consensus::REWARD, key1, OutputFeatures::Coinbase)],
		vec![(consensus::REWARD - 20_000, out_key)],
		20_000,
		0,
	)
	.unwrap();

	let b = prepare_block(&chain, &prev, vec![tx], 3);
	let status = process(&chain, &b).unwrap();
	assert_eq!(status, BlockStatus::Next);
	assert_eq!(chain.head().unwrap().height, prev.height + 1);

	clean_output_dir(chain_dir);
}

#[test]
fn spend_immature_coinbase_rejected() {
	let chain_dir = ".grinpp_immature_cb";
	let chain = setup(chain_dir);

	let prev = chain.head_header().unwrap();
	let (b1, key1) = prepare_block_with_key(&chain, &prev, vec![], 3);
	process(&chain, &b1).unwrap();

	// Attempt to spend the coinbase straight away.
	let out_key = new_secret_key();
	let tx = build::transaction_ext(
		vec![(consensus::REWARD, key1, OutputFeatures::Coinbase)],
		vec![(consensus::REWARD - 20_000, out_key)],
		20_000,
		0,
	)
	.unwrap();

	let b = prepare_block(&chain, &b1.header, vec![tx], 3);
	let res = process(&chain, &b);
	match res {
		Err(e) => match e.kind() {
			ErrorKind::ImmatureCoinbase => {}
			other => panic!("expected ImmatureCoinbase, got {:?}", other),
		},
		Ok(status) => panic!("expected rejection, got {:?}", status),
	}

	clean_output_dir(chain_dir);
}

#[test]
fn process_duplicate_block_is_known() {
	let chain_dir = ".grinpp_dup_block";
	let chain = setup(chain_dir);

	let prev = chain.head_header().unwrap();
	let b = prepare_block(&chain, &prev, vec![], 3);

	assert_eq!(process(&chain, &b).unwrap(), BlockStatus::Next);
	let head_before = chain.head().unwrap();

	// Adding the same block twice yields AlreadyKnown and no state change.
	assert_eq!(process(&chain, &b).unwrap(), BlockStatus::AlreadyKnown);
	assert_eq!(chain.head().unwrap(), head_before);

	clean_output_dir(chain_dir);
}

#[test]
fn orphan_is_cached_then_connected() {
	let chain_dir = ".grinpp_orphan";
	let aux_dir = ".grinpp_orphan_aux";
	let chain = setup(chain_dir);

	// Build a small chain on an auxiliary instance sharing the same genesis,
	// so we can feed the blocks to the main instance out of order.
	let aux = setup(aux_dir);
	let prev = aux.head_header().unwrap();
	let b1 = prepare_block(&aux, &prev, vec![], 3);
	process(&aux, &b1).unwrap();
	let b2 = prepare_block(&aux, &b1.header, vec![], 3);

	// b2 arrives before its parent: cached as an orphan
	assert_eq!(process(&chain, &b2).unwrap(), BlockStatus::Orphan);
	assert!(chain.is_orphan(&b2.hash()));
	assert_eq!(chain.head().unwrap().height, 0);

	// once b1 arrives both are connected
	assert_eq!(process(&chain, &b1).unwrap(), BlockStatus::Next);
	assert_eq!(chain.head().unwrap().height, 2);
	assert_eq!(chain.head().unwrap().last_block_h, b2.hash());
	assert!(!chain.is_orphan(&b2.hash()));

	clean_output_dir(aux_dir);
	clean_output_dir(chain_dir);
}

#[test]
fn mine_forks_and_reorg() {
	let chain_dir = ".grinpp_forks";
	let chain = setup(chain_dir);

	// mine a => b
	let a = prepare_block(&chain, &chain.head_header().unwrap(), vec![], 3);
	process(&chain, &a).unwrap();
	let b = prepare_block(&chain, &a.header, vec![], 3);
	process(&chain, &b).unwrap();
	assert_eq!(chain.head().unwrap().last_block_h, b.hash());

	// fork b' off a with equal work: stored as fork, head unchanged
	let b_fork = prepare_block(&chain, &a.header, vec![], 3);
	assert_eq!(process(&chain, &b_fork).unwrap(), BlockStatus::Fork);
	assert_eq!(chain.head().unwrap().last_block_h, b.hash());

	// extend the fork with c', now heavier: the head reorgs onto the fork
	let c_fork = prepare_block(&chain, &b_fork.header, vec![], 4);
	let status = process(&chain, &c_fork).unwrap();
	assert_eq!(status, BlockStatus::Reorg(1));
	assert_eq!(chain.head().unwrap().last_block_h, c_fork.hash());
	assert_eq!(chain.head().unwrap().height, 3);

	// the height index follows the reorg
	let h2 = chain
		.get_header_by_height(ChainIndex::Confirmed, 2)
		.unwrap();
	assert_eq!(h2.hash(), b_fork.hash());

	clean_output_dir(chain_dir);
}

#[test]
fn heavier_fork_wins_over_longer_chain() {
	let chain_dir = ".grinpp_heavy_fork";
	let chain = setup(chain_dir);

	// a => b => c at difficulty 3 each
	let a = prepare_block(&chain, &chain.head_header().unwrap(), vec![], 3);
	process(&chain, &a).unwrap();
	let b = prepare_block(&chain, &a.header, vec![], 3);
	process(&chain, &b).unwrap();
	let c = prepare_block(&chain, &b.header, vec![], 3);
	process(&chain, &c).unwrap();
	assert_eq!(chain.head().unwrap().height, 3);

	// b' off a carrying more total work than the whole a..c chain
	let b_heavy = prepare_block(&chain, &a.header, vec![], 100);
	let status = process(&chain, &b_heavy).unwrap();
	assert_eq!(status, BlockStatus::Reorg(2));
	let head = chain.head().unwrap();
	assert_eq!(head.height, 2);
	assert_eq!(head.last_block_h, b_heavy.hash());

	// a later block on the lighter chain is stored as a fork, head unchanged
	let d = prepare_block(&chain, &c.header, vec![], 3);
	assert_eq!(process(&chain, &d).unwrap(), BlockStatus::Fork);
	assert_eq!(chain.head().unwrap().last_block_h, b_heavy.hash());

	clean_output_dir(chain_dir);
}

#[test]
fn kernel_lock_height_boundary() {
	let chain_dir = ".grinpp_lock_height";
	let chain = setup(chain_dir);

	// mature a coinbase first
	let prev = chain.head_header().unwrap();
	let (b1, key1) = prepare_block_with_key(&chain, &prev, vec![], 3);
	process(&chain, &b1).unwrap();
	let mut prev = b1.header.clone();
	for _ in 0..global::coinbase_maturity() {
		let b = prepare_block(&chain, &prev, vec![], 3);
		process(&chain, &b).unwrap();
		prev = b.header.clone();
	}

	let next_height = prev.height + 1;

	// lock_height == block height: accepted
	let out_key = new_secret_key();
	let tx = build::transaction_ext(
		vec![(consensus::REWARD, key1.clone(), OutputFeatures::Coinbase)],
		vec![(consensus::REWARD - 20_000, out_key.clone())],
		20_000,
		next_height,
	)
	.unwrap();
	let b = prepare_block(&chain, &prev, vec![tx], 3);
	assert_eq!(process(&chain, &b).unwrap(), BlockStatus::Next);
	let prev = b.header.clone();

	// lock_height == block height + 1: rejected
	let tx = build::transaction_ext(
		vec![(consensus::REWARD - 20_000, out_key, OutputFeatures::Plain)],
		vec![(consensus::REWARD - 40_000, new_secret_key())],
		20_000,
		prev.height + 2,
	)
	.unwrap();
	let b = prepare_block(&chain, &prev, vec![tx], 3);
	assert!(process(&chain, &b).is_err());
	assert_eq!(chain.head().unwrap().last_block_h, prev.hash());

	clean_output_dir(chain_dir);
}

#[test]
fn status_reports_tips() {
	let chain_dir = ".grinpp_status";
	let chain = setup(chain_dir);

	let b = prepare_block(&chain, &chain.head_header().unwrap(), vec![], 3);
	process(&chain, &b).unwrap();

	let status = chain.status().unwrap();
	assert_eq!(status.confirmed_tip.height, 1);
	assert_eq!(status.candidate_tip.height, 1);
	assert_eq!(status.sync_phase, chain::SyncPhase::FullySynced);

	clean_output_dir(chain_dir);
}
