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

//! Facade and handler for the rest of the blockchain implementation
//! and mostly the chain pipeline.

use crate::core::core::hash::{Hash, Hashed};
use crate::core::core::merkle_proof::MerkleProof;
use crate::core::core::verifier_cache::VerifierCache;
use crate::core::core::{Block, BlockHeader, BlockSums, Committed, OutputIdentifier, Transaction};
use crate::core::global;
use crate::core::pow;
use crate::error::{Error, ErrorKind};
use crate::pipe;
use crate::store::{ChainStore, DifficultyIter};
use crate::txhashset;
use crate::types::{
	BlockStatus, ChainAdapter, ChainIndex, ChainStatus, Options, OutputLocation, SyncPhase, Tip,
};
use crate::util::secp::pedersen::Commitment;
use crate::util::{Mutex, RwLock};
use lru_cache::LruCache;
use std::sync::Arc;

/// Orphan pool size is limited by MAX_ORPHAN_SIZE
pub const MAX_ORPHAN_SIZE: usize = 128;

/// An orphan block with the options it arrived with, so processing can be
/// replayed once the parent arrives.
#[derive(Clone)]
struct Orphan {
	block: Block,
	opts: Options,
}

/// Bounded cache of orphan blocks keyed by the hash of their (currently
/// missing) parent. When two children of the same parent race, the last
/// one wins.
struct OrphanBlockPool {
	orphans: Mutex<LruCache<Hash, Orphan>>,
}

impl OrphanBlockPool {
	fn new() -> OrphanBlockPool {
		OrphanBlockPool {
			orphans: Mutex::new(LruCache::new(MAX_ORPHAN_SIZE)),
		}
	}

	fn len(&self) -> usize {
		self.orphans.lock().len()
	}

	fn add(&self, orphan: Orphan) {
		let mut orphans = self.orphans.lock();
		orphans.insert(orphan.block.header.prev_hash, orphan);
	}

	/// Remove and return the orphan waiting on the given parent hash.
	fn remove_by_parent(&self, parent_hash: &Hash) -> Option<Orphan> {
		let mut orphans = self.orphans.lock();
		orphans.remove(parent_hash)
	}

	fn contains(&self, hash: &Hash) -> bool {
		let mut orphans = self.orphans.lock();
		orphans
			.iter()
			.any(|(_, orphan)| orphan.block.hash() == *hash)
	}
}

/// Facade to the blockchain block processing pipeline and storage. Provides
/// the current view of the UTXO set according to the chain state. Also
/// maintains locking for the pipeline to avoid conflicting processing.
pub struct Chain {
	db_root: String,
	store: Arc<ChainStore>,
	adapter: Arc<dyn ChainAdapter + Send + Sync>,
	orphans: Arc<OrphanBlockPool>,
	txhashset: Arc<RwLock<txhashset::TxHashSet>>,
	pow_verifier: fn(&BlockHeader) -> Result<(), pow::Error>,
	verifier_cache: Arc<RwLock<dyn VerifierCache>>,
	genesis: BlockHeader,
}

impl Chain {
	/// Initializes the blockchain and returns a new Chain instance. Does a
	/// check on the current chain head to make sure it exists and creates one
	/// based on the genesis block if necessary.
	pub fn init(
		db_root: String,
		adapter: Arc<dyn ChainAdapter + Send + Sync>,
		genesis: Block,
		pow_verifier: fn(&BlockHeader) -> Result<(), pow::Error>,
		verifier_cache: Arc<RwLock<dyn VerifierCache>>,
	) -> Result<Chain, Error> {
		let store = Arc::new(ChainStore::new(&db_root)?);

		let mut txhashset = txhashset::TxHashSet::open(db_root.clone(), store.clone())?;

		setup_head(&genesis, &store, &mut txhashset)?;

		info!(
			"init: genesis block: {:?}, tip: {:?}",
			genesis.hash(),
			store.head()?,
		);

		Ok(Chain {
			db_root,
			store,
			adapter,
			orphans: Arc::new(OrphanBlockPool::new()),
			txhashset: Arc::new(RwLock::new(txhashset)),
			pow_verifier,
			verifier_cache,
			genesis: genesis.header,
		})
	}

	/// Attempt to add a new block to the chain.
	/// Returns the resulting status of the block: whether it advanced the
	/// confirmed chain, landed on a fork, is an orphan or was already known.
	/// Validation failures surface as errors; the offending block is dropped.
	pub fn process_block(&self, b: Block, opts: Options) -> Result<BlockStatus, Error> {
		let (status, maybe_new_head) = self.process_block_single(b.clone(), opts)?;
		if maybe_new_head.is_some() || status.is_accepted() {
			// We accepted a block, is there an orphan that can now be processed?
			self.check_orphans(&b.hash());
		}
		Ok(status)
	}

	// Attempt to add a new block to the chain, returning the status and the
	// new chain head if it was updated.
	fn process_block_single(
		&self,
		b: Block,
		opts: Options,
	) -> Result<(BlockStatus, Option<Tip>), Error> {
		let (prev_head, res) = {
			let mut txhashset = self.txhashset.write();
			let batch = self.store.batch()?;
			let mut ctx = pipe::BlockContext {
				opts,
				pow_verifier: self.pow_verifier,
				verifier_cache: self.verifier_cache.clone(),
				txhashset: &mut txhashset,
				batch,
			};

			let prev_head = ctx.batch.confirmed_tip()?;
			let res = pipe::process_block(&b, &mut ctx);

			if res.is_ok() {
				ctx.batch.commit()?;
			}

			// release the lock and let the batch go before post-processing
			(prev_head, res)
		};

		match res {
			Ok(maybe_new_head) => {
				let status = self.determine_status(&b, &prev_head, &maybe_new_head)?;
				self.adapter.block_accepted(&b, status.clone());
				Ok((status, maybe_new_head))
			}
			Err(e) => match e.kind() {
				ErrorKind::Orphan => {
					let block_hash = b.hash();
					let orphan = Orphan {
						block: b,
						opts,
					};
					self.orphans.add(orphan);
					debug!(
						"process_block: orphan: {:?}, # orphans {}",
						block_hash,
						self.orphans.len(),
					);
					Ok((BlockStatus::Orphan, None))
				}
				ErrorKind::AlreadyKnown => {
					debug!("process_block: already known: {}", b.hash());
					Ok((BlockStatus::AlreadyKnown, None))
				}
				_ => {
					info!(
						"process_block: rejected block {} at {}: {:?}",
						b.hash(),
						b.header.height,
						e.kind(),
					);
					Err(e)
				}
			},
		}
	}

	// Whether the block extended the head, landed on a fork or triggered a
	// reorg of the confirmed chain.
	fn determine_status(
		&self,
		b: &Block,
		prev_head: &Tip,
		maybe_new_head: &Option<Tip>,
	) -> Result<BlockStatus, Error> {
		match maybe_new_head {
			Some(_) => {
				if b.header.prev_hash == prev_head.last_block_h {
					Ok(BlockStatus::Next)
				} else {
					let batch = self.store.batch()?;
					let prev_head_header = batch.get_block_header(&prev_head.last_block_h)?;
					let fork_point = batch.find_common_ancestor(&prev_head_header, &b.header)?;
					let depth = prev_head.height.saturating_sub(fork_point.height);
					Ok(BlockStatus::Reorg(depth))
				}
			}
			None => Ok(BlockStatus::Fork),
		}
	}

	/// Attempt to add a new header to the candidate header chain.
	/// Only ever used during sync.
	pub fn process_block_header(
		&self,
		header: &BlockHeader,
		opts: Options,
	) -> Result<BlockStatus, Error> {
		let mut txhashset = self.txhashset.write();
		let batch = self.store.batch()?;
		let mut ctx = pipe::BlockContext {
			opts,
			pow_verifier: self.pow_verifier,
			verifier_cache: self.verifier_cache.clone(),
			txhashset: &mut txhashset,
			batch,
		};

		let res = pipe::process_block_header(header, &mut ctx);
		match res {
			Ok(_) => {
				ctx.batch.commit()?;
				Ok(BlockStatus::Next)
			}
			Err(e) => match e.kind() {
				ErrorKind::Orphan => Ok(BlockStatus::Orphan),
				ErrorKind::AlreadyKnown => Ok(BlockStatus::AlreadyKnown),
				_ => Err(e),
			},
		}
	}

	/// Check if hash is for a known orphan.
	pub fn is_orphan(&self, hash: &Hash) -> bool {
		self.orphans.contains(hash)
	}

	/// Number of orphans currently cached.
	pub fn orphans_len(&self) -> usize {
		self.orphans.len()
	}

	// Check for an orphan we can now process, after having accepted the
	// given block. Each resurrected orphan surfaces its own status via the
	// adapter; a failing orphan is simply dropped.
	fn check_orphans(&self, block_hash: &Hash) {
		let mut parent_hash = *block_hash;
		loop {
			let orphan = match self.orphans.remove_by_parent(&parent_hash) {
				Some(o) => o,
				None => break,
			};
			let orphan_hash = orphan.block.hash();
			match self.process_block_single(orphan.block, orphan.opts) {
				Ok((status, _)) if status.is_accepted() => {
					debug!("check_orphans: processed orphan {}", orphan_hash);
					parent_hash = orphan_hash;
				}
				_ => break,
			}
		}
	}

	/// The head of the confirmed chain.
	pub fn head(&self) -> Result<Tip, Error> {
		self.store.head()
	}

	/// The tip of the given chain index.
	pub fn tip(&self, chain: ChainIndex) -> Result<Tip, Error> {
		self.store.tip(chain)
	}

	/// Header of the confirmed chain head.
	pub fn head_header(&self) -> Result<BlockHeader, Error> {
		self.store.head_header()
	}

	/// Gets a block by hash.
	pub fn get_block(&self, h: &Hash) -> Result<Block, Error> {
		self.store.get_block(h)
	}

	/// Gets a block header by hash.
	pub fn get_block_header(&self, h: &Hash) -> Result<BlockHeader, Error> {
		self.store.get_block_header(h)
	}

	/// Gets the header at the provided height on the given chain index.
	pub fn get_header_by_height(
		&self,
		chain: ChainIndex,
		height: u64,
	) -> Result<BlockHeader, Error> {
		self.store.get_header_by_height(chain, height)
	}

	/// Gets the block at the provided height on the confirmed chain.
	pub fn get_block_by_height(&self, height: u64) -> Result<Block, Error> {
		let header = self
			.store
			.get_header_by_height(ChainIndex::Confirmed, height)?;
		self.store.get_block(&header.hash())
	}

	/// Gets the header of the block that created the provided output
	/// commitment, if the output is known (spent or unspent).
	pub fn get_header_by_commitment(
		&self,
		commit: &Commitment,
	) -> Result<BlockHeader, Error> {
		let location = self.store.get_output_pos(commit)?;
		self.store
			.get_header_by_height(ChainIndex::Confirmed, location.height)
	}

	/// Gets the block that created the provided output commitment.
	pub fn get_block_by_commitment(&self, commit: &Commitment) -> Result<Block, Error> {
		let header = self.get_header_by_commitment(commit)?;
		self.store.get_block(&header.hash())
	}

	/// The location of the output commitment in the output MMR, if it is
	/// known to the chain.
	pub fn get_output_pos(&self, commit: &Commitment) -> Result<OutputLocation, Error> {
		self.store.get_output_pos(commit)
	}

	/// Checks whether an output is unspent based on the current confirmed
	/// chain state.
	pub fn is_unspent(&self, output_ref: &OutputIdentifier) -> Result<(Hash, u64), Error> {
		let txhashset = self.txhashset.read();
		txhashset.is_unspent(output_ref)
	}

	/// Validate a transaction against the current (confirmed) UTXO set:
	/// all inputs spending valid unspent outputs, no duplicate outputs.
	pub fn validate_tx(&self, tx: &Transaction) -> Result<(), Error> {
		let txhashset = self.txhashset.read();
		txhashset::utxo_view(&txhashset, |utxo| utxo.validate_tx(tx))
	}

	/// Verify any coinbase outputs being spent by the transaction have
	/// sufficiently matured, against the next block height.
	pub fn verify_coinbase_maturity(&self, tx: &Transaction) -> Result<(), Error> {
		let height = self.next_block_height()?;
		let txhashset = self.txhashset.read();
		txhashset::utxo_view(&txhashset, |utxo| {
			utxo.verify_coinbase_maturity(tx.inputs(), height)
		})
	}

	/// Verify the tx contains no kernels with future-dated lock heights.
	pub fn verify_tx_lock_height(&self, tx: &Transaction) -> Result<(), Error> {
		let height = self.next_block_height()?;
		if tx.lock_height() <= height {
			Ok(())
		} else {
			Err(ErrorKind::TxLockHeight.into())
		}
	}

	fn next_block_height(&self) -> Result<u64, Error> {
		let bh = self.head_header()?;
		Ok(bh.height + 1)
	}

	/// The roots of the three MMRs as of the current confirmed state.
	pub fn get_txhashset_roots(&self) -> crate::types::TxHashSetRoots {
		let txhashset = self.txhashset.read();
		txhashset.roots()
	}

	/// Build a merkle proof for the given output commitment.
	pub fn get_merkle_proof_for_output(
		&self,
		commit: Commitment,
	) -> Result<MerkleProof, Error> {
		let mut txhashset = self.txhashset.write();
		txhashset.merkle_proof(commit)
	}

	/// Sets the txhashset roots on a brand new block by applying the block on
	/// the current txhashset state, then discarding the (in-memory) changes.
	/// The block may be built on any known full block, not just the current
	/// head: the state is rewound and the fork re-applied as necessary.
	pub fn set_txhashset_roots(&self, b: &mut Block) -> Result<(), Error> {
		let mut txhashset = self.txhashset.write();
		let (roots, sizes) = txhashset::extending_readonly(&mut txhashset, |extension| {
			let previous_header = extension.batch.get_block_header(&b.header.prev_hash)?;
			pipe::rewind_and_apply_fork(&previous_header, extension)?;
			extension.apply_block(b)?;
			Ok((extension.roots()?, extension.sizes()))
		})?;

		b.header.output_root = roots.output_root;
		b.header.range_proof_root = roots.rproof_root;
		b.header.kernel_root = roots.kernel_root;
		b.header.output_mmr_size = sizes.0;
		b.header.kernel_mmr_size = sizes.2;
		Ok(())
	}

	/// Compact the chain: remove spent outputs from the MMR data files past
	/// the horizon and delete full blocks beyond it.
	pub fn compact(&self) -> Result<(), Error> {
		let mut txhashset = self.txhashset.write();
		let batch = self.store.batch()?;

		txhashset.compact(&batch)?;

		// Delete full blocks and their ancillary data beyond the horizon.
		let head = batch.confirmed_tip()?;
		let horizon_height = head
			.height
			.saturating_sub(u64::from(global::cut_through_horizon()));
		let mut current_height = horizon_height;
		while current_height > 0 {
			let hash = match batch.get_header_hash_by_height(ChainIndex::Confirmed, current_height)
			{
				Ok(hash) => hash,
				Err(_) => break,
			};
			if !batch.block_exists(&hash)? {
				// blocks earlier than this one have already been removed
				break;
			}
			batch.delete_block(&hash)?;
			batch.delete_block_sums(&hash)?;
			batch.delete_spent_outputs(&hash)?;
			current_height -= 1;
		}
		batch.commit()?;
		Ok(())
	}

	/// Total difficulty at the head of the confirmed chain.
	pub fn total_difficulty(&self) -> Result<pow::Difficulty, Error> {
		Ok(self.head()?.total_difficulty)
	}

	/// Current status of the chain: both tips and the derived sync phase.
	pub fn status(&self) -> Result<ChainStatus, Error> {
		let candidate_tip = self.tip(ChainIndex::Candidate)?;
		let confirmed_tip = self.tip(ChainIndex::Confirmed)?;
		let sync_phase = if candidate_tip.height
			> confirmed_tip.height + u64::from(global::state_sync_threshold())
		{
			SyncPhase::SyncingHeaders
		} else if candidate_tip.height > confirmed_tip.height {
			SyncPhase::SyncingBlocks
		} else {
			SyncPhase::FullySynced
		};
		Ok(ChainStatus {
			sync_phase,
			candidate_tip,
			confirmed_tip,
		})
	}

	/// Builds an iterator on blocks starting from the current chain head and
	/// running backward. Specialized to return information pertaining to block
	/// difficulty calculation (timestamp and previous difficulties).
	pub fn difficulty_iter(&self) -> Result<DifficultyIter<'_>, Error> {
		let head = self.head()?;
		Ok(DifficultyIter::from(head.last_block_h, &self.store))
	}

	/// The genesis block header this chain was initialized with.
	pub fn genesis(&self) -> &BlockHeader {
		&self.genesis
	}

	/// Chain data directory.
	pub fn db_root(&self) -> &str {
		&self.db_root
	}
}

// Setup the chain head (and genesis state) if this is the first time around.
fn setup_head(
	genesis: &Block,
	store: &Arc<ChainStore>,
	txhashset: &mut txhashset::TxHashSet,
) -> Result<(), Error> {
	let mut batch = store.batch()?;

	match batch.confirmed_tip() {
		Ok(_) => {
			// We have a head, nothing to set up. A consistency check between
			// the head and the txhashset files happens lazily on the first
			// block processed.
		}
		Err(e) => {
			if !e.is_not_found() {
				return Err(e);
			}

			// Initial chain setup from the genesis block.
			batch.save_db_version()?;
			batch.save_block_header(&genesis.header)?;
			batch.save_block(genesis)?;

			let tip = Tip::from_header(&genesis.header);
			batch.save_candidate_tip(&tip)?;
			batch.save_confirmed_tip(&tip)?;
			batch.save_header_height(ChainIndex::Candidate, &genesis.header)?;
			batch.save_header_height(ChainIndex::Confirmed, &genesis.header)?;

			// Save the genesis block sums. A genesis block carrying a reward
			// commits to it like any other block.
			if genesis.kernels().is_empty() {
				batch.save_block_sums(&genesis.hash(), &BlockSums::default())?;
			} else {
				let (utxo_sum, kernel_sum) = (BlockSums::default(), genesis as &dyn Committed)
					.verify_kernel_sums(
						genesis.header.overage(),
						genesis.header.total_kernel_offset(),
					)?;
				batch.save_block_sums(
					&genesis.hash(),
					&BlockSums {
						utxo_sum,
						kernel_sum,
					},
				)?;
			}

			// Initialize the txhashset state with the genesis block.
			txhashset::extending(txhashset, &mut batch, |extension| {
				extension.apply_block(genesis)?;
				extension.validate_roots(&genesis.header)?;
				Ok(())
			})?;

			info!("init: saved genesis: {:?}", genesis.hash());
		}
	}

	batch.commit()?;
	Ok(())
}
