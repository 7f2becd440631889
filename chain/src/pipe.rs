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

//! Implementation of the chain block acceptance (or refusal) pipeline.

use crate::core::consensus;
use crate::core::core::hash::Hashed;
use crate::core::core::verifier_cache::VerifierCache;
use crate::core::core::{Block, BlockHeader, BlockSums, Committed};
use crate::core::global;
use crate::core::pow;
use crate::error::{Error, ErrorKind};
use crate::store::{Batch, DifficultyIter};
use crate::txhashset;
use crate::types::{ChainIndex, Options, Tip};
use crate::util::RwLock;
use chrono::prelude::Utc;
use chrono::Duration;
use std::sync::Arc;

/// Contextual information required to process a new block and either reject
/// or accept it.
pub struct BlockContext<'a> {
	/// The options
	pub opts: Options,
	/// The pow verifier to use when processing a block.
	pub pow_verifier: fn(&BlockHeader) -> Result<(), pow::Error>,
	/// The active txhashset (3 MMRs) to use for block processing.
	pub txhashset: &'a mut txhashset::TxHashSet,
	/// The active batch to use for block processing.
	pub batch: Batch<'a>,
	/// The verifier cache (caching verifier for rangeproofs and kernel sigs)
	pub verifier_cache: Arc<RwLock<dyn VerifierCache>>,
}

// Check if we already know about this block.
fn check_known(header: &BlockHeader, ctx: &mut BlockContext<'_>) -> Result<(), Error> {
	let head = ctx.batch.confirmed_tip()?;
	if header.hash() == head.last_block_h || header.hash() == head.prev_block_h {
		return Err(ErrorKind::AlreadyKnown.into());
	}
	// Anything stored as a full block has been fully processed before,
	// whether it landed on the confirmed chain or on a side branch.
	if ctx.batch.block_exists(&header.hash())? {
		return Err(ErrorKind::AlreadyKnown.into());
	}
	Ok(())
}

/// Runs the block processing pipeline, including validation and finding a
/// place for the new block in the chain.
/// Returns new head if the confirmed chain head was updated.
pub fn process_block(b: &Block, ctx: &mut BlockContext<'_>) -> Result<Option<Tip>, Error> {
	debug!(
		"pipe: process_block {} at {} [in/out/kern: {}/{}/{}]",
		b.hash(),
		b.header.height,
		b.inputs().len(),
		b.outputs().len(),
		b.kernels().len(),
	);

	// Check if we have already processed this block previously.
	check_known(&b.header, ctx)?;

	// Header specific processing.
	// If we do not yet know about the header, validate and store it,
	// potentially advancing the candidate chain.
	if !ctx.batch.header_exists(&b.header.hash())? {
		validate_header(&b.header, ctx)?;
		add_block_header(&b.header, &ctx.batch)?;
		update_candidate_head(&b.header, ctx)?;
	}

	// Our "previous" block needs to exist as a full block for us to apply
	// this block to the txhashset, otherwise this block is an orphan.
	if !ctx.batch.block_exists(&b.header.prev_hash)? {
		return Err(ErrorKind::Orphan.into());
	}

	// Quick pre-validation of the block, no expensive verification.
	b.validate_read().map_err(ErrorKind::Block)?;

	// Validate the block itself, checking kernel signatures and rangeproofs
	// through the verifier cache, coinbase and kernel sums.
	validate_block(b, ctx)?;

	let head = ctx.batch.confirmed_tip()?;

	// Start a chain extension unit of work dependent on the success of the
	// internal validation and saving operations
	txhashset::extending(ctx.txhashset, &mut ctx.batch, |extension| {
		// Rewind the txhashset to the common ancestor and re-apply any
		// blocks along the fork. A no-op when extending the current head.
		let prev = extension.batch.get_block_header(&b.header.prev_hash)?;
		rewind_and_apply_fork(&prev, extension)?;

		// Check any coinbase being spent have matured sufficiently.
		extension
			.utxo_view()
			.verify_coinbase_maturity(b.inputs(), b.header.height)?;

		// Check the block against the UTXO set: all inputs spending valid
		// unspent outputs, no duplicate outputs.
		extension.utxo_view().validate_block(b)?;

		// Verify (and save) the block sums against the previous block sums
		// with this block applied.
		verify_block_sums(b, extension.batch)?;

		// Apply the block to the three MMRs and check the resulting roots
		// and sizes against the header.
		apply_block_to_txhashset(b, extension)?;

		// If the block does not increase the total cumulative work we do not
		// update the txhashset, the block is simply stored as a fork.
		if !has_more_work(&b.header, &head) {
			extension.force_rollback();
		}

		Ok(())
	})?;

	// Add the validated block to the db.
	// We do this even if we have not increased the total cumulative work
	// so we can maintain multiple (in progress) forks.
	add_block(b, &ctx.batch)?;

	// Update the chain head if total work is increased.
	let res = update_confirmed_head(b, ctx)?;
	Ok(res)
}

/// Process a block header received during "header first" propagation or
/// header sync. Headers land on the candidate chain, racing ahead of the
/// confirmed chain while the full blocks are fetched.
pub fn process_block_header(
	header: &BlockHeader,
	ctx: &mut BlockContext<'_>,
) -> Result<Option<Tip>, Error> {
	debug!(
		"pipe: process_block_header {} at {}",
		header.hash(),
		header.height
	);

	// If we have already processed this header just leave quietly.
	if ctx.batch.header_exists(&header.hash())? {
		return Err(ErrorKind::AlreadyKnown.into());
	}

	validate_header(header, ctx)?;
	add_block_header(header, &ctx.batch)?;
	update_candidate_head(header, ctx)
}

/// First level of block validation that only needs to act on the block header
/// to make it as cheap as possible. The different validations are also
/// arranged by order of cost to have as little DoS surface as possible.
fn validate_header(header: &BlockHeader, ctx: &mut BlockContext<'_>) -> Result<(), Error> {
	// check version, enforcing scheduled hard fork
	if !consensus::valid_header_version(header.height, header.version) {
		error!(
			"Invalid block header version received ({:?}), maybe update the node?",
			header.version
		);
		return Err(ErrorKind::InvalidBlockVersion(header.version).into());
	}

	// refuse blocks with a timestamp too far in the future
	if header.timestamp
		> Utc::now() + Duration::seconds(consensus::FUTURE_TIME_LIMIT_SEC as i64)
	{
		return Err(ErrorKind::InvalidBlockTime.into());
	}

	// first I/O cost, better as late as possible
	let prev = match ctx.batch.get_previous_header(header) {
		Ok(prev) => prev,
		Err(e) => {
			return if e.is_not_found() {
				Err(ErrorKind::Orphan.into())
			} else {
				Err(e)
			};
		}
	};

	// make sure this header has a height exactly one higher than the previous
	// header
	if header.height != prev.height + 1 {
		return Err(ErrorKind::InvalidBlockHeight.into());
	}

	// The header timestamp must be strictly greater than the median of the
	// previous MEDIAN_TIME_WINDOW headers, preventing timestamp manipulation
	// from dragging the difficulty down.
	let mut prev_timestamps = vec![];
	let mut current = prev.clone();
	for _ in 0..consensus::MEDIAN_TIME_WINDOW {
		prev_timestamps.push(current.timestamp.timestamp());
		if current.height == 0 {
			break;
		}
		current = ctx.batch.get_previous_header(&current)?;
	}
	prev_timestamps.sort_unstable();
	let median = prev_timestamps[prev_timestamps.len() / 2];
	if header.timestamp.timestamp() <= median {
		return Err(ErrorKind::InvalidBlockTime.into());
	}

	// verify the proof of work and related parameters
	// at this point we have a previous block header
	// we know the height increased by one
	// so now we can check the total_difficulty increase is also valid
	// check the pow hash shows a difficulty at least as large
	// as the target difficulty
	if !ctx.opts.contains(Options::SKIP_POW) {
		if !(header.pow.is_primary() || header.pow.is_secondary()) {
			return Err(ErrorKind::LowEdgebits.into());
		}

		if header.total_difficulty() <= prev.total_difficulty() {
			return Err(ErrorKind::DifficultyTooLow.into());
		}

		let target_difficulty = header.total_difficulty() - prev.total_difficulty();

		// The claimed difficulty of the header must not exceed what the proof
		// hash actually achieves.
		if header.pow.to_difficulty(header.height) < target_difficulty {
			return Err(ErrorKind::DifficultyTooLow.into());
		}

		// explicit check to ensure we are not below the minimum difficulty
		// we will also check difficulty based on next_difficulty later on
		if target_difficulty < pow::Difficulty::min_dma() {
			return Err(ErrorKind::DifficultyTooLow.into());
		}

		// verify the proof of work solution itself
		if let Err(e) = (ctx.pow_verifier)(header) {
			error!(
				"pipe: error validating header with cuckoo edge_bits {}: {}",
				header.pow.edge_bits(),
				e
			);
			return Err(ErrorKind::InvalidPow.into());
		}

		// Explicit check to ensure total_difficulty has increased by exactly
		// the _network_ difficulty of the previous block.
		let diff_iter = DifficultyIter::from_batch(header.prev_hash, &ctx.batch);
		let next_header_info = consensus::next_difficulty(header.height, diff_iter);
		if target_difficulty != next_header_info.difficulty {
			info!(
				"validate_header: header target difficulty {} != {}",
				target_difficulty.to_num(),
				next_header_info.difficulty.to_num()
			);
			return Err(ErrorKind::WrongTotalDifficulty.into());
		}
		// check the secondary PoW scaling factor if applicable
		if header.pow.secondary_scaling != next_header_info.secondary_scaling {
			info!(
				"validate_header: header secondary scaling {} != {}",
				header.pow.secondary_scaling, next_header_info.secondary_scaling
			);
			return Err(ErrorKind::InvalidScaling.into());
		}
	}

	Ok(())
}

/// Validate the block itself, make sure it is internally consistent.
/// Uses the verifier_cache to avoid rechecking rangeproofs and kernel sigs.
fn validate_block(block: &Block, ctx: &mut BlockContext<'_>) -> Result<(), Error> {
	let prev = ctx.batch.get_previous_header(&block.header)?;
	block
		.validate(&prev.total_kernel_offset, ctx.verifier_cache.clone())
		.map_err(ErrorKind::Block)?;
	Ok(())
}

/// Verify the block against its previous block sums and save the new sums.
/// This is the fast equivalent of a full chain scan: the previous sums plus
/// this block must balance against the new utxo and kernel sums.
fn verify_block_sums(b: &Block, batch: &Batch<'_>) -> Result<(), Error> {
	// Retrieve the block_sums for the previous block.
	let block_sums = batch.get_block_sums(&b.header.prev_hash)?;

	// Overage is based purely on the new block.
	let overage = b.header.overage();

	// Offset on the other hand is the total kernel offset of the new block.
	let offset = b.header.total_kernel_offset();

	// Verify the kernel sums for the block_sums with the new block applied.
	let (utxo_sum, kernel_sum) =
		(block_sums, b as &dyn Committed).verify_kernel_sums(overage, offset)?;

	// Save the new block_sums for the new block.
	batch.save_block_sums(
		&b.hash(),
		&BlockSums {
			utxo_sum,
			kernel_sum,
		},
	)?;

	Ok(())
}

/// Fully validate the block by applying it to the txhashset extension.
/// Check both the txhashset roots and sizes are correct after applying the
/// block.
fn apply_block_to_txhashset(
	block: &Block,
	ext: &mut txhashset::Extension<'_>,
) -> Result<(), Error> {
	ext.apply_block(block)?;
	ext.validate_roots(&block.header)?;
	ext.validate_sizes(&block.header)?;
	Ok(())
}

/// Officially adds the block header to our header chain.
fn add_block_header(bh: &BlockHeader, batch: &Batch<'_>) -> Result<(), Error> {
	batch.save_block_header(bh)?;
	Ok(())
}

/// Officially adds the block to our chain.
/// Header must be added separately (assume this has been done previously).
fn add_block(b: &Block, batch: &Batch<'_>) -> Result<(), Error> {
	batch.save_block(b)?;
	Ok(())
}

/// Update the candidate (header) chain head if the header has more work than
/// the current candidate tip. Maintains the candidate height index along the
/// winning ancestry.
fn update_candidate_head(
	header: &BlockHeader,
	ctx: &mut BlockContext<'_>,
) -> Result<Option<Tip>, Error> {
	let candidate = ctx.batch.candidate_tip()?;
	if header.total_difficulty() > candidate.total_difficulty {
		let tip = Tip::from_header(header);
		update_height_index(ChainIndex::Candidate, header, candidate.height, &ctx.batch)?;
		ctx.batch.save_candidate_tip(&tip)?;
		debug!(
			"pipe: candidate head updated to {} at {}",
			tip.last_block_h, tip.height
		);
		Ok(Some(tip))
	} else {
		Ok(None)
	}
}

/// Update the confirmed chain head if total work is increased. The block may
/// extend the current head directly or switch over to a heavier fork.
fn update_confirmed_head(b: &Block, ctx: &mut BlockContext<'_>) -> Result<Option<Tip>, Error> {
	let head = ctx.batch.confirmed_tip()?;
	if has_more_work(&b.header, &head) {
		let tip = Tip::from_header(&b.header);
		update_height_index(ChainIndex::Confirmed, &b.header, head.height, &ctx.batch)?;
		ctx.batch.save_confirmed_tip(&tip)?;
		debug!("pipe: head updated to {} at {}", tip.last_block_h, tip.height);
		Ok(Some(tip))
	} else {
		Ok(None)
	}
}

// Whether the provided block totals more work than the chain tip
fn has_more_work(header: &BlockHeader, head: &Tip) -> bool {
	header.total_difficulty() > head.total_difficulty
}

// Update the height -> hash index for the given chain index along the
// ancestry of the provided header, walking back until the index reconnects
// with an existing entry. Handles reorgs of arbitrary depth and cleans up
// any stale entries above the new tip.
fn update_height_index(
	chain: ChainIndex,
	header: &BlockHeader,
	old_head_height: u64,
	batch: &Batch<'_>,
) -> Result<(), Error> {
	// Remove any stale entries above the new tip (the new chain may be
	// shorter than the old one despite carrying more work).
	let mut stale_height = header.height + 1;
	while stale_height <= old_head_height {
		batch.delete_header_height(chain, stale_height)?;
		stale_height += 1;
	}

	batch.save_header_height(chain, header)?;
	if header.height == 0 {
		return Ok(());
	}

	let mut prev = batch.get_previous_header(header)?;
	loop {
		match batch.get_header_hash_by_height(chain, prev.height) {
			Ok(hash) if hash == prev.hash() => break,
			_ => batch.save_header_height(chain, &prev)?,
		}
		if prev.height == 0 {
			break;
		}
		prev = batch.get_previous_header(&prev)?;
	}
	Ok(())
}

/// Utility function to handle forks. From the provided header (the parent of
/// a block being processed or built), jump backward to find the fork point.
/// Rewind the txhashset to the fork point and re-apply all the forked blocks
/// up to and including the provided header to set the txhashset in the
/// expected state.
pub fn rewind_and_apply_fork(
	header: &BlockHeader,
	ext: &mut txhashset::Extension<'_>,
) -> Result<(), Error> {
	// extending a fork, first identify the block where forking occurred
	// keeping the hashes of blocks along the fork
	let head = ext.head();
	let head_header = ext.batch.get_block_header(&head.last_block_h)?;
	let fork_point = ext.batch.find_common_ancestor(&head_header, header)?;

	// The fork point must be within the cut-through horizon: beyond it the
	// chain state has been compacted and the reorg can no longer be replayed.
	let depth = head.height.saturating_sub(fork_point.height);
	if depth > 0 && depth >= u64::from(global::cut_through_horizon()) {
		return Err(ErrorKind::Unfit(format!("fork beyond horizon, depth {}", depth)).into());
	}

	// Rewind the txhashset state back to the fork point.
	ext.rewind(&fork_point)?;

	// Re-apply all blocks on this fork up to and including the provided
	// header.
	let fork_hashes = ext.batch.hashes_between(&fork_point, header)?;
	for h in fork_hashes {
		let fb = ext.batch.get_block(&h)?;

		// Re-verify block_sums to set the block_sums up on this fork correctly.
		verify_block_sums(&fb, ext.batch)?;

		// Re-apply the blocks.
		apply_block_to_txhashset(&fb, ext)?;
	}

	Ok(())
}
