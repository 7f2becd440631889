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

//! Utility structs to handle the 3 MMRs (output, rangeproof,
//! kernel) along the overall chain state conveniently and transactionally.

use crate::core::core::committed::Committed;
use crate::core::core::hash::{Hash, Hashed};
use crate::core::core::merkle_proof::MerkleProof;
use crate::core::core::pmmr::{self, ReadonlyPMMR, PMMR};
use crate::core::core::{Block, BlockHeader, Input, Output, OutputIdentifier, TxKernel};
use crate::core::global;
use crate::core::ser::{PMMRIndexHashable, PMMRable};
use crate::error::{Error, ErrorKind};
use crate::store::{Batch, ChainStore};
use crate::txhashset::UTXOView;
use crate::types::{OutputLocation, SpentOutput, Tip, TxHashSetRoots};
use crate::util::secp::pedersen::{Commitment, RangeProof};
use croaring::Bitmap;
use grinpp_store::pmmr::PMMRBackend;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

const TXHASHSET_SUBDIR: &str = "txhashset";

const OUTPUT_SUBDIR: &str = "output";
const RANGE_PROOF_SUBDIR: &str = "rangeproof";
const KERNEL_SUBDIR: &str = "kernel";

struct PMMRHandle<T: PMMRable> {
	backend: PMMRBackend<T>,
	last_pos: u64,
}

impl<T: PMMRable> PMMRHandle<T> {
	fn new(root_dir: &str, sub_dir: &str, prunable: bool) -> Result<PMMRHandle<T>, Error> {
		let path = Path::new(root_dir).join(TXHASHSET_SUBDIR).join(sub_dir);
		fs::create_dir_all(path.clone())?;
		let backend = PMMRBackend::new(&path, prunable)
			.map_err(|e| ErrorKind::TxHashSetErr(format!("{}", e)))?;
		let last_pos = backend.unpruned_size();
		Ok(PMMRHandle { backend, last_pos })
	}
}

/// An easy to manipulate structure holding the 3 MMRs necessary to
/// validate blocks and capturing the output set, the range proofs and the
/// kernels. Also handles the index of commitments to positions in the
/// output and range proof MMRs.
///
/// Note that the index is never authoritative, only the trees are
/// guaranteed to indicate whether an output is spent or not.
pub struct TxHashSet {
	output_pmmr_h: PMMRHandle<Output>,
	rproof_pmmr_h: PMMRHandle<RangeProof>,
	kernel_pmmr_h: PMMRHandle<TxKernel>,

	// chain store used as index of commitments to MMR positions
	commit_index: Arc<ChainStore>,
}

impl TxHashSet {
	/// Open an existing or new set of backends for the TxHashSet
	pub fn open(root_dir: String, commit_index: Arc<ChainStore>) -> Result<TxHashSet, Error> {
		Ok(TxHashSet {
			output_pmmr_h: PMMRHandle::new(&root_dir, OUTPUT_SUBDIR, true)?,
			rproof_pmmr_h: PMMRHandle::new(&root_dir, RANGE_PROOF_SUBDIR, true)?,
			kernel_pmmr_h: PMMRHandle::new(
				&root_dir,
				KERNEL_SUBDIR,
				false, // not prunable
			)?,
			commit_index,
		})
	}

	/// Close all backend file handles
	pub fn release_backend_files(&mut self) {
		use crate::core::core::pmmr::Backend;
		self.output_pmmr_h.backend.release_files();
		self.rproof_pmmr_h.backend.release_files();
		self.kernel_pmmr_h.backend.release_files();
	}

	/// Check if an output is unspent.
	/// We look in the index to find the output MMR pos.
	/// Then we check the entry in the output MMR and confirm the hash matches.
	pub fn is_unspent(&self, output_id: &OutputIdentifier) -> Result<(Hash, u64), Error> {
		let location = match self.commit_index.get_output_pos(&output_id.commit) {
			Ok(location) => location,
			Err(e) => {
				if e.is_not_found() {
					return Err(ErrorKind::OutputNotFound.into());
				} else {
					return Err(e);
				}
			}
		};
		let output_pmmr: ReadonlyPMMR<'_, Output, _> =
			ReadonlyPMMR::at(&self.output_pmmr_h.backend, self.output_pmmr_h.last_pos);
		if let Some(hash) = output_pmmr.get_hash(location.mmr_index) {
			if hash == output_id.hash_with_index(location.mmr_index - 1) {
				Ok((hash, location.mmr_index))
			} else {
				Err(ErrorKind::TxHashSetErr("txhashset hash mismatch".to_owned()).into())
			}
		} else {
			Err(ErrorKind::OutputNotFound.into())
		}
	}

	/// Get MMR roots.
	pub fn roots(&self) -> TxHashSetRoots {
		let output_pmmr =
			ReadonlyPMMR::at(&self.output_pmmr_h.backend, self.output_pmmr_h.last_pos);
		let rproof_pmmr =
			ReadonlyPMMR::at(&self.rproof_pmmr_h.backend, self.rproof_pmmr_h.last_pos);
		let kernel_pmmr =
			ReadonlyPMMR::at(&self.kernel_pmmr_h.backend, self.kernel_pmmr_h.last_pos);

		TxHashSetRoots {
			output_root: output_pmmr.root().unwrap_or(Hash::default()),
			rproof_root: rproof_pmmr.root().unwrap_or(Hash::default()),
			kernel_root: kernel_pmmr.root().unwrap_or(Hash::default()),
		}
	}

	/// Sizes of each of the MMRs (output, rangeproof, kernel).
	pub fn sizes(&self) -> (u64, u64, u64) {
		(
			self.output_pmmr_h.last_pos,
			self.rproof_pmmr_h.last_pos,
			self.kernel_pmmr_h.last_pos,
		)
	}

	/// Build a merkle proof for the given output commitment.
	pub fn merkle_proof(&mut self, commit: Commitment) -> Result<MerkleProof, Error> {
		let location = self.commit_index.get_output_pos(&commit)?;
		PMMR::at(&mut self.output_pmmr_h.backend, self.output_pmmr_h.last_pos)
			.merkle_proof(location.mmr_index)
			.map_err(|_| ErrorKind::MerkleProof.into())
	}

	/// Compact the MMR data files and flush the rm logs
	pub fn compact(&mut self, batch: &Batch<'_>) -> Result<(), Error> {
		debug!("txhashset: starting compaction...");

		let head_header = batch.head_header()?;
		let current_height = head_header.height;

		// horizon for compacting is based on current_height
		let horizon_height =
			current_height.saturating_sub(global::cut_through_horizon().into());
		let horizon_hash =
			batch.get_header_hash_by_height(crate::types::ChainIndex::Confirmed, horizon_height)?;
		let horizon_header = batch.get_block_header(&horizon_hash)?;

		let rewind_rm_pos = spent_pos_between(&horizon_header, &head_header, batch)?;

		debug!("txhashset: check_compact output mmr backend...");
		self.output_pmmr_h
			.backend
			.check_compact(horizon_header.output_mmr_size, &rewind_rm_pos)?;

		debug!("txhashset: check_compact rangeproof mmr backend...");
		self.rproof_pmmr_h
			.backend
			.check_compact(horizon_header.output_mmr_size, &rewind_rm_pos)?;

		debug!("txhashset: ... compaction finished");

		Ok(())
	}
}

/// Starts a new unit of work to extend (or rewind) the chain with additional
/// blocks. Accepts a closure that will operate within that unit of work.
/// The closure has access to an Extension object that allows the addition
/// of blocks to the txhashset and the checking of the current tree roots.
///
/// The unit of work is always discarded (always rollback) as this is read-only.
pub fn extending_readonly<F, T>(trees: &mut TxHashSet, inner: F) -> Result<T, Error>
where
	F: FnOnce(&mut Extension<'_>) -> Result<T, Error>,
{
	let commit_index = trees.commit_index.clone();
	let batch = commit_index.batch()?;

	// We want to use the current head of the most work chain unless
	// we explicitly rewind the extension.
	let head = batch.confirmed_tip()?;

	trace!("Starting new txhashset (readonly) extension.");

	let res = {
		let mut extension = Extension::new(trees, &batch, head);
		extension.force_rollback();
		inner(&mut extension)
	};

	trace!("Rollbacking txhashset (readonly) extension.");

	trees.output_pmmr_h.backend.discard();
	trees.rproof_pmmr_h.backend.discard();
	trees.kernel_pmmr_h.backend.discard();

	trace!("TxHashSet (readonly) extension done.");

	res
}

/// Readonly view on the UTXO set.
/// Based on the current txhashset output_pmmr.
pub fn utxo_view<F, T>(trees: &TxHashSet, inner: F) -> Result<T, Error>
where
	F: FnOnce(&UTXOView<'_>) -> Result<T, Error>,
{
	let res: Result<T, Error>;
	{
		let output_pmmr =
			ReadonlyPMMR::at(&trees.output_pmmr_h.backend, trees.output_pmmr_h.last_pos);

		// Create a new batch here to pass into the utxo_view.
		// Discard it (rollback) after we finish with the utxo_view.
		let batch = trees.commit_index.batch()?;
		let utxo = UTXOView::new(output_pmmr, &batch);
		res = inner(&utxo);
	}
	res
}

/// Starts a new unit of work to extend the chain with additional blocks,
/// accepting a closure that will work within that unit of work. The closure
/// has access to an Extension object that allows the addition of blocks to
/// the txhashset and the checking of the current tree roots.
///
/// If the closure returns an error, modifications are canceled and the unit
/// of work is abandoned. Otherwise, the unit of work is permanently applied.
pub fn extending<'a, F, T>(
	trees: &'a mut TxHashSet,
	batch: &'a mut Batch<'_>,
	inner: F,
) -> Result<T, Error>
where
	F: FnOnce(&mut Extension<'_>) -> Result<T, Error>,
{
	let sizes: (u64, u64, u64);
	let res: Result<T, Error>;
	let rollback: bool;

	// We want to use the current head of the most work chain unless
	// we explicitly rewind the extension.
	let head = batch.confirmed_tip()?;

	// create a child transaction so if the state is rolled back by itself, all
	// index saving can be undone
	let child_batch = batch.child()?;
	{
		trace!("Starting new txhashset extension.");

		let mut extension = Extension::new(trees, &child_batch, head);
		res = inner(&mut extension);

		rollback = extension.rollback;
		sizes = extension.sizes();
	}

	match res {
		Err(e) => {
			debug!("Error returned, discarding txhashset extension: {}", e);
			trees.output_pmmr_h.backend.discard();
			trees.rproof_pmmr_h.backend.discard();
			trees.kernel_pmmr_h.backend.discard();
			Err(e)
		}
		Ok(r) => {
			if rollback {
				trace!("Rollbacking txhashset extension. sizes {:?}", sizes);
				trees.output_pmmr_h.backend.discard();
				trees.rproof_pmmr_h.backend.discard();
				trees.kernel_pmmr_h.backend.discard();
			} else {
				trace!("Committing txhashset extension. sizes {:?}", sizes);
				child_batch.commit()?;
				self::sync_all(trees)?;
				trees.output_pmmr_h.last_pos = sizes.0;
				trees.rproof_pmmr_h.last_pos = sizes.1;
				trees.kernel_pmmr_h.last_pos = sizes.2;
			}

			trace!("TxHashSet extension done.");
			Ok(r)
		}
	}
}

fn sync_all(trees: &mut TxHashSet) -> Result<(), Error> {
	trees
		.output_pmmr_h
		.backend
		.sync()
		.map_err(|e| ErrorKind::TxHashSetErr(format!("{}", e)))?;
	trees
		.rproof_pmmr_h
		.backend
		.sync()
		.map_err(|e| ErrorKind::TxHashSetErr(format!("{}", e)))?;
	trees
		.kernel_pmmr_h
		.backend
		.sync()
		.map_err(|e| ErrorKind::TxHashSetErr(format!("{}", e)))?;
	Ok(())
}

/// Allows the application of new blocks on top of the txhashset in a
/// reversible manner within a unit of work provided by the `extending`
/// function.
pub struct Extension<'a> {
	head: Tip,

	output_pmmr: PMMR<'a, Output, PMMRBackend<Output>>,
	rproof_pmmr: PMMR<'a, RangeProof, PMMRBackend<RangeProof>>,
	kernel_pmmr: PMMR<'a, TxKernel, PMMRBackend<TxKernel>>,

	/// Rollback flag.
	rollback: bool,

	/// Batch in which the extension occurs, public so it can be used within
	/// an `extending` closure. Just be careful using it that way as it will
	/// get rolled back with the extension (i.e on a losing fork).
	pub batch: &'a Batch<'a>,
}

impl<'a> Committed for Extension<'a> {
	fn inputs_committed(&self) -> Vec<Commitment> {
		vec![]
	}

	fn outputs_committed(&self) -> Vec<Commitment> {
		let mut commitments = vec![];
		for pos in self.output_pmmr.leaf_pos_iter() {
			if let Some(out) = self.output_pmmr.get_data(pos) {
				commitments.push(out.commit);
			}
		}
		commitments
	}

	fn kernels_committed(&self) -> Vec<Commitment> {
		let mut commitments = vec![];
		for n in 1..self.kernel_pmmr.unpruned_size() + 1 {
			if pmmr::is_leaf(n) {
				if let Some(kernel) = self.kernel_pmmr.get_data(n) {
					commitments.push(kernel.excess());
				}
			}
		}
		commitments
	}
}

impl<'a> Extension<'a> {
	fn new(trees: &'a mut TxHashSet, batch: &'a Batch<'_>, head: Tip) -> Extension<'a> {
		Extension {
			head,
			output_pmmr: PMMR::at(
				&mut trees.output_pmmr_h.backend,
				trees.output_pmmr_h.last_pos,
			),
			rproof_pmmr: PMMR::at(
				&mut trees.rproof_pmmr_h.backend,
				trees.rproof_pmmr_h.last_pos,
			),
			kernel_pmmr: PMMR::at(
				&mut trees.kernel_pmmr_h.backend,
				trees.kernel_pmmr_h.last_pos,
			),
			rollback: false,
			batch,
		}
	}

	/// The head representing the furthest extent of the current extension.
	pub fn head(&self) -> Tip {
		self.head.clone()
	}

	/// Build a view of the current UTXO set based on the output PMMR.
	pub fn utxo_view(&self) -> UTXOView<'_> {
		UTXOView::new(self.output_pmmr.readonly_pmmr(), self.batch)
	}

	/// Apply a new block to the existing state.
	///
	/// Applies the following -
	///   * outputs
	///   * inputs
	///   * kernels
	///
	/// and records the spent output locations for a future rewind.
	pub fn apply_block(&mut self, b: &Block) -> Result<(), Error> {
		for out in b.outputs() {
			let pos = self.apply_output(out)?;
			// Update the output_pos index for the new output.
			self.batch.save_output_pos(
				&out.commitment(),
				&OutputLocation {
					mmr_index: pos,
					height: b.header.height,
				},
			)?;
		}

		let mut spent = vec![];
		for input in b.inputs() {
			let location = self.apply_input(input)?;
			spent.push(SpentOutput {
				commit: input.commitment(),
				location,
			});
		}
		// Save the spent locations so a rewind can restore the unspent bits.
		self.batch.save_spent_outputs(&b.hash(), &spent)?;

		for kernel in b.kernels() {
			self.apply_kernel(kernel)?;
		}

		// Update the head of the extension to reflect the block we just applied.
		self.head = Tip::from_header(&b.header);

		Ok(())
	}

	fn apply_input(&mut self, input: &Input) -> Result<OutputLocation, Error> {
		let commit = input.commitment();
		let location = self
			.batch
			.get_output_pos(&commit)
			.map_err(|_| Error::from(ErrorKind::AlreadySpent(commit)))?;

		// First check this input corresponds to an existing entry in the
		// output MMR.
		if let Some(hash) = self.output_pmmr.get_hash(location.mmr_index) {
			if hash != input.hash_with_index(location.mmr_index - 1) {
				return Err(
					ErrorKind::TxHashSetErr("output pmmr hash mismatch".to_owned()).into(),
				);
			}
		}

		// Now prune the output_pmmr, rproof_pmmr and their storage.
		// Input is not valid if we cannot prune successfully (to spend an
		// unspent output).
		match self.output_pmmr.prune(location.mmr_index) {
			Ok(true) => {
				self.rproof_pmmr
					.prune(location.mmr_index)
					.map_err(ErrorKind::TxHashSetErr)?;
				Ok(location)
			}
			Ok(false) => Err(ErrorKind::AlreadySpent(commit).into()),
			Err(e) => Err(ErrorKind::TxHashSetErr(e).into()),
		}
	}

	fn apply_output(&mut self, out: &Output) -> Result<u64, Error> {
		let commit = out.commitment();

		if let Ok(location) = self.batch.get_output_pos(&commit) {
			if let Some(out_mmr) = self.output_pmmr.get_data(location.mmr_index) {
				if out_mmr.commitment() == commit {
					return Err(ErrorKind::DuplicateCommitment(commit).into());
				}
			}
		}
		// push the new output to the MMR.
		let output_pos = self
			.output_pmmr
			.push(out)
			.map_err(ErrorKind::TxHashSetErr)?;

		// push the rangeproof to the MMR.
		let rproof_pos = self
			.rproof_pmmr
			.push(&out.proof)
			.map_err(ErrorKind::TxHashSetErr)?;

		// The output and rproof MMRs should be exactly the same size
		// and we should have inserted to both in exactly the same pos.
		{
			if self.output_pmmr.unpruned_size() != self.rproof_pmmr.unpruned_size() {
				return Err(
					ErrorKind::Other("output vs rproof MMRs different sizes".to_owned()).into(),
				);
			}

			if output_pos != rproof_pos {
				return Err(
					ErrorKind::Other("output vs rproof MMRs different pos".to_owned()).into(),
				);
			}
		}

		Ok(output_pos)
	}

	/// Push kernel onto MMR (hash and data files).
	fn apply_kernel(&mut self, kernel: &TxKernel) -> Result<(), Error> {
		self.kernel_pmmr
			.push(kernel)
			.map_err(ErrorKind::TxHashSetErr)?;
		Ok(())
	}

	/// Rewinds the MMRs to the provided block, rewinding to the last output
	/// pos and last kernel pos of that block.
	pub fn rewind(&mut self, header: &BlockHeader) -> Result<(), Error> {
		debug!("Rewind extension to {} at {}", header.hash(), header.height);

		// We need the bitmap of output positions spent by the blocks being
		// rewound so we can restore their unspent bits.
		let head_header = self.batch.get_block_header(&self.head.last_block_h)?;
		let rewind_rm_pos = spent_pos_between(header, &head_header, self.batch)?;

		self.rewind_to_pos(
			header.output_mmr_size,
			header.kernel_mmr_size,
			&rewind_rm_pos,
		)?;

		// Update our head to reflect the header we rewound to.
		self.head = Tip::from_header(header);

		Ok(())
	}

	/// Rewinds the MMRs to the provided positions, given the output and
	/// kernel we want to rewind to.
	fn rewind_to_pos(
		&mut self,
		output_pos: u64,
		kernel_pos: u64,
		rewind_rm_pos: &Bitmap,
	) -> Result<(), Error> {
		debug!(
			"txhashset: rewind_to_pos: output {}, kernel {}",
			output_pos, kernel_pos,
		);

		self.output_pmmr
			.rewind(output_pos, rewind_rm_pos)
			.map_err(ErrorKind::TxHashSetErr)?;
		self.rproof_pmmr
			.rewind(output_pos, rewind_rm_pos)
			.map_err(ErrorKind::TxHashSetErr)?;
		self.kernel_pmmr
			.rewind(kernel_pos, &Bitmap::create())
			.map_err(ErrorKind::TxHashSetErr)?;
		Ok(())
	}

	/// Current root hashes and sums (if applicable) for the Output, range proof
	/// and kernel MMRs.
	pub fn roots(&self) -> Result<TxHashSetRoots, Error> {
		Ok(TxHashSetRoots {
			output_root: self
				.output_pmmr
				.root()
				.map_err(|_| Error::from(ErrorKind::InvalidRoot))?,
			rproof_root: self
				.rproof_pmmr
				.root()
				.map_err(|_| Error::from(ErrorKind::InvalidRoot))?,
			kernel_root: self
				.kernel_pmmr
				.root()
				.map_err(|_| Error::from(ErrorKind::InvalidRoot))?,
		})
	}

	/// Validate the MMR roots against the provided header.
	pub fn validate_roots(&self, header: &BlockHeader) -> Result<(), Error> {
		// If we are validating the genesis block then we have no outputs or
		// kernels. So we are done here.
		if header.height == 0 {
			return Ok(());
		}
		let roots = self.roots()?;
		if roots.output_root != header.output_root
			|| roots.rproof_root != header.range_proof_root
			|| roots.kernel_root != header.kernel_root
		{
			Err(ErrorKind::InvalidRoot.into())
		} else {
			Ok(())
		}
	}

	/// Validate the output and kernel MMR sizes against the block header.
	pub fn validate_sizes(&self, header: &BlockHeader) -> Result<(), Error> {
		// If we are validating the genesis block then we have no outputs or
		// kernels. So we are done here.
		if header.height == 0 {
			return Ok(());
		}

		let (output_mmr_size, rproof_mmr_size, kernel_mmr_size) = self.sizes();
		if output_mmr_size != header.output_mmr_size {
			Err(ErrorKind::InvalidMMRSize.into())
		} else if kernel_mmr_size != header.kernel_mmr_size {
			Err(ErrorKind::InvalidMMRSize.into())
		} else if output_mmr_size != rproof_mmr_size {
			Err(ErrorKind::InvalidMMRSize.into())
		} else {
			Ok(())
		}
	}

	fn validate_mmrs(&self) -> Result<(), Error> {
		let now = Instant::now();

		// validate all hashes and sums within the trees
		if let Err(e) = self.output_pmmr.validate() {
			return Err(ErrorKind::InvalidTxHashSet(e).into());
		}
		if let Err(e) = self.rproof_pmmr.validate() {
			return Err(ErrorKind::InvalidTxHashSet(e).into());
		}
		if let Err(e) = self.kernel_pmmr.validate() {
			return Err(ErrorKind::InvalidTxHashSet(e).into());
		}

		debug!(
			"txhashset: validated the output {}, rproof {}, kernel {} mmrs, took {}s",
			self.output_pmmr.unpruned_size(),
			self.rproof_pmmr.unpruned_size(),
			self.kernel_pmmr.unpruned_size(),
			now.elapsed().as_secs(),
		);

		Ok(())
	}

	/// Validate full kernel sums against the provided header (for overage and
	/// kernel_offset). This is an expensive operation as we need to retrieve
	/// all the UTXOs and kernels from the respective MMRs.
	/// For a significantly faster way of validating full kernel sums see
	/// BlockSums.
	pub fn validate_kernel_sums(&self) -> Result<(Commitment, Commitment), Error> {
		let now = Instant::now();

		let head_header = self.batch.get_block_header(&self.head.last_block_h)?;
		let genesis = self
			.batch
			.get_header_by_height(crate::types::ChainIndex::Confirmed, 0)?;
		let (utxo_sum, kernel_sum) = self.verify_kernel_sums(
			head_header.total_overage(genesis.kernel_mmr_size > 0),
			head_header.total_kernel_offset(),
		)?;

		debug!(
			"txhashset: validated total kernel sums, took {}s",
			now.elapsed().as_secs(),
		);

		Ok((utxo_sum, kernel_sum))
	}

	/// Validate the txhashset state against the provided header.
	/// A "fast validation" will skip rangeproof verification and kernel
	/// signature verification.
	pub fn validate(&self, fast_validation: bool) -> Result<(Commitment, Commitment), Error> {
		self.validate_mmrs()?;

		if self.head.height == 0 {
			let zero_commit = crate::util::secp_static::commit_to_zero_value();
			return Ok((zero_commit, zero_commit));
		}

		let head_header = self.batch.get_block_header(&self.head.last_block_h)?;
		self.validate_roots(&head_header)?;
		self.validate_sizes(&head_header)?;

		// The real magicking happens here. Sum of kernel excesses should equal
		// sum of unspent outputs minus total supply.
		let (output_sum, kernel_sum) = self.validate_kernel_sums()?;

		// These are expensive verification steps (skipped for "fast validation").
		if !fast_validation {
			// Verify the rangeproof associated with each unspent output.
			self.verify_rangeproofs()?;

			// Verify all the kernel signatures.
			self.verify_kernel_signatures()?;
		}

		Ok((output_sum, kernel_sum))
	}

	/// Force the rollback of this extension, no matter the result
	pub fn force_rollback(&mut self) {
		self.rollback = true;
	}

	/// Sizes of each of the MMRs.
	pub fn sizes(&self) -> (u64, u64, u64) {
		(
			self.output_pmmr.unpruned_size(),
			self.rproof_pmmr.unpruned_size(),
			self.kernel_pmmr.unpruned_size(),
		)
	}

	fn verify_kernel_signatures(&self) -> Result<(), Error> {
		let now = Instant::now();

		let mut kern_count = 0;
		for n in 1..self.kernel_pmmr.unpruned_size() + 1 {
			if pmmr::is_leaf(n) {
				let kernel = self
					.kernel_pmmr
					.get_data(n)
					.ok_or_else(|| Error::from(ErrorKind::TxHashSetErr(
						"kernel not found".to_owned(),
					)))?;

				kernel.verify()?;
				kern_count += 1;
			}
		}

		debug!(
			"txhashset: verified {} kernel signatures, pmmr size {}, took {}s",
			kern_count,
			self.kernel_pmmr.unpruned_size(),
			now.elapsed().as_secs(),
		);

		Ok(())
	}

	fn verify_rangeproofs(&self) -> Result<(), Error> {
		let now = Instant::now();

		let mut commits: Vec<Commitment> = vec![];
		let mut proofs: Vec<RangeProof> = vec![];

		let mut proof_count = 0;
		for pos in self.output_pmmr.leaf_pos_iter() {
			let output = self.output_pmmr.get_data(pos);
			let proof = self.rproof_pmmr.get_data(pos);

			// Output and corresponding rangeproof *must* exist.
			// It is invalid for either to be missing and we fail immediately
			// in this case.
			match (output, proof) {
				(None, _) => return Err(ErrorKind::OutputNotFound.into()),
				(_, None) => {
					return Err(ErrorKind::TxHashSetErr("rangeproof not found".to_owned()).into());
				}
				(Some(output), Some(proof)) => {
					commits.push(output.commit);
					proofs.push(proof);
				}
			}

			proof_count += 1;

			if proofs.len() >= 1_000 {
				Output::batch_verify_proofs(&commits, &proofs)?;
				commits.clear();
				proofs.clear();
				debug!(
					"txhashset: verify_rangeproofs: verified {} rangeproofs",
					proof_count,
				);
			}
		}

		// remaining part which not full of 1000 range proofs
		if !proofs.is_empty() {
			Output::batch_verify_proofs(&commits, &proofs)?;
			commits.clear();
			proofs.clear();
		}

		debug!(
			"txhashset: verified {} rangeproofs, pmmr size {}, took {}s",
			proof_count,
			self.rproof_pmmr.unpruned_size(),
			now.elapsed().as_secs(),
		);
		Ok(())
	}
}

/// Given a "from" block header and a "to" block header on the same chain
/// ancestry, collect the positions of all outputs spent by the blocks
/// strictly after "from" up to and including "to". These are the unspent
/// bits a rewind from "to" back to "from" needs to restore.
pub fn spent_pos_between(
	from_header: &BlockHeader,
	to_header: &BlockHeader,
	batch: &Batch<'_>,
) -> Result<Bitmap, Error> {
	if to_header.height < from_header.height {
		debug!(
			"spent_pos_between: {} < {}, nothing to rewind",
			to_header.height, from_header.height
		);
		return Ok(Bitmap::create());
	}

	let mut bitmap = Bitmap::create();
	let mut current = to_header.clone();
	while current.hash() != from_header.hash() {
		if current.height < 1 {
			break;
		}

		// I/O should be minimized or eliminated here for most
		// rewind scenarios.
		if let Ok(spent) = batch.get_spent_outputs(&current.hash()) {
			for s in spent {
				bitmap.add(s.location.mmr_index as u32);
			}
		}
		current = batch.get_previous_header(&current)?;
	}

	Ok(bitmap)
}

/// Clean the txhashset folder
pub fn clean_txhashset_folder(root_dir: &PathBuf) {
	let txhashset_path = root_dir.clone().join(TXHASHSET_SUBDIR);
	if txhashset_path.exists() {
		if let Err(e) = fs::remove_dir_all(txhashset_path.clone()) {
			warn!(
				"clean_txhashset_folder: fail on {:?}. err: {}",
				txhashset_path, e
			);
		}
	}
}
