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

//! Implementation of the persistent Backend for the prunable MMR tree.

use std::path::{Path, PathBuf};
use std::{fs, io};

use croaring::Bitmap;

use crate::core::core::hash::Hash;
use crate::core::core::pmmr::{self, family, Backend};
use crate::core::ser::PMMRable;
use crate::leaf_set::LeafSet;
use crate::prune_list::PruneList;
use crate::types::DataFile;

/// The hash file in the MMR dir
pub const PMMR_HASH_FILE: &str = "pmmr_hash.bin";
/// The data file in the MMR dir
pub const PMMR_DATA_FILE: &str = "pmmr_data.bin";
/// The leaf file in the MMR dir (prunable MMRs only)
pub const PMMR_LEAF_FILE: &str = "pmmr_leaf.bin";
/// The prune list file in the MMR dir (prunable MMRs only)
pub const PMMR_PRUN_FILE: &str = "pmmr_prun.bin";

/// PMMR persistent backend implementation. Relies on multiple facilities to
/// handle writing, reading and pruning.
///
/// * A main storage file appends Hash instances as they come.
///   This AppendOnlyFile is also backed by a mmap for reads.
/// * A parallel data file stores the leaf payloads, also fixed size records.
/// * The leaf_set tracks unspent leaf positions, the prune_list tracks
///   subtrees fully removed from the files after compaction.
pub struct PMMRBackend<T: PMMRable> {
	data_dir: PathBuf,
	prunable: bool,
	hash_file: DataFile<Hash>,
	data_file: DataFile<T::E>,
	leaf_set: LeafSet,
	prune_list: PruneList,
}

impl<T: PMMRable> Backend<T> for PMMRBackend<T> {
	/// Append the provided data and hashes to the backend storage.
	/// Add the new leaf pos to our leaf_set if this is a prunable MMR.
	fn append(&mut self, data: &T, hashes: Vec<Hash>) -> Result<(), String> {
		let size = self
			.data_file
			.append(&data.as_elmt())
			.map_err(|e| format!("Failed to append data to file. {}", e))?;

		for h in &hashes {
			self.hash_file
				.append(h)
				.map_err(|e| format!("Failed to append hash to file. {}", e))?;
		}

		if self.prunable {
			// (Re)calculate the latest pos given updated size of data file
			// and the total leaf_shift, and add to our leaf_set.
			let pos =
				pmmr::insertion_to_pmmr_index(size + self.prune_list.get_total_leaf_shift());
			self.leaf_set.add(pos);
		}

		Ok(())
	}

	// Rewind the backend state to a previous position, restoring the leaf_set
	// with the positions spent by the rewound blocks.
	fn rewind(&mut self, position: u64, rewind_rm_pos: &Bitmap) -> Result<(), String> {
		// First rewind the leaf_set with the necessary added and removed positions.
		if self.prunable {
			self.leaf_set.rewind(position, rewind_rm_pos);
		}

		// Rewind the hash file accounting for pruned/compacted pos
		let shift = self.prune_list.get_shift(position);
		self.hash_file.rewind(position - shift);

		// Rewind the data file accounting for pruned/compacted pos
		let leaf_shift = self.prune_list.get_leaf_shift(position);
		let flatfile_pos = pmmr::n_leaves(position);
		self.data_file.rewind(flatfile_pos - leaf_shift);

		Ok(())
	}

	/// Get the hash at pos.
	/// Return None if pos is a leaf and it has been removed (or pruned or
	/// compacted).
	fn get_hash(&self, pos: u64) -> Option<Hash> {
		if self.prunable && pmmr::is_leaf(pos) && !self.leaf_set.includes(pos) {
			return None;
		}
		self.get_from_file(pos)
	}

	/// Get the data at pos.
	/// Return None if it has been removed or if pos is not a leaf node.
	fn get_data(&self, pos: u64) -> Option<T::E> {
		if !pmmr::is_leaf(pos) {
			return None;
		}
		if self.prunable && !self.leaf_set.includes(pos) {
			return None;
		}
		self.get_data_from_file(pos)
	}

	/// Get the hash from the underlying MMR file (ignores the leaf_set).
	fn get_from_file(&self, pos: u64) -> Option<Hash> {
		if self.is_compacted(pos) {
			return None;
		}
		let shift = self.prune_list.get_shift(pos);
		self.hash_file.read(pos - shift)
	}

	/// Get the data from the underlying MMR file (ignores the leaf_set).
	fn get_data_from_file(&self, pos: u64) -> Option<T::E> {
		if self.is_compacted(pos) {
			return None;
		}
		let flatfile_pos = pmmr::n_leaves(pos);
		let shift = self.prune_list.get_leaf_shift(pos);
		self.data_file.read(flatfile_pos - shift)
	}

	/// Returns an iterator over all the leaf positions.
	/// For a prunable PMMR this is the positions in the leaf_set.
	/// For a non-prunable PMMR this is *all* leaf positions.
	fn leaf_pos_iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
		if self.prunable {
			Box::new(self.leaf_set.iter())
		} else {
			Box::new((1..=self.unpruned_size()).filter(|x| pmmr::is_leaf(*x)))
		}
	}

	/// Number of leaves in the MMR.
	fn n_unpruned_leaves(&self) -> u64 {
		if self.prunable {
			self.leaf_set.len() as u64
		} else {
			pmmr::n_leaves(self.unpruned_size())
		}
	}

	/// Remove by leaf position. Only "removes" the leaf from the leaf_set,
	/// the hash stays in place for cryptographic continuity until the leaf
	/// gets compacted away past the horizon.
	fn remove(&mut self, pos: u64) -> Result<(), String> {
		assert!(self.prunable, "Remove on non-prunable MMR");
		self.leaf_set.remove(pos);
		Ok(())
	}

	/// Release underlying data files
	fn release_files(&mut self) {
		self.data_file.release();
		self.hash_file.release();
	}

	fn dump_stats(&self) {
		debug!(
			"pmmr backend: unpruned: {}, hashes: {}, data: {}, leaf_set: {}, prune_list: {}",
			self.unpruned_size(),
			self.hash_size(),
			self.data_size(),
			self.leaf_set.len(),
			self.prune_list.len(),
		);
	}
}

impl<T: PMMRable> PMMRBackend<T> {
	/// Instantiates a new PMMR backend.
	/// If optional size is provided and sizes do not match, the backend is
	/// considered corrupted.
	pub fn new<P>(data_dir: P, prunable: bool) -> io::Result<PMMRBackend<T>>
	where
		P: AsRef<Path>,
	{
		let data_dir = data_dir.as_ref().to_path_buf();
		fs::create_dir_all(&data_dir)?;

		let hash_file = DataFile::open(data_dir.join(PMMR_HASH_FILE))?;
		let data_file = DataFile::open(data_dir.join(PMMR_DATA_FILE))?;
		let leaf_set = LeafSet::open(data_dir.join(PMMR_LEAF_FILE))?;
		let prune_list = PruneList::open(data_dir.join(PMMR_PRUN_FILE))?;

		Ok(PMMRBackend {
			data_dir,
			prunable,
			hash_file,
			data_file,
			leaf_set,
			prune_list,
		})
	}

	fn is_compacted(&self, pos: u64) -> bool {
		self.prune_list.is_pruned(pos) && !self.prune_list.is_pruned_root(pos)
	}

	/// Number of hashes in the underlying hash file, including any unsynced.
	pub fn hash_size(&self) -> u64 {
		self.hash_file.size_unsync()
	}

	/// Number of elements in the underlying data file, including any unsynced.
	pub fn data_size(&self) -> u64 {
		self.data_file.size_unsync()
	}

	/// Size of the underlying hashed data. Extends the size of the underlying
	/// file by the total shift of the pruned positions.
	pub fn unpruned_size(&self) -> u64 {
		self.hash_size() + self.prune_list.get_total_shift()
	}

	/// Syncs all files to disk. A call to sync is required to ensure all the
	/// data has been successfully written to disk.
	pub fn sync(&mut self) -> io::Result<()> {
		self.hash_file.flush()?;
		self.data_file.flush()?;
		if self.prunable {
			self.leaf_set.flush()?;
		}
		Ok(())
	}

	/// Discard the current, non synced state of the backend.
	pub fn discard(&mut self) {
		self.hash_file.discard();
		self.data_file.discard();
		self.leaf_set.discard();
	}

	/// Path of the underlying MMR dir.
	pub fn data_dir(&self) -> &Path {
		&self.data_dir
	}

	/// Checks the length of the remove log to see if it should get compacted.
	/// If so, the remove log is flushed into the prune list, which itself gets
	/// saved, and the hash and data files are rewritten, cutting the removed
	/// data.
	///
	/// The cutoff_pos is the position beyond which we do not compact, so a
	/// rewind of up to cutoff_pos can always be serviced. The rewind_rm_pos
	/// bitmap contains the positions spent by blocks after the cutoff, which
	/// must be retained.
	pub fn check_compact(&mut self, cutoff_pos: u64, rewind_rm_pos: &Bitmap) -> io::Result<bool> {
		// Calculate the sets of leaf positions and node positions to remove
		// based on the cutoff_pos provided.
		let (leaves_removed, pos_to_rm) = self.pos_to_rm(cutoff_pos, rewind_rm_pos);

		// 1. Save compact copy of the hash file, skipping removed data.
		{
			let pos_to_rm = pos_to_rm
				.iter()
				.map(|pos| {
					let shift = self.prune_list.get_shift(pos as u64);
					pos as u64 - shift
				})
				.collect::<Vec<_>>();

			self.hash_file.save_prune(&pos_to_rm)?;
		}

		// 2. Save compact copy of the data file, skipping removed leaves.
		{
			let leaf_pos_to_rm = pos_to_rm
				.iter()
				.filter(|&x| pmmr::is_leaf(x as u64))
				.map(|x| x as u64)
				.collect::<Vec<_>>();

			let pos_to_rm = leaf_pos_to_rm
				.iter()
				.map(|&pos| {
					let flat_pos = pmmr::n_leaves(pos);
					let shift = self.prune_list.get_leaf_shift(pos);
					flat_pos - shift
				})
				.collect::<Vec<_>>();

			self.data_file.save_prune(&pos_to_rm)?;
		}

		// 3. Update the prune list and write to disk.
		{
			for pos in leaves_removed.iter() {
				self.prune_list.append(pos as u64);
			}
			self.prune_list.flush()?;
		}

		// 4. Write the leaf_set to disk.
		self.leaf_set.flush()?;

		Ok(true)
	}

	fn pos_to_rm(&self, cutoff_pos: u64, rewind_rm_pos: &Bitmap) -> (Bitmap, Bitmap) {
		let mut expanded = Bitmap::create();

		let leaf_pos_to_rm =
			self.leaf_set
				.removed_pre_cutoff(cutoff_pos, rewind_rm_pos, &self.prune_list);

		for x in leaf_pos_to_rm.iter() {
			expanded.add(x);
			let mut current = x as u64;
			loop {
				let (parent, sibling) = family(current);
				let sibling_pruned = self.prune_list.is_pruned_root(sibling);

				// if sibling previously pruned
				// push it back onto list of pos to remove
				// so we can remove it and traverse up to parent
				if sibling_pruned {
					expanded.add(sibling as u32);
				}

				if sibling_pruned || expanded.contains(sibling as u32) {
					expanded.add(parent as u32);
					current = parent;
				} else {
					break;
				}
			}
		}
		(leaf_pos_to_rm, removed_excl_roots(&expanded))
	}
}

/// Filter remove list to exclude roots.
/// We want to keep roots around so we have hashes for Merkle proofs.
fn removed_excl_roots(removed: &Bitmap) -> Bitmap {
	removed
		.iter()
		.filter(|pos| {
			let (parent_pos, _) = family(*pos as u64);
			removed.contains(parent_pos as u32)
		})
		.collect()
}
