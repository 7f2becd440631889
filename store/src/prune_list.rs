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

//! The prune list: bitmap of pruned subtree roots in the MMR.
//!
//! Maintains a set of pruned roots, the positions of the roots of all the
//! subtrees fully removed from the MMR files after compaction. The root hash
//! of each pruned subtree stays in the hash file for cryptographic
//! continuity, everything beneath it is gone.
//!
//! Also maintains the per-position "shift" caches that translate MMR
//! positions into positions in the compacted hash and data files.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use croaring::Bitmap;

use crate::core::core::pmmr::{bintree_leftmost, bintree_postorder_height, family};

/// Maintains a list of previously pruned nodes in PMMR, compacting the list
/// as parents get pruned and allowing checking whether a leaf is pruned.
/// Given a node's position, computes how much it should get shifted given the
/// subtrees that have been pruned before.
pub struct PruneList {
	/// Optional path on disk. In-memory only when None (for tests).
	path: Option<PathBuf>,
	/// Bitmap of pruned subtree roots.
	bitmap: Bitmap,
	/// Bitmap of all pruned positions (roots expanded to their subtrees).
	pruned_cache: Bitmap,
	/// Cumulative hash file shift per pruned root.
	shift_cache: Vec<u64>,
	/// Cumulative data (leaf) file shift per pruned root.
	leaf_shift_cache: Vec<u64>,
}

impl PruneList {
	/// Instantiate a new prune list from the provided path and bitmap.
	pub fn new(path: Option<PathBuf>, mut bitmap: Bitmap) -> PruneList {
		// Note: prune list is 1-indexed so remove any 0 value for safety.
		bitmap.remove(0);

		let mut prune_list = PruneList {
			path,
			bitmap,
			pruned_cache: Bitmap::create(),
			shift_cache: vec![],
			leaf_shift_cache: vec![],
		};
		prune_list.init_caches();
		prune_list
	}

	/// Instantiate a new empty prune list.
	pub fn empty() -> PruneList {
		PruneList::new(None, Bitmap::create())
	}

	/// Open an existing prune_list or create a new one.
	pub fn open<P>(path: P) -> io::Result<PruneList>
	where
		P: AsRef<Path>,
	{
		let file_path = path.as_ref().to_path_buf();
		let bitmap = if file_path.exists() {
			let mut bitmap_file = File::open(&file_path)?;
			let mut buffer = vec![];
			bitmap_file.read_to_end(&mut buffer)?;
			Bitmap::deserialize(&buffer)
		} else {
			Bitmap::create()
		};

		let prune_list = PruneList::new(Some(file_path), bitmap);

		if !prune_list.bitmap.is_empty() {
			debug!(
				"bitmap {} pos ({} bytes), pruned_cache {} pos ({} bytes), shift_cache {}, leaf_shift_cache {}",
				prune_list.bitmap.cardinality(),
				prune_list.bitmap.get_serialized_size_in_bytes(),
				prune_list.pruned_cache.cardinality(),
				prune_list.pruned_cache.get_serialized_size_in_bytes(),
				prune_list.shift_cache.len(),
				prune_list.leaf_shift_cache.len(),
			);
		}

		Ok(prune_list)
	}

	/// Save the prune_list to disk.
	pub fn flush(&mut self) -> io::Result<()> {
		// First run the optimization step on the bitmap.
		self.bitmap.run_optimize();

		// Write the updated bitmap file to disk.
		if let Some(ref path) = self.path {
			let mut file = BufWriter::new(File::create(path)?);
			file.write_all(&self.bitmap.serialize())?;
			file.flush()?;
		}

		// Rebuild our "caches" from the newly flushed bitmap.
		self.init_caches();

		Ok(())
	}

	/// Return the total shift from all entries in the prune_list.
	pub fn get_total_shift(&self) -> u64 {
		self.get_shift(std::u64::MAX)
	}

	/// Return the total leaf_shift from all entries in the prune_list.
	pub fn get_total_leaf_shift(&self) -> u64 {
		self.get_leaf_shift(std::u64::MAX)
	}

	/// Computes by how many positions a node at pos should be shifted given
	/// the prune list. The shift is the number of nodes removed from the hash
	/// file strictly before pos.
	pub fn get_shift(&self, pos: u64) -> u64 {
		if self.bitmap.is_empty() {
			return 0;
		}

		let idx = self.bitmap.rank(pos_u32(pos));
		if idx == 0 {
			return 0;
		}

		if idx > self.shift_cache.len() as u64 {
			self.shift_cache[self.shift_cache.len().saturating_sub(1)]
		} else {
			self.shift_cache[(idx as usize).saturating_sub(1)]
		}
	}

	/// As above, but only considering leaf positions in the data file.
	pub fn get_leaf_shift(&self, pos: u64) -> u64 {
		if self.bitmap.is_empty() {
			return 0;
		}

		let idx = self.bitmap.rank(pos_u32(pos));
		if idx == 0 {
			return 0;
		}

		if idx > self.leaf_shift_cache.len() as u64 {
			self.leaf_shift_cache[self.leaf_shift_cache.len().saturating_sub(1)]
		} else {
			self.leaf_shift_cache[(idx as usize).saturating_sub(1)]
		}
	}

	/// Push the node at the provided position in the prune list.
	/// Assumes rollup of siblings and children has already been handled.
	fn append_single(&mut self, pos: u64) {
		assert!(pos > 0, "prune list 1-indexed, 0 not valid pos");
		assert!(
			pos > self.bitmap.maximum() as u64,
			"prune list append only"
		);

		// Add this pos to the prune list.
		self.bitmap.add(pos as u32);
	}

	/// Push the node at the provided position in the prune list.
	/// Handles rollup of siblings and children as we go (relatively slow).
	/// Once we find a subtree root that can not be rolled up any further
	/// we cleanup everything beneath it and replace it with a single appended node.
	pub fn append(&mut self, pos: u64) {
		let (parent, sibling) = family(pos);
		if self.is_pruned(sibling) {
			// Recursively append the parent (removing our sibling in the process).
			self.append(parent)
		} else {
			// Remove any existing entries in the subtree below the new root.
			let leftmost = bintree_leftmost(pos);
			for x in leftmost..pos {
				self.bitmap.remove(x as u32);
			}
			self.append_single(pos);
		}
	}

	/// Number of entries in the prune_list.
	pub fn len(&self) -> u64 {
		self.bitmap.cardinality()
	}

	/// Is the prune_list empty?
	pub fn is_empty(&self) -> bool {
		self.bitmap.is_empty()
	}

	/// A borrowed copy of the bitmap of pruned roots.
	pub fn bitmap(&self) -> Bitmap {
		self.bitmap.clone()
	}

	/// Iterator over the entries in the prune list (pruned roots).
	pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
		self.bitmap.iter().map(|x| x as u64)
	}

	/// Is the pos pruned?
	/// Assumes the pruned_cache is reasonably up to date.
	pub fn is_pruned(&self, pos: u64) -> bool {
		if self.bitmap.contains(pos as u32) {
			return true;
		}
		self.pruned_cache.contains(pos as u32)
	}

	/// Is the specified position a root of a pruned subtree?
	pub fn is_pruned_root(&self, pos: u64) -> bool {
		self.bitmap.contains(pos as u32)
	}

	fn init_caches(&mut self) {
		self.init_pruned_cache();
		self.init_shift_caches();
	}

	// Expand the pruned roots into the full set of pruned positions.
	// A pruned subtree occupies a contiguous range of positions ending at
	// its root.
	fn init_pruned_cache(&mut self) {
		self.pruned_cache = Bitmap::create();
		for pos in self.bitmap.iter() {
			let pos = pos as u64;
			let leftmost = bintree_leftmost(pos);
			for x in leftmost..=pos {
				self.pruned_cache.add(x as u32);
			}
		}
		self.pruned_cache.run_optimize();
	}

	// Rebuild the cumulative shift caches, one entry per pruned root in
	// ascending position order.
	// For a pruned root at height h the subtree contributes 2^(h+1)-2 removed
	// hash records (the root hash itself is retained) and 2^h removed data
	// records, except that a height 0 root keeps its own data record.
	fn init_shift_caches(&mut self) {
		self.shift_cache.clear();
		self.leaf_shift_cache.clear();

		let mut shift_acc: u64 = 0;
		let mut leaf_shift_acc: u64 = 0;

		for pos in self.bitmap.iter() {
			let pos = pos as u64;
			let height = bintree_postorder_height(pos);

			shift_acc += 2 * ((1 << height) - 1);
			leaf_shift_acc += if height == 0 { 0 } else { 1 << height };

			self.shift_cache.push(shift_acc);
			self.leaf_shift_cache.push(leaf_shift_acc);
		}
	}
}

// rank() is inclusive of pos itself: a pruned root's shift accounts for its
// own (removed) children, which sit before it in postorder.
fn pos_u32(pos: u64) -> u32 {
	if pos > u32::max_value() as u64 {
		u32::max_value()
	} else {
		pos as u32
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn empty_prune_list_shifts() {
		let pl = PruneList::empty();
		assert_eq!(pl.get_shift(1), 0);
		assert_eq!(pl.get_leaf_shift(1), 0);
		assert!(!pl.is_pruned(1));
	}

	#[test]
	fn prune_single_leaf() {
		let mut pl = PruneList::empty();
		pl.append(1);
		pl.flush().unwrap();

		assert!(pl.is_pruned(1));
		assert!(pl.is_pruned_root(1));
		assert!(!pl.is_pruned(2));

		// A height 0 pruned root removes nothing from the files.
		assert_eq!(pl.get_shift(2), 0);
		assert_eq!(pl.get_leaf_shift(2), 0);
	}

	#[test]
	fn prune_sibling_pair_rolls_up() {
		let mut pl = PruneList::empty();
		// pruning both leaves 1 and 2 rolls up to their parent at pos 3
		pl.append(1);
		pl.append(2);
		pl.flush().unwrap();

		assert!(pl.is_pruned(1));
		assert!(pl.is_pruned(2));
		assert!(pl.is_pruned(3));
		assert!(pl.is_pruned_root(3));
		assert!(!pl.is_pruned_root(1));

		// subtree of height 1: 2 hash records and 2 data records removed
		assert_eq!(pl.get_shift(4), 2);
		assert_eq!(pl.get_leaf_shift(4), 2);
		// the shift at the pruned root itself accounts for its children
		assert_eq!(pl.get_shift(3), 2);
	}

	#[test]
	fn prune_two_subtrees() {
		let mut pl = PruneList::empty();
		// prune the first subtree (pos 1,2 -> root 3)
		pl.append(1);
		pl.append(2);
		// prune leaves 4 and 5 rolling up to root 6, which merges with
		// root 3 into root 7
		pl.append(4);
		pl.append(5);
		pl.flush().unwrap();

		assert!(pl.is_pruned_root(7));
		assert!(!pl.is_pruned_root(3));
		assert!(!pl.is_pruned_root(6));
		for pos in 1..=7 {
			assert!(pl.is_pruned(pos));
		}

		// height 2 subtree: 6 hash records removed, 4 data records
		assert_eq!(pl.get_shift(8), 6);
		assert_eq!(pl.get_leaf_shift(8), 4);
	}

	#[test]
	fn prune_list_flush_and_reload() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("pmmr_prun.bin");
		{
			let mut pl = PruneList::open(&path).unwrap();
			pl.append(1);
			pl.append(2);
			pl.flush().unwrap();
		}
		let pl = PruneList::open(&path).unwrap();
		assert!(pl.is_pruned_root(3));
		assert_eq!(pl.get_shift(4), 2);
	}
}
