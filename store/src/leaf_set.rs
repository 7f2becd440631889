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

//! Compact (roaring) bitmap representing the set of leaf positions
//! that exist and are not currently spent in the output MMR.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use croaring::Bitmap;

use crate::core::core::pmmr;
use crate::prune_list::PruneList;

/// Compact (roaring) bitmap representing the set of positions of
/// leaves that are currently unspent in the MMR.
pub struct LeafSet {
	path: PathBuf,
	bitmap: Bitmap,
	bitmap_bak: Bitmap,
}

impl LeafSet {
	/// Open the leaf_set file.
	/// The content of the file will be read in memory for fast checking.
	pub fn open<P>(path: P) -> io::Result<LeafSet>
	where
		P: AsRef<Path>,
	{
		let file_path = path.as_ref();
		let bitmap = if file_path.exists() {
			let mut bitmap_file = File::open(file_path)?;
			let mut buffer = vec![];
			bitmap_file.read_to_end(&mut buffer)?;
			Bitmap::deserialize(&buffer)
		} else {
			Bitmap::create()
		};

		Ok(LeafSet {
			path: file_path.to_path_buf(),
			bitmap: bitmap.clone(),
			bitmap_bak: bitmap,
		})
	}

	/// Calculate the set of unpruned leaves
	/// up to and including the cutoff_pos.
	/// Only applicable for the output MMR.
	fn unpruned_pre_cutoff(&self, cutoff_pos: u64, prune_list: &PruneList) -> Bitmap {
		(1..=cutoff_pos)
			.filter(|&x| pmmr::is_leaf(x) && !prune_list.is_pruned(x))
			.map(|x| x as u32)
			.collect()
	}

	/// Calculate the set of spent positions
	/// up to and including the cutoff_pos.
	/// Uses both the leaf_set and the prune_list to determine prunedness.
	/// The rewind_rm_pos bitmap (positions spent in blocks after the cutoff)
	/// is added back in first so positions spent after the cutoff survive
	/// compaction.
	pub fn removed_pre_cutoff(
		&self,
		cutoff_pos: u64,
		rewind_rm_pos: &Bitmap,
		prune_list: &PruneList,
	) -> Bitmap {
		let mut bitmap = self.bitmap.clone();

		// First restore the spent positions of everything spent after the
		// cutoff, giving us the unspent set as of the cutoff itself.
		bitmap.or_inplace(rewind_rm_pos);

		// Invert bitmap for the leaf pos and return the resulting bitmap.
		bitmap
			.flip(1..(cutoff_pos + 1))
			.and(&self.unpruned_pre_cutoff(cutoff_pos, prune_list))
	}

	/// Rewinds the leaf_set back to a previous state.
	/// Removes all pos after the rewind point, and restores the positions
	/// spent by the rewound blocks.
	pub fn rewind(&mut self, position: u64, rewind_rm_pos: &Bitmap) {
		// First remove pos from leaf_set that were
		// added after the point we are rewinding to.
		let to_remove: Bitmap = self
			.bitmap
			.iter()
			.filter(|x| *x as u64 > position)
			.collect();
		self.bitmap.andnot_inplace(&to_remove);

		// Then add back output pos to the leaf_set
		// that were removed.
		self.bitmap.or_inplace(rewind_rm_pos);
	}

	/// Append a new position to the leaf_set.
	pub fn add(&mut self, pos: u64) {
		self.bitmap.add(pos as u32);
	}

	/// Remove the provided position from the leaf_set.
	pub fn remove(&mut self, pos: u64) {
		self.bitmap.remove(pos as u32);
	}

	/// Flush the leaf_set to file.
	pub fn flush(&mut self) -> io::Result<()> {
		// First run the optimization step on the bitmap.
		self.bitmap.run_optimize();

		// Write the updated bitmap file to disk.
		{
			let mut file = BufWriter::new(File::create(&self.path)?);
			file.write_all(&self.bitmap.serialize())?;
			file.flush()?;
		}

		// Make sure our backup in memory is up to date.
		self.bitmap_bak = self.bitmap.clone();

		Ok(())
	}

	/// Discard any pending changes.
	pub fn discard(&mut self) {
		self.bitmap = self.bitmap_bak.clone();
	}

	/// Whether the leaf_set includes the provided position.
	pub fn includes(&self, pos: u64) -> bool {
		self.bitmap.contains(pos as u32)
	}

	/// Iterator over the positions in the leaf_set.
	pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
		self.bitmap.iter().map(|x| x as u64)
	}

	/// Number of positions stored in the leaf_set.
	pub fn len(&self) -> usize {
		self.bitmap.cardinality() as usize
	}

	/// Is the leaf_set empty.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn leaf_set_rewind() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("leaf_set.bin");
		let mut ls = LeafSet::open(&path).unwrap();

		// leaves at MMR pos 1, 2, 4 (3 is a parent)
		ls.add(1);
		ls.add(2);
		ls.add(4);

		// spend the leaf at pos 1
		ls.remove(1);
		assert!(!ls.includes(1));

		// rewind to pos 3, restoring the spent pos 1 and dropping pos 4
		let mut rm = Bitmap::create();
		rm.add(1);
		ls.rewind(3, &rm);
		assert!(ls.includes(1));
		assert!(ls.includes(2));
		assert!(!ls.includes(4));
	}

	#[test]
	fn leaf_set_flush_and_reload() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("leaf_set.bin");
		{
			let mut ls = LeafSet::open(&path).unwrap();
			ls.add(1);
			ls.add(2);
			ls.flush().unwrap();
		}
		let ls = LeafSet::open(&path).unwrap();
		assert!(ls.includes(1));
		assert!(ls.includes(2));
		assert_eq!(ls.len(), 2);
	}

	#[test]
	fn leaf_set_discard() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("leaf_set.bin");
		let mut ls = LeafSet::open(&path).unwrap();
		ls.add(1);
		ls.flush().unwrap();
		ls.remove(1);
		ls.add(2);
		// discard restores the state as of the last flush
		ls.discard();
		assert!(ls.includes(1));
		assert!(!ls.includes(2));
	}
}
