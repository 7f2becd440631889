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

//! Simple in-memory backend implementation for tests and tooling. Does not
//! compact and keeps everything in a couple of vecs.

use croaring::Bitmap;

use crate::core::hash::Hash;
use crate::core::pmmr::{self, Backend};
use crate::ser::PMMRable;

/// Simple/minimal/naive MMR backend implementation backed by Vec<T> and
/// Vec<Hash>. Removed pos are maintained in a vec.
#[derive(Clone, Debug)]
pub struct VecBackend<T: PMMRable> {
	/// The underlying data (one entry per leaf).
	pub data: Vec<T>,
	/// The underlying hashes (one entry per MMR node).
	pub hashes: Vec<Hash>,
	/// Positions of removed leaves.
	pub removed: Vec<u64>,
}

impl<T: PMMRable> Backend<T> for VecBackend<T> {
	fn append(&mut self, data: &T, hashes: Vec<Hash>) -> Result<(), String> {
		self.data.push(data.clone());
		let mut hashes = hashes;
		self.hashes.append(&mut hashes);
		Ok(())
	}

	fn get_hash(&self, position: u64) -> Option<Hash> {
		if self.removed.contains(&position) {
			None
		} else {
			self.get_from_file(position)
		}
	}

	fn get_data(&self, position: u64) -> Option<T::E> {
		if self.removed.contains(&position) {
			None
		} else {
			self.get_data_from_file(position)
		}
	}

	fn get_from_file(&self, position: u64) -> Option<Hash> {
		if position > self.hashes.len() as u64 {
			None
		} else {
			Some(self.hashes[(position - 1) as usize])
		}
	}

	fn get_data_from_file(&self, position: u64) -> Option<T::E> {
		let idx = pmmr::n_leaves(position);
		if idx > self.data.len() as u64 {
			None
		} else {
			Some(self.data[(idx - 1) as usize].as_elmt())
		}
	}

	fn leaf_pos_iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
		Box::new(
			(1..=self.hashes.len() as u64)
				.filter(move |x| pmmr::is_leaf(*x) && !self.removed.contains(x)),
		)
	}

	fn n_unpruned_leaves(&self) -> u64 {
		self.leaf_pos_iter().count() as u64
	}

	fn remove(&mut self, position: u64) -> Result<(), String> {
		self.removed.push(position);
		Ok(())
	}

	fn rewind(&mut self, position: u64, rewind_rm_pos: &Bitmap) -> Result<(), String> {
		let idx = pmmr::n_leaves(position);
		self.data.truncate(idx as usize);
		self.hashes.truncate(position as usize);
		// restore the leaves removed after the rewind point
		self.removed
			.retain(|pos| *pos <= position && !rewind_rm_pos.contains(*pos as u32));
		Ok(())
	}

	fn release_files(&mut self) {}

	fn dump_stats(&self) {}
}

impl<T: PMMRable> VecBackend<T> {
	/// Instantiates a new empty vec backend.
	pub fn new() -> VecBackend<T> {
		VecBackend {
			data: vec![],
			hashes: vec![],
			removed: vec![],
		}
	}

	/// Size of this backend in number of MMR nodes.
	pub fn size(&self) -> u64 {
		self.hashes.len() as u64
	}
}

impl<T: PMMRable> Default for VecBackend<T> {
	fn default() -> VecBackend<T> {
		VecBackend::new()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::core::hash::DefaultHashable;
	use crate::core::pmmr::PMMR;
	use crate::ser::{self, FixedLength, Readable, Reader, Writeable, Writer};

	#[derive(Copy, Clone, Debug, PartialEq, Eq)]
	struct TestElem(u32);

	impl DefaultHashable for TestElem {}

	impl FixedLength for TestElem {
		const LEN: usize = 4;
	}

	impl PMMRable for TestElem {
		type E = Self;

		fn as_elmt(&self) -> Self::E {
			*self
		}
	}

	impl Writeable for TestElem {
		fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
			writer.write_u32(self.0)
		}
	}

	impl Readable for TestElem {
		fn read(reader: &mut dyn Reader) -> Result<TestElem, ser::Error> {
			Ok(TestElem(reader.read_u32()?))
		}
	}

	#[test]
	fn pmmr_push_root_and_proof() {
		let mut ba = VecBackend::new();
		let mut pmmr = PMMR::new(&mut ba);
		for i in 0..7u32 {
			pmmr.push(&TestElem(i)).unwrap();
		}
		// 7 leaves yield an MMR of 11 nodes
		assert_eq!(pmmr.unpruned_size(), 11);
		assert_eq!(pmmr.n_unpruned_leaves(), 7);

		let root = pmmr.root().unwrap();

		// a merkle proof for each leaf verifies against the root
		let leaf_positions: [u64; 7] = [1, 2, 4, 5, 8, 9, 11];
		for (i, pos) in leaf_positions.iter().enumerate() {
			let proof = pmmr.merkle_proof(*pos).unwrap();
			proof
				.verify(root, &TestElem(i as u32), *pos)
				.expect("proof verifies");
		}

		// a proof does not verify for the wrong element
		let proof = pmmr.merkle_proof(1).unwrap();
		assert!(proof.verify(root, &TestElem(42), 1).is_err());
	}

	#[test]
	fn pmmr_rewind_to_prior_root() {
		let mut ba = VecBackend::new();
		let mut pmmr = PMMR::new(&mut ba);
		for i in 0..4u32 {
			pmmr.push(&TestElem(i)).unwrap();
		}
		let root4 = pmmr.root().unwrap();
		assert_eq!(pmmr.unpruned_size(), 7);

		for i in 4..7u32 {
			pmmr.push(&TestElem(i)).unwrap();
		}
		assert_ne!(pmmr.root().unwrap(), root4);

		// rewinding back to 4 leaves restores the earlier root
		pmmr.rewind(7, &Bitmap::create()).unwrap();
		assert_eq!(pmmr.unpruned_size(), 7);
		assert_eq!(pmmr.root().unwrap(), root4);
	}

	#[test]
	fn pmmr_prune_leaves_root_unchanged() {
		let mut ba = VecBackend::new();
		let mut pmmr = PMMR::new(&mut ba);
		for i in 0..4u32 {
			pmmr.push(&TestElem(i)).unwrap();
		}
		let root = pmmr.root().unwrap();

		// pruning a leaf removes its data but not the root
		assert_eq!(pmmr.prune(2).unwrap(), true);
		assert_eq!(pmmr.get_hash(2), None);
		assert_eq!(pmmr.get_data(2), None);
		assert_eq!(pmmr.root().unwrap(), root);

		// pruning twice is a no-op
		assert_eq!(pmmr.prune(2).unwrap(), false);

		// pruning a non-leaf position is an error
		assert!(pmmr.prune(3).is_err());

		// the tree still validates
		pmmr.validate().unwrap();
	}
}
