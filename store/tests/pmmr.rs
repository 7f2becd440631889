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
use grinpp_store as store;

use croaring::Bitmap;

use crate::core::core::hash::DefaultHashable;
use crate::core::core::pmmr::{Backend, PMMR};
use crate::core::ser::{
	Error as SerError, FixedLength, PMMRable, Readable, Reader, Writeable, Writer,
};
use crate::store::pmmr::PMMRBackend;

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
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), SerError> {
		writer.write_u32(self.0)
	}
}

impl Readable for TestElem {
	fn read(reader: &mut dyn Reader) -> Result<TestElem, SerError> {
		Ok(TestElem(reader.read_u32()?))
	}
}

fn load(pmmr: &mut PMMR<'_, TestElem, PMMRBackend<TestElem>>, elems: &[TestElem]) -> u64 {
	let mut pos = 0;
	for elem in elems {
		pos = pmmr.push(elem).unwrap();
	}
	pos
}

#[test]
fn pmmr_append_and_read() {
	let data_dir = tempfile::tempdir().unwrap();
	let elems = (0..9).map(TestElem).collect::<Vec<_>>();

	let root = {
		let mut backend: PMMRBackend<TestElem> =
			PMMRBackend::new(data_dir.path().join("append"), false).unwrap();
		let mut pmmr = PMMR::new(&mut backend);
		load(&mut pmmr, &elems);

		// 9 leaves give an MMR of 16 nodes
		assert_eq!(pmmr.unpruned_size(), 16);
		assert_eq!(pmmr.get_data(1), Some(elems[0]));
		assert_eq!(pmmr.get_data(2), Some(elems[1]));
		// pos 3 is a parent node, no data
		assert_eq!(pmmr.get_data(3), None);
		assert_eq!(pmmr.get_data(4), Some(elems[2]));

		let root = pmmr.root().unwrap();
		backend.sync().unwrap();
		root
	};

	// re-open the backend and check the root is unchanged
	let mut backend: PMMRBackend<TestElem> =
		PMMRBackend::new(data_dir.path().join("append"), false).unwrap();
	let size = backend.unpruned_size();
	let pmmr: PMMR<'_, TestElem, _> = PMMR::at(&mut backend, size);
	assert_eq!(pmmr.root().unwrap(), root);
}

#[test]
fn pmmr_rewind_unsynced_is_discardable() {
	let data_dir = tempfile::tempdir().unwrap();
	let elems = (0..4).map(TestElem).collect::<Vec<_>>();

	let mut backend: PMMRBackend<TestElem> =
		PMMRBackend::new(data_dir.path().join("discard"), true).unwrap();

	// push the first two elements and sync
	let root2 = {
		let mut pmmr = PMMR::new(&mut backend);
		pmmr.push(&elems[0]).unwrap();
		pmmr.push(&elems[1]).unwrap();
		pmmr.root().unwrap()
	};
	backend.sync().unwrap();

	// push two more elements but discard them
	{
		let mut pmmr = PMMR::at(&mut backend, 3);
		pmmr.push(&elems[2]).unwrap();
		pmmr.push(&elems[3]).unwrap();
	}
	backend.discard();

	{
		let pmmr: PMMR<'_, TestElem, _> = PMMR::at(&mut backend, 3);
		assert_eq!(pmmr.root().unwrap(), root2);
	}
}

#[test]
fn pmmr_rewind_to_prior_state() {
	let data_dir = tempfile::tempdir().unwrap();
	let elems = (0..6).map(TestElem).collect::<Vec<_>>();

	let mut backend: PMMRBackend<TestElem> =
		PMMRBackend::new(data_dir.path().join("rewind"), true).unwrap();

	// two elements, capture root, then four more
	let root2 = {
		let mut pmmr = PMMR::new(&mut backend);
		pmmr.push(&elems[0]).unwrap();
		pmmr.push(&elems[1]).unwrap();
		pmmr.root().unwrap()
	};
	backend.sync().unwrap();
	{
		let mut pmmr = PMMR::at(&mut backend, 3);
		for elem in &elems[2..] {
			pmmr.push(elem).unwrap();
		}
	}
	backend.sync().unwrap();

	// rewind back to size 3 (2 leaves)
	{
		let mut pmmr = PMMR::at(&mut backend, 10);
		pmmr.rewind(3, &Bitmap::create()).unwrap();
		assert_eq!(pmmr.root().unwrap(), root2);
	}
	backend.sync().unwrap();

	// the rewound state persists across a reopen
	let mut backend: PMMRBackend<TestElem> =
		PMMRBackend::new(data_dir.path().join("rewind"), true).unwrap();
	assert_eq!(backend.unpruned_size(), 3);
	let pmmr: PMMR<'_, TestElem, _> = PMMR::at(&mut backend, 3);
	assert_eq!(pmmr.root().unwrap(), root2);
}

#[test]
fn pmmr_prune_and_compact() {
	let data_dir = tempfile::tempdir().unwrap();
	let elems = (0..4).map(TestElem).collect::<Vec<_>>();

	let mut backend: PMMRBackend<TestElem> =
		PMMRBackend::new(data_dir.path().join("compact"), true).unwrap();

	// 4 leaves, mmr size 7
	let root = {
		let mut pmmr = PMMR::new(&mut backend);
		load(&mut pmmr, &elems);
		assert_eq!(pmmr.unpruned_size(), 7);
		let root = pmmr.root().unwrap();

		// prune (spend) the first two leaves
		assert_eq!(pmmr.prune(1).unwrap(), true);
		assert_eq!(pmmr.prune(2).unwrap(), true);
		// pruning an already pruned leaf is a no-op
		assert_eq!(pmmr.prune(1).unwrap(), false);
		root
	};
	backend.sync().unwrap();

	// the spent leaves are no longer visible but the root is unchanged
	{
		let pmmr: PMMR<'_, TestElem, _> = PMMR::at(&mut backend, 7);
		assert_eq!(pmmr.get_hash(1), None);
		assert_eq!(pmmr.get_data(2), None);
		assert_eq!(pmmr.root().unwrap(), root);
	}

	// now compact them away entirely
	backend.check_compact(7, &Bitmap::create()).unwrap();
	backend.sync().unwrap();

	{
		let pmmr: PMMR<'_, TestElem, _> = PMMR::at(&mut backend, 7);
		// same root after compaction
		assert_eq!(pmmr.root().unwrap(), root);
		// the compacted leaves are gone from the data file
		assert_eq!(pmmr.get_data(1), None);
		assert_eq!(pmmr.get_data(2), None);
		// but their parent hash survives for the proofs
		assert!(pmmr.get_from_file(3).is_some());
		// and the unspent leaves are still readable
		assert_eq!(pmmr.get_data(4), Some(elems[2]));
		assert_eq!(pmmr.get_data(5), Some(elems[3]));
	}

	// appending after compaction lands at the right position
	{
		let mut pmmr = PMMR::at(&mut backend, 7);
		let new_pos = pmmr.push(&TestElem(99)).unwrap();
		assert_eq!(new_pos, 8);
		assert_eq!(pmmr.get_data(8), Some(TestElem(99)));
	}
	backend.sync().unwrap();
}

#[test]
fn pmmr_reload_after_compact() {
	let data_dir = tempfile::tempdir().unwrap();
	let elems = (0..4).map(TestElem).collect::<Vec<_>>();

	let root = {
		let mut backend: PMMRBackend<TestElem> =
			PMMRBackend::new(data_dir.path().join("reload"), true).unwrap();
		let mut pmmr = PMMR::new(&mut backend);
		load(&mut pmmr, &elems);
		let root = pmmr.root().unwrap();
		pmmr.prune(1).unwrap();
		pmmr.prune(2).unwrap();
		backend.sync().unwrap();
		backend.check_compact(7, &Bitmap::create()).unwrap();
		backend.sync().unwrap();
		root
	};

	let mut backend: PMMRBackend<TestElem> =
		PMMRBackend::new(data_dir.path().join("reload"), true).unwrap();
	assert_eq!(backend.unpruned_size(), 7);
	let pmmr: PMMR<'_, TestElem, _> = PMMR::at(&mut backend, 7);
	assert_eq!(pmmr.root().unwrap(), root);
	assert_eq!(pmmr.get_data(4), Some(elems[2]));
}
