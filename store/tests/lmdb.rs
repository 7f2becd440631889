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

use crate::core::ser::{self, Readable, Reader, Writeable, Writer};
use crate::store::{ChainDb, ColumnFamily, Error};

#[derive(Clone, Debug, PartialEq)]
struct Phatchunk(Vec<u8>);

impl Writeable for Phatchunk {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_bytes(&self.0)
	}
}

impl Readable for Phatchunk {
	fn read(reader: &mut dyn Reader) -> Result<Phatchunk, ser::Error> {
		Ok(Phatchunk(reader.read_bytes_len_prefix()?))
	}
}

fn open_db(dir: &tempfile::TempDir) -> ChainDb {
	ChainDb::open(dir.path().to_str().unwrap()).unwrap()
}

#[test]
fn batch_commit_is_atomic() {
	let dir = tempfile::tempdir().unwrap();
	let db = open_db(&dir);

	// writes in an uncommitted batch are discarded on drop
	{
		let batch = db.batch().unwrap();
		batch
			.put_ser(ColumnFamily::Default, b"key1", &Phatchunk(vec![1, 2, 3]))
			.unwrap();
		// drop without commit
	}
	assert_eq!(
		db.get_ser::<Phatchunk>(ColumnFamily::Default, b"key1")
			.unwrap(),
		None
	);

	// a committed batch lands across column families atomically
	{
		let batch = db.batch().unwrap();
		batch
			.put_ser(ColumnFamily::Default, b"key1", &Phatchunk(vec![1]))
			.unwrap();
		batch
			.put_ser(ColumnFamily::Block, b"key1", &Phatchunk(vec![2]))
			.unwrap();
		batch.commit().unwrap();
	}
	assert_eq!(
		db.get_ser::<Phatchunk>(ColumnFamily::Default, b"key1")
			.unwrap(),
		Some(Phatchunk(vec![1]))
	);
	assert_eq!(
		db.get_ser::<Phatchunk>(ColumnFamily::Block, b"key1").unwrap(),
		Some(Phatchunk(vec![2]))
	);
}

#[test]
fn batch_sees_pending_writes() {
	let dir = tempfile::tempdir().unwrap();
	let db = open_db(&dir);

	let batch = db.batch().unwrap();
	batch
		.put_ser(ColumnFamily::Header, b"h1", &Phatchunk(vec![42]))
		.unwrap();

	// reads through the batch see the pending write
	assert_eq!(
		batch
			.get_ser::<Phatchunk>(ColumnFamily::Header, b"h1")
			.unwrap(),
		Some(Phatchunk(vec![42]))
	);
	assert!(batch.exists(ColumnFamily::Header, b"h1").unwrap());

	// repeated put of the same key within the batch is last-write-wins
	batch
		.put_ser(ColumnFamily::Header, b"h1", &Phatchunk(vec![43]))
		.unwrap();
	assert_eq!(
		batch
			.get_ser::<Phatchunk>(ColumnFamily::Header, b"h1")
			.unwrap(),
		Some(Phatchunk(vec![43]))
	);
	batch.commit().unwrap();

	assert_eq!(
		db.get_ser::<Phatchunk>(ColumnFamily::Header, b"h1").unwrap(),
		Some(Phatchunk(vec![43]))
	);
}

#[test]
fn delete_and_delete_all() {
	let dir = tempfile::tempdir().unwrap();
	let db = open_db(&dir);

	{
		let batch = db.batch().unwrap();
		for i in 0..5u8 {
			batch
				.put_ser(ColumnFamily::OutputPos, &[i], &Phatchunk(vec![i]))
				.unwrap();
		}
		batch.commit().unwrap();
	}

	{
		let batch = db.batch().unwrap();
		batch.delete(ColumnFamily::OutputPos, &[0]).unwrap();
		// deleting a missing key is not an error
		batch.delete(ColumnFamily::OutputPos, &[99]).unwrap();
		batch.commit().unwrap();
	}
	assert_eq!(
		db.get_ser::<Phatchunk>(ColumnFamily::OutputPos, &[0]).unwrap(),
		None
	);
	assert!(db.exists(ColumnFamily::OutputPos, &[1]).unwrap());

	{
		let batch = db.batch().unwrap();
		batch.delete_all(ColumnFamily::OutputPos).unwrap();
		batch.commit().unwrap();
	}
	for i in 0..5u8 {
		assert!(!db.exists(ColumnFamily::OutputPos, &[i]).unwrap());
	}
}

#[test]
fn child_batch_rolls_back_independently() {
	let dir = tempfile::tempdir().unwrap();
	let db = open_db(&dir);

	let mut batch = db.batch().unwrap();
	batch
		.put_ser(ColumnFamily::Default, b"outer", &Phatchunk(vec![1]))
		.unwrap();
	{
		let child = batch.child().unwrap();
		child
			.put_ser(ColumnFamily::Default, b"inner", &Phatchunk(vec![2]))
			.unwrap();
		// child dropped without commit, its writes are abandoned
	}
	batch.commit().unwrap();

	assert!(db.exists(ColumnFamily::Default, b"outer").unwrap());
	assert!(!db.exists(ColumnFamily::Default, b"inner").unwrap());
}

#[test]
fn prefix_iteration() {
	let dir = tempfile::tempdir().unwrap();
	let db = open_db(&dir);

	{
		let batch = db.batch().unwrap();
		batch
			.put_ser(ColumnFamily::Default, b"A1", &Phatchunk(vec![1]))
			.unwrap();
		batch
			.put_ser(ColumnFamily::Default, b"A2", &Phatchunk(vec![2]))
			.unwrap();
		batch
			.put_ser(ColumnFamily::Default, b"B1", &Phatchunk(vec![3]))
			.unwrap();
		batch.commit().unwrap();
	}

	let found: Vec<Phatchunk> = db
		.iter(ColumnFamily::Default, b"A")
		.unwrap()
		.collect();
	assert_eq!(found, vec![Phatchunk(vec![1]), Phatchunk(vec![2])]);
}

#[test]
fn corrupted_entry_detected() {
	let dir = tempfile::tempdir().unwrap();
	let db = open_db(&dir);

	// write raw bytes that do not deserialize as a Phatchunk (length prefix
	// promises more data than is present)
	{
		let batch = db.batch().unwrap();
		batch
			.put(ColumnFamily::BlockSums, b"bad", &[0, 0, 0, 0, 0, 0, 0, 99, 1])
			.unwrap();
		batch.commit().unwrap();
	}

	let res = db.get_ser::<Phatchunk>(ColumnFamily::BlockSums, b"bad");
	match &res {
		Err(Error::SerErr(_)) => (),
		other => panic!("expected SerErr, got {:?}", other),
	}
	// and the error is flagged as corruption
	assert!(res.unwrap_err().is_corruption());
}
