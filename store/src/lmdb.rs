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

//! Storage of core types using LMDB. The database is split into named
//! column families, one LMDB database per family, sharing a single
//! environment so a write transaction spans all of them atomically.

use std::fs;
use std::marker;
use std::sync::Arc;

use lmdb_zero as lmdb;
use lmdb_zero::traits::CreateCursor;
use lmdb_zero::LmdbResultExt;

use crate::core::ser;

/// Subdirectory the LMDB environment lives in, under the chain data dir.
const LMDB_SUBDIR: &str = "lmdb";

/// The latest version of the database schema.
pub const DB_VERSION: u8 = 1;

/// Main error type for this lmdb
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum Error {
	/// Couldn't find what we were looking for
	#[fail(display = "DB Not Found Error: {}", _0)]
	NotFoundErr(String),
	/// Wraps an error originating from LMDB
	#[fail(display = "LMDB error: {}", _0)]
	LmdbErr(lmdb::error::Error),
	/// Wraps a serialization error for Writeable or Readable.
	/// Indicates on-disk data does not deserialize cleanly, so the store
	/// should be treated as corrupted.
	#[fail(display = "Serialization Error: {}", _0)]
	SerErr(String),
	/// File handling error around the MMR flat files
	#[fail(display = "File Error: {}", _0)]
	FileErr(String),
	/// Other error
	#[fail(display = "Other Error: {}", _0)]
	OtherErr(String),
}

impl From<lmdb::error::Error> for Error {
	fn from(e: lmdb::error::Error) -> Error {
		Error::LmdbErr(e)
	}
}

impl Error {
	/// Whether this error signals a corrupted store (fatal) as opposed to a
	/// retryable IO condition or a missing entry.
	pub fn is_corruption(&self) -> bool {
		match self {
			Error::SerErr(_) => true,
			_ => false,
		}
	}
}

/// The named column families the chain db is split into.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnFamily {
	/// Schema version, chain tips and other one-off keys
	Default,
	/// Full blocks keyed by block hash
	Block,
	/// Block headers keyed by header hash
	Header,
	/// Running output/kernel sums keyed by block hash
	BlockSums,
	/// Output MMR positions keyed by commitment
	OutputPos,
	/// Spent output locations keyed by the spending block hash
	SpentOutputs,
}

impl ColumnFamily {
	/// All column families, in a stable order.
	pub fn all() -> [ColumnFamily; 6] {
		[
			ColumnFamily::Default,
			ColumnFamily::Block,
			ColumnFamily::Header,
			ColumnFamily::BlockSums,
			ColumnFamily::OutputPos,
			ColumnFamily::SpentOutputs,
		]
	}

	/// The name of the lmdb database backing this column family.
	fn db_name(self) -> &'static str {
		match self {
			ColumnFamily::Default => "default",
			ColumnFamily::Block => "block",
			ColumnFamily::Header => "header",
			ColumnFamily::BlockSums => "block_sums",
			ColumnFamily::OutputPos => "output_pos",
			ColumnFamily::SpentOutputs => "spent_outputs",
		}
	}

	fn index(self) -> usize {
		match self {
			ColumnFamily::Default => 0,
			ColumnFamily::Block => 1,
			ColumnFamily::Header => 2,
			ColumnFamily::BlockSums => 3,
			ColumnFamily::OutputPos => 4,
			ColumnFamily::SpentOutputs => 5,
		}
	}
}

/// Create a new LMDB env under the provided directory to spawn various
/// databases from.
pub fn new_env(path: String) -> Result<lmdb::Environment, Error> {
	let full_path = [path, LMDB_SUBDIR.to_owned()].join("/");
	fs::create_dir_all(&full_path)
		.map_err(|e| Error::FileErr(format!("Unable to create directory: {}", e)))?;

	let env = unsafe {
		let mut env_builder = lmdb::EnvBuilder::new()?;
		env_builder.set_maxdbs(8)?;
		// half a TB should give us plenty room, will be an issue on 32 bits
		// (which we don't support anyway)
		env_builder.set_mapsize(549_755_813_888)?;
		env_builder.open(&full_path, lmdb::open::Flags::empty(), 0o600)?
	};
	Ok(env)
}

/// LMDB-backed store facilitating data access and serialization. All writes
/// are done through a Batch abstraction providing atomicity across all
/// column families.
pub struct ChainDb {
	env: Arc<lmdb::Environment>,
	dbs: Vec<Arc<lmdb::Database<'static>>>,
}

impl ChainDb {
	/// Opens (or creates) the chain db under the provided root path with one
	/// named database per column family.
	pub fn open(root_path: &str) -> Result<ChainDb, Error> {
		let env = Arc::new(new_env(root_path.to_owned())?);
		let mut dbs = vec![];
		for cf in ColumnFamily::all().iter() {
			let db = Arc::new(lmdb::Database::open(
				env.clone(),
				Some(cf.db_name()),
				&lmdb::DatabaseOptions::new(lmdb::db::CREATE),
			)?);
			dbs.push(db);
		}
		Ok(ChainDb { env, dbs })
	}

	fn db(&self, cf: ColumnFamily) -> &Arc<lmdb::Database<'static>> {
		&self.dbs[cf.index()]
	}

	/// Gets a value from the db, provided its column family and key
	pub fn get(&self, cf: ColumnFamily, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let access = txn.access();
		let res = access.get(&**self.db(cf), key);
		res.map(|res: &[u8]| res.to_vec())
			.to_opt()
			.map_err(From::from)
	}

	/// Gets a `Readable` value from the db, provided its column family and
	/// key. Encapsulates serialization.
	pub fn get_ser<T: ser::Readable>(
		&self,
		cf: ColumnFamily,
		key: &[u8],
	) -> Result<Option<T>, Error> {
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let access = txn.access();
		self.get_ser_access(cf, key, &access)
	}

	fn get_ser_access<T: ser::Readable>(
		&self,
		cf: ColumnFamily,
		key: &[u8],
		access: &lmdb::ConstAccessor<'_>,
	) -> Result<Option<T>, Error> {
		let res: lmdb::error::Result<&[u8]> = access.get(&**self.db(cf), key);
		match res.to_opt() {
			Ok(Some(mut res)) => match ser::deserialize(&mut res) {
				Ok(res) => Ok(Some(res)),
				Err(e) => Err(Error::SerErr(format!("{}", e))),
			},
			Ok(None) => Ok(None),
			Err(e) => Err(From::from(e)),
		}
	}

	/// Whether the provided key exists in the given column family
	pub fn exists(&self, cf: ColumnFamily, key: &[u8]) -> Result<bool, Error> {
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let access = txn.access();
		let res: lmdb::error::Result<&lmdb::Ignore> = access.get(&**self.db(cf), key);
		res.to_opt().map(|r| r.is_some()).map_err(From::from)
	}

	/// Produces an iterator of `Readable` types moving forward from the
	/// provided key prefix.
	pub fn iter<T: ser::Readable>(
		&self,
		cf: ColumnFamily,
		from: &[u8],
	) -> Result<SerIterator<T>, Error> {
		let db = self.db(cf).clone();
		let txn = Arc::new(lmdb::ReadTransaction::new(self.env.clone())?);
		let cursor = Arc::new(txn.cursor(db)?);
		Ok(SerIterator {
			tx: txn,
			cursor,
			seek: false,
			prefix: from.to_vec(),
			_marker: marker::PhantomData,
		})
	}

	/// Builds a new batch to be used with this store.
	pub fn batch(&self) -> Result<Batch<'_>, Error> {
		let txn = lmdb::WriteTransaction::new(self.env.clone())?;
		Ok(Batch { store: self, tx: txn })
	}
}

/// Batch to write multiple Writeables to the db in an atomic manner.
/// The batch is all-or-nothing across all column families: commit applies
/// everything, dropping the batch discards everything.
pub struct Batch<'a> {
	store: &'a ChainDb,
	tx: lmdb::WriteTransaction<'a>,
}

impl<'a> Batch<'a> {
	/// Writes a single key/value pair to the db
	pub fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> Result<(), Error> {
		self.tx
			.access()
			.put(&**self.store.db(cf), key, value, lmdb::put::Flags::empty())?;
		Ok(())
	}

	/// Writes a single key and its `Writeable` value to the db. Encapsulates
	/// serialization. Repeated puts of the same key within a batch are
	/// last-write-wins.
	pub fn put_ser<W: ser::Writeable>(
		&self,
		cf: ColumnFamily,
		key: &[u8],
		value: &W,
	) -> Result<(), Error> {
		let ser_value = ser::ser_vec(value);
		match ser_value {
			Ok(data) => self.put(cf, key, &data),
			Err(err) => Err(Error::SerErr(format!("{}", err))),
		}
	}

	/// Whether the provided key exists, taking the content of the current
	/// batch into account.
	pub fn exists(&self, cf: ColumnFamily, key: &[u8]) -> Result<bool, Error> {
		let access = self.tx.access();
		let res: lmdb::error::Result<&lmdb::Ignore> = access.get(&**self.store.db(cf), key);
		res.to_opt().map(|r| r.is_some()).map_err(From::from)
	}

	/// Produces an iterator of `Readable` types moving forward from the
	/// provided key.
	pub fn iter<T: ser::Readable>(
		&self,
		cf: ColumnFamily,
		from: &[u8],
	) -> Result<SerIterator<T>, Error> {
		self.store.iter(cf, from)
	}

	/// Gets a `Readable` value from the db, provided its key, taking the
	/// content of the current batch into account.
	pub fn get_ser<T: ser::Readable>(
		&self,
		cf: ColumnFamily,
		key: &[u8],
	) -> Result<Option<T>, Error> {
		let access = self.tx.access();
		self.store.get_ser_access(cf, key, &access)
	}

	/// Deletes a key/value pair from the db
	pub fn delete(&self, cf: ColumnFamily, key: &[u8]) -> Result<(), Error> {
		let res = self.tx.access().del_key(&**self.store.db(cf), key);
		// deleting a missing key is a no-op
		res.to_opt()?;
		Ok(())
	}

	/// Deletes all entries from the provided column family.
	pub fn delete_all(&self, cf: ColumnFamily) -> Result<(), Error> {
		self.tx.access().clear_db(&**self.store.db(cf))?;
		Ok(())
	}

	/// Writes the batch to db
	pub fn commit(self) -> Result<(), Error> {
		self.tx.commit()?;
		Ok(())
	}

	/// Creates a child of this batch. It will be merged with its parent on
	/// commit, abandoned otherwise.
	pub fn child(&mut self) -> Result<Batch<'_>, Error> {
		Ok(Batch {
			store: self.store,
			tx: self.tx.child_tx()?,
		})
	}
}

/// An iterator that produces Readable instances back. Wraps the lower level
/// DBIterator and deserializes the returned values.
pub struct SerIterator<T>
where
	T: ser::Readable,
{
	tx: Arc<lmdb::ReadTransaction<'static>>,
	cursor: Arc<lmdb::Cursor<'static, 'static>>,
	seek: bool,
	prefix: Vec<u8>,
	_marker: marker::PhantomData<T>,
}

impl<T> Iterator for SerIterator<T>
where
	T: ser::Readable,
{
	type Item = T;

	fn next(&mut self) -> Option<T> {
		let access = self.tx.access();
		let kv = if self.seek {
			Arc::get_mut(&mut self.cursor).unwrap().next(&access)
		} else {
			self.seek = true;
			Arc::get_mut(&mut self.cursor)
				.unwrap()
				.seek_range_k(&access, &self.prefix[..])
		};
		self.deser_if_prefix_match(kv)
	}
}

impl<T> SerIterator<T>
where
	T: ser::Readable,
{
	fn deser_if_prefix_match(&self, kv: Result<(&[u8], &[u8]), lmdb::Error>) -> Option<T> {
		match kv {
			Ok((k, v)) => {
				let plen = self.prefix.len();
				if plen == 0 || (k.len() >= plen && k[0..plen] == self.prefix[..]) {
					ser::deserialize(&mut &v[..]).ok()
				} else {
					None
				}
			}
			Err(_) => None,
		}
	}
}
