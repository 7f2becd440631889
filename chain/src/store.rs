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

//! Implements storage primitives required by the chain

use crate::core::consensus::HeaderInfo;
use crate::core::core::hash::{Hash, Hashed};
use crate::core::core::{Block, BlockHeader, BlockSums};
use crate::core::pow::Difficulty;
use crate::error::{Error, ErrorKind};
use crate::types::{ChainIndex, OutputLocation, SpentOutput, Tip};
use crate::util::secp::pedersen::Commitment;
use byteorder::{BigEndian, WriteBytesExt};
use grinpp_store as store;
use grinpp_store::{option_to_not_found, ColumnFamily};

/// Key in the DEFAULT column family holding the schema version.
const VERSION_KEY: &[u8] = b"VERSION";
/// Key in the DEFAULT column family holding the candidate chain tip.
const TIP_CANDIDATE_KEY: &[u8] = b"TIP_CANDIDATE";
/// Key in the DEFAULT column family holding the confirmed chain tip.
const TIP_CONFIRMED_KEY: &[u8] = b"TIP_CONFIRMED";

/// Prefix in the DEFAULT column family for the candidate height index.
const CANDIDATE_HEIGHT_PREFIX: u8 = b'c';
/// Prefix in the DEFAULT column family for the confirmed height index.
const CONFIRMED_HEIGHT_PREFIX: u8 = b'f';

fn height_key(chain: ChainIndex, height: u64) -> Vec<u8> {
	let prefix = match chain {
		ChainIndex::Candidate => CANDIDATE_HEIGHT_PREFIX,
		ChainIndex::Confirmed => CONFIRMED_HEIGHT_PREFIX,
	};
	let mut key = Vec::with_capacity(9);
	key.push(prefix);
	key.write_u64::<BigEndian>(height).unwrap();
	key
}

/// All chain-related database access and serialization. Thin wrapper around
/// the column families of the underlying db.
pub struct ChainStore {
	db: store::ChainDb,
}

impl ChainStore {
	/// Create new chain store
	pub fn new(db_root: &str) -> Result<ChainStore, Error> {
		let db = store::ChainDb::open(db_root)?;
		Ok(ChainStore { db })
	}

	/// The current tip of the given chain index.
	pub fn tip(&self, chain: ChainIndex) -> Result<Tip, Error> {
		let key = match chain {
			ChainIndex::Candidate => TIP_CANDIDATE_KEY,
			ChainIndex::Confirmed => TIP_CONFIRMED_KEY,
		};
		option_to_not_found(self.db.get_ser(ColumnFamily::Default, key), "CHAIN TIP")
			.map_err(Into::into)
	}

	/// The confirmed chain tip ("the head").
	pub fn head(&self) -> Result<Tip, Error> {
		self.tip(ChainIndex::Confirmed)
	}

	/// Header of the confirmed chain tip.
	pub fn head_header(&self) -> Result<BlockHeader, Error> {
		let head = self.head()?;
		self.get_block_header(&head.last_block_h)
	}

	/// Get full block by hash.
	pub fn get_block(&self, h: &Hash) -> Result<Block, Error> {
		option_to_not_found(
			self.db.get_ser(ColumnFamily::Block, h.as_bytes()),
			&format!("BLOCK: {}", h),
		)
		.map_err(Into::into)
	}

	/// Does this full block exist in the db?
	pub fn block_exists(&self, h: &Hash) -> Result<bool, Error> {
		self.db
			.exists(ColumnFamily::Block, h.as_bytes())
			.map_err(Into::into)
	}

	/// Get block header by hash.
	pub fn get_block_header(&self, h: &Hash) -> Result<BlockHeader, Error> {
		option_to_not_found(
			self.db.get_ser(ColumnFamily::Header, h.as_bytes()),
			&format!("BLOCK HEADER: {}", h),
		)
		.map_err(Into::into)
	}

	/// Get previous header.
	pub fn get_previous_header(&self, header: &BlockHeader) -> Result<BlockHeader, Error> {
		self.get_block_header(&header.prev_hash)
	}

	/// Get block sums for the block hash.
	pub fn get_block_sums(&self, h: &Hash) -> Result<BlockSums, Error> {
		option_to_not_found(
			self.db.get_ser(ColumnFamily::BlockSums, h.as_bytes()),
			&format!("BLOCK SUMS: {}", h),
		)
		.map_err(Into::into)
	}

	/// Get the position and originating height of the provided output
	/// commitment.
	pub fn get_output_pos(&self, commit: &Commitment) -> Result<OutputLocation, Error> {
		option_to_not_found(
			self.db.get_ser(ColumnFamily::OutputPos, &commit.0),
			&format!("OUTPUT POS: {:?}", commit),
		)
		.map_err(Into::into)
	}

	/// The hash at the given height on the given chain index.
	pub fn get_header_hash_by_height(
		&self,
		chain: ChainIndex,
		height: u64,
	) -> Result<Hash, Error> {
		option_to_not_found(
			self.db
				.get_ser(ColumnFamily::Default, &height_key(chain, height)),
			&format!("HASH AT HEIGHT: {}", height),
		)
		.map_err(Into::into)
	}

	/// The header at the given height on the given chain index.
	pub fn get_header_by_height(
		&self,
		chain: ChainIndex,
		height: u64,
	) -> Result<BlockHeader, Error> {
		let hash = self.get_header_hash_by_height(chain, height)?;
		self.get_block_header(&hash)
	}

	/// Builds a new batch to be used with this store.
	pub fn batch(&self) -> Result<Batch<'_>, Error> {
		Ok(Batch {
			db: self.db.batch()?,
		})
	}
}

/// An atomic batch in which all changes can be committed all at once or
/// discarded on error.
pub struct Batch<'a> {
	/// The underlying db batch.
	pub db: store::Batch<'a>,
}

impl<'a> Batch<'a> {
	/// The tip of the given chain index.
	pub fn tip(&self, chain: ChainIndex) -> Result<Tip, Error> {
		let key = match chain {
			ChainIndex::Candidate => TIP_CANDIDATE_KEY,
			ChainIndex::Confirmed => TIP_CONFIRMED_KEY,
		};
		option_to_not_found(self.db.get_ser(ColumnFamily::Default, key), "CHAIN TIP")
			.map_err(Into::into)
	}

	/// The candidate (header) chain tip.
	pub fn candidate_tip(&self) -> Result<Tip, Error> {
		self.tip(ChainIndex::Candidate)
	}

	/// The confirmed chain tip.
	pub fn confirmed_tip(&self) -> Result<Tip, Error> {
		self.tip(ChainIndex::Confirmed)
	}

	/// Header of the confirmed chain tip.
	pub fn head_header(&self) -> Result<BlockHeader, Error> {
		let head = self.confirmed_tip()?;
		self.get_block_header(&head.last_block_h)
	}

	/// Save the candidate chain tip.
	pub fn save_candidate_tip(&self, t: &Tip) -> Result<(), Error> {
		self.db
			.put_ser(ColumnFamily::Default, TIP_CANDIDATE_KEY, t)
			.map_err(Into::into)
	}

	/// Save the confirmed chain tip.
	pub fn save_confirmed_tip(&self, t: &Tip) -> Result<(), Error> {
		self.db
			.put_ser(ColumnFamily::Default, TIP_CONFIRMED_KEY, t)
			.map_err(Into::into)
	}

	/// Save the db schema version.
	pub fn save_db_version(&self) -> Result<(), Error> {
		self.db
			.put_ser(ColumnFamily::Default, VERSION_KEY, &store::lmdb::DB_VERSION)
			.map_err(Into::into)
	}

	/// The db schema version, if one has been saved.
	pub fn get_db_version(&self) -> Result<Option<u8>, Error> {
		self.db
			.get_ser(ColumnFamily::Default, VERSION_KEY)
			.map_err(Into::into)
	}

	/// Save the full block. Note: existing entries are overwritten,
	/// last-write wins within a batch.
	pub fn save_block(&self, b: &Block) -> Result<(), Error> {
		self.db
			.put_ser(ColumnFamily::Block, b.hash().as_bytes(), b)
			.map_err(Into::into)
	}

	/// Delete a full block. Does not touch the header.
	pub fn delete_block(&self, bh: &Hash) -> Result<(), Error> {
		self.db
			.delete(ColumnFamily::Block, bh.as_bytes())
			.map_err(Into::into)
	}

	/// Save the block header.
	pub fn save_block_header(&self, header: &BlockHeader) -> Result<(), Error> {
		self.db
			.put_ser(ColumnFamily::Header, header.hash().as_bytes(), header)
			.map_err(Into::into)
	}

	/// Get full block by hash.
	pub fn get_block(&self, h: &Hash) -> Result<Block, Error> {
		option_to_not_found(
			self.db.get_ser(ColumnFamily::Block, h.as_bytes()),
			&format!("BLOCK: {}", h),
		)
		.map_err(Into::into)
	}

	/// Does this full block exist in the db?
	pub fn block_exists(&self, h: &Hash) -> Result<bool, Error> {
		self.db
			.exists(ColumnFamily::Block, h.as_bytes())
			.map_err(Into::into)
	}

	/// Get block header by hash.
	pub fn get_block_header(&self, h: &Hash) -> Result<BlockHeader, Error> {
		option_to_not_found(
			self.db.get_ser(ColumnFamily::Header, h.as_bytes()),
			&format!("BLOCK HEADER: {}", h),
		)
		.map_err(Into::into)
	}

	/// Does this block header exist in the db?
	pub fn header_exists(&self, h: &Hash) -> Result<bool, Error> {
		self.db
			.exists(ColumnFamily::Header, h.as_bytes())
			.map_err(Into::into)
	}

	/// Get previous header.
	pub fn get_previous_header(&self, header: &BlockHeader) -> Result<BlockHeader, Error> {
		self.get_block_header(&header.prev_hash)
	}

	/// Save the block sums for the block hash.
	pub fn save_block_sums(&self, h: &Hash, sums: &BlockSums) -> Result<(), Error> {
		self.db
			.put_ser(ColumnFamily::BlockSums, h.as_bytes(), sums)
			.map_err(Into::into)
	}

	/// Get block sums for the block hash.
	pub fn get_block_sums(&self, h: &Hash) -> Result<BlockSums, Error> {
		option_to_not_found(
			self.db.get_ser(ColumnFamily::BlockSums, h.as_bytes()),
			&format!("BLOCK SUMS: {}", h),
		)
		.map_err(Into::into)
	}

	/// Delete the block sums for the block hash.
	pub fn delete_block_sums(&self, h: &Hash) -> Result<(), Error> {
		self.db
			.delete(ColumnFamily::BlockSums, h.as_bytes())
			.map_err(Into::into)
	}

	/// Save the output position and originating height for the commitment.
	pub fn save_output_pos(
		&self,
		commit: &Commitment,
		location: &OutputLocation,
	) -> Result<(), Error> {
		self.db
			.put_ser(ColumnFamily::OutputPos, &commit.0, location)
			.map_err(Into::into)
	}

	/// Get the position and originating height for the commitment.
	pub fn get_output_pos(&self, commit: &Commitment) -> Result<OutputLocation, Error> {
		option_to_not_found(
			self.db.get_ser(ColumnFamily::OutputPos, &commit.0),
			&format!("OUTPUT POS: {:?}", commit),
		)
		.map_err(Into::into)
	}

	/// Delete a single output position entry.
	pub fn delete_output_pos(&self, commit: &Commitment) -> Result<(), Error> {
		self.db
			.delete(ColumnFamily::OutputPos, &commit.0)
			.map_err(Into::into)
	}

	/// Clear the entire output position index (rebuilt during a txhashset
	/// rebuild).
	pub fn clear_output_pos(&self) -> Result<(), Error> {
		self.db
			.delete_all(ColumnFamily::OutputPos)
			.map_err(Into::into)
	}

	/// Save the list of outputs spent by the given block.
	pub fn save_spent_outputs(&self, h: &Hash, spent: &Vec<SpentOutput>) -> Result<(), Error> {
		self.db
			.put_ser(ColumnFamily::SpentOutputs, h.as_bytes(), spent)
			.map_err(Into::into)
	}

	/// The list of outputs spent by the given block.
	pub fn get_spent_outputs(&self, h: &Hash) -> Result<Vec<SpentOutput>, Error> {
		option_to_not_found(
			self.db.get_ser(ColumnFamily::SpentOutputs, h.as_bytes()),
			&format!("SPENT OUTPUTS: {}", h),
		)
		.map_err(Into::into)
	}

	/// Delete the spent output list for the given block.
	pub fn delete_spent_outputs(&self, h: &Hash) -> Result<(), Error> {
		self.db
			.delete(ColumnFamily::SpentOutputs, h.as_bytes())
			.map_err(Into::into)
	}

	/// Record the header hash at its height on the given chain index.
	pub fn save_header_height(
		&self,
		chain: ChainIndex,
		header: &BlockHeader,
	) -> Result<(), Error> {
		self.db
			.put_ser(
				ColumnFamily::Default,
				&height_key(chain, header.height),
				&header.hash(),
			)
			.map_err(Into::into)
	}

	/// Delete the height index entry at the given height.
	pub fn delete_header_height(&self, chain: ChainIndex, height: u64) -> Result<(), Error> {
		self.db
			.delete(ColumnFamily::Default, &height_key(chain, height))
			.map_err(Into::into)
	}

	/// The hash at the given height on the given chain index.
	pub fn get_header_hash_by_height(
		&self,
		chain: ChainIndex,
		height: u64,
	) -> Result<Hash, Error> {
		option_to_not_found(
			self.db
				.get_ser(ColumnFamily::Default, &height_key(chain, height)),
			&format!("HASH AT HEIGHT: {}", height),
		)
		.map_err(Into::into)
	}

	/// The header at the given height on the given chain index.
	pub fn get_header_by_height(
		&self,
		chain: ChainIndex,
		height: u64,
	) -> Result<BlockHeader, Error> {
		let hash = self.get_header_hash_by_height(chain, height)?;
		self.get_block_header(&hash)
	}

	/// Whether the provided header is on the given chain index, based on the
	/// height index.
	pub fn is_on_chain(&self, chain: ChainIndex, header: &BlockHeader) -> Result<bool, Error> {
		match self.get_header_hash_by_height(chain, header.height) {
			Ok(hash) => Ok(hash == header.hash()),
			Err(e) => match e.kind() {
				ErrorKind::StoreErr(store::Error::NotFoundErr(_), _) => Ok(false),
				_ => Err(e),
			},
		}
	}

	/// Walk the two header ancestries back until they meet.
	/// The headers are expected to share a common ancestor (the genesis block
	/// in the worst case).
	pub fn find_common_ancestor(
		&self,
		h1: &BlockHeader,
		h2: &BlockHeader,
	) -> Result<BlockHeader, Error> {
		let mut a = h1.clone();
		let mut b = h2.clone();
		while a.height > b.height {
			a = self.get_previous_header(&a)?;
		}
		while b.height > a.height {
			b = self.get_previous_header(&b)?;
		}
		while a.hash() != b.hash() {
			if a.height == 0 {
				return Err(ErrorKind::Other("no common ancestor".to_owned()).into());
			}
			a = self.get_previous_header(&a)?;
			b = self.get_previous_header(&b)?;
		}
		Ok(a)
	}

	/// The hashes of all blocks on the ancestry path from `from` (exclusive)
	/// to `to` (inclusive), in increasing height order.
	pub fn hashes_between(
		&self,
		from: &BlockHeader,
		to: &BlockHeader,
	) -> Result<Vec<Hash>, Error> {
		let mut hashes = vec![];
		let mut current = to.clone();
		while current.hash() != from.hash() {
			if current.height == 0 {
				return Err(ErrorKind::Other("headers not on same ancestry".to_owned()).into());
			}
			hashes.push(current.hash());
			current = self.get_previous_header(&current)?;
		}
		hashes.reverse();
		Ok(hashes)
	}

	/// Commit the batch, writing all changes atomically.
	pub fn commit(self) -> Result<(), Error> {
		self.db.commit().map_err(Into::into)
	}

	/// Creates a child of this batch, merged with its parent on commit,
	/// abandoned otherwise.
	pub fn child(&mut self) -> Result<Batch<'_>, Error> {
		Ok(Batch {
			db: self.db.child()?,
		})
	}
}

/// An iterator on blocks, from latest to earliest, specialized to return
/// information pertaining to block difficulty calculation (timestamp and
/// previous difficulties). Mostly used by the consensus next difficulty
/// calculation.
pub struct DifficultyIter<'a> {
	start: Hash,
	store: Option<&'a ChainStore>,
	batch: Option<&'a Batch<'a>>,

	// maintain state for both the "next" header in this iteration
	// and its previous header in the chain ("next next" in the iteration)
	// so we effectively read-ahead and only need a single lookup per iteration
	header: Option<BlockHeader>,
	prev_header: Option<BlockHeader>,
}

impl<'a> DifficultyIter<'a> {
	/// Build a new iterator using the provided chain store and starting from
	/// the provided block hash.
	pub fn from<'b>(start: Hash, store: &'b ChainStore) -> DifficultyIter<'b> {
		DifficultyIter {
			start,
			store: Some(store),
			batch: None,
			header: None,
			prev_header: None,
		}
	}

	/// Build a new iterator using the provided chain store batch and starting
	/// from the provided block hash.
	pub fn from_batch<'b>(start: Hash, batch: &'b Batch<'b>) -> DifficultyIter<'b> {
		DifficultyIter {
			start,
			store: None,
			batch: Some(batch),
			header: None,
			prev_header: None,
		}
	}

	fn get_header(&self, hash: &Hash) -> Result<BlockHeader, Error> {
		if let Some(batch) = self.batch {
			batch.get_block_header(hash)
		} else if let Some(store) = self.store {
			store.get_block_header(hash)
		} else {
			Err(ErrorKind::Other("no source for difficulty iter".to_owned()).into())
		}
	}
}

impl<'a> Iterator for DifficultyIter<'a> {
	type Item = HeaderInfo;

	fn next(&mut self) -> Option<Self::Item> {
		// Get both header and previous_header if this is the initial iteration.
		// Otherwise move prev_header to header and get the next prev_header.
		self.header = if self.header.is_none() {
			self.get_header(&self.start).ok()
		} else {
			self.prev_header.clone()
		};

		// If we have a header we can do this iteration.
		// Otherwise we are done.
		if let Some(header) = self.header.clone() {
			self.prev_header = self.get_header(&header.prev_hash).ok();

			let prev_difficulty = self
				.prev_header
				.clone()
				.map_or(Difficulty::zero(), |x| x.total_difficulty());
			let difficulty = header.total_difficulty() - prev_difficulty;
			let scaling = header.pow.secondary_scaling;

			Some(HeaderInfo::new(
				header.timestamp.timestamp() as u64,
				difficulty,
				scaling,
				header.pow.is_secondary(),
			))
		} else {
			None
		}
	}
}
