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

//! Base types that the block chain pipeline requires.

use crate::core::core::hash::{Hash, Hashed, ZERO_HASH};
use crate::core::core::{Block, BlockHeader};
use crate::core::pow::Difficulty;
use crate::core::ser::{self, Readable, Reader, Writeable, Writer};
use crate::util::secp::pedersen::Commitment;

bitflags! {
	/// Options for block validation
	pub struct Options: u32 {
		/// No flags
		const NONE = 0b0000_0001;
		/// Runs without checking the Proof of Work, mostly to make testing easier.
		const SKIP_POW = 0b0000_0010;
		/// Adds block while in syncing mode.
		const SYNC = 0b0000_0100;
		/// Block validation on a block we mined ourselves
		const MINE = 0b0000_1000;
	}
}

/// The two chain indices maintained by the node. The candidate chain is the
/// best known chain of validated headers, the confirmed chain is the best
/// chain with full blocks applied to the txhashset. The candidate chain may
/// run ahead of the confirmed chain while block bodies are being fetched.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChainIndex {
	/// Best known header chain
	Candidate,
	/// Best fully validated chain
	Confirmed,
}

/// Status of a block or header submitted to the chain for processing.
/// A rejection surfaces as an `Err` from the processing call instead.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum BlockStatus {
	/// Block is the "next" block, updating the chain head.
	Next,
	/// Block does not update the chain head and is a fork.
	Fork,
	/// Block updates the chain head via a (potentially disruptive) "reorg".
	/// Previous block was not our previous chain head.
	Reorg(u64),
	/// The block or header was already known.
	AlreadyKnown,
	/// The parent is unknown, the block is cached as an orphan.
	Orphan,
}

impl BlockStatus {
	/// Whether the block was accepted onto a chain (main or fork).
	pub fn is_accepted(&self) -> bool {
		match self {
			BlockStatus::Next | BlockStatus::Fork | BlockStatus::Reorg(_) => true,
			_ => false,
		}
	}
}

/// The tip of a fork. A handle to the fork ancestry from its leaf in the
/// blockchain tree. References the max height and the latest and previous
/// blocks for convenience.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Tip {
	/// Height of the tip (max height of the fork)
	pub height: u64,
	/// Last block pushed to the fork
	pub last_block_h: Hash,
	/// Previous block
	pub prev_block_h: Hash,
	/// Total difficulty accumulated on that fork
	pub total_difficulty: Difficulty,
}

impl Tip {
	/// Creates a new tip based on provided header.
	pub fn from_header(header: &BlockHeader) -> Tip {
		Tip {
			height: header.height,
			last_block_h: header.hash(),
			prev_block_h: header.prev_hash,
			total_difficulty: header.total_difficulty(),
		}
	}
}

impl Default for Tip {
	fn default() -> Tip {
		Tip {
			height: 0,
			last_block_h: ZERO_HASH,
			prev_block_h: ZERO_HASH,
			total_difficulty: Difficulty::min_dma(),
		}
	}
}

/// Serialization of a tip, required to save to datastore.
impl Writeable for Tip {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.height)?;
		writer.write_fixed_bytes(&self.last_block_h)?;
		writer.write_fixed_bytes(&self.prev_block_h)?;
		self.total_difficulty.write(writer)
	}
}

impl Readable for Tip {
	fn read(reader: &mut dyn Reader) -> Result<Tip, ser::Error> {
		let height = reader.read_u64()?;
		let last = Hash::read(reader)?;
		let prev = Hash::read(reader)?;
		let diff = Difficulty::read(reader)?;
		Ok(Tip {
			height,
			last_block_h: last,
			prev_block_h: prev,
			total_difficulty: diff,
		})
	}
}

/// Where a commitment currently lives in the output MMR: the (1-based) MMR
/// position of its leaf and the height of the block that created it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputLocation {
	/// Position of the leaf in the output MMR
	pub mmr_index: u64,
	/// Height of the block creating the output
	pub height: u64,
}

impl Writeable for OutputLocation {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.mmr_index)?;
		writer.write_u64(self.height)
	}
}

impl Readable for OutputLocation {
	fn read(reader: &mut dyn Reader) -> Result<OutputLocation, ser::Error> {
		Ok(OutputLocation {
			mmr_index: reader.read_u64()?,
			height: reader.read_u64()?,
		})
	}
}

/// An output spent by a given block, with the location it occupied.
/// Stored per-block so a rewind can restore the unspent bits cheaply.
#[derive(Debug, Clone, PartialEq)]
pub struct SpentOutput {
	/// The spent commitment
	pub commit: Commitment,
	/// The location the output occupied in the output MMR
	pub location: OutputLocation,
}

impl Writeable for SpentOutput {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.commit.write(writer)?;
		self.location.write(writer)
	}
}

impl Readable for SpentOutput {
	fn read(reader: &mut dyn Reader) -> Result<SpentOutput, ser::Error> {
		Ok(SpentOutput {
			commit: Commitment::read(reader)?,
			location: OutputLocation::read(reader)?,
		})
	}
}

/// The roots of the three MMRs as of a given state.
#[derive(Debug, Clone, PartialEq)]
pub struct TxHashSetRoots {
	/// Output MMR root
	pub output_root: Hash,
	/// Range proof MMR root
	pub rproof_root: Hash,
	/// Kernel MMR root
	pub kernel_root: Hash,
}

/// High level sync phase, derived from how far the confirmed chain trails
/// the candidate chain. The surrounding network layer refines this with
/// live peer information.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SyncPhase {
	/// Headers are being fetched and validated.
	SyncingHeaders,
	/// Full blocks are being fetched and applied.
	SyncingBlocks,
	/// Caught up with the network as far as we can tell.
	FullySynced,
}

/// A summary of the current chain state, exposed to the status endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainStatus {
	/// Derived sync phase
	pub sync_phase: SyncPhase,
	/// Tip of the candidate (header) chain
	pub candidate_tip: Tip,
	/// Tip of the confirmed chain
	pub confirmed_tip: Tip,
}

/// Trait the chain pipeline requires implementors for in order to process
/// blocks.
pub trait ChainAdapter {
	/// The blockchain pipeline has accepted this block as valid and added
	/// it to our chain.
	fn block_accepted(&self, block: &Block, status: BlockStatus);
}

/// Dummy adapter used as a placeholder for real implementations
pub struct NoopAdapter {}

impl ChainAdapter for NoopAdapter {
	fn block_accepted(&self, _block: &Block, _status: BlockStatus) {}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::core::core::BlockHeader;

	#[test]
	fn test_tip_ser() {
		let tip = Tip::from_header(&BlockHeader::default());
		let mut vec = Vec::new();
		ser::serialize(&mut vec, &tip).expect("serialization failed");
		let tip2: Tip = ser::deserialize(&mut &vec[..]).unwrap();
		assert_eq!(tip, tip2);
	}

	#[test]
	fn test_spent_output_ser() {
		let spent = SpentOutput {
			commit: Commitment::from_vec(vec![5; 33]),
			location: OutputLocation {
				mmr_index: 42,
				height: 7,
			},
		};
		let mut vec = Vec::new();
		ser::serialize(&mut vec, &spent).expect("serialization failed");
		let spent2: SpentOutput = ser::deserialize(&mut &vec[..]).unwrap();
		assert_eq!(spent, spent2);

		// and the per-block list form used by the SPENT_OUTPUTS family
		let list = vec![spent.clone(), spent];
		let mut vec = Vec::new();
		ser::serialize(&mut vec, &list).expect("serialization failed");
		let list2: Vec<SpentOutput> = ser::deserialize(&mut &vec[..]).unwrap();
		assert_eq!(list, list2);
	}
}
