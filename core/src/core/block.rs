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

//! Blocks and blockheaders

use crate::consensus::{self, reward, REWARD};
use crate::core::blind::BlindingFactor;
use crate::core::committed::{self, Committed};
use crate::core::hash::{DefaultHashable, Hash, Hashed, ZERO_HASH};
use crate::core::verifier_cache::VerifierCache;
use crate::core::{
	transaction, Input, Output, Transaction, TransactionBody, TxKernel, Weighting,
};
use crate::pow::{Difficulty, Proof, ProofOfWork};
use crate::ser::{self, Readable, Reader, Writeable, Writer};
use crate::util::secp::pedersen::Commitment;
use crate::util::{secp, static_secp_instance, RwLock};
use chrono::naive::{MAX_DATE, MIN_DATE};
use chrono::prelude::{DateTime, NaiveDateTime, Utc};
use chrono::Duration;
use std::sync::Arc;
use std::{error, fmt};

/// Errors thrown by Block validation
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Error {
	/// The sum of output minus input commitments does not
	/// match the sum of kernel commitments
	KernelSumMismatch,
	/// The total kernel sum on the block header is wrong
	InvalidTotalKernelSum,
	/// Same as above but for the coinbase part of a block, including reward
	CoinbaseSumMismatch,
	/// A block must have exactly one coinbase kernel and one coinbase output
	CoinbaseNotUnique,
	/// Restrict number of block inputs.
	TooHeavy,
	/// Block weight (based on inputs|outputs|kernels) exceeded.
	WeightExceeded,
	/// Kernel not valid due to lock_height exceeding block header height
	KernelLockHeight(u64),
	/// Underlying tx related error
	Transaction(transaction::Error),
	/// Underlying Secp256k1 error (signature validation or invalid public key
	/// typically)
	Secp(secp::Error),
	/// Underlying consensus error (sort order currently)
	Consensus(String),
	/// Underlying Merkle proof error
	MerkleProof,
	/// Error when verifying kernel sums via committed trait.
	Committed(committed::Error),
	/// Validation error relating to cut-through.
	/// Specifically the tx is spending its own output, which is not valid.
	CutThrough,
	/// Underlying serialization error.
	Serialization(ser::Error),
	/// Other unspecified error condition
	Other(String),
}

impl error::Error for Error {}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::KernelSumMismatch => write!(f, "Block kernel sum mismatch"),
			Error::InvalidTotalKernelSum => write!(f, "Invalid total kernel sum"),
			Error::CoinbaseSumMismatch => write!(f, "Coinbase sum mismatch"),
			Error::CoinbaseNotUnique => write!(f, "Multiple or missing coinbase"),
			Error::TooHeavy => write!(f, "Block too heavy"),
			Error::WeightExceeded => write!(f, "Block weight exceeded"),
			Error::KernelLockHeight(lock_height) => {
				write!(f, "Kernel lock height {} not met", lock_height)
			}
			Error::Transaction(e) => write!(f, "Invalid block transaction: {}", e),
			Error::Secp(e) => write!(f, "Secp error: {}", e),
			Error::Consensus(e) => write!(f, "Consensus error: {}", e),
			Error::MerkleProof => write!(f, "Merkle proof error"),
			Error::Committed(e) => write!(f, "Committed: {}", e),
			Error::CutThrough => write!(f, "Block spending its own output"),
			Error::Serialization(e) => write!(f, "Serialization error: {}", e),
			Error::Other(e) => write!(f, "Other block error: {}", e),
		}
	}
}

impl From<transaction::Error> for Error {
	fn from(e: transaction::Error) -> Error {
		Error::Transaction(e)
	}
}

impl From<committed::Error> for Error {
	fn from(e: committed::Error) -> Error {
		Error::Committed(e)
	}
}

impl From<secp::Error> for Error {
	fn from(e: secp::Error) -> Error {
		Error::Secp(e)
	}
}

impl From<ser::Error> for Error {
	fn from(e: ser::Error) -> Error {
		Error::Serialization(e)
	}
}

/// Some type safety around header versioning.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HeaderVersion(pub u16);

impl Default for HeaderVersion {
	fn default() -> HeaderVersion {
		HeaderVersion(1)
	}
}

impl HeaderVersion {
	/// The header version as u16 for the wire.
	pub fn into_u16(self) -> u16 {
		self.0
	}
}

impl PartialOrd for HeaderVersion {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		self.0.partial_cmp(&other.0)
	}
}

impl Writeable for HeaderVersion {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u16(self.0)
	}
}

impl Readable for HeaderVersion {
	fn read(reader: &mut dyn Reader) -> Result<HeaderVersion, ser::Error> {
		let version = reader.read_u16()?;
		Ok(HeaderVersion(version))
	}
}

/// Block header, fairly standard compared to other blockchains.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
	/// Version of the block
	pub version: HeaderVersion,
	/// Height of this block since the genesis block (height 0)
	pub height: u64,
	/// Hash of the block previous to this in the chain.
	pub prev_hash: Hash,
	/// Root hash of the header MMR at the previous header.
	pub prev_root: Hash,
	/// Timestamp at which the block was built.
	pub timestamp: DateTime<Utc>,
	/// Merklish root of all the commitments in the TxHashSet
	pub output_root: Hash,
	/// Merklish root of all range proofs in the TxHashSet
	pub range_proof_root: Hash,
	/// Merklish root of all transaction kernels in the TxHashSet
	pub kernel_root: Hash,
	/// Total accumulated sum of kernel offsets since genesis block.
	/// We can derive the kernel offset sum for *this* block from
	/// the total kernel offset of the previous block header.
	pub total_kernel_offset: BlindingFactor,
	/// Total size of the output MMR after applying this block
	pub output_mmr_size: u64,
	/// Total size of the kernel MMR after applying this block
	pub kernel_mmr_size: u64,
	/// Proof of work and related
	pub pow: ProofOfWork,
}
impl DefaultHashable for BlockHeader {}

impl Default for BlockHeader {
	fn default() -> BlockHeader {
		BlockHeader {
			version: HeaderVersion::default(),
			height: 0,
			timestamp: DateTime::<Utc>::from_utc(NaiveDateTime::from_timestamp(0, 0), Utc),
			prev_hash: ZERO_HASH,
			prev_root: ZERO_HASH,
			output_root: ZERO_HASH,
			range_proof_root: ZERO_HASH,
			kernel_root: ZERO_HASH,
			total_kernel_offset: BlindingFactor::zero(),
			output_mmr_size: 0,
			kernel_mmr_size: 0,
			pow: ProofOfWork::default(),
		}
	}
}

/// Serialization of a block header
impl Writeable for BlockHeader {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		if writer.serialization_mode() != ser::SerializationMode::Hash {
			self.write_pre_pow(writer)?;
		}
		self.pow.write(writer)?;
		Ok(())
	}
}

/// Deserialization of a block header
impl Readable for BlockHeader {
	fn read(reader: &mut dyn Reader) -> Result<BlockHeader, ser::Error> {
		let version = HeaderVersion::read(reader)?;
		let (height, timestamp) = ser_multiread!(reader, read_u64, read_i64);
		let prev_hash = Hash::read(reader)?;
		let prev_root = Hash::read(reader)?;
		let output_root = Hash::read(reader)?;
		let range_proof_root = Hash::read(reader)?;
		let kernel_root = Hash::read(reader)?;
		let total_kernel_offset = BlindingFactor::read(reader)?;
		let (output_mmr_size, kernel_mmr_size) = ser_multiread!(reader, read_u64, read_u64);
		let pow = ProofOfWork::read(reader)?;

		if timestamp > MAX_DATE.and_hms(0, 0, 0).timestamp()
			|| timestamp < MIN_DATE.and_hms(0, 0, 0).timestamp()
		{
			return Err(ser::Error::CorruptedData);
		}

		Ok(BlockHeader {
			version,
			height,
			timestamp: DateTime::<Utc>::from_utc(NaiveDateTime::from_timestamp(timestamp, 0), Utc),
			prev_hash,
			prev_root,
			output_root,
			range_proof_root,
			kernel_root,
			total_kernel_offset,
			output_mmr_size,
			kernel_mmr_size,
			pow,
		})
	}
}

impl BlockHeader {
	/// Write the pre-hash portion of the header
	pub fn write_pre_pow<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.version.write(writer)?;
		ser_multiwrite!(
			writer,
			[write_u64, self.height],
			[write_i64, self.timestamp.timestamp()]
		);
		self.prev_hash.write(writer)?;
		self.prev_root.write(writer)?;
		self.output_root.write(writer)?;
		self.range_proof_root.write(writer)?;
		self.kernel_root.write(writer)?;
		self.total_kernel_offset.write(writer)?;
		ser_multiwrite!(
			writer,
			[write_u64, self.output_mmr_size],
			[write_u64, self.kernel_mmr_size]
		);
		Ok(())
	}

	/// Return the pre-pow, unhashed
	/// Let the cuck(at)oo miner/verifier handle the hashing
	/// for consistency with how this call is performed everywhere
	/// else
	pub fn pre_pow(&self) -> Vec<u8> {
		let mut header_buf = vec![];
		{
			let mut writer = ser::BinWriter::new(&mut header_buf);
			self.write_pre_pow(&mut writer).unwrap();
			self.pow.write_pre_pow(&mut writer).unwrap();
			writer.write_u64(self.pow.nonce).unwrap();
		}
		header_buf
	}

	/// Total difficulty accumulated by the proof of work on this header
	pub fn total_difficulty(&self) -> Difficulty {
		self.pow.total_difficulty
	}

	/// The "overage" to use when verifying the kernel sums.
	/// For a block header the overage is 0 - reward.
	pub fn overage(&self) -> i64 {
		(REWARD as i64).checked_neg().unwrap_or(0)
	}

	/// The "total overage" to use when verifying the kernel sums for a full
	/// chain state. For a full chain state this is 0 - (height * reward).
	pub fn total_overage(&self, genesis_had_reward: bool) -> i64 {
		let mut reward_count = self.height;
		if genesis_had_reward {
			reward_count += 1;
		}

		((reward_count * REWARD) as i64).checked_neg().unwrap_or(0)
	}

	/// Total kernel offset for the chain state up to and including this block.
	pub fn total_kernel_offset(&self) -> BlindingFactor {
		self.total_kernel_offset.clone()
	}
}

impl fmt::Display for BlockHeader {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Header(height: {}, hash: {})", self.height, self.hash())
	}
}

/// A block as expressed in the Mimblewimble protocol. The reward is
/// non-explicit, assumed to be deducible from block height (similar to
/// bitcoin's schedule) and expressed as a global transaction fee (added v.H),
/// additive to the total of fees ever collected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
	/// The header with metadata and commitments to the rest of the data
	pub header: BlockHeader,
	/// The body - inputs/outputs/kernels
	pub body: TransactionBody,
}

impl Hashed for Block {
	/// The hash of the underlying block.
	fn hash(&self) -> Hash {
		self.header.hash()
	}
}

/// Implementation of Writeable for a block, defines how to write the block to a
/// binary writer. Differentiates between writing the block for the purpose of
/// full serialization and the one of just extracting a hash.
impl Writeable for Block {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.header.write(writer)?;

		if writer.serialization_mode() == ser::SerializationMode::Full {
			self.body.write(writer)?;
		}
		Ok(())
	}
}

/// Implementation of Readable for a block, defines how to read a full block
/// from a binary stream.
impl Readable for Block {
	fn read(reader: &mut dyn Reader) -> Result<Block, ser::Error> {
		let header = BlockHeader::read(reader)?;

		let body = TransactionBody::read(reader)?;

		// Now "lightweight" validation of the block.
		// Treat any validation issues as data corruption.
		// An example of this would be reading a block
		// that exceeded the allowed number of inputs.
		body.validate_read(Weighting::AsBlock)
			.map_err(|_| ser::Error::CorruptedData)?;

		Ok(Block { header, body })
	}
}

/// Provides all information from a block that allows the calculation of total
/// Pedersen commitment.
impl Committed for Block {
	fn inputs_committed(&self) -> Vec<Commitment> {
		self.body.inputs_committed()
	}

	fn outputs_committed(&self) -> Vec<Commitment> {
		self.body.outputs_committed()
	}

	fn kernels_committed(&self) -> Vec<Commitment> {
		self.body.kernels_committed()
	}
}

/// Default properties for a block, everything zeroed out and empty vectors.
impl Default for Block {
	fn default() -> Block {
		Block {
			header: Default::default(),
			body: Default::default(),
		}
	}
}

impl Block {
	/// Builds a new block from the header of the previous block, a vector of
	/// transactions and the reward information. Checks
	/// that all transactions are valid and calculates the Merkle tree.
	pub fn new(
		prev: &BlockHeader,
		txs: Vec<Transaction>,
		difficulty: Difficulty,
		reward_output: (Output, TxKernel),
	) -> Result<Block, Error> {
		let mut block =
			Block::from_reward(prev, txs, reward_output.0, reward_output.1, difficulty)?;

		// Now set the pow on the header so block hashing works as expected.
		{
			let proof_size = crate::global::proofsize();
			block.header.pow.proof = Proof::random(proof_size);
		}

		Ok(block)
	}

	/// Builds a new block ready to mine from the header of the previous block,
	/// a vector of transactions and the reward information.
	pub fn from_reward(
		prev: &BlockHeader,
		txs: Vec<Transaction>,
		reward_out: Output,
		reward_kern: TxKernel,
		difficulty: Difficulty,
	) -> Result<Block, Error> {
		// A block is just a big transaction, aggregate as such.
		let agg_tx = transaction::aggregate(txs)?;

		// Now add the reward output and reward kernel to the aggregate tx.
		// At this point the tx is technically invalid but the tx body is
		// valid if we account for the reward (i.e. as a block).
		let agg_tx = agg_tx.with_output(reward_out).with_kernel(reward_kern);

		// Now accumulate the total offset from the previous block header.
		let total_kernel_offset = committed::sum_kernel_offsets(
			vec![agg_tx.offset.clone(), prev.total_kernel_offset()],
			vec![],
		)?;

		// Determine the height and associated version for the new header.
		let height = prev.height + 1;
		let version = consensus::header_version(height);

		// Timestamps must be strictly increasing along a chain.
		let now = Utc::now().timestamp();
		let mut timestamp = DateTime::<Utc>::from_utc(NaiveDateTime::from_timestamp(now, 0), Utc);
		if timestamp <= prev.timestamp {
			timestamp = prev.timestamp + Duration::seconds(1);
		}

		// Now build the block with all the above information.
		// Note: We have not validated the block here.
		// Caller must validate the block as necessary.
		let block = Block {
			header: BlockHeader {
				version,
				height,
				timestamp,
				prev_hash: prev.hash(),
				total_kernel_offset,
				pow: ProofOfWork {
					total_difficulty: difficulty + prev.pow.total_difficulty,
					..Default::default()
				},
				..Default::default()
			},
			body: agg_tx.body,
		};

		Ok(block)
	}

	/// Build a new empty block from a specified header
	pub fn with_header(header: BlockHeader) -> Block {
		Block {
			header,
			..Default::default()
		}
	}

	/// Get inputs
	pub fn inputs(&self) -> &Vec<Input> {
		&self.body.inputs
	}

	/// Get outputs
	pub fn outputs(&self) -> &Vec<Output> {
		&self.body.outputs
	}

	/// Get kernels
	pub fn kernels(&self) -> &Vec<TxKernel> {
		&self.body.kernels
	}

	/// Sum of all fees (inputs less outputs) in the block
	pub fn total_fees(&self) -> u64 {
		self.body.fee()
	}

	/// "Lightweight" validation that we can perform quickly during
	/// read/deserialization. Subset of full validation that skips expensive
	/// verification steps, specifically - rangeproofs and kernel signatures.
	pub fn validate_read(&self) -> Result<(), Error> {
		self.body.validate_read(Weighting::AsBlock)?;
		self.verify_kernel_lock_heights()?;
		Ok(())
	}

	/// Validates all the elements in a block that can be checked without
	/// additional data. Includes commitment sums and kernels, reward, etc.
	/// Returns the kernel sum so the caller can compare against the running
	/// total in BlockSums.
	pub fn validate(
		&self,
		prev_kernel_offset: &BlindingFactor,
		verifier: Arc<RwLock<dyn VerifierCache>>,
	) -> Result<Commitment, Error> {
		self.body.validate(Weighting::AsBlock, verifier)?;

		self.verify_kernel_lock_heights()?;
		self.verify_coinbase()?;

		// take the kernel offset for this block (block offset minus previous)
		// and verify.body.outputs and kernel sums
		let block_kernel_offset = self.block_kernel_offset(prev_kernel_offset.clone())?;
		let (_utxo_sum, kernel_sum) =
			self.verify_kernel_sums(self.header.overage(), block_kernel_offset)?;

		Ok(kernel_sum)
	}

	// The kernel offset for *this* block.
	// The header carries the total accumulated offset so we derive this
	// block's offset from the previous total.
	fn block_kernel_offset(
		&self,
		prev_kernel_offset: BlindingFactor,
	) -> Result<BlindingFactor, Error> {
		let offset = if self.header.total_kernel_offset() == prev_kernel_offset {
			// special case when the sum hasn't changed (typically an empty block),
			// zero isn't a valid private key but it's a valid blinding factor
			BlindingFactor::zero()
		} else {
			committed::sum_kernel_offsets(
				vec![self.header.total_kernel_offset()],
				vec![prev_kernel_offset],
			)?
		};
		Ok(offset)
	}

	/// Validate the coinbase outputs generated by miners.
	/// Check the sum of coinbase-marked outputs match
	/// the sum of coinbase-marked kernels accounting for fees.
	pub fn verify_coinbase(&self) -> Result<(), Error> {
		let cb_outs = self
			.body
			.outputs
			.iter()
			.filter(|out| out.is_coinbase())
			.collect::<Vec<&Output>>();

		let cb_kerns = self
			.body
			.kernels
			.iter()
			.filter(|kernel| kernel.is_coinbase())
			.collect::<Vec<&TxKernel>>();

		// A block must contain exactly one coinbase output and one coinbase
		// kernel.
		if cb_outs.len() != 1 || cb_kerns.len() != 1 {
			return Err(Error::CoinbaseNotUnique);
		}

		{
			let secp = static_secp_instance();
			let secp = secp.lock();
			let over_commit = secp.commit_value(reward(self.total_fees()))?;

			let out_adjust_sum =
				secp.commit_sum(map_vec!(cb_outs, |x| x.commitment()), vec![over_commit])?;
			let kerns_sum = secp.commit_sum(cb_kerns.iter().map(|x| x.excess).collect(), vec![])?;

			// Verify the kernel sum equals the output sum accounting for block fees.
			if kerns_sum != out_adjust_sum {
				return Err(Error::CoinbaseSumMismatch);
			}
		}

		Ok(())
	}

	// Verify that no kernel has a lock_height greater than the height of this
	// block.
	fn verify_kernel_lock_heights(&self) -> Result<(), Error> {
		for k in &self.body.kernels {
			// check we have no kernels with lock_heights greater than current height
			// no tx can be included in a block earlier than its lock_height
			if k.lock_height > self.header.height {
				return Err(Error::KernelLockHeight(k.lock_height));
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::core::verifier_cache::LruVerifierCache;
	use crate::global;
	use crate::libtx::{build, reward};
	use crate::util::secp::key::SecretKey;
	use rand::thread_rng;

	fn verifier_cache() -> Arc<RwLock<dyn VerifierCache>> {
		Arc::new(RwLock::new(LruVerifierCache::new()))
	}

	fn new_secret_key() -> SecretKey {
		let secp = static_secp_instance();
		let secp = secp.lock();
		SecretKey::new(&secp, &mut thread_rng())
	}

	fn new_block(txs: Vec<Transaction>, prev: &BlockHeader) -> Block {
		let fees = txs.iter().map(|tx| tx.fee()).sum();
		let reward_output = reward::output(&new_secret_key(), fees).unwrap();
		Block::new(prev, txs, Difficulty::min_dma(), reward_output).unwrap()
	}

	#[test]
	fn empty_block_sums() {
		global::set_local_chain_type(global::ChainTypes::AutomatedTesting);
		let prev = BlockHeader::default();
		let b = new_block(vec![], &prev);
		// An empty block is still a valid block with a single coinbase
		// output and kernel.
		assert_eq!(b.inputs().len(), 0);
		assert_eq!(b.outputs().len(), 1);
		assert_eq!(b.kernels().len(), 1);
		b.validate(&BlindingFactor::zero(), verifier_cache())
			.unwrap();
	}

	#[test]
	fn block_with_tx_validates() {
		global::set_local_chain_type(global::ChainTypes::AutomatedTesting);
		let k = (0..3).map(|_| new_secret_key()).collect::<Vec<_>>();
		let tx = build::transaction(
			vec![(10, k[0].clone())],
			vec![(6, k[1].clone()), (2, k[2].clone())],
			2,
		)
		.unwrap();

		let prev = BlockHeader::default();
		let b = new_block(vec![tx], &prev);

		assert_eq!(b.inputs().len(), 1);
		assert_eq!(b.outputs().len(), 3);
		assert_eq!(b.kernels().len(), 2);
		b.validate(&BlindingFactor::zero(), verifier_cache())
			.unwrap();
	}

	#[test]
	fn block_reward_tampering_detected() {
		global::set_local_chain_type(global::ChainTypes::AutomatedTesting);
		let prev = BlockHeader::default();
		let mut b = new_block(vec![], &prev);
		// tamper with the coinbase output features
		let cb_idx = b.body.outputs.iter().position(|o| o.is_coinbase()).unwrap();
		b.body.outputs[cb_idx].features = transaction::OutputFeatures::Plain;
		assert_eq!(
			b.verify_coinbase(),
			Err(Error::CoinbaseNotUnique)
		);
	}

	#[test]
	fn block_kernel_lock_height_rejected() {
		global::set_local_chain_type(global::ChainTypes::AutomatedTesting);
		let prev = BlockHeader::default();
		let mut b = new_block(vec![], &prev);
		// a kernel locked beyond this block's height must be rejected
		b.body.kernels[0].lock_height = b.header.height + 1;
		let lock_height = b.body.kernels[0].lock_height;
		assert_eq!(
			b.validate_read(),
			Err(Error::KernelLockHeight(lock_height))
		);
	}

	#[test]
	fn block_header_ser_roundtrip() {
		global::set_local_chain_type(global::ChainTypes::AutomatedTesting);
		let prev = BlockHeader::default();
		let b = new_block(vec![], &prev);

		let mut vec = Vec::new();
		ser::serialize(&mut vec, &b.header).expect("serialization failed");
		let header2: BlockHeader = ser::deserialize(&mut &vec[..]).unwrap();
		assert_eq!(b.header, header2);
		assert_eq!(b.header.hash(), header2.hash());
	}

	#[test]
	fn block_ser_roundtrip() {
		global::set_local_chain_type(global::ChainTypes::AutomatedTesting);
		let k = (0..2).map(|_| new_secret_key()).collect::<Vec<_>>();
		let tx = build::transaction(vec![(8, k[0].clone())], vec![(5, k[1].clone())], 3).unwrap();
		let prev = BlockHeader::default();
		let b = new_block(vec![tx], &prev);

		let mut vec = Vec::new();
		ser::serialize(&mut vec, &b).expect("serialization failed");
		let b2: Block = ser::deserialize(&mut &vec[..]).unwrap();
		assert_eq!(b.hash(), b2.hash());
		assert_eq!(b.body, b2.body);
	}
}
