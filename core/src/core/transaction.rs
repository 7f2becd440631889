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

//! Transactions

use crate::consensus;
use crate::core::blind::BlindingFactor;
use crate::core::committed::{self, Committed};
use crate::core::hash::{DefaultHashable, Hash, Hashed};
use crate::core::verifier_cache::VerifierCache;
use crate::ser::{
	self, FixedLength, PMMRable, Readable, Reader, VerifySortedAndUnique, Writeable, Writer,
};
use crate::util::secp::pedersen::{Commitment, RangeProof};
use crate::util::secp::{self, aggsig};
use crate::util::{static_secp_instance, RwLock};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::{error, fmt};

/// Errors thrown by Transaction validation
#[derive(Clone, Eq, Debug, PartialEq)]
pub enum Error {
	/// Underlying Secp256k1 error (signature validation or invalid public key
	/// typically)
	Secp(secp::Error),
	/// The sum of output minus input commitments does not
	/// match the sum of kernel commitments
	KernelSumMismatch,
	/// Restrict tx total weight.
	TooHeavy,
	/// Error originating from an invalid lock-height
	LockHeight(u64),
	/// Range proof validation error
	RangeProof,
	/// Error originating from an invalid Merkle proof
	MerkleProof,
	/// Error when verifying kernel sums via committed trait.
	Committed(committed::Error),
	/// Error when sums do not verify correctly during tx aggregation.
	/// Likely a "double spend" across two unconfirmed txs.
	AggregationError,
	/// Validation error relating to cut-through (tx is spending its own
	/// output).
	CutThrough,
	/// Validation error relating to output features.
	/// It is invalid for a transaction to contain a coinbase output, for
	/// example.
	InvalidOutputFeatures,
	/// Validation error relating to kernel features.
	/// It is invalid for a transaction to contain a coinbase kernel, for
	/// example.
	InvalidKernelFeatures,
	/// Signature verification error.
	IncorrectSignature,
	/// Underlying serialization error.
	Serialization(ser::Error),
}

impl error::Error for Error {}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::Secp(e) => write!(f, "Secp error: {}", e),
			Error::KernelSumMismatch => write!(f, "Kernel sum mismatch"),
			Error::TooHeavy => write!(f, "Tx too heavy"),
			Error::LockHeight(lock_height) => write!(f, "Invalid lock height {}", lock_height),
			Error::RangeProof => write!(f, "Range proof error"),
			Error::MerkleProof => write!(f, "Merkle proof error"),
			Error::Committed(e) => write!(f, "Committed: {}", e),
			Error::AggregationError => write!(f, "Aggregation error"),
			Error::CutThrough => write!(f, "Tx spending its own output"),
			Error::InvalidOutputFeatures => write!(f, "Invalid output features"),
			Error::InvalidKernelFeatures => write!(f, "Invalid kernel features"),
			Error::IncorrectSignature => write!(f, "Incorrect signature"),
			Error::Serialization(e) => write!(f, "Serialization error: {}", e),
		}
	}
}

impl From<ser::Error> for Error {
	fn from(e: ser::Error) -> Error {
		Error::Serialization(e)
	}
}

impl From<secp::Error> for Error {
	fn from(e: secp::Error) -> Error {
		Error::Secp(e)
	}
}

impl From<committed::Error> for Error {
	fn from(e: committed::Error) -> Error {
		Error::Committed(e)
	}
}

/// Various tx kernel variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelFeatures {
	/// Plain kernel (the default for Grin txs).
	Plain = 0,
	/// A coinbase kernel.
	Coinbase = 1,
	/// A kernel with an explicit lock height.
	HeightLocked = 2,
}

impl KernelFeatures {
	/// Build kernel features from a byte (wire format).
	pub fn from_u8(features: u8) -> Result<KernelFeatures, ser::Error> {
		match features {
			0 => Ok(KernelFeatures::Plain),
			1 => Ok(KernelFeatures::Coinbase),
			2 => Ok(KernelFeatures::HeightLocked),
			_ => Err(ser::Error::CorruptedData),
		}
	}
}

impl Writeable for KernelFeatures {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u8(*self as u8)
	}
}

impl Readable for KernelFeatures {
	fn read(reader: &mut dyn Reader) -> Result<KernelFeatures, ser::Error> {
		KernelFeatures::from_u8(reader.read_u8()?)
	}
}

impl DefaultHashable for KernelFeatures {}

/// A proof that a transaction sums to zero. Includes both the transaction's
/// Pedersen commitment and the signature, that guarantees that the commitments
/// amount to zero.
/// The signature signs the fee and the lock_height, which are retained for
/// signature validation.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TxKernel {
	/// Options for a kernel's structure or use
	pub features: KernelFeatures,
	/// Fee originally included in the transaction this proof is for.
	pub fee: u64,
	/// This kernel is not valid earlier than lock_height blocks
	/// The max lock_height of all *inputs* to this transaction
	pub lock_height: u64,
	/// Remainder of the sum of all transaction commitments. If the transaction
	/// is well formed, amounts components should sum to zero and the excess
	/// is hence a valid public key.
	pub excess: Commitment,
	/// The signature proving the excess is a valid public key, which signs
	/// the transaction fee.
	pub excess_sig: secp::Signature,
}

impl DefaultHashable for TxKernel {}
hashable_ord!(TxKernel);

impl Writeable for TxKernel {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.features.write(writer)?;
		ser_multiwrite!(writer, [write_u64, self.fee], [write_u64, self.lock_height]);
		self.excess.write(writer)?;
		self.excess_sig.write(writer)?;
		Ok(())
	}
}

impl Readable for TxKernel {
	fn read(reader: &mut dyn Reader) -> Result<TxKernel, ser::Error> {
		Ok(TxKernel {
			features: KernelFeatures::read(reader)?,
			fee: reader.read_u64()?,
			lock_height: reader.read_u64()?,
			excess: Commitment::read(reader)?,
			excess_sig: secp::Signature::read(reader)?,
		})
	}
}

impl FixedLength for TxKernel {
	const LEN: usize = 1 // features
		+ 8 // fee
		+ 8 // lock_height
		+ secp::constants::PEDERSEN_COMMITMENT_SIZE
		+ secp::constants::AGG_SIGNATURE_SIZE;
}

impl PMMRable for TxKernel {
	type E = TxKernel;

	fn as_elmt(&self) -> TxKernel {
		self.clone()
	}
}

impl KernelFeatures {
	/// Is this a coinbase kernel?
	pub fn is_coinbase(&self) -> bool {
		*self == KernelFeatures::Coinbase
	}

	/// Is this a height locked kernel?
	pub fn is_height_locked(&self) -> bool {
		*self == KernelFeatures::HeightLocked
	}
}

/// Build the message to be signed by a kernel: the hash of the features,
/// fee and lock_height as serialized on the wire.
pub fn kernel_sig_msg(
	fee: u64,
	lock_height: u64,
	features: KernelFeatures,
) -> Result<secp::Message, Error> {
	let hash = (features, fee, lock_height).hash();
	let msg = secp::Message::from_slice(&hash.as_bytes())?;
	Ok(msg)
}

impl TxKernel {
	/// Is this a coinbase kernel?
	pub fn is_coinbase(&self) -> bool {
		self.features.is_coinbase()
	}

	/// Is this a height locked kernel?
	pub fn is_height_locked(&self) -> bool {
		self.features.is_height_locked()
	}

	/// Return the excess commitment for this tx_kernel.
	pub fn excess(&self) -> Commitment {
		self.excess
	}

	/// The msg signed as part of the tx kernel.
	pub fn msg_to_sign(&self) -> Result<secp::Message, Error> {
		let msg = kernel_sig_msg(self.fee, self.lock_height, self.features)?;
		Ok(msg)
	}

	/// Verify the transaction proof validity. Entails handling the commitment
	/// as a public key and checking the signature verifies with the fee as
	/// message.
	pub fn verify(&self) -> Result<(), Error> {
		let secp = static_secp_instance();
		let secp = secp.lock();
		let sig = &self.excess_sig;
		// Verify aggsig directly in libsecp
		let pubkey = &self.excess.to_pubkey(&secp)?;
		if !aggsig::verify_single(
			&secp,
			&sig,
			&self.msg_to_sign()?,
			None,
			&pubkey,
			Some(&pubkey),
			None,
			false,
		) {
			return Err(Error::IncorrectSignature);
		}
		Ok(())
	}

	/// Batch signature verification.
	pub fn batch_sig_verify(tx_kernels: &[TxKernel]) -> Result<(), Error> {
		for tx_kernel in tx_kernels {
			tx_kernel.verify()?;
		}
		Ok(())
	}

	/// Build an empty tx kernel with zero values.
	pub fn empty() -> TxKernel {
		TxKernel {
			features: KernelFeatures::Plain,
			fee: 0,
			lock_height: 0,
			excess: Commitment::from_vec(vec![0; 33]),
			excess_sig: secp::Signature::from_raw_data(&[0; 64]).unwrap(),
		}
	}

	/// Builds a new tx kernel with the provided fee.
	pub fn with_fee(self, fee: u64) -> TxKernel {
		TxKernel { fee, ..self }
	}

	/// Builds a new tx kernel with the provided lock_height.
	pub fn with_lock_height(self, lock_height: u64) -> TxKernel {
		TxKernel {
			features: kernel_features(lock_height),
			lock_height,
			..self
		}
	}
}

/// Enum of possible tx weight verification options
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Weighting {
	/// Tx with artificially limited max_weight.
	/// Used during transaction selection.
	/// A coinbase reward (output + kernel) is reserved on top.
	AsTransaction,
	/// Tx representing a tx with max_weight.
	AsBlock,
	/// No max_weight limit (skip the weight check).
	NoLimit,
}

/// TransactionBody is a common abstraction for transaction and block
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TransactionBody {
	/// List of inputs spent by the transaction.
	pub inputs: Vec<Input>,
	/// List of outputs the transaction produces.
	pub outputs: Vec<Output>,
	/// List of kernels that make up this transaction (usually a single kernel).
	pub kernels: Vec<TxKernel>,
}

/// PartialEq
impl PartialEq for TransactionBody {
	fn eq(&self, l: &TransactionBody) -> bool {
		self.inputs == l.inputs && self.outputs == l.outputs && self.kernels == l.kernels
	}
}

/// Implementation of Writeable for a body, defines how to
/// write the body as binary.
impl Writeable for TransactionBody {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		ser_multiwrite!(
			writer,
			[write_u64, self.inputs.len() as u64],
			[write_u64, self.outputs.len() as u64],
			[write_u64, self.kernels.len() as u64]
		);

		self.inputs.write(writer)?;
		self.outputs.write(writer)?;
		self.kernels.write(writer)?;

		Ok(())
	}
}

/// Implementation of Readable for a body, defines how to read a
/// body from a binary stream.
impl Readable for TransactionBody {
	fn read(reader: &mut dyn Reader) -> Result<TransactionBody, ser::Error> {
		let (input_len, output_len, kernel_len) =
			ser_multiread!(reader, read_u64, read_u64, read_u64);

		// quick block weight check before proceeding
		let tx_block_weight =
			TransactionBody::weight_as_block(input_len, output_len, kernel_len);
		if tx_block_weight > consensus::MAX_BLOCK_WEIGHT {
			return Err(ser::Error::TooLargeReadErr);
		}

		let inputs = ser::read_multi(reader, input_len)?;
		let outputs = ser::read_multi(reader, output_len)?;
		let kernels = ser::read_multi(reader, kernel_len)?;

		// Initial testing is the deserialized body is valid (sort order etc).
		let body = TransactionBody::init(inputs, outputs, kernels, true)
			.map_err(|_| ser::Error::CorruptedData)?;

		Ok(body)
	}
}

impl Committed for TransactionBody {
	fn inputs_committed(&self) -> Vec<Commitment> {
		self.inputs.iter().map(|x| x.commitment()).collect()
	}

	fn outputs_committed(&self) -> Vec<Commitment> {
		self.outputs.iter().map(|x| x.commitment()).collect()
	}

	fn kernels_committed(&self) -> Vec<Commitment> {
		self.kernels.iter().map(|x| x.excess()).collect()
	}
}

impl Default for TransactionBody {
	fn default() -> TransactionBody {
		TransactionBody::empty()
	}
}

impl TransactionBody {
	/// Creates a new empty body (no inputs, no outputs, no kernels)
	pub fn empty() -> TransactionBody {
		TransactionBody {
			inputs: vec![],
			outputs: vec![],
			kernels: vec![],
		}
	}

	/// Sort the inputs|outputs|kernels.
	pub fn sort(&mut self) {
		self.inputs.sort_unstable();
		self.outputs.sort_unstable();
		self.kernels.sort_unstable();
	}

	/// Creates a new body initialized with
	/// the provided inputs, outputs and kernels.
	/// Guarantees inputs, outputs, kernels are sorted lexicographically.
	pub fn init(
		inputs: Vec<Input>,
		outputs: Vec<Output>,
		kernels: Vec<TxKernel>,
		verify_sorted: bool,
	) -> Result<TransactionBody, Error> {
		let mut body = TransactionBody {
			inputs,
			outputs,
			kernels,
		};

		if verify_sorted {
			// If we are verifying sort order then verify and
			// return an error if not sorted lexicographically.
			body.verify_sorted()?;
		} else {
			// If we are not verifying sort order then sort in place and return.
			body.sort();
		}
		Ok(body)
	}

	/// Builds a new body with the provided inputs added. Existing
	/// inputs, if any, are kept intact.
	/// Sort order is maintained.
	pub fn with_input(mut self, input: Input) -> TransactionBody {
		self.inputs.push(input);
		self.inputs.sort_unstable();
		self
	}

	/// Builds a new TransactionBody with the provided output added. Existing
	/// outputs, if any, are kept intact.
	/// Sort order is maintained.
	pub fn with_output(mut self, output: Output) -> TransactionBody {
		self.outputs.push(output);
		self.outputs.sort_unstable();
		self
	}

	/// Builds a new TransactionBody with the provided kernel added. Existing
	/// kernels, if any, are kept intact.
	/// Sort order is maintained.
	pub fn with_kernel(mut self, kernel: TxKernel) -> TransactionBody {
		self.kernels.push(kernel);
		self.kernels.sort_unstable();
		self
	}

	/// Total fee for a TransactionBody is the sum of fees of all kernels.
	pub fn fee(&self) -> u64 {
		self.kernels
			.iter()
			.fold(0, |acc, k| acc.saturating_add(k.fee))
	}

	fn overage(&self) -> i64 {
		self.fee() as i64
	}

	/// Calculate transaction weight
	pub fn body_weight(&self) -> u64 {
		TransactionBody::weight(
			self.inputs.len() as u64,
			self.outputs.len() as u64,
			self.kernels.len() as u64,
		)
	}

	/// Calculate weight of transaction using block weighing
	pub fn body_weight_as_block(&self) -> u64 {
		TransactionBody::weight_as_block(
			self.inputs.len() as u64,
			self.outputs.len() as u64,
			self.kernels.len() as u64,
		)
	}

	/// Calculate transaction weight from transaction details, the maximum
	/// weight a transaction may have while still leaving room for a coinbase
	/// reward (output + kernel) in the block it ends up in.
	pub fn weight(input_len: u64, output_len: u64, kernel_len: u64) -> u64 {
		TransactionBody::weight_as_block(input_len, output_len, kernel_len)
	}

	/// Calculate transaction weight using block weighing from transaction
	/// details. Consensus critical and uses consensus weight values.
	pub fn weight_as_block(input_len: u64, output_len: u64, kernel_len: u64) -> u64 {
		input_len
			.saturating_mul(consensus::INPUT_WEIGHT)
			.saturating_add(output_len.saturating_mul(consensus::OUTPUT_WEIGHT))
			.saturating_add(kernel_len.saturating_mul(consensus::KERNEL_WEIGHT))
	}

	/// Lock height of a body is the max lock height of the kernels.
	pub fn lock_height(&self) -> u64 {
		self.kernels
			.iter()
			.map(|x| x.lock_height)
			.max()
			.unwrap_or(0)
	}

	/// Verify the body is not too heavy to go in a single block, optionally
	/// reserving room for a coinbase reward.
	fn verify_weight(&self, weighting: Weighting) -> Result<(), Error> {
		// A coinbase reward is a single output and a single kernel.
		// We need to allow for this when verifying the max tx weight.
		let coinbase_weight = consensus::OUTPUT_WEIGHT + consensus::KERNEL_WEIGHT;

		let max_weight = match weighting {
			Weighting::AsTransaction => consensus::MAX_BLOCK_WEIGHT - coinbase_weight,
			Weighting::AsBlock => consensus::MAX_BLOCK_WEIGHT,
			Weighting::NoLimit => {
				// We do not verify the max weight here.
				return Ok(());
			}
		};

		if self.body_weight_as_block() > max_weight {
			return Err(Error::TooHeavy);
		}
		Ok(())
	}

	// Verify the body is sorted by the hashes of its
	// inputs|outputs|kernels, and that there are no duplicates.
	fn verify_sorted(&self) -> Result<(), Error> {
		self.inputs.verify_sorted_and_unique()?;
		self.outputs.verify_sorted_and_unique()?;
		self.kernels.verify_sorted_and_unique()?;
		Ok(())
	}

	// Verify that no input is spending an output from the same block.
	fn verify_cut_through(&self) -> Result<(), Error> {
		let mut out_set = HashSet::new();
		for out in &self.outputs {
			out_set.insert(out.commitment());
		}
		for inp in &self.inputs {
			if out_set.contains(&inp.commitment()) {
				return Err(Error::CutThrough);
			}
		}
		Ok(())
	}

	/// Verify we have no invalid outputs or kernels in the transaction
	/// due to invalid features.
	/// Specifically, a transaction cannot contain a coinbase output or a
	/// coinbase kernel.
	pub fn verify_features(&self) -> Result<(), Error> {
		self.verify_output_features()?;
		self.verify_kernel_features()?;
		Ok(())
	}

	// Verify we have no outputs tagged as COINBASE.
	fn verify_output_features(&self) -> Result<(), Error> {
		if self.outputs.iter().any(|x| x.is_coinbase()) {
			return Err(Error::InvalidOutputFeatures);
		}
		Ok(())
	}

	// Verify we have no kernels tagged as COINBASE.
	fn verify_kernel_features(&self) -> Result<(), Error> {
		if self.kernels.iter().any(|x| x.is_coinbase()) {
			return Err(Error::InvalidKernelFeatures);
		}
		Ok(())
	}

	/// "Lightweight" validation that we can perform quickly during read/deserialization.
	/// Subset of full validation that skips expensive verification steps,
	/// specifically - rangeproofs and kernel signatures.
	pub fn validate_read(&self, weighting: Weighting) -> Result<(), Error> {
		self.verify_weight(weighting)?;
		self.verify_sorted()?;
		self.verify_cut_through()?;
		Ok(())
	}

	/// Validates all relevant parts of a transaction body. Checks the
	/// excess value against the signature as well as range proofs for each
	/// output.
	pub fn validate(
		&self,
		weighting: Weighting,
		verifier: Arc<RwLock<dyn VerifierCache>>,
	) -> Result<(), Error> {
		self.validate_read(weighting)?;

		// Find all the outputs that have not had their rangeproofs verified.
		// Find all the kernels that have not yet been verified.
		let (outputs, kernels) = {
			let mut verifier = verifier.write();
			(
				verifier.filter_rangeproof_unverified(&self.outputs),
				verifier.filter_kernel_sig_unverified(&self.kernels),
			)
		};

		// Now batch verify all those unverified rangeproofs
		if !outputs.is_empty() {
			let mut commits = vec![];
			let mut proofs = vec![];
			for x in &outputs {
				commits.push(x.commit);
				proofs.push(x.proof);
			}
			Output::batch_verify_proofs(&commits, &proofs)?;
		}

		// Verify the unverified tx kernels.
		TxKernel::batch_sig_verify(&kernels)?;

		// Cache the successful verification results for the new outputs and kernels.
		{
			let mut verifier = verifier.write();
			verifier.add_rangeproof_verified(outputs);
			verifier.add_kernel_sig_verified(kernels);
		}
		Ok(())
	}
}

/// A transaction
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Transaction {
	/// The kernel "offset" k2
	/// excess is k1G after splitting the key k = k1 + k2
	pub offset: BlindingFactor,
	/// The transaction body - inputs/outputs/kernels
	pub body: TransactionBody,
}

impl DefaultHashable for Transaction {}

/// PartialEq
impl PartialEq for Transaction {
	fn eq(&self, tx: &Transaction) -> bool {
		self.body == tx.body && self.offset == tx.offset
	}
}

/// Implementation of Writeable for a fully blinded transaction, defines how to
/// write the transaction as binary.
impl Writeable for Transaction {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.offset.write(writer)?;
		self.body.write(writer)?;
		Ok(())
	}
}

/// Implementation of Readable for a transaction, defines how to read a full
/// transaction from a binary stream.
impl Readable for Transaction {
	fn read(reader: &mut dyn Reader) -> Result<Transaction, ser::Error> {
		let offset = BlindingFactor::read(reader)?;
		let body = TransactionBody::read(reader)?;
		let tx = Transaction { offset, body };

		// Now "lightweight" validation of the tx.
		// Treat any validation issues as data corruption.
		// An example of this would be reading a tx
		// that exceeded the allowed number of inputs.
		tx.validate_read().map_err(|_| ser::Error::CorruptedData)?;

		Ok(tx)
	}
}

impl Committed for Transaction {
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

impl Default for Transaction {
	fn default() -> Transaction {
		Transaction::empty()
	}
}

impl Transaction {
	/// Creates a new empty transaction (no inputs or outputs, zero fee).
	pub fn empty() -> Transaction {
		Transaction {
			offset: BlindingFactor::zero(),
			body: Default::default(),
		}
	}

	/// Creates a new transaction initialized with
	/// the provided inputs, outputs, kernels
	pub fn new(inputs: Vec<Input>, outputs: Vec<Output>, kernels: Vec<TxKernel>) -> Transaction {
		let offset = BlindingFactor::zero();

		// Initialize a new tx body and sort everything.
		let body =
			TransactionBody::init(inputs, outputs, kernels, false).expect("sorting, not verifying");

		Transaction { offset, body }
	}

	/// Creates a new transaction using this transaction as a template
	/// and with the specified offset.
	pub fn with_offset(self, offset: BlindingFactor) -> Transaction {
		Transaction { offset, ..self }
	}

	/// Builds a new transaction with the provided inputs added. Existing
	/// inputs, if any, are kept intact.
	/// Sort order is maintained.
	pub fn with_input(self, input: Input) -> Transaction {
		Transaction {
			body: self.body.with_input(input),
			..self
		}
	}

	/// Builds a new transaction with the provided output added. Existing
	/// outputs, if any, are kept intact.
	/// Sort order is maintained.
	pub fn with_output(self, output: Output) -> Transaction {
		Transaction {
			body: self.body.with_output(output),
			..self
		}
	}

	/// Builds a new transaction with the provided kernel added. Existing
	/// kernels, if any, are kept intact.
	/// Sort order is maintained.
	pub fn with_kernel(self, kernel: TxKernel) -> Transaction {
		Transaction {
			body: self.body.with_kernel(kernel),
			..self
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

	/// Total fee for a transaction is the sum of fees of all kernels.
	pub fn fee(&self) -> u64 {
		self.body.fee()
	}

	/// Total overage across all kernels.
	pub fn overage(&self) -> i64 {
		self.body.overage()
	}

	/// Lock height of a transaction is the max lock height of all the kernels.
	pub fn lock_height(&self) -> u64 {
		self.body.lock_height()
	}

	/// "Lightweight" validation that we can perform quickly during
	/// read/deserialization. Subset of full validation that skips expensive
	/// verification steps, specifically - rangeproofs and kernel signatures.
	pub fn validate_read(&self) -> Result<(), Error> {
		self.body.validate_read(Weighting::AsTransaction)?;
		self.body.verify_features()?;
		Ok(())
	}

	/// Validates all relevant parts of a fully built transaction. Checks the
	/// excess value against the signature as well as range proofs for each
	/// output.
	pub fn validate(
		&self,
		weighting: Weighting,
		verifier: Arc<RwLock<dyn VerifierCache>>,
	) -> Result<(), Error> {
		self.body.validate(weighting, verifier)?;
		self.body.verify_features()?;
		self.verify_kernel_sums(self.overage(), self.offset.clone())?;
		Ok(())
	}

	/// Calculate transaction weight
	pub fn tx_weight(&self) -> u64 {
		self.body.body_weight()
	}

	/// Calculate transaction weight as a block
	pub fn tx_weight_as_block(&self) -> u64 {
		self.body.body_weight_as_block()
	}
}

/// Takes a slice of inputs and a slice of outputs and applies "cut-through",
/// eliminating any input/output pairs with matching commitments.
/// Returns the filtered vecs.
pub fn cut_through(
	inputs: Vec<Input>,
	outputs: Vec<Output>,
) -> Result<(Vec<Input>, Vec<Output>), Error> {
	let in_set = inputs
		.iter()
		.map(|inp| inp.commitment())
		.collect::<HashSet<_>>();

	let out_set = outputs
		.iter()
		.map(|out| out.commitment())
		.collect::<HashSet<_>>();

	let to_cut_through = in_set.intersection(&out_set).collect::<HashSet<_>>();

	let new_inputs = inputs
		.into_iter()
		.filter(|inp| !to_cut_through.contains(&inp.commitment()))
		.collect::<Vec<_>>();

	let new_outputs = outputs
		.into_iter()
		.filter(|out| !to_cut_through.contains(&out.commitment()))
		.collect::<Vec<_>>();

	Ok((new_inputs, new_outputs))
}

/// Aggregate a vec of txs into a multi-kernel tx with cut_through.
pub fn aggregate(mut txs: Vec<Transaction>) -> Result<Transaction, Error> {
	// convenience short-circuiting
	if txs.is_empty() {
		return Ok(Transaction::empty());
	} else if txs.len() == 1 {
		return Ok(txs.pop().unwrap());
	}

	let mut inputs: Vec<Input> = vec![];
	let mut outputs: Vec<Output> = vec![];
	let mut kernels: Vec<TxKernel> = vec![];

	// we will sum these together at the end to give us the overall offset for the
	// transaction
	let mut kernel_offsets: Vec<BlindingFactor> = vec![];

	for tx in txs {
		// we will sum these later to give a single aggregate offset
		kernel_offsets.push(tx.offset.clone());

		inputs.extend_from_slice(tx.inputs());
		outputs.extend_from_slice(tx.outputs());
		kernels.extend_from_slice(tx.kernels());
	}

	// Sort inputs and outputs during cut_through.
	let (inputs, outputs) = cut_through(inputs, outputs)?;

	// Now sort kernels.
	kernels.sort_unstable();

	// now sum the kernel_offsets up to give us an aggregate offset for the
	// transaction
	let total_kernel_offset = committed::sum_kernel_offsets(kernel_offsets, vec![])?;

	// build a new aggregate tx from the following -
	//   * cut-through inputs
	//   * cut-through outputs
	//   * full set of tx kernels
	//   * sum of all kernel offsets
	let tx = Transaction::new(inputs, outputs, kernels).with_offset(total_kernel_offset);

	Ok(tx)
}

/// Enum of various supported output "features".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFeatures {
	/// Plain output (the default for Grin txs).
	Plain = 0,
	/// A coinbase output.
	Coinbase = 1,
}

impl Writeable for OutputFeatures {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u8(*self as u8)
	}
}

impl Readable for OutputFeatures {
	fn read(reader: &mut dyn Reader) -> Result<OutputFeatures, ser::Error> {
		let features = match reader.read_u8()? {
			0 => OutputFeatures::Plain,
			1 => OutputFeatures::Coinbase,
			_ => return Err(ser::Error::CorruptedData),
		};
		Ok(features)
	}
}

impl DefaultHashable for OutputFeatures {}

/// A transaction input.
///
/// Primarily a reference to an output being spent by the transaction.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct Input {
	/// The features of the output being spent.
	/// We will check maturity for coinbase output.
	pub features: OutputFeatures,
	/// The commit referencing the output being spent.
	pub commit: Commitment,
}

impl DefaultHashable for Input {}
hashable_ord!(Input);

/// Implementation of Writeable for a transaction Input, defines how to write
/// an Input as binary.
impl Writeable for Input {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.features.write(writer)?;
		self.commit.write(writer)?;
		Ok(())
	}
}

/// Implementation of Readable for a transaction Input, defines how to read
/// an Input from a binary stream.
impl Readable for Input {
	fn read(reader: &mut dyn Reader) -> Result<Input, ser::Error> {
		let features = OutputFeatures::read(reader)?;
		let commit = Commitment::read(reader)?;
		Ok(Input::new(features, commit))
	}
}

/// The input for a transaction, which spends a pre-existing unspent output.
/// The input commitment is a reproduction of the commitment of the output
/// being spent. Input must also provide the original output features.
impl Input {
	/// Build a new input from the data required to identify and verify an
	/// output being spent.
	pub fn new(features: OutputFeatures, commit: Commitment) -> Input {
		Input { features, commit }
	}

	/// The input commitment which _partially_ identifies the output being
	/// spent. In the presence of a fork we need additional info to uniquely
	/// identify the output. Specifically the block hash (to correctly
	/// calculate lock_height for coinbase outputs).
	pub fn commitment(&self) -> Commitment {
		self.commit
	}

	/// Is this a coinbase input?
	pub fn is_coinbase(&self) -> bool {
		self.features == OutputFeatures::Coinbase
	}

	/// Is this a plain input?
	pub fn is_plain(&self) -> bool {
		self.features == OutputFeatures::Plain
	}
}

/// Output for a transaction, defining the new ownership of coins that are
/// being transferred. The commitment is a blinded value for the output while
/// the range proof guarantees the commitment includes a positive value
/// without overflow and the ownership of the private key.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct Output {
	/// Options for an output's structure or use
	pub features: OutputFeatures,
	/// The homomorphic commitment representing the output amount
	pub commit: Commitment,
	/// A proof that the commitment is in the right range
	pub proof: RangeProof,
}

impl DefaultHashable for Output {}
hashable_ord!(Output);

/// Implementation of Writeable for a transaction Output, defines how to write
/// an Output as binary.
impl Writeable for Output {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.features.write(writer)?;
		self.commit.write(writer)?;
		// The hash of an output doesn't include the range proof, which
		// is committed to separately
		if writer.serialization_mode() == ser::SerializationMode::Full {
			writer.write_bytes(&self.proof)?
		}
		Ok(())
	}
}

/// Implementation of Readable for a transaction Output, defines how to read
/// an Output from a binary stream.
impl Readable for Output {
	fn read(reader: &mut dyn Reader) -> Result<Output, ser::Error> {
		Ok(Output {
			features: OutputFeatures::read(reader)?,
			commit: Commitment::read(reader)?,
			proof: RangeProof::read(reader)?,
		})
	}
}

/// Rangeproofs are stored (and hashed) in their own MMR, parallel to the
/// output MMR.
impl PMMRable for RangeProof {
	type E = RangeProof;

	fn as_elmt(&self) -> RangeProof {
		*self
	}
}

/// We can build an Output MMR but store instances of OutputIdentifier in the
/// MMR data file.
impl PMMRable for Output {
	type E = OutputIdentifier;

	fn as_elmt(&self) -> OutputIdentifier {
		OutputIdentifier::from_output(self)
	}
}

impl Output {
	/// Commitment for the output
	pub fn commitment(&self) -> Commitment {
		self.commit
	}

	/// Is this a coinbase output?
	pub fn is_coinbase(&self) -> bool {
		self.features == OutputFeatures::Coinbase
	}

	/// Is this a plain output?
	pub fn is_plain(&self) -> bool {
		self.features == OutputFeatures::Plain
	}

	/// Range proof for the output
	pub fn proof(&self) -> RangeProof {
		self.proof
	}

	/// Validates the range proof using the commitment
	pub fn verify_proof(&self) -> Result<(), Error> {
		let secp = static_secp_instance();
		secp.lock()
			.verify_bullet_proof(self.commit, self.proof, None)?;
		Ok(())
	}

	/// Batch validates the range proofs using the commitments
	pub fn batch_verify_proofs(commits: &[Commitment], proofs: &[RangeProof]) -> Result<(), Error> {
		let secp = static_secp_instance();
		secp.lock()
			.verify_bullet_proof_multi(commits.to_vec(), proofs.to_vec(), None)?;
		Ok(())
	}
}

/// An output_identifier can be build from either an input _or_ an output and
/// contains everything we need to uniquely identify an output being spent.
/// Needed because it is not sufficient to pass a commitment around.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputIdentifier {
	/// Output features (coinbase vs. regular transaction output)
	/// We need to include this when hashing to ensure coinbase maturity can be
	/// enforced.
	pub features: OutputFeatures,
	/// Output commitment
	pub commit: Commitment,
}

impl DefaultHashable for OutputIdentifier {}

impl OutputIdentifier {
	/// Build a new output_identifier.
	pub fn new(features: OutputFeatures, commit: &Commitment) -> OutputIdentifier {
		OutputIdentifier {
			features,
			commit: *commit,
		}
	}

	/// Our commitment.
	pub fn commitment(&self) -> Commitment {
		self.commit
	}

	/// Build an output_identifier from an existing output.
	pub fn from_output(output: &Output) -> OutputIdentifier {
		OutputIdentifier {
			features: output.features,
			commit: output.commit,
		}
	}

	/// Converts this identifier to a full output, provided a RangeProof
	pub fn into_output(self, proof: RangeProof) -> Output {
		Output {
			proof,
			features: self.features,
			commit: self.commit,
		}
	}

	/// Build an output_identifier from an existing input.
	pub fn from_input(input: &Input) -> OutputIdentifier {
		OutputIdentifier {
			features: input.features,
			commit: input.commit,
		}
	}

	/// Is this a coinbase output?
	pub fn is_coinbase(&self) -> bool {
		self.features == OutputFeatures::Coinbase
	}
}

impl FixedLength for OutputIdentifier {
	const LEN: usize = 1 + secp::constants::PEDERSEN_COMMITMENT_SIZE;
}

impl Writeable for OutputIdentifier {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.features.write(writer)?;
		self.commit.write(writer)?;
		Ok(())
	}
}

impl Readable for OutputIdentifier {
	fn read(reader: &mut dyn Reader) -> Result<OutputIdentifier, ser::Error> {
		Ok(OutputIdentifier {
			features: OutputFeatures::read(reader)?,
			commit: Commitment::read(reader)?,
		})
	}
}

/// The default features for a kernel with the provided lock_height.
pub fn kernel_features(lock_height: u64) -> KernelFeatures {
	if lock_height > 0 {
		KernelFeatures::HeightLocked
	} else {
		KernelFeatures::Plain
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::core::hash::ZERO_HASH;
	use crate::core::verifier_cache::LruVerifierCache;
	use crate::libtx::build;
	use crate::util::secp::key::SecretKey;
	use crate::util::static_secp_instance;
	use rand::thread_rng;

	fn verifier_cache() -> Arc<RwLock<dyn VerifierCache>> {
		Arc::new(RwLock::new(LruVerifierCache::new()))
	}

	fn keys(n: usize) -> Vec<SecretKey> {
		let secp = static_secp_instance();
		let secp = secp.lock();
		(0..n)
			.map(|_| SecretKey::new(&secp, &mut thread_rng()))
			.collect()
	}

	#[test]
	fn tx_hash_diff() {
		let keys1 = keys(2);
		let tx1 = build::transaction(vec![(50, keys1[0].clone())], vec![(48, keys1[1].clone())], 2)
			.unwrap();

		let keys2 = keys(2);
		let tx2 = build::transaction(vec![(60, keys2[0].clone())], vec![(55, keys2[1].clone())], 5)
			.unwrap();

		if tx1.hash() == tx2.hash() {
			panic!("diff txs have same hash")
		}
	}

	#[test]
	fn build_tx_and_validate() {
		let k = keys(3);
		// 50 in, 30 + 18 out, 2 fee
		let tx = build::transaction(
			vec![(50, k[0].clone())],
			vec![(30, k[1].clone()), (18, k[2].clone())],
			2,
		)
		.unwrap();
		tx.validate(Weighting::AsTransaction, verifier_cache())
			.unwrap();
	}

	#[test]
	fn tx_double_ser_deser() {
		// checks serializing doesn't mess up the tx and produces consistent results
		let k = keys(2);
		let btx = build::transaction(vec![(5, k[0].clone())], vec![(4, k[1].clone())], 1).unwrap();

		let mut vec = Vec::new();
		assert!(ser::serialize(&mut vec, &btx).is_ok());
		let dtx: Transaction = ser::deserialize(&mut &vec[..]).unwrap();

		let mut vec2 = Vec::new();
		assert!(ser::serialize(&mut vec2, &btx).is_ok());
		let dtx2: Transaction = ser::deserialize(&mut &vec2[..]).unwrap();

		assert_eq!(btx.hash(), dtx.hash());
		assert_eq!(dtx.hash(), dtx2.hash());
	}

	#[test]
	fn tx_with_bad_kernel_sum_rejected() {
		let k = keys(2);
		// amounts don't balance: 50 in, 30 out, fee 2 accounts for only 32 of the 50
		let tx = build::transaction(vec![(50, k[0].clone())], vec![(30, k[1].clone())], 2).unwrap();
		assert_eq!(
			tx.validate(Weighting::AsTransaction, verifier_cache()),
			Err(Error::Committed(committed::Error::KernelSumMismatch))
		);
	}

	#[test]
	fn tx_coinbase_features_rejected() {
		let k = keys(2);
		let mut tx =
			build::transaction(vec![(5, k[0].clone())], vec![(4, k[1].clone())], 1).unwrap();
		tx.body.outputs[0].features = OutputFeatures::Coinbase;
		// features changed under the hash so sorting/validation must fail
		assert_eq!(tx.validate_read(), Err(Error::InvalidOutputFeatures));
	}

	#[test]
	fn cut_through_simple() {
		let k = keys(4);
		let commit = |v: u64, key: &SecretKey| {
			let secp = static_secp_instance();
			let secp = secp.lock();
			secp.commit(v, key.clone()).unwrap()
		};

		// an input spending a commitment that also appears as an output
		let shared = commit(10, &k[0]);
		let inputs = vec![
			Input::new(OutputFeatures::Plain, shared),
			Input::new(OutputFeatures::Plain, commit(20, &k[1])),
		];
		let outputs = vec![
			Output {
				features: OutputFeatures::Plain,
				commit: shared,
				proof: build::proof(10, &k[0]),
			},
			Output {
				features: OutputFeatures::Plain,
				commit: commit(30, &k[2]),
				proof: build::proof(30, &k[2]),
			},
		];

		let (inputs, outputs) = cut_through(inputs, outputs).unwrap();
		assert_eq!(inputs.len(), 1);
		assert_eq!(outputs.len(), 1);
		assert_eq!(inputs[0].commitment(), commit(20, &k[1]));
		assert_eq!(outputs[0].commitment(), commit(30, &k[2]));
	}

	#[test]
	fn tx_body_rejects_unsorted() {
		let k = keys(3);
		let tx = build::transaction(
			vec![(50, k[0].clone())],
			vec![(30, k[1].clone()), (18, k[2].clone())],
			2,
		)
		.unwrap();

		let mut outputs = tx.outputs().clone();
		outputs.reverse();
		let body = TransactionBody {
			inputs: tx.inputs().clone(),
			outputs,
			kernels: tx.kernels().clone(),
		};
		assert_eq!(
			body.validate_read(Weighting::AsTransaction),
			Err(Error::Serialization(ser::Error::SortError))
		);
	}

	#[test]
	fn transaction_weights() {
		// 1 input, 2 outputs, 1 kernel
		assert_eq!(TransactionBody::weight(1, 2, 1), 1 + 2 * 21 + 3);
		assert_eq!(TransactionBody::weight_as_block(1, 2, 1), 46);
		// an empty body carries no weight to speak of
		let body = TransactionBody::empty();
		assert!(body.validate_read(Weighting::AsTransaction).is_ok());
	}

	// Build a syntactically unique commitment from an index. Not a valid
	// curve point, which is fine for weight and sorting checks.
	fn commit_from_index(i: u64) -> Commitment {
		let mut bytes = [0u8; 33];
		bytes[1..9].copy_from_slice(&i.to_be_bytes());
		Commitment::from_vec(bytes.to_vec())
	}

	#[test]
	fn block_weight_boundary() {
		// a body weighing exactly the max block weight passes the block check
		let inputs: Vec<Input> = (0..consensus::MAX_BLOCK_WEIGHT)
			.map(|i| Input::new(OutputFeatures::Plain, commit_from_index(i)))
			.collect();
		let body = TransactionBody::init(inputs, vec![], vec![], false).unwrap();
		assert_eq!(body.body_weight_as_block(), consensus::MAX_BLOCK_WEIGHT);
		assert!(body.validate_read(Weighting::AsBlock).is_ok());
		// but not the tx check, which reserves room for a coinbase
		assert_eq!(
			body.validate_read(Weighting::AsTransaction),
			Err(Error::TooHeavy)
		);

		// one more unit of weight pushes it over the block limit
		let inputs: Vec<Input> = (0..consensus::MAX_BLOCK_WEIGHT + 1)
			.map(|i| Input::new(OutputFeatures::Plain, commit_from_index(i)))
			.collect();
		let body = TransactionBody::init(inputs, vec![], vec![], false).unwrap();
		assert_eq!(
			body.validate_read(Weighting::AsBlock),
			Err(Error::TooHeavy)
		);
	}

	#[test]
	fn kernel_sig_msg_distinct() {
		let m1 = kernel_sig_msg(1, 0, KernelFeatures::Plain).unwrap();
		let m2 = kernel_sig_msg(2, 0, KernelFeatures::Plain).unwrap();
		let m3 = kernel_sig_msg(1, 10, KernelFeatures::HeightLocked).unwrap();
		assert_ne!(m1, m2);
		assert_ne!(m1, m3);
	}

	#[test]
	fn short_id_consistency() {
		use crate::core::id::ShortIdentifiable;
		let k = keys(2);
		let tx = build::transaction(vec![(5, k[0].clone())], vec![(4, k[1].clone())], 1).unwrap();
		let kernel = tx.kernels()[0].clone();
		let id1 = kernel.short_id(&ZERO_HASH, 42);
		let id2 = kernel.short_id(&ZERO_HASH, 42);
		assert_eq!(id1, id2);
	}
}
