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

//! Functions to build Mimblewimble transactions from raw secret keys.
//! Wallets layer key derivation on top of this; the node core uses it for
//! test fixtures and block assembly.

use crate::core::blind::BlindingFactor;
use crate::core::transaction::{
	kernel_features, kernel_sig_msg, Input, Output, OutputFeatures, Transaction, TxKernel,
};
use crate::libtx::error::Error;
use crate::libtx::{aggsig, proof};
use crate::util::secp::key::SecretKey;
use crate::util::secp::pedersen::RangeProof;
use crate::util::static_secp_instance;
use rand::thread_rng;

/// Builds a complete transaction spending the provided (amount, key) inputs
/// into the provided (amount, key) outputs with the given fee. All inputs
/// are treated as plain outputs being spent.
pub fn transaction(
	inputs: Vec<(u64, SecretKey)>,
	outputs: Vec<(u64, SecretKey)>,
	fee: u64,
) -> Result<Transaction, Error> {
	let inputs = inputs
		.into_iter()
		.map(|(value, key)| (value, key, OutputFeatures::Plain))
		.collect();
	transaction_ext(inputs, outputs, fee, 0)
}

/// Same as `transaction` but the resulting kernel carries the provided
/// lock_height.
pub fn transaction_with_lock_height(
	inputs: Vec<(u64, SecretKey)>,
	outputs: Vec<(u64, SecretKey)>,
	fee: u64,
	lock_height: u64,
) -> Result<Transaction, Error> {
	let inputs = inputs
		.into_iter()
		.map(|(value, key)| (value, key, OutputFeatures::Plain))
		.collect();
	transaction_ext(inputs, outputs, fee, lock_height)
}

/// Fully general transaction builder: inputs carry their original output
/// features so coinbase outputs can be spent (maturity rules are enforced
/// by the chain, not here).
pub fn transaction_ext(
	inputs: Vec<(u64, SecretKey, OutputFeatures)>,
	outputs: Vec<(u64, SecretKey)>,
	fee: u64,
	lock_height: u64,
) -> Result<Transaction, Error> {
	let secp = static_secp_instance();
	let secp = secp.lock();

	// split a random kernel offset off the excess
	let offset_key = SecretKey::new(&secp, &mut thread_rng());
	let offset = BlindingFactor::from_secret_key(offset_key.clone());

	// excess = sum(output keys) - sum(input keys) - offset
	let positive = outputs.iter().map(|(_, k)| k.clone()).collect::<Vec<_>>();
	let mut negative = inputs.iter().map(|(_, k, _)| k.clone()).collect::<Vec<_>>();
	negative.push(offset_key);
	let excess_key = secp.blind_sum(positive, negative)?;
	let excess = secp.commit(0, excess_key.clone())?;

	let features = kernel_features(lock_height);
	let msg = kernel_sig_msg(fee, lock_height, features)?;
	let pubkey = excess.to_pubkey(&secp)?;
	let excess_sig = aggsig::sign_single(&secp, &msg, &excess_key, Some(&pubkey))?;

	let kernel = TxKernel {
		features,
		fee,
		lock_height,
		excess,
		excess_sig,
	};

	let inputs = inputs
		.into_iter()
		.map(|(value, key, features)| {
			let commit = secp.commit(value, key)?;
			Ok(Input::new(features, commit))
		})
		.collect::<Result<Vec<_>, Error>>()?;

	let outputs = outputs
		.into_iter()
		.map(|(value, key)| {
			let commit = secp.commit(value, key.clone())?;
			let rproof = proof::create(&secp, value, &key)?;
			Ok(Output {
				features: OutputFeatures::Plain,
				commit,
				proof: rproof,
			})
		})
		.collect::<Result<Vec<_>, Error>>()?;

	Ok(Transaction::new(inputs, outputs, vec![kernel]).with_offset(offset))
}

/// Convenience wrapper building a rangeproof for the provided amount/key.
pub fn proof(amount: u64, skey: &SecretKey) -> RangeProof {
	let secp = static_secp_instance();
	let secp = secp.lock();
	proof::create(&secp, amount, skey).expect("valid amount and key")
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::core::verifier_cache::LruVerifierCache;
	use crate::core::Weighting;
	use crate::util::RwLock;
	use std::sync::Arc;

	#[test]
	fn build_plain_tx() {
		let secp = static_secp_instance();
		let (k1, k2, k3) = {
			let secp = secp.lock();
			(
				SecretKey::new(&secp, &mut thread_rng()),
				SecretKey::new(&secp, &mut thread_rng()),
				SecretKey::new(&secp, &mut thread_rng()),
			)
		};
		let tx = transaction(vec![(10, k1)], vec![(5, k2), (3, k3)], 2).unwrap();
		let verifier = Arc::new(RwLock::new(LruVerifierCache::new()));
		tx.validate(Weighting::AsTransaction, verifier).unwrap();
	}

	#[test]
	fn build_height_locked_tx() {
		let secp = static_secp_instance();
		let (k1, k2) = {
			let secp = secp.lock();
			(
				SecretKey::new(&secp, &mut thread_rng()),
				SecretKey::new(&secp, &mut thread_rng()),
			)
		};
		let tx = transaction_with_lock_height(vec![(10, k1)], vec![(8, k2)], 2, 100).unwrap();
		assert_eq!(tx.lock_height(), 100);
		let verifier = Arc::new(RwLock::new(LruVerifierCache::new()));
		tx.validate(Weighting::AsTransaction, verifier).unwrap();
	}
}
