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

//! Builds the blinded output and related signature proof for the block
//! reward.

use crate::consensus::reward;
use crate::core::transaction::{kernel_sig_msg, KernelFeatures, Output, OutputFeatures, TxKernel};
use crate::libtx::error::Error;
use crate::libtx::{aggsig, proof};
use crate::util::secp::key::SecretKey;
use crate::util::static_secp_instance;

/// output a reward output for the given key and block fees
pub fn output(skey: &SecretKey, fees: u64) -> Result<(Output, TxKernel), Error> {
	let value = reward(fees);
	let secp = static_secp_instance();
	let secp = secp.lock();

	let commit = secp.commit(value, skey.clone())?;
	let rproof = proof::create(&secp, value, skey)?;

	let output = Output {
		features: OutputFeatures::Coinbase,
		commit,
		proof: rproof,
	};

	// The excess is the output commitment stripped of its value component,
	// leaving just the blinding as a curve point: commit(value, key) -
	// commit(value, 0) == key*G.
	let over_commit = secp.commit_value(value)?;
	let out_commit = output.commitment();
	let excess = secp.commit_sum(vec![out_commit], vec![over_commit])?;

	let pubkey = excess.to_pubkey(&secp)?;
	let msg = kernel_sig_msg(0, 0, KernelFeatures::Coinbase)?;
	let sig = aggsig::sign_single(&secp, &msg, skey, Some(&pubkey))?;

	let proof = TxKernel {
		features: KernelFeatures::Coinbase,
		fee: 0,
		lock_height: 0,
		excess,
		excess_sig: sig,
	};
	Ok((output, proof))
}

#[cfg(test)]
mod test {
	use super::*;
	use rand::thread_rng;

	#[test]
	fn reward_output_verifies() {
		let secp = static_secp_instance();
		let skey = {
			let secp = secp.lock();
			SecretKey::new(&secp, &mut thread_rng())
		};
		let (out, kern) = output(&skey, 10).unwrap();
		assert!(out.is_coinbase());
		assert!(kern.is_coinbase());
		// the kernel signature must verify against the excess
		kern.verify().unwrap();
		// and the rangeproof against the output commitment
		out.verify_proof().unwrap();
	}
}
