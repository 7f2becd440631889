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

//! Rangeproof library functions

use crate::libtx::error::Error;
use crate::util::secp::key::SecretKey;
use crate::util::secp::pedersen::{Commitment, RangeProof};
use crate::util::secp::Secp256k1;

/// Create a bulletproof for the given amount, blinded by the given key.
/// The key doubles as the rewind nonce here: wallets derive dedicated
/// rewind nonces but the node core has no rewind requirements.
pub fn create(secp: &Secp256k1, amount: u64, skey: &SecretKey) -> Result<RangeProof, Error> {
	let commit = secp.commit(amount, skey.clone())?;
	let rproof = secp.bullet_proof(amount, skey.clone(), skey.clone(), skey.clone(), None, None);
	// sanity check the proof verifies before we hand it out
	secp.verify_bullet_proof(commit, rproof, None)?;
	Ok(rproof)
}

/// Verify a single bulletproof against its commitment.
pub fn verify(
	secp: &Secp256k1,
	commit: Commitment,
	proof: RangeProof,
) -> Result<(), Error> {
	secp.verify_bullet_proof(commit, proof, None)?;
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::util::static_secp_instance;
	use rand::thread_rng;

	#[test]
	fn create_and_verify_proof() {
		let secp = static_secp_instance();
		let secp = secp.lock();
		let skey = SecretKey::new(&secp, &mut thread_rng());
		let commit = secp.commit(42, skey.clone()).unwrap();
		let proof = create(&secp, 42, &skey).unwrap();
		assert!(verify(&secp, commit, proof).is_ok());

		// proof doesn't verify against another commitment
		let skey2 = SecretKey::new(&secp, &mut thread_rng());
		let commit2 = secp.commit(43, skey2).unwrap();
		assert!(verify(&secp, commit2, proof).is_err());
	}
}
