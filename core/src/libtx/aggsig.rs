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

//! Aggregated Schnorr signatures over secp256k1, as used by tx kernels.

use crate::libtx::error::Error;
use crate::util::secp::key::{PublicKey, SecretKey};
use crate::util::secp::{self, aggsig, Message, Secp256k1, Signature};

/// Creates a single-party aggsig signature for the given message with the
/// given secret key, optionally committing to the total public key.
pub fn sign_single(
	secp: &Secp256k1,
	msg: &Message,
	skey: &SecretKey,
	pubkey_sum: Option<&PublicKey>,
) -> Result<Signature, Error> {
	let sig = aggsig::sign_single(secp, &msg, skey, None, None, None, pubkey_sum, None)?;
	Ok(sig)
}

/// Verifies a "completed" signature against the total public key. This is the
/// same check performed by TxKernel::verify, exposed for the signing side.
pub fn verify_single(
	secp: &Secp256k1,
	sig: &Signature,
	msg: &Message,
	pubkey: &PublicKey,
) -> bool {
	aggsig::verify_single(secp, sig, msg, None, pubkey, Some(pubkey), None, false)
}

/// Verify a signature and map failure to a libtx error.
pub fn verify_completed_sig(
	secp: &Secp256k1,
	sig: &Signature,
	pubkey: &PublicKey,
	msg: &Message,
) -> Result<(), Error> {
	if !verify_single(secp, sig, msg, pubkey) {
		return Err(secp::Error::IncorrectSignature.into());
	}
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::util::static_secp_instance;
	use rand::thread_rng;

	#[test]
	fn aggsig_sign_verify_roundtrip() {
		let secp = static_secp_instance();
		let secp = secp.lock();
		let skey = SecretKey::new(&secp, &mut thread_rng());
		let pubkey = PublicKey::from_secret_key(&secp, &skey).unwrap();
		let msg = Message::from_slice(&[1; 32]).unwrap();

		let sig = sign_single(&secp, &msg, &skey, Some(&pubkey)).unwrap();
		assert!(verify_single(&secp, &sig, &msg, &pubkey));

		// verification fails against the wrong message
		let msg2 = Message::from_slice(&[2; 32]).unwrap();
		assert!(!verify_single(&secp, &sig, &msg2, &pubkey));
	}
}
