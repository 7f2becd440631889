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

//! Encapsulate a secret key scalar used to blind commitments and to
//! accumulate transaction kernel offsets. The kernel offset algebra is
//! consensus-critical so the type lives here rather than with the wallet
//! key derivation.

use crate::ser::{self, AsFixedBytes, Readable, Reader, Writeable, Writer};
use crate::util;
use crate::util::secp::constants::SECRET_KEY_SIZE;
use crate::util::secp::key::SecretKey;
use crate::util::secp::{self, Secp256k1};
use std::cmp::min;
use zeroize::Zeroize;

/// A 32-byte secret scalar, wrapped so serialization and summing are
/// consistent everywhere an offset or blinding factor travels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlindingFactor([u8; SECRET_KEY_SIZE]);

// Zeroize the secret bytes when the blinding factor goes out of scope.
impl Drop for BlindingFactor {
	fn drop(&mut self) {
		self.0.zeroize();
	}
}

impl AsRef<[u8]> for BlindingFactor {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

impl AsFixedBytes for BlindingFactor {
	fn len(&self) -> usize {
		SECRET_KEY_SIZE
	}
}

impl Writeable for BlindingFactor {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(self)
	}
}

impl Readable for BlindingFactor {
	fn read(reader: &mut dyn Reader) -> Result<BlindingFactor, ser::Error> {
		let bytes = reader.read_fixed_bytes(SECRET_KEY_SIZE)?;
		Ok(BlindingFactor::from_slice(&bytes))
	}
}

impl BlindingFactor {
	/// The zero blinding factor, used both as the identity for offset sums
	/// and as the "no offset" sentinel.
	pub fn zero() -> BlindingFactor {
		BlindingFactor([0; SECRET_KEY_SIZE])
	}

	/// Whether this is the zero blinding factor
	pub fn is_zero(&self) -> bool {
		self.0.iter().all(|x| *x == 0)
	}

	/// Builds a blinding factor from raw bytes, padding and truncating as
	/// necessary.
	pub fn from_slice(data: &[u8]) -> BlindingFactor {
		let mut b = [0; SECRET_KEY_SIZE];
		let copy_size = min(SECRET_KEY_SIZE, data.len());
		b[..copy_size].copy_from_slice(&data[..copy_size]);
		BlindingFactor(b)
	}

	/// Build a blinding factor directly from a secret key
	pub fn from_secret_key(skey: SecretKey) -> BlindingFactor {
		BlindingFactor::from_slice(&skey.0)
	}

	/// Builds a blinding factor from its hex representation
	pub fn from_hex(hex: &str) -> Result<BlindingFactor, ser::Error> {
		let bytes =
			util::from_hex(hex.to_string()).map_err(|_| ser::Error::HexError(hex.to_string()))?;
		Ok(BlindingFactor::from_slice(&bytes))
	}

	/// Hex representation of the blinding factor
	pub fn to_hex(&self) -> String {
		util::to_hex(self.0.to_vec())
	}

	/// Convert to a secret key. Fails on the zero blinding factor, which is
	/// not a valid scalar, so callers must handle zero explicitly.
	pub fn secret_key(&self, secp: &Secp256k1) -> Result<SecretKey, secp::Error> {
		SecretKey::from_slice(secp, &self.0)
	}

	/// Raw bytes of the blinding factor
	pub fn as_bytes(&self) -> &[u8; SECRET_KEY_SIZE] {
		&self.0
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::util::secp_static;
	use rand::thread_rng;

	#[test]
	fn blinding_factor_zero() {
		assert!(BlindingFactor::zero().is_zero());
		assert!(!BlindingFactor::from_slice(&[1; 32]).is_zero());
	}

	#[test]
	fn blinding_factor_secret_key_roundtrip() {
		let secp = secp_static::static_secp_instance();
		let secp = secp.lock();
		let skey = SecretKey::new(&secp, &mut thread_rng());
		let bf = BlindingFactor::from_secret_key(skey.clone());
		assert_eq!(bf.secret_key(&secp).unwrap(), skey);
	}

	#[test]
	fn blinding_factor_hex_roundtrip() {
		let bf = BlindingFactor::from_slice(&[7; 32]);
		let hex = bf.to_hex();
		assert_eq!(BlindingFactor::from_hex(&hex).unwrap(), bf);
	}
}
