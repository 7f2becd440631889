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

//! Short ids for compact blocks

use crate::core::hash::{DefaultHashable, Hash, Hashed};
use crate::ser::{self, Readable, Reader, Writeable, Writer};
use crate::util;
use std::cmp::Ordering;

/// The size of a short id used to identify inputs|outputs|kernels (6 bytes)
pub const SHORT_ID_SIZE: usize = 6;

/// A trait for types that have a short_id (inputs/outputs/kernels)
pub trait ShortIdentifiable {
	/// The short_id of the entry, namespaced to the block it originates from
	/// to prevent the construction of a colliding entry ahead of time.
	fn short_id(&self, hash: &Hash, nonce: u64) -> ShortId;
}

impl<H: Hashed> ShortIdentifiable for H {
	/// The short id is the first 6 bytes of the hash of the entry's own hash,
	/// the block hash and the nonce.
	fn short_id(&self, hash: &Hash, nonce: u64) -> ShortId {
		let h = (self.hash(), *hash, nonce).hash();
		ShortId::from_bytes(&h.as_bytes()[..SHORT_ID_SIZE])
	}
}

/// Short id for identifying inputs/outputs/kernels
#[derive(Clone, Copy, Serialize, Deserialize, Hash)]
pub struct ShortId([u8; 6]);

impl DefaultHashable for ShortId {}
// We want to sort short_ids in a canonical and consistent manner so we can
// verify sort order in the same way we do for full inputs|outputs|kernels
// themselves.
hashable_ord!(ShortId);

impl ::std::fmt::Debug for ShortId {
	fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
		write!(f, "{}(", stringify!(ShortId))?;
		write!(f, "{}", self.to_hex())?;
		write!(f, ")")
	}
}

impl Readable for ShortId {
	fn read(reader: &mut dyn Reader) -> Result<ShortId, ser::Error> {
		let v = reader.read_fixed_bytes(SHORT_ID_SIZE)?;
		let mut a = [0; SHORT_ID_SIZE];
		a.copy_from_slice(&v[..]);
		Ok(ShortId(a))
	}
}

impl Writeable for ShortId {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(&self.0.to_vec())
	}
}

impl ShortId {
	/// Build a new short_id from a byte slice
	pub fn from_bytes(bytes: &[u8]) -> ShortId {
		let mut hash = [0; SHORT_ID_SIZE];
		let copy_size = std::cmp::min(SHORT_ID_SIZE, bytes.len());
		hash[..copy_size].copy_from_slice(&bytes[..copy_size]);
		ShortId(hash)
	}

	/// Hex representation of a short_id
	pub fn to_hex(&self) -> String {
		util::to_hex(self.0.to_vec())
	}

	/// Reconstructs a switch commit hash from a hex string.
	pub fn from_hex(hex: &str) -> Result<ShortId, ser::Error> {
		let bytes = util::from_hex(hex.to_string())
			.map_err(|_| ser::Error::HexError(format!("short_id from_hex error")))?;
		Ok(ShortId::from_bytes(&bytes))
	}

	/// The zero short_id, convenient for generating a short_id for testing.
	pub fn zero() -> ShortId {
		ShortId::from_bytes(&[0])
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::core::hash::ZERO_HASH;

	#[test]
	fn short_id_ser() {
		let id = ShortId::from_bytes(&[1, 2, 3, 4, 5, 6]);
		let hex = id.to_hex();
		assert_eq!(ShortId::from_hex(&hex).unwrap(), id);
	}

	#[test]
	fn short_id_is_namespaced() {
		// the same entry in two different blocks produces different short ids
		let entry = 42u64;
		let block_a = ZERO_HASH;
		let block_b = Hash::from_vec(&[1; 32]);
		assert_ne!(entry.short_id(&block_a, 0), entry.short_id(&block_b, 0));
		// and different nonces give different ids too
		assert_ne!(entry.short_id(&block_a, 0), entry.short_id(&block_a, 1));
	}
}
