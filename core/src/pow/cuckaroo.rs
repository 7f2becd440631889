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

//! Verifiers for the cuckaroo family of ASIC-resistant proofs of work,
//! based on Cuckoo Cycle designed by John Tromp.
//!
//! The original Cuckaroo has been tweaked at each scheduled hard fork to
//! stay ASIC-resistant: Cuckarood replaces the siphash rotation by 21 with
//! a rotation by 25, halves the number of nodes in each partition and
//! requires cycles to alternate between even- and odd-indexed edges.
//! Cuckaroom keeps all nodes in a single partition, with edges directed
//! from the even to the odd endpoint. Cuckarooz squashes both endpoints
//! into a single node space of twice the size.
//!
//! The four variants share the sipblock edge derivation and differ only in
//! the final rotation constant, the block folding, the node masking and the
//! cycle-matching rule, so they are implemented as a single context
//! parameterized by variant.

use crate::pow::common::CuckooParams;
use crate::pow::error::{Error, ErrorKind};
use crate::pow::siphash::siphash_block;
use crate::pow::{PoWContext, Proof};

/// The flavors of the 29-bit ASIC-resistant proof of work, in hard fork
/// order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Variant {
	/// The original, phased out at the first hard fork
	Cuckaroo,
	/// Second era, rotation 25 and direction-balanced cycles
	Cuckarood,
	/// Third era, single node partition
	Cuckaroom,
	/// Fourth era, both endpoints in one node space
	Cuckarooz,
}

impl Variant {
	/// Siphash rotation constant for this variant
	fn rot_e(self) -> u8 {
		match self {
			Variant::Cuckarood => 25,
			_ => 21,
		}
	}

	/// Whether sipblock folds in all following hashes (or only the last)
	fn xor_all(self) -> bool {
		match self {
			Variant::Cuckaroom | Variant::Cuckarooz => true,
			_ => false,
		}
	}
}

/// Instantiate a new CuckarooContext as a PowContext.
pub fn new_cuckaroo_ctx(edge_bits: u8, proof_size: usize) -> Result<Box<dyn PoWContext>, Error> {
	let ctx = CuckarooContext::new_impl(edge_bits, proof_size, Variant::Cuckaroo)?;
	Ok(Box::new(ctx))
}

/// Instantiate a new CuckaroodContext as a PowContext.
pub fn new_cuckarood_ctx(edge_bits: u8, proof_size: usize) -> Result<Box<dyn PoWContext>, Error> {
	let ctx = CuckarooContext::new_impl(edge_bits, proof_size, Variant::Cuckarood)?;
	Ok(Box::new(ctx))
}

/// Instantiate a new CuckaroomContext as a PowContext.
pub fn new_cuckaroom_ctx(edge_bits: u8, proof_size: usize) -> Result<Box<dyn PoWContext>, Error> {
	let ctx = CuckarooContext::new_impl(edge_bits, proof_size, Variant::Cuckaroom)?;
	Ok(Box::new(ctx))
}

/// Instantiate a new CuckaroozContext as a PowContext.
pub fn new_cuckarooz_ctx(edge_bits: u8, proof_size: usize) -> Result<Box<dyn PoWContext>, Error> {
	let ctx = CuckarooContext::new_impl(edge_bits, proof_size, Variant::Cuckarooz)?;
	Ok(Box::new(ctx))
}

/// Cuckaroo-family cycle context. Only includes the verifier for now.
pub struct CuckarooContext {
	params: CuckooParams,
	variant: Variant,
}

impl CuckarooContext {
	/// Create a new context for the given variant.
	pub fn new_impl(
		edge_bits: u8,
		proof_size: usize,
		variant: Variant,
	) -> Result<CuckarooContext, Error> {
		// cuckarooz merges both endpoint partitions into one node space
		let node_bits = match variant {
			Variant::Cuckarooz => edge_bits + 1,
			_ => edge_bits,
		};
		let params = CuckooParams::new(edge_bits, node_bits, proof_size)?;
		Ok(CuckarooContext { params, variant })
	}

	/// Derive the two endpoints of the given edge index.
	fn sipedge(&self, nonce: u64) -> u64 {
		siphash_block(
			&self.params.siphash_keys,
			nonce,
			self.variant.rot_e(),
			self.variant.xor_all(),
		)
	}

	fn verify_cuckaroo(&self, proof: &Proof) -> Result<(), Error> {
		let size = proof.proof_size();
		let nonces = &proof.nonces;
		let mut uvs = vec![0u64; 2 * size];
		let mut xor0: u64 = 0;
		let mut xor1: u64 = 0;

		for n in 0..size {
			if nonces[n] > self.params.edge_mask {
				return Err(ErrorKind::Verification("edge too big".to_owned()))?;
			}
			if n > 0 && nonces[n] <= nonces[n - 1] {
				return Err(ErrorKind::Verification("edges not ascending".to_owned()))?;
			}
			let edge = self.sipedge(nonces[n]);
			uvs[2 * n] = edge & self.params.node_mask;
			uvs[2 * n + 1] = (edge >> 32) & self.params.node_mask;
			xor0 ^= uvs[2 * n];
			xor1 ^= uvs[2 * n + 1];
		}
		if xor0 | xor1 != 0 {
			return Err(ErrorKind::Verification(
				"endpoints don't match up".to_owned(),
			))?;
		}
		let mut n = 0;
		let mut i = 0;
		let mut j;
		loop {
			// follow cycle
			j = i;
			let mut k = i;
			loop {
				k = (k + 2) % (2 * size);
				if k == i {
					break;
				}
				if uvs[k] == uvs[i] {
					// find other edge endpoint identical to one at i
					if j != i {
						return Err(ErrorKind::Verification("branch in cycle".to_owned()))?;
					}
					j = k;
				}
			}
			if j == i {
				return Err(ErrorKind::Verification("cycle dead ends".to_owned()))?;
			}
			i = j ^ 1;
			n += 1;
			if i == 0 {
				break;
			}
		}
		if n == size {
			Ok(())
		} else {
			Err(ErrorKind::Verification("cycle too short".to_owned()))?
		}
	}

	fn verify_cuckarood(&self, proof: &Proof) -> Result<(), Error> {
		let size = proof.proof_size();
		let nonces = &proof.nonces;
		let mut uvs = vec![0u64; 2 * size];
		let mut ndir = vec![0usize; 2];
		let mut xor0: u64 = 0;
		let mut xor1: u64 = 0;
		let nodemask = self.params.edge_mask >> 1;

		for n in 0..size {
			let dir = (nonces[n] & 1) as usize;
			if ndir[dir] >= size / 2 {
				return Err(ErrorKind::Verification("edges not balanced".to_owned()))?;
			}
			if nonces[n] > self.params.edge_mask {
				return Err(ErrorKind::Verification("edge too big".to_owned()))?;
			}
			if n > 0 && nonces[n] <= nonces[n - 1] {
				return Err(ErrorKind::Verification("edges not ascending".to_owned()))?;
			}
			let edge = self.sipedge(nonces[n]);
			let idx = 4 * ndir[dir] + 2 * dir;
			uvs[idx] = edge & nodemask;
			uvs[idx + 1] = (edge >> 32) & nodemask;
			xor0 ^= uvs[idx];
			xor1 ^= uvs[idx + 1];
			ndir[dir] += 1;
		}
		if xor0 | xor1 != 0 {
			return Err(ErrorKind::Verification(
				"endpoints don't match up".to_owned(),
			))?;
		}
		let mut n = 0;
		let mut i = 0;
		let mut j;
		loop {
			// follow cycle
			j = i;
			for k in (((i % 4) ^ 2)..(2 * size)).step_by(4) {
				if uvs[k] == uvs[i] {
					// find reverse edge endpoint identical to one at i
					if j != i {
						return Err(ErrorKind::Verification("branch in cycle".to_owned()))?;
					}
					j = k;
				}
			}
			if j == i {
				return Err(ErrorKind::Verification("cycle dead ends".to_owned()))?;
			}
			i = j ^ 1;
			n += 1;
			if i == 0 {
				break;
			}
		}
		if n == size {
			Ok(())
		} else {
			Err(ErrorKind::Verification("cycle too short".to_owned()))?
		}
	}

	fn verify_cuckaroom(&self, proof: &Proof) -> Result<(), Error> {
		let size = proof.proof_size();
		let nonces = &proof.nonces;
		let mut from = vec![0u64; size];
		let mut to = vec![0u64; size];
		let mut xor_from: u64 = 0;
		let mut xor_to: u64 = 0;
		let nodemask = self.params.edge_mask >> 1;

		for n in 0..size {
			if nonces[n] > self.params.edge_mask {
				return Err(ErrorKind::Verification("edge too big".to_owned()))?;
			}
			if n > 0 && nonces[n] <= nonces[n - 1] {
				return Err(ErrorKind::Verification("edges not ascending".to_owned()))?;
			}
			let edge = self.sipedge(nonces[n]);
			from[n] = edge & nodemask;
			xor_from ^= from[n];
			to[n] = (edge >> 32) & nodemask;
			xor_to ^= to[n];
		}
		if xor_from != xor_to {
			return Err(ErrorKind::Verification(
				"endpoints don't match up".to_owned(),
			))?;
		}
		let mut visited = vec![false; size];
		let mut n = 0;
		let mut i = 0;
		loop {
			// follow cycle
			if visited[i] {
				return Err(ErrorKind::Verification("branch in cycle".to_owned()))?;
			}
			visited[i] = true;
			// find outgoing edge meeting incoming edge i
			let mut nexti = 0;
			while from[nexti] != to[i] {
				nexti += 1;
				if nexti == size {
					return Err(ErrorKind::Verification("cycle dead ends".to_owned()))?;
				}
			}
			i = nexti;
			n += 1;
			if i == 0 {
				// must cycle back to start or find branch
				break;
			}
		}
		if n == size {
			Ok(())
		} else {
			Err(ErrorKind::Verification("cycle too short".to_owned()))?
		}
	}

	fn verify_cuckarooz(&self, proof: &Proof) -> Result<(), Error> {
		let size = proof.proof_size();
		let nonces = &proof.nonces;
		let mut uvs = vec![0u64; 2 * size];
		let mut xoruv: u64 = 0;
		let mask = u64::max_value() >> (size as u64).leading_zeros(); // round size up to 2-power - 1
																// the next arrays form a linked list of nodes with matching bits 6..1
		let mut head = vec![2 * size; 1 + mask as usize];
		let mut prev = vec![0usize; 2 * size];

		for n in 0..size {
			if nonces[n] > self.params.edge_mask {
				return Err(ErrorKind::Verification("edge too big".to_owned()))?;
			}
			if n > 0 && nonces[n] <= nonces[n - 1] {
				return Err(ErrorKind::Verification("edges not ascending".to_owned()))?;
			}
			let edge = self.sipedge(nonces[n]);
			let u = edge & self.params.node_mask;
			let v = (edge >> 32) & self.params.node_mask;

			uvs[2 * n] = u;
			let bits = (u & mask) as usize;
			prev[2 * n] = head[bits];
			head[bits] = 2 * n;

			uvs[2 * n + 1] = v;
			let bits = (v & mask) as usize;
			prev[2 * n + 1] = head[bits];
			head[bits] = 2 * n + 1;

			xoruv ^= uvs[2 * n] ^ uvs[2 * n + 1];
		}
		if xoruv != 0 {
			return Err(ErrorKind::Verification(
				"endpoints don't match up".to_owned(),
			))?;
		}
		// make prev lists circular
		for n in 0..(2 * size) {
			if prev[n] == 2 * size {
				let bits = (uvs[n] & mask) as usize;
				prev[n] = head[bits];
			}
		}
		let mut n = 0;
		let mut i = 0;
		let mut j;
		loop {
			// follow cycle
			j = i;
			let mut k = j;
			loop {
				k = prev[k];
				if k == i {
					break;
				}
				if uvs[k] == uvs[i] {
					// find other edge endpoint matching one at i
					if j != i {
						return Err(ErrorKind::Verification("branch in cycle".to_owned()))?;
					}
					j = k;
				}
			}
			if j == i {
				return Err(ErrorKind::Verification("cycle dead ends".to_owned()))?;
			}
			i = j ^ 1;
			n += 1;
			if i == 0 {
				break;
			}
		}
		if n == size {
			Ok(())
		} else {
			Err(ErrorKind::Verification("cycle too short".to_owned()))?
		}
	}
}

impl PoWContext for CuckarooContext {
	fn set_header_nonce(
		&mut self,
		header: Vec<u8>,
		nonce: Option<u32>,
		_solve: bool,
	) -> Result<(), Error> {
		self.params.reset_header_nonce(header, nonce)
	}

	fn find_cycles(&mut self) -> Result<Vec<Proof>, Error> {
		// this is a verify-only context, mining belongs to dedicated solvers
		Err(ErrorKind::NoSolution)?
	}

	fn verify(&self, proof: &Proof) -> Result<(), Error> {
		if proof.proof_size() != self.params.proof_size {
			return Err(ErrorKind::Verification("wrong cycle length".to_owned()))?;
		}
		match self.variant {
			Variant::Cuckaroo => self.verify_cuckaroo(proof),
			Variant::Cuckarood => self.verify_cuckarood(proof),
			Variant::Cuckaroom => self.verify_cuckaroom(proof),
			Variant::Cuckarooz => self.verify_cuckarooz(proof),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	// cuckarood: empty header, nonce 64
	static VD1_19_HASH: [u64; 4] = [
		0x89f81d7da5e674df,
		0x7586b93105a5fd13,
		0x6fbe212dd4e8c001,
		0x8800c93a8431f938,
	];
	static VD1_19_SOL: [u64; 42] = [
		0xa00, 0x3ffb, 0xa474, 0xdc27, 0x182e6, 0x242cc, 0x24de4, 0x270a2, 0x28356, 0x2951f,
		0x2a6ae, 0x2c889, 0x355c7, 0x3863b, 0x3bd7e, 0x3cdbc, 0x3ff95, 0x430b6, 0x4ba1a, 0x4bd7e,
		0x4c59f, 0x4f76d, 0x52064, 0x5378c, 0x540a3, 0x5af6b, 0x5b041, 0x5e9d3, 0x64ec7, 0x6564b,
		0x66763, 0x66899, 0x66e80, 0x68e4e, 0x69133, 0x6b20a, 0x6c2d7, 0x6fd3b, 0x79a8a, 0x79e29,
		0x7ae52, 0x7defe,
	];

	// cuckarood: empty header, nonce 15
	static VD2_29_HASH: [u64; 4] = [
		0xe2f917b2d79492ed,
		0xf51088eaaa3a07a0,
		0xaf4d4288d36a4fa8,
		0xc8cdfd30a54e0581,
	];
	static VD2_29_SOL: [u64; 42] = [
		0x1a9629, 0x1fb257, 0x5dc22a, 0xf3d0b0, 0x200c474, 0x24bd68f, 0x48ad104, 0x4a17170,
		0x4ca9a41, 0x55f983f, 0x6076c91, 0x6256ffc, 0x63b60a1, 0x7fd5b16, 0x985bff8, 0xaae71f3,
		0xb71f7b4, 0xb989679, 0xc09b7b8, 0xd7601da, 0xd7ab1b6, 0xef1c727, 0xf1e702b, 0xfd6d961,
		0xfdf0007, 0x10248134, 0x114657f6, 0x11f52612, 0x12887251, 0x13596b4b, 0x15e8d831,
		0x16b4c9e5, 0x17097420, 0x1718afca, 0x187fc40c, 0x19359788, 0x1b41d3f1, 0x1bea25a7,
		0x1d28df0f, 0x1ea6c4a0, 0x1f9bf79f, 0x1fa005c6,
	];

	// cuckaroom: empty header, nonce 64
	static VM1_19_HASH: [u64; 4] = [
		0xdb7896f799c76dab,
		0x352e8bf25df7a723,
		0xf0aa29cbb1150ea6,
		0x3206c2759f41cbd5,
	];
	static VM1_19_SOL: [u64; 42] = [
		0x0413c, 0x05121, 0x0546e, 0x1293a, 0x1dd27, 0x1e13e, 0x1e1d2, 0x22870, 0x24642, 0x24833,
		0x29190, 0x2a732, 0x2ccf6, 0x302cf, 0x32d9a, 0x33700, 0x33a20, 0x351d9, 0x3554b, 0x35a70,
		0x376c1, 0x398c6, 0x3f404, 0x3ff0c, 0x48b26, 0x49a03, 0x4c555, 0x4dcda, 0x4dfcd, 0x4fbb6,
		0x50275, 0x584a8, 0x5da0d, 0x5dbf1, 0x6038f, 0x66540, 0x72bbd, 0x77323, 0x77424, 0x77a14,
		0x77dc9, 0x7d9dc,
	];

	// cuckaroom: empty header, nonce 15
	static VM2_29_HASH: [u64; 4] = [
		0xe4b4a751f2eac47d,
		0x3115d47edfb69267,
		0x87de84146d9d609e,
		0x7deb20eab6d976a1,
	];
	static VM2_29_SOL: [u64; 42] = [
		0x04acd28, 0x29ccf71, 0x2a5572b, 0x2f31c2c, 0x2f60c37, 0x317fe1d, 0x32f6d4c, 0x3f51227,
		0x45ee1dc, 0x535eeb8, 0x5e135d5, 0x6184e3d, 0x6b1b8e0, 0x6f857a9, 0x8916a0f, 0x9beb5f8,
		0xa3c8dc9, 0xa886d94, 0xaab6a57, 0xd6df8f8, 0xe4d630f, 0xe6ae422, 0xea2d658, 0xf7f369b,
		0x10c465d8, 0x1130471e, 0x12049efb, 0x12f43bc5, 0x15b493a6, 0x16899354, 0x1915dfca,
		0x195c3dac, 0x19b09ab6, 0x1a1a8ed7, 0x1bba748f, 0x1bdbf777, 0x1c806542, 0x1d201b53,
		0x1d9e6af7, 0x1e99885e, 0x1f255834, 0x1f9c383b,
	];

	// cuckarooz: empty header, nonce 71
	static VZ1_19_HASH: [u64; 4] = [
		0xd129f63fba4d9a85,
		0x457dcb3666c5e09c,
		0x045247a2e2ee75f7,
		0x1a0f2e1bcb9d93ff,
	];
	static VZ1_19_SOL: [u64; 42] = [
		0x33b6, 0x487b, 0x88b7, 0x10bf6, 0x15144, 0x17cb7, 0x22621, 0x2358e, 0x23775, 0x24fb3,
		0x26b8a, 0x2876c, 0x2973e, 0x2f4ba, 0x30a62, 0x3a36b, 0x3ba5d, 0x3be67, 0x3ec56, 0x43141,
		0x4b9c5, 0x4fa06, 0x51a5c, 0x523e5, 0x53d08, 0x57d34, 0x5c2de, 0x60bba, 0x62509, 0x64d69,
		0x6803f, 0x68af4, 0x6bd52, 0x6f041, 0x6f900, 0x70051, 0x7097d, 0x735e8, 0x742c2, 0x79ae5,
		0x7f64d, 0x7fd49,
	];

	// cuckarooz: empty header, nonce 15
	static VZ2_29_HASH: [u64; 4] = [
		0x34bb4c75c929a2f5,
		0x21df13263aa81235,
		0x37d00939eae4be06,
		0x473251cbf6941553,
	];
	static VZ2_29_SOL: [u64; 42] = [
		0x49733a, 0x1d49107, 0x253d2ca, 0x5ad5e59, 0x5b671bd, 0x5dcae1c, 0x5f9a589, 0x65e9afc,
		0x6a59a45, 0x7d9c6d3, 0x7df96e4, 0x8b26174, 0xa17b430, 0xa1c8c0d, 0xa8a0327, 0xabd7402,
		0xacb7c77, 0xb67524f, 0xc1c15a6, 0xc7e2c26, 0xc7f5d8d, 0xcae478a, 0xdea9229, 0xe1ab49e,
		0xf57c7db, 0xfb4e8c5, 0xff314aa, 0x110ccc12, 0x143e546f, 0x17007af8, 0x17140ea2,
		0x173d7c5d, 0x175cd13f, 0x178b8880, 0x1801edc5, 0x18c8f56b, 0x18c8fe6d, 0x19f1a31a,
		0x1bb028d1, 0x1caaa65a, 0x1cf29bc2, 0x1dbde27d,
	];

	fn new_impl(edge_bits: u8, variant: Variant, keys: &[u64; 4]) -> CuckarooContext {
		crate::global::set_local_chain_type(crate::global::ChainTypes::Mainnet);
		let mut ctx = CuckarooContext::new_impl(edge_bits, 42, variant).unwrap();
		ctx.params.siphash_keys = *keys;
		ctx
	}

	#[test]
	fn cuckarood19_29_vectors() {
		let ctx19 = new_impl(19, Variant::Cuckarood, &VD1_19_HASH);
		assert!(ctx19.verify(&Proof::new(VD1_19_SOL.to_vec())).is_ok());
		assert!(ctx19.verify(&Proof::zero(42)).is_err());
		let ctx29 = new_impl(29, Variant::Cuckarood, &VD2_29_HASH);
		assert!(ctx29.verify(&Proof::new(VD2_29_SOL.to_vec())).is_ok());
		assert!(ctx29.verify(&Proof::zero(42)).is_err());
	}

	#[test]
	fn cuckaroom19_29_vectors() {
		let ctx19 = new_impl(19, Variant::Cuckaroom, &VM1_19_HASH);
		assert!(ctx19.verify(&Proof::new(VM1_19_SOL.to_vec())).is_ok());
		assert!(ctx19.verify(&Proof::zero(42)).is_err());
		let ctx29 = new_impl(29, Variant::Cuckaroom, &VM2_29_HASH);
		assert!(ctx29.verify(&Proof::new(VM2_29_SOL.to_vec())).is_ok());
		assert!(ctx29.verify(&Proof::zero(42)).is_err());
	}

	#[test]
	fn cuckarooz19_29_vectors() {
		let ctx19 = new_impl(19, Variant::Cuckarooz, &VZ1_19_HASH);
		assert!(ctx19.verify(&Proof::new(VZ1_19_SOL.to_vec())).is_ok());
		assert!(ctx19.verify(&Proof::zero(42)).is_err());
		let ctx29 = new_impl(29, Variant::Cuckarooz, &VZ2_29_HASH);
		assert!(ctx29.verify(&Proof::new(VZ2_29_SOL.to_vec())).is_ok());
		assert!(ctx29.verify(&Proof::zero(42)).is_err());
	}

	#[test]
	fn cuckaroo_rejects_malformed() {
		let ctx = new_impl(19, Variant::Cuckaroo, &VD1_19_HASH);
		// all-zero proof fails the ascending check
		assert!(ctx.verify(&Proof::zero(42)).is_err());
		// wrong cycle length rejected up front
		assert!(ctx.verify(&Proof::zero(40)).is_err());
		// edge out of range
		let mut nonces: Vec<u64> = (0..42).collect();
		nonces[41] = 1 << 20;
		assert!(ctx.verify(&Proof::new(nonces)).is_err());
	}
}
