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

//! Common types and functions for the cuckoo/cuckatoo family of verifiers

use crate::pow::error::Error;
use crate::pow::siphash::siphash24;
use blake2_rfc::blake2b::blake2b;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

/// Derive the siphash keys from the header (and optional nonce replacing
/// the last 4 bytes of the header).
pub fn set_header_nonce(header: &[u8], nonce: Option<u32>) -> Result<[u64; 4], Error> {
	if let Some(n) = nonce {
		let len = header.len();
		let mut header = header.to_owned();
		header.truncate(len - 4); // drop last 4 bytes (u32) off the end
		header.write_u32::<LittleEndian>(n)?;
		create_siphash_keys(&header)
	} else {
		create_siphash_keys(&header)
	}
}

/// The four siphash keys are the blake2b-256 hash of the pre-pow header
/// bytes, read as little-endian u64s.
pub fn create_siphash_keys(header: &[u8]) -> Result<[u64; 4], Error> {
	let h = blake2b(32, &[], &header);
	let hb = h.as_bytes();
	Ok([
		LittleEndian::read_u64(&hb[0..8]),
		LittleEndian::read_u64(&hb[8..16]),
		LittleEndian::read_u64(&hb[16..24]),
		LittleEndian::read_u64(&hb[24..32]),
	])
}

/// Utility struct to calculate commonly used Cuckoo parameters calculated
/// from header, nonce, edge_bits, etc.
pub struct CuckooParams {
	/// Number of bits in an edge index
	pub edge_bits: u8,
	/// Size of the cycle to look for
	pub proof_size: usize,
	/// Total number of edges
	pub num_edges: u64,
	/// The siphash keys, generated from the header
	pub siphash_keys: [u64; 4],
	/// Mask applied to edge indices
	pub edge_mask: u64,
	/// Mask applied to node values
	pub node_mask: u64,
}

impl CuckooParams {
	/// Instantiates new params and calculate edge mask, node mask, etc
	pub fn new(edge_bits: u8, node_bits: u8, proof_size: usize) -> Result<CuckooParams, Error> {
		let num_edges = 1u64 << edge_bits;
		let edge_mask = num_edges - 1;
		let num_nodes = 1u64 << node_bits;
		let node_mask = num_nodes - 1;
		Ok(CuckooParams {
			edge_bits,
			proof_size,
			num_edges,
			siphash_keys: [0; 4],
			edge_mask,
			node_mask,
		})
	}

	/// Reset the main keys used for siphash from the header and nonce
	pub fn reset_header_nonce(&mut self, header: Vec<u8>, nonce: Option<u32>) -> Result<(), Error> {
		self.siphash_keys = set_header_nonce(&header, nonce)?;
		Ok(())
	}

	/// Return masked siphash of the edge, used by cuckatoo to derive nodes
	pub fn sipnode(&self, edge: u64, uorv: u64) -> Result<u64, Error> {
		let hash_u64 = siphash24(&self.siphash_keys, 2 * edge + uorv, 21);
		let node = hash_u64 & self.node_mask;
		Ok(node)
	}
}
