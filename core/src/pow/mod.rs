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

//! The proof of work needs to strike a balance between fast header
//! verification to avoid DoS attacks and difficulty for block verifiers to
//! build new blocks. In addition, mining new blocks should also be as
//! difficult on high end custom-made hardware (ASICs) as on commodity
//! hardware or smartphones. For this reason we use Cuckoo Cycle (see the
//! cuckoo module for more information).
//!
//! Note that this module only verifies: solving belongs to mining plugins
//! outside the node core.

pub mod common;
pub mod cuckaroo;
pub mod cuckatoo;
mod error;
mod siphash;
mod types;

use crate::core::BlockHeader;
use crate::global;

pub use self::cuckaroo::{
	new_cuckaroo_ctx, new_cuckarood_ctx, new_cuckaroom_ctx, new_cuckarooz_ctx, CuckarooContext,
	Variant,
};
pub use self::cuckatoo::{new_cuckatoo_ctx, CuckatooContext};
pub use self::error::{Error, ErrorKind};
pub use self::siphash::{siphash24, siphash_block};
pub use self::types::{Difficulty, PoWContext, Proof, ProofOfWork};

const MAX_SOLS: u32 = 10;

/// Validates the proof of work of a given header.
pub fn verify_size(bh: &BlockHeader) -> Result<(), Error> {
	let mut ctx = global::create_pow_context(
		bh.height,
		bh.pow.edge_bits(),
		bh.pow.proof.nonces.len(),
		MAX_SOLS,
	)?;
	ctx.set_header_nonce(bh.pre_pow(), None, false)?;
	ctx.verify(&bh.pow.proof)
}
