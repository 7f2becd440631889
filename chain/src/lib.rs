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

//! The chain-state engine of the node: accepts headers and blocks, maintains
//! the candidate and confirmed chains and all side branches, keeps the three
//! MMRs in lock-step with chain state and serves queries against it.
//!
//! Lock order across components is fixed to avoid deadlock:
//! TxPool -> ChainStore -> TxHashSet -> ChainDB. The chain facade acquires
//! the txhashset write lock for the duration of one block apply (or one
//! reorg) and nothing else.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

use grinpp_core as core;
use grinpp_util as util;

mod chain;
mod error;
pub mod pipe;
pub mod store;
pub mod txhashset;
pub mod types;

// Re-export the base interface this crate provides
pub use crate::chain::{Chain, MAX_ORPHAN_SIZE};
pub use crate::error::{Error, ErrorKind};
pub use crate::store::ChainStore;
pub use crate::types::{
	BlockStatus, ChainAdapter, ChainIndex, ChainStatus, NoopAdapter, Options, OutputLocation,
	SpentOutput, SyncPhase, Tip, TxHashSetRoots,
};
