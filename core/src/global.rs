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

//! Values that should be shared across all modules, without necessarily
//! having to pass them all over the place, but aren't consensus values.
//! should be used sparingly.

use crate::consensus::{
	self, graph_weight, HeaderInfo, C32_GRAPH_WEIGHT, COINBASE_MATURITY, CUT_THROUGH_HORIZON,
	DEFAULT_MIN_EDGE_BITS, INITIAL_DIFFICULTY, PROOFSIZE, SECOND_POW_EDGE_BITS,
	STATE_SYNC_THRESHOLD,
};
use crate::core::block::HeaderVersion;
use crate::pow::{
	new_cuckaroo_ctx, new_cuckarood_ctx, new_cuckaroom_ctx, new_cuckarooz_ctx, new_cuckatoo_ctx,
	PoWContext,
};
use crate::util::OneTime;
use std::cell::Cell;

/// An enum collecting sets of parameters used throughout the
/// code wherever mining is needed. This should allow for
/// different sets of parameters for different purposes,
/// e.g. CI, User testing, production values
/// Define these here, as they should be developer-set, not really tweakable
/// by users

/// Automated testing edge_bits
pub const AUTOMATED_TESTING_MIN_EDGE_BITS: u8 = 9;

/// Automated testing proof size
pub const AUTOMATED_TESTING_PROOF_SIZE: usize = 4;

/// User testing edge_bits
pub const USER_TESTING_MIN_EDGE_BITS: u8 = 15;

/// User testing proof size
pub const USER_TESTING_PROOF_SIZE: usize = 42;

/// Automated testing coinbase maturity
pub const AUTOMATED_TESTING_COINBASE_MATURITY: u64 = 25;

/// User testing coinbase maturity
pub const USER_TESTING_COINBASE_MATURITY: u64 = 25;

/// Testing cut through horizon in blocks
pub const AUTOMATED_TESTING_CUT_THROUGH_HORIZON: u32 = 20;

/// Testing cut through horizon in blocks
pub const USER_TESTING_CUT_THROUGH_HORIZON: u32 = 70;

/// Testing state sync threshold in blocks
pub const TESTING_STATE_SYNC_THRESHOLD: u32 = 20;

/// Testing initial block difficulty
pub const TESTING_INITIAL_DIFFICULTY: u64 = 1;

/// Types of chain a server can run with, dictates the genesis block and
/// and mining parameters used.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum ChainTypes {
	/// For CI testing
	AutomatedTesting,
	/// For User testing
	UserTesting,
	/// Protocol testing network
	Floonet,
	/// Main production network
	Mainnet,
}

impl Default for ChainTypes {
	fn default() -> ChainTypes {
		ChainTypes::Mainnet
	}
}

lazy_static! {
	/// Global chain_type that must be initialized once on node startup.
	/// This is accessed via get_chain_type() which allows the global value
	/// to be overridden on a per-thread basis (for testing).
	pub static ref GLOBAL_CHAIN_TYPE: OneTime<ChainTypes> = OneTime::new();
}

thread_local! {
	/// Mainnet|Floonet|UserTesting|AutomatedTesting
	pub static CHAIN_TYPE: Cell<Option<ChainTypes>> = Cell::new(None);
}

/// Set the global chain_type using an override
pub fn set_global_chain_type(new_type: ChainTypes) {
	GLOBAL_CHAIN_TYPE.init(new_type);
}

/// Set the chain type on a per-thread basis via thread_local storage.
pub fn set_local_chain_type(new_type: ChainTypes) {
	CHAIN_TYPE.with(|chain_type| chain_type.set(Some(new_type)))
}

/// Get the chain type via thread_local, fallback to global chain_type.
pub fn get_chain_type() -> ChainTypes {
	CHAIN_TYPE.with(|chain_type| match chain_type.get() {
		None => {
			if !GLOBAL_CHAIN_TYPE.is_init() {
				panic!("GLOBAL_CHAIN_TYPE and CHAIN_TYPE unset. Consider set_local_chain_type() in tests.");
			}
			let chain_type = GLOBAL_CHAIN_TYPE.borrow();
			set_local_chain_type(chain_type);
			chain_type
		}
		Some(chain_type) => chain_type,
	})
}

/// Return either a cuckatoo context or a cuckaroo-family context,
/// depending on the current chain type, the height and the edge_bits.
pub fn create_pow_context(
	height: u64,
	edge_bits: u8,
	proof_size: usize,
	max_sols: u32,
) -> Result<Box<dyn PoWContext>, crate::pow::Error> {
	let chain_type = get_chain_type();
	match chain_type {
		// Mainnet and Floonet have Cuckatoo31+ for the primary PoW and
		// the cuckaroo family of ASIC-resistant PoW at 29 bits.
		ChainTypes::Mainnet | ChainTypes::Floonet if edge_bits > 29 => {
			new_cuckatoo_ctx(edge_bits, proof_size, max_sols)
		}
		ChainTypes::Mainnet | ChainTypes::Floonet => secondary_pow_ctx(height, proof_size),

		// Everything else is testing with smaller graph sizes.
		_ => new_cuckatoo_ctx(edge_bits, proof_size, max_sols),
	}
}

/// The secondary PoW in effect at the given height: each of the scheduled
/// hard forks replaces the 29-bit variant to re-establish ASIC resistance.
fn secondary_pow_ctx(
	height: u64,
	proof_size: usize,
) -> Result<Box<dyn PoWContext>, crate::pow::Error> {
	match consensus::header_version(height) {
		HeaderVersion(1) => new_cuckaroo_ctx(SECOND_POW_EDGE_BITS, proof_size),
		HeaderVersion(2) => new_cuckarood_ctx(SECOND_POW_EDGE_BITS, proof_size),
		HeaderVersion(3) => new_cuckaroom_ctx(SECOND_POW_EDGE_BITS, proof_size),
		// from HardFork4 onwards the secondary PoW is cuckarooz (and is being
		// phased out entirely as the scaling factor goes to zero)
		_ => new_cuckarooz_ctx(SECOND_POW_EDGE_BITS, proof_size),
	}
}

/// The minimum acceptable edge_bits
pub fn min_edge_bits() -> u8 {
	match get_chain_type() {
		ChainTypes::AutomatedTesting => AUTOMATED_TESTING_MIN_EDGE_BITS,
		ChainTypes::UserTesting => USER_TESTING_MIN_EDGE_BITS,
		_ => DEFAULT_MIN_EDGE_BITS,
	}
}

/// Reference edge_bits used to compute factor on higher Cuck(at)oo graph
/// sizes, while the min_edge_bits can be changed on a soft fork, changing
/// base_edge_bits is a hard fork.
pub fn base_edge_bits() -> u8 {
	match get_chain_type() {
		ChainTypes::AutomatedTesting => AUTOMATED_TESTING_MIN_EDGE_BITS,
		ChainTypes::UserTesting => USER_TESTING_MIN_EDGE_BITS,
		_ => consensus::BASE_EDGE_BITS,
	}
}

/// The proofsize
pub fn proofsize() -> usize {
	match get_chain_type() {
		ChainTypes::AutomatedTesting => AUTOMATED_TESTING_PROOF_SIZE,
		ChainTypes::UserTesting => USER_TESTING_PROOF_SIZE,
		_ => PROOFSIZE,
	}
}

/// Coinbase maturity for coinbases to be spent
pub fn coinbase_maturity() -> u64 {
	match get_chain_type() {
		ChainTypes::AutomatedTesting => AUTOMATED_TESTING_COINBASE_MATURITY,
		ChainTypes::UserTesting => USER_TESTING_COINBASE_MATURITY,
		_ => COINBASE_MATURITY,
	}
}

/// Initial mining difficulty
pub fn initial_block_difficulty() -> u64 {
	match get_chain_type() {
		ChainTypes::AutomatedTesting => TESTING_INITIAL_DIFFICULTY,
		ChainTypes::UserTesting => TESTING_INITIAL_DIFFICULTY,
		_ => INITIAL_DIFFICULTY,
	}
}

/// Initial mining secondary scale
pub fn initial_graph_weight() -> u32 {
	match get_chain_type() {
		ChainTypes::AutomatedTesting => TESTING_INITIAL_DIFFICULTY as u32,
		ChainTypes::UserTesting => TESTING_INITIAL_DIFFICULTY as u32,
		_ => graph_weight(0, SECOND_POW_EDGE_BITS) as u32,
	}
}

/// Minimum difficulty under the wtema difficulty adjustment
pub fn min_wtema_graph_weight() -> u64 {
	match get_chain_type() {
		ChainTypes::Mainnet => C32_GRAPH_WEIGHT,
		_ => graph_weight(0, SECOND_POW_EDGE_BITS),
	}
}

/// Horizon at which we can cut-through and do full local pruning
pub fn cut_through_horizon() -> u32 {
	match get_chain_type() {
		ChainTypes::AutomatedTesting => AUTOMATED_TESTING_CUT_THROUGH_HORIZON,
		ChainTypes::UserTesting => USER_TESTING_CUT_THROUGH_HORIZON,
		_ => CUT_THROUGH_HORIZON,
	}
}

/// Threshold at which we request a txhashset (and full blocks from)
pub fn state_sync_threshold() -> u32 {
	match get_chain_type() {
		ChainTypes::AutomatedTesting => TESTING_STATE_SYNC_THRESHOLD,
		ChainTypes::UserTesting => TESTING_STATE_SYNC_THRESHOLD,
		_ => STATE_SYNC_THRESHOLD,
	}
}

/// Are we in production mode?
/// Production defined as a live public network, testnet or mainnet.
pub fn is_production_mode() -> bool {
	match get_chain_type() {
		ChainTypes::Floonet | ChainTypes::Mainnet => true,
		_ => false,
	}
}

/// Are we in mainnet mode?
pub fn is_mainnet() -> bool {
	get_chain_type() == ChainTypes::Mainnet
}

/// Converts an iterator of block difficulty data to more a more manageable
/// vector and pads if needed (which will) only be needed for the first few
/// blocks after genesis
pub fn difficulty_data_to_vector<T>(cursor: T, needed_block_count: u64) -> Vec<HeaderInfo>
where
	T: IntoIterator<Item = HeaderInfo>,
{
	// Convert iterator to vector, so we can append to it if necessary
	let needed_block_count = needed_block_count as usize + 1;
	let mut last_n: Vec<HeaderInfo> = cursor.into_iter().take(needed_block_count).collect();

	// Only needed just after blockchain launch... basically ensures there's
	// always enough data by simulating perfectly timed blocks at the genesis
	// difficulty.
	let block_count_difference = needed_block_count.saturating_sub(last_n.len());
	if block_count_difference > 0 {
		// Collect any real data we have, then pad with simulated data.
		let last_ts_delta = if last_n.len() > 1 {
			last_n[0].timestamp - last_n[1].timestamp
		} else {
			consensus::BLOCK_TIME_SEC
		};
		let last_diff = last_n
			.last()
			.map(|n| n.difficulty)
			.unwrap_or_else(|| crate::pow::Difficulty::from_num(initial_block_difficulty()));

		// fill in simulated blocks with values from the previous real block
		let mut last_ts = last_n.last().map(|n| n.timestamp).unwrap_or(0);
		for _ in 0..block_count_difference {
			last_ts = last_ts.saturating_sub(last_ts_delta);
			last_n.push(HeaderInfo::from_ts_diff(last_ts, last_diff));
		}
	}
	last_n.reverse();
	last_n
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::consensus::DMA_WINDOW;
	use crate::pow::Difficulty;

	// Builds a vector of header info for next difficulty calculation with the
	// provided constant time interval, difficulty and total length.
	fn repeat(interval: u64, diff: HeaderInfo, len: u64, cur_time: Option<u64>) -> Vec<HeaderInfo> {
		let cur_time = cur_time.unwrap_or(1_000_000_000);
		// watch overflow here, length shouldn't be ridiculous anyhow
		assert!(len < std::usize::MAX as u64);
		let diffs = vec![diff.difficulty; len as usize];
		let times = (0..(len as usize)).map(|n| cur_time - n as u64 * interval);
		let pairs = times.zip(diffs.iter());
		pairs
			.map(|(t, d)| HeaderInfo::new(t, *d, diff.secondary_scaling, diff.is_secondary))
			.collect::<Vec<_>>()
	}

	#[test]
	fn next_dma_difficulty_stable() {
		set_local_chain_type(ChainTypes::AutomatedTesting);
		// If all blocks are at the ideal 60s spacing the difficulty must not move.
		let diff = Difficulty::from_num(10_000);
		let history = repeat(
			consensus::BLOCK_TIME_SEC,
			HeaderInfo::from_ts_diff(1_000_000_000, diff),
			DMA_WINDOW + 2,
			Some(1_000_000_000),
		);
		let next = consensus::next_dma_difficulty(1, history);
		assert_eq!(next.difficulty, diff);
	}

	#[test]
	fn next_dma_difficulty_adjusts_up() {
		set_local_chain_type(ChainTypes::AutomatedTesting);
		// Blocks coming in at twice the expected rate raise the difficulty.
		let diff = Difficulty::from_num(10_000);
		let history = repeat(
			consensus::BLOCK_TIME_SEC / 2,
			HeaderInfo::from_ts_diff(1_000_000_000, diff),
			DMA_WINDOW + 2,
			Some(1_000_000_000),
		);
		let next = consensus::next_dma_difficulty(1, history);
		assert!(next.difficulty > diff);
	}

	#[test]
	fn next_dma_difficulty_adjusts_down() {
		set_local_chain_type(ChainTypes::AutomatedTesting);
		// Blocks coming in at half the expected rate lower the difficulty.
		let diff = Difficulty::from_num(10_000);
		let history = repeat(
			consensus::BLOCK_TIME_SEC * 2,
			HeaderInfo::from_ts_diff(1_000_000_000, diff),
			DMA_WINDOW + 2,
			Some(1_000_000_000),
		);
		let next = consensus::next_dma_difficulty(1, history);
		assert!(next.difficulty < diff);
	}

	#[test]
	fn next_wtema_difficulty_stable() {
		set_local_chain_type(ChainTypes::UserTesting);
		// At the ideal spacing the difficulty must not move.
		let diff = Difficulty::from_num(100_000);
		let history = repeat(
			consensus::BLOCK_TIME_SEC,
			HeaderInfo::from_ts_diff(1_000_000_000, diff),
			2,
			Some(1_000_000_000),
		);
		let next = consensus::next_wtema_difficulty(consensus::HARD_FORK_INTERVAL * 4, history);
		assert_eq!(next.difficulty, diff);
	}

	#[test]
	fn next_wtema_difficulty_adjusts() {
		set_local_chain_type(ChainTypes::UserTesting);
		let diff = Difficulty::from_num(100_000);
		// fast block raises difficulty
		let history = repeat(
			consensus::BLOCK_TIME_SEC - 30,
			HeaderInfo::from_ts_diff(1_000_000_000, diff),
			2,
			Some(1_000_000_000),
		);
		let next = consensus::next_wtema_difficulty(consensus::HARD_FORK_INTERVAL * 4, history);
		assert!(next.difficulty > diff);

		// slow block lowers difficulty
		let history = repeat(
			consensus::BLOCK_TIME_SEC + 30,
			HeaderInfo::from_ts_diff(1_000_000_000, diff),
			2,
			Some(1_000_000_000),
		);
		let next = consensus::next_wtema_difficulty(consensus::HARD_FORK_INTERVAL * 4, history);
		assert!(next.difficulty < diff);
	}

	#[test]
	fn dma_to_wtema_transition() {
		set_local_chain_type(ChainTypes::Mainnet);
		let diff = Difficulty::from_num(C32_GRAPH_WEIGHT * 10);
		let history = repeat(
			consensus::BLOCK_TIME_SEC,
			HeaderInfo::from_ts_diff(1_000_000_000, diff),
			DMA_WINDOW + 2,
			Some(1_000_000_000),
		);

		// the last DMA height
		let pre =
			consensus::next_difficulty(4 * consensus::HARD_FORK_INTERVAL - 1, history.clone());
		// first WTEMA height
		let post = consensus::next_difficulty(4 * consensus::HARD_FORK_INTERVAL, history);

		// DMA keeps a secondary scaling factor, WTEMA drops it to zero
		assert!(pre.secondary_scaling > 0);
		assert_eq!(post.secondary_scaling, 0);
		assert_eq!(post.difficulty, diff);
	}
}
