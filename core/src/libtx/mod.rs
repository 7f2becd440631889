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

//! Library containing lower-level transaction building functions needed by
//! all wallets. Here it mostly serves block reward construction and the
//! transaction fixtures used throughout the test suites; full interactive
//! transaction building belongs to the wallet.

pub mod aggsig;
pub mod build;
mod error;
pub mod proof;
pub mod reward;

pub use self::error::{Error, ErrorKind};
