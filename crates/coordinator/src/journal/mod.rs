// Copyright 2025 itscheems
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

mod memory;

use gavel_sdk::types::{Bid, SettlementRecord};
use thiserror::Error;

pub use memory::MemoryAuctionJournal;

/// Error types for Auction Journal operations
#[derive(Debug, Error)]
pub enum JournalError {
	#[error("Bid out of sequence for {listing_id}: expected {expected}, got {got}")]
	OutOfSequence {
		listing_id: String,
		expected: u64,
		got: u64,
	},
	#[error("Settlement already recorded: {0}")]
	AlreadySettled(String),
	#[error("Journal storage error: {0}")]
	StorageError(String),
}

/// Auction Journal trait - the durable history behind every room
///
/// The journal records accepted bids and final settlements per listing.
/// Rooms are runtime state and may be evicted or lost; the journal is
/// what a recreated room is rebuilt from, and what settlement is
/// recomputed from after a crash.
///
/// Key semantic constraints:
/// - Bids are append-only and must arrive in sequence order per listing
/// - A settlement is written at most once per listing
/// - Bids are appended before they are broadcast, settlements before
///   `auctionEnded` is broadcast
///
/// This abstraction is implementation-agnostic: it can be backed by
/// in-memory structures, a database table, or an external log.
pub trait AuctionJournal: Send + Sync {
	/// Append an accepted bid
	///
	/// Returns error if the bid's sequence number does not directly follow
	/// the last journalled bid of its listing.
	fn append_bid(&self, bid: &Bid) -> Result<(), JournalError>;

	/// All accepted bids of a listing, in sequence order
	fn bids(&self, listing_id: &str) -> Vec<Bid>;

	/// Record the final outcome of a listing
	///
	/// Returns error if a settlement was already recorded.
	fn record_settlement(&self, record: &SettlementRecord) -> Result<(), JournalError>;

	/// The recorded outcome of a listing, if it has been settled
	fn settlement(&self, listing_id: &str) -> Option<SettlementRecord>;
}
