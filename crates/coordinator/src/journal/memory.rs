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

use dashmap::{DashMap, mapref::entry::Entry};
use gavel_sdk::types::{Bid, SettlementRecord};

use super::{AuctionJournal, JournalError};

/// In-memory implementation of the Auction Journal
///
/// Characteristics:
/// - No durability across process restarts
/// - Per-listing bid vectors behind a sharded map
/// - Survives room eviction, so an ended auction is never reopened
pub struct MemoryAuctionJournal {
	bids: DashMap<String, Vec<Bid>>,
	settlements: DashMap<String, SettlementRecord>,
}

impl MemoryAuctionJournal {
	pub fn new() -> Self {
		Self {
			bids: DashMap::new(),
			settlements: DashMap::new(),
		}
	}
}

impl Default for MemoryAuctionJournal {
	fn default() -> Self {
		Self::new()
	}
}

impl AuctionJournal for MemoryAuctionJournal {
	fn append_bid(&self, bid: &Bid) -> Result<(), JournalError> {
		let mut history = self.bids.entry(bid.listing_id.clone()).or_default();
		let expected = history.last().map_or(1, |last| last.sequence + 1);
		if bid.sequence != expected {
			return Err(JournalError::OutOfSequence {
				listing_id: bid.listing_id.clone(),
				expected,
				got: bid.sequence,
			});
		}

		history.push(bid.clone());
		Ok(())
	}

	fn bids(&self, listing_id: &str) -> Vec<Bid> {
		self.bids
			.get(listing_id)
			.map(|history| history.clone())
			.unwrap_or_default()
	}

	fn record_settlement(&self, record: &SettlementRecord) -> Result<(), JournalError> {
		match self.settlements.entry(record.listing_id.clone()) {
			Entry::Occupied(_) => Err(JournalError::AlreadySettled(record.listing_id.clone())),
			Entry::Vacant(slot) => {
				slot.insert(record.clone());
				Ok(())
			}
		}
	}

	fn settlement(&self, listing_id: &str) -> Option<SettlementRecord> {
		self.settlements
			.get(listing_id)
			.map(|record| record.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use gavel_sdk::types::EndTrigger;

	fn create_test_bid(listing_id: &str, sequence: u64, amount: u64) -> Bid {
		Bid {
			id: format!("bid_{}", sequence),
			listing_id: listing_id.to_string(),
			bidder_id: "alice".to_string(),
			amount,
			sequence,
			timestamp: Utc::now(),
		}
	}

	fn create_test_record(listing_id: &str) -> SettlementRecord {
		SettlementRecord {
			listing_id: listing_id.to_string(),
			seller_id: "seller".to_string(),
			winner: None,
			refunded: Vec::new(),
			trigger: EndTrigger::Deadline,
			settled_at: Utc::now(),
		}
	}

	#[test]
	fn test_append_and_read_back() {
		let journal = MemoryAuctionJournal::new();
		journal.append_bid(&create_test_bid("listing_1", 1, 50)).unwrap();
		journal.append_bid(&create_test_bid("listing_1", 2, 80)).unwrap();
		journal.append_bid(&create_test_bid("listing_2", 1, 10)).unwrap();

		let history = journal.bids("listing_1");
		assert_eq!(history.len(), 2);
		assert_eq!(history[1].amount, 80);
		assert!(journal.bids("listing_3").is_empty());
	}

	#[test]
	fn test_out_of_sequence_rejected() {
		let journal = MemoryAuctionJournal::new();
		journal.append_bid(&create_test_bid("listing_1", 1, 50)).unwrap();

		let result = journal.append_bid(&create_test_bid("listing_1", 3, 80));
		assert!(matches!(
			result,
			Err(JournalError::OutOfSequence {
				expected: 2,
				got: 3,
				..
			})
		));
	}

	#[test]
	fn test_settlement_written_once() {
		let journal = MemoryAuctionJournal::new();
		let record = create_test_record("listing_1");

		assert!(journal.settlement("listing_1").is_none());
		journal.record_settlement(&record).unwrap();
		assert!(matches!(
			journal.record_settlement(&record),
			Err(JournalError::AlreadySettled(_))
		));
		assert_eq!(journal.settlement("listing_1"), Some(record));
	}
}
