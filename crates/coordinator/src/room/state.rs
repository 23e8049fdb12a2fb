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

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use gavel_sdk::types::{
	AuctionStatus, Bid, HighBid, Listing, RejectReason, RoomSnapshot, SettlementRecord, UserId,
};
use tracing::{error, warn};

use crate::{
	error::CoordinatorError,
	journal::AuctionJournal,
	ledger::{HoldId, Ledger},
};

/// Auction room state
///
/// This structure holds the complete runtime state of one listing's
/// bidding session:
/// - Accepted bids (append-only, strictly increasing amount and sequence)
/// - Current high bid and the hold backing it
/// - Lifecycle status and, once ended, the settlement record
/// - Connected participants (presence only)
///
/// The state is owned by the room's actor task. Every method that changes
/// it runs inside that task, one command at a time, which is what makes
/// the check-then-act of bid acceptance atomic.
pub struct RoomState {
	pub(crate) listing_id: String,
	pub(crate) seller_id: UserId,
	pub(crate) ends_at: DateTime<Utc>,
	pub(crate) status: AuctionStatus,
	pub(crate) bids: Vec<Bid>,
	pub(crate) high_bid: Option<HighBid>,
	/// Outstanding holds by bid ID. Normally only the leader's.
	pub(crate) holds: HashMap<String, HoldId>,
	pub(crate) next_sequence: u64,
	pub(crate) participants: BTreeSet<UserId>,
	pub(crate) settlement: Option<SettlementRecord>,
}

impl RoomState {
	/// Fresh room for an open listing
	pub fn new(listing: &Listing) -> Self {
		Self {
			listing_id: listing.id.clone(),
			seller_id: listing.seller_id.clone(),
			ends_at: listing.ends_at,
			status: AuctionStatus::Open,
			bids: Vec::new(),
			high_bid: None,
			holds: HashMap::new(),
			next_sequence: 1,
			participants: BTreeSet::new(),
			settlement: None,
		}
	}

	/// Rebuild a room from the journal
	///
	/// - A recorded settlement yields an ended room carrying that record.
	/// - Journalled bids without a settlement restore history, high bid and
	///   sequence counter. The leader's hold is reused if still outstanding,
	///   otherwise taken again; any other hold on the listing is released.
	/// - A listing the store reports as ended but that was never settled
	///   here cannot be rebuilt and is reported as not found.
	/// - So is a listing whose leader can no longer cover the high bid.
	pub fn restore(
		listing: &Listing,
		journal: &dyn AuctionJournal,
		ledger: &Ledger,
	) -> Result<Self, CoordinatorError> {
		let mut state = Self::new(listing);
		state.bids = journal.bids(&listing.id);
		state.next_sequence = state.bids.last().map_or(1, |bid| bid.sequence + 1);
		state.high_bid = state.bids.iter().max_by_key(|bid| bid.amount).map(|bid| HighBid {
			bidder_id: bid.bidder_id.clone(),
			amount: bid.amount,
		});

		if let Some(record) = journal.settlement(&listing.id) {
			state.status = AuctionStatus::Ended;
			state.settlement = Some(record);
			return Ok(state);
		}

		if listing.status == AuctionStatus::Ended {
			warn!(
				target: "room",
				listing_id = %listing.id,
				"Listing ended outside the coordinator, refusing to open a room"
			);
			return Err(CoordinatorError::AuctionNotFound(listing.id.clone()));
		}

		let leader = state.bids.iter().max_by_key(|bid| bid.amount).cloned();

		// Holds left behind by a previous room for this listing
		for hold in ledger.holds_on(&listing.id) {
			let is_leader = leader.as_ref().is_some_and(|bid| bid.id == hold.bid_id);
			if is_leader && hold.amount == leader.as_ref().map_or(0, |bid| bid.amount) {
				state.holds.insert(hold.bid_id.clone(), hold.id);
			} else if let Err(e) = ledger.release(hold.id) {
				warn!(target: "room", listing_id = %listing.id, error = %e, "Stale hold already gone");
			}
		}

		if let Some(leader) = leader
			&& !state.holds.contains_key(&leader.id)
		{
			// A leader without backing credits cannot be settled
			let hold = ledger
				.hold(&leader.bidder_id, leader.amount, &leader.listing_id, &leader.id)
				.map_err(|e| {
					error!(
						target: "room",
						listing_id = %listing.id,
						bidder = %leader.bidder_id,
						error = %e,
						"Could not re-acquire leader hold while restoring room"
					);
					CoordinatorError::AuctionNotFound(listing.id.clone())
				})?;
			state.holds.insert(leader.id.clone(), hold);
		}

		Ok(state)
	}

	pub fn listing_id(&self) -> &str {
		&self.listing_id
	}

	pub fn seller_id(&self) -> &str {
		&self.seller_id
	}

	pub fn ends_at(&self) -> DateTime<Utc> {
		self.ends_at
	}

	pub fn is_open(&self) -> bool {
		self.status == AuctionStatus::Open
	}

	pub fn is_ended(&self) -> bool {
		self.status == AuctionStatus::Ended
	}

	pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
		now >= self.ends_at
	}

	pub fn bids(&self) -> &[Bid] {
		&self.bids
	}

	pub fn settlement(&self) -> Option<&SettlementRecord> {
		self.settlement.as_ref()
	}

	/// Validate a bid and, if acceptable, apply it
	///
	/// Checks run in order and the first failure wins:
	/// 1. auction still open
	/// 2. positive amount
	/// 3. bidder is not the seller
	/// 4. bidder is not repeating their own leading amount
	/// 5. amount beats the current high bid
	/// 6. the ledger can hold the amount
	///
	/// On success the previous leader's hold is released (or, when the
	/// leader raises their own bid, swapped for the larger hold), the bid is
	/// journalled and becomes the new high bid. Rejections leave the room
	/// untouched.
	pub fn submit_bid(
		&mut self,
		bidder_id: &str,
		amount: u64,
		ledger: &Ledger,
		journal: &dyn AuctionJournal,
	) -> Result<Bid, RejectReason> {
		if self.is_ended() {
			return Err(RejectReason::AuctionEnded);
		}
		if amount == 0 {
			return Err(RejectReason::InvalidAmount);
		}
		if bidder_id == self.seller_id {
			return Err(RejectReason::SellerCannotBid);
		}
		if let Some(high) = &self.high_bid {
			if high.bidder_id == bidder_id && high.amount == amount {
				return Err(RejectReason::DuplicateBid);
			}
			if amount <= high.amount {
				return Err(RejectReason::BidTooLow {
					current_high: high.amount,
				});
			}
		}

		let bid_id = format!("bid_{}", uuid::Uuid::new_v4());
		let previous = self.leader_hold();
		let leader_raises = previous
			.as_ref()
			.is_some_and(|(_, _, leader)| leader == bidder_id);

		let hold = match &previous {
			Some((_, prev_hold, _)) if leader_raises => {
				ledger.replace_hold(*prev_hold, amount, &self.listing_id, &bid_id)?
			}
			_ => ledger.hold(bidder_id, amount, &self.listing_id, &bid_id)?,
		};

		let bid = Bid {
			id: bid_id,
			listing_id: self.listing_id.clone(),
			bidder_id: bidder_id.to_string(),
			amount,
			sequence: self.next_sequence,
			timestamp: Utc::now(),
		};

		if let Err(e) = journal.append_bid(&bid) {
			error!(
				target: "room",
				listing_id = %self.listing_id,
				error = %e,
				"Failed to journal accepted bid, rolling back hold"
			);
			self.roll_back_hold(hold, previous.filter(|_| leader_raises), ledger);
			return Err(RejectReason::AuctionNotFound);
		}

		if let Some((prev_bid_id, prev_hold, _)) = previous {
			self.holds.remove(&prev_bid_id);
			if !leader_raises && let Err(e) = ledger.release(prev_hold) {
				warn!(
					target: "room",
					listing_id = %self.listing_id,
					error = %e,
					"Outbid leader had no hold to release"
				);
			}
		}

		self.holds.insert(bid.id.clone(), hold);
		self.high_bid = Some(HighBid {
			bidder_id: bid.bidder_id.clone(),
			amount,
		});
		self.next_sequence += 1;
		self.bids.push(bid.clone());

		Ok(bid)
	}

	/// The current leader's bid ID, hold and bidder, if the leader has a hold
	fn leader_hold(&self) -> Option<(String, HoldId, UserId)> {
		let leader = self.bids.last()?;
		let hold = self.holds.get(&leader.id)?;
		Some((leader.id.clone(), *hold, leader.bidder_id.clone()))
	}

	/// Undo a hold taken for a bid that could not be journalled
	fn roll_back_hold(
		&mut self,
		hold: HoldId,
		replaced: Option<(String, HoldId, UserId)>,
		ledger: &Ledger,
	) {
		let restored = match replaced {
			Some((prev_bid_id, _, _)) => {
				let prev_amount = self.high_bid.as_ref().map_or(0, |h| h.amount);
				ledger
					.replace_hold(hold, prev_amount, &self.listing_id, &prev_bid_id)
					.map(|restored| {
						self.holds.insert(prev_bid_id, restored);
					})
			}
			None => ledger.release(hold).map(|_| ()),
		};

		if let Err(e) = restored {
			error!(
				target: "room",
				listing_id = %self.listing_id,
				error = %e,
				"Hold rollback failed"
			);
		}
	}

	/// Add a participant; returns false if already present
	pub fn join(&mut self, user_id: &str) -> bool {
		self.participants.insert(user_id.to_string())
	}

	/// Remove a participant; returns false if not present
	pub fn leave(&mut self, user_id: &str) -> bool {
		self.participants.remove(user_id)
	}

	/// Full snapshot for (re)joining clients
	pub fn snapshot(&self) -> RoomSnapshot {
		RoomSnapshot {
			listing_id: self.listing_id.clone(),
			seller_id: self.seller_id.clone(),
			ends_at: self.ends_at,
			status: self.status,
			bids: self.bids.clone(),
			high_bid: self.high_bid.clone(),
			participants: self.participants.iter().cloned().collect(),
			settlement: self.settlement.clone(),
		}
	}
}
