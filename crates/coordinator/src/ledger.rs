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

//! Credit Ledger
//!
//! The ledger is the only component allowed to mutate user balances.
//! Each account tracks `total` credits and the `held` part reserved by
//! outstanding holds; `available = total - held` is what a new hold can
//! draw from.
//!
//! # Locking
//!
//! Every operation on one user's balance runs under that user's mutex, so a
//! user bidding in two rooms at once is checked against one consistent
//! balance. No operation ever holds two account locks at the same time.

use std::{
	fmt,
	sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use dashmap::DashMap;
use gavel_sdk::types::{Balance, ListingId, RejectReason, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Error types for ledger operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
	#[error("Insufficient credits: requested {requested}, available {available}")]
	InsufficientCredits { requested: u64, available: u64 },
	#[error("Hold not found: {0}")]
	HoldNotFound(HoldId),
}

impl From<LedgerError> for RejectReason {
	fn from(err: LedgerError) -> Self {
		match err {
			LedgerError::InsufficientCredits {
				requested,
				available,
			} => RejectReason::InsufficientCredits {
				requested,
				available,
			},
			// A hold the room believes it owns is gone; the room refuses the bid
			// rather than guessing.
			LedgerError::HoldNotFound(_) => RejectReason::AuctionNotFound,
		}
	}
}

/// Identifier of a credit hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HoldId(Uuid);

impl HoldId {
	fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl fmt::Display for HoldId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "hold_{}", self.0)
	}
}

/// A provisional reservation of credits tied to one bid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hold {
	pub id: HoldId,
	pub user_id: UserId,
	pub listing_id: ListingId,
	pub bid_id: String,
	pub amount: u64,
}

#[derive(Debug, Default)]
struct Account {
	total: u64,
	held: u64,
}

impl Account {
	fn available(&self) -> u64 {
		self.total.saturating_sub(self.held)
	}

	fn balance(&self) -> Balance {
		Balance {
			total: self.total,
			held: self.held,
			available: self.available(),
		}
	}
}

/// Authoritative per-user credit ledger
pub struct Ledger {
	accounts: DashMap<UserId, Arc<Mutex<Account>>>,
	holds: DashMap<HoldId, Hold>,
	starting_credits: u64,
}

impl Ledger {
	/// Create a ledger that opens new accounts with `starting_credits`
	pub fn new(starting_credits: u64) -> Self {
		Self {
			accounts: DashMap::new(),
			holds: DashMap::new(),
			starting_credits,
		}
	}

	/// Get a user's account, if one was opened
	///
	/// The account is cloned out of the map so the shard lock is released
	/// before the per-user lock is taken.
	fn account(&self, user_id: &str) -> Option<Arc<Mutex<Account>>> {
		self.accounts.get(user_id).map(|entry| entry.value().clone())
	}

	fn account_or_open(&self, user_id: &str) -> Arc<Mutex<Account>> {
		if let Some(account) = self.account(user_id) {
			return account;
		}
		self.accounts
			.entry(user_id.to_string())
			.or_insert_with(|| {
				info!(
					target: "ledger",
					user_id = %user_id,
					credits = self.starting_credits,
					"Account opened"
				);
				Arc::new(Mutex::new(Account {
					total: self.starting_credits,
					held: 0,
				}))
			})
			.value()
			.clone()
	}

	/// Open an account with the starting credits if the user has none yet
	pub fn ensure_account(&self, user_id: &str) -> Balance {
		let account = self.account_or_open(user_id);
		let guard = lock(&account);
		guard.balance()
	}

	/// Add credits to a user's account, opening it if needed
	pub fn deposit(&self, user_id: &str, amount: u64) -> Balance {
		let account = self.account_or_open(user_id);
		let mut guard = lock(&account);
		guard.total = guard.total.saturating_add(amount);
		guard.balance()
	}

	/// Current balance; users without an account read as zero
	pub fn balance(&self, user_id: &str) -> Balance {
		match self.account(user_id) {
			Some(account) => lock(&account).balance(),
			None => Balance::default(),
		}
	}

	/// Reserve `amount` credits for a bid
	///
	/// Fails with `InsufficientCredits` and no side effects when the user's
	/// available balance is below `amount`.
	pub fn hold(
		&self,
		user_id: &str,
		amount: u64,
		listing_id: &str,
		bid_id: &str,
	) -> Result<HoldId, LedgerError> {
		let Some(account) = self.account(user_id) else {
			return Err(LedgerError::InsufficientCredits {
				requested: amount,
				available: 0,
			});
		};

		let mut guard = lock(&account);
		let available = guard.available();
		if amount > available {
			return Err(LedgerError::InsufficientCredits {
				requested: amount,
				available,
			});
		}

		guard.held += amount;
		let id = HoldId::new();
		self.holds.insert(
			id,
			Hold {
				id,
				user_id: user_id.to_string(),
				listing_id: listing_id.to_string(),
				bid_id: bid_id.to_string(),
				amount,
			},
		);

		debug!(
			target: "ledger",
			user_id = %user_id,
			listing_id = %listing_id,
			amount,
			hold_id = %id,
			"Credits held"
		);
		Ok(id)
	}

	/// Swap a user's existing hold for a new one in a single step
	///
	/// The credits of `old` count as available for the new hold. On failure
	/// the old hold stays in place untouched.
	pub fn replace_hold(
		&self,
		old: HoldId,
		amount: u64,
		listing_id: &str,
		bid_id: &str,
	) -> Result<HoldId, LedgerError> {
		let user_id = self
			.holds
			.get(&old)
			.map(|hold| hold.user_id.clone())
			.ok_or(LedgerError::HoldNotFound(old))?;
		let account = self.account(&user_id).ok_or(LedgerError::HoldNotFound(old))?;

		let mut guard = lock(&account);
		let old_amount = self
			.holds
			.get(&old)
			.map(|hold| hold.amount)
			.ok_or(LedgerError::HoldNotFound(old))?;

		let available = guard.available().saturating_add(old_amount);
		if amount > available {
			return Err(LedgerError::InsufficientCredits {
				requested: amount,
				available,
			});
		}

		self.holds.remove(&old);
		guard.held = guard.held.saturating_sub(old_amount) + amount;
		let id = HoldId::new();
		self.holds.insert(
			id,
			Hold {
				id,
				user_id: user_id.clone(),
				listing_id: listing_id.to_string(),
				bid_id: bid_id.to_string(),
				amount,
			},
		);

		debug!(
			target: "ledger",
			user_id = %user_id,
			listing_id = %listing_id,
			old_amount,
			amount,
			hold_id = %id,
			"Hold replaced"
		);
		Ok(id)
	}

	/// Return a hold's credits to the user's available balance
	pub fn release(&self, hold_id: HoldId) -> Result<Hold, LedgerError> {
		let (_, hold) = self
			.holds
			.remove(&hold_id)
			.ok_or(LedgerError::HoldNotFound(hold_id))?;

		match self.account(&hold.user_id) {
			Some(account) => {
				let mut guard = lock(&account);
				guard.held = guard.held.saturating_sub(hold.amount);
			}
			None => warn!(
				target: "ledger",
				user_id = %hold.user_id,
				hold_id = %hold_id,
				"Released hold for unknown account"
			),
		}

		debug!(
			target: "ledger",
			user_id = %hold.user_id,
			listing_id = %hold.listing_id,
			amount = hold.amount,
			hold_id = %hold_id,
			"Hold released"
		);
		Ok(hold)
	}

	/// Turn a hold into a permanent debit and credit the seller
	///
	/// The bidder's lock is released before the seller's lock is taken.
	pub fn finalize_to_seller(&self, hold_id: HoldId, seller_id: &str) -> Result<Hold, LedgerError> {
		let (_, hold) = self
			.holds
			.remove(&hold_id)
			.ok_or(LedgerError::HoldNotFound(hold_id))?;

		if let Some(account) = self.account(&hold.user_id) {
			let mut guard = lock(&account);
			guard.held = guard.held.saturating_sub(hold.amount);
			guard.total = guard.total.saturating_sub(hold.amount);
		}

		let seller = self.account_or_open(seller_id);
		{
			let mut guard = lock(&seller);
			guard.total = guard.total.saturating_add(hold.amount);
		}

		info!(
			target: "ledger",
			bidder = %hold.user_id,
			seller = %seller_id,
			listing_id = %hold.listing_id,
			amount = hold.amount,
			"Hold finalized to seller"
		);
		Ok(hold)
	}

	/// Release every outstanding hold on a listing except `keep`
	pub fn release_all(&self, listing_id: &str, keep: Option<HoldId>) -> Vec<Hold> {
		let ids: Vec<HoldId> = self
			.holds
			.iter()
			.filter(|entry| entry.listing_id == listing_id && Some(*entry.key()) != keep)
			.map(|entry| *entry.key())
			.collect();

		ids.into_iter()
			.filter_map(|id| self.release(id).ok())
			.collect()
	}

	/// Outstanding holds of a user
	pub fn holds_of(&self, user_id: &str) -> Vec<Hold> {
		self.holds
			.iter()
			.filter(|entry| entry.user_id == user_id)
			.map(|entry| entry.value().clone())
			.collect()
	}

	/// Outstanding holds on a listing
	pub fn holds_on(&self, listing_id: &str) -> Vec<Hold> {
		self.holds
			.iter()
			.filter(|entry| entry.listing_id == listing_id)
			.map(|entry| entry.value().clone())
			.collect()
	}
}

fn lock(account: &Mutex<Account>) -> MutexGuard<'_, Account> {
	account.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ledger_with(user: &str, credits: u64) -> Ledger {
		let ledger = Ledger::new(0);
		ledger.deposit(user, credits);
		ledger
	}

	#[test]
	fn test_ensure_account_is_idempotent() {
		let ledger = Ledger::new(1_000);
		assert_eq!(ledger.ensure_account("alice").total, 1_000);

		ledger.deposit("alice", 50);
		assert_eq!(ledger.ensure_account("alice").total, 1_050);
	}

	#[test]
	fn test_unknown_user_reads_zero() {
		let ledger = Ledger::new(1_000);
		assert_eq!(ledger.balance("nobody"), Balance::default());
	}

	#[test]
	fn test_hold_reduces_available() {
		let ledger = ledger_with("alice", 100);
		ledger.hold("alice", 40, "listing_1", "bid_1").unwrap();

		let balance = ledger.balance("alice");
		assert_eq!(balance.total, 100);
		assert_eq!(balance.held, 40);
		assert_eq!(balance.available, 60);
	}

	#[test]
	fn test_hold_insufficient_has_no_side_effects() {
		let ledger = ledger_with("alice", 100);
		let err = ledger.hold("alice", 150, "listing_1", "bid_1").unwrap_err();

		assert_eq!(
			err,
			LedgerError::InsufficientCredits {
				requested: 150,
				available: 100
			}
		);
		assert_eq!(ledger.balance("alice").available, 100);
		assert!(ledger.holds_of("alice").is_empty());
	}

	#[test]
	fn test_hold_without_account_fails() {
		let ledger = Ledger::new(1_000);
		assert!(matches!(
			ledger.hold("ghost", 1, "listing_1", "bid_1"),
			Err(LedgerError::InsufficientCredits { available: 0, .. })
		));
	}

	#[test]
	fn test_holds_across_listings_share_one_balance() {
		let ledger = ledger_with("alice", 100);
		ledger.hold("alice", 70, "listing_1", "bid_1").unwrap();

		let err = ledger.hold("alice", 40, "listing_2", "bid_2").unwrap_err();
		assert!(matches!(
			err,
			LedgerError::InsufficientCredits { available: 30, .. }
		));
	}

	#[test]
	fn test_release_restores_available() {
		let ledger = ledger_with("alice", 100);
		let hold = ledger.hold("alice", 60, "listing_1", "bid_1").unwrap();

		let released = ledger.release(hold).unwrap();
		assert_eq!(released.amount, 60);
		assert_eq!(ledger.balance("alice").available, 100);

		assert_eq!(ledger.release(hold), Err(LedgerError::HoldNotFound(hold)));
	}

	#[test]
	fn test_replace_hold_counts_old_amount() {
		let ledger = ledger_with("alice", 100);
		let first = ledger.hold("alice", 60, "listing_1", "bid_1").unwrap();

		let second = ledger.replace_hold(first, 90, "listing_1", "bid_2").unwrap();
		let balance = ledger.balance("alice");
		assert_eq!(balance.held, 90);
		assert_eq!(balance.available, 10);
		assert_eq!(ledger.holds_of("alice").len(), 1);
		assert_eq!(ledger.holds_of("alice")[0].id, second);
	}

	#[test]
	fn test_replace_hold_failure_keeps_old_hold() {
		let ledger = ledger_with("alice", 100);
		let first = ledger.hold("alice", 60, "listing_1", "bid_1").unwrap();

		let err = ledger
			.replace_hold(first, 120, "listing_1", "bid_2")
			.unwrap_err();
		assert!(matches!(
			err,
			LedgerError::InsufficientCredits { available: 100, .. }
		));
		assert_eq!(ledger.balance("alice").held, 60);
		assert_eq!(ledger.holds_of("alice")[0].id, first);
	}

	#[test]
	fn test_finalize_moves_credits_to_seller() {
		let ledger = ledger_with("bob", 100);
		ledger.deposit("seller", 0);
		let hold = ledger.hold("bob", 80, "listing_1", "bid_1").unwrap();

		ledger.finalize_to_seller(hold, "seller").unwrap();

		assert_eq!(
			ledger.balance("bob"),
			Balance {
				total: 20,
				held: 0,
				available: 20
			}
		);
		assert_eq!(ledger.balance("seller").total, 80);
		assert!(ledger.finalize_to_seller(hold, "seller").is_err());
	}

	#[test]
	fn test_release_all_keeps_winner() {
		let ledger = ledger_with("alice", 100);
		ledger.deposit("bob", 100);
		let a = ledger.hold("alice", 50, "listing_1", "bid_1").unwrap();
		let b = ledger.hold("bob", 80, "listing_1", "bid_2").unwrap();
		ledger.hold("bob", 10, "listing_2", "bid_3").unwrap();

		let released = ledger.release_all("listing_1", Some(b));
		assert_eq!(released.len(), 1);
		assert_eq!(released[0].id, a);
		assert_eq!(ledger.holds_on("listing_1").len(), 1);
		assert_eq!(ledger.holds_on("listing_2").len(), 1);
	}

	#[test]
	fn test_concurrent_holds_never_exceed_balance() {
		let ledger = Arc::new(ledger_with("alice", 1_000));
		let handles: Vec<_> = (0..16)
			.map(|i| {
				let ledger = ledger.clone();
				std::thread::spawn(move || {
					let listing = format!("listing_{}", i % 4);
					(0..50)
						.filter(|j| {
							ledger
								.hold("alice", 7, &listing, &format!("bid_{}_{}", i, j))
								.is_ok()
						})
						.count()
				})
			})
			.collect();

		let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
		let balance = ledger.balance("alice");
		assert_eq!(accepted as u64 * 7, balance.held);
		assert!(balance.held <= balance.total);
		assert_eq!(accepted, 1_000 / 7);
	}
}
