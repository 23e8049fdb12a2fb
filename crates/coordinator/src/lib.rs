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

//! Gavel Bidding Coordinator
//!
//! This crate serializes bids per auction room, reserves bidder credits
//! while they lead, and settles each auction exactly once when the seller
//! ends it or its deadline passes.
//!
//! Architecture:
//! - One actor task per active room; all bid decisions happen inside it
//! - Bounded MPSC queue per room with fast `Overloaded` rejection
//! - Broadcast channel per room for accepted bids, results and presence
//! - Per-user locking in the credit ledger, shared by all rooms
//! - Auction Journal for rebuilding rooms and for idempotent settlement

pub mod arbitrator;
pub mod config;
pub mod error;
pub mod journal;
pub mod ledger;
pub mod listing;
pub mod presence;
pub mod registry;
pub mod room;
pub mod service;
pub mod settlement;

pub use arbitrator::{BidArbitrator, parse_amount, validate_amount};
pub use config::CoordinatorConfig;
pub use error::CoordinatorError;
pub use journal::{AuctionJournal, JournalError, MemoryAuctionJournal};
pub use ledger::{Hold, HoldId, Ledger, LedgerError};
pub use listing::{ListingDirectory, MemoryListingDirectory};
pub use presence::PresenceChannel;
pub use registry::AuctionRegistry;
pub use room::{Room, RoomError, RoomHandle, RoomState};
pub use service::AuctionCoordinator;
pub use settlement::{SettleOutcome, SettlementEngine};
