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

use gavel_sdk::types::ListingId;
use thiserror::Error;

/// Error types for coordinator operations other than bid submission
///
/// Bid submissions report their outcome as a `RejectReason`; everything
/// else (joining, ending, snapshots) uses this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
	/// Unknown listing, or the room went away (e.g. evicted). Callers rejoin.
	#[error("Auction not found: {0}")]
	AuctionNotFound(ListingId),
	#[error("Only the seller can end auction {0}")]
	NotSeller(ListingId),
	#[error("Auction {0} is overloaded")]
	Overloaded(ListingId),
	#[error("Auction {0} did not respond in time")]
	TimedOut(ListingId),
}
