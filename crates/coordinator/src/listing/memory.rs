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

use dashmap::DashMap;
use gavel_sdk::types::{AuctionStatus, Listing};
use tracing::info;

use super::ListingDirectory;

/// In-memory listing store
pub struct MemoryListingDirectory {
	listings: DashMap<String, Listing>,
}

impl MemoryListingDirectory {
	pub fn new() -> Self {
		Self {
			listings: DashMap::new(),
		}
	}

	/// Add or replace a listing
	pub fn register(&self, listing: Listing) {
		info!(
			target: "listing",
			listing_id = %listing.id,
			seller = %listing.seller_id,
			ends_at = %listing.ends_at,
			"Listing registered"
		);
		self.listings.insert(listing.id.clone(), listing);
	}
}

impl Default for MemoryListingDirectory {
	fn default() -> Self {
		Self::new()
	}
}

impl ListingDirectory for MemoryListingDirectory {
	fn listing(&self, listing_id: &str) -> Option<Listing> {
		self.listings.get(listing_id).map(|l| l.clone())
	}

	fn mark_ended(&self, listing_id: &str) -> bool {
		match self.listings.get_mut(listing_id) {
			Some(mut listing) if listing.status == AuctionStatus::Open => {
				listing.status = AuctionStatus::Ended;
				true
			}
			_ => false,
		}
	}
}
