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

use gavel_sdk::types::Listing;

pub use memory::MemoryListingDirectory;

/// Read access to the listing store
///
/// Listings are created and edited elsewhere. The coordinator reads the
/// seller and the closing deadline, and writes the terminal status once
/// per listing when the auction settles.
pub trait ListingDirectory: Send + Sync {
	/// Look up a listing
	fn listing(&self, listing_id: &str) -> Option<Listing>;

	/// Mark a listing as ended
	///
	/// Returns `true` if this call performed the transition, `false` if the
	/// listing was already ended or is unknown.
	fn mark_ended(&self, listing_id: &str) -> bool;
}
