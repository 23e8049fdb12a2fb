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

use crate::types::{
	Balance, Bid, BidRejectedResponse, Listing, RegisterListingRequest, RejectReason,
	RoomSnapshot, SettlementRecord, SubmitBidRequest,
};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

/// HTTP header carrying the verified user identity
pub const HEADER_USER_ID: &str = "X-User-Id";

/// HTTP header carrying the client idempotency key for bid retries
pub const HEADER_REQUEST_ID: &str = "X-Request-Id";

/// Error types for client operations
#[derive(Debug, Error)]
pub enum ClientError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Server error: {0}")]
	Server(String),
	#[error("Bid rejected: {0}")]
	Rejected(RejectReason),
	#[error("Client setup error: {0}")]
	Setup(String),
}

/// Client for interacting with the auction gateway
///
/// Every request is made on behalf of one user. The identity is passed
/// in the `X-User-Id` header and is expected to be verified upstream.
pub struct Client {
	base_url: String,
	user_id: String,
	client: ReqwestClient,
}

impl Client {
	/// Create a new client with the given base URL
	pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> Result<Self, ClientError> {
		Self::with_config(base_url, user_id, Duration::from_secs(30))
	}

	/// Create a new client with a custom request timeout
	pub fn with_config(
		base_url: impl Into<String>,
		user_id: impl Into<String>,
		timeout: Duration,
	) -> Result<Self, ClientError> {
		let client = ReqwestClient::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| ClientError::Setup(format!("Failed to create HTTP client: {}", e)))?;

		Ok(Self {
			base_url: base_url.into().trim_end_matches('/').to_string(),
			user_id: user_id.into(),
			client,
		})
	}

	fn auction_url(&self, listing_id: &str, suffix: &str) -> String {
		format!("{}/api/v1/auctions/{}{}", self.base_url, listing_id, suffix)
	}

	fn post(&self, url: &str) -> RequestBuilder {
		self.client.post(url).header(HEADER_USER_ID, &self.user_id)
	}

	fn get(&self, url: &str) -> RequestBuilder {
		self.client.get(url).header(HEADER_USER_ID, &self.user_id)
	}

	async fn send(request: RequestBuilder) -> Result<Response, ClientError> {
		request
			.send()
			.await
			.map_err(|e| ClientError::Network(format!("Request failed: {}", e)))
	}

	async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
		if !response.status().is_success() {
			let status = response.status();
			let error_text = response
				.text()
				.await
				.unwrap_or_else(|_| format!("HTTP {}", status));
			return Err(ClientError::Server(format!("{}: {}", status, error_text)));
		}

		response
			.json()
			.await
			.map_err(|e| ClientError::Serialization(format!("Failed to parse response: {}", e)))
	}

	/// Register a listing; the calling user becomes its seller
	pub async fn register_listing(
		&self,
		request: &RegisterListingRequest,
	) -> Result<Listing, ClientError> {
		let url = format!("{}/api/v1/listings", self.base_url);
		let response = Self::send(self.post(&url).json(request)).await?;
		Self::parse(response).await
	}

	/// Join an auction room and receive its current snapshot
	pub async fn join(&self, listing_id: &str) -> Result<RoomSnapshot, ClientError> {
		let response = Self::send(self.post(&self.auction_url(listing_id, "/join"))).await?;
		Self::parse(response).await
	}

	/// Leave an auction room
	pub async fn leave(&self, listing_id: &str) -> Result<(), ClientError> {
		let response = Self::send(self.post(&self.auction_url(listing_id, "/leave"))).await?;
		let _: serde_json::Value = Self::parse(response).await?;
		Ok(())
	}

	/// Fetch the current room snapshot without joining
	pub async fn snapshot(&self, listing_id: &str) -> Result<RoomSnapshot, ClientError> {
		let response = Self::send(self.get(&self.auction_url(listing_id, ""))).await?;
		Self::parse(response).await
	}

	/// Submit a bid
	///
	/// `request_id` makes the submission safe to retry: the gateway returns
	/// the first outcome for a repeated ID instead of bidding twice.
	pub async fn submit_bid(
		&self,
		listing_id: &str,
		amount: u64,
		request_id: Option<&str>,
	) -> Result<Bid, ClientError> {
		let mut request = self
			.post(&self.auction_url(listing_id, "/bids"))
			.json(&SubmitBidRequest::new(amount));
		if let Some(request_id) = request_id {
			request = request.header(HEADER_REQUEST_ID, request_id);
		}

		let response = Self::send(request).await?;
		if response.status().is_client_error() {
			let status = response.status();
			let text = response
				.text()
				.await
				.unwrap_or_else(|_| format!("HTTP {}", status));
			return match serde_json::from_str::<BidRejectedResponse>(&text) {
				Ok(body) => Err(ClientError::Rejected(body.reason)),
				Err(_) => Err(ClientError::Server(format!("{}: {}", status, text))),
			};
		}

		Self::parse(response).await
	}

	/// Ask the server to end the auction (seller only)
	///
	/// The result is always computed by the server from its own bid history.
	pub async fn request_end(&self, listing_id: &str) -> Result<SettlementRecord, ClientError> {
		let response = Self::send(self.post(&self.auction_url(listing_id, "/end"))).await?;
		Self::parse(response).await
	}

	/// Broadcast a typing indicator to the other members of the room
	pub async fn typing(&self, listing_id: &str) -> Result<(), ClientError> {
		let response = Self::send(self.post(&self.auction_url(listing_id, "/typing"))).await?;
		let _: serde_json::Value = Self::parse(response).await?;
		Ok(())
	}

	/// Clear the typing indicator
	pub async fn stop_typing(&self, listing_id: &str) -> Result<(), ClientError> {
		let response =
			Self::send(self.post(&self.auction_url(listing_id, "/stop-typing"))).await?;
		let _: serde_json::Value = Self::parse(response).await?;
		Ok(())
	}

	/// Get the caller's credit balance
	pub async fn credits(&self) -> Result<Balance, ClientError> {
		let url = format!("{}/api/v1/credits", self.base_url);
		let response = Self::send(self.get(&url)).await?;
		Self::parse(response).await
	}

	/// Check gateway health
	pub async fn health_check(&self) -> Result<bool, ClientError> {
		let url = format!("{}/health", self.base_url);
		let response = Self::send(self.client.get(&url)).await?;
		Ok(response.status().is_success())
	}
}

/// Synchronous client wrapper (for compatibility)
///
/// This wraps the async client and runs it in a tokio runtime.
/// For new code, prefer using the async Client directly.
pub struct SyncClient {
	client: Client,
	runtime: tokio::runtime::Runtime,
}

impl SyncClient {
	/// Create a new synchronous client
	pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> anyhow::Result<Self> {
		let runtime = tokio::runtime::Runtime::new()
			.map_err(|e| anyhow::anyhow!("Failed to create tokio runtime: {}", e))?;
		Ok(Self {
			client: Client::new(base_url, user_id)?,
			runtime,
		})
	}

	/// Join an auction room (synchronous)
	pub fn join(&self, listing_id: &str) -> Result<RoomSnapshot, ClientError> {
		self.runtime.block_on(self.client.join(listing_id))
	}

	/// Submit a bid (synchronous)
	pub fn submit_bid(&self, listing_id: &str, amount: u64) -> Result<Bid, ClientError> {
		self.runtime
			.block_on(self.client.submit_bid(listing_id, amount, None))
	}

	/// Ask the server to end the auction (synchronous)
	pub fn request_end(&self, listing_id: &str) -> Result<SettlementRecord, ClientError> {
		self.runtime.block_on(self.client.request_end(listing_id))
	}
}
