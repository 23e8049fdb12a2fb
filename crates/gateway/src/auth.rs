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

//! Caller identity for Gateway
//!
//! Session verification happens upstream (reverse proxy, session service).
//! By the time a request reaches the gateway, the verified user ID travels
//! in request metadata and the gateway only extracts it.
//!
//! # Identity Location (Protocol Requirement)
//!
//! **Identity MUST be in request metadata, NOT in the business payload.**
//!
//! - **HTTP**: user ID in the `X-User-Id` header
//!
//! Request bodies (bids, listing registration) never carry the caller's
//! identity. A seller is whoever registered the listing, a bidder is whoever
//! sent the bid; neither can be claimed in the body.

use actix_web::http::header::HeaderMap;
use gavel_sdk::{client::HEADER_USER_ID, types::UserId};
use thiserror::Error;

/// Longest accepted user ID
pub const MAX_USER_ID_LEN: usize = 128;

/// Error types for identity extraction
#[derive(Debug, Error)]
pub enum AuthError {
	#[error("Missing X-User-Id header")]
	MissingIdentity,
	#[error("Invalid user ID: {0}")]
	InvalidIdentity(String),
}

/// Identity context - protocol-agnostic container for identity material
///
/// Gateway adapters construct this from their protocol-specific sources and
/// hand it to an `IdentityProvider`.
pub struct AuthContext<'a> {
	/// HTTP headers (for HTTP/HTTPS requests)
	pub http_headers: Option<&'a HeaderMap>,
}

impl<'a> AuthContext<'a> {
	pub fn from_http(headers: &'a HeaderMap) -> Self {
		Self {
			http_headers: Some(headers),
		}
	}
}

/// Identity provider trait
///
/// Lets a deployment plug in its own trust model (e.g. a signed session
/// token) without touching the handlers.
pub trait IdentityProvider: Send + Sync {
	/// Extract the verified user ID from request metadata
	fn extract_user_id(&self, ctx: &AuthContext) -> Result<UserId, AuthError>;
}

/// Default provider: trusts the `X-User-Id` header set by the upstream proxy
pub struct HeaderIdentityProvider;

impl IdentityProvider for HeaderIdentityProvider {
	fn extract_user_id(&self, ctx: &AuthContext) -> Result<UserId, AuthError> {
		let value = ctx
			.http_headers
			.and_then(|headers| headers.get(HEADER_USER_ID))
			.ok_or(AuthError::MissingIdentity)?;

		let user_id = value
			.to_str()
			.map_err(|_| AuthError::InvalidIdentity("not valid ASCII".to_string()))?
			.trim();

		validate_user_id(user_id)?;
		Ok(user_id.to_string())
	}
}

fn validate_user_id(user_id: &str) -> Result<(), AuthError> {
	if user_id.is_empty() {
		return Err(AuthError::MissingIdentity);
	}
	if user_id.len() > MAX_USER_ID_LEN {
		return Err(AuthError::InvalidIdentity(format!(
			"longer than {} bytes",
			MAX_USER_ID_LEN
		)));
	}
	if user_id.chars().any(|c| c.is_control() || c.is_whitespace()) {
		return Err(AuthError::InvalidIdentity(
			"contains whitespace or control characters".to_string(),
		));
	}
	Ok(())
}

/// Authenticate a request using the given provider
pub fn authenticate(
	headers: &HeaderMap,
	provider: &dyn IdentityProvider,
) -> Result<UserId, AuthError> {
	provider.extract_user_id(&AuthContext::from_http(headers))
}

#[cfg(test)]
mod tests {
	use super::*;
	use actix_web::http::header::{HeaderName, HeaderValue};

	fn headers_with(user_id: &str) -> HeaderMap {
		let mut headers = HeaderMap::new();
		headers.insert(
			HeaderName::from_static("x-user-id"),
			HeaderValue::from_str(user_id).unwrap(),
		);
		headers
	}

	#[test]
	fn test_extracts_user_id() {
		let headers = headers_with(" alice ");
		let user = authenticate(&headers, &HeaderIdentityProvider).unwrap();
		assert_eq!(user, "alice");
	}

	#[test]
	fn test_missing_header_rejected() {
		let headers = HeaderMap::new();
		assert!(matches!(
			authenticate(&headers, &HeaderIdentityProvider),
			Err(AuthError::MissingIdentity)
		));
		assert!(matches!(
			authenticate(&headers_with(""), &HeaderIdentityProvider),
			Err(AuthError::MissingIdentity)
		));
	}

	#[test]
	fn test_malformed_user_id_rejected() {
		let long = "u".repeat(MAX_USER_ID_LEN + 1);
		for bad in ["ali ce", long.as_str()] {
			assert!(matches!(
				authenticate(&headers_with(bad), &HeaderIdentityProvider),
				Err(AuthError::InvalidIdentity(_))
			));
		}
	}
}
