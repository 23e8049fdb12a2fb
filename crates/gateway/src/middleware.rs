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

use std::future::{Ready, ready};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use actix_web::{
	Error, HttpResponse,
	body::EitherBody,
	dev::{Service, ServiceRequest, ServiceResponse, Transform},
	http::{
		Method,
		header::{self, HeaderMap, HeaderValue},
	},
};
use tracing::{error, info};

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, X-User-Id, X-Request-Id";

/// CORS middleware for actix-web
///
/// Answers preflight requests directly and decorates every other response.
pub struct CorsMiddleware {
	allowed_origin: HeaderValue,
}

impl CorsMiddleware {
	/// Falls back to `*` if the configured origin is not a valid header value
	pub fn new(allowed_origin: &str) -> Self {
		Self {
			allowed_origin: HeaderValue::from_str(allowed_origin)
				.unwrap_or_else(|_| HeaderValue::from_static("*")),
		}
	}
}

impl<S, B> Transform<S, ServiceRequest> for CorsMiddleware
where
	S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
	S::Future: 'static,
	B: 'static,
{
	type Response = ServiceResponse<EitherBody<B>>;
	type Error = Error;
	type InitError = ();
	type Transform = CorsMiddlewareInner<S>;
	type Future = Ready<Result<Self::Transform, Self::InitError>>;

	fn new_transform(&self, service: S) -> Self::Future {
		ready(Ok(CorsMiddlewareInner {
			service: Rc::new(service),
			allowed_origin: self.allowed_origin.clone(),
		}))
	}
}

pub struct CorsMiddlewareInner<S> {
	service: Rc<S>,
	allowed_origin: HeaderValue,
}

fn apply_cors_headers(headers: &mut HeaderMap, allowed_origin: &HeaderValue) {
	headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allowed_origin.clone());
	headers.insert(
		header::ACCESS_CONTROL_ALLOW_METHODS,
		HeaderValue::from_static(ALLOWED_METHODS),
	);
	headers.insert(
		header::ACCESS_CONTROL_ALLOW_HEADERS,
		HeaderValue::from_static(ALLOWED_HEADERS),
	);
}

impl<S, B> Service<ServiceRequest> for CorsMiddlewareInner<S>
where
	S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
	S::Future: 'static,
	B: 'static,
{
	type Response = ServiceResponse<EitherBody<B>>;
	type Error = Error;
	type Future = Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>>>>;

	fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		self.service.poll_ready(cx)
	}

	fn call(&self, req: ServiceRequest) -> Self::Future {
		let allowed_origin = self.allowed_origin.clone();

		if req.method() == Method::OPTIONS {
			let mut res = req
				.into_response(HttpResponse::NoContent().finish())
				.map_into_right_body();
			apply_cors_headers(res.headers_mut(), &allowed_origin);
			return Box::pin(async move { Ok(res) });
		}

		let service = self.service.clone();
		Box::pin(async move {
			let mut res = service.call(req).await?.map_into_left_body();
			apply_cors_headers(res.headers_mut(), &allowed_origin);
			Ok(res)
		})
	}
}

/// Logging middleware for actix-web
pub struct LoggingMiddleware;

impl<S, B> Transform<S, ServiceRequest> for LoggingMiddleware
where
	S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
	S::Future: 'static,
	B: 'static,
{
	type Response = ServiceResponse<B>;
	type Error = Error;
	type InitError = ();
	type Transform = LoggingMiddlewareInner<S>;
	type Future = Ready<Result<Self::Transform, Self::InitError>>;

	fn new_transform(&self, service: S) -> Self::Future {
		ready(Ok(LoggingMiddlewareInner {
			service: Rc::new(service),
		}))
	}
}

pub struct LoggingMiddlewareInner<S> {
	service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for LoggingMiddlewareInner<S>
where
	S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
	S::Future: 'static,
	B: 'static,
{
	type Response = ServiceResponse<B>;
	type Error = Error;
	type Future = Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>>>>;

	fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		self.service.poll_ready(cx)
	}

	fn call(&self, req: ServiceRequest) -> Self::Future {
		let service = self.service.clone();
		let method = req.method().clone();
		let path = req.path().to_string();

		Box::pin(async move {
			let start = std::time::Instant::now();
			let res = service.call(req).await;
			let duration = start.elapsed();

			// Event streams complete here once headers are sent
			match &res {
				Ok(response) => {
					info!(
						target: "server",
						method = %method,
						path = %path,
						status = response.status().as_u16(),
						duration_ms = duration.as_millis(),
						"Request completed"
					);
				}
				Err(e) => {
					error!(
						target: "server",
						method = %method,
						path = %path,
						error = %e,
						duration_ms = duration.as_millis(),
						"Request failed"
					);
				}
			}

			res
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use actix_web::{App, test, web};

	#[actix_web::test]
	async fn test_preflight_answered_with_configured_origin() {
		let app = test::init_service(
			App::new()
				.wrap(CorsMiddleware::new("https://bids.example"))
				.route("/ping", web::post().to(|| async { HttpResponse::Ok().finish() })),
		)
		.await;

		let resp = test::call_service(
			&app,
			test::TestRequest::default()
				.method(Method::OPTIONS)
				.uri("/ping")
				.to_request(),
		)
		.await;
		assert_eq!(resp.status(), actix_web::http::StatusCode::NO_CONTENT);
		assert_eq!(
			resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
			Some(&HeaderValue::from_static("https://bids.example"))
		);

		let resp = test::call_service(
			&app,
			test::TestRequest::post().uri("/ping").to_request(),
		)
		.await;
		assert!(resp.status().is_success());
		let allowed = resp
			.headers()
			.get(header::ACCESS_CONTROL_ALLOW_HEADERS)
			.and_then(|v| v.to_str().ok())
			.unwrap_or_default();
		assert!(allowed.contains("X-Request-Id"));
	}
}
