//! Caller identity extraction.
//!
//! The gateway in front of this service verifies user tokens and forwards the
//! verified identity as headers. Service-to-service routes are instead gated
//! by the shared internal key.

use crate::server::AppState;
use axum::{extract::FromRequestParts, http::request::Parts};
use courier_types::APIError;
use std::str::FromStr;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const RESTAURANT_ID_HEADER: &str = "x-restaurant-id";
pub const INTERNAL_KEY_HEADER: &str = "x-internal-key";

/// Role carried by an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	Customer,
	Seller,
	Rider,
}

impl FromStr for Role {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"customer" => Ok(Role::Customer),
			"seller" => Ok(Role::Seller),
			"rider" => Ok(Role::Rider),
			other => Err(format!("unknown role '{}'", other)),
		}
	}
}

/// Pre-verified caller identity.
#[derive(Debug, Clone)]
pub struct Identity {
	pub user_id: String,
	pub role: Role,
	pub restaurant_id: Option<String>,
}

impl Identity {
	/// Fails with 403 unless the caller has `role`.
	pub fn require(&self, role: Role) -> Result<(), APIError> {
		if self.role == role {
			Ok(())
		} else {
			Err(APIError::Forbidden {
				error_type: "FORBIDDEN".into(),
				message: format!("this action requires the {:?} role", role).to_lowercase(),
			})
		}
	}
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
	parts
		.headers
		.get(name)
		.and_then(|value| value.to_str().ok())
		.map(str::trim)
		.filter(|value| !value.is_empty())
}

fn unauthorized(message: &str) -> APIError {
	APIError::Unauthorized {
		error_type: "UNAUTHORIZED".into(),
		message: message.to_string(),
	}
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
	type Rejection = APIError;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let user_id = header(parts, USER_ID_HEADER).ok_or_else(|| unauthorized("please login"))?;
		let role = header(parts, USER_ROLE_HEADER)
			.ok_or_else(|| unauthorized("caller role is missing"))?
			.parse::<Role>()
			.map_err(|e| unauthorized(&e))?;

		Ok(Identity {
			user_id: user_id.to_string(),
			role,
			restaurant_id: header(parts, RESTAURANT_ID_HEADER).map(str::to_string),
		})
	}
}

/// Marker for requests that presented the shared internal key.
#[derive(Debug, Clone, Copy)]
pub struct InternalCaller;

impl FromRequestParts<AppState> for InternalCaller {
	type Rejection = APIError;

	async fn from_request_parts(
		parts: &mut Parts,
		state: &AppState,
	) -> Result<Self, Self::Rejection> {
		let presented = header(parts, INTERNAL_KEY_HEADER).unwrap_or_default();
		if state.config.service.internal_key.matches(presented) {
			Ok(InternalCaller)
		} else {
			Err(APIError::Forbidden {
				error_type: "FORBIDDEN".into(),
				message: "forbidden".into(),
			})
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::http::Request;

	async fn identity_of(request: Request<()>) -> Result<Identity, APIError> {
		let (mut parts, _) = request.into_parts();
		Identity::from_request_parts(&mut parts, &()).await
	}

	#[tokio::test]
	async fn test_identity_from_headers() {
		let request = Request::builder()
			.header(USER_ID_HEADER, "seller-1")
			.header(USER_ROLE_HEADER, "seller")
			.header(RESTAURANT_ID_HEADER, "r-1")
			.body(())
			.unwrap();

		let identity = identity_of(request).await.unwrap();
		assert_eq!(identity.user_id, "seller-1");
		assert_eq!(identity.role, Role::Seller);
		assert_eq!(identity.restaurant_id.as_deref(), Some("r-1"));
		assert!(identity.require(Role::Seller).is_ok());
		assert_eq!(identity.require(Role::Rider).unwrap_err().status_code(), 403);
	}

	#[tokio::test]
	async fn test_missing_or_unknown_identity_is_unauthorized() {
		let missing = Request::builder().body(()).unwrap();
		assert_eq!(identity_of(missing).await.unwrap_err().status_code(), 401);

		let blank = Request::builder()
			.header(USER_ID_HEADER, "  ")
			.header(USER_ROLE_HEADER, "customer")
			.body(())
			.unwrap();
		assert_eq!(identity_of(blank).await.unwrap_err().status_code(), 401);

		let unknown_role = Request::builder()
			.header(USER_ID_HEADER, "u-1")
			.header(USER_ROLE_HEADER, "admin")
			.body(())
			.unwrap();
		assert_eq!(identity_of(unknown_role).await.unwrap_err().status_code(), 401);
	}
}
