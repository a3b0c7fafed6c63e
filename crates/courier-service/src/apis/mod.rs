//! Order API request processing.
//!
//! Handlers in [`crate::server`] extract the request and delegate here; this
//! layer validates request shape, calls the engine's controllers and maps
//! their errors onto HTTP responses.

pub mod order;
pub mod rider;

use courier_core::OrderError;
use courier_types::APIError;

/// Seconds a caller should wait before retrying after a dependency failure.
const DEPENDENCY_RETRY_AFTER_SECONDS: u64 = 5;

/// Maps a controller error onto its HTTP representation.
///
/// Rejections keep their specific reason. Dependency and internal failures
/// are reported without detail.
pub fn api_error(error: OrderError) -> APIError {
	match error {
		OrderError::Validation(message) => APIError::BadRequest {
			error_type: "VALIDATION_ERROR".into(),
			message,
		},
		OrderError::NotFound(message) => APIError::NotFound {
			error_type: "NOT_FOUND".into(),
			message,
		},
		OrderError::PreconditionFailed(message) => APIError::UnprocessableEntity {
			error_type: "PRECONDITION_FAILED".into(),
			message,
		},
		OrderError::Conflict(message) => APIError::Conflict {
			error_type: "CONFLICT".into(),
			message,
		},
		OrderError::Dependency(_) => APIError::ServiceUnavailable {
			error_type: "SERVICE_UNAVAILABLE".into(),
			message: "a backing service is unavailable, retry later".into(),
			retry_after: Some(DEPENDENCY_RETRY_AFTER_SECONDS),
		},
		OrderError::Internal(_) => APIError::InternalServerError {
			error_type: "INTERNAL_ERROR".into(),
			message: "internal server error".into(),
		},
	}
}

/// Rejects a missing or blank string field.
pub(crate) fn required(value: Option<String>, field: &str) -> Result<String, APIError> {
	value
		.map(|value| value.trim().to_string())
		.filter(|value| !value.is_empty())
		.ok_or_else(|| APIError::BadRequest {
			error_type: "VALIDATION_ERROR".into(),
			message: format!("{} is required", field),
		})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_mapping() {
		let cases = [
			(OrderError::Validation("cart is empty".into()), 400),
			(OrderError::NotFound("order not found".into()), 404),
			(OrderError::PreconditionFailed("order already paid".into()), 422),
			(OrderError::Conflict("order already taken".into()), 409),
			(OrderError::Dependency("broker down".into()), 503),
			(OrderError::Internal("corrupt record".into()), 500),
		];
		for (error, status) in cases {
			assert_eq!(api_error(error).status_code(), status);
		}
	}

	#[test]
	fn test_rejection_reason_is_kept_and_faults_are_opaque() {
		let conflict = api_error(OrderError::Conflict("order already taken".into()));
		assert_eq!(conflict.to_error_response().message, "order already taken");

		let internal = api_error(OrderError::Internal("order o-1 failed to decode".into()));
		assert!(!internal.to_error_response().message.contains("o-1"));

		let dependency = api_error(OrderError::Dependency("storage timeout".into()));
		assert_eq!(
			dependency.to_error_response().retry_after,
			Some(DEPENDENCY_RETRY_AFTER_SECONDS)
		);
	}

	#[test]
	fn test_required_trims_and_rejects_blank() {
		assert_eq!(required(Some(" o-1 ".into()), "orderId").unwrap(), "o-1");
		let err = required(Some("   ".into()), "orderId").unwrap_err();
		assert_eq!(err.to_error_response().message, "orderId is required");
		assert!(required(None, "riderId").is_err());
	}
}
