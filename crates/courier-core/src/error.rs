//! Error taxonomy shared by the order controllers.

use crate::catalog::CatalogError;
use crate::pricing::PricingError;
use crate::state::{OrderStoreError, Rejection};
use thiserror::Error;

/// Errors returned by controller entry points.
///
/// Each variant carries the user-facing rejection reason.
#[derive(Debug, Error)]
pub enum OrderError {
	/// Missing or malformed input.
	#[error("Validation error: {0}")]
	Validation(String),
	/// Entity absent.
	#[error("Not found: {0}")]
	NotFound(String),
	/// Payment, ownership or rider state does not permit the operation.
	#[error("Precondition failed: {0}")]
	PreconditionFailed(String),
	/// Lost an atomic race. Retrying against fresh state may succeed.
	#[error("Conflict: {0}")]
	Conflict(String),
	/// Store or broker unreachable.
	#[error("Dependency error: {0}")]
	Dependency(String),
	#[error("Internal error: {0}")]
	Internal(String),
}

impl OrderError {
	/// The rejection reason without the category prefix.
	pub fn reason(&self) -> &str {
		match self {
			OrderError::Validation(reason)
			| OrderError::NotFound(reason)
			| OrderError::PreconditionFailed(reason)
			| OrderError::Conflict(reason)
			| OrderError::Dependency(reason)
			| OrderError::Internal(reason) => reason,
		}
	}
}

impl From<OrderStoreError> for OrderError {
	fn from(err: OrderStoreError) -> Self {
		match err {
			OrderStoreError::Contention(msg) => OrderError::Conflict(msg),
			OrderStoreError::Storage(msg) => OrderError::Dependency(msg),
			OrderStoreError::Integrity(msg) => OrderError::Internal(msg),
		}
	}
}

impl From<CatalogError> for OrderError {
	fn from(err: CatalogError) -> Self {
		match err {
			CatalogError::NotFound(what) => OrderError::NotFound(format!("{} not found", what)),
			CatalogError::Storage(msg) => OrderError::Dependency(msg),
		}
	}
}

impl From<PricingError> for OrderError {
	fn from(err: PricingError) -> Self {
		OrderError::Validation(err.to_string())
	}
}

impl From<Rejection> for OrderError {
	fn from(rejection: Rejection) -> Self {
		match rejection {
			Rejection::NotFound => OrderError::NotFound("order not found".into()),
			Rejection::AlreadyPaid => OrderError::PreconditionFailed("order already paid".into()),
			Rejection::NotPaid => OrderError::PreconditionFailed("order is not paid".into()),
			Rejection::NotOwner => OrderError::PreconditionFailed(
				"order belongs to another restaurant".into(),
			),
			Rejection::NotHolder => OrderError::PreconditionFailed(
				"order is not assigned to this rider".into(),
			),
			Rejection::AlreadyClaimed => OrderError::Conflict("order already taken".into()),
			Rejection::InvalidTransition { from, to } => OrderError::PreconditionFailed(format!(
				"cannot move order from {} to {}",
				from, to
			)),
			Rejection::NoRiderStep { status } => OrderError::PreconditionFailed(format!(
				"no rider step from {}",
				status
			)),
		}
	}
}
