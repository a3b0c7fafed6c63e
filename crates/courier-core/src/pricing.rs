//! Order pricing.
//!
//! Turns a cart snapshot and a delivery distance into the fee breakdown that
//! is frozen onto the order at creation time.

use courier_config::PricingConfig;
use courier_types::{CartLine, OrderPricing};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur while pricing a cart.
#[derive(Debug, Error, PartialEq)]
pub enum PricingError {
	#[error("Cart is empty")]
	EmptyCart,
	#[error("Cart spans more than one restaurant")]
	MixedRestaurants,
}

/// Derives totals and rider payout from cart contents.
#[derive(Debug, Clone)]
pub struct OrderPricer {
	delivery_fee: Decimal,
	free_delivery_threshold: Decimal,
	platform_fee: Decimal,
	rider_rate_per_km: Decimal,
}

impl OrderPricer {
	pub fn new(config: &PricingConfig) -> Self {
		Self {
			delivery_fee: Decimal::from(config.delivery_fee),
			free_delivery_threshold: Decimal::from(config.free_delivery_threshold),
			platform_fee: Decimal::from(config.platform_fee),
			rider_rate_per_km: Decimal::from(config.rider_rate_per_km),
		}
	}

	/// Prices `lines` for a delivery of `distance` kilometers.
	///
	/// The delivery fee is waived once the subtotal reaches the free delivery
	/// threshold. The rider is paid per started kilometer.
	pub fn price(&self, lines: &[CartLine], distance: f64) -> Result<OrderPricing, PricingError> {
		let first = lines.first().ok_or(PricingError::EmptyCart)?;
		if lines
			.iter()
			.any(|line| line.restaurant_id != first.restaurant_id)
		{
			return Err(PricingError::MixedRestaurants);
		}

		let subtotal: Decimal = lines
			.iter()
			.map(|line| line.item.price * Decimal::from(line.quantity))
			.sum();
		let delivery_fee = if subtotal < self.free_delivery_threshold {
			self.delivery_fee
		} else {
			Decimal::ZERO
		};
		let total_amount = subtotal + delivery_fee + self.platform_fee;

		// `as` saturates, so NaN or negative distances pay nothing.
		let started_km = distance.ceil() as u64;
		let rider_amount = Decimal::from(started_km) * self.rider_rate_per_km;

		Ok(OrderPricing {
			subtotal,
			delivery_fee,
			platform_fee: self.platform_fee,
			total_amount,
			rider_amount,
			distance,
		})
	}
}
