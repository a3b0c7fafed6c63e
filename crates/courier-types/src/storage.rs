//! Storage namespaces used by the courier system.

use std::str::FromStr;

/// Storage keys for different data collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order aggregates, keyed by order id
	Orders,
	/// Active order held by each rider, keyed by rider id
	RiderAssignments,
	/// Restaurant documents written by the catalog service
	Restaurants,
	/// Menu item documents written by the catalog service
	MenuItems,
	/// Buyer addresses written by the address service
	Addresses,
	/// Buyer carts, keyed by buyer id
	Carts,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub const fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::RiderAssignments => "rider_assignments",
			StorageKey::Restaurants => "restaurants",
			StorageKey::MenuItems => "menu_items",
			StorageKey::Addresses => "addresses",
			StorageKey::Carts => "carts",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Orders,
			Self::RiderAssignments,
			Self::Restaurants,
			Self::MenuItems,
			Self::Addresses,
			Self::Carts,
		]
		.into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all().find(|key| key.as_str() == s).ok_or(())
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
