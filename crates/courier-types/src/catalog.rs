//! Catalog entity snapshots.
//!
//! Restaurants, menu items, addresses and carts are owned by the catalog
//! services. The order subsystem only reads them while creating an order,
//! so these types mirror the stored documents and nothing more.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// GeoJSON point with `[longitude, latitude]` coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeoLocation {
	#[serde(rename = "type", default = "point_type")]
	pub kind: String,
	pub coordinates: [f64; 2],
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub formatted_address: Option<String>,
}

fn point_type() -> String {
	"Point".to_string()
}

impl GeoLocation {
	pub fn point(latitude: f64, longitude: f64) -> Self {
		Self {
			kind: point_type(),
			coordinates: [longitude, latitude],
			formatted_address: None,
		}
	}

	pub fn longitude(&self) -> f64 {
		self.coordinates[0]
	}

	pub fn latitude(&self) -> f64 {
		self.coordinates[1]
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
	pub id: String,
	pub name: String,
	pub owner_id: String,
	#[serde(default)]
	pub phone: Option<String>,
	#[serde(default)]
	pub is_open: bool,
	pub auto_location: GeoLocation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
	pub id: String,
	pub restaurant_id: String,
	pub name: String,
	pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
	pub id: String,
	pub user_id: String,
	pub mobile: String,
	pub formatted_address: String,
	pub location: GeoLocation,
}

/// A stored cart entry: one item of one restaurant with its quantity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CartEntry {
	pub restaurant_id: String,
	pub item_id: String,
	pub quantity: u32,
}

/// A cart entry joined with the menu item it references.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
	pub restaurant_id: String,
	pub item: MenuItem,
	pub quantity: u32,
}
