//! Great-circle distance on a spherical earth.

/// Mean earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two `(latitude, longitude)` points given in
/// degrees, in kilometers rounded to two decimal places.
pub fn distance_km(from: (f64, f64), to: (f64, f64)) -> f64 {
	let (lat1, lon1) = from;
	let (lat2, lon2) = to;

	let d_lat = (lat2 - lat1).to_radians();
	let d_lon = (lon2 - lon1).to_radians();
	let a = (d_lat / 2.0).sin().powi(2)
		+ lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
	let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

	(EARTH_RADIUS_KM * c * 100.0).round() / 100.0
}
