//! HTTP server for the courier order API.
//!
//! Routes live under `/api/order`. Buyer and restaurant routes read the
//! caller identity forwarded by the gateway; payment and rider routes are
//! called by other services and require the internal key.

use crate::apis;
use crate::auth::{Identity, InternalCaller};
use axum::{
	extract::{DefaultBodyLimit, Path, Query, State},
	http::{HeaderName, HeaderValue, Method},
	response::Json,
	routing::{get, post, put},
	Router,
};
use courier_config::{ApiConfig, Config};
use courier_core::CourierEngine;
use courier_types::{
	APIError, AssignRiderRequest, AssignRiderResponse, CreateOrderRequest, CreateOrderResponse,
	CurrentRiderQuery, MyOrdersResponse, Order, OrderUpdateResponse, OrdersResponse,
	PaymentOrderResponse, RestaurantOrdersQuery, RiderStatusRequest, RiderStatusResponse,
	UpdateOrderStatusRequest,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Engine owning the order controllers.
	pub engine: Arc<CourierEngine>,
	/// Complete configuration.
	pub config: Config,
}

/// Starts the HTTP server and serves until the listener fails.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<CourierEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let config = engine.config().clone();
	let app = build_router(AppState { engine, config }, &api_config);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Courier API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Builds the router with every route and middleware layer.
pub fn build_router(state: AppState, api_config: &ApiConfig) -> Router {
	let orders = Router::new()
		.route("/new", post(handle_create_order))
		.route("/myorder", get(handle_my_orders))
		.route("/{id}", get(handle_get_order).put(handle_update_status))
		.route("/payment/{id}", get(handle_order_for_payment))
		.route("/restaurant/{restaurant_id}", get(handle_restaurant_orders))
		.route("/assign/rider", put(handle_assign_rider))
		.route("/current/rider", get(handle_current_rider_order))
		.route("/update/status/rider", put(handle_rider_status));

	Router::new()
		.route("/health", get(handle_health))
		.nest("/api/order", orders)
		.layer(
			ServiceBuilder::new()
				.layer(cors_layer(api_config))
				.layer(DefaultBodyLimit::max(api_config.max_request_size))
				.layer(TimeoutLayer::new(Duration::from_secs(
					api_config.timeout_seconds,
				))),
		)
		.with_state(state)
}

/// CORS from configuration, permissive when none is given.
fn cors_layer(api_config: &ApiConfig) -> CorsLayer {
	let Some(cors) = &api_config.cors else {
		return CorsLayer::permissive();
	};

	let origins = if cors.allowed_origins.iter().any(|origin| origin == "*") {
		AllowOrigin::from(Any)
	} else {
		AllowOrigin::list(cors.allowed_origins.iter().filter_map(|origin| {
			HeaderValue::from_str(origin)
				.inspect_err(|_| tracing::warn!("Ignoring invalid CORS origin '{}'", origin))
				.ok()
		}))
	};

	let methods = AllowMethods::list(cors.allowed_methods.iter().filter_map(|method| {
		Method::from_bytes(method.to_uppercase().as_bytes())
			.inspect_err(|_| tracing::warn!("Ignoring invalid CORS method '{}'", method))
			.ok()
	}));

	let headers = if cors.allowed_headers.iter().any(|header| header == "*") {
		AllowHeaders::from(Any)
	} else {
		AllowHeaders::list(cors.allowed_headers.iter().filter_map(|header| {
			HeaderName::from_bytes(header.as_bytes())
				.inspect_err(|_| tracing::warn!("Ignoring invalid CORS header '{}'", header))
				.ok()
		}))
	};

	CorsLayer::new()
		.allow_origin(origins)
		.allow_methods(methods)
		.allow_headers(headers)
}

/// Handles GET /health requests.
async fn handle_health(State(state): State<AppState>) -> Json<Value> {
	Json(json!({
		"status": "ok",
		"service": state.config.service.id,
	}))
}

/// Handles POST /api/order/new requests.
async fn handle_create_order(
	State(state): State<AppState>,
	identity: Identity,
	Json(request): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, APIError> {
	match apis::order::create_order(&state.engine, &identity, request).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!("Order creation failed: {}", e);
			Err(e)
		},
	}
}

/// Handles GET /api/order/myorder requests.
async fn handle_my_orders(
	State(state): State<AppState>,
	identity: Identity,
) -> Result<Json<MyOrdersResponse>, APIError> {
	match apis::order::my_orders(&state.engine, &identity).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!("Order listing failed: {}", e);
			Err(e)
		},
	}
}

/// Handles GET /api/order/{id} requests.
async fn handle_get_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
	identity: Identity,
) -> Result<Json<Order>, APIError> {
	match apis::order::get_order(&state.engine, &identity, &id).await {
		Ok(order) => Ok(Json(order)),
		Err(e) => {
			tracing::warn!("Order retrieval failed: {}", e);
			Err(e)
		},
	}
}

/// Handles GET /api/order/payment/{id} requests from the payment service.
async fn handle_order_for_payment(
	Path(id): Path<String>,
	State(state): State<AppState>,
	_internal: InternalCaller,
) -> Result<Json<PaymentOrderResponse>, APIError> {
	match apis::order::order_for_payment(&state.engine, &id).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!("Payment order fetch failed: {}", e);
			Err(e)
		},
	}
}

/// Handles GET /api/order/restaurant/{restaurant_id} requests.
async fn handle_restaurant_orders(
	Path(restaurant_id): Path<String>,
	Query(query): Query<RestaurantOrdersQuery>,
	State(state): State<AppState>,
	identity: Identity,
) -> Result<Json<OrdersResponse>, APIError> {
	match apis::order::restaurant_orders(&state.engine, &identity, &restaurant_id, query).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!("Restaurant order listing failed: {}", e);
			Err(e)
		},
	}
}

/// Handles PUT /api/order/{id} requests from the restaurant owner.
async fn handle_update_status(
	Path(id): Path<String>,
	State(state): State<AppState>,
	identity: Identity,
	Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<OrderUpdateResponse>, APIError> {
	match apis::order::update_status(&state.engine, &identity, &id, request).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!("Order status update failed: {}", e);
			Err(e)
		},
	}
}

/// Handles PUT /api/order/assign/rider requests from the rider service.
async fn handle_assign_rider(
	State(state): State<AppState>,
	_internal: InternalCaller,
	Json(request): Json<AssignRiderRequest>,
) -> Result<Json<AssignRiderResponse>, APIError> {
	match apis::rider::assign_rider(&state.engine, request).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!("Rider assignment failed: {}", e);
			Err(e)
		},
	}
}

/// Handles GET /api/order/current/rider requests from the rider service.
async fn handle_current_rider_order(
	Query(query): Query<CurrentRiderQuery>,
	State(state): State<AppState>,
	_internal: InternalCaller,
) -> Result<Json<Order>, APIError> {
	match apis::rider::current_order(&state.engine, query).await {
		Ok(order) => Ok(Json(order)),
		Err(e) => {
			tracing::warn!("Current rider order lookup failed: {}", e);
			Err(e)
		},
	}
}

/// Handles PUT /api/order/update/status/rider requests from the rider service.
async fn handle_rider_status(
	State(state): State<AppState>,
	_internal: InternalCaller,
	Json(request): Json<RiderStatusRequest>,
) -> Result<Json<RiderStatusResponse>, APIError> {
	match apis::rider::update_status(&state.engine, request).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!("Rider status update failed: {}", e);
			Err(e)
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::auth::{INTERNAL_KEY_HEADER, USER_ID_HEADER, USER_ROLE_HEADER};
	use crate::test_support::{engine_with_catalog, INTERNAL_KEY};
	use courier_types::{CartEntry, StorageKey};
	use axum::body::{to_bytes, Body};
	use axum::http::{Request, StatusCode};
	use tower::ServiceExt;

	async fn app(restaurant_open: bool) -> (Router, Arc<CourierEngine>) {
		let engine = Arc::new(engine_with_catalog(restaurant_open).await);
		let config = engine.config().clone();
		let api_config = config.api.clone().unwrap();
		let router = build_router(
			AppState {
				engine: engine.clone(),
				config,
			},
			&api_config,
		);
		(router, engine)
	}

	enum Caller<'a> {
		Anonymous,
		User(&'a str, &'a str),
		Internal(&'a str),
	}

	async fn call(
		router: &Router,
		method: Method,
		uri: &str,
		caller: Caller<'_>,
		body: Option<Value>,
	) -> (StatusCode, Value) {
		let mut request = Request::builder().method(method).uri(uri);
		request = match caller {
			Caller::Anonymous => request,
			Caller::User(id, role) => request
				.header(USER_ID_HEADER, id)
				.header(USER_ROLE_HEADER, role),
			Caller::Internal(key) => request.header(INTERNAL_KEY_HEADER, key),
		};
		let request = match body {
			Some(body) => request
				.header("content-type", "application/json")
				.body(Body::from(body.to_string()))
				.unwrap(),
			None => request.body(Body::empty()).unwrap(),
		};

		let response = router.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let value = if bytes.is_empty() {
			Value::Null
		} else {
			serde_json::from_slice(&bytes).unwrap()
		};
		(status, value)
	}

	async fn create_order(router: &Router) -> String {
		let (status, body) = call(
			router,
			Method::POST,
			"/api/order/new",
			Caller::User("u-1", "customer"),
			Some(json!({ "addressId": "a-1", "paymentMethod": "stripe" })),
		)
		.await;
		assert_eq!(status, StatusCode::OK, "{}", body);
		body["orderId"].as_str().unwrap().to_string()
	}

	#[tokio::test]
	async fn test_health() {
		let (router, _) = app(true).await;
		let (status, body) = call(&router, Method::GET, "/health", Caller::Anonymous, None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["service"], "courier-http-test");
	}

	#[tokio::test]
	async fn test_create_order_requires_identity() {
		let (router, _) = app(true).await;
		let (status, body) = call(
			&router,
			Method::POST,
			"/api/order/new",
			Caller::Anonymous,
			Some(json!({ "addressId": "a-1" })),
		)
		.await;
		assert_eq!(status, StatusCode::UNAUTHORIZED);
		assert_eq!(body["error"], "UNAUTHORIZED");
	}

	#[tokio::test]
	async fn test_create_order_and_fetch_for_payment() {
		let (router, _) = app(true).await;
		let (status, body) = call(
			&router,
			Method::POST,
			"/api/order/new",
			Caller::User("u-1", "customer"),
			Some(json!({ "addressId": "a-1" })),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["amount"].as_f64(), Some(307.0));
		let order_id = body["orderId"].as_str().unwrap().to_string();

		let uri = format!("/api/order/payment/{}", order_id);
		let (status, _) = call(&router, Method::GET, &uri, Caller::Internal("wrong"), None).await;
		assert_eq!(status, StatusCode::FORBIDDEN);

		let (status, body) =
			call(&router, Method::GET, &uri, Caller::Internal(INTERNAL_KEY), None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["orderId"], order_id.as_str());
		assert_eq!(body["amount"].as_f64(), Some(307.0));
		assert_eq!(body["currency"], "INR");
	}

	#[tokio::test]
	async fn test_closed_restaurant_and_empty_cart() {
		let (router, engine) = app(false).await;
		let request = json!({ "addressId": "a-1" });

		let (status, body) = call(
			&router,
			Method::POST,
			"/api/order/new",
			Caller::User("u-1", "customer"),
			Some(request.clone()),
		)
		.await;
		assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
		assert_eq!(body["message"], "restaurant is closed");

		engine
			.storage()
			.store(StorageKey::Carts.as_str(), "u-1", &Vec::<CartEntry>::new())
			.await
			.unwrap();
		let (status, body) = call(
			&router,
			Method::POST,
			"/api/order/new",
			Caller::User("u-1", "customer"),
			Some(request),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["message"], "cart is empty");
	}

	#[tokio::test]
	async fn test_order_visible_to_its_buyer_only() {
		let (router, engine) = app(true).await;
		let order_id = create_order(&router).await;
		assert!(engine.payments().reconcile(&order_id).await.unwrap());

		let uri = format!("/api/order/{}", order_id);
		let (status, body) = call(
			&router,
			Method::GET,
			&uri,
			Caller::User("u-1", "customer"),
			None,
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["paymentStatus"], "paid");
		assert_eq!(body["paymentMethod"], "stripe");

		let (status, _) = call(
			&router,
			Method::GET,
			&uri,
			Caller::User("u-2", "customer"),
			None,
		)
		.await;
		assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

		let (status, body) = call(
			&router,
			Method::GET,
			"/api/order/myorder",
			Caller::User("u-1", "customer"),
			None,
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["orders"].as_array().unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_restaurant_flow_through_delivery() {
		let (router, engine) = app(true).await;
		let order_id = create_order(&router).await;
		assert!(engine.payments().reconcile(&order_id).await.unwrap());
		let order_uri = format!("/api/order/{}", order_id);

		let (status, body) = call(
			&router,
			Method::PUT,
			&order_uri,
			Caller::User("seller-1", "seller"),
			Some(json!({ "status": "delivered" })),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

		let (status, body) = call(
			&router,
			Method::PUT,
			&order_uri,
			Caller::User("seller-1", "seller"),
			Some(json!({ "status": "ready_for_rider" })),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["order"]["status"], "ready_for_rider");

		let (status, body) = call(
			&router,
			Method::GET,
			"/api/order/restaurant/r-1?limit=1",
			Caller::User("seller-1", "seller"),
			None,
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["count"], 1);

		let claim = json!({ "orderId": order_id, "riderId": "rider-1", "riderName": "Ravi" });
		let (status, _) = call(
			&router,
			Method::PUT,
			"/api/order/assign/rider",
			Caller::Anonymous,
			Some(claim.clone()),
		)
		.await;
		assert_eq!(status, StatusCode::FORBIDDEN);

		let (status, body) = call(
			&router,
			Method::PUT,
			"/api/order/assign/rider",
			Caller::Internal(INTERNAL_KEY),
			Some(claim),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["order"]["riderId"], "rider-1");

		let (status, body) = call(
			&router,
			Method::GET,
			"/api/order/current/rider?riderId=rider-1",
			Caller::Internal(INTERNAL_KEY),
			None,
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["id"], order_id.as_str());

		let advance = json!({ "orderId": order_id });
		for expected in ["picked_up", "delivered"] {
			let (status, body) = call(
				&router,
				Method::PUT,
				"/api/order/update/status/rider",
				Caller::Internal(INTERNAL_KEY),
				Some(advance.clone()),
			)
			.await;
			assert_eq!(status, StatusCode::OK);
			assert_eq!(body["updated"], true);
			assert_eq!(body["order"]["status"], expected);
		}
	}

	#[tokio::test]
	async fn test_second_rider_gets_conflict() {
		let (router, engine) = app(true).await;
		let order_id = create_order(&router).await;
		assert!(engine.payments().reconcile(&order_id).await.unwrap());
		engine
			.lifecycle()
			.advance_status(&order_id, "seller-1", "ready_for_rider")
			.await
			.unwrap();

		let mut statuses = Vec::new();
		for rider in ["rider-1", "rider-2"] {
			let (status, _) = call(
				&router,
				Method::PUT,
				"/api/order/assign/rider",
				Caller::Internal(INTERNAL_KEY),
				Some(json!({ "orderId": order_id, "riderId": rider })),
			)
			.await;
			statuses.push(status);
		}
		assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);
	}

	#[test]
	fn test_cors_from_config() {
		let api_config: ApiConfig = toml::from_str(
			r#"
enabled = true
[cors]
allowed_origins = ["https://app.example.com", "not a header\n"]
allowed_headers = ["content-type", "x-user-id"]
allowed_methods = ["get", "PUT"]
"#,
		)
		.unwrap();
		// Invalid entries are dropped rather than rejected.
		let _ = cors_layer(&api_config);
	}
}
