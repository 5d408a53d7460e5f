use axum::{
    Router,
    routing::{get, post},
};

pub mod projection;
pub mod replenishment;
pub mod system;

/// Router for the planning endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/projection", post(projection::compute))
        .route("/policies", get(replenishment::list_policies))
        .route("/orders", get(replenishment::list_orders))
        .route("/orders/:id/quantity", post(replenishment::change_order_quantity))
        .route("/replenishment/run", post(replenishment::run))
        .route("/snapshot", get(system::snapshot))
        .route("/journal", get(system::journal))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use replenish_infra::{InMemoryWarehouse, ReplenishmentConfig, WarehouseSnapshot};
    use replenish_planning::{MaxQtySchedule, PolicyId, ReorderPolicy};
    use replenish_procurement::{OrderId, OrderSnapshot, OrderState};
    use replenish_stock::{
        Location, LocationId, LocationUsage, MoveId, MoveState, ProductId, StockMove, StockQuant,
    };

    use crate::app::{AppServices, build_app};

    const STOCK: u128 = 1;
    const PRODUCT: u128 = 7;

    fn seeded() -> Arc<AppServices> {
        serve(seed_snapshot())
    }

    fn serve(snapshot: WarehouseSnapshot) -> Arc<AppServices> {
        let warehouse = InMemoryWarehouse::from_snapshot(snapshot).unwrap();
        Arc::new(AppServices::new(
            Arc::new(warehouse),
            ReplenishmentConfig::default(),
        ))
    }

    fn seed_snapshot() -> WarehouseSnapshot {
        let location = |id: u128, usage| Location {
            id: LocationId::from_u128(id),
            name: format!("loc-{id}"),
            parent: None,
            usage,
        };
        let product = ProductId::from_u128(PRODUCT);
        WarehouseSnapshot {
            locations: vec![
                location(STOCK, LocationUsage::Internal),
                location(2, LocationUsage::Customer),
                location(3, LocationUsage::Supplier),
            ],
            quants: vec![StockQuant {
                product,
                location: LocationId::from_u128(STOCK),
                quantity: 20.0,
            }],
            moves: vec![StockMove {
                id: MoveId::from_u128(1),
                product,
                source: LocationId::from_u128(STOCK),
                destination: LocationId::from_u128(2),
                quantity: 15.0,
                state: MoveState::Confirmed,
                date_expected: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                    + Duration::days(3),
                order: None,
            }],
            policies: vec![ReorderPolicy {
                id: PolicyId::from_u128(100),
                company: None,
                product,
                location: LocationId::from_u128(STOCK),
                min_qty: 10.0,
                max_qty: MaxQtySchedule::constant(50.0),
                lot_multiple: 5.0,
                rounding: Default::default(),
            }],
            ..WarehouseSnapshot::default()
        }
    }

    /// A running order of 30 with 10 already received.
    fn with_partly_delivered_order(order: OrderId) -> WarehouseSnapshot {
        let mut snapshot = seed_snapshot();
        let product = ProductId::from_u128(PRODUCT);
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(2);
        let supply = |id: u128, quantity: f64, state| StockMove {
            id: MoveId::from_u128(id),
            product,
            source: LocationId::from_u128(3),
            destination: LocationId::from_u128(STOCK),
            quantity,
            state,
            date_expected: date,
            order: Some(order),
        };
        snapshot.moves.push(supply(10, 10.0, MoveState::Done));
        snapshot.moves.push(supply(11, 20.0, MoveState::Confirmed));
        snapshot.orders.push(OrderSnapshot {
            id: order,
            company: None,
            product,
            location: LocationId::from_u128(STOCK),
            quantity: 30.0,
            date_planned: date,
            state: OrderState::Running,
            moves: vec![MoveId::from_u128(10), MoveId::from_u128(11)],
            version: 2,
        });
        snapshot
    }

    async fn call(services: &Arc<AppServices>, req: Request<Body>) -> (StatusCode, Value) {
        let response = build_app(Arc::clone(services)).oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn projection_request() -> Value {
        json!({
            "product": ProductId::from_u128(PRODUCT),
            "location": LocationId::from_u128(STOCK),
        })
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, _) = call(&seeded(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn projection_before_and_after_a_run() {
        let services = seeded();

        let (status, body) = call(&services, post("/projection", projection_request())).await;
        assert_eq!(status, StatusCode::OK);
        let points = body["points"].as_array().unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1]["running_qty"], 5.0);

        let (status, report) = call(&services, post("/replenishment/run", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["policies"], 1);
        assert_eq!(report["chunks"][0]["status"], "committed");

        let (_, body) = call(&services, post("/projection", projection_request())).await;
        let last = body["points"].as_array().unwrap().last().unwrap().clone();
        assert_eq!(last["running_qty"], 50.0);

        let (_, orders) = call(&services, get("/orders")).await;
        let orders = orders.as_array().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0]["quantity"], 45.0);
        assert_eq!(orders[0]["state"], "running");
    }

    #[tokio::test]
    async fn projection_can_be_filtered_and_limited() {
        let mut request = projection_request();
        request["kinds"] = json!(["outgoing"]);
        request["descending"] = json!(true);
        request["limit"] = json!(1);

        let (status, body) = call(&seeded(), post("/projection", request)).await;
        assert_eq!(status, StatusCode::OK);
        let points = body["points"].as_array().unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0]["kind"], "outgoing");
    }

    #[tokio::test]
    async fn unknown_location_is_not_found() {
        let request = json!({
            "product": ProductId::from_u128(PRODUCT),
            "location": LocationId::from_u128(999),
        });
        let (status, body) = call(&seeded(), post("/projection", request)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn run_rejects_zero_chunk_size() {
        let (status, body) =
            call(&seeded(), post("/replenishment/run", json!({ "chunk_size": 0 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn run_without_body_plans_everything() {
        let services = seeded();
        let (status, report) = call(
            &services,
            Request::post("/replenishment/run").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["policies"], 1);

        let (_, journal) = call(&services, get("/journal")).await;
        assert_eq!(journal.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn policies_filter_by_product() {
        let services = seeded();
        let uri = format!("/policies?product={}", ProductId::from_u128(PRODUCT));
        let (_, body) = call(&services, get(&uri)).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let uri = format!("/policies?product={}", ProductId::from_u128(8));
        let (_, body) = call(&services, get(&uri)).await;
        assert!(body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn order_quantity_cannot_drop_below_delivered() {
        let order = OrderId::from_u128(500);
        let services = serve(with_partly_delivered_order(order));
        let uri = format!("/orders/{order}/quantity");

        let (status, body) = call(&services, post(&uri, json!({ "quantity": 5.0 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");

        let (status, body) = call(&services, post(&uri, json!({ "quantity": 25.0 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["quantity"], 25.0);

        // The pending move carries what is still to be received.
        let snapshot = services.warehouse().export().unwrap();
        let pending = snapshot
            .moves
            .iter()
            .find(|m| m.id == MoveId::from_u128(11))
            .unwrap();
        assert_eq!(pending.quantity, 15.0);
        let (_, journal) = call(&services, get("/journal")).await;
        assert_eq!(journal.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_order_quantity_change_is_not_found() {
        let uri = format!("/orders/{}/quantity", OrderId::from_u128(404));
        let (status, body) = call(&seeded(), post(&uri, json!({ "quantity": 5.0 }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_the_api() {
        let services = seeded();
        call(&services, post("/replenishment/run", json!({}))).await;

        let (status, body) = call(&services, get("/snapshot")).await;
        assert_eq!(status, StatusCode::OK);
        let snapshot: WarehouseSnapshot = serde_json::from_value(body).unwrap();
        assert_eq!(snapshot, services.warehouse().export().unwrap());
        assert_eq!(snapshot.orders.len(), 1);
    }
}
