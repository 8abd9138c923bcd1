use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use time::OffsetDateTime;

use crate::store::{Reading, ReadingStore};

#[derive(Clone)]
struct AppState {
    store: Arc<dyn ReadingStore>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomingReading {
    meter_id: String,
    #[serde(with = "time::serde::rfc3339")]
    time: OffsetDateTime,
    anomalous_power_reading: f64,
}

impl From<IncomingReading> for Reading {
    fn from(i: IncomingReading) -> Self {
        Reading {
            meter_id: i.meter_id,
            time: i.time,
            anomalous_power_reading: i.anomalous_power_reading,
        }
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadingResponse {
    meter_id: String,
    #[serde(with = "time::serde::rfc3339")]
    time: OffsetDateTime,
    anomalous_power_reading: f64,
}

impl From<Reading> for ReadingResponse {
    fn from(r: Reading) -> Self {
        Self {
            meter_id: r.meter_id,
            time: r.time,
            anomalous_power_reading: r.anomalous_power_reading,
        }
    }
}

pub fn router(store: Arc<dyn ReadingStore>) -> Router {
    Router::new()
        .route("/api/data", post(save_reading).get(get_readings))
        .with_state(AppState { store })
}

async fn save_reading(State(state): State<AppState>, Json(payload): Json<IncomingReading>) -> Response {
    metrics::counter!("http_save_requests_total").increment(1);

    match state.store.insert(payload.into()).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({ "message": "Data saved successfully!" })),
        )
            .into_response(),
        Err(e) => {
            // Error bodies stay opaque; the detail lives in logs and metrics.
            tracing::error!(error = %e, "failed to save reading");
            metrics::counter!("http_save_failed_total").increment(1);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Error saving data" })),
            )
                .into_response()
        }
    }
}

async fn get_readings(State(state): State<AppState>) -> Response {
    metrics::counter!("http_list_requests_total").increment(1);

    match state.store.list_all().await {
        Ok(readings) => {
            let body: Vec<ReadingResponse> = readings.into_iter().map(ReadingResponse::from).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to list readings");
            metrics::counter!("http_list_failed_total").increment(1);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Error retrieving data" })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// In-memory stand-in for the Mongo store, with switchable faults.
    struct MemoryStore {
        readings: Mutex<Vec<Reading>>,
        fail_writes: bool,
        fail_reads: bool,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                readings: Mutex::new(Vec::new()),
                fail_writes: false,
                fail_reads: false,
            }
        }

        fn failing_writes() -> Self {
            Self {
                fail_writes: true,
                ..Self::new()
            }
        }

        fn failing_reads() -> Self {
            Self {
                fail_reads: true,
                ..Self::new()
            }
        }
    }

    #[async_trait::async_trait]
    impl ReadingStore for MemoryStore {
        async fn insert(&self, reading: Reading) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::Write("simulated write fault".to_string()));
            }
            self.readings.lock().unwrap().push(reading);
            Ok(())
        }

        async fn list_all(&self) -> Result<Vec<Reading>, StoreError> {
            if self.fail_reads {
                return Err(StoreError::Read("simulated read fault".to_string()));
            }
            Ok(self.readings.lock().unwrap().clone())
        }
    }

    fn post_reading(meter_id: &str, time: &str, value: f64) -> Request<Body> {
        let body = json!({
            "meterId": meter_id,
            "time": time,
            "anomalousPowerReading": value,
        });
        Request::builder()
            .method("POST")
            .uri("/api/data")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_readings_request() -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri("/api/data")
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn post_then_get_round_trips_the_reading() {
        let app = router(Arc::new(MemoryStore::new()));

        let response = app
            .clone()
            .oneshot(post_reading("M1", "2024-06-01T12:00:00Z", 42.5))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Data saved successfully!");

        let response = app.oneshot(get_readings_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;

        let readings = body.as_array().unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0]["meterId"], "M1");
        assert_eq!(readings[0]["time"], "2024-06-01T12:00:00Z");
        assert_eq!(readings[0]["anomalousPowerReading"], 42.5);
    }

    #[tokio::test]
    async fn get_on_empty_store_returns_empty_array() {
        let app = router(Arc::new(MemoryStore::new()));

        let response = app.oneshot(get_readings_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn write_failure_maps_to_opaque_500_and_stores_nothing() {
        let app = router(Arc::new(MemoryStore::failing_writes()));

        let response = app
            .clone()
            .oneshot(post_reading("M1", "2024-06-01T12:00:00Z", 42.5))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await, json!({ "error": "Error saving data" }));

        // No partial record is visible afterwards.
        let response = app.oneshot(get_readings_request()).await.unwrap();
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn read_failure_maps_to_opaque_500() {
        let app = router(Arc::new(MemoryStore::failing_reads()));

        let response = app.oneshot(get_readings_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Error retrieving data" })
        );
    }

    #[tokio::test]
    async fn concurrent_inserts_both_appear() {
        let app = router(Arc::new(MemoryStore::new()));

        let (a, b) = tokio::join!(
            app.clone().oneshot(post_reading("M1", "2024-06-01T12:00:00Z", 1.0)),
            app.clone().oneshot(post_reading("M2", "2024-06-01T12:05:00Z", 2.0)),
        );
        assert_eq!(a.unwrap().status(), StatusCode::CREATED);
        assert_eq!(b.unwrap().status(), StatusCode::CREATED);

        let response = app.oneshot(get_readings_request()).await.unwrap();
        let body = body_json(response).await;
        let mut meters: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["meterId"].as_str().unwrap())
            .collect();
        meters.sort();
        assert_eq!(meters, vec!["M1", "M2"]);
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_before_the_store() {
        let app = router(Arc::new(MemoryStore::new()));

        let body = json!({ "meterId": "M1", "time": "2024-06-01T12:00:00Z" });
        let request = Request::builder()
            .method("POST")
            .uri("/api/data")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert!(response.status().is_client_error());

        let response = app.oneshot(get_readings_request()).await.unwrap();
        assert_eq!(body_json(response).await, json!([]));
    }
}
