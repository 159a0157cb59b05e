pub mod rest;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use rest::*;
use state::AppState;
use std::sync::Arc;

pub use rest::ApiDoc;

/// Builds the REST router. Middleware and Swagger UI are layered on by the binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/alarms", get(list_alarms_handler).post(create_alarm_handler))
        .route(
            "/alarms/{id}",
            get(get_alarm_handler)
                .patch(update_alarm_handler)
                .delete(delete_alarm_handler),
        )
        .route("/alarms/{id}/enable", post(enable_alarm_handler))
        .route("/alarms/{id}/disable", post(disable_alarm_handler))
        .route("/alarms/{id}/toggle", post(toggle_alarm_handler))
        .route("/alarms/{id}/snooze", post(snooze_alarm_handler))
        .route("/alarms/{id}/test", post(test_alarm_handler))
        .route("/playback", get(playback_status_handler))
        .route("/playback/stop", post(stop_playback_handler))
        .route("/playback/snooze", post(snooze_playback_handler))
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{OfflineAdapter, SimulatedPlayer};
    use crate::config::Config;
    use crate::driver::{AlarmDriver, Collaborators, DriverSettings};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;
    use wakeup_core::{
        manager::AlarmManager,
        ports::{AlarmStore, PortResult},
    };

    #[derive(Default)]
    struct MemoryStore(Mutex<Option<Vec<u8>>>);

    #[async_trait]
    impl AlarmStore for MemoryStore {
        async fn load(&self) -> PortResult<Option<Vec<u8>>> {
            Ok(self.0.lock().unwrap().clone())
        }

        async fn save(&self, data: &[u8]) -> PortResult<()> {
            *self.0.lock().unwrap() = Some(data.to_vec());
            Ok(())
        }
    }

    /// The driver is returned so its test queue stays open.
    async fn app() -> (Router, AlarmDriver) {
        let store = Arc::new(MemoryStore::default());
        let manager = Arc::new(AlarmManager::load(store, chrono::Local::now()).await);
        let offline = Arc::new(OfflineAdapter::new("tests"));
        let collaborators = Collaborators {
            feeds: offline.clone(),
            speech: offline,
            player: Arc::new(SimulatedPlayer::new(Duration::from_millis(10))),
        };
        let (driver, control) =
            AlarmDriver::new(manager.clone(), collaborators, DriverSettings::default());
        let config = Config::from_lookup(|_| None).unwrap();
        let app_state = Arc::new(AppState {
            manager,
            control,
            config: Arc::new(config),
        });
        (router(app_state), driver)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn create_then_fetch_an_alarm() {
        let (app, _driver) = app().await;

        let (status, created) = send(
            &app,
            "POST",
            "/alarms",
            Some(json!({"id": "gym", "time": "06:30", "label": "Gym", "repeat_days": [0, 2, 4]})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["time"], "06:30:00");
        assert_eq!(created["repeat_summary"], "Mon, Wed, Fri");
        assert_eq!(created["feed_type"], "daily_news");
        assert_eq!(created["enabled"], true);

        let (status, fetched) = send(&app, "GET", "/alarms/gym", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["label"], "Gym");
    }

    #[tokio::test]
    async fn list_is_ordered_by_time() {
        let (app, _driver) = app().await;
        for (id, time) in [("late", "09:00"), ("early", "05:45")] {
            send(&app, "POST", "/alarms", Some(json!({"id": id, "time": time}))).await;
        }

        let (status, list) = send(&app, "GET", "/alarms", None).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = list
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn invalid_input_is_a_bad_request() {
        let (app, _driver) = app().await;

        let (status, body) = send(
            &app,
            "POST",
            "/alarms",
            Some(json!({"time": "07:00", "repeat_days": [7]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains('7'));

        let (status, _) = send(&app, "POST", "/alarms", Some(json!({"time": "25:00"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            "/alarms",
            Some(json!({"time": "07:00", "feed_type": "custom_prompt"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn duplicate_id_conflicts() {
        let (app, _driver) = app().await;
        let body = json!({"id": "a", "time": "07:00"});
        send(&app, "POST", "/alarms", Some(body.clone())).await;

        let (status, _) = send(&app, "POST", "/alarms", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unknown_alarm_is_not_found() {
        let (app, _driver) = app().await;
        for (method, uri) in [
            ("GET", "/alarms/nope"),
            ("DELETE", "/alarms/nope"),
            ("POST", "/alarms/nope/toggle"),
            ("POST", "/alarms/nope/test"),
        ] {
            let (status, _) = send(&app, method, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{} {}", method, uri);
        }
    }

    #[tokio::test]
    async fn patch_changes_only_given_fields() {
        let (app, _driver) = app().await;
        send(
            &app,
            "POST",
            "/alarms",
            Some(json!({"id": "a", "time": "07:00", "label": "Work"})),
        )
        .await;

        let (status, updated) = send(
            &app,
            "PATCH",
            "/alarms/a",
            Some(json!({"time": "07:15:30", "repeat_days": [5, 6]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["time"], "07:15:30");
        assert_eq!(updated["label"], "Work");
        assert_eq!(updated["repeat_days"], json!([5, 6]));
    }

    #[tokio::test]
    async fn delete_removes_the_alarm() {
        let (app, _driver) = app().await;
        send(&app, "POST", "/alarms", Some(json!({"id": "a", "time": "07:00"}))).await;

        let (status, _) = send(&app, "DELETE", "/alarms/a", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", "/alarms/a", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn snoozing_a_disabled_alarm_conflicts() {
        let (app, _driver) = app().await;
        send(
            &app,
            "POST",
            "/alarms",
            Some(json!({"id": "a", "time": "07:00", "enabled": false})),
        )
        .await;

        let (status, _) = send(&app, "POST", "/alarms/a/snooze", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        send(&app, "POST", "/alarms/a/enable", None).await;
        let (status, snoozed) = send(&app, "POST", "/alarms/a/snooze?minutes=5", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snoozed["is_snoozing"], true);
        assert!(snoozed["snooze_until"].is_string());
    }

    #[tokio::test]
    async fn zero_minute_snooze_is_rejected() {
        let (app, _driver) = app().await;
        let (status, _) = send(&app, "POST", "/playback/snooze?minutes=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn playback_controls_with_nothing_sounding() {
        let (app, _driver) = app().await;

        let (status, body) = send(&app, "GET", "/playback", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"playing": false, "sounding": []}));

        let (_, body) = send(&app, "POST", "/playback/stop", None).await;
        assert_eq!(body["was_playing"], false);

        let (status, body) = send(&app, "POST", "/playback/snooze", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["snoozed"], json!([]));
        assert_eq!(body["minutes"], 9);
    }

    #[tokio::test]
    async fn test_fire_is_accepted_while_the_driver_is_alive() {
        let (app, driver) = app().await;
        send(&app, "POST", "/alarms", Some(json!({"id": "a", "time": "07:00"}))).await;

        let (status, body) = send(&app, "POST", "/alarms/a/test", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["id"], "a");

        drop(driver);
        let (status, _) = send(&app, "POST", "/alarms/a/test", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
