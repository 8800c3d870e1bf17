pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;
use crate::triage::handlers;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Inbox triage
        .route(
            "/v1/inbox-items",
            get(handlers::handle_list_items).post(handlers::handle_create_item),
        )
        .route("/v1/inbox-items/:id", get(handlers::handle_get_item))
        .route(
            "/v1/inbox-items/:id/reprocess",
            post(handlers::handle_reprocess),
        )
        .route("/v1/inbox-items/:id/confirm", post(handlers::handle_confirm))
        .route("/v1/inbox-items/:id/dismiss", post(handlers::handle_dismiss))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::repository::memory::MemoryStore;
    use crate::triage::service::InboxTriage;

    fn app(store: &MemoryStore) -> Router {
        let store = Arc::new(store.clone());
        let triage = InboxTriage::new(store.clone(), store.clone(), store, None);
        build_router(AppState {
            triage: Arc::new(triage),
        })
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(b) => request.body(Body::from(b.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(app(&MemoryStore::new()), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip_uses_camel_case() {
        let store = MemoryStore::new();
        let user = store.add_user("pt-BR", "UTC");

        let (status, created) = send(
            app(&store),
            "POST",
            "/v1/inbox-items",
            Some(json!({"userId": user, "rawText": " comprar pao ", "source": "share"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["rawText"], "comprar pao");
        assert_eq!(created["source"], "share");
        assert_eq!(created["status"], "NEW");

        let id = created["id"].as_str().unwrap();
        let (status, fetched) = send(
            app(&store),
            "GET",
            &format!("/v1/inbox-items/{id}?userId={user}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["id"], created["id"]);
        assert_eq!(fetched["suggestion"], Value::Null);
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let store = MemoryStore::new();
        let user = store.add_user("pt-BR", "UTC");

        let (status, body) = send(
            app(&store),
            "GET",
            &format!("/v1/inbox-items/{}?userId={user}", Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");

        let (status, body) = send(
            app(&store),
            "POST",
            "/v1/inbox-items",
            Some(json!({"userId": user, "rawText": "x", "source": "fax"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_source");
    }

    #[tokio::test]
    async fn test_reprocess_without_client_is_server_error() {
        let store = MemoryStore::new();
        let user = store.add_user("pt-BR", "UTC");
        let (_, created) = send(
            app(&store),
            "POST",
            "/v1/inbox-items",
            Some(json!({"userId": user, "rawText": "algo"})),
        )
        .await;
        let id = created["id"].as_str().unwrap();

        let (status, body) = send(
            app(&store),
            "POST",
            &format!("/v1/inbox-items/{id}/reprocess"),
            Some(json!({"userId": user})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "dependency_missing");
    }

    #[tokio::test]
    async fn test_confirm_and_list_over_http() {
        let store = MemoryStore::new();
        let user = store.add_user("pt-BR", "UTC");
        let (_, created) = send(
            app(&store),
            "POST",
            "/v1/inbox-items",
            Some(json!({"userId": user, "rawText": "reuniao sexta"})),
        )
        .await;
        let id = created["id"].as_str().unwrap();

        let (status, body) = send(
            app(&store),
            "POST",
            &format!("/v1/inbox-items/{id}/confirm"),
            Some(json!({
                "userId": user,
                "type": "event",
                "title": "Reuniao",
                "payload": {"start": "2024-05-03T14:00:00Z", "allDay": false}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "event");
        assert_eq!(body["event"]["title"], "Reuniao");
        assert_eq!(body["event"]["sourceInboxItemId"], created["id"]);
        assert!(body.get("task").is_none());

        let (status, list) = send(
            app(&store),
            "GET",
            &format!("/v1/inbox-items?userId={user}&status=CONFIRMED"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["items"].as_array().unwrap().len(), 1);
        assert_eq!(list["items"][0]["suggestion"]["type"], "event");

        let (status, body) = send(
            app(&store),
            "POST",
            &format!("/v1/inbox-items/{id}/dismiss"),
            Some(json!({"userId": user})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_status");
    }
}
