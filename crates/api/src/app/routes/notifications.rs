use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use jobboard_core::NotificationId;

use crate::app::{dto, errors, services::AppServices};
use crate::context::PrincipalContext;

const DEFAULT_LIMIT: usize = 50;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_notifications))
        .route("/:id/read", post(mark_read))
}

pub async fn list_notifications(
    Extension(services): Extension<Arc<AppServices>>,
    principal: PrincipalContext,
    Query(query): Query<dto::ListNotificationsQuery>,
) -> axum::response::Response {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    match services.store.list_notifications(principal.user_id(), limit).await {
        Ok(items) => {
            let items = items.iter().map(dto::notification_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn mark_read(
    Extension(services): Extension<Arc<AppServices>>,
    principal: PrincipalContext,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: NotificationId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.store.mark_notification_read(principal.user_id(), id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "notification not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}
