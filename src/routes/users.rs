use axum::{http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::context::{ErrorType, RequestError, RequestScope};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub email: String,
    pub created_at: String,
}

pub async fn create_user(
    scope: RequestScope,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    info!("Create user requested: {:?}", payload);
    scope.add_debug_value(format!("user={}", payload.name));

    if payload.name.is_empty() || payload.email.is_empty() {
        warn!("Invalid user creation request: missing name or email");
        scope.push_error(
            RequestError::new("user validation failed", ErrorType::Private)
                .with_meta(format!("name={:?} email={:?}", payload.name, payload.email)),
        );
        scope.push_error(RequestError::new("name and email are required", ErrorType::Public));
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "name and email are required" })),
        ));
    }

    let user = User {
        name: payload.name,
        email: payload.email,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    Ok(Json(json!({
        "user": user,
        "message": "User created successfully"
    })))
}
