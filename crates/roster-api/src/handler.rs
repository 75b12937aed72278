use axum::{
    Json,
    body::Bytes,
    extract::{Query, State, rejection::QueryRejection},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::debug;

use roster_types::api::{ActionPayload, AuthResponse, ModerationResponse, UserListResponse};
use roster_types::models::PublicUser;

use crate::auth::{AppState, AppStateInner, bearer_caller, create_token};
use crate::error::{ApiError, ModerationError};

pub const ACTIONS: &[&str] = &[
    "register", "login", "users", "stats", "ban", "unban", "mute", "unmute", "promote", "clear",
];

#[derive(Debug, Deserialize)]
pub struct ActionQuery {
    pub action: Option<String>,
}

/// Single entry point: `?action=` picks the operation, the JSON body carries
/// its parameters.
pub async fn handle_action(
    State(state): State<AppState>,
    query: Result<Query<ActionQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let dev_mode = state.dev_mode;
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            let err = ModerationError::InvalidInput(format!(
                "invalid query string: {}",
                rejection.body_text()
            ));
            return ApiError::from_moderation(err, dev_mode).into_response();
        }
    };
    let Some(action) = query.action.filter(|a| !a.is_empty()) else {
        return greeting();
    };
    if !ACTIONS.contains(&action.as_str()) {
        return ApiError::unknown_action(&action).into_response();
    }

    let payload = match parse_payload(&body) {
        Ok(payload) => payload,
        Err(e) => return ApiError::from_moderation(e, dev_mode).into_response(),
    };
    debug!("Action {}", action);

    // Store calls block; keep them off the async runtime
    let result = tokio::task::spawn_blocking(move || {
        dispatch(&state, &action, payload, &headers)
    })
    .await;

    match result {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => err.into_response(),
        Err(e) => {
            let err =
                ModerationError::Internal(anyhow::anyhow!("spawn_blocking join error: {}", e));
            ApiError::from_moderation(err, dev_mode).into_response()
        }
    }
}

pub async fn health() -> &'static str {
    "ok"
}

fn greeting() -> Response {
    Json(serde_json::json!({
        "success": true,
        "message": "roster api is running",
        "timestamp": chrono::Utc::now(),
        "availableActions": ACTIONS,
    }))
    .into_response()
}

fn parse_payload(body: &[u8]) -> Result<ActionPayload, ModerationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ActionPayload::default());
    }
    let value: serde_json::Value = serde_json::from_slice(body).map_err(|e| {
        debug!("Body parse error: {}", e);
        ModerationError::InvalidInput("request body must be a JSON object".into())
    })?;
    let Some(fields) = value.as_object() else {
        return Err(ModerationError::InvalidInput(
            "request body must be a JSON object".into(),
        ));
    };

    ActionPayload::deserialize(&value).map_err(|e| {
        // Retry field by field to name the one that failed
        let field = fields
            .iter()
            .find(|(name, v)| {
                let mut single = serde_json::Map::new();
                single.insert(name.to_string(), (*v).clone());
                ActionPayload::deserialize(&serde_json::Value::Object(single)).is_err()
            })
            .map(|(name, _)| name.as_str());
        match field {
            Some(name) => ModerationError::InvalidInput(format!("invalid field '{}': {}", name, e)),
            None => ModerationError::InvalidInput(format!("invalid request body: {}", e)),
        }
    })
}

fn dispatch(
    state: &AppStateInner,
    action: &str,
    payload: ActionPayload,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let svc = &state.moderation;
    let fail = |e: ModerationError| ApiError::from_moderation(e, state.dev_mode);

    match action {
        "register" => {
            let user = svc
                .register(
                    payload.username.as_deref().unwrap_or_default(),
                    payload.password.as_deref().unwrap_or_default(),
                )
                .map_err(fail)?;
            auth_response(state, user)
        }
        "login" => {
            let (Some(username), Some(password)) = (
                payload.username.as_deref().filter(|s| !s.is_empty()),
                payload.password.as_deref().filter(|s| !s.is_empty()),
            ) else {
                return Err(fail(ModerationError::InvalidInput(
                    "username and password are required".into(),
                )));
            };
            let user = svc
                .authenticate(username, password)
                .map_err(|e| ApiError::from_login_failure(e, state.dev_mode))?;
            auth_response(state, user)
        }
        "users" => {
            let caller = bearer_caller(headers, &state.jwt_secret).map_err(fail)?;
            let users = svc.list_users(&caller).map_err(fail)?;
            let stats = svc.stats().map_err(fail)?;
            Ok(Json(UserListResponse {
                success: true,
                users,
                stats,
            })
            .into_response())
        }
        "stats" => {
            let stats = svc.stats().map_err(fail)?;
            Ok(Json(serde_json::json!({ "success": true, "stats": stats })).into_response())
        }
        "ban" => {
            let caller = bearer_caller(headers, &state.jwt_secret).map_err(fail)?;
            let target = target_user(&payload).map_err(fail)?;
            let user = svc
                .ban(&caller, target, payload.reason.as_deref())
                .map_err(fail)?;
            let reason = user.ban_reason.clone();
            Ok(moderation_response(user, reason, None))
        }
        "unban" => {
            let caller = bearer_caller(headers, &state.jwt_secret).map_err(fail)?;
            let target = target_user(&payload).map_err(fail)?;
            let user = svc.unban(&caller, target).map_err(fail)?;
            Ok(moderation_response(user, None, None))
        }
        "mute" => {
            let caller = bearer_caller(headers, &state.jwt_secret).map_err(fail)?;
            let target = target_user(&payload).map_err(fail)?;
            let user = svc
                .mute(&caller, target, payload.reason.as_deref(), payload.duration)
                .map_err(fail)?;
            let (reason, duration) = (user.mute_reason.clone(), user.mute_duration);
            Ok(moderation_response(user, reason, duration))
        }
        "unmute" => {
            let caller = bearer_caller(headers, &state.jwt_secret).map_err(fail)?;
            let target = target_user(&payload).map_err(fail)?;
            let user = svc.unmute(&caller, target).map_err(fail)?;
            Ok(moderation_response(user, None, None))
        }
        "promote" => {
            let target = target_user(&payload).map_err(fail)?;
            let user = svc
                .promote(payload.master_key.as_deref().unwrap_or_default(), target)
                .map_err(fail)?;
            Ok(moderation_response(user, None, None))
        }
        "clear" => {
            let deleted = svc
                .clear_all(payload.master_key.as_deref().unwrap_or_default())
                .map_err(fail)?;
            Ok(Json(serde_json::json!({ "success": true, "deleted": deleted })).into_response())
        }
        other => Err(ApiError::unknown_action(other)),
    }
}

fn target_user(payload: &ActionPayload) -> Result<&str, ModerationError> {
    payload
        .target_user
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ModerationError::InvalidInput("targetUser is required".into()))
}

fn auth_response(state: &AppStateInner, user: PublicUser) -> Result<Response, ApiError> {
    let token = create_token(&state.jwt_secret, &user)
        .map_err(|e| ApiError::from_moderation(e.into(), state.dev_mode))?;
    Ok(Json(AuthResponse {
        success: true,
        is_admin: user.is_admin,
        user,
        token,
    })
    .into_response())
}

fn moderation_response(user: PublicUser, reason: Option<String>, duration: Option<u32>) -> Response {
    Json(ModerationResponse {
        success: true,
        user,
        reason,
        duration,
    })
    .into_response()
}
