use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{PublicUser, UserStats};

// -- Token Claims --

/// Bearer token claims. Issued on register/login, checked on admin actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Request --

/// Every action shares one body shape; each action reads the fields it needs.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPayload {
    pub username: Option<String>,
    pub password: Option<String>,
    pub target_user: Option<String>,
    pub reason: Option<String>,
    /// Mute duration in minutes.
    pub duration: Option<u32>,
    pub master_key: Option<String>,
}

// -- Responses --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    pub user: PublicUser,
    pub is_admin: bool,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub success: bool,
    pub users: Vec<PublicUser>,
    pub stats: UserStats,
}

#[derive(Debug, Serialize)]
pub struct ModerationResponse {
    pub success: bool,
    pub user: PublicUser,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            reason: None,
            action: None,
            detail: None,
        }
    }
}
