use std::sync::Arc;

use axum::http::{HeaderMap, header};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::debug;
use uuid::Uuid;

use roster_types::api::Claims;
use roster_types::models::PublicUser;

use crate::error::{ModerationError, ModerationResult};
use crate::moderation::{Caller, ModerationService};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub moderation: ModerationService,
    pub jwt_secret: String,
    /// Include internal error detail in 500 responses.
    pub dev_mode: bool,
}

pub fn create_token(secret: &str, user: &PublicUser) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id.parse::<Uuid>()?,
        username: user.username.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn verify_token(secret: &str, token: &str) -> ModerationResult<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!("Token rejected: {}", e);
        ModerationError::Unauthorized
    })?;

    Ok(token_data.claims)
}

/// Resolve the caller from an `Authorization: Bearer` header.
pub fn bearer_caller(headers: &HeaderMap, secret: &str) -> ModerationResult<Caller> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ModerationError::Unauthorized)?;

    let claims = verify_token(secret, token)?;
    Ok(Caller {
        id: claims.sub.to_string(),
        username: claims.username,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use roster_types::models::{Role, UserRecord};

    fn public_user() -> PublicUser {
        let record = UserRecord::new("alice".into(), "secret1".into(), Role::User, chrono::Utc::now());
        PublicUser::from(&record)
    }

    #[test]
    fn bearer_round_trip() {
        let user = public_user();
        let token = create_token("test-secret", &user).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        let caller = bearer_caller(&headers, "test-secret").unwrap();
        assert_eq!(caller.id, user.id);
        assert_eq!(caller.username, "alice");
    }

    #[test]
    fn wrong_secret_or_missing_header_is_unauthorized() {
        let token = create_token("test-secret", &public_user()).unwrap();
        assert!(matches!(
            verify_token("other-secret", &token),
            Err(ModerationError::Unauthorized)
        ));
        assert!(matches!(
            bearer_caller(&HeaderMap::new(), "test-secret"),
            Err(ModerationError::Unauthorized)
        ));
    }
}
