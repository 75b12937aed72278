use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_BAN_REASON: &str = "rule violation";
pub const DEFAULT_MUTE_REASON: &str = "spam";
pub const DEFAULT_MUTE_MINUTES: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// A stored account. This is the full record as persisted, password included;
/// anything leaving the service goes through [`PublicUser`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub username: String,
    pub id: String,
    pub password: String,
    pub role: Role,
    pub is_banned: bool,
    pub ban_reason: Option<String>,
    pub ban_date: Option<DateTime<Utc>>,
    pub bans: u32,
    pub is_muted: bool,
    pub mute_reason: Option<String>,
    pub mute_start: Option<DateTime<Utc>>,
    pub mute_end: Option<DateTime<Utc>>,
    pub mute_duration: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn new(username: String, password: String, role: Role, now: DateTime<Utc>) -> Self {
        Self {
            username,
            id: Uuid::new_v4().to_string(),
            password,
            role,
            is_banned: false,
            ban_reason: None,
            ban_date: None,
            bans: 0,
            is_muted: false,
            mute_reason: None,
            mute_start: None,
            mute_end: None,
            mute_duration: None,
            created_at: now,
            last_login: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Callers are responsible for refusing admins; this only moves the fields.
    pub fn apply_ban(&mut self, reason: Option<&str>, now: DateTime<Utc>) {
        self.is_banned = true;
        self.ban_reason = Some(reason_or(reason, DEFAULT_BAN_REASON));
        self.ban_date = Some(now);
        self.bans = self.bans.saturating_add(1);
    }

    /// `bans` is a lifetime counter and survives the unban.
    pub fn clear_ban(&mut self) {
        self.is_banned = false;
        self.ban_reason = None;
        self.ban_date = None;
    }

    pub fn apply_mute(&mut self, reason: Option<&str>, minutes: u32, now: DateTime<Utc>) {
        self.is_muted = true;
        self.mute_reason = Some(reason_or(reason, DEFAULT_MUTE_REASON));
        self.mute_start = Some(now);
        self.mute_end = Some(now + Duration::minutes(i64::from(minutes)));
        self.mute_duration = Some(minutes);
    }

    pub fn clear_mute(&mut self) {
        self.is_muted = false;
        self.mute_reason = None;
        self.mute_start = None;
        self.mute_end = None;
        self.mute_duration = None;
    }

    pub fn is_muted_at(&self, now: DateTime<Utc>) -> bool {
        match self.mute_end {
            Some(end) => self.is_muted && end > now,
            None => self.is_muted,
        }
    }

    /// Clears a mute whose end time has passed. Returns true if anything changed.
    pub fn expire_mute(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_muted && !self.is_muted_at(now) {
            self.clear_mute();
            true
        } else {
            false
        }
    }

    pub fn promote(&mut self) {
        self.role = Role::Admin;
    }
}

fn reason_or(reason: Option<&str>, default: &str) -> String {
    match reason {
        Some(r) if !r.is_empty() => r.to_string(),
        _ => default.to_string(),
    }
}

/// Redacted view of a [`UserRecord`]: everything except the password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub username: String,
    pub id: String,
    pub role: Role,
    pub is_admin: bool,
    pub is_banned: bool,
    pub ban_reason: Option<String>,
    pub ban_date: Option<DateTime<Utc>>,
    pub bans: u32,
    pub is_muted: bool,
    pub mute_reason: Option<String>,
    pub mute_start: Option<DateTime<Utc>>,
    pub mute_end: Option<DateTime<Utc>>,
    pub mute_duration: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<&UserRecord> for PublicUser {
    fn from(user: &UserRecord) -> Self {
        Self {
            username: user.username.clone(),
            id: user.id.clone(),
            role: user.role,
            is_admin: user.is_admin(),
            is_banned: user.is_banned,
            ban_reason: user.ban_reason.clone(),
            ban_date: user.ban_date,
            bans: user.bans,
            is_muted: user.is_muted,
            mute_reason: user.mute_reason.clone(),
            mute_start: user.mute_start,
            mute_end: user.mute_end,
            mute_duration: user.mute_duration,
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub total: usize,
    pub admins: usize,
    pub banned: usize,
    pub muted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    fn user() -> UserRecord {
        UserRecord::new("alice".into(), "secret1".into(), Role::User, at(9, 0))
    }

    #[test]
    fn empty_reason_falls_back_to_default() {
        let mut u = user();
        u.apply_ban(Some(""), at(10, 0));
        assert_eq!(u.ban_reason.as_deref(), Some(DEFAULT_BAN_REASON));

        u.apply_mute(None, 5, at(10, 0));
        assert_eq!(u.mute_reason.as_deref(), Some(DEFAULT_MUTE_REASON));
    }

    #[test]
    fn unban_keeps_counter() {
        let mut u = user();
        u.apply_ban(Some("flood"), at(10, 0));
        u.clear_ban();
        u.apply_ban(None, at(11, 0));
        u.clear_ban();

        assert!(!u.is_banned);
        assert_eq!(u.ban_reason, None);
        assert_eq!(u.ban_date, None);
        assert_eq!(u.bans, 2);
    }

    #[test]
    fn mute_expires_lazily() {
        let mut u = user();
        u.apply_mute(Some("caps"), 30, at(10, 0));

        assert_eq!(u.mute_end, Some(at(10, 30)));
        assert!(u.is_muted_at(at(10, 29)));
        assert!(!u.expire_mute(at(10, 29)));
        assert!(u.is_muted);

        assert!(!u.is_muted_at(at(10, 30)));
        assert!(u.expire_mute(at(10, 30)));
        assert!(!u.is_muted);
        assert_eq!(u.mute_reason, None);
        assert_eq!(u.mute_start, None);
        assert_eq!(u.mute_end, None);
        assert_eq!(u.mute_duration, None);
    }

    #[test]
    fn public_view_has_no_password() {
        let u = user();
        let json = serde_json::to_value(PublicUser::from(&u)).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["isAdmin"], false);
        assert_eq!(json["role"], "user");
        assert_eq!(json["isBanned"], false);
    }
}
