use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use roster_db::UserStore;
use roster_types::models::{
    DEFAULT_BAN_REASON, DEFAULT_MUTE_MINUTES, PublicUser, Role, UserRecord, UserStats,
};

use crate::error::{ModerationError, ModerationResult};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// How a new account's role is decided. One policy per deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminPolicy {
    /// The first account created in an empty store is the admin.
    FirstUser,
    /// Usernames matching (case-insensitively) an entry become admins.
    AllowList(Vec<String>),
}

impl AdminPolicy {
    fn role_for(&self, username: &str, store_is_empty: bool) -> Role {
        let admin = match self {
            AdminPolicy::FirstUser => store_is_empty,
            AdminPolicy::AllowList(names) => {
                let wanted = username.to_lowercase();
                names.iter().any(|n| n.to_lowercase() == wanted)
            }
        };
        if admin { Role::Admin } else { Role::User }
    }
}

/// Identity of a caller whose bearer token has already been verified.
#[derive(Debug, Clone)]
pub struct Caller {
    pub id: String,
    pub username: String,
}

/// Account lifecycle and moderation transitions over a [`UserStore`].
///
/// Every read-modify-write runs under `write_lock`, so two transitions on the
/// same record cannot interleave. Read-only scans skip it.
pub struct ModerationService {
    store: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    policy: AdminPolicy,
    master_key: Option<String>,
    write_lock: Mutex<()>,
}

impl ModerationService {
    pub fn new(
        store: Arc<dyn UserStore>,
        clock: Arc<dyn Clock>,
        policy: AdminPolicy,
        master_key: Option<String>,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
            master_key,
            write_lock: Mutex::new(()),
        }
    }

    pub fn register(&self, username: &str, password: &str) -> ModerationResult<PublicUser> {
        if username.is_empty() || password.is_empty() {
            return Err(ModerationError::InvalidInput("username and password are required".into()));
        }
        if username.chars().count() < MIN_USERNAME_LEN {
            return Err(ModerationError::InvalidInput("username must be at least 3 characters".into()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ModerationError::InvalidInput("password must be at least 6 characters".into()));
        }

        let _guard = self.lock()?;

        if self.store.get(username)?.is_some() {
            return Err(ModerationError::Conflict(username.to_string()));
        }

        let store_is_empty = match self.policy {
            AdminPolicy::FirstUser => self.store.is_empty()?,
            AdminPolicy::AllowList(_) => false,
        };
        let role = self.policy.role_for(username, store_is_empty);

        let user = UserRecord::new(
            username.to_string(),
            password.to_string(),
            role,
            self.clock.now(),
        );
        self.store.put(username, &user)?;

        info!("Registered {} ({:?})", username, role);
        Ok(PublicUser::from(&user))
    }

    pub fn authenticate(&self, username: &str, password: &str) -> ModerationResult<PublicUser> {
        let _guard = self.lock()?;

        let mut user = self
            .store
            .get(username)?
            .ok_or_else(|| ModerationError::NotFound(username.to_string()))?;

        if user.password != password {
            return Err(ModerationError::InvalidCredentials);
        }
        if user.is_banned {
            return Err(ModerationError::Forbidden {
                reason: user
                    .ban_reason
                    .clone()
                    .unwrap_or_else(|| DEFAULT_BAN_REASON.to_string()),
            });
        }

        let now = self.clock.now();
        if user.expire_mute(now) {
            info!("Mute on {} expired", username);
        }
        user.last_login = Some(now);
        self.store.put(username, &user)?;

        Ok(PublicUser::from(&user))
    }

    pub fn ban(
        &self,
        caller: &Caller,
        target: &str,
        reason: Option<&str>,
    ) -> ModerationResult<PublicUser> {
        let user = self.transition(caller, target, |user, now| {
            if user.is_admin() {
                return Err(ModerationError::InvalidOperation("cannot ban an admin"));
            }
            user.apply_ban(reason, now);
            Ok(())
        })?;
        info!(
            "{} banned {} ({})",
            caller.username,
            target,
            user.ban_reason.as_deref().unwrap_or_default()
        );
        Ok(user)
    }

    pub fn unban(&self, caller: &Caller, target: &str) -> ModerationResult<PublicUser> {
        let user = self.transition(caller, target, |user, _| {
            user.clear_ban();
            Ok(())
        })?;
        info!("{} unbanned {}", caller.username, target);
        Ok(user)
    }

    /// Defaults to [`DEFAULT_MUTE_MINUTES`] when no duration is given.
    pub fn mute(
        &self,
        caller: &Caller,
        target: &str,
        reason: Option<&str>,
        duration_minutes: Option<u32>,
    ) -> ModerationResult<PublicUser> {
        let minutes = duration_minutes.unwrap_or(DEFAULT_MUTE_MINUTES);
        if minutes == 0 {
            return Err(ModerationError::InvalidInput("mute duration must be positive".into()));
        }

        let user = self.transition(caller, target, |user, now| {
            user.apply_mute(reason, minutes, now);
            Ok(())
        })?;
        info!("{} muted {} for {} minutes", caller.username, target, minutes);
        Ok(user)
    }

    pub fn unmute(&self, caller: &Caller, target: &str) -> ModerationResult<PublicUser> {
        let user = self.transition(caller, target, |user, _| {
            user.clear_mute();
            Ok(())
        })?;
        info!("{} unmuted {}", caller.username, target);
        Ok(user)
    }

    pub fn list_users(&self, caller: &Caller) -> ModerationResult<Vec<PublicUser>> {
        self.require_admin(caller)?;

        let now = self.clock.now();
        let mut users: Vec<PublicUser> = self
            .store
            .list()?
            .into_iter()
            .map(|mut user| {
                user.expire_mute(now);
                PublicUser::from(&user)
            })
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    pub fn stats(&self) -> ModerationResult<UserStats> {
        let now = self.clock.now();
        let stats = self
            .store
            .list()?
            .iter()
            .fold(UserStats::default(), |mut stats, user| {
                stats.total += 1;
                stats.admins += usize::from(user.is_admin());
                stats.banned += usize::from(user.is_banned);
                stats.muted += usize::from(user.is_muted_at(now));
                stats
            });
        Ok(stats)
    }

    /// Grants admin. There is no way back. A banned account must be unbanned
    /// first, since admins are never banned.
    pub fn promote(&self, master_key: &str, target: &str) -> ModerationResult<PublicUser> {
        self.check_master_key(master_key)?;
        let _guard = self.lock()?;

        let mut user = self.load(target)?;
        if user.is_banned {
            return Err(ModerationError::InvalidOperation("cannot promote a banned user"));
        }
        user.promote();
        self.store.put(target, &user)?;

        info!("Promoted {} to admin", target);
        Ok(PublicUser::from(&user))
    }

    /// Wipes every account. Returns how many were removed.
    pub fn clear_all(&self, master_key: &str) -> ModerationResult<usize> {
        self.check_master_key(master_key)?;
        let _guard = self.lock()?;

        let removed = self.store.delete_all()?;
        warn!("Cleared user store ({} accounts removed)", removed);
        Ok(removed)
    }

    /// Admin-gated read-modify-write of one record. `apply` either mutates the
    /// record or fails; nothing is written on failure.
    fn transition<F>(&self, caller: &Caller, target: &str, apply: F) -> ModerationResult<PublicUser>
    where
        F: FnOnce(&mut UserRecord, DateTime<Utc>) -> ModerationResult<()>,
    {
        let _guard = self.lock()?;
        self.require_admin(caller)?;

        let mut user = self.load(target)?;
        apply(&mut user, self.clock.now())?;
        self.store.put(target, &user)?;

        Ok(PublicUser::from(&user))
    }

    /// The caller's stored record must still exist under the same id and
    /// hold the admin role.
    fn require_admin(&self, caller: &Caller) -> ModerationResult<UserRecord> {
        match self.store.get(&caller.username)? {
            Some(user) if user.id == caller.id && user.is_admin() && !user.is_banned => Ok(user),
            _ => {
                warn!("Rejected admin action from {}", caller.username);
                Err(ModerationError::Unauthorized)
            }
        }
    }

    fn check_master_key(&self, supplied: &str) -> ModerationResult<()> {
        match &self.master_key {
            Some(key) if key == supplied => Ok(()),
            _ => {
                warn!("Rejected master key");
                Err(ModerationError::Unauthorized)
            }
        }
    }

    fn load(&self, username: &str) -> ModerationResult<UserRecord> {
        self.store
            .get(username)?
            .ok_or_else(|| ModerationError::NotFound(username.to_string()))
    }

    fn lock(&self) -> ModerationResult<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|e| ModerationError::Internal(anyhow::anyhow!("Write lock poisoned: {}", e)))
    }
}
