use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use crate::moderation::AdminPolicy;

/// Signing secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreKind,
    pub db_path: PathBuf,
    pub admin_policy: AdminPolicy,
    pub jwt_secret: String,
    pub master_key: Option<String>,
    pub dev_mode: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any variable source; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = var("ROSTER_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("ROSTER_JWT_SECRET is unset or still a placeholder");
        }

        let port = match var("ROSTER_PORT") {
            Some(p) => p.parse::<u16>().with_context(|| format!("invalid ROSTER_PORT '{}'", p))?,
            None => 3000,
        };

        let store = match var("ROSTER_STORE").as_deref() {
            None | Some("sqlite") => StoreKind::Sqlite,
            Some("memory") => StoreKind::Memory,
            Some(other) => bail!("unknown ROSTER_STORE '{}' (expected sqlite or memory)", other),
        };

        let admin_policy = match var("ROSTER_ADMIN_POLICY").as_deref() {
            None | Some("allow-list") => {
                let names = var("ROSTER_ADMIN_USERNAMES").unwrap_or_else(|| "admin".into());
                AdminPolicy::AllowList(
                    names
                        .split(',')
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .map(String::from)
                        .collect(),
                )
            }
            Some("first-user") => AdminPolicy::FirstUser,
            Some(other) => bail!(
                "unknown ROSTER_ADMIN_POLICY '{}' (expected allow-list or first-user)",
                other
            ),
        };

        let dev_mode = matches!(
            var("ROSTER_DEV_MODE").as_deref(),
            Some("1") | Some("true") | Some("yes")
        );

        Ok(Self {
            host: var("ROSTER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            store,
            db_path: var("ROSTER_DB_PATH").unwrap_or_else(|| "roster.db".into()).into(),
            admin_policy,
            jwt_secret,
            master_key: var("ROSTER_MASTER_KEY"),
            dev_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[("ROSTER_JWT_SECRET", "s3cr3t")]).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.store, StoreKind::Sqlite);
        assert_eq!(cfg.db_path, PathBuf::from("roster.db"));
        assert_eq!(cfg.admin_policy, AdminPolicy::AllowList(vec!["admin".into()]));
        assert_eq!(cfg.master_key, None);
        assert!(!cfg.dev_mode);
    }

    #[test]
    fn rejects_missing_or_placeholder_secret() {
        assert!(config(&[]).is_err());
        assert!(config(&[("ROSTER_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn explicit_settings() {
        let cfg = config(&[
            ("ROSTER_JWT_SECRET", "s3cr3t"),
            ("ROSTER_PORT", "8080"),
            ("ROSTER_STORE", "memory"),
            ("ROSTER_ADMIN_POLICY", "first-user"),
            ("ROSTER_MASTER_KEY", "mk"),
            ("ROSTER_DEV_MODE", "true"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.store, StoreKind::Memory);
        assert_eq!(cfg.admin_policy, AdminPolicy::FirstUser);
        assert_eq!(cfg.master_key.as_deref(), Some("mk"));
        assert!(cfg.dev_mode);
    }

    #[test]
    fn allow_list_parsing() {
        let cfg = config(&[
            ("ROSTER_JWT_SECRET", "s3cr3t"),
            ("ROSTER_ADMIN_USERNAMES", " root, Admin ,,ops"),
        ])
        .unwrap();
        assert_eq!(
            cfg.admin_policy,
            AdminPolicy::AllowList(vec!["root".into(), "Admin".into(), "ops".into()])
        );
    }

    #[test]
    fn rejects_unknown_values() {
        assert!(config(&[("ROSTER_JWT_SECRET", "s"), ("ROSTER_STORE", "redis")]).is_err());
        assert!(config(&[("ROSTER_JWT_SECRET", "s"), ("ROSTER_PORT", "http")]).is_err());
        assert!(config(&[("ROSTER_JWT_SECRET", "s"), ("ROSTER_ADMIN_POLICY", "all")]).is_err());
    }
}
