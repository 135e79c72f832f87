//! Key-value preferences.
//!
//! A flat `preferences` table holds the bootstrap readiness marker, the
//! persisted session, the offline profile and the app settings. Multi-key
//! writes go through [`Database::set_prefs`], which commits all keys in one
//! transaction so a partially written marker is never observable.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use ptms_shared::credential::OfflineCredential;
use ptms_shared::types::Identity;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{AppSettings, BootstrapState, OfflineProfile, StoredSession};

pub const KEY_HAS_INITIAL_AUTH: &str = "has_initial_auth";
pub const KEY_AUTH_DATE: &str = "auth_date";
pub const KEY_USER_EMAIL: &str = "user_email";
pub const KEY_CACHE_DATE: &str = "cache_date";
pub const KEY_PROJECTS_COUNT: &str = "projects_count";
pub const KEY_WORK_TYPES_COUNT: &str = "work_types_count";
pub const KEY_LAST_REFRESH: &str = "last_refresh";

pub const KEY_SESSION_TOKEN: &str = "session_token";
pub const KEY_SESSION_IDENTITY: &str = "session_identity";

pub const KEY_OFFLINE_EMAIL: &str = "offline_email";
pub const KEY_OFFLINE_PASSWORD_HASH: &str = "offline_password_hash";
pub const KEY_OFFLINE_IDENTITY: &str = "offline_identity";

pub const KEY_SETTINGS: &str = "app_settings";

const BOOTSTRAP_KEYS: [&str; 6] = [
    KEY_HAS_INITIAL_AUTH,
    KEY_AUTH_DATE,
    KEY_USER_EMAIL,
    KEY_CACHE_DATE,
    KEY_PROJECTS_COUNT,
    KEY_WORK_TYPES_COUNT,
];

const SESSION_KEYS: [&str; 2] = [KEY_SESSION_TOKEN, KEY_SESSION_IDENTITY];

impl Database {
    // ------------------------------------------------------------------
    // Raw access
    // ------------------------------------------------------------------

    pub fn get_pref(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_pref(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Write several keys atomically.
    pub fn set_prefs(&mut self, entries: &[(&str, String)]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn_mut().transaction()?;
        for (key, value) in entries {
            tx.execute(
                "INSERT OR REPLACE INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key, value, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete several keys atomically. Missing keys are ignored.
    pub fn remove_prefs(&mut self, keys: &[&str]) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        for key in keys {
            tx.execute("DELETE FROM preferences WHERE key = ?1", params![key])?;
        }
        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bootstrap marker
    // ------------------------------------------------------------------

    /// The readiness marker, or `None` when no bootstrap has completed.
    pub fn load_bootstrap_state(&self) -> Result<Option<BootstrapState>> {
        match self.get_pref(KEY_HAS_INITIAL_AUTH)?.as_deref() {
            Some("true") => {}
            _ => return Ok(None),
        }

        Ok(Some(BootstrapState {
            has_completed_initial_auth: true,
            auth_date: self.required_timestamp(KEY_AUTH_DATE)?,
            owner_identity: self.required_pref(KEY_USER_EMAIL)?,
            cached_project_count: self.required_i64(KEY_PROJECTS_COUNT)?,
            cached_work_type_count: self.required_i64(KEY_WORK_TYPES_COUNT)?,
            cache_date: self.required_timestamp(KEY_CACHE_DATE)?,
        }))
    }

    pub fn save_bootstrap_state(&mut self, state: &BootstrapState) -> Result<()> {
        self.set_prefs(&[
            (
                KEY_HAS_INITIAL_AUTH,
                state.has_completed_initial_auth.to_string(),
            ),
            (KEY_AUTH_DATE, state.auth_date.to_rfc3339()),
            (KEY_USER_EMAIL, state.owner_identity.clone()),
            (KEY_PROJECTS_COUNT, state.cached_project_count.to_string()),
            (
                KEY_WORK_TYPES_COUNT,
                state.cached_work_type_count.to_string(),
            ),
            (KEY_CACHE_DATE, state.cache_date.to_rfc3339()),
        ])
    }

    pub fn clear_bootstrap_state(&mut self) -> Result<()> {
        self.remove_prefs(&BOOTSTRAP_KEYS)
    }

    /// Time of the last manual reference-data refresh, if any.
    pub fn last_refresh(&self) -> Result<Option<DateTime<Utc>>> {
        self.get_pref(KEY_LAST_REFRESH)?
            .map(|raw| parse_timestamp(KEY_LAST_REFRESH, &raw))
            .transpose()
    }

    pub fn set_last_refresh(&self, at: DateTime<Utc>) -> Result<()> {
        self.set_pref(KEY_LAST_REFRESH, &at.to_rfc3339())
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    pub fn load_session(&self) -> Result<Option<StoredSession>> {
        let token = match self.get_pref(KEY_SESSION_TOKEN)? {
            Some(token) => token,
            None => return Ok(None),
        };
        let identity = match self.get_pref(KEY_SESSION_IDENTITY)? {
            Some(json) => serde_json::from_str(&json)?,
            None => return Ok(None),
        };
        Ok(Some(StoredSession { token, identity }))
    }

    pub fn save_session(&mut self, session: &StoredSession) -> Result<()> {
        let identity = serde_json::to_string(&session.identity)?;
        self.set_prefs(&[
            (KEY_SESSION_TOKEN, session.token.clone()),
            (KEY_SESSION_IDENTITY, identity),
        ])
    }

    pub fn clear_session(&mut self) -> Result<()> {
        self.remove_prefs(&SESSION_KEYS)
    }

    // ------------------------------------------------------------------
    // Offline profile
    // ------------------------------------------------------------------

    pub fn load_offline_profile(&self) -> Result<Option<OfflineProfile>> {
        let email = match self.get_pref(KEY_OFFLINE_EMAIL)? {
            Some(email) => email,
            None => return Ok(None),
        };

        let password_hash = self.required_pref(KEY_OFFLINE_PASSWORD_HASH)?;

        let identity: Identity =
            serde_json::from_str(&self.required_pref(KEY_OFFLINE_IDENTITY)?)?;

        Ok(Some(OfflineProfile {
            credential: OfflineCredential {
                email,
                password_hash,
            },
            identity,
        }))
    }

    pub fn save_offline_profile(&mut self, profile: &OfflineProfile) -> Result<()> {
        let identity = serde_json::to_string(&profile.identity)?;
        self.set_prefs(&[
            (KEY_OFFLINE_EMAIL, profile.credential.email.clone()),
            (
                KEY_OFFLINE_PASSWORD_HASH,
                profile.credential.password_hash.clone(),
            ),
            (KEY_OFFLINE_IDENTITY, identity),
        ])
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub fn load_settings(&self) -> Result<AppSettings> {
        match self.get_pref(KEY_SETTINGS)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(AppSettings::default()),
        }
    }

    pub fn save_settings(&self, settings: &AppSettings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        self.set_pref(KEY_SETTINGS, &json)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn required_pref(&self, key: &str) -> Result<String> {
        self.get_pref(key)?.ok_or_else(|| invalid(key, "missing value"))
    }

    fn required_i64(&self, key: &str) -> Result<i64> {
        let raw = self.required_pref(key)?;
        raw.parse::<i64>().map_err(|e| invalid(key, e))
    }

    fn required_timestamp(&self, key: &str) -> Result<DateTime<Utc>> {
        let raw = self.required_pref(key)?;
        parse_timestamp(key, &raw)
    }
}

fn parse_timestamp(key: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| invalid(key, e))
}

fn invalid(key: &str, reason: impl std::fmt::Display) -> StoreError {
    StoreError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
