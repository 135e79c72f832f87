//! Credential and bootstrap manager.
//!
//! The first sign-in on a device downloads everything the app needs to work
//! offline: the user's profile, the project list and the work types. Only when
//! all three stages succeed in the same run is the readiness marker written,
//! in one transaction, so a half-finished bootstrap is never mistaken for a
//! complete one.
//!
//! The manager is also the single writer of [`SessionState`]; screens observe
//! it through [`BootstrapManager::subscribe`].

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use ptms_net::PtmsApi;
use ptms_shared::credential::{normalize_email, OfflineCredential};
use ptms_shared::types::{AuthSession, Identity};
use ptms_shared::{PtmsError, PtmsResult};
use ptms_store::{
    BootstrapState, CacheEntity, Database, OfflineProfile, StoreError, StoredSession,
};

use crate::session::SessionState;

/// Counts reported at the end of a bootstrap or refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootstrapSummary {
    pub projects_count: usize,
    pub work_types_count: usize,
    /// Only filled by a manual refresh.
    pub time_reports_count: usize,
}

/// Progress tick emitted while bootstrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapProgress {
    pub percent: u8,
    pub stage: BootstrapStage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStage {
    SigningIn,
    SignedIn,
    LoadingProjects,
    ProjectsLoaded,
    LoadingWorkTypes,
    Complete,
}

impl BootstrapStage {
    pub fn percent(self) -> u8 {
        match self {
            BootstrapStage::SigningIn => 10,
            BootstrapStage::SignedIn => 33,
            BootstrapStage::LoadingProjects => 40,
            BootstrapStage::ProjectsLoaded => 66,
            BootstrapStage::LoadingWorkTypes => 75,
            BootstrapStage::Complete => 100,
        }
    }
}

pub struct BootstrapManager<A: PtmsApi> {
    api: Arc<A>,
    db: Arc<Mutex<Database>>,
    freshness: Duration,
    state_tx: watch::Sender<SessionState>,
}

impl<A: PtmsApi> BootstrapManager<A> {
    /// Build the manager and restore whatever session the store remembers.
    pub fn new(api: Arc<A>, db: Arc<Mutex<Database>>, freshness: Duration) -> Self {
        let initial = restore_session(&db);
        let (state_tx, _) = watch::channel(initial);
        Self {
            api,
            db,
            freshness,
            state_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Snapshot of the current session.
    pub fn current(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    pub fn database(&self) -> Arc<Mutex<Database>> {
        self.db.clone()
    }

    // ------------------------------------------------------------------
    // Readiness
    // ------------------------------------------------------------------

    /// True iff a previous bootstrap completed every stage.
    pub fn has_initial_authentication(&self) -> bool {
        match self.with_db(|db| db.load_bootstrap_state()) {
            Ok(state) => state.map(|s| s.has_completed_initial_auth).unwrap_or(false),
            Err(e) => {
                warn!(error = %e, "Failed to read bootstrap marker");
                false
            }
        }
    }

    /// Whether the cached reference data is younger than the freshness
    /// threshold. Advisory only.
    pub fn has_valid_data_cache(&self) -> bool {
        self.has_valid_data_cache_at(Utc::now())
    }

    pub fn has_valid_data_cache_at(&self, now: DateTime<Utc>) -> bool {
        let dates = self.with_db(|db| Ok((db.load_bootstrap_state()?, db.last_refresh()?)));
        let (marker, refreshed) = match dates {
            Ok(dates) => dates,
            Err(e) => {
                warn!(error = %e, "Failed to read cache dates");
                return false;
            }
        };

        let cached = marker.map(|m| m.cache_date);
        let Some(latest) = cached.max(refreshed) else {
            return false;
        };
        now.signed_duration_since(latest) <= self.freshness
    }

    // ------------------------------------------------------------------
    // Bootstrap
    // ------------------------------------------------------------------

    /// Run the three bootstrap stages in order, reporting progress.
    ///
    /// Any previous readiness marker is cleared first; it is written again
    /// only if every stage of this run succeeds.
    pub async fn perform_initial_authentication(
        &self,
        email: &str,
        password: &str,
        mut progress: impl FnMut(BootstrapProgress),
    ) -> PtmsResult<BootstrapSummary> {
        validate_credentials(email, password)?;

        self.with_db(|db| db.clear_bootstrap_state())?;
        self.state_tx.send_modify(|s| s.bootstrap = None);
        info!(email = %email.trim(), "Starting initial authentication");

        let mut report = |stage: BootstrapStage| {
            debug!(?stage, percent = stage.percent(), "Bootstrap progress");
            progress(BootstrapProgress {
                percent: stage.percent(),
                stage,
            });
        };

        // 1. profile
        report(BootstrapStage::SigningIn);
        let session = self.api.login(email.trim(), password).await?;
        let token = session.token.clone();
        let identity = self.accept_online_session(session, email, password);
        report(BootstrapStage::SignedIn);

        // 2. projects
        report(BootstrapStage::LoadingProjects);
        let projects = self.api.fetch_projects(&token).await?;
        let projects_count = self.store_snapshot(&projects);
        report(BootstrapStage::ProjectsLoaded);

        // 3. work types
        report(BootstrapStage::LoadingWorkTypes);
        let work_types = self.api.fetch_work_types(&token).await?;
        let work_types_count = self.store_snapshot(&work_types);

        let now = Utc::now();
        let marker = BootstrapState {
            has_completed_initial_auth: true,
            auth_date: now,
            owner_identity: identity.email.clone(),
            cached_project_count: projects_count as i64,
            cached_work_type_count: work_types_count as i64,
            cache_date: now,
        };
        self.with_db(|db| db.save_bootstrap_state(&marker))?;
        self.state_tx.send_modify(|s| s.bootstrap = Some(marker));
        report(BootstrapStage::Complete);

        let summary = BootstrapSummary {
            projects_count,
            work_types_count,
            time_reports_count: 0,
        };
        info!(
            user = %identity.user_id,
            projects = summary.projects_count,
            work_types = summary.work_types_count,
            "Initial authentication complete"
        );
        Ok(summary)
    }

    /// Re-download projects, work types and the user's time reports with the
    /// live session. Leaves the readiness marker alone.
    pub async fn refresh_reference_data(&self) -> PtmsResult<BootstrapSummary> {
        let (token, owner) = {
            let state = self.state_tx.borrow();
            match (&state.token, state.user_id()) {
                (Some(token), Some(owner)) if !state.offline => (token.clone(), owner),
                _ => return Err(PtmsError::Auth("no online session".into())),
            }
        };

        let projects = self.api.fetch_projects(&token).await?;
        let projects_count = self.store_snapshot(&projects);

        let work_types = self.api.fetch_work_types(&token).await?;
        let work_types_count = self.store_snapshot(&work_types);

        let reports = self.api.fetch_time_reports(&token, owner).await?;
        if let Err(e) = self.with_db(|db| db.replace_time_reports(owner, &reports)) {
            warn!(error = %e, "Failed to cache time reports");
        }

        if let Err(e) = self.with_db(|db| db.set_last_refresh(Utc::now())) {
            warn!(error = %e, "Failed to record refresh time");
        }

        let summary = BootstrapSummary {
            projects_count,
            work_types_count,
            time_reports_count: reports.len(),
        };
        info!(?summary, "Reference data refreshed");
        Ok(summary)
    }

    // ------------------------------------------------------------------
    // Sign-in / sign-out
    // ------------------------------------------------------------------

    /// Sign in online, or against the offline credential when the server
    /// cannot be reached.
    pub async fn sign_in(&self, email: &str, password: &str) -> PtmsResult<Identity> {
        validate_credentials(email, password)?;

        match self.api.login(email.trim(), password).await {
            Ok(session) => Ok(self.accept_online_session(session, email, password)),
            Err(PtmsError::Network(reason)) => {
                info!(reason = %reason, "Server unreachable, trying offline sign-in");
                self.sign_in_offline(email, password)
            }
            Err(e) => Err(e),
        }
    }

    /// Verify against the stored offline credential and restore the cached
    /// identity. Requires a completed bootstrap.
    pub fn sign_in_offline(&self, email: &str, password: &str) -> PtmsResult<Identity> {
        validate_credentials(email, password)?;

        let (marker, profile) =
            self.with_db(|db| Ok((db.load_bootstrap_state()?, db.load_offline_profile()?)))?;

        let marker = match marker {
            Some(m) if m.has_completed_initial_auth => m,
            _ => {
                return Err(PtmsError::Auth(
                    "offline sign-in needs a completed initial authentication".into(),
                ))
            }
        };
        let profile = profile
            .ok_or_else(|| PtmsError::Auth("no offline credential on this device".into()))?;

        if normalize_email(&marker.owner_identity) != profile.credential.email {
            warn!(owner = %marker.owner_identity, "Offline credential belongs to another user");
            return Err(PtmsError::Auth(
                "cached data belongs to another user; sign in online".into(),
            ));
        }

        if !profile.credential.verify(email, password) {
            warn!("Offline sign-in rejected");
            return Err(PtmsError::Auth("invalid email or password".into()));
        }

        let identity = profile.identity;
        self.state_tx.send_replace(SessionState {
            identity: Some(identity.clone()),
            token: None,
            bootstrap: Some(marker),
            offline: true,
        });
        info!(user = %identity.user_id, "Signed in offline");
        Ok(identity)
    }

    /// Forget the live session. The offline credential and cached data stay.
    pub fn logout(&self) {
        if let Err(e) = self.with_db(|db| db.clear_session()) {
            warn!(error = %e, "Failed to clear stored session");
        }
        self.state_tx.send_modify(|s| {
            s.identity = None;
            s.token = None;
            s.offline = false;
        });
        info!("Logged out");
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn accept_online_session(&self, session: AuthSession, email: &str, password: &str) -> Identity {
        let AuthSession { token, user } = session;

        let stored = StoredSession {
            token: token.clone(),
            identity: user.clone(),
        };
        let profile = match OfflineCredential::derive(email, password) {
            Ok(credential) => Some(OfflineProfile {
                credential,
                identity: user.clone(),
            }),
            Err(e) => {
                warn!(error = %e, "Offline credential not updated");
                None
            }
        };

        // cached reference data of a different user must not back this one
        let persisted = self.with_db(|db| {
            let foreign = db
                .load_bootstrap_state()?
                .is_some_and(|m| normalize_email(&m.owner_identity) != normalize_email(&user.email));
            if foreign {
                db.clear_bootstrap_state()?;
            }
            db.save_session(&stored)?;
            if let Some(profile) = &profile {
                db.save_offline_profile(profile)?;
            }
            Ok(foreign)
        });
        let foreign_marker = match persisted {
            Ok(foreign) => foreign,
            Err(e) => {
                warn!(error = %e, "Failed to persist session");
                false
            }
        };
        if foreign_marker {
            info!(user = %user.user_id, "Cleared readiness marker of previous user");
        }

        self.state_tx.send_modify(|s| {
            s.identity = Some(user.clone());
            s.token = Some(token);
            s.offline = false;
            if foreign_marker {
                s.bootstrap = None;
            }
        });
        info!(user = %user.user_id, "Signed in online");
        user
    }

    /// Replace the snapshot of `T`'s kind. Returns the number of rows
    /// actually cached afterwards, which is the previous snapshot's size when
    /// the write failed.
    fn store_snapshot<T: CacheEntity>(&self, items: &[T]) -> usize {
        let kind = T::KIND;
        match self.with_db(|db| db.replace_all(items)) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(kind = %kind, fetched = items.len(), error = %e, "Failed to cache reference data");
                self.with_db(|db| db.count(kind))
                    .map(|n| n as usize)
                    .unwrap_or(0)
            }
        }
    }

    fn with_db<R>(
        &self,
        f: impl FnOnce(&mut Database) -> Result<R, StoreError>,
    ) -> PtmsResult<R> {
        let mut guard = self
            .db
            .lock()
            .map_err(|e| PtmsError::Cache(format!("Lock poisoned: {e}")))?;
        f(&mut guard).map_err(PtmsError::from)
    }
}

fn validate_credentials(email: &str, password: &str) -> PtmsResult<()> {
    if email.trim().is_empty() {
        return Err(PtmsError::Validation("email is required".into()));
    }
    if password.is_empty() {
        return Err(PtmsError::Validation("password is required".into()));
    }
    Ok(())
}

fn restore_session(db: &Arc<Mutex<Database>>) -> SessionState {
    let Ok(guard) = db.lock() else {
        return SessionState::default();
    };
    let bootstrap = guard.load_bootstrap_state().unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring unreadable bootstrap marker");
        None
    });
    let session = guard.load_session().unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring unreadable stored session");
        None
    });

    match session {
        Some(StoredSession { token, identity }) => SessionState {
            identity: Some(identity),
            token: Some(token),
            bootstrap,
            offline: false,
        },
        None => SessionState {
            bootstrap,
            ..SessionState::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use ptms_shared::types::{ChatRoom, ChatUser, Project, TimeReport, UserId, WorkType};
    use ptms_store::CacheKind;

    #[derive(Default)]
    struct FakeApi {
        unreachable: AtomicBool,
        fail_work_types: AtomicBool,
        login_calls: AtomicUsize,
        projects: Mutex<Vec<Project>>,
    }

    fn identity() -> Identity {
        Identity {
            user_id: UserId(7),
            display_name: "Ana".into(),
            email: "ana@example.com".into(),
            role: Some("employee".into()),
            department: None,
            position: None,
            active: true,
        }
    }

    fn project(id: i64, name: &str) -> Project {
        Project {
            id,
            name: name.into(),
            code: None,
            description: None,
            status: None,
        }
    }

    #[async_trait]
    impl PtmsApi for FakeApi {
        async fn login(&self, email: &str, password: &str) -> PtmsResult<AuthSession> {
            self.login_calls.fetch_add(1, Ordering::SeqCst);
            if self.unreachable.load(Ordering::SeqCst) {
                return Err(PtmsError::Network("connection refused".into()));
            }
            let user = match (email, password) {
                ("ana@example.com", "secret") => identity(),
                ("bruno@example.com", "hunter2") => Identity {
                    user_id: UserId(8),
                    display_name: "Bruno".into(),
                    email: "bruno@example.com".into(),
                    ..identity()
                },
                _ => return Err(PtmsError::Auth("invalid credentials".into())),
            };
            Ok(AuthSession {
                token: "tok".into(),
                user,
            })
        }

        async fn fetch_projects(&self, _token: &str) -> PtmsResult<Vec<Project>> {
            Ok(self.projects.lock().unwrap().clone())
        }

        async fn fetch_work_types(&self, _token: &str) -> PtmsResult<Vec<WorkType>> {
            if self.fail_work_types.load(Ordering::SeqCst) {
                return Err(PtmsError::Server("work types unavailable".into()));
            }
            Ok(vec![
                WorkType {
                    id: 1,
                    name: "Development".into(),
                },
                WorkType {
                    id: 2,
                    name: "Meetings".into(),
                },
                WorkType {
                    id: 3,
                    name: "Support".into(),
                },
            ])
        }

        async fn fetch_time_reports(
            &self,
            _token: &str,
            owner_id: UserId,
        ) -> PtmsResult<Vec<TimeReport>> {
            Ok(vec![TimeReport {
                id: 1,
                owner_id,
                project_id: 1,
                work_type_id: 1,
                work_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
                hours: 6.5,
                description: None,
            }])
        }

        async fn fetch_chat_users(&self, _token: &str) -> PtmsResult<Vec<ChatUser>> {
            Ok(Vec::new())
        }

        async fn fetch_chat_rooms(&self, _token: &str) -> PtmsResult<Vec<ChatRoom>> {
            Ok(Vec::new())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        api: Arc<FakeApi>,
        manager: BootstrapManager<FakeApi>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("ptms.db")).unwrap();
        let api = Arc::new(FakeApi::default());
        *api.projects.lock().unwrap() = vec![project(1, "Alpha"), project(2, "Beta")];
        let manager = BootstrapManager::new(api.clone(), Arc::new(Mutex::new(db)), Duration::hours(24));
        Fixture {
            _dir: dir,
            api,
            manager,
        }
    }

    fn count(manager: &BootstrapManager<FakeApi>, kind: CacheKind) -> i64 {
        manager.database().lock().unwrap().count(kind).unwrap()
    }

    #[tokio::test]
    async fn bootstrap_reports_progress_and_marks_complete() {
        let f = fixture();
        assert!(!f.manager.has_initial_authentication());

        let mut ticks = Vec::new();
        let summary = f
            .manager
            .perform_initial_authentication("ana@example.com", "secret", |p| ticks.push(p.percent))
            .await
            .unwrap();

        assert_eq!(ticks, vec![10, 33, 40, 66, 75, 100]);
        assert_eq!(summary.projects_count, 2);
        assert_eq!(summary.work_types_count, 3);
        assert!(f.manager.has_initial_authentication());

        let state = f.manager.current();
        assert_eq!(state.user_id(), Some(UserId(7)));
        assert!(state.is_online());
        let marker = state.bootstrap.unwrap();
        assert_eq!(marker.owner_identity, "ana@example.com");
        assert_eq!(marker.cached_project_count, 2);
        assert_eq!(marker.cached_work_type_count, 3);
    }

    #[tokio::test]
    async fn failed_stage_leaves_marker_absent_and_retry_has_no_duplicates() {
        let f = fixture();
        f.api.fail_work_types.store(true, Ordering::SeqCst);

        let mut ticks = Vec::new();
        let err = f
            .manager
            .perform_initial_authentication("ana@example.com", "secret", |p| ticks.push(p.percent))
            .await
            .unwrap_err();

        assert_eq!(err, PtmsError::Server("work types unavailable".into()));
        assert_eq!(ticks, vec![10, 33, 40, 66, 75]);
        assert!(!f.manager.has_initial_authentication());
        assert_eq!(count(&f.manager, CacheKind::Project), 2);

        f.api.fail_work_types.store(false, Ordering::SeqCst);
        f.manager
            .perform_initial_authentication("ana@example.com", "secret", |_| {})
            .await
            .unwrap();

        assert!(f.manager.has_initial_authentication());
        assert_eq!(count(&f.manager, CacheKind::Project), 2);
        assert_eq!(count(&f.manager, CacheKind::WorkType), 3);
    }

    #[tokio::test]
    async fn marker_records_rows_actually_cached() {
        let f = fixture();
        // same id twice aborts the snapshot write
        *f.api.projects.lock().unwrap() = vec![project(1, "Alpha"), project(1, "Alpha again")];

        let summary = f
            .manager
            .perform_initial_authentication("ana@example.com", "secret", |_| {})
            .await
            .unwrap();

        let marker = f.manager.current().bootstrap.unwrap();
        assert_eq!(count(&f.manager, CacheKind::Project), 0);
        assert_eq!(marker.cached_project_count, 0);
        assert_eq!(summary.projects_count, 0);
        assert_eq!(marker.cached_work_type_count, 3);
        assert_eq!(count(&f.manager, CacheKind::WorkType), 3);
    }

    #[tokio::test]
    async fn new_run_clears_previous_marker() {
        let f = fixture();
        f.manager
            .perform_initial_authentication("ana@example.com", "secret", |_| {})
            .await
            .unwrap();
        assert!(f.manager.has_initial_authentication());

        let err = f
            .manager
            .perform_initial_authentication("ana@example.com", "wrong", |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PtmsError::Auth(_)));
        assert!(!f.manager.has_initial_authentication());
        assert!(!f.manager.current().has_completed_bootstrap());
    }

    #[tokio::test]
    async fn empty_credentials_are_rejected_before_any_call() {
        let f = fixture();

        let err = f
            .manager
            .perform_initial_authentication("  ", "secret", |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PtmsError::Validation(_)));

        let err = f.manager.sign_in("ana@example.com", "").await.unwrap_err();
        assert!(matches!(err, PtmsError::Validation(_)));

        assert_eq!(f.api.login_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cache_freshness_follows_latest_write() {
        let f = fixture();
        assert!(!f.manager.has_valid_data_cache());

        f.manager
            .perform_initial_authentication("ana@example.com", "secret", |_| {})
            .await
            .unwrap();
        assert!(f.manager.has_valid_data_cache());

        let later = Utc::now() + Duration::hours(25);
        assert!(!f.manager.has_valid_data_cache_at(later));

        f.manager
            .database()
            .lock()
            .unwrap()
            .set_last_refresh(Utc::now() + Duration::hours(20))
            .unwrap();
        assert!(f.manager.has_valid_data_cache_at(later));
    }

    #[tokio::test]
    async fn offline_sign_in_after_logout() {
        let f = fixture();
        f.manager
            .perform_initial_authentication("ana@example.com", "secret", |_| {})
            .await
            .unwrap();

        f.manager.logout();
        let state = f.manager.current();
        assert!(!state.is_signed_in());
        assert!(state.has_completed_bootstrap());

        f.api.unreachable.store(true, Ordering::SeqCst);
        let user = f.manager.sign_in("Ana@Example.com ", "secret").await.unwrap();
        assert_eq!(user.user_id, UserId(7));
        let state = f.manager.current();
        assert!(state.offline);
        assert!(!state.is_online());

        f.manager.logout();
        let err = f.manager.sign_in("ana@example.com", "nope").await.unwrap_err();
        assert!(matches!(err, PtmsError::Auth(_)));
        assert!(!f.manager.current().is_signed_in());
    }

    #[tokio::test]
    async fn offline_sign_in_requires_bootstrap() {
        let f = fixture();
        let err = f
            .manager
            .sign_in_offline("ana@example.com", "secret")
            .unwrap_err();
        assert!(matches!(err, PtmsError::Auth(_)));
    }

    #[tokio::test]
    async fn online_sign_in_of_another_user_drops_marker() {
        let f = fixture();
        f.manager
            .perform_initial_authentication("ana@example.com", "secret", |_| {})
            .await
            .unwrap();
        f.manager.logout();

        let bruno = f.manager.sign_in("bruno@example.com", "hunter2").await.unwrap();
        assert_eq!(bruno.user_id, UserId(8));
        assert!(!f.manager.has_initial_authentication());
        assert!(!f.manager.current().has_completed_bootstrap());

        f.manager.logout();
        f.api.unreachable.store(true, Ordering::SeqCst);
        let err = f.manager.sign_in("bruno@example.com", "hunter2").await.unwrap_err();
        assert!(matches!(err, PtmsError::Auth(_)));
        assert!(!f.manager.current().is_signed_in());
    }

    #[tokio::test]
    async fn same_user_sign_in_keeps_marker() {
        let f = fixture();
        f.manager
            .perform_initial_authentication("ana@example.com", "secret", |_| {})
            .await
            .unwrap();
        f.manager.logout();

        f.manager.sign_in("ana@example.com", "secret").await.unwrap();
        assert!(f.manager.has_initial_authentication());
        assert!(f.manager.current().has_completed_bootstrap());
    }

    #[tokio::test]
    async fn offline_credential_of_other_owner_is_rejected() {
        let f = fixture();
        f.manager
            .perform_initial_authentication("ana@example.com", "secret", |_| {})
            .await
            .unwrap();
        f.manager.logout();

        let foreign = OfflineProfile {
            credential: OfflineCredential::derive("bruno@example.com", "hunter2").unwrap(),
            identity: Identity {
                user_id: UserId(8),
                display_name: "Bruno".into(),
                email: "bruno@example.com".into(),
                ..identity()
            },
        };
        f.manager
            .database()
            .lock()
            .unwrap()
            .save_offline_profile(&foreign)
            .unwrap();

        let err = f
            .manager
            .sign_in_offline("bruno@example.com", "hunter2")
            .unwrap_err();
        assert!(matches!(err, PtmsError::Auth(_)));
        assert!(!f.manager.current().is_signed_in());
    }

    #[tokio::test]
    async fn auth_failure_does_not_fall_back_offline() {
        let f = fixture();
        f.manager
            .perform_initial_authentication("ana@example.com", "secret", |_| {})
            .await
            .unwrap();
        f.manager.logout();

        let err = f.manager.sign_in("ana@example.com", "old-password").await.unwrap_err();
        assert_eq!(err, PtmsError::Auth("invalid credentials".into()));
        assert!(!f.manager.current().offline);
    }

    #[tokio::test]
    async fn refresh_replaces_snapshots_and_keeps_marker() {
        let f = fixture();
        assert!(matches!(
            f.manager.refresh_reference_data().await,
            Err(PtmsError::Auth(_))
        ));

        f.manager
            .perform_initial_authentication("ana@example.com", "secret", |_| {})
            .await
            .unwrap();
        let marker_before = f.manager.database().lock().unwrap().load_bootstrap_state().unwrap();

        *f.api.projects.lock().unwrap() = vec![project(2, "Beta"), project(3, "Gamma"), project(4, "Delta")];
        let summary = f.manager.refresh_reference_data().await.unwrap();
        assert_eq!(summary.projects_count, 3);
        assert_eq!(summary.time_reports_count, 1);

        let db = f.manager.database();
        let db = db.lock().unwrap();
        let names: Vec<String> = db
            .get_all::<Project>()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Beta", "Delta", "Gamma"]);
        assert_eq!(db.sum_hours(UserId(7)).unwrap(), 6.5);
        assert!(db.last_refresh().unwrap().is_some());
        assert_eq!(db.load_bootstrap_state().unwrap(), marker_before);
    }

    #[tokio::test]
    async fn restored_session_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ptms.db");
        let api = Arc::new(FakeApi::default());

        {
            let db = Arc::new(Mutex::new(Database::open_at(&path).unwrap()));
            let manager = BootstrapManager::new(api.clone(), db, Duration::hours(24));
            manager
                .perform_initial_authentication("ana@example.com", "secret", |_| {})
                .await
                .unwrap();
        }

        let db = Arc::new(Mutex::new(Database::open_at(&path).unwrap()));
        let manager = BootstrapManager::new(api, db, Duration::hours(24));
        let mut rx = manager.subscribe();
        assert_eq!(rx.borrow_and_update().user_id(), Some(UserId(7)));
        assert!(manager.has_initial_authentication());

        manager.logout();
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().is_signed_in());
    }
}
