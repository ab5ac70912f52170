//! Session: the single owner of the credential pair.
//!
//! Every request reads its bearer token from here, and every refresh writes
//! back through here, so callers always see the freshest known credential.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    auth::AuthError,
    store::{CredentialStore, StoreError},
    tokens::{AccessToken, CredentialPair, CurrentUser, RefreshToken, StoredSession},
};

/// How concurrent refreshes are coordinated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshMode {
    /// One refresh exchange at a time. Callers whose rejected token was
    /// already replaced reuse the new one instead of exchanging again.
    #[default]
    Serialized,

    /// Every caller runs its own exchange; the last writer wins.
    Independent,
}

/// Tokens returned by a refresh exchange.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    /// Replacement access token.
    pub access: AccessToken,

    /// Present when the backend rotates refresh tokens.
    pub refresh: Option<RefreshToken>,
}

/// Exchanges a refresh token for a new access token.
#[automock]
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Trade `refresh_token` for fresh credentials.
    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<RefreshedTokens, AuthError>;
}

/// Why a refresh did not produce a usable access token.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Nobody is signed in.
    #[error("no session to refresh")]
    NoSession,

    /// The backend refused the refresh token.
    #[error("refresh exchange failed")]
    Rejected(#[source] AuthError),

    /// The refreshed credentials could not be persisted.
    #[error("credential storage error")]
    Storage(#[from] StoreError),
}

/// Owns the signed-in credentials and serializes changes to them.
pub struct Session {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    mode: RefreshMode,
    state: RwLock<Option<StoredSession>>,
    refresh_lock: Mutex<()>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open a session backed by `store`, restoring any persisted credentials.
    ///
    /// A store holding an unreadable session opens signed out; the next
    /// sign-in overwrites it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn open(
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        mode: RefreshMode,
    ) -> Result<Self, StoreError> {
        let stored = match store.load() {
            Ok(stored) => stored,
            Err(error @ StoreError::Format { .. }) => {
                warn!(error = %error, "ignoring unreadable stored session");

                None
            }
            Err(error) => return Err(error),
        };

        Ok(Self {
            store,
            refresher,
            mode,
            state: RwLock::new(stored),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Snapshot of the current access token.
    pub async fn access_token(&self) -> Option<AccessToken> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|session| session.credentials.access.clone())
    }

    async fn refresh_token(&self) -> Option<RefreshToken> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|session| session.credentials.refresh.clone())
    }

    /// The signed-in user, when the backend reported one.
    pub async fn current_user(&self) -> Option<CurrentUser> {
        self.state
            .read()
            .await
            .as_ref()
            .and_then(|session| session.user.clone())
    }

    /// Copy of the whole stored session.
    pub async fn snapshot(&self) -> Option<StoredSession> {
        self.state.read().await.clone()
    }

    /// Whether credentials are held.
    pub async fn is_signed_in(&self) -> bool {
        self.state.read().await.is_some()
    }

    /// Start a new session from freshly issued credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be persisted; the in-memory
    /// session is left unchanged in that case.
    pub async fn begin(
        &self,
        credentials: CredentialPair,
        user: Option<CurrentUser>,
    ) -> Result<(), StoreError> {
        let session = StoredSession {
            credentials,
            user,
            signed_in_at: Timestamp::now(),
            refreshed_at: None,
        };

        let mut state = self.state.write().await;

        let persisted = session.clone();
        self.persist(move |store| store.save(&persisted)).await?;

        *state = Some(session);

        info!("session started");

        Ok(())
    }

    /// Drop the credentials from memory and from the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be cleared. The in-memory
    /// session is dropped regardless.
    pub async fn end(&self) -> Result<(), StoreError> {
        let previous = self.state.write().await.take();

        if previous.is_some() {
            info!("session ended");
        }

        self.persist(|store| store.clear()).await
    }

    /// Run a store operation on the blocking pool.
    async fn persist<F>(&self, operation: F) -> Result<(), StoreError>
    where
        F: FnOnce(&dyn CredentialStore) -> Result<(), StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);

        tokio::task::spawn_blocking(move || operation(store.as_ref())).await?
    }

    /// Obtain a new access token after `rejected` was refused by the server.
    ///
    /// In [`RefreshMode::Serialized`], a call that finds the current token
    /// already differs from `rejected` returns immediately: another caller
    /// refreshed while this one waited.
    ///
    /// # Errors
    ///
    /// Returns an error when there is no session, the exchange is rejected,
    /// or the new token cannot be persisted.
    pub async fn refresh(&self, rejected: Option<&AccessToken>) -> Result<(), RefreshError> {
        match self.mode {
            RefreshMode::Serialized => {
                let _guard = self.refresh_lock.lock().await;

                let current = self.access_token().await;

                if current.is_some() && current.as_ref() != rejected {
                    debug!("access token already refreshed by a concurrent call");

                    return Ok(());
                }

                self.exchange().await
            }
            RefreshMode::Independent => self.exchange().await,
        }
    }

    async fn exchange(&self) -> Result<(), RefreshError> {
        let refresh_token = self.refresh_token().await.ok_or(RefreshError::NoSession)?;

        info!("refreshing access token");

        let refreshed = self
            .refresher
            .refresh(&refresh_token)
            .await
            .map_err(RefreshError::Rejected)?;

        let mut state = self.state.write().await;

        // Ended by a concurrent sign-out while the exchange was in flight.
        let Some(session) = state.as_mut() else {
            return Err(RefreshError::NoSession);
        };

        session.credentials.access = refreshed.access;

        if let Some(refresh) = refreshed.refresh {
            session.credentials.refresh = refresh;
        }

        session.refreshed_at = Some(Timestamp::now());

        let persisted = session.clone();
        self.persist(move |store| store.save(&persisted)).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::{
        errors::ApiError,
        store::{FileCredentialStore, MemoryCredentialStore, MockCredentialStore},
    };

    use super::*;

    fn stored(access: &str, refresh: &str) -> StoredSession {
        StoredSession {
            credentials: CredentialPair {
                access: AccessToken::new(access),
                refresh: RefreshToken::new(refresh),
            },
            user: None,
            signed_in_at: Timestamp::UNIX_EPOCH,
            refreshed_at: None,
        }
    }

    fn open(
        store: &Arc<MemoryCredentialStore>,
        refresher: MockTokenRefresher,
        mode: RefreshMode,
    ) -> Result<Session, StoreError> {
        Session::open(store.clone(), Arc::new(refresher), mode)
    }

    #[tokio::test]
    async fn open_restores_persisted_session() -> TestResult {
        let store = Arc::new(MemoryCredentialStore::new(Some(stored("a1", "r1"))));
        let session = open(&store, MockTokenRefresher::new(), RefreshMode::Serialized)?;

        assert!(session.is_signed_in().await);
        assert_eq!(session.access_token().await, Some(AccessToken::new("a1")));

        Ok(())
    }

    #[tokio::test]
    async fn open_treats_truncated_session_file_as_signed_out() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("session.json");

        std::fs::write(&path, r#"{"credentials":{"acc"#)?;

        let store = Arc::new(FileCredentialStore::new(&path));
        let session = Session::open(
            store.clone(),
            Arc::new(MockTokenRefresher::new()),
            RefreshMode::Serialized,
        )?;

        assert!(!session.is_signed_in().await);

        session.begin(stored("a1", "r1").credentials, None).await?;

        let reloaded = store.load()?.ok_or("sign-in should overwrite the file")?;

        assert_eq!(reloaded.credentials.access, AccessToken::new("a1"));

        Ok(())
    }

    #[test]
    fn open_fails_when_store_is_unreadable() {
        let mut store = MockCredentialStore::new();

        store.expect_load().once().returning(|| {
            Err(StoreError::Io {
                path: "session.json".into(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            })
        });

        let result = Session::open(
            Arc::new(store),
            Arc::new(MockTokenRefresher::new()),
            RefreshMode::Serialized,
        );

        assert!(
            matches!(result, Err(StoreError::Io { .. })),
            "expected Io error, got {result:?}"
        );
    }

    #[tokio::test]
    async fn refresh_replaces_access_token_and_persists() -> TestResult {
        let store = Arc::new(MemoryCredentialStore::new(Some(stored("a1", "r1"))));
        let mut refresher = MockTokenRefresher::new();

        refresher
            .expect_refresh()
            .once()
            .withf(|token| token.expose() == "r1")
            .returning(|_| {
                Ok(RefreshedTokens {
                    access: AccessToken::new("a2"),
                    refresh: None,
                })
            });

        let session = open(&store, refresher, RefreshMode::Serialized)?;

        session.refresh(Some(&AccessToken::new("a1"))).await?;

        let persisted = store.load()?.ok_or("session should be persisted")?;

        assert_eq!(persisted.credentials.access, AccessToken::new("a2"));
        assert_eq!(persisted.credentials.refresh, RefreshToken::new("r1"));
        assert!(persisted.refreshed_at.is_some());
        assert_eq!(session.access_token().await, Some(AccessToken::new("a2")));

        Ok(())
    }

    #[tokio::test]
    async fn refresh_accepts_rotated_refresh_token() -> TestResult {
        let store = Arc::new(MemoryCredentialStore::new(Some(stored("a1", "r1"))));
        let mut refresher = MockTokenRefresher::new();

        refresher.expect_refresh().once().returning(|_| {
            Ok(RefreshedTokens {
                access: AccessToken::new("a2"),
                refresh: Some(RefreshToken::new("r2")),
            })
        });

        let session = open(&store, refresher, RefreshMode::Independent)?;

        session.refresh(Some(&AccessToken::new("a1"))).await?;

        let persisted = store.load()?.ok_or("session should be persisted")?;

        assert_eq!(persisted.credentials.refresh, RefreshToken::new("r2"));

        Ok(())
    }

    #[tokio::test]
    async fn refresh_without_session_skips_exchange() -> TestResult {
        let store = Arc::new(MemoryCredentialStore::default());
        let mut refresher = MockTokenRefresher::new();

        refresher.expect_refresh().never();

        let session = open(&store, refresher, RefreshMode::Serialized)?;
        let result = session.refresh(None).await;

        assert!(
            matches!(result, Err(RefreshError::NoSession)),
            "expected NoSession, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn rejected_exchange_reports_api_error() -> TestResult {
        let store = Arc::new(MemoryCredentialStore::new(Some(stored("a1", "r1"))));
        let mut refresher = MockTokenRefresher::new();

        refresher
            .expect_refresh()
            .once()
            .returning(|_| Err(ApiError::new(401, "token expired").into()));

        let session = open(&store, refresher, RefreshMode::Serialized)?;
        let result = session.refresh(Some(&AccessToken::new("a1"))).await;

        assert!(
            matches!(&result, Err(RefreshError::Rejected(AuthError::Api(error))) if error.status == 401),
            "expected Rejected, got {result:?}"
        );
        assert_eq!(session.access_token().await, Some(AccessToken::new("a1")));

        Ok(())
    }

    #[tokio::test]
    async fn serialized_refresh_skips_already_replaced_token() -> TestResult {
        let store = Arc::new(MemoryCredentialStore::new(Some(stored("a2", "r1"))));
        let mut refresher = MockTokenRefresher::new();

        refresher.expect_refresh().never();

        let session = open(&store, refresher, RefreshMode::Serialized)?;

        session.refresh(Some(&AccessToken::new("a1"))).await?;

        assert_eq!(session.access_token().await, Some(AccessToken::new("a2")));

        Ok(())
    }

    #[tokio::test]
    async fn independent_refresh_always_exchanges() -> TestResult {
        let store = Arc::new(MemoryCredentialStore::new(Some(stored("a2", "r1"))));
        let mut refresher = MockTokenRefresher::new();

        refresher.expect_refresh().once().returning(|_| {
            Ok(RefreshedTokens {
                access: AccessToken::new("a3"),
                refresh: None,
            })
        });

        let session = open(&store, refresher, RefreshMode::Independent)?;

        session.refresh(Some(&AccessToken::new("a1"))).await?;

        assert_eq!(session.access_token().await, Some(AccessToken::new("a3")));

        Ok(())
    }

    #[tokio::test]
    async fn begin_keeps_previous_state_when_persist_fails() -> TestResult {
        let mut store = MockCredentialStore::new();

        store.expect_load().once().returning(|| Ok(None));
        store.expect_save().once().returning(|_| {
            Err(StoreError::Io {
                path: "session.json".into(),
                source: std::io::Error::other("disk full"),
            })
        });
        store.expect_clear().never();

        let session = Session::open(
            Arc::new(store),
            Arc::new(MockTokenRefresher::new()),
            RefreshMode::Serialized,
        )?;

        let result = session.begin(stored("a1", "r1").credentials, None).await;

        assert!(
            matches!(result, Err(StoreError::Io { .. })),
            "expected Io error, got {result:?}"
        );
        assert!(!session.is_signed_in().await);

        Ok(())
    }

    #[tokio::test]
    async fn begin_and_end_update_store() -> TestResult {
        let store = Arc::new(MemoryCredentialStore::default());
        let session = open(&store, MockTokenRefresher::new(), RefreshMode::Serialized)?;

        session
            .begin(
                stored("a1", "r1").credentials,
                Some(CurrentUser {
                    name: Some("Ada".to_string()),
                    ..CurrentUser::default()
                }),
            )
            .await?;

        assert!(store.load()?.is_some());
        assert_eq!(
            session.current_user().await.map(|user| user.name),
            Some(Some("Ada".to_string()))
        );

        session.end().await?;

        assert!(store.load()?.is_none());
        assert!(!session.is_signed_in().await);

        Ok(())
    }
}
