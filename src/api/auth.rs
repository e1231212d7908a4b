//! Bearer-token session handling.
//!
//! Tokens have a fixed validity window. [`SessionStore`] logs in lazily,
//! renews the token once it enters the renewal window, and
//! [`with_auth_retry`] gives every authenticated call exactly one
//! refresh-and-retry when the backend answers 401.
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::ApiError;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(token: String, issued_at: DateTime<Utc>, validity: Duration) -> Self {
        Self {
            token,
            issued_at,
            expires_at: issued_at + validity,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// True once fewer than `lead` remain before expiry.
    pub fn renewal_due(&self, now: DateTime<Utc>, lead: Duration) -> bool {
        now + lead >= self.expires_at
    }
}

#[async_trait]
pub trait Login: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<String, ApiError>;
}

#[async_trait]
pub trait TokenSource: Send + Sync {
    /// A token that is valid right now, logging in or renewing if needed.
    async fn token(&self) -> Result<String, ApiError>;

    /// Discard the current token and obtain a fresh one.
    async fn refresh(&self) -> Result<String, ApiError>;
}

pub struct SessionStore<L> {
    login: L,
    credentials: Credentials,
    validity: Duration,
    renew_before: Duration,
    current: Mutex<Option<Session>>,
}

impl<L> fmt::Debug for SessionStore<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("username", &self.credentials.username)
            .field("validity", &self.validity)
            .finish_non_exhaustive()
    }
}

impl<L: Login> SessionStore<L> {
    pub fn new(login: L, credentials: Credentials, validity: Duration, renew_before: Duration) -> Self {
        Self {
            login,
            credentials,
            validity,
            renew_before,
            current: Mutex::new(None),
        }
    }

    pub async fn current(&self) -> Option<Session> {
        self.current.lock().await.clone()
    }

    async fn log_in(&self, slot: &mut Option<Session>) -> Result<String, ApiError> {
        let token = match self.login.login(&self.credentials).await {
            Ok(token) => token,
            Err(ApiError::Unauthorized(msg)) => {
                *slot = None;
                return Err(ApiError::ReloginRequired(msg));
            }
            Err(err) => return Err(err),
        };
        let session = Session::new(token.clone(), Utc::now(), self.validity);
        info!(username = %self.credentials.username, expires_at = %session.expires_at, "logged in");
        *slot = Some(session);
        Ok(token)
    }
}

#[async_trait]
impl<L: Login> TokenSource for SessionStore<L> {
    async fn token(&self) -> Result<String, ApiError> {
        let mut guard = self.current.lock().await;
        if let Some(session) = guard.as_ref() {
            if !session.renewal_due(Utc::now(), self.renew_before) {
                return Ok(session.token.clone());
            }
            info!(expires_at = %session.expires_at, "session about to expire; renewing");
        }
        self.log_in(&mut guard).await
    }

    async fn refresh(&self) -> Result<String, ApiError> {
        let mut guard = self.current.lock().await;
        *guard = None;
        self.log_in(&mut guard).await
    }
}

/// Run an authenticated call, refreshing the token and retrying once on 401.
/// A second 401 means the stored credentials no longer work.
pub async fn with_auth_retry<T, F, Fut>(tokens: &dyn TokenSource, mut call: F) -> Result<T, ApiError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let token = tokens.token().await?;
    match call(token).await {
        Err(ApiError::Unauthorized(msg)) => {
            warn!(%msg, "request rejected as unauthorized; refreshing token");
            let token = tokens.refresh().await?;
            match call(token).await {
                Err(ApiError::Unauthorized(msg)) => Err(ApiError::ReloginRequired(msg)),
                other => other,
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingLogin {
        calls: AtomicUsize,
        reject: bool,
    }

    #[async_trait]
    impl Login for CountingLogin {
        async fn login(&self, _credentials: &Credentials) -> Result<String, ApiError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.reject {
                return Err(ApiError::Unauthorized("Credenciales incorrectas".into()));
            }
            Ok(format!("token-{}", n))
        }
    }

    fn creds() -> Credentials {
        Credentials {
            username: "admin".into(),
            password: "secret".into(),
        }
    }

    fn store(login: CountingLogin, renew_minutes: i64) -> SessionStore<CountingLogin> {
        SessionStore::new(login, creds(), Duration::minutes(30), Duration::minutes(renew_minutes))
    }

    #[test]
    fn session_window() {
        let t0 = Utc::now();
        let s = Session::new("t".into(), t0, Duration::minutes(30));
        assert!(!s.is_expired(t0 + Duration::minutes(29)));
        assert!(s.is_expired(t0 + Duration::minutes(30)));
        assert!(!s.renewal_due(t0 + Duration::minutes(24), Duration::minutes(5)));
        assert!(s.renewal_due(t0 + Duration::minutes(25), Duration::minutes(5)));
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let text = format!("{:?}", creds());
        assert!(text.contains("admin"));
        assert!(!text.contains("secret"));
    }

    #[tokio::test]
    async fn token_is_cached_until_renewal_window() {
        let store = store(CountingLogin::default(), 5);
        assert_eq!(store.token().await.unwrap(), "token-1");
        assert_eq!(store.token().await.unwrap(), "token-1");
        assert_eq!(store.login.calls.load(Ordering::SeqCst), 1);
        assert!(store.current().await.is_some());
    }

    #[tokio::test]
    async fn token_renews_inside_window() {
        // A renewal window as long as the validity makes every token due at once.
        let store = store(CountingLogin::default(), 30);
        assert_eq!(store.token().await.unwrap(), "token-1");
        assert_eq!(store.token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn rejected_login_requires_relogin() {
        let store = store(CountingLogin { reject: true, ..Default::default() }, 5);
        let err = store.token().await.unwrap_err();
        assert!(matches!(err, ApiError::ReloginRequired(_)));
        assert!(store.current().await.is_none());
    }

    struct Scripted {
        responses: Arc<tokio::sync::Mutex<VecDeque<Result<u32, ApiError>>>>,
        seen: Arc<tokio::sync::Mutex<Vec<String>>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<u32, ApiError>>) -> Self {
            Self {
                responses: Arc::new(tokio::sync::Mutex::new(VecDeque::from(responses))),
                seen: Arc::default(),
            }
        }

        async fn call(&self, token: String) -> Result<u32, ApiError> {
            self.seen.lock().await.push(token);
            self.responses.lock().await.pop_front().unwrap_or(Ok(0))
        }
    }

    #[tokio::test]
    async fn retries_once_after_unauthorized() {
        let store = store(CountingLogin::default(), 5);
        let script = Scripted::new(vec![Err(ApiError::Unauthorized("expired".into())), Ok(7)]);
        let out = with_auth_retry(&store, |t| script.call(t)).await.unwrap();
        assert_eq!(out, 7);
        assert_eq!(*script.seen.lock().await, vec!["token-1", "token-2"]);
    }

    #[tokio::test]
    async fn second_unauthorized_forces_relogin() {
        let store = store(CountingLogin::default(), 5);
        let script = Scripted::new(vec![
            Err(ApiError::Unauthorized("expired".into())),
            Err(ApiError::Unauthorized("still expired".into())),
        ]);
        let err = with_auth_retry(&store, |t| script.call(t)).await.unwrap_err();
        assert!(matches!(err, ApiError::ReloginRequired(_)));
        assert_eq!(script.seen.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let store = store(CountingLogin::default(), 5);
        let script = Scripted::new(vec![Err(ApiError::Network("connection reset".into()))]);
        let err = with_auth_retry(&store, |t| script.call(t)).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(script.seen.lock().await.len(), 1);
        assert_eq!(store.login.calls.load(Ordering::SeqCst), 1);
    }
}
