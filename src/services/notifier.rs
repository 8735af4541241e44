use crate::domain::auth::ReasonCode;
use crate::domain::notice::{
    INVALID_SESSION_NOTICE, Notice, REFRESH_FAILED_NOTICE, REFRESH_SUCCEEDED_NOTICE, SESSION_EXPIRED_NOTICE,
};
use crate::error::RefreshFailure;
use crate::storage::token_store::TokenStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Sends the user back to the re-authentication entry point.
pub trait Redirector: Send + Sync + std::fmt::Debug {
    fn redirect(&self, target: &str);
}

/// Turns auth failures into notices and, for session-ending failures, a
/// logout followed by a delayed redirect.
#[derive(Clone, Debug)]
pub struct FailureNotifier {
    notices: broadcast::Sender<Notice>,
    token_store: TokenStore,
    redirector: Arc<dyn Redirector>,
    login_target: String,
    redirect_delay: Duration,
    redirect_pending: Arc<AtomicBool>,
    redirect_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl FailureNotifier {
    #[must_use]
    pub fn new(
        token_store: TokenStore,
        redirector: Arc<dyn Redirector>,
        login_target: String,
        redirect_delay: Duration,
        capacity: usize,
    ) -> Self {
        let (notices, _) = broadcast::channel(capacity.max(1));
        Self {
            notices,
            token_store,
            redirector,
            login_target,
            redirect_delay,
            redirect_pending: Arc::new(AtomicBool::new(false)),
            redirect_task: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn publish(&self, notice: Notice) {
        // No subscribers is fine; notices are best effort.
        let _ = self.notices.send(notice);
    }

    /// Non-fatal server message on a 401. No logout.
    pub fn warn(&self, message: &str) {
        tracing::debug!(text = %message, "Surfacing unauthorized response message");
        self.publish(Notice::warning(message));
    }

    pub fn refresh_succeeded(&self, silent: bool) {
        if !silent {
            self.publish(Notice::success(REFRESH_SUCCEEDED_NOTICE));
        }
    }

    /// Handles a session-ending reason code: notice, clear, redirect.
    #[tracing::instrument(skip(self), fields(reason = %reason))]
    pub async fn session_ended(&self, reason: &ReasonCode) {
        let message = match reason {
            ReasonCode::InvalidRefreshToken | ReasonCode::SessionInvalidated => INVALID_SESSION_NOTICE,
            ReasonCode::NoRefreshToken | ReasonCode::SessionExpired => SESSION_EXPIRED_NOTICE,
            ReasonCode::TokenExpired | ReasonCode::Other(_) => REFRESH_FAILED_NOTICE,
        };
        tracing::warn!("Session ended by server");
        self.force_logout(message).await;
    }

    /// Handles a failed refresh. Rejections carrying a session-ending code use
    /// that code's notice; everything else gets the generic one.
    #[tracing::instrument(skip(self, failure), fields(failure = %failure))]
    pub async fn refresh_failed(&self, failure: &RefreshFailure) {
        match failure.reason() {
            Some(reason) if reason.is_session_ending() => self.session_ended(reason).await,
            _ => {
                tracing::warn!("Session refresh failed");
                self.force_logout(REFRESH_FAILED_NOTICE).await;
            }
        }
    }

    async fn force_logout(&self, message: &str) {
        self.publish(Notice::error(message));
        self.token_store.clear().await;
        self.schedule_redirect();
    }

    fn schedule_redirect(&self) {
        if self.redirect_pending.swap(true, Ordering::AcqRel) {
            tracing::debug!("Redirect already scheduled");
            return;
        }

        let redirector = Arc::clone(&self.redirector);
        let target = self.login_target.clone();
        let delay = self.redirect_delay;
        let pending = Arc::clone(&self.redirect_pending);

        let task = tokio::spawn(
            async move {
                tokio::time::sleep(delay).await;
                redirector.redirect(&target);
                pending.store(false, Ordering::Release);
            }
            .instrument(tracing::info_span!("login_redirect")),
        );
        *self.redirect_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    /// Waits until a scheduled login redirect has fired. Returns at once when
    /// none is pending.
    pub async fn wait_for_redirect(&self) {
        let task = self.redirect_task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "Login redirect task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notice::NoticeLevel;
    use crate::domain::token::AccessToken;
    use crate::storage::MemoryTokenPersistence;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingRedirector {
        targets: Mutex<Vec<String>>,
    }

    impl Redirector for RecordingRedirector {
        fn redirect(&self, target: &str) {
            self.targets.lock().unwrap().push(target.to_string());
        }
    }

    async fn setup() -> (FailureNotifier, TokenStore, Arc<RecordingRedirector>) {
        let store = TokenStore::new(Arc::new(MemoryTokenPersistence::default()));
        store.save(AccessToken::new("abc").unwrap()).await;
        let redirector = Arc::new(RecordingRedirector::default());
        let notifier = FailureNotifier::new(
            store.clone(),
            Arc::clone(&redirector) as Arc<dyn Redirector>,
            "/login".to_string(),
            Duration::from_millis(20),
            8,
        );
        (notifier, store, redirector)
    }

    #[tokio::test]
    async fn test_session_end_clears_and_redirects_once() {
        let (notifier, store, redirector) = setup().await;
        let mut rx = notifier.subscribe();

        notifier.session_ended(&ReasonCode::SessionExpired).await;
        notifier.session_ended(&ReasonCode::SessionInvalidated).await;

        assert!(store.current().is_none());
        assert_eq!(rx.recv().await.unwrap(), Notice::error(SESSION_EXPIRED_NOTICE));
        assert_eq!(rx.recv().await.unwrap(), Notice::error(INVALID_SESSION_NOTICE));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*redirector.targets.lock().unwrap(), vec!["/login".to_string()]);
    }

    #[tokio::test]
    async fn test_wait_for_redirect_blocks_until_fired() {
        let (notifier, _, redirector) = setup().await;

        notifier.wait_for_redirect().await;
        assert!(redirector.targets.lock().unwrap().is_empty());

        notifier.session_ended(&ReasonCode::NoRefreshToken).await;
        notifier.wait_for_redirect().await;
        assert_eq!(*redirector.targets.lock().unwrap(), vec!["/login".to_string()]);
    }

    #[tokio::test]
    async fn test_warning_keeps_session() {
        let (notifier, store, redirector) = setup().await;
        let mut rx = notifier.subscribe();

        notifier.warn("Household limit reached");

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert_eq!(notice.message, "Household limit reached");
        assert!(store.current().is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(redirector.targets.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_failure_notices() {
        let (notifier, store, _) = setup().await;
        let mut rx = notifier.subscribe();

        notifier.refresh_failed(&RefreshFailure::Transport("connection refused".to_string())).await;
        assert_eq!(rx.recv().await.unwrap(), Notice::error(REFRESH_FAILED_NOTICE));
        assert!(store.current().is_none());

        let rejected = RefreshFailure::Rejected {
            status: 401,
            code: Some(ReasonCode::InvalidRefreshToken),
            message: None,
        };
        notifier.refresh_failed(&rejected).await;
        assert_eq!(rx.recv().await.unwrap(), Notice::error(INVALID_SESSION_NOTICE));
    }

    #[tokio::test]
    async fn test_silent_refresh_is_quiet() {
        let (notifier, _, _) = setup().await;
        let mut rx = notifier.subscribe();

        notifier.refresh_succeeded(true);
        notifier.refresh_succeeded(false);

        assert_eq!(rx.recv().await.unwrap(), Notice::success(REFRESH_SUCCEEDED_NOTICE));
        assert!(rx.try_recv().is_err());
    }
}
