//! Mail transport seam.
//!
//! [`MailConnector`] opens an authenticated [`MailSession`]; the session
//! enumerates a folder and fetches raw messages. The IMAP implementation
//! lives in [`ImapConnector`](crate::ImapConnector); tests and alternative
//! transports plug in here.
//!
//! A session is a scoped resource. Wrap it in a [`SessionGuard`] and end it
//! with [`SessionGuard::close`], which logs out exactly once. A guard dropped
//! without `close` still spawns a best-effort logout.

use crate::error::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Opaque identifier of one message in a folder (an IMAP UID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub u32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fetched message, scoped to one fetch call.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Identifier the payload was fetched under.
    pub id: MessageId,
    /// Full RFC 822 payload.
    pub payload: Vec<u8>,
}

/// An authenticated mailbox session.
#[async_trait]
pub trait MailSession: Send + 'static {
    /// Selects `folder` and returns every message identifier in it.
    ///
    /// An empty folder yields an empty vector.
    async fn list_all(&mut self, folder: &str) -> Result<Vec<MessageId>>;

    /// Fetches the raw payload of one message from the selected folder.
    async fn fetch(&mut self, id: MessageId) -> Result<RawMessage>;

    /// Ends the session.
    async fn logout(&mut self) -> Result<()>;
}

/// Opens authenticated sessions.
#[async_trait]
pub trait MailConnector: Send + Sync {
    /// Session type produced by this connector.
    type Session: MailSession;

    /// Resolves the server for `address`, connects, and logs in.
    ///
    /// Transport failures and rejected credentials surface as errors in the
    /// [`Connection`](crate::ErrorCategory::Connection) and
    /// [`Auth`](crate::ErrorCategory::Auth) categories respectively.
    async fn open(&self, address: &str, secret: &SecretString) -> Result<Self::Session>;
}

/// Owns a session until it is closed.
pub struct SessionGuard<S: MailSession> {
    inner: Option<S>,
    logout_timeout: Duration,
}

impl<S: MailSession> SessionGuard<S> {
    /// Takes ownership of `session`.
    #[must_use]
    pub fn new(session: S, logout_timeout: Duration) -> Self {
        Self {
            inner: Some(session),
            logout_timeout,
        }
    }

    /// Borrows the guarded session.
    ///
    /// # Panics
    ///
    /// Never in practice: the session is only taken by `close` or `drop`,
    /// both of which consume the guard.
    pub fn session(&mut self) -> &mut S {
        self.inner.as_mut().expect("guard already consumed")
    }

    /// Logs out and consumes the guard.
    ///
    /// Logout failures and timeouts are logged and swallowed.
    pub async fn close(mut self) {
        if let Some(mut session) = self.inner.take() {
            logout_quietly(&mut session, self.logout_timeout).await;
        }
    }
}

impl<S: MailSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if let Some(mut session) = self.inner.take() {
            let logout_timeout = self.logout_timeout;

            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        logout_quietly(&mut session, logout_timeout).await;
                    });
                }
                Err(_) => {
                    warn!(
                        "SessionGuard dropped outside of tokio runtime context. \
                         Connection will be closed without proper logout."
                    );
                }
            }
        }
    }
}

impl<S: MailSession> fmt::Debug for SessionGuard<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard")
            .field("open", &self.inner.is_some())
            .field("logout_timeout", &self.logout_timeout)
            .finish()
    }
}

async fn logout_quietly<S: MailSession>(session: &mut S, logout_timeout: Duration) {
    match tokio::time::timeout(logout_timeout, session.logout()).await {
        Ok(Ok(())) => debug!("Session logged out"),
        Ok(Err(e)) => warn!(error = %e, "Session logout failed"),
        Err(_) => warn!(
            timeout_secs = logout_timeout.as_secs(),
            "Session logout timed out"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSession {
        logouts: Arc<AtomicUsize>,
        fail_logout: bool,
    }

    #[async_trait]
    impl MailSession for CountingSession {
        async fn list_all(&mut self, _folder: &str) -> Result<Vec<MessageId>> {
            Ok(vec![MessageId(1)])
        }

        async fn fetch(&mut self, id: MessageId) -> Result<RawMessage> {
            Ok(RawMessage {
                id,
                payload: Vec::new(),
            })
        }

        async fn logout(&mut self) -> Result<()> {
            self.logouts.fetch_add(1, Ordering::SeqCst);
            if self.fail_logout {
                return Err(Error::IngestionFailure {
                    message: "socket closed".into(),
                });
            }
            Ok(())
        }
    }

    fn session(fail_logout: bool) -> (CountingSession, Arc<AtomicUsize>) {
        let logouts = Arc::new(AtomicUsize::new(0));
        (
            CountingSession {
                logouts: Arc::clone(&logouts),
                fail_logout,
            },
            logouts,
        )
    }

    #[tokio::test]
    async fn test_close_logs_out_once() {
        let (session, logouts) = session(false);
        let mut guard = SessionGuard::new(session, Duration::from_secs(1));

        assert_eq!(guard.session().list_all("INBOX").await.unwrap().len(), 1);
        guard.close().await;

        assert_eq!(logouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_swallows_logout_failure() {
        let (session, logouts) = session(true);
        SessionGuard::new(session, Duration::from_secs(1)).close().await;

        assert_eq!(logouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_spawns_logout() {
        let (session, logouts) = session(false);
        drop(SessionGuard::new(session, Duration::from_secs(1)));

        // Let the spawned logout task run.
        tokio::task::yield_now().await;
        for _ in 0..10 {
            if logouts.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(logouts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_message_id_display() {
        assert_eq!(MessageId(42).to_string(), "42");
    }
}
