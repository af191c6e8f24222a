//! Internal IMAP session management.
//!
//! This module wraps async-imap operations with proper error handling.

use crate::connection::TlsStream;
use crate::error::{Error, Result};
use async_imap::Session;
use futures::TryStreamExt;
use tracing::{debug, instrument};

/// Type alias for IMAP session over TLS.
pub(crate) type ImapSession = Session<TlsStream>;

/// Authentication configuration for IMAP.
pub(crate) struct AuthConfig<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Authenticates to IMAP server and returns a session.
#[instrument(
    name = "session::authenticate",
    skip_all,
    fields(email = %config.email)
)]
pub(crate) async fn authenticate(
    tls_stream: TlsStream,
    config: &AuthConfig<'_>,
) -> Result<ImapSession> {
    let client = async_imap::Client::new(tls_stream);

    debug!("Authenticating to IMAP server");

    client
        .login(config.email, config.password)
        .await
        .map_err(|e| Error::ImapLogin {
            email: config.email.to_string(),
            source: e.0,
        })
}

/// Selects a mailbox (typically "INBOX").
#[instrument(name = "session::select", skip(session), fields(mailbox = %mailbox))]
pub(crate) async fn select_mailbox(session: &mut ImapSession, mailbox: &str) -> Result<()> {
    debug!("Selecting mailbox");

    let selected = session
        .select(mailbox)
        .await
        .map_err(|source| Error::SelectMailbox {
            mailbox: mailbox.to_string(),
            source,
        })?;

    debug!(exists = selected.exists, "Mailbox selected");

    Ok(())
}

/// Lists every UID in the selected mailbox, in ascending order.
#[instrument(name = "session::search_all", skip(session))]
pub(crate) async fn search_all_uids(session: &mut ImapSession) -> Result<Vec<u32>> {
    let uids = session
        .uid_search("ALL")
        .await
        .map_err(|source| Error::ImapSearch { source })?;

    let mut uids: Vec<u32> = uids.into_iter().collect();
    uids.sort_unstable();

    debug!(uid_count = uids.len(), "Enumerated mailbox");

    Ok(uids)
}

/// Fetches the full RFC 822 payload of one message without setting `\Seen`.
#[instrument(name = "session::fetch_body", skip(session))]
pub(crate) async fn fetch_message_body(session: &mut ImapSession, uid: u32) -> Result<Vec<u8>> {
    let uid_str = uid.to_string();

    let stream = session
        .uid_fetch(&uid_str, "BODY.PEEK[]")
        .await
        .map_err(|source| Error::ImapFetch { uid, source })?;

    // The stream must be drained before the session can issue another command.
    let fetches: Vec<_> = stream
        .try_collect()
        .await
        .map_err(|source| Error::FetchMessage { uid, source })?;

    let body = fetches
        .iter()
        .find(|fetch| fetch.uid.map_or(true, |fetched| fetched == uid))
        .and_then(|fetch| fetch.body())
        .ok_or(Error::MissingBody { uid })?;

    debug!(bytes = body.len(), "Fetched message");

    Ok(body.to_vec())
}

/// Logs out from IMAP session.
#[instrument(name = "session::logout", skip(session))]
pub(crate) async fn logout(session: &mut ImapSession) -> Result<()> {
    debug!("Logging out");

    session
        .logout()
        .await
        .map_err(|source| Error::ImapLogout { source })?;

    Ok(())
}
