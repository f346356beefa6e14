//! IMAP mailbox access over TLS.
//!
//! Protocol handling comes from the blocking [`imap`] crate; this module
//! adds the TLS transport (`rustls` over a `TcpStream` with connect and I/O
//! timeouts), session reuse and the mapping onto [`MailStore`]. Messages are
//! addressed by UID, which stays stable across sessions (sequence numbers
//! do not). The folder is opened with `EXAMINE` and bodies are fetched with
//! `BODY.PEEK[]`, so indexing never changes `\Seen` flags.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use tracing::{debug, info};

use mailsift_core::models::RawMessage;

use super::{is_transport_error, parse_rfc822, MailStore};
use crate::config::MailboxConfig;

type TlsStream = StreamOwned<ClientConnection, TcpStream>;

/// Convert an [`imap`] error, keeping connection failures as `io::Error`
/// so callers can tell them apart from per-command rejections.
fn imap_error(err: imap::error::Error) -> anyhow::Error {
    match err {
        imap::error::Error::Io(e) => e.into(),
        imap::error::Error::ConnectionLost => std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "IMAP server closed the connection",
        )
        .into(),
        other => anyhow!("IMAP error: {}", other),
    }
}

/// Read the greeting, log in and open `folder` read-only.
///
/// Returns the session together with the folder's message count.
pub fn open_session<S: Read + Write>(
    stream: S,
    username: &str,
    password: &str,
    folder: &str,
) -> Result<(imap::Session<S>, usize)> {
    let mut client = imap::Client::new(stream);
    client.read_greeting().map_err(imap_error)?;
    let mut session = client
        .login(username, password)
        .map_err(|(e, _)| imap_error(e))
        .context("IMAP login failed")?;
    let exists = examine(&mut session, folder)?;
    Ok((session, exists))
}

fn examine<S: Read + Write>(session: &mut imap::Session<S>, folder: &str) -> Result<usize> {
    let mailbox = session
        .examine(folder)
        .map_err(imap_error)
        .with_context(|| format!("Cannot open folder {}", folder))?;
    Ok(mailbox.exists as usize)
}

/// All UIDs of the open folder, ascending.
fn uid_list<S: Read + Write>(session: &mut imap::Session<S>) -> Result<Vec<u32>> {
    let mut uids: Vec<u32> = session
        .uid_search("ALL")
        .map_err(imap_error)?
        .into_iter()
        .collect();
    uids.sort_unstable();
    Ok(uids)
}

/// Full RFC 822 bytes of one message. `None` when the UID is gone.
fn fetch_raw<S: Read + Write>(session: &mut imap::Session<S>, uid: u32) -> Result<Option<Vec<u8>>> {
    let fetches = session
        .uid_fetch(uid.to_string(), "BODY.PEEK[]")
        .map_err(imap_error)?;
    debug!(uid, responses = fetches.len(), "UID FETCH");
    Ok(fetches
        .iter()
        .filter(|f| f.uid.map_or(true, |u| u == uid))
        .find_map(|f| f.body().map(|b| b.to_vec())))
}

/// [`MailStore`] backed by an IMAP server.
///
/// The session is opened lazily and kept across calls; a transport failure
/// drops it so the next call reconnects.
pub struct ImapStore {
    config: MailboxConfig,
    tls: Arc<ClientConfig>,
    session: Option<imap::Session<TlsStream>>,
}

impl ImapStore {
    /// Credentials are resolved on connect, not here.
    pub fn from_config(config: &MailboxConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            tls: tls_config()?,
            session: None,
        })
    }

    fn connect(&self) -> Result<imap::Session<TlsStream>> {
        let username = self.config.resolve_username()?;
        let password = self.config.resolve_password()?;
        let host = self.config.host.as_str();

        let addr = (host, self.config.port)
            .to_socket_addrs()
            .with_context(|| format!("Cannot resolve {}", host))?
            .next()
            .ok_or_else(|| anyhow!("No address found for {}", host))?;
        let tcp = TcpStream::connect_timeout(&addr, self.config.connect_timeout())
            .with_context(|| format!("Failed to connect to {}:{}", host, self.config.port))?;
        tcp.set_read_timeout(Some(self.config.io_timeout()))?;
        tcp.set_write_timeout(Some(self.config.io_timeout()))?;

        let server_name = ServerName::try_from(host.to_string())
            .with_context(|| format!("Invalid TLS server name: {}", host))?;
        let conn = ClientConnection::new(self.tls.clone(), server_name)?;

        let (session, exists) = open_session(
            StreamOwned::new(conn, tcp),
            &username,
            &password,
            &self.config.folder,
        )?;
        info!(host = %host, folder = %self.config.folder, exists, "IMAP session ready");
        Ok(session)
    }

    fn with_session<T>(
        &mut self,
        op: impl FnOnce(&mut imap::Session<TlsStream>) -> Result<T>,
    ) -> Result<T> {
        if self.session.is_none() {
            self.session = Some(self.connect()?);
        }
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| anyhow!("IMAP session unavailable"))?;
        let result = op(session);
        if let Err(e) = &result {
            if is_transport_error(e) {
                self.session = None;
            }
        }
        result
    }
}

impl MailStore for ImapStore {
    fn test_connection(&mut self) -> Result<()> {
        if let Some(mut old) = self.session.take() {
            let _ = old.logout();
        }
        self.with_session(|s| s.noop().map_err(imap_error))
    }

    fn count_all(&mut self) -> Result<usize> {
        let folder = self.config.folder.clone();
        self.with_session(|s| examine(s, &folder))
    }

    fn list_ids(&mut self) -> Result<Vec<String>> {
        let uids = self.with_session(uid_list)?;
        Ok(uids.into_iter().map(|u| u.to_string()).collect())
    }

    fn fetch_by_id(&mut self, id: &str) -> Result<RawMessage> {
        let uid: u32 = id
            .parse()
            .map_err(|_| anyhow!("Not an IMAP UID: {}", id))?;
        let raw = self
            .with_session(|s| fetch_raw(s, uid))?
            .ok_or_else(|| anyhow!("Message UID {} not found", uid))?;
        parse_rfc822(id, &raw)
    }
}

impl Drop for ImapStore {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            let _ = session.logout();
        }
    }
}

fn tls_config() -> Result<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}
