//! Mailbox access.
//!
//! A [`MailStore`] is a blocking view of one mailbox folder. Stores are
//! driven from a single dedicated thread owned by [`MailboxClient`], which
//! gives async callers a bounded, non-blocking interface.
//!
//! | Store | Ids |
//! |-------|-----|
//! | [`ImapStore`] | IMAP UIDs of the selected folder |
//! | [`EmlDirStore`] | `.eml` paths relative to the root directory |

pub mod eml_dir;
pub mod imap;
pub mod worker;

use std::collections::HashSet;

use anyhow::{anyhow, Result};
use mail_parser::MessageParser;
use tracing::warn;

use mailsift_core::models::RawMessage;

use crate::config::MailboxConfig;

pub use eml_dir::EmlDirStore;
pub use imap::ImapStore;
pub use worker::MailboxClient;

/// Blocking access to one mailbox folder.
///
/// Ids returned by [`list_ids`](MailStore::list_ids) are in the mailbox's
/// natural order (oldest first) and stay valid across sessions.
pub trait MailStore: Send + 'static {
    /// Log in and run a no-op round trip. `Ok` means the mailbox is usable.
    fn test_connection(&mut self) -> Result<()>;

    /// Number of messages currently in the folder.
    fn count_all(&mut self) -> Result<usize>;

    /// All message ids, oldest first.
    fn list_ids(&mut self) -> Result<Vec<String>>;

    /// Fetch and parse one message.
    fn fetch_by_id(&mut self, id: &str) -> Result<RawMessage>;

    /// Up to `max_count` messages whose ids are not in `exclude`, in listing
    /// order.
    ///
    /// A message that fails to fetch or parse is logged and skipped, which
    /// leaves it unseen, and the next unseen id takes its slot. Transport
    /// failures abort the whole call.
    fn fetch_unseen(
        &mut self,
        max_count: usize,
        exclude: &HashSet<String>,
    ) -> Result<Vec<RawMessage>> {
        let candidates = self.list_ids()?;

        let mut messages = Vec::with_capacity(max_count.min(candidates.len()));
        for id in candidates.into_iter().filter(|id| !exclude.contains(id)) {
            if messages.len() >= max_count {
                break;
            }
            match self.fetch_by_id(&id) {
                Ok(message) => messages.push(message),
                Err(e) if is_transport_error(&e) => return Err(e),
                Err(e) => {
                    let reason = format!("{:#}", e);
                    warn!(message_id = %id, error = %reason, "Skipping message");
                }
            }
        }
        Ok(messages)
    }
}

/// Whether an error came from the underlying connection rather than from
/// one particular message.
pub fn is_transport_error(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<std::io::Error>().is_some())
}

/// Whether an error is a socket timeout.
pub fn is_timeout_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .map(|io| {
                matches!(
                    io.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                )
            })
            .unwrap_or(false)
    })
}

/// Parse an RFC 5322 message into a [`RawMessage`].
///
/// The body is the first `text/plain` part when there is one, otherwise the
/// first HTML part. A message without any text part gets an empty body.
pub fn parse_rfc822(id: &str, raw: &[u8]) -> Result<RawMessage> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| anyhow!("message {} is not a parseable RFC 5322 message", id))?;

    let body = parsed
        .body_text(0)
        .map(|s| s.into_owned())
        .or_else(|| parsed.body_html(0).map(|s| s.into_owned()))
        .unwrap_or_default();

    Ok(RawMessage {
        id: id.to_string(),
        subject: parsed.subject().unwrap_or_default().to_string(),
        sender: parsed.from().map(format_address).unwrap_or_default(),
        recipient: parsed.to().map(format_address).unwrap_or_default(),
        date: parsed.date().map(|d| d.to_rfc3339()).unwrap_or_default(),
        body,
    })
}

fn format_address(address: &mail_parser::Address<'_>) -> String {
    match address.first() {
        Some(addr) => match (addr.name(), addr.address()) {
            (Some(name), Some(email)) => format!("{} <{}>", name, email),
            (None, Some(email)) => email.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => String::new(),
        },
        None => String::new(),
    }
}

/// Build the store configured in `[mailbox]`.
pub fn open_store(config: &MailboxConfig) -> Result<Box<dyn MailStore>> {
    match config.kind.as_str() {
        "imap" => Ok(Box::new(ImapStore::from_config(config)?)),
        "eml_dir" => {
            let root = config
                .root
                .clone()
                .ok_or_else(|| anyhow!("mailbox.root is required for eml_dir"))?;
            Ok(Box::new(EmlDirStore::new(root)))
        }
        other => Err(anyhow!("Unknown mailbox kind: {}", other)),
    }
}
