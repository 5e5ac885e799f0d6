//! IMAP mail source over TLS (rustls).
//!
//! Each operation opens a short session on a blocking thread: connect,
//! LOGIN, SELECT, the command itself, LOGOUT. Messages are addressed by UID
//! and fetched with `BODY.PEEK[]` so reading never sets `\Seen`; only
//! `mark_read` does.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tracing::debug;

use crate::channels::decode::parse_message;
use crate::config::EmailConfig;
use crate::error::MailError;
use crate::pipeline::{MailQuery, MailSource, MessageRef, RawEmail};

/// Read/write timeout on the IMAP socket.
const IO_TIMEOUT: Duration = Duration::from_secs(30);

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

// ── Session ─────────────────────────────────────────────────────────

/// Untagged lines and literal payloads returned by one command.
#[derive(Debug, Default)]
struct Response {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
}

/// A blocking, authenticated IMAP connection.
struct ImapSession {
    stream: TlsStream,
    next_tag: u32,
}

impl ImapSession {
    fn connect(config: &EmailConfig) -> Result<Self, MailError> {
        let connect_err = |reason: String| MailError::Connect {
            host: config.imap_host.clone(),
            reason,
        };

        let tcp = TcpStream::connect((config.imap_host.as_str(), config.imap_port))
            .map_err(|e| connect_err(e.to_string()))?;
        tcp.set_read_timeout(Some(IO_TIMEOUT))?;
        tcp.set_write_timeout(Some(IO_TIMEOUT))?;

        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth(),
        );
        let server_name = ServerName::try_from(config.imap_host.clone())
            .map_err(|e| connect_err(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| connect_err(e.to_string()))?;

        let mut session = Self {
            stream: rustls::StreamOwned::new(conn, tcp),
            next_tag: 1,
        };

        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(MailError::Protocol(format!(
                "unexpected greeting: {}",
                greeting.trim_end()
            )));
        }
        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, MailError> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.stream.read(&mut byte)? {
                0 => return Err(MailError::Protocol("connection closed".into())),
                _ => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).into_owned());
                    }
                }
            }
        }
    }

    /// Send one tagged command and collect its response.
    fn command(&mut self, cmd: &str) -> Result<Response, MailError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        self.stream.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.stream.flush()?;

        let mut response = Response::default();
        loop {
            let line = self.read_line()?;

            if let Some(status) = line
                .strip_prefix(tag.as_str())
                .and_then(|rest| rest.strip_prefix(' '))
            {
                if status.starts_with("OK") {
                    return Ok(response);
                }
                return Err(MailError::Command {
                    command: command_name(cmd),
                    reason: status.trim_end().to_string(),
                });
            }

            if let Some(len) = literal_length(&line) {
                let mut literal = vec![0u8; len];
                self.stream.read_exact(&mut literal)?;
                response.literals.push(literal);
            }
            response.lines.push(line);
        }
    }

    fn login(&mut self, user: &str, password: &str) -> Result<(), MailError> {
        self.command(&format!("LOGIN {} {}", quote(user), quote(password)))
            .map(|_| ())
            .map_err(|e| match e {
                MailError::Command { .. } => MailError::AuthFailed {
                    user: user.to_string(),
                },
                other => other,
            })
    }

    fn select(&mut self, mailbox: &str) -> Result<(), MailError> {
        self.command(&format!("SELECT {}", quote(mailbox))).map(|_| ())
    }

    fn uid_search(&mut self, unread_only: bool) -> Result<Vec<u32>, MailError> {
        let criteria = if unread_only { "UNSEEN" } else { "ALL" };
        let response = self.command(&format!("UID SEARCH {criteria}"))?;
        let mut uids: Vec<u32> = response
            .lines
            .iter()
            .flat_map(|line| parse_search_line(line))
            .collect();
        uids.sort_unstable();
        uids.dedup();
        Ok(uids)
    }

    fn fetch_raw(&mut self, uid: u32) -> Result<Option<Vec<u8>>, MailError> {
        let response = self.command(&format!("UID FETCH {uid} BODY.PEEK[]"))?;
        Ok(response.literals.into_iter().next())
    }

    fn mark_seen(&mut self, uid: u32) -> Result<(), MailError> {
        self.command(&format!("UID STORE {uid} +FLAGS.SILENT (\\Seen)"))
            .map(|_| ())
    }

    fn logout(&mut self) {
        if let Err(e) = self.command("LOGOUT") {
            debug!(error = %e, "IMAP logout failed");
        }
    }
}

// ── Protocol helpers ────────────────────────────────────────────────

/// Length of a trailing `{N}` literal announcement.
fn literal_length(line: &str) -> Option<usize> {
    let line = line.trim_end_matches(['\r', '\n']);
    let inner = line.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    inner[open + 1..].parse().ok()
}

/// UIDs from a `* SEARCH 1 2 3` line.
fn parse_search_line(line: &str) -> Vec<u32> {
    line.trim_end()
        .strip_prefix("* SEARCH")
        .map(|rest| {
            rest.split_whitespace()
                .filter_map(|n| n.parse().ok())
                .collect()
        })
        .unwrap_or_default()
}

/// IMAP quoted string.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Command verb for error messages. Arguments are left out so LOGIN
/// credentials never reach a log line.
fn command_name(cmd: &str) -> String {
    let mut words = cmd.split_whitespace();
    match (words.next(), words.next()) {
        (Some("UID"), Some(verb)) => format!("UID {verb}"),
        (Some(verb), _) => verb.to_string(),
        _ => String::new(),
    }
}

fn parse_uid(id: &str) -> Result<u32, MailError> {
    id.trim()
        .parse()
        .map_err(|_| MailError::NotFound { id: id.to_string() })
}

// ── MailSource ──────────────────────────────────────────────────────

/// `MailSource` backed by an IMAP account.
pub struct ImapMailSource {
    config: Arc<EmailConfig>,
}

impl ImapMailSource {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Run `op` inside a fresh session on the blocking pool.
    async fn with_session<T, F>(&self, mailbox: &str, op: F) -> Result<T, MailError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapSession) -> Result<T, MailError> + Send + 'static,
    {
        let config = Arc::clone(&self.config);
        let mailbox = mailbox.to_string();

        tokio::task::spawn_blocking(move || {
            let mut session = ImapSession::connect(&config)?;
            session.login(&config.username, config.password.expose_secret())?;
            session.select(&mailbox)?;
            let result = op(&mut session);
            session.logout();
            result
        })
        .await
        .map_err(|e| MailError::TaskAborted(e.to_string()))?
    }
}

#[async_trait]
impl MailSource for ImapMailSource {
    async fn list_unread(
        &self,
        query: &MailQuery,
        max_results: usize,
    ) -> Result<Vec<MessageRef>, MailError> {
        let unread_only = query.unread_only;
        let uids = self
            .with_session(&query.mailbox, move |s| s.uid_search(unread_only))
            .await?;

        debug!(mailbox = %query.mailbox, found = uids.len(), "IMAP search complete");
        Ok(uids
            .into_iter()
            .take(max_results)
            .map(|uid| MessageRef::new(uid.to_string()))
            .collect())
    }

    async fn get_full(&self, id: &str) -> Result<RawEmail, MailError> {
        let uid = parse_uid(id)?;
        let raw = self
            .with_session(&self.config.mailbox, move |s| s.fetch_raw(uid))
            .await?
            .ok_or_else(|| MailError::NotFound { id: id.to_string() })?;
        parse_message(id, &raw)
    }

    async fn mark_read(&self, id: &str) -> Result<(), MailError> {
        let uid = parse_uid(id)?;
        self.with_session(&self.config.mailbox, move |s| s.mark_seen(uid))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_length_from_fetch_line() {
        assert_eq!(literal_length("* 12 FETCH (UID 7 BODY[] {1432}\r\n"), Some(1432));
        assert_eq!(literal_length("* 12 FETCH (FLAGS (\\Seen))\r\n"), None);
        assert_eq!(literal_length("{abc}\r\n"), None);
    }

    #[test]
    fn search_line_parsing() {
        assert_eq!(parse_search_line("* SEARCH 3 17 42\r\n"), vec![3, 17, 42]);
        assert!(parse_search_line("* SEARCH\r\n").is_empty());
        assert!(parse_search_line("* 3 EXISTS\r\n").is_empty());
    }

    #[test]
    fn quote_escapes() {
        assert_eq!(quote("INBOX"), "\"INBOX\"");
        assert_eq!(quote(r#"pa"ss\word"#), r#""pa\"ss\\word""#);
    }

    #[test]
    fn command_name_hides_arguments() {
        assert_eq!(command_name("LOGIN \"me\" \"secret\""), "LOGIN");
        assert_eq!(command_name("UID FETCH 7 BODY.PEEK[]"), "UID FETCH");
    }

    #[test]
    fn uid_must_be_numeric() {
        assert_eq!(parse_uid(" 42 ").unwrap(), 42);
        assert!(matches!(parse_uid("abc"), Err(MailError::NotFound { .. })));
    }
}
