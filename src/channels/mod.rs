//! Mailbox and delivery adapters. Pure I/O, no business logic.

pub mod decode;
pub mod imap;
pub mod smtp;

pub use imap::ImapMailSource;
pub use smtp::SmtpReplySender;
