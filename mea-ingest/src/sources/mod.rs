pub mod imap_mailbox;

pub use imap_mailbox::ImapMailSource;
