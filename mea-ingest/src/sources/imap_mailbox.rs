use std::{
    net::TcpStream,
    pin::Pin,
    sync::{Arc, Mutex},
    time::SystemTime,
};

use async_stream::try_stream;
use futures::Stream;
use native_tls::{TlsConnector, TlsStream};

use crate::{
    config::ImapConfig,
    pipeline::{Envelope, PipelineError, Source},
    transform::message::MailMessage,
};

type ImapSession = imap::Session<TlsStream<TcpStream>>;

/// Unread messages of one IMAP mailbox, oldest first.
///
/// The `imap` client is blocking, so every command runs on tokio's blocking
/// pool while holding the session lock. Bodies are fetched with
/// `BODY.PEEK[]` so that only [`Source::acknowledge`] sets `\Seen`.
pub struct ImapMailSource {
    session: Arc<Mutex<ImapSession>>,
    search: String,
}

impl ImapMailSource {
    pub async fn connect(cfg: &ImapConfig) -> Result<Self, PipelineError> {
        let password = cfg
            .password()
            .map_err(|e| PipelineError::Source(e.to_string()))?;
        let cfg_owned = cfg.clone();

        let session = tokio::task::spawn_blocking(move || open_session(&cfg_owned, &password))
            .await
            .map_err(|e| PipelineError::Source(format!("imap connect task failed: {e}")))??;

        tracing::info!(host = %cfg.host, mailbox = %cfg.mailbox, "connected to IMAP server");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            search: cfg.search.clone(),
        })
    }
}

fn open_session(cfg: &ImapConfig, password: &str) -> Result<ImapSession, PipelineError> {
    let tls = TlsConnector::new()
        .map_err(|e| PipelineError::Source(format!("cannot create TLS connector: {e}")))?;

    let addr = (cfg.host.as_str(), cfg.port);
    let client = if cfg.starttls {
        imap::connect_starttls(addr, &cfg.host, &tls)
    } else {
        imap::connect(addr, &cfg.host, &tls)
    }
    .map_err(|e| PipelineError::Source(format!("cannot connect to IMAP server: {e}")))?;

    let mut session = client
        .login(&cfg.user, password)
        .map_err(|(e, _)| PipelineError::Source(format!("cannot login to IMAP server: {e}")))?;

    session
        .select(&cfg.mailbox)
        .map_err(|e| PipelineError::Source(format!("cannot select mailbox {}: {e}", cfg.mailbox)))?;

    Ok(session)
}

/// Runs one blocking IMAP command against the shared session.
async fn with_session<R, F>(session: &Arc<Mutex<ImapSession>>, op: F) -> Result<R, PipelineError>
where
    F: FnOnce(&mut ImapSession) -> imap::error::Result<R> + Send + 'static,
    R: Send + 'static,
{
    let session = Arc::clone(session);
    tokio::task::spawn_blocking(move || {
        let mut guard = session
            .lock()
            .map_err(|_| PipelineError::Source("imap session lock poisoned".to_string()))?;
        op(&mut *guard).map_err(|e| PipelineError::Source(format!("imap command failed: {e}")))
    })
    .await
    .map_err(|e| PipelineError::Source(format!("imap task failed: {e}")))?
}

#[async_trait::async_trait]
impl Source<MailMessage> for ImapMailSource {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<MailMessage>, PipelineError>> + Send>> {
        let session = Arc::clone(&self.session);
        let query = self.search.clone();

        let s = try_stream! {
            let found = with_session(&session, move |s| s.search(&query)).await?;
            let mut seqs: Vec<u32> = found.into_iter().collect();
            seqs.sort_unstable();
            tracing::info!(count = seqs.len(), "found messages to process");

            for seq in seqs {
                let raw = with_session(&session, move |s| {
                    let fetches = s.fetch(seq.to_string(), "BODY.PEEK[]")?;
                    Ok(fetches.iter().find_map(|f| f.body().map(<[u8]>::to_vec)))
                })
                .await?;

                match raw {
                    Some(raw) => {
                        yield Envelope {
                            id: seq,
                            payload: MailMessage { raw },
                            received_at: SystemTime::now(),
                        };
                    }
                    None => {
                        tracing::warn!(seq, "message has no body, leaving it unread");
                    }
                }
            }
        };

        Box::pin(s)
    }

    async fn acknowledge(&self, id: u32) -> Result<(), PipelineError> {
        with_session(&self.session, move |s| {
            s.store(id.to_string(), "+FLAGS (\\Seen)").map(|_| ())
        })
        .await
    }

    async fn close(&self) -> Result<(), PipelineError> {
        with_session(&self.session, |s| s.logout()).await
    }
}
