use mailparse::{parse_mail, MailParseError, ParsedMail};

use super::attachment::{Attachment, AttachmentError, AttachmentProcessor, ProcessedAttachment};
use crate::pipeline::{Envelope, PipelineError, Transform};

/// A raw RFC 822 message as fetched from the mailbox.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub raw: Vec<u8>,
}

#[derive(thiserror::Error, Debug)]
pub enum MessageError {
    #[error("malformed message: {0}")]
    Parse(#[from] MailParseError),
}

#[derive(Debug)]
pub struct AttachmentOutcome {
    pub filename: String,
    pub result: Result<ProcessedAttachment, AttachmentError>,
}

/// Per-attachment results for one message, in MIME walk order.
#[derive(Debug, Default)]
pub struct MessageReport {
    pub attachments: Vec<AttachmentOutcome>,
}

/// The filename of a part, from `Content-Disposition: ...; filename=` or
/// else `Content-Type: ...; name=`. A part with a filename is an attachment.
pub fn attachment_filename(part: &ParsedMail<'_>) -> Option<String> {
    let disposition = part.get_content_disposition();
    disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Walks every MIME part of a message and runs each attachment through the
/// [`AttachmentProcessor`]. A bad attachment never stops the walk.
#[derive(Clone)]
pub struct MessageProcessor {
    attachments: AttachmentProcessor,
}

impl MessageProcessor {
    pub fn new(attachments: AttachmentProcessor) -> Self {
        Self { attachments }
    }

    pub fn process_message(&self, raw: &[u8]) -> Result<MessageReport, MessageError> {
        let parsed = parse_mail(raw)?;
        let mut report = MessageReport::default();
        self.visit(&parsed, &mut report);
        Ok(report)
    }

    fn visit(&self, part: &ParsedMail<'_>, report: &mut MessageReport) {
        if let Some(filename) = attachment_filename(part) {
            let result = part
                .get_body_raw()
                .map_err(|e| AttachmentError::Payload {
                    filename: filename.clone(),
                    reason: e.to_string(),
                })
                .and_then(|bytes| {
                    self.attachments.process(&Attachment {
                        filename: filename.clone(),
                        bytes,
                    })
                });
            report.attachments.push(AttachmentOutcome { filename, result });
        }

        for sub in &part.subparts {
            self.visit(sub, report);
        }
    }
}

#[async_trait::async_trait]
impl Transform<MailMessage, MessageReport> for MessageProcessor {
    async fn apply(
        &self,
        input: Envelope<MailMessage>,
    ) -> Result<Envelope<MessageReport>, PipelineError> {
        match self.process_message(&input.payload.raw) {
            Ok(report) => Ok(Envelope {
                id: input.id,
                payload: report,
                received_at: input.received_at,
            }),
            Err(e) => {
                metrics::counter!("mea_message_parse_errors_total").increment(1);
                Err(PipelineError::Transform(e.to_string()))
            }
        }
    }
}
