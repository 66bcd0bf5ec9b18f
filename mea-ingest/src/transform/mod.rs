//! Attachment-to-timeseries normalization.
//!
//! Bottom-up: [`spreadsheet`] decodes cells, [`row`] validates one row,
//! [`timestamps`] anchors it in the local day, [`outliers`] cleans the
//! result, [`attachment`] ties them together and [`message`] walks the MIME
//! parts of a mail.

pub mod attachment;
pub mod message;
pub mod outliers;
pub mod row;
pub mod spreadsheet;
pub mod timestamps;

pub use attachment::{Attachment, AttachmentError, AttachmentProcessor, ProcessedAttachment};
pub use message::{MailMessage, MessageProcessor, MessageReport};
pub use outliers::{filter_outliers, percentile, OutlierPolicy};
pub use row::{parse_row, RowError};
pub use timestamps::reconstruct_timestamps;
