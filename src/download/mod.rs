//! Content downloads and output
//!
//! Accepted content matches become [`DownloadJob`]s. The
//! [`DownloadManager`] runs them, streaming content into the print, write
//! and forward formats of their chain. Printed output goes through one
//! [`OrderedOutput`], which keeps it in the order the matches were accepted.

mod filename;
mod formatter;
mod job;
mod manager;
mod output;
mod progress;

pub use filename::{
    filename_from_address, filename_from_path, parse_content_disposition, sanitize_filename,
    ADDRESS_FILENAME_MAX_LEN,
};
pub use formatter::{OutputFormatter, OutputTarget};
pub use job::{match_context, Content, DownloadJob, JobEnv, JobError, JobSpec, READ_BUFFER_SIZE};
pub use manager::{DownloadManager, DownloadStats};
pub use output::{OrderedOutput, SharedBuffer, Ticket, DEFAULT_PRINT_BUFFER_CAPACITY};
pub use progress::{ProgressBoard, ProgressRenderer, StatusReport, StatusSnapshot};
