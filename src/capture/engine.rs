//! Capture engine: opens a saved pcap/pcapng file and yields raw frames.

use pcap::{Capture, Offline};
use std::fmt;
use std::path::Path;

/// Errors from the capture engine.
#[derive(Debug)]
pub enum CaptureError {
    /// No capture path was configured.
    EmptyPath,
    /// pcap error while opening or reading the file.
    Pcap(pcap::Error),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::EmptyPath => write!(f, "pcap path is empty"),
            CaptureError::Pcap(e) => write!(f, "capture file: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<pcap::Error> for CaptureError {
    fn from(e: pcap::Error) -> Self {
        CaptureError::Pcap(e)
    }
}

/// Open a capture file for offline reading.
pub fn open_offline(path: &Path) -> Result<Capture<Offline>, CaptureError> {
    if path.as_os_str().is_empty() {
        return Err(CaptureError::EmptyPath);
    }

    let cap = Capture::from_file(path).map_err(CaptureError::Pcap)?;

    tracing::info!(
        path = %path.display(),
        linktype = cap.get_datalink().0,
        "capture opened"
    );

    Ok(cap)
}
