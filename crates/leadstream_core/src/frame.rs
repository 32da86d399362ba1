use stream_logging::stream_debug;

use crate::StreamEvent;

const FRAME_DELIMITER: &[u8] = b"\n\n";
const DATA_PREFIX: &str = "data:";
const PREVIEW_CHARS: usize = 80;

/// A frame that was dropped. Never fatal to the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameWarning {
    #[error("frame of {bytes} bytes is not valid utf-8")]
    InvalidUtf8 { bytes: usize },
    #[error("frame without `data:` prefix: {preview}")]
    MissingDataPrefix { preview: String },
    #[error("frame payload is not a valid event ({reason}): {preview}")]
    InvalidJson { reason: String, preview: String },
}

/// Incremental SSE splitter.
///
/// Bytes are buffered until a blank line closes a frame; only complete frames
/// are decoded, so chunk boundaries (including ones inside a multi-byte
/// character) never corrupt an event. Events come out in wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFrameParser {
    buffer: Vec<u8>,
    warnings: Vec<FrameWarning>,
}

impl EventFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a transport chunk and returns every event completed by it.
    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) -> Vec<StreamEvent> {
        // The buffered tail holds no delimiter, only a possible first half of one.
        let mut scan_from = self
            .buffer
            .len()
            .saturating_sub(FRAME_DELIMITER.len() - 1);
        self.buffer.extend_from_slice(chunk.as_ref());

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = find_delimiter(&self.buffer[scan_from..]) {
            let end = scan_from + offset;
            let decoded = decode_frame(&self.buffer[start..end]);
            self.collect(decoded, &mut events);
            start = end + FRAME_DELIMITER.len();
            scan_from = start;
        }
        self.buffer.drain(..start);
        events
    }

    /// Decodes whatever is left once the transport has closed, then clears the buffer.
    pub fn flush(&mut self) -> Vec<StreamEvent> {
        let residual = std::mem::take(&mut self.buffer);
        let mut events = Vec::new();
        if !residual.is_empty() {
            let decoded = decode_frame(&residual);
            self.collect(decoded, &mut events);
        }
        events
    }

    /// Drains warnings for frames dropped since the last call.
    pub fn take_warnings(&mut self) -> Vec<FrameWarning> {
        std::mem::take(&mut self.warnings)
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.warnings.clear();
    }

    fn collect(
        &mut self,
        decoded: Result<Option<StreamEvent>, FrameWarning>,
        events: &mut Vec<StreamEvent>,
    ) {
        match decoded {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(warning) => {
                stream_debug!("Dropping stream frame: {}", warning);
                self.warnings.push(warning);
            }
        }
    }
}

fn find_delimiter(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(FRAME_DELIMITER.len())
        .position(|window| window == FRAME_DELIMITER)
}

/// `Ok(None)` means the frame carried nothing (blank or keep-alive comment).
fn decode_frame(raw: &[u8]) -> Result<Option<StreamEvent>, FrameWarning> {
    let text = std::str::from_utf8(raw).map_err(|_| FrameWarning::InvalidUtf8 { bytes: raw.len() })?;
    let text = text.trim();
    if text.is_empty() || text.starts_with(':') {
        return Ok(None);
    }

    let payload = text
        .strip_prefix(DATA_PREFIX)
        .ok_or_else(|| FrameWarning::MissingDataPrefix {
            preview: preview(text),
        })?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload);

    serde_json::from_str(payload)
        .map(Some)
        .map_err(|err| FrameWarning::InvalidJson {
            reason: err.to_string(),
            preview: preview(payload),
        })
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}
