//! Newline-delimited frame reassembly over a byte stream.
//!
//! Frames split across reads are stitched together; several frames in one
//! read are all emitted in order. Bytes are decoded only once a full line is
//! available so multi-byte characters split across reads survive intact.

/// Number of leading bytes kept when reporting an oversized line.
const OVERSIZED_PREVIEW_BYTES: usize = 256;

/// One unit produced by [`FrameParser::push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete, non-blank line without its terminator.
    Line(String),
    /// A line that exceeded the configured cap and was discarded.
    Oversized {
        /// Leading bytes of the discarded line, decoded lossily.
        preview: String,
        /// Bytes buffered at the moment the cap was exceeded.
        discarded_bytes: usize,
    },
}

/// Incremental newline-delimited parser with a per-line size cap.
///
/// Once a line grows past `max_line_bytes` the buffered bytes are dropped
/// and everything up to the next newline is skipped.
#[derive(Debug, Clone)]
pub struct FrameParser {
    buffer: Vec<u8>,
    max_line_bytes: usize,
    discarding: bool,
}

impl FrameParser {
    /// Creates a parser that rejects lines longer than `max_line_bytes`.
    #[must_use]
    pub const fn new(max_line_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line_bytes,
            discarding: false,
        }
    }

    /// Returns the number of bytes waiting for a terminator.
    #[must_use]
    pub const fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds a chunk and returns every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut rest = chunk;
        loop {
            let Some(position) = rest.iter().position(|byte| *byte == b'\n') else {
                self.buffer_partial(rest, &mut frames);
                break;
            };
            let (line, tail) = rest.split_at(position);
            rest = tail.get(1..).unwrap_or_default();
            if self.discarding {
                self.discarding = false;
                continue;
            }
            self.buffer.extend_from_slice(line);
            if self.buffer.len() > self.max_line_bytes {
                frames.push(self.take_oversized());
                continue;
            }
            if let Some(frame) = self.take_line() {
                frames.push(frame);
            }
        }
        frames
    }

    fn buffer_partial(&mut self, partial: &[u8], frames: &mut Vec<Frame>) {
        if self.discarding {
            return;
        }
        self.buffer.extend_from_slice(partial);
        if self.buffer.len() > self.max_line_bytes {
            frames.push(self.take_oversized());
            self.discarding = true;
        }
    }

    fn take_line(&mut self) -> Option<Frame> {
        let decoded = String::from_utf8_lossy(&self.buffer);
        let line = decoded.trim_end_matches('\r');
        let frame = if line.trim().is_empty() {
            None
        } else {
            Some(Frame::Line(line.to_owned()))
        };
        self.buffer.clear();
        frame
    }

    fn take_oversized(&mut self) -> Frame {
        let preview_bytes: Vec<u8> = self
            .buffer
            .iter()
            .take(OVERSIZED_PREVIEW_BYTES)
            .copied()
            .collect();
        let discarded_bytes = self.buffer.len();
        self.buffer.clear();
        Frame::Oversized {
            preview: String::from_utf8_lossy(&preview_bytes).into_owned(),
            discarded_bytes,
        }
    }
}
