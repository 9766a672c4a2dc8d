//! Frame splitting and classification.
//!
//! Decoded text is cut into frames on complete lines only, so the frames
//! produced for a stream do not depend on where the transport split it.
//!
//! - a `data:` marker opens a new frame, at the start of a line or right
//!   after a closing `}` on the same line
//! - a blank line closes the open frame
//! - a line starting with `:` is a heartbeat and is discarded
//! - `event:`, `id:` and `retry:` field lines are ignored
//! - any other line continues the open frame, or opens a bare frame

use serde_json::{Map, Value};
use tracing::trace;

use crate::errors::DropReason;

/// How a frame was delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Introduced by a `data:` marker.
    Data,
    /// Text outside any `data:` marker; parsed as one whole JSON object.
    Bare,
}

/// One candidate frame, before JSON parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub framing: Framing,
    pub text: String,
}

/// A frame whose text parsed to a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub framing: Framing,
    pub object: Map<String, Value>,
}

/// Buffers partial lines and frames across text chunks.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    line: String,
    current: Option<Frame>,
}

impl FrameSplitter {
    /// Feeds decoded text and returns every frame it completed.
    pub fn push_text(&mut self, text: &str) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut rest = text;
        while let Some(idx) = rest.find('\n') {
            self.line.push_str(&rest[..idx]);
            let line = std::mem::take(&mut self.line);
            self.accept_line(line.trim_end_matches('\r'), &mut frames);
            rest = &rest[idx + 1..];
        }
        self.line.push_str(rest);
        frames
    }

    /// Ends the input, flushing the unterminated last line and open frame.
    pub fn finish(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        let line = std::mem::take(&mut self.line);
        if !line.is_empty() {
            self.accept_line(line.trim_end_matches('\r'), &mut frames);
        }
        if let Some(frame) = self.current.take() {
            frames.push(frame);
        }
        frames
    }

    fn accept_line(&mut self, line: &str, frames: &mut Vec<Frame>) {
        if line.trim().is_empty() {
            if let Some(frame) = self.current.take() {
                frames.push(frame);
            }
            return;
        }
        if line.starts_with(':') {
            trace!(len = line.len(), "heartbeat line");
            return;
        }
        if ["event:", "id:", "retry:"]
            .iter()
            .any(|field| line.starts_with(field))
        {
            return;
        }
        let (lead, pieces) = split_data_markers(line);
        if let Some(lead) = lead {
            self.continue_frame(lead);
        }
        for piece in pieces {
            if let Some(frame) = self.current.take() {
                frames.push(frame);
            }
            self.current = Some(Frame {
                framing: Framing::Data,
                text: piece.to_string(),
            });
        }
    }

    fn continue_frame(&mut self, text: &str) {
        match self.current.as_mut() {
            Some(frame) => {
                frame.text.push('\n');
                frame.text.push_str(text);
            }
            None => {
                self.current = Some(Frame {
                    framing: Framing::Bare,
                    text: text.to_string(),
                });
            }
        }
    }
}

const DATA_MARKER: &str = "data:";

/// Cuts `line` at every `data:` marker that starts the line or directly
/// follows a closing `}`. Returns the text before the first marker, if any,
/// and the text after each marker.
///
/// A `data:` inside a JSON string is not preceded by `}` and stays put.
fn split_data_markers(line: &str) -> (Option<&str>, Vec<&str>) {
    let mut cuts = Vec::new();
    let mut from = 0;
    while let Some(pos) = line[from..].find(DATA_MARKER) {
        let at = from + pos;
        if at == 0 || line[..at].trim_end().ends_with('}') {
            cuts.push(at);
        }
        from = at + DATA_MARKER.len();
    }
    let Some(&first) = cuts.first() else {
        return (Some(line), Vec::new());
    };
    let lead = (first > 0).then(|| &line[..first]);
    let pieces = cuts
        .iter()
        .enumerate()
        .map(|(i, &at)| {
            let end = cuts.get(i + 1).copied().unwrap_or(line.len());
            &line[at + DATA_MARKER.len()..end]
        })
        .collect();
    (lead, pieces)
}

/// Extracts the JSON object carried by a frame.
///
/// Returns `Ok(None)` for frames with nothing to parse (empty or comment).
pub fn classify(frame: Frame) -> Result<Option<Payload>, DropReason> {
    let text = frame.text.trim();
    if text.is_empty() || text.starts_with(':') {
        return Ok(None);
    }
    let value: Value =
        serde_json::from_str(text).map_err(|e| DropReason::InvalidJson(e.to_string()))?;
    match value {
        Value::Object(object) => Ok(Some(Payload {
            framing: frame.framing,
            object,
        })),
        _ => Err(DropReason::NotAnObject),
    }
}
