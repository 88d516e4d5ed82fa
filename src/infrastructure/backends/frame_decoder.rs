#[cfg(test)]
#[path = "frame_decoder_test.rs"]
mod tests;

/// One complete record pulled out of a streamed response body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Payload(String),
    Done,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Framing {
    /// Newline delimited `data: <json>` records, ended by `data: [DONE]`.
    EventStream,
    /// A JSON array of objects split across arbitrary chunk boundaries.
    JsonArray,
}

/// Reassembles top-level JSON objects by tracking brace depth. Braces inside
/// string literals, escaped quotes included, do not count.
#[derive(Default)]
struct ObjectScanner {
    depth: usize,
    in_string: bool,
    escape: bool,
    current: String,
}

impl ObjectScanner {
    fn push(&mut self, text: &str, frames: &mut Vec<Frame>) {
        for ch in text.chars() {
            if self.depth == 0 {
                // Array brackets, commas and whitespace between objects.
                if ch == '{' {
                    self.depth = 1;
                    self.current.push(ch);
                }
                continue;
            }

            self.current.push(ch);

            if self.in_string {
                if self.escape {
                    self.escape = false;
                } else if ch == '\\' {
                    self.escape = true;
                } else if ch == '"' {
                    self.in_string = false;
                }
                continue;
            }

            match ch {
                '"' => self.in_string = true,
                '{' => self.depth += 1,
                '}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        frames.push(Frame::Payload(std::mem::take(&mut self.current)));
                    }
                }
                _ => {}
            }
        }
    }

    fn has_partial(&self) -> bool {
        return !self.current.trim().is_empty();
    }
}

/// Incremental decoder for streamed model responses. Feed it raw body chunks
/// as they arrive; it returns every record completed by that chunk.
#[derive(Default)]
pub struct FrameDecoder {
    pending_bytes: Vec<u8>,
    framing: Option<Framing>,
    line: String,
    scanner: ObjectScanner,
    done: bool,
}

impl FrameDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        if self.done {
            return vec![];
        }

        self.pending_bytes.extend_from_slice(chunk);
        let text = self.take_text();

        return self.feed_text(&text);
    }

    /// Flushes whatever is left once the body has ended.
    pub fn finish(&mut self) -> Vec<Frame> {
        if self.done {
            return vec![];
        }

        let mut frames = vec![];
        if !self.pending_bytes.is_empty() {
            let text = String::from_utf8_lossy(&self.pending_bytes).into_owned();
            self.pending_bytes.clear();
            frames = self.feed_text(&text);
        }

        match self.framing {
            Some(Framing::EventStream) => {
                let line = std::mem::take(&mut self.line);
                if let Some(frame) = parse_event_line(&line) {
                    frames.push(frame);
                }
            }
            Some(Framing::JsonArray) => {
                if self.scanner.has_partial() {
                    tracing::warn!(
                        partial = self.scanner.current.as_str(),
                        "Discarding incomplete object at end of stream"
                    );
                }
            }
            None => {}
        }

        self.done = true;
        return frames;
    }

    /// Returns the longest valid UTF-8 prefix of the buffered bytes, keeping a
    /// trailing partial character for the next chunk.
    fn take_text(&mut self) -> String {
        match std::str::from_utf8(&self.pending_bytes) {
            Ok(text) => {
                let text = text.to_string();
                self.pending_bytes.clear();
                return text;
            }
            Err(err) if err.error_len().is_none() => {
                let valid = err.valid_up_to();
                let text = String::from_utf8_lossy(&self.pending_bytes[..valid]).into_owned();
                self.pending_bytes.drain(..valid);
                return text;
            }
            Err(err) => {
                tracing::warn!(error = ?err, "Invalid UTF-8 in response body");
                let text = String::from_utf8_lossy(&self.pending_bytes).into_owned();
                self.pending_bytes.clear();
                return text;
            }
        }
    }

    fn feed_text(&mut self, text: &str) -> Vec<Frame> {
        let mut frames = vec![];

        if self.framing.is_none() {
            match text.trim_start().chars().next() {
                None => return frames,
                Some('[') | Some('{') => self.framing = Some(Framing::JsonArray),
                Some(_) => self.framing = Some(Framing::EventStream),
            }
            tracing::debug!(framing = ?self.framing, "Detected response framing");
        }

        match self.framing {
            Some(Framing::JsonArray) => {
                self.scanner.push(text, &mut frames);
            }
            Some(Framing::EventStream) => {
                self.line.push_str(text);
                while let Some(pos) = self.line.find('\n') {
                    let line: String = self.line.drain(..=pos).collect();
                    match parse_event_line(&line) {
                        Some(Frame::Done) => {
                            self.done = true;
                            self.line.clear();
                            frames.push(Frame::Done);
                            return frames;
                        }
                        Some(frame) => frames.push(frame),
                        None => {}
                    }
                }
            }
            None => {}
        }

        return frames;
    }
}

/// Only `data:` fields carry records. `event:`, `id:`, `retry:` and `:`
/// comment lines are skipped.
fn parse_event_line(line: &str) -> Option<Frame> {
    let line = line.trim();
    let payload = line.strip_prefix("data:")?.trim();

    if payload.is_empty() {
        return None;
    }
    if payload == "[DONE]" {
        return Some(Frame::Done);
    }

    return Some(Frame::Payload(payload.to_string()));
}
