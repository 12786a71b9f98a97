//! The immutable STOMP frame value (C1) and the heart-beat sentinel.

use bytes::{BufMut, BytesMut};

use crate::codec;
use crate::spec::{self, StompVersion};

/// An immutable STOMP frame: a command, headers, a body, and the protocol
/// version that governs its wire encoding.
///
/// Two frames are equal iff their serialized wire forms are byte-identical
/// (see [`Frame::to_bytes`]).
#[derive(Debug, Clone)]
pub struct Frame {
    command: String,
    /// Present only on frames produced by the parser: preserves duplicate
    /// header lines in their original order.
    raw_headers: Option<Vec<(String, String)>>,
    /// The deduplicated header store. For frames built via the command
    /// constructors this is the only header storage; for parsed frames it is
    /// derived from `raw_headers` (first occurrence per name) and kept in
    /// sync so that `header()` lookups stay cheap.
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    version: StompVersion,
}

impl Frame {
    /// An empty frame for `command` at `version`; headers and body are added
    /// with [`Frame::set_header`]/[`Frame::set_body`] or via [`Frame::with_headers`].
    pub fn new(command: impl Into<String>, version: StompVersion) -> Frame {
        Frame {
            command: command.into(),
            raw_headers: None,
            headers: Vec::new(),
            body: Vec::new(),
            version,
        }
    }

    pub fn with_headers(
        command: impl Into<String>,
        headers: impl IntoIterator<Item = (String, String)>,
        body: Vec<u8>,
        version: StompVersion,
    ) -> Frame {
        let mut frame = Frame::new(command, version);
        for (name, value) in headers {
            frame.set_header(name, value);
        }
        frame.body = body;
        frame
    }

    /// Used by the parser to construct a frame that carries raw (possibly
    /// duplicate) header lines in original order.
    pub(crate) fn from_raw_parts(
        command: String,
        raw_headers: Vec<(String, String)>,
        body: Vec<u8>,
        version: StompVersion,
    ) -> Frame {
        let headers = dedup_first(&raw_headers);
        Frame {
            command,
            raw_headers: Some(raw_headers),
            headers,
            body,
            version,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn version(&self) -> StompVersion {
        self.version
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    /// The deduplicated header view: one entry per name, keeping the first
    /// occurrence seen on the wire (or, for builder frames, whatever value
    /// was last set for that name).
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The raw header list as parsed off the wire, preserving duplicates, or
    /// `None` for a frame that was never parsed (or has been [`Frame::unraw`]'d).
    pub fn raw_headers(&self) -> Option<&[(String, String)]> {
        self.raw_headers.as_deref()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    /// Insert or overwrite a header in the deduplicated store, preserving its
    /// existing position if it was already present.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Discard the raw header list in favor of the deduplicated mapping.
    /// Returns an equivalent frame (same wire form) with `raw_headers() == None`.
    pub fn unraw(&self) -> Frame {
        Frame {
            command: self.command.clone(),
            raw_headers: None,
            headers: self.headers.clone(),
            body: self.body.clone(),
            version: self.version,
        }
    }

    /// Serialize this frame to its wire-level byte representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = BytesMut::with_capacity(64 + self.body.len());
        self.serialize(&mut buffer);
        buffer.to_vec()
    }

    /// Serialize into an existing buffer, growing it as needed. Mirrors the
    /// teacher crate's `Frame::serialize` shape.
    pub fn serialize(&self, buffer: &mut BytesMut) {
        let command_bytes = self.encode(&self.command);
        buffer.put_slice(&command_bytes);
        buffer.put_u8(spec::LINE_DELIMITER);

        for (name, value) in self.headers_for_wire() {
            let escaped_name = codec::escape(self.version, &self.command, name);
            let escaped_value = codec::escape(self.version, &self.command, value);
            buffer.put_slice(&self.encode(&escaped_name));
            buffer.put_u8(spec::HEADER_SEPARATOR);
            buffer.put_slice(&self.encode(&escaped_value));
            buffer.put_u8(spec::LINE_DELIMITER);
        }
        buffer.put_u8(spec::LINE_DELIMITER);
        buffer.put_slice(&self.body);
        buffer.put_u8(spec::FRAME_DELIMITER);
    }

    /// The headers to put on the wire, in the order they should appear: the
    /// raw list verbatim if present, else the deduplicated map sorted by
    /// name (a stable, implementation-defined order per the spec).
    fn headers_for_wire(&self) -> Vec<(&str, &str)> {
        match &self.raw_headers {
            Some(raw) => raw.iter().map(|(n, v)| (n.as_str(), v.as_str())).collect(),
            None => {
                let mut pairs: Vec<(&str, &str)> = self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str())).collect();
                pairs.sort_by(|a, b| a.0.cmp(b.0));
                pairs
            }
        }
    }

    fn encode(&self, text: &str) -> Vec<u8> {
        if spec::is_ascii_only(self.version) {
            // Matches the codec of the original implementation: command and
            // header text is US-ASCII under 1.0. Non-ASCII input is encoded
            // lossily rather than panicking; callers that need strict
            // rejection should validate before constructing the frame.
            text.chars().map(|c| if c.is_ascii() { c as u8 } else { b'?' }).collect()
        } else {
            text.as_bytes().to_vec()
        }
    }

    /// A short, log-friendly description of the frame (command, header
    /// count, truncated body length, version) — never includes full header
    /// values or body content.
    pub fn info(&self) -> String {
        format!(
            "{} frame [headers={}, body_len={}, version={}]",
            self.command,
            self.headers.len(),
            self.body.len(),
            self.version
        )
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}
impl Eq for Frame {}

fn dedup_first(raw: &[(String, String)]) -> Vec<(String, String)> {
    let mut seen: Vec<(String, String)> = Vec::new();
    for (name, value) in raw {
        if !seen.iter().any(|(n, _)| n == name) {
            seen.push((name.clone(), value.clone()));
        }
    }
    seen
}

/// A STOMP heart-beat: a single line-delimiter byte on the wire. Only
/// produced/consumed in protocol version 1.1 and above.
#[derive(Debug, Clone, Copy)]
pub struct HeartBeat {
    version: StompVersion,
}

impl HeartBeat {
    pub fn new(version: StompVersion) -> HeartBeat {
        HeartBeat { version }
    }

    pub fn version(self) -> StompVersion {
        self.version
    }

    pub fn to_bytes(self) -> [u8; 1] {
        [spec::LINE_DELIMITER]
    }

    pub fn info(self) -> &'static str {
        "heart-beat"
    }
}

impl PartialEq for HeartBeat {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}
impl Eq for HeartBeat {}
