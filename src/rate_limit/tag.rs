//! Counter keys built from ordered, typed segments.

use std::fmt;
use std::net::IpAddr;

/// Separator written after every segment.
pub const DELIMITER: char = ':';

const ESCAPE: char = '\\';

/// One component of a counter key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagSegment {
    /// Name of the rate limited action, e.g. `requests`.
    Name(String),
    /// Resolved client address; `None` renders as an empty segment so all
    /// unidentifiable traffic shares one bucket.
    ClientIp(Option<IpAddr>),
    /// Caller supplied identity for authenticated flows.
    UserId(String),
}

impl TagSegment {
    fn write_escaped(&self, out: &mut String) {
        match self {
            TagSegment::Name(value) | TagSegment::UserId(value) => escape_into(value, out),
            TagSegment::ClientIp(Some(ip)) => escape_into(&ip.to_string(), out),
            TagSegment::ClientIp(None) => {}
        }
    }
}

fn escape_into(value: &str, out: &mut String) {
    for ch in value.chars() {
        if ch == DELIMITER || ch == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(ch);
    }
}

/// Ordered list of segments identifying one rate limited action.
///
/// The rendered key is each segment followed by [`DELIMITER`], in insertion
/// order. Delimiter and escape characters inside a segment are
/// backslash-escaped, so distinct segment lists never render to the same key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Tag {
    segments: Vec<TagSegment>,
}

impl Tag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment, returning the extended tag.
    pub fn push(mut self, segment: TagSegment) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn segments(&self) -> &[TagSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Render the counter store key (without the store namespace prefix).
    pub fn key(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            segment.write_escaped(&mut out);
            out.push(DELIMITER);
        }
        out
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
