use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;

/// One framed message, exactly as the sender wrote it.
///
/// Cheap to clone: the bytes are shared, so every subscriber sees the same
/// buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    bytes: Bytes,
}

impl RawMessage {
    /// Wrap framed bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// The framed bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the message and return its bytes.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Size of the message in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The message as UTF-8 text. Invalid sequences become U+FFFD.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// True if the message is empty or only whitespace.
    pub fn is_blank(&self) -> bool {
        self.text().trim().is_empty()
    }
}

impl fmt::Display for RawMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

impl From<&'static str> for RawMessage {
    fn from(text: &'static str) -> Self {
        Self::new(Bytes::from_static(text.as_bytes()))
    }
}

impl From<String> for RawMessage {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_detection() {
        assert!(RawMessage::from("").is_blank());
        assert!(RawMessage::from(" \r\n\t").is_blank());
        assert!(!RawMessage::from(" {} ").is_blank());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let msg = RawMessage::new(vec![b'o', b'k', 0xFF]);
        assert_eq!(msg.text(), "ok\u{FFFD}");
        assert_eq!(msg.len(), 3);
        assert_eq!(msg.as_bytes(), &[b'o', b'k', 0xFF]);
    }

    #[test]
    fn display_is_text() {
        let msg = RawMessage::from(String::from("{\"action\":\"quit\"}"));
        assert_eq!(msg.to_string(), "{\"action\":\"quit\"}");
    }
}
