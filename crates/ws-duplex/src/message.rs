//! Message payloads and close descriptors exchanged over the adapter.

/// A single decoded message, either text or raw bytes.
///
/// Application-level framing of the payload is out of scope; the adapter
/// relays whatever the transport decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl Message {
    /// Build a text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Build a binary message.
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::Binary(data.into())
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the payload as text, if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(data)
    }
}

/// Normal-closure descriptor: protocol close code plus UTF-8 reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    /// Normal closure, the protocol's default close code.
    pub const NORMAL_CODE: u16 = 1000;
    /// The peer closed without supplying a status code.
    pub const NO_STATUS_CODE: u16 = 1005;
    /// The connection ended without a close handshake.
    pub const ABNORMAL_CODE: u16 = 1006;

    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Code 1000 with an empty reason.
    pub fn normal() -> Self {
        Self::new(Self::NORMAL_CODE, "")
    }

    /// Whether the code falls in the protocol's normal-closure range.
    pub fn is_normal(&self) -> bool {
        (1000..2000).contains(&self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_conversions() {
        assert_eq!(Message::from("hi"), Message::Text("hi".to_string()));
        assert_eq!(Message::from(vec![1u8, 2]), Message::Binary(vec![1, 2]));
        assert_eq!(Message::text("hi").as_text(), Some("hi"));
        assert_eq!(Message::binary(vec![1u8]).as_text(), None);
        assert_eq!(Message::text("abc").len(), 3);
        assert!(Message::binary(Vec::new()).is_empty());
    }

    #[test]
    fn close_frame_ranges() {
        assert!(CloseFrame::normal().is_normal());
        assert!(CloseFrame::new(1001, "going away").is_normal());
        assert!(!CloseFrame::new(3000, "").is_normal());
    }
}
