//! Push frame codec.
//!
//! Frames are JSON text of the form `{"event": "<name>", "data": <payload>}`.

use hub_core::{NOTIFICATION_EVENT, Notification};
use serde::{Deserialize, Serialize};

use crate::{StreamError, StreamResult};

#[derive(Debug, Serialize, Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// A decoded push frame.
#[derive(Debug, Clone, PartialEq)]
pub enum PushFrame {
    /// A new notification.
    Notification(Notification),
    /// Any other event; ignored by this client.
    Other {
        /// Event name.
        event: String,
    },
}

impl PushFrame {
    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::ParseError`] for malformed JSON or a
    /// `notification` event whose payload is not a notification.
    pub fn decode(text: &str) -> StreamResult<Self> {
        let raw: RawFrame =
            serde_json::from_str(text).map_err(|e| StreamError::ParseError(e.to_string()))?;
        if raw.event != NOTIFICATION_EVENT {
            return Ok(Self::Other { event: raw.event });
        }
        let notification = serde_json::from_value(raw.data)
            .map_err(|e| StreamError::ParseError(format!("notification payload: {e}")))?;
        Ok(Self::Notification(notification))
    }

    /// Encode a notification as a push frame.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::ParseError`] if serialization fails.
    pub fn encode_notification(notification: &Notification) -> StreamResult<String> {
        let data =
            serde_json::to_value(notification).map_err(|e| StreamError::ParseError(e.to_string()))?;
        serde_json::to_string(&RawFrame {
            event: NOTIFICATION_EVENT.to_string(),
            data,
        })
        .map_err(|e| StreamError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::NotificationKind;

    #[test]
    fn decodes_notification_event() {
        let frame = PushFrame::decode(
            r#"{"event":"notification","data":{"id":"n1","type":"comment","title":"New comment","isRead":false,"createdAt":"2024-05-01T10:00:00Z"}}"#,
        )
        .unwrap();
        let PushFrame::Notification(n) = frame else {
            panic!("expected notification, got {frame:?}");
        };
        assert_eq!(n.id, "n1");
        assert_eq!(n.kind, NotificationKind::Comment);
        assert!(!n.read);
    }

    #[test]
    fn other_events_are_named() {
        let frame = PushFrame::decode(r#"{"event":"presence","data":{"online":3}}"#).unwrap();
        assert_eq!(
            frame,
            PushFrame::Other {
                event: "presence".into()
            }
        );
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = PushFrame::decode("{not json").unwrap_err();
        assert!(matches!(err, StreamError::ParseError(_)));
    }

    #[test]
    fn notification_without_payload_is_parse_error() {
        let err = PushFrame::decode(r#"{"event":"notification"}"#).unwrap_err();
        assert!(err.to_string().contains("notification payload"));
    }

    #[test]
    fn encoded_frame_decodes() {
        let n = Notification::new("n2", NotificationKind::Follow, "New follower");
        let text = PushFrame::encode_notification(&n).unwrap();
        assert_eq!(PushFrame::decode(&text).unwrap(), PushFrame::Notification(n));
    }
}
