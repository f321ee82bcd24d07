//! WebSocket wire format.
//!
//! All frames are JSON text. Clients send subscription control requests;
//! the server answers with acknowledgement or error frames and pushes data
//! frames keyed by topic.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Acknowledgement message for a subscribe request.
pub const MSG_SUBSCRIBED: &str = "subscribed";
/// Acknowledgement message for an unsubscribe request.
pub const MSG_UNSUBSCRIBED: &str = "unsubscribed";

/// Control request sent by a client.
///
/// `{"event":"subscribe","streams":["eurusd.trades"]}`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ClientRequest {
    Subscribe { streams: Vec<String> },
    Unsubscribe { streams: Vec<String> },
}

/// Frame pushed by the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerFrame {
    /// `{"success":{"message":"subscribed","streams":[...]}}`
    Success {
        message: &'static str,
        streams: Vec<String>,
    },
    /// `{"error":{"message":"..."}}`
    Error { message: String },
}

impl ServerFrame {
    pub fn ack(message: &'static str, streams: Vec<String>) -> Self {
        ServerFrame::Success { message, streams }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            message: message.into(),
        }
    }

    /// Serialize to the wire representation.
    pub fn render(&self) -> String {
        // Serialization of these shapes cannot fail; fall back to a bare
        // error frame if it ever does.
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"error":{"message":"internal error"}}"#.to_string())
    }
}

/// Render a data frame: a single-key object mapping the topic to the
/// decoded payload.
pub fn data_frame(topic: &str, payload: &Value) -> String {
    json!({ topic: payload }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subscribe_request() {
        let req: ClientRequest = serde_json::from_str(
            r#"{"event":"subscribe","streams":["eurusd.trades","alice.order"]}"#,
        )
        .unwrap();
        match req {
            ClientRequest::Subscribe { streams } => {
                assert_eq!(streams, vec!["eurusd.trades", "alice.order"]);
            }
            _ => panic!("expected subscribe"),
        }
    }

    #[test]
    fn parses_unsubscribe_request() {
        let req: ClientRequest =
            serde_json::from_str(r#"{"event":"unsubscribe","streams":[]}"#).unwrap();
        assert!(matches!(req, ClientRequest::Unsubscribe { .. }));
    }

    #[test]
    fn rejects_unknown_event() {
        assert!(
            serde_json::from_str::<ClientRequest>(r#"{"event":"publish","streams":[]}"#).is_err()
        );
        assert!(serde_json::from_str::<ClientRequest>("not json").is_err());
    }

    #[test]
    fn renders_subscribe_ack() {
        let frame = ServerFrame::ack(MSG_SUBSCRIBED, vec!["eurusd.trades".to_string()]);
        assert_eq!(
            frame.render(),
            r#"{"success":{"message":"subscribed","streams":["eurusd.trades"]}}"#
        );
    }

    #[test]
    fn renders_unsubscribe_ack_with_empty_streams() {
        let frame = ServerFrame::ack(MSG_UNSUBSCRIBED, vec![]);
        assert_eq!(
            frame.render(),
            r#"{"success":{"message":"unsubscribed","streams":[]}}"#
        );
    }

    #[test]
    fn renders_error_frame() {
        let frame = ServerFrame::error("bad frame");
        assert_eq!(frame.render(), r#"{"error":{"message":"bad frame"}}"#);
    }

    #[test]
    fn renders_data_frame() {
        let payload: Value = serde_json::from_str(r#"{"price":"1.10"}"#).unwrap();
        assert_eq!(
            data_frame("eurusd.trades", &payload),
            r#"{"eurusd.trades":{"price":"1.10"}}"#
        );
    }
}
