//! WebSocket viewer protocol
//!
//! Every frame is a JSON object tagged by `type`; field names follow the
//! dashboard's camelCase convention.

use serde::{Deserialize, Serialize};

/// Messages sent by a viewer
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Watch a registered stream
    #[serde(rename = "subscribe-stream")]
    SubscribeStream {
        #[serde(rename = "streamId")]
        stream_id: String,
    },

    /// Stop watching a stream without closing the socket
    #[serde(rename = "unsubscribe-stream")]
    UnsubscribeStream {
        #[serde(rename = "streamId")]
        stream_id: String,
    },

    /// Relay an unregistered URL
    #[serde(rename = "connect-rtsp")]
    ConnectRtsp { url: String },

    /// Close an ad-hoc relay for every viewer
    #[serde(rename = "disconnect-rtsp")]
    DisconnectRtsp {
        #[serde(rename = "streamId")]
        stream_id: String,
    },
}

/// Messages pushed to a viewer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// One base64-encoded chunk of transcoder output
    #[serde(rename = "stream-data")]
    StreamData {
        #[serde(rename = "streamId")]
        stream_id: String,
        data: String,
    },

    /// The relay for this stream stopped
    #[serde(rename = "stream-error")]
    StreamError {
        #[serde(rename = "streamId")]
        stream_id: String,
        message: String,
    },

    /// Subscription to a registered stream accepted
    #[serde(rename = "subscribed")]
    Subscribed {
        #[serde(rename = "streamId")]
        stream_id: String,
    },

    /// Ad-hoc relay started
    #[serde(rename = "rtsp-connected")]
    RtspConnected {
        #[serde(rename = "streamId")]
        stream_id: String,
    },

    /// Ad-hoc relay could not be started
    #[serde(rename = "rtsp-error")]
    RtspError { message: String },

    /// Malformed request or unknown stream
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_messages_parse() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe-stream","streamId":"abc"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::SubscribeStream {
                stream_id: "abc".to_string()
            }
        );

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"connect-rtsp","url":"rtsp://cam/1"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::ConnectRtsp {
                url: "rtsp://cam/1".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_client_message_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"reboot"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe-stream"}"#).is_err());
    }

    #[test]
    fn test_stream_data_wire_format() {
        let msg = ServerMessage::StreamData {
            stream_id: "abc".to_string(),
            data: "AAEC".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "stream-data", "streamId": "abc", "data": "AAEC"})
        );
    }
}
