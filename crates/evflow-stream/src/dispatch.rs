//! Message classification.

use evflow_frame::headers::{
    ERROR_CODE, ERROR_MESSAGE, INITIAL_RESPONSE, MESSAGE_TYPE_ERROR, MESSAGE_TYPE_EVENT,
};
use evflow_frame::Message;

/// What a decoded message means to the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Marks the point where the initial response is handed to the handler.
    InitialResponse,
    /// An ordinary event to unmarshal and deliver.
    Event,
    /// An event message without an `:event-type` header.
    MissingEventType,
    /// A protocol error reported by the peer.
    Error { code: String, message: String },
    /// Any other `:message-type`, including none at all.
    Other(Option<String>),
}

/// Classify a message by its `:message-type` and `:event-type` headers.
pub fn classify(message: &Message) -> FrameKind {
    match message.message_type() {
        Some(MESSAGE_TYPE_EVENT) => match message.event_type() {
            Some(INITIAL_RESPONSE) => FrameKind::InitialResponse,
            Some(_) => FrameKind::Event,
            None => FrameKind::MissingEventType,
        },
        Some(MESSAGE_TYPE_ERROR) => FrameKind::Error {
            code: header_or_empty(message, ERROR_CODE),
            message: header_or_empty(message, ERROR_MESSAGE),
        },
        other => FrameKind::Other(other.map(str::to_string)),
    }
}

fn header_or_empty(message: &Message, name: &str) -> String {
    message
        .headers
        .get(name)
        .map(ToString::to_string)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use evflow_frame::headers::{EVENT_TYPE, MESSAGE_TYPE, MESSAGE_TYPE_EXCEPTION};
    use evflow_frame::Headers;

    use super::*;

    fn message(headers: Headers) -> Message {
        Message::new(headers, Bytes::new())
    }

    #[test]
    fn initial_response_marker() {
        let m = message(
            Headers::new()
                .with(MESSAGE_TYPE, MESSAGE_TYPE_EVENT)
                .with(EVENT_TYPE, INITIAL_RESPONSE),
        );
        assert_eq!(classify(&m), FrameKind::InitialResponse);
    }

    #[test]
    fn ordinary_event() {
        let m = message(
            Headers::new()
                .with(MESSAGE_TYPE, MESSAGE_TYPE_EVENT)
                .with(EVENT_TYPE, "Records"),
        );
        assert_eq!(classify(&m), FrameKind::Event);
    }

    #[test]
    fn event_without_event_type() {
        let m = message(Headers::new().with(MESSAGE_TYPE, MESSAGE_TYPE_EVENT));
        assert_eq!(classify(&m), FrameKind::MissingEventType);
    }

    #[test]
    fn error_carries_code_and_message() {
        let m = message(
            Headers::new()
                .with(MESSAGE_TYPE, MESSAGE_TYPE_ERROR)
                .with(ERROR_CODE, "ThrottlingException")
                .with(ERROR_MESSAGE, "slow down"),
        );
        assert_eq!(
            classify(&m),
            FrameKind::Error {
                code: "ThrottlingException".to_string(),
                message: "slow down".to_string(),
            }
        );
    }

    #[test]
    fn error_without_details_uses_empty_strings() {
        let m = message(Headers::new().with(MESSAGE_TYPE, MESSAGE_TYPE_ERROR));
        assert_eq!(
            classify(&m),
            FrameKind::Error {
                code: String::new(),
                message: String::new(),
            }
        );
    }

    #[test]
    fn unknown_kinds_are_other() {
        let exception = message(Headers::new().with(MESSAGE_TYPE, MESSAGE_TYPE_EXCEPTION));
        assert_eq!(
            classify(&exception),
            FrameKind::Other(Some("exception".to_string()))
        );
        assert_eq!(classify(&message(Headers::new())), FrameKind::Other(None));
    }
}
