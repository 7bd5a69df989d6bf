use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

use bytes::Bytes;
use evflow_frame::{HeaderValue, Headers, Message, MessageWriter};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::cmd::{open_input, EncodeArgs};
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};

/// One input line: `{"headers": {...}, "payload": ...}`.
///
/// String payloads are written as-is; any other JSON value is written as
/// compact JSON.
#[derive(Debug, Deserialize)]
struct EncodeLine {
    #[serde(default)]
    headers: Map<String, Value>,
    #[serde(default)]
    payload: Value,
}

pub fn run(args: EncodeArgs) -> CliResult<i32> {
    let (input, source) = open_input(&args.input)?;
    let output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(File::create(path).map_err(|err| {
            io_error(&format!("cannot create {}", path.display()), err)
        })?),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = MessageWriter::with_config(output, args.limits.frame_config());

    let mut written = 0usize;
    for (number, line) in BufReader::new(input).lines().enumerate() {
        let line = line.map_err(|err| io_error("read failed", err))?;
        if line.trim().is_empty() {
            continue;
        }
        let message = parse_line(&line)
            .map_err(|msg| CliError::new(DATA_INVALID, format!("line {}: {msg}", number + 1)))?;
        writer
            .write_message(&message)
            .map_err(|err| frame_error("write failed", err))?;
        written += 1;
    }

    info!(source = %source, messages = written, "encode finished");
    Ok(SUCCESS)
}

fn parse_line(line: &str) -> Result<Message, String> {
    let parsed: EncodeLine = serde_json::from_str(line).map_err(|err| err.to_string())?;

    let mut headers = Headers::new();
    for (name, value) in parsed.headers {
        let value = header_value(&name, &value)?;
        headers.push(name, value);
    }

    let payload = match parsed.payload {
        Value::Null => Bytes::new(),
        Value::String(text) => Bytes::from(text),
        other => Bytes::from(other.to_string()),
    };
    Ok(Message::new(headers, payload))
}

fn header_value(name: &str, value: &Value) -> Result<HeaderValue, String> {
    match value {
        Value::String(text) => Ok(HeaderValue::String(text.clone())),
        Value::Bool(flag) => Ok(HeaderValue::Bool(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(n) => Ok(i32::try_from(n)
                .map(HeaderValue::Integer)
                .unwrap_or(HeaderValue::Long(n))),
            None => Err(format!("header {name}: {number} is not an integer")),
        },
        other => Err(format!("header {name}: unsupported value {other}")),
    }
}

#[cfg(test)]
mod tests {
    use evflow_frame::headers::{EVENT_TYPE, MESSAGE_TYPE};

    use super::*;

    #[test]
    fn parses_headers_and_json_payload() {
        let message = parse_line(
            r#"{"headers":{":message-type":"event",":event-type":"Records","seq":7,"big":9999999999},"payload":{"id":1}}"#,
        )
        .unwrap();

        assert_eq!(message.headers.get_str(MESSAGE_TYPE), Some("event"));
        assert_eq!(message.headers.get_str(EVENT_TYPE), Some("Records"));
        assert_eq!(message.headers.get("seq"), Some(&HeaderValue::Integer(7)));
        assert_eq!(
            message.headers.get("big"),
            Some(&HeaderValue::Long(9_999_999_999))
        );
        assert_eq!(message.payload.as_ref(), br#"{"id":1}"#);
    }

    #[test]
    fn string_payload_is_written_verbatim() {
        let message = parse_line(r#"{"payload":"hello"}"#).unwrap();
        assert!(message.headers.is_empty());
        assert_eq!(message.payload.as_ref(), b"hello");
    }

    #[test]
    fn rejects_unsupported_header_values() {
        let err = parse_line(r#"{"headers":{"x":1.5}}"#).unwrap_err();
        assert!(err.contains("not an integer"));

        let err = parse_line(r#"{"headers":{"x":[1]}}"#).unwrap_err();
        assert!(err.contains("unsupported value"));
    }
}
