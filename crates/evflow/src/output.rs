use std::io::{IsTerminal, Write};

use bytes::Bytes;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use evflow_frame::Message;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One line of `decode` output.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub kind: &'static str,
    pub index: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    pub payload_size: usize,
    pub payload: Value,
    #[serde(skip)]
    pub raw: Bytes,
}

pub fn print_event(record: &EventRecord, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "KIND", "EVENT TYPE", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    record.index.to_string(),
                    record.kind.to_string(),
                    record.event_type.clone().unwrap_or_default(),
                    record.payload_size.to_string(),
                    value_text(&record.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "#{} {} type={} size={} payload={}",
                record.index,
                record.kind,
                record.event_type.as_deref().unwrap_or("-"),
                record.payload_size,
                value_text(&record.payload)
            );
        }
        OutputFormat::Raw => print_raw(&record.raw),
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    index: usize,
    message_type: Option<&'a str>,
    event_type: Option<&'a str>,
    headers: Map<String, Value>,
    payload_size: usize,
    payload: String,
}

pub fn print_message(index: usize, message: &Message, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let headers = message
                .headers
                .iter()
                .map(|h| (h.name.clone(), Value::String(h.value.to_string())))
                .collect();
            let out = MessageOutput {
                index,
                message_type: message.message_type(),
                event_type: message.event_type(),
                headers,
                payload_size: message.payload.len(),
                payload: payload_preview(&message.payload),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "HEADER", "VALUE"]);
            for header in &message.headers {
                table.add_row(vec![
                    index.to_string(),
                    header.name.clone(),
                    header.value.to_string(),
                ]);
            }
            table.add_row(vec![
                index.to_string(),
                "<payload>".to_string(),
                format!("{} bytes", message.payload.len()),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let headers: Vec<String> = message
                .headers
                .iter()
                .map(|h| format!("{}={}", h.name, h.value))
                .collect();
            println!(
                "#{index} size={} headers=[{}] payload={}",
                message.wire_size(),
                headers.join(", "),
                payload_preview(&message.payload)
            );
        }
        OutputFormat::Raw => print_raw(&message.payload),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

/// JSON payloads stay structured; anything else becomes a preview string.
pub fn payload_value(payload: &[u8]) -> Value {
    serde_json::from_slice(payload).unwrap_or_else(|_| Value::String(payload_preview(payload)))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_payloads_stay_structured() {
        assert_eq!(payload_value(br#"{"a":1}"#)["a"], 1);
        assert_eq!(payload_value(b"plain"), Value::String("plain".into()));
        assert_eq!(
            payload_value(&[0xff, 0xfe]),
            Value::String("<binary 2 bytes>".into())
        );
    }
}
