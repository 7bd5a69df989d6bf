use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use evflow_frame::headers::EVENT_TYPE;
use evflow_stream::{
    execute, BoxError, EventPublisher, EventResponse, EventSubscriber, EventSubscription,
    FlowConfig, FlowError, FlowResponseHandler, UnmarshalContext,
};
use evflow_transport::{PullPublisher, SourceConfig};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::cmd::{open_input, DecodeArgs};
use crate::exit::{flow_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{payload_value, print_event, EventRecord, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    if args.chunk_size == 0 {
        return Err(CliError::new(USAGE, "--chunk-size must be at least 1"));
    }
    if args.count == Some(0) {
        return Err(CliError::new(USAGE, "--count must be at least 1"));
    }

    let (input, source) = open_input(&args.input)?;
    let publisher = PullPublisher::from_reader_with_config(
        input,
        SourceConfig {
            chunk_size: args.chunk_size,
        },
    );
    let config = FlowConfig {
        frame: args.limits.frame_config(),
        ..FlowConfig::default()
    };
    let printer = Arc::new(Printer::new(format, args.count));
    let handler = DecodeHandler {
        printer: Arc::clone(&printer),
    };

    let outcome = execute(handler, unmarshal_record, config, source, &publisher)
        .map_err(|err| flow_error("decode failed", &err))?;

    // Reading is synchronous: with unbounded demand the stream has resolved
    // by now, with --count it may have stopped early.
    let result = match args.count {
        Some(_) => outcome.try_take(),
        None => Some(outcome.wait()),
    };
    match result {
        Some(Ok(events)) => {
            info!(events, "event stream complete");
            Ok(SUCCESS)
        }
        Some(Err(err)) => Err(flow_error("decode failed", &err)),
        None => {
            debug!(events = printer.printed(), "stopped after requested count");
            Ok(SUCCESS)
        }
    }
}

fn unmarshal_record(
    response: &EventResponse,
    _context: &UnmarshalContext,
) -> Result<EventRecord, BoxError> {
    let raw = response.body_bytes().clone();
    Ok(EventRecord {
        kind: "event",
        index: 0,
        event_type: response.header(EVENT_TYPE).map(str::to_string),
        payload_size: raw.len(),
        payload: payload_value(&raw),
        raw,
    })
}

/// Prints events as they arrive.
struct Printer {
    format: OutputFormat,
    limit: Option<u64>,
    printed: AtomicU64,
    subscription: OnceLock<EventSubscription>,
}

impl Printer {
    fn new(format: OutputFormat, limit: Option<u64>) -> Self {
        Self {
            format,
            limit,
            printed: AtomicU64::new(0),
            subscription: OnceLock::new(),
        }
    }

    fn printed(&self) -> u64 {
        self.printed.load(Ordering::SeqCst)
    }

    fn print_initial_response(&self, source: &str) {
        print_event(
            &EventRecord {
                kind: "initial-response",
                index: 0,
                event_type: None,
                payload_size: 0,
                payload: json!({ "source": source }),
                raw: Bytes::new(),
            },
            self.format,
        );
    }
}

impl EventSubscriber<EventRecord> for Printer {
    fn on_subscribe(&self, subscription: EventSubscription) {
        let subscription = self.subscription.get_or_init(|| subscription);
        subscription.request(self.limit.unwrap_or(u64::MAX));
    }

    fn on_next(&self, mut record: EventRecord) -> Result<(), BoxError> {
        // Events of an already decoded chunk can still arrive after cancel.
        if self.limit.is_some_and(|limit| self.printed() >= limit) {
            return Ok(());
        }
        record.index = self.printed.fetch_add(1, Ordering::SeqCst) + 1;
        print_event(&record, self.format);

        if self.limit == Some(record.index) {
            if let Some(subscription) = self.subscription.get() {
                subscription.cancel();
            }
        }
        Ok(())
    }

    fn on_error(&self, error: &FlowError) -> Result<(), BoxError> {
        debug!(error = %error, printed = self.printed(), "event stream failed");
        Ok(())
    }
}

struct DecodeHandler {
    printer: Arc<Printer>,
}

impl FlowResponseHandler for DecodeHandler {
    /// Name of the input the stream is read from.
    type Response = String;
    type Event = EventRecord;
    type Output = u64;

    fn response_received(&self, source: String) {
        self.printer.print_initial_response(&source);
    }

    fn on_stream(&self, publisher: EventPublisher<EventRecord>) {
        if let Err(err) = publisher.subscribe(self.printer.clone()) {
            warn!(error = %err, "could not subscribe to events");
        }
    }

    fn exception_occurred(&self, error: &FlowError) {
        debug!(error = %error, "decode failed");
    }

    fn complete(&self) -> Result<u64, FlowError> {
        Ok(self.printer.printed())
    }
}
