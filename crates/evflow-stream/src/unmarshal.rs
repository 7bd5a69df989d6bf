//! Adapting messages for per-event unmarshallers.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::marker::PhantomData;

use bytes::{Buf, Bytes};
use evflow_frame::Message;
use serde::de::DeserializeOwned;

use crate::error::BoxError;

/// The view of an event message handed to an [`EventUnmarshaller`].
///
/// Header values are rendered as strings; the payload is exposed as a
/// readable body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventResponse {
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl EventResponse {
    pub fn new(headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    /// First header with this name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// All headers, in wire order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> impl Read {
        self.body.clone().reader()
    }

    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }
}

impl From<Message> for EventResponse {
    fn from(message: Message) -> Self {
        let headers = message
            .headers
            .iter()
            .map(|header| (header.name.clone(), header.value.to_string()))
            .collect();
        Self {
            headers,
            body: message.payload,
        }
    }
}

/// Attributes shared by every unmarshal call of one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnmarshalContext {
    attributes: BTreeMap<String, String>,
}

impl UnmarshalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Turns one event message into a typed event.
pub trait EventUnmarshaller: Send + Sync + 'static {
    type Event;

    fn unmarshal(
        &self,
        response: &EventResponse,
        context: &UnmarshalContext,
    ) -> Result<Self::Event, BoxError>;
}

impl<F, E> EventUnmarshaller for F
where
    F: Fn(&EventResponse, &UnmarshalContext) -> Result<E, BoxError> + Send + Sync + 'static,
{
    type Event = E;

    fn unmarshal(&self, response: &EventResponse, context: &UnmarshalContext) -> Result<E, BoxError> {
        self(response, context)
    }
}

/// Deserializes the payload of every event as JSON.
pub struct JsonEventUnmarshaller<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonEventUnmarshaller<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonEventUnmarshaller<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonEventUnmarshaller<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonEventUnmarshaller").finish()
    }
}

impl<T: DeserializeOwned + 'static> EventUnmarshaller for JsonEventUnmarshaller<T> {
    type Event = T;

    fn unmarshal(&self, response: &EventResponse, _context: &UnmarshalContext) -> Result<T, BoxError> {
        Ok(serde_json::from_reader(response.body())?)
    }
}
