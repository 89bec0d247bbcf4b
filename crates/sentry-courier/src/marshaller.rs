// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Event marshalling to the JSON wire format.
//!
//! One JSON object per event, fields in a fixed order, optionally
//! deflate-compressed and base64-encoded. The encoder is total: malformed
//! or unsupported application data degrades to omission or a string
//! fallback, never to a failed event.

use crate::bindings::InterfaceBinding;
use crate::event::{Event, ExtraValue};
use base64::Engine;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde_json::{Map, Number, Value};
use std::any::TypeId;
use std::collections::HashMap;
use std::io::{self, Write};
use tracing::{debug, error};

/// Maximum length of a message on the wire; longer messages are truncated
/// at encoding time only.
pub const MAX_MESSAGE_LENGTH: usize = 1000;

/// Turns an event into bytes for transmission.
///
/// Must not fail for any well-formed [`Event`], including arbitrary
/// `extra` content; errors come only from the byte sink.
pub trait Marshaller: Send + Sync {
    fn marshall(&self, event: &Event, dst: &mut dyn io::Write) -> io::Result<()>;
}

/// JSON marshaller with a pluggable sub-payload binding registry.
///
/// The registry is keyed by the concrete payload type and is fixed before
/// the marshaller is shared with the pipeline, so concurrent encodes need
/// no locking.
pub struct JsonMarshaller {
    bindings: HashMap<TypeId, Box<dyn InterfaceBinding>>,
    compression: bool,
}

impl Default for JsonMarshaller {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonMarshaller {
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
            compression: true,
        }
    }

    /// Register the binding encoding payloads of concrete type `T`.
    pub fn add_binding<T: crate::payload::InterfacePayload>(
        &mut self,
        binding: Box<dyn InterfaceBinding>,
    ) {
        self.bindings.insert(TypeId::of::<T>(), binding);
    }

    /// Enable or disable the deflate+base64 envelope.
    pub fn set_compression(&mut self, compression: bool) {
        self.compression = compression;
    }

    fn encode(&self, event: &Event) -> Value {
        let mut doc = Map::new();

        doc.insert("event_id".to_string(), Value::String(format_id(event)));
        doc.insert(
            "message".to_string(),
            opt_string(event.message().map(format_message)),
        );
        doc.insert(
            "timestamp".to_string(),
            Value::String(event.timestamp().format("%Y-%m-%dT%H:%M:%S").to_string()),
        );
        doc.insert(
            "level".to_string(),
            opt_string(event.level().map(|l| l.as_str().to_string())),
        );
        doc.insert("logger".to_string(), opt_str(event.logger()));
        doc.insert("platform".to_string(), opt_str(event.platform()));
        doc.insert("culprit".to_string(), opt_str(event.culprit()));
        doc.insert(
            "tags".to_string(),
            Value::Object(
                event
                    .tags()
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
        );
        doc.insert("server_name".to_string(), opt_str(event.server_name()));
        doc.insert(
            "extra".to_string(),
            Value::Object(
                event
                    .extra()
                    .iter()
                    .map(|(k, v)| (k.clone(), safe_extra_value(v)))
                    .collect(),
            ),
        );
        doc.insert("checksum".to_string(), opt_str(event.checksum()));

        for (name, payload) in event.interfaces() {
            let Some(binding) = self.bindings.get(&payload.as_any().type_id()) else {
                error!(
                    "Couldn't parse the content of '{}' provided in {:?}",
                    name, payload
                );
                continue;
            };
            match binding.write(payload.as_ref()) {
                Ok(value) => {
                    doc.insert(name.clone(), value);
                }
                Err(e) => {
                    error!("Failed to encode the content of '{}': {}", name, e);
                }
            }
        }

        Value::Object(doc)
    }
}

impl Marshaller for JsonMarshaller {
    fn marshall(&self, event: &Event, dst: &mut dyn io::Write) -> io::Result<()> {
        let document = self.encode(event);
        let bytes = serde_json::to_vec(&document)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if self.compression {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&bytes)?;
            let compressed = encoder.finish()?;
            let encoded = base64::engine::general_purpose::STANDARD.encode(compressed);
            dst.write_all(encoded.as_bytes())
        } else {
            dst.write_all(&bytes)
        }
    }
}

/// 32 lowercase hex characters, no separators.
fn format_id(event: &Event) -> String {
    event.id().simple().to_string()
}

/// Shorten a message to the wire limit; the in-process event keeps the
/// original.
fn format_message(message: &str) -> String {
    if message.chars().count() > MAX_MESSAGE_LENGTH {
        message.chars().take(MAX_MESSAGE_LENGTH).collect()
    } else {
        message.to_string()
    }
}

fn opt_str(value: Option<&str>) -> Value {
    value
        .map(|s| Value::String(s.to_string()))
        .unwrap_or(Value::Null)
}

fn opt_string(value: Option<String>) -> Value {
    value.map(Value::String).unwrap_or(Value::Null)
}

/// Encode an extra value, recursing through containers and falling back to
/// the string form for anything the writer cannot represent.
fn safe_extra_value(value: &ExtraValue) -> Value {
    match value {
        ExtraValue::Null => Value::Null,
        ExtraValue::Bool(b) => Value::Bool(*b),
        ExtraValue::Int(i) => Value::Number((*i).into()),
        ExtraValue::Uint(u) => Value::Number((*u).into()),
        ExtraValue::Float(f) => match Number::from_f64(*f) {
            Some(n) => Value::Number(n),
            None => {
                debug!("Couldn't marshal '{}', had to be converted into a String", f);
                Value::String(f.to_string())
            }
        },
        ExtraValue::String(s) => Value::String(s.clone()),
        ExtraValue::List(items) => Value::Array(items.iter().map(safe_extra_value).collect()),
        ExtraValue::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), safe_extra_value(v)))
                .collect(),
        ),
        ExtraValue::Opaque(opaque) => {
            debug!("Couldn't marshal an opaque value, had to be converted into a String");
            Value::String(format!("{opaque:?}"))
        }
    }
}
