// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Immutable event value objects.
//!
//! An [`Event`] describes one reportable occurrence. It is built once via
//! [`EventBuilder`], handed to the outward-facing connection and consumed by
//! exactly one encode pass on a delivery worker; after construction it is
//! never mutated, so concurrent reads are always safe.

use crate::payload::InterfacePayload;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl Level {
    /// Wire representation of the level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

/// An arbitrary value attached to an event's `extra` mapping.
///
/// The encoder is total over this type: values the JSON writer cannot
/// represent natively (non-finite floats, [`ExtraValue::Opaque`]) fall back
/// to their string form instead of failing the event.
#[derive(Debug, Clone)]
pub enum ExtraValue {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    List(Vec<ExtraValue>),
    Map(BTreeMap<String, ExtraValue>),
    /// A value with no native JSON representation; encoded via its
    /// `Debug` rendering.
    Opaque(Arc<dyn fmt::Debug + Send + Sync>),
}

impl From<bool> for ExtraValue {
    fn from(value: bool) -> Self {
        ExtraValue::Bool(value)
    }
}

impl From<i32> for ExtraValue {
    fn from(value: i32) -> Self {
        ExtraValue::Int(i64::from(value))
    }
}

impl From<i64> for ExtraValue {
    fn from(value: i64) -> Self {
        ExtraValue::Int(value)
    }
}

impl From<u64> for ExtraValue {
    fn from(value: u64) -> Self {
        ExtraValue::Uint(value)
    }
}

impl From<f64> for ExtraValue {
    fn from(value: f64) -> Self {
        ExtraValue::Float(value)
    }
}

impl From<&str> for ExtraValue {
    fn from(value: &str) -> Self {
        ExtraValue::String(value.to_string())
    }
}

impl From<String> for ExtraValue {
    fn from(value: String) -> Self {
        ExtraValue::String(value)
    }
}

impl<T: Into<ExtraValue>> From<Vec<T>> for ExtraValue {
    fn from(values: Vec<T>) -> Self {
        ExtraValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ExtraValue>> From<Option<T>> for ExtraValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ExtraValue::Null)
    }
}

/// One immutable reportable occurrence plus structured context.
#[derive(Debug, Clone)]
pub struct Event {
    id: Uuid,
    message: Option<String>,
    timestamp: DateTime<Utc>,
    level: Option<Level>,
    logger: Option<String>,
    platform: Option<String>,
    culprit: Option<String>,
    server_name: Option<String>,
    tags: BTreeMap<String, String>,
    extra: BTreeMap<String, ExtraValue>,
    checksum: Option<String>,
    interfaces: BTreeMap<String, Arc<dyn InterfacePayload>>,
}

impl Event {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The original, untruncated message. Truncation to the wire limit
    /// happens only at encoding time.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> Option<Level> {
        self.level
    }

    pub fn logger(&self) -> Option<&str> {
        self.logger.as_deref()
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    pub fn culprit(&self) -> Option<&str> {
        self.culprit.as_deref()
    }

    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn extra(&self) -> &BTreeMap<String, ExtraValue> {
        &self.extra
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// Sub-payloads attached to this event, keyed by interface name.
    pub fn interfaces(&self) -> &BTreeMap<String, Arc<dyn InterfacePayload>> {
        &self.interfaces
    }
}

/// Fluent builder for [`Event`].
///
/// `build()` fills in a random id and the current time when the caller did
/// not provide them.
#[derive(Debug, Default)]
pub struct EventBuilder {
    id: Option<Uuid>,
    message: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    level: Option<Level>,
    logger: Option<String>,
    platform: Option<String>,
    culprit: Option<String>,
    server_name: Option<String>,
    tags: BTreeMap<String, String>,
    extra: BTreeMap<String, ExtraValue>,
    checksum: Option<String>,
    interfaces: BTreeMap<String, Arc<dyn InterfacePayload>>,
}

impl EventBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    pub fn logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = Some(logger.into());
        self
    }

    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn culprit(mut self, culprit: impl Into<String>) -> Self {
        self.culprit = Some(culprit.into());
        self
    }

    pub fn server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = Some(server_name.into());
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<ExtraValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Attach a sub-payload, keyed by its interface name. A later payload
    /// with the same interface name replaces the earlier one.
    pub fn interface(mut self, payload: Arc<dyn InterfacePayload>) -> Self {
        self.interfaces
            .insert(payload.interface_name().to_string(), payload);
        self
    }

    pub fn build(self) -> Event {
        Event {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            message: self.message,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            level: self.level,
            logger: self.logger,
            platform: self.platform,
            culprit: self.culprit,
            server_name: self.server_name,
            tags: self.tags,
            extra: self.extra,
            checksum: self.checksum,
            interfaces: self.interfaces,
        }
    }
}
