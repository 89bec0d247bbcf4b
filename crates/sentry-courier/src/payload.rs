// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Polymorphic sub-payloads attached to events.
//!
//! Each payload variant is encoded by a binding registered on the
//! marshaller; the set of variants is open, new ones only need an
//! [`InterfacePayload`] impl plus a registered binding.

use crate::exception::ExceptionSnapshot;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Interface name for a plain message payload.
pub const MESSAGE_INTERFACE: &str = "sentry.interfaces.Message";
/// Interface name for an exception summary payload.
pub const EXCEPTION_INTERFACE: &str = "sentry.interfaces.Exception";
/// Interface name for a stack trace payload.
pub const STACKTRACE_INTERFACE: &str = "sentry.interfaces.Stacktrace";
/// Interface name for an HTTP request context payload.
pub const HTTP_INTERFACE: &str = "sentry.interfaces.Http";

/// A named, independently encoded structured attachment to an event.
pub trait InterfacePayload: Any + Send + Sync + fmt::Debug {
    /// The wire name this payload is keyed by on the event document.
    fn interface_name(&self) -> &'static str;

    /// Downcast seam for the binding registry.
    fn as_any(&self) -> &dyn Any;
}

/// A formatted message with its optional parameters.
#[derive(Debug, Clone)]
pub struct MessagePayload {
    message: String,
    params: Vec<String>,
}

impl MessagePayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<String>) -> Self {
        self.params = params;
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

impl InterfacePayload for MessagePayload {
    fn interface_name(&self) -> &'static str {
        MESSAGE_INTERFACE
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Summary of the top-level exception (type, message, module).
#[derive(Debug, Clone)]
pub struct ExceptionPayload {
    snapshot: Arc<ExceptionSnapshot>,
}

impl ExceptionPayload {
    pub fn new(snapshot: ExceptionSnapshot) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> &ExceptionSnapshot {
        &self.snapshot
    }
}

impl InterfacePayload for ExceptionPayload {
    fn interface_name(&self) -> &'static str {
        EXCEPTION_INTERFACE
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The full frame list of an exception chain.
#[derive(Debug, Clone)]
pub struct StackTracePayload {
    snapshot: Arc<ExceptionSnapshot>,
}

impl StackTracePayload {
    pub fn new(snapshot: ExceptionSnapshot) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> &ExceptionSnapshot {
        &self.snapshot
    }
}

impl InterfacePayload for StackTracePayload {
    fn interface_name(&self) -> &'static str {
        STACKTRACE_INTERFACE
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// HTTP request metadata for events raised while serving a request.
#[derive(Debug, Clone, Serialize)]
pub struct HttpPayload {
    pub url: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_string: Option<String>,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
}

impl HttpPayload {
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            query_string: None,
            headers: BTreeMap::new(),
            remote_addr: None,
        }
    }
}

impl InterfacePayload for HttpPayload {
    fn interface_name(&self) -> &'static str {
        HTTP_INTERFACE
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
