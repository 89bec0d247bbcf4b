// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Frozen snapshots of error cause chains.
//!
//! Serialization must not hold on to a live error value, so the chain is
//! copied once at capture time into an owned [`ExceptionSnapshot`]. A live
//! `std::error::Error` source graph may legally contain a cycle; the capture
//! walk guards against that with a visited set instead of recursing, so it
//! always terminates and emits the non-cyclic prefix of the chain.

use std::collections::HashSet;
use std::error::Error as StdError;
use std::sync::Arc;
use tracing::warn;

/// One captured call frame: module (or type) path, function name and line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub module: String,
    pub function: String,
    pub lineno: u32,
}

impl StackFrame {
    pub fn new(module: impl Into<String>, function: impl Into<String>, lineno: u32) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
            lineno,
        }
    }
}

/// A frozen snapshot of an error and its cause chain.
///
/// Frames are stored in capture order, innermost call first, matching how
/// backtraces are collected. The stack-trace binding reverses them on the
/// wire so the outermost call is written first.
#[derive(Debug, Clone)]
pub struct ExceptionSnapshot {
    type_name: String,
    module_path: Option<String>,
    message: Option<String>,
    frames: Vec<StackFrame>,
    cause: Option<Arc<ExceptionSnapshot>>,
}

impl ExceptionSnapshot {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            module_path: None,
            message: None,
            frames: Vec::new(),
            cause: None,
        }
    }

    pub fn with_module_path(mut self, module_path: impl Into<String>) -> Self {
        self.module_path = Some(module_path.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Frames in capture order, innermost call first.
    pub fn with_frames(mut self, frames: Vec<StackFrame>) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_cause(mut self, cause: Arc<ExceptionSnapshot>) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Capture a snapshot of `err` and its `source()` chain.
    ///
    /// The concrete type name is only known for `err` itself; `source()`
    /// links are type-erased, so intermediate snapshots carry the erased
    /// type name. Callers with precise frame or type data should build
    /// snapshots with [`ExceptionSnapshot::new`] instead.
    pub fn capture<E>(err: &E) -> ExceptionSnapshot
    where
        E: StdError + ?Sized,
    {
        let mut links: Vec<(String, Option<String>)> = Vec::new();
        let mut visited: HashSet<*const ()> = HashSet::new();

        visited.insert(err as *const E as *const ());
        links.push((std::any::type_name::<E>().to_string(), Some(err.to_string())));

        let mut current: Option<&(dyn StdError + 'static)> = err.source();
        while let Some(source) = current {
            let key = source as *const dyn StdError as *const ();
            if !visited.insert(key) {
                warn!("Exiting a circular referencing error chain");
                break;
            }
            links.push((
                std::any::type_name_of_val(source).to_string(),
                Some(source.to_string()),
            ));
            current = source.source();
        }

        // Fold from the root cause outwards so each link owns its cause.
        let mut snapshot: Option<ExceptionSnapshot> = None;
        for (full_name, message) in links.into_iter().rev() {
            let (module_path, simple_name) = split_type_name(&full_name);
            let mut link = ExceptionSnapshot::new(simple_name);
            if let Some(module_path) = module_path {
                link = link.with_module_path(module_path);
            }
            if let Some(message) = message {
                link = link.with_message(message);
            }
            if let Some(cause) = snapshot.take() {
                link = link.with_cause(Arc::new(cause));
            }
            snapshot = Some(link);
        }

        // links always holds at least the entry for `err` itself
        snapshot.unwrap_or_else(|| ExceptionSnapshot::new("Error"))
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn module_path(&self) -> Option<&str> {
        self.module_path.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    pub fn cause(&self) -> Option<&ExceptionSnapshot> {
        self.cause.as_deref()
    }

    /// The full cause chain, root cause first.
    ///
    /// Guarded by a visited set so an aliased chain never loops; on a
    /// revisit the walk stops with a warning and returns the non-cyclic
    /// prefix.
    pub fn chain_root_first(&self) -> Vec<&ExceptionSnapshot> {
        let mut visited: HashSet<*const ExceptionSnapshot> = HashSet::new();
        let mut chain: Vec<&ExceptionSnapshot> = Vec::new();

        let mut current = Some(self);
        while let Some(link) = current {
            if !visited.insert(link as *const ExceptionSnapshot) {
                warn!("Exiting a circular referencing error chain");
                break;
            }
            chain.push(link);
            current = link.cause();
        }

        chain.reverse();
        chain
    }
}

/// Split a fully qualified type name into its module path and simple name.
fn split_type_name(full_name: &str) -> (Option<String>, String) {
    match full_name.rsplit_once("::") {
        Some((module_path, simple_name)) => {
            (Some(module_path.to_string()), simple_name.to_string())
        }
        None => (None, full_name.to_string()),
    }
}
