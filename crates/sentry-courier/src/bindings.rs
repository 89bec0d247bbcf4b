// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Encoders for the built-in sub-payload variants.
//!
//! A binding turns one [`InterfacePayload`] into the JSON value written
//! under its interface name. Bindings are registered on the marshaller by
//! concrete payload type; encoding an event never fails because of a
//! binding — errors are logged and the field is omitted.

use crate::config::default_not_in_app_prefixes;
use crate::error::EncodeError;
use crate::exception::{ExceptionSnapshot, StackFrame};
use crate::payload::{
    ExceptionPayload, HttpPayload, InterfacePayload, MessagePayload, StackTracePayload,
};
use serde::Serialize;
use serde_json::{json, Value};

/// Sentinel module name for exceptions without a module path.
const DEFAULT_MODULE_NAME: &str = "(default)";

/// Encodes one sub-payload variant into its wire value.
pub trait InterfaceBinding: Send + Sync {
    fn write(&self, payload: &dyn InterfacePayload) -> Result<Value, EncodeError>;
}

fn downcast<T: InterfacePayload>(payload: &dyn InterfacePayload) -> Result<&T, EncodeError> {
    payload
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| EncodeError::PayloadMismatch(payload.interface_name().to_string()))
}

/// Binding for [`MessagePayload`].
#[derive(Debug, Default)]
pub struct MessageBinding;

impl InterfaceBinding for MessageBinding {
    fn write(&self, payload: &dyn InterfacePayload) -> Result<Value, EncodeError> {
        let message = downcast::<MessagePayload>(payload)?;
        Ok(json!({
            "message": message.message(),
            "params": message.params(),
        }))
    }
}

/// Binding for [`ExceptionPayload`]: type, message and originating module.
#[derive(Debug, Default)]
pub struct ExceptionBinding;

impl InterfaceBinding for ExceptionBinding {
    fn write(&self, payload: &dyn InterfacePayload) -> Result<Value, EncodeError> {
        let snapshot = downcast::<ExceptionPayload>(payload)?.snapshot();
        Ok(json!({
            "type": snapshot.type_name(),
            "value": snapshot.message(),
            "module": snapshot.module_path().unwrap_or(DEFAULT_MODULE_NAME),
        }))
    }
}

/// Binding for [`HttpPayload`].
#[derive(Debug, Default)]
pub struct HttpBinding;

impl InterfaceBinding for HttpBinding {
    fn write(&self, payload: &dyn InterfacePayload) -> Result<Value, EncodeError> {
        let http = downcast::<HttpPayload>(payload)?;
        serde_json::to_value(http).map_err(|e| EncodeError::Unsupported(e.to_string()))
    }
}

/// One frame record on the wire.
#[derive(Serialize)]
struct FrameEntry<'a> {
    module: &'a str,
    in_app: bool,
    function: &'a str,
    lineno: u32,
}

/// Binding for [`StackTracePayload`].
///
/// Writes the whole cause chain as one flat frame list, root cause first,
/// each exception's frames from the outermost call to the innermost.
/// Frames a chained exception shares with its enclosing context belong to
/// the calling context rather than the exception itself, so with
/// `hide_common_frames` enabled they are forced out of the in-app set.
#[derive(Debug)]
pub struct StackTraceBinding {
    hide_common_frames: bool,
    not_in_app_prefixes: Vec<String>,
}

impl Default for StackTraceBinding {
    fn default() -> Self {
        Self {
            hide_common_frames: true,
            not_in_app_prefixes: default_not_in_app_prefixes(),
        }
    }
}

impl StackTraceBinding {
    pub fn new(hide_common_frames: bool, not_in_app_prefixes: Vec<String>) -> Self {
        Self {
            hide_common_frames,
            not_in_app_prefixes,
        }
    }

    fn is_frame_in_app(&self, frame: &StackFrame) -> bool {
        !self
            .not_in_app_prefixes
            .iter()
            .any(|prefix| frame.module.starts_with(prefix.as_str()))
    }

    fn frame_entry(&self, frame: &StackFrame, common_with_enclosing: bool) -> Value {
        let entry = FrameEntry {
            module: &frame.module,
            in_app: !(self.hide_common_frames && common_with_enclosing)
                && self.is_frame_in_app(frame),
            function: &frame.function,
            lineno: frame.lineno,
        };
        // FrameEntry contains nothing a JSON writer can reject
        serde_json::to_value(entry).unwrap_or(Value::Null)
    }

    /// Synthetic separator frame between two chained exceptions.
    fn caused_by_entry(&self, link: &ExceptionSnapshot) -> Value {
        let mut label = String::from("Caused by: ");
        match link.module_path() {
            Some(module_path) => {
                label.push_str(module_path);
                label.push_str("::");
                label.push_str(link.type_name());
            }
            None => label.push_str(link.type_name()),
        }
        if let Some(message) = link.message() {
            label.push_str(" (\"");
            label.push_str(message);
            label.push_str("\")");
        }

        json!({
            "module": label,
            "in_app": true,
        })
    }
}

impl InterfaceBinding for StackTraceBinding {
    fn write(&self, payload: &dyn InterfacePayload) -> Result<Value, EncodeError> {
        let snapshot = downcast::<StackTracePayload>(payload)?.snapshot();
        let chain = snapshot.chain_root_first();

        let mut frames: Vec<Value> = Vec::new();
        let mut enclosing: &[StackFrame] = &[];

        for (position, link) in chain.iter().enumerate() {
            let stack = link.frames();

            // Frames stay common until one differs, then never again for
            // this exception.
            let mut common = true;
            let mut enclosing_index = enclosing.len() as isize - 1;
            for i in (0..stack.len()).rev() {
                common = common
                    && enclosing_index >= 0
                    && stack[i] == enclosing[enclosing_index as usize];
                frames.push(self.frame_entry(&stack[i], common));
                enclosing_index -= 1;
            }

            // Flat frame lists can't express chaining; separate the causes
            // with a synthetic record.
            if position + 1 < chain.len() {
                frames.push(self.caused_by_entry(link));
            }

            enclosing = stack;
        }

        Ok(json!({ "frames": frames }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn app_frame(function: &str, lineno: u32) -> StackFrame {
        StackFrame::new("app::orders", function, lineno)
    }

    #[test]
    fn test_message_binding() {
        let payload = MessagePayload::new("order %s failed").with_params(vec!["42".into()]);
        let value = MessageBinding.write(&payload).expect("write failed");
        assert_eq!(value["message"], "order %s failed");
        assert_eq!(value["params"][0], "42");
    }

    #[test]
    fn test_binding_rejects_mismatched_payload() {
        let payload = MessagePayload::new("hi");
        let result = ExceptionBinding.write(&payload);
        assert!(matches!(result, Err(EncodeError::PayloadMismatch(_))));
    }

    #[test]
    fn test_exception_binding_fields() {
        let snapshot = ExceptionSnapshot::new("WriteError")
            .with_module_path("app::io")
            .with_message("disk full");
        let value = ExceptionBinding
            .write(&ExceptionPayload::new(snapshot))
            .expect("write failed");
        assert_eq!(value["type"], "WriteError");
        assert_eq!(value["value"], "disk full");
        assert_eq!(value["module"], "app::io");
    }

    #[test]
    fn test_exception_binding_default_module() {
        let snapshot = ExceptionSnapshot::new("Bare");
        let value = ExceptionBinding
            .write(&ExceptionPayload::new(snapshot))
            .expect("write failed");
        assert_eq!(value["module"], "(default)");
        assert_eq!(value["value"], Value::Null);
    }

    #[test]
    fn test_http_binding() {
        let mut payload = HttpPayload::new("http://localhost/checkout", "POST");
        payload.headers.insert("Host".into(), "localhost".into());
        let value = HttpBinding.write(&payload).expect("write failed");
        assert_eq!(value["url"], "http://localhost/checkout");
        assert_eq!(value["method"], "POST");
        assert_eq!(value["headers"]["Host"], "localhost");
        assert!(value.get("query_string").is_none());
    }

    #[test]
    fn test_frames_written_outermost_first() {
        // Capture order is innermost first; the wire order is reversed.
        let snapshot = ExceptionSnapshot::new("E").with_frames(vec![
            app_frame("inner", 3),
            app_frame("outer", 1),
        ]);
        let value = StackTraceBinding::default()
            .write(&StackTracePayload::new(snapshot))
            .expect("write failed");

        let frames = value["frames"].as_array().expect("frames array");
        assert_eq!(frames[0]["function"], "outer");
        assert_eq!(frames[1]["function"], "inner");
        assert_eq!(frames[0]["lineno"], 1);
    }

    #[test]
    fn test_not_in_app_prefix_rule() {
        let snapshot = ExceptionSnapshot::new("E").with_frames(vec![
            app_frame("handle", 10),
            StackFrame::new("tokio::runtime", "poll", 99),
        ]);
        let value = StackTraceBinding::default()
            .write(&StackTracePayload::new(snapshot))
            .expect("write failed");

        let frames = value["frames"].as_array().expect("frames array");
        assert_eq!(frames[0]["module"], "tokio::runtime");
        assert_eq!(frames[0]["in_app"], false);
        assert_eq!(frames[1]["in_app"], true);
    }

    fn chained_snapshot() -> ExceptionSnapshot {
        // Root cause and outer exception share a 3-frame suffix at the
        // outermost end of their stacks.
        let shared = [
            app_frame("dispatch", 30),
            app_frame("run", 20),
            app_frame("main", 10),
        ];
        let root = ExceptionSnapshot::new("RootError")
            .with_module_path("app::io")
            .with_message("disk full")
            .with_frames(vec![
                app_frame("flush", 41),
                shared[0].clone(),
                shared[1].clone(),
                shared[2].clone(),
            ]);
        ExceptionSnapshot::new("OuterError")
            .with_message("save failed")
            .with_frames(vec![
                app_frame("save", 55),
                app_frame("persist", 50),
                shared[0].clone(),
                shared[1].clone(),
                shared[2].clone(),
            ])
            .with_cause(Arc::new(root))
    }

    #[test]
    fn test_common_frames_suppressed() {
        let value = StackTraceBinding::default()
            .write(&StackTracePayload::new(chained_snapshot()))
            .expect("write failed");
        let frames = value["frames"].as_array().expect("frames array");

        // root: 4 frames, separator, outer: 5 frames
        assert_eq!(frames.len(), 10);

        // Root cause frames keep the prefix classification.
        for frame in &frames[0..4] {
            assert_eq!(frame["in_app"], true);
        }

        assert_eq!(
            frames[4]["module"],
            "Caused by: app::io::RootError (\"disk full\")"
        );
        assert_eq!(frames[4]["in_app"], true);

        // The outer exception's 3 shared (outermost) frames are forced out
        // of the in-app set; its own frames stay in.
        for frame in &frames[5..8] {
            assert_eq!(frame["in_app"], false);
        }
        for frame in &frames[8..10] {
            assert_eq!(frame["in_app"], true);
        }
    }

    #[test]
    fn test_common_frames_kept_when_disabled() {
        let binding = StackTraceBinding::new(false, default_not_in_app_prefixes());
        let value = binding
            .write(&StackTracePayload::new(chained_snapshot()))
            .expect("write failed");
        let frames = value["frames"].as_array().expect("frames array");

        // With suppression off the prefix rule alone decides, and all
        // frames here are application modules.
        for frame in frames {
            if frame.get("function").is_some() {
                assert_eq!(frame["in_app"], true);
            }
        }
    }

    #[test]
    fn test_common_run_stops_at_first_difference() {
        // Shared outermost frame, then a differing one, then an
        // accidentally equal deeper frame: only the leading run counts.
        let root = ExceptionSnapshot::new("Root").with_frames(vec![
            app_frame("equal_deep", 5),
            app_frame("differs_root", 4),
            app_frame("main", 1),
        ]);
        let outer = ExceptionSnapshot::new("Outer")
            .with_frames(vec![
                app_frame("equal_deep", 5),
                app_frame("differs_outer", 4),
                app_frame("main", 1),
            ])
            .with_cause(Arc::new(root));

        let value = StackTraceBinding::default()
            .write(&StackTracePayload::new(outer))
            .expect("write failed");
        let frames = value["frames"].as_array().expect("frames array");

        // Outer frames start after 3 root frames + 1 separator.
        assert_eq!(frames[4]["in_app"], false); // main, common
        assert_eq!(frames[5]["in_app"], true); // differs_outer
        assert_eq!(frames[6]["in_app"], true); // equal_deep, run already broken
    }
}
