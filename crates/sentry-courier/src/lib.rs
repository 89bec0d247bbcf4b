// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Sentry Courier
//!
//! Client-side error reporting: capture events in-process, encode them in
//! the Sentry wire format and deliver them to an intake endpoint without
//! ever blocking or failing the host application.
//!
//! The delivery pipeline is a stack of [`Connection`] decorators:
//! - [`transport::HttpTransport`] performs the actual POST;
//! - [`lockdown::LockdownConnection`] adds exponential backoff after
//!   transport failures;
//! - [`async_connection::AsyncConnection`] makes submission non-blocking
//!   behind a bounded queue and a worker pool.
//!
//! [`client::build_pipeline`] composes the stack from a [`PipelineConfig`]
//! and a [`Dsn`]; [`client::Courier`] is the application-facing facade.
//!
//! Encoding is handled by [`marshaller::JsonMarshaller`], which writes
//! event fields in a fixed order and dispatches sub-payloads through a
//! per-type [`bindings::InterfaceBinding`] registry.

#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unreachable_pub)]

pub mod async_connection;
pub mod bindings;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod exception;
pub mod lockdown;
pub mod marshaller;
pub mod payload;
pub mod transport;

pub use client::{build_pipeline, Courier};
pub use config::PipelineConfig;
pub use connection::Connection;
pub use error::{ConfigError, ConnectionError, EncodeError};
pub use event::{Event, EventBuilder, ExtraValue, Level};
pub use exception::{ExceptionSnapshot, StackFrame};
pub use transport::Dsn;
