// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors reported by a [`Connection`](crate::connection::Connection).
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Failed to deliver event: {0}")]
    SendFailed(String),

    #[error("Connection is closed")]
    Closed,

    #[error("Failed to close connection: {0}")]
    CloseFailed(String),
}

/// Errors raised while validating or loading a pipeline configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised by an interface binding while encoding a sub-payload.
///
/// These never abort the encoding of the rest of the event; the marshaller
/// logs them and omits the offending field.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Payload type mismatch for interface '{0}'")]
    PayloadMismatch(String),

    #[error("Unsupported value: {0}")]
    Unsupported(String),
}
