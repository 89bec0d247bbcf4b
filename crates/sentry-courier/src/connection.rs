// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::ConnectionError;
use crate::event::Event;
use async_trait::async_trait;

/// Capability contract for anything that can accept events.
///
/// Transports, the lockdown decorator and the async decorator all satisfy
/// this trait, so they compose by wrapping: transport innermost, lockdown
/// next, async outermost. That ordering keeps the lockdown sleep on a
/// delivery worker instead of a producer.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Attempt to deliver one event.
    async fn send(&self, event: Event) -> Result<(), ConnectionError>;

    /// Release the connection's resources. A failed close is actionable
    /// and surfaces to the caller.
    async fn close(&self) -> Result<(), ConnectionError>;
}

#[async_trait]
impl<T: Connection + ?Sized> Connection for std::sync::Arc<T> {
    async fn send(&self, event: Event) -> Result<(), ConnectionError> {
        (**self).send(event).await
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        (**self).close().await
    }
}
