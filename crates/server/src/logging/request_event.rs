//! Per-request wide events for the identity provider.
//!
//! A [`Monitor`] is owned by the endpoint state and handed to each handler.
//! Every operation opens one [`RequestEvent`], a `tracing` span whose fields
//! are declared up front so they can be recorded as they become known:
//!
//! ```rust,ignore
//! let evt = state.monitor.start("token");
//! evt.client(&client_id);
//! evt.succeed();
//! ```
//!
//! The monitor also tallies outcomes so a misbehaving client or a burst of
//! rejected bearer tokens is visible without grepping logs.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{Level, Span, field};

type Tally = Mutex<HashMap<(&'static str, String), u64>>;

#[derive(Clone, Default)]
pub struct Monitor {
    tally: Arc<Tally>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the event for one `operation` (`authorize`, `token`, `userinfo`, ...).
    pub fn start(&self, operation: &'static str) -> RequestEvent {
        let span = tracing::info_span!(
            "request",
            operation = operation,
            client_id = field::Empty,
            outcome = field::Empty,
            reason = field::Empty,
            elapsed_ms = field::Empty,
        );
        RequestEvent {
            span,
            operation,
            started: Instant::now(),
            tally: self.tally.clone(),
        }
    }

    /// How often `operation` finished with `outcome` (an outcome such as `ok`,
    /// or a rejection reason).
    pub fn count(&self, operation: &str, outcome: &str) -> u64 {
        self.tally
            .lock()
            .map(|t| {
                t.iter()
                    .filter(|((op, out), _)| *op == operation && out == outcome)
                    .map(|(_, n)| *n)
                    .sum()
            })
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor").finish_non_exhaustive()
    }
}

pub struct RequestEvent {
    span: Span,
    operation: &'static str,
    started: Instant,
    tally: Arc<Tally>,
}

impl RequestEvent {
    /// Enter the span so other tracing events become its children.
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn client(&self, client_id: impl Display) {
        self.span.record("client_id", field::display(client_id));
    }

    pub fn succeed(self) {
        self.finish("ok", None, Level::INFO);
    }

    /// Finish with a client-side failure such as `invalid_grant`.
    pub fn reject(self, outcome: &str, reason: Option<&dyn Display>) {
        self.finish(outcome, reason, Level::INFO);
    }

    /// Finish with a failure that never reaches the response body; logged at DEBUG.
    pub fn reject_quietly(self, reason: impl Display) {
        let reason = reason.to_string();
        self.finish(&reason, Some(&reason), Level::DEBUG);
    }

    pub fn fail(self, error: &dyn Display) {
        self.finish("server_error", Some(error), Level::ERROR);
    }

    fn finish(self, outcome: &str, reason: Option<&dyn Display>, level: Level) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        self.span.record("outcome", outcome);
        self.span.record("elapsed_ms", elapsed_ms);
        if let Some(reason) = reason {
            self.span.record("reason", field::display(reason));
        }

        if let Ok(mut tally) = self.tally.lock() {
            *tally
                .entry((self.operation, outcome.to_string()))
                .or_default() += 1;
        }

        self.span.in_scope(|| {
            if level == Level::ERROR {
                tracing::event!(Level::ERROR, outcome, "request failed");
            } else if level == Level::DEBUG {
                tracing::event!(Level::DEBUG, outcome, "request rejected");
            } else {
                tracing::event!(Level::INFO, outcome, "request complete");
            }
        });
    }
}
