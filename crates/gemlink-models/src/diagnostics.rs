//! Diagnostics for lenient conversion paths, and logging setup.

use std::sync::Mutex;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// A non-fatal event raised while converting a conversation or a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A message with a role the provider has no slot for was dropped.
    UnsupportedMessage {
        /// The role of the dropped message.
        role: String,
    },
    /// A tool result referenced a call id no earlier AI message produced.
    UnknownToolCallId {
        /// The unmatched id.
        tool_call_id: String,
    },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedMessage { role } => write!(f, "Unsupported message type: {role}"),
            Self::UnknownToolCallId { tool_call_id } => {
                write!(f, "No tool call found for id {tool_call_id}")
            }
        }
    }
}

/// Receives diagnostics.
pub trait DiagnosticSink: Send + Sync {
    /// Reports one diagnostic.
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing` at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        warn!(diagnostic = %diagnostic, "Lenient conversion");
    }
}

/// Records diagnostics in memory.
#[derive(Debug, Default)]
pub struct CollectingDiagnostics {
    events: Mutex<Vec<Diagnostic>>,
}

impl CollectingDiagnostics {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every diagnostic reported so far.
    pub fn events(&self) -> Vec<Diagnostic> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl DiagnosticSink for CollectingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        if let Ok(mut events) = self.events.lock() {
            events.push(diagnostic);
        }
    }
}

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence; `default_filter` is used when it is unset or invalid.
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
