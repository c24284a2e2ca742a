//! The five optional callback slots (spec §6 "Callbacks") and the
//! three-valued outcome they (and flush-record reconstruction) return,
//! kept separate from [`crate::error::Error`] so "caller asked to
//! skip/abort" never has to travel through the fallible-operation error
//! channel (DESIGN.md "Exception-for-control-flow pattern").

use crate::model::{Record, ThreadId};

/// What a callback, or a flush step consulting one, decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    Resume,
    Skip,
    Abort,
}

type SelectionFilter = dyn FnMut(&Record, Option<ThreadId>) -> bool;
type PathnameRewriter = dyn FnMut(&Record, &str) -> String;
type ProgressFn = dyn FnMut(&Record, u64, u64);
type ErrorHandler = dyn FnMut(&crate::error::Error) -> CallbackOutcome;
type MessageHandler = dyn FnMut(&str);

/// Holds the five optional callback slots for one archive handle. All are
/// single-threaded, invoked synchronously from the operation that needs
/// them (spec §5 "Suspension points").
#[derive(Default)]
pub struct Callbacks {
    pub selection_filter: Option<Box<SelectionFilter>>,
    pub pathname_rewriter: Option<Box<PathnameRewriter>>,
    pub progress: Option<Box<ProgressFn>>,
    pub error_handler: Option<Box<ErrorHandler>>,
    pub message_handler: Option<Box<MessageHandler>>,
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("selection_filter", &self.selection_filter.is_some())
            .field("pathname_rewriter", &self.pathname_rewriter.is_some())
            .field("progress", &self.progress.is_some())
            .field("error_handler", &self.error_handler.is_some())
            .field("message_handler", &self.message_handler.is_some())
            .finish()
    }
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the selection filter, if any; a missing filter selects
    /// everything (spec §6 "selection filter").
    pub fn select(&mut self, record: &Record, thread: Option<ThreadId>) -> bool {
        match &mut self.selection_filter {
            Some(f) => f(record, thread),
            None => true,
        }
    }

    pub fn rewrite_pathname(&mut self, record: &Record, original: &str) -> String {
        match &mut self.pathname_rewriter {
            Some(f) => f(record, original),
            None => original.to_string(),
        }
    }

    pub fn report_progress(&mut self, record: &Record, done: u64, total: u64) {
        if let Some(f) = &mut self.progress {
            f(record, done, total);
        }
    }

    /// Consults the error handler for a recoverable error, defaulting to
    /// `Abort` when none is installed (spec §7 "Propagation policy").
    pub fn handle_error(&mut self, err: &crate::error::Error) -> CallbackOutcome {
        match &mut self.error_handler {
            Some(f) => f(err),
            None => CallbackOutcome::Abort,
        }
    }

    pub fn message(&mut self, msg: &str) {
        if let Some(f) = &mut self.message_handler {
            f(msg);
        }
    }
}
