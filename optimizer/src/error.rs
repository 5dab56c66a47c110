//! Errors produced when the inliner finds itself in an invalid state.
use thiserror::Error;

/// A violation of the invariants of the inliner.
///
/// These errors indicate a bug in the inliner or in the code that produced
/// its input. When one occurs the whole pass is aborted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InlineError {
    #[error(
        "the call site at b{block}:{instruction} in {method} \
        doesn't refer to an invoke instruction"
    )]
    MissingCallSite { method: String, block: usize, instruction: usize },

    #[error(
        "inlining {callee} into {method} at b{block}:{instruction} requires \
        {registers} registers, but at most {limit} are allowed"
    )]
    RegisterOverflow {
        method: String,
        callee: String,
        block: usize,
        instruction: usize,
        registers: usize,
        limit: usize,
    },

    #[error("{method} is malformed after inlining {callee}: {reason}")]
    MalformedGraph { method: String, callee: String, reason: String },

    #[error(
        "{callee} can't be inlined into {method} as its state is {state}, \
        instead of being finalized"
    )]
    UnfinishedCallee { method: String, callee: String, state: String },
}
