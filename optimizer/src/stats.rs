//! Statistics about the work performed by the inliner.
use crate::shrink::ShrinkStats;
use std::fmt;

/// The reason a call site isn't inlined.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// The callee doesn't have a body, such as an abstract or external
    /// method.
    NoBody,

    /// The callee of a virtual call may be overridden.
    Overridden,

    /// The call site is part of a recursive cycle that has already been
    /// expanded once.
    Recursive,

    /// Inlining would require a reference to a store the caller's store may
    /// not depend on.
    CrossStore,

    /// The try regions or monitors of the callee can't be merged soundly into
    /// those of the call site.
    ExceptionSafety,

    /// The callee throws and inlining throwing callees is disabled.
    Throws,

    /// The callee refers to a member that can't be made accessible to the
    /// caller.
    Visibility,

    /// Inlining would make the caller exceed its maximum size.
    CallerTooLarge,

    /// The callee is too large and inlining it isn't beneficial.
    TooLarge,
}

impl Rejection {
    pub fn name(self) -> &'static str {
        match self {
            Rejection::NoBody => "no body",
            Rejection::Overridden => "overridden",
            Rejection::Recursive => "recursive",
            Rejection::CrossStore => "cross store",
            Rejection::ExceptionSafety => "exception safety",
            Rejection::Throws => "throws",
            Rejection::Visibility => "visibility",
            Rejection::CallerTooLarge => "caller too large",
            Rejection::TooLarge => "too large",
        }
    }
}

/// Counters for every outcome of the inliner.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineStats {
    /// The number of call sites found while building the call graph.
    pub call_sites: usize,

    /// The number of call sites per store, indexed by the store ID.
    pub call_sites_per_store: Vec<usize>,

    pub calls_inlined: usize,

    /// The number of recursive call sites that were expanded once.
    pub recursive_expansions: usize,

    /// The number of call sites whose callee couldn't be resolved.
    pub not_found: usize,

    /// The number of call sites whose callee isn't in the candidate set.
    pub not_candidate: usize,

    pub no_body: usize,
    pub overridden: usize,
    pub recursive: usize,
    pub cross_store: usize,
    pub exception_safety: usize,
    pub throws: usize,
    pub visibility: usize,
    pub caller_too_large: usize,
    pub too_large: usize,

    /// The number of call sites followed by a `throw` because the callee
    /// never returns.
    pub no_returns: usize,

    /// The number of instructions removed because they became unreachable.
    pub unreachable_instructions: usize,

    pub methods_shrunk: usize,
    pub shrinker: ShrinkStats,

    pub escalated_methods: usize,
    pub escalated_fields: usize,
    pub escalated_classes: usize,
    pub made_static: usize,
}

impl InlineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(&mut self, reason: Rejection) {
        let counter = match reason {
            Rejection::NoBody => &mut self.no_body,
            Rejection::Overridden => &mut self.overridden,
            Rejection::Recursive => &mut self.recursive,
            Rejection::CrossStore => &mut self.cross_store,
            Rejection::ExceptionSafety => &mut self.exception_safety,
            Rejection::Throws => &mut self.throws,
            Rejection::Visibility => &mut self.visibility,
            Rejection::CallerTooLarge => &mut self.caller_too_large,
            Rejection::TooLarge => &mut self.too_large,
        };

        *counter += 1;
    }

    pub fn rejected(&self, reason: Rejection) -> usize {
        match reason {
            Rejection::NoBody => self.no_body,
            Rejection::Overridden => self.overridden,
            Rejection::Recursive => self.recursive,
            Rejection::CrossStore => self.cross_store,
            Rejection::ExceptionSafety => self.exception_safety,
            Rejection::Throws => self.throws,
            Rejection::Visibility => self.visibility,
            Rejection::CallerTooLarge => self.caller_too_large,
            Rejection::TooLarge => self.too_large,
        }
    }

    pub fn total_rejected(&self) -> usize {
        self.no_body
            + self.overridden
            + self.recursive
            + self.cross_store
            + self.exception_safety
            + self.throws
            + self.visibility
            + self.caller_too_large
            + self.too_large
    }
}

impl fmt::Display for InlineStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "call sites:               {}", self.call_sites)?;
        writeln!(f, "inlined:                  {}", self.calls_inlined)?;
        writeln!(f, "recursive expansions:     {}", self.recursive_expansions)?;
        writeln!(f, "not found:                {}", self.not_found)?;
        writeln!(f, "not a candidate:          {}", self.not_candidate)?;

        for reason in [
            Rejection::NoBody,
            Rejection::Overridden,
            Rejection::Recursive,
            Rejection::CrossStore,
            Rejection::ExceptionSafety,
            Rejection::Throws,
            Rejection::Visibility,
            Rejection::CallerTooLarge,
            Rejection::TooLarge,
        ] {
            writeln!(
                f,
                "rejected ({}): {}",
                reason.name(),
                self.rejected(reason)
            )?;
        }

        writeln!(f, "no returns:               {}", self.no_returns)?;
        writeln!(
            f,
            "unreachable instructions: {}",
            self.unreachable_instructions
        )?;
        writeln!(f, "methods shrunk:           {}", self.methods_shrunk)?;
        writeln!(f, "escalated methods:        {}", self.escalated_methods)?;
        writeln!(f, "escalated fields:         {}", self.escalated_fields)?;
        writeln!(f, "escalated classes:        {}", self.escalated_classes)?;
        write!(f, "made static:              {}", self.made_static)
    }
}
