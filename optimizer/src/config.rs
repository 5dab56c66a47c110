//! Configuring the inliner.
use std::thread::available_parallelism;

/// The default maximum size of a method that other methods are inlined into.
const DEFAULT_MAX_SIZE: usize = 16_384;

/// The default size up to which a callee is considered small enough to
/// always inline.
const DEFAULT_SOFT_MAX_SIZE: usize = 8;

/// The scope across which call sites may be inlined.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Granularity {
    /// Callees are only inlined into callers defined in the same store.
    IntraModule,

    /// Callees may be inlined into any caller, as long as the store the
    /// caller is defined in is allowed to refer to the classes the callee
    /// refers to.
    WholeProgram,
}

/// The passes the local shrinker runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct ShrinkerConfig {
    pub run_const_prop: bool,
    pub run_copy_prop: bool,
    pub run_local_dce: bool,
    pub run_dedup_blocks: bool,
}

impl ShrinkerConfig {
    pub fn all() -> Self {
        Self {
            run_const_prop: true,
            run_copy_prop: true,
            run_local_dce: true,
            run_dedup_blocks: true,
        }
    }

    pub fn enabled(&self) -> bool {
        self.run_const_prop
            || self.run_copy_prop
            || self.run_local_dce
            || self.run_dedup_blocks
    }
}

/// A type storing the configuration of the inliner.
///
/// The configuration is immutable while the inliner runs.
#[derive(Clone, Debug)]
pub struct InlinerConfig {
    /// The size a caller may grow to as the result of inlining.
    pub max_size: usize,

    /// Callees up to this size are inlined without estimating the benefit of
    /// doing so.
    pub soft_max_size: usize,

    /// If callees that contain a `throw` may be inlined.
    pub throws_inline: bool,

    /// If call sites of callees that never return should be followed by a
    /// `throw`, removing the code after the call site.
    pub throw_after_no_return: bool,

    /// If the benefit of inlining is decided per call site, instead of once
    /// for all call sites of a callee.
    pub multiple_callers: bool,

    /// If the constant arguments of call sites are used to estimate the size
    /// of the inlined code.
    pub use_call_site_summaries: bool,

    /// If every inlined call site uses its own range of registers.
    pub unique_inlined_registers: bool,

    pub granularity: Granularity,

    /// The passes to run to shrink methods after inlining into them.
    pub shrinker: ShrinkerConfig,

    /// The number of threads to use for parallel work.
    pub threads: usize,
}

impl InlinerConfig {
    pub fn new() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            soft_max_size: DEFAULT_SOFT_MAX_SIZE,
            throws_inline: false,
            throw_after_no_return: false,
            multiple_callers: false,
            use_call_site_summaries: false,
            unique_inlined_registers: true,
            granularity: Granularity::WholeProgram,
            shrinker: ShrinkerConfig::default(),
            threads: available_parallelism().map(|v| v.get()).unwrap_or(1),
        }
    }

    pub fn set_max_size(&mut self, size: usize) {
        self.max_size = size;
    }

    pub fn set_soft_max_size(&mut self, size: usize) {
        self.soft_max_size = size;
    }

    pub fn set_threads(&mut self, threads: usize) {
        self.threads = threads.max(1);
    }

    /// Returns `true` if inlining is restricted to callers and callees in the
    /// same store.
    pub fn intra_module(&self) -> bool {
        self.granularity == Granularity::IntraModule
    }
}

impl Default for InlinerConfig {
    fn default() -> Self {
        Self::new()
    }
}
