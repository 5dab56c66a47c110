//! Inlining of methods across a whole program.
//!
//! Methods are processed bottom-up: the strongly connected components of the
//! call graph are visited such that callees are finalized before their
//! callers, meaning a caller always absorbs the final (and possibly shrunk)
//! body of its callees. Cycles are broken by expanding a recursive callee at
//! most once per caller, instead of unrolling it.
//!
//! For every caller we first decide what to do with each of its call sites,
//! then apply those decisions in reverse order. Since splicing only affects
//! the instructions following a call site, the locations of the call sites
//! that precede it remain valid.
mod select;
mod splice;

pub use splice::MAX_REGISTERS;

use crate::call_graph::{CallGraph, CallSite, NodeState};
use crate::error::InlineError;
use crate::mir::printer::to_text;
use crate::mir::{BlockId, Method, Mir};
use crate::resolver::{CachingResolver, Resolve};
use crate::shrink::{LocalShrinker, Shrinker};
use crate::state::State;
use crate::stats::{InlineStats, Rejection};
use crate::visibility::fix_visibility;
use fnv::FnvHashSet;
use indexmap::IndexSet;
use log::{debug, info, log_enabled, trace, Level};
use select::Selector;
use splice::{splice, throw_after};
use types::{MethodId, MethodSource, ValueKind};

/// The outcome of inlining a program.
#[derive(Debug)]
pub struct InlineResult {
    /// The methods inlined into at least one call site.
    pub inlined: IndexSet<MethodId>,

    /// The methods whose bodies changed.
    pub modified: IndexSet<MethodId>,

    pub stats: InlineStats,
}

/// What to do with a call site.
enum Decision {
    Inline {
        block: BlockId,
        instruction: usize,
        callee: MethodId,
        body: Method,
        recursive: bool,
    },

    /// The callee never returns, so the code after the call is replaced with
    /// a throw.
    NoReturn { block: BlockId, instruction: usize },
}

/// Inlines the given candidates into their callers, using the default
/// resolver and shrinker.
pub fn inline_methods(
    state: &mut State,
    mir: &mut Mir,
    candidates: &IndexSet<MethodId>,
) -> Result<InlineResult, InlineError> {
    let resolver = CachingResolver::new();
    let shrinker = LocalShrinker::new(state.config.shrinker);
    let result = Inliner::run(state, mir, candidates, &resolver, &shrinker);

    debug!(
        "method resolution cache: {} hits, {} misses",
        resolver.hits(),
        resolver.misses()
    );

    result
}

/// A compiler pass that inlines call sites into their callers.
pub struct Inliner<'a> {
    state: &'a State,
    graph: CallGraph,
    candidates: &'a IndexSet<MethodId>,
    selector: Selector<'a>,
    shrinker: &'a dyn Shrinker,
    inlined: IndexSet<MethodId>,
    modified: IndexSet<MethodId>,
    stats: InlineStats,
}

impl<'a> Inliner<'a> {
    /// Inlines the given candidates into their callers.
    ///
    /// Only methods in `candidates` are inlined, but they may be inlined into
    /// any method in `mir`. Once all methods are processed, the access levels
    /// of the members referred to by inlined code are fixed.
    pub fn run(
        state: &mut State,
        mir: &mut Mir,
        candidates: &IndexSet<MethodId>,
        resolver: &dyn Resolve,
        shrinker: &dyn Shrinker,
    ) -> Result<InlineResult, InlineError> {
        let graph = CallGraph::build(state, mir, resolver);

        info!(
            "inlining {} candidates into {} methods with {} call sites",
            candidates.len(),
            mir.methods.len(),
            graph.sites.len()
        );

        let mut result = {
            let mut pass =
                Inliner::new(state, graph, candidates, resolver, shrinker);

            pass.inline_all(mir)?;
            pass.into_result()
        };

        fix_visibility(
            &mut state.db,
            mir,
            &result.modified,
            resolver,
            &mut result.stats,
        );

        info!(
            "inlined {} call sites of {} methods into {} methods, \
            rejected {} call sites",
            result.stats.calls_inlined,
            result.inlined.len(),
            result.modified.len(),
            result.stats.total_rejected()
        );
        debug!("inliner statistics:\n{}", result.stats);
        Ok(result)
    }

    fn new(
        state: &'a State,
        graph: CallGraph,
        candidates: &'a IndexSet<MethodId>,
        resolver: &'a dyn Resolve,
        shrinker: &'a dyn Shrinker,
    ) -> Self {
        let selector =
            Selector::new(&state.db, &state.config, resolver, shrinker);
        let stats = InlineStats {
            call_sites: graph.sites.len(),
            call_sites_per_store: graph.sites_per_store.clone(),
            ..InlineStats::new()
        };

        Inliner {
            state,
            graph,
            candidates,
            selector,
            shrinker,
            inlined: IndexSet::new(),
            modified: IndexSet::new(),
            stats,
        }
    }

    fn into_result(self) -> InlineResult {
        InlineResult {
            inlined: self.inlined,
            modified: self.modified,
            stats: self.stats,
        }
    }

    fn inline_all(&mut self, mir: &mut Mir) -> Result<(), InlineError> {
        let components = self.graph.components.clone();

        for component in components {
            for &index in &component {
                self.graph.set_state(index, NodeState::InProgress);
            }

            for &index in &component {
                self.inline_into(mir, index)?;
            }

            for &index in &component {
                self.graph.set_state(index, NodeState::Finalized);
                self.finalize(mir, index);
            }
        }

        Ok(())
    }

    fn inline_into(
        &mut self,
        mir: &mut Mir,
        index: usize,
    ) -> Result<(), InlineError> {
        let decisions = match mir.methods.get_index(index) {
            Some((_, caller)) => self.decide(mir, caller, index)?,
            None => return Ok(()),
        };

        if decisions.is_empty() {
            return Ok(());
        }

        let Some((_, caller)) = mir.methods.get_index_mut(index) else {
            return Ok(());
        };

        self.apply(caller, decisions)
    }

    /// Decides what to do with every call site in a method, in the order the
    /// call sites occur in.
    fn decide(
        &mut self,
        mir: &Mir,
        caller: &Method,
        index: usize,
    ) -> Result<Vec<Decision>, InlineError> {
        let state = self.state;
        let db = &state.db;
        let mut decisions = Vec::new();
        let mut size = caller.code_size() as isize;
        let mut expanded = FnvHashSet::default();
        let mut truncated = FnvHashSet::default();

        for site_idx in self.graph.nodes[index].calls.clone() {
            let site = self.graph.sites[site_idx].clone();

            // Code following a call that never returns is removed, including
            // any calls in that code.
            if truncated.contains(&site.block) {
                continue;
            }

            let Some(callee) = site.callee else {
                debug!(
                    "{} in {} can't be resolved",
                    site.reference.qualified_name(db),
                    caller.id.qualified_name(db)
                );
                self.stats.not_found += 1;
                continue;
            };

            if !self.candidates.contains(&callee) {
                self.stats.not_candidate += 1;
                continue;
            }

            self.check_order(index, callee)?;

            let decision = match self.evaluate(
                mir,
                caller,
                &site,
                callee,
                &expanded,
                &mut size,
            ) {
                Ok(decision) => decision,
                Err(reason) => {
                    debug!(
                        "not inlining {} into {}: {}",
                        callee.qualified_name(db),
                        caller.id.qualified_name(db),
                        reason.name()
                    );
                    self.stats.reject(reason);
                    continue;
                }
            };

            match &decision {
                Decision::Inline { recursive, .. } => {
                    debug!(
                        "inlining {} into {}",
                        callee.qualified_name(db),
                        caller.id.qualified_name(db)
                    );

                    if *recursive {
                        expanded.insert(callee);
                    }
                }
                Decision::NoReturn { .. } => {
                    debug!(
                        "{} never returns, ending the block calling it in {}",
                        callee.qualified_name(db),
                        caller.id.qualified_name(db)
                    );
                    truncated.insert(site.block);
                }
            }

            decisions.push(decision);
        }

        Ok(decisions)
    }

    /// Checks that the body of a callee won't change anymore, unless the
    /// callee is part of the same strongly connected component as the caller.
    fn check_order(
        &self,
        index: usize,
        callee: MethodId,
    ) -> Result<(), InlineError> {
        let caller = &self.graph.nodes[index];
        let Some(node) = self.graph.node(callee) else { return Ok(()) };

        match node.state {
            NodeState::Finalized => Ok(()),
            NodeState::InProgress if node.component == caller.component => {
                Ok(())
            }
            state => {
                let db = &self.state.db;

                Err(InlineError::UnfinishedCallee {
                    method: caller.method.qualified_name(db),
                    callee: callee.qualified_name(db),
                    state: format!("{:?}", state),
                })
            }
        }
    }

    /// Decides if a call site is inlined, growing `size` by the number of
    /// instructions added to the caller if so.
    fn evaluate(
        &mut self,
        mir: &Mir,
        caller: &Method,
        site: &CallSite,
        callee: MethodId,
        expanded: &FnvHashSet<MethodId>,
        size: &mut isize,
    ) -> Result<Decision, Rejection> {
        let state = self.state;
        let db = &state.db;
        let body = match mir.methods.get(&callee) {
            Some(body) if callee.source(db) == MethodSource::Concrete => body,
            _ => return Err(Rejection::NoBody),
        };

        if site.kind.is_dynamic() && callee.is_overridden(db) {
            return Err(Rejection::Overridden);
        }

        let recursive = self.graph.same_cycle(caller.id, callee);

        if recursive && expanded.contains(&callee) {
            return Err(Rejection::Recursive);
        }

        self.selector.check(caller, site, body)?;

        let spliced = self.selector.body_for(body, &site.summary);

        if state.config.throw_after_no_return && !spliced.returns() {
            return Ok(Decision::NoReturn {
                block: site.block,
                instruction: site.instruction,
            });
        }

        let delta =
            self.selector.check_benefit(&self.graph, site, body, &spliced)?;

        if *size + delta > state.config.max_size as isize {
            return Err(Rejection::CallerTooLarge);
        }

        *size += delta;
        Ok(Decision::Inline {
            block: site.block,
            instruction: site.instruction,
            callee,
            body: spliced,
            recursive,
        })
    }

    fn apply(
        &mut self,
        caller: &mut Method,
        decisions: Vec<Decision>,
    ) -> Result<(), InlineError> {
        let state = self.state;
        let db = &state.db;
        let (no_returns, inlines): (Vec<_>, Vec<_>) = decisions
            .into_iter()
            .partition(|d| matches!(d, Decision::NoReturn { .. }));

        // Truncating a block doesn't change any block IDs or the positions
        // of the call sites before it, so this is done first. Call sites that
        // become unreachable as a result are then left alone.
        if !no_returns.is_empty() {
            let reg = caller.registers.alloc(ValueKind::Object);

            for decision in no_returns {
                let Decision::NoReturn { block, instruction } = decision else {
                    continue;
                };
                let removed = throw_after(db, caller, block, instruction, reg)?;

                self.stats.no_returns += 1;
                self.stats.unreachable_instructions += removed;
            }
        }

        let reachable = caller.body.reachable();

        // Without unique registers, every inlined body reuses the registers
        // starting at the same offset.
        let shared_offset = caller.registers.len();

        for decision in inlines.into_iter().rev() {
            let Decision::Inline {
                block,
                instruction,
                callee,
                body,
                recursive,
            } = decision
            else {
                continue;
            };

            if !reachable[block.0] {
                trace!(
                    "not inlining {} into unreachable block b{} of {}",
                    callee.qualified_name(db),
                    block.0,
                    caller.id.qualified_name(db)
                );
                continue;
            }

            let offset = if state.config.unique_inlined_registers {
                caller.registers.len()
            } else {
                shared_offset
            };

            if log_enabled!(Level::Trace) {
                trace!("before inlining:\n{}", to_text(db, caller));
            }

            splice(db, caller, block, instruction, &body, offset)?;

            if log_enabled!(Level::Trace) {
                trace!("after inlining:\n{}", to_text(db, caller));
            }

            self.stats.calls_inlined += 1;

            if recursive {
                self.stats.recursive_expansions += 1;
            }

            self.inlined.insert(callee);
        }

        self.stats.unreachable_instructions +=
            caller.remove_unreachable_blocks();
        self.modified.insert(caller.id);

        // Methods in a cycle may be inlined into each other before they are
        // finalized.
        self.selector.invalidate(caller.id);
        Ok(())
    }

    /// Shrinks a method once nothing is inlined into it anymore.
    ///
    /// Only methods that changed or that may be inlined into other methods
    /// are shrunk, leaving all other methods untouched.
    fn finalize(&mut self, mir: &mut Mir, index: usize) {
        let Some((&id, method)) = mir.methods.get_index_mut(index) else {
            return;
        };

        if !self.state.config.shrinker.enabled()
            || !(self.modified.contains(&id) || self.candidates.contains(&id))
        {
            return;
        }

        let stats = self.shrinker.shrink(method);

        if stats.changed() {
            self.stats.methods_shrunk += 1;
            self.stats.shrinker += stats;
            self.selector.invalidate(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShrinkerConfig;
    use crate::mir::{Handler, Instruction, InvokeKind, PositionId};
    use crate::test::{
        add_line, call, method_body, new_class, new_class_in, new_method,
        new_state,
    };
    use similar_asserts::assert_eq;
    use types::{ClassId, MethodKind, Signature, Store, Visibility};

    fn static_method(
        state: &mut State,
        class: ClassId,
        name: &str,
    ) -> MethodId {
        let kind = MethodKind::Static;

        new_method(&mut state.db, class, name, kind, Vec::new(), None)
    }

    /// Adds a method that loads a constant and returns.
    fn constant_method(state: &State, mir: &mut Mir, id: MethodId) {
        let mut body = method_body(&state.db, id);
        let b0 = body.body.start_id;
        let reg = body.registers.alloc(ValueKind::Primitive);
        let pos = add_line(&state.db, &mut body, 2);

        body.body.block_mut(b0).int_literal(reg, 42, pos);
        body.body.block_mut(b0).return_value(None, pos);
        mir.add_method(body);
    }

    /// Adds a method that calls each of the given methods and returns.
    fn calling_method(
        state: &State,
        mir: &mut Mir,
        id: MethodId,
        callees: &[MethodId],
    ) {
        let mut body = method_body(&state.db, id);
        let b0 = body.body.start_id;

        for &callee in callees {
            call(&state.db, &mut body, b0, callee, Vec::new(), None);
        }

        body.body.block_mut(b0).return_value(None, None);
        mir.add_method(body);
    }

    fn candidates(methods: &[MethodId]) -> IndexSet<MethodId> {
        methods.iter().cloned().collect()
    }

    fn invokes(method: &Method) -> usize {
        method
            .instructions()
            .filter(|i| matches!(i, Instruction::Invoke(_)))
            .count()
    }

    #[test]
    fn test_simple_inlining() {
        let mut state = new_state();
        let foo = new_class(&mut state.db, "Foo");
        let caller = static_method(&mut state, foo, "caller");
        let callee = static_method(&mut state, foo, "callee");
        let mut mir = Mir::new();

        calling_method(&state, &mut mir, caller, &[callee]);
        constant_method(&state, &mut mir, callee);

        let result =
            inline_methods(&mut state, &mut mir, &candidates(&[callee]))
                .unwrap();
        let body = &mir.methods[&caller];

        assert_eq!(result.inlined, candidates(&[callee]));
        assert_eq!(result.modified, candidates(&[caller]));
        assert_eq!(result.stats.calls_inlined, 1);
        assert_eq!(invokes(body), 0);
        assert_eq!(
            to_text(&state.db, body),
            "Foo.caller()V (registers = 1, size = 1)
b0 (start):
  goto b1
b1:
  r0 = const 42
  goto b2
b2:
  return
"
        );
    }

    #[test]
    fn test_size_limit() {
        let mut state = new_state();
        let foo = new_class(&mut state.db, "Foo");
        let caller = static_method(&mut state, foo, "caller");
        let callee = static_method(&mut state, foo, "callee");
        let mut mir = Mir::new();

        state.config.set_max_size(0);
        calling_method(&state, &mut mir, caller, &[callee]);
        constant_method(&state, &mut mir, callee);

        let result =
            inline_methods(&mut state, &mut mir, &candidates(&[callee]))
                .unwrap();

        assert!(result.inlined.is_empty());
        assert_eq!(result.stats.caller_too_large, 1);
        assert_eq!(invokes(&mir.methods[&caller]), 1);
    }

    #[test]
    fn test_self_looping_callee() {
        let mut state = new_state();
        let foo = new_class(&mut state.db, "Foo");
        let caller = static_method(&mut state, foo, "caller");
        let callee = static_method(&mut state, foo, "spin");
        let mut mir = Mir::new();

        calling_method(&state, &mut mir, caller, &[callee]);

        let mut body = method_body(&state.db, callee);
        let b0 = body.body.start_id;
        let b1 = body.body.add_block();

        body.body.block_mut(b0).goto(b1, None);
        body.body.add_edge(b0, b1);
        body.body.block_mut(b1).goto(b1, None);
        body.body.add_edge(b1, b1);
        mir.add_method(body);

        let result =
            inline_methods(&mut state, &mut mir, &candidates(&[callee]))
                .unwrap();

        assert_eq!(result.stats.calls_inlined, 1);
        assert_eq!(
            to_text(&state.db, &mir.methods[&caller]),
            "Foo.caller()V (registers = 0, size = 0)
b0 (start):
  goto b1
b1:
  goto b2
b2:
  goto b2
"
        );
    }

    #[test]
    fn test_self_recursive_callee() {
        let mut state = new_state();
        let foo = new_class(&mut state.db, "Foo");
        let caller = static_method(&mut state, foo, "caller");
        let callee = static_method(&mut state, foo, "recurse");
        let mut mir = Mir::new();

        calling_method(&state, &mut mir, caller, &[callee]);
        calling_method(&state, &mut mir, callee, &[callee, callee]);

        let result =
            inline_methods(&mut state, &mut mir, &candidates(&[callee]))
                .unwrap();

        // The callee is expanded into itself once, after which the expanded
        // body is inlined into the caller.
        assert_eq!(result.stats.recursive_expansions, 1);
        assert_eq!(result.stats.recursive, 1);
        assert_eq!(result.stats.calls_inlined, 2);
        assert_eq!(invokes(&mir.methods[&callee]), 3);
        assert_eq!(invokes(&mir.methods[&caller]), 3);
    }

    #[test]
    fn test_visibility_escalation() {
        let mut state = new_state();
        let a = new_class(&mut state.db, "a.A");
        let b = new_class(&mut state.db, "b.B");
        let caller = static_method(&mut state, a, "caller");
        let first = types::Method::alloc(
            &mut state.db,
            b,
            "first".to_string(),
            Signature::void(),
            Visibility::Private,
            MethodKind::Static,
        );
        let second = types::Method::alloc(
            &mut state.db,
            b,
            "second".to_string(),
            Signature::void(),
            Visibility::Private,
            MethodKind::Direct,
        );
        let mut mir = Mir::new();

        calling_method(&state, &mut mir, caller, &[first]);

        let mut body = method_body(&state.db, first);
        let b0 = body.body.start_id;
        let obj = body.registers.alloc(ValueKind::Object);

        body.body.block_mut(b0).new_instance(obj, b, None);
        call(&state.db, &mut body, b0, second, vec![obj], None);
        body.body.block_mut(b0).return_value(None, None);
        mir.add_method(body);

        let mut body = method_body(&state.db, second);
        let b0 = body.body.start_id;
        let obj = body.registers.alloc(ValueKind::Object);

        body.body.block_mut(b0).new_instance(obj, b, None);
        body.body.block_mut(b0).monitor_enter(obj, None);
        body.body.block_mut(b0).monitor_exit(obj, None);
        body.body.block_mut(b0).return_value(None, None);
        mir.add_method(body);

        let result =
            inline_methods(&mut state, &mut mir, &candidates(&[first]))
                .unwrap();

        assert_eq!(result.stats.calls_inlined, 1);
        assert_eq!(first.visibility(&state.db), Visibility::Private);
        assert_eq!(second.visibility(&state.db), Visibility::Public);
        assert_eq!(second.kind(&state.db), MethodKind::Static);
        assert_eq!(result.stats.made_static, 1);

        let kinds: Vec<_> = mir.methods[&caller]
            .instructions()
            .filter_map(|i| match i {
                Instruction::Invoke(v) => Some(v.kind),
                _ => None,
            })
            .collect();

        assert_eq!(kinds, vec![InvokeKind::Static]);
    }

    #[test]
    fn test_visibility_escalation_inlined_away() {
        let mut state = new_state();
        let a = new_class(&mut state.db, "a.A");
        let b = new_class(&mut state.db, "b.B");
        let caller = static_method(&mut state, a, "caller");
        let first = types::Method::alloc(
            &mut state.db,
            b,
            "first".to_string(),
            Signature::void(),
            Visibility::Private,
            MethodKind::Static,
        );
        let second = types::Method::alloc(
            &mut state.db,
            b,
            "second".to_string(),
            Signature::void(),
            Visibility::Private,
            MethodKind::Static,
        );
        let mut mir = Mir::new();

        calling_method(&state, &mut mir, caller, &[first]);
        calling_method(&state, &mut mir, first, &[second]);
        constant_method(&state, &mut mir, second);

        let result = inline_methods(
            &mut state,
            &mut mir,
            &candidates(&[first, second]),
        )
        .unwrap();

        assert_eq!(result.stats.calls_inlined, 2);
        assert_eq!(invokes(&mir.methods[&caller]), 0);
        assert_eq!(second.visibility(&state.db), Visibility::Private);
        assert_eq!(result.stats.escalated_methods, 0);
    }

    #[test]
    fn test_debug_position_depth() {
        let mut state = new_state();
        let foo = new_class(&mut state.db, "Foo");
        let methods: Vec<_> = (0..4)
            .map(|i| static_method(&mut state, foo, &format!("m{}", i)))
            .collect();
        let mut mir = Mir::new();

        // m0 -> m1 -> m2 -> m3, with m3 loading a constant.
        for pair in methods.windows(2) {
            calling_method(&state, &mut mir, pair[0], &[pair[1]]);
        }

        constant_method(&state, &mut mir, methods[3]);

        let result = inline_methods(
            &mut state,
            &mut mir,
            &candidates(&methods[1..]),
        )
        .unwrap();
        let body = &mir.methods[&methods[0]];
        let pos = body
            .instructions()
            .find_map(|i| match i {
                Instruction::Const(v) => v.position,
                _ => None,
            })
            .unwrap();
        let chain = body.positions.parents(pos);

        assert_eq!(result.stats.calls_inlined, 3);
        assert_eq!(body.positions.get(pos).method, methods[3]);
        assert_eq!(body.positions.get(pos).line, 2);
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.last(), Some(&PositionId(0)));
        assert_eq!(body.positions.get(PositionId(0)).method, methods[0]);
    }

    #[test]
    fn test_register_disjointness() {
        let mut state = new_state();
        let foo = new_class(&mut state.db, "Foo");
        let caller = static_method(&mut state, foo, "caller");
        let callee = new_method(
            &mut state.db,
            foo,
            "callee",
            MethodKind::Static,
            vec![ValueKind::Primitive],
            Some(ValueKind::Primitive),
        );
        let mut mir = Mir::new();
        let mut body = method_body(&state.db, caller);
        let b0 = body.body.start_id;
        let regs: Vec<_> = (0..3)
            .map(|_| body.registers.alloc(ValueKind::Primitive))
            .collect();

        body.body.block_mut(b0).int_literal(regs[0], 1, None);
        call(&state.db, &mut body, b0, callee, vec![regs[0]], Some(regs[1]));
        call(&state.db, &mut body, b0, callee, vec![regs[1]], Some(regs[2]));
        body.body.block_mut(b0).return_value(None, None);
        mir.add_method(body);

        let mut body = method_body(&state.db, callee);
        let b0 = body.body.start_id;
        let arg = body.arguments[0];
        let res = body.registers.alloc(ValueKind::Primitive);

        body.body.block_mut(b0).add_literal(res, arg, 1, None);
        body.body.block_mut(b0).return_value(Some(res), None);
        mir.add_method(body);

        let result =
            inline_methods(&mut state, &mut mir, &candidates(&[callee]))
                .unwrap();
        let body = &mir.methods[&caller];
        let mut defined = Vec::new();

        for ins in body.instructions() {
            if let Instruction::AddLiteral(v) = ins {
                defined.push(v.register.0);
                defined.push(v.source.0);
            }
        }

        assert_eq!(result.stats.calls_inlined, 2);
        assert_eq!(defined.len(), 4);
        assert!(defined.iter().all(|&r| r >= 3));

        defined.sort();
        defined.dedup();
        assert_eq!(defined.len(), 4);
    }

    #[test]
    fn test_shared_inlined_registers() {
        let mut state = new_state();
        let foo = new_class(&mut state.db, "Foo");
        let caller = static_method(&mut state, foo, "caller");
        let callee = static_method(&mut state, foo, "callee");
        let mut mir = Mir::new();

        state.config.unique_inlined_registers = false;
        calling_method(&state, &mut mir, caller, &[callee, callee]);
        constant_method(&state, &mut mir, callee);

        inline_methods(&mut state, &mut mir, &candidates(&[callee])).unwrap();

        let body = &mir.methods[&caller];
        let registers: Vec<_> = body
            .instructions()
            .filter_map(|i| match i {
                Instruction::Const(v) => Some(v.register.0),
                _ => None,
            })
            .collect();

        assert_eq!(registers, vec![0, 0]);
        assert_eq!(body.registers.len(), 1);
    }

    #[test]
    fn test_exception_safety() {
        let mut state = new_state();
        let foo = new_class(&mut state.db, "Foo");
        let error = new_class(&mut state.db, "Error");
        let caller = static_method(&mut state, foo, "caller");
        let callee = static_method(&mut state, foo, "callee");
        let mut mir = Mir::new();

        for (id, target) in [(caller, Some(callee)), (callee, None)] {
            let mut body = method_body(&state.db, id);
            let b0 = body.body.start_id;
            let b1 = body.body.add_block();
            let region = body
                .body
                .add_region(vec![Handler { class: Some(error), block: b1 }]);

            body.body.block_mut(b0).try_region = Some(region);

            if let Some(callee) = target {
                call(&state.db, &mut body, b0, callee, Vec::new(), None);
            }

            body.body.block_mut(b0).return_value(None, None);
            body.body.block_mut(b1).return_value(None, None);
            mir.add_method(body);
        }

        let result =
            inline_methods(&mut state, &mut mir, &candidates(&[callee]))
                .unwrap();

        assert!(result.inlined.is_empty());
        assert_eq!(result.stats.exception_safety, 1);
        assert_eq!(invokes(&mir.methods[&caller]), 1);
    }

    #[test]
    fn test_cross_store_safety() {
        let mut state = new_state();
        let extra = Store::alloc(&mut state.db, "extra".to_string(), false);
        let foo = new_class(&mut state.db, "Foo");
        let bar = new_class_in(&mut state.db, "Bar", extra);
        let caller = static_method(&mut state, foo, "caller");
        let callee = static_method(&mut state, foo, "callee");
        let mut mir = Mir::new();

        calling_method(&state, &mut mir, caller, &[callee]);

        // The root store can't refer to classes of the other store.
        let mut body = method_body(&state.db, callee);
        let b0 = body.body.start_id;
        let obj = body.registers.alloc(ValueKind::Object);

        body.body.block_mut(b0).new_instance(obj, bar, None);
        body.body.block_mut(b0).return_value(None, None);
        mir.add_method(body);

        let result =
            inline_methods(&mut state, &mut mir, &candidates(&[callee]))
                .unwrap();

        assert!(result.inlined.is_empty());
        assert_eq!(result.stats.cross_store, 1);
    }

    #[test]
    fn test_throw_after_no_return() {
        let mut state = new_state();
        let foo = new_class(&mut state.db, "Foo");
        let caller = static_method(&mut state, foo, "caller");
        let fail = static_method(&mut state, foo, "fail");
        let other = static_method(&mut state, foo, "other");
        let mut mir = Mir::new();

        state.config.throw_after_no_return = true;
        state.config.throws_inline = true;
        calling_method(&state, &mut mir, caller, &[fail, other]);
        constant_method(&state, &mut mir, other);

        let mut body = method_body(&state.db, fail);
        let b0 = body.body.start_id;
        let obj = body.registers.alloc(ValueKind::Object);

        body.body.block_mut(b0).new_instance(obj, foo, None);
        body.body.block_mut(b0).throw(obj, None);
        mir.add_method(body);

        let result = inline_methods(
            &mut state,
            &mut mir,
            &candidates(&[fail, other]),
        )
        .unwrap();

        assert_eq!(result.stats.no_returns, 1);
        assert_eq!(result.stats.calls_inlined, 0);
        assert_eq!(result.stats.unreachable_instructions, 2);
        assert_eq!(
            to_text(&state.db, &mir.methods[&caller]),
            "Foo.caller()V (registers = 1, size = 3)
b0 (start):
  invoke-static Foo.fail()V()
  r0 = const 0
  throw r0
"
        );
    }

    #[test]
    fn test_overridden_callee() {
        let mut state = new_state();
        let foo = new_class(&mut state.db, "Foo");
        let bar = new_class(&mut state.db, "Bar");

        bar.set_superclass(&mut state.db, foo);

        let caller = static_method(&mut state, foo, "caller");
        let callee = new_method(
            &mut state.db,
            foo,
            "run",
            MethodKind::Virtual,
            Vec::new(),
            None,
        );

        new_method(
            &mut state.db,
            bar,
            "run",
            MethodKind::Virtual,
            Vec::new(),
            None,
        );

        let mut mir = Mir::new();
        let mut body = method_body(&state.db, caller);
        let b0 = body.body.start_id;
        let obj = body.registers.alloc(ValueKind::Object);

        body.body.block_mut(b0).new_instance(obj, foo, None);
        call(&state.db, &mut body, b0, callee, vec![obj], None);
        body.body.block_mut(b0).return_value(None, None);
        mir.add_method(body);

        let mut body = method_body(&state.db, callee);
        let b0 = body.body.start_id;

        body.body.block_mut(b0).return_value(None, None);
        mir.add_method(body);

        let result =
            inline_methods(&mut state, &mut mir, &candidates(&[callee]))
                .unwrap();

        assert_eq!(result.stats.overridden, 1);
        assert!(result.inlined.is_empty());
    }

    #[test]
    fn test_instance_callee_null_check() {
        let mut state = new_state();
        let foo = new_class(&mut state.db, "Foo");
        let caller = static_method(&mut state, foo, "caller");
        let callee = new_method(
            &mut state.db,
            foo,
            "get",
            MethodKind::Direct,
            Vec::new(),
            Some(ValueKind::Primitive),
        );
        let mut mir = Mir::new();
        let mut body = method_body(&state.db, caller);
        let b0 = body.body.start_id;
        let obj = body.registers.alloc(ValueKind::Object);
        let res = body.registers.alloc(ValueKind::Primitive);

        body.body.block_mut(b0).new_instance(obj, foo, None);
        call(&state.db, &mut body, b0, callee, vec![obj], Some(res));
        body.body.block_mut(b0).return_value(Some(res), None);
        mir.add_method(body);

        let mut body = method_body(&state.db, callee);
        let b0 = body.body.start_id;
        let num = body.registers.alloc(ValueKind::Primitive);

        body.body.block_mut(b0).int_literal(num, 7, None);
        body.body.block_mut(b0).return_value(Some(num), None);
        mir.add_method(body);

        inline_methods(&mut state, &mut mir, &candidates(&[callee])).unwrap();

        assert_eq!(
            to_text(&state.db, &mir.methods[&caller]),
            "Foo.caller()V (registers = 4, size = 5)
b0 (start):
  r0 = new-instance Foo
  check-null r0
  r2 = move-object r0
  goto b1
b1:
  r3 = const 7
  r1 = move r3
  goto b2
b2:
  return r1
"
        );
    }

    #[test]
    fn test_inlining_with_shrinking() {
        let mut state = new_state();
        let foo = new_class(&mut state.db, "Foo");
        let caller = static_method(&mut state, foo, "caller");
        let callee = new_method(
            &mut state.db,
            foo,
            "get",
            MethodKind::Direct,
            Vec::new(),
            Some(ValueKind::Primitive),
        );
        let mut mir = Mir::new();
        let mut body = method_body(&state.db, caller);
        let b0 = body.body.start_id;
        let obj = body.registers.alloc(ValueKind::Object);
        let res = body.registers.alloc(ValueKind::Primitive);

        state.config.shrinker = ShrinkerConfig::all();
        body.body.block_mut(b0).new_instance(obj, foo, None);
        call(&state.db, &mut body, b0, callee, vec![obj], Some(res));
        body.body.block_mut(b0).return_value(Some(res), None);
        mir.add_method(body);

        let mut body = method_body(&state.db, callee);
        let b0 = body.body.start_id;
        let num = body.registers.alloc(ValueKind::Primitive);

        body.body.block_mut(b0).int_literal(num, 7, None);
        body.body.block_mut(b0).return_value(Some(num), None);
        mir.add_method(body);

        let result =
            inline_methods(&mut state, &mut mir, &candidates(&[callee]))
                .unwrap();
        let body = &mir.methods[&caller];

        assert_eq!(result.stats.calls_inlined, 1);
        assert!(result.stats.methods_shrunk >= 1);
        assert!(body.instructions().all(|i| !matches!(
            i,
            Instruction::CheckNull(_) | Instruction::Move(_)
        )));
    }

    #[test]
    fn test_empty_candidates() {
        let mut state = new_state();
        let foo = new_class(&mut state.db, "Foo");
        let caller = static_method(&mut state, foo, "caller");
        let callee = static_method(&mut state, foo, "callee");
        let mut mir = Mir::new();

        state.config = crate::config::InlinerConfig {
            shrinker: ShrinkerConfig::all(),
            use_call_site_summaries: true,
            throw_after_no_return: true,
            threads: 2,
            ..crate::config::InlinerConfig::new()
        };
        calling_method(&state, &mut mir, caller, &[callee]);
        constant_method(&state, &mut mir, callee);

        let before: Vec<_> = mir.methods.values().cloned().collect();
        let result =
            inline_methods(&mut state, &mut mir, &IndexSet::new()).unwrap();
        let after: Vec<_> = mir.methods.values().cloned().collect();

        assert!(result.inlined.is_empty());
        assert!(result.modified.is_empty());
        assert_eq!(result.stats.not_candidate, 1);
        assert_eq!(before, after);
    }

    #[test]
    fn test_no_return_with_unreachable_call_sites() {
        let mut state = new_state();
        let foo = new_class(&mut state.db, "Foo");
        let caller = static_method(&mut state, foo, "caller");
        let fail = static_method(&mut state, foo, "fail");
        let other = static_method(&mut state, foo, "other");
        let mut mir = Mir::new();

        state.config.throw_after_no_return = true;
        state.config.throws_inline = true;
        constant_method(&state, &mut mir, other);

        let mut body = method_body(&state.db, fail);
        let b0 = body.body.start_id;
        let obj = body.registers.alloc(ValueKind::Object);

        body.body.block_mut(b0).new_instance(obj, foo, None);
        body.body.block_mut(b0).throw(obj, None);
        mir.add_method(body);

        let mut body = method_body(&state.db, caller);
        let b0 = body.body.start_id;
        let b1 = body.body.add_block();

        call(&state.db, &mut body, b0, fail, Vec::new(), None);
        body.body.block_mut(b0).goto(b1, None);
        body.body.add_edge(b0, b1);
        call(&state.db, &mut body, b1, other, Vec::new(), None);
        body.body.block_mut(b1).return_value(None, None);
        mir.add_method(body);

        let result = inline_methods(
            &mut state,
            &mut mir,
            &candidates(&[fail, other]),
        )
        .unwrap();

        // The call to "other" is only reachable through the truncated block,
        // so it's removed instead of being inlined.
        assert!(result.inlined.is_empty());
        assert_eq!(result.modified, candidates(&[caller]));
        assert_eq!(result.stats.no_returns, 1);
        assert_eq!(result.stats.calls_inlined, 0);
        assert_eq!(result.stats.unreachable_instructions, 3);
        assert_eq!(
            to_text(&state.db, &mir.methods[&caller]),
            "Foo.caller()V (registers = 1, size = 3)
b0 (start):
  invoke-static Foo.fail()V()
  r0 = const 0
  throw r0
"
        );
    }

    #[test]
    fn test_unfinished_callee() {
        let mut state = new_state();
        let foo = new_class(&mut state.db, "Foo");
        let caller = static_method(&mut state, foo, "caller");
        let callee = static_method(&mut state, foo, "callee");
        let mut mir = Mir::new();

        calling_method(&state, &mut mir, caller, &[callee]);
        constant_method(&state, &mut mir, callee);

        let cands = candidates(&[callee]);
        let resolver = CachingResolver::new();
        let shrinker = LocalShrinker::new(state.config.shrinker);
        let graph = CallGraph::build(&state, &mir, &resolver);
        let caller_idx = mir.methods.get_index_of(&caller).unwrap();
        let callee_idx = mir.methods.get_index_of(&callee).unwrap();
        let mut pass =
            Inliner::new(&state, graph, &cands, &resolver, &shrinker);

        assert_eq!(
            pass.inline_into(&mut mir, caller_idx),
            Err(InlineError::UnfinishedCallee {
                method: "Foo.caller()V".to_string(),
                callee: "Foo.callee()V".to_string(),
                state: "Pending".to_string(),
            })
        );
        assert_eq!(invokes(&mir.methods[&caller]), 1);

        pass.graph.set_state(callee_idx, NodeState::Finalized);

        assert_eq!(pass.inline_into(&mut mir, caller_idx), Ok(()));
        assert_eq!(pass.stats.calls_inlined, 1);
        assert_eq!(invokes(&mir.methods[&caller]), 0);
    }

    #[test]
    fn test_callee_body_unchanged() {
        let mut state = new_state();
        let foo = new_class(&mut state.db, "Foo");
        let caller = static_method(&mut state, foo, "caller");
        let callee = static_method(&mut state, foo, "callee");
        let mut mir = Mir::new();

        calling_method(&state, &mut mir, caller, &[callee, callee]);

        let mut body = method_body(&state.db, callee);
        let b0 = body.body.start_id;
        let b1 = body.body.add_block();
        let b2 = body.body.add_block();
        let cond = body.registers.alloc(ValueKind::Primitive);
        let pos = add_line(&state.db, &mut body, 4);

        body.body.block_mut(b0).int_literal(cond, 1, pos);
        body.body.block_mut(b0).branch(cond, b1, b2, pos);
        body.body.add_edge(b0, b1);
        body.body.add_edge(b0, b2);
        body.body.block_mut(b1).return_value(None, pos);
        body.body.block_mut(b2).return_value(None, pos);
        mir.add_method(body);

        let before = mir.methods[&callee].clone();
        let result =
            inline_methods(&mut state, &mut mir, &candidates(&[callee]))
                .unwrap();

        assert_eq!(result.stats.calls_inlined, 2);
        assert_eq!(mir.methods[&callee], before);
        assert!(mir.methods[&caller].verify().is_ok());
    }

    #[test]
    fn test_mutually_recursive_callees() {
        let mut state = new_state();
        let foo = new_class(&mut state.db, "Foo");
        let caller = static_method(&mut state, foo, "caller");
        let ping = static_method(&mut state, foo, "ping");
        let pong = static_method(&mut state, foo, "pong");
        let mut mir = Mir::new();

        calling_method(&state, &mut mir, caller, &[ping]);
        calling_method(&state, &mut mir, ping, &[pong]);
        calling_method(&state, &mut mir, pong, &[ping]);

        let result = inline_methods(
            &mut state,
            &mut mir,
            &candidates(&[ping, pong]),
        )
        .unwrap();

        // Both methods of the cycle are expanded into each other once, then
        // the caller absorbs the final body of "ping".
        assert_eq!(result.stats.calls_inlined, 3);
        assert_eq!(result.stats.recursive_expansions, 2);
        assert_eq!(result.modified, candidates(&[ping, pong, caller]));
        assert_eq!(invokes(&mir.methods[&caller]), 1);

        for method in mir.methods.values() {
            assert_eq!(method.verify(), Ok(()));
        }
    }

    #[test]
    fn test_abstract_callee() {
        let mut state = new_state();
        let foo = new_class(&mut state.db, "Foo");
        let caller = static_method(&mut state, foo, "caller");
        let callee = static_method(&mut state, foo, "callee");
        let mut mir = Mir::new();

        callee.set_source(&mut state.db, MethodSource::Abstract);
        calling_method(&state, &mut mir, caller, &[callee]);
        constant_method(&state, &mut mir, callee);

        let result =
            inline_methods(&mut state, &mut mir, &candidates(&[callee]))
                .unwrap();

        assert!(result.inlined.is_empty());
        assert_eq!(result.stats.no_body, 1);
        assert_eq!(invokes(&mir.methods[&caller]), 1);
    }
}
