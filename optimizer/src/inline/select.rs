//! Deciding which call sites are inlined.
use crate::call_graph::{CallGraph, CallSite};
use crate::config::InlinerConfig;
use crate::mir::{Instruction, InvokeKind, Method};
use crate::resolver::Resolve;
use crate::shrink::Shrinker;
use crate::stats::Rejection;
use crate::summary::CallSiteSummary;
use fnv::FnvHashMap;
use indexmap::IndexSet;
use types::{ClassId, Database, MethodId, MethodKind, Visibility};

/// Returns the number of instructions a call site grows by when `body` is
/// inlined into it.
///
/// This includes the instructions used to pass the arguments and the result,
/// and excludes the removed invoke instruction. Since inlining may remove
/// instructions, the result may be negative.
pub(crate) fn splice_delta(
    db: &Database,
    body: &Method,
    result_used: bool,
) -> isize {
    let mut size = body.code_size() + body.arguments.len();

    if !body.id.is_static(db) {
        size += 1;
    }

    if result_used {
        size += body
            .instructions()
            .filter(|ins| {
                matches!(ins, Instruction::Return(r) if r.register.is_some())
            })
            .count();
    }

    size as isize - 1
}

/// Returns the classes a method body refers to, including the class the
/// method is defined in.
fn referenced_classes(db: &Database, method: &Method) -> IndexSet<ClassId> {
    let mut classes = IndexSet::new();

    classes.insert(method.id.class(db));

    for ins in method.instructions() {
        match ins {
            Instruction::Invoke(v) => {
                classes.insert(v.method.class(db));
            }
            Instruction::NewInstance(v) => {
                classes.insert(v.class);
            }
            Instruction::GetField(v) => {
                classes.insert(v.field.class(db));
            }
            Instruction::SetField(v) => {
                classes.insert(v.field.class(db));
            }
            _ => {}
        }
    }

    for region in &method.body.regions {
        classes.extend(region.handlers.iter().filter_map(|h| h.class));
    }

    classes
}

/// A type for checking if call sites can be inlined and if doing so is
/// worth it.
pub(crate) struct Selector<'a> {
    db: &'a Database,
    config: &'a InlinerConfig,
    resolver: &'a dyn Resolve,
    shrinker: &'a dyn Shrinker,

    /// The bodies of callees specialized for call site summaries.
    reduced: FnvHashMap<(MethodId, CallSiteSummary), Method>,
}

impl<'a> Selector<'a> {
    pub(crate) fn new(
        db: &'a Database,
        config: &'a InlinerConfig,
        resolver: &'a dyn Resolve,
        shrinker: &'a dyn Shrinker,
    ) -> Self {
        Self { db, config, resolver, shrinker, reduced: FnvHashMap::default() }
    }

    /// Removes the specialized bodies of a method that changed.
    pub(crate) fn invalidate(&mut self, method: MethodId) {
        self.reduced.retain(|(id, _), _| *id != method);
    }

    /// Checks the rules a call site must meet to be inlined, ignoring its
    /// size.
    pub(crate) fn check(
        &self,
        caller: &Method,
        site: &CallSite,
        callee: &Method,
    ) -> Result<(), Rejection> {
        self.check_stores(caller, callee)?;
        self.check_exception_safety(caller, site, callee)?;

        if !self.config.throws_inline
            && callee.instructions().any(|i| matches!(i, Instruction::Throw(_)))
        {
            return Err(Rejection::Throws);
        }

        self.check_visibility(caller, callee)
    }

    /// Returns the body to inline at the given call site.
    pub(crate) fn body_for(
        &mut self,
        callee: &Method,
        summary: &CallSiteSummary,
    ) -> Method {
        if !self.config.use_call_site_summaries {
            return callee.clone();
        }

        self.reduced_body(callee, summary).clone()
    }

    /// Checks if inlining `body` at the call site is worth it, returning the
    /// number of instructions the caller grows by.
    pub(crate) fn check_benefit(
        &mut self,
        graph: &CallGraph,
        site: &CallSite,
        callee: &Method,
        body: &Method,
    ) -> Result<isize, Rejection> {
        let used = site.summary.result_used;
        let delta = splice_delta(self.db, body, used);

        if splice_delta(self.db, callee, used)
            <= self.config.soft_max_size as isize
        {
            return Ok(delta);
        }

        if !self.config.use_call_site_summaries {
            return Err(Rejection::TooLarge);
        }

        let beneficial = if self.config.multiple_callers {
            delta <= 0
        } else {
            // All call sites share the same verdict, based on the average
            // growth across those sites. Since we only care about the sign of
            // the average, we can use the sum instead.
            let db = self.db;
            let mut total = 0;

            for &index in graph.call_sites_of(callee.id) {
                let summary = &graph.sites[index].summary;
                let reduced = self.reduced_body(callee, summary);

                total += splice_delta(db, reduced, summary.result_used);
            }

            total <= 0
        };

        if beneficial {
            Ok(delta)
        } else {
            Err(Rejection::TooLarge)
        }
    }

    fn reduced_body(
        &mut self,
        callee: &Method,
        summary: &CallSiteSummary,
    ) -> &Method {
        let shrinker = self.shrinker;

        self.reduced.entry((callee.id, summary.clone())).or_insert_with(|| {
            let mut body = callee.clone();

            if !summary.result_used {
                for block in &mut body.body.blocks {
                    if let Some(Instruction::Return(ret)) =
                        block.instructions.last_mut()
                    {
                        ret.register = None;
                    }
                }
            }

            shrinker.shrink_for_call_site(&mut body, &summary.arguments);
            body
        })
    }

    fn check_stores(
        &self,
        caller: &Method,
        callee: &Method,
    ) -> Result<(), Rejection> {
        let db = self.db;
        let Some(from) = db.store_of(caller.id.class(db)) else {
            return Ok(());
        };

        if self.config.intra_module()
            && db.store_of(callee.id.class(db)) != Some(from)
        {
            return Err(Rejection::CrossStore);
        }

        for class in referenced_classes(db, callee) {
            let Some(to) = db.store_of(class) else { continue };

            if !db.is_dependency_allowed(from, to) {
                return Err(Rejection::CrossStore);
            }
        }

        Ok(())
    }

    /// Checks if the try regions of the callee can be merged into those of
    /// the call site.
    ///
    /// If the call site is covered by handlers that don't catch everything,
    /// exceptions escaping a partially covered region of the callee would
    /// end up in handlers they never reached before. Monitors released by
    /// the callee's handlers have the same problem for exceptions thrown
    /// outside of those regions.
    fn check_exception_safety(
        &self,
        caller: &Method,
        site: &CallSite,
        callee: &Method,
    ) -> Result<(), Rejection> {
        match caller.body.region_of(site.block) {
            Some(region) if !region.has_catch_all() => {}
            _ => return Ok(()),
        }

        if callee.body.regions.iter().any(|r| !r.has_catch_all()) {
            return Err(Rejection::ExceptionSafety);
        }

        let monitors = callee.instructions().any(|i| {
            matches!(
                i,
                Instruction::MonitorEnter(_) | Instruction::MonitorExit(_)
            )
        });
        let unguarded = callee.body.blocks.iter().any(|b| {
            b.try_region.is_none()
                && b.instructions.iter().any(|i| i.may_throw())
        });

        if monitors && unguarded {
            Err(Rejection::ExceptionSafety)
        } else {
            Ok(())
        }
    }

    /// Checks if the members the callee refers to can be made accessible to
    /// the caller.
    ///
    /// Members of classes we own can be made accessible later, as long as
    /// this doesn't change which method a virtual call dispatches to.
    fn check_visibility(
        &self,
        caller: &Method,
        callee: &Method,
    ) -> Result<(), Rejection> {
        let db = self.db;
        let from = caller.id.class(db);
        let callee_class = callee.id.class(db);

        for ins in callee.instructions() {
            match ins {
                Instruction::Invoke(v) => {
                    // Calls to the superclass are relative to the class of
                    // the method they are in.
                    if v.kind == InvokeKind::Super && from != callee_class {
                        return Err(Rejection::Visibility);
                    }

                    let owner = v.method.class(db);
                    let found =
                        self.resolver.resolve(db, v.method, v.kind.search());
                    let Some(target) = found else {
                        if !owner.is_external(db) && owner != from {
                            return Err(Rejection::Visibility);
                        }

                        continue;
                    };
                    let owner = target.class(db);

                    if db.is_accessible(from, owner, target.visibility(db)) {
                        continue;
                    }

                    if owner.is_external(db)
                        || target.kind(db) == MethodKind::Virtual
                    {
                        return Err(Rejection::Visibility);
                    }
                }
                Instruction::GetField(v) => {
                    self.check_member(from, v.field.class(db), || {
                        v.field.visibility(db)
                    })?;
                }
                Instruction::SetField(v) => {
                    self.check_member(from, v.field.class(db), || {
                        v.field.visibility(db)
                    })?;
                }
                Instruction::NewInstance(v) => {
                    self.check_member(from, v.class, || {
                        v.class.visibility(db)
                    })?;
                }
                _ => {}
            }
        }

        for handler in callee.body.regions.iter().flat_map(|r| &r.handlers) {
            if let Some(class) = handler.class {
                self.check_member(from, class, || class.visibility(db))?;
            }
        }

        Ok(())
    }

    fn check_member<F: FnOnce() -> Visibility>(
        &self,
        from: ClassId,
        owner: ClassId,
        visibility: F,
    ) -> Result<(), Rejection> {
        if owner.is_external(self.db)
            && !self.db.is_accessible(from, owner, visibility())
        {
            Err(Rejection::Visibility)
        } else {
            Ok(())
        }
    }
}
