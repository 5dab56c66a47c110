//! Making members accessible to the code they were inlined into.
//!
//! Inlining a method into a method of another class moves the references in
//! its body to that class. Members no longer accessible from that class have
//! their access level raised to the lowest level that makes them accessible.
//! This runs once all inlining is done, such that members referenced only by
//! call sites that were inlined away aren't changed.
use crate::mir::{Instruction, InvokeKind, Mir};
use crate::resolver::Resolve;
use crate::stats::InlineStats;
use indexmap::{IndexMap, IndexSet};
use log::debug;
use types::{ClassId, Database, FieldId, MethodId, MethodKind, Visibility};

/// The access levels to change.
#[derive(Default)]
struct Changes {
    methods: IndexMap<MethodId, Visibility>,
    fields: IndexMap<FieldId, Visibility>,
    classes: IndexSet<ClassId>,
}

impl Changes {
    fn require_class(&mut self, db: &Database, from: ClassId, owner: ClassId) {
        if owner.is_external(db)
            || owner.visibility(db).is_public()
            || from.package(db) == owner.package(db)
        {
            return;
        }

        self.classes.insert(owner);
    }

    fn require_method(&mut self, db: &Database, from: ClassId, id: MethodId) {
        let owner = id.class(db);
        let current = id.visibility(db);

        if owner.is_external(db) || db.is_accessible(from, owner, current) {
            return;
        }

        let needed = db.required_visibility(from, owner).max(current);
        let entry = self.methods.entry(id).or_insert(current);

        *entry = needed.max(*entry);
        self.require_class(db, from, owner);
    }

    fn require_field(&mut self, db: &Database, from: ClassId, id: FieldId) {
        let owner = id.class(db);
        let current = id.visibility(db);

        if owner.is_external(db) || db.is_accessible(from, owner, current) {
            return;
        }

        let needed = db.required_visibility(from, owner).max(current);
        let entry = self.fields.entry(id).or_insert(current);

        *entry = needed.max(*entry);
        self.require_class(db, from, owner);
    }
}

/// Raises the access levels of the members referred to by the given methods,
/// such that the methods can access them.
pub fn fix_visibility(
    db: &mut Database,
    mir: &mut Mir,
    methods: &IndexSet<MethodId>,
    resolver: &dyn Resolve,
    stats: &mut InlineStats,
) {
    let changes = collect(db, mir, methods, resolver);
    let mut made_static = IndexSet::new();

    for (&id, &visibility) in &changes.methods {
        debug!(
            "making {} {} (was {})",
            id.qualified_name(db),
            visibility.name(),
            id.visibility(db).name()
        );

        // Direct calls only work for methods private to the calling class,
        // so methods that stop being private must be called statically.
        if id.kind(db) == MethodKind::Direct {
            made_static.insert(id.reference(db));
            id.make_static(db);
        }

        id.set_visibility(db, visibility);
    }

    for (&id, &visibility) in &changes.fields {
        id.set_visibility(db, visibility);
    }

    for &id in &changes.classes {
        debug!("making class {} public", id.name(db));
        id.set_visibility(db, Visibility::Public);
    }

    if !made_static.is_empty() {
        for method in mir.methods.values_mut() {
            for block in &mut method.body.blocks {
                for ins in &mut block.instructions {
                    match ins {
                        Instruction::Invoke(v)
                            if v.kind == InvokeKind::Direct
                                && made_static.contains(&v.method) =>
                        {
                            v.kind = InvokeKind::Static;
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    stats.escalated_methods += changes.methods.len();
    stats.escalated_fields += changes.fields.len();
    stats.escalated_classes += changes.classes.len();
    stats.made_static += made_static.len();
}

fn collect(
    db: &Database,
    mir: &Mir,
    methods: &IndexSet<MethodId>,
    resolver: &dyn Resolve,
) -> Changes {
    let mut changes = Changes::default();

    for id in methods {
        let Some(method) = mir.methods.get(id) else { continue };
        let from = id.class(db);

        for ins in method.instructions() {
            match ins {
                Instruction::Invoke(v) => {
                    if let Some(target) =
                        resolver.resolve(db, v.method, v.kind.search())
                    {
                        changes.require_method(db, from, target);
                    }
                }
                Instruction::GetField(v) => {
                    changes.require_field(db, from, v.field);
                }
                Instruction::SetField(v) => {
                    changes.require_field(db, from, v.field);
                }
                Instruction::NewInstance(v) => {
                    changes.require_class(db, from, v.class);
                }
                _ => {}
            }
        }

        for handler in method.body.regions.iter().flat_map(|r| &r.handlers) {
            if let Some(class) = handler.class {
                changes.require_class(db, from, class);
            }
        }
    }

    changes
}
