//! Resolving symbolic method references into method definitions.
use crate::{Database, MethodId, MethodKind, MethodRefId};

/// The strategy used to find the method a reference refers to.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum MethodSearch {
    /// Only the class named by the reference is searched, and only for direct
    /// methods and constructors.
    Direct,

    /// The class and its superclasses are searched for static methods.
    Static,

    /// The class and its superclasses are searched for virtual methods.
    Virtual,

    /// The same as `Virtual`, used for calls to a superclass implementation.
    Super,

    /// The same as `Virtual`, used for calls through an interface.
    Interface,

    /// The class and its superclasses are searched for any kind of method.
    Any,
}

impl MethodSearch {
    fn accepts(self, kind: MethodKind) -> bool {
        match self {
            MethodSearch::Direct => {
                matches!(kind, MethodKind::Direct | MethodKind::Constructor)
            }
            MethodSearch::Static => kind == MethodKind::Static,
            MethodSearch::Virtual
            | MethodSearch::Super
            | MethodSearch::Interface => kind == MethodKind::Virtual,
            MethodSearch::Any => true,
        }
    }
}

/// Resolves a method reference using the given search strategy.
///
/// This function is pure: calling it multiple times with the same database
/// produces the same result.
pub fn resolve_method(
    db: &Database,
    reference: MethodRefId,
    search: MethodSearch,
) -> Option<MethodId> {
    let name = reference.name(db);
    let signature = reference.signature(db);
    let mut current = Some(reference.class(db));

    while let Some(class) = current {
        let found = class
            .method(db, name, signature)
            .filter(|m| search.accepts(m.kind(db)));

        if found.is_some() {
            return found;
        }

        if search == MethodSearch::Direct {
            break;
        }

        current = class.superclass(db);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{new_class, new_method, new_store};
    use crate::{MethodRef, Signature};

    #[test]
    fn test_resolve_direct() {
        let mut db = Database::new();
        let store = new_store(&mut db, "classes", true);
        let parent = new_class(&mut db, "Parent", store);
        let child = new_class(&mut db, "Child", store);
        let method = new_method(&mut db, parent, "foo", MethodKind::Direct);

        child.set_superclass(&mut db, parent);

        let direct = method.reference(&db);
        let inherited = MethodRef::intern(
            &mut db,
            child,
            "foo".to_string(),
            Signature::void(),
        );

        assert_eq!(
            resolve_method(&db, direct, MethodSearch::Direct),
            Some(method)
        );
        assert_eq!(resolve_method(&db, inherited, MethodSearch::Direct), None);
        assert_eq!(resolve_method(&db, direct, MethodSearch::Static), None);
    }

    #[test]
    fn test_resolve_virtual_walks_superclasses() {
        let mut db = Database::new();
        let store = new_store(&mut db, "classes", true);
        let parent = new_class(&mut db, "Parent", store);
        let child = new_class(&mut db, "Child", store);
        let method = new_method(&mut db, parent, "foo", MethodKind::Virtual);

        child.set_superclass(&mut db, parent);

        let reference = MethodRef::intern(
            &mut db,
            child,
            "foo".to_string(),
            Signature::void(),
        );

        assert_eq!(
            resolve_method(&db, reference, MethodSearch::Virtual),
            Some(method)
        );
        assert_eq!(
            resolve_method(&db, reference, MethodSearch::Any),
            Some(method)
        );
        assert_eq!(resolve_method(&db, reference, MethodSearch::Static), None);
    }

    #[test]
    fn test_resolve_prefers_closest_definition() {
        let mut db = Database::new();
        let store = new_store(&mut db, "classes", true);
        let parent = new_class(&mut db, "Parent", store);
        let child = new_class(&mut db, "Child", store);

        child.set_superclass(&mut db, parent);
        new_method(&mut db, parent, "foo", MethodKind::Virtual);

        let over = new_method(&mut db, child, "foo", MethodKind::Virtual);

        assert_eq!(
            resolve_method(&db, over.reference(&db), MethodSearch::Virtual),
            Some(over)
        );
    }

    #[test]
    fn test_resolve_missing_method() {
        let mut db = Database::new();
        let store = new_store(&mut db, "classes", true);
        let class = new_class(&mut db, "Foo", store);
        let reference = MethodRef::intern(
            &mut db,
            class,
            "missing".to_string(),
            Signature::void(),
        );

        assert_eq!(resolve_method(&db, reference, MethodSearch::Any), None);
    }
}
