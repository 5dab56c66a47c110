//! Declarations of the program being optimized.
//!
//! The database stores stores (modules), classes, methods, fields and
//! symbolic method references. Method bodies live elsewhere; this crate only
//! knows about names, signatures, access levels and where things are defined.
#![cfg_attr(feature = "cargo-clippy", allow(clippy::new_without_default))]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::len_without_is_empty))]


pub mod resolve;

use std::collections::HashMap;
use std::fmt;

/// The separator used between the package and class name of a class.
const PACKAGE_SEPARATOR: char = '.';

/// The access level of a class, method or field.
///
/// The variants are ordered from narrowest to broadest, such that escalating
/// an access level is the same as taking the maximum of two levels.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum Visibility {
    /// A symbol only available to the class that defines it.
    Private,

    /// A symbol available to all classes in the same package.
    Package,

    /// A symbol that can be used from anywhere.
    Public,
}

impl Visibility {
    pub fn is_public(self) -> bool {
        self == Visibility::Public
    }

    pub fn name(self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Package => "package",
            Visibility::Public => "public",
        }
    }
}

/// The kind of value stored in a register or passed as an argument.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum ValueKind {
    Primitive,
    Object,
}

/// The argument and return kinds of a method, excluding the receiver.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct Signature {
    pub arguments: Vec<ValueKind>,
    pub returns: Option<ValueKind>,
}

impl Signature {
    pub fn new(arguments: Vec<ValueKind>, returns: Option<ValueKind>) -> Self {
        Self { arguments, returns }
    }

    pub fn void() -> Self {
        Self::new(Vec::new(), None)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = |k: ValueKind| match k {
            ValueKind::Primitive => "I",
            ValueKind::Object => "L",
        };

        write!(f, "(")?;

        for &arg in &self.arguments {
            write!(f, "{}", kind(arg))?;
        }

        write!(f, ")")?;

        match self.returns {
            Some(ret) => write!(f, "{}", kind(ret)),
            None => write!(f, "V"),
        }
    }
}

/// A named partition of classes, loaded either always (root stores) or on
/// demand.
pub struct Store {
    name: String,
    root: bool,

    /// The names of the stores this store is allowed to depend on.
    dependencies: Vec<String>,
}

impl Store {
    pub fn alloc(db: &mut Database, name: String, root: bool) -> StoreId {
        let id = db.stores.len();

        db.stores.push(Store { name, root, dependencies: Vec::new() });
        StoreId(id)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub struct StoreId(pub usize);

impl StoreId {
    pub fn name(self, db: &Database) -> &String {
        &self.get(db).name
    }

    pub fn is_root(self, db: &Database) -> bool {
        self.get(db).root
    }

    pub fn add_dependency(self, db: &mut Database, name: String) {
        self.get_mut(db).dependencies.push(name);
    }

    pub fn dependencies(self, db: &Database) -> &[String] {
        &self.get(db).dependencies
    }

    fn get(self, db: &Database) -> &Store {
        &db.stores[self.0]
    }

    fn get_mut(self, db: &mut Database) -> &mut Store {
        &mut db.stores[self.0]
    }
}

/// A class, either defined by the program (owned by a store) or provided by
/// the environment (external).
pub struct Class {
    name: String,
    visibility: Visibility,
    store: Option<StoreId>,
    superclass: Option<ClassId>,
    methods: Vec<MethodId>,
    fields: Vec<FieldId>,
}

impl Class {
    pub fn alloc(
        db: &mut Database,
        name: String,
        visibility: Visibility,
        store: StoreId,
    ) -> ClassId {
        Class::add(db, name, visibility, Some(store))
    }

    pub fn external(db: &mut Database, name: String) -> ClassId {
        Class::add(db, name, Visibility::Public, None)
    }

    fn add(
        db: &mut Database,
        name: String,
        visibility: Visibility,
        store: Option<StoreId>,
    ) -> ClassId {
        let id = ClassId(db.classes.len());

        db.class_mapping.insert(name.clone(), id);
        db.classes.push(Class {
            name,
            visibility,
            store,
            superclass: None,
            methods: Vec::new(),
            fields: Vec::new(),
        });

        id
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub struct ClassId(pub usize);

impl ClassId {
    pub fn name(self, db: &Database) -> &String {
        &self.get(db).name
    }

    /// Returns the package of this class, which is everything before the last
    /// separator in its name.
    pub fn package(self, db: &Database) -> &str {
        let name = &self.get(db).name;

        name.rfind(PACKAGE_SEPARATOR).map_or("", |idx| &name[..idx])
    }

    pub fn visibility(self, db: &Database) -> Visibility {
        self.get(db).visibility
    }

    pub fn set_visibility(self, db: &mut Database, visibility: Visibility) {
        self.get_mut(db).visibility = visibility;
    }

    pub fn store(self, db: &Database) -> Option<StoreId> {
        self.get(db).store
    }

    pub fn is_external(self, db: &Database) -> bool {
        self.get(db).store.is_none()
    }

    pub fn superclass(self, db: &Database) -> Option<ClassId> {
        self.get(db).superclass
    }

    pub fn set_superclass(self, db: &mut Database, superclass: ClassId) {
        self.get_mut(db).superclass = Some(superclass);
    }

    pub fn methods(self, db: &Database) -> &[MethodId] {
        &self.get(db).methods
    }

    pub fn fields(self, db: &Database) -> &[FieldId] {
        &self.get(db).fields
    }

    pub fn method(
        self,
        db: &Database,
        name: &str,
        signature: &Signature,
    ) -> Option<MethodId> {
        self.get(db).methods.iter().cloned().find(|&m| {
            let method = m.get(db);

            method.name == name && &method.signature == signature
        })
    }

    /// Returns `true` if `self` is `other` or inherits from it.
    pub fn is_subclass_of(self, db: &Database, other: ClassId) -> bool {
        let mut current = Some(self);

        while let Some(id) = current {
            if id == other {
                return true;
            }

            current = id.superclass(db);
        }

        false
    }

    fn get(self, db: &Database) -> &Class {
        &db.classes[self.0]
    }

    fn get_mut(self, db: &mut Database) -> &mut Class {
        &mut db.classes[self.0]
    }
}

/// The way a method is dispatched.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum MethodKind {
    /// A method without a receiver.
    Static,

    /// An instance method that isn't dynamically dispatched, such as a private
    /// instance method.
    Direct,

    /// An instance method that's dispatched based on the receiver's class.
    Virtual,

    /// An instance initializer.
    Constructor,
}

/// Where the body of a method comes from.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum MethodSource {
    /// The method has a body defined by the program.
    Concrete,

    /// The method is declared but has no body, such as an interface method.
    Abstract,

    /// The method is implemented by the runtime.
    Native,

    /// The method is defined by an external class.
    External,
}

pub struct Method {
    class: ClassId,
    name: String,
    signature: Signature,
    visibility: Visibility,
    kind: MethodKind,
    source: MethodSource,
    reference: MethodRefId,
}

impl Method {
    pub fn alloc(
        db: &mut Database,
        class: ClassId,
        name: String,
        signature: Signature,
        visibility: Visibility,
        kind: MethodKind,
    ) -> MethodId {
        let id = MethodId(db.methods.len());
        let source = if class.is_external(db) {
            MethodSource::External
        } else {
            MethodSource::Concrete
        };
        let reference =
            MethodRef::intern(db, class, name.clone(), signature.clone());

        db.methods.push(Method {
            class,
            name,
            signature,
            visibility,
            kind,
            source,
            reference,
        });
        class.get_mut(db).methods.push(id);
        id
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub struct MethodId(pub usize);

impl MethodId {
    pub fn class(self, db: &Database) -> ClassId {
        self.get(db).class
    }

    pub fn name(self, db: &Database) -> &String {
        &self.get(db).name
    }

    /// Returns the name of the method including its class and signature, such
    /// as `com.example.Foo.bar(IL)V`.
    pub fn qualified_name(self, db: &Database) -> String {
        let method = self.get(db);

        format!(
            "{}.{}{}",
            method.class.name(db),
            method.name,
            method.signature
        )
    }

    pub fn signature(self, db: &Database) -> &Signature {
        &self.get(db).signature
    }

    pub fn visibility(self, db: &Database) -> Visibility {
        self.get(db).visibility
    }

    pub fn set_visibility(self, db: &mut Database, visibility: Visibility) {
        self.get_mut(db).visibility = visibility;
    }

    pub fn kind(self, db: &Database) -> MethodKind {
        self.get(db).kind
    }

    pub fn is_static(self, db: &Database) -> bool {
        self.kind(db) == MethodKind::Static
    }

    pub fn source(self, db: &Database) -> MethodSource {
        self.get(db).source
    }

    pub fn set_source(self, db: &mut Database, source: MethodSource) {
        self.get_mut(db).source = source;
    }

    pub fn reference(self, db: &Database) -> MethodRefId {
        self.get(db).reference
    }

    /// Returns the kinds of all values passed to this method, including the
    /// receiver for instance methods.
    pub fn argument_kinds(self, db: &Database) -> Vec<ValueKind> {
        let method = self.get(db);
        let mut kinds =
            Vec::with_capacity(method.signature.arguments.len() + 1);

        if method.kind != MethodKind::Static {
            kinds.push(ValueKind::Object);
        }

        kinds.extend_from_slice(&method.signature.arguments);
        kinds
    }

    /// Returns `true` if a subclass defines a virtual method with the same
    /// name and signature.
    pub fn is_overridden(self, db: &Database) -> bool {
        let method = self.get(db);

        db.classes.iter().enumerate().any(|(idx, _)| {
            let class = ClassId(idx);

            class != method.class
                && class.is_subclass_of(db, method.class)
                && class
                    .method(db, &method.name, &method.signature)
                    .map_or(false, |m| m.kind(db) == MethodKind::Virtual)
        })
    }

    /// Turns a direct instance method into a static method.
    ///
    /// The receiver becomes an explicit first argument, both in the signature
    /// of the method and in its interned reference.
    pub fn make_static(self, db: &mut Database) {
        let method = self.get_mut(db);

        method.kind = MethodKind::Static;
        method.signature.arguments.insert(0, ValueKind::Object);

        let reference = method.reference;
        let signature = method.signature.clone();

        reference.set_signature(db, signature);
    }

    fn get(self, db: &Database) -> &Method {
        &db.methods[self.0]
    }

    fn get_mut(self, db: &mut Database) -> &mut Method {
        &mut db.methods[self.0]
    }
}

pub struct Field {
    class: ClassId,
    name: String,
    kind: ValueKind,
    visibility: Visibility,
    is_static: bool,
}

impl Field {
    pub fn alloc(
        db: &mut Database,
        class: ClassId,
        name: String,
        kind: ValueKind,
        visibility: Visibility,
        is_static: bool,
    ) -> FieldId {
        let id = FieldId(db.fields.len());

        db.fields.push(Field { class, name, kind, visibility, is_static });
        class.get_mut(db).fields.push(id);
        id
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub struct FieldId(pub usize);

impl FieldId {
    pub fn class(self, db: &Database) -> ClassId {
        self.get(db).class
    }

    pub fn name(self, db: &Database) -> &String {
        &self.get(db).name
    }

    pub fn kind(self, db: &Database) -> ValueKind {
        self.get(db).kind
    }

    pub fn is_static(self, db: &Database) -> bool {
        self.get(db).is_static
    }

    pub fn visibility(self, db: &Database) -> Visibility {
        self.get(db).visibility
    }

    pub fn set_visibility(self, db: &mut Database, visibility: Visibility) {
        self.get_mut(db).visibility = visibility;
    }

    fn get(self, db: &Database) -> &Field {
        &db.fields[self.0]
    }

    fn get_mut(self, db: &mut Database) -> &mut Field {
        &mut db.fields[self.0]
    }
}

/// A symbolic reference to a method, as used by invoke instructions.
///
/// References are interned: the same class, name and signature always
/// produce the same ID.
pub struct MethodRef {
    class: ClassId,
    name: String,
    signature: Signature,
}

impl MethodRef {
    pub fn intern(
        db: &mut Database,
        class: ClassId,
        name: String,
        signature: Signature,
    ) -> MethodRefId {
        let key = (class, name, signature);

        if let Some(&id) = db.method_ref_mapping.get(&key) {
            return id;
        }

        let id = MethodRefId(db.method_refs.len());
        let (class, name, signature) = key;

        db.method_ref_mapping
            .insert((class, name.clone(), signature.clone()), id);
        db.method_refs.push(MethodRef { class, name, signature });
        id
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub struct MethodRefId(pub usize);

impl MethodRefId {
    pub fn class(self, db: &Database) -> ClassId {
        self.get(db).class
    }

    pub fn name(self, db: &Database) -> &String {
        &self.get(db).name
    }

    pub fn signature(self, db: &Database) -> &Signature {
        &self.get(db).signature
    }

    pub fn qualified_name(self, db: &Database) -> String {
        let reference = self.get(db);

        format!(
            "{}.{}{}",
            reference.class.name(db),
            reference.name,
            reference.signature
        )
    }

    fn set_signature(self, db: &mut Database, signature: Signature) {
        let reference = &mut db.method_refs[self.0];
        let old =
            std::mem::replace(&mut reference.signature, signature.clone());
        let key = (reference.class, reference.name.clone(), old);

        db.method_ref_mapping.remove(&key);
        db.method_ref_mapping.insert((key.0, key.1, signature), self);
    }

    fn get(self, db: &Database) -> &MethodRef {
        &db.method_refs[self.0]
    }
}

/// A database of all stores, classes, methods and fields of a program.
pub struct Database {
    stores: Vec<Store>,
    classes: Vec<Class>,
    class_mapping: HashMap<String, ClassId>,
    methods: Vec<Method>,
    fields: Vec<Field>,
    method_refs: Vec<MethodRef>,
    method_ref_mapping: HashMap<(ClassId, String, Signature), MethodRefId>,
}

impl Database {
    pub fn new() -> Self {
        Self {
            stores: Vec::new(),
            classes: Vec::new(),
            class_mapping: HashMap::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            method_refs: Vec::new(),
            method_ref_mapping: HashMap::new(),
        }
    }

    pub fn class(&self, name: &str) -> Option<ClassId> {
        self.class_mapping.get(name).cloned()
    }

    pub fn number_of_stores(&self) -> usize {
        self.stores.len()
    }

    /// Returns the store a class is defined in, or `None` for external
    /// classes.
    pub fn store_of(&self, class: ClassId) -> Option<StoreId> {
        class.store(self)
    }

    /// Returns `true` if code in the store `from` may refer to classes defined
    /// in the store `to`.
    ///
    /// Root stores are ordered: a root store may only refer to itself and root
    /// stores defined before it. Non-root stores may refer to root stores and
    /// to the stores they explicitly list as a dependency.
    pub fn is_dependency_allowed(&self, from: StoreId, to: StoreId) -> bool {
        if from == to {
            return true;
        }

        if to.is_root(self) {
            return to <= from || !from.is_root(self);
        }

        !from.is_root(self) && from.dependencies(self).contains(to.name(self))
    }

    /// Returns `true` if code in class `from` can access a member of `owner`
    /// that has the given access level.
    pub fn is_accessible(
        &self,
        from: ClassId,
        owner: ClassId,
        visibility: Visibility,
    ) -> bool {
        if from == owner {
            return true;
        }

        let same_package = from.package(self) == owner.package(self);

        if !owner.visibility(self).is_public() && !same_package {
            return false;
        }

        match visibility {
            Visibility::Public => true,
            Visibility::Package => same_package,
            Visibility::Private => false,
        }
    }

    /// Returns the narrowest access level at which a member of `owner` is
    /// accessible from `from`.
    pub fn required_visibility(
        &self,
        from: ClassId,
        owner: ClassId,
    ) -> Visibility {
        if from == owner {
            Visibility::Private
        } else if from.package(self) == owner.package(self) {
            Visibility::Package
        } else {
            Visibility::Public
        }
    }
}
