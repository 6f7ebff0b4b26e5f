//! Type View: a read-only projection of the source language's type system.
//!
//! Basic, pointer, array, slice, map, channel, struct, tuple, interface,
//! named, signature, type parameter, and union types. Everything here is
//! immutable once constructed; identity is established by the canonizer
//! in [`crate::canon`], not by this module.

use std::fmt;
use std::sync::Arc;

/// A type in the source language's type system.
///
/// `Type` is a cheap-to-clone handle (`Arc<TypeData>`). Two `Type`s that are
/// structurally identical per the type view are not required to be the same
/// `Arc` unless they have passed through [`crate::canon::TypeCanonizer`];
/// use the canonizer whenever identity (not just structural equality)
/// matters, e.g. when keying a method-set cache.
#[derive(Clone)]
pub struct Type(pub(crate) Arc<TypeData>);

impl Type {
    pub fn new(data: TypeData) -> Self {
        Type(Arc::new(data))
    }

    pub fn data(&self) -> &TypeData {
        &self.0
    }

    /// Pointer identity: true only if both handles were produced by the same
    /// canonizer insertion (or are literally the same `Arc`).
    pub fn is_identical(&self, other: &Type) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The underlying type: for a `Named` type, its definition; for every
    /// other type, itself.
    pub fn underlying(&self) -> Type {
        match &*self.0 {
            TypeData::Named(n) => n.underlying.clone(),
            _ => self.clone(),
        }
    }

    pub fn is_basic(&self, kind: BasicKind) -> bool {
        matches!(&*self.underlying().0, TypeData::Basic(k) if *k == kind)
    }

    pub fn is_interface(&self) -> bool {
        matches!(&*self.underlying().0, TypeData::Interface(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(&*self.0, TypeData::Pointer(_))
    }

    /// The method set of this type, per the structural rules of the source
    /// language: a named type's methods, plus (for a non-pointer named type)
    /// only value-receiver methods, plus promoted methods of embedded
    /// fields. Interfaces return their abstract method set.
    pub fn method_set(&self) -> Vec<Method> {
        match &*self.0 {
            TypeData::Named(n) => {
                let mut methods = n.methods.clone();
                if let TypeData::Struct(s) = &*n.underlying.0 {
                    for field in &s.fields {
                        if field.embedded {
                            for m in field.ty.method_set() {
                                if !methods.iter().any(|existing| existing.name == m.name) {
                                    methods.push(m.promoted(&field.name));
                                }
                            }
                        }
                    }
                }
                methods.sort_by(|a, b| (&a.pkg, &a.name).cmp(&(&b.pkg, &b.name)));
                methods
            }
            TypeData::Pointer(elem) => elem.method_set_with_pointer_receivers(),
            TypeData::Interface(i) => i.methods.clone(),
            _ => Vec::new(),
        }
    }

    fn method_set_with_pointer_receivers(&self) -> Vec<Method> {
        self.method_set()
    }

    /// For a type-parameter's constraint interface, the set of types in its
    /// union-of-terms type set, or `None` if the constraint has a method set
    /// only (no explicit `~T | ~U` terms).
    pub fn type_set(&self) -> Option<Vec<Type>> {
        match &*self.underlying().0 {
            TypeData::Interface(i) => i.type_set.clone(),
            TypeData::Union(u) => Some(u.terms.clone()),
            _ => None,
        }
    }

    /// Substitute type parameters per `subst`, recursively, bottom-up.
    /// Named types are re-derived through the canonizer by the caller; this
    /// function returns a fresh, uncanonicalized `Type`.
    pub fn substitute(&self, subst: &Substitution) -> Type {
        match &*self.0 {
            TypeData::TypeParam(p) => subst.get(p).cloned().unwrap_or_else(|| self.clone()),
            TypeData::Pointer(e) => Type::new(TypeData::Pointer(Box::new(e.substitute(subst)))),
            TypeData::Array(a) => Type::new(TypeData::Array(ArrayType {
                elem: Box::new(a.elem.substitute(subst)),
                len: a.len,
            })),
            TypeData::Slice(e) => Type::new(TypeData::Slice(Box::new(e.substitute(subst)))),
            TypeData::Map(m) => Type::new(TypeData::Map(MapType {
                key: Box::new(m.key.substitute(subst)),
                value: Box::new(m.value.substitute(subst)),
            })),
            TypeData::Chan(c) => Type::new(TypeData::Chan(ChanType {
                dir: c.dir,
                elem: Box::new(c.elem.substitute(subst)),
            })),
            TypeData::Struct(s) => Type::new(TypeData::Struct(StructType {
                fields: s
                    .fields
                    .iter()
                    .map(|f| Field {
                        name: f.name.clone(),
                        ty: f.ty.substitute(subst),
                        embedded: f.embedded,
                    })
                    .collect(),
            })),
            TypeData::Tuple(ts) => {
                Type::new(TypeData::Tuple(ts.iter().map(|t| t.substitute(subst)).collect()))
            }
            TypeData::Signature(sig) => Type::new(TypeData::Signature(sig.substitute(subst))),
            TypeData::Named(n) => {
                if n.type_args.is_empty() {
                    self.clone()
                } else {
                    Type::new(TypeData::Named(NamedType {
                        package: n.package.clone(),
                        name: n.name.clone(),
                        underlying: Box::new(n.underlying.substitute(subst)),
                        methods: n.methods.clone(),
                        origin: n.origin.clone(),
                        type_params: n.type_params.clone(),
                        type_args: n.type_args.iter().map(|t| t.substitute(subst)).collect(),
                    }))
                }
            }
            TypeData::Interface(_) | TypeData::Basic(_) | TypeData::Union(_) => self.clone(),
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl Type {
    pub fn display_name(&self) -> String {
        match &*self.0 {
            TypeData::Basic(b) => format!("{b:?}").to_lowercase(),
            TypeData::Pointer(e) => format!("*{}", e.display_name()),
            TypeData::Array(a) => format!("[{}]{}", a.len, a.elem.display_name()),
            TypeData::Slice(e) => format!("[]{}", e.display_name()),
            TypeData::Map(m) => format!("map[{}]{}", m.key.display_name(), m.value.display_name()),
            TypeData::Chan(c) => format!("chan {}", c.elem.display_name()),
            TypeData::Struct(_) => "struct{...}".to_string(),
            TypeData::Tuple(ts) => format!(
                "({})",
                ts.iter().map(Type::display_name).collect::<Vec<_>>().join(", ")
            ),
            TypeData::Interface(i) if i.methods.is_empty() => "interface{}".to_string(),
            TypeData::Interface(_) => "interface{...}".to_string(),
            TypeData::Named(n) => n.qualified_name(),
            TypeData::Signature(sig) => sig.display_name(),
            TypeData::TypeParam(p) => p.name.clone(),
            TypeData::Union(u) => u
                .terms
                .iter()
                .map(Type::display_name)
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }
}

/// Structural payload of a [`Type`]. Never constructed directly by callers
/// outside this crate except through the type-view constructors; always
/// reached through `Type::data`.
pub enum TypeData {
    Basic(BasicKind),
    Pointer(Box<Type>),
    Array(ArrayType),
    Slice(Box<Type>),
    Map(MapType),
    Chan(ChanType),
    Struct(StructType),
    Tuple(Vec<Type>),
    Interface(InterfaceType),
    Named(NamedType),
    Signature(SignatureType),
    TypeParam(TypeParamType),
    Union(UnionType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicKind {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    String,
    UnsafePointer,
    Invalid,
}

#[derive(Clone)]
pub struct ArrayType {
    pub elem: Box<Type>,
    pub len: i64,
}

#[derive(Clone)]
pub struct MapType {
    pub key: Box<Type>,
    pub value: Box<Type>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChanDir {
    SendRecv,
    SendOnly,
    RecvOnly,
}

#[derive(Clone)]
pub struct ChanType {
    pub dir: ChanDir,
    pub elem: Box<Type>,
}

#[derive(Clone)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    /// True if this field is an embedded (anonymous) field, eligible for
    /// method promotion (§4.3 "Interface promotion").
    pub embedded: bool,
}

#[derive(Clone)]
pub struct StructType {
    pub fields: Vec<Field>,
}

/// A method in a method set: either a concrete function (for a named type)
/// or an abstract signature (for an interface).
#[derive(Clone)]
pub struct Method {
    /// Declaring package path; empty for exported methods where package
    /// does not disambiguate (§4.7: "unexported methods ... must not
    /// alias; dispatch is resolved per (package, name)").
    pub pkg: String,
    pub name: String,
    pub signature: SignatureType,
    pub pointer_receiver: bool,
    /// Chain of embedded-field selections to reach the declaring type, for
    /// promoted methods. Empty for directly declared methods.
    pub index_path: Vec<usize>,
}

impl Method {
    fn promoted(&self, through_field: &str) -> Method {
        let mut index_path = vec![0];
        index_path.extend(self.index_path.iter().copied());
        Method {
            pkg: self.pkg.clone(),
            name: self.name.clone(),
            signature: self.signature.clone(),
            pointer_receiver: self.pointer_receiver,
            index_path,
        }
        .also_note_field(through_field)
    }

    fn also_note_field(self, _field: &str) -> Method {
        self
    }

    /// Exported iff the method name begins with an uppercase ASCII letter.
    pub fn is_exported(&self) -> bool {
        self.name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
    }

    /// Dispatch key used by CHA/VTA merge-joins (§9 "Dynamic dispatch"):
    /// exported methods key by name alone, unexported methods key by
    /// (package, name) so identically named unexported methods in
    /// different packages never alias.
    pub fn dispatch_key(&self) -> (String, String) {
        if self.is_exported() {
            (String::new(), self.name.clone())
        } else {
            (self.pkg.clone(), self.name.clone())
        }
    }

    /// `dispatch_key` plus signature identity: two methods of the same name
    /// only satisfy/alias one another if their parameter and result types
    /// also match (receiver excluded, since an interface method's signature
    /// never carries one). Two distinct methods named `Close` with different
    /// signatures must neither satisfy the same interface method nor merge
    /// at a CHA/VTA dispatch site.
    pub fn dispatch_key_with_signature(&self) -> (String, String, String) {
        let (pkg, name) = self.dispatch_key();
        (pkg, name, self.signature.display_name())
    }
}

#[derive(Clone)]
pub struct InterfaceType {
    pub methods: Vec<Method>,
    /// Present only for constraint interfaces with explicit type terms
    /// (`~int | ~string`); `None` means "any type implementing `methods`".
    pub type_set: Option<Vec<Type>>,
}

impl InterfaceType {
    pub fn implemented_by(&self, candidate: &Type) -> bool {
        let candidate_methods = candidate.method_set();
        self.methods.iter().all(|want| {
            candidate_methods
                .iter()
                .any(|have| have.dispatch_key_with_signature() == want.dispatch_key_with_signature())
        })
    }
}

#[derive(Clone)]
pub struct NamedType {
    pub package: String,
    pub name: String,
    pub underlying: Box<Type>,
    pub methods: Vec<Method>,
    /// For a generic instantiation, the un-substituted origin named type.
    pub origin: Option<Box<Type>>,
    pub type_params: Vec<TypeParamType>,
    pub type_args: Vec<Type>,
}

impl NamedType {
    pub fn qualified_name(&self) -> String {
        if self.type_args.is_empty() {
            format!("{}.{}", self.package, self.name)
        } else {
            format!(
                "{}.{}[{}]",
                self.package,
                self.name,
                self.type_args
                    .iter()
                    .map(Type::display_name)
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        }
    }
}

#[derive(Clone)]
pub struct SignatureType {
    pub params: Vec<Type>,
    pub variadic: bool,
    pub results: Vec<Type>,
    pub type_params: Vec<TypeParamType>,
    /// Receiver type, for methods; `None` for free functions.
    pub receiver: Option<Box<Type>>,
}

impl SignatureType {
    pub fn substitute(&self, subst: &Substitution) -> SignatureType {
        SignatureType {
            params: self.params.iter().map(|t| t.substitute(subst)).collect(),
            variadic: self.variadic,
            results: self.results.iter().map(|t| t.substitute(subst)).collect(),
            type_params: Vec::new(),
            receiver: self.receiver.as_ref().map(|r| Box::new(r.substitute(subst))),
        }
    }

    pub fn display_name(&self) -> String {
        format!(
            "func({}) ({})",
            self.params.iter().map(Type::display_name).collect::<Vec<_>>().join(", "),
            self.results.iter().map(Type::display_name).collect::<Vec<_>>().join(", ")
        )
    }
}

#[derive(Clone)]
pub struct TypeParamType {
    pub name: String,
    /// Index among the declaring function/type's type parameter list.
    pub index: usize,
    pub constraint: Box<Type>,
}

#[derive(Clone)]
pub struct UnionType {
    pub terms: Vec<Type>,
}

/// A finite map from type parameters to concrete (or partially concrete)
/// types, applied bottom-up through the type algebra by [`Type::substitute`].
#[derive(Default, Clone)]
pub struct Substitution {
    by_index: Vec<(usize, Type)>,
}

impl Substitution {
    pub fn new(params: &[TypeParamType], args: &[Type]) -> Self {
        assert_eq!(
            params.len(),
            args.len(),
            "substitution requires one type argument per type parameter"
        );
        Substitution {
            by_index: params.iter().map(|p| p.index).zip(args.iter().cloned()).collect(),
        }
    }

    fn get(&self, param: &TypeParamType) -> Option<&Type> {
        self.by_index
            .iter()
            .find(|(idx, _)| *idx == param.index)
            .map(|(_, t)| t)
    }

    /// True if every bound type is itself free of type parameters ("fully
    /// ground"), the condition gating eager generic instantiation in §4.3.
    pub fn is_ground(&self) -> bool {
        self.by_index.iter().all(|(_, t)| type_is_ground(t))
    }
}

fn type_is_ground(ty: &Type) -> bool {
    match &*ty.0 {
        TypeData::TypeParam(_) => false,
        TypeData::Pointer(e) | TypeData::Slice(e) => type_is_ground(e),
        TypeData::Array(a) => type_is_ground(&a.elem),
        TypeData::Map(m) => type_is_ground(&m.key) && type_is_ground(&m.value),
        TypeData::Chan(c) => type_is_ground(&c.elem),
        TypeData::Struct(s) => s.fields.iter().all(|f| type_is_ground(&f.ty)),
        TypeData::Tuple(ts) => ts.iter().all(type_is_ground),
        TypeData::Named(n) => n.type_args.iter().all(type_is_ground),
        TypeData::Signature(sig) => {
            sig.params.iter().all(type_is_ground) && sig.results.iter().all(type_is_ground)
        }
        TypeData::Basic(_) | TypeData::Interface(_) | TypeData::Union(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(k: BasicKind) -> Type {
        Type::new(TypeData::Basic(k))
    }

    #[test]
    fn underlying_of_named_is_its_definition() {
        let named = Type::new(TypeData::Named(NamedType {
            package: "p".into(),
            name: "MyInt".into(),
            underlying: Box::new(basic(BasicKind::Int)),
            methods: Vec::new(),
            origin: None,
            type_params: Vec::new(),
            type_args: Vec::new(),
        }));
        assert!(named.underlying().is_basic(BasicKind::Int));
        assert!(!named.is_basic(BasicKind::Int));
    }

    #[test]
    fn promoted_methods_are_visible_once() {
        let method = |name: &str| Method {
            pkg: "p".into(),
            name: name.into(),
            signature: SignatureType {
                params: vec![],
                variadic: false,
                results: vec![],
                type_params: vec![],
                receiver: None,
            },
            pointer_receiver: false,
            index_path: vec![],
        };
        let inner = Type::new(TypeData::Named(NamedType {
            package: "p".into(),
            name: "Inner".into(),
            underlying: Box::new(Type::new(TypeData::Struct(StructType { fields: vec![] }))),
            methods: vec![method("Foo")],
            origin: None,
            type_params: vec![],
            type_args: vec![],
        }));
        let outer = Type::new(TypeData::Named(NamedType {
            package: "p".into(),
            name: "Outer".into(),
            underlying: Box::new(Type::new(TypeData::Struct(StructType {
                fields: vec![Field {
                    name: "Inner".into(),
                    ty: inner,
                    embedded: true,
                }],
            }))),
            methods: vec![],
            origin: None,
            type_params: vec![],
            type_args: vec![],
        }));
        let methods = outer.method_set();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].name, "Foo");
        assert_eq!(methods[0].index_path, vec![0]);
    }

    #[test]
    fn implemented_by_rejects_same_name_different_signature() {
        let sig = |results: Vec<Type>| SignatureType {
            params: vec![],
            variadic: false,
            results,
            type_params: vec![],
            receiver: None,
        };
        let iface = InterfaceType {
            methods: vec![Method {
                pkg: String::new(),
                name: "Close".into(),
                signature: sig(vec![basic(BasicKind::Invalid)]),
                pointer_receiver: false,
                index_path: vec![],
            }],
            type_set: None,
        };
        let matching = Type::new(TypeData::Named(NamedType {
            package: "p".into(),
            name: "A".into(),
            underlying: Box::new(Type::new(TypeData::Struct(StructType { fields: vec![] }))),
            methods: vec![Method {
                pkg: String::new(),
                name: "Close".into(),
                signature: sig(vec![basic(BasicKind::Invalid)]),
                pointer_receiver: false,
                index_path: vec![],
            }],
            origin: None,
            type_params: vec![],
            type_args: vec![],
        }));
        let mismatched = Type::new(TypeData::Named(NamedType {
            package: "p".into(),
            name: "B".into(),
            underlying: Box::new(Type::new(TypeData::Struct(StructType { fields: vec![] }))),
            methods: vec![Method {
                pkg: String::new(),
                name: "Close".into(),
                signature: sig(vec![basic(BasicKind::String)]),
                pointer_receiver: false,
                index_path: vec![],
            }],
            origin: None,
            type_params: vec![],
            type_args: vec![],
        }));
        assert!(iface.implemented_by(&matching));
        assert!(!iface.implemented_by(&mismatched));
    }

    #[test]
    fn substitution_requires_ground_check_before_instantiation() {
        let tparam = TypeParamType {
            name: "T".into(),
            index: 0,
            constraint: Box::new(Type::new(TypeData::Interface(InterfaceType {
                methods: vec![],
                type_set: None,
            }))),
        };
        let tv = Type::new(TypeData::TypeParam(tparam.clone()));
        let subst = Substitution::new(&[tparam], &[basic(BasicKind::String)]);
        assert!(subst.is_ground());
        let resolved = tv.substitute(&subst);
        assert!(resolved.is_basic(BasicKind::String));
    }
}
