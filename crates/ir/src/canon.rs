//! Type canonizer: a thread-safe mapping from a type (by structural identity
//! per the type view) to a canonical representative, and from a list of
//! types to a canonical immutable list representative (§3, §4.1).
//!
//! Backed by [`dashmap::DashMap`] rather than a single `Mutex<HashMap<_>>`:
//! the sharded locking matches §5's requirement that "per-origin mutexes
//! avoid false sharing" more closely than one coarse lock would, and this
//! crate already leans on `dashmap` the way `vex-lang` does for its own
//! type interner.

use std::sync::Arc;

use dashmap::DashMap;

use crate::types::{
    ArrayType, BasicKind, ChanDir, ChanType, Field, InterfaceType, MapType, NamedType,
    SignatureType, StructType, Type, TypeData, TypeParamType, UnionType,
};

/// A structural, hashable key for a [`Type`], built bottom-up so that child
/// positions reference already-canonical `Type`s by `Arc` pointer address
/// rather than by recursively re-hashing their contents.
#[derive(Clone, PartialEq, Eq, Hash)]
enum TypeKey {
    Basic(BasicKind),
    Pointer(usize),
    Array(usize, i64),
    Slice(usize),
    Map(usize, usize),
    Chan(ChanDir, usize),
    Struct(Vec<(String, usize, bool)>),
    Tuple(Vec<usize>),
    Interface(Vec<(String, String, String)>),
    Named(String, String, Vec<usize>),
    Signature(Vec<usize>, bool, Vec<usize>, Option<usize>),
    TypeParam(usize),
    Union(Vec<usize>),
}

fn addr(t: &Type) -> usize {
    Arc::as_ptr(&t.0) as usize
}

/// Canonicalizes [`Type`]s and type-argument lists so that two types
/// considered identical by the type view share a single representative
/// (§3 invariant).
#[derive(Default)]
pub struct TypeCanonizer {
    types: DashMap<TypeKey, Type>,
    type_lists: DashMap<Vec<usize>, Arc<Vec<Type>>>,
}

impl TypeCanonizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonicalize `ty`, recursively canonicalizing its children first so
    /// the key computed for `ty` is built from already-canonical pointers.
    pub fn canon(&self, ty: Type) -> Type {
        match ty.data() {
            TypeData::Basic(k) => return self.intern(TypeKey::Basic(*k), || ty.clone()),
            TypeData::Pointer(e) => {
                let e = self.canon(e.as_ref().clone());
                let key = TypeKey::Pointer(addr(&e));
                return self.intern(key, || Type::new(TypeData::Pointer(Box::new(e))));
            }
            TypeData::Array(a) => {
                let elem = self.canon(a.elem.as_ref().clone());
                let key = TypeKey::Array(addr(&elem), a.len);
                return self.intern(key, || {
                    Type::new(TypeData::Array(ArrayType {
                        elem: Box::new(elem.clone()),
                        len: a.len,
                    }))
                });
            }
            TypeData::Slice(e) => {
                let e = self.canon(e.as_ref().clone());
                let key = TypeKey::Slice(addr(&e));
                return self.intern(key, || Type::new(TypeData::Slice(Box::new(e))));
            }
            TypeData::Map(m) => {
                let key_ty = self.canon(m.key.as_ref().clone());
                let val_ty = self.canon(m.value.as_ref().clone());
                let key = TypeKey::Map(addr(&key_ty), addr(&val_ty));
                return self.intern(key, || {
                    Type::new(TypeData::Map(MapType {
                        key: Box::new(key_ty.clone()),
                        value: Box::new(val_ty.clone()),
                    }))
                });
            }
            TypeData::Chan(c) => {
                let elem = self.canon(c.elem.as_ref().clone());
                let key = TypeKey::Chan(c.dir, addr(&elem));
                return self.intern(key, || {
                    Type::new(TypeData::Chan(ChanType {
                        dir: c.dir,
                        elem: Box::new(elem.clone()),
                    }))
                });
            }
            TypeData::Struct(s) => {
                let fields: Vec<Field> = s
                    .fields
                    .iter()
                    .map(|f| Field {
                        name: f.name.clone(),
                        ty: self.canon(f.ty.clone()),
                        embedded: f.embedded,
                    })
                    .collect();
                let key = TypeKey::Struct(
                    fields.iter().map(|f| (f.name.clone(), addr(&f.ty), f.embedded)).collect(),
                );
                return self.intern(key, || Type::new(TypeData::Struct(StructType { fields: fields.clone() })));
            }
            TypeData::Tuple(ts) => {
                let ts: Vec<Type> = ts.iter().map(|t| self.canon(t.clone())).collect();
                let key = TypeKey::Tuple(ts.iter().map(addr).collect());
                return self.intern(key, || Type::new(TypeData::Tuple(ts.clone())));
            }
            TypeData::Interface(i) => {
                let key = TypeKey::Interface(
                    i.methods.iter().map(|m| m.dispatch_key_with_signature()).collect(),
                );
                return self.intern(key, || Type::new(TypeData::Interface(i.clone())));
            }
            TypeData::Named(n) => {
                let args: Vec<Type> = n.type_args.iter().map(|t| self.canon(t.clone())).collect();
                let key = TypeKey::Named(n.package.clone(), n.name.clone(), args.iter().map(addr).collect());
                return self.intern(key, || {
                    Type::new(TypeData::Named(NamedType {
                        package: n.package.clone(),
                        name: n.name.clone(),
                        underlying: n.underlying.clone(),
                        methods: n.methods.clone(),
                        origin: n.origin.clone(),
                        type_params: n.type_params.clone(),
                        type_args: args.clone(),
                    }))
                });
            }
            TypeData::Signature(sig) => {
                let params: Vec<Type> = sig.params.iter().map(|t| self.canon(t.clone())).collect();
                let results: Vec<Type> = sig.results.iter().map(|t| self.canon(t.clone())).collect();
                let recv = sig.receiver.as_ref().map(|r| self.canon(r.as_ref().clone()));
                let key = TypeKey::Signature(
                    params.iter().map(addr).collect(),
                    sig.variadic,
                    results.iter().map(addr).collect(),
                    recv.as_ref().map(addr),
                );
                return self.intern(key, || {
                    Type::new(TypeData::Signature(SignatureType {
                        params: params.clone(),
                        variadic: sig.variadic,
                        results: results.clone(),
                        type_params: sig.type_params.clone(),
                        receiver: recv.clone().map(Box::new),
                    }))
                });
            }
            TypeData::TypeParam(p) => {
                return self.intern(TypeKey::TypeParam(p.index), || ty.clone());
            }
            TypeData::Union(u) => {
                let terms: Vec<Type> = u.terms.iter().map(|t| self.canon(t.clone())).collect();
                let key = TypeKey::Union(terms.iter().map(addr).collect());
                return self.intern(key, || Type::new(TypeData::Union(UnionType { terms: terms.clone() })));
            }
        }
    }

    fn intern(&self, key: TypeKey, make: impl FnOnce() -> Type) -> Type {
        if let Some(existing) = self.types.get(&key) {
            return existing.clone();
        }
        self.types.entry(key).or_insert_with(make).clone()
    }

    /// Canonicalize a type-argument list, returning a shared, immutable
    /// representative: two observationally identical instantiations must
    /// share exactly one representative (§3, §4.3 invariant 6).
    pub fn canon_list(&self, types: Vec<Type>) -> Arc<Vec<Type>> {
        let canon: Vec<Type> = types.into_iter().map(|t| self.canon(t)).collect();
        let key: Vec<usize> = canon.iter().map(addr).collect();
        if let Some(existing) = self.type_lists.get(&key) {
            return existing.clone();
        }
        self.type_lists.entry(key).or_insert_with(|| Arc::new(canon)).clone()
    }
}

/// A `Type` keyed by `Arc` pointer identity, for use as a `HashSet`/
/// `HashMap` key once the type has passed through [`TypeCanonizer::canon`]
/// (e.g. `Program::runtime_types`, §4.1).
#[derive(Clone)]
pub struct TypeHandle(pub Type);

impl PartialEq for TypeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.is_identical(&other.0)
    }
}

impl Eq for TypeHandle {}

impl std::hash::Hash for TypeHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        addr(&self.0).hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(k: BasicKind) -> Type {
        Type::new(TypeData::Basic(k))
    }

    #[test]
    fn structurally_equal_types_canonicalize_to_one_representative() {
        let canon = TypeCanonizer::new();
        let a = Type::new(TypeData::Pointer(Box::new(basic(BasicKind::Int))));
        let b = Type::new(TypeData::Pointer(Box::new(basic(BasicKind::Int))));
        let ca = canon.canon(a);
        let cb = canon.canon(b);
        assert!(ca.is_identical(&cb));
    }

    #[test]
    fn distinct_types_stay_distinct() {
        let canon = TypeCanonizer::new();
        let a = canon.canon(basic(BasicKind::Int));
        let b = canon.canon(basic(BasicKind::String));
        assert!(!a.is_identical(&b));
    }

    #[test]
    fn interfaces_with_same_method_name_but_different_signature_stay_distinct() {
        let sig = |results: Vec<Type>| SignatureType {
            params: vec![],
            variadic: false,
            results,
            type_params: vec![],
            receiver: None,
        };
        let method = |results: Vec<Type>| crate::types::Method {
            pkg: String::new(),
            name: "Close".into(),
            signature: sig(results),
            pointer_receiver: false,
            index_path: vec![],
        };
        let canon = TypeCanonizer::new();
        let a = Type::new(TypeData::Interface(InterfaceType {
            methods: vec![method(vec![basic(BasicKind::Invalid)])],
            type_set: None,
        }));
        let b = Type::new(TypeData::Interface(InterfaceType {
            methods: vec![method(vec![basic(BasicKind::String)])],
            type_set: None,
        }));
        let ca = canon.canon(a);
        let cb = canon.canon(b);
        assert!(!ca.is_identical(&cb));
    }

    #[test]
    fn type_arg_lists_with_equal_canonical_members_share_a_representative() {
        let canon = TypeCanonizer::new();
        let list_a = canon.canon_list(vec![basic(BasicKind::Int), basic(BasicKind::String)]);
        let list_b = canon.canon_list(vec![basic(BasicKind::Int), basic(BasicKind::String)]);
        assert!(Arc::ptr_eq(&list_a, &list_b));
    }
}
