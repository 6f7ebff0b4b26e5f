//! `Package`: the set of members declared by one source package (§3).

use crate::input::CheckedPackage;
use crate::types::{Method, Type};
use crate::value::{ConstId, FunctionId, GlobalId, PackageId};

#[derive(Debug, Clone)]
pub struct Global {
    pub id: GlobalId,
    pub name: String,
    pub package: PackageId,
    /// Always `pointer to declared type` (§4.2).
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct NamedConst {
    pub id: ConstId,
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub enum Member {
    Function(FunctionId),
    Global(GlobalId),
    NamedConst(ConstId),
    /// A type carrier: no body, but may own methods looked up through
    /// `Type::method_set` (§4.2).
    Type { ty: Type, methods: Vec<Method> },
}

#[derive(Debug, Clone)]
pub struct Package {
    pub id: PackageId,
    pub path: String,
    pub importable: bool,
    members: Vec<(String, Member)>,
    pub init: Option<FunctionId>,
    /// Cleared after `Build` completes (§3 "Lifecycle": "transient fields
    /// are cleared and member set is immutable").
    source: Option<CheckedPackage>,
    pub built: bool,
}

impl Package {
    pub fn new(id: PackageId, path: String, importable: bool, source: CheckedPackage) -> Self {
        Package {
            id,
            path,
            importable,
            members: Vec::new(),
            init: None,
            source: Some(source),
            built: false,
        }
    }

    pub fn insert_member(&mut self, name: String, member: Member) {
        debug_assert!(
            !self.members.iter().any(|(n, _)| n == &name),
            "package {} already declares member {name}",
            self.path
        );
        self.members.push((name, member));
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    /// Looks up a method by declaring type name, keyed the way `Create`
    /// registers it (§4.2, §4.7 dispatch resolution).
    pub fn method(&self, type_name: &str, method_name: &str) -> Option<FunctionId> {
        match self.member(&format!("{type_name}.{method_name}")) {
            Some(Member::Function(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn members(&self) -> impl Iterator<Item = (&str, &Member)> {
        self.members.iter().map(|(n, m)| (n.as_str(), m))
    }

    pub fn functions(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.members.iter().filter_map(|(_, m)| match m {
            Member::Function(id) => Some(*id),
            _ => None,
        })
    }

    /// The transient syntax/type-info the `Create` phase consumes; `None`
    /// once `finish_build` has cleared it.
    pub fn source(&self) -> Option<&CheckedPackage> {
        self.source.as_ref()
    }

    pub fn finish_build(&mut self) {
        self.source = None;
        self.built = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_lookup_is_by_declared_name() {
        let src = CheckedPackage { path: "p".into(), files: vec![], decls: vec![], imports: vec![] };
        let mut pkg = Package::new(PackageId(0), "p".into(), true, src);
        pkg.insert_member("F".into(), Member::Function(FunctionId(7)));
        assert!(matches!(pkg.member("F"), Some(Member::Function(FunctionId(7)))));
        assert!(pkg.member("Missing").is_none());
    }

    #[test]
    fn finish_build_clears_transient_source() {
        let src = CheckedPackage { path: "p".into(), files: vec![], decls: vec![], imports: vec![] };
        let mut pkg = Package::new(PackageId(0), "p".into(), true, src);
        assert!(pkg.source().is_some());
        pkg.finish_build();
        assert!(pkg.source().is_none());
        assert!(pkg.built);
    }
}
