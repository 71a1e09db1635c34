//! Classes, interfaces and their flattened member tables

use std::collections::HashMap;

use crate::{ActionId, ClassId, InstanceId, Location, MethodId, ModuleId, NameId, VarId};

#[derive(Debug, Clone)]
pub struct ClassDef {
    /// Module-qualified name
    pub name: NameId,
    pub module: ModuleId,
    pub is_interface: bool,
    pub params: Vec<crate::ParamId>,
    pub bases: Vec<BaseDecl>,
    pub fields: Vec<VarId>,
    pub methods: Vec<MethodId>,
    /// Own and inherited members, built by the resolver
    pub members: MemberTable,
    pub flattened: bool,
    /// Every class reachable through `bases`, transitively
    pub ancestors: Vec<ClassId>,
    /// Overridden method to the method implementing it in this class
    pub dispatch: HashMap<MethodId, MethodId>,
    pub loc: Location,
}

impl ClassDef {
    pub fn new(name: NameId, module: ModuleId, is_interface: bool, loc: Location) -> Self {
        Self {
            name,
            module,
            is_interface,
            params: Vec::new(),
            bases: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            members: MemberTable::default(),
            flattened: false,
            ancestors: Vec::new(),
            dispatch: HashMap::new(),
            loc,
        }
    }
}

/// `+Base(T) { overloads }` inside a class body
#[derive(Debug, Clone)]
pub struct BaseDecl {
    /// `MakeInstance` type reference
    pub reference: ActionId,
    pub instance: Option<InstanceId>,
    pub overloads: Vec<MethodId>,
}

#[derive(Debug, Clone)]
pub struct ClassParamDef {
    pub name: NameId,
    pub class: ClassId,
    pub index: usize,
    /// Type reference written after `:`
    pub bound_ref: Option<ActionId>,
    pub bound: Option<ClassId>,
    pub loc: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Member {
    Field(VarId),
    Method(MethodId),
}

/// A member as seen from one class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEntry {
    pub member: Member,
    /// Base instances from the viewing class down to the declaring class,
    /// each expressed in the parameters of the class before it
    pub path: Vec<InstanceId>,
}

#[derive(Debug)]
pub enum MemberLookup<'a> {
    None,
    One(&'a MemberEntry),
    Many(Vec<&'a MemberEntry>),
}

/// Member name to every distinct member reachable under that name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberTable {
    order: Vec<NameId>,
    entries: HashMap<NameId, Vec<MemberEntry>>,
}

impl MemberTable {
    pub fn lookup(&self, name: NameId) -> MemberLookup<'_> {
        match self.entries.get(&name).map(Vec::as_slice) {
            None | Some([]) => MemberLookup::None,
            Some([one]) => MemberLookup::One(one),
            Some(many) => MemberLookup::Many(many.iter().collect()),
        }
    }

    pub fn contains(&self, name: NameId) -> bool {
        self.entries.contains_key(&name)
    }

    /// Add a member declared by the class itself; `false` on a duplicate name
    pub fn insert_own(&mut self, name: NameId, member: Member) -> bool {
        if self.entries.contains_key(&name) {
            return false;
        }
        self.order.push(name);
        self.entries.insert(name, vec![MemberEntry { member, path: Vec::new() }]);
        true
    }

    /// Add an inherited entry; the first path reaching a member wins
    pub fn inherit(&mut self, name: NameId, entry: MemberEntry) {
        let slot = self.entries.entry(name).or_insert_with(|| {
            self.order.push(name);
            Vec::new()
        });
        if !slot.iter().any(|e| e.member == entry.member) {
            slot.push(entry);
        }
    }

    /// Entries in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (NameId, &[MemberEntry])> + '_ {
        self.order
            .iter()
            .map(|name| (*name, self.entries[name].as_slice()))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_lookup_outcomes() {
        let mut table = MemberTable::default();
        let x = NameId(0);
        let m = NameId(1);
        assert!(table.insert_own(x, Member::Field(VarId(0))));
        assert!(!table.insert_own(x, Member::Field(VarId(1))));
        table.inherit(m, MemberEntry { member: Member::Method(MethodId(0)), path: vec![InstanceId(0)] });
        table.inherit(m, MemberEntry { member: Member::Method(MethodId(0)), path: vec![InstanceId(1)] });
        assert!(matches!(table.lookup(m), MemberLookup::One(e) if e.path == vec![InstanceId(0)]));
        table.inherit(m, MemberEntry { member: Member::Method(MethodId(1)), path: vec![InstanceId(1)] });
        assert!(matches!(table.lookup(m), MemberLookup::Many(v) if v.len() == 2));
        assert!(matches!(table.lookup(NameId(7)), MemberLookup::None));
        let names: Vec<_> = table.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec![x, m]);
    }
}
