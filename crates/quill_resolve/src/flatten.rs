//! Inheritance flattening

use std::collections::HashSet;

use quill_ast::*;
use tracing::debug;

use crate::{ResolveError, ResolveErrorKind, ResolveResult};

/// Build the member tables of `classes` and, first, of every base they use.
///
/// Base references must already be interned. Classes flattened earlier are
/// left untouched, so running this again changes nothing.
pub fn flatten(ast: &mut Ast, classes: impl IntoIterator<Item = ClassId>) -> ResolveResult<()> {
    let mut flattener = Flattener {
        ast,
        in_progress: HashSet::new(),
    };
    for class in classes {
        flattener.flatten(class)?;
    }
    Ok(())
}

struct Flattener<'a> {
    ast: &'a mut Ast,
    /// Classes whose bases are being flattened
    in_progress: HashSet<ClassId>,
}

impl Flattener<'_> {
    fn class_name(&self, class: ClassId) -> String {
        self.ast.names.display(self.ast.class(class).name)
    }

    fn error(&self, class: ClassId, kind: ResolveErrorKind) -> ResolveError {
        ResolveError::new(kind, self.ast.class(class).loc)
    }

    fn flatten(&mut self, class: ClassId) -> ResolveResult<()> {
        if self.ast.class(class).flattened {
            return Ok(());
        }
        if !self.in_progress.insert(class) {
            let name = self.class_name(class);
            return Err(self.error(class, ResolveErrorKind::SelfInheritance { class: name }));
        }

        let is_interface = self.ast.class(class).is_interface;
        let mut bases = Vec::new();
        let mut concrete = 0;
        for decl in self.ast.class(class).bases.clone() {
            let loc = self.ast.action(decl.reference).loc;
            let inst = decl
                .instance
                .ok_or_else(|| ResolveError::new(ResolveErrorKind::ExpectedTypeName, loc))?;
            let base = match self.ast.instances.get(inst).target {
                InstanceTarget::Class(c) => c,
                InstanceTarget::Param(_) => {
                    let name = self.class_name(class);
                    return Err(ResolveError::new(ResolveErrorKind::ParamAsBase { class: name }, loc));
                }
            };
            if bases.iter().any(|(_, b)| *b == base) {
                let kind = ResolveErrorKind::AmbiguousInheritance {
                    class: self.class_name(class),
                    base: self.class_name(base),
                };
                return Err(ResolveError::new(kind, loc));
            }
            self.flatten(base)?;
            if !self.ast.class(base).is_interface {
                if is_interface {
                    let kind = ResolveErrorKind::InterfaceExtendsClass {
                        class: self.class_name(class),
                        base: self.class_name(base),
                    };
                    return Err(ResolveError::new(kind, loc));
                }
                concrete += 1;
                if concrete > 1 {
                    let name = self.class_name(class);
                    return Err(ResolveError::new(
                        ResolveErrorKind::MultipleConcreteBases { class: name },
                        loc,
                    ));
                }
            }
            bases.push((inst, base));
        }

        let mut table = MemberTable::default();
        let def = self.ast.class(class);
        let own = def
            .fields
            .iter()
            .map(|f| (self.ast.var(*f).name, Member::Field(*f), self.ast.var(*f).loc))
            .chain(
                def.methods
                    .iter()
                    .map(|m| (self.ast.method(*m).name, Member::Method(*m), self.ast.method(*m).loc)),
            )
            .collect::<Vec<_>>();
        let mut own_names = HashSet::new();
        for (name, member, loc) in own {
            if !table.insert_own(name, member) {
                let name = self.ast.names.display(name);
                return Err(ResolveError::new(ResolveErrorKind::DuplicateMember { name }, loc));
            }
            own_names.insert(name);
        }

        let mut ancestors = Vec::new();
        for (inst, base) in &bases {
            let base_def = self.ast.class(*base);
            for (name, entries) in base_def.members.iter() {
                // own members shadow inherited ones
                if own_names.contains(&name) {
                    continue;
                }
                for entry in entries {
                    let mut path = Vec::with_capacity(entry.path.len() + 1);
                    path.push(*inst);
                    path.extend(entry.path.iter().copied());
                    table.inherit(name, MemberEntry { member: entry.member, path });
                }
            }
            for ancestor in std::iter::once(*base).chain(base_def.ancestors.iter().copied()) {
                if !ancestors.contains(&ancestor) {
                    ancestors.push(ancestor);
                }
            }
        }

        debug!(
            class = %self.class_name(class),
            members = table.len(),
            bases = bases.len(),
            "class flattened"
        );
        let def = self.ast.class_mut(class);
        def.members = table;
        def.ancestors = ancestors;
        def.flattened = true;
        self.in_progress.remove(&class);
        Ok(())
    }
}
