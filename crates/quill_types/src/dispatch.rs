use std::collections::{HashMap, HashSet};

use quill_ast::*;
use tracing::debug;

use crate::check::Typer;
use crate::error::{Locate, TypeErrorKind, TypeResult, internal};
use crate::generic;

impl Typer<'_> {
    /// Fill `class.dispatch`: every overridden method maps to the method that
    /// runs for instances of `class`. Bases are built first.
    pub(crate) fn build_dispatch(&mut self, class: ClassId, built: &mut HashSet<ClassId>) -> TypeResult<()> {
        if !built.insert(class) {
            return Ok(());
        }
        let bases = self.ast.class(class).bases.clone();
        let mut table: HashMap<MethodId, MethodId> = HashMap::new();
        for base in &bases {
            let Some(base_class) = base.instance.and_then(|i| self.ast.instance_class(i)) else {
                continue;
            };
            self.build_dispatch(base_class, built)?;
            table.extend(self.ast.class(base_class).dispatch.iter().map(|(k, v)| (*k, *v)));
        }

        let this = self.ast.this_instance(class);
        for base in &bases {
            let Some(base_inst) = base.instance else {
                continue;
            };
            for overload in &base.overloads {
                let loc = self.ast.method(*overload).loc;
                let target = self
                    .ast
                    .method(*overload)
                    .overrides
                    .ok_or_else(|| self.error(internal("overload without a bound target"), loc))?;
                self.check_override(base_inst, this, target, *overload, loc)?;
                for implementation in table.values_mut() {
                    if *implementation == target {
                        *implementation = *overload;
                    }
                }
                table.insert(target, *overload);
            }
        }

        let def = self.ast.class(class);
        if !def.is_interface {
            for ancestor in def.ancestors.clone() {
                for method in self.ast.class(ancestor).methods.clone() {
                    if self.ast.method(method).is_abstract() && !table.contains_key(&method) {
                        let kind = TypeErrorKind::MissingImplementation {
                            class: self.ast.names.display(self.ast.class(class).name),
                            method: self.ast.names.segment(self.ast.method(method).name).to_string(),
                        };
                        return Err(self.error(kind, self.ast.class(class).loc));
                    }
                }
            }
        }

        debug!(
            class = %self.ast.names.display(self.ast.class(class).name),
            entries = table.len(),
            "dispatch table built"
        );
        self.ast.class_mut(class).dispatch = table;
        Ok(())
    }

    /// The overload's signature must equal the target's as seen through `base`
    fn check_override(
        &mut self,
        base: InstanceId,
        this: InstanceId,
        target: MethodId,
        overload: MethodId,
        loc: Location,
    ) -> TypeResult<()> {
        let name = self.ast.method(target).name;
        let Some(base_class) = self.ast.instance_class(base) else {
            return Err(self.error(internal("override of a parameter base"), loc));
        };
        let path = match self.ast.class(base_class).members.lookup(name) {
            MemberLookup::One(entry) => entry.path.clone(),
            _ => return Err(self.error(internal("override target missing from its base"), loc)),
        };
        let path: Vec<InstanceId> = std::iter::once(base).chain(path).collect();
        let target_ty = self.method_type(target, loc)?;
        let expected = generic::strip_path(self.ast, target_ty, &path, this).at(loc)?;
        let actual = self.method_type(overload, loc)?;
        if expected != actual {
            return Err(self.mismatch(expected, actual, loc));
        }
        Ok(())
    }
}
