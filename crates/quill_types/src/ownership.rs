//! Reference kinds: reads, storage and the conversions between them

use quill_ast::*;

use crate::check::{Typer, signature};
use crate::error::{Locate, TypeErrorKind, TypeResult};
use crate::generic;

/// How a value reaches a storage slot
pub(crate) enum Assign {
    Direct,
    /// An owning or pinned reference stored into a weak slot
    Weaken(InstanceId),
}

impl Typer<'_> {
    /// Type observed when reading a slot of type `ty`
    pub(crate) fn read(&mut self, ty: TypeId) -> TypeId {
        match *self.ast.types.get(ty) {
            Type::Own(inst) => self.ast.types.pin(inst),
            Type::Weak(inst) => {
                let pin = self.ast.types.pin(inst);
                self.ast.types.optional(pin)
            }
            Type::Optional { wrapped, depth } => match *self.ast.types.get(wrapped) {
                Type::Own(inst) => {
                    let pin = self.ast.types.pin(inst);
                    self.ast.types.intern(Type::Optional { wrapped: pin, depth })
                }
                _ => ty,
            },
            _ => ty,
        }
    }

    /// Signature position: owning references are passed pinned
    pub(crate) fn pinned(&mut self, ty: TypeId) -> TypeId {
        match *self.ast.types.get(ty) {
            Type::Own(inst) => self.ast.types.pin(inst),
            Type::Optional { wrapped, depth } => match *self.ast.types.get(wrapped) {
                Type::Own(inst) => {
                    let pin = self.ast.types.pin(inst);
                    self.ast.types.intern(Type::Optional { wrapped: pin, depth })
                }
                _ => ty,
            },
            _ => ty,
        }
    }

    /// Pinned references only live as long as the expression producing them
    pub(crate) fn is_temporary(&self, ty: TypeId) -> bool {
        match *self.ast.types.get(ty) {
            Type::Pin(_) => true,
            Type::Optional { wrapped, .. } => matches!(self.ast.types.get(wrapped), Type::Pin(_)),
            _ => false,
        }
    }

    pub(crate) fn assign(&mut self, actual: TypeId, target: TypeId, loc: Location) -> TypeResult<Assign> {
        if actual == target || actual == TypeTable::NO_RETURN {
            return Ok(Assign::Direct);
        }
        let types = &self.ast.types;
        match (types.class_ref(target), types.class_ref(actual)) {
            (Some((want, to)), Some((have, from))) => {
                if !generic::is_subinstance(self.ast, from, to).at(loc)? {
                    return Err(self.mismatch(target, actual, loc));
                }
                return match (want, have) {
                    (RefKind::Own, RefKind::Own)
                    | (RefKind::Pin, RefKind::Own | RefKind::Pin)
                    | (RefKind::Weak, RefKind::Weak) => Ok(Assign::Direct),
                    (RefKind::Weak, _) => Ok(Assign::Weaken(to)),
                    (RefKind::Own, _) => {
                        let kind = TypeErrorKind::InvalidOwnershipConversion {
                            expected: self.ast.type_name(target),
                            actual: self.ast.type_name(actual),
                        };
                        Err(self.error(kind, loc))
                    }
                    (RefKind::Pin, RefKind::Weak) => Err(self.mismatch(target, actual, loc)),
                };
            }
            (Some(_), None) | (None, Some(_)) => return Err(self.mismatch(target, actual, loc)),
            (None, None) => {}
        }

        match (self.ast.types.get(target).clone(), self.ast.types.get(actual).clone()) {
            (
                Type::Optional { wrapped: want, depth: d1 },
                Type::Optional { wrapped: have, depth: d2 },
            ) if d1 == d2 => match self.assign(have, want, loc)? {
                Assign::Direct => Ok(Assign::Direct),
                Assign::Weaken(_) => Err(self.mismatch(target, actual, loc)),
            },
            (Type::ColdLambda(want), Type::ColdLambda(have)) => {
                self.unify_colds(want, have, loc)?;
                Ok(Assign::Direct)
            }
            (Type::Lambda { params, result }, Type::ColdLambda(cold)) => {
                self.fix_cold_to(cold, &params, result, loc)?;
                Ok(Assign::Direct)
            }
            (Type::Lambda { params, result }, Type::Lambda { .. } | Type::Function { .. }) => {
                let (have_params, have_result) = signature(self.ast, actual)
                    .ok_or_else(|| self.mismatch(target, actual, loc))?;
                if have_params != params {
                    return Err(self.mismatch(target, actual, loc));
                }
                if result != TypeTable::VOID {
                    self.assign(have_result, result, loc)
                        .map_err(|_| self.mismatch(target, actual, loc))?;
                }
                Ok(Assign::Direct)
            }
            _ => Err(self.mismatch(target, actual, loc)),
        }
    }

    /// Type `value` and convert it into a slot of type `target`; returns the
    /// node to store, which is a fresh `ToWeak` when the value is weakened
    pub(crate) fn coerce(&mut self, value: ActionId, target: TypeId) -> TypeResult<ActionId> {
        let actual = self.find_type(value)?;
        let loc = self.ast.action(value).loc;
        match self.assign(actual, target, loc)? {
            Assign::Direct => Ok(value),
            Assign::Weaken(inst) => {
                let weak = self.ast.add_action(ActionKind::ToWeak(value), loc);
                let ty = self.ast.types.weak(inst);
                self.ast.action_mut(weak).ty = TypeSlot::Fixed(ty);
                Ok(weak)
            }
        }
    }

    pub(crate) fn to_weak(&mut self, value: ActionId, loc: Location) -> TypeResult<TypeId> {
        let ty = self.find_type(value)?;
        match self.ast.types.class_ref(ty) {
            Some((_, inst)) => Ok(self.ast.types.weak(inst)),
            None => Err(self.expected("class reference", ty, loc)),
        }
    }

    pub(crate) fn to_own(&mut self, value: ActionId, loc: Location) -> TypeResult<TypeId> {
        let ty = self.find_type(value)?;
        match self.ast.types.class_ref(ty) {
            Some((RefKind::Pin, inst)) => Ok(self.ast.types.own(inst)),
            _ => Err(self.expected("pinned reference", ty, loc)),
        }
    }

    pub(crate) fn copy_of(&mut self, value: ActionId, loc: Location) -> TypeResult<TypeId> {
        let ty = self.find_type(value)?;
        if let Some((_, inst)) = self.ast.types.class_ref(ty) {
            return Ok(self.ast.types.own(inst));
        }
        match self.ast.types.get(ty) {
            Type::Array(_) => Ok(ty),
            _ => Err(self.expected("class reference or array", ty, loc)),
        }
    }
}
