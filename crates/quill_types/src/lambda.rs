//! Lambda literals and cold placeholders
//!
//! A lambda with an unannotated parameter has no type of its own. It gets a
//! cold placeholder that every literal flowing into the same slot shares, and
//! the first call (or the first annotated slot it reaches) fixes the
//! signature for all of them at once.

use quill_ast::*;
use tracing::debug;

use crate::check::{Typer, signature};
use crate::error::{TypeErrorKind, TypeResult, internal};

impl Typer<'_> {
    pub(crate) fn lambda(&mut self, lambda: LambdaId, loc: Location) -> TypeResult<TypeId> {
        let def = self.ast.lambda(lambda).clone();
        if !def.is_annotated(self.ast) {
            let cold = match def.cold {
                Some(cold) => cold,
                None => {
                    let cold = self.ast.colds.create(lambda);
                    self.ast.lambda_mut(lambda).cold = Some(cold);
                    cold
                }
            };
            return Ok(self.ast.types.cold(cold));
        }
        let params = def
            .params
            .iter()
            .map(|p| self.var_type(*p, loc))
            .collect::<TypeResult<Vec<_>>>()?;
        let saved = self.enter(def.class);
        let result = self.find_type(def.body);
        self.leave(saved);
        let result = result?;
        Ok(self.ast.types.lambda(params, result))
    }

    /// Apply a cold lambda to `args`; the first application fixes it
    pub(crate) fn call_cold(
        &mut self,
        cold: ColdId,
        args: &[ActionId],
        loc: Location,
    ) -> TypeResult<(Vec<ActionId>, TypeId)> {
        let signature_ty = match self.ast.colds.get(cold).signature {
            Some(ty) => ty,
            None => {
                let mut params = Vec::with_capacity(args.len());
                for arg in args {
                    let ty = self.find_type(*arg)?;
                    params.push(self.pinned(ty));
                }
                self.fix_cold(cold, params, loc)?
            }
        };
        let (params, result) =
            signature(self.ast, signature_ty).ok_or_else(|| self.error(internal("cold signature is not a lambda"), loc))?;
        let args = self.arguments(&params, args, loc)?;
        Ok((args, result))
    }

    fn fix_cold(&mut self, cold: ColdId, params: Vec<TypeId>, loc: Location) -> TypeResult<TypeId> {
        if self.ast.colds.get(cold).fixing {
            return Err(self.error(TypeErrorKind::CircularDependency, loc));
        }
        self.ast.colds.get_mut(cold).fixing = true;
        let fixed = self.fix_sites(cold, &params, loc);
        self.ast.colds.get_mut(cold).fixing = false;
        let fixed = fixed?;
        self.ast.colds.get_mut(cold).signature = Some(fixed);
        debug!(
            cold = self.ast.colds.find(cold).0,
            signature = %self.ast.type_name(fixed),
            "cold lambda fixed"
        );
        Ok(fixed)
    }

    /// Type every literal sharing `cold` with the given parameter types
    fn fix_sites(&mut self, cold: ColdId, params: &[TypeId], loc: Location) -> TypeResult<TypeId> {
        let sites = self.ast.colds.get(cold).sites.clone();
        let mut result: Option<TypeId> = None;
        for site in sites {
            let def = self.ast.lambda(site).clone();
            let site_loc = self.ast.action(def.body).loc;
            if def.params.len() != params.len() {
                let kind = TypeErrorKind::ParamCountMismatch {
                    expected: def.params.len(),
                    actual: params.len(),
                };
                return Err(self.error(kind, loc));
            }
            for (param, arg) in def.params.iter().zip(params) {
                match self.ast.var(*param).init {
                    Some(_) => {
                        let declared = self.var_type(*param, site_loc)?;
                        self.assign(*arg, declared, loc)?;
                    }
                    None => self.ast.var_mut(*param).ty = TypeSlot::Fixed(*arg),
                }
            }
            let saved = self.enter(def.class);
            let body = self.find_type(def.body);
            self.leave(saved);
            let body = body?;
            result = Some(match result {
                None => body,
                Some(previous) => self.unify_branches(previous, body, site_loc)?,
            });
        }
        let result = result.ok_or_else(|| self.error(internal("cold lambda without sites"), loc))?;
        let result = self.normalize(result);
        let params = params.iter().map(|p| self.normalize(*p)).collect();
        Ok(self.ast.types.lambda(params, result))
    }

    /// Replace a fixed cold placeholder by its signature
    fn normalize(&self, ty: TypeId) -> TypeId {
        match *self.ast.types.get(ty) {
            Type::ColdLambda(cold) => self.ast.colds.get(cold).signature.unwrap_or(ty),
            _ => ty,
        }
    }

    /// A cold lambda reaching a slot with a known lambda type
    pub(crate) fn fix_cold_to(
        &mut self,
        cold: ColdId,
        params: &[TypeId],
        result: TypeId,
        loc: Location,
    ) -> TypeResult<()> {
        let fixed = match self.ast.colds.get(cold).signature {
            Some(ty) => ty,
            None => self.fix_cold(cold, params.to_vec(), loc)?,
        };
        let expected = self.ast.types.lambda(params.to_vec(), result);
        let (have_params, have_result) =
            signature(self.ast, fixed).ok_or_else(|| self.error(internal("cold signature is not a lambda"), loc))?;
        if have_params != params {
            return Err(self.mismatch(expected, fixed, loc));
        }
        if result != TypeTable::VOID {
            self.assign(have_result, result, loc)
                .map_err(|_| self.mismatch(expected, fixed, loc))?;
        }
        Ok(())
    }

    /// Two cold lambdas meeting in one slot share a signature from then on
    pub(crate) fn unify_colds(&mut self, x: ColdId, y: ColdId, loc: Location) -> TypeResult<TypeId> {
        let fx = self.ast.colds.get(x).signature;
        let fy = self.ast.colds.get(y).signature;
        match (fx, fy) {
            (None, None) => {
                let root = self.ast.colds.merge(x, y);
                Ok(self.ast.types.cold(root))
            }
            (Some(fixed), None) | (None, Some(fixed)) => {
                let other = if fx.is_none() { x } else { y };
                let (params, result) = signature(self.ast, fixed)
                    .ok_or_else(|| self.error(internal("cold signature is not a lambda"), loc))?;
                self.fix_cold_to(other, &params, result, loc)?;
                Ok(fixed)
            }
            (Some(a), Some(b)) if a == b => Ok(a),
            (Some(a), Some(b)) => Err(self.incompatible(a, b, loc)),
        }
    }

    /// Every cold lambda must have been applied somewhere
    pub(crate) fn check_colds(&mut self) -> TypeResult<()> {
        for cold in self.ast.colds.ids() {
            let placeholder = self.ast.colds.get(cold);
            if placeholder.signature.is_some() {
                continue;
            }
            let Some(site) = placeholder.sites.first() else {
                continue;
            };
            let loc = self.ast.action(self.ast.lambda(*site).body).loc;
            let what = "lambda with untyped parameters that is never called".to_string();
            return Err(self.error(TypeErrorKind::Unsupported { what }, loc));
        }
        Ok(())
    }
}
