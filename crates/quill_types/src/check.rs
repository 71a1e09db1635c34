//! Typing engine: fills every action slot

use quill_ast::*;
use tracing::trace;

use crate::error::{Locate, TypeError, TypeErrorKind, TypeResult, internal};
use crate::generic;

/// Enclosing declaration of the body being typed
#[derive(Debug, Clone, Default)]
pub(crate) struct Context {
    /// Instance of the enclosing class over its own parameters
    pub this: Option<InstanceId>,
    /// Locals introduced by the innermost source block
    pub chain: Vec<VarId>,
}

/// A member seen from a receiver
pub(crate) struct Access {
    pub receiver: InstanceId,
    pub entry: MemberEntry,
}

pub(crate) struct Typer<'a> {
    pub ast: &'a mut Ast,
    pub ctx: Context,
}

pub(crate) fn signature(ast: &Ast, ty: TypeId) -> Option<(Vec<TypeId>, TypeId)> {
    match ast.types.get(ty) {
        Type::Function { params, result } | Type::Lambda { params, result } => {
            Some((params.clone(), *result))
        }
        _ => None,
    }
}

impl<'a> Typer<'a> {
    pub(crate) fn new(ast: &'a mut Ast) -> Self {
        Self {
            ast,
            ctx: Context::default(),
        }
    }

    // === Diagnostics ===

    pub(crate) fn error(&self, kind: TypeErrorKind, loc: Location) -> TypeError {
        TypeError::new(kind, loc)
    }

    pub(crate) fn mismatch(&self, expected: TypeId, actual: TypeId, loc: Location) -> TypeError {
        let kind = TypeErrorKind::TypeMismatch {
            expected: self.ast.type_name(expected),
            actual: self.ast.type_name(actual),
        };
        self.error(kind, loc)
    }

    /// Mismatch against a category rather than one type
    pub(crate) fn expected(&self, expected: &str, actual: TypeId, loc: Location) -> TypeError {
        let kind = TypeErrorKind::TypeMismatch {
            expected: expected.to_string(),
            actual: self.ast.type_name(actual),
        };
        self.error(kind, loc)
    }

    pub(crate) fn incompatible(&self, first: TypeId, second: TypeId, loc: Location) -> TypeError {
        let kind = TypeErrorKind::IncompatibleTypes {
            first: self.ast.type_name(first),
            second: self.ast.type_name(second),
        };
        self.error(kind, loc)
    }

    // === Context ===

    pub(crate) fn enter(&mut self, class: Option<ClassId>) -> Context {
        let this = class.map(|c| self.ast.this_instance(c));
        std::mem::replace(
            &mut self.ctx,
            Context {
                this,
                chain: Vec::new(),
            },
        )
    }

    pub(crate) fn leave(&mut self, saved: Context) {
        self.ctx = saved;
    }

    fn this(&self, loc: Location) -> TypeResult<InstanceId> {
        self.ctx.this.ok_or_else(|| self.error(internal("'this' outside of a class"), loc))
    }

    // === Declarations ===

    pub(crate) fn check_class(&mut self, class: ClassId) -> TypeResult<()> {
        let saved = self.enter(Some(class));
        let result = self.check_members(class);
        self.leave(saved);
        result
    }

    fn check_members(&mut self, class: ClassId) -> TypeResult<()> {
        let def = self.ast.class(class);
        let loc = def.loc;
        let fields = def.fields.clone();
        let methods: Vec<MethodId> = def
            .methods
            .iter()
            .copied()
            .chain(def.bases.iter().flat_map(|b| b.overloads.iter().copied()))
            .collect();
        for field in fields {
            self.var_type(field, loc)?;
        }
        for method in methods {
            let loc = self.ast.method(method).loc;
            let sig = self.method_type(method, loc)?;
            if let Some(body) = self.ast.method(method).body {
                let body = self.check_body(body, sig, loc)?;
                self.ast.method_mut(method).body = Some(body);
            }
        }
        Ok(())
    }

    pub(crate) fn check_function(&mut self, function: FnId, is_entry: bool) -> TypeResult<()> {
        let saved = self.enter(None);
        let result = self.check_function_body(function, is_entry);
        self.leave(saved);
        result
    }

    fn check_function_body(&mut self, function: FnId, is_entry: bool) -> TypeResult<()> {
        let def = self.ast.function(function);
        let (loc, body) = (def.loc, def.body);
        if is_entry {
            let Some(body) = body else {
                return Ok(());
            };
            let result = self.find_type(body)?;
            let ty = self.ast.types.function(Vec::new(), result);
            self.ast.function_mut(function).ty = TypeSlot::Fixed(ty);
            return Ok(());
        }
        let sig = self.function_type(function, loc)?;
        if let Some(body) = body {
            let body = self.check_body(body, sig, loc)?;
            self.ast.function_mut(function).body = Some(body);
        }
        Ok(())
    }

    /// Type a body and convert it to the declared result; a `void` result discards the value
    fn check_body(&mut self, body: ActionId, sig: TypeId, loc: Location) -> TypeResult<ActionId> {
        let (_, result) = signature(self.ast, sig).ok_or_else(|| self.error(internal("signature is not callable"), loc))?;
        self.find_type(body)?;
        if result == TypeTable::VOID {
            Ok(body)
        } else {
            self.coerce(body, result)
        }
    }

    pub(crate) fn method_type(&mut self, method: MethodId, loc: Location) -> TypeResult<TypeId> {
        if let Some(ty) = self.ast.method(method).ty.fixed() {
            return Ok(ty);
        }
        let def = self.ast.method(method);
        let (params, result) = (def.params.clone(), def.result);
        let ty = self.callable_type(&params, result, loc)?;
        self.ast.method_mut(method).ty = TypeSlot::Fixed(ty);
        Ok(ty)
    }

    pub(crate) fn function_type(&mut self, function: FnId, loc: Location) -> TypeResult<TypeId> {
        if let Some(ty) = self.ast.function(function).ty.fixed() {
            return Ok(ty);
        }
        let def = self.ast.function(function);
        let (params, result) = (def.params.clone(), def.result);
        let ty = self.callable_type(&params, result, loc)?;
        self.ast.function_mut(function).ty = TypeSlot::Fixed(ty);
        Ok(ty)
    }

    fn callable_type(&mut self, params: &[VarId], result: Option<ActionId>, loc: Location) -> TypeResult<TypeId> {
        let params = params
            .iter()
            .map(|p| self.var_type(*p, loc))
            .collect::<TypeResult<Vec<_>>>()?;
        let result = match result {
            Some(expr) => self.signature_type(expr)?,
            None => TypeTable::VOID,
        };
        Ok(self.ast.types.function(params, result))
    }

    pub(crate) fn var_type(&mut self, var: VarId, loc: Location) -> TypeResult<TypeId> {
        let def = self.ast.var(var).clone();
        match def.ty {
            TypeSlot::Fixed(ty) => return Ok(ty),
            TypeSlot::InProgress => return Err(self.error(TypeErrorKind::CircularDependency, def.loc)),
            TypeSlot::Empty => {}
        }
        let ty = match def.kind {
            VarKind::Field(class) => {
                let init = def
                    .init
                    .ok_or_else(|| self.error(internal("field without initializer"), def.loc))?;
                self.ast.var_mut(var).ty = TypeSlot::InProgress;
                let saved = self.enter(Some(class));
                let ty = self.find_type(init);
                self.leave(saved);
                let ty = ty?;
                if self.is_temporary(ty) {
                    let actual = self.ast.type_name(ty);
                    return Err(self.error(TypeErrorKind::TemporaryReference { actual }, def.loc));
                }
                ty
            }
            VarKind::Param => match def.init {
                Some(declared) => self.signature_type(declared)?,
                None => {
                    return Err(self.error(internal("lambda parameter read before its lambda was fixed"), loc));
                }
            },
            VarKind::Local => {
                let init = def
                    .init
                    .ok_or_else(|| self.error(internal("local without initializer"), def.loc))?;
                self.find_type(init)?
            }
            VarKind::Binding => return Err(self.error(internal("binding read outside of its guard"), loc)),
        };
        self.ast.var_mut(var).ty = TypeSlot::Fixed(ty);
        Ok(ty)
    }

    // === Type expressions ===

    /// Type denoted by a type expression; a class name denotes an owning reference
    pub(crate) fn type_expr(&mut self, id: ActionId) -> TypeResult<TypeId> {
        if let Some(ty) = self.ast.action(id).ty.fixed() {
            return Ok(ty);
        }
        let loc = self.ast.action(id).loc;
        let ty = match self.ast.action(id).kind.clone() {
            ActionKind::ConstInt64(_) => TypeTable::INT64,
            ActionKind::ConstDouble(_) => TypeTable::DOUBLE,
            ActionKind::ConstBool(_) => TypeTable::BOOL,
            ActionKind::MakeInstance { instance: Some(inst), params, .. } => {
                for param in params {
                    self.type_expr(param)?;
                }
                self.ast.types.own(inst)
            }
            ActionKind::ToWeak(inner) => {
                let inner = self.type_expr(inner)?;
                match self.ast.types.class_ref(inner) {
                    Some((_, inst)) => self.ast.types.weak(inst),
                    None => return Err(self.expected("class reference", inner, loc)),
                }
            }
            ActionKind::NoneOf(inner) => {
                let inner = self.type_expr(inner)?;
                self.ast.types.optional(inner)
            }
            ActionKind::ArrayOf(element) => {
                let element = self.type_expr(element)?;
                self.ast.types.array(element)
            }
            ActionKind::LambdaSig { params, result } => {
                let params = params
                    .iter()
                    .map(|p| self.signature_type(*p))
                    .collect::<TypeResult<Vec<_>>>()?;
                let result = match result {
                    Some(r) => self.signature_type(r)?,
                    None => TypeTable::VOID,
                };
                self.ast.types.lambda(params, result)
            }
            _ => {
                let what = "expression used as a type".to_string();
                return Err(self.error(TypeErrorKind::Unsupported { what }, loc));
            }
        };
        self.ast.action_mut(id).ty = TypeSlot::Fixed(ty);
        Ok(ty)
    }

    /// Parameter and result types: class names denote pinned references
    pub(crate) fn signature_type(&mut self, id: ActionId) -> TypeResult<TypeId> {
        let ty = self.type_expr(id)?;
        Ok(self.pinned(ty))
    }

    // === Slots ===

    pub(crate) fn find_type(&mut self, id: ActionId) -> TypeResult<TypeId> {
        match self.ast.action(id).ty {
            TypeSlot::Fixed(ty) => return Ok(ty),
            TypeSlot::InProgress => {
                return Err(self.error(TypeErrorKind::CircularDependency, self.ast.action(id).loc));
            }
            TypeSlot::Empty => {}
        }
        self.ast.action_mut(id).ty = TypeSlot::InProgress;
        let ty = self.compute(id)?;
        self.unite(id, ty)
    }

    /// Record `ty` for `id`; a slot already fixed by a `break` must accept it
    fn unite(&mut self, id: ActionId, ty: TypeId) -> TypeResult<TypeId> {
        let loc = self.ast.action(id).loc;
        if let TypeSlot::Fixed(existing) = self.ast.action(id).ty {
            return if self.accepts(id, existing, ty, loc)? {
                Ok(existing)
            } else {
                Err(self.incompatible(existing, ty, loc))
            };
        }
        self.ast.action_mut(id).ty = TypeSlot::Fixed(ty);
        Ok(ty)
    }

    /// Whether the slot of `target`, already fixed to `existing`, takes `ty`.
    /// Only a body returning void discards the values of later results.
    fn accepts(&mut self, target: ActionId, existing: TypeId, ty: TypeId, loc: Location) -> TypeResult<bool> {
        if existing == ty || ty == TypeTable::NO_RETURN {
            return Ok(true);
        }
        if existing == TypeTable::VOID && !matches!(self.ast.action(target).kind, ActionKind::Loop(_)) {
            return Ok(true);
        }
        let (Some((want, target)), Some((have, inst))) =
            (self.ast.types.class_ref(existing), self.ast.types.class_ref(ty))
        else {
            return Ok(false);
        };
        let kinds = matches!(
            (want, have),
            (RefKind::Pin, RefKind::Own | RefKind::Pin) | (RefKind::Own, RefKind::Own) | (RefKind::Weak, RefKind::Weak)
        );
        Ok(kinds && generic::is_subinstance(self.ast, inst, target).at(loc)?)
    }

    fn break_to(&mut self, target: ActionId, ty: TypeId, loc: Location) -> TypeResult<()> {
        match self.ast.action(target).ty {
            TypeSlot::Fixed(existing) => {
                if !self.accepts(target, existing, ty, loc)? {
                    return Err(self.incompatible(existing, ty, loc));
                }
            }
            TypeSlot::InProgress => self.ast.action_mut(target).ty = TypeSlot::Fixed(ty),
            TypeSlot::Empty => return Err(self.error(internal("break outside of its target"), loc)),
        }
        Ok(())
    }

    fn compute(&mut self, id: ActionId) -> TypeResult<TypeId> {
        let loc = self.ast.action(id).loc;
        let kind = self.ast.action(id).kind.clone();
        trace!(action = id.0, kind = kind.label(), "typing");
        match kind {
            ActionKind::ConstInt64(_) => Ok(TypeTable::INT64),
            ActionKind::ConstDouble(_) => Ok(TypeTable::DOUBLE),
            ActionKind::ConstBool(_) => Ok(TypeTable::BOOL),
            ActionKind::ConstAtom(_) => Ok(TypeTable::ATOM),
            ActionKind::ConstVoid => Ok(TypeTable::VOID),
            ActionKind::Name(_) | ActionKind::SetName { .. } => {
                Err(self.error(internal("unresolved name reached the type checker"), loc))
            }
            ActionKind::GetVar(var) => {
                let declared = self.var_type(var, loc)?;
                Ok(self.read(declared))
            }
            ActionKind::SetVar { var, value } => {
                let declared = self.var_type(var, loc)?;
                let value = self.coerce(value, declared)?;
                self.ast.action_mut(id).kind = ActionKind::SetVar { var, value };
                Ok(TypeTable::VOID)
            }
            ActionKind::GetThis => {
                let this = self.this(loc)?;
                Ok(self.ast.types.pin(this))
            }
            ActionKind::GetField { base, name, .. } => self.get_field(id, base, name, loc),
            ActionKind::SetField { base, name, value, .. } => self.set_field(id, base, name, value, loc),
            ActionKind::Binary { op, lhs, rhs } => self.binary(op, lhs, rhs, loc),
            ActionKind::Unary { op, operand } => self.unary(op, operand, loc),
            ActionKind::Block(stmts) => self.statements(&stmts),
            ActionKind::Local { var, body } => self.local(var, &body, loc),
            ActionKind::Loop(body) => {
                self.statements(&body)?;
                Ok(self.ast.action(id).ty.fixed().unwrap_or(TypeTable::NO_RETURN))
            }
            ActionKind::Break { target, result } => {
                let ty = match result {
                    Some(result) => self.find_type(result)?,
                    None => TypeTable::VOID,
                };
                self.break_to(target, ty, loc)?;
                Ok(TypeTable::NO_RETURN)
            }
            ActionKind::If { cond, then, binding } => {
                let cond_ty = self.find_type(cond)?;
                let Some(inner) = self.ast.types.unwrap_optional(cond_ty) else {
                    return Err(self.expected("optional", cond_ty, self.ast.action(cond).loc));
                };
                self.ast.var_mut(binding).ty = TypeSlot::Fixed(inner);
                let then = self.find_type(then)?;
                Ok(if then == TypeTable::NO_RETURN {
                    TypeTable::BOOL
                } else {
                    self.ast.types.optional(then)
                })
            }
            ActionKind::Else { lhs, rhs } => {
                let lhs_ty = self.find_type(lhs)?;
                let Some(inner) = self.ast.types.unwrap_optional(lhs_ty) else {
                    return Err(self.expected("optional", lhs_ty, self.ast.action(lhs).loc));
                };
                let rhs_ty = self.find_type(rhs)?;
                self.unify_branches(inner, rhs_ty, loc)
            }
            ActionKind::Just(value) => {
                let ty = self.find_type(value)?;
                Ok(self.ast.types.optional(ty))
            }
            ActionKind::NoneOf(ty) => {
                let ty = self.type_expr(ty)?;
                Ok(self.ast.types.optional(ty))
            }
            ActionKind::MakeInstance { target, params, instance, .. } => {
                self.make_instance(target, &params, instance, loc)
            }
            ActionKind::MakeArray(items) => self.make_array(&items, loc),
            ActionKind::ArrayOf(_) | ActionKind::LambdaSig { .. } => {
                let what = "type expression used as a value".to_string();
                Err(self.error(TypeErrorKind::Unsupported { what }, loc))
            }
            ActionKind::GetAt { array, index } => {
                let element = self.element_type(array, index)?;
                Ok(self.read(element))
            }
            ActionKind::SetAt { array, index, value } => {
                let element = self.element_type(array, index)?;
                let value = self.coerce(value, element)?;
                self.ast.action_mut(id).kind = ActionKind::SetAt { array, index, value };
                Ok(TypeTable::VOID)
            }
            ActionKind::Call { callee, args } => self.call(id, callee, args, loc),
            ActionKind::CallMethod { receiver, method, args, .. } => {
                self.call_method(id, receiver, method, args, loc)
            }
            ActionKind::CallFunction { function, args } => {
                let sig = self.function_type(function, loc)?;
                let (params, result) = signature(self.ast, sig)
                    .ok_or_else(|| self.error(internal("function signature is not callable"), loc))?;
                let args = self.arguments(&params, &args, loc)?;
                self.ast.action_mut(id).kind = ActionKind::CallFunction { function, args };
                Ok(result)
            }
            ActionKind::FunctionRef(function) => self.function_type(function, loc),
            ActionKind::MakeDelegate { receiver, method } => {
                let name = self.ast.method(method).name;
                let access = self.member(receiver, name, loc)?;
                self.delegate_type(&access, method, loc)
            }
            ActionKind::Lambda(lambda) => self.lambda(lambda, loc),
            ActionKind::Cast { operand, target, .. } => self.cast(id, operand, target, loc),
            ActionKind::ToWeak(value) => self.to_weak(value, loc),
            ActionKind::ToOwn(value) => self.to_own(value, loc),
            ActionKind::CopyOf(value) => self.copy_of(value, loc),
        }
    }

    // === Blocks ===

    /// A statement sequence starts a new source block for the local chain
    fn statements(&mut self, stmts: &[ActionId]) -> TypeResult<TypeId> {
        let saved = std::mem::take(&mut self.ctx.chain);
        let result = stmts
            .iter()
            .try_fold(TypeTable::VOID, |_, stmt| self.find_type(*stmt));
        self.ctx.chain = saved;
        result
    }

    fn local(&mut self, var: VarId, body: &[ActionId], loc: Location) -> TypeResult<TypeId> {
        let init = self
            .ast
            .var(var)
            .init
            .ok_or_else(|| self.error(internal("local without initializer"), loc))?;
        let ty = self.find_type(init)?;
        self.ast.var_mut(var).ty = TypeSlot::Fixed(ty);
        self.ctx.chain.push(var);
        let mut last = TypeTable::VOID;
        for stmt in body {
            last = self.find_type(*stmt)?;
        }
        // the block hands back a local it introduced with its declared type
        if let Some(&tail) = body.last() {
            if let ActionKind::GetVar(read) = self.ast.action(tail).kind {
                if self.ctx.chain.contains(&read) {
                    last = self.var_type(read, loc)?;
                }
            }
        }
        self.ctx.chain.pop();
        Ok(last)
    }

    // === Operators ===

    fn expect_type(&self, expected: TypeId, actual: TypeId, loc: Location) -> TypeResult<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(self.mismatch(expected, actual, loc))
        }
    }

    fn expect_numeric(&self, actual: TypeId, loc: Location) -> TypeResult<()> {
        if self.ast.types.is_numeric(actual) {
            Ok(())
        } else {
            let actual = self.ast.type_name(actual);
            Err(self.error(TypeErrorKind::ExpectedIntOrDouble { actual }, loc))
        }
    }

    fn binary(&mut self, op: BinOp, lhs: ActionId, rhs: ActionId, loc: Location) -> TypeResult<TypeId> {
        let l = self.find_type(lhs)?;
        let r = self.find_type(rhs)?;
        let lhs_loc = self.ast.action(lhs).loc;
        let rhs_loc = self.ast.action(rhs).loc;
        match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                self.expect_numeric(l, lhs_loc)?;
                self.expect_type(l, r, rhs_loc)?;
                Ok(l)
            }
            BinOp::Mod | BinOp::And | BinOp::Or | BinOp::Xor | BinOp::Shl | BinOp::Shr => {
                self.expect_type(TypeTable::INT64, l, lhs_loc)?;
                self.expect_type(TypeTable::INT64, r, rhs_loc)?;
                Ok(TypeTable::INT64)
            }
            BinOp::Lt => {
                self.expect_numeric(l, lhs_loc)?;
                self.expect_type(l, r, rhs_loc)?;
                Ok(TypeTable::BOOL)
            }
            BinOp::Eq => {
                let same_object = match (self.ast.types.class_ref(l), self.ast.types.class_ref(r)) {
                    (Some((_, a)), Some((_, b))) => a == b,
                    _ => false,
                };
                if l != r && !same_object {
                    return Err(self.mismatch(l, r, loc));
                }
                Ok(TypeTable::BOOL)
            }
            BinOp::LogAnd | BinOp::LogOr => {
                self.expect_type(TypeTable::BOOL, l, lhs_loc)?;
                self.expect_type(TypeTable::BOOL, r, rhs_loc)?;
                Ok(TypeTable::BOOL)
            }
        }
    }

    fn unary(&mut self, op: UnaryOp, operand: ActionId, loc: Location) -> TypeResult<TypeId> {
        let ty = self.find_type(operand)?;
        match op {
            UnaryOp::Not => {
                self.expect_type(TypeTable::BOOL, ty, loc)?;
                Ok(TypeTable::BOOL)
            }
            UnaryOp::Neg => {
                self.expect_numeric(ty, loc)?;
                Ok(ty)
            }
            UnaryOp::ToInt => {
                self.expect_type(TypeTable::DOUBLE, ty, loc)?;
                Ok(TypeTable::INT64)
            }
            UnaryOp::ToFloat => {
                self.expect_type(TypeTable::INT64, ty, loc)?;
                Ok(TypeTable::DOUBLE)
            }
        }
    }

    /// Common type of the two arms of `a : b`
    pub(crate) fn unify_branches(&mut self, a: TypeId, b: TypeId, loc: Location) -> TypeResult<TypeId> {
        if a == b || b == TypeTable::NO_RETURN {
            return Ok(a);
        }
        if a == TypeTable::NO_RETURN {
            return Ok(b);
        }
        match (self.ast.types.get(a).clone(), self.ast.types.get(b).clone()) {
            (Type::ColdLambda(x), Type::ColdLambda(y)) => return self.unify_colds(x, y, loc),
            (Type::ColdLambda(cold), Type::Lambda { params, result })
            | (Type::Lambda { params, result }, Type::ColdLambda(cold)) => {
                self.fix_cold_to(cold, &params, result, loc)?;
                return Ok(self.ast.types.lambda(params, result));
            }
            _ => {}
        }
        let (Some((ka, ia)), Some((kb, ib))) = (self.ast.types.class_ref(a), self.ast.types.class_ref(b)) else {
            return Err(self.incompatible(a, b, loc));
        };
        let inst = if generic::is_subinstance(self.ast, ib, ia).at(loc)? {
            ia
        } else if generic::is_subinstance(self.ast, ia, ib).at(loc)? {
            ib
        } else {
            return Err(self.incompatible(a, b, loc));
        };
        let kind = match (ka, kb) {
            (RefKind::Own, RefKind::Own) => RefKind::Own,
            (RefKind::Weak, RefKind::Weak) => RefKind::Weak,
            (RefKind::Weak, _) | (_, RefKind::Weak) => return Err(self.incompatible(a, b, loc)),
            _ => RefKind::Pin,
        };
        Ok(self.ast.types.reference(kind, inst))
    }

    // === Members ===

    /// Look `name` up on the receiver's class; `None` receives through `this`
    pub(crate) fn member(&mut self, base: Option<ActionId>, name: NameId, loc: Location) -> TypeResult<Access> {
        let receiver = match base {
            None => self.this(loc)?,
            Some(base) => {
                let ty = self.find_type(base)?;
                match self.ast.types.class_ref(ty) {
                    Some((RefKind::Own | RefKind::Pin, inst)) => inst,
                    _ => return Err(self.expected("class reference", ty, self.ast.action(base).loc)),
                }
            }
        };
        let unknown = |ast: &Ast| TypeErrorKind::UnknownMember {
            class: ast.instance_name(receiver),
            name: ast.names.display(name),
        };
        let Some(class) = self.ast.instance_class(receiver) else {
            return Err(self.error(unknown(self.ast), loc));
        };
        let entry = match self.ast.class(class).members.lookup(name) {
            MemberLookup::None => {
                let kind = TypeErrorKind::UnknownMember {
                    class: self.ast.names.display(self.ast.class(class).name),
                    name: self.ast.names.display(name),
                };
                return Err(self.error(kind, loc));
            }
            MemberLookup::Many(_) => {
                let name = self.ast.names.display(name);
                return Err(self.error(TypeErrorKind::AmbiguousMember { name }, loc));
            }
            MemberLookup::One(entry) => entry.clone(),
        };
        Ok(Access { receiver, entry })
    }

    /// Declared member type as seen from the receiver
    pub(crate) fn member_type(&mut self, access: &Access, declared: TypeId, loc: Location) -> TypeResult<TypeId> {
        generic::strip_path(self.ast, declared, &access.entry.path, access.receiver).at(loc)
    }

    fn get_field(&mut self, id: ActionId, base: Option<ActionId>, name: NameId, loc: Location) -> TypeResult<TypeId> {
        let access = self.member(base, name, loc)?;
        match access.entry.member {
            Member::Field(field) => {
                let declared = self.var_type(field, loc)?;
                let ty = self.member_type(&access, declared, loc)?;
                self.ast.action_mut(id).kind = ActionKind::GetField { base, name, field: Some(field) };
                Ok(self.read(ty))
            }
            Member::Method(method) => {
                self.ast.action_mut(id).kind = ActionKind::MakeDelegate { receiver: base, method };
                self.delegate_type(&access, method, loc)
            }
        }
    }

    fn set_field(
        &mut self,
        id: ActionId,
        base: Option<ActionId>,
        name: NameId,
        value: ActionId,
        loc: Location,
    ) -> TypeResult<TypeId> {
        let access = self.member(base, name, loc)?;
        let Member::Field(field) = access.entry.member else {
            let kind = TypeErrorKind::TypeMismatch {
                expected: "field".to_string(),
                actual: "method".to_string(),
            };
            return Err(self.error(kind, loc));
        };
        let declared = self.var_type(field, loc)?;
        let slot = self.member_type(&access, declared, loc)?;
        let value = self.coerce(value, slot)?;
        self.ast.action_mut(id).kind = ActionKind::SetField {
            base,
            name,
            field: Some(field),
            value,
        };
        Ok(TypeTable::VOID)
    }

    fn delegate_type(&mut self, access: &Access, method: MethodId, loc: Location) -> TypeResult<TypeId> {
        let sig = self.method_type(method, loc)?;
        let sig = self.member_type(access, sig, loc)?;
        let (params, result) =
            signature(self.ast, sig).ok_or_else(|| self.error(internal("method signature is not callable"), loc))?;
        Ok(self.ast.types.lambda(params, result))
    }

    // === Calls ===

    /// Coerce call arguments into parameter slots
    pub(crate) fn arguments(&mut self, params: &[TypeId], args: &[ActionId], loc: Location) -> TypeResult<Vec<ActionId>> {
        if params.len() != args.len() {
            let kind = TypeErrorKind::ParamCountMismatch {
                expected: params.len(),
                actual: args.len(),
            };
            return Err(self.error(kind, loc));
        }
        params
            .iter()
            .zip(args)
            .map(|(param, arg)| self.coerce(*arg, *param))
            .collect()
    }

    fn call(&mut self, id: ActionId, callee: ActionId, args: Vec<ActionId>, loc: Location) -> TypeResult<TypeId> {
        // `o.m(…)` names a method directly
        if let ActionKind::GetField { base, name, field: None } = self.ast.action(callee).kind.clone() {
            let access = self.member(base, name, loc)?;
            if let Member::Method(method) = access.entry.member {
                self.ast.action_mut(id).kind = ActionKind::CallMethod {
                    receiver: base,
                    method,
                    args: args.clone(),
                    dispatch: Dispatch::Unresolved,
                };
                return self.call_method(id, base, method, args, loc);
            }
        }

        let callee_ty = self.find_type(callee)?;
        let (args, result) = match self.ast.types.get(callee_ty).clone() {
            Type::Lambda { params, result } | Type::Function { params, result } => {
                (self.arguments(&params, &args, loc)?, result)
            }
            Type::ColdLambda(cold) => self.call_cold(cold, &args, loc)?,
            _ => {
                let actual = self.ast.type_name(callee_ty);
                return Err(self.error(TypeErrorKind::NotCallable { actual }, loc));
            }
        };
        self.ast.action_mut(id).kind = ActionKind::Call { callee, args };
        Ok(result)
    }

    fn call_method(
        &mut self,
        id: ActionId,
        receiver: Option<ActionId>,
        method: MethodId,
        args: Vec<ActionId>,
        loc: Location,
    ) -> TypeResult<TypeId> {
        let name = self.ast.method(method).name;
        let access = self.member(receiver, name, loc)?;
        if access.entry.member != Member::Method(method) {
            return Err(self.error(internal("method call bound to another member"), loc));
        }
        let sig = self.method_type(method, loc)?;
        let sig = self.member_type(&access, sig, loc)?;
        let (params, result) =
            signature(self.ast, sig).ok_or_else(|| self.error(internal("method signature is not callable"), loc))?;
        let args = self.arguments(&params, &args, loc)?;
        let declaring = self.ast.method(method).class;
        let dispatch = if self.ast.class(declaring).is_interface {
            Dispatch::Interface(declaring)
        } else {
            Dispatch::Virtual
        };
        self.ast.action_mut(id).kind = ActionKind::CallMethod {
            receiver,
            method,
            args,
            dispatch,
        };
        Ok(result)
    }

    // === Instances and arrays ===

    fn make_instance(
        &mut self,
        target: Option<ClassTarget>,
        params: &[ActionId],
        instance: Option<InstanceId>,
        loc: Location,
    ) -> TypeResult<TypeId> {
        let (Some(target), Some(inst)) = (target, instance) else {
            return Err(self.error(internal("unresolved class reference"), loc));
        };
        let class = match target {
            ClassTarget::Class(class) => class,
            ClassTarget::Param(_) => {
                let what = "creating an instance of a class parameter".to_string();
                return Err(self.error(TypeErrorKind::Unsupported { what }, loc));
            }
        };
        if self.ast.class(class).is_interface {
            let what = format!("creating an instance of interface {}", self.ast.instance_name(inst));
            return Err(self.error(TypeErrorKind::Unsupported { what }, loc));
        }
        for param in params {
            self.type_expr(*param)?;
        }
        self.check_bounds(class, inst, loc)?;
        Ok(self.ast.types.own(inst))
    }

    fn check_bounds(&mut self, class: ClassId, inst: InstanceId, loc: Location) -> TypeResult<()> {
        let formals = self.ast.class(class).params.clone();
        let args = self.ast.instances.get(inst).params.clone();
        for (formal, arg) in formals.iter().zip(args) {
            let Some(bound) = self.ast.param(*formal).bound else {
                continue;
            };
            if generic::upcast(self.ast, arg, bound).at(loc)?.is_none() {
                let kind = TypeErrorKind::TypeMismatch {
                    expected: self.ast.names.display(self.ast.class(bound).name),
                    actual: self.ast.instance_name(arg),
                };
                return Err(self.error(kind, loc));
            }
        }
        Ok(())
    }

    fn make_array(&mut self, items: &[ActionId], loc: Location) -> TypeResult<TypeId> {
        let mut element = None;
        for item in items {
            let ty = self.find_type(*item)?;
            let item_loc = self.ast.action(*item).loc;
            if self.is_temporary(ty) {
                let actual = self.ast.type_name(ty);
                return Err(self.error(TypeErrorKind::TemporaryReference { actual }, item_loc));
            }
            match element {
                None => element = Some(ty),
                Some(first) => self.expect_type(first, ty, item_loc)?,
            }
        }
        let element = element.ok_or_else(|| self.error(internal("empty array literal"), loc))?;
        Ok(self.ast.types.array(element))
    }

    fn element_type(&mut self, array: ActionId, index: ActionId) -> TypeResult<TypeId> {
        let array_ty = self.find_type(array)?;
        let Type::Array(element) = *self.ast.types.get(array_ty) else {
            return Err(self.expected("array", array_ty, self.ast.action(array).loc));
        };
        let index_ty = self.find_type(index)?;
        self.expect_type(TypeTable::INT64, index_ty, self.ast.action(index).loc)?;
        Ok(element)
    }

    // === Casts ===

    fn cast(&mut self, id: ActionId, operand: ActionId, target: ActionId, loc: Location) -> TypeResult<TypeId> {
        let source = self.find_type(operand)?;
        let Some((RefKind::Own | RefKind::Pin, inst)) = self.ast.types.class_ref(source) else {
            return Err(self.expected("class reference", source, self.ast.action(operand).loc));
        };
        self.type_expr(target)?;
        let ActionKind::MakeInstance { instance: Some(wanted), .. } = self.ast.action(target).kind else {
            return Err(self.error(internal("cast target is not a class reference"), loc));
        };
        let Some(class) = self.ast.instance_class(wanted) else {
            let what = format!("casting to unbounded parameter {}", self.ast.instance_name(wanted));
            return Err(self.error(TypeErrorKind::Unsupported { what }, loc));
        };
        let safe = generic::upcast(self.ast, inst, class).at(loc)? == Some(wanted);
        self.ast.action_mut(id).kind = ActionKind::Cast {
            operand,
            target,
            checked: !safe,
        };
        let pin = self.ast.types.pin(wanted);
        Ok(if safe { pin } else { self.ast.types.optional(pin) })
    }
}
