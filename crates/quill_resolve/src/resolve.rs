use quill_ast::*;
use tracing::debug;

use crate::{ResolveError, ResolveErrorKind, ResolveResult, flatten};

/// What an identifier turned out to denote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Local(VarId),
    Field(VarId),
    Method(MethodId),
    Param(ParamId),
    Class(ClassId),
    Function(FnId),
}

impl Binding {
    fn role(self) -> &'static str {
        match self {
            Binding::Local(_) => "variable",
            Binding::Field(_) => "field",
            Binding::Method(_) => "method",
            Binding::Param(_) => "class parameter",
            Binding::Class(_) => "class",
            Binding::Function(_) => "function",
        }
    }
}

pub(crate) struct Resolver<'a> {
    ast: &'a mut Ast,
    /// Module whose global scope applies
    module: ModuleId,
    class: Option<ClassId>,
    /// Parameters, locals and bindings in scope, innermost last
    locals: Vec<VarId>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(ast: &'a mut Ast) -> Self {
        Self {
            ast,
            module: ModuleId(0),
            class: None,
            locals: Vec::new(),
        }
    }

    pub(crate) fn run(mut self) -> ResolveResult<()> {
        self.register_globals()?;
        for class in self.ast.class_ids() {
            self.resolve_header(class)?;
        }
        let classes = self.ast.class_ids();
        flatten(self.ast, classes)?;
        for class in self.ast.class_ids() {
            self.bind_overrides(class)?;
        }
        for class in self.ast.class_ids() {
            self.resolve_class(class)?;
        }
        for function in self.ast.function_ids() {
            self.resolve_function(function)?;
        }
        debug!(
            classes = self.ast.classes.len(),
            functions = self.ast.functions.len(),
            "names resolved"
        );
        Ok(())
    }

    fn error(&self, kind: ResolveErrorKind, loc: Location) -> ResolveError {
        ResolveError::new(kind, loc)
    }

    fn display(&self, name: NameId) -> String {
        self.ast.names.display(name)
    }

    fn enter_class(&mut self, class: ClassId) {
        self.class = Some(class);
        self.module = self.ast.class(class).module;
    }

    // === Pre-pass ===

    fn register_globals(&mut self) -> ResolveResult<()> {
        let mut entries = Vec::new();
        for module in &self.ast.modules {
            for class in &module.classes {
                let def = self.ast.class(*class);
                entries.push((def.name, Global::Class(*class), def.loc));
            }
            for function in &module.functions {
                let def = self.ast.function(*function);
                entries.push((def.name, Global::Function(*function), def.loc));
            }
        }
        for (name, global, loc) in entries {
            if let Some(previous) = self.ast.globals.insert(name, global) {
                if previous != global {
                    let name = self.display(name);
                    return Err(self.error(ResolveErrorKind::DuplicateMember { name }, loc));
                }
            }
        }
        Ok(())
    }

    /// Parameter bounds and base references
    fn resolve_header(&mut self, class: ClassId) -> ResolveResult<()> {
        self.enter_class(class);
        for param in self.ast.class(class).params.clone() {
            let def = self.ast.param(param);
            let Some(bound_ref) = def.bound_ref else {
                continue;
            };
            let loc = def.loc;
            let invalid = ResolveError::new(
                ResolveErrorKind::InvalidBound {
                    param: self.ast.names.segment(def.name).to_string(),
                },
                loc,
            );
            let inst = match self.resolve_type_ref(bound_ref) {
                Ok(inst) => inst,
                Err(ResolveError { kind: ResolveErrorKind::ArityMismatch { .. }, .. }) => {
                    return Err(invalid);
                }
                Err(e) => return Err(e),
            };
            let instance = self.ast.instances.get(inst);
            let bound = match instance.target {
                InstanceTarget::Class(c) if instance.params.is_empty() && self.ast.class(c).params.is_empty() => c,
                _ => return Err(invalid),
            };
            self.ast.params[param.index()].bound = Some(bound);
        }

        let references: Vec<_> = self.ast.class(class).bases.iter().map(|b| b.reference).collect();
        for (index, reference) in references.into_iter().enumerate() {
            let inst = self.resolve_type_ref(reference)?;
            self.ast.class_mut(class).bases[index].instance = Some(inst);
        }
        self.class = None;
        Ok(())
    }

    /// Point every `+Base { m() … }` overload at the base member it replaces
    fn bind_overrides(&mut self, class: ClassId) -> ResolveResult<()> {
        for decl in self.ast.class(class).bases.clone() {
            let Some(base) = decl.instance.and_then(|i| self.ast.instance_class(i)) else {
                continue;
            };
            for method in decl.overloads {
                let (name, loc) = (self.ast.method(method).name, self.ast.method(method).loc);
                let target = match self.ast.class(base).members.lookup(name) {
                    MemberLookup::None => {
                        let name = self.display(name);
                        return Err(self.error(ResolveErrorKind::UnresolvedName { name }, loc));
                    }
                    MemberLookup::Many(_) => {
                        let kind = ResolveErrorKind::AmbiguousInheritance {
                            class: self.display(self.ast.class(class).name),
                            base: self.display(self.ast.class(base).name),
                        };
                        return Err(self.error(kind, loc));
                    }
                    MemberLookup::One(entry) => match entry.member {
                        Member::Method(m) => m,
                        Member::Field(_) => {
                            let kind = ResolveErrorKind::ConflictingRole {
                                name: self.display(name),
                                role: "field",
                                expected: "method",
                            };
                            return Err(self.error(kind, loc));
                        }
                    },
                };
                self.ast.method_mut(method).overrides = Some(target);
            }
        }
        Ok(())
    }

    // === Bodies ===

    fn resolve_class(&mut self, class: ClassId) -> ResolveResult<()> {
        self.enter_class(class);
        for field in self.ast.class(class).fields.clone() {
            self.locals.clear();
            if let Some(init) = self.ast.var(field).init {
                self.visit(init)?;
            }
        }
        let def = self.ast.class(class);
        let methods: Vec<MethodId> = def
            .methods
            .iter()
            .copied()
            .chain(def.bases.iter().flat_map(|b| b.overloads.iter().copied()))
            .collect();
        for method in methods {
            let def = self.ast.method(method);
            let (params, result, body) = (def.params.clone(), def.result, def.body);
            self.resolve_callable(&params, result, body)?;
        }
        self.class = None;
        Ok(())
    }

    fn resolve_function(&mut self, function: FnId) -> ResolveResult<()> {
        let def = self.ast.function(function);
        let (params, result, body) = (def.params.clone(), def.result, def.body);
        self.module = def.module;
        self.class = None;
        self.resolve_callable(&params, result, body)
    }

    fn resolve_callable(
        &mut self,
        params: &[VarId],
        result: Option<ActionId>,
        body: Option<ActionId>,
    ) -> ResolveResult<()> {
        self.locals.clear();
        for param in params {
            let var = self.ast.var(*param);
            let (name, loc, declared) = (var.name, var.loc, var.init);
            if let Some(declared) = declared {
                self.visit(declared)?;
            }
            if self.locals.iter().any(|v| self.ast.var(*v).name == name) {
                let name = self.display(name);
                return Err(self.error(ResolveErrorKind::DuplicateMember { name }, loc));
            }
            self.locals.push(*param);
        }
        if let Some(result) = result {
            self.visit(result)?;
        }
        if let Some(body) = body {
            self.visit(body)?;
        }
        self.locals.clear();
        Ok(())
    }

    fn visit(&mut self, id: ActionId) -> ResolveResult<()> {
        let loc = self.ast.action(id).loc;
        match self.ast.action(id).kind.clone() {
            ActionKind::Name(name) => {
                let binding = self.lookup(name, loc)?;
                let kind = self.read_binding(name, binding, loc)?;
                self.ast.action_mut(id).kind = kind;
            }
            ActionKind::SetName { name, value } => {
                self.visit(value)?;
                let kind = match self.lookup(name, loc)? {
                    Binding::Local(var) => ActionKind::SetVar { var, value },
                    Binding::Field(field) => ActionKind::SetField {
                        base: None,
                        name,
                        field: Some(field),
                        value,
                    },
                    other => {
                        let kind = ResolveErrorKind::ConflictingRole {
                            name: self.display(name),
                            role: other.role(),
                            expected: "variable",
                        };
                        return Err(self.error(kind, loc));
                    }
                };
                self.ast.action_mut(id).kind = kind;
            }
            ActionKind::Call { callee, args } => {
                for arg in &args {
                    self.visit(*arg)?;
                }
                self.visit_call(id, callee, args)?;
            }
            ActionKind::MakeInstance { .. } => {
                self.resolve_type_ref(id)?;
            }
            ActionKind::Local { var, body } => {
                if let Some(init) = self.ast.var(var).init {
                    self.visit(init)?;
                }
                let depth = self.locals.len();
                self.locals.push(var);
                for stmt in body {
                    self.visit(stmt)?;
                }
                self.locals.truncate(depth);
            }
            ActionKind::If { cond, then, binding } => {
                self.visit(cond)?;
                self.locals.push(binding);
                self.visit(then)?;
                self.locals.pop();
            }
            ActionKind::Lambda(lambda) => {
                let def = self.ast.lambda(lambda);
                let (params, body) = (def.params.clone(), def.body);
                let depth = self.locals.len();
                for param in params {
                    if let Some(declared) = self.ast.var(param).init {
                        self.visit(declared)?;
                    }
                    self.locals.push(param);
                }
                self.visit(body)?;
                self.locals.truncate(depth);
            }
            ActionKind::GetThis if self.class.is_none() => {
                return Err(self.error(ResolveErrorKind::ThisOutsideClass, loc));
            }
            kind => {
                for child in kind.children() {
                    self.visit(child)?;
                }
            }
        }
        Ok(())
    }

    fn visit_call(&mut self, id: ActionId, callee: ActionId, args: Vec<ActionId>) -> ResolveResult<()> {
        let ActionKind::Name(name) = self.ast.action(callee).kind else {
            return self.visit(callee);
        };
        let loc = self.ast.action(id).loc;
        let callee_loc = self.ast.action(callee).loc;
        let kind = match self.lookup(name, callee_loc)? {
            Binding::Class(class) => {
                let params = args
                    .iter()
                    .map(|arg| self.type_arg(*arg))
                    .collect::<ResolveResult<Vec<_>>>()?;
                let instance = self.instantiate(InstanceTarget::Class(class), params, loc)?;
                ActionKind::MakeInstance {
                    name,
                    target: Some(ClassTarget::Class(class)),
                    params: args,
                    instance: Some(instance),
                }
            }
            Binding::Param(_) => {
                return Err(self.error(ResolveErrorKind::ParameterizedParam, loc));
            }
            Binding::Method(method) => ActionKind::CallMethod {
                receiver: None,
                method,
                args,
                dispatch: Dispatch::Unresolved,
            },
            Binding::Function(function) => ActionKind::CallFunction { function, args },
            other => {
                // calling a variable holding a lambda or function reference
                let kind = self.read_binding(name, other, callee_loc)?;
                self.ast.action_mut(callee).kind = kind;
                return Ok(());
            }
        };
        self.ast.action_mut(id).kind = kind;
        Ok(())
    }

    fn read_binding(&mut self, name: NameId, binding: Binding, loc: Location) -> ResolveResult<ActionKind> {
        Ok(match binding {
            Binding::Local(var) => ActionKind::GetVar(var),
            Binding::Field(field) => ActionKind::GetField {
                base: None,
                name,
                field: Some(field),
            },
            Binding::Method(method) => ActionKind::MakeDelegate { receiver: None, method },
            Binding::Function(function) => ActionKind::FunctionRef(function),
            Binding::Class(class) => {
                let instance = self.instantiate(InstanceTarget::Class(class), Vec::new(), loc)?;
                ActionKind::MakeInstance {
                    name,
                    target: Some(ClassTarget::Class(class)),
                    params: Vec::new(),
                    instance: Some(instance),
                }
            }
            Binding::Param(param) => ActionKind::MakeInstance {
                name,
                target: Some(ClassTarget::Param(param)),
                params: Vec::new(),
                instance: Some(self.ast.instances.plain(InstanceTarget::Param(param))),
            },
        })
    }

    // === Type references ===

    fn type_arg(&self, arg: ActionId) -> ResolveResult<InstanceId> {
        match self.ast.action(arg).kind {
            ActionKind::MakeInstance { instance: Some(instance), .. } => Ok(instance),
            _ => Err(self.error(ResolveErrorKind::ExpectedTypeName, self.ast.action(arg).loc)),
        }
    }

    fn instantiate(&mut self, target: InstanceTarget, params: Vec<InstanceId>, loc: Location) -> ResolveResult<InstanceId> {
        if let InstanceTarget::Class(class) = target {
            let expected = self.ast.class(class).params.len();
            if expected != params.len() {
                let kind = ResolveErrorKind::ArityMismatch {
                    class: self.display(self.ast.class(class).name),
                    expected,
                    actual: params.len(),
                };
                return Err(self.error(kind, loc));
            }
        }
        self.ast
            .instances
            .intern(Instance { target, params })
            .map_err(|_| ResolveError::new(ResolveErrorKind::ParameterizedParam, loc))
    }

    /// Bind a `MakeInstance` in type position and intern its instantiation
    fn resolve_type_ref(&mut self, id: ActionId) -> ResolveResult<InstanceId> {
        let loc = self.ast.action(id).loc;
        let ActionKind::MakeInstance { name, params, instance, .. } = self.ast.action(id).kind.clone() else {
            return Err(self.error(ResolveErrorKind::ExpectedTypeName, loc));
        };
        if let Some(instance) = instance {
            return Ok(instance);
        }
        let target = self.lookup_type_name(name, loc)?;
        let args = params
            .iter()
            .map(|p| self.resolve_type_ref(*p))
            .collect::<ResolveResult<Vec<_>>>()?;
        let instance = self.instantiate(target.into(), args, loc)?;
        self.ast.action_mut(id).kind = ActionKind::MakeInstance {
            name,
            target: Some(target),
            params,
            instance: Some(instance),
        };
        Ok(instance)
    }

    fn lookup_type_name(&self, name: NameId, loc: Location) -> ResolveResult<ClassTarget> {
        if !self.ast.names.is_qualified(name) {
            if let Some(param) = self.class_param(name) {
                return Ok(ClassTarget::Param(param));
            }
        }
        match self.lookup_global(name, loc)? {
            Global::Class(class) => Ok(ClassTarget::Class(class)),
            Global::Function(_) => {
                let kind = ResolveErrorKind::ConflictingRole {
                    name: self.display(name),
                    role: "function",
                    expected: "class",
                };
                Err(self.error(kind, loc))
            }
        }
    }

    // === Lookup ===

    fn class_param(&self, name: NameId) -> Option<ParamId> {
        let class = self.class?;
        self.ast
            .class(class)
            .params
            .iter()
            .copied()
            .find(|p| self.ast.param(*p).name == name)
    }

    fn lookup(&self, name: NameId, loc: Location) -> ResolveResult<Binding> {
        if !self.ast.names.is_qualified(name) {
            if let Some(var) = self.locals.iter().rev().find(|v| self.ast.var(**v).name == name) {
                return Ok(Binding::Local(*var));
            }
            if let Some(class) = self.class {
                let member = match self.ast.class(class).members.lookup(name) {
                    MemberLookup::None => None,
                    MemberLookup::One(entry) => Some(entry.member),
                    MemberLookup::Many(_) => {
                        let name = self.display(name);
                        return Err(self.error(ResolveErrorKind::AmbiguousMember { name }, loc));
                    }
                };
                match (self.class_param(name), member) {
                    (Some(_), Some(_)) => {
                        let kind = ResolveErrorKind::AmbiguousName {
                            name: self.display(name),
                            candidates: "class parameter, member".to_string(),
                        };
                        return Err(self.error(kind, loc));
                    }
                    (Some(param), None) => return Ok(Binding::Param(param)),
                    (None, Some(Member::Field(field))) => return Ok(Binding::Field(field)),
                    (None, Some(Member::Method(method))) => return Ok(Binding::Method(method)),
                    (None, None) => {}
                }
            }
        }
        Ok(match self.lookup_global(name, loc)? {
            Global::Class(class) => Binding::Class(class),
            Global::Function(function) => Binding::Function(function),
        })
    }

    /// Qualified names directly, unqualified ones in the current module and its imports
    fn lookup_global(&self, name: NameId, loc: Location) -> ResolveResult<Global> {
        let unresolved = || {
            let name = self.display(name);
            self.error(ResolveErrorKind::UnresolvedName { name }, loc)
        };
        if self.ast.names.is_qualified(name) {
            return self.ast.globals.get(&name).copied().ok_or_else(unresolved);
        }

        let segment = self.ast.names.segment(name);
        let module = self.ast.module(self.module);
        let scopes = std::iter::once(module.name).chain(module.imports.iter().map(|i| i.name));
        let mut found: Vec<(NameId, Global)> = Vec::new();
        for scope in scopes {
            let Some(qualified) = self.ast.names.peek(Some(scope), segment) else {
                continue;
            };
            if let Some(global) = self.ast.globals.get(&qualified) {
                if !found.iter().any(|(_, g)| g == global) {
                    found.push((qualified, *global));
                }
            }
        }
        match found.as_slice() {
            [] => Err(unresolved()),
            [(_, global)] => Ok(*global),
            many => {
                let candidates = many
                    .iter()
                    .map(|(n, _)| self.display(*n))
                    .collect::<Vec<_>>()
                    .join(", ");
                let kind = ResolveErrorKind::AmbiguousName {
                    name: segment.to_string(),
                    candidates,
                };
                Err(self.error(kind, loc))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;
    use quill_ast::*;
    use quill_parser::{parse_program, parse_source};

    use crate::{ResolveErrorKind, ResolveResult, flatten, resolve_names};

    fn resolve(src: &str) -> ResolveResult<Ast> {
        let mut ast = Ast::new();
        parse_source(&mut ast, "test", src).unwrap();
        resolve_names(&mut ast)?;
        Ok(ast)
    }

    fn resolve_err(src: &str) -> ResolveErrorKind {
        resolve(src).unwrap_err().kind
    }

    fn entry_stmts(ast: &Ast) -> Vec<ActionId> {
        let entry = ast.modules[0].entry.unwrap();
        match &ast.action(ast.function(entry).body.unwrap()).kind {
            ActionKind::Block(stmts) => stmts.clone(),
            other => panic!("entry is not a block: {:?}", other),
        }
    }

    fn local_body(ast: &Ast, id: ActionId) -> Vec<ActionId> {
        match &ast.action(id).kind {
            ActionKind::Local { body, .. } => body.clone(),
            other => panic!("expected a local, got {:?}", other),
        }
    }

    fn class_named(ast: &Ast, name: &str) -> ClassId {
        ast.class_ids()
            .find(|c| ast.names.segment(ast.class(*c).name) == name)
            .unwrap()
    }

    fn method_named(ast: &Ast, name: &str) -> MethodId {
        (0..ast.methods.len())
            .map(MethodId::new)
            .find(|m| ast.names.segment(ast.method(*m).name) == name)
            .unwrap()
    }

    fn block_stmts(ast: &Ast, id: ActionId) -> Vec<ActionId> {
        match &ast.action(id).kind {
            ActionKind::Block(stmts) => stmts.clone(),
            other => panic!("expected a block, got {:?}", other),
        }
    }

    const DIAMOND: &str = "
        interface Shape { area() int; }
        interface Named { +Shape }
        interface Sized { +Shape }
        class Square { +Named +Sized side = 2; }
        class Base { v = 1; }
        class Derived { +Base v = 2; }
    ";

    #[test]
    fn test_name_rewrites() {
        let ast = resolve(
            "fn f(int a) int { a }
             class Point { x = 1; y = 2; sum() int { x + y } }
             p = Point;
             p.x + f(3)",
        )
        .unwrap();
        let stmts = entry_stmts(&ast);
        let ActionKind::Local { var, body } = &ast.action(stmts[0]).kind else {
            panic!("expected a local");
        };
        let init = ast.var(*var).init.unwrap();
        assert!(matches!(
            ast.action(init).kind,
            ActionKind::MakeInstance { target: Some(ClassTarget::Class(_)), instance: Some(_), .. }
        ));
        let ActionKind::Binary { lhs, rhs, .. } = ast.action(body[0]).kind else {
            panic!("expected a binary");
        };
        let ActionKind::GetField { base: Some(base), .. } = ast.action(lhs).kind else {
            panic!("expected a field read");
        };
        assert!(matches!(ast.action(base).kind, ActionKind::GetVar(v) if v == *var));
        assert_eq!(ast.action(rhs).kind.label(), "CallFunction");

        let sum = ast.method(method_named(&ast, "sum")).body.unwrap();
        let stmts = block_stmts(&ast, sum);
        let ActionKind::Binary { lhs, rhs, .. } = ast.action(stmts[0]).kind else {
            panic!("expected a binary");
        };
        for side in [lhs, rhs] {
            assert!(matches!(
                ast.action(side).kind,
                ActionKind::GetField { base: None, field: Some(_), .. }
            ));
        }
    }

    #[test]
    fn test_locals_shadow_members() {
        let ast = resolve("class Point { x = 1; get(int x) int { x } }").unwrap();
        let body = ast.method(method_named(&ast, "get")).body.unwrap();
        let stmts = block_stmts(&ast, body);
        let param = ast.method(method_named(&ast, "get")).params[0];
        assert!(matches!(ast.action(stmts[0]).kind, ActionKind::GetVar(v) if v == param));
    }

    #[test]
    fn test_lambda_params_and_calls() {
        let ast = resolve("f = (a, b) { a + b }; f(1, 2)").unwrap();
        let stmts = entry_stmts(&ast);
        let body = local_body(&ast, stmts[0]);
        let ActionKind::Call { callee, .. } = ast.action(body[0]).kind else {
            panic!("expected a call");
        };
        assert_eq!(ast.action(callee).kind.label(), "GetVar");
        let lambda = &ast.lambdas[0];
        let stmts = block_stmts(&ast, lambda.body);
        let ActionKind::Binary { lhs, rhs, .. } = ast.action(stmts[0]).kind else {
            panic!("expected a binary");
        };
        assert!(matches!(ast.action(lhs).kind, ActionKind::GetVar(v) if v == lambda.params[0]));
        assert!(matches!(ast.action(rhs).kind, ActionKind::GetVar(v) if v == lambda.params[1]));
    }

    #[test]
    fn test_generic_instances_are_shared() {
        let ast = resolve(
            "class Point { x = 0; }
             class Stack(T) { top = 0; }
             a = Stack(Point);
             b = Stack(Point);",
        )
        .unwrap();
        let stack = class_named(&ast, "Stack");
        let point = class_named(&ast, "Point");
        let instances: Vec<InstanceId> = ast
            .actions
            .iter()
            .filter_map(|a| match a.kind {
                ActionKind::MakeInstance { target: Some(ClassTarget::Class(c)), instance, .. } if c == stack => instance,
                _ => None,
            })
            .collect();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0], instances[1]);
        let params = &ast.instances.get(instances[0]).params;
        assert_eq!(params.len(), 1);
        assert_eq!(ast.instances.get(params[0]).target, InstanceTarget::Class(point));
    }

    #[test]
    fn test_generic_class_needs_params() {
        assert_eq!(
            resolve_err("class Stack(T) { top = 0; } s = Stack;"),
            ResolveErrorKind::ArityMismatch { class: "test::Stack".into(), expected: 1, actual: 0 }
        );
    }

    #[test]
    fn test_type_args_must_be_types() {
        assert_eq!(
            resolve_err("class Stack(T) { top = 0; } s = Stack(1);"),
            ResolveErrorKind::ExpectedTypeName
        );
    }

    #[test]
    fn test_param_cannot_be_parameterized() {
        assert_eq!(
            resolve_err("class Point { x = 0; } class Box(T) { make() { T(Point) } }"),
            ResolveErrorKind::ParameterizedParam
        );
    }

    #[test]
    fn test_unresolved_name() {
        assert_eq!(resolve_err("x + 1"), ResolveErrorKind::UnresolvedName { name: "x".into() });
    }

    #[test]
    fn test_assigning_class_conflicts() {
        assert_eq!(
            resolve_err("class Point { x = 0; } Point := 1;"),
            ResolveErrorKind::ConflictingRole { name: "Point".into(), role: "class", expected: "variable" }
        );
    }

    #[test]
    fn test_duplicates() {
        assert_eq!(
            resolve_err("class Point { x = 0; x = 1; }"),
            ResolveErrorKind::DuplicateMember { name: "x".into() }
        );
        assert_eq!(
            resolve_err("class A { } class A { }"),
            ResolveErrorKind::DuplicateMember { name: "test::A".into() }
        );
        assert_eq!(
            resolve_err("fn f(int a, int a) int { a }"),
            ResolveErrorKind::DuplicateMember { name: "a".into() }
        );
    }

    #[test]
    fn test_inheritance_errors() {
        assert!(matches!(
            resolve_err("class A { +B } class B { +A }"),
            ResolveErrorKind::SelfInheritance { .. }
        ));
        assert_eq!(
            resolve_err("class A { a = 0; } class B { b = 0; } class C { +A +B }"),
            ResolveErrorKind::MultipleConcreteBases { class: "test::C".into() }
        );
        assert_eq!(
            resolve_err("class A { a = 0; } interface I { +A }"),
            ResolveErrorKind::InterfaceExtendsClass { class: "test::I".into(), base: "test::A".into() }
        );
        assert_eq!(
            resolve_err("interface I { m() int; } class C { +I +I }"),
            ResolveErrorKind::AmbiguousInheritance { class: "test::C".into(), base: "test::I".into() }
        );
    }

    #[test]
    fn test_diamond_and_shadowing() {
        let ast = resolve(DIAMOND).unwrap();
        let square = class_named(&ast, "Square");
        let area = ast.names.peek(None, "area").unwrap();
        let MemberLookup::One(entry) = ast.class(square).members.lookup(area) else {
            panic!("area should be reachable once");
        };
        assert_eq!(entry.path.len(), 2);
        assert_eq!(ast.class(square).ancestors.len(), 3);

        let derived = class_named(&ast, "Derived");
        let v = ast.names.peek(None, "v").unwrap();
        let MemberLookup::One(entry) = ast.class(derived).members.lookup(v) else {
            panic!("own member should shadow the inherited one");
        };
        assert!(entry.path.is_empty());
        assert_eq!(entry.member, Member::Field(ast.class(derived).fields[0]));
    }

    #[test]
    fn test_flatten_idempotent_and_order_independent() {
        let mut ast = resolve(DIAMOND).unwrap();
        let tables = |ast: &Ast| ast.classes.iter().map(|c| c.members.clone()).collect::<Vec<_>>();
        let before = tables(&ast);
        let ids: Vec<ClassId> = ast.class_ids().collect();

        flatten(&mut ast, ids.clone()).unwrap();
        assert_eq!(tables(&ast), before);

        for class in &mut ast.classes {
            class.members.clear();
            class.ancestors.clear();
            class.flattened = false;
        }
        flatten(&mut ast, ids.into_iter().rev()).unwrap();
        assert_eq!(tables(&ast), before);
    }

    #[test]
    fn test_imported_names() {
        let files: HashMap<&str, &str> = HashMap::from([
            ("geom", "module geom; class Point { x = 0; }"),
            ("draw", "module draw; class Point { y = 0; }"),
            ("app", "module app; using geom; using draw; p = geom::Point;"),
            ("clash", "module clash; using geom; using draw; p = Point;"),
        ]);
        let load = |root: &str| {
            let mut ast = Ast::new();
            parse_program(&mut ast, root, &mut |name: &str| files.get(name).map(|s| s.to_string())).unwrap();
            let result = resolve_names(&mut ast);
            (ast, result)
        };

        let (ast, result) = load("app");
        result.unwrap();
        let geom_point = ast.globals[&ast.names.peek(ast.names.peek(None, "geom"), "Point").unwrap()];
        let target = ast.actions.iter().find_map(|a| match a.kind {
            ActionKind::MakeInstance { target: Some(ClassTarget::Class(c)), .. } => Some(c),
            _ => None,
        });
        assert_eq!(target.map(Global::Class), Some(geom_point));

        let (_, result) = load("clash");
        assert!(matches!(
            result.unwrap_err().kind,
            ResolveErrorKind::AmbiguousName { name, .. } if name == "Point"
        ));
    }

    #[test]
    fn test_member_call_vs_qualified_function() {
        let ast = resolve(
            "fn m() int { 1 }
             class C { m() int { 2 } run() int { m() + test::m() } }",
        )
        .unwrap();
        let run = ast.method(method_named(&ast, "run")).body.unwrap();
        let stmts = block_stmts(&ast, run);
        let ActionKind::Binary { lhs, rhs, .. } = ast.action(stmts[0]).kind else {
            panic!("expected a binary");
        };
        assert!(matches!(
            ast.action(lhs).kind,
            ActionKind::CallMethod { receiver: None, dispatch: Dispatch::Unresolved, .. }
        ));
        assert_eq!(ast.action(rhs).kind.label(), "CallFunction");
    }

    #[test]
    fn test_override_binding() {
        let ast = resolve("interface Shape { area() int; } class Square { +Shape { area() int { 4 } } }").unwrap();
        let square = class_named(&ast, "Square");
        let overload = ast.class(square).bases[0].overloads[0];
        let shape = class_named(&ast, "Shape");
        assert_eq!(ast.method(overload).overrides, Some(ast.class(shape).methods[0]));

        assert_eq!(
            resolve_err("interface Shape { area() int; } class Square { +Shape { side() int { 4 } } }"),
            ResolveErrorKind::UnresolvedName { name: "side".into() }
        );
    }

    #[test]
    fn test_param_bounds() {
        let ast = resolve("class Point { x = 0; } class Box(T: Point) { item = 0; }").unwrap();
        let point = class_named(&ast, "Point");
        assert_eq!(ast.params[0].bound, Some(point));

        assert_eq!(
            resolve_err("class Stack(T) { a = 0; } class Box(U: Stack) { item = 0; }"),
            ResolveErrorKind::InvalidBound { param: "U".into() }
        );
    }

    #[test]
    fn test_this_outside_class() {
        assert_eq!(resolve_err("this"), ResolveErrorKind::ThisOutsideClass);
    }
}
