//! Entity model shared by the parser, the name resolver and the type checker.
//!
//! Every entity lives in one [`Ast`] arena and refers to others through
//! plain handles. Handles never own their targets; the arena outlives them all.

use std::collections::HashMap;

pub use quill_lexer::Span;

macro_rules! entity_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);

            impl $name {
                pub fn new(index: usize) -> Self {
                    Self(index as u32)
                }

                pub fn index(self) -> usize {
                    self.0 as usize
                }
            }
        )*
    };
}

entity_id!(
    /// Interned hierarchical name
    NameId,
    /// Loaded module
    ModuleId,
    /// Class or interface
    ClassId,
    /// Generic class parameter
    ParamId,
    /// Field, parameter, local or binding
    VarId,
    /// Class method
    MethodId,
    /// Free function, including module entry blocks
    FnId,
    /// Lambda literal
    LambdaId,
    /// Expression node
    ActionId,
    /// Interned type
    TypeId,
    /// Interned class instantiation
    InstanceId,
    /// Shared placeholder for lambdas with unannotated parameters
    ColdId,
);

mod action;
mod class;
mod instance;
mod name;
mod print;
mod types;

pub use action::*;
pub use class::*;
pub use instance::*;
pub use name::*;
pub use types::*;

/// Source position of an entity: the module it was parsed from and its byte span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub module: Option<ModuleId>,
    pub span: Span,
}

impl Location {
    pub fn new(module: ModuleId, span: Span) -> Self {
        Self { module: Some(module), span }
    }
}

/// A `using name.version;` declaration
#[derive(Debug, Clone)]
pub struct Import {
    pub name: NameId,
    pub version: u64,
    pub module: Option<ModuleId>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Module {
    pub name: NameId,
    pub version: u64,
    pub imports: Vec<Import>,
    pub classes: Vec<ClassId>,
    pub functions: Vec<FnId>,
    /// Top-level statements gathered into a parameterless function
    pub entry: Option<FnId>,
}

/// What a module-qualified global name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Global {
    Class(ClassId),
    Function(FnId),
}

/// Field, parameter, local or binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Field(ClassId),
    Param,
    Local,
    /// `_` bound to the unwrapped condition of an `If`
    Binding,
}

#[derive(Debug, Clone)]
pub struct Var {
    pub name: NameId,
    pub kind: VarKind,
    /// Value for fields and locals, declared-type expression for parameters
    pub init: Option<ActionId>,
    pub ty: TypeSlot,
    pub loc: Location,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub name: NameId,
    pub class: ClassId,
    pub params: Vec<VarId>,
    pub result: Option<ActionId>,
    /// `None` for abstract interface methods
    pub body: Option<ActionId>,
    /// Index into the owning class bases when this method is an overload
    pub base: Option<usize>,
    /// Base method this overload replaces, bound by the resolver
    pub overrides: Option<MethodId>,
    /// Signature type, filled by the checker
    pub ty: TypeSlot,
    pub loc: Location,
}

impl Method {
    pub fn is_abstract(&self) -> bool {
        self.body.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: NameId,
    pub module: ModuleId,
    pub params: Vec<VarId>,
    pub result: Option<ActionId>,
    pub body: Option<ActionId>,
    /// Declared without a body; implemented by the runtime
    pub is_platform: bool,
    pub ty: TypeSlot,
    pub loc: Location,
}

#[derive(Debug, Clone)]
pub struct LambdaDef {
    pub params: Vec<VarId>,
    pub body: ActionId,
    /// Class whose `this` the body may capture
    pub class: Option<ClassId>,
    pub cold: Option<ColdId>,
}

impl LambdaDef {
    pub fn is_annotated(&self, ast: &Ast) -> bool {
        self.params.iter().all(|p| ast.var(*p).init.is_some())
    }
}

/// Compilation context owning every entity and canonicalization table
#[derive(Debug)]
pub struct Ast {
    pub names: NameTable,
    pub modules: Vec<Module>,
    pub classes: Vec<ClassDef>,
    pub params: Vec<ClassParamDef>,
    pub vars: Vec<Var>,
    pub methods: Vec<Method>,
    pub functions: Vec<Function>,
    pub lambdas: Vec<LambdaDef>,
    pub actions: Vec<Action>,
    pub globals: HashMap<NameId, Global>,
    pub types: TypeTable,
    pub instances: InstanceTable,
    pub colds: ColdTable,
}

impl Default for Ast {
    fn default() -> Self {
        Self::new()
    }
}

impl Ast {
    pub fn new() -> Self {
        Self {
            names: NameTable::new(),
            modules: Vec::new(),
            classes: Vec::new(),
            params: Vec::new(),
            vars: Vec::new(),
            methods: Vec::new(),
            functions: Vec::new(),
            lambdas: Vec::new(),
            actions: Vec::new(),
            globals: HashMap::new(),
            types: TypeTable::new(),
            instances: InstanceTable::new(),
            colds: ColdTable::default(),
        }
    }

    // === Arena insertion ===

    pub fn add_action(&mut self, kind: ActionKind, loc: Location) -> ActionId {
        let id = ActionId::new(self.actions.len());
        self.actions.push(Action { kind, loc, ty: TypeSlot::Empty });
        id
    }

    pub fn add_var(&mut self, name: NameId, kind: VarKind, init: Option<ActionId>, loc: Location) -> VarId {
        let id = VarId::new(self.vars.len());
        self.vars.push(Var { name, kind, init, ty: TypeSlot::Empty, loc });
        id
    }

    pub fn add_module(&mut self, module: Module) -> ModuleId {
        let id = ModuleId::new(self.modules.len());
        self.modules.push(module);
        id
    }

    pub fn add_class(&mut self, class: ClassDef) -> ClassId {
        let id = ClassId::new(self.classes.len());
        self.classes.push(class);
        id
    }

    pub fn add_param(&mut self, param: ClassParamDef) -> ParamId {
        let id = ParamId::new(self.params.len());
        self.params.push(param);
        id
    }

    pub fn add_method(&mut self, method: Method) -> MethodId {
        let id = MethodId::new(self.methods.len());
        self.methods.push(method);
        id
    }

    pub fn add_function(&mut self, function: Function) -> FnId {
        let id = FnId::new(self.functions.len());
        self.functions.push(function);
        id
    }

    pub fn add_lambda(&mut self, lambda: LambdaDef) -> LambdaId {
        let id = LambdaId::new(self.lambdas.len());
        self.lambdas.push(lambda);
        id
    }

    // === Arena access ===

    pub fn action(&self, id: ActionId) -> &Action {
        &self.actions[id.index()]
    }

    pub fn action_mut(&mut self, id: ActionId) -> &mut Action {
        &mut self.actions[id.index()]
    }

    pub fn var(&self, id: VarId) -> &Var {
        &self.vars[id.index()]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut Var {
        &mut self.vars[id.index()]
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.index()]
    }

    pub fn class(&self, id: ClassId) -> &ClassDef {
        &self.classes[id.index()]
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut ClassDef {
        &mut self.classes[id.index()]
    }

    pub fn param(&self, id: ParamId) -> &ClassParamDef {
        &self.params[id.index()]
    }

    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.index()]
    }

    pub fn method_mut(&mut self, id: MethodId) -> &mut Method {
        &mut self.methods[id.index()]
    }

    pub fn function(&self, id: FnId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FnId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    pub fn lambda(&self, id: LambdaId) -> &LambdaDef {
        &self.lambdas[id.index()]
    }

    pub fn lambda_mut(&mut self, id: LambdaId) -> &mut LambdaDef {
        &mut self.lambdas[id.index()]
    }

    pub fn module_by_name(&self, name: NameId) -> Option<ModuleId> {
        self.modules
            .iter()
            .position(|m| m.name == name)
            .map(ModuleId::new)
    }

    pub fn class_ids(&self) -> impl Iterator<Item = ClassId> + use<> {
        (0..self.classes.len()).map(ClassId::new)
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FnId> + use<> {
        (0..self.functions.len()).map(FnId::new)
    }

    /// Instance of `class` parameterized by its own formal parameters
    pub fn this_instance(&mut self, class: ClassId) -> InstanceId {
        let params = self.class(class).params.clone();
        let params = params
            .into_iter()
            .map(|p| self.instances.plain(InstanceTarget::Param(p)))
            .collect();
        self.instances.intern_unchecked(Instance {
            target: InstanceTarget::Class(class),
            params,
        })
    }

    /// Class an instance refers to, looking through a bounded parameter
    pub fn instance_class(&self, inst: InstanceId) -> Option<ClassId> {
        match self.instances.get(inst).target {
            InstanceTarget::Class(c) => Some(c),
            InstanceTarget::Param(p) => self.param(p).bound,
        }
    }

    /// `true` when `class` is `ancestor` or transitively derives from it
    pub fn derives_from(&self, class: ClassId, ancestor: ClassId) -> bool {
        class == ancestor || self.class(class).ancestors.contains(&ancestor)
    }
}
