//! Expression nodes

use crate::{
    ActionId, ClassId, FnId, InstanceId, InstanceTarget, LambdaId, Location, MethodId, NameId,
    ParamId, TypeSlot, VarId,
};

#[derive(Debug, Clone)]
pub struct Action {
    pub kind: ActionKind,
    pub loc: Location,
    pub ty: TypeSlot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Lt,
    LogAnd,
    LogOr,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Eq => "==",
            BinOp::Lt => "<",
            BinOp::LogAnd => "&&",
            BinOp::LogOr => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    ToInt,
    ToFloat,
}

/// How a method call reaches its implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Unresolved,
    /// Through the class vtable
    Virtual,
    /// Through the interface table of the given interface
    Interface(ClassId),
}

/// Resolved target of a `MakeInstance`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassTarget {
    Class(ClassId),
    Param(ParamId),
}

impl From<ClassTarget> for InstanceTarget {
    fn from(target: ClassTarget) -> Self {
        match target {
            ClassTarget::Class(c) => InstanceTarget::Class(c),
            ClassTarget::Param(p) => InstanceTarget::Param(p),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ActionKind {
    ConstInt64(i64),
    ConstDouble(f64),
    ConstBool(bool),
    ConstAtom(NameId),
    ConstVoid,

    /// Identifier read awaiting name resolution
    Name(NameId),
    /// Assignment to an identifier awaiting name resolution
    SetName { name: NameId, value: ActionId },

    GetVar(VarId),
    SetVar { var: VarId, value: ActionId },
    GetThis,
    /// `base` is `None` for fields of `this`; `field` is bound lazily
    GetField { base: Option<ActionId>, name: NameId, field: Option<VarId> },
    SetField { base: Option<ActionId>, name: NameId, field: Option<VarId>, value: ActionId },

    Binary { op: BinOp, lhs: ActionId, rhs: ActionId },
    Unary { op: UnaryOp, operand: ActionId },

    Block(Vec<ActionId>),
    /// Introduces `var` for the remaining statements of a block
    Local { var: VarId, body: Vec<ActionId> },
    Loop(Vec<ActionId>),
    /// Leaves the `Block` or `Loop` identified by `target`
    Break { target: ActionId, result: Option<ActionId> },
    /// `cond ? then`, with `_` bound to the unwrapped condition
    If { cond: ActionId, then: ActionId, binding: VarId },
    /// `lhs : rhs`
    Else { lhs: ActionId, rhs: ActionId },
    /// `+x`
    Just(ActionId),
    /// `?T`
    NoneOf(ActionId),

    /// Reference to a class or class parameter, optionally parameterized
    MakeInstance {
        name: NameId,
        target: Option<ClassTarget>,
        params: Vec<ActionId>,
        instance: Option<InstanceId>,
    },
    MakeArray(Vec<ActionId>),
    /// `[T]` in a type expression
    ArrayOf(ActionId),
    GetAt { array: ActionId, index: ActionId },
    SetAt { array: ActionId, index: ActionId, value: ActionId },

    Call { callee: ActionId, args: Vec<ActionId> },
    CallMethod {
        receiver: Option<ActionId>,
        method: MethodId,
        args: Vec<ActionId>,
        dispatch: Dispatch,
    },
    CallFunction { function: FnId, args: Vec<ActionId> },
    FunctionRef(FnId),
    MakeDelegate { receiver: Option<ActionId>, method: MethodId },
    Lambda(LambdaId),
    /// `fn(T, U) R` in a type expression
    LambdaSig { params: Vec<ActionId>, result: Option<ActionId> },

    /// `operand ~ target`; `checked` when a runtime test is needed
    Cast { operand: ActionId, target: ActionId, checked: bool },
    /// `&x`
    ToWeak(ActionId),
    /// `*x`
    ToOwn(ActionId),
    /// `@x`
    CopyOf(ActionId),
}

impl ActionKind {
    /// Direct child nodes in evaluation order
    pub fn children(&self) -> Vec<ActionId> {
        use ActionKind::*;
        match self {
            ConstInt64(_) | ConstDouble(_) | ConstBool(_) | ConstAtom(_) | ConstVoid | Name(_)
            | GetVar(_) | GetThis | FunctionRef(_) | Lambda(_) => Vec::new(),
            SetName { value, .. } | SetVar { value, .. } => vec![*value],
            GetField { base, .. } => base.iter().copied().collect(),
            SetField { base, value, .. } => base.iter().copied().chain([*value]).collect(),
            Binary { lhs, rhs, .. } | Else { lhs, rhs } => vec![*lhs, *rhs],
            Unary { operand, .. } | Just(operand) | NoneOf(operand) | ArrayOf(operand)
            | ToWeak(operand) | ToOwn(operand) | CopyOf(operand) => vec![*operand],
            Block(body) | Loop(body) | Local { body, .. } | MakeArray(body) => body.clone(),
            Break { result, .. } => result.iter().copied().collect(),
            If { cond, then, .. } => vec![*cond, *then],
            MakeInstance { params, .. } => params.clone(),
            GetAt { array, index } => vec![*array, *index],
            SetAt { array, index, value } => vec![*array, *index, *value],
            Call { callee, args } => [*callee].into_iter().chain(args.iter().copied()).collect(),
            CallMethod { receiver, args, .. } => {
                receiver.iter().copied().chain(args.iter().copied()).collect()
            }
            CallFunction { args, .. } => args.clone(),
            MakeDelegate { receiver, .. } => receiver.iter().copied().collect(),
            LambdaSig { params, result } => {
                params.iter().copied().chain(result.iter().copied()).collect()
            }
            Cast { operand, target, .. } => vec![*operand, *target],
        }
    }

    /// Short node name used by the debug printer
    pub fn label(&self) -> &'static str {
        use ActionKind::*;
        match self {
            ConstInt64(_) => "ConstInt64",
            ConstDouble(_) => "ConstDouble",
            ConstBool(_) => "ConstBool",
            ConstAtom(_) => "ConstAtom",
            ConstVoid => "ConstVoid",
            Name(_) => "Name",
            SetName { .. } => "SetName",
            GetVar(_) => "GetVar",
            SetVar { .. } => "SetVar",
            GetThis => "GetThis",
            GetField { .. } => "GetField",
            SetField { .. } => "SetField",
            Binary { .. } => "Binary",
            Unary { .. } => "Unary",
            Block(_) => "Block",
            Local { .. } => "Local",
            Loop(_) => "Loop",
            Break { .. } => "Break",
            If { .. } => "If",
            Else { .. } => "Else",
            Just(_) => "Just",
            NoneOf(_) => "NoneOf",
            MakeInstance { .. } => "MakeInstance",
            MakeArray(_) => "MakeArray",
            ArrayOf(_) => "ArrayOf",
            GetAt { .. } => "GetAt",
            SetAt { .. } => "SetAt",
            Call { .. } => "Call",
            CallMethod { .. } => "CallMethod",
            CallFunction { .. } => "CallFunction",
            FunctionRef(_) => "FunctionRef",
            MakeDelegate { .. } => "MakeDelegate",
            Lambda(_) => "Lambda",
            LambdaSig { .. } => "LambdaSig",
            Cast { .. } => "Cast",
            ToWeak(_) => "ToWeak",
            ToOwn(_) => "ToOwn",
            CopyOf(_) => "CopyOf",
        }
    }
}
