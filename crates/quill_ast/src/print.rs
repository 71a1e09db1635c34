//! Debug rendering of types and trees. The format is not stable.

use std::fmt::Write;

use crate::{
    ActionId, ActionKind, Ast, ClassId, InstanceId, InstanceTarget, Member, Type, TypeId,
    TypeSlot,
};

impl Ast {
    pub fn instance_name(&self, inst: InstanceId) -> String {
        let instance = self.instances.get(inst);
        let base = match instance.target {
            InstanceTarget::Class(c) => self.names.display(self.class(c).name),
            InstanceTarget::Param(p) => self.names.display(self.param(p).name),
        };
        if instance.params.is_empty() {
            base
        } else {
            let params: Vec<_> = instance.params.iter().map(|p| self.instance_name(*p)).collect();
            format!("{}({})", base, params.join(", "))
        }
    }

    pub fn type_name(&self, ty: TypeId) -> String {
        let list = |items: &[TypeId]| {
            items
                .iter()
                .map(|t| self.type_name(*t))
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self.types.get(ty) {
            Type::Int64 => "int".to_string(),
            Type::Double => "double".to_string(),
            Type::Void => "void".to_string(),
            Type::Atom => "atom".to_string(),
            Type::NoReturn => "noreturn".to_string(),
            Type::Optional { wrapped, depth } => {
                if *wrapped == crate::TypeTable::VOID && *depth == 1 {
                    "bool".to_string()
                } else {
                    format!("{}{}", "?".repeat(*depth as usize), self.type_name(*wrapped))
                }
            }
            Type::Function { params, result } => {
                format!("fn({}) {}", list(params), self.type_name(*result))
            }
            Type::Lambda { params, result } => {
                format!("({}) {}", list(params), self.type_name(*result))
            }
            Type::ColdLambda(c) => match self.colds.get(*c).signature {
                Some(sig) => self.type_name(sig),
                None => format!("cold#{}", self.colds.find(*c).0),
            },
            Type::Class(i) => format!("class {}", self.instance_name(*i)),
            Type::Own(i) => format!("*{}", self.instance_name(*i)),
            Type::Pin(i) => self.instance_name(*i),
            Type::Weak(i) => format!("&{}", self.instance_name(*i)),
            Type::Array(e) => format!("[{}]", self.type_name(*e)),
        }
    }

    fn slot_suffix(&self, slot: TypeSlot) -> String {
        match slot {
            TypeSlot::Empty => String::new(),
            TypeSlot::InProgress => " : <in progress>".to_string(),
            TypeSlot::Fixed(ty) => format!(" : {}", self.type_name(ty)),
        }
    }

    /// Indented tree of `id` with node types where known
    pub fn dump_action(&self, id: ActionId) -> String {
        let mut out = String::new();
        self.dump_into(id, 0, &mut out);
        out
    }

    fn dump_into(&self, id: ActionId, depth: usize, out: &mut String) {
        let action = self.action(id);
        let detail = match &action.kind {
            ActionKind::ConstInt64(v) => format!(" {}", v),
            ActionKind::ConstDouble(v) => format!(" {}", v),
            ActionKind::ConstBool(v) => format!(" {}", v),
            ActionKind::ConstAtom(n) | ActionKind::Name(n) => format!(" {}", self.names.display(*n)),
            ActionKind::SetName { name, .. }
            | ActionKind::GetField { name, .. }
            | ActionKind::SetField { name, .. } => format!(" {}", self.names.display(*name)),
            ActionKind::GetVar(v) | ActionKind::SetVar { var: v, .. } | ActionKind::Local { var: v, .. } => {
                format!(" {}", self.names.display(self.var(*v).name))
            }
            ActionKind::Binary { op, .. } => format!(" {}", op.symbol()),
            ActionKind::Unary { op, .. } => format!(" {:?}", op),
            ActionKind::Break { target, .. } => format!(" -> #{}", target.0),
            ActionKind::MakeInstance { name, .. } => format!(" {}", self.names.display(*name)),
            ActionKind::CallMethod { method, dispatch, .. } => format!(
                " {} {:?}",
                self.names.display(self.method(*method).name),
                dispatch
            ),
            ActionKind::MakeDelegate { method, .. } => {
                format!(" {}", self.names.display(self.method(*method).name))
            }
            ActionKind::CallFunction { function, .. } | ActionKind::FunctionRef(function) => {
                format!(" {}", self.names.display(self.function(*function).name))
            }
            ActionKind::Cast { checked, .. } => {
                if *checked { " checked".to_string() } else { String::new() }
            }
            _ => String::new(),
        };
        let _ = writeln!(
            out,
            "{}#{} {}{}{}",
            "  ".repeat(depth),
            id.0,
            action.kind.label(),
            detail,
            self.slot_suffix(action.ty)
        );
        if let ActionKind::Lambda(l) = &action.kind {
            self.dump_into(self.lambda(*l).body, depth + 1, out);
        }
        for child in action.kind.children() {
            self.dump_into(child, depth + 1, out);
        }
    }

    /// Class header and flattened member table
    pub fn dump_class(&self, id: ClassId) -> String {
        let class = self.class(id);
        let mut out = String::new();
        let keyword = if class.is_interface { "interface" } else { "class" };
        let _ = write!(out, "{} {}", keyword, self.names.display(class.name));
        if !class.params.is_empty() {
            let params: Vec<_> = class
                .params
                .iter()
                .map(|p| self.names.display(self.param(*p).name))
                .collect();
            let _ = write!(out, "({})", params.join(", "));
        }
        out.push('\n');
        for base in &class.bases {
            if let Some(inst) = base.instance {
                let _ = writeln!(out, "  +{}", self.instance_name(inst));
            }
        }
        for (name, entries) in class.members.iter() {
            for entry in entries {
                let what = match entry.member {
                    Member::Field(v) => format!("field{}", self.slot_suffix(self.var(v).ty)),
                    Member::Method(m) => {
                        let owner = self.method(m).class;
                        format!("method of {}", self.names.display(self.class(owner).name))
                    }
                };
                let via: Vec<_> = entry.path.iter().map(|i| self.instance_name(*i)).collect();
                if via.is_empty() {
                    let _ = writeln!(out, "  {}: {}", self.names.display(name), what);
                } else {
                    let _ = writeln!(
                        out,
                        "  {}: {} via {}",
                        self.names.display(name),
                        what,
                        via.join(" > ")
                    );
                }
            }
        }
        out
    }
}
