//! Generic substitution
//!
//! A member declared in a generic class is typed in terms of that class's
//! parameters. Viewing it through an instantiation replaces those parameters
//! with the instantiation's arguments and re-interns the result.

use quill_ast::*;

use crate::TypeErrorKind;
use crate::error::internal;

struct Substitution<'p> {
    class: ClassId,
    args: &'p [InstanceId],
}

impl Substitution<'_> {
    fn ty(&self, ast: &mut Ast, ty: TypeId) -> Result<TypeId, TypeErrorKind> {
        let stripped = match ast.types.get(ty).clone() {
            Type::Own(i) => Type::Own(self.instance(ast, i)?),
            Type::Pin(i) => Type::Pin(self.instance(ast, i)?),
            Type::Weak(i) => Type::Weak(self.instance(ast, i)?),
            Type::Class(i) => Type::Class(self.instance(ast, i)?),
            Type::Optional { wrapped, depth } => Type::Optional {
                wrapped: self.ty(ast, wrapped)?,
                depth,
            },
            Type::Array(element) => Type::Array(self.ty(ast, element)?),
            Type::Lambda { params, result } => Type::Lambda {
                params: self.list(ast, &params)?,
                result: self.ty(ast, result)?,
            },
            Type::Function { params, result } => Type::Function {
                params: self.list(ast, &params)?,
                result: self.ty(ast, result)?,
            },
            _ => return Ok(ty),
        };
        Ok(ast.types.intern(stripped))
    }

    fn list(&self, ast: &mut Ast, types: &[TypeId]) -> Result<Vec<TypeId>, TypeErrorKind> {
        types.iter().map(|t| self.ty(ast, *t)).collect()
    }

    fn instance(&self, ast: &mut Ast, inst: InstanceId) -> Result<InstanceId, TypeErrorKind> {
        let Instance { target, params } = ast.instances.get(inst).clone();
        match target {
            InstanceTarget::Param(p) if ast.param(p).class == self.class => {
                let index = ast.param(p).index;
                self.args.get(index).copied().ok_or_else(|| {
                    internal(format!(
                        "parameter {} of {} has no argument in {}",
                        index,
                        ast.names.display(ast.class(self.class).name),
                        ast.instance_name(inst),
                    ))
                })
            }
            InstanceTarget::Param(_) => Ok(inst),
            InstanceTarget::Class(_) => {
                let params = params
                    .iter()
                    .map(|p| self.instance(ast, *p))
                    .collect::<Result<Vec<_>, _>>()?;
                ast.instances
                    .intern(Instance { target, params })
                    .map_err(|e| internal(e.to_string()))
            }
        }
    }
}

/// Replace the parameters owned by `context`'s class with its arguments
pub fn strip(ast: &mut Ast, ty: TypeId, context: InstanceId) -> Result<TypeId, TypeErrorKind> {
    let Instance { target, params } = ast.instances.get(context).clone();
    let InstanceTarget::Class(class) = target else {
        return Ok(ty);
    };
    Substitution { class, args: &params }.ty(ast, ty)
}

/// Same as [`strip`] for a bare instantiation
pub fn strip_instance(ast: &mut Ast, inst: InstanceId, context: InstanceId) -> Result<InstanceId, TypeErrorKind> {
    let Instance { target, params } = ast.instances.get(context).clone();
    let InstanceTarget::Class(class) = target else {
        return Ok(inst);
    };
    Substitution { class, args: &params }.instance(ast, inst)
}

/// View an inherited member's type from `receiver`: innermost base first
pub fn strip_path(
    ast: &mut Ast,
    ty: TypeId,
    path: &[InstanceId],
    receiver: InstanceId,
) -> Result<TypeId, TypeErrorKind> {
    let mut ty = ty;
    for base in path.iter().rev() {
        ty = strip(ast, ty, *base)?;
    }
    strip(ast, ty, receiver)
}

/// Instantiation of `class` that `inst` derives from, if any
pub fn upcast(ast: &mut Ast, inst: InstanceId, class: ClassId) -> Result<Option<InstanceId>, TypeErrorKind> {
    let inst = match ast.instances.get(inst).target {
        InstanceTarget::Class(_) => inst,
        InstanceTarget::Param(p) => match ast.param(p).bound {
            Some(bound) => ast.instances.plain(InstanceTarget::Class(bound)),
            None => return Ok(None),
        },
    };
    let InstanceTarget::Class(current) = ast.instances.get(inst).target else {
        return Ok(None);
    };
    if current == class {
        return Ok(Some(inst));
    }
    if !ast.derives_from(current, class) {
        return Ok(None);
    }
    let bases: Vec<InstanceId> = ast.class(current).bases.iter().filter_map(|b| b.instance).collect();
    for base in bases {
        let base = strip_instance(ast, base, inst)?;
        if let Some(found) = upcast(ast, base, class)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// `true` when a reference to `inst` can stand where `target` is expected
pub fn is_subinstance(ast: &mut Ast, inst: InstanceId, target: InstanceId) -> Result<bool, TypeErrorKind> {
    if inst == target {
        return Ok(true);
    }
    match ast.instances.get(target).target {
        InstanceTarget::Class(class) => Ok(upcast(ast, inst, class)? == Some(target)),
        InstanceTarget::Param(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use quill_parser::parse_source;
    use quill_resolve::resolve_names;

    use super::*;

    fn resolved(src: &str) -> Ast {
        let mut ast = Ast::new();
        parse_source(&mut ast, "test", src).unwrap();
        resolve_names(&mut ast).unwrap();
        ast
    }

    fn class(ast: &Ast, name: &str) -> ClassId {
        ast.class_ids()
            .find(|c| ast.names.segment(ast.class(*c).name) == name)
            .unwrap()
    }

    fn instance(ast: &mut Ast, class: ClassId, params: Vec<InstanceId>) -> InstanceId {
        ast.instances
            .intern(Instance { target: InstanceTarget::Class(class), params })
            .unwrap()
    }

    const SRC: &str = "
        class Point { x = 0; }
        class Box(T) { item = 0; }
        class Base(T) { item = 0; }
        class Derived { +Base(Point) }
    ";

    #[test]
    fn test_strip_substitutes_owned_params() {
        let mut ast = resolved(SRC);
        let (point, boxed) = (class(&ast, "Point"), class(&ast, "Box"));
        let point_inst = instance(&mut ast, point, vec![]);
        let box_point = instance(&mut ast, boxed, vec![point_inst]);
        let t = ast.class(boxed).params[0];
        let t_inst = ast.instances.plain(InstanceTarget::Param(t));

        let own_t = ast.types.own(t_inst);
        let declared = ast.types.optional(own_t);
        let own_point = ast.types.own(point_inst);
        let expected = ast.types.optional(own_point);
        assert_eq!(strip(&mut ast, declared, box_point).unwrap(), expected);

        // parameters of another class are left alone
        let base_t = ast.class(class(&ast, "Base")).params[0];
        let base_t_inst = ast.instances.plain(InstanceTarget::Param(base_t));
        let foreign = ast.types.pin(base_t_inst);
        assert_eq!(strip(&mut ast, foreign, box_point).unwrap(), foreign);
    }

    #[test]
    fn test_strip_missing_argument_is_internal() {
        let mut ast = resolved(SRC);
        let boxed = class(&ast, "Box");
        let bare = instance(&mut ast, boxed, vec![]);
        let t = ast.class(boxed).params[0];
        let t_inst = ast.instances.plain(InstanceTarget::Param(t));
        let ty = ast.types.own(t_inst);
        assert!(matches!(strip(&mut ast, ty, bare), Err(TypeErrorKind::Internal { .. })));
    }

    #[test]
    fn test_upcast_through_generic_base() {
        let mut ast = resolved(SRC);
        let (point, base, derived) = (class(&ast, "Point"), class(&ast, "Base"), class(&ast, "Derived"));
        let point_inst = instance(&mut ast, point, vec![]);
        let base_point = instance(&mut ast, base, vec![point_inst]);
        let derived_inst = instance(&mut ast, derived, vec![]);

        assert_eq!(upcast(&mut ast, derived_inst, base).unwrap(), Some(base_point));
        assert_eq!(upcast(&mut ast, base_point, derived).unwrap(), None);
        assert!(is_subinstance(&mut ast, derived_inst, base_point).unwrap());
        assert!(!is_subinstance(&mut ast, point_inst, base_point).unwrap());
    }
}
