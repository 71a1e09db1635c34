//! Parser and module loader.
//!
//! Modules are requested by name from a text provider. Imports are loaded
//! depth-first; a module importing itself through any chain is rejected, and
//! an imported module must declare at least the version its importer asks for.

mod parser;

use quill_ast::{Ast, Import, Location, Module, ModuleId};
use quill_lexer::Lexer;
use thiserror::Error;
use tracing::debug;

use crate::parser::Parser;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("{0}")]
    Lex(String),
    #[error("expected {expected}, found '{found}'")]
    Expected { expected: String, found: String },
    #[error("module '{name}' not found")]
    MissingModule { name: String },
    #[error("module '{expected}' declares itself as '{found}'")]
    ModuleNameMismatch { expected: String, found: String },
    #[error("import cycle: {path}")]
    ImportCycle { path: String },
    #[error("module '{name}' has version {actual}, but version {required} is required")]
    OutdatedModule { name: String, required: u64, actual: u64 },
    #[error("method '{name}' needs a body")]
    MissingBody { name: String },
    #[error("left side of assignment is not assignable")]
    InvalidAssignment,
    #[error("break outside of a loop")]
    BreakOutsideLoop,
    #[error("return outside of a body")]
    ReturnOutsideBody,
}

#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub loc: Location,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, loc: Location) -> Self {
        Self { kind, loc }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Load `root` and everything it imports into `ast`.
///
/// `provider` maps a module name to its source text.
pub fn parse_program(
    ast: &mut Ast,
    root: &str,
    provider: &mut dyn FnMut(&str) -> Option<String>,
) -> ParseResult<ModuleId> {
    let mut loader = Loader {
        provider,
        active: Vec::new(),
    };
    loader.load(ast, root, Location::default())
}

/// Parse a single module that has no imports
pub fn parse_source(ast: &mut Ast, name: &str, source: &str) -> ParseResult<ModuleId> {
    parse_program(ast, name, &mut |requested: &str| {
        (requested == name).then(|| source.to_string())
    })
}

struct Loader<'p> {
    provider: &'p mut dyn FnMut(&str) -> Option<String>,
    /// Modules whose imports are being loaded, outermost first
    active: Vec<String>,
}

impl Loader<'_> {
    fn load(&mut self, ast: &mut Ast, name: &str, requested_at: Location) -> ParseResult<ModuleId> {
        let text = (self.provider)(name).ok_or_else(|| {
            ParseError::new(ParseErrorKind::MissingModule { name: name.to_string() }, requested_at)
        })?;

        let module_name = ast.names.root(name);
        let module = ast.add_module(Module {
            name: module_name,
            version: 0,
            imports: Vec::new(),
            classes: Vec::new(),
            functions: Vec::new(),
            entry: None,
        });

        let tokens = Lexer::tokenize(&text).map_err(|e| {
            ParseError::new(ParseErrorKind::Lex(e.message), Location::new(module, e.span))
        })?;
        let header = Parser::new(&tokens, 0, ast, module).parse_header()?;
        if let Some((declared, span)) = &header.name {
            if declared != name {
                return Err(ParseError::new(
                    ParseErrorKind::ModuleNameMismatch {
                        expected: name.to_string(),
                        found: declared.clone(),
                    },
                    Location::new(module, *span),
                ));
            }
        }
        ast.modules[module.index()].version = header.version;

        self.active.push(name.to_string());
        let mut imports = Vec::new();
        for (import, required, span) in &header.imports {
            let loc = Location::new(module, *span);
            if let Some(pos) = self.active.iter().position(|m| m == import) {
                let mut path = self.active[pos..].to_vec();
                path.push(import.clone());
                return Err(ParseError::new(
                    ParseErrorKind::ImportCycle { path: path.join(" -> ") },
                    loc,
                ));
            }
            let import_name = ast.names.root(import);
            let imported = match ast.module_by_name(import_name) {
                Some(existing) => existing,
                None => self.load(ast, import, loc)?,
            };
            let actual = ast.module(imported).version;
            if actual < *required {
                return Err(ParseError::new(
                    ParseErrorKind::OutdatedModule {
                        name: import.clone(),
                        required: *required,
                        actual,
                    },
                    loc,
                ));
            }
            imports.push(Import {
                name: import_name,
                version: *required,
                module: Some(imported),
                span: *span,
            });
        }
        self.active.pop();
        ast.modules[module.index()].imports = imports;

        Parser::new(&tokens, header.end, ast, module).parse_module_body()?;
        debug!(
            module = name,
            version = header.version,
            classes = ast.module(module).classes.len(),
            "module loaded"
        );
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;
    use quill_ast::*;

    use super::*;

    fn parse(src: &str) -> (Ast, ModuleId) {
        let mut ast = Ast::new();
        let module = parse_source(&mut ast, "test", src).unwrap();
        (ast, module)
    }

    fn entry_stmts(ast: &Ast, module: ModuleId) -> Vec<ActionId> {
        let entry = ast.module(module).entry.unwrap();
        match &ast.action(ast.function(entry).body.unwrap()).kind {
            ActionKind::Block(stmts) => stmts.clone(),
            other => panic!("entry is not a block: {:?}", other),
        }
    }

    fn labels(ast: &Ast, ids: &[ActionId]) -> Vec<&'static str> {
        ids.iter().map(|id| ast.action(*id).kind.label()).collect()
    }

    fn load(files: &[(&str, &str)], root: &str) -> ParseResult<(Ast, ModuleId)> {
        let files: HashMap<String, String> = files
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut ast = Ast::new();
        let module = parse_program(&mut ast, root, &mut |name: &str| files.get(name).cloned())?;
        Ok((ast, module))
    }

    #[test]
    fn test_parse_point_scenario() {
        let (ast, module) = parse("class Point { x = 0; y = 0; } p = Point; p.x := 1; p.y + p.x");
        let class = ast.module(module).classes[0];
        assert_eq!(ast.names.display(ast.class(class).name), "test::Point");
        assert_eq!(ast.class(class).fields.len(), 2);

        let stmts = entry_stmts(&ast, module);
        assert_eq!(labels(&ast, &stmts), vec!["Local"]);
        let ActionKind::Local { body, .. } = &ast.action(stmts[0]).kind else { unreachable!() };
        assert_eq!(labels(&ast, body), vec!["SetField", "Binary"]);
    }

    #[test]
    fn test_guard_and_else_nest() {
        let (ast, module) = parse("a = 2; a < 10 ? 3 : 44");
        let stmts = entry_stmts(&ast, module);
        let ActionKind::Local { body, .. } = &ast.action(stmts[0]).kind else { unreachable!() };
        let ActionKind::Else { lhs, rhs } = ast.action(body[0]).kind else { unreachable!() };
        let ActionKind::If { cond, then, .. } = ast.action(lhs).kind else { unreachable!() };
        assert!(matches!(ast.action(cond).kind, ActionKind::Binary { op: BinOp::Lt, .. }));
        assert!(matches!(ast.action(then).kind, ActionKind::ConstInt64(3)));
        assert!(matches!(ast.action(rhs).kind, ActionKind::ConstInt64(44)));
    }

    #[test]
    fn test_greater_swaps_operands() {
        let (ast, module) = parse("1 > 2");
        let stmts = entry_stmts(&ast, module);
        let ActionKind::Binary { op, lhs, .. } = ast.action(stmts[0]).kind else { unreachable!() };
        assert_eq!(op, BinOp::Lt);
        assert!(matches!(ast.action(lhs).kind, ActionKind::ConstInt64(2)));
    }

    #[test]
    fn test_while_becomes_loop() {
        let (ast, module) = parse("i = 0; while i < 3 { i += 1 }");
        let stmts = entry_stmts(&ast, module);
        let ActionKind::Local { body, .. } = &ast.action(stmts[0]).kind else { unreachable!() };
        let ActionKind::Loop(steps) = &ast.action(body[0]).kind else { unreachable!() };
        let ActionKind::Else { rhs, .. } = ast.action(steps[0]).kind else { unreachable!() };
        assert!(matches!(ast.action(rhs).kind, ActionKind::Break { target, result: None } if target == body[0]));
    }

    #[test]
    fn test_compound_field_assignment_uses_temp() {
        let (ast, module) = parse("class C { x = 0; } c = C; c.x += 2");
        let stmts = entry_stmts(&ast, module);
        let ActionKind::Local { body, .. } = &ast.action(stmts[0]).kind else { unreachable!() };
        let ActionKind::Local { body: inner, .. } = &ast.action(body[0]).kind else { unreachable!() };
        assert_eq!(labels(&ast, inner), vec!["SetField"]);
    }

    #[test]
    fn test_return_targets_method_body() {
        let (ast, _) = parse("class C { m(int a) int { return a; } }");
        let method = &ast.methods[0];
        let body = method.body.unwrap();
        let ActionKind::Block(stmts) = &ast.action(body).kind else { unreachable!() };
        assert!(matches!(ast.action(stmts[0]).kind, ActionKind::Break { target, result: Some(_) } if target == body));
        assert!(method.result.is_some());
    }

    #[test]
    fn test_bases_and_overloads() {
        let (ast, module) = parse(
            "interface I { m() int; }
             class A { +I { m() int { 1 } }; f = 0; g() { } }",
        );
        let classes = &ast.module(module).classes;
        assert!(ast.class(classes[0]).is_interface);
        assert!(ast.methods[0].is_abstract());
        let a = ast.class(classes[1]);
        assert_eq!(a.bases.len(), 1);
        assert_eq!(a.bases[0].overloads.len(), 1);
        assert_eq!(ast.method(a.bases[0].overloads[0]).base, Some(0));
        assert_eq!(a.methods.len(), 1);
    }

    #[test]
    fn test_class_params_with_bound() {
        let (ast, module) = parse("class Node {} class Tree(T: Node, U) { item = ?T; }");
        let tree = ast.class(ast.module(module).classes[1]);
        assert_eq!(tree.params.len(), 2);
        assert!(ast.param(tree.params[0]).bound_ref.is_some());
        assert!(ast.param(tree.params[1]).bound_ref.is_none());
        assert_eq!(ast.param(tree.params[1]).index, 1);
    }

    #[test]
    fn test_lambda_annotations() {
        let (ast, _) = parse("f = (a, b){ a }; g = (int a){ a }; f(1, 2) + g(3)");
        assert!(!ast.lambdas[0].is_annotated(&ast));
        assert!(ast.lambdas[1].is_annotated(&ast));
    }

    #[test]
    fn test_platform_function() {
        let (ast, module) = parse("fn sys_log(int x); fn twice(int x) int { x * 2 }");
        let functions = &ast.module(module).functions;
        assert!(ast.function(functions[0]).is_platform);
        assert!(!ast.function(functions[1]).is_platform);
        assert!(ast.module(module).entry.is_none());
    }

    #[test]
    fn test_class_method_requires_body() {
        let mut ast = Ast::new();
        let err = parse_source(&mut ast, "test", "class C { m() int; }").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingBody { name: "m".into() });
    }

    #[test]
    fn test_break_outside_loop() {
        let mut ast = Ast::new();
        let err = parse_source(&mut ast, "test", "fn f() { break; }").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::BreakOutsideLoop);
    }

    #[test]
    fn test_import_cycle_detected() {
        let err = load(&[("a", "using b;"), ("b", "using c;"), ("c", "using a;")], "a").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ImportCycle { path: "a -> b -> c -> a".into() });
    }

    #[test]
    fn test_outdated_import_rejected() {
        let err = load(&[("app", "using geom.2;"), ("geom", "module geom.1;")], "app").unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::OutdatedModule { name: "geom".into(), required: 2, actual: 1 }
        );
    }

    #[test]
    fn test_shared_import_loaded_once() {
        let (ast, app) = load(
            &[
                ("app", "module app.1; using geom.2; using shapes;"),
                ("shapes", "using geom.1; class Square {}"),
                ("geom", "module geom.3; class Point {}"),
            ],
            "app",
        )
        .unwrap();
        assert_eq!(ast.modules.len(), 3);
        assert_eq!(ast.module(app).version, 1);
        let imports: Vec<_> = ast.module(app).imports.iter().map(|i| ast.names.display(i.name)).collect();
        assert_eq!(imports, vec!["geom", "shapes"]);
    }

    #[test]
    fn test_missing_module() {
        let err = load(&[("app", "using nowhere;")], "app").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingModule { name: "nowhere".into() });
    }

    #[test]
    fn test_module_name_mismatch() {
        let err = load(&[("app", "module other;")], "app").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::ModuleNameMismatch { .. }));
    }
}
