use pretty_assertions::assert_eq;
use quill_ast::*;
use quill_parser::parse_source;
use quill_resolve::resolve_names;
use quill_types::{TypeErrorKind, check_types};

fn check(src: &str) -> Result<Ast, TypeErrorKind> {
    let mut ast = Ast::new();
    parse_source(&mut ast, "test", src).unwrap();
    resolve_names(&mut ast).unwrap();
    check_types(&mut ast).map_err(|e| e.kind)?;
    Ok(ast)
}

fn check_err(src: &str) -> TypeErrorKind {
    check(src).unwrap_err()
}

/// Rendered result type of the module's top-level statements
fn entry_type(ast: &Ast) -> String {
    let entry = ast.modules[0].entry.unwrap();
    let ty = ast.function(entry).ty.fixed().unwrap();
    match ast.types.get(ty) {
        Type::Function { params, result } if params.is_empty() => ast.type_name(*result),
        other => panic!("entry is not a function: {:?}", other),
    }
}

fn assert_all_fixed(ast: &Ast, id: ActionId) {
    let action = ast.action(id);
    assert!(
        action.ty.fixed().is_some(),
        "{} has no type:\n{}",
        action.kind.label(),
        ast.dump_action(id)
    );
    for child in action.kind.children() {
        assert_all_fixed(ast, child);
    }
}

fn actions<'a>(ast: &'a Ast, label: &'a str) -> impl Iterator<Item = &'a Action> + 'a {
    ast.actions.iter().filter(move |a| a.kind.label() == label)
}

fn text(s: &str) -> String {
    s.to_string()
}

#[test]
fn test_point_fields() {
    let ast = check("class Point { x = 0; y = 0; } p = Point; p.x := 1; p.y + p.x").unwrap();
    assert_eq!(entry_type(&ast), "int");
    assert_all_fixed(&ast, ast.function(ast.modules[0].entry.unwrap()).body.unwrap());
    let fields: Vec<_> = actions(&ast, "GetField")
        .map(|a| matches!(a.kind, ActionKind::GetField { field: Some(_), .. }))
        .collect();
    assert_eq!(fields, vec![true, true]);
}

#[test]
fn test_two_interfaces_distinct_names() {
    let ast = check(
        "interface Shape { area() int; }
         interface Named { name() int; }
         class Square { +Shape { area() int { 4 } } +Named { name() int { 1 } } }
         s = Square;
         s.area() + s.name()",
    )
    .unwrap();
    assert_eq!(entry_type(&ast), "int");

    let dispatch: Vec<_> = actions(&ast, "CallMethod")
        .map(|a| match a.kind {
            ActionKind::CallMethod { dispatch: Dispatch::Interface(i), .. } => ast.names.display(ast.class(i).name),
            _ => panic!("expected interface dispatch"),
        })
        .collect();
    assert_eq!(dispatch, vec![text("test::Shape"), text("test::Named")]);

    let square = ast.class_ids().find(|c| ast.names.segment(ast.class(*c).name) == "Square").unwrap();
    let table = &ast.class(square).dispatch;
    assert_eq!(table.len(), 2);
    for base in &ast.class(square).bases {
        let overload = base.overloads[0];
        assert_eq!(table.get(&ast.method(overload).overrides.unwrap()), Some(&overload));
    }
}

#[test]
fn test_two_interfaces_same_name() {
    let err = check_err(
        "interface A { m() int; }
         interface B { m() int; }
         class C { +A { m() int { 1 } } +B { m() int { 2 } } }
         c = C;
         c.m()",
    );
    assert_eq!(err, TypeErrorKind::AmbiguousMember { name: text("m") });
}

#[test]
fn test_guard_else_scenario() {
    let ast = check("a = 2; a < 10 ? 3 : 44").unwrap();
    assert_eq!(entry_type(&ast), "int");
    let if_node = actions(&ast, "If").next().unwrap();
    assert_eq!(ast.type_name(if_node.ty.fixed().unwrap()), "?int");
}

#[test]
fn test_lambda_through_lambda() {
    let ast = check("twice = (f, x) { f(x) + f(x) }; twice((a) { a * 2 }, 3)").unwrap();
    assert_eq!(entry_type(&ast), "int");
    for cold in ast.colds.ids() {
        assert!(ast.colds.get(cold).signature.is_some());
    }
    let signatures: Vec<_> = ast
        .lambdas
        .iter()
        .map(|l| ast.type_name(ast.colds.get(l.cold.unwrap()).signature.unwrap()))
        .collect();
    assert_eq!(signatures, vec![text("((int) int, int) int"), text("(int) int")]);
    for lambda in &ast.lambdas {
        assert_all_fixed(&ast, lambda.body);
    }
}

#[test]
fn test_cold_fixed_by_first_call() {
    let err = check_err("f = (a) { a }; f(1); f(2.0)");
    assert_eq!(err, TypeErrorKind::TypeMismatch { expected: text("int"), actual: text("double") });

    let err = check_err("f = (a, b) { a }; f(1)");
    assert_eq!(err, TypeErrorKind::ParamCountMismatch { expected: 2, actual: 1 });

    assert!(matches!(check_err("f = (a) { a };"), TypeErrorKind::Unsupported { .. }));
}

#[test]
fn test_cold_into_annotated_slot() {
    let ast = check("fn apply(fn(int) int g, int x) int { g(x) } apply((a) { a * 3 }, 2)").unwrap();
    assert_eq!(entry_type(&ast), "int");
    let signature = ast.colds.get(ast.lambdas[0].cold.unwrap()).signature.unwrap();
    assert_eq!(ast.type_name(signature), "(int) int");
}

#[test]
fn test_cold_branches_share_signature() {
    let ast = check("c = 1 < 2 ? (a) { a } : (b) { b * 2 }; c(5)").unwrap();
    assert_eq!(entry_type(&ast), "int");
    let first = ast.colds.find(ast.lambdas[0].cold.unwrap());
    let second = ast.colds.find(ast.lambdas[1].cold.unwrap());
    assert_eq!(first, second);
}

#[test]
fn test_weak_field_assignment_and_read() {
    let ast = check(
        "class Point { x = 0; }
         class Holder { w = &Point; }
         h = Holder;
         p = Point;
         h.w := p;
         h.w ? _.x : 0",
    )
    .unwrap();
    assert_eq!(entry_type(&ast), "int");
    let set = actions(&ast, "SetField").next().unwrap();
    let ActionKind::SetField { value, .. } = set.kind else { unreachable!() };
    assert_eq!(ast.action(value).kind.label(), "ToWeak");
    assert_eq!(ast.type_name(ast.action(value).ty.fixed().unwrap()), "&test::Point");
}

#[test]
fn test_weak_parameter_inserts_conversion() {
    let ast = check(
        "class Point { x = 0; }
         fn keep(&Point w) int { w ? _.x : 0 }
         p = Point;
         keep(p)",
    )
    .unwrap();
    let call = actions(&ast, "CallFunction").next().unwrap();
    let ActionKind::CallFunction { args, .. } = &call.kind else { unreachable!() };
    assert_eq!(ast.action(args[0]).kind.label(), "ToWeak");
}

#[test]
fn test_ownership_errors() {
    let err = check_err(
        "class Leaf { v = 0; }
         class Node { child = Leaf; }
         n = Node;
         p = Leaf;
         n.child := p",
    );
    assert_eq!(
        err,
        TypeErrorKind::InvalidOwnershipConversion { expected: text("*test::Leaf"), actual: text("test::Leaf") }
    );

    check(
        "class Leaf { v = 0; }
         class Node { child = Leaf; }
         n = Node;
         p = Leaf;
         n.child := *p",
    )
    .unwrap();

    let err = check_err("class Point { x = 0; } class Pair { a = Point; b = a; }");
    assert_eq!(err, TypeErrorKind::TemporaryReference { actual: text("test::Point") });

    let err = check_err("class Point { x = 0; } p = Point; a = [p];");
    assert_eq!(err, TypeErrorKind::TemporaryReference { actual: text("test::Point") });
}

#[test]
fn test_arrays() {
    let ast = check("class Point { x = 0; } a = [Point, Point]; a[1].x").unwrap();
    assert_eq!(entry_type(&ast), "int");
    let err = check_err("a = [1, 2]; a[1.0]");
    assert_eq!(err, TypeErrorKind::TypeMismatch { expected: text("int"), actual: text("double") });
}

#[test]
fn test_circular_fields() {
    assert_eq!(check_err("class C { x = y; y = x; }"), TypeErrorKind::CircularDependency);
}

#[test]
fn test_missing_implementation() {
    let err = check_err("interface Shape { area() int; } class Square { +Shape }");
    assert_eq!(
        err,
        TypeErrorKind::MissingImplementation { class: text("test::Square"), method: text("area") }
    );
}

#[test]
fn test_override_signature_must_match() {
    let err = check_err("interface Shape { area() int; } class Square { +Shape { area() double { 4.0 } } }");
    assert_eq!(err, TypeErrorKind::TypeMismatch { expected: text("fn() int"), actual: text("fn() double") });
}

#[test]
fn test_dispatch_inherited_through_bases() {
    let ast = check(
        "class Base { f() int { 1 } }
         class Mid { +Base { f() int { 2 } } }
         class Leaf { +Mid }
         l = Leaf;
         l.f()",
    )
    .unwrap();
    let class = |name: &str| ast.class_ids().find(|c| ast.names.segment(ast.class(*c).name) == name).unwrap();
    let base_f = ast.class(class("Base")).methods[0];
    let mid_f = ast.class(class("Mid")).bases[0].overloads[0];
    assert_eq!(ast.class(class("Leaf")).dispatch.get(&base_f), Some(&mid_f));
    assert!(matches!(
        actions(&ast, "CallMethod").next().unwrap().kind,
        ActionKind::CallMethod { dispatch: Dispatch::Virtual, .. }
    ));
}

#[test]
fn test_casts() {
    let ast = check(
        "class Animal { a = 0; }
         class Dog { +Animal d = 0; }
         g = Dog;
         x = g ~ Animal;
         y = x ~ Dog;
         y ? _.d : 0",
    )
    .unwrap();
    assert_eq!(entry_type(&ast), "int");
    let checked: Vec<_> = actions(&ast, "Cast")
        .map(|a| match a.kind {
            ActionKind::Cast { checked, .. } => checked,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(checked, vec![false, true]);

    let err = check_err("class Point { x = 0; } p = Point; (&p) ~ Point");
    assert_eq!(err, TypeErrorKind::TypeMismatch { expected: text("class reference"), actual: text("&test::Point") });
}

#[test]
fn test_generic_members_are_stripped() {
    let ast = check(
        "class Point { x = 0; }
         class Box(T) { item = ?T; get() ?T { item } }
         class Crate { +Box(Point) }
         b = Box(Point);
         c = Crate;
         b.get();
         c.get() ? _.x : 0",
    )
    .unwrap();
    assert_eq!(entry_type(&ast), "int");
    let results: Vec<_> = actions(&ast, "CallMethod")
        .map(|a| ast.type_name(a.ty.fixed().unwrap()))
        .collect();
    assert_eq!(results, vec![text("?test::Point"), text("?test::Point")]);
}

#[test]
fn test_bounded_parameters() {
    let err = check_err(
        "class Node { n = 0; }
         class Other { o = 0; }
         class Tree(T: Node) { item = ?T; }
         t = Tree(Other);",
    );
    assert_eq!(err, TypeErrorKind::TypeMismatch { expected: text("test::Node"), actual: text("test::Other") });
    check("class Node { n = 0; } class Tree(T: Node) { item = ?T; } t = Tree(Node);").unwrap();
}

#[test]
fn test_operator_errors() {
    assert_eq!(
        check_err("1 + 2.0"),
        TypeErrorKind::TypeMismatch { expected: text("int"), actual: text("double") }
    );
    assert_eq!(check_err("true + 1"), TypeErrorKind::ExpectedIntOrDouble { actual: text("bool") });
    assert_eq!(
        check_err("1.5 % 2"),
        TypeErrorKind::TypeMismatch { expected: text("int"), actual: text("double") }
    );
    let ast = check("x = 3; double(x) < 1.5 && !(x == 2)").unwrap();
    assert_eq!(entry_type(&ast), "bool");
}

#[test]
fn test_member_and_call_errors() {
    assert_eq!(
        check_err("class P { x = 0; } p = P; p.z"),
        TypeErrorKind::UnknownMember { class: text("test::P"), name: text("z") }
    );
    assert_eq!(check_err("a = 1; a(2)"), TypeErrorKind::NotCallable { actual: text("int") });
    assert!(matches!(
        check_err("interface I { m() int; } i = I;"),
        TypeErrorKind::Unsupported { .. }
    ));
}

#[test]
fn test_loops_and_returns() {
    let ast = check("i = 0; loop { i += 1; i < 3 ? 0 : break i }").unwrap();
    assert_eq!(entry_type(&ast), "int");

    let ast = check("i = 0; while i < 3 { i += 1 }").unwrap();
    assert_eq!(entry_type(&ast), "void");

    check("fn f(int a) int { a < 0 ? return 0; a * 2 }").unwrap();
    let err = check_err("fn f(int a) int { a < 0 ? return 1.0; a }");
    assert_eq!(err, TypeErrorKind::IncompatibleTypes { first: text("double"), second: text("int") });
}

#[test]
fn test_loop_breaks_agree_in_either_order() {
    let err = check_err("a = 1; loop { a < 0 ? break; break 5 }");
    assert_eq!(err, TypeErrorKind::IncompatibleTypes { first: text("void"), second: text("int") });

    let err = check_err("a = 1; loop { a < 0 ? break 5; break }");
    assert_eq!(err, TypeErrorKind::IncompatibleTypes { first: text("int"), second: text("void") });

    let ast = check("a = 1; loop { a < 0 ? break 1; break 5 }").unwrap();
    assert_eq!(entry_type(&ast), "int");

    check("fn f(int a) { a < 0 ? return; a }").unwrap();
}

#[test]
fn test_block_hands_back_its_own_local() {
    check(
        "class Leaf { v = 0; }
         class Node { child = Leaf; }
         n = Node;
         n.child := { p = Leaf; p }",
    )
    .unwrap();

    let ast = check("class Leaf { v = 0; } x = { p = Leaf; p }; x").unwrap();
    assert_eq!(entry_type(&ast), "*test::Leaf");

    let err = check_err(
        "class Leaf { v = 0; }
         class Node { child = Leaf; }
         n = Node;
         p = Leaf;
         n.child := { p }",
    );
    assert_eq!(
        err,
        TypeErrorKind::InvalidOwnershipConversion { expected: text("*test::Leaf"), actual: text("test::Leaf") }
    );
}

#[test]
fn test_methods_call_through_this() {
    let ast = check(
        "class C { x = 1; m() int { x } n() int { m() + this.x } }
         c = C;
         c.n()",
    )
    .unwrap();
    assert_eq!(entry_type(&ast), "int");
}

#[test]
fn test_weak_of_pinned_field_read_is_stable() {
    let ast = check(
        "class Point { x = 0; }
         class Holder { p = Point; }
         h = Holder;
         w = &h.p;
         v = &h.p;
         w ? _.x : 0",
    )
    .unwrap();
    assert_eq!(entry_type(&ast), "int");
    let weak: Vec<_> = actions(&ast, "ToWeak").map(|a| a.ty.fixed().unwrap()).collect();
    assert_eq!(weak.len(), 2);
    assert_eq!(weak[0], weak[1]);
    assert_eq!(ast.type_name(weak[0]), "&test::Point");
}
