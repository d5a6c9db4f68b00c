mod common;

use common::*;
use ember_ast::{BoxingOp, ExprId, ExprKind, FunctionId, span};
use ember_core::{Function, GenericParam, Package, Param, SemanticError};
use ember_types::{ClassDef, Type, TypeRegistry};

fn package() -> (Package, FunctionId) {
    let mut registry = TypeRegistry::prelude();
    registry.declare_protocol("Printable");
    registry.declare_class(
        "Animal",
        ClassDef {
            protocols: vec!["Printable".into()],
            ..ClassDef::default()
        },
    );
    registry.declare_class(
        "Dog",
        ClassDef {
            superclass: Some(Type::class("Animal")),
            ..ClassDef::default()
        },
    );
    registry.declare_class(
        "Cat",
        ClassDef {
            superclass: Some(Type::class("Animal")),
            ..ClassDef::default()
        },
    );

    let t = Type::local_generic(0, "T");
    let at = span(0, 1);
    let mut package = Package::new("main", registry);
    package.declare(
        Function::new("pair", at)
            .with_generics(vec![GenericParam::new("T")])
            .with_params(vec![Param::new("a", t.clone()), Param::new("b", t.clone())])
            .returning(t.clone()),
    );
    package.declare(
        Function::new("unused", at)
            .with_generics(vec![GenericParam::new("T")])
            .with_params(vec![Param::new("a", Type::Int)]),
    );
    package.declare(
        Function::new("show", at)
            .with_generics(vec![GenericParam::constrained(
                "T",
                Type::Protocol("Printable".into()),
            )])
            .with_params(vec![Param::new("a", t.clone())]),
    );
    package.declare(
        Function::new("first", at)
            .with_generics(vec![GenericParam::new("T")])
            .with_params(vec![Param::new("a", Type::optional(t.clone()))])
            .returning(t),
    );
    package.declare(Function::new("dog", at).returning(Type::class("Dog")));
    package.declare(Function::new("cat", at).returning(Type::class("Cat")));
    let main = package.declare(Function::new("main", span(0, 4)));
    (package, main)
}

fn resolved_generics(b: &BodyBuilder, call: ExprId) -> Vec<Type> {
    match &b.body.arena.get(call).kind {
        ExprKind::Call(node) => node.arguments.resolved_generic_args.clone(),
        ExprKind::Conversion { inner, .. } => resolved_generics(b, *inner),
        other => panic!("not a call: {other:?}"),
    }
}

#[test]
fn equal_arguments_infer_their_type() {
    let (package, main) = package();
    let mut b = BodyBuilder::new();
    let one = b.int(1);
    let two = b.int(2);
    let call = b.call("pair", vec![one, two]);
    b.expr(call);

    let reports = analyse(&package, main, &mut b.body);

    assert!(reports.is_empty(), "{reports:?}");
    assert_eq!(resolved_generics(&b, call), vec![Type::Int]);
    assert_eq!(b.body.arena.get(call).ty, Some(Type::boxed(Type::Int)));
    for arg in [one, two] {
        assert!(matches!(
            b.body.arena.get(arg).boxing(),
            Some(BoxingOp::Box { value_type: Type::Int, .. })
        ));
        assert_eq!(b.body.arena.conversion_depth(arg), 1);
    }
}

#[test]
fn unrelated_arguments_infer_something() {
    let (package, main) = package();
    let mut b = BodyBuilder::new();
    let one = b.int(1);
    let text = b.string("one");
    let call = b.call("pair", vec![one, text]);
    b.expr(call);

    let reports = analyse(&package, main, &mut b.body);

    assert!(reports.is_empty(), "{reports:?}");
    assert_eq!(resolved_generics(&b, call), vec![Type::Something]);
}

#[test]
fn sibling_classes_infer_their_superclass() {
    let (package, main) = package();
    let mut b = BodyBuilder::new();
    let dog = b.call("dog", vec![]);
    let cat = b.call("cat", vec![]);
    let call = b.call("pair", vec![dog, cat]);
    b.expr(call);

    let reports = analyse(&package, main, &mut b.body);

    assert!(reports.is_empty(), "{reports:?}");
    assert_eq!(resolved_generics(&b, call), vec![Type::class("Animal")]);
}

#[test]
fn optional_parameters_see_through_the_wrapper() {
    let (package, main) = package();
    let mut b = BodyBuilder::new();
    let one = b.int(1);
    let call = b.call("first", vec![one]);
    b.expr(call);

    let reports = analyse(&package, main, &mut b.body);

    assert!(reports.is_empty(), "{reports:?}");
    assert_eq!(resolved_generics(&b, call), vec![Type::Int]);
}

#[test]
fn generic_without_candidates_fails_once() {
    let (package, main) = package();
    let mut b = BodyBuilder::new();
    let one = b.int(1);
    let call = b.call("unused", vec![one]);
    b.expr(call);

    let reports = analyse(&package, main, &mut b.body);

    assert_eq!(reports.len(), 1);
    assert!(matches!(
        &reports[0].error,
        SemanticError::InferenceFailure { parameter, .. } if parameter == "T"
    ));
    assert_eq!(b.body.arena.get(one).boxing(), None);
}

#[test]
fn inferred_type_must_satisfy_the_constraint() {
    let (package, main) = package();
    let mut b = BodyBuilder::new();
    let one = b.int(1);
    let call = b.call("show", vec![one]);
    b.expr(call);

    let reports = analyse(&package, main, &mut b.body);

    assert_eq!(reports.len(), 1);
    assert!(matches!(
        &reports[0].error,
        SemanticError::InferenceFailure { reason, .. } if reason.contains("Printable")
    ));
}

#[test]
fn inferred_type_satisfying_the_constraint_is_accepted() {
    let (package, main) = package();
    let mut b = BodyBuilder::new();
    let dog = b.call("dog", vec![]);
    let call = b.call("show", vec![dog]);
    b.expr(call);

    let reports = analyse(&package, main, &mut b.body);

    assert!(reports.is_empty(), "{reports:?}");
    assert_eq!(resolved_generics(&b, call), vec![Type::class("Dog")]);
}

#[test]
fn explicit_arguments_are_counted() {
    let (package, main) = package();
    let mut b = BodyBuilder::new();
    let one = b.int(1);
    let two = b.int(2);
    let call = b.call_with_generics("pair", vec![ty("Int"), ty("Int")], vec![one, two]);
    b.expr(call);

    let reports = analyse(&package, main, &mut b.body);

    assert_eq!(reports.len(), 1);
    assert!(matches!(reports[0].error, SemanticError::InferenceFailure { .. }));
}

#[test]
fn explicit_arguments_are_checked_against_constraints() {
    let (package, main) = package();
    let mut b = BodyBuilder::new();
    let one = b.int(1);
    let call = b.call_with_generics("show", vec![ty("Int")], vec![one]);
    b.expr(call);

    let reports = analyse(&package, main, &mut b.body);

    assert_eq!(reports.len(), 1);
    assert!(matches!(reports[0].error, SemanticError::TypeMismatch { .. }));
}

#[test]
fn explicit_arguments_drive_the_signature() {
    let (package, main) = package();
    let mut b = BodyBuilder::new();
    let one = b.int(1);
    let two = b.int(2);
    let call = b.call_with_generics("pair", vec![ty("Something")], vec![one, two]);
    b.let_("x", None, call);

    let reports = analyse(&package, main, &mut b.body);

    assert!(reports.is_empty(), "{reports:?}");
    assert_eq!(resolved_generics(&b, call), vec![Type::Something]);
    assert_eq!(b.body.arena.get(call).ty, Some(Type::boxed(Type::Something)));
}
