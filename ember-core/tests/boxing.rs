mod common;

use common::*;
use ember_ast::{BoxingOp, ExprId, FunctionId, span};
use ember_core::{
    AnalysisOptions, DiagnosticSink, Function, FunctionAnalyser, GenericParam, Package, Param,
    SemanticError, TypeExpectation,
};
use ember_types::{Type, TypeRegistry};

struct Fixture {
    package: Package,
    main: FunctionId,
    print_generic: FunctionId,
}

fn fixture() -> Fixture {
    let mut registry = TypeRegistry::prelude();
    registry.declare_protocol("Printable");
    registry.declare_primitive_conformance(&Type::Int, "Printable");
    let printable = Type::Protocol("Printable".into());
    let t = Type::local_generic(0, "T");

    let mut package = Package::new("main", registry);
    let at = span(0, 1);
    package.declare(Function::new("take_any", at).with_params(vec![Param::new("x", Type::Something)]));
    package.declare(Function::new("take_printable", at).with_params(vec![Param::new("x", printable.clone())]));
    package.declare(
        Function::new("take_opt", at).with_params(vec![Param::new("x", Type::optional(Type::Int))]),
    );
    package.declare(
        Function::new("take_opt_any", at)
            .with_params(vec![Param::new("x", Type::optional(Type::Something))]),
    );
    package.declare(Function::new("take_int", at).with_params(vec![Param::new("x", Type::Int)]));
    package.declare(Function::new("maybe", at).returning(Type::optional(Type::Int)));
    package.declare(Function::new("maybe_any", at).returning(Type::optional(Type::Something)));
    package.declare(Function::new("give", at).returning(Type::Something));
    package.declare(
        Function::new("identity", at)
            .with_generics(vec![GenericParam::new("T")])
            .with_params(vec![Param::new("x", t.clone())])
            .returning(t.clone()),
    );
    package.declare(
        Function::new("wrap", at)
            .with_generics(vec![GenericParam::new("T")])
            .with_params(vec![Param::new("x", t.clone())])
            .returning(Type::optional(t.clone())),
    );
    let print_generic = package.declare(
        Function::new("print_generic", at)
            .with_generics(vec![GenericParam::constrained("T", printable)])
            .with_params(vec![Param::new("x", t)]),
    );
    let main = package.declare(Function::new("main", span(0, 4)));
    Fixture {
        package,
        main,
        print_generic,
    }
}

fn boxing_of(builder: &BodyBuilder, slot: ExprId) -> Option<BoxingOp> {
    builder.body.arena.get(slot).boxing().cloned()
}

fn ty_of(builder: &BodyBuilder, slot: ExprId) -> Option<Type> {
    builder.body.arena.get(slot).ty.clone()
}

#[test]
fn simple_value_is_boxed_for_something() {
    let fx = fixture();
    let mut b = BodyBuilder::new();
    let one = b.int(1);
    let call = b.call("take_any", vec![one]);
    b.expr(call);

    let reports = analyse(&fx.package, fx.main, &mut b.body);

    assert!(reports.is_empty(), "{reports:?}");
    assert_eq!(
        boxing_of(&b, one),
        Some(BoxingOp::Box {
            value_type: Type::Int,
            protocol: None
        })
    );
    assert_eq!(ty_of(&b, one), Some(Type::boxed(Type::Int)));
    assert_eq!(b.body.arena.conversion_depth(one), 1);
}

#[test]
fn protocol_box_carries_the_conformance() {
    let fx = fixture();
    let mut b = BodyBuilder::new();
    let one = b.int(1);
    let call = b.call("take_printable", vec![one]);
    b.expr(call);

    let reports = analyse(&fx.package, fx.main, &mut b.body);

    assert!(reports.is_empty(), "{reports:?}");
    assert_eq!(
        boxing_of(&b, one),
        Some(BoxingOp::Box {
            value_type: Type::Int,
            protocol: Some("Printable".into())
        })
    );
    assert_eq!(ty_of(&b, one), Some(Type::Protocol("Printable".into())));
}

#[test]
fn simple_optional_is_boxed_with_box_optional() {
    let fx = fixture();
    let mut b = BodyBuilder::new();
    let maybe = b.call("maybe", vec![]);
    let call = b.call("take_opt_any", vec![maybe]);
    b.expr(call);

    let reports = analyse(&fx.package, fx.main, &mut b.body);

    assert!(reports.is_empty(), "{reports:?}");
    assert_eq!(
        boxing_of(&b, maybe),
        Some(BoxingOp::BoxOptional {
            value_type: Type::Int
        })
    );
    assert_eq!(ty_of(&b, maybe), Some(Type::boxed(Type::optional(Type::Int))));
}

#[test]
fn value_is_wrapped_for_a_simple_optional() {
    let fx = fixture();
    let mut b = BodyBuilder::new();
    let one = b.int(1);
    let call = b.call("take_opt", vec![one]);
    b.expr(call);

    let reports = analyse(&fx.package, fx.main, &mut b.body);

    assert!(reports.is_empty(), "{reports:?}");
    assert_eq!(boxing_of(&b, one), Some(BoxingOp::WrapOptional));
    assert_eq!(ty_of(&b, one), Some(Type::optional(Type::Int)));
}

#[test]
fn generic_result_is_unboxed_for_an_annotated_binding() {
    let fx = fixture();
    let mut b = BodyBuilder::new();
    let five = b.int(5);
    let call = b.call("identity", vec![five]);
    b.let_("y", Some(ty("Int")), call);

    let reports = analyse(&fx.package, fx.main, &mut b.body);

    assert!(reports.is_empty(), "{reports:?}");
    assert_eq!(boxing_of(&b, call), Some(BoxingOp::Unbox { to: Type::Int }));
    assert_eq!(ty_of(&b, call), Some(Type::Int));
    assert!(matches!(boxing_of(&b, five), Some(BoxingOp::Box { .. })));
    for i in 0..b.body.arena.len() {
        assert!(b.body.arena.get(ExprId(i as u32)).ty.is_some(), "node {i} untyped");
    }
}

#[test]
fn inferred_binding_prefers_simple_storage() {
    let fx = fixture();
    let mut b = BodyBuilder::new();
    let five = b.int(5);
    let call = b.call("identity", vec![five]);
    b.let_("y", None, call);
    let y = b.local("y");
    let take = b.call("take_int", vec![y]);
    b.expr(take);

    let reports = analyse(&fx.package, fx.main, &mut b.body);

    assert!(reports.is_empty(), "{reports:?}");
    assert_eq!(boxing_of(&b, call), Some(BoxingOp::Unbox { to: Type::Int }));
    // `y` is already simple, so passing it on needs nothing.
    assert_eq!(boxing_of(&b, y), None);
}

#[test]
fn something_does_not_flow_into_int() {
    let fx = fixture();
    let mut b = BodyBuilder::new();
    let give = b.call("give", vec![]);
    b.let_("y", Some(ty("Int")), give);

    let reports = analyse(&fx.package, fx.main, &mut b.body);

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].function, "main");
    assert!(matches!(
        &reports[0].error,
        SemanticError::TypeMismatch { expected, actual, .. } if expected == "Int" && actual == "Something"
    ));
}

#[test]
fn optional_is_not_accepted_where_a_value_is_expected() {
    let fx = fixture();
    let mut b = BodyBuilder::new();
    let maybe = b.call("maybe", vec![]);
    let call = b.call("take_int", vec![maybe]);
    b.expr(call);

    let reports = analyse(&fx.package, fx.main, &mut b.body);

    assert_eq!(reports.len(), 1);
    assert!(matches!(reports[0].error, SemanticError::TypeMismatch { .. }));
    assert_eq!(boxing_of(&b, maybe), None);
}

#[test]
fn a_node_is_complied_only_once() {
    let fx = fixture();
    let mut b = BodyBuilder::new();
    let one = b.int(1);
    let sink = DiagnosticSink::new();
    let options = AnalysisOptions::default();
    let mut analyser = FunctionAnalyser::new(&fx.package, fx.main, &mut b.body, &sink, &options);

    let expectation = TypeExpectation::new(Type::Something);
    let first = analyser.expect(&expectation, one);
    let second = analyser.expect(&expectation, one);

    assert_eq!(first, Ok(Type::boxed(Type::Int)));
    assert_eq!(second, first);
    assert_eq!(b.body.arena.conversion_depth(one), 1);
}

#[test]
fn forced_box_boxes_a_simple_expectation() {
    let fx = fixture();
    let mut b = BodyBuilder::new();
    let one = b.int(1);
    let sink = DiagnosticSink::new();
    let options = AnalysisOptions::default();
    let mut analyser = FunctionAnalyser::new(&fx.package, fx.main, &mut b.body, &sink, &options);

    let ty = analyser.expect(&TypeExpectation::forced_box(Type::Int), one);

    assert_eq!(ty, Ok(Type::boxed(Type::Int)));
    assert!(matches!(boxing_of(&b, one), Some(BoxingOp::Box { protocol: None, .. })));
}

#[test]
fn unwrap_of_a_simple_optional() {
    let fx = fixture();
    let mut b = BodyBuilder::new();
    let maybe = b.call("maybe", vec![]);
    let unwrap = b.unwrap(maybe);
    let take = b.call("take_int", vec![unwrap]);
    b.expr(take);

    let reports = analyse(&fx.package, fx.main, &mut b.body);

    assert!(reports.is_empty(), "{reports:?}");
    assert_eq!(boxing_of(&b, maybe), Some(BoxingOp::UnwrapOptional));
    assert_eq!(ty_of(&b, unwrap), Some(Type::Int));
}

#[test]
fn unwrap_of_a_boxed_optional() {
    let fx = fixture();
    let mut b = BodyBuilder::new();
    let maybe = b.call("maybe_any", vec![]);
    let unwrap = b.unwrap(maybe);
    let take = b.call("take_any", vec![unwrap]);
    b.expr(take);

    let reports = analyse(&fx.package, fx.main, &mut b.body);

    assert!(reports.is_empty(), "{reports:?}");
    assert_eq!(boxing_of(&b, maybe), Some(BoxingOp::UnwrapBoxOptional));
    assert_eq!(ty_of(&b, unwrap), Some(Type::Something));
    assert_eq!(boxing_of(&b, unwrap), None);
}

#[test]
fn generic_value_is_reboxed_for_its_protocol() {
    let fx = fixture();
    let mut b = BodyBuilder::new();
    let x = b.local("x");
    let call = b.call("take_printable", vec![x]);
    b.expr(call);

    let reports = analyse(&fx.package, fx.print_generic, &mut b.body);

    assert!(reports.is_empty(), "{reports:?}");
    assert_eq!(
        boxing_of(&b, x),
        Some(BoxingOp::Rebox {
            protocol: "Printable".into()
        })
    );
}

#[test]
fn optional_of_a_generic_unboxes_to_a_simple_optional() {
    let fx = fixture();
    let mut b = BodyBuilder::new();
    let five = b.int(5);
    let call = b.call("wrap", vec![five]);
    b.let_("y", Some(optional_ty("Int")), call);

    let reports = analyse(&fx.package, fx.main, &mut b.body);

    assert!(reports.is_empty(), "{reports:?}");
    assert_eq!(
        boxing_of(&b, call),
        Some(BoxingOp::UnboxOptional {
            to: Type::optional(Type::Int)
        })
    );
    assert_eq!(ty_of(&b, call), Some(Type::optional(Type::Int)));
}

#[test]
fn inferred_binding_of_a_generic_optional_unboxes() {
    let fx = fixture();
    let mut b = BodyBuilder::new();
    let five = b.int(5);
    let call = b.call("wrap", vec![five]);
    b.let_("y", None, call);
    let y = b.local("y");
    let use_y = b.call("take_opt", vec![y]);
    b.expr(use_y);

    let reports = analyse(&fx.package, fx.main, &mut b.body);

    assert!(reports.is_empty(), "{reports:?}");
    assert_eq!(
        boxing_of(&b, call),
        Some(BoxingOp::UnboxOptional {
            to: Type::optional(Type::Int)
        })
    );
    assert_eq!(ty_of(&b, call), Some(Type::optional(Type::Int)));
    assert_eq!(boxing_of(&b, y), None);
}

#[test]
fn no_value_takes_the_expected_optional_without_conversion() {
    let fx = fixture();
    let mut b = BodyBuilder::new();
    let simple = b.no_value();
    let call = b.call("take_opt", vec![simple]);
    b.expr(call);
    let boxed = b.no_value();
    let call = b.call("take_opt_any", vec![boxed]);
    b.expr(call);

    let reports = analyse(&fx.package, fx.main, &mut b.body);

    assert!(reports.is_empty(), "{reports:?}");
    assert_eq!(ty_of(&b, simple), Some(Type::optional(Type::Int)));
    assert_eq!(boxing_of(&b, simple), None);
    assert_eq!(ty_of(&b, boxed), Some(Type::optional(Type::Something)));
    assert_eq!(boxing_of(&b, boxed), None);
}

#[test]
fn no_value_needs_an_optional_expectation() {
    let fx = fixture();
    let mut b = BodyBuilder::new();
    let nothing = b.no_value();
    let call = b.call("take_int", vec![nothing]);
    b.expr(call);
    let unexpected = b.no_value();
    b.let_("z", None, unexpected);

    let reports = analyse(&fx.package, fx.main, &mut b.body);

    assert_eq!(reports.len(), 2, "{reports:?}");
    assert!(reports
        .iter()
        .all(|r| matches!(r.error, SemanticError::NoValueWithoutOptional { .. })));
}
