use std::rc::Rc;

use polyinfer::{
    class,
    errors::{InferErrorKind, InferResult},
    expr::{DependentBody, Expr, FixedBody, Invocation, LambdaParams, MethodSig, RefResolver},
    infer::{BoundSet, ConstraintFormula, InferenceContext, InferenceState, NullHints, Relation, TypeBound},
    logging,
    options::InferenceOptions,
    param,
    span::Span,
    typing::{ClassDecl, ClassTable, InferVar, InvocationMode, PrimTy, Ty, TyParamDecl, TypeOracle},
};

fn init() {
    logging::init(log::LevelFilter::Warn);
}

fn string(at: usize) -> Expr {
    Expr::standalone(Span::at(1, at, at + 3), class!("String"))
}

/// `<T, R> R choose(T a, T b)`
fn choose() -> MethodSig {
    MethodSig::new("choose")
        .type_param(TyParamDecl::new("choose", "T"))
        .type_param(TyParamDecl::new("choose", "R"))
        .param(param!("choose", "T"))
        .param(param!("choose", "T"))
        .returns(param!("choose", "R"))
}

/// `<T> List<T> of(T a)`
fn list_of() -> MethodSig {
    MethodSig::new("of")
        .type_param(TyParamDecl::new("of", "T"))
        .param(param!("of", "T"))
        .returns(class!("List", param!("of", "T")))
}

/// `<T> List<T> singleton(T a)`
fn singleton() -> MethodSig {
    MethodSig::new("singleton")
        .type_param(TyParamDecl::new("singleton", "T"))
        .param(param!("singleton", "T"))
        .returns(class!("List", param!("singleton", "T")))
}

/// `<E> E head(List<E> l)`
fn head() -> MethodSig {
    MethodSig::new("head")
        .type_param(TyParamDecl::new("head", "E"))
        .param(class!("List", param!("head", "E")))
        .returns(param!("head", "E"))
}

#[test]
fn test_choose_under_loose_invocation() -> InferResult {
    init();
    let table = ClassTable::with_builtins();
    let args = vec![
        string(7),
        Expr::standalone(Span::at(1, 12, 13), class!("Integer")),
    ];
    let mut ctx = InferenceContext::for_call(&table, Span::at(1, 0, 14), choose(), args, InferenceOptions::default());
    ctx.infer_applicability_in(InvocationMode::Loose)?;
    assert_eq!(ctx.state(), InferenceState::ApplicabilityInferred);

    let t = ctx.site_variables()[0];
    let upper = ctx.bounds().upper_bounds(t);
    assert_eq!(upper, vec![&class!("Object")]);

    let inst = ctx.instantiation(t).map(|i| i.ty).unwrap();
    assert!(table.is_subtype(&class!("String"), &inst));
    assert!(table.is_subtype(&class!("Integer"), &inst));
    Ok(())
}

#[test]
fn test_lambda_argument_waits_for_target() -> InferResult {
    init();
    let table = ClassTable::with_builtins();
    let lambda = Expr::lambda(Span::at(2, 3, 11), LambdaParams::Implicit(0), FixedBody::void_block());
    let mut ctx = InferenceContext::for_call(
        &table,
        Span::at(2, 0, 12),
        list_of(),
        vec![lambda],
        InferenceOptions::default(),
    );

    ctx.infer_applicability()?;
    let t = ctx.site_variables()[0];
    assert!(ctx.bounds().lower_bounds(t).is_empty());

    let target = class!("List", class!("Runnable"));
    let solution = ctx.infer_invocation_type(Some(&target))?;
    assert_eq!(solution, vec![class!("Runnable")]);
    Ok(())
}

#[test]
fn test_exact_constructor_reference_allocates_nothing() -> InferResult {
    init();
    let table = ClassTable::with_builtins();
    let mut ctx = InferenceContext::for_call(
        &table,
        Span::at(3, 0, 20),
        list_of(),
        vec![string(4)],
        InferenceOptions::default(),
    );
    ctx.infer_applicability()?;
    let before = ctx.variable_count();

    let ctor = MethodSig::constructor(class!("Integer")).param(class!("String"));
    let mref = Expr::exact_ref(Span::at(3, 30, 40), ctor, None);
    let formula = ConstraintFormula::expression(mref, class!("Function", class!("String"), class!("Object")));
    ctx.reduce_and_incorporate(vec![formula])?;
    assert_eq!(ctx.variable_count(), before);
    Ok(())
}

#[test]
fn test_incompatible_bounds_fail() {
    init();
    let table = ClassTable::with_builtins();
    let mut bs = BoundSet::new();
    bs.add_bound(TypeBound::new(InferVar(0), Relation::Supertype, class!("String")));
    bs.add_bound(TypeBound::new(InferVar(0), Relation::Subtype, class!("Integer")));
    let err = bs.incorporate(&table, &InferenceOptions::default()).unwrap_err();
    assert!(matches!(err.kind, InferErrorKind::Contradiction(_)));

    // the same conflict reached through an invocation
    let take = MethodSig::new("take")
        .type_param(TyParamDecl::new("take", "T").bounded(class!("Integer")))
        .param(param!("take", "T"));
    let mut ctx = InferenceContext::for_call(&table, Span::at(4, 0, 10), take, vec![string(5)], InferenceOptions::default());
    let err = ctx.infer_applicability().unwrap_err();
    assert!(err.is_recoverable());
    let t = ctx.site_variables()[0];
    assert!(ctx.instantiation(t).map_or(true, |i| i.ty != class!("Object")));
}

#[test]
fn test_nested_generic_invocation() -> InferResult {
    init();
    let table = ClassTable::with_builtins();
    let inner_site = Span::at(5, 5, 20);
    let inner = Expr::invocation(inner_site, singleton(), vec![string(15)]);
    let mut ctx = InferenceContext::for_call(&table, Span::at(5, 0, 21), head(), vec![inner], InferenceOptions::default());

    let solution = ctx.infer_invocation_type(Some(&class!("String")))?;
    assert_eq!(solution, vec![class!("String")]);

    let singleton_t = polyinfer::typing::TyParam::new("singleton", "T");
    assert_eq!(
        ctx.solutions(&[singleton_t], inner_site),
        Some(vec![class!("String")])
    );
    Ok(())
}

#[test]
fn test_void_method_in_value_context_aborts() -> InferResult {
    init();
    let table = ClassTable::with_builtins();
    let sink = MethodSig::new("sink")
        .type_param(TyParamDecl::new("sink", "T"))
        .param(param!("sink", "T"));
    let mut ctx = InferenceContext::for_call(&table, Span::at(6, 0, 9), sink, vec![string(5)], InferenceOptions::default());
    ctx.infer_applicability()?;
    let err = ctx.infer_invocation_type(Some(&class!("String"))).unwrap_err();
    assert!(!err.is_recoverable());
    assert!(matches!(err.kind, InferErrorKind::Aborted(_)));
    Ok(())
}

fn throwing_table() -> ClassTable {
    let mut table = ClassTable::with_builtins();
    let action = ClassDecl::interface("Action").param("X", vec![class!("Exception")]);
    let x = action.p("X");
    table.declare(action.sam(vec![], Ty::Void, vec![x]));
    table
}

/// `<X extends Exception> void attempt(Action<X> a) throws X`
fn attempt() -> MethodSig {
    MethodSig::new("attempt")
        .type_param(TyParamDecl::new("attempt", "X").bounded(class!("Exception")))
        .param(class!("Action", param!("attempt", "X")))
        .throws(param!("attempt", "X"))
}

#[test]
fn test_thrown_type_is_inferred_from_the_lambda_body() -> InferResult {
    init();
    let table = throwing_table();
    let body = FixedBody::void_block().throwing(class!("IOException"));
    let lambda = Expr::lambda(Span::at(7, 8, 30), LambdaParams::Implicit(0), body);
    let mut ctx = InferenceContext::for_call(&table, Span::at(7, 0, 31), attempt(), vec![lambda], InferenceOptions::default());
    assert_eq!(ctx.infer_invocation_type(None)?, vec![class!("IOException")]);
    Ok(())
}

#[test]
fn test_unconstrained_thrown_type_is_unchecked() -> InferResult {
    init();
    let table = throwing_table();
    let lambda = Expr::lambda(Span::at(8, 8, 20), LambdaParams::Implicit(0), FixedBody::void_block());
    let mut ctx = InferenceContext::for_call(&table, Span::at(8, 0, 21), attempt(), vec![lambda], InferenceOptions::default());
    assert_eq!(ctx.infer_invocation_type(None)?, vec![class!("RuntimeException")]);
    Ok(())
}

#[test]
fn test_propagation_reaches_nested_sites() -> InferResult {
    init();
    let table = ClassTable::with_builtins();
    let inner_site = Span::at(9, 5, 20);
    let inner = Expr::invocation(inner_site, singleton(), vec![string(15)]);
    let outer_site = Span::at(9, 0, 21);
    let mut ctx = InferenceContext::for_call(&table, outer_site, head(), vec![inner], InferenceOptions::default());
    ctx.infer_invocation_type(Some(&class!("CharSequence")))?;

    let bindings = ctx.propagate()?;
    assert_eq!(bindings.len(), 2);
    assert_eq!(bindings.get(outer_site), Some(&[class!("String")][..]));
    assert_eq!(bindings.get(inner_site), Some(&[class!("String")][..]));
    assert_eq!(ctx.state(), InferenceState::BindingsPropagated);

    let err = ctx.infer_invocation_type(None).unwrap_err();
    assert!(matches!(err.kind, InferErrorKind::Aborted(_)));
    Ok(())
}

#[test]
fn test_declared_hints_reach_the_instantiation() -> InferResult {
    init();
    let table = ClassTable::with_builtins();
    let id = MethodSig::new("id")
        .type_param(TyParamDecl::new("id", "T").with_hints(NullHints::NON_NULL))
        .param(param!("id", "T"))
        .returns(param!("id", "T"));
    let mut ctx = InferenceContext::for_call(&table, Span::at(10, 0, 8), id, vec![string(3)], InferenceOptions::default());
    ctx.infer_invocation_type(None)?;
    let t = ctx.site_variables()[0];
    let inst = ctx.instantiation(t).unwrap();
    assert_eq!(inst.to_string(), "@NonNull String");
    Ok(())
}

#[test]
fn test_raw_fallback_needs_the_option() {
    init();
    let table = ClassTable::with_builtins();
    let strict = InferenceContext::for_call(&table, Span::at(11, 0, 5), list_of(), vec![], InferenceOptions::strict());
    assert_eq!(strict.fallback_return_type(None), None);

    let lenient = InferenceContext::for_call(&table, Span::at(11, 0, 5), list_of(), vec![], InferenceOptions::compatible());
    assert_eq!(lenient.fallback_return_type(Some(&class!("Object"))), Some(class!("List")));
    assert_eq!(lenient.fallback_return_type(Some(&class!("String"))), None);
}

/// `<R> R call(Supplier<R> s)`
fn call() -> MethodSig {
    MethodSig::new("call")
        .type_param(TyParamDecl::new("call", "R"))
        .param(class!("Supplier", param!("call", "R")))
        .returns(param!("call", "R"))
}

#[test]
fn test_void_lambda_body_is_not_a_supplier() {
    init();
    let table = ClassTable::with_builtins();
    let body = FixedBody::expression(Expr::standalone(Span::at(12, 11, 19), Ty::Void));
    let lambda = Expr::lambda(Span::at(12, 5, 19), LambdaParams::Implicit(0), body);
    let mut ctx = InferenceContext::for_call(&table, Span::at(12, 0, 20), call(), vec![lambda], InferenceOptions::default());
    let err = ctx.infer_applicability().unwrap_err();
    assert!(err.is_recoverable());
    assert!(matches!(err.kind, InferErrorKind::Contradiction(_)));
}

/// `<T, R> R apply(T a, Function<T, R> f)`
fn apply() -> MethodSig {
    MethodSig::new("apply")
        .type_param(TyParamDecl::new("apply", "T"))
        .type_param(TyParamDecl::new("apply", "R"))
        .param(param!("apply", "T"))
        .param(class!("Function", param!("apply", "T"), param!("apply", "R")))
        .returns(param!("apply", "R"))
}

#[test]
fn test_implicit_lambda_result_follows_its_parameter() -> InferResult {
    init();
    let table = ClassTable::with_builtins();
    let identity = || {
        let at = Span::at(13, 16, 22);
        let body = DependentBody::expression(move |ps: &[Ty]| vec![Expr::standalone(at, ps[0].clone())]);
        Expr::lambda(at, LambdaParams::Implicit(1), body)
    };
    let expected = vec![class!("String"), class!("String")];

    for options in [InferenceOptions::default(), InferenceOptions::compatible()].iter() {
        let args = vec![string(9), identity()];
        let mut ctx = InferenceContext::for_call(&table, Span::at(13, 0, 23), apply(), args, options.clone());
        assert_eq!(ctx.infer_invocation_type(None)?, expected);

        let args = vec![string(9), identity()];
        let mut ctx = InferenceContext::for_call(&table, Span::at(13, 0, 23), apply(), args, options.clone());
        assert_eq!(ctx.infer_invocation_type(Some(&class!("CharSequence")))?, expected);
    }
    Ok(())
}

/// Resolves `String::length`.
#[derive(Debug)]
struct StringMethods;

impl RefResolver for StringMethods {
    fn resolve(&self, params: &[Ty]) -> Option<MethodSig> {
        match params {
            [receiver] if *receiver == class!("String") => {
                Some(MethodSig::new("length").returns(Ty::Prim(PrimTy::Int)))
            }
            _ => None,
        }
    }
}

#[test]
fn test_inexact_method_reference_boxes_its_result() -> InferResult {
    init();
    let table = ClassTable::with_builtins();
    let length = Expr::inexact_ref(Span::at(14, 16, 30), StringMethods, Some(class!("String")));
    let mut ctx = InferenceContext::for_call(
        &table,
        Span::at(14, 0, 31),
        apply(),
        vec![string(9), length],
        InferenceOptions::default(),
    );
    assert_eq!(ctx.infer_applicability()?, InvocationMode::Strict);
    assert_eq!(ctx.infer_invocation_type(None)?, vec![class!("String"), class!("Integer")]);
    Ok(())
}

#[test]
fn test_conditional_operands_constrain_separately() -> InferResult {
    init();
    let table = ClassTable::with_builtins();
    let cond = Expr::conditional(
        Span::at(15, 3, 20),
        string(10),
        Expr::standalone(Span::at(15, 18, 20), class!("Integer")),
    );
    let mut ctx = InferenceContext::for_call(&table, Span::at(15, 0, 21), list_of(), vec![cond], InferenceOptions::default());
    ctx.infer_applicability()?;
    let t = ctx.site_variables()[0];
    let lower = ctx.bounds().lower_bounds(t);
    assert!(lower.contains(&&class!("String")));
    assert!(lower.contains(&&class!("Integer")));
    Ok(())
}

#[test]
fn test_explicit_type_arguments_fix_the_instantiation() -> InferResult {
    init();
    let table = ClassTable::with_builtins();
    let explicit = |ty: Ty| Invocation {
        span: Span::at(16, 0, 25),
        method: Rc::new(list_of()),
        args: vec![string(20)],
        type_args: Some(vec![ty]),
    };

    let mut ctx = InferenceContext::new(&table, &explicit(class!("CharSequence")), InferenceOptions::default());
    assert_eq!(ctx.infer_invocation_type(None)?, vec![class!("CharSequence")]);

    let mut ctx = InferenceContext::new(&table, &explicit(class!("Integer")), InferenceOptions::default());
    assert!(ctx.infer_applicability().is_err());

    // an explicitly typed inner call is a standalone argument
    let inner = Expr::explicit_invocation(Span::at(17, 5, 30), singleton(), vec![class!("CharSequence")], vec![string(25)]);
    let mut ctx = InferenceContext::for_call(&table, Span::at(17, 0, 31), head(), vec![inner], InferenceOptions::default());
    assert_eq!(ctx.infer_invocation_type(Some(&class!("Object")))?, vec![class!("CharSequence")]);
    Ok(())
}

/// `<T> List<T> gather(T... xs)`
fn gather() -> MethodSig {
    MethodSig::new("gather")
        .type_param(TyParamDecl::new("gather", "T"))
        .param(Ty::array(param!("gather", "T")))
        .returns(class!("List", param!("gather", "T")))
        .variable_arity()
}

#[test]
fn test_variable_arity_call() -> InferResult {
    init();
    let table = ClassTable::with_builtins();
    let args = vec![
        string(7),
        Expr::standalone(Span::at(18, 12, 13), class!("Integer")),
        string(15),
    ];
    let mut ctx = InferenceContext::for_call(&table, Span::at(18, 0, 20), gather(), args, InferenceOptions::default());
    assert_eq!(ctx.infer_applicability()?, InvocationMode::Varargs);

    let solution = ctx.infer_invocation_type(None)?;
    assert!(table.is_subtype(&class!("String"), &solution[0]));
    assert!(table.is_subtype(&class!("Integer"), &solution[0]));

    let single = vec![Expr::standalone(Span::at(19, 7, 10), Ty::array(class!("String")))];
    let mut ctx = InferenceContext::for_call(&table, Span::at(19, 0, 11), gather(), single, InferenceOptions::default());
    assert_eq!(ctx.infer_applicability()?, InvocationMode::Strict);
    Ok(())
}

/// `<T> List<? extends T> wrap(T a)`
fn wrap() -> MethodSig {
    MethodSig::new("wrap")
        .type_param(TyParamDecl::new("wrap", "T"))
        .param(param!("wrap", "T"))
        .returns(class!("List", Ty::extends(param!("wrap", "T"))))
}

#[test]
fn test_wildcard_return_against_a_wildcard_target() -> InferResult {
    init();
    let table = ClassTable::with_builtins();
    let target = class!("List", Ty::extends(class!("Number")));
    for options in [InferenceOptions::default(), InferenceOptions::compatible()].iter() {
        let arg = Expr::standalone(Span::at(20, 5, 6), class!("Integer"));
        let mut ctx = InferenceContext::for_call(&table, Span::at(20, 0, 7), wrap(), vec![arg], options.clone());
        ctx.infer_invocation_type(Some(&target))?;

        let t = ctx.site_variables()[0];
        let inst = ctx.instantiation(t).map(|i| i.ty).unwrap();
        assert!(table.is_subtype(&class!("Integer"), &inst), "{}", inst);
        assert!(table.is_subtype(&inst, &class!("Number")), "{}", inst);

        // the captured element variable only sees `T` directly when its
        // wildcard bound is added eagerly
        let beta = ctx.variables().iter().copied().find(|v| *v != t).unwrap();
        let sees_t = ctx.bounds().upper_bounds(beta).contains(&&Ty::Infer(t));
        assert_eq!(sees_t, options.eager_wildcard_bounds);
    }
    Ok(())
}

/// `<U, R extends U, T extends List<U>> R link(Function<T, String> f, Function<String, R> g)`
fn link() -> MethodSig {
    MethodSig::new("link")
        .type_param(TyParamDecl::new("link", "U"))
        .type_param(TyParamDecl::new("link", "R").bounded(param!("link", "U")))
        .type_param(TyParamDecl::new("link", "T").bounded(class!("List", param!("link", "U"))))
        .param(class!("Function", param!("link", "T"), class!("String")))
        .param(class!("Function", class!("String"), param!("link", "R")))
        .returns(param!("link", "R"))
}

#[test]
fn test_early_functional_constraints_feed_resolution() -> InferResult {
    init();
    let table = ClassTable::with_builtins();
    let args = || {
        let f = Expr::lambda(Span::at(21, 5, 15), LambdaParams::Implicit(1), FixedBody::expression(string(10)));
        let g = Expr::lambda(
            Span::at(21, 17, 25),
            LambdaParams::Implicit(1),
            FixedBody::expression(Expr::standalone(Span::at(21, 22, 25), class!("Integer"))),
        );
        vec![f, g]
    };

    let mut strict = InferenceContext::for_call(&table, Span::at(21, 0, 26), link(), args(), InferenceOptions::default());
    assert_eq!(strict.infer_invocation_type(None)?[1], class!("Object"));

    let early = InferenceOptions {
        early_functional_constraints: true,
        ..InferenceOptions::default()
    };
    let mut ctx = InferenceContext::for_call(&table, Span::at(21, 0, 26), link(), args(), early);
    assert_eq!(ctx.infer_invocation_type(None)?[1], class!("Integer"));
    Ok(())
}

#[test]
fn test_hints_flow_through_equated_variables() -> InferResult {
    init();
    let table = ClassTable::with_builtins();
    let inner_site = Span::at(22, 5, 20);
    let hinted = MethodSig::new("singleton")
        .type_param(TyParamDecl::new("singleton", "T").with_hints(NullHints::NON_NULL))
        .param(param!("singleton", "T"))
        .returns(class!("List", param!("singleton", "T")));
    let inner = Expr::invocation(inner_site, hinted, vec![string(15)]);
    let mut ctx = InferenceContext::for_call(&table, Span::at(22, 0, 21), head(), vec![inner], InferenceOptions::default());
    ctx.infer_invocation_type(Some(&class!("String")))?;
    let e = ctx.site_variables()[0];
    assert_eq!(ctx.instantiation(e).unwrap().to_string(), "@NonNull String");
    Ok(())
}
