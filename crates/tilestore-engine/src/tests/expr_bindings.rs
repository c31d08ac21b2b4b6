use crate::{Bindings, ExprCache, LispExpr};

fn resolver() -> ExprCache<Option<i64>> {
    ExprCache::new(|cache, expr, env| match expr {
        LispExpr::Int(v) => Some(*v),
        LispExpr::Symbol(s) => env.lookup(s).and_then(|v| *cache.apply(v, env)),
        _ => None,
    })
}

#[test]
fn chained_binding_resolves_through_environment() {
    let cache = resolver();
    let x = LispExpr::symbol("x");
    let env1 = Bindings::new().bind("x", LispExpr::symbol("y")).bind("y", 1i64);
    let env2 = Bindings::new().bind("x", LispExpr::symbol("y")).bind("y", 2i64);

    assert_eq!(*cache.apply(&x, &env1), Some(1));
    // same direct binding for x, different value behind it
    assert_eq!(*cache.apply(&x, &env2), Some(2));
    assert_eq!(*cache.apply(&x, &env1), Some(1));
}

#[test]
fn unreachable_bindings_share_entries() {
    let cache = resolver();
    let x = LispExpr::symbol("x");
    let a = Bindings::new()
        .bind("x", LispExpr::symbol("y"))
        .bind("y", 7i64)
        .bind("z", 1i64);
    let b = Bindings::new()
        .bind("x", LispExpr::symbol("y"))
        .bind("y", 7i64)
        .bind("z", 2i64);

    assert_eq!(*cache.apply(&x, &a), Some(7));
    let n = cache.nr_evaluated();
    assert_eq!(*cache.apply(&x, &b), Some(7));
    assert_eq!(cache.nr_evaluated(), n);

    assert_eq!(a.reachable_from(&x), b.reachable_from(&x));
    assert_eq!(a.reachable_from(&x).len(), 2);
}

#[test]
fn cyclic_bindings_have_finite_closure() {
    let env = Bindings::new()
        .bind("a", LispExpr::symbol("b"))
        .bind("b", LispExpr::symbol("a"));
    assert_eq!(env.reachable_from(&LispExpr::symbol("a")).len(), 2);
}
