//! Memoized evaluation of parsed symbolic expressions.
//!
//! Expressions arrive already parsed; this module only gives them value
//! semantics (equality, hashing) so that `(expression, bindings)` pairs can
//! key a [`MemoCache`].

use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::cache::MemoCache;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LispExpr {
    Symbol(Arc<str>),
    Int(i64),
    Str(Arc<str>),
    List(Arc<[LispExpr]>),
}

impl LispExpr {
    pub fn symbol(name: &str) -> Self {
        LispExpr::Symbol(name.into())
    }

    pub fn string(s: &str) -> Self {
        LispExpr::Str(s.into())
    }

    pub fn list(items: impl IntoIterator<Item = LispExpr>) -> Self {
        LispExpr::List(items.into_iter().collect())
    }

    /// `(head args...)` as `(head, args)`.
    pub fn as_call(&self) -> Option<(&str, &[LispExpr])> {
        match self {
            LispExpr::List(items) => match items.split_first() {
                Some((LispExpr::Symbol(head), args)) => Some((&**head, args)),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            LispExpr::Symbol(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            LispExpr::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Symbols of the expression, in order of first appearance.
    pub fn free_symbols(&self) -> Vec<Arc<str>> {
        fn walk(e: &LispExpr, out: &mut Vec<Arc<str>>) {
            match e {
                LispExpr::Symbol(s) if !out.contains(s) => out.push(s.clone()),
                LispExpr::List(items) => items.iter().for_each(|i| walk(i, out)),
                _ => {}
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }
}

impl From<i64> for LispExpr {
    fn from(v: i64) -> Self {
        LispExpr::Int(v)
    }
}

impl fmt::Display for LispExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LispExpr::Symbol(s) => f.write_str(s),
            LispExpr::Int(v) => write!(f, "{v}"),
            LispExpr::Str(s) => write!(f, "{s:?}"),
            LispExpr::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Symbol environment. Ordered, so equal environments hash equally no
/// matter the order of binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bindings(BTreeMap<Arc<str>, LispExpr>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: &str, value: impl Into<LispExpr>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn lookup(&self, name: &str) -> Option<&LispExpr> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The bindings `expr` can reach: its free symbols, plus the free
    /// symbols of every bound value reached that way. Evaluations under
    /// environments that agree on this closure share cache entries.
    pub fn reachable_from(&self, expr: &LispExpr) -> Bindings {
        let mut pending = expr.free_symbols();
        let mut reached = BTreeMap::new();
        while let Some(name) = pending.pop() {
            if reached.contains_key(&name) {
                continue;
            }
            if let Some(value) = self.0.get(&name) {
                pending.extend(value.free_symbols());
                reached.insert(name, value.clone());
            }
        }
        Bindings(reached)
    }
}

pub type ExprKey = (LispExpr, Bindings);

type Evaluator<R> = dyn Fn(&ExprCache<R>, &LispExpr, &Bindings) -> R + Send + Sync;

/// Memoizing evaluator. The evaluation function receives the cache itself
/// so it can evaluate sub-expressions through it.
pub struct ExprCache<R> {
    cache: MemoCache<ExprKey, R>,
    eval: Box<Evaluator<R>>,
}

impl<R> ExprCache<R> {
    pub fn new<F>(eval: F) -> Self
    where
        F: Fn(&ExprCache<R>, &LispExpr, &Bindings) -> R + Send + Sync + 'static,
    {
        ExprCache {
            cache: MemoCache::new(),
            eval: Box::new(eval),
        }
    }

    /// Evaluates `expr` under the full `bindings`; the entry is keyed on
    /// the bindings reachable from `expr`.
    pub fn apply(&self, expr: &LispExpr, bindings: &Bindings) -> Arc<R> {
        let key = (expr.clone(), bindings.reachable_from(expr));
        self.cache
            .get_or_compute(&key, |(e, _)| (self.eval)(self, e, bindings))
    }

    pub fn remove(&self, expr: &LispExpr, bindings: &Bindings) -> Option<Arc<R>> {
        self.cache.remove(&(expr.clone(), bindings.reachable_from(expr)))
    }

    pub fn clear(&self) {
        self.cache.clear()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn nr_evaluated(&self) -> usize {
        self.cache.nr_computed()
    }
}

impl<R> fmt::Debug for ExprCache<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExprCache")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arith() -> ExprCache<Option<i64>> {
        ExprCache::new(|cache, expr, env| match expr {
            LispExpr::Int(v) => Some(*v),
            LispExpr::Symbol(s) => env.lookup(s).and_then(|v| *cache.apply(v, env)),
            LispExpr::List(_) => {
                let (head, args) = expr.as_call()?;
                let vals = args
                    .iter()
                    .map(|a| *cache.apply(a, env))
                    .collect::<Option<Vec<_>>>()?;
                match head {
                    "add" => Some(vals.iter().sum()),
                    "mul" => Some(vals.iter().product()),
                    _ => None,
                }
            }
            LispExpr::Str(_) => None,
        })
    }

    fn call(head: &str, args: Vec<LispExpr>) -> LispExpr {
        LispExpr::list(std::iter::once(LispExpr::symbol(head)).chain(args))
    }

    #[test]
    fn shared_subexpressions_evaluate_once() {
        let cache = arith();
        let prod = call("mul", vec![LispExpr::symbol("x"), LispExpr::Int(3)]);
        let expr = call("add", vec![prod.clone(), prod.clone()]);
        let env = Bindings::new().bind("x", 4i64).bind("unused", 1i64);
        assert_eq!(*cache.apply(&expr, &env), Some(24));
        // expr, prod, x, 4, 3
        assert_eq!(cache.nr_evaluated(), 5);

        // unrelated bindings do not split the cache
        let other = Bindings::new().bind("x", 4i64).bind("unused", 2i64);
        assert_eq!(*cache.apply(&expr, &other), Some(24));
        assert_eq!(cache.nr_evaluated(), 5);

        let env5 = Bindings::new().bind("x", 5i64);
        assert_eq!(*cache.apply(&expr, &env5), Some(30));
    }

    #[test]
    fn bindings_compare_by_content() {
        let a = Bindings::new().bind("a", 1i64).bind("b", 2i64);
        let b = Bindings::new().bind("b", 2i64).bind("a", 1i64);
        assert_eq!(a, b);
        assert_eq!(
            call("f", vec![LispExpr::string("s"), LispExpr::Int(1)]).to_string(),
            "(f \"s\" 1)"
        );
    }

    #[test]
    fn remove_forces_reevaluation() {
        let cache = arith();
        let e = call("add", vec![LispExpr::Int(1), LispExpr::Int(2)]);
        cache.apply(&e, &Bindings::new());
        let n = cache.nr_evaluated();
        assert!(cache.remove(&e, &Bindings::new()).is_some());
        cache.apply(&e, &Bindings::new());
        assert_eq!(cache.nr_evaluated(), n + 1);
    }
}
