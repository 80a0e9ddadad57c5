//! Caster combinators: build new argument types out of existing ones
//! without registering new names.

use std::sync::Arc;

use async_trait::async_trait;

use crate::signal::{Outcome, Signal};
use crate::types::{cast_expr, CastContext, TypeCaster, TypeExpr};
use crate::value::ArgValue;

/// Try each type in order; the first non-failure wins.
pub fn union(types: Vec<TypeExpr>) -> TypeExpr {
    struct Union(Vec<TypeExpr>);

    #[async_trait]
    impl TypeCaster for Union {
        async fn cast(&self, cx: &CastContext<'_>, phrase: &str) -> Outcome {
            for ty in &self.0 {
                let res = cast_expr(ty, cx, phrase).await;
                if !res.is_failure() {
                    return res;
                }
            }
            Outcome::null()
        }
    }

    TypeExpr::Caster(Arc::new(Union(types)))
}

/// Cast through every type; all must succeed, results are collected in
/// order. The first failure is returned as-is.
pub fn product(types: Vec<TypeExpr>) -> TypeExpr {
    struct Product(Vec<TypeExpr>);

    #[async_trait]
    impl TypeCaster for Product {
        async fn cast(&self, cx: &CastContext<'_>, phrase: &str) -> Outcome {
            let mut results = Vec::with_capacity(self.0.len());
            for ty in &self.0 {
                let res = cast_expr(ty, cx, phrase).await;
                if res.is_failure() {
                    return res;
                }
                results.push(res.into_resolved());
            }
            Outcome::Value(ArgValue::List(results))
        }
    }

    TypeExpr::Caster(Arc::new(Product(types)))
}

/// Filter a successful cast through a predicate over (context, phrase,
/// value).
pub fn validate<F>(ty: TypeExpr, predicate: F) -> TypeExpr
where
    F: Fn(&CastContext<'_>, &str, &ArgValue) -> bool + Send + Sync + 'static,
{
    struct Validate<F> {
        ty: TypeExpr,
        predicate: F,
    }

    #[async_trait]
    impl<F> TypeCaster for Validate<F>
    where
        F: Fn(&CastContext<'_>, &str, &ArgValue) -> bool + Send + Sync,
    {
        async fn cast(&self, cx: &CastContext<'_>, phrase: &str) -> Outcome {
            let res = cast_expr(&self.ty, cx, phrase).await;
            if res.is_failure() {
                return res;
            }
            let value = res.into_resolved();
            if (self.predicate)(cx, phrase, &value) {
                Outcome::Value(value)
            } else {
                Outcome::null()
            }
        }
    }

    TypeExpr::Caster(Arc::new(Validate { ty, predicate }))
}

/// Accept values whose magnitude (numeric value, or length for strings and
/// lists) lies in `[min, max)`, or `[min, max]` when `inclusive`.
pub fn range(ty: TypeExpr, min: f64, max: f64, inclusive: bool) -> TypeExpr {
    validate(ty, move |_, _, value| {
        let Some(magnitude) = value.magnitude() else {
            return false;
        };
        magnitude >= min && if inclusive { magnitude <= max } else { magnitude < max }
    })
}

/// Left-to-right cast pipeline; each stage receives the previous stage's
/// value as its phrase. Stops at the first failure.
pub fn compose(types: Vec<TypeExpr>) -> TypeExpr {
    struct Compose(Vec<TypeExpr>);

    #[async_trait]
    impl TypeCaster for Compose {
        async fn cast(&self, cx: &CastContext<'_>, phrase: &str) -> Outcome {
            let mut acc = Outcome::value(phrase);
            let mut next_phrase = phrase.to_string();
            for ty in &self.0 {
                acc = cast_expr(ty, cx, &next_phrase).await;
                if acc.is_failure() {
                    return acc;
                }
                if let Outcome::Value(value) = &acc {
                    next_phrase = value.as_phrase();
                }
            }
            acc
        }
    }

    TypeExpr::Caster(Arc::new(Compose(types)))
}

/// Like `compose`, but failures keep flowing through the remaining stages.
pub fn compose_with_failure(types: Vec<TypeExpr>) -> TypeExpr {
    struct ComposeWithFailure(Vec<TypeExpr>);

    #[async_trait]
    impl TypeCaster for ComposeWithFailure {
        async fn cast(&self, cx: &CastContext<'_>, phrase: &str) -> Outcome {
            let mut acc = Outcome::value(phrase);
            let mut next_phrase = phrase.to_string();
            for ty in &self.0 {
                acc = cast_expr(ty, cx, &next_phrase).await;
                next_phrase = match &acc {
                    Outcome::Value(value) => value.as_phrase(),
                    Outcome::Signal(_) => String::new(),
                };
            }
            acc
        }
    }

    TypeExpr::Caster(Arc::new(ComposeWithFailure(types)))
}

/// Wrap a cast so its result also carries the original input phrase.
pub fn with_input(ty: TypeExpr) -> TypeExpr {
    struct WithInput(TypeExpr);

    #[async_trait]
    impl TypeCaster for WithInput {
        async fn cast(&self, cx: &CastContext<'_>, phrase: &str) -> Outcome {
            let res = cast_expr(&self.0, cx, phrase).await;
            let wrapped = ArgValue::WithInput {
                input: phrase.to_string(),
                value: Box::new(res.clone().into_resolved()),
            };
            if res.is_failure() {
                Outcome::Signal(Signal::fail_with(wrapped))
            } else {
                Outcome::Value(wrapped)
            }
        }
    }

    TypeExpr::Caster(Arc::new(WithInput(ty)))
}

/// Wrap a cast so its result carries a tag, enabling discriminated-union
/// argument types.
pub fn tagged(ty: TypeExpr, tag: impl Into<String>) -> TypeExpr {
    struct Tagged {
        ty: TypeExpr,
        tag: String,
    }

    #[async_trait]
    impl TypeCaster for Tagged {
        async fn cast(&self, cx: &CastContext<'_>, phrase: &str) -> Outcome {
            let res = cast_expr(&self.ty, cx, phrase).await;
            let wrapped = ArgValue::Tagged {
                tag: self.tag.clone(),
                value: Box::new(res.clone().into_resolved()),
            };
            if res.is_failure() {
                Outcome::Signal(Signal::fail_with(wrapped))
            } else {
                Outcome::Value(wrapped)
            }
        }
    }

    TypeExpr::Caster(Arc::new(Tagged {
        ty,
        tag: tag.into(),
    }))
}

/// `tagged` that additionally preserves the input phrase.
pub fn tagged_with_input(ty: TypeExpr, tag: impl Into<String>) -> TypeExpr {
    let tag = tag.into();
    with_input_tag(ty, tag)
}

fn with_input_tag(ty: TypeExpr, tag: String) -> TypeExpr {
    struct TaggedWithInput {
        ty: TypeExpr,
        tag: String,
    }

    #[async_trait]
    impl TypeCaster for TaggedWithInput {
        async fn cast(&self, cx: &CastContext<'_>, phrase: &str) -> Outcome {
            let res = cast_expr(&self.ty, cx, phrase).await;
            let wrapped = ArgValue::Tagged {
                tag: self.tag.clone(),
                value: Box::new(ArgValue::WithInput {
                    input: phrase.to_string(),
                    value: Box::new(res.clone().into_resolved()),
                }),
            };
            if res.is_failure() {
                Outcome::Signal(Signal::fail_with(wrapped))
            } else {
                Outcome::Value(wrapped)
            }
        }
    }

    TypeExpr::Caster(Arc::new(TaggedWithInput { ty, tag }))
}

/// Try each tagged alternative in order; the first success wins and carries
/// its tag.
pub fn tagged_union(alternatives: Vec<(String, TypeExpr)>) -> TypeExpr {
    let tagged_types: Vec<TypeExpr> = alternatives
        .into_iter()
        .map(|(tag, ty)| tagged(ty, tag))
        .collect();

    struct TaggedUnion(Vec<TypeExpr>);

    #[async_trait]
    impl TypeCaster for TaggedUnion {
        async fn cast(&self, cx: &CastContext<'_>, phrase: &str) -> Outcome {
            for ty in &self.0 {
                let res = cast_expr(ty, cx, phrase).await;
                if !res.is_failure() {
                    return res;
                }
            }
            Outcome::null()
        }
    }

    TypeExpr::Caster(Arc::new(TaggedUnion(tagged_types)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use herald_core::{Channel, Ctx, MemoryChat, User};

    use crate::types::TypeRegistry;

    fn ctx() -> Ctx {
        let client = Arc::new(MemoryChat::new());
        let channel = Channel::text("c1", "general", "g1");
        let author = User::new("u1", "sender");
        let message = client.inbound(&author, &channel, "irrelevant");
        Ctx::new(message, client)
    }

    async fn resolve(registry: &TypeRegistry, ctx: &Ctx, expr: &TypeExpr, phrase: &str) -> Outcome {
        registry.resolve(expr, ctx, None, phrase).await
    }

    #[tokio::test]
    async fn union_takes_first_success() {
        let registry = TypeRegistry::new();
        let ctx = ctx();
        let expr = union(vec!["integer".into(), "string".into()]);

        assert_eq!(
            resolve(&registry, &ctx, &expr, "5").await,
            Outcome::Value(ArgValue::Int(5))
        );
        assert_eq!(
            resolve(&registry, &ctx, &expr, "abc").await,
            Outcome::value("abc")
        );
    }

    #[tokio::test]
    async fn product_collects_or_fails() {
        let registry = TypeRegistry::new();
        let ctx = ctx();
        let expr = product(vec!["integer".into(), "number".into()]);

        assert_eq!(
            resolve(&registry, &ctx, &expr, "3").await,
            Outcome::Value(ArgValue::List(vec![ArgValue::Int(3), ArgValue::Num(3.0)]))
        );
        assert!(resolve(&registry, &ctx, &expr, "3.5").await.is_failure());
    }

    #[tokio::test]
    async fn range_inclusive_bounds() {
        let registry = TypeRegistry::new();
        let ctx = ctx();
        let expr = range("integer".into(), 1.0, 10.0, true);

        assert!(!resolve(&registry, &ctx, &expr, "1").await.is_failure());
        assert!(!resolve(&registry, &ctx, &expr, "10").await.is_failure());
        assert!(resolve(&registry, &ctx, &expr, "0").await.is_failure());
        assert!(resolve(&registry, &ctx, &expr, "11").await.is_failure());
    }

    #[tokio::test]
    async fn range_measures_string_length() {
        let registry = TypeRegistry::new();
        let ctx = ctx();
        let expr = range("string".into(), 2.0, 4.0, false);

        assert!(!resolve(&registry, &ctx, &expr, "abc").await.is_failure());
        assert!(resolve(&registry, &ctx, &expr, "a").await.is_failure());
        assert!(resolve(&registry, &ctx, &expr, "abcd").await.is_failure());
    }

    #[tokio::test]
    async fn validate_rejects_on_predicate() {
        let registry = TypeRegistry::new();
        let ctx = ctx();
        let expr = validate("integer".into(), |_, _, v| {
            v.as_int().is_some_and(|n| n % 2 == 0)
        });

        assert!(!resolve(&registry, &ctx, &expr, "4").await.is_failure());
        assert!(resolve(&registry, &ctx, &expr, "3").await.is_failure());
    }

    #[tokio::test]
    async fn compose_pipelines_left_to_right() {
        let registry = TypeRegistry::new();
        let ctx = ctx();
        let expr = compose(vec!["lowercase".into(), TypeExpr::one_of(["yes", "no"])]);

        assert_eq!(
            resolve(&registry, &ctx, &expr, "YES").await,
            Outcome::value("yes")
        );
        assert!(resolve(&registry, &ctx, &expr, "MAYBE").await.is_failure());
    }

    #[tokio::test]
    async fn with_input_preserves_phrase_on_both_paths() {
        let registry = TypeRegistry::new();
        let ctx = ctx();
        let expr = with_input("integer".into());

        match resolve(&registry, &ctx, &expr, "7").await {
            Outcome::Value(ArgValue::WithInput { input, value }) => {
                assert_eq!(input, "7");
                assert_eq!(*value, ArgValue::Int(7));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let failed = resolve(&registry, &ctx, &expr, "x").await;
        assert!(failed.is_failure());
        match failed.failure_payload() {
            Some(ArgValue::WithInput { input, .. }) => assert_eq!(input, "x"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn tagged_union_carries_the_winning_tag() {
        let registry = TypeRegistry::new();
        let ctx = ctx();
        let expr = tagged_union(vec![
            ("int".to_string(), "integer".into()),
            ("word".to_string(), "string".into()),
        ]);

        match resolve(&registry, &ctx, &expr, "12").await {
            Outcome::Value(ArgValue::Tagged { tag, value }) => {
                assert_eq!(tag, "int");
                assert_eq!(*value, ArgValue::Int(12));
            }
            other => panic!("unexpected: {other:?}"),
        }
        match resolve(&registry, &ctx, &expr, "hi").await {
            Outcome::Value(ArgValue::Tagged { tag, .. }) => assert_eq!(tag, "word"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
