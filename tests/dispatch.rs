use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_stream::stream;
use linkrpc::{
    call_procedure,
    middleware::{rate_limit, Middleware, RateLimitOptions},
    procedure::{ValidationError, Validator},
    Error, ErrorCode, Observable, Procedure, ProcedureKind,
};
use serde::Deserialize;
use serde_json::{json, Value};

mod utils;
use utils::*;

#[derive(Deserialize)]
struct Greet {
    name: String,
}

#[derive(Clone, Default)]
struct Ctx {
    user: Option<String>,
}

fn counting(hits: Arc<AtomicUsize>) -> Middleware<()> {
    Middleware::new(move |ctx: (), _, next| {
        let hits = hits.clone();
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            next.exec(ctx).await
        }
    })
}

#[tokio::test]
async fn test_resolver_value_is_returned_unchanged() {
    let p = Procedure::<()>::builder().query(|_, input: Greet| async move {
        Ok::<_, Error>(json!({ "message": format!("Hello {}", input.name) }))
    });

    let out = call_procedure(&p, (), json!({ "name": "a" }), "greet", ProcedureKind::Query)
        .await
        .unwrap();
    assert_eq!(out.into_value(), Some(json!({ "message": "Hello a" })));
}

#[tokio::test]
async fn test_middleware_short_circuit() {
    let hits = counter();
    let resolved = counter();

    let r = resolved.clone();
    let p = Procedure::<()>::builder()
        .with(counting(hits.clone()))
        .with(Middleware::new(|_ctx: (), _, _next| async {
            Err(Error::new(ErrorCode::Forbidden, "blocked"))
        }))
        .with(counting(hits.clone()))
        .query(move |_, _: ()| {
            let r = r.clone();
            async move {
                r.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(())
            }
        });

    let err = call_procedure(&p, (), Value::Null, "a", ProcedureKind::Query)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(resolved.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_middleware_runs_in_order_then_resolver() {
    let hits = counter();
    let resolved = counter();

    let r = resolved.clone();
    let p = Procedure::<()>::builder()
        .with(counting(hits.clone()))
        .with(counting(hits.clone()))
        .with(counting(hits.clone()))
        .mutation(move |_, _: ()| {
            let r = r.clone();
            async move {
                r.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(42)
            }
        });

    let out = call_procedure(&p, (), Value::Null, "a", ProcedureKind::Mutation)
        .await
        .unwrap();
    assert_eq!(out.into_value(), Some(json!(42)));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(resolved.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_middleware_patches_context_downstream() {
    let p = Procedure::<Ctx>::builder()
        .with(Middleware::new(|mut ctx: Ctx, _, next| async move {
            ctx.user = Some("admin".into());
            next.exec(ctx).await
        }))
        .query(|ctx: Ctx, _: ()| async move { Ok::<_, Error>(ctx.user) });

    let out = call_procedure(&p, Ctx::default(), Value::Null, "me", ProcedureKind::Query)
        .await
        .unwrap();
    assert_eq!(out.into_value(), Some(json!("admin")));
}

#[tokio::test]
async fn test_middleware_reads_metadata() {
    let require_role = Middleware::new(|ctx: Ctx, _, next| async move {
        let role = next
            .meta()
            .get("role")
            .and_then(Value::as_str)
            .map(str::to_owned);
        match role {
            Some(role) if ctx.user.as_deref() != Some(role.as_str()) => Err(Error::new(
                ErrorCode::Forbidden,
                format!("requires {role}"),
            )),
            _ => next.exec(ctx).await,
        }
    });

    let p = Procedure::<Ctx>::builder()
        .with(require_role)
        .meta("role", "admin")
        .mutation(|_, _: ()| async { Ok::<_, Error>("deleted") });

    let err = call_procedure(&p, Ctx::default(), Value::Null, "rm", ProcedureKind::Mutation)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);
    assert_eq!(err.message(), "requires admin");

    let ctx = Ctx {
        user: Some("admin".into()),
    };
    let out = call_procedure(&p, ctx, Value::Null, "rm", ProcedureKind::Mutation)
        .await
        .unwrap();
    assert_eq!(out.into_value(), Some(json!("deleted")));
}

#[tokio::test]
async fn test_input_validation() {
    let name_required = Validator::new(|raw: Value| {
        let ok = raw
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|name| !name.is_empty());
        if ok {
            Ok(raw)
        } else {
            Err(ValidationError::issue("name", "Required"))
        }
    });

    let resolved = counter();
    let r = resolved.clone();
    let p = Procedure::<()>::builder()
        .input(name_required)
        .query(move |_, input: Greet| {
            r.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, Error>(input.name) }
        });

    let err = call_procedure(&p, (), json!({ "name": "" }), "greet", ProcedureKind::Query)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadRequest);
    assert_eq!(err.message(), "name: Required");
    assert_eq!(resolved.load(Ordering::SeqCst), 0);

    // Passes the validator but doesn't decode into the resolver's input type.
    let p = Procedure::<()>::builder().query(|_, input: Greet| async move {
        Ok::<_, Error>(input.name)
    });
    let err = call_procedure(&p, (), json!(42), "greet", ProcedureKind::Query)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadRequest);
}

#[tokio::test]
async fn test_output_validation() {
    let p = Procedure::<()>::builder()
        .output(Validator::new(|_| Err(ValidationError::new("secret field leaked"))))
        .query(|_, _: ()| async { Ok::<_, Error>(json!({ "password": "hunter2" })) });

    let err = call_procedure(&p, (), Value::Null, "user", ProcedureKind::Query)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InternalServerError);
    assert_eq!(err.message(), "secret field leaked");
}

#[tokio::test]
async fn test_untyped_errors_are_coerced() {
    let p = Procedure::<()>::builder().query(|_, _: ()| async {
        Err::<(), _>(Box::<dyn std::error::Error + Send + Sync>::from("db down"))
    });

    let err = call_procedure(&p, (), Value::Null, "a", ProcedureKind::Query)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InternalServerError);
    assert_eq!(err.message(), "db down");
    assert!(err.cause().is_some());
}

#[tokio::test]
async fn test_panic_is_caught() {
    let p = Procedure::<()>::builder().query(|_, _: ()| async {
        if true {
            panic!("boom");
        }
        Ok::<_, Error>(())
    });

    let err = call_procedure(&p, (), Value::Null, "a", ProcedureKind::Query)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InternalServerError);
}

#[tokio::test]
async fn test_subscription_emits_serialized_items() {
    let p = Procedure::<()>::builder().subscription(|_, n: u32| async move {
        Ok::<_, Error>(Observable::from_stream(stream! {
            for i in 0..n {
                yield Ok(i);
            }
        }))
    });

    let out = call_procedure(&p, (), json!(3), "count", ProcedureKind::Subscription)
        .await
        .unwrap();
    let items = collect(out.into_observable().unwrap()).await;
    assert_eq!(items, vec![Ok(json!(0)), Ok(json!(1)), Ok(json!(2))]);
}

#[tokio::test]
async fn test_subscription_items_are_validated() {
    let p = Procedure::<()>::builder()
        .output(Validator::new(|v: Value| match v.as_u64() {
            Some(n) if n < 2 => Ok(v),
            _ => Err(ValidationError::new("too big")),
        }))
        .subscription(|_, _: ()| async {
            Ok::<_, Error>(Observable::from_stream(stream! {
                for i in 0..5u32 {
                    yield Ok(i);
                }
            }))
        });

    let out = call_procedure(&p, (), Value::Null, "count", ProcedureKind::Subscription)
        .await
        .unwrap();
    let items = collect(out.into_observable().unwrap()).await;
    assert_eq!(items.len(), 3);
    assert_eq!(items[..2], [Ok(json!(0)), Ok(json!(1))]);
    assert_eq!(items[2].as_ref().unwrap_err().code(), ErrorCode::InternalServerError);
}

#[tokio::test]
async fn test_rate_limit() {
    let p = Procedure::<()>::builder()
        .with(rate_limit(
            RateLimitOptions {
                limit: 2,
                window: std::time::Duration::from_secs(60),
            },
            |_: &()| "global".to_string(),
        ))
        .query(|_, _: ()| async { Ok::<_, Error>(()) });

    for _ in 0..2 {
        call_procedure(&p, (), Value::Null, "a", ProcedureKind::Query)
            .await
            .unwrap();
    }

    let err = call_procedure(&p, (), Value::Null, "a", ProcedureKind::Query)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::TooManyRequests);
    assert!(err.message().starts_with("Rate limit exceeded. Retry in "));
}
