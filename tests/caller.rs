use linkrpc::{Caller, Error, ErrorCode, Observable, Procedure, Router};
use serde_json::Value;

mod utils;
use utils::*;

fn router() -> Router<u32> {
    Router::new()
        .procedure(
            "add",
            Procedure::builder().query(|base: u32, n: u32| async move { Ok::<_, Error>(base + n) }),
        )
        .procedure(
            "reset",
            Procedure::builder().mutation(|_, _: ()| async { Ok::<_, Error>(true) }),
        )
        .procedure(
            "ticks",
            Procedure::builder().subscription(|base: u32, _: ()| async move {
                Ok::<_, Error>(Observable::new(move |s| {
                    s.next(base);
                    s.next(base + 1);
                    s.complete();
                }))
            }),
        )
}

#[tokio::test]
async fn test_caller() {
    let caller = Caller::new(router(), 10);

    assert_eq!(caller.query::<u32>("add", 5).await.unwrap(), 15);
    assert!(caller.mutation::<bool>("reset", ()).await.unwrap());

    let items = collect(caller.subscription("ticks", ()).await.unwrap()).await;
    assert_eq!(items, vec![Ok(Value::from(10)), Ok(Value::from(11))]);
}

#[tokio::test]
async fn test_caller_checks_kind() {
    let caller = Caller::new(router(), 0);

    let err = caller.mutation::<u32>("add", 1).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::MethodNotSupported);

    let err = caller.subscription("reset", ()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::MethodNotSupported);

    let err = caller.query::<u32>("nope", ()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}
