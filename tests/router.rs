use linkrpc::{Error, ErrorCode, Procedure, ProcedureKind, Router};

fn query() -> Procedure<()> {
    Procedure::builder().query(|_, _: ()| async { Ok::<_, Error>(()) })
}

fn mutation() -> Procedure<()> {
    Procedure::builder().mutation(|_, _: ()| async { Ok::<_, Error>(()) })
}

#[test]
fn test_dotted_keys_create_nested_routers() {
    let r = Router::<()>::new()
        .procedure("post.byId", query())
        .procedure("post.create", mutation())
        .procedure("health", query());

    assert_eq!(r.resolve("post.byId").unwrap().kind(), ProcedureKind::Query);
    assert_eq!(r.resolve("post.create").unwrap().kind(), ProcedureKind::Mutation);
    assert_eq!(r.resolve("health").unwrap().kind(), ProcedureKind::Query);

    let paths: Vec<_> = r.procedures().into_iter().map(|(path, _)| path).collect();
    assert_eq!(paths, ["health", "post.byId", "post.create"]);
}

#[test]
fn test_nest() {
    let users = Router::new().procedure("list", query());
    let r = Router::<()>::new()
        .nest("admin", Router::new().nest("users", users))
        .procedure("admin.ping", query());

    assert!(r.resolve("admin.users.list").is_ok());
    assert!(r.resolve("admin.ping").is_ok());
}

#[test]
fn test_resolve_not_found() {
    let r = Router::<()>::new().procedure("post.byId", query());

    for path in ["", "post", "missing", "post.byId.extra", "post.missing"] {
        let err = r.resolve(path).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound, "path '{path}'");
    }
}

#[test]
fn test_merge_last_writer_wins() {
    let a = Router::<()>::new()
        .procedure("a", query())
        .procedure("shared", query());
    let b = Router::new()
        .procedure("b", query())
        .procedure("shared", mutation());

    let r = a.merge(b);
    assert!(r.resolve("a").is_ok());
    assert!(r.resolve("b").is_ok());
    assert_eq!(r.resolve("shared").unwrap().kind(), ProcedureKind::Mutation);
}
