use std::time::Instant;

use super::Middleware;

/// Logs the outcome and duration of every call at `info` level.
pub fn audit_log<TCtx>() -> Middleware<TCtx>
where
    TCtx: Clone + Send + 'static,
{
    Middleware::new(|ctx, _input, next| async move {
        let path = next.path().to_string();
        let kind = next.kind();
        let start = Instant::now();
        let result = next.exec(ctx).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(_) => tracing::info!("OK {kind} {path} ({elapsed_ms:.2}ms)"),
            Err(err) => tracing::info!(code = %err.code(), "ERROR {kind} {path} ({elapsed_ms:.2}ms)"),
        }

        result
    })
}
