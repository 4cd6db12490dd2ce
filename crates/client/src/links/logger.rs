use linkrpc::{Observable, Observer};
use tokio::time::Instant;

use crate::{
    link::{Link, LinkOutput, Next},
    ClientError, Operation,
};

/// Logs every operation's outcome and duration with `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggerLink;

impl Link for LoggerLink {
    fn call(&self, op: Operation, next: Next) -> LinkOutput {
        let (id, kind, path) = (op.id, op.kind, op.path.clone());
        let start = Instant::now();

        match next.run(op) {
            LinkOutput::Observable(source) => {
                tracing::info!(id, %kind, path, "subscription started");
                LinkOutput::Observable(Observable::new(move |subscriber| {
                    let (s_next, s_err, s_complete) =
                        (subscriber.clone(), subscriber.clone(), subscriber);
                    let (err_path, complete_path) = (path.clone(), path.clone());
                    source.subscribe(
                        Observer::new()
                            .on_next(move |data| {
                                tracing::debug!(id, "subscription data");
                                s_next.next(data);
                            })
                            .on_error(move |err: ClientError| {
                                tracing::error!(id, path = err_path, code = %err.code(), "subscription error: {err}");
                                s_err.error(err);
                            })
                            .on_complete(move || {
                                tracing::info!(id, path = complete_path, "subscription complete");
                                s_complete.complete();
                            }),
                    )
                }))
            }
            out => LinkOutput::future(async move {
                let result = out.response().await;
                let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                match &result {
                    Ok(_) => tracing::info!(id, path, elapsed_ms, "OK {kind} {path}"),
                    Err(err) => tracing::error!(
                        id,
                        path,
                        elapsed_ms,
                        code = %err.code(),
                        "ERROR {kind} {path}: {err}"
                    ),
                }
                result
            }),
        }
    }
}
