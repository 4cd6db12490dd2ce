use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use linkrpc::ProcedureKind;

use crate::{
    link::{cancellable, Link, LinkOutput, LinkResult, Next},
    Operation,
};

type InFlight = Shared<BoxFuture<'static, LinkResult>>;

/// Shares one in-flight request between identical concurrent queries.
///
/// The entry is removed once the request settles, whatever the outcome, so later queries go to
/// the network again.
#[derive(Clone, Default)]
pub struct DedupeLink {
    in_flight: Arc<Mutex<HashMap<String, InFlight>>>,
}

impl DedupeLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct queries currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .len()
    }
}

impl Link for DedupeLink {
    fn call(&self, op: Operation, next: Next) -> LinkOutput {
        if op.kind != ProcedureKind::Query {
            return next.run(op);
        }

        let key = op.fingerprint();
        let signal = op.signal.clone();
        let shared = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|err| err.into_inner());
            match in_flight.get(&key) {
                Some(shared) => shared.clone(),
                None => {
                    // Each caller races its own token, the shared request ignores them.
                    let out = next.run(Operation { signal: None, ..op });
                    let map = self.in_flight.clone();
                    let k = key.clone();
                    let shared = async move {
                        let result = out.response().await;
                        map.lock().unwrap_or_else(|err| err.into_inner()).remove(&k);
                        result
                    }
                    .boxed()
                    .shared();

                    in_flight.insert(key, shared.clone());
                    // Drive it even if every caller goes away so the entry is always removed.
                    tokio::spawn(shared.clone());
                    shared
                }
            }
        };

        LinkOutput::future(cancellable(signal, shared))
    }
}
