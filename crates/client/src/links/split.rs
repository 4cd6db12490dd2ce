use std::{fmt, sync::Arc};

use linkrpc::ProcedureKind;

use crate::{
    link::{Link, LinkOutput, Links, Next},
    Chain, Operation,
};

/// Routes each operation to one of two sub-chains.
///
/// ```rust,no_run
/// # use linkrpc_client::*;
/// # fn demo(http: HttpBatchLink, ws: WsLink) {
/// let chain = Chain::new().link(SplitLink::subscriptions(
///     Chain::new().link(ws),
///     Chain::new().link(http),
/// ));
/// # }
/// ```
pub struct SplitLink {
    condition: Arc<dyn Fn(&Operation) -> bool + Send + Sync>,
    on_true: Links,
    on_false: Links,
}

impl fmt::Debug for SplitLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitLink")
            .field("on_true", &self.on_true.len())
            .field("on_false", &self.on_false.len())
            .finish()
    }
}

impl SplitLink {
    pub fn new(
        condition: impl Fn(&Operation) -> bool + Send + Sync + 'static,
        on_true: Chain,
        on_false: Chain,
    ) -> Self {
        Self {
            condition: Arc::new(condition),
            on_true: on_true.into_links(),
            on_false: on_false.into_links(),
        }
    }

    /// Subscriptions go to `subscriptions`, queries and mutations to `rest`.
    pub fn subscriptions(subscriptions: Chain, rest: Chain) -> Self {
        Self::new(
            |op| op.kind == ProcedureKind::Subscription,
            subscriptions,
            rest,
        )
    }
}

impl Link for SplitLink {
    fn call(&self, op: Operation, next: Next) -> LinkOutput {
        let links = if (self.condition)(&op) {
            &self.on_true
        } else {
            &self.on_false
        };
        next.branch_links(links.clone()).run(op)
    }
}
