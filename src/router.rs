use std::{borrow::Cow, collections::BTreeMap, fmt};

use crate::{error::ExecError, transformer::CombinedTransformer, Error, Procedure};

pub enum RouterEntry<TCtx> {
    Procedure(Procedure<TCtx>),
    Router(Router<TCtx>),
}

impl<TCtx> Clone for RouterEntry<TCtx> {
    fn clone(&self) -> Self {
        match self {
            Self::Procedure(p) => Self::Procedure(p.clone()),
            Self::Router(r) => Self::Router(r.clone()),
        }
    }
}

impl<TCtx> fmt::Debug for RouterEntry<TCtx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Procedure(p) => p.fmt(f),
            Self::Router(r) => r.fmt(f),
        }
    }
}

/// A named tree of procedures and nested routers.
pub struct Router<TCtx = ()> {
    entries: BTreeMap<Cow<'static, str>, RouterEntry<TCtx>>,
    transformer: Option<CombinedTransformer>,
}

impl<TCtx> Default for Router<TCtx> {
    fn default() -> Self {
        Self {
            entries: Default::default(),
            transformer: None,
        }
    }
}

impl<TCtx> Clone for Router<TCtx> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            transformer: self.transformer.clone(),
        }
    }
}

impl<TCtx> fmt::Debug for Router<TCtx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Router").field(&self.entries).finish()
    }
}

impl<TCtx> Router<TCtx> {
    pub fn new() -> Router<TCtx> {
        Self::default()
    }

    /// Register a procedure. A dotted key such as `"post.byId"` creates the intermediate routers.
    pub fn procedure(self, key: impl Into<Cow<'static, str>>, procedure: Procedure<TCtx>) -> Self {
        self.insert(key.into(), RouterEntry::Procedure(procedure))
    }

    /// Mount `router` under `key`.
    pub fn nest(self, key: impl Into<Cow<'static, str>>, router: Router<TCtx>) -> Self {
        self.insert(key.into(), RouterEntry::Router(router))
    }

    /// Shallow union of the top-level entries. On a key collision the entry from `other` wins.
    pub fn merge(mut self, other: Self) -> Self {
        for (key, entry) in other.entries {
            if self.entries.contains_key(&key) {
                #[cfg(feature = "tracing")]
                tracing::warn!("router merge: '{key}' is defined in both routers, keeping the last");
            }
            self.entries.insert(key, entry);
        }

        if other.transformer.is_some() {
            self.transformer = other.transformer;
        }

        self
    }

    /// Transformer applied by transport adapters to inputs and result data.
    pub fn transformer(mut self, transformer: CombinedTransformer) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub fn get_transformer(&self) -> Option<&CombinedTransformer> {
        self.transformer.as_ref()
    }

    fn insert(mut self, key: Cow<'static, str>, entry: RouterEntry<TCtx>) -> Self {
        match key.split_once('.') {
            None => {
                self.entries.insert(key, entry);
            }
            Some((head, rest)) => {
                let head: Cow<'static, str> = head.to_string().into();
                let rest: Cow<'static, str> = rest.to_string().into();
                let child = match self.entries.remove(&head) {
                    Some(RouterEntry::Router(router)) => router,
                    _ => Router::new(),
                };
                self.entries
                    .insert(head, RouterEntry::Router(child.insert(rest, entry)));
            }
        }
        self
    }

    /// Walk a dotted path. Anything other than exactly one procedure at the end is `NOT_FOUND`.
    pub fn resolve(&self, path: &str) -> Result<&Procedure<TCtx>, Error> {
        let mut router = self;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            match (router.entries.get(segment), segments.peek()) {
                (Some(RouterEntry::Procedure(p)), None) => return Ok(p),
                (Some(RouterEntry::Router(r)), Some(_)) => router = r,
                _ => break,
            }
        }

        Err(ExecError::ProcedureNotFound(path.to_string()).into())
    }

    /// Every procedure with its full dotted path, in path order.
    pub fn procedures(&self) -> Vec<(String, &Procedure<TCtx>)> {
        let mut out = Vec::new();
        self.collect("", &mut out);
        out
    }

    fn collect<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a Procedure<TCtx>)>) {
        for (key, entry) in &self.entries {
            let path = if prefix.is_empty() {
                key.to_string()
            } else {
                format!("{prefix}.{key}")
            };
            match entry {
                RouterEntry::Procedure(p) => out.push((path, p)),
                RouterEntry::Router(r) => r.collect(&path, out),
            }
        }
    }
}
