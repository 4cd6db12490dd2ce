use std::{fmt, sync::Arc};

#[derive(Clone)]
pub enum AllowOrigin {
    /// `*`, or the request's origin when credentials are allowed.
    Any,
    List(Vec<String>),
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl fmt::Debug for AllowOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::List(list) => f.debug_tuple("List").field(list).finish(),
            Self::Predicate(_) => f.write_str("Predicate"),
        }
    }
}

impl AllowOrigin {
    pub fn list<I: Into<String>>(origins: impl IntoIterator<Item = I>) -> Self {
        Self::List(origins.into_iter().map(Into::into).collect())
    }

    pub fn predicate(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(f))
    }

    fn allows(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(list) => list.iter().any(|o| o == origin),
            Self::Predicate(f) => f(origin),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorsOptions {
    pub origin: AllowOrigin,
    pub credentials: bool,
    pub methods: Vec<String>,
    /// When empty the preflight echoes `Access-Control-Request-Headers`.
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    /// Seconds.
    pub max_age: Option<u64>,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            origin: AllowOrigin::Any,
            credentials: false,
            methods: vec!["GET".into(), "POST".into(), "OPTIONS".into()],
            allowed_headers: Vec::new(),
            exposed_headers: Vec::new(),
            max_age: None,
        }
    }
}

impl CorsOptions {
    pub(crate) fn headers(
        &self,
        origin: Option<&str>,
        request_headers: Option<&str>,
        preflight: bool,
    ) -> Vec<(String, String)> {
        let mut out = Vec::new();

        match (&self.origin, origin) {
            (AllowOrigin::Any, _) if !self.credentials || origin.is_none() => {
                out.push(("Access-Control-Allow-Origin".into(), "*".into()));
            }
            (allow, Some(origin)) if allow.allows(origin) => {
                out.push(("Access-Control-Allow-Origin".into(), origin.into()));
                out.push(("Vary".into(), "Origin".into()));
            }
            // Not allowed, the browser rejects the response.
            _ => return out,
        }

        if self.credentials {
            out.push(("Access-Control-Allow-Credentials".into(), "true".into()));
        }
        if !self.exposed_headers.is_empty() {
            out.push((
                "Access-Control-Expose-Headers".into(),
                self.exposed_headers.join(","),
            ));
        }

        if preflight {
            out.push(("Access-Control-Allow-Methods".into(), self.methods.join(",")));
            if !self.allowed_headers.is_empty() {
                out.push((
                    "Access-Control-Allow-Headers".into(),
                    self.allowed_headers.join(","),
                ));
            } else if let Some(requested) = request_headers {
                out.push(("Access-Control-Allow-Headers".into(), requested.into()));
            }
            if let Some(max_age) = self.max_age {
                out.push(("Access-Control-Max-Age".into(), max_age.to_string()));
            }
        }

        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn get<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
        crate::request::header(headers, name)
    }

    #[test]
    fn wildcard_origin() {
        let h = CorsOptions::default().headers(Some("https://a.dev"), None, false);
        assert_eq!(get(&h, "access-control-allow-origin"), Some("*"));
        assert_eq!(get(&h, "access-control-allow-methods"), None);
    }

    #[test]
    fn credentials_reflect_origin() {
        let opts = CorsOptions {
            credentials: true,
            ..Default::default()
        };
        let h = opts.headers(Some("https://a.dev"), None, false);
        assert_eq!(get(&h, "access-control-allow-origin"), Some("https://a.dev"));
        assert_eq!(get(&h, "access-control-allow-credentials"), Some("true"));
        assert_eq!(get(&h, "vary"), Some("Origin"));
    }

    #[test]
    fn list_and_predicate() {
        let opts = CorsOptions {
            origin: AllowOrigin::list(["https://a.dev"]),
            ..Default::default()
        };
        assert!(opts.headers(Some("https://b.dev"), None, false).is_empty());
        assert!(!opts.headers(Some("https://a.dev"), None, false).is_empty());

        let opts = CorsOptions {
            origin: AllowOrigin::predicate(|o| o.ends_with(".a.dev")),
            ..Default::default()
        };
        assert!(opts.headers(Some("https://x.a.dev"), None, false).len() > 1);
        assert!(opts.headers(None, None, false).is_empty());
    }

    #[test]
    fn preflight_headers() {
        let opts = CorsOptions {
            max_age: Some(600),
            exposed_headers: vec!["X-Request-Id".into()],
            ..Default::default()
        };
        let h = opts.headers(Some("https://a.dev"), Some("content-type"), true);
        assert_eq!(get(&h, "access-control-allow-methods"), Some("GET,POST,OPTIONS"));
        assert_eq!(get(&h, "access-control-allow-headers"), Some("content-type"));
        assert_eq!(get(&h, "access-control-max-age"), Some("600"));
        assert_eq!(get(&h, "access-control-expose-headers"), Some("X-Request-Id"));
    }
}
