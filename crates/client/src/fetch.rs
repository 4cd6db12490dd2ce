#[cfg(feature = "reqwest")]
use std::fmt;

use futures::future::BoxFuture;

use crate::ClientError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// `GET` or `POST`.
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// The HTTP client used by [`HttpLink`](crate::HttpLink) and
/// [`HttpBatchLink`](crate::HttpBatchLink).
///
/// Dropping the returned future must abort the request.
pub trait Fetch: Send + Sync {
    fn fetch(&self, req: FetchRequest) -> BoxFuture<'static, Result<FetchResponse, ClientError>>;
}

impl<F> Fetch for F
where
    F: Fn(FetchRequest) -> BoxFuture<'static, Result<FetchResponse, ClientError>> + Send + Sync,
{
    fn fetch(&self, req: FetchRequest) -> BoxFuture<'static, Result<FetchResponse, ClientError>> {
        self(req)
    }
}

/// [`Fetch`] backed by [`reqwest`].
#[cfg(feature = "reqwest")]
#[cfg_attr(docsrs, doc(cfg(feature = "reqwest")))]
#[derive(Clone)]
pub struct ReqwestFetch {
    client: reqwest::Client,
}

#[cfg(feature = "reqwest")]
impl fmt::Debug for ReqwestFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestFetch").finish_non_exhaustive()
    }
}

#[cfg(feature = "reqwest")]
impl ReqwestFetch {
    pub fn new() -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(ClientError::transport)?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "reqwest")]
impl Fetch for ReqwestFetch {
    fn fetch(&self, req: FetchRequest) -> BoxFuture<'static, Result<FetchResponse, ClientError>> {
        let mut builder = match req.method {
            "GET" => self.client.get(&req.url),
            _ => self.client.post(&req.url),
        };
        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = req.body {
            builder = builder.body(body);
        }

        Box::pin(async move {
            let resp = builder.send().await.map_err(ClientError::transport)?;
            let status = resp.status().as_u16();
            let body = resp.bytes().await.map_err(ClientError::transport)?;
            Ok(FetchResponse {
                status,
                body: body.to_vec(),
            })
        })
    }
}
