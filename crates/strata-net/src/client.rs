use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::trace;
use url::Url;

use crate::{
    error::NetError,
    traits::Origin,
    types::{Headers, OriginOptions},
};

/// `reqwest`-backed [`Origin`].
#[derive(Clone, Debug)]
pub struct HttpOrigin {
    inner: Client,
}

impl HttpOrigin {
    /// # Panics
    ///
    /// Panics if the `reqwest::Client` builder fails to build.
    #[must_use]
    pub fn new(options: OriginOptions) -> Self {
        let inner = Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .build()
            .expect("failed to build reqwest client");
        Self { inner }
    }
}

impl Default for HttpOrigin {
    fn default() -> Self {
        Self::new(OriginOptions::default())
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    async fn get_bytes(&self, url: Url) -> Result<Bytes, NetError> {
        trace!(url = %url, "origin GET");
        let resp = self.inner.get(url.clone()).send().await.map_err(NetError::from)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NetError::http_status(status.as_u16(), url));
        }
        resp.bytes().await.map_err(NetError::from)
    }

    async fn head(&self, url: Url) -> Result<Headers, NetError> {
        trace!(url = %url, "origin HEAD");
        let resp = self.inner.head(url.clone()).send().await.map_err(NetError::from)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NetError::http_status(status.as_u16(), url));
        }

        let mut out = Headers::new();
        for (name, value) in resp.headers() {
            if let Ok(v) = value.to_str() {
                out.insert(name.as_str(), v);
            }
        }
        Ok(out)
    }
}
