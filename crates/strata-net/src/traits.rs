use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::{error::NetError, types::Headers};

/// Remote origin access.
#[cfg_attr(feature = "mock", unimock::unimock(api = OriginMock))]
#[async_trait]
pub trait Origin: Send + Sync {
    /// Fetch the full content at `url`. A 404 surfaces as
    /// [`NetError::HttpStatus`] with status 404, never as empty content.
    async fn get_bytes(&self, url: Url) -> Result<Bytes, NetError>;

    /// Response headers of a HEAD request, for existence probes and
    /// content-length checks without a body transfer.
    async fn head(&self, url: Url) -> Result<Headers, NetError>;
}
