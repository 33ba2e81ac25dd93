//! Small helpers shared by the upstream service clients.

use crate::error::{Error, Result};
use log::debug;
use serde::de::DeserializeOwned;
use url::Url;

/// Appends path segments to `base`, percent-encoding each one.
pub fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| Error::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Sends `request` and decodes a JSON body, mapping a non-success status to
/// `Error::Transport` tagged with `service`.
pub async fn get_json<T: DeserializeOwned>(
    service: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<T> {
    let response = request.send().await?;
    let status = response.status();
    debug!("{} responded with {}", service, status);
    if !status.is_success() {
        return Err(Error::Transport { service, status });
    }
    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| Error::Decode(format!("failed to parse {} response: {}", service, e)))
}
