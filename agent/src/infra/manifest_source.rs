//! Pull-side manifest retrieval over HTTP(S) or from a local file.

use std::time::Duration;

use anyhow::{Context, Result};
use hoist_common::UpdateManifest;
use url::Url;

use crate::application::ports::ManifestSource;
use crate::domain::UpdateError;

const USER_AGENT: &str = concat!("hoist/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct HttpManifestSource {
    client: reqwest::Client,
}

impl HttpManifestSource {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }

    /// POSTs `body` to `url`. Credentials embedded in the URL are sent as
    /// basic auth.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or any status other than
    /// 200, 201 or 202.
    pub async fn post(&self, url: &str, body: Vec<u8>) -> Result<()> {
        let (url, auth) = split_userinfo(url)?;
        let mut request = self.client.post(url.clone()).body(body);
        if let Some((user, pass)) = auth {
            request = request.basic_auth(user, Some(pass));
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("posting to {}", redacted(&url)))?;
        let status = response.status().as_u16();
        if !matches!(status, 200..=202) {
            anyhow::bail!("{} answered {status}", redacted(&url));
        }
        Ok(())
    }

    async fn fetch_http(&self, url: Url, auth: Option<(String, String)>) -> Result<Vec<u8>> {
        let mut request = self.client.get(url.clone());
        if let Some((user, pass)) = auth {
            request = request.basic_auth(user, Some(pass));
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("requesting {}", redacted(&url)))?;
        if response.status() != reqwest::StatusCode::OK {
            anyhow::bail!("{} answered {}", redacted(&url), response.status());
        }
        let body = response
            .bytes()
            .await
            .with_context(|| format!("reading body from {}", redacted(&url)))?;
        Ok(body.to_vec())
    }
}

impl ManifestSource for HttpManifestSource {
    async fn fetch(&self, url: &str) -> Result<UpdateManifest> {
        let (parsed, auth) = split_userinfo(url)?;
        let shown = redacted(&parsed);
        let body = match parsed.scheme() {
            "http" | "https" => self.fetch_http(parsed, auth).await?,
            "file" => {
                let path = parsed
                    .to_file_path()
                    .map_err(|()| UpdateError::Configuration(format!("invalid file URL: {url}")))?;
                tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?
            }
            other => {
                return Err(UpdateError::Configuration(format!(
                    "unsupported asset manifest scheme '{other}'"
                ))
                .into());
            }
        };
        tracing::debug!(url = %shown, bytes = body.len(), "fetched update manifest");
        hoist_common::decode_payload(&body)
            .with_context(|| format!("decoding update manifest from {shown}"))
    }
}

/// Parses `raw` and lifts any `user:pass@` out of it.
fn split_userinfo(raw: &str) -> Result<(Url, Option<(String, String)>)> {
    let mut url = Url::parse(raw)
        .map_err(|e| UpdateError::Configuration(format!("invalid URL '{raw}': {e}")))?;
    if url.username().is_empty() {
        return Ok((url, None));
    }
    let user = url.username().to_string();
    let pass = url.password().unwrap_or_default().to_string();
    // Setting userinfo only fails for cannot-be-a-base URLs, which have none.
    let _ = url.set_username("");
    let _ = url.set_password(None);
    Ok((url, Some((user, pass))))
}

fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
