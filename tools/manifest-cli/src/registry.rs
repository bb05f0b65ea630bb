//! Registry v2 tag listing, with bearer-token and basic auth challenges.

use std::collections::HashMap;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::header::WWW_AUTHENTICATE;
use serde::Deserialize;
use url::Url;

pub struct RegistryClient {
    client: reqwest::Client,
    base: Url,
    auth: Option<(String, String)>,
}

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Challenge {
    Bearer(HashMap<String, String>),
    Basic,
}

impl RegistryClient {
    /// `registry` is a host (`registry.local:5000`, HTTPS assumed) or a
    /// full base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry address is not a valid URL.
    pub fn new(registry: &str, auth: Option<(String, String)>) -> Result<Self> {
        let base = if registry.contains("://") {
            registry.to_string()
        } else {
            format!("https://{registry}")
        };
        let mut base = Url::parse(&base).with_context(|| format!("invalid registry '{registry}'"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("hoist-manifest/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Self { client, base, auth })
    }

    /// All tags of `repository`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a refused challenge or a
    /// non-success status.
    pub async fn tags(&self, repository: &str) -> Result<Vec<String>> {
        let url = self
            .base
            .join(&format!("v2/{repository}/tags/list"))
            .context("building tag list URL")?;

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("requesting {url}"))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let header = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let request = match parse_challenge(&header) {
                Some(Challenge::Bearer(params)) => {
                    let token = self.token(&params).await?;
                    self.client.get(url.clone()).bearer_auth(token)
                }
                Some(Challenge::Basic) => {
                    let (user, pass) = self
                        .auth
                        .as_ref()
                        .context("registry requires credentials (--user, HOIST_REGISTRY_PASS)")?;
                    self.client.get(url.clone()).basic_auth(user, Some(pass))
                }
                None => anyhow::bail!("registry refused the request: {header}"),
            };
            response = request
                .send()
                .await
                .with_context(|| format!("requesting {url}"))?;
        }

        if !response.status().is_success() {
            anyhow::bail!("{url} answered {}", response.status());
        }
        let list: TagList = response.json().await.context("parsing tag list")?;
        Ok(list.tags.unwrap_or_default())
    }

    async fn token(&self, params: &HashMap<String, String>) -> Result<String> {
        let realm = params.get("realm").context("bearer challenge has no realm")?;
        let mut url = Url::parse(realm).with_context(|| format!("invalid token realm '{realm}'"))?;
        {
            let mut query = url.query_pairs_mut();
            for key in ["service", "scope"] {
                if let Some(value) = params.get(key) {
                    query.append_pair(key, value);
                }
            }
        }
        let mut request = self.client.get(url.clone());
        if let Some((user, pass)) = &self.auth {
            request = request.basic_auth(user, Some(pass));
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("requesting token from {realm}"))?;
        if !response.status().is_success() {
            anyhow::bail!("token endpoint {realm} answered {}", response.status());
        }
        let body: TokenResponse = response.json().await.context("parsing token response")?;
        body.token
            .or(body.access_token)
            .filter(|t| !t.is_empty())
            .context("token response carries no token")
    }
}

/// Parses a `WWW-Authenticate` value such as
/// `Bearer realm="https://auth/token",service="registry",scope="repository:a:pull,push"`.
fn parse_challenge(header: &str) -> Option<Challenge> {
    let (scheme, rest) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));
    if scheme.eq_ignore_ascii_case("basic") {
        return Some(Challenge::Basic);
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut params = HashMap::new();
    let mut chars = rest.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| *c == ',' || c.is_whitespace()) {
            chars.next();
        }
        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if key.is_empty() {
            break;
        }
        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                value.push(c);
            }
        } else {
            while let Some(c) = chars.next_if(|c| *c != ',') {
                value.push(c);
            }
        }
        params.insert(key.trim().to_ascii_lowercase(), value);
    }
    Some(Challenge::Bearer(params))
}
