//! GitHub REST API client for listing an organization's repositories.
//!
//! The target may be an organization or a plain user account; a 404 from the
//! organization endpoint falls back to the user endpoint.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::DiscoveryError;

use super::RepoCatalog;

/// GitHub REST API base URL.
const GITHUB_API_BASE: &str = "https://api.github.com";

/// Repositories requested per page.
pub const PAGE_SIZE: usize = 100;

/// The subset of a catalog listing discovery needs.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogRepo {
    pub name: String,
    pub clone_url: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub languages_url: String,
}

/// Which listing endpoint serves the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    Org,
    User,
}

impl OwnerKind {
    fn path(&self) -> &'static str {
        match self {
            OwnerKind::Org => "orgs",
            OwnerKind::User => "users",
        }
    }
}

/// Authenticated GitHub catalog client.
pub struct GitHubCatalog {
    client: Client,
    token: String,
    base_url: String,
}

/// A catalog owner whose listing endpoint is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogOwner {
    pub name: String,
    pub kind: OwnerKind,
}

impl GitHubCatalog {
    /// Create a client authenticated with `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
            token: token.into(),
            base_url: GITHUB_API_BASE.to_string(),
        }
    }

    /// Point the client at a different API root (GitHub Enterprise).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn listing_url(&self, kind: OwnerKind, owner: &str, page: u32) -> String {
        format!(
            "{}/{}/{}/repos?per_page={}&page={}",
            self.base_url,
            kind.path(),
            urlencoding::encode(owner),
            PAGE_SIZE,
            page
        )
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, DiscoveryError> {
        Ok(self
            .client
            .get(url)
            .header("User-Agent", "repo-analyzer/0.1")
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await?)
    }
}

#[async_trait]
impl RepoCatalog for GitHubCatalog {
    /// Query the organization endpoint, falling back to users on 404.
    async fn resolve_owner(&self, owner: &str) -> Result<CatalogOwner, DiscoveryError> {
        let response = self.get(&self.listing_url(OwnerKind::Org, owner, 1)).await?;
        let kind = match response.status() {
            status if status.is_success() => OwnerKind::Org,
            StatusCode::NOT_FOUND => {
                warn!(owner, "Organization not found; trying as a user");
                OwnerKind::User
            }
            status => {
                let message = error_message(response).await;
                return Err(DiscoveryError::CatalogAccess {
                    target: owner.to_string(),
                    message: format!("HTTP {}: {}", status, message),
                });
            }
        };

        Ok(CatalogOwner {
            name: owner.to_string(),
            kind,
        })
    }

    async fn list_repos(
        &self,
        owner: &CatalogOwner,
        page: u32,
    ) -> Result<Vec<CatalogRepo>, DiscoveryError> {
        let response = self.get(&self.listing_url(owner.kind, &owner.name, page)).await?;
        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(DiscoveryError::CatalogAccess {
                target: owner.name.clone(),
                message: format!("HTTP {}: {}", status, message),
            });
        }

        let repos: Vec<CatalogRepo> = response
            .json()
            .await
            .map_err(|e| DiscoveryError::InvalidResponse(e.to_string()))?;
        debug!(owner = %owner.name, page, count = repos.len(), "Fetched catalog page");
        Ok(repos)
    }

    async fn languages(&self, languages_url: &str) -> Result<HashMap<String, u64>, DiscoveryError> {
        let response = self.get(languages_url).await?;
        if !response.status().is_success() {
            return Err(DiscoveryError::InvalidResponse(format!(
                "languages request {} returned HTTP {}",
                languages_url,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| DiscoveryError::InvalidResponse(e.to_string()))
    }
}

/// Extract GitHub's `message` field, falling back to the raw body.
async fn error_message(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or(body)
}
