//! Repository discovery.
//!
//! Resolves the ordered list of repositories for a run, either from a single
//! configured entry or by scanning an organization's GitHub catalog.

pub mod github;

pub use github::{CatalogOwner, CatalogRepo, GitHubCatalog, OwnerKind};

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::DiscoveryError;
use crate::pipeline::config::{DiscoveryMode, OrgScanConfig};

/// A repository to analyze.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// Unique name; also the ledger key.
    pub name: String,
    /// Clone URL or local path.
    pub source_location: String,
}

impl RepositoryRef {
    /// Creates a repository reference.
    pub fn new(name: impl Into<String>, source_location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_location: source_location.into(),
        }
    }
}

/// A paged repository catalog.
#[async_trait]
pub trait RepoCatalog: Send + Sync {
    /// Resolve which listing endpoint serves `owner`.
    async fn resolve_owner(&self, owner: &str) -> Result<CatalogOwner, DiscoveryError>;

    /// Fetch one page (1-based) of the owner's repositories.
    async fn list_repos(
        &self,
        owner: &CatalogOwner,
        page: u32,
    ) -> Result<Vec<CatalogRepo>, DiscoveryError>;

    /// Language name to byte count for one repository.
    async fn languages(&self, languages_url: &str) -> Result<HashMap<String, u64>, DiscoveryError>;
}

/// Resolve the repositories for `mode`.
///
/// `github_token` is only consulted for catalog scans.
pub async fn discover_repos(
    mode: &DiscoveryMode,
    github_token: Option<&str>,
) -> Result<Vec<RepositoryRef>, DiscoveryError> {
    let repos = match mode {
        DiscoveryMode::Single(single) => {
            vec![RepositoryRef::new(&single.name, &single.git_url)]
        }
        DiscoveryMode::OrgScan(org) => {
            let token = github_token
                .filter(|t| !t.is_empty())
                .ok_or(DiscoveryError::MissingToken)?;
            scan_org(&GitHubCatalog::new(token), org).await?
        }
    };

    info!("Found {} repository(ies) to analyze", repos.len());
    Ok(repos)
}

/// Walk the catalog in order, applying filters until the limit is reached.
pub async fn scan_org(
    catalog: &dyn RepoCatalog,
    config: &OrgScanConfig,
) -> Result<Vec<RepositoryRef>, DiscoveryError> {
    let filters = &config.filters;
    let max_repos = config.limits.max_repos_per_run;
    let target_language = filters.language.as_deref().unwrap_or("").trim();

    let owner = catalog.resolve_owner(&config.github_org).await?;
    let mut repos = Vec::new();
    let mut page = 1;

    'pages: loop {
        let batch = catalog.list_repos(&owner, page).await?;
        if batch.is_empty() {
            break;
        }

        for repo in &batch {
            if !passes_static_filters(repo, filters.exclude_archived, filters.exclude_forks) {
                debug!(repo = %repo.name, "Skipping archived or forked repository");
                continue;
            }

            if !target_language.is_empty() {
                let languages = catalog.languages(&repo.languages_url).await?;
                if !has_language(languages.keys(), target_language) {
                    continue;
                }
            }

            repos.push(RepositoryRef::new(&repo.name, &repo.clone_url));

            if max_repos.is_some_and(|max| repos.len() >= max) {
                break 'pages;
            }
        }

        if batch.len() < github::PAGE_SIZE {
            break;
        }
        page += 1;
    }

    Ok(repos)
}

/// Archived and fork filters, which need no extra request.
pub fn passes_static_filters(
    repo: &CatalogRepo,
    exclude_archived: bool,
    exclude_forks: bool,
) -> bool {
    if exclude_archived && repo.archived {
        return false;
    }
    if exclude_forks && repo.fork {
        return false;
    }
    true
}

/// Case-insensitive language membership.
pub fn has_language<'a>(languages: impl IntoIterator<Item = &'a String>, target: &str) -> bool {
    let target = target.to_lowercase();
    languages.into_iter().any(|lang| lang.to_lowercase() == target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::{ScanFilters, ScanLimits, SingleRepoConfig};
    use std::sync::Mutex;

    /// In-memory catalog serving `total` repositories in pages of `PAGE_SIZE`.
    struct FakeCatalog {
        repos: Vec<CatalogRepo>,
        languages: HashMap<String, HashMap<String, u64>>,
        pages_requested: Mutex<Vec<u32>>,
        language_lookups: Mutex<Vec<String>>,
    }

    impl FakeCatalog {
        fn with_repos(total: usize) -> Self {
            let repos = (0..total)
                .map(|i| CatalogRepo {
                    name: format!("repo-{i:03}"),
                    clone_url: format!("https://github.com/acme/repo-{i:03}.git"),
                    archived: false,
                    fork: false,
                    languages_url: format!("langs/repo-{i:03}"),
                })
                .collect();
            Self {
                repos,
                languages: HashMap::new(),
                pages_requested: Mutex::new(Vec::new()),
                language_lookups: Mutex::new(Vec::new()),
            }
        }

        fn set_languages(&mut self, index: usize, langs: &[&str]) {
            let url = self.repos[index].languages_url.clone();
            let map = langs.iter().map(|l| (l.to_string(), 100)).collect();
            self.languages.insert(url, map);
        }

        fn pages(&self) -> Vec<u32> {
            self.pages_requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RepoCatalog for FakeCatalog {
        async fn resolve_owner(&self, owner: &str) -> Result<CatalogOwner, DiscoveryError> {
            Ok(CatalogOwner {
                name: owner.to_string(),
                kind: OwnerKind::Org,
            })
        }

        async fn list_repos(
            &self,
            _owner: &CatalogOwner,
            page: u32,
        ) -> Result<Vec<CatalogRepo>, DiscoveryError> {
            self.pages_requested.lock().unwrap().push(page);
            let start = (page as usize - 1) * github::PAGE_SIZE;
            Ok(self
                .repos
                .iter()
                .skip(start)
                .take(github::PAGE_SIZE)
                .cloned()
                .collect())
        }

        async fn languages(
            &self,
            languages_url: &str,
        ) -> Result<HashMap<String, u64>, DiscoveryError> {
            self.language_lookups
                .lock()
                .unwrap()
                .push(languages_url.to_string());
            Ok(self.languages.get(languages_url).cloned().unwrap_or_default())
        }
    }

    fn scan_config(filters: ScanFilters, max_repos_per_run: Option<usize>) -> OrgScanConfig {
        OrgScanConfig {
            github_org: "acme".to_string(),
            filters,
            limits: ScanLimits { max_repos_per_run },
        }
    }

    fn names(repos: &[RepositoryRef]) -> Vec<&str> {
        repos.iter().map(|r| r.name.as_str()).collect()
    }

    fn repo(archived: bool, fork: bool) -> CatalogRepo {
        CatalogRepo {
            name: "svc".to_string(),
            clone_url: "https://github.com/acme/svc.git".to_string(),
            archived,
            fork,
            languages_url: String::new(),
        }
    }

    #[tokio::test]
    async fn test_single_mode() {
        let mode = DiscoveryMode::Single(SingleRepoConfig {
            name: "svc".to_string(),
            git_url: "https://github.com/acme/svc.git".to_string(),
        });
        let repos = discover_repos(&mode, None).await.unwrap();
        assert_eq!(repos, vec![RepositoryRef::new("svc", "https://github.com/acme/svc.git")]);
    }

    #[tokio::test]
    async fn test_org_scan_requires_token() {
        let mode = DiscoveryMode::OrgScan(OrgScanConfig {
            github_org: "acme".to_string(),
            filters: Default::default(),
            limits: Default::default(),
        });
        let result = discover_repos(&mode, Some("")).await;
        assert!(matches!(result, Err(DiscoveryError::MissingToken)));
    }

    #[test]
    fn test_static_filters() {
        assert!(passes_static_filters(&repo(false, false), true, true));
        assert!(!passes_static_filters(&repo(true, false), true, false));
        assert!(passes_static_filters(&repo(true, false), false, false));
        assert!(!passes_static_filters(&repo(false, true), false, true));
        assert!(passes_static_filters(&repo(false, true), true, false));
    }

    #[test]
    fn test_has_language_case_insensitive() {
        let langs = vec!["Java".to_string(), "Shell".to_string()];
        assert!(has_language(&langs, "java"));
        assert!(has_language(&langs, "SHELL"));
        assert!(!has_language(&langs, "python"));
    }

    #[tokio::test]
    async fn test_scan_stops_at_limit_mid_page() {
        let catalog = FakeCatalog::with_repos(250);
        let repos = scan_org(&catalog, &scan_config(ScanFilters::default(), Some(5)))
            .await
            .unwrap();

        assert_eq!(
            names(&repos),
            vec!["repo-000", "repo-001", "repo-002", "repo-003", "repo-004"]
        );
        assert_eq!(catalog.pages(), vec![1]);
    }

    #[tokio::test]
    async fn test_scan_pages_until_short_page() {
        let catalog = FakeCatalog::with_repos(github::PAGE_SIZE + 3);
        let repos = scan_org(&catalog, &scan_config(ScanFilters::default(), None))
            .await
            .unwrap();

        assert_eq!(repos.len(), github::PAGE_SIZE + 3);
        assert_eq!(repos.last().unwrap().name, "repo-102");
        assert_eq!(catalog.pages(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_scan_full_last_page_requests_one_more() {
        let catalog = FakeCatalog::with_repos(github::PAGE_SIZE);
        let repos = scan_org(&catalog, &scan_config(ScanFilters::default(), None))
            .await
            .unwrap();

        assert_eq!(repos.len(), github::PAGE_SIZE);
        assert_eq!(catalog.pages(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_scan_language_filter_is_case_insensitive() {
        let mut catalog = FakeCatalog::with_repos(4);
        catalog.set_languages(0, &["Java", "Shell"]);
        catalog.set_languages(1, &["Python"]);
        catalog.set_languages(3, &["JAVA"]);

        let filters = ScanFilters {
            language: Some("java".to_string()),
            ..Default::default()
        };
        let repos = scan_org(&catalog, &scan_config(filters, None)).await.unwrap();

        assert_eq!(names(&repos), vec!["repo-000", "repo-003"]);
        assert_eq!(catalog.language_lookups.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_scan_limit_counts_only_kept_repos() {
        let mut catalog = FakeCatalog::with_repos(6);
        catalog.repos[0].archived = true;
        catalog.repos[1].fork = true;
        catalog.repos[2].archived = true;

        let filters = ScanFilters {
            exclude_archived: true,
            exclude_forks: true,
            language: None,
        };
        let repos = scan_org(&catalog, &scan_config(filters, Some(2))).await.unwrap();

        assert_eq!(names(&repos), vec!["repo-003", "repo-004"]);
        assert!(catalog.language_lookups.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_static_filters_skip_language_lookup() {
        let mut catalog = FakeCatalog::with_repos(2);
        catalog.repos[0].fork = true;
        catalog.set_languages(0, &["Java"]);
        catalog.set_languages(1, &["Java"]);

        let filters = ScanFilters {
            exclude_archived: false,
            exclude_forks: true,
            language: Some("Java".to_string()),
        };
        let repos = scan_org(&catalog, &scan_config(filters, None)).await.unwrap();

        assert_eq!(names(&repos), vec!["repo-001"]);
        assert_eq!(
            *catalog.language_lookups.lock().unwrap(),
            vec!["langs/repo-001".to_string()]
        );
    }
}
