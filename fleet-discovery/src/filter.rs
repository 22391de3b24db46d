//! Inclusion/exclusion projection over a discovered listing.

use fleet_core::{config::RepoFilters, Repository};

/// Whether `repo` survives `filters`.
pub fn keeps(filters: &RepoFilters, repo: &Repository) -> bool {
    if repo.archived && !filters.include_archived {
        return false;
    }
    if repo.is_private() && !filters.include_private {
        return false;
    }
    if repo.fork && !filters.include_forks {
        return false;
    }
    !filters.exclude.iter().any(|excluded| {
        excluded.eq_ignore_ascii_case(&repo.name) || excluded.eq_ignore_ascii_case(&repo.full_name)
    })
}

/// Filtered copy of `repositories`, sorted by name.
pub fn apply(filters: &RepoFilters, repositories: &[Repository]) -> Vec<Repository> {
    let mut kept: Vec<Repository> = repositories
        .iter()
        .filter(|repo| keeps(filters, repo))
        .cloned()
        .collect();
    kept.sort_by(|a, b| a.name.cmp(&b.name));
    kept
}
