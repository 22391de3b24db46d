pub mod cache;
pub mod daemon;
pub mod discover;
pub mod run;
pub mod status;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use fleet_core::{FleetConfig, FleetPaths, Organization};

/// Paths and config for the current user, loaded once per command.
pub struct Workspace {
    pub paths: FleetPaths,
    pub config: FleetConfig,
}

impl Workspace {
    pub fn load() -> Result<Self> {
        let paths = FleetPaths::from_home().context("could not determine home directory")?;
        let config = FleetConfig::load(&paths)
            .with_context(|| format!("failed to load {}", paths.config_file.display()))?;
        Ok(Self { paths, config })
    }

    pub fn organization(&self, override_org: Option<&str>) -> Result<Organization> {
        Ok(self.config.resolve_organization(override_org)?)
    }
}

/// "3m ago", "in 2h", "never".
pub fn relative_time(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return "never".to_string();
    };
    let delta = now.signed_duration_since(at);
    let (secs, future) = if delta.num_seconds() < 0 {
        (-delta.num_seconds(), true)
    } else {
        (delta.num_seconds(), false)
    };
    let span = if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86_400)
    };
    if future {
        format!("in {span}")
    } else {
        format!("{span} ago")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn relative_time_formats_past_and_future() {
        let now = Utc::now();
        assert_eq!(relative_time(None, now), "never");
        assert_eq!(relative_time(Some(now - Duration::seconds(42)), now), "42s ago");
        assert_eq!(relative_time(Some(now - Duration::minutes(5)), now), "5m ago");
        assert_eq!(relative_time(Some(now + Duration::hours(6)), now), "in 6h");
        assert_eq!(relative_time(Some(now - Duration::days(3)), now), "3d ago");
    }
}
