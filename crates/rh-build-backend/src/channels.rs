//! The packages available from Conda channels, so a Conda package only depends on packages its
//! users can install.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use etcetera::BaseStrategy;
use jiff::{SignedDuration, Timestamp};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use rh_fs::Simplified;
use rh_normalize::PackageName;
use rh_pep508::Requirement;

use crate::Error;

/// Normalized names whose Conda package is named differently.
const CONDA_ALIASES: &[(&str, &str)] = &[("ruamel-yaml", "ruamel.yaml")];

const CONDA_API: &str = "https://conda.anaconda.org";

/// The channel subdirectories that are searched for packages.
const SUBDIRS: [&str; 2] = ["noarch", "linux-64"];

/// How long a fetched package list is reused.
const CACHE_LIFETIME: SignedDuration = SignedDuration::from_hours(48);

/// Lists the names of the packages on a Conda channel.
pub trait ChannelIndex {
    fn package_names(&self, channel: &str) -> Result<Vec<String>, Error>;
}

/// Reads channel package lists from `repodata.json` on anaconda.org, caching each list on disk.
#[derive(Debug, Clone)]
pub struct CondaApi {
    client: reqwest::blocking::Client,
    base_url: String,
    cache_dir: Option<PathBuf>,
}

impl CondaApi {
    pub fn new(base_url: impl Into<String>, cache_dir: Option<PathBuf>) -> Result<Self, Error> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("repo-helper/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::HttpClient)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            cache_dir,
        })
    }

    /// Query anaconda.org, caching in `$XDG_CACHE_HOME/repo-helper/conda_cache` on Unix.
    ///
    /// Without a cache directory every build fetches the package lists again.
    pub fn from_env() -> Result<Self, Error> {
        let cache_dir = etcetera::base_strategy::choose_base_strategy()
            .ok()
            .map(|dirs| dirs.cache_dir().join("repo-helper").join("conda_cache"));
        Self::new(CONDA_API, cache_dir)
    }

    fn fetch(&self, channel: &str) -> Result<Vec<String>, Error> {
        let mut names = BTreeSet::new();
        for subdir in SUBDIRS {
            let url = format!("{}/{channel}/{subdir}/repodata.json", self.base_url);
            debug!("Fetching {url}");
            let repodata: RepoData = self
                .client
                .get(&url)
                .send()
                .and_then(reqwest::blocking::Response::error_for_status)
                .and_then(reqwest::blocking::Response::json)
                .map_err(|err| Error::Channel {
                    channel: channel.to_string(),
                    err,
                })?;
            names.extend(repodata.packages.into_values().map(|record| record.name));
        }
        Ok(names.into_iter().collect())
    }
}

impl ChannelIndex for CondaApi {
    fn package_names(&self, channel: &str) -> Result<Vec<String>, Error> {
        let cache_file = self
            .cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{channel}.json")));

        if let Some(cached) = cache_file.as_deref().and_then(read_cache) {
            if cached.expires > Timestamp::now() {
                debug!("Using cached package list for channel `{channel}`");
                return Ok(cached.packages);
            }
            debug!("Cached package list for channel `{channel}` expired");
        }

        let packages = self.fetch(channel)?;
        if let Some(cache_file) = &cache_file {
            let cached = CachedChannel {
                expires: Timestamp::now() + CACHE_LIFETIME,
                packages,
            };
            write_cache(cache_file, &cached);
            return Ok(cached.packages);
        }
        Ok(packages)
    }
}

/// The part of `repodata.json` that names packages.
#[derive(Debug, Deserialize)]
struct RepoData {
    #[serde(default)]
    packages: FxHashMap<String, RepoDataRecord>,
}

#[derive(Debug, Deserialize)]
struct RepoDataRecord {
    name: String,
}

/// `<cache dir>/<channel>.json`
#[derive(Debug, Serialize, Deserialize)]
struct CachedChannel {
    expires: Timestamp,
    packages: Vec<String>,
}

/// An unreadable cache is fetched again.
fn read_cache(path: &Path) -> Option<CachedChannel> {
    let content = fs_err::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(cached) => Some(cached),
        Err(err) => {
            debug!("Ignoring invalid cache {}: {err}", path.user_display());
            None
        }
    }
}

/// A cache that can't be written only costs a fetch on the next build.
fn write_cache(path: &Path, cached: &CachedChannel) {
    let result = path
        .parent()
        .map_or(Ok(()), fs_err::create_dir_all)
        .and_then(|()| {
            let json = serde_json::to_string_pretty(cached).map_err(std::io::Error::other)?;
            fs_err::write(path, json)
        });
    if let Err(err) = result {
        debug!("Failed to write cache {}: {err}", path.user_display());
    }
}

/// Rename each requirement to the spelling of its package on `channels`.
///
/// Known aliases such as `ruamel-yaml` to `ruamel.yaml` are applied without consulting the
/// channels. Any other requirement must be provided by one of the channels.
pub(crate) fn validate_requirements(
    requirements: &[Requirement],
    channels: &[String],
    index: &dyn ChannelIndex,
) -> Result<Vec<(String, Requirement)>, Error> {
    let mut available: FxHashMap<PackageName, String> = FxHashMap::default();
    for channel in channels {
        for name in index.package_names(channel)? {
            // Conda names that aren't valid Python names, like `_libgcc_mutex`, can't match.
            if let Ok(normalized) = PackageName::from_str(&name) {
                available.entry(normalized).or_insert(name);
            }
        }
    }
    debug!(
        "Found {} package(s) on channel(s): {}",
        available.len(),
        channels.join(", ")
    );

    requirements
        .iter()
        .map(|requirement| {
            if let Some((_, alias)) = CONDA_ALIASES
                .iter()
                .find(|(pypi, _)| *pypi == requirement.name.as_str())
            {
                return Ok(((*alias).to_string(), requirement.clone()));
            }
            match available.get(&requirement.name) {
                Some(name) => Ok((name.clone(), requirement.clone())),
                None => Err(Error::UnavailableRequirement {
                    name: requirement.name.clone(),
                    channels: channels.join(", "),
                }),
            }
        })
        .collect()
}
