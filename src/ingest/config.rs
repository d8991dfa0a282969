// src/ingest/config.rs
//! Hashtag blacklist: a `.toml` file (`hashtags = [...]`) or a `.json` array,
//! chosen by extension. Entries go through the same normalization as
//! ingested hashtags.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::Hashtag;

const ENV_PATH: &str = "GEO_EVENTS_BLACKLIST_PATH";
const FALLBACKS: [&str; 2] = ["config/blacklist.toml", "config/blacklist.json"];

/// Hashtags never ingested. Built once at startup and passed to adapters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct Blacklist(BTreeSet<String>);

impl From<Vec<String>> for Blacklist {
    fn from(tags: Vec<String>) -> Self {
        Self::new(tags)
    }
}

#[derive(Deserialize)]
struct BlacklistFile {
    hashtags: Blacklist,
}

impl Blacklist {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            tags.into_iter()
                .filter_map(|t| Hashtag::new(t.as_ref()))
                .map(|h| h.as_str().to_string())
                .collect(),
        )
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: BlacklistFile = toml::from_str(s).context("parsing blacklist toml")?;
        Ok(file.hashtags)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).context("parsing blacklist json")
    }

    pub fn contains(&self, tag: &Hashtag) -> bool {
        self.0.contains(tag.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub fn load_blacklist_from(path: &Path) -> Result<Blacklist> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase);
    let parse: fn(&str) -> Result<Blacklist> = match ext.as_deref() {
        Some("toml") => Blacklist::from_toml_str,
        Some("json") => Blacklist::from_json_str,
        _ => {
            return Err(anyhow!(
                "unsupported blacklist file {} (expected .toml or .json)",
                path.display()
            ))
        }
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading blacklist from {}", path.display()))?;
    parse(&content).with_context(|| format!("in {}", path.display()))
}

/// `$GEO_EVENTS_BLACKLIST_PATH` (must exist), then `config/blacklist.toml`,
/// then `config/blacklist.json`, else empty.
pub fn load_blacklist_default() -> Result<Blacklist> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
        return load_blacklist_from(&pb);
    }
    FALLBACKS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .map_or_else(|| Ok(Blacklist::default()), |p| load_blacklist_from(&p))
}
