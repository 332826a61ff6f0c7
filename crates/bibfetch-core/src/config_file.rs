use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Config;
use crate::session::BrowserProfile;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub download: Option<DownloadConfig>,
    pub search: Option<SearchConfig>,
    pub fallback: Option<FallbackConfig>,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadConfig {
    pub destination_dir: Option<String>,
    pub browser: Option<String>,
    pub page_load_timeout_secs: Option<u64>,
    pub download_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub challenge_wait_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    pub engine_url: Option<String>,
    pub api_url: Option<String>,
    pub crossref_mailto: Option<String>,
    pub disabled: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FallbackConfig {
    pub manual: Option<bool>,
    pub downloads_dir: Option<String>,
    pub wait_secs: Option<u64>,
    pub auto_open_link: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub merge_pdfs: Option<bool>,
    pub missing_report: Option<bool>,
}

/// Platform config directory path: `<config_dir>/bibfetch/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bibfetch").join("config.toml"))
}

/// Load config by cascading CWD `.bibfetch.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".bibfetch.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// `overlay`'s field if set, else `base`'s.
fn pick<S, T>(overlay: &Option<S>, base: &Option<S>, field: impl Fn(&S) -> Option<T>) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (bd, od) = (&base.download, &overlay.download);
    let (bs, os) = (&base.search, &overlay.search);
    let (bf, of) = (&base.fallback, &overlay.fallback);
    let (bo, oo) = (&base.output, &overlay.output);

    ConfigFile {
        download: Some(DownloadConfig {
            destination_dir: pick(od, bd, |d| d.destination_dir.clone()),
            browser: pick(od, bd, |d| d.browser.clone()),
            page_load_timeout_secs: pick(od, bd, |d| d.page_load_timeout_secs),
            download_timeout_secs: pick(od, bd, |d| d.download_timeout_secs),
            poll_interval_ms: pick(od, bd, |d| d.poll_interval_ms),
            challenge_wait_secs: pick(od, bd, |d| d.challenge_wait_secs),
        }),
        search: Some(SearchConfig {
            engine_url: pick(os, bs, |s| s.engine_url.clone()),
            api_url: pick(os, bs, |s| s.api_url.clone()),
            crossref_mailto: pick(os, bs, |s| s.crossref_mailto.clone()),
            disabled: pick(os, bs, |s| s.disabled.clone()),
        }),
        fallback: Some(FallbackConfig {
            manual: pick(of, bf, |f| f.manual),
            downloads_dir: pick(of, bf, |f| f.downloads_dir.clone()),
            wait_secs: pick(of, bf, |f| f.wait_secs),
            auto_open_link: pick(of, bf, |f| f.auto_open_link),
        }),
        output: Some(OutputConfig {
            merge_pdfs: pick(oo, bo, |o| o.merge_pdfs),
            missing_report: pick(oo, bo, |o| o.missing_report),
        }),
    }
}

impl ConfigFile {
    /// Overwrite `config` with every value this file sets.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(ref d) = self.download {
            if let Some(ref dir) = d.destination_dir {
                config.destination_dir = PathBuf::from(dir);
            }
            if let Some(ref browser) = d.browser {
                match browser.parse::<BrowserProfile>() {
                    Ok(profile) => config.browser = profile,
                    Err(e) => tracing::warn!(error = %e, "ignoring browser setting"),
                }
            }
            if let Some(v) = d.page_load_timeout_secs {
                config.page_load_timeout_secs = v;
            }
            if let Some(v) = d.download_timeout_secs {
                config.download_timeout_secs = v;
            }
            if let Some(v) = d.poll_interval_ms {
                config.poll_interval_ms = v;
            }
            if let Some(v) = d.challenge_wait_secs {
                config.challenge_wait_secs = v;
            }
        }
        if let Some(ref s) = self.search {
            if let Some(ref url) = s.engine_url {
                config.search_engine_url = url.clone();
            }
            if let Some(ref url) = s.api_url {
                config.bibliographic_api_url = url.clone();
            }
            if let Some(ref mailto) = s.crossref_mailto {
                config.crossref_mailto = Some(mailto.clone());
            }
            if let Some(ref disabled) = s.disabled {
                config.disabled_strategies = disabled.clone();
            }
        }
        if let Some(ref f) = self.fallback {
            if let Some(v) = f.manual {
                config.manual_fallback = v;
            }
            if let Some(ref dir) = f.downloads_dir {
                config.manual_downloads_dir = Some(PathBuf::from(dir));
            }
            if let Some(v) = f.wait_secs {
                config.manual_wait_secs = v;
            }
            if let Some(v) = f.auto_open_link {
                config.manual_auto_open_link = v;
            }
        }
        if let Some(ref o) = self.output {
            if let Some(v) = o.merge_pdfs {
                config.merge_pdfs = v;
            }
            if let Some(v) = o.missing_report {
                config.write_missing_report = v;
            }
        }
    }
}
