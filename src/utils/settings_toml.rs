//! Load `.resultflow.toml` from a directory (CLI only). Lib callers pass [`DispatchOpts`](crate::DispatchOpts) directly.

use serde::Deserialize;
use std::path::Path;

use crate::Opts;
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SettingsToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    key: Option<String>,
    buffer: Option<usize>,
    threads: Option<usize>,
    error_capacity: Option<usize>,
    unbounded_queue: Option<bool>,
    fail_fast: Option<bool>,
    verbose: Option<bool>,
}

/// Load the settings file from `dir` if present. Returns None if missing or unreadable.
pub(crate) fn load_settings_toml(dir: &Path) -> Option<SettingsToml> {
    let path = dir.join(PackagePaths::get().settings_filename());
    let s = std::fs::read_to_string(&path).ok()?;
    parse_settings_toml(&s)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok()
}

pub(crate) fn parse_settings_toml(s: &str) -> Result<SettingsToml, toml::de::Error> {
    toml::from_str(s)
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $opts:expr, $sec_field:ident => $opts_field:ident) => {
        if let Some(v) = $sec.$sec_field.clone() {
            $opts.$opts_field = v;
        }
    };
}

/// Apply file settings to opts (only fields present in the file). Call before applying CLI flags.
pub(crate) fn apply_file_to_opts(file: &SettingsToml, opts: &mut Opts) {
    let sec = &file.settings;
    apply_file_opt!(sec, opts, key => array_key);
    apply_file_opt!(sec, opts, buffer => buffer_capacity);
    if let Some(n) = sec.threads {
        opts.threads = Some(n);
    }
    apply_file_opt!(sec, opts, error_capacity => error_capacity);
    apply_file_opt!(sec, opts, unbounded_queue => unbounded_queue);
    apply_file_opt!(sec, opts, fail_fast => fail_fast);
    apply_file_opt!(sec, opts, verbose => verbose);
}
