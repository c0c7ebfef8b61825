use crate::types::SortOrder;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = ".git-guilt.yml";

/// All settings that can be placed in a .git-guilt.yml config file.
/// Every field is optional — omitted fields fall back to CLI defaults.
/// CLI flags always take precedence over values set here.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuiltConfig {
    // Blame behaviour
    pub ignore_whitespace: Option<bool>,
    pub email: Option<bool>,
    pub concurrency: Option<usize>,

    // Output
    pub format: Option<String>,
    pub output: Option<String>,
    pub sort: Option<String>,

    /// git executable to run.
    pub git: Option<String>,
}

impl GuiltConfig {
    /// Validates semantic constraints that serde cannot enforce.
    ///
    /// Returns a human-readable error describing exactly what is wrong and what
    /// values are accepted. Called automatically by [`load_config`].
    pub fn validate(&self) -> Result<(), String> {
        if let Some(fmt) = &self.format {
            match fmt.as_str() {
                "terminal" | "json" => {}
                other => {
                    return Err(format!(
                        "Invalid 'format' value: \"{other}\". Expected one of: \"terminal\", \"json\""
                    ))
                }
            }
        }

        if let Some(sort) = &self.sort {
            parse_sort(sort)?;
        }

        // 0 would never start a single blame.
        if let Some(0) = self.concurrency {
            return Err("Invalid 'concurrency' value: 0. Must be 1 or greater".to_string());
        }

        if let Some(git) = &self.git {
            if git.trim().is_empty() {
                return Err("Invalid 'git' value: must name an executable".to_string());
            }
        }

        Ok(())
    }

    pub fn sort_order(&self) -> Option<SortOrder> {
        self.sort.as_deref().and_then(|s| parse_sort(s).ok())
    }
}

pub fn parse_sort(value: &str) -> Result<SortOrder, String> {
    match value {
        "guilt" => Ok(SortOrder::Guilt),
        "name" => Ok(SortOrder::Name),
        other => Err(format!(
            "Invalid 'sort' value: \"{other}\". Expected one of: \"guilt\", \"name\""
        )),
    }
}

/// Reads, parses, and validates a YAML config file from `path`.
pub fn load_config(path: &Path) -> Result<GuiltConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config file '{}': {e}", path.display()))?;
    let cfg: GuiltConfig = serde_yaml::from_str(&content)
        .map_err(|e| format!("Invalid config file '{}': {e}", path.display()))?;
    cfg.validate()
        .map_err(|e| format!("Config file '{}': {e}", path.display()))?;
    Ok(cfg)
}

/// Candidate config files when none is given explicitly: the repository's own
/// `.git-guilt.yml`, then the per-user one.
pub fn default_config_paths(repo_root: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(root) = repo_root {
        paths.push(root.join(CONFIG_FILE_NAME));
    }
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("git-guilt").join("config.yml"));
    }
    paths
}

/// Loads `explicit` if given, else the first existing default config file.
/// Finding nothing is fine and yields an empty config.
pub fn resolve_config(explicit: Option<&Path>, repo_root: Option<&Path>) -> Result<GuiltConfig, String> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    match default_config_paths(repo_root).into_iter().find(|p| p.is_file()) {
        Some(path) => load_config(&path),
        None => Ok(GuiltConfig::default()),
    }
}

/// Annotated YAML template — printed by `--generate-config`.
pub static TEMPLATE: &str = r#"# git-guilt configuration file
# Generated by: git-guilt --generate-config
#
# All settings are optional. Omit any field to use the built-in default.
# CLI flags always take precedence over values in this file.
# Save this file as .git-guilt.yml in your repository root, or as
# git-guilt/config.yml in your user config directory.

# ── Blame ──────────────────────────────────────────────────────────────────────

# Ignore whitespace-only changes (git blame -w / git diff -w).
# ignore_whitespace: true

# Attribute lines to author emails instead of names (git blame -e).
# email: false

# Maximum number of git blame processes running at once.
# When comparing two revisions each side gets half of this.
# concurrency: 4

# git executable to run.
# git: "git"

# ── Output ─────────────────────────────────────────────────────────────────────

# Output format: terminal, json
# format: "terminal"

# Output file path (json only). Defaults to stdout.
# output: "guilt.json"

# Ordering of authors: guilt (largest first), name
# sort: "guilt"
"#;

/// Prints the config template to stdout, or writes it to `output_path` if given.
pub fn print_template(output_path: Option<&Path>) -> Result<(), String> {
    match output_path {
        Some(path) => std::fs::write(path, TEMPLATE)
            .map_err(|e| format!("Cannot write config template to '{}': {e}", path.display())),
        None => {
            print!("{TEMPLATE}");
            Ok(())
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
