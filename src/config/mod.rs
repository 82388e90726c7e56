pub mod parse;
pub mod types;

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub use parse::{load_config, load_or_default, parse_config, ConfigError};
pub use types::Config;

/// Matches `$env{VAR_NAME}` references.
const ENV_VAR_PATTERN: &str = r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}";

pub(crate) fn env_var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(ENV_VAR_PATTERN).expect("static pattern compiles"))
}

/// Substitutes every `$env{NAME}` with the variable's value. References to
/// unset variables stay in the text so validation can point at them.
pub fn expand_env_vars(text: &str) -> String {
    env_var_regex()
        .replace_all(text, |caps: &regex::Captures| {
            let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            caps.get(1)
                .and_then(|name| std::env::var(name.as_str()).ok())
                .unwrap_or_else(|| whole.to_string())
        })
        .to_string()
}

/// Replaces a leading `~` component with the home directory. Paths such as
/// `~user/x` are left alone.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) if rest.as_os_str().is_empty() => home,
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Per-user then system-wide config locations, in lookup order.
fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(2);
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/locago/config.yml"));
    }
    paths.push(PathBuf::from("/etc/locago/config.yml"));
    paths
}

/// A path given on the command line is used as is, even if missing, so the
/// load error names it. Otherwise the first default location that exists.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(expand_tilde(path)),
        None => default_config_paths().into_iter().find(|p| p.exists()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_expand_env_vars_single() {
        std::env::set_var("LOCAGO_TEST_VAR", "test_value");
        let result = expand_env_vars("http://$env{LOCAGO_TEST_VAR}:7778");
        assert_eq!(result, "http://test_value:7778");
        std::env::remove_var("LOCAGO_TEST_VAR");
    }

    #[test]
    fn test_expand_env_vars_unset() {
        let result = expand_env_vars("path/$env{LOCAGO_NONEXISTENT_VAR}/file");
        assert_eq!(result, "path/$env{LOCAGO_NONEXISTENT_VAR}/file");
    }

    #[test]
    fn test_expand_env_vars_no_expansion() {
        let result = expand_env_vars("plain/path/without/vars");
        assert_eq!(result, "plain/path/without/vars");
    }

    #[test]
    fn test_expand_tilde_with_path() {
        let expanded = expand_tilde(Path::new("~/run/docker.sock"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("run/docker.sock"));
        }
    }

    #[test]
    fn test_expand_tilde_no_expansion() {
        let expanded = expand_tilde(Path::new("/var/run/docker.sock"));
        assert_eq!(expanded, Path::new("/var/run/docker.sock"));
    }

    #[test]
    fn test_expand_bare_tilde_and_other_users() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde(Path::new("~")), home);
        }
        assert_eq!(expand_tilde(Path::new("~ops/agent.yml")), Path::new("~ops/agent.yml"));
    }

    #[test]
    fn test_user_config_searched_before_system() {
        let paths = default_config_paths();
        assert_eq!(paths.last().map(PathBuf::as_path), Some(Path::new("/etc/locago/config.yml")));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(paths[0], home.join(".config/locago/config.yml"));
        }
    }
}
