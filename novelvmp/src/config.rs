//! Configuration loading: master config, per-template `config.yaml`,
//! `vserver-mapping.yaml`, `domainlist.txt`, and the credential keyfile.
//!
//! Grounded on `examples/original_source/orchestrator/internal/config/viper.go`,
//! `internal/config/keys.go`, and `internal/scheduler/scanner_template.go`'s
//! `loadScannerConfig`/`internal/scheduler/scope.go`'s `NewScopeFromViperConfig`.
//! Uses `serde_yaml` in place of `viper` — this crate's closest sibling in the
//! retrieval pack (adamtc007-ob-poc) reaches for the same crate for ad-hoc
//! YAML config loading, and it is the direct, idiomatic substitute for a
//! config layer that (per spec.md §1) treats YAML *parsing mechanics* as out
//! of scope while still needing a config layer to exist.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::ip_range::IpRange;
use crate::scope::Scope;

/// `disabled | per_domain | per_ip`, from a scanner template's `config.yaml`.
/// Parsed from the raw YAML string by `parse_rate_limit_mode` rather than
/// derived `Deserialize`, so an unrecognized value maps to the dedicated
/// `ConfigError::InvalidRateLimitType` diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitMode {
    Disabled,
    PerDomain,
    PerIp,
}

#[derive(Debug, Deserialize)]
struct ScopeConfigRaw {
    #[serde(default)]
    ips: Vec<String>,
    #[serde(default)]
    domains: Vec<String>,
    #[serde(default)]
    excluded_ips: Vec<String>,
    #[serde(default)]
    excluded_domains: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MasterConfigRaw {
    scanners: Vec<PathBuf>,
    scope: ScopeConfigRaw,
    #[serde(default = "default_max_requests")]
    max_requests: i64,
    keyfile: PathBuf,
}

fn default_max_requests() -> i64 {
    -1
}

/// The master's top-level configuration, loaded from `config.yaml` in the
/// working directory.
#[derive(Debug)]
pub struct MasterConfig {
    pub scanners: Vec<PathBuf>,
    pub scope: Scope,
    pub max_requests: i64,
    pub keyfile: PathBuf,
}

impl MasterConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = read_yaml::<MasterConfigRaw>(path)?;

        let parse_ranges = |items: &[String]| -> Result<Vec<IpRange>, ConfigError> {
            items
                .iter()
                .map(|s| s.parse::<IpRange>().map_err(ConfigError::InvalidScopeRange))
                .collect()
        };

        let scope = Scope::new(
            parse_ranges(&raw.scope.ips)?,
            parse_ranges(&raw.scope.excluded_ips)?,
            raw.scope.domains,
            raw.scope.excluded_domains,
        );

        Ok(Self {
            scanners: raw.scanners,
            scope,
            max_requests: raw.max_requests,
            keyfile: raw.keyfile,
        })
    }
}

/// A scanner template's static descriptor, loaded from `<dir>/config.yaml`.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub rate_limit_type: RateLimitMode,
    pub instances: usize,
    pub ignore_scope: bool,
    pub needs_key: String,
    /// The docker/process image name, taken from the directory name —
    /// not a YAML field in the original either.
    pub image: String,
}

/// Mirrors `ScannerConfig`'s YAML shape but keeps `rate_limit_type` as a raw
/// string so an unrecognized value can be turned into the dedicated
/// `ConfigError::InvalidRateLimitType` diagnostic instead of falling through
/// to serde_yaml's generic enum-variant rejection (`ConfigError::Parse`).
#[derive(Debug, Deserialize)]
struct ScannerConfigRaw {
    inputs: Vec<String>,
    #[serde(default)]
    outputs: Vec<String>,
    rate_limit_type: String,
    #[serde(default = "default_instances")]
    instances: usize,
    #[serde(default)]
    ignore_scope: bool,
    #[serde(default)]
    needs_key: String,
}

fn default_instances() -> usize {
    1
}

impl ScannerConfig {
    /// Loads `<dir>/config.yaml`, validating the invariants the original
    /// enforces with a fatal `log.Fatalf`: non-empty `inputs`, and a
    /// recognized `rate_limit_type`. `name` is the template name (the
    /// directory's final path component) used only for error messages.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let raw = read_yaml::<ScannerConfigRaw>(dir.join("config.yaml"))?;

        if raw.inputs.is_empty() {
            return Err(ConfigError::EmptyInputs { name });
        }

        let rate_limit_type = parse_rate_limit_mode(&raw.rate_limit_type).ok_or_else(|| ConfigError::InvalidRateLimitType {
            name: name.clone(),
            value: raw.rate_limit_type.clone(),
        })?;

        Ok(ScannerConfig {
            inputs: raw.inputs,
            outputs: raw.outputs,
            rate_limit_type,
            instances: raw.instances,
            ignore_scope: raw.ignore_scope,
            needs_key: raw.needs_key,
            image: name,
        })
    }
}

fn parse_rate_limit_mode(value: &str) -> Option<RateLimitMode> {
    match value {
        "disabled" => Some(RateLimitMode::Disabled),
        "per_domain" => Some(RateLimitMode::PerDomain),
        "per_ip" => Some(RateLimitMode::PerIp),
        _ => None,
    }
}

/// `vserver-mapping.yaml`: domain-pattern -> virtual-server name. A `*.`
/// prefix on a key is stripped at load time; the wildcard re-match itself
/// happens in `rate_limiter::RateLimiter::vserver_for_domain`.
pub fn load_vserver_mapping(path: impl AsRef<Path>) -> Result<HashMap<String, String>, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let raw: HashMap<String, String> = read_yaml(path)?;
    Ok(raw
        .into_iter()
        .map(|(k, v)| (k.strip_prefix("*.").unwrap_or(&k).to_string(), v))
        .collect())
}

/// The credential keyfile: a flat YAML mapping of key-name -> secret value.
pub fn load_keyfile(path: impl AsRef<Path>) -> Result<HashMap<String, String>, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(HashMap::new());
    }
    read_yaml(path)
}

/// `domainlist.txt`: one domain per line. Lines are returned as-is; folding
/// a domain into the scope only if its resolved IP falls in the IP scope is
/// `Scope`'s job (`Scope::augment_from_domainlist`), since it needs the DNS
/// cache to do the resolution.
pub fn load_domainlist(path: impl AsRef<Path>) -> Vec<String> {
    let path = path.as_ref();
    let Ok(contents) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("novelvmp-config-test-{name}-{}", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn scanner_config_requires_nonempty_inputs() {
        let dir = std::env::temp_dir().join(format!("novelvmp-scanner-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("config.yaml"),
            "inputs: []\noutputs: []\nrate_limit_type: disabled\ninstances: 1\n",
        )
        .unwrap();

        let result = ScannerConfig::load(&dir);
        assert!(matches!(result, Err(ConfigError::EmptyInputs { .. })));
    }

    #[test]
    fn scanner_config_loads_valid_descriptor() {
        let dir = std::env::temp_dir().join(format!("novelvmp-scanner-test2-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("config.yaml"),
            "inputs: [domain]\noutputs: [host]\nrate_limit_type: per_domain\ninstances: 3\nignore_scope: false\nneeds_key: \"\"\n",
        )
        .unwrap();

        let config = ScannerConfig::load(&dir).unwrap();
        assert_eq!(config.inputs, vec!["domain".to_string()]);
        assert_eq!(config.rate_limit_type, RateLimitMode::PerDomain);
        assert_eq!(config.instances, 3);
    }

    #[test]
    fn scanner_config_rejects_invalid_rate_limit_type() {
        let dir = std::env::temp_dir().join(format!("novelvmp-scanner-test3-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("config.yaml"),
            "inputs: [domain]\noutputs: [host]\nrate_limit_type: per_subnet\ninstances: 1\n",
        )
        .unwrap();

        let result = ScannerConfig::load(&dir);
        match result {
            Err(ConfigError::InvalidRateLimitType { value, .. }) => assert_eq!(value, "per_subnet"),
            other => panic!("expected InvalidRateLimitType, got {other:?}"),
        }
    }

    #[test]
    fn vserver_mapping_strips_wildcard_prefix() {
        let path = write_temp("vserver", "\"*.shared.example\": vs1\nexact.example: vs2\n");
        let mapping = load_vserver_mapping(&path).unwrap();
        assert_eq!(mapping.get("shared.example"), Some(&"vs1".to_string()));
        assert_eq!(mapping.get("exact.example"), Some(&"vs2".to_string()));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn domainlist_skips_blank_lines() {
        let path = write_temp("domainlist", "a.com\n\nb.com\n  \nc.com\n");
        let domains = load_domainlist(&path);
        assert_eq!(domains, vec!["a.com", "b.com", "c.com"]);
        let _ = std::fs::remove_file(path);
    }
}
