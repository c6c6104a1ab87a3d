//! Configuration layering.
//!
//! The configuration is merged from several layers, later layers override earlier ones key by
//! key:
//!
//! 1. the bundled defaults (`data/heduprc`, compiled in)
//! 2. `/etc/hedup/heduprc`
//! 3. `$HOME/.config/heduprc`
//! 4. `$HOME/.config/hedup/heduprc`
//! 5. options given on the command line
//! 6. values derived from the environment in automatic mode
//!
//! Only options which are actually set in a layer override the layers below, an unset option
//! never erases a value.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::Error;

const BUNDLED_DEFAULTS: &str = include_str!("../data/heduprc");

/// System wide configuration file.
pub const SYSTEM_CONFIG_FILE: &str = "/etc/hedup/heduprc";

pub const DEFAULT_GPG_BINARY: &str = "gpg";
pub const DEFAULT_MAIL_BINARY: &str = "mail";
pub const DEFAULT_ACME_TTL: u32 = 300;
pub const DEFAULT_PROPAGATION_SECONDS: u64 = 360;

const KNOWN_OPTIONS: &[&str] = &[
    "hetzner_account",
    "gpg_sign_key",
    "from_address",
    "gpg_binary",
    "mail_binary",
    "domain",
    "acme_challenge",
    "acme_ttl",
    "propagation_seconds",
    "dry_run",
];

/// Identifiers which YAML may read as numbers, e.g. `gpg_sign_key: 0xDEADBEEF`.
const TEXT_OPTIONS: &[&str] = &["hetzner_account", "gpg_sign_key", "from_address", "domain"];

/// One layer of configuration options.
///
/// Every option is optional, `None` means "not set in this layer".
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct ConfigLayer {
    /// Hetzner robot account (`user:` line of the update).
    #[serde(default, deserialize_with = "string_or_number")]
    pub hetzner_account: Option<String>,
    /// GPG key used to sign the update.
    #[serde(default, deserialize_with = "string_or_number")]
    pub gpg_sign_key: Option<String>,
    /// Sender address, must be registered with the robot.
    #[serde(default, deserialize_with = "string_or_number")]
    pub from_address: Option<String>,
    pub gpg_binary: Option<String>,
    pub mail_binary: Option<String>,
    /// Domain (and zonefile name) to update.
    #[serde(default, deserialize_with = "string_or_number")]
    pub domain: Option<String>,
    /// ACME challenge tokens, either a single string or a list.
    #[serde(default, deserialize_with = "string_or_list")]
    pub acme_challenge: Option<Vec<String>>,
    /// TTL of the `_acme-challenge` records.
    pub acme_ttl: Option<u32>,
    /// Seconds to wait for DNS propagation after an automatic update.
    pub propagation_seconds: Option<u64>,
    pub dry_run: Option<bool>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    String(String),
    List(Vec<String>),
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<StringOrList>::deserialize(deserializer)?.map(|value| match value {
            StringOrList::String(s) => vec![s],
            StringOrList::List(list) => list,
        }),
    )
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_yaml::Value>::deserialize(deserializer)? {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "invalid type: {other:?}, expected a string"
        ))),
    }
}

/// The text following `key:` on a top level line of `content`, without a trailing comment.
fn raw_scalar<'a>(content: &'a str, key: &str) -> Option<&'a str> {
    content.lines().find_map(|line| {
        let rest = line.strip_prefix(key)?.strip_prefix(':')?;
        let value = match rest.find(" #") {
            Some(pos) => &rest[..pos],
            None => rest,
        };
        Some(value.trim()).filter(|value| !value.is_empty())
    })
}

/// Replace identifiers parsed as numbers by the text they were written as, so `0xDEADBEEF`
/// stays `0xDEADBEEF` instead of becoming `3735928559`.
fn keep_numeric_text(map: &mut serde_yaml::Mapping, content: &str) {
    for key in TEXT_OPTIONS {
        let Some(entry) = map.get_mut(*key) else {
            continue;
        };
        if !entry.is_number() {
            continue;
        }
        let Some(raw) = raw_scalar(content, key) else {
            continue;
        };
        // only if the text really is this value, e.g. not for flow mappings
        if serde_yaml::from_str::<serde_yaml::Value>(raw).ok().as_ref() == Some(&*entry) {
            *entry = serde_yaml::Value::String(raw.to_string());
        }
    }
}

fn overlay<T>(dst: &mut Option<T>, src: Option<T>) {
    if src.is_some() {
        *dst = src;
    }
}

impl ConfigLayer {
    /// Parse a configuration layer from YAML.
    ///
    /// `path` is only used for error messages. An empty (or comment only) document is an empty
    /// layer.
    pub fn parse(path: &Path, content: &str) -> Result<Self, Error> {
        let parse_error = |source| Error::ConfigParse {
            path: path.to_owned(),
            source,
        };

        let blank = content.lines().all(|line| {
            let line = line.trim();
            line.is_empty() || line.starts_with('#') || line == "---"
        });
        if blank {
            return Ok(Self::default());
        }

        let mut value: serde_yaml::Value = serde_yaml::from_str(content).map_err(parse_error)?;
        if value.is_null() {
            return Ok(Self::default());
        }

        if let serde_yaml::Value::Mapping(map) = &value {
            for key in map.keys() {
                match key.as_str() {
                    Some(key) if KNOWN_OPTIONS.contains(&key) => (),
                    _ => warn!("ignoring unknown option {key:?} in {path:?}"),
                }
            }
        }

        if let serde_yaml::Value::Mapping(map) = &mut value {
            keep_numeric_text(map, content);
        }

        serde_yaml::from_value(value).map_err(parse_error)
    }

    /// The defaults shipped with hedup.
    pub fn bundled() -> Result<Self, Error> {
        Self::parse(Path::new("<bundled heduprc>"), BUNDLED_DEFAULTS)
    }

    /// Read a configuration file.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    pub fn read_optional<P: AsRef<Path>>(path: P) -> Result<Option<Self>, Error> {
        let path = path.as_ref();

        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(path, &content).map(Some),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(Error::ConfigRead {
                path: path.to_owned(),
                source,
            }),
        }
    }

    /// Override every option which is set in `other`.
    pub fn merge(&mut self, other: ConfigLayer) {
        overlay(&mut self.hetzner_account, other.hetzner_account);
        overlay(&mut self.gpg_sign_key, other.gpg_sign_key);
        overlay(&mut self.from_address, other.from_address);
        overlay(&mut self.gpg_binary, other.gpg_binary);
        overlay(&mut self.mail_binary, other.mail_binary);
        overlay(&mut self.domain, other.domain);
        overlay(&mut self.acme_challenge, other.acme_challenge);
        overlay(&mut self.acme_ttl, other.acme_ttl);
        overlay(&mut self.propagation_seconds, other.propagation_seconds);
        overlay(&mut self.dry_run, other.dry_run);
    }
}

/// Ordered list of configuration files, lowest priority first.
#[derive(Clone, Debug)]
pub struct ConfigFiles {
    files: Vec<PathBuf>,
}

impl ConfigFiles {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    /// The standard file locations for a user with the given home directory.
    pub fn for_home(home: Option<&Path>) -> Self {
        let mut files = vec![PathBuf::from(SYSTEM_CONFIG_FILE)];
        if let Some(home) = home {
            files.push(home.join(".config/heduprc"));
            files.push(home.join(".config/hedup/heduprc"));
        }
        Self { files }
    }

    /// The standard file locations for the current user (`$HOME`).
    pub fn from_env() -> Self {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        Self::for_home(home.as_deref())
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Merge the bundled defaults with all existing configuration files.
    pub fn load(&self) -> Result<ConfigLayer, Error> {
        let mut layer = ConfigLayer::bundled()?;

        for path in &self.files {
            match ConfigLayer::read_optional(path)? {
                Some(file_layer) => {
                    debug!("read config file {path:?}");
                    layer.merge(file_layer);
                }
                None => debug!("config file {path:?} does not exist, skipping"),
            }
        }

        Ok(layer)
    }
}

/// The merged, immutable configuration of one invocation.
///
/// Options required for an update are checked when they are accessed, so that e.g. listing the
/// domains works without a signing key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    hetzner_account: Option<String>,
    gpg_sign_key: Option<String>,
    from_address: Option<String>,
    gpg_binary: String,
    mail_binary: String,
    domain: Option<String>,
    acme_challenges: Vec<String>,
    acme_ttl: u32,
    propagation_seconds: u64,
    dry_run: bool,
}

impl Config {
    /// Build the final configuration from a fully merged layer.
    pub fn from_layer(layer: ConfigLayer) -> Self {
        Self {
            hetzner_account: layer.hetzner_account,
            gpg_sign_key: layer.gpg_sign_key,
            from_address: layer.from_address,
            gpg_binary: layer
                .gpg_binary
                .unwrap_or_else(|| DEFAULT_GPG_BINARY.to_string()),
            mail_binary: layer
                .mail_binary
                .unwrap_or_else(|| DEFAULT_MAIL_BINARY.to_string()),
            domain: layer.domain,
            acme_challenges: layer.acme_challenge.unwrap_or_default(),
            acme_ttl: layer.acme_ttl.unwrap_or(DEFAULT_ACME_TTL),
            propagation_seconds: layer
                .propagation_seconds
                .unwrap_or(DEFAULT_PROPAGATION_SECONDS),
            dry_run: layer.dry_run.unwrap_or(false),
        }
    }

    /// Load all configuration files and apply the command line layer on top.
    pub fn resolve(files: &ConfigFiles, cli: ConfigLayer) -> Result<Self, Error> {
        let mut layer = files.load()?;
        layer.merge(cli);
        Ok(Self::from_layer(layer))
    }

    /// A copy of this configuration targeting `domain` with the given challenge tokens.
    pub fn for_update(&self, domain: &str, acme_challenges: Vec<String>) -> Self {
        Self {
            domain: Some(domain.to_string()),
            acme_challenges,
            ..self.clone()
        }
    }

    pub fn hetzner_account(&self) -> Result<&str, Error> {
        required(&self.hetzner_account, "hetzner_account")
    }

    pub fn gpg_sign_key(&self) -> Result<&str, Error> {
        required(&self.gpg_sign_key, "gpg_sign_key")
    }

    pub fn from_address(&self) -> Result<&str, Error> {
        required(&self.from_address, "from_address")
    }

    pub fn domain(&self) -> Result<&str, Error> {
        required(&self.domain, "domain")
    }

    pub fn has_domain(&self) -> bool {
        self.domain.is_some()
    }

    pub fn gpg_binary(&self) -> &str {
        &self.gpg_binary
    }

    pub fn mail_binary(&self) -> &str {
        &self.mail_binary
    }

    pub fn acme_challenges(&self) -> &[String] {
        &self.acme_challenges
    }

    pub fn acme_ttl(&self) -> u32 {
        self.acme_ttl
    }

    pub fn propagation(&self) -> Duration {
        Duration::from_secs(self.propagation_seconds)
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, Error> {
    value.as_deref().ok_or(Error::MissingOption(name))
}
