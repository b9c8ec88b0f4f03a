//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    collections::BTreeMap,
    net::SocketAddr,
    num::NonZeroU64,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{BasicConfiguration, CacheMode, DEFAULT_CACHE_NAME};
use crate::cluster::{Address, LOCAL_ADDRESS, MembershipMode, MembershipSnapshot, MembershipView};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "cachemgr";
const ENV_PREFIX: &str = "CACHEMGR";

/// Command-line arguments for the `cachemgr` binary.
#[derive(Debug, Parser)]
#[command(name = "cachemgr", version, about = "Cache manager management console")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CACHEMGR_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ManagerOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print every exposed attribute of the configured manager as JSON.
    Inspect,
    /// Print one exposed attribute.
    Attr(AttrArgs),
    /// Invoke an exposed operation, then print the attributes.
    Invoke(InvokeArgs),
    /// List the exposed attributes and operations.
    Describe,
}

#[derive(Debug, Args, Clone)]
pub struct AttrArgs {
    /// Attribute name, e.g. `RunningCacheCount`.
    #[arg(value_name = "ATTRIBUTE")]
    pub name: String,
}

#[derive(Debug, Args, Clone)]
pub struct InvokeArgs {
    /// Operation name, e.g. `startCache`.
    #[arg(value_name = "OPERATION")]
    pub operation: String,

    /// Operation arguments.
    #[arg(value_name = "ARG")]
    pub args: Vec<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ManagerOverrides {
    /// Override the management domain.
    #[arg(long = "manager-domain", value_name = "DOMAIN", global = true)]
    pub domain: Option<String>,

    /// Override the manager instance name.
    #[arg(long = "manager-instance-name", value_name = "NAME", global = true)]
    pub instance_name: Option<String>,

    /// Override the logical cluster name used to salt derived domains.
    #[arg(long = "manager-cluster-name", value_name = "NAME", global = true)]
    pub cluster_name: Option<String>,

    /// Fail instead of picking an alternate domain when the identity is taken.
    #[arg(
        long = "manager-enforce-unique-domain",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub enforce_unique_domain: Option<bool>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub manager: ManagerSettings,
    pub membership: MembershipSettings,
    pub default_cache: BasicConfiguration,
    pub caches: BTreeMap<String, BasicConfiguration>,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub domain: Option<String>,
    pub instance_name: Option<String>,
    pub enforce_unique_domain: bool,
    pub cluster_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MembershipSettings {
    pub mode: MembershipMode,
    pub node_name: Option<String>,
    pub peers: Vec<String>,
    pub physical_addresses: Vec<SocketAddr>,
}

impl MembershipSettings {
    /// Initial membership view; clustered views start from the configured
    /// peers until the membership protocol pushes an update.
    pub fn build_view(&self) -> MembershipView {
        match self.mode {
            MembershipMode::Local => MembershipView::local(),
            MembershipMode::Clustered => {
                let local = Address::node(self.node_name.clone().unwrap_or_default());
                let peers = self.peers.iter().map(Address::node);
                MembershipView::clustered(MembershipSnapshot::clustered(
                    local,
                    peers,
                    self.physical_addresses.clone(),
                ))
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: String, reason: String },
}

impl LoadError {
    fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    manager: RawManagerSettings,
    membership: RawMembershipSettings,
    default_cache: RawCacheSettings,
    caches: BTreeMap<String, RawCacheSettings>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &ManagerOverrides) {
        if let Some(domain) = overrides.domain.as_ref() {
            self.manager.domain = Some(domain.clone());
        }
        if let Some(name) = overrides.instance_name.as_ref() {
            self.manager.instance_name = Some(name.clone());
        }
        if let Some(cluster) = overrides.cluster_name.as_ref() {
            self.manager.cluster_name = Some(cluster.clone());
        }
        if let Some(enforce) = overrides.enforce_unique_domain {
            self.manager.enforce_unique_domain = Some(enforce);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            manager,
            membership,
            default_cache,
            caches,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let manager = build_manager_settings(manager)?;
        let membership = build_membership_settings(membership)?;
        let default_cache = build_cache_settings(default_cache, "default_cache")?;

        let mut resolved = BTreeMap::new();
        for (name, cache) in caches {
            if name.trim().is_empty() {
                return Err(LoadError::invalid("caches", "cache names must not be empty"));
            }
            if name == DEFAULT_CACHE_NAME {
                return Err(LoadError::invalid(
                    format!("caches.{name}"),
                    "the default cache is configured under `default_cache`",
                ));
            }
            let key = format!("caches.{name}");
            resolved.insert(name, build_cache_settings(cache, &key)?);
        }

        Ok(Self {
            logging,
            manager,
            membership,
            default_cache,
            caches: resolved,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_manager_settings(manager: RawManagerSettings) -> Result<ManagerSettings, LoadError> {
    let domain = non_blank(manager.domain);
    if domain
        .as_ref()
        .is_some_and(|domain| domain.contains([':', ',', '=', '"']))
    {
        return Err(LoadError::invalid(
            "manager.domain",
            "must not contain `:`, `,`, `=` or `\"`",
        ));
    }

    let instance_name = non_blank(manager.instance_name);
    if instance_name
        .as_ref()
        .is_some_and(|name| name.contains([',', '=', '"']))
    {
        return Err(LoadError::invalid(
            "manager.instance_name",
            "must not contain `,`, `=` or `\"`",
        ));
    }

    Ok(ManagerSettings {
        domain,
        instance_name,
        enforce_unique_domain: manager.enforce_unique_domain.unwrap_or(true),
        cluster_name: non_blank(manager.cluster_name),
    })
}

fn build_membership_settings(
    membership: RawMembershipSettings,
) -> Result<MembershipSettings, LoadError> {
    let mode = match membership.mode.as_deref().map(str::trim) {
        None | Some("local") => MembershipMode::Local,
        Some("clustered") => MembershipMode::Clustered,
        Some(other) => {
            return Err(LoadError::invalid(
                "membership.mode",
                format!("expected `local` or `clustered`, got `{other}`"),
            ));
        }
    };

    let node_name = non_blank(membership.node_name);
    if mode == MembershipMode::Clustered && node_name.is_none() {
        return Err(LoadError::invalid(
            "membership.node_name",
            "required in clustered mode",
        ));
    }

    if node_name.as_deref() == Some(LOCAL_ADDRESS) {
        return Err(LoadError::invalid(
            "membership.node_name",
            format!("`{LOCAL_ADDRESS}` is reserved for non-clustered nodes"),
        ));
    }
    let peers: Vec<String> = membership
        .peers
        .into_iter()
        .filter_map(|peer| non_blank(Some(peer)))
        .collect();
    if peers.iter().any(|peer| peer == LOCAL_ADDRESS) {
        return Err(LoadError::invalid(
            "membership.peers",
            format!("`{LOCAL_ADDRESS}` is reserved for non-clustered nodes"),
        ));
    }

    let physical_addresses = membership
        .physical_addresses
        .iter()
        .map(|value| {
            value.parse::<SocketAddr>().map_err(|err| {
                LoadError::invalid(
                    "membership.physical_addresses",
                    format!("invalid address `{value}`: {err}"),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MembershipSettings {
        mode,
        node_name,
        peers,
        physical_addresses,
    })
}

fn build_cache_settings(cache: RawCacheSettings, key: &str) -> Result<BasicConfiguration, LoadError> {
    let mode = match cache.mode {
        Some(mode) => CacheMode::from_str(&mode)
            .map_err(|reason| LoadError::invalid(format!("{key}.mode"), reason))?,
        None => CacheMode::Local,
    };

    let max_entries = match cache.max_entries {
        Some(value) => Some(NonZeroU64::new(value).ok_or_else(|| {
            LoadError::invalid(format!("{key}.max_entries"), "must be greater than zero")
        })?),
        None => None,
    };

    let lifespan = match cache.lifespan_ms {
        Some(0) => {
            return Err(LoadError::invalid(
                format!("{key}.lifespan_ms"),
                "must be greater than zero",
            ));
        }
        Some(ms) => Some(Duration::from_millis(ms)),
        None => None,
    };

    Ok(BasicConfiguration {
        mode,
        max_entries,
        lifespan,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawManagerSettings {
    domain: Option<String>,
    instance_name: Option<String>,
    enforce_unique_domain: Option<bool>,
    cluster_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMembershipSettings {
    mode: Option<String>,
    node_name: Option<String>,
    peers: Vec<String>,
    physical_addresses: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    mode: Option<String>,
    max_entries: Option<u64>,
    lifespan_ms: Option<u64>,
}
