use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::domain::{reference_profiles, ClusterId, ClusterProfile};
use crate::ml::ScalerScope;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub clusters: ClustersConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            enable_cors: false,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub dir: PathBuf,
    /// File name of a cluster bundle; `{cluster}` is replaced by the cluster id
    pub file_pattern: String,
    /// Load every bundle at startup instead of on first request
    pub preload: bool,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
            file_pattern: "full_model_cluster{cluster}.json".to_string(),
            preload: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClustersConfig {
    pub known: Vec<u32>,
    /// Cluster id (as a string key) to the status message returned in place of a forecast
    pub offline: BTreeMap<String, String>,
    /// Cluster id (as a string key) to the behavior profile driving synthetic weather
    pub profiles: BTreeMap<String, ClusterProfile>,
}

impl Default for ClustersConfig {
    fn default() -> Self {
        Self {
            known: (0..=6).collect(),
            offline: BTreeMap::from([(
                "1".to_string(),
                "Cluster 1 is offline for maintenance".to_string(),
            )]),
            profiles: reference_profiles()
                .into_iter()
                .map(|(id, profile)| (id.to_string(), profile))
                .collect(),
        }
    }
}

impl ClustersConfig {
    pub fn known_clusters(&self) -> Vec<ClusterId> {
        self.known.iter().copied().map(ClusterId).collect()
    }

    pub fn offline_clusters(&self) -> Result<Vec<(ClusterId, String)>> {
        self.offline
            .iter()
            .map(|(id, msg)| Ok((parse_cluster_key("offline", id)?, msg.clone())))
            .collect()
    }

    pub fn cluster_profiles(&self) -> Result<Vec<(ClusterId, ClusterProfile)>> {
        self.profiles
            .iter()
            .map(|(id, profile)| Ok((parse_cluster_key("profile", id)?, profile.clone())))
            .collect()
    }
}

fn parse_cluster_key(section: &str, id: &str) -> Result<ClusterId> {
    id.trim()
        .parse()
        .map(ClusterId)
        .map_err(|e| anyhow::anyhow!("invalid {section} cluster id {id:?}: {e}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherSource {
    #[default]
    Synthetic,
    Constant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    pub scaler_scope: ScalerScope,
    pub smoothing_alpha: f64,
    pub decimals: u32,
    pub age_years: f64,
    pub weather: WeatherSource,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            scaler_scope: ScalerScope::Turbine,
            smoothing_alpha: 1.0,
            decimals: 3,
            age_years: 8.0,
            weather: WeatherSource::Synthetic,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Serialized::defaults(Config::default()))
                .merge(Toml::file("config/default.toml"))
                .merge(Env::prefixed("WPF__").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.forecast.smoothing_alpha) {
            anyhow::bail!(
                "forecast.smoothing_alpha must be within [0, 1], got {}",
                self.forecast.smoothing_alpha
            );
        }
        if !self.forecast.age_years.is_finite() || self.forecast.age_years < 0.0 {
            anyhow::bail!("forecast.age_years must be a non-negative number");
        }
        if !self.models.file_pattern.contains("{cluster}") {
            anyhow::bail!("models.file_pattern must contain {{cluster}}");
        }
        self.clusters.offline_clusters()?;
        self.clusters.cluster_profiles()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::from_figment(Figment::from(Serialized::defaults(Config::default())))
            .unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.clusters.known_clusters().len(), 7);
        assert_eq!(
            cfg.clusters.offline_clusters().unwrap(),
            vec![(ClusterId(1), "Cluster 1 is offline for maintenance".to_string())]
        );
        assert_eq!(cfg.forecast.scaler_scope, ScalerScope::Turbine);
        assert_eq!(cfg.forecast.smoothing_alpha, 1.0);
    }

    #[test]
    fn test_toml_overrides() {
        let toml = r#"
            [server]
            port = 9000

            [forecast]
            scaler_scope = "cluster"
            smoothing_alpha = 1.0
            weather = "constant"
        "#;
        let cfg = Config::from_figment(
            Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(toml)),
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.forecast.scaler_scope, ScalerScope::Cluster);
        assert_eq!(cfg.forecast.weather, WeatherSource::Constant);
        assert_eq!(cfg.forecast.decimals, 3);
    }

    #[test]
    fn test_rejects_bad_alpha() {
        let cfg = Config::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::string("[forecast]\nsmoothing_alpha = 1.5")),
        );
        assert!(cfg.is_err());
    }

    #[test]
    fn test_rejects_bad_offline_key() {
        let cfg = Config::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::string("[clusters.offline]\nabc = \"down\"")),
        );
        assert!(cfg.is_err());
    }

    #[test]
    fn test_profiles_default_and_override() {
        let cfg = Config::from_figment(Figment::from(Serialized::defaults(Config::default())))
            .unwrap();
        assert_eq!(cfg.clusters.cluster_profiles().unwrap(), reference_profiles());

        let toml = r#"
            [clusters.profiles."6"]
            ramp = 0.5
            name = "Settled"
        "#;
        let cfg = Config::from_figment(
            Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(toml)),
        )
        .unwrap();
        let profiles = cfg.clusters.cluster_profiles().unwrap();
        let (_, six) = profiles.iter().find(|(id, _)| *id == ClusterId(6)).unwrap();
        assert_eq!(six.name, "Settled");
        assert!(!six.is_ramp_dominated());
        assert_eq!(six.downtime, 0.240);
    }

    #[test]
    fn test_rejects_bad_profile_key() {
        let toml = r#"
            [clusters.profiles.north]
            power_level = 0.0
            volatility = 0.0
            downtime = 0.1
            ramp = 0.0
            name = "North"
            description = "unnamed"
        "#;
        let cfg = Config::from_figment(
            Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(toml)),
        );
        assert!(cfg.is_err());
    }
}
