use serde::{Deserialize, Serialize};
use std::fmt;

/// Behavioral group a turbine is assigned to. One trained model per cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub u32);

impl ClusterId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ClusterId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Behavioral profile of a cluster, expressed as standardized scores from the
/// clustering analysis (0.0 = fleet average).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterProfile {
    pub power_level: f64,
    pub volatility: f64,
    /// Probability of a shutdown / low-output event
    pub downtime: f64,
    pub ramp: f64,
    pub name: String,
    pub description: String,
}

impl ClusterProfile {
    pub fn new(
        power_level: f64,
        volatility: f64,
        downtime: f64,
        ramp: f64,
        name: &str,
        description: &str,
    ) -> Self {
        Self {
            power_level,
            volatility,
            downtime,
            ramp,
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    /// Fleet-average behavior, used for clusters without an analysed profile.
    pub fn baseline() -> Self {
        Self::new(
            -0.30,
            -0.29,
            0.147,
            0.02,
            "Stable Baseline",
            "Most reliable, stable baseline performance",
        )
    }

    /// Ramp-dominated clusters get an extra sinusoidal ramp component in their wind inputs.
    pub fn is_ramp_dominated(&self) -> bool {
        self.ramp > 1.0
    }
}

/// Profiles of the reference deployment. Cluster 1 has no trained model and no profile.
pub fn reference_profiles() -> Vec<(ClusterId, ClusterProfile)> {
    vec![
        (
            ClusterId(0),
            ClusterProfile::new(
                2.34,
                2.34,
                0.067,
                2.35,
                "High Power",
                "High power output, high volatility, minimal downtime",
            ),
        ),
        (
            ClusterId(2),
            ClusterProfile::new(
                1.71,
                1.81,
                0.110,
                4.77,
                "Ramp-Dominated",
                "Strong power changes, ramp-dominated behavior",
            ),
        ),
        (ClusterId(3), ClusterProfile::baseline()),
        (
            ClusterId(4),
            ClusterProfile::new(
                -0.63,
                -0.70,
                0.316,
                0.25,
                "Mid-Risk",
                "Lower output, frequent downtime, mid-risk",
            ),
        ),
        (
            ClusterId(5),
            ClusterProfile::new(
                0.53,
                0.82,
                0.090,
                0.72,
                "Promising",
                "Moderate volatility, promising performance",
            ),
        ),
        (
            ClusterId(6),
            ClusterProfile::new(
                -0.33,
                -0.29,
                0.240,
                1.17,
                "Mildly Unstable",
                "Frequent ramp-ups, mildly unstable",
            ),
        ),
    ]
}
