use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    config::merge::Atomic,
    validation::{self, UnsupportedPodSecurityPolicySnafu},
};

/// Configuration of the controller manager.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ControllerManagerSpec {
    /// Additional arguments passed verbatim to the controller manager
    /// process.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,
}

impl Atomic for ControllerManagerSpec {}

/// Configuration of the scheduler.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SchedulerSpec {
    /// Additional arguments passed verbatim to the scheduler process.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,
}

impl Atomic for SchedulerSpec {}

/// Pod security policy selection for workloads that pick none themselves.
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PodSecurityPolicySpec {
    /// Policy assigned to workloads by default.
    #[serde(default = "PodSecurityPolicySpec::default_policy_name")]
    pub default_policy: String,
}

/// Policies shipped with the control plane.
const BUNDLED_POLICIES: [&str; 2] = ["00-nimbus-privileged", "99-nimbus-restricted"];

impl Default for PodSecurityPolicySpec {
    fn default() -> Self {
        Self {
            default_policy: Self::default_policy_name(),
        }
    }
}

impl Atomic for PodSecurityPolicySpec {}

impl PodSecurityPolicySpec {
    fn default_policy_name() -> String {
        BUNDLED_POLICIES[0].to_owned()
    }

    /// Semantic checks for the pod security policy subsection.
    pub fn validate(&self) -> Vec<validation::Error> {
        let mut errors = Vec::new();
        if !BUNDLED_POLICIES.contains(&self.default_policy.as_str()) {
            errors.push(
                UnsupportedPodSecurityPolicySnafu {
                    policy: self.default_policy.clone(),
                }
                .build(),
            );
        }
        errors
    }
}
