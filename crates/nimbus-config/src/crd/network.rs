use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::VariantNames;

use crate::{
    config::merge::Atomic,
    validation::{self, UnsupportedNetworkProviderSnafu},
};

/// Network providers bundled with the control plane.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display, strum::VariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum NetworkProvider {
    /// Bundled Calico CNI.
    Calico,

    /// No bundled CNI; the operator brings their own.
    Custom,

    /// Bundled kube-router CNI.
    KubeRouter,
}

/// The set of network provider identifiers accepted during validation.
///
/// The builtin set covers the bundled providers. Embedding products that
/// ship additional providers register their identifiers before validating;
/// the provider field itself stays an open string so unknown values surface
/// as semantic errors rather than decode failures.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProviderRegistry {
    providers: BTreeSet<String>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self {
            providers: NetworkProvider::VARIANTS
                .iter()
                .map(|provider| (*provider).to_owned())
                .collect(),
        }
    }
}

impl ProviderRegistry {
    /// Registers an additional provider identifier.
    pub fn register(&mut self, provider: impl Into<String>) {
        self.providers.insert(provider.into());
    }

    /// Whether `provider` is a known identifier.
    pub fn contains(&self, provider: &str) -> bool {
        self.providers.contains(provider)
    }
}

/// Configuration of the cluster network.
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NetworkSpec {
    /// CNI provider deployed into the cluster.
    #[serde(default = "NetworkSpec::default_provider")]
    pub provider: String,

    /// CIDR range pods are addressed from.
    #[serde(default = "NetworkSpec::default_pod_cidr")]
    pub pod_cidr: String,

    /// CIDR range cluster services are addressed from.
    #[serde(default = "NetworkSpec::default_service_cidr")]
    pub service_cidr: String,
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self {
            provider: Self::default_provider(),
            pod_cidr: Self::default_pod_cidr(),
            service_cidr: Self::default_service_cidr(),
        }
    }
}

impl Atomic for NetworkSpec {}

impl NetworkSpec {
    fn default_provider() -> String {
        NetworkProvider::Calico.to_string()
    }

    fn default_pod_cidr() -> String {
        "10.244.0.0/16".to_owned()
    }

    fn default_service_cidr() -> String {
        "10.96.0.0/12".to_owned()
    }

    /// Semantic checks for the network subsection.
    pub fn validate(&self, registry: &ProviderRegistry) -> Vec<validation::Error> {
        let mut errors = Vec::new();
        if !registry.contains(&self.provider) {
            errors.push(
                UnsupportedNetworkProviderSnafu {
                    provider: self.provider.clone(),
                }
                .build(),
            );
        }
        errors
    }
}
