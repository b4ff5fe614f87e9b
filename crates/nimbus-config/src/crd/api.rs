use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::merge::Atomic;

/// Port the cluster API server listens on.
pub const KUBE_API_PORT: u16 = 6443;

/// Port the Nimbus control plane API listens on.
pub const CONTROL_PLANE_API_PORT: u16 = 9443;

/// Configuration of the cluster API server endpoint.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApiSpec {
    /// Address the API server binds to and advertises to cluster members.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,

    /// Public-facing address, e.g. a load balancer hostname. When set it
    /// takes precedence over `address` in externally visible URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_address: Option<String>,

    /// Extra subject alternative names for the API server certificate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sans: Vec<String>,

    /// Additional arguments passed verbatim to the API server process.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,
}

impl Atomic for ApiSpec {}

impl ApiSpec {
    /// The host used in externally visible URLs.
    fn advertised_host(&self) -> &str {
        match self.external_address.as_deref() {
            Some(external) if !external.is_empty() => external,
            _ => &self.address,
        }
    }

    /// URL the cluster API server is reachable under, e.g.
    /// `https://10.0.0.1:6443`.
    pub fn api_address_url(&self) -> String {
        format!("https://{host}:{KUBE_API_PORT}", host = self.advertised_host())
    }

    /// URL the Nimbus control plane API is reachable under, e.g.
    /// `https://10.0.0.1:9443`.
    pub fn control_plane_address_url(&self) -> String {
        format!(
            "https://{host}:{CONTROL_PLANE_API_PORT}",
            host = self.advertised_host()
        )
    }
}
