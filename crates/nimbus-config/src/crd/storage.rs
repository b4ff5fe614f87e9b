use std::{collections::BTreeMap, path::Path};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::VariantNames;

use crate::{
    address::{self, AddressResolver},
    config::merge::Atomic,
    validation::{self, UnsupportedStorageTypeSnafu},
};

/// Storage backends bundled with the control plane.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::AsRefStr, strum::Display, strum::VariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum StorageBackend {
    /// Managed etcd, one member per controller.
    Etcd,

    /// Kine shim persisting cluster state into a SQL database.
    Kine,
}

/// Configuration of the cluster state storage backend.
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StorageSpec {
    /// Backend used to persist cluster state.
    #[serde(rename = "type", default = "StorageSpec::default_type")]
    pub storage_type: String,

    /// Etcd backend settings, filled in when the backend is `etcd`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etcd: Option<EtcdConfig>,

    /// Kine backend settings, filled in when the backend is `kine`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kine: Option<KineConfig>,
}

impl Default for StorageSpec {
    fn default() -> Self {
        Self {
            storage_type: Self::default_type(),
            etcd: None,
            kine: None,
        }
    }
}

impl Atomic for StorageSpec {}

impl StorageSpec {
    fn default_type() -> String {
        StorageBackend::Etcd.to_string()
    }

    /// Whether the configured backend identifier selects `backend`.
    fn uses(&self, backend: StorageBackend) -> bool {
        let id: &str = backend.as_ref();
        self.storage_type == id
    }

    /// Fills the backend settings that can only be computed against the
    /// host: the etcd peer address and the kine data source location.
    ///
    /// The address resolver is only consulted when an etcd peer address is
    /// actually missing; a fully specified storage subsection never touches
    /// the host network state.
    pub fn apply_runtime_defaults(
        &mut self,
        data_dir: &Path,
        resolver: &dyn AddressResolver,
    ) -> Result<(), address::Error> {
        if self.uses(StorageBackend::Etcd)
            && self.etcd.as_ref().is_none_or(|etcd| etcd.peer_address.is_empty())
        {
            let peer_address = resolver.first_public_address()?;
            self.etcd.get_or_insert_with(EtcdConfig::default).peer_address = peer_address;
        }

        if self.uses(StorageBackend::Kine)
            && self.kine.as_ref().is_none_or(|kine| kine.data_source.is_empty())
        {
            self.kine.get_or_insert_with(KineConfig::default).data_source =
                KineConfig::default_data_source(data_dir);
        }

        Ok(())
    }

    /// Semantic checks for the storage subsection.
    pub fn validate(&self) -> Vec<validation::Error> {
        let mut errors = Vec::new();
        if !StorageBackend::VARIANTS.contains(&self.storage_type.as_str()) {
            errors.push(
                UnsupportedStorageTypeSnafu {
                    storage_type: self.storage_type.clone(),
                }
                .build(),
            );
        }
        errors
    }
}

/// Etcd backend settings.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EtcdConfig {
    /// Address this controller advertises to its etcd peers.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub peer_address: String,

    /// Additional arguments passed verbatim to the etcd process.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,
}

/// Kine backend settings.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KineConfig {
    /// Data source name of the backing SQL database.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_source: String,
}

impl KineConfig {
    /// Default SQLite database location under the data directory.
    fn default_data_source(data_dir: &Path) -> String {
        format!(
            "sqlite://{data_dir}/db/state.db?mode=rwc&_journal=WAL",
            data_dir = data_dir.display()
        )
    }
}
