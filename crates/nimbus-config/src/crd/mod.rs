//! Typed model of the `ClusterConfig` document and the operations that
//! normalize it: strict decoding, defaulting, semantic validation, and
//! stripping a configuration back down to the fields that diverge from
//! their defaults.

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::{
    address::{self, AddressResolver, HostAddressResolver},
    config::merge::Merge,
    validation, yaml,
};

pub mod api;
pub mod controllers;
pub mod network;
pub mod storage;
pub mod worker;

pub use api::ApiSpec;
pub use controllers::{ControllerManagerSpec, PodSecurityPolicySpec, SchedulerSpec};
pub use network::{NetworkProvider, NetworkSpec, ProviderRegistry};
pub use storage::{EtcdConfig, KineConfig, StorageBackend, StorageSpec};
pub use worker::WorkerProfile;

/// `apiVersion` of documents this engine understands.
pub const API_VERSION: &str = "cluster.nimbus.dev/v1beta1";

/// `kind` of documents this engine understands.
pub const KIND: &str = "ClusterConfig";

type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors fatal to loading a configuration document.
///
/// A load either returns a fully populated configuration or exactly one of
/// these; there is no partial result.
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to decode cluster configuration document"))]
    DecodeDocument { source: serde_yaml::Error },

    #[snafu(display("failed to compute storage defaults"))]
    ResolveDefaults { source: address::Error },

    #[snafu(display("failed to encode values of worker profile {profile:?}"))]
    EncodeProfileValues {
        source: serde_json::Error,
        profile: String,
    },
}

/// Object metadata of a configuration document.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Metadata {
    /// Name of the cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A declarative description of a Nimbus cluster.
///
/// Loaded from user input via [`ClusterConfig::load_from_str`], or built
/// fully defaulted via [`ClusterConfig::default_with`]. Once validated for a
/// given use a configuration is not mutated; operations that need a variant
/// (such as [`ClusterConfig::strip_defaults`]) produce a new value.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClusterConfig {
    /// Schema version of the document.
    #[serde(default = "ClusterConfig::default_api_version")]
    pub api_version: String,

    /// Kind discriminator of the document.
    #[serde(default = "ClusterConfig::default_kind")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    /// The configuration tree. Always present after loading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<ClusterSpec>,

    // Base directory path-dependent defaults are computed against. Not part
    // of the document; recorded at load time.
    #[serde(skip)]
    data_dir: PathBuf,
}

/// The defaultable subsections of a cluster configuration.
///
/// Every subsection is optional in the document. Loading replaces each
/// absent subsection with its computed default as a whole, so consumers of a
/// loaded configuration can rely on all of them being present; a subsection
/// the user provided is never deep-merged with its default.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClusterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_manager: Option<ControllerManagerSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_security_policy: Option<PodSecurityPolicySpec>,

    /// Worker profiles in the order they were declared.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub worker_profiles: Vec<WorkerProfile>,
}

impl Merge for ClusterSpec {
    fn merge(&mut self, defaults: &Self) {
        self.storage.merge(&defaults.storage);
        self.network.merge(&defaults.network);
        self.api.merge(&defaults.api);
        self.controller_manager.merge(&defaults.controller_manager);
        self.scheduler.merge(&defaults.scheduler);
        self.pod_security_policy.merge(&defaults.pod_security_policy);
        // Worker profiles are user data, not a defaultable subsection; an
        // absent list already is the empty default.
    }
}

impl ClusterSpec {
    /// Defaults for every subsection that can be computed without touching
    /// the host. Storage carries no peer address yet, see
    /// [`StorageSpec::apply_runtime_defaults`].
    pub fn builtin_defaults() -> Self {
        Self {
            storage: Some(StorageSpec::default()),
            network: Some(NetworkSpec::default()),
            api: Some(ApiSpec::default()),
            controller_manager: Some(ControllerManagerSpec::default()),
            scheduler: Some(SchedulerSpec::default()),
            pod_security_policy: Some(PodSecurityPolicySpec::default()),
            worker_profiles: Vec::new(),
        }
    }

    /// The spec a document with no user-supplied `spec` ends up with.
    ///
    /// Recomputed on every call, never cached: the result reflects the host
    /// state at the time of the call.
    pub fn default_with(
        data_dir: &Path,
        resolver: &dyn AddressResolver,
    ) -> std::result::Result<Self, address::Error> {
        let mut spec = Self::builtin_defaults();
        if let Some(storage) = &mut spec.storage {
            storage.apply_runtime_defaults(data_dir, resolver)?;
        }
        Ok(spec)
    }
}

impl ClusterConfig {
    fn default_api_version() -> String {
        API_VERSION.to_owned()
    }

    fn default_kind() -> String {
        KIND.to_owned()
    }

    /// Loads a configuration document, resolving host-dependent defaults
    /// through the local network stack.
    pub fn load_from_str(raw: &str, data_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::load_from_str_with(raw, data_dir, &HostAddressResolver)
    }

    /// Loads a configuration document with an injected [`AddressResolver`].
    ///
    /// Decoding is strict: any field outside the document schema fails the
    /// load. Afterwards every subsection the user left out is replaced by
    /// its default, a subsection the user provided is taken as a whole. The
    /// resolver is only consulted when storage defaulting requires a peer
    /// address.
    pub fn load_from_str_with(
        raw: &str,
        data_dir: impl Into<PathBuf>,
        resolver: &dyn AddressResolver,
    ) -> Result<Self> {
        let mut config: Self = serde_yaml::from_str(raw).context(DecodeDocumentSnafu)?;
        config.data_dir = data_dir.into();

        let spec = config.spec.get_or_insert_with(ClusterSpec::default);
        spec.merge(&ClusterSpec::builtin_defaults());
        if let Some(storage) = &mut spec.storage {
            storage
                .apply_runtime_defaults(&config.data_dir, resolver)
                .context(ResolveDefaultsSnafu)?;
        }

        for profile in &mut spec.worker_profiles {
            profile.config = profile.encode_values().with_context(|_| {
                EncodeProfileValuesSnafu {
                    profile: profile.name.clone(),
                }
            })?;
        }

        tracing::debug!(
            data_dir = %config.data_dir.display(),
            "loaded cluster configuration"
        );
        Ok(config)
    }

    /// The configuration a user who supplied nothing would end up with.
    ///
    /// This is a value, not a cached entity; every call recomputes the
    /// defaults independently.
    pub fn default_with(
        data_dir: impl Into<PathBuf>,
        resolver: &dyn AddressResolver,
    ) -> Result<Self> {
        let data_dir = data_dir.into();
        let spec =
            ClusterSpec::default_with(&data_dir, resolver).context(ResolveDefaultsSnafu)?;

        Ok(Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata: None,
            spec: Some(spec),
            data_dir,
        })
    }

    /// Base directory this configuration computes path-dependent defaults
    /// against.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Checks the semantic constraints the document schema cannot express,
    /// against the builtin provider registry.
    pub fn validate(&self) -> Vec<validation::Error> {
        self.validate_with(&ProviderRegistry::default())
    }

    /// Like [`ClusterConfig::validate`], with an embedder-supplied provider
    /// registry.
    ///
    /// Never fails as a call and never mutates the configuration: every
    /// violation found anywhere in the document is collected and returned in
    /// subsection declaration order. An empty result means the configuration
    /// is valid.
    pub fn validate_with(&self, registry: &ProviderRegistry) -> Vec<validation::Error> {
        let Some(spec) = &self.spec else {
            return Vec::new();
        };

        let mut errors = Vec::new();
        if let Some(storage) = &spec.storage {
            errors.extend(storage.validate());
        }
        if let Some(network) = &spec.network {
            errors.extend(network.validate(registry));
        }
        if let Some(pod_security_policy) = &spec.pod_security_policy {
            errors.extend(pod_security_policy.validate());
        }
        errors
    }

    /// Returns a copy of the configuration with every subsection that
    /// equals its computed default made absent.
    ///
    /// Storage and worker profiles are kept: storage defaults depend on host
    /// state at comparison time, and profiles are user data with no default
    /// to compare against. The result is minimal input for
    /// [`ClusterConfig::to_yaml`] and loads back into an equivalent
    /// configuration.
    pub fn strip_defaults(&self) -> Self {
        let mut stripped = self.clone();
        if let Some(spec) = &mut stripped.spec {
            strip_if_default(&mut spec.api);
            strip_if_default(&mut spec.controller_manager);
            strip_if_default(&mut spec.scheduler);
            strip_if_default(&mut spec.network);
            strip_if_default(&mut spec.pod_security_policy);
        }
        stripped
    }

    /// Serializes the document as YAML, suitable for writing back out after
    /// [`ClusterConfig::strip_defaults`].
    pub fn to_yaml(&self) -> std::result::Result<String, yaml::Error> {
        yaml::to_string(self, yaml::SerializeOptions::default())
    }
}

/// Makes `section` absent when it deep-equals its computed default.
fn strip_if_default<T: Default + PartialEq>(section: &mut Option<T>) {
    if section.as_ref() == Some(&T::default()) {
        *section = None;
    }
}

/// JSON Schema of the configuration document, for documentation and
/// external tooling. Unknown-field rejection shows up as
/// `additionalProperties: false` on every object in the tree.
pub fn document_schema() -> schemars::Schema {
    schemars::schema_for!(ClusterConfig)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;
    use crate::address::{FixedAddressResolver, NoUsableAddressSnafu};

    const TEST_ADDRESS: &str = "10.0.0.9";
    const TEST_DATA_DIR: &str = "/var/lib/nimbus";

    /// Resolver standing in for the host network, so tests are independent
    /// of the machine they run on.
    fn resolver() -> FixedAddressResolver {
        FixedAddressResolver::new(TEST_ADDRESS)
    }

    /// A host with no usable address at all.
    struct UnreachableResolver;

    impl AddressResolver for UnreachableResolver {
        fn first_public_address(&self) -> std::result::Result<String, address::Error> {
            NoUsableAddressSnafu.fail()
        }
    }

    fn load(raw: &str) -> ClusterConfig {
        ClusterConfig::load_from_str_with(raw, TEST_DATA_DIR, &resolver())
            .expect("document should load")
    }

    #[test]
    fn cluster_defaults() {
        let config = load("apiVersion: cluster.nimbus.dev/v1beta1");
        let defaults = ClusterSpec::default_with(Path::new(TEST_DATA_DIR), &resolver())
            .expect("defaults compute with a fixed resolver");

        let spec = config.spec.as_ref().expect("spec is present after loading");
        assert_eq!(spec.storage, defaults.storage);
        assert_eq!(spec.network, defaults.network);
        assert_eq!(config.kind, KIND);
        assert_eq!(config.data_dir(), Path::new(TEST_DATA_DIR));
    }

    #[rstest]
    #[case::top_level(indoc! {"
        apiVersion: cluster.nimbus.dev/v1beta1
        kind: ClusterConfig
        unknown: 1
    "})]
    #[case::inside_spec(indoc! {"
        apiVersion: cluster.nimbus.dev/v1beta1
        kind: ClusterConfig
        spec:
          storrage: {}
    "})]
    #[case::inside_subsection(indoc! {"
        apiVersion: cluster.nimbus.dev/v1beta1
        kind: ClusterConfig
        spec:
          api:
            adress: 1.2.3.4
    "})]
    fn unknown_fields_fail_decoding(#[case] raw: &str) {
        let result = ClusterConfig::load_from_str_with(raw, TEST_DATA_DIR, &resolver());
        assert!(matches!(result, Err(Error::DecodeDocument { .. })));
    }

    #[test]
    fn storage_defaults() {
        let config = load(indoc! {"
            apiVersion: cluster.nimbus.dev/v1beta1
            kind: ClusterConfig
            metadata:
              name: foobar
        "});

        let storage = config
            .spec
            .as_ref()
            .and_then(|spec| spec.storage.as_ref())
            .expect("storage is present after loading");
        assert_eq!(storage.storage_type, "etcd");
        assert_eq!(
            storage.etcd.as_ref().expect("etcd settings are filled in").peer_address,
            TEST_ADDRESS
        );
    }

    #[test]
    fn etcd_peer_address_is_resolved_for_a_bare_storage_section() {
        let config = load(indoc! {"
            apiVersion: cluster.nimbus.dev/v1beta1
            kind: ClusterConfig
            metadata:
              name: foobar
            spec:
              storage:
                type: etcd
        "});

        let storage = config
            .spec
            .as_ref()
            .and_then(|spec| spec.storage.as_ref())
            .expect("storage is present after loading");
        assert_eq!(storage.storage_type, "etcd");
        assert_eq!(
            storage.etcd.as_ref().expect("etcd settings are filled in").peer_address,
            TEST_ADDRESS
        );
    }

    #[test]
    fn fully_specified_storage_never_consults_the_resolver() {
        let config = ClusterConfig::load_from_str_with(
            indoc! {"
                apiVersion: cluster.nimbus.dev/v1beta1
                kind: ClusterConfig
                spec:
                  storage:
                    type: etcd
                    etcd:
                      peerAddress: 192.168.1.5
            "},
            TEST_DATA_DIR,
            &UnreachableResolver,
        )
        .expect("no defaulting requires an address");

        let storage = config
            .spec
            .as_ref()
            .and_then(|spec| spec.storage.as_ref())
            .expect("storage is present after loading");
        assert_eq!(
            storage.etcd.as_ref().expect("etcd settings survive").peer_address,
            "192.168.1.5"
        );
    }

    #[test]
    fn missing_host_address_fails_the_load() {
        let result = ClusterConfig::load_from_str_with(
            "apiVersion: cluster.nimbus.dev/v1beta1",
            TEST_DATA_DIR,
            &UnreachableResolver,
        );

        assert!(matches!(result, Err(Error::ResolveDefaults { .. })));
    }

    #[rstest]
    #[case::custom("custom")]
    #[case::calico("calico")]
    fn network_validation_accepts_known_providers(#[case] provider: &str) {
        let raw = format!(
            indoc! {"
                apiVersion: cluster.nimbus.dev/v1beta1
                kind: ClusterConfig
                metadata:
                  name: foobar
                spec:
                  network:
                    provider: {provider}
                  storage:
                    type: etcd
            "},
            provider = provider
        );

        let config = load(&raw);
        assert_eq!(config.validate(), Vec::new());
    }

    #[test]
    fn network_validation_rejects_unknown_providers() {
        let config = load(indoc! {"
            apiVersion: cluster.nimbus.dev/v1beta1
            kind: ClusterConfig
            metadata:
              name: foobar
            spec:
              network:
                provider: invalidProvider
              storage:
                type: etcd
        "});

        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].to_string(),
            "unsupported network provider: invalidProvider"
        );
    }

    #[test]
    fn validation_collects_all_violations_in_subsection_order() {
        let config = load(indoc! {"
            apiVersion: cluster.nimbus.dev/v1beta1
            kind: ClusterConfig
            spec:
              storage:
                type: consul
              network:
                provider: invalidProvider
              podSecurityPolicy:
                defaultPolicy: anything-goes
        "});

        let messages = config
            .validate()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        assert_eq!(
            messages,
            [
                "unsupported storage type: consul",
                "unsupported network provider: invalidProvider",
                "unsupported pod security policy: anything-goes",
            ]
        );
    }

    #[test]
    fn api_external_address_takes_precedence() {
        let config = load(indoc! {"
            apiVersion: cluster.nimbus.dev/v1beta1
            kind: ClusterConfig
            metadata:
              name: foobar
            spec:
              api:
                externalAddress: foo.bar.com
                address: 1.2.3.4
        "});

        let api = config
            .spec
            .as_ref()
            .and_then(|spec| spec.api.as_ref())
            .expect("api is present after loading");
        assert_eq!(api.api_address_url(), "https://foo.bar.com:6443");
        assert_eq!(api.control_plane_address_url(), "https://foo.bar.com:9443");
    }

    #[test]
    fn api_address_is_used_without_an_external_address() {
        let config = load(indoc! {"
            apiVersion: cluster.nimbus.dev/v1beta1
            kind: ClusterConfig
            metadata:
              name: foobar
            spec:
              api:
                address: 1.2.3.4
        "});

        let api = config
            .spec
            .as_ref()
            .and_then(|spec| spec.api.as_ref())
            .expect("api is present after loading");
        assert_eq!(api.api_address_url(), "https://1.2.3.4:6443");
        assert_eq!(api.control_plane_address_url(), "https://1.2.3.4:9443");
    }

    #[test]
    fn worker_profiles_keep_order_and_render_their_blobs() {
        let config = load(indoc! {r#"
            apiVersion: cluster.nimbus.dev/v1beta1
            kind: ClusterConfig
            metadata:
              name: foobar
            spec:
              workerProfiles:
              - name: profile_XXX
                values:
                  authentication:
                    anonymous:
                      enabled: true
                    webhook:
                      cacheTTL: 2m0s
                      enabled: true
              - name: profile_YYY
                values:
                  apiVersion: v2
                  authentication:
                    anonymous:
                      enabled: false
        "#});

        let profiles = &config.spec.as_ref().expect("spec is present").worker_profiles;
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].name, "profile_XXX");
        assert_eq!(profiles[1].name, "profile_YYY");

        let parsed: serde_json::Value =
            serde_json::from_slice(&profiles[1].config).expect("blob decodes as JSON");
        assert_eq!(
            parsed.pointer("/apiVersion"),
            Some(&serde_json::Value::String("v2".to_owned()))
        );
    }

    #[test]
    fn strip_defaults_empties_a_fully_default_configuration() {
        let config = ClusterConfig::default_with(TEST_DATA_DIR, &resolver())
            .expect("defaults compute with a fixed resolver");
        let stripped = config.strip_defaults();

        let spec = stripped.spec.as_ref().expect("spec itself survives");
        assert_eq!(spec.api, None);
        assert_eq!(spec.controller_manager, None);
        assert_eq!(spec.scheduler, None);
        assert_eq!(spec.network, None);
        assert_eq!(spec.pod_security_policy, None);
        // Storage is never stripped, its defaults depend on host state.
        assert!(spec.storage.is_some());
    }

    #[test]
    fn strip_defaults_is_idempotent() {
        let config = ClusterConfig::default_with(TEST_DATA_DIR, &resolver())
            .expect("defaults compute with a fixed resolver");
        let stripped = config.strip_defaults();

        assert_eq!(stripped.strip_defaults(), stripped);
    }

    #[test]
    fn strip_defaults_keeps_diverging_subsections() {
        let config = load(indoc! {"
            apiVersion: cluster.nimbus.dev/v1beta1
            kind: ClusterConfig
            spec:
              network:
                provider: custom
        "});
        let stripped = config.strip_defaults();

        let spec = stripped.spec.as_ref().expect("spec itself survives");
        let network = spec.network.as_ref().expect("modified network survives");
        assert_eq!(network.provider, "custom");
        // Untouched subsections still strip down to absent.
        assert_eq!(spec.api, None);
        assert_eq!(spec.scheduler, None);
    }

    #[test]
    fn strip_defaults_does_not_mutate_its_input() {
        let config = ClusterConfig::default_with(TEST_DATA_DIR, &resolver())
            .expect("defaults compute with a fixed resolver");
        let _ = config.strip_defaults();

        let spec = config.spec.as_ref().expect("spec is present");
        assert!(spec.api.is_some());
        assert!(spec.network.is_some());
    }
}
