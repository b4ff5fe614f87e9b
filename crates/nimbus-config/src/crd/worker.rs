use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A named set of configuration overrides for a class of worker nodes.
///
/// `values` is opaque user data: arbitrarily nested keys are carried through
/// untouched and handed to workers as one canonical blob. A key such as
/// `apiVersion` inside `values` is profile data like any other and does not
/// interact with the document's own discriminators. Profile names are unique
/// by convention only; declaration order is preserved.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkerProfile {
    /// Profile name workers refer to.
    pub name: String,

    /// Arbitrary override tree supplied by the user.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub values: serde_json::Map<String, serde_json::Value>,

    /// Canonical encoding of `values`, rendered once at load time and
    /// consumed verbatim by workers. Any change to `values` requires
    /// re-rendering the whole blob.
    #[serde(skip)]
    pub config: Vec<u8>,
}

impl WorkerProfile {
    /// Canonically encodes `values` for distribution to workers.
    ///
    /// The encoding is lossless: decoding the blob with any JSON decoder
    /// reproduces every key and scalar of `values` exactly.
    pub fn encode_values(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.values)
    }
}
