//! Semantic validation of cluster configuration documents.
//!
//! Structural checks (unknown fields, wrong types) already happen while
//! decoding; everything here runs against a fully loaded configuration and
//! follows a collect-all policy: a validation pass reports every violation
//! it finds instead of stopping at the first one.

use std::fmt::Display;

use snafu::Snafu;

type Result<T = (), E = Errors> = std::result::Result<T, E>;

/// A collection of errors discovered during validation.
#[derive(Debug, PartialEq, Eq)]
pub struct Errors(Vec<Error>);

impl Errors {
    /// Wraps collected errors, returning [`Ok`] when the list is empty.
    pub fn check(errors: Vec<Error>) -> Result {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Errors(errors))
        }
    }
}

impl From<Vec<Error>> for Errors {
    fn from(errors: Vec<Error>) -> Self {
        Self(errors)
    }
}

impl IntoIterator for Errors {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Display for Errors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            let prefix = match i {
                0 => "",
                _ => ", ",
            };
            write!(f, "{prefix}{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Errors {}

/// A single semantic violation.
///
/// Each variant names the constraint and carries the offending value, so the
/// rendered message tells the user exactly what to fix.
#[derive(Debug, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("unsupported storage type: {storage_type}"))]
    UnsupportedStorageType { storage_type: String },

    #[snafu(display("unsupported network provider: {provider}"))]
    UnsupportedNetworkProvider { provider: String },

    #[snafu(display("unsupported pod security policy: {policy}"))]
    UnsupportedPodSecurityPolicy { policy: String },
}
