//! Machinery for combining user-supplied configuration with computed
//! defaults.
//!
//! A configuration document is overlaid with its defaults at *subsection*
//! granularity: a subsection the user provided is taken as a whole, one the
//! user omitted is taken from the defaults as a whole. There is no deep
//! merge within a subsection; [`merge::Atomic`] marks the types treated as
//! such indivisible units.

pub mod merge;
