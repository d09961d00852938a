//! License normalization, resolution and risk classification.
//!
//! - [`spdx`]: maps free-text license strings onto canonical identifiers and
//!   classifies SPDX identifiers by risk.
//! - [`resolver`]: the source cascade producing one [`License`](crate::models::License)
//!   per package.
//! - [`classifier`]: risk level of a resolved license.

pub mod classifier;
pub mod resolver;
pub mod spdx;
