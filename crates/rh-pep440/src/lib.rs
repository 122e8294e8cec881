//! Python version numbers and specifiers, implementing
//! [PEP 440](https://peps.python.org/pep-0440).
//!
//! Only the subset of PEP 440 needed to write distribution metadata is covered: parsing and
//! normalizing versions, ordering them, and parsing, matching and rendering specifiers.
//!
//! ```rust
//! use std::str::FromStr;
//! use rh_pep440::{Version, VersionSpecifiers};
//!
//! let version = Version::from_str("1.19").unwrap();
//! let specifiers = VersionSpecifiers::from_str(">=1.16, <2.0").unwrap();
//! assert!(specifiers.contains(&version));
//! ```

pub use version::{LocalSegment, Prerelease, PrereleaseKind, Version, VersionParseError};
pub use version_specifier::{
    Operator, VersionSpecifier, VersionSpecifierParseError, VersionSpecifiers,
};

mod version;
mod version_specifier;
