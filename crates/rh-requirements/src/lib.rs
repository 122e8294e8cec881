//! Reading `requirements.txt` style files and merging the requirements they declare.
//!
//! Requirements on the same distribution are merged into one entry, with their version specifiers
//! reduced to the tightest bound per operator (see [`resolve_specifiers`]).

pub use crate::comparable::loosely_matches;
pub use crate::merge::{combine_requirements, resolve_specifiers};
pub use crate::read::{RequirementsError, RequirementsFile, read_requirements};

mod comparable;
mod merge;
mod read;
