pub use conda::{CondaFilename, CondaFilenameError};
pub use source_dist::{SourceDistFilename, SourceDistFilenameError};
pub use wheel::{WheelFilename, WheelFilenameError};

mod conda;
mod source_dist;
mod wheel;
