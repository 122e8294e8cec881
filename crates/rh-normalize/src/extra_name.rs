use crate::normalized_name;

normalized_name!(
    /// The normalized name of an optional dependency group (PEP 685).
    ExtraName
);
