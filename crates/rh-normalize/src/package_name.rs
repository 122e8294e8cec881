use std::borrow::Cow;

use crate::normalized_name;

normalized_name!(
    /// The normalized name of a distribution, e.g. `ruamel-yaml` for `ruamel.yaml`.
    PackageName
);

impl PackageName {
    /// The name with `_` in place of `-`, as used in wheel, sdist and `.dist-info` names.
    ///
    /// See: <https://packaging.python.org/en/latest/specifications/binary-distribution-format/#escaping-and-unicode>
    pub fn as_dist_info_name(&self) -> Cow<'_, str> {
        if self.0.contains('-') {
            Cow::Owned(self.0.replace('-', "_"))
        } else {
            Cow::Borrowed(&self.0)
        }
    }
}
