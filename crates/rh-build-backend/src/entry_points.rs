use indexmap::IndexMap;

use rh_configuration::PackageConfig;

use crate::Error;

/// Render `entry_points.txt`: `console_scripts` first, then the other groups in configuration
/// order, each entry as `name = object reference`.
///
/// See <https://packaging.python.org/en/latest/specifications/entry-points/>.
pub(crate) fn entry_points_txt(config: &PackageConfig) -> Result<String, Error> {
    let mut groups: IndexMap<&str, Vec<&str>> = IndexMap::new();
    if !config.console_scripts.is_empty() {
        groups.insert(
            "console_scripts",
            config.console_scripts.iter().map(String::as_str).collect(),
        );
    }
    for (group, entries) in &config.entry_points {
        groups
            .entry(group.as_str())
            .or_default()
            .extend(entries.iter().map(String::as_str));
    }

    let mut writer = String::new();
    for (group, entries) in groups {
        writer.push_str(&format!("[{group}]\n"));
        for entry in entries {
            let (name, object_reference) =
                entry
                    .split_once('=')
                    .ok_or_else(|| Error::EntryPoint {
                        group: group.to_string(),
                        entry: entry.to_string(),
                    })?;
            let (name, object_reference) = (name.trim(), object_reference.trim());
            if name.is_empty() || object_reference.is_empty() {
                return Err(Error::EntryPoint {
                    group: group.to_string(),
                    entry: entry.to_string(),
                });
            }
            writer.push_str(&format!("{name} = {object_reference}\n"));
        }
        writer.push('\n');
    }
    Ok(writer)
}
