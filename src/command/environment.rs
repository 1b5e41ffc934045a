// src/command/environment.rs

use std::collections::BTreeMap;

/// The locale override pinned on the delegated spawn path.
///
/// Downstream consumers parse numeric values out of check output; that
/// parsing must not depend on whatever locale the host or the caller set.
pub(crate) const LOCALE_NAME: &str = "LC_NUMERIC";
pub(crate) const LOCALE_VALUE: &str = "C";

/// Merge the ambient environment with caller-supplied overrides.
///
/// Every ambient variable whose name is not overridden is kept, then every
/// override is appended. The result is a flat `name=value` block with unique
/// names and override precedence.
pub fn compose_environment<I>(
    ambient: I,
    overrides: &BTreeMap<String, String>,
) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut block: Vec<(String, String)> = ambient
        .into_iter()
        .filter(|(name, _)| !overrides.contains_key(name))
        .collect();

    block.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    block
}

/// Pin `LC_NUMERIC=C` in an already-composed environment block.
///
/// Any caller-supplied value for the variable is discarded; this override is
/// not negotiable on the delegated spawn path.
pub fn force_locale_override(environment: &mut Vec<(String, String)>) {
    environment.retain(|(name, _)| name != LOCALE_NAME);
    environment.push((LOCALE_NAME.to_string(), LOCALE_VALUE.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ambient() -> Vec<(String, String)> {
        vec![
            ("HOME".to_string(), "/home/icinga".to_string()),
            ("X".to_string(), "1".to_string()),
        ]
    }

    #[test]
    fn override_wins_on_collision() {
        let mut overrides = BTreeMap::new();
        overrides.insert("X".to_string(), "2".to_string());

        let block = compose_environment(ambient(), &overrides);

        let xs: Vec<&str> = block
            .iter()
            .filter(|(name, _)| name == "X")
            .map(|(_, value)| value.as_str())
            .collect();
        assert_eq!(xs, vec!["2"]);
    }

    #[test]
    fn ambient_variables_survive_without_override() {
        let block = compose_environment(ambient(), &BTreeMap::new());
        assert!(block.contains(&("HOME".to_string(), "/home/icinga".to_string())));
        assert!(block.contains(&("X".to_string(), "1".to_string())));
    }

    #[test]
    fn composed_block_has_unique_names() {
        let mut overrides = BTreeMap::new();
        overrides.insert("HOME".to_string(), "/tmp".to_string());
        overrides.insert("NEW".to_string(), "yes".to_string());

        let block = compose_environment(ambient(), &overrides);

        let mut names: Vec<&str> = block.iter().map(|(name, _)| name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), block.len());
    }

    #[test]
    fn locale_override_discards_caller_value() {
        let mut block = vec![
            ("LC_NUMERIC".to_string(), "de_DE.UTF-8".to_string()),
            ("X".to_string(), "1".to_string()),
        ];

        force_locale_override(&mut block);

        let values: Vec<&str> = block
            .iter()
            .filter(|(name, _)| name == "LC_NUMERIC")
            .map(|(_, value)| value.as_str())
            .collect();
        assert_eq!(values, vec!["C"]);
    }
}
