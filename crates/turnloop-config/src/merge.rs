//! Deep merge of TOML value trees, used to layer project config over
//! global config.
//!
//! Ported from the teacher's `astrid-config::merge::deep`. This crate's
//! configuration surface is small enough (nine top-level sections versus
//! the teacher's twenty-plus) that the teacher's field-source tracking and
//! workspace-can-only-tighten restriction enforcement (`merge::enforce`,
//! `merge::restrict`, `merge::servers`) are not carried over — project
//! config here simply overrides global, field by field. See DESIGN.md.

/// Recursively deep-merge `overlay` into `base`.
///
/// Tables merge recursively per-field; scalars and arrays from the
/// overlay replace the base value outright.
pub fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_overlay_replaces_base() {
        let mut base: toml::Value = toml::from_str("x = 1\ny = 2\n").unwrap();
        let overlay: toml::Value = toml::from_str("x = 5\n").unwrap();
        deep_merge(&mut base, &overlay);
        assert_eq!(base["x"].as_integer(), Some(5));
        assert_eq!(base["y"].as_integer(), Some(2));
    }

    #[test]
    fn nested_tables_merge_recursively() {
        let mut base: toml::Value = toml::from_str("[agent]\nmax_steps = 50\n").unwrap();
        let overlay: toml::Value = toml::from_str("[agent]\nmax_steps = 10\n").unwrap();
        deep_merge(&mut base, &overlay);
        assert_eq!(base["agent"]["max_steps"].as_integer(), Some(10));
    }

    #[test]
    fn array_overlay_replaces_rather_than_appends() {
        let mut base: toml::Value = toml::from_str("[permissions]\nallow = [\"A\"]\n").unwrap();
        let overlay: toml::Value = toml::from_str("[permissions]\nallow = [\"B\", \"C\"]\n").unwrap();
        deep_merge(&mut base, &overlay);
        let allow = base["permissions"]["allow"].as_array().unwrap();
        assert_eq!(allow.len(), 2);
    }

    #[test]
    fn overlay_only_fields_are_inserted() {
        let mut base: toml::Value = toml::from_str("[agent]\nmax_steps = 50\n").unwrap();
        let overlay: toml::Value = toml::from_str("[log]\nkeep_sessions = 10\n").unwrap();
        deep_merge(&mut base, &overlay);
        assert_eq!(base["agent"]["max_steps"].as_integer(), Some(50));
        assert_eq!(base["log"]["keep_sessions"].as_integer(), Some(10));
    }
}
