//! Key-to-results index used when matching eager results onto parents

use std::collections::HashMap;

use serde_json::Value;

use crate::model::Entity;

/// Normalised lookup key; `"1"` and `1` land in the same bucket
pub(crate) fn dictionary_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Distinct non-null values of `key` across `models`, in first-seen order
pub(crate) fn collect_keys(models: &[Entity], key: &str) -> Vec<Value> {
    let mut seen = std::collections::HashSet::new();
    models
        .iter()
        .filter_map(|model| model.store().get_raw(key))
        .filter(|value| !value.is_null())
        .filter(|value| dictionary_key(value).map_or(false, |k| seen.insert(k)))
        .cloned()
        .collect()
}

/// Related entities grouped by the value of their matching column
#[derive(Debug, Default)]
pub(crate) struct Dictionary {
    buckets: HashMap<String, Vec<Entity>>,
}

impl Dictionary {
    /// Group `results` by the raw value of `key`; rows without it are dropped
    pub(crate) fn build(results: Vec<Entity>, key: &str) -> Self {
        let mut buckets: HashMap<String, Vec<Entity>> = HashMap::new();
        for result in results {
            let Some(bucket) = result.store().get_raw(key).and_then(dictionary_key) else {
                continue;
            };
            buckets.entry(bucket).or_default().push(result);
        }
        Self { buckets }
    }

    pub(crate) fn get(&self, value: &Value) -> Option<&[Entity]> {
        dictionary_key(value)
            .and_then(|key| self.buckets.get(&key))
            .map(Vec::as_slice)
    }

    pub(crate) fn len(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_normalise_strings_and_numbers() {
        assert_eq!(dictionary_key(&json!(1)), dictionary_key(&json!("1")));
        assert_eq!(dictionary_key(&json!(null)), None);
        assert_ne!(dictionary_key(&json!(1)), dictionary_key(&json!(2)));
    }
}
