/// A label-equality query used by `Store::list`. An empty query matches
/// every resource of the requested kind in the namespace.
#[derive(Debug, Clone, Default)]
pub struct LabelQuery {
    equals: Vec<(String, String)>,
    present: Vec<String>,
}

impl LabelQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key == value`.
    pub fn with_equals(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.equals.push((key.into(), value.into()));
        self
    }

    /// Require `key` to be present, regardless of value.
    pub fn with_present(mut self, key: impl Into<String>) -> Self {
        self.present.push(key.into());
        self
    }

    pub fn matches(&self, labels: &std::collections::BTreeMap<String, String>) -> bool {
        self.equals
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|have| have == v))
            && self.present.iter().all(|k| labels.contains_key(k))
    }
}
