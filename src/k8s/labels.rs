use std::collections::BTreeMap;

pub const MANAGED_BY_KEY: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VAL: &str = "cluster-testkit";

/// Collection of labels stamped on every resource the kit creates, so suites
/// can find what was created and clean it up by selector.
#[derive(Debug, Clone)]
pub struct Labels(BTreeMap<String, String>);

impl Default for Labels {
    fn default() -> Self {
        Labels(BTreeMap::from([(
            MANAGED_BY_KEY.to_string(),
            MANAGED_BY_VAL.to_string(),
        )]))
    }
}

impl Labels {
    pub fn get(&self) -> BTreeMap<String, String> {
        self.0.clone()
    }

    /// Prints a label selector that matches all labels in the set.
    pub fn selector(&self) -> String {
        let mut selector = String::new();

        let mut iter = self.0.iter();

        if let Some((k, v)) = iter.next() {
            selector.push_str(format!("{k}=={v}").as_str());
        }

        for (k, v) in iter {
            selector.push_str(format!(",{k}=={v}").as_str());
        }

        selector
    }
}
