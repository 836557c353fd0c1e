/// Relationship types offered when no list is configured
pub const DEFAULT_RELATIONSHIPS: [&str; 13] = [
    "Father",
    "Mother",
    "Brother",
    "Sister",
    "Son",
    "Daughter",
    "Spouse",
    "Partner",
    "Friend",
    "Doctor",
    "Caregiver",
    "Neighbor",
    "Other",
];

pub fn default_relationships() -> Vec<String> {
    DEFAULT_RELATIONSHIPS.iter().map(|r| r.to_string()).collect()
}

/// Controlled picker over a closed list of relationship types.
///
/// The selector never owns the chosen value: the caller passes the current
/// value in with [`sync`](RelationshipSelector::sync) and receives the new one
/// from [`commit`](RelationshipSelector::commit).
#[derive(Debug, Clone)]
pub struct RelationshipSelector {
    options: Vec<String>,
    highlighted: usize,
    pub required: bool,
    pub disabled: bool,
}

impl RelationshipSelector {
    pub fn new(options: Vec<String>) -> Self {
        let options = if options.is_empty() {
            default_relationships()
        } else {
            options
        };
        Self {
            options,
            highlighted: 0,
            required: true,
            disabled: false,
        }
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn highlighted(&self) -> usize {
        self.highlighted
    }

    /// Move the highlight onto `value`, or back to the first option when
    /// `value` is not one of them
    pub fn sync(&mut self, value: &str) {
        self.highlighted = self.options.iter().position(|o| o == value).unwrap_or(0);
    }

    pub fn next(&mut self) {
        if self.disabled || self.options.is_empty() {
            return;
        }
        self.highlighted = (self.highlighted + 1) % self.options.len();
    }

    pub fn prev(&mut self) {
        if self.disabled || self.options.is_empty() {
            return;
        }
        self.highlighted = (self.highlighted + self.options.len() - 1) % self.options.len();
    }

    /// Report the highlighted option to the caller's change handler
    pub fn commit<F: FnOnce(String)>(&self, on_change: F) {
        if self.disabled {
            return;
        }
        if let Some(value) = self.options.get(self.highlighted) {
            on_change(value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_options_fall_back_to_defaults() {
        let selector = RelationshipSelector::new(Vec::new());
        assert_eq!(selector.options().len(), DEFAULT_RELATIONSHIPS.len());
        assert_eq!(selector.options()[0], "Father");
    }

    #[test]
    fn test_navigation_wraps_and_commit_reports() {
        let mut selector = RelationshipSelector::new(vec!["Friend".into(), "Other".into()]);
        selector.prev();
        assert_eq!(selector.highlighted(), 1);
        selector.next();
        assert_eq!(selector.highlighted(), 0);

        let mut chosen = String::new();
        selector.commit(|value| chosen = value);
        assert_eq!(chosen, "Friend");
    }

    #[test]
    fn test_sync_to_unknown_value_resets_highlight() {
        let mut selector = RelationshipSelector::new(vec!["Friend".into(), "Other".into()]);
        selector.sync("Other");
        assert_eq!(selector.highlighted(), 1);
        selector.sync("");
        assert_eq!(selector.highlighted(), 0);
    }

    #[test]
    fn test_disabled_selector_is_inert() {
        let mut selector = RelationshipSelector::new(vec!["Friend".into(), "Other".into()]);
        selector.sync("Other");
        selector.disabled = true;
        selector.next();
        assert_eq!(selector.highlighted(), 1);

        let mut called = false;
        selector.commit(|_| called = true);
        assert!(!called);
    }
}
