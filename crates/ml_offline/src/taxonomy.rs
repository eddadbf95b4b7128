//! Event taxonomy policy: which event types train the model and which of
//! those count as a conversion.

use std::collections::BTreeSet;

pub const PLAN_VIEWED: &str = "PLAN_VIEWED";
pub const PLAN_JOINED: &str = "PLAN_JOINED";
pub const PLAN_CONFIRMED: &str = "PLAN_CONFIRMED";

/// Policy table mapping event types to inclusion and label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTaxonomy {
    relevant: BTreeSet<String>,
    positive: BTreeSet<String>,
}

impl Default for EventTaxonomy {
    fn default() -> Self {
        Self {
            relevant: [PLAN_VIEWED, PLAN_JOINED, PLAN_CONFIRMED]
                .into_iter()
                .map(String::from)
                .collect(),
            positive: [PLAN_JOINED, PLAN_CONFIRMED]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl EventTaxonomy {
    /// Build a taxonomy; every positive type must also be relevant.
    pub fn new<R, P>(relevant: R, positive: P) -> Result<Self, String>
    where
        R: IntoIterator,
        R::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        let relevant: BTreeSet<String> = relevant.into_iter().map(Into::into).collect();
        let positive: BTreeSet<String> = positive.into_iter().map(Into::into).collect();

        if relevant.is_empty() {
            return Err("relevant event types must not be empty".to_string());
        }
        let stray: Vec<&str> = positive.difference(&relevant).map(String::as_str).collect();
        if !stray.is_empty() {
            return Err(format!(
                "positive event types not in the relevant set: {}",
                stray.join(", ")
            ));
        }

        Ok(Self { relevant, positive })
    }

    pub fn is_relevant(&self, event_type: &str) -> bool {
        self.relevant.contains(event_type)
    }

    /// Label for a relevant event type; `None` when the type is filtered out.
    pub fn label_for(&self, event_type: &str) -> Option<u8> {
        if !self.is_relevant(event_type) {
            return None;
        }
        Some(u8::from(self.positive.contains(event_type)))
    }

    pub fn relevant(&self) -> impl Iterator<Item = &str> {
        self.relevant.iter().map(String::as_str)
    }

    pub fn positive(&self) -> impl Iterator<Item = &str> {
        self.positive.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_labels_plan_events() {
        let taxonomy = EventTaxonomy::default();
        assert_eq!(taxonomy.label_for(PLAN_VIEWED), Some(0));
        assert_eq!(taxonomy.label_for(PLAN_JOINED), Some(1));
        assert_eq!(taxonomy.label_for(PLAN_CONFIRMED), Some(1));
        assert_eq!(taxonomy.label_for("PLAN_CREATED"), None);
        assert_eq!(taxonomy.label_for("plan_viewed"), None);
    }

    #[test]
    fn custom_taxonomy_is_configuration_only() {
        let taxonomy =
            EventTaxonomy::new(["VIEWED", "JOINED", "CONFIRMED"], ["JOINED", "CONFIRMED"]).unwrap();
        assert_eq!(taxonomy.label_for("VIEWED"), Some(0));
        assert_eq!(taxonomy.label_for("JOINED"), Some(1));
        assert_eq!(taxonomy.label_for(PLAN_VIEWED), None);
    }

    #[test]
    fn rejects_positive_outside_relevant() {
        let err = EventTaxonomy::new(["VIEWED"], ["JOINED"]).unwrap_err();
        assert!(err.contains("JOINED"));
        assert!(EventTaxonomy::new(Vec::<String>::new(), Vec::<String>::new()).is_err());
    }
}
