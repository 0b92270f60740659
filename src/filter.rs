use std::collections::HashSet;

use serde_json::Value;

use crate::venue::Candidate;

/// True iff every required key is present with a non-null value.
pub fn is_complete<S: AsRef<str>>(candidate: &Candidate, required: &[S]) -> bool {
    required.iter().all(|key| {
        candidate
            .get(key.as_ref())
            .is_some_and(|v| !matches!(v, Value::Null))
    })
}

/// Identities seen during one run. Only grows; dropped with the run.
#[derive(Debug, Default)]
pub struct SeenSet {
    seen: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_duplicate(&self, identity: &str) -> bool {
        self.seen.contains(identity)
    }

    pub fn record_seen(&mut self, identity: &str) {
        self.seen.insert(identity.to_string());
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::FIELDS;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn null_value_is_incomplete() {
        let c = json!({ "name": "A", "location": null }).as_object().cloned().unwrap();
        assert!(!is_complete(&c, &["name", "location"]));
        assert!(is_complete(&c, &["name"]));
    }

    #[test]
    fn empty_required_set_accepts_anything() {
        let c = Candidate::new();
        assert!(is_complete::<&str>(&c, &[]));
    }

    #[test]
    fn recording_twice_keeps_one_entry() {
        let mut seen = SeenSet::new();
        assert!(!seen.is_duplicate("A Hall"));
        seen.record_seen("A Hall");
        seen.record_seen("A Hall");
        assert!(seen.is_duplicate("A Hall"));
        assert_eq!(seen.len(), 1);
    }

    proptest! {
        #[test]
        fn complete_iff_all_required_present(present in proptest::collection::vec(any::<bool>(), 7)) {
            let mut c = Candidate::new();
            for (field, keep) in FIELDS.iter().zip(&present) {
                if *keep {
                    c.insert(field.to_string(), json!("x"));
                }
            }
            prop_assert_eq!(is_complete(&c, &FIELDS), present.iter().all(|p| *p));
        }

        #[test]
        fn seen_holds_exactly_the_distinct_identities(ids in proptest::collection::vec("[a-d]{1,2}", 0..40)) {
            let mut seen = SeenSet::new();
            let mut repeated = Vec::new();
            for id in &ids {
                if seen.is_duplicate(id) {
                    repeated.push(id.clone());
                }
                seen.record_seen(id);
            }
            let distinct: HashSet<&String> = ids.iter().collect();
            prop_assert_eq!(seen.len(), distinct.len());
            for id in &distinct {
                prop_assert!(seen.is_duplicate(id));
            }
            for id in &ids {
                let count = ids.iter().filter(|x| *x == id).count();
                if count > 1 {
                    prop_assert!(repeated.contains(id));
                }
            }
        }
    }
}
