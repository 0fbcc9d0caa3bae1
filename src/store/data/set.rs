//! Unordered set of unique strings (`SADD` / `SREM` / `SMEMBERS`)

use ahash::AHashSet;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SetValue {
    members: AHashSet<String>,
}

impl SetValue {
    pub fn new() -> Self {
        SetValue {
            members: AHashSet::new(),
        }
    }

    pub fn add(&mut self, member: &str) -> bool {
        #[cfg(debug_assertions)]
        let pre_len = self.members.len();

        let inserted = self.members.insert(member.to_string());

        // TigerStyle: Postconditions
        debug_assert!(
            self.members.contains(member),
            "Postcondition violated: member must exist after add"
        );
        #[cfg(debug_assertions)]
        debug_assert_eq!(
            self.members.len(),
            if inserted { pre_len + 1 } else { pre_len },
            "Postcondition violated: len must be correct after add"
        );

        inserted
    }

    pub fn remove(&mut self, member: &str) -> bool {
        let removed = self.members.remove(member);

        debug_assert!(
            !self.members.contains(member),
            "Postcondition violated: member must not exist after remove"
        );

        removed
    }

    pub fn members(&self) -> Vec<String> {
        self.members.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let mut set = SetValue::new();
        assert!(set.add("k"));
        assert!(!set.add("k"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_remove_reports_presence() {
        let mut set = SetValue::new();
        set.add("k");
        assert!(set.remove("k"));
        assert!(!set.remove("k"));
        assert!(set.is_empty());
    }
}
