//! Ordered list value (`LPUSH` / `LREM` / `LRANGE`)

use std::collections::VecDeque;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListValue {
    items: VecDeque<String>,
}

impl ListValue {
    pub fn new() -> Self {
        ListValue {
            items: VecDeque::new(),
        }
    }

    /// Verify all invariants hold for this list
    #[cfg(debug_assertions)]
    fn verify_invariants(&self) {
        debug_assert_eq!(
            self.len(),
            self.items.len(),
            "Invariant violated: len() must equal items.len()"
        );
        debug_assert_eq!(
            self.is_empty(),
            self.len() == 0,
            "Invariant violated: is_empty() must equal len() == 0"
        );
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    fn verify_invariants(&self) {}

    /// Prepend `value`; returns the new length.
    pub fn lpush(&mut self, value: String) -> usize {
        #[cfg(debug_assertions)]
        let pre_len = self.items.len();

        self.items.push_front(value);

        // TigerStyle: Postconditions
        #[cfg(debug_assertions)]
        debug_assert_eq!(
            self.items.len(),
            pre_len + 1,
            "Postcondition violated: len must increase by 1 after lpush"
        );

        self.verify_invariants();
        self.items.len()
    }

    /// LREM semantics: `count > 0` removes the first `count` matches from
    /// the head, `count < 0` the first `|count|` matches from the tail,
    /// `count == 0` every match. Non-matching entries keep their order.
    pub fn remove_matching(&mut self, count: i64, value: &str) -> usize {
        #[cfg(debug_assertions)]
        let pre_len = self.items.len();

        let limit = if count == 0 {
            usize::MAX
        } else {
            count.unsigned_abs() as usize
        };
        let mut removed = 0usize;

        if count >= 0 {
            self.items.retain(|item| {
                if removed < limit && item == value {
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        } else {
            // Walk from the tail so the newest-from-the-end matches go first.
            let mut kept: VecDeque<String> = VecDeque::with_capacity(self.items.len());
            while let Some(item) = self.items.pop_back() {
                if removed < limit && item == value {
                    removed += 1;
                } else {
                    kept.push_front(item);
                }
            }
            self.items = kept;
        }

        #[cfg(debug_assertions)]
        debug_assert_eq!(
            self.items.len(),
            pre_len - removed,
            "Postcondition violated: len must decrease by removed count"
        );

        self.verify_invariants();
        removed
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// LRANGE with Redis index normalization (negative = from the end).
    pub fn range(&self, start: isize, stop: isize) -> Vec<String> {
        let len = self.items.len() as isize;
        let start = if start < 0 {
            (len + start).max(0)
        } else {
            start.min(len)
        };
        let stop = if stop < 0 {
            (len + stop).max(-1)
        } else {
            stop.min(len - 1)
        };

        if start > stop || start >= len {
            return Vec::new();
        }

        self.items
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect()
    }
}
