//! Sorted item list
//!
//! Keeps menu rows in display order while their sort keys change.
//! Positions returned by [`ItemSorter::upsert`] index into the same list the
//! menu section holds, so they can be passed straight to `move_menu_item`.

use std::cmp::Ordering;

/// Name comparison: Unicode lowercase first, then byte order so that
/// distinct names never compare equal.
///
/// This is not locale-aware collation. Accented letters sort by code point,
/// after the unaccented alphabet, and no language-specific rules apply.
pub fn collate(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

#[derive(Debug, Clone)]
pub struct ItemSorter<T, K> {
    items: Vec<(T, K)>,
    compare: fn(&K, &K) -> Ordering,
}

impl<T: PartialEq, K: Ord> Default for ItemSorter<T, K> {
    fn default() -> Self {
        Self::with_compare(K::cmp)
    }
}

impl<T: PartialEq> ItemSorter<T, String> {
    /// Sorter ordering items by name
    pub fn by_name() -> Self {
        Self::with_compare(|a, b| collate(a, b))
    }
}

impl<T: PartialEq, K> ItemSorter<T, K> {
    pub fn with_compare(compare: fn(&K, &K) -> Ordering) -> Self {
        Self {
            items: Vec::new(),
            compare,
        }
    }

    /// Insert `item` or move it to where `key` now sorts. Returns its
    /// position.
    pub fn upsert(&mut self, item: T, key: K) -> usize {
        self.delete(&item);
        let compare = self.compare;
        let pos = self
            .items
            .partition_point(|(_, k)| compare(k, &key) != Ordering::Greater);
        self.items.insert(pos, (item, key));
        pos
    }

    /// Remove `item`; returns whether it was present
    pub fn delete(&mut self, item: &T) -> bool {
        match self.position(item) {
            Some(pos) => {
                self.items.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn position(&self, item: &T) -> Option<usize> {
        self.items.iter().position(|(i, _)| i == item)
    }

    pub fn contains(&self, item: &T) -> bool {
        self.position(item).is_some()
    }

    pub fn key(&self, item: &T) -> Option<&K> {
        self.items.iter().find(|(i, _)| i == item).map(|(_, k)| k)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in sort order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(|(item, _)| item)
    }
}

impl<'a, T: PartialEq, K> IntoIterator for &'a ItemSorter<T, K> {
    type Item = &'a T;
    type IntoIter = std::iter::Map<std::slice::Iter<'a, (T, K)>, fn(&'a (T, K)) -> &'a T>;

    fn into_iter(self) -> Self::IntoIter {
        fn first<T, K>((item, _): &(T, K)) -> &T {
            item
        }
        self.items.iter().map(first as fn(&'a (T, K)) -> &'a T)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_collate() {
        assert_eq!(collate("apple", "Banana"), Ordering::Less);
        assert_eq!(collate("Zed", "alpha"), Ordering::Greater);
        assert_ne!(collate("Office", "office"), Ordering::Equal);
        assert_eq!(collate("same", "same"), Ordering::Equal);
    }

    #[test]
    fn test_collate_orders_accents_by_code_point() {
        assert_eq!(collate("Émile", "Zoe"), Ordering::Greater);
        assert_eq!(collate("émile", "Émile"), Ordering::Greater);
    }

    #[test]
    fn test_upsert_moves_item() {
        let mut sorter = ItemSorter::by_name();
        assert_eq!(sorter.upsert(1, "Home".to_string()), 0);
        assert_eq!(sorter.upsert(2, "office".to_string()), 1);
        assert_eq!(sorter.upsert(3, "Cafe".to_string()), 0);
        assert_eq!(sorter.iter().copied().collect::<Vec<_>>(), vec![3, 1, 2]);

        // Renamed: moves to the end
        assert_eq!(sorter.upsert(3, "Zoo".to_string()), 2);
        assert_eq!(sorter.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(sorter.key(&3).map(String::as_str), Some("Zoo"));
    }

    #[test]
    fn test_equal_keys_insert_after() {
        let mut sorter: ItemSorter<u32, u32> = ItemSorter::default();
        sorter.upsert(1, 5);
        sorter.upsert(2, 5);
        assert_eq!(sorter.upsert(3, 5), 2);
        assert_eq!((&sorter).into_iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut sorter: ItemSorter<u32, u32> = ItemSorter::default();
        sorter.upsert(1, 1);
        assert!(sorter.delete(&1));
        assert!(!sorter.delete(&1));
        assert!(sorter.is_empty());
    }

    proptest! {
        #[test]
        fn prop_upsert_idempotent_and_sorted(ops in prop::collection::vec((0u8..8, 0u8..20, any::<bool>()), 0..64)) {
            let mut sorter: ItemSorter<u8, u8> = ItemSorter::default();
            for (item, key, delete) in ops {
                if delete {
                    sorter.delete(&item);
                    prop_assert!(!sorter.contains(&item));
                    continue;
                }
                let first = sorter.upsert(item, key);
                let len = sorter.len();
                let second = sorter.upsert(item, key);
                prop_assert_eq!(first, second);
                prop_assert_eq!(len, sorter.len());
                prop_assert_eq!(sorter.position(&item), Some(second));

                let keys: Vec<u8> = sorter.iter().filter_map(|i| sorter.key(i).copied()).collect();
                prop_assert!(keys.windows(2).all(|w| w[0] <= w[1]));
                let mut seen: Vec<u8> = sorter.iter().copied().collect();
                seen.sort_unstable();
                seen.dedup();
                prop_assert_eq!(seen.len(), sorter.len());
            }
        }
    }
}
