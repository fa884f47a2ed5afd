//! Utility functions and types used throughout bankhammer.
//!
//! This module provides various helper types and traits including:
//! - [`Size`] - Memory size representation
//! - Constants for memory geometry and thresholds ([`ROW_SIZE`], [`NUM_BANKS`], etc.)
//! - [`GroupBy`] trait for collection grouping operations
//! - Progress reporting utilities ([`NamedProgress`])
//! - Random number generation ([`Rng`])
//! - A cancelable worker thread ([`spawn_cancelable`])

mod cancelable_thread;
mod constants;
mod named_progress;
mod rng;
mod size;

pub use self::cancelable_thread::*;
pub use self::constants::*;
pub use self::named_progress::{NamedProgress, named_bar};
pub use self::rng::Rng;
pub use self::size::{ParseSizeError, Size};

use std::collections::BTreeMap;

/// Trait for grouping collection elements by a key function.
///
/// This trait extends collections with the ability to group elements based on
/// a key extraction function, similar to SQL's GROUP BY operation. Groups are
/// returned in ascending key order and keep the input order of their elements.
pub trait GroupBy<V> {
    /// Groups elements by the result of applying a function to each element.
    fn group_by<K: Ord, F: Fn(&V) -> K>(self, f: F) -> BTreeMap<K, Vec<V>>;
}

impl<T, I: IntoIterator<Item = T>> GroupBy<T> for I {
    fn group_by<K: Ord, F: Fn(&T) -> K>(self, f: F) -> BTreeMap<K, Vec<T>> {
        let mut out = BTreeMap::new();
        for elem in self {
            let k = f(&elem);
            out.entry(k).or_insert_with(Vec::new).push(elem);
        }
        out
    }
}

/// Formats the lowest `num_bits` bits of `num` as a fixed-width binary string (MSB first).
///
/// # Examples
///
/// ```
/// use bankhammer_core::util::to_binary;
///
/// assert_eq!(to_binary(5, 4), "0101");
/// assert_eq!(to_binary(0xFF, 4), "1111");
/// ```
pub fn to_binary(num: u64, num_bits: usize) -> String {
    (0..num_bits)
        .rev()
        .map(|bit| {
            if bit < 64 && (num >> bit) & 1 == 1 {
                '1'
            } else {
                '0'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{GroupBy, to_binary};

    #[test]
    fn test_group_mod2() {
        let addrs = vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9];
        let groups = addrs.group_by(|x| x % 2);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&0], vec![0, 2, 4, 6, 8]);
        assert_eq!(groups[&1], vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_group_prefix() {
        let words = vec!["apple", "banana", "apricot", "blueberry"];
        let groups = words.group_by(|x| x[0..1].to_string());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["a"], vec!["apple", "apricot"]);
        assert_eq!(groups["b"], vec!["banana", "blueberry"]);
    }

    #[test]
    fn test_to_binary() {
        assert_eq!(to_binary(0, 3), "000");
        assert_eq!(to_binary(1 << 32, 33), format!("1{}", "0".repeat(32)));
        // bits above the width are dropped
        assert_eq!(to_binary(0b1_0110, 4), "0110");
        assert_eq!(to_binary(u64::MAX, 66), format!("00{}", "1".repeat(64)));
    }
}
