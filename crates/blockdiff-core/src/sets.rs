//! Set algebra over identity keys

use std::collections::BTreeSet;

/// `a \ b`
pub fn difference<T: Ord + Clone>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> BTreeSet<T> {
    a.difference(b).cloned().collect()
}

/// `a ∩ b`
pub fn intersection<T: Ord + Clone>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> BTreeSet<T> {
    a.intersection(b).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_difference_excludes_other_side() {
        let a = set(&["1", "2", "3"]);
        let b = set(&["2", "3", "4"]);
        let d = difference(&a, &b);
        assert_eq!(d, set(&["1"]));
        assert!(intersection(&d, &b).is_empty());
    }

    #[test]
    fn test_intersection_commutes() {
        let cases = [
            (set(&["1", "2", "3"]), set(&["2", "3", "4"])),
            (set(&[]), set(&["x"])),
            (set(&["a"]), set(&["a"])),
            (set(&["a", "b"]), set(&["c"])),
        ];
        for (a, b) in cases {
            assert_eq!(intersection(&a, &b), intersection(&b, &a));
            assert!(intersection(&difference(&a, &b), &b).is_empty());
        }
    }

    #[test]
    fn test_empty_sets() {
        let empty: BTreeSet<String> = BTreeSet::new();
        assert!(difference(&empty, &empty).is_empty());
        assert!(intersection(&empty, &set(&["a"])).is_empty());
        assert_eq!(difference(&set(&["a"]), &empty), set(&["a"]));
    }
}
