//! Candidate image paths, grouped so selection can weight whole collections.

use std::path::PathBuf;

use rand::Rng;
use rand::seq::IndexedRandom;

/// Groups of candidate paths.
///
/// Picking is two independent uniform draws: first a group, then a path inside
/// it. A small directory is therefore shown as often as a large one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceCollection {
    groups: Vec<Vec<PathBuf>>,
}

impl SourceCollection {
    #[must_use]
    pub fn new(groups: Vec<Vec<PathBuf>>) -> Self {
        Self { groups }
    }

    /// A single group holding every path, so each path is equally likely.
    #[must_use]
    pub fn flat(paths: Vec<PathBuf>) -> Self {
        Self {
            groups: vec![paths],
        }
    }

    #[must_use]
    pub fn groups(&self) -> &[Vec<PathBuf>] {
        &self.groups
    }

    /// Total number of paths across all groups.
    #[must_use]
    pub fn total(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Pick a group, then a path within it.
    ///
    /// Returns `None` when there are no groups or the drawn group is empty;
    /// callers treat that as "nothing to load right now".
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&PathBuf> {
        self.groups.choose(rng)?.choose(rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn empty_collection_yields_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(SourceCollection::default().pick(&mut rng).is_none());
        assert!(SourceCollection::new(vec![vec![]]).pick(&mut rng).is_none());
    }

    #[test]
    fn empty_group_is_a_miss_not_a_fallback() {
        let mut rng = StdRng::seed_from_u64(2);
        let collection = SourceCollection::new(vec![vec![], paths(&["x.jpg"])]);
        let mut hits = 0;
        let mut misses = 0;
        for _ in 0..2000 {
            match collection.pick(&mut rng) {
                Some(p) => {
                    assert_eq!(p, &PathBuf::from("x.jpg"));
                    hits += 1;
                }
                None => misses += 1,
            }
        }
        assert!(hits > 800 && misses > 800, "hits={hits} misses={misses}");
    }

    #[test]
    fn groups_are_weighted_equally_regardless_of_size() {
        let mut rng = StdRng::seed_from_u64(0xC0FFEE);
        let big: Vec<PathBuf> = (0..9).map(|i| PathBuf::from(format!("big/{i}.jpg"))).collect();
        let collection = SourceCollection::new(vec![paths(&["small/only.jpg"]), big]);
        assert_eq!(collection.total(), 10);

        let draws = 10_000;
        let small = (0..draws)
            .filter_map(|_| collection.pick(&mut rng))
            .filter(|p| p.starts_with("small"))
            .count();
        // A flat draw would give ~10%; two-stage gives ~50%.
        assert!((4_500..=5_500).contains(&small), "small drawn {small} times");
    }

    #[test]
    fn flat_collection_is_one_group() {
        let collection = SourceCollection::flat(paths(&["a", "b"]));
        assert_eq!(collection.groups().len(), 1);
        assert!(!collection.is_empty());
    }
}
