use crate::config::SplitConfig;
use crate::error::Result;
use crate::record::Split;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use tracing::{debug, warn};

/// Key -> split lookup produced by [`assign_splits`].
///
/// The pipeline keys on file paths, which stay distinct even when two
/// filenames render to the same text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitAssignment<K: Eq + Hash = String> {
    by_key: HashMap<K, Split>,
}

impl<K: Eq + Hash> SplitAssignment<K> {
    pub fn get<Q>(&self, key: &Q) -> Option<Split>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.by_key.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn count(&self, split: Split) -> usize {
        self.by_key.values().filter(|s| **s == split).count()
    }
}

impl<K: Eq + Hash + Ord> SplitAssignment<K> {
    /// Keys assigned to `split`, sorted.
    pub fn names_in(&self, split: Split) -> Vec<&K> {
        let mut keys: Vec<&K> = self
            .by_key
            .iter()
            .filter(|(_, s)| **s == split)
            .map(|(k, _)| k)
            .collect();
        keys.sort_unstable();
        keys
    }
}

/// Number of items drawn for a fraction, rounded up like a shuffled
/// train/test split sizes its test side.
pub fn holdout_count(fraction: f64, total: usize) -> usize {
    // The epsilon keeps 0.3 * 100 at 30 instead of ceil(30.000000000000004).
    let raw = (fraction * total as f64 - 1e-9).ceil();
    if raw <= 0.0 {
        0
    } else {
        (raw as usize).min(total)
    }
}

/// Shuffles `items` with `seed` and splits off the first `ceil(fraction * n)`.
///
/// Returns `(rest, taken)`.
fn seeded_split<T: Clone>(items: &[T], fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut indices: Vec<usize> = (0..items.len()).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let take = holdout_count(fraction, items.len());
    let taken = indices[..take].iter().map(|&i| items[i].clone()).collect();
    let rest = indices[take..].iter().map(|&i| items[i].clone()).collect();
    (rest, taken)
}

/// Partitions `keys` into train/val/test.
///
/// The full list is split into train and holdout, then the holdout is split
/// into val and test. With `reuse_seed` both shuffles start from the same
/// seed. The result depends only on input order, fractions and seed, never on
/// the key values themselves.
pub fn assign_splits<K>(keys: &[K], cfg: &SplitConfig) -> Result<SplitAssignment<K>>
where
    K: Clone + Eq + Hash,
{
    cfg.validate()?;

    let (train, holdout) = seeded_split(keys, cfg.holdout, cfg.seed);
    let (val, test) = seeded_split(&holdout, cfg.test_of_holdout, cfg.holdout_seed());

    debug!(
        train = train.len(),
        val = val.len(),
        test = test.len(),
        seed = cfg.seed,
        reuse_seed = cfg.reuse_seed,
        "split assigned"
    );
    for (split, set) in [(Split::Train, &train), (Split::Val, &val), (Split::Test, &test)] {
        if set.is_empty() {
            warn!(split = %split, total = keys.len(), "split is empty; dataset too small for the configured fractions");
        }
    }

    let mut by_key = HashMap::with_capacity(keys.len());
    for (split, set) in [(Split::Train, train), (Split::Val, val), (Split::Test, test)] {
        for key in set {
            by_key.insert(key, split);
        }
    }
    Ok(SplitAssignment { by_key })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ManifestError;
    use std::collections::HashSet;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("cover_{i:04}.pgm")).collect()
    }

    #[test]
    fn hundred_files_split_seventy_fifteen_fifteen() {
        let files = names(100);
        let a = assign_splits(&files, &SplitConfig::default()).expect("split");
        assert_eq!(a.count(Split::Train), 70);
        assert_eq!(a.count(Split::Val), 15);
        assert_eq!(a.count(Split::Test), 15);
    }

    #[test]
    fn every_file_lands_in_exactly_one_split() {
        for n in [1, 2, 3, 7, 10, 33, 101] {
            let files = names(n);
            let a = assign_splits(&files, &SplitConfig::default()).expect("split");
            assert_eq!(a.len(), n);

            let mut seen = HashSet::new();
            for split in Split::ALL {
                for name in a.names_in(split) {
                    assert!(seen.insert(name.to_string()), "{name} in two splits");
                }
            }
            let all: HashSet<String> = files.iter().cloned().collect();
            assert_eq!(seen, all);
        }
    }

    #[test]
    fn same_inputs_give_same_assignment() {
        let files = names(57);
        let cfg = SplitConfig::default();
        let a = assign_splits(&files, &cfg).expect("split");
        let b = assign_splits(&files, &cfg).expect("split");
        assert_eq!(a, b);
    }

    #[test]
    fn different_seed_moves_files() {
        let files = names(200);
        let a = assign_splits(&files, &SplitConfig::default()).expect("split");
        let b = assign_splits(
            &files,
            &SplitConfig {
                seed: 7,
                ..SplitConfig::default()
            },
        )
        .expect("split");
        assert_ne!(a.names_in(Split::Train), b.names_in(Split::Train));
    }

    #[test]
    fn holdout_sets_match_between_seeding_modes() {
        let files = names(120);
        let reused = assign_splits(&files, &SplitConfig::default()).expect("split");
        let independent = assign_splits(
            &files,
            &SplitConfig {
                reuse_seed: false,
                ..SplitConfig::default()
            },
        )
        .expect("split");

        // The first shuffle is identical, only val/test membership may differ.
        assert_eq!(reused.names_in(Split::Train), independent.names_in(Split::Train));
        assert_eq!(reused.count(Split::Val), independent.count(Split::Val));
        assert_eq!(reused.count(Split::Test), independent.count(Split::Test));
    }

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    #[test]
    fn reused_seed_shuffles_holdout_with_the_first_seed() {
        let files = names(120);
        let cfg = SplitConfig::default();
        let a = assign_splits(&files, &cfg).expect("split");

        let (_, holdout) = seeded_split(&files, cfg.holdout, cfg.seed);
        let (val, test) = seeded_split(&holdout, cfg.test_of_holdout, cfg.seed);
        let (val, test) = (sorted(val), sorted(test));
        assert_eq!(a.names_in(Split::Val), val.iter().collect::<Vec<_>>());
        assert_eq!(a.names_in(Split::Test), test.iter().collect::<Vec<_>>());
    }

    #[test]
    fn independent_seeds_change_val_and_test_membership() {
        let files = names(120);
        let reused = assign_splits(&files, &SplitConfig::default()).expect("split");
        let cfg = SplitConfig {
            reuse_seed: false,
            ..SplitConfig::default()
        };
        let independent = assign_splits(&files, &cfg).expect("split");

        let (_, holdout) = seeded_split(&files, cfg.holdout, cfg.seed);
        let (val, _) = seeded_split(&holdout, cfg.test_of_holdout, cfg.seed.wrapping_add(1));
        let val = sorted(val);
        assert_eq!(independent.names_in(Split::Val), val.iter().collect::<Vec<_>>());
        assert_ne!(independent.names_in(Split::Val), reused.names_in(Split::Val));
        assert_ne!(independent.names_in(Split::Test), reused.names_in(Split::Test));
    }

    #[test]
    fn rounding_sends_the_extra_file_to_holdout_and_test() {
        assert_eq!(holdout_count(0.30, 100), 30);
        assert_eq!(holdout_count(0.30, 10), 3);
        assert_eq!(holdout_count(0.30, 11), 4);
        assert_eq!(holdout_count(0.50, 3), 2);
        assert_eq!(holdout_count(0.30, 1), 1);
        assert_eq!(holdout_count(0.30, 0), 0);
    }

    #[test]
    fn single_file_goes_to_test() {
        let files = names(1);
        let a = assign_splits(&files, &SplitConfig::default()).expect("split");
        assert_eq!(a.get(&files[0]), Some(Split::Test));
    }

    #[test]
    fn invalid_fractions_fail_before_splitting() {
        let files = names(10);
        let cfg = SplitConfig {
            holdout: 1.0,
            ..SplitConfig::default()
        };
        assert!(matches!(
            assign_splits(&files, &cfg),
            Err(ManifestError::InvalidSplitConfig(_))
        ));
    }
}
