// Seeded train/test partitioning of the corpus.
//
// Rows with empty text are dropped, the rest are shuffled with a StdRng seeded from the
// configured seed and cut at floor(fraction * n). The remainder goes to the test set, so
// identical (rows, fraction, seed) always give the identical partition.

use super::dataset::NewsItem;
use crate::error::{Error, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Splits `items` into (train, test).
pub fn split_train_test(
    items: Vec<NewsItem>,
    train_fraction: f64,
    seed: u64,
) -> Result<(Vec<NewsItem>, Vec<NewsItem>)> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(Error::InvalidConfig(format!(
            "train fraction must lie in (0, 1), got {train_fraction}"
        )));
    }

    let mut rows = drop_empty_text(items);
    let mut rng = StdRng::seed_from_u64(seed);
    rows.shuffle(&mut rng);

    let split_at = ((rows.len() as f64) * train_fraction).floor() as usize;
    let test = rows.split_off(split_at.min(rows.len()));

    tracing::info!("Split: {} train, {} test", rows.len(), test.len());
    Ok((rows, test))
}

/// Keeps `size` rows picked by a seeded shuffle, or every row when there are fewer.
pub fn subsample(items: Vec<NewsItem>, size: usize, seed: u64) -> Vec<NewsItem> {
    if size >= items.len() {
        return items;
    }

    let mut rows = items;
    let mut rng = StdRng::seed_from_u64(seed);
    rows.shuffle(&mut rng);
    rows.truncate(size);
    rows
}

pub fn drop_empty_text(items: Vec<NewsItem>) -> Vec<NewsItem> {
    let total = items.len();
    let kept: Vec<NewsItem> = items
        .into_iter()
        .filter(|item| !item.text.trim().is_empty())
        .collect();

    if kept.len() < total {
        tracing::warn!("Dropped {} rows with empty text", total - kept.len());
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn corpus(n: usize) -> Vec<NewsItem> {
        (0..n)
            .map(|i| NewsItem::new(format!("article {i}"), i % 5))
            .collect()
    }

    #[test]
    fn floors_the_train_share() {
        let (train, test) = split_train_test(corpus(10), 0.75, 7).unwrap();
        assert_eq!(train.len(), 7);
        assert_eq!(test.len(), 3);
    }

    #[test]
    fn drops_rows_with_empty_text() {
        let mut items = corpus(4);
        items.push(NewsItem::new(String::new(), 0));
        items.push(NewsItem::new("   ".to_string(), 1));

        let (train, test) = split_train_test(items, 0.5, 1).unwrap();
        assert_eq!(train.len() + test.len(), 4);
        assert!(train.iter().chain(&test).all(|item| !item.text.trim().is_empty()));
    }

    #[test]
    fn rejects_fraction_outside_open_interval() {
        for fraction in [0.0, 1.0, -0.2, 1.5, f64::NAN] {
            assert!(matches!(
                split_train_test(corpus(3), fraction, 0),
                Err(Error::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn empty_corpus_splits_into_empty_sets() {
        let (train, test) = split_train_test(Vec::new(), 0.8, 0).unwrap();
        assert!(train.is_empty());
        assert!(test.is_empty());
    }

    #[test]
    fn subsample_is_seeded() {
        let a = subsample(corpus(50), 10, 3);
        let b = subsample(corpus(50), 10, 3);
        assert_eq!(a.len(), 10);
        assert_eq!(a, b);
        assert_eq!(subsample(corpus(4), 10, 3), corpus(4));
    }

    proptest! {
        #[test]
        fn split_is_deterministic(n in 0usize..200, fraction in 0.01f64..0.99, seed in any::<u64>()) {
            let first = split_train_test(corpus(n), fraction, seed).unwrap();
            let second = split_train_test(corpus(n), fraction, seed).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn split_is_disjoint_and_covering(n in 0usize..200, fraction in 0.01f64..0.99, seed in any::<u64>()) {
            let (train, test) = split_train_test(corpus(n), fraction, seed).unwrap();

            let train_texts: HashSet<_> = train.iter().map(|item| item.text.clone()).collect();
            let test_texts: HashSet<_> = test.iter().map(|item| item.text.clone()).collect();

            prop_assert!(train_texts.is_disjoint(&test_texts));
            prop_assert_eq!(train_texts.len() + test_texts.len(), n);
            prop_assert_eq!(train.len(), ((n as f64) * fraction).floor() as usize);
        }
    }
}
