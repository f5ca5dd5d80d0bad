// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Sorting of a flat value buffer (§4.2): counting sort when the value
//! range is tight relative to the element count, quicksort otherwise.
//! `reference_sort` applies the same decision to permute an external index
//! array instead of the values themselves.

/// Sorts `values` in place, choosing counting sort when it provably does
/// less work than a comparison sort.
pub fn sort(values: &mut [i64]) {
    if values.len() < 2 {
        return;
    }

    let min = *values.iter().min().expect("non-empty");
    let max = *values.iter().max().expect("non-empty");

    if counting_sort_is_cheaper(min, max, values.len()) {
        counting_sort(values, min, max);
    } else {
        values.sort_unstable();
    }
}

fn counting_sort_is_cheaper(min: i64, max: i64, len: usize) -> bool {
    let Some(range) = (max - min).checked_add(1) else {
        return false;
    };
    range > 0 && (range as u128) <= len as u128
}

fn counting_sort(values: &mut [i64], min: i64, max: i64) {
    let range = (max - min + 1) as usize;
    let mut counts = vec![0_usize; range];

    for &v in values.iter() {
        counts[(v - min) as usize] += 1;
    }

    let mut i = 0;
    for (bucket, &count) in counts.iter().enumerate() {
        let value = min + bucket as i64;
        for _ in 0..count {
            values[i] = value;
            i += 1;
        }
    }
}

/// Returns a permutation of `0..values.len()` that sorts `values`, using
/// the same counting-sort/quicksort decision as [`sort`], but without
/// mutating `values` itself (used to build a secondary index array).
#[must_use]
pub fn reference_sort(values: &[i64]) -> Vec<u64> {
    let mut indices: Vec<u64> = (0..values.len() as u64).collect();

    if values.len() < 2 {
        return indices;
    }

    let min = *values.iter().min().expect("non-empty");
    let max = *values.iter().max().expect("non-empty");

    if counting_sort_is_cheaper(min, max, values.len()) {
        let range = (max - min + 1) as usize;
        let mut buckets: Vec<Vec<u64>> = vec![Vec::new(); range];
        for (i, &v) in values.iter().enumerate() {
            buckets[(v - min) as usize].push(i as u64);
        }
        indices = buckets.into_iter().flatten().collect();
    } else {
        indices.sort_unstable_by_key(|&i| values[i as usize]);
    }

    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn sorts_small_range() {
        let mut values = vec![3_i64, 1, 2, 1, 3, 2];
        sort(&mut values);
        assert_eq!(vec![1, 1, 2, 2, 3, 3], values);
    }

    #[test]
    fn sorts_wide_range() {
        let mut values = vec![1_000_000_i64, -500_000, 0, 42];
        sort(&mut values);
        assert_eq!(vec![-500_000, 0, 42, 1_000_000], values);
    }

    #[test]
    fn reference_sort_permutes_indices() {
        let values = vec![3_i64, 1, 2];
        let idx = reference_sort(&values);
        let sorted: Vec<i64> = idx.iter().map(|&i| values[i as usize]).collect();
        assert_eq!(vec![1, 2, 3], sorted);
    }
}
