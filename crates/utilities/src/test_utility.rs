//! Random input generators shared by test and benchmark code.

use std::{collections::HashSet, hash::Hash};

use rand::distr::uniform::SampleUniform;
use rand::Rng;

/// Returns a vector of the given length with random values in `0..max_value`.
pub fn random_vector<T: Copy + Default + SampleUniform + PartialOrd>(
    length: usize,
    max_value: T,
) -> Vec<T> {
    let mut rng = rand::rng();
    let mut vector: Vec<T> = Vec::new();
    for _ in 0..length {
        vector.push(rng.random_range(T::default()..max_value));
    }

    vector
}

/// Returns a sorted vector of the given length with unique values in `0..max_value`.
pub fn random_sorted_vector(length: usize, max_value: u32) -> Vec<u32> {
    use rand::seq::IteratorRandom;

    let mut rng = rand::rng();
    let mut result = (u32::default()..max_value).choose_multiple(&mut rng, length);
    result.sort();
    result
}

/// Returns a set of `amount` vectors, each of the given length.
pub fn random_vector_set<T: Copy + Default + Eq + Hash + SampleUniform + PartialOrd>(
    amount: usize,
    length: usize,
    max_value: T,
) -> HashSet<Vec<T>> {
    let mut result: HashSet<Vec<T>> = HashSet::new();

    for _ in 0..amount {
        result.insert(random_vector(length, max_value));
    }

    result
}
