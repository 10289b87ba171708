//! Statistical and boundary checks for the draw engine

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use steward_core::{draw, draw_with};

#[test]
fn every_result_comes_from_the_pool() {
    let pool = vec!["A", "B", "C"];
    let results = draw(&pool, 5);
    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| pool.contains(r)));
}

#[test]
fn empty_pool_draws_nothing() {
    let pool: Vec<&str> = Vec::new();
    assert!(draw(&pool, 3).is_empty());
}

#[test]
fn draws_are_uniform_with_replacement() {
    const TRIALS: usize = 10_000;
    let pool = ["A", "B", "C"];
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for _ in 0..TRIALS {
        for label in draw_with(&mut rng, &pool, 1) {
            *counts.entry(label).or_default() += 1;
        }
    }

    for label in pool {
        #[allow(clippy::cast_precision_loss)]
        let freq = counts[label] as f64 / TRIALS as f64;
        assert!(
            (freq - 1.0 / 3.0).abs() < 0.02,
            "{label} drawn with frequency {freq}"
        );
    }
}
