//! Integration tests for parallel elementwise construction.

#![cfg(feature = "parallel")]

use adtape::{
    AdError, ParallelConfig, Var, exp_all, gradient, nested, parallel_map, parallel_map_with, sum,
    tape_len,
};
use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

fn random_vars(seed: u64, n: usize) -> Vec<Var> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    (0..n).map(|_| Var::new(normal.sample(&mut rng))).collect()
}

fn softplus_product(v: &[Var]) -> Result<Var, AdError> {
    // log(1 + e^a) * b
    Ok((v[0].exp() + 1.0).ln()? * v[1])
}

#[test]
fn test_parallel_gradient_matches_serial() {
    let a = random_vars(1, 200);
    let b = random_vars(2, 200);
    let mut inputs = a.clone();
    inputs.extend_from_slice(&b);

    let config = ParallelConfig::default().with_min_parallel_len(0);
    let out = parallel_map_with(&config, &[&a, &b], softplus_product).unwrap();
    let g_parallel = gradient(sum(&out), &inputs).unwrap().to_vec();

    let g_serial = {
        let out = parallel_map_with(&ParallelConfig::sequential(), &[&a, &b], softplus_product)
            .unwrap();
        gradient(sum(&out), &inputs).unwrap().to_vec()
    };
    let same = g_parallel
        .iter()
        .zip(&g_serial)
        .all(|(p, s)| p.to_bits() == s.to_bits());
    assert!(same);

    for (i, (&ai, &bi)) in a.iter().zip(&b).enumerate() {
        let s = 1.0 / (1.0 + (-ai.value()).exp());
        assert_relative_eq!(g_parallel[i], s * bi.value(), max_relative = 1e-10);
        assert_relative_eq!(
            g_parallel[200 + i],
            ai.value().exp().ln_1p(),
            max_relative = 1e-10
        );
    }
}

#[test]
fn test_shuffled_completion_is_deterministic() {
    let a = random_vars(3, 64);
    let b = random_vars(4, 64);
    let config = ParallelConfig::default()
        .with_num_threads(8)
        .with_min_parallel_len(0);

    let run = || {
        nested(|| {
            let out = parallel_map_with(&config, &[&a, &b], |v| {
                let delay = rand::rng().random_range(0..500);
                std::thread::sleep(std::time::Duration::from_micros(delay));
                softplus_product(v)
            })
            .unwrap();
            let ids: Vec<usize> = out.iter().map(|y| y.id().index()).collect();
            let g = gradient(sum(&out), &a).unwrap().to_vec();
            (ids, g)
        })
    };

    let (ids, reference) = run();
    assert!(ids.windows(2).all(|w| w[1] == w[0] + 1));
    for _ in 0..5 {
        let (again_ids, again) = run();
        assert_eq!(again_ids, ids);
        assert!(again.iter().zip(&reference).all(|(x, y)| x.to_bits() == y.to_bits()));
    }
}

#[test]
fn test_failures_reported_after_all_elements() {
    let xs: Vec<Var> = (0..100).map(|i| Var::new(i as f64 - 10.0)).collect();
    let before = tape_len();
    let config = ParallelConfig::default().with_min_parallel_len(0);

    let err = parallel_map_with(&config, &[&xs], |v| v[0].sqrt()).unwrap_err();
    assert_eq!(tape_len(), before);
    let AdError::Parallel { total, failures } = err else {
        panic!("expected aggregated failure");
    };
    assert_eq!(total, 100);
    assert_eq!(
        failures.iter().map(|f| f.index).collect::<Vec<_>>(),
        (0..10).collect::<Vec<_>>()
    );
}

#[test]
fn test_results_compose_with_later_operations() {
    let xs = random_vars(5, 50);
    let es = exp_all(&xs).unwrap();
    let squares = parallel_map(&[&es], |v| Ok(v[0].square())).unwrap();
    let total = sum(&squares);

    // d/dx e^{2x} = 2 e^{2x}
    let g = gradient(total, &xs).unwrap().to_vec();
    for (x, gi) in xs.iter().zip(&g) {
        assert_relative_eq!(*gi, 2.0 * (2.0 * x.value()).exp(), max_relative = 1e-12);
    }
}
