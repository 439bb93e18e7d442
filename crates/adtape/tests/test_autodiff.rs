//! Integration tests for the reverse pass.
//!
//! Gradients are checked against closed forms and against central finite
//! differences on randomized inputs.

use adtape::{
    AdError, Var, dot, finite_diff_gradient, gradient, gradient_of, inv_logit_f64, log_sum_exp,
    log_sum_exp_f64, nested, squared_norm, sum, vjp,
};
use approx::assert_relative_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal, Uniform};

#[test]
fn test_exp_gradient() {
    let x = Var::new(3.0);
    let y = x.exp();
    let g = gradient(y, &[x]).unwrap();
    assert_relative_eq!(g.get(x).unwrap(), 20.085536923187668, max_relative = 1e-12);
}

#[test]
fn test_inv_logit_gradient_at_zero() {
    let x = Var::new(0.0);
    let y = x.inv_logit();
    assert_eq!(y.value(), 0.5);
    let g = gradient(y, &[x]).unwrap();
    assert_relative_eq!(g.get(x).unwrap(), 0.25, max_relative = 1e-12);
}

#[test]
fn test_product_gradient() {
    let a = Var::new(2.0);
    let b = Var::new(5.0);
    let g = gradient(a * b, &[a, b]).unwrap();
    assert_eq!(g.to_vec(), vec![5.0, 2.0]);
}

#[test]
fn test_shared_subexpression_accumulates() {
    // f = u * u + u with u = x * x; df/dx = (2u + 1) * 2x
    let x = Var::new(1.5);
    let u = x * x;
    let f = u * u + u;
    let g = gradient(f, &[x]).unwrap();
    let uv = 1.5 * 1.5;
    assert_relative_eq!(g.get(x).unwrap(), (2.0 * uv + 1.0) * 3.0, max_relative = 1e-12);
}

fn composite(v: &[Var]) -> Result<Var, AdError> {
    let lse = log_sum_exp(v)?;
    let norm = dot(v, v)?.sqrt()?;
    let mix = (v[1] * v[2]).inv_logit();
    let wave = v[0].sin() * v[3].cos();
    let pow = (v[2].square() + 1.0).powf(1.5)?;
    Ok(lse + norm * mix - wave / (v[3].exp() + 2.0) + pow)
}

fn composite_f64(x: &[f64]) -> f64 {
    let lse = log_sum_exp_f64(x);
    let norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
    let mix = inv_logit_f64(x[1] * x[2]);
    let wave = x[0].sin() * x[3].cos();
    let pow = (x[2] * x[2] + 1.0).powf(1.5);
    lse + norm * mix - wave / (x[3].exp() + 2.0) + pow
}

#[test]
fn test_matches_finite_differences_on_random_inputs() {
    let mut rng = StdRng::seed_from_u64(42);
    let normal = Normal::new(0.0, 1.0).unwrap();

    for _ in 0..25 {
        let x: Vec<f64> = (0..4).map(|_| normal.sample(&mut rng)).collect();
        let (fx, exact) = gradient_of(composite, &x).unwrap();
        let numeric = finite_diff_gradient(composite_f64, &x, 1e-6);

        assert_relative_eq!(fx, composite_f64(&x), max_relative = 1e-12);
        for (e, n) in exact.iter().zip(&numeric) {
            assert_relative_eq!(e, n, epsilon = 1e-6, max_relative = 1e-5);
        }
    }
}

#[test]
fn test_chain_rule_of_composed_functions() {
    // d/dx g(h(x)) = g'(h(x)) * h'(x), with h = exp, g = inv_logit
    let mut rng = StdRng::seed_from_u64(7);
    let uniform = Uniform::new(-2.0, 2.0).unwrap();

    for _ in 0..50 {
        let x0: f64 = uniform.sample(&mut rng);
        let x = Var::new(x0);
        let h = x.exp();
        let y = h.inv_logit();

        let dh = gradient(h, &[x]).unwrap().get(x).unwrap();
        let dy = gradient(y, &[h]).unwrap().get(h).unwrap();
        let total = gradient(y, &[x]).unwrap().get(x).unwrap();
        assert_relative_eq!(total, dy * dh, max_relative = 1e-12);
    }
}

#[test]
fn test_gradients_deterministic_across_fresh_contexts() {
    let x = [0.3, -0.7, 1.1, 0.25];
    let reference = nested(|| {
        let vars: Vec<Var> = x.iter().map(|&v| Var::new(v)).collect();
        let f = composite(&vars).unwrap();
        gradient(f, &vars).unwrap().to_vec()
    });
    for _ in 0..10 {
        let again = nested(|| {
            let vars: Vec<Var> = x.iter().map(|&v| Var::new(v)).collect();
            let f = composite(&vars).unwrap();
            gradient(f, &vars).unwrap().to_vec()
        });
        let same = again.iter().zip(&reference).all(|(a, b)| a.to_bits() == b.to_bits());
        assert!(same);
    }
}

#[test]
fn test_vjp_equals_weighted_gradients() {
    let x = Var::new(0.4);
    let y = Var::new(-1.3);
    let f1 = x * y + x.exp();
    let f2 = (x - y).square();
    let weights = [0.7, -2.0];

    let combined = vjp(&[f1, f2], &weights, &[x, y]).unwrap().to_vec();
    let g1 = gradient(f1, &[x, y]).unwrap().to_vec();
    let g2 = gradient(f2, &[x, y]).unwrap().to_vec();
    for i in 0..2 {
        assert_relative_eq!(
            combined[i],
            weights[0] * g1[i] + weights[1] * g2[i],
            max_relative = 1e-12
        );
    }
}

#[test]
fn test_callback_node_matches_elementwise_nodes() {
    let values = [0.5, -1.5, 2.0, 3.25];
    let xs: Vec<Var> = values.iter().map(|&v| Var::new(v)).collect();

    let single = squared_norm(&xs);
    let expanded = sum(&xs.iter().map(|x| x.square()).collect::<Vec<_>>());
    assert_eq!(single.value(), expanded.value());

    let g_single = gradient(single, &xs).unwrap().to_vec();
    let g_expanded = gradient(expanded, &xs).unwrap().to_vec();
    assert_eq!(g_single, g_expanded);
}

#[test]
fn test_domain_errors_surface() {
    let x = Var::new(-1.0);
    assert!(matches!(x.ln(), Err(AdError::Domain { function: "log", .. })));
    assert!(matches!(x.sqrt(), Err(AdError::Domain { .. })));
    assert!(matches!(x.powf(0.5), Err(AdError::Domain { .. })));
}
