//! Parallel elementwise construction.
//!
//! Applies a differentiable function to every position of one or more
//! equally sized argument slices, spreading the work over rayon workers.
//!
//! Each element is differentiated on its worker's own thread-local tape,
//! inside a nested context that is gone before the task finishes. Only plain
//! numbers cross threads: operand values in, `(value, partials)` out. The
//! calling thread then appends one precomputed node per element in flat index
//! order, so the node sequence (and every later reverse pass) is the same no
//! matter which worker finished first.
//!
//! # Example
//!
//! ```
//! use adtape::{Var, gradient, parallel_map, sum};
//!
//! let xs: Vec<Var> = (0..100).map(|i| Var::new(i as f64 * 0.01)).collect();
//! let ys = parallel_map(&[&xs], |v| Ok(v[0].square())).unwrap();
//! let total = sum(&ys);
//! let g = gradient(total, &xs).unwrap();
//! assert!((g.to_vec()[10] - 0.2).abs() < 1e-12);
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use log::{debug, warn};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::backward::gradient;
use crate::config::ParallelConfig;
use crate::domain::check_same_len;
use crate::error::{AdError, ElementFailure};
use crate::nested::nested;
use crate::node::{NodeId, Op};
use crate::tape::with_tape;
use crate::var::Var;

/// Operand values of one element, in argument order.
type Inputs = SmallVec<[f64; 4]>;

/// What a worker sends back for one element.
#[derive(Debug)]
struct ElementResult {
    value: f64,
    partials: Inputs,
}

/// Apply `f` to every position of `args` with the default [`ParallelConfig`].
///
/// `f` receives one handle per argument slice and returns the element's
/// result. See [`parallel_map_with`].
pub fn parallel_map<F>(args: &[&[Var]], f: F) -> Result<Vec<Var>, AdError>
where
    F: Fn(&[Var]) -> Result<Var, AdError> + Sync,
{
    parallel_map_with(&ParallelConfig::default(), args, f)
}

/// Apply `f` to every position of `args`, returning one handle per position.
///
/// Inside `f` the inputs are fresh leaves on the executing thread's tape;
/// handles created there are confined to that call.
///
/// # Errors
///
/// - [`AdError::ShapeMismatch`] if the argument slices differ in length.
/// - [`AdError::StaleVar`] if any argument is stale.
/// - [`AdError::Parallel`] if any element failed or panicked. Every element
///   still runs to completion, failures are listed by index, and nothing is
///   written to the tape.
/// - [`AdError::ThreadPool`] if a dedicated pool was requested and could not
///   be built.
pub fn parallel_map_with<F>(
    config: &ParallelConfig,
    args: &[&[Var]],
    f: F,
) -> Result<Vec<Var>, AdError>
where
    F: Fn(&[Var]) -> Result<Var, AdError> + Sync,
{
    let Some(first) = args.first() else {
        return Ok(Vec::new());
    };
    let len = first.len();
    for arg in &args[1..] {
        check_same_len(len, arg.len())?;
    }

    let (operands, inputs) = snapshot(args, len)?;
    let evaluate = |index: usize| evaluate_element(&f, &inputs[index]);

    let results: Vec<Result<ElementResult, AdError>> = if len < config.min_parallel_len {
        debug!("parallel region over {len} elements running sequentially");
        (0..len).map(evaluate).collect()
    } else if let Some(num_threads) = config.num_threads {
        debug!("parallel region over {len} elements on a dedicated pool of {num_threads}");
        let run = || -> Vec<Result<ElementResult, AdError>> {
            (0..len).into_par_iter().map(evaluate).collect()
        };
        match config.pool.get() {
            Some(pool) if pool.current_num_threads() == num_threads => pool.install(run),
            Some(_) => {
                // num_threads was changed on a config whose pool is cached.
                ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build()?
                    .install(run)
            }
            None => {
                let pool = ThreadPoolBuilder::new().num_threads(num_threads).build()?;
                config.pool.get_or_init(|| pool).install(run)
            }
        }
    } else {
        debug!(
            "parallel region over {len} elements on {} threads",
            rayon::current_num_threads()
        );
        (0..len).into_par_iter().map(evaluate).collect()
    };

    let mut completed = Vec::with_capacity(len);
    let mut failures = Vec::new();
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(element) => completed.push(element),
            Err(error) => failures.push(ElementFailure { index, error }),
        }
    }
    if !failures.is_empty() {
        warn!("{} of {len} elements failed in parallel region", failures.len());
        return Err(AdError::Parallel {
            total: len,
            failures,
        });
    }

    Ok(with_tape(|t| {
        completed
            .into_iter()
            .zip(operands)
            .map(|(element, ids)| {
                t.push(
                    element.value,
                    Op::Precomputed {
                        operands: ids.into_iter().collect(),
                        partials: element.partials.into_iter().collect(),
                    },
                )
            })
            .collect()
    }))
}

/// Resolve every argument on the calling thread, grouping ids and values
/// per element.
#[allow(clippy::type_complexity)]
fn snapshot(
    args: &[&[Var]],
    len: usize,
) -> Result<(Vec<SmallVec<[NodeId; 4]>>, Vec<Inputs>), AdError> {
    with_tape(|t| {
        let mut operands = Vec::with_capacity(len);
        let mut inputs = Vec::with_capacity(len);
        for index in 0..len {
            let mut ids = SmallVec::new();
            let mut values = Inputs::new();
            for arg in args {
                let var = arg[index];
                values.push(t.node(var)?.value());
                ids.push(var.id());
            }
            operands.push(ids);
            inputs.push(values);
        }
        Ok((operands, inputs))
    })
}

/// Differentiate one element on the current thread's tape.
fn evaluate_element<F>(f: &F, inputs: &[f64]) -> Result<ElementResult, AdError>
where
    F: Fn(&[Var]) -> Result<Var, AdError>,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        nested(|| {
            let leaves: SmallVec<[Var; 4]> = inputs.iter().map(|&x| Var::new(x)).collect();
            let output = f(&leaves)?;
            let value = output.try_value()?;
            let grads = gradient(output, &leaves)?;
            Ok(ElementResult {
                value,
                partials: grads.iter().map(|(_, g)| g).collect(),
            })
        })
    }));
    outcome.unwrap_or_else(|payload| {
        Err(AdError::WorkerPanic {
            message: panic_message(payload.as_ref()),
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// `exp` applied to every element of `xs`.
pub fn exp_all(xs: &[Var]) -> Result<Vec<Var>, AdError> {
    parallel_map(&[xs], |v| Ok(v[0].exp()))
}

/// `inv_logit` applied to every element of `xs`.
pub fn inv_logit_all(xs: &[Var]) -> Result<Vec<Var>, AdError> {
    parallel_map(&[xs], |v| Ok(v[0].inv_logit()))
}
