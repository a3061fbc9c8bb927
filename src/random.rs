use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Exp, Gamma, Normal as NormalDist};

use crate::error::{EngineError, SimResult};

/// An opaque random-variable source.
///
/// The scheduler never looks inside a sampler; anything producing an `f64`
/// per call qualifies, including plain closures wrapped in [`FromFn`]:
///
/// ```
/// use takt::random::{FromFn, Sampler};
///
/// let mut fixed = FromFn(|| 10.0);
/// assert_eq!(fixed.sample(), 10.0);
/// ```
pub trait Sampler {
    fn sample(&mut self) -> f64;
}

/// Adapts a closure into a [`Sampler`].
#[derive(Debug, Clone)]
pub struct FromFn<F>(pub F);

impl<F: FnMut() -> f64> Sampler for FromFn<F> {
    fn sample(&mut self) -> f64 {
        (self.0)()
    }
}

/// Always the same value. Handy for deterministic schedules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant(pub f64);

impl Sampler for Constant {
    fn sample(&mut self) -> f64 {
        self.0
    }
}

/// Uniform over `[low, high)`.
#[derive(Debug, Clone)]
pub struct Uniform {
    low: f64,
    high: f64,
    rng: StdRng,
}

impl Uniform {
    pub fn new(low: f64, high: f64, seed: u64) -> SimResult<Self> {
        if !(low <= high) {
            return Err(EngineError::InvalidArgument(format!(
                "uniform bounds out of order: [{low}, {high})"
            ))
            .into());
        }
        Ok(Self {
            low,
            high,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl Sampler for Uniform {
    fn sample(&mut self) -> f64 {
        self.low + (self.high - self.low) * self.rng.random::<f64>()
    }
}

/// Triangular over `[min, max]` with the given mode, via inverse CDF.
#[derive(Debug, Clone)]
pub struct Triangular {
    min: f64,
    mode: f64,
    max: f64,
    rng: StdRng,
}

impl Triangular {
    pub fn new(min: f64, mode: f64, max: f64, seed: u64) -> SimResult<Self> {
        if !(min <= mode && mode <= max && min < max) {
            return Err(EngineError::InvalidArgument(format!(
                "triangular parameters out of order: min {min}, mode {mode}, max {max}"
            ))
            .into());
        }
        Ok(Self {
            min,
            mode,
            max,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl Sampler for Triangular {
    fn sample(&mut self) -> f64 {
        let u: f64 = self.rng.random();
        let cut = (self.mode - self.min) / (self.max - self.min);
        if u < cut {
            self.min + ((self.max - self.min) * (self.mode - self.min) * u).sqrt()
        } else {
            self.max - ((self.max - self.min) * (self.max - self.mode) * (1.0 - u)).sqrt()
        }
    }
}

/// Exponential with the given mean.
#[derive(Debug, Clone)]
pub struct Exponential {
    dist: Exp<f64>,
    rng: StdRng,
}

impl Exponential {
    pub fn new(mean: f64, seed: u64) -> SimResult<Self> {
        if !(mean > 0.0 && mean.is_finite()) {
            return Err(EngineError::InvalidArgument(format!(
                "exponential mean must be positive and finite, got {mean}"
            ))
            .into());
        }
        let dist = Exp::new(1.0 / mean).map_err(|e| {
            EngineError::InvalidArgument(format!("exponential mean {mean}: {e}"))
        })?;
        Ok(Self {
            dist,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl Sampler for Exponential {
    fn sample(&mut self) -> f64 {
        self.dist.sample(&mut self.rng)
    }
}

/// Normal with the given mean and standard deviation, truncated at zero so
/// samples stay usable as durations.
#[derive(Debug, Clone)]
pub struct Normal {
    dist: NormalDist<f64>,
    rng: StdRng,
}

impl Normal {
    pub fn new(mean: f64, std_dev: f64, seed: u64) -> SimResult<Self> {
        let dist = NormalDist::new(mean, std_dev).map_err(|e| {
            EngineError::InvalidArgument(format!(
                "normal(mean {mean}, std dev {std_dev}): {e}"
            ))
        })?;
        Ok(Self {
            dist,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl Sampler for Normal {
    fn sample(&mut self) -> f64 {
        self.dist.sample(&mut self.rng).max(0.0)
    }
}

/// Erlang: the sum of `shape` independent exponentials with the given mean,
/// i.e. a Gamma with integer shape.
#[derive(Debug, Clone)]
pub struct Erlang {
    dist: Gamma<f64>,
    rng: StdRng,
}

impl Erlang {
    pub fn new(shape: u32, mean: f64, seed: u64) -> SimResult<Self> {
        let dist = Gamma::new(f64::from(shape), mean).map_err(|e| {
            EngineError::InvalidArgument(format!(
                "erlang(shape {shape}, mean {mean}): {e}"
            ))
        })?;
        Ok(Self {
            dist,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl Sampler for Erlang {
    fn sample(&mut self) -> f64 {
        self.dist.sample(&mut self.rng)
    }
}
