//! Named, independently seeded random number streams.
//!
//! Every stream is identified by a zero-sized type implementing [`RngId`], normally declared with
//! [`define_rng!`]. A stream is created lazily the first time it is sampled and is seeded from
//! the base seed of the run plus a hash of its name, so adding draws to one stream never shifts
//! the values produced by another. Two stores with the same base seed produce identical draws.
mod macros;

use std::any::{Any, TypeId};
use std::cell::{RefCell, RefMut};

use log::trace;
use rand::distr::Distribution;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::Poisson;

pub use macros::define_rng;

use crate::error::SimError;
use crate::hashing::{hash_str, HashMap, HashMapExt};

pub trait RngId: Copy + Clone + 'static {
    type RngType: SeedableRng + RngCore + 'static;
    fn get_name() -> &'static str;
}

// This is a wrapper that allows for future support for different types of
// random number generators (anything that implements SeedableRng is valid).
struct RngHolder {
    rng: Box<dyn Any>,
}

/// Holds the base seed and the lazily created streams of one simulation run.
///
/// The streams are kept in a `RefCell` so that entities can draw through a shared reference to
/// the store while the model lends out mutable references to its entities.
pub struct RngStore {
    base_seed: u64,
    rng_holders: RefCell<HashMap<TypeId, RngHolder>>,
}

impl RngStore {
    #[must_use]
    pub fn new(base_seed: u64) -> Self {
        trace!("initializing random streams with base seed {base_seed}");
        RngStore {
            base_seed,
            rng_holders: RefCell::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    fn get_rng<R: RngId>(&self) -> RefMut<'_, R::RngType> {
        let rng_holders = self.rng_holders.borrow_mut();
        RefMut::map(rng_holders, |holders| {
            holders
                .entry(TypeId::of::<R>())
                // Create a new rng holder if it doesn't exist yet
                .or_insert_with(|| {
                    trace!(
                        "creating new RNG {} (seed={})",
                        R::get_name(),
                        self.base_seed
                    );
                    let seed_offset = hash_str(R::get_name());
                    RngHolder {
                        rng: Box::new(R::RngType::seed_from_u64(
                            self.base_seed.wrapping_add(seed_offset),
                        )),
                    }
                })
                .rng
                .downcast_mut::<R::RngType>()
                .expect("rng holder type matches its RngId")
        })
    }

    /// Applies `sampler` to the stream associated with `R`.
    pub fn sample<R: RngId, T>(
        &self,
        _rng_id: R,
        sampler: impl FnOnce(&mut R::RngType) -> T,
    ) -> T {
        let mut rng = self.get_rng::<R>();
        sampler(&mut rng)
    }

    /// Draws a sample from `distribution` using the stream associated with `R`.
    pub fn sample_distr<R: RngId, T>(&self, _rng_id: R, distribution: impl Distribution<T>) -> T {
        let mut rng = self.get_rng::<R>();
        distribution.sample(&mut *rng)
    }

    /// Draws from the uniform distribution on `[0, 1)`.
    pub fn sample_uniform<R: RngId>(&self, rng_id: R) -> f64 {
        self.sample(rng_id, |rng| rng.random::<f64>())
    }

    /// Draws an event count from a Poisson distribution with the given mean. A zero mean always
    /// yields zero without consuming randomness.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::NumericalInstability`] if `mean` is negative or not finite.
    pub fn sample_poisson<R: RngId>(&self, rng_id: R, mean: f64) -> Result<u64, SimError> {
        if !mean.is_finite() || mean < 0.0 {
            return Err(SimError::NumericalInstability(format!(
                "Poisson mean must be finite and non-negative, got {mean}"
            )));
        }
        if mean == 0.0 {
            return Ok(0);
        }
        let poisson = Poisson::new(mean)
            .map_err(|e| SimError::NumericalInstability(format!("Poisson({mean}): {e}")))?;
        let count: f64 = self.sample_distr(rng_id, poisson);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = count as u64;
        Ok(count)
    }
}
