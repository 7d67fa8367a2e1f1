//! Projection onto arbitrage-free prices.
//!
//! - [`constraints`]: the linear system `A·mu = b` of consistent prices
//! - [`bregman`]: exact KL projection solved on the Lagrange dual
//! - [`frank_wolfe`]: bounded conditional-gradient extraction
//! - [`pool`]: semaphore-bounded blocking workers for both

pub mod bregman;
pub mod constraints;
pub mod frank_wolfe;
pub mod pool;

pub use bregman::{
    bregman_projection, kl_divergence, kl_gradient, BregmanProjector, Projection,
};
pub use constraints::LinearConstraints;
pub use frank_wolfe::{extraction_oracle, ExtractionEngine, ExtractionResult};
pub use pool::SolverPool;
