//! # foamnest-core
//!
//! Shared contracts for the foamnest 2-D sheet nesting engine.
//!
//! This crate carries everything the geometry layer and its consumers
//! agree on:
//!
//! - [`NestConfig`] / [`SheetTemplate`] / [`PlacementWeights`]: run
//!   configuration with validation and builder methods
//! - [`GaRunner`]: a generic, minimizing genetic algorithm with elitism,
//!   rank-weighted parent selection and parallel fitness evaluation
//! - [`Placement`] / [`SolveResult`]: the output contract
//! - [`Solver`]: the interface the engine crates implement
//! - [`Error`] / [`Result`]: the common error taxonomy
//!
//! The actual polygon work (ingestion, no-fit polygons, placement) lives
//! in `foamnest-d2`.
//!
//! ## Placement strategies
//!
//! | Strategy | Cost minimized |
//! |----------|----------------|
//! | `Gravity` | weighted bounding-box width + height |
//! | `BoundingBox` | bounding-box area |
//! | `ConvexHull` | convex hull area |
//!
//! ## Example
//!
//! ```
//! use foamnest_core::{NestConfig, PlacementStrategy};
//!
//! let config = NestConfig::default()
//!     .with_strategy(PlacementStrategy::Gravity)
//!     .with_population_size(10)
//!     .with_max_generations(50)
//!     .with_seed(1);
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Feature flags
//!
//! - `serde`: derives `Serialize`/`Deserialize` for configuration and
//!   result types.

pub mod error;
pub mod ga;
pub mod placement;
pub mod result;
pub mod solver;

// Error handling
pub use error::{Error, Result};

// Genetic algorithm framework
pub use ga::{
    GaConfig, GaProblem, GaProgress, GaProgressCallback, GaResult, GaRunner, Individual,
};

// Output contract
pub use placement::Placement;
pub use result::{SolveResult, SolveSummary};

// Configuration and solver interface
pub use solver::{
    NestConfig, PlacementStrategy, PlacementWeights, ProgressCallback, ProgressInfo,
    SheetTemplate, Solver,
};
