//! # Foamnest 2D
//!
//! Irregular 2-D nesting for the foamnest sheet-cutting engine.
//!
//! This crate places polygonal parts on rectangular foam sheets using
//! no-fit polygons (NFPs) computed from Minkowski sums, a greedy
//! bottom-left decoder that can seat small parts inside the holes of
//! larger ones, and a genetic optimizer over placement order and
//! rotation.
//!
//! ## Features
//!
//! - Polygon outlines with holes, cleaned and offset at ingestion
//! - Exact NFP computation via `i_overlay` boolean operations
//! - Content-addressed NFP cache shared across the whole run
//! - Gravity, bounding-box and convex-hull placement strategies
//! - Hole fitting with rotation trials and alignment scoring
//! - Multi-sheet allocation with per-sheet utilization
//! - Genetic search with group-linked rotations and early cancel
//!
//! ## Quick Start
//!
//! ```rust
//! use foamnest_d2::{Nester, RawPart};
//! use foamnest_core::NestConfig;
//!
//! let config = NestConfig::default()
//!     .with_population_size(4)
//!     .with_max_generations(2)
//!     .with_seed(7);
//!
//! let rect = RawPart::new(
//!     "panel",
//!     vec![vec![(0.0, 0.0), (100.0, 0.0), (100.0, 50.0), (0.0, 50.0)]],
//! )
//! .with_quantity(3);
//!
//! let nester = Nester::new(config).unwrap();
//! let result = nester.nest(&[rect]).unwrap();
//!
//! println!(
//!     "placed {} parts on {} sheets, utilization {:.1}%",
//!     result.placements.len(),
//!     result.sheets_used,
//!     result.utilization * 100.0
//! );
//! ```
//!
//! ## Part Creation
//!
//! ```rust
//! use foamnest_d2::RawPart;
//!
//! // First path is the exterior, the rest are holes.
//! let frame = RawPart::new(
//!     "frame",
//!     vec![
//!         vec![(0.0, 0.0), (80.0, 0.0), (80.0, 80.0), (0.0, 80.0)],
//!         vec![(20.0, 20.0), (60.0, 20.0), (60.0, 60.0), (20.0, 60.0)],
//!     ],
//! )
//! .with_quantity(2)
//! .with_group("frames");
//! ```

pub mod allocate;
pub mod boolean;
pub mod ga_nesting;
pub mod geometry;
pub mod ingest;
pub mod nester;
pub mod nfp;
pub mod placement;

// Re-exports
pub use allocate::{allocate, AllocationOutcome};
pub use ga_nesting::{expand_instances, run_nest_ga, GenomeMeta, NestIndividual, NestProblem};
pub use geometry::{Bounds, Part, Point, Polygon, Sheet};
pub use ingest::{ingest, sheet_from_polygon, RawPart};
pub use nester::Nester;
pub use nfp::{inner_nfp, outer_nfp, Nfp, NfpCache, NfpKey};
pub use placement::{place_on_sheet, NestInstance, PlacedInstance};
pub use foamnest_core::{
    Error, NestConfig, Placement, PlacementStrategy, PlacementWeights, ProgressCallback,
    ProgressInfo, Result, SheetTemplate, SolveResult, SolveSummary, Solver,
};
