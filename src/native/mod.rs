//! Native (ahead-of-time) builds across the build matrix.
//!
//! # Module Structure
//!
//! - `builder` - One target in one fresh environment
//! - `aggregate` - Every selected target, concurrently, merged by target
//! - `output` - Artifacts and the merged output directory

mod aggregate;
mod builder;
mod output;

pub use aggregate::{AggregateBuilder, AggregateReport, FailurePolicy};
pub use builder::NativeBuilder;
pub use output::{ArtifactFile, OutputDirectory};
