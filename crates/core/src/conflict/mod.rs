//! Descriptor conflict scanning, classification and repair.
//!
//! The conflict subsystem is responsible for:
//! 1. **Scanning** -- splitting a conflicted file into text and marker-delimited regions.
//! 2. **Matching** -- deciding which conflicted paths are descriptor files.
//! 3. **Resolution** -- repairing version-only regions, escalating everything else.

pub mod descriptor;
pub mod resolver;
pub mod scanner;

pub use descriptor::DescriptorMatcher;
pub use resolver::{
    DescriptorConflictResolver, DescriptorResolution, EscalationReason, ResolutionOutcome,
    ResolveContext, ResolvedFile, Side, VersionPrecedence,
};
pub use scanner::{Classification, ConflictDocument, ConflictRegion, VersionConflict};
