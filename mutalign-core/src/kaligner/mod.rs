//! Seed-and-cluster aligner for many queries against a fixed reference set.
//!
//! Seeds of the query are looked up in a k-mer index, hits are clustered per reference by
//! [`OffsetPacksAccumulator`], nearby islands are chained, and only the surviving chains are
//! extended with dynamic programming.

pub mod accumulator;
pub mod aligner;
pub mod index;
pub mod params;

pub use accumulator::{Island, OffsetPacksAccumulator};
pub use aligner::{KAligner, KAlignmentHit, KAlignmentResult};
pub use index::{KmerHit, KmerIndex, Seeds};
pub use params::KAlignerParameters;
