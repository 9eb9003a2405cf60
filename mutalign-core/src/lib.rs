//! Sequence alphabets, packed mutations, pairwise and k-mer based alignment, mutation
//! aggregation and a reference-preserving binary serialization layer.

#[macro_use]
mod par;

pub mod align;
pub mod alphabets;
pub mod error;
pub mod external;
pub mod kaligner;
pub mod motif;
pub mod mutations;
pub mod primitivio;
pub mod seq;
