pub mod aggregated;
pub mod codec;
pub mod mutation;
#[allow(clippy::module_inception)]
pub mod mutations;
pub mod nt2aa;

pub use aggregated::{
    AggregatedMutations, AggregatedMutationsBuilder, Consensus, MutationsFilter, QualityProvider,
    SimpleMutationsFilter,
};
pub use codec::{btop_decode, check, decode, encode, encode_fixed};
pub use mutation::{Mutation, MutationType};
pub use mutations::{Mutations, MutationsBuilder};
pub use nt2aa::nt2aa;

#[cfg(test)]
mod tests;
