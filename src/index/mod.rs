//! Index gateways: the lexical (BM25) and vector (ANN) collaborator
//! contracts, with in-memory reference implementations used by tests and
//! single-node deployments.

mod lexical;
mod vector;

pub use lexical::{LexicalHit, LexicalIndex, MemoryLexicalIndex};
pub use vector::{MemoryVectorIndex, VectorHit, VectorIndex, VectorPayload};
