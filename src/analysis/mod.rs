//! # Graph Analysis
//!
//! Chunk finding over a flow graph snapshot and the node relationships derived from it.

pub mod chunk_finder;
pub mod relationships;

pub use chunk_finder::{
    scan_chunks, Chunk, ChunkFinder, ChunkVisitor, StageChunkFinder, StandardChunkVisitor,
};
pub use relationships::{
    BranchRelationship, NodeRelationship, ParallelRelationship, Relationship, RelationshipMap,
    RelationshipResolver,
};
