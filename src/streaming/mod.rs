//! Streamed response handling
//!
//! - [`chunk`] defines the chunk wire shape and ordered chunk queues.
//! - [`ingest`] folds chunks into the message store.

pub mod chunk;
pub mod ingest;

pub use chunk::{chunk_channel, ChunkMetadata, ChunkSender, ChunkStream, ChunkType, StreamChunk};
pub use ingest::{
    ChunkOutcome, ConsumeSummary, Stopper, StreamContext, StreamIngestor, StreamOutcome,
};
