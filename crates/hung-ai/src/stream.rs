//! Streaming chunk types and utilities

use std::pin::Pin;

use tokio_stream::Stream;

use crate::error::Result;

/// A stream of incremental text fragments.
///
/// Fragments arrive in order; an `Err` item ends the stream.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Build a chunk stream from already-known fragments
pub fn from_chunks<I>(chunks: I) -> ChunkStream
where
    I: IntoIterator<Item = Result<String>>,
    I::IntoIter: Send + Unpin + 'static,
{
    Box::pin(tokio_stream::iter(chunks))
}
