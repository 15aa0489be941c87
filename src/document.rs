//! The opaque document type the pipeline moves around.
//!
//! The pipeline never inspects `payload` beyond measuring its serialized
//! size for memory accounting (§4.4 flush-threshold bytes estimate).

use async_trait::async_trait;
use bson::{Bson, Document as BsonDocument};
use futures::Stream;
use tokio_stream::StreamExt;

/// A single record: an identifier of database-native type plus an
/// opaque content payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: Bson,
    pub payload: BsonDocument,
}

impl Document {
    pub fn new(id: Bson, payload: BsonDocument) -> Self {
        Document { id, payload }
    }

    /// UTF-16-safe estimate of this document's serialized size: twice the
    /// length of the BSON-serialized payload. Falls back to 1024
    /// bytes/doc when serialization itself fails, per §4.4.
    pub fn estimated_byte_len(&self) -> usize {
        match bson::to_vec(&self.payload) {
            Ok(bytes) => bytes.len() * 2,
            Err(_) => 1024,
        }
    }
}

/// A lazy, single-pass, finite sequence of `Document`s with an explicit
/// cancellation hook. The emitting side is the source database cursor;
/// implementations are free to perform network I/O inside `next`.
#[async_trait]
pub trait DocumentStream: Send {
    /// Returns the next document, or `None` once the stream is
    /// exhausted. Implementations should return `None` permanently once
    /// they have done so once (single-pass).
    async fn next(&mut self) -> Option<Document>;

    /// Invoked once on completion or cancellation. Default is a no-op;
    /// cursor-backed implementations should use this to release their
    /// underlying server-side cursor.
    fn release(&mut self) {}
}

/// An in-memory stream used by tests and by the two Core B binaries'
/// smoke fixtures. Not part of the production driver surface.
pub struct VecDocumentStream {
    docs: std::vec::IntoIter<Document>,
    released: bool,
}

impl VecDocumentStream {
    pub fn new(docs: Vec<Document>) -> Self {
        VecDocumentStream {
            docs: docs.into_iter(),
            released: false,
        }
    }
}

#[async_trait]
impl DocumentStream for VecDocumentStream {
    async fn next(&mut self) -> Option<Document> {
        self.docs.next()
    }

    fn release(&mut self) {
        self.released = true;
    }
}

/// Adapts any pinned, boxed `futures::Stream` of documents into a
/// `DocumentStream`, for driver cursor implementations that are
/// naturally expressed as combinator-built streams rather than
/// hand-rolled `next()` state machines.
pub struct AdaptedDocumentStream {
    inner: std::pin::Pin<Box<dyn Stream<Item = Document> + Send>>,
}

impl AdaptedDocumentStream {
    pub fn new(stream: impl Stream<Item = Document> + Send + 'static) -> Self {
        AdaptedDocumentStream { inner: Box::pin(stream) }
    }
}

#[async_trait]
impl DocumentStream for AdaptedDocumentStream {
    async fn next(&mut self) -> Option<Document> {
        StreamExt::next(&mut self.inner).await
    }
}
