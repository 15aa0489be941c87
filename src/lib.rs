//! Streaming copy/paste pipeline and operator-reference catalog for
//! DocumentDB/MongoDB-compatible collections.
//!
//! The crate is split into two independent halves:
//!
//! - [`copy_paste`]: stream documents from a source collection into a
//!   target collection under a chosen conflict strategy, with keep-alive
//!   read watchdogging, adaptive batch sizing, retry-with-backoff, and a
//!   task supervisor for running several copies concurrently.
//! - [`catalog`]: scrape, merge, and generate the operator reference
//!   catalog consumed by the query-building surface.
//!
//! Both halves depend only on [`document`], [`cancel`], and [`error`].

pub mod cancel;
pub mod catalog;
pub mod copy_paste;
pub mod document;
pub mod error;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use document::{AdaptedDocumentStream, Document, DocumentStream};
pub use error::{Error, ErrorKind, Result, WriterError};
