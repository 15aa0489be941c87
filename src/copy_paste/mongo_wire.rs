//! `MongoWireAdapter` (§4.5): the production `DriverAdapter`, grounded
//! in the shape of a wire-protocol driver — issue a command, read back a
//! bulk-write response — but talking through an injected
//! [`WireConnection`] rather than a raw socket, since connection
//! management and authentication are out of scope (§1).

use async_trait::async_trait;
use bson::{doc, Bson, Document as BsonDocument};
use lazy_static::lazy_static;
use regex::Regex;

use crate::document::Document;
use crate::error::{DriverError, ErrorKind};

use super::driver::{DriverAdapter, EnsureTargetResult};
use super::strategy::{BatchResult, ConflictError, ConflictStrategy, PartialProgress};

lazy_static! {
    static ref RATE_LIMIT_MESSAGE: Regex =
        Regex::new(r"(?i)rate limit|throttl|too many requests").expect("valid regex");
    static ref NETWORK_MESSAGE: Regex =
        Regex::new(r"(?i)timeout|network|connection").expect("valid regex");
}

const DUPLICATE_KEY_CODE: i32 = 11000;
const THROTTLE_CODE: i32 = 16500;

/// Driver-level network error codes (§4.5), distinct from the numeric
/// server codes above — these are the string codes an underlying socket
/// layer attaches (`ECONNRESET` et al.), not a MongoDB wire error code.
const NETWORK_ERROR_CODES: &[&str] = &["ECONNRESET", "ETIMEDOUT", "ENOTFOUND", "ENETUNREACH"];

/// The command/response boundary a `MongoWireAdapter` runs over. A real
/// implementation sends a BSON command document on a connection pooled
/// and authenticated elsewhere; this crate only models the command
/// shape, not transport.
#[async_trait]
pub trait WireConnection: Send + Sync {
    async fn run_command(&self, command: BsonDocument) -> Result<BsonDocument, DriverError>;
}

/// A structured view of a driver-thrown wire error, extracted from the
/// textual/code fields a real driver would attach. Constructed by
/// `WireConnection` implementations when `run_command` fails in a way
/// that carries this structure; adapters that can't produce one fall
/// back to message-only classification.
#[derive(Debug, Clone, Default)]
pub struct WireErrorEnvelope {
    pub http_status: Option<u16>,
    pub code: Option<i32>,
    /// The underlying socket-layer error code, when the failure
    /// originated below the wire protocol (`"ECONNRESET"`, `"ETIMEDOUT"`,
    /// ...) rather than as a server-returned numeric `code`.
    pub network_error_code: Option<String>,
    pub message: String,
    pub collided_count: Option<u64>,
    pub matched_count: Option<u64>,
    pub upserted_count: Option<u64>,
}

#[derive(Debug)]
struct WireError(WireErrorEnvelope);

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.message)
    }
}
impl std::error::Error for WireError {}

pub fn wire_error(envelope: WireErrorEnvelope) -> DriverError {
    Box::new(WireError(envelope))
}

pub struct MongoWireAdapter<C: WireConnection> {
    connection: C,
    collection: String,
}

impl<C: WireConnection> MongoWireAdapter<C> {
    pub fn new(connection: C, collection: impl Into<String>) -> Self {
        MongoWireAdapter { connection, collection: collection.into() }
    }

    fn envelope_of(err: &DriverError) -> Option<&WireErrorEnvelope> {
        err.downcast_ref::<WireError>().map(|e| &e.0)
    }

    fn doc_to_bson(doc: &Document) -> BsonDocument {
        let mut payload = doc.payload.clone();
        payload.insert("_id", doc.id.clone());
        payload
    }
}

#[async_trait]
impl<C: WireConnection> DriverAdapter for MongoWireAdapter<C> {
    async fn write_batch(
        &self,
        docs: &[Document],
        strategy: ConflictStrategy,
    ) -> Result<BatchResult, DriverError> {
        match strategy {
            ConflictStrategy::Skip => self.write_skip(docs).await,
            ConflictStrategy::Abort => self.write_abort(docs).await,
            ConflictStrategy::Overwrite => self.write_overwrite(docs).await,
            ConflictStrategy::GenerateNewIds => self.write_generate_new_ids(docs).await,
        }
    }

    /// Classification table for a MongoDB-wire driver (§4.5): status 429
    /// or code 16500 / a rate-limit message -> Throttle; a socket-layer
    /// code in `NETWORK_ERROR_CODES` or a network-shaped message ->
    /// Network; any bulk-write error with code 11000 -> Conflict; else
    /// Other.
    fn classify_error(&self, err: &DriverError) -> ErrorKind {
        let Some(envelope) = Self::envelope_of(err) else {
            return classify_by_message(&err.to_string());
        };

        if envelope.http_status == Some(429) || envelope.code == Some(THROTTLE_CODE) {
            return ErrorKind::Throttle;
        }
        if RATE_LIMIT_MESSAGE.is_match(&envelope.message) {
            return ErrorKind::Throttle;
        }
        if envelope.code == Some(DUPLICATE_KEY_CODE) {
            return ErrorKind::Conflict;
        }
        if let Some(code) = &envelope.network_error_code {
            if NETWORK_ERROR_CODES.contains(&code.as_str()) {
                return ErrorKind::Network;
            }
        }
        classify_by_message(&envelope.message)
    }

    /// Translates the envelope's raw `collidedCount`/`matchedCount`/
    /// `upsertedCount` fields into the semantic fields `writeBatch`
    /// reports partial progress under (§4.5): a collision under Skip
    /// means the document was skipped, not inserted.
    fn extract_partial_progress(&self, err: &DriverError) -> Option<PartialProgress> {
        let envelope = Self::envelope_of(err)?;
        Some(PartialProgress {
            inserted: 0,
            skipped: envelope.collided_count.unwrap_or(0),
            replaced: envelope.matched_count.unwrap_or(0),
            created: envelope.upserted_count.unwrap_or(0),
        })
    }

    async fn ensure_target_exists(&self) -> Result<EnsureTargetResult, DriverError> {
        let response = self
            .connection
            .run_command(doc! { "listCollections": 1, "filter": { "name": &self.collection } })
            .await?;
        let exists = response
            .get_document("cursor")
            .ok()
            .and_then(|cursor| cursor.get_array("firstBatch").ok())
            .map(|batch| !batch.is_empty())
            .unwrap_or(false);
        if exists {
            return Ok(EnsureTargetResult { target_was_created: false });
        }
        self.connection.run_command(doc! { "create": &self.collection }).await?;
        Ok(EnsureTargetResult { target_was_created: true })
    }
}

fn classify_by_message(message: &str) -> ErrorKind {
    if RATE_LIMIT_MESSAGE.is_match(message) {
        ErrorKind::Throttle
    } else if NETWORK_MESSAGE.is_match(message) {
        ErrorKind::Network
    } else {
        ErrorKind::Other
    }
}

impl<C: WireConnection> MongoWireAdapter<C> {
    /// Pre-filter path (§4.5): query for existing IDs, insert only the
    /// complement. Pre-filtering is a performance optimization, not a
    /// guarantee — a race-condition fallback conflict during insert is
    /// parsed and folded into the result rather than thrown.
    async fn write_skip(&self, docs: &[Document]) -> Result<BatchResult, DriverError> {
        let ids: Vec<Bson> = docs.iter().map(|d| d.id.clone()).collect();
        let existing = self
            .connection
            .run_command(doc! {
                "find": &self.collection,
                "filter": { "_id": { "$in": ids } },
                "projection": { "_id": 1 },
            })
            .await?;
        let existing_ids: std::collections::HashSet<String> = existing
            .get_document("cursor")
            .ok()
            .and_then(|cursor| cursor.get_array("firstBatch").ok())
            .into_iter()
            .flatten()
            .filter_map(|b| b.as_document())
            .filter_map(|d| d.get("_id"))
            .map(|id| id.to_string())
            .collect();

        let mut to_insert = Vec::new();
        let mut errors = Vec::new();
        let mut skipped = 0u64;
        for d in docs {
            if existing_ids.contains(&d.id.to_string()) {
                skipped += 1;
                errors.push(ConflictError { id: d.id.clone(), message: format!("duplicate key: {}", d.id) });
            } else {
                to_insert.push(Self::doc_to_bson(d));
            }
        }

        let inserted = if to_insert.is_empty() {
            0
        } else {
            let attempted = to_insert.len() as u64;
            match self
                .connection
                .run_command(doc! { "insert": &self.collection, "documents": to_insert.clone() })
                .await
            {
                Ok(_) => attempted,
                // Pre-filtering is a performance optimization, not a
                // guarantee: a document inserted by someone else between
                // the find and the insert surfaces here as a Conflict.
                // Fold it into the result instead of failing the batch.
                Err(err) if self.classify_error(&err) == ErrorKind::Conflict => {
                    let race_collisions = Self::envelope_of(&err)
                        .and_then(|e| e.collided_count)
                        .unwrap_or(1)
                        .min(attempted);
                    skipped += race_collisions;
                    errors.push(ConflictError {
                        id: Bson::Null,
                        message: format!("duplicate key during insert race: {race_collisions} document(s)"),
                    });
                    attempted - race_collisions
                }
                Err(err) => return Err(err),
            }
        };

        Ok(BatchResult::Skip { inserted, skipped, processed: inserted + skipped, errors })
    }

    /// Ordered insert (§4.5): on the first duplicate-key error, stop and
    /// report the conflicting document's ID plus the count inserted
    /// before it.
    async fn write_abort(&self, docs: &[Document]) -> Result<BatchResult, DriverError> {
        let mut inserted = 0u64;
        for d in docs {
            match self
                .connection
                .run_command(doc! { "insert": &self.collection, "documents": [Self::doc_to_bson(d)] })
                .await
            {
                Ok(_) => inserted += 1,
                Err(err) if self.classify_error(&err) == ErrorKind::Conflict => {
                    return Ok(BatchResult::Abort {
                        inserted,
                        aborted: 1,
                        processed: inserted + 1,
                        errors: vec![ConflictError {
                            id: d.id.clone(),
                            message: format!("E11000 duplicate key: {}", d.id),
                        }],
                    });
                }
                Err(err) => return Err(err),
            }
        }
        Ok(BatchResult::Abort { inserted, aborted: 0, processed: inserted, errors: vec![] })
    }

    /// Ordered bulk of replace-with-upsert operations (§4.5).
    async fn write_overwrite(&self, docs: &[Document]) -> Result<BatchResult, DriverError> {
        let updates: Vec<Bson> = docs
            .iter()
            .map(|d| {
                Bson::Document(doc! {
                    "q": { "_id": d.id.clone() },
                    "u": Self::doc_to_bson(d),
                    "upsert": true,
                })
            })
            .collect();
        let response = self
            .connection
            .run_command(doc! { "update": &self.collection, "updates": updates, "ordered": true })
            .await?;
        let replaced = response.get_i64("nMatched").unwrap_or(0).max(0) as u64;
        let created = response.get_i64("nUpserted").unwrap_or(0).max(0) as u64;
        Ok(BatchResult::Overwrite { replaced, created, processed: replaced + created, errors: vec![] })
    }

    /// Strips each document's `_id`, preserves the original under
    /// `_original_id` (or `_original_id_N` if that key is already taken
    /// by the document's own payload), and inserts (§4.5).
    async fn write_generate_new_ids(&self, docs: &[Document]) -> Result<BatchResult, DriverError> {
        let mut to_insert = Vec::with_capacity(docs.len());
        for d in docs {
            let mut payload = d.payload.clone();
            let key = original_id_key(&payload);
            payload.insert(key, d.id.clone());
            to_insert.push(payload);
        }
        self.connection
            .run_command(doc! { "insert": &self.collection, "documents": to_insert.clone() })
            .await?;
        Ok(BatchResult::GenerateNewIds {
            inserted: to_insert.len() as u64,
            processed: to_insert.len() as u64,
            errors: vec![],
        })
    }
}

fn original_id_key(payload: &BsonDocument) -> String {
    if !payload.contains_key("_original_id") {
        return "_original_id".to_string();
    }
    let mut n = 1u32;
    loop {
        let candidate = format!("_original_id_{n}");
        if !payload.contains_key(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use std::sync::Mutex;

    struct ScriptedConnection {
        responses: Mutex<Vec<Result<BsonDocument, WireErrorEnvelope>>>,
    }

    #[async_trait]
    impl WireConnection for ScriptedConnection {
        async fn run_command(&self, _command: BsonDocument) -> Result<BsonDocument, DriverError> {
            match self.responses.lock().unwrap().remove(0) {
                Ok(doc) => Ok(doc),
                Err(envelope) => Err(wire_error(envelope)),
            }
        }
    }

    fn adapter(responses: Vec<Result<BsonDocument, WireErrorEnvelope>>) -> MongoWireAdapter<ScriptedConnection> {
        MongoWireAdapter::new(ScriptedConnection { responses: Mutex::new(responses) }, "target")
    }

    #[test]
    fn classifies_throttle_network_and_conflict() {
        let a = adapter(vec![]);
        let throttle = wire_error(WireErrorEnvelope { http_status: Some(429), ..Default::default() });
        assert_eq!(a.classify_error(&throttle), ErrorKind::Throttle);

        let network = wire_error(WireErrorEnvelope { network_error_code: Some("ETIMEDOUT".into()), ..Default::default() });
        assert_eq!(a.classify_error(&network), ErrorKind::Network);

        let conflict = wire_error(WireErrorEnvelope { code: Some(11000), ..Default::default() });
        assert_eq!(a.classify_error(&conflict), ErrorKind::Conflict);
    }

    #[test]
    fn original_id_key_avoids_collisions() {
        let payload = doc! { "_original_id": 1, "_original_id_1": 2 };
        assert_eq!(original_id_key(&payload), "_original_id_2");
    }

    #[tokio::test]
    async fn skip_inserts_complement_of_existing_ids() {
        let a = adapter(vec![
            Ok(doc! { "cursor": { "firstBatch": [ { "_id": 2 } ] } }),
            Ok(doc! { "n": 1 }),
        ]);
        let docs = vec![
            Document::new(Bson::Int32(1), doc! {}),
            Document::new(Bson::Int32(2), doc! {}),
        ];
        let result = a.write_batch(&docs, ConflictStrategy::Skip).await.unwrap();
        match result {
            BatchResult::Skip { inserted, skipped, .. } => {
                assert_eq!(inserted, 1);
                assert_eq!(skipped, 1);
            }
            _ => panic!("expected Skip"),
        }
    }

    #[tokio::test]
    async fn skip_folds_race_condition_conflict_from_insert_instead_of_failing() {
        let a = adapter(vec![
            Ok(doc! { "cursor": { "firstBatch": [] } }),
            Err(WireErrorEnvelope { code: Some(11000), collided_count: Some(1), ..Default::default() }),
        ]);
        let docs = vec![
            Document::new(Bson::Int32(1), doc! {}),
            Document::new(Bson::Int32(2), doc! {}),
        ];
        let result = a.write_batch(&docs, ConflictStrategy::Skip).await.unwrap();
        match result {
            BatchResult::Skip { inserted, skipped, processed, errors } => {
                assert_eq!(inserted, 1);
                assert_eq!(skipped, 1);
                assert_eq!(processed, 2);
                assert_eq!(errors.len(), 1);
            }
            _ => panic!("expected Skip"),
        }
    }
}
