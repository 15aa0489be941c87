//! Exercises the public `write_all` entry point over `MongoWireAdapter`
//! and a scripted `WireConnection`, end to end, for the Skip strategy's
//! pre-filter-then-insert path.

use std::sync::Mutex;

use async_trait::async_trait;
use bson::{doc, Bson, Document as BsonDocument};
use docdb_pipeline::copy_paste::{
    wire_error, write_all, ConflictStrategy, MongoWireAdapter, WireConnection, WireErrorEnvelope,
};
use docdb_pipeline::document::VecDocumentStream;
use docdb_pipeline::error::DriverError;
use docdb_pipeline::{CancelToken, Document};

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

#[tokio::test]
async fn write_all_skips_existing_ids_through_mongo_wire_adapter() {
    let connection = ScriptedConnection {
        responses: Mutex::new(vec![
            Ok(doc! { "cursor": { "firstBatch": [ { "_id": 2 } ] } }),
            Ok(doc! { "n": 2 }),
        ]),
    };
    let adapter = MongoWireAdapter::new(connection, "orders");

    let docs = vec![
        Document::new(Bson::Int32(1), doc! { "item": "a" }),
        Document::new(Bson::Int32(2), doc! { "item": "b" }),
    ];
    let stream = VecDocumentStream::new(docs);

    let stats = write_all(&adapter, ConflictStrategy::Skip, Box::new(stream), CancelToken::never(), |_, _| {})
        .await
        .unwrap();

    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.total_processed, 2);
}
