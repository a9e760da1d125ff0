//! Live MongoDB loader and extractor behaviour.
//!
//! Runs only when `DOCREL_SYNC_TEST_MONGODB` holds a connection string;
//! otherwise every test returns early.
//!
//! ```bash
//! DOCREL_SYNC_TEST_MONGODB=mongodb://localhost:27017 cargo test --test live_mongodb
//! ```

use docrel_sync_mongodb::{new_mongodb_client, MongoExtractor, MongoLoader};
use mongodb::bson::{doc, Document};
use std::sync::Arc;
use sync_core::{Extractor, Loader, MappingSchema, Offset, Record, Value};

const TEST_DATABASE: &str = "docrel_sync_test";

fn live_mongodb() -> Option<String> {
    match std::env::var("DOCREL_SYNC_TEST_MONGODB") {
        Ok(uri) => Some(uri),
        Err(_) => {
            eprintln!("Skipping: DOCREL_SYNC_TEST_MONGODB not set");
            None
        }
    }
}

fn suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn record(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn users_mapping(s: &str) -> Arc<MappingSchema> {
    let yaml = format!(
        r#"
entity: AppUser
table: users
collection: users_{s}
id: {{ column: id, field: _id, type: int }}
fields:
  - {{ name: userName, column: user_name, field: username, type: string }}
  - {{ name: points, column: points, field: points, type: int }}
relations:
  - name: orders
    kind: one-to-many
    table: orders
    foreign_key: user_id
    field: orders
    fields: [total]
    collection: orders_{s}
"#
    );
    Arc::new(MappingSchema::from_yaml(&yaml).unwrap())
}

#[tokio::test]
async fn test_loader_upserts_and_skips() -> anyhow::Result<()> {
    let Some(uri) = live_mongodb() else {
        return Ok(());
    };
    let s = suffix();
    let mongo = new_mongodb_client(&uri).await?;
    let users = mongo
        .database(TEST_DATABASE)
        .collection::<Document>(&format!("users_{s}"));

    let mut loader = MongoLoader::new(mongo.clone(), TEST_DATABASE, users_mapping(&s));
    let summary = loader
        .load(&[
            record(&[
                ("id", Value::Int(1)),
                ("user_name", Value::String("ann".into())),
                ("points", Value::Int(5)),
            ]),
            // Not an int, so the transform fails
            record(&[("id", Value::Int(2)), ("points", Value::String("lots".into()))]),
            record(&[("user_name", Value::String("nobody".into()))]),
            record(&[("id", Value::Int(3))]),
        ])
        .await?;

    assert_eq!(summary.written, 2);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.matched, 0);
    assert_eq!(users.count_documents(doc! {}).await?, 2);

    let summary = loader
        .load(&[
            record(&[
                ("id", Value::Int(1)),
                ("user_name", Value::String("ann2".into())),
            ]),
            record(&[("id", Value::Int(3))]),
        ])
        .await?;

    assert_eq!(summary.written, 2);
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.matched, 2);
    assert_eq!(summary.updated, 1);

    let ann = users.find_one(doc! { "_id": 1 }).await?.expect("user 1 stored");
    assert_eq!(ann.get_str("username")?, "ann2");
    assert_eq!(ann.get_i32("points")?, 5);
    assert_eq!(
        users.find_one(doc! { "_id": 3 }).await?,
        Some(doc! { "_id": 3 })
    );

    users.drop().await?;
    Ok(())
}

#[tokio::test]
async fn test_extractor_attaches_child_collection() -> anyhow::Result<()> {
    let Some(uri) = live_mongodb() else {
        return Ok(());
    };
    let s = suffix();
    let mongo = new_mongodb_client(&uri).await?;
    let db = mongo.database(TEST_DATABASE);
    let users = db.collection::<Document>(&format!("users_{s}"));
    let orders = db.collection::<Document>(&format!("orders_{s}"));

    users
        .insert_many(vec![
            doc! { "_id": 2, "username": "bob" },
            doc! { "_id": 1, "username": "ann" },
        ])
        .await?;
    orders
        .insert_many(vec![
            doc! { "user_id": 1, "total": 10 },
            doc! { "user_id": 1, "total": 20 },
            doc! { "user_id": 3, "total": 99 },
        ])
        .await?;

    let mut extractor = MongoExtractor::new(&mongo, TEST_DATABASE, users_mapping(&s));
    let batch = extractor.extract(10, &Offset::None).await?;
    assert_eq!(batch.records.len(), 2);
    assert_eq!(batch.next_offset, Offset::Int(2));

    // Sorted by id, children grouped under the relation field
    let ann = &batch.records[0];
    assert_eq!(ann["_id"], Value::Int(1));
    let mut totals: Vec<i64> = ann["orders"]
        .as_array()
        .unwrap()
        .iter()
        .map(|child| child.as_object().unwrap()["total"].as_i64().unwrap())
        .collect();
    totals.sort();
    assert_eq!(totals, vec![10, 20]);

    let bob = &batch.records[1];
    assert_eq!(bob["_id"], Value::Int(2));
    assert_eq!(bob["orders"], Value::Array(vec![]));

    let rest = extractor.extract(10, &batch.next_offset).await?;
    assert!(rest.records.is_empty());
    assert_eq!(rest.next_offset, Offset::Int(2));

    users.drop().await?;
    orders.drop().await?;
    Ok(())
}
