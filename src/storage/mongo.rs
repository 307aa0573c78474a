//! MongoDB document store

use super::{DocumentStore, WriteAck};
use crate::{config::MongoSettings, error::Result, models::SpeedTestRecord};
use async_trait::async_trait;
use mongodb::{
    bson::{self, doc, Document},
    options::Acknowledgment,
    Client, Collection,
};

pub const DATABASE_NAME: &str = "services";
pub const COLLECTION_NAME: &str = "speed_results";

/// `services.speed_results` on the configured deployment
pub struct MongoStore {
    collection: Collection<Document>,
}

impl MongoStore {
    /// Open a client for the configured DSN
    pub async fn connect(settings: &MongoSettings) -> Result<Self> {
        let client = Client::with_uri_str(&settings.dsn).await?;
        Ok(Self::from_client(&client))
    }

    pub fn from_client(client: &Client) -> Self {
        let collection = client
            .database(DATABASE_NAME)
            .collection::<Document>(COLLECTION_NAME);
        Self { collection }
    }

    /// False only for an explicit `w: 0` write concern
    pub fn acknowledges_writes(&self) -> bool {
        !matches!(
            self.collection.write_concern().and_then(|wc| wc.w.as_ref()),
            Some(Acknowledgment::Nodes(0))
        )
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert_record(&self, record: &SpeedTestRecord) -> Result<WriteAck> {
        let document = record_document(record)?;
        self.collection.insert_one(document).await?;

        Ok(if self.acknowledges_writes() {
            WriteAck::Acknowledged
        } else {
            WriteAck::Unacknowledged
        })
    }
}

/// `{test_time, execution_time, data}` as stored
pub fn record_document(record: &SpeedTestRecord) -> Result<Document> {
    Ok(doc! {
        "test_time": bson::DateTime::from_millis(record.test_time.timestamp_millis()),
        "execution_time": record.execution_time,
        "data": bson::to_bson(&record.data)?,
    })
}
