use crate::error::StoreError;
use crate::model::job::Network;
use async_trait::async_trait;
use bson::doc;
use mongodb::options::FindOneOptions;
use mongodb::{Collection, Database};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Contract shared by the three snapshot kinds (spec §4.A Snapshot Store).
///
/// `append` is write-only — there is no update-in-place, matching the
/// "Snapshot is immutable once written" invariant in spec §3. `latest`
/// always selects by `timestamp DESC limit 1`, which is what makes
/// concurrent appends for the same (kind, entity, network) safe per §4.A's
/// guarantee.
#[async_trait]
pub trait SnapshotStore<S>: Send + Sync {
    async fn latest(&self, entity_address: &str, network: Network) -> Result<Option<S>, StoreError>;
    async fn append(&self, snapshot: &S) -> Result<(), StoreError>;
    async fn count(&self, network: Network) -> Result<u64, StoreError>;
}

/// MongoDB-backed implementation, one collection per snapshot kind.
pub struct MongoSnapshotStore<S> {
    collection: Collection<S>,
}

impl<S> MongoSnapshotStore<S>
where
    S: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    pub fn new(db: &Database, collection_name: &str) -> Self {
        Self {
            collection: db.collection(collection_name),
        }
    }
}

#[async_trait]
impl<S> SnapshotStore<S> for MongoSnapshotStore<S>
where
    S: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    async fn latest(&self, entity_address: &str, network: Network) -> Result<Option<S>, StoreError> {
        let filter = doc! {
            "entity_address": entity_address,
            "network": network.as_str(),
        };
        let opts = FindOneOptions::builder()
            .sort(doc! { "timestamp": -1 })
            .build();
        let found = self.collection.find_one(filter, opts).await?;
        Ok(found)
    }

    async fn append(&self, snapshot: &S) -> Result<(), StoreError> {
        self.collection.insert_one(snapshot, None).await?;
        Ok(())
    }

    async fn count(&self, network: Network) -> Result<u64, StoreError> {
        let filter = doc! { "network": network.as_str() };
        let n = self.collection.count_documents(filter, None).await?;
        Ok(n)
    }
}

/// In-memory fake used by the test suite (spec §8 scenarios do not require a
/// live MongoDB). Keeps the same latest-by-timestamp semantics as the real
/// store.
#[cfg(any(test, feature = "test-fakes"))]
pub mod fake {
    use super::*;
    use std::sync::Mutex;

    pub struct InMemorySnapshotStore<S> {
        items: Mutex<Vec<(String, Network, chrono::DateTime<chrono::Utc>, S)>>,
        entity_of: fn(&S) -> (&str, Network, chrono::DateTime<chrono::Utc>),
    }

    impl<S: Clone> InMemorySnapshotStore<S> {
        pub fn new(entity_of: fn(&S) -> (&str, Network, chrono::DateTime<chrono::Utc>)) -> Self {
            Self {
                items: Mutex::new(Vec::new()),
                entity_of,
            }
        }
    }

    #[async_trait]
    impl<S: Clone + Send + Sync> SnapshotStore<S> for InMemorySnapshotStore<S> {
        async fn latest(&self, entity_address: &str, network: Network) -> Result<Option<S>, StoreError> {
            let items = self.items.lock().unwrap();
            Ok(items
                .iter()
                .filter(|(addr, net, _, _)| addr == entity_address && *net == network)
                .max_by_key(|(_, _, ts, _)| *ts)
                .map(|(_, _, _, s)| s.clone()))
        }

        async fn append(&self, snapshot: &S) -> Result<(), StoreError> {
            let (addr, net, ts) = (self.entity_of)(snapshot);
            self.items
                .lock()
                .unwrap()
                .push((addr.to_string(), net, ts, snapshot.clone()));
            Ok(())
        }

        async fn count(&self, network: Network) -> Result<u64, StoreError> {
            let items = self.items.lock().unwrap();
            Ok(items.iter().filter(|(_, net, _, _)| *net == network).count() as u64)
        }
    }
}
