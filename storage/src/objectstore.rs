//! S3-compatible backend on top of the `object_store` crate — same logical
//! key layout as the filesystem backend, but addressed as object-store
//! paths. Multi-get is batched and bounded at 50 concurrent requests via
//! `buffer_unordered`, matching the contract's batched-GET requirement.
use crate::retry::with_retry;
use crate::{keys, ChangeLogEntry, StorageBackend, StorageStatus};
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use vex_types::{Error, Metadata, Noun, NounId, NounKind, Result, RetryConfig, S3Config, Verb, VerbId, VerbKind};

const MAX_CONCURRENT_GETS: usize = 50;

pub struct ObjectStoreBackend {
    store: Box<dyn ObjectStore>,
    retry: RetryConfig,
}

impl ObjectStoreBackend {
    pub fn new(config: &S3Config, retry: RetryConfig) -> Result<Self> {
        let mut builder = AmazonS3Builder::new();
        if let Some(bucket) = &config.bucket {
            builder = builder.with_bucket_name(bucket);
        }
        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(key) = &config.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(secret) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        let store = builder
            .build()
            .map_err(|e| Error::StoragePermanent(format!("object store config: {e}")))?;
        Ok(Self {
            store: Box::new(store),
            retry,
        })
    }

    fn classify(err: object_store::Error) -> Error {
        match err {
            object_store::Error::NotFound { .. } => {
                Error::not_found("object", "not found in object store")
            }
            other => Error::StorageTransient(other.to_string()),
        }
    }

    async fn put_json<T: serde::Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let path = ObjectPath::from(key);
        let body = serde_json::to_vec(value)
            .map_err(|e| Error::StoragePermanent(format!("serialize {key}: {e}")))?;
        with_retry(&self.retry, || async {
            self.store
                .put(&path, PutPayload::from(body.clone()))
                .await
                .map(|_| ())
                .map_err(Self::classify)
        })
        .await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = ObjectPath::from(key);
        with_retry(&self.retry, || async {
            match self.store.get(&path).await {
                Ok(result) => {
                    let bytes = result
                        .bytes()
                        .await
                        .map_err(|e| Error::StorageTransient(e.to_string()))?;
                    let value = serde_json::from_slice(&bytes)
                        .map_err(|e| Error::StoragePermanent(format!("deserialize {key}: {e}")))?;
                    Ok(Some(value))
                }
                Err(object_store::Error::NotFound { .. }) => Ok(None),
                Err(e) => Err(Error::StorageTransient(e.to_string())),
            }
        })
        .await
    }

    async fn touch(&self, key: &str) -> Result<()> {
        let path = ObjectPath::from(key);
        with_retry(&self.retry, || async {
            self.store
                .put(&path, PutPayload::from(Vec::new()))
                .await
                .map(|_| ())
                .map_err(Self::classify)
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let path = ObjectPath::from(key);
        with_retry(&self.retry, || async {
            match self.store.delete(&path).await {
                Ok(()) => Ok(true),
                Err(object_store::Error::NotFound { .. }) => Ok(false),
                Err(e) => Err(Error::StorageTransient(e.to_string())),
            }
        })
        .await
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let path = ObjectPath::from(prefix);
        with_retry(&self.retry, || async {
            let metas: Vec<_> = self
                .store
                .list(Some(&path))
                .try_collect()
                .await
                .map_err(|e| Error::StorageTransient(e.to_string()))?;
            Ok(metas.into_iter().map(|m| m.location.to_string()).collect())
        })
        .await
    }

    /// Fetches every key in `keys_list` with at most 50 in flight at once.
    async fn batched_get_json<T: serde::de::DeserializeOwned + Send + 'static>(
        &self,
        keys_list: Vec<String>,
    ) -> Result<Vec<T>> {
        let results: Vec<Result<Option<T>>> = stream::iter(keys_list)
            .map(|key| async move { self.get_json::<T>(&key).await })
            .buffer_unordered(MAX_CONCURRENT_GETS)
            .collect()
            .await;
        results
            .into_iter()
            .collect::<Result<Vec<Option<T>>>>()
            .map(|v| v.into_iter().flatten().collect())
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    #[tracing::instrument(skip(self, noun))]
    async fn save_noun(&self, noun: &Noun) -> Result<()> {
        self.put_json(&keys::noun_key(&noun.id), noun).await?;
        if let Some(kind) = noun.kind {
            self.touch(&keys::by_kind_marker(kind, &noun.id)).await?;
        }
        Ok(())
    }

    async fn get_noun(&self, id: &NounId) -> Result<Option<Noun>> {
        self.get_json(&keys::noun_key(id)).await
    }

    async fn get_all_nouns(&self) -> Result<Vec<Noun>> {
        let paths = self.list_prefix("nouns/").await?;
        self.batched_get_json(paths).await
    }

    async fn get_nouns_by_kind(&self, kind: NounKind) -> Result<Vec<Noun>> {
        let markers = self.list_prefix(&keys::by_kind_prefix(kind)).await?;
        let noun_keys = markers
            .into_iter()
            .filter_map(|m| m.rsplit('/').next().map(|id| keys::noun_key(&NounId::from(id))))
            .collect();
        self.batched_get_json(noun_keys).await
    }

    async fn delete_noun(&self, id: &NounId) -> Result<bool> {
        self.remove(&keys::noun_key(id)).await
    }

    #[tracing::instrument(skip(self, verb))]
    async fn save_verb(&self, verb: &Verb) -> Result<()> {
        self.put_json(&keys::verb_key(&verb.id), verb).await?;
        self.touch(&keys::verbs_by_source_marker(&verb.source, &verb.id))
            .await?;
        self.touch(&keys::verbs_by_target_marker(&verb.target, &verb.id))
            .await?;
        self.touch(&keys::verbs_by_kind_marker(&verb.kind, &verb.id))
            .await
    }

    async fn get_verb(&self, id: &VerbId) -> Result<Option<Verb>> {
        self.get_json(&keys::verb_key(id)).await
    }

    async fn get_all_verbs(&self) -> Result<Vec<Verb>> {
        let paths = self.list_prefix("verbs/").await?;
        self.batched_get_json(paths).await
    }

    async fn delete_verb(&self, id: &VerbId) -> Result<bool> {
        self.remove(&keys::verb_key(id)).await
    }

    async fn get_verbs_by_source(&self, source: &NounId) -> Result<Vec<Verb>> {
        let markers = self.list_prefix(&keys::verbs_by_source_prefix(source)).await?;
        let verb_keys = markers
            .into_iter()
            .filter_map(|m| m.rsplit('/').next().map(|id| keys::verb_key(&VerbId::from(id.to_string()))))
            .collect();
        self.batched_get_json(verb_keys).await
    }

    async fn get_verbs_by_target(&self, target: &NounId) -> Result<Vec<Verb>> {
        let markers = self.list_prefix(&keys::verbs_by_target_prefix(target)).await?;
        let verb_keys = markers
            .into_iter()
            .filter_map(|m| m.rsplit('/').next().map(|id| keys::verb_key(&VerbId::from(id.to_string()))))
            .collect();
        self.batched_get_json(verb_keys).await
    }

    async fn get_verbs_by_kind(&self, kind: &VerbKind) -> Result<Vec<Verb>> {
        let markers = self.list_prefix(&keys::verbs_by_kind_prefix(kind)).await?;
        let verb_keys = markers
            .into_iter()
            .filter_map(|m| m.rsplit('/').next().map(|id| keys::verb_key(&VerbId::from(id.to_string()))))
            .collect();
        self.batched_get_json(verb_keys).await
    }

    async fn save_metadata(&self, id: &str, metadata: &Metadata) -> Result<()> {
        self.put_json(&keys::metadata_key(id), metadata).await
    }

    async fn get_metadata(&self, id: &str) -> Result<Option<Metadata>> {
        self.get_json(&keys::metadata_key(id)).await
    }

    async fn clear(&self) -> Result<()> {
        let all = self.list_prefix("").await?;
        for key in all {
            self.remove(&key).await?;
        }
        Ok(())
    }

    async fn get_status(&self) -> Result<StorageStatus> {
        let noun_count = self.list_prefix("nouns/").await?.len();
        let verb_count = self.list_prefix("verbs/").await?.len();
        Ok(StorageStatus {
            backend_kind: "object_store",
            bytes_used: 0,
            bytes_quota: None,
            extra: serde_json::json!({ "noun_count": noun_count, "verb_count": verb_count }),
        })
    }

    async fn get_changes_since(
        &self,
        timestamp: chrono::DateTime<chrono::Utc>,
        limit: usize,
    ) -> Result<Option<Vec<ChangeLogEntry>>> {
        let mut names = self.list_prefix("changelog/").await?;
        names.sort();
        let entries: Vec<ChangeLogEntry> = self.batched_get_json(names).await?;
        Ok(Some(
            entries
                .into_iter()
                .filter(|e| e.timestamp > timestamp)
                .take(limit)
                .collect(),
        ))
    }

    async fn append_change(&self, entry: &ChangeLogEntry) -> Result<()> {
        let key = keys::changelog_key(entry.timestamp.timestamp_millis(), rand::random());
        self.put_json(&key, entry).await
    }

    async fn flush_statistics(&self, stats: &vex_types::Statistics) -> Result<()> {
        self.put_json(keys::STATS_KEY, stats).await
    }
}
