//! One file per noun and per verb under the typed directory layout from the
//! persisted-layout contract. Index markers (`indexes/by_kind/...` etc.) are
//! empty files whose existence alone marks membership, letting by-kind and
//! by-source/target/kind scans avoid reading every entity.
use crate::retry::with_retry;
use crate::{keys, ChangeLogEntry, StorageBackend, StorageStatus};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use vex_types::{Error, Metadata, Noun, NounId, NounKind, Result, RetryConfig, Verb, VerbId, VerbKind};

pub struct FilesystemBackend {
    root: PathBuf,
    retry: RetryConfig,
}

impl FilesystemBackend {
    pub fn new(root: impl Into<PathBuf>, retry: RetryConfig) -> Self {
        Self {
            root: root.into(),
            retry,
        }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    async fn write_json<T: serde::Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.path(key);
        let body = serde_json::to_vec(value)
            .map_err(|e| Error::StoragePermanent(format!("serialize {key}: {e}")))?;
        with_retry(&self.retry, || async {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| transient(&path, e))?;
            }
            fs::write(&path, &body).await.map_err(|e| transient(&path, e))
        })
        .await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.path(key);
        with_retry(&self.retry, || async {
            match fs::read(&path).await {
                Ok(bytes) => {
                    let value = serde_json::from_slice(&bytes)
                        .map_err(|e| Error::StoragePermanent(format!("deserialize {key}: {e}")))?;
                    Ok(Some(value))
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(transient(&path, e)),
            }
        })
        .await
    }

    async fn touch_marker(&self, key: &str) -> Result<()> {
        let path = self.path(key);
        with_retry(&self.retry, || async {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| transient(&path, e))?;
            }
            fs::write(&path, []).await.map_err(|e| transient(&path, e))
        })
        .await
    }

    async fn remove_file(&self, key: &str) -> Result<bool> {
        let path = self.path(key);
        with_retry(&self.retry, || async {
            match fs::remove_file(&path).await {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(transient(&path, e)),
            }
        })
        .await
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.path(prefix);
        with_retry(&self.retry, || async {
            let mut entries = Vec::new();
            let mut read_dir = match fs::read_dir(&dir).await {
                Ok(rd) => rd,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
                Err(e) => return Err(transient(&dir, e)),
            };
            while let Some(entry) = read_dir.next_entry().await.map_err(|e| transient(&dir, e))? {
                if let Some(name) = entry.file_name().to_str() {
                    entries.push(name.to_string());
                }
            }
            Ok(entries)
        })
        .await
    }
}

fn transient(path: &Path, err: std::io::Error) -> Error {
    Error::StorageTransient(format!("{}: {err}", path.display()))
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| transient(&self.root, e))
    }

    #[tracing::instrument(skip(self, noun))]
    async fn save_noun(&self, noun: &Noun) -> Result<()> {
        self.write_json(&keys::noun_key(&noun.id), noun).await?;
        if let Some(kind) = noun.kind {
            self.touch_marker(&keys::by_kind_marker(kind, &noun.id))
                .await?;
        }
        Ok(())
    }

    async fn get_noun(&self, id: &NounId) -> Result<Option<Noun>> {
        self.read_json(&keys::noun_key(id)).await
    }

    async fn get_all_nouns(&self) -> Result<Vec<Noun>> {
        let mut out = Vec::new();
        for name in self.list_prefix("nouns").await? {
            if let Some(noun) = self.read_json(&keys::noun_key(&NounId::from(name))).await? {
                out.push(noun);
            }
        }
        Ok(out)
    }

    async fn get_nouns_by_kind(&self, kind: NounKind) -> Result<Vec<Noun>> {
        let mut out = Vec::new();
        for id in self.list_prefix(&keys::by_kind_prefix(kind)).await? {
            if let Some(noun) = self.read_json(&keys::noun_key(&NounId::from(id))).await? {
                out.push(noun);
            }
        }
        Ok(out)
    }

    async fn delete_noun(&self, id: &NounId) -> Result<bool> {
        self.remove_file(&keys::noun_key(id)).await
    }

    #[tracing::instrument(skip(self, verb))]
    async fn save_verb(&self, verb: &Verb) -> Result<()> {
        self.write_json(&keys::verb_key(&verb.id), verb).await?;
        self.touch_marker(&keys::verbs_by_source_marker(&verb.source, &verb.id))
            .await?;
        self.touch_marker(&keys::verbs_by_target_marker(&verb.target, &verb.id))
            .await?;
        self.touch_marker(&keys::verbs_by_kind_marker(&verb.kind, &verb.id))
            .await
    }

    async fn get_verb(&self, id: &VerbId) -> Result<Option<Verb>> {
        self.read_json(&keys::verb_key(id)).await
    }

    async fn get_all_verbs(&self) -> Result<Vec<Verb>> {
        let mut out = Vec::new();
        for name in self.list_prefix("verbs").await? {
            if let Some(verb) = self.read_json(&keys::verb_key(&VerbId::from(name))).await? {
                out.push(verb);
            }
        }
        Ok(out)
    }

    async fn delete_verb(&self, id: &VerbId) -> Result<bool> {
        self.remove_file(&keys::verb_key(id)).await
    }

    async fn get_verbs_by_source(&self, source: &NounId) -> Result<Vec<Verb>> {
        let mut out = Vec::new();
        for id in self.list_prefix(&keys::verbs_by_source_prefix(source)).await? {
            if let Some(verb) = self.read_json(&keys::verb_key(&VerbId::from(id))).await? {
                out.push(verb);
            }
        }
        Ok(out)
    }

    async fn get_verbs_by_target(&self, target: &NounId) -> Result<Vec<Verb>> {
        let mut out = Vec::new();
        for id in self.list_prefix(&keys::verbs_by_target_prefix(target)).await? {
            if let Some(verb) = self.read_json(&keys::verb_key(&VerbId::from(id))).await? {
                out.push(verb);
            }
        }
        Ok(out)
    }

    async fn get_verbs_by_kind(&self, kind: &VerbKind) -> Result<Vec<Verb>> {
        let mut out = Vec::new();
        for id in self.list_prefix(&keys::verbs_by_kind_prefix(kind)).await? {
            if let Some(verb) = self.read_json(&keys::verb_key(&VerbId::from(id))).await? {
                out.push(verb);
            }
        }
        Ok(out)
    }

    async fn save_metadata(&self, id: &str, metadata: &Metadata) -> Result<()> {
        self.write_json(&keys::metadata_key(id), metadata).await
    }

    async fn get_metadata(&self, id: &str) -> Result<Option<Metadata>> {
        self.read_json(&keys::metadata_key(id)).await
    }

    async fn clear(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)
                .await
                .map_err(|e| transient(&self.root, e))?;
        }
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| transient(&self.root, e))
    }

    async fn get_status(&self) -> Result<StorageStatus> {
        let noun_count = self.list_prefix("nouns").await?.len();
        let verb_count = self.list_prefix("verbs").await?.len();
        Ok(StorageStatus {
            backend_kind: "filesystem",
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
        let mut names = self.list_prefix("changelog").await?;
        names.sort();
        let mut out = Vec::new();
        for name in names {
            if let Some(entry) = self
                .read_json::<ChangeLogEntry>(&format!("changelog/{name}"))
                .await?
            {
                if entry.timestamp > timestamp {
                    out.push(entry);
                    if out.len() >= limit {
                        break;
                    }
                }
            }
        }
        Ok(Some(out))
    }

    async fn append_change(&self, entry: &ChangeLogEntry) -> Result<()> {
        let key = keys::changelog_key(entry.timestamp.timestamp_millis(), rand::random());
        self.write_json(&key, entry).await
    }

    async fn flush_statistics(&self, stats: &vex_types::Statistics) -> Result<()> {
        self.write_json(keys::STATS_KEY, stats).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vex_types::{CreatorService, Vector};

    fn backend() -> (FilesystemBackend, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (
            FilesystemBackend::new(dir.path(), RetryConfig::default()),
            dir,
        )
    }

    #[tokio::test]
    async fn save_then_get_roundtrips() {
        let (backend, _dir) = backend();
        backend.init().await.unwrap();
        let noun = Noun::new(
            NounId::from("n1"),
            Vector::new(vec![1.0, 2.0]),
            CreatorService::from("test"),
        );
        backend.save_noun(&noun).await.unwrap();
        let fetched = backend.get_noun(&NounId::from("n1")).await.unwrap();
        assert_eq!(fetched.unwrap().id, NounId::from("n1"));
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let (backend, _dir) = backend();
        backend.init().await.unwrap();
        assert!(backend
            .get_noun(&NounId::from("missing"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn by_kind_marker_enables_scan() {
        let (backend, _dir) = backend();
        backend.init().await.unwrap();
        let mut noun = Noun::new(
            NounId::from("n1"),
            Vector::new(vec![1.0]),
            CreatorService::from("test"),
        );
        noun.kind = Some(NounKind::Person);
        backend.save_noun(&noun).await.unwrap();

        let found = backend.get_nouns_by_kind(NounKind::Person).await.unwrap();
        assert_eq!(found.len(), 1);
        let empty = backend.get_nouns_by_kind(NounKind::Location).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let (backend, _dir) = backend();
        backend.init().await.unwrap();
        let noun = Noun::new(
            NounId::from("n1"),
            Vector::new(vec![1.0]),
            CreatorService::from("test"),
        );
        backend.save_noun(&noun).await.unwrap();
        backend.clear().await.unwrap();
        assert!(backend.get_all_nouns().await.unwrap().is_empty());
    }
}
