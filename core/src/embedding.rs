//! The core's only two pluggable seams are the storage backend (`vex_storage`)
//! and this one: turning an arbitrary payload into a vector. Everything
//! richer — augmentation pipelines, default embedders — is explicitly out of
//! scope for the core and belongs in a layer built on top of it.
use vex_types::{Error, Vector};

pub trait EmbeddingFn: Send + Sync {
    fn embed(&self, payload: &serde_json::Value) -> Result<Vector, Error>;
}

impl<F> EmbeddingFn for F
where
    F: Fn(&serde_json::Value) -> Result<Vector, Error> + Send + Sync,
{
    fn embed(&self, payload: &serde_json::Value) -> Result<Vector, Error> {
        self(payload)
    }
}
