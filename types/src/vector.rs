use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A fixed-dimension embedding vector.
///
/// Shared-ownership currency type across the index, cache and façade:
/// cloning is a cheap `Arc` pointer bump rather than a vector copy, the same
/// tradeoff the ANN layer below makes for its own node values.
#[derive(Debug, Clone)]
pub struct Vector(pub Arc<[f32]>);

impl Vector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(Arc::from(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<f32>> for Vector {
    fn from(v: Vec<f32>) -> Self {
        Self::new(v)
    }
}

impl PartialEq for Vector {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| (a - b).abs() < f32::EPSILON)
    }
}

impl Eq for Vector {}

impl Hash for Vector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for &v in self.0.iter() {
            let truncated = (v / f32::EPSILON).trunc() as i64;
            truncated.hash(state);
        }
    }
}

impl serde::Serialize for Vector {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Vector {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let values: Vec<f32> = serde::Deserialize::deserialize(deserializer)?;
        Ok(Self::new(values))
    }
}
