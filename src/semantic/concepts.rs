//! Concept vectors: precomputed embeddings for flavor and origin labels
//! ("Fruit", "Chocolate", "Ethiopia", ...) used as formula building blocks.

use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConceptError {
    #[error("failed to read concepts file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("concepts file is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("concept {label:?} has {got} dimensions, expected {expected}")]
    DimensionMismatch {
        label: String,
        expected: usize,
        got: usize,
    },

    #[error("concept store is empty")]
    Empty,
}

/// Read-only label -> vector table. Every vector has the same length.
#[derive(Debug, Clone)]
pub struct ConceptStore {
    vectors: HashMap<String, Vec<f32>>,
    dimensions: usize,
}

impl ConceptStore {
    /// Load `{ "Label": [f32, ...], ... }` from disk.
    pub fn load(path: &Path) -> Result<Self, ConceptError> {
        let raw = std::fs::read(path).map_err(|source| ConceptError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let vectors: HashMap<String, Vec<f32>> = serde_json::from_slice(&raw)?;

        let store = Self::from_map(vectors)?;
        log::info!(
            "loaded {} concept vectors ({} dimensions) from {}",
            store.len(),
            store.dimensions,
            path.display()
        );
        Ok(store)
    }

    pub fn from_map(vectors: HashMap<String, Vec<f32>>) -> Result<Self, ConceptError> {
        let dimensions = vectors
            .values()
            .next()
            .map(Vec::len)
            .ok_or(ConceptError::Empty)?;

        for (label, vector) in &vectors {
            if vector.len() != dimensions {
                return Err(ConceptError::DimensionMismatch {
                    label: label.clone(),
                    expected: dimensions,
                    got: vector.len(),
                });
            }
        }

        Ok(Self {
            vectors,
            dimensions,
        })
    }

    /// Case-sensitive lookup.
    pub fn lookup(&self, label: &str) -> Option<&[f32]> {
        self.vectors.get(label).map(Vec::as_slice)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// All labels, sorted.
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.vectors.keys().cloned().collect();
        labels.sort();
        labels
    }
}
