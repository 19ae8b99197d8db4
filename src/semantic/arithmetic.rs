//! Query vector construction.
//!
//! A query vector is built either from free text (embedded by the model) or
//! by folding a formula of weighted concept vectors over the zero vector:
//!
//!   q = normalize( Σ sign(op_i) * weight_i * concept(id_i) )
//!
//! Steps whose concept is unknown contribute nothing. Vector addition
//! commutes, so step order never changes the result.

use serde::{Deserialize, Deserializer, Serialize};

use super::concepts::ConceptStore;

/// Whether a concept is added to or subtracted from the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    #[serde(alias = "subtract")]
    Sub,
}

impl Operation {
    fn sign(self) -> f64 {
        match self {
            Operation::Add => 1.0,
            Operation::Sub => -1.0,
        }
    }
}

/// One step of a formula, as sent by clients: `{ id, type, weight }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaStep {
    /// Concept label
    pub id: String,
    #[serde(rename = "type")]
    pub operation: Operation,
    /// Absent or `null` means 1.0
    #[serde(default = "default_weight", deserialize_with = "weight_or_default")]
    pub weight: f32,
}

fn default_weight() -> f32 {
    1.0
}

fn weight_or_default<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f32>::deserialize(deserializer)?.unwrap_or_else(default_weight))
}

impl FormulaStep {
    pub fn add(id: &str, weight: f32) -> Self {
        Self {
            id: id.to_string(),
            operation: Operation::Add,
            weight,
        }
    }

    pub fn sub(id: &str, weight: f32) -> Self {
        Self {
            id: id.to_string(),
            operation: Operation::Sub,
            weight,
        }
    }
}

/// Result of folding a formula.
#[derive(Debug, Clone)]
pub struct ComposedQuery {
    pub vector: Vec<f32>,
    /// Labels that were found and applied, in formula order
    pub applied: Vec<String>,
    /// Labels with no concept vector; skipped
    pub skipped: Vec<String>,
}

impl ComposedQuery {
    /// True when the formula cancelled out (or matched no concepts).
    pub fn is_zero(&self) -> bool {
        is_zero(&self.vector)
    }
}

/// Fold a formula over the zero vector and L2-normalize the result.
///
/// Accumulates in f64 so that permutations of the same steps agree to well
/// below f32 precision. A zero accumulator is returned as-is.
pub fn compose_formula(concepts: &ConceptStore, formula: &[FormulaStep]) -> ComposedQuery {
    let mut accumulator = vec![0.0f64; concepts.dimensions()];
    let mut applied = Vec::with_capacity(formula.len());
    let mut skipped = vec![];

    for step in formula {
        let Some(concept) = concepts.lookup(&step.id) else {
            log::debug!("unknown concept {:?}, skipping", step.id);
            skipped.push(step.id.clone());
            continue;
        };

        let factor = step.operation.sign() * step.weight as f64;
        for (acc, value) in accumulator.iter_mut().zip(concept.iter()) {
            *acc += factor * *value as f64;
        }
        applied.push(step.id.clone());
    }

    let magnitude = accumulator.iter().map(|x| x * x).sum::<f64>().sqrt();
    let vector = if magnitude > 0.0 {
        accumulator.iter().map(|x| (x / magnitude) as f32).collect()
    } else {
        accumulator.iter().map(|x| *x as f32).collect()
    };

    ComposedQuery {
        vector,
        applied,
        skipped,
    }
}

/// Build the embedding prompt for a text query, biased by flavor keywords.
///
/// `"{query} with strong notes of {a, b}"`; a flavors-only request uses
/// "Coffee" as the subject.
pub fn augment_query(query: Option<&str>, flavors: &[String]) -> String {
    let mut prompt = match query.map(str::trim) {
        Some(q) if !q.is_empty() => q.to_string(),
        _ => "Coffee".to_string(),
    };

    if !flavors.is_empty() {
        prompt.push_str(" with strong notes of ");
        prompt.push_str(&flavors.join(", "));
    }

    prompt
}

/// Compute L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn is_zero(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}

/// L2-normalize, leaving zero vectors untouched.
pub fn normalize(v: Vec<f32>) -> Vec<f32> {
    let norm = l2_norm(&v);
    if norm > 0.0 {
        v.into_iter().map(|x| x / norm).collect()
    } else {
        v
    }
}
