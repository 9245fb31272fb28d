//! Entity-embedding snapshot type
//!
//! An [`EmbeddingSnapshot`] is the unit exchanged between a client and the
//! coordinator: the client's current entity-embedding matrix of shape
//! `entity_count x embedding_dim`. Models with two real components per
//! complex entry (e.g. rotation-based score functions) double the embedding
//! dimension; the shape carries the final, doubled value.

use ndarray::Array2;
use rand::Rng;
use std::fmt;
use thiserror::Error;

/// Errors produced by model-side operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Snapshot shape does not match the expected model shape.
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Expected shape
        expected: EmbeddingShape,
        /// Actual shape
        actual: EmbeddingShape,
    },

    /// A client operation was invoked before `init_model`.
    #[error("Client {client} has no initialized model")]
    NotInitialized {
        /// Client index
        client: usize,
    },
}

/// Shape of an embedding matrix: entities x embedding dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingShape {
    /// Number of entities
    pub entities: usize,
    /// Embedding dimension (already doubled for two-component models)
    pub dim: usize,
}

impl EmbeddingShape {
    /// Creates a new shape.
    pub fn new(entities: usize, dim: usize) -> Self {
        Self { entities, dim }
    }
}

impl fmt::Display for EmbeddingShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} x {}]", self.entities, self.dim)
    }
}

/// A client's entity-embedding tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSnapshot {
    data: Array2<f32>,
}

impl EmbeddingSnapshot {
    /// Creates a snapshot from an embedding matrix.
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// Creates a zero-filled snapshot of the given shape.
    pub fn zeros(shape: EmbeddingShape) -> Self {
        Self {
            data: Array2::zeros((shape.entities, shape.dim)),
        }
    }

    /// Creates a snapshot with i.i.d. uniform entries in `[-scale, scale]`.
    pub fn uniform<R: Rng>(shape: EmbeddingShape, scale: f32, rng: &mut R) -> Self {
        Self {
            data: Array2::from_shape_fn((shape.entities, shape.dim), |_| {
                rng.gen_range(-scale..=scale)
            }),
        }
    }

    /// Returns the shape of the snapshot.
    pub fn shape(&self) -> EmbeddingShape {
        let (entities, dim) = self.data.dim();
        EmbeddingShape::new(entities, dim)
    }

    /// Returns the embedding matrix.
    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    /// Returns a mutable reference to the embedding matrix.
    pub fn data_mut(&mut self) -> &mut Array2<f32> {
        &mut self.data
    }

    /// Consumes the snapshot, returning the embedding matrix.
    pub fn into_inner(self) -> Array2<f32> {
        self.data
    }

    /// Returns the L2 norm of the embedding matrix.
    pub fn l2_norm(&self) -> f64 {
        self.data
            .iter()
            .map(|&x| f64::from(x) * f64::from(x))
            .sum::<f64>()
            .sqrt()
    }

    /// Validates this snapshot against an expected shape.
    ///
    /// Shape mismatches between a client's embedding and the model's
    /// expectation must fail the run, never silently truncate or broadcast.
    pub fn check_shape(&self, expected: EmbeddingShape) -> Result<(), ModelError> {
        let actual = self.shape();
        if actual != expected {
            return Err(ModelError::ShapeMismatch { expected, actual });
        }
        Ok(())
    }
}

impl From<Array2<f32>> for EmbeddingSnapshot {
    fn from(data: Array2<f32>) -> Self {
        Self::new(data)
    }
}
