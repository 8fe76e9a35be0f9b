//! This is the vector math module
//! Provide L2 normalization, dot product and cosine similarity

use crate::error::VectorError;

/// L2 Normalization
/// norm_vec = vec / ||vec||
/// Zero vector cannot be normalized
pub fn l2_norm(vector: &[f32]) -> Result<Vec<f32>, VectorError> {
    if vector.is_empty() {
        return Err(VectorError::Empty);
    }

    let norm = vector.iter()
        .map(|x| x * x)
        .sum::<f32>()
        .sqrt();

    if norm == 0.0 || !norm.is_finite() {
        return Err(VectorError::ZeroNorm);
    }

    Ok(vector.iter().map(|x| x / norm).collect())
}

/// Dot Product
/// dot_prod = sum(a[i] * b[i]) for i = 0..a.len()
/// Can only process vectors with same dimensions
pub fn dot_product(left: &[f32], right: &[f32]) -> Result<f32, VectorError> {
    if left.len() != right.len() {
        return Err(VectorError::DimensionMismatch { left: left.len(), right: right.len() });
    }

    let dot_prod = left.iter()
        .zip(right.iter())
        .map(|(x, y)| x * y)
        .sum();

    Ok(dot_prod)
}

/// Cosine similarity in `[-1, 1]`.
/// Undefined (an error) when either side has zero norm or the dimensions differ.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> Result<f32, VectorError> {
    if left.len() != right.len() {
        return Err(VectorError::DimensionMismatch { left: left.len(), right: right.len() });
    }
    let left = l2_norm(left)?;
    let right = l2_norm(right)?;

    // rounding can push |cos| a hair past 1
    Ok(dot_product(&left, &right)?.clamp(-1.0, 1.0))
}
