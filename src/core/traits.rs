//! Core linear-algebra traits for splitsolve.

/// Matrix–vector product: y ← A x.
pub trait MatVec<V> {
    /// Compute y = A · x.
    fn matvec(&self, x: &V, y: &mut V);
}

/// Inner products & norms.
pub trait InnerProduct<V> {
    /// Associated scalar type.
    type Scalar: Copy + PartialOrd + From<f64>;
    /// Compute dot(x, y).
    fn dot(&self, x: &V, y: &V) -> Self::Scalar;
    /// Compute ‖x‖₂.
    fn norm(&self, x: &V) -> Self::Scalar;
}

/// Extraction of the block A[rows, cols] (positions are local row/column numbers).
pub trait SubmatrixExtract: Sized {
    fn extract(&self, rows: &[usize], cols: &[usize]) -> Self;

    /// Principal block A[idx, idx].
    fn principal(&self, idx: &[usize]) -> Self {
        self.extract(idx, idx)
    }
}
