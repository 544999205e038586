//! Degrees of freedom: the discretization seen from the solver assembly.
//!
//! The global numbering of unknowns comes from an external discretization, consumed through the
//! [`DofLayout`] trait. Everything computed from it is a [`DofSubset`]: a sorted, duplicate-free
//! list of global indices owned by the calling process.
//!
//! Modules:
//! - [`resolver`]: field/component/region/boundary specification to [`DofSubset`].
//! - [`compose`]: sibling/parent composition into backend [`compose::IndexSet`]s.
//! - [`interval`]: a small 1D layout implementing [`DofLayout`].

use std::ops::Range;

pub mod compose;
pub mod interval;
pub mod resolver;

pub use compose::{Composition, IndexSet, compose};
pub use interval::IntervalLayout;
pub use resolver::{FieldRequest, SubsetSpec, resolve};

/// Global DOF numbering of a (possibly mixed) discretized system.
///
/// Fields are numbered `0..num_fields()`. A field with `num_sub_elements(f) == 0` is scalar and
/// only accepts `component == None`; vector/tensor fields accept `Some(c)` with
/// `c < num_sub_elements(f)`, or `None` for all components.
pub trait DofLayout {
    /// Global indices owned by this process.
    fn ownership_range(&self) -> Range<usize>;
    /// Total number of DOFs over all processes.
    fn global_size(&self) -> usize;
    /// Every index of the system DOF map visible to this process (ghosts included).
    fn system_dofs(&self) -> Vec<usize>;

    fn num_fields(&self) -> usize;
    fn field_name(&self, field: usize) -> &str;
    fn field_index(&self, name: &str) -> Option<usize>;
    /// Number of sub-elements of a field (0 for scalars).
    fn num_sub_elements(&self, field: usize) -> usize;
    /// DOF map of a field component.
    fn component_dofs(&self, field: usize, component: Option<usize>) -> Vec<usize>;

    fn num_cells(&self) -> usize;
    /// Region id tagged on a cell.
    fn cell_region(&self, cell: usize) -> i64;
    fn cell_dofs(&self, field: usize, component: Option<usize>, cell: usize) -> Vec<usize>;

    fn num_facets(&self) -> usize;
    /// Boundary id tagged on a facet.
    fn facet_boundary(&self, facet: usize) -> i64;
    fn facet_dofs(&self, field: usize, component: Option<usize>, facet: usize) -> Vec<usize>;
}

/// Sorted, duplicate-free global DOF indices local to one process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DofSubset {
    indices: Vec<usize>,
}

impl DofSubset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the indices inside `owned`, then sort and deduplicate.
    pub fn from_unsorted<I: IntoIterator<Item = usize>>(indices: I, owned: Range<usize>) -> Self {
        let mut indices: Vec<usize> = indices.into_iter().filter(|i| owned.contains(i)).collect();
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }

    /// Wrap indices that are already strictly increasing.
    pub(crate) fn from_sorted(indices: Vec<usize>) -> Self {
        debug_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        Self { indices }
    }

    /// Every index of `range`.
    pub fn full(range: Range<usize>) -> Self {
        Self { indices: range.collect() }
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.binary_search(&index).is_ok()
    }

    /// Rank of `index` within this subset.
    pub fn position(&self, index: usize) -> Option<usize> {
        self.indices.binary_search(&index).ok()
    }

    /// Sorted union with another subset.
    pub fn union(&self, other: &DofSubset) -> DofSubset {
        let (a, b) = (&self.indices, &other.indices);
        let mut out = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            if a[i] < b[j] {
                out.push(a[i]);
                i += 1;
            } else if b[j] < a[i] {
                out.push(b[j]);
                j += 1;
            } else {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
        out.extend_from_slice(&a[i..]);
        out.extend_from_slice(&b[j..]);
        DofSubset { indices: out }
    }

    pub fn into_vec(self) -> Vec<usize> {
        self.indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_unsorted_filters_sorts_and_dedups() {
        let s = DofSubset::from_unsorted([9, 3, 5, 3, 12, 4], 3..10);
        assert_eq!(s.as_slice(), &[3, 4, 5, 9]);
        assert_eq!(s.position(5), Some(2));
        assert_eq!(s.position(6), None);
    }

    #[test]
    fn union_merges() {
        let a = DofSubset::from_sorted(vec![0, 2, 4]);
        let b = DofSubset::from_sorted(vec![1, 2, 7]);
        assert_eq!(a.union(&b).as_slice(), &[0, 1, 2, 4, 7]);
        assert_eq!(a.union(&DofSubset::new()), a);
    }
}
