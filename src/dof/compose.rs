//! Index-Set Composer: sibling exclusion, parent restriction and parent-relative renumbering.
//!
//! All inputs are sorted [`DofSubset`]s, so every step is a single merge scan whose outcome does
//! not depend on anything process-local beyond the subsets themselves.

use crate::dof::DofSubset;
use crate::error::KError;
use crate::parallel::Comm;

/// Remove from `child` every index already claimed by `siblings`.
///
/// Returns the filtered child and the colliding indices.
pub fn exclude_siblings(child: &DofSubset, siblings: &DofSubset) -> (DofSubset, Vec<usize>) {
    let (c, s) = (child.as_slice(), siblings.as_slice());
    let mut kept = Vec::with_capacity(c.len());
    let mut overlaps = Vec::new();
    let mut j = 0;
    for &idx in c {
        while j < s.len() && s[j] < idx {
            j += 1;
        }
        if j < s.len() && s[j] == idx {
            overlaps.push(idx);
            j += 1;
        } else {
            kept.push(idx);
        }
    }
    (DofSubset::from_sorted(kept), overlaps)
}

/// Remove from `child` every index the parent does not contain.
///
/// Returns the filtered child and the extraneous indices.
pub fn restrict_to_parent(child: &DofSubset, parent: &DofSubset) -> (DofSubset, Vec<usize>) {
    let (c, p) = (child.as_slice(), parent.as_slice());
    let mut kept = Vec::with_capacity(c.len());
    let mut extraneous = Vec::new();
    let mut j = 0;
    for &idx in c {
        while j < p.len() && p[j] < idx {
            j += 1;
        }
        if j < p.len() && p[j] == idx {
            kept.push(idx);
            j += 1;
        } else {
            extraneous.push(idx);
        }
    }
    (DofSubset::from_sorted(kept), extraneous)
}

/// Rank of every child index within the parent.
pub fn renumber(child: &DofSubset, parent: &DofSubset) -> Result<Vec<usize>, KError> {
    let p = parent.as_slice();
    let mut out = Vec::with_capacity(child.len());
    let mut j = 0;
    for idx in child.iter() {
        while j < p.len() && p[j] < idx {
            j += 1;
        }
        if j == p.len() || p[j] != idx {
            return Err(KError::NotInParent { index: idx });
        }
        out.push(j);
        j += 1;
    }
    Ok(out)
}

/// What composing one child did, before it is turned into an [`IndexSet`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composition {
    /// Surviving global indices.
    pub subset: DofSubset,
    /// Indices dropped because an earlier sibling claimed them.
    pub overlaps: Vec<usize>,
    /// Indices dropped because the parent does not contain them.
    pub extraneous: Vec<usize>,
}

impl Composition {
    pub fn new(
        name: &str,
        child: &DofSubset,
        siblings: Option<&DofSubset>,
        parent: Option<&DofSubset>,
    ) -> Self {
        let (subset, overlaps) = match siblings {
            Some(s) => exclude_siblings(child, s),
            None => (child.clone(), Vec::new()),
        };
        if !overlaps.is_empty() {
            log::warn!(
                "index set {name}: {} indices overlap with sibling fieldsplit, ignoring overlapping indices",
                overlaps.len()
            );
        }
        let (subset, extraneous) = match parent {
            Some(p) => restrict_to_parent(&subset, p),
            None => (subset, Vec::new()),
        };
        if !extraneous.is_empty() {
            log::warn!(
                "index set {name}: {} indices not a subset of parent fieldsplit, ignoring extra indices",
                extraneous.len()
            );
        }
        Self { subset, overlaps, extraneous }
    }
}

/// A composed DOF subset reified for the linear-algebra backend.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSet {
    pub name: String,
    /// Owned global DOFs of this set.
    pub subset: DofSubset,
    /// Row positions in the operator this set indexes into: ranks within the parent when there is
    /// one, otherwise offsets from the start of the ownership range.
    pub local: Vec<usize>,
    /// Backend indices: `local` shifted by the parent entries owned by lower ranks, or the global
    /// DOF indices when there is no parent.
    pub indices: Vec<usize>,
    /// Size of the set summed over all processes.
    pub global_len: usize,
}

impl IndexSet {
    /// Number of entries owned by this process.
    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    /// Log the set at info level.
    pub fn view(&self, path: &str) {
        log::info!("ISView: {} ({path}) {:?}", self.name, self.indices);
    }
}

/// Compose `child` against `siblings` and `parent` and create its [`IndexSet`].
///
/// Collective: every process makes the same calls on `comm` whatever its local result. A set
/// may be empty on some processes, but a set empty on all of them is an error since a split or
/// null-space vector with no entries is never valid. `first_owned` is the start of the caller's
/// ownership range, used when there is no parent.
pub fn compose(
    name: &str,
    child: &DofSubset,
    siblings: Option<&DofSubset>,
    parent: Option<&DofSubset>,
    first_owned: usize,
    comm: &dyn Comm,
) -> Result<IndexSet, KError> {
    let composed = Composition::new(name, child, siblings, parent);
    let global_len = comm.all_reduce_count(composed.subset.len());
    let offset = parent.map(|p| comm.exclusive_sum(p.len()));
    if global_len == 0 {
        return Err(KError::EmptyIndexSet { name: name.to_string() });
    }
    let (local, indices) = match (parent, offset) {
        (Some(p), Some(offset)) => {
            let local = renumber(&composed.subset, p)?;
            let indices = local.iter().map(|&i| i + offset).collect();
            (local, indices)
        }
        _ => {
            let local = composed.subset.iter().map(|i| i - first_owned).collect();
            (local, composed.subset.as_slice().to_vec())
        }
    };
    Ok(IndexSet {
        name: name.to_string(),
        subset: composed.subset,
        local,
        indices,
        global_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SerialComm;
    use std::cell::Cell;

    fn set(v: &[usize]) -> DofSubset {
        DofSubset::from_sorted(v.to_vec())
    }

    #[test]
    fn sibling_overlap_is_dropped() {
        let (kept, overlaps) = exclude_siblings(&set(&[5, 6, 7, 8, 9]), &set(&[0, 1, 2, 3, 4, 5]));
        assert_eq!(kept.as_slice(), &[6, 7, 8, 9]);
        assert_eq!(overlaps, vec![5]);
    }

    #[test]
    fn extraneous_indices_are_dropped() {
        let (kept, extra) = restrict_to_parent(&set(&[1, 3, 4, 8]), &set(&[2, 3, 4, 5]));
        assert_eq!(kept.as_slice(), &[3, 4]);
        assert_eq!(extra, vec![1, 8]);
    }

    #[test]
    fn renumbering_uses_parent_ranks() {
        assert_eq!(renumber(&set(&[4, 9]), &set(&[2, 4, 7, 9])).unwrap(), vec![1, 3]);
        assert!(matches!(
            renumber(&set(&[5]), &set(&[2, 4])),
            Err(KError::NotInParent { index: 5 })
        ));
    }

    #[test]
    fn compose_with_parent_and_without() {
        let parent = set(&[10, 11, 12, 13]);
        let is = compose("b", &set(&[12, 13, 20]), None, Some(&parent), 0, &SerialComm).unwrap();
        assert_eq!(is.local, vec![2, 3]);
        assert_eq!(is.indices, vec![2, 3]);
        assert_eq!(is.subset.as_slice(), &[12, 13]);

        let is = compose("a", &set(&[4, 6]), None, None, 4, &SerialComm).unwrap();
        assert_eq!(is.local, vec![0, 2]);
        assert_eq!(is.indices, vec![4, 6]);
    }

    /// Rank 1 of two, with `remote` entries and `below` parent entries on rank 0.
    struct SecondRank {
        remote: f64,
        below: usize,
        calls: Cell<usize>,
    }

    impl Comm for SecondRank {
        fn rank(&self) -> usize {
            1
        }
        fn size(&self) -> usize {
            2
        }
        fn barrier(&self) {}
        fn all_reduce(&self, x: f64) -> f64 {
            self.calls.set(self.calls.get() + 1);
            x + self.remote
        }
        fn exclusive_sum(&self, _x: usize) -> usize {
            self.calls.set(self.calls.get() + 1);
            self.below
        }
    }

    #[test]
    fn locally_empty_set_still_joins_collectives() {
        let comm = SecondRank { remote: 3.0, below: 4, calls: Cell::new(0) };
        let parent = set(&[10, 11]);
        let is = compose("b", &set(&[20]), None, Some(&parent), 10, &comm).unwrap();
        assert!(is.is_empty());
        assert_eq!(is.global_len, 3);
        assert_eq!(comm.calls.get(), 2);

        let comm = SecondRank { remote: 0.0, below: 4, calls: Cell::new(0) };
        let err = compose("b", &set(&[20]), None, Some(&parent), 10, &comm);
        assert!(matches!(err, Err(KError::EmptyIndexSet { .. })));
        assert_eq!(comm.calls.get(), 2);
    }

    #[test]
    fn offsets_count_parent_entries_on_lower_ranks() {
        let comm = SecondRank { remote: 2.0, below: 4, calls: Cell::new(0) };
        let is = compose("b", &set(&[11]), None, Some(&set(&[10, 11])), 10, &comm).unwrap();
        assert_eq!(is.local, vec![1]);
        assert_eq!(is.indices, vec![5]);
        assert_eq!(is.global_len, 3);
    }

    #[test]
    fn empty_result_is_an_error() {
        let err = compose("e", &set(&[1, 2]), Some(&set(&[1, 2])), None, 0, &SerialComm);
        assert!(matches!(err, Err(KError::EmptyIndexSet { .. })));
    }
}
