//! Solver-Tree Compiler: option subtree to [`SolverNode`].
//!
//! Compilation is recursive. Nested solvers reuse the DOF context of their parent; each
//! field split becomes the parent context of its own linear solver, so index sets in nested
//! splits are always expressed relative to their immediate parent split.

use crate::config::{
    CompositeType, FactorizationPackage, IterativeMethod, KspMonitors, OptionStore, SimplePc,
    join, nth,
};
use crate::context::pc_context::{FieldSplit, PreconditionerNode, SolverNode, Split, Tolerances};
use crate::dof::{DofLayout, DofSubset, IndexSet, SubsetSpec, compose, resolve};
use crate::error::KError;
use crate::nullspace::NullSpace;
use crate::parallel::Comm;

/// Compiles linear-solver subtrees of one system.
pub struct SolverCompiler<'a> {
    store: &'a dyn OptionStore,
    layout: &'a dyn DofLayout,
    comm: &'a dyn Comm,
}

impl<'a> SolverCompiler<'a> {
    pub fn new(store: &'a dyn OptionStore, layout: &'a dyn DofLayout, comm: &'a dyn Comm) -> Self {
        Self { store, layout, comm }
    }

    /// Compile the linear solver at `path`.
    ///
    /// `parent` is the DOF subset of the enclosing split, or `None` at the root where the
    /// operator covers every owned DOF.
    pub fn compile(
        &self,
        path: &str,
        prefix: &str,
        parent: Option<&DofSubset>,
    ) -> Result<SolverNode, KError> {
        let method_path = join(path, "iterative_method");
        let method_name_path = join(&method_path, "name");
        let method = IterativeMethod::from_name(
            &method_name_path,
            &self.store.get_string(&method_name_path)?,
        )?;

        let (tolerances, monitors) = if method == IterativeMethod::PreOnly {
            (None, KspMonitors::empty())
        } else {
            (Some(self.tolerances(&method_path)?), self.monitors(&method_path))
        };

        let null_space = self.null_space(path, prefix, parent)?;
        let preconditioner = self.preconditioner(&join(path, "preconditioner"), prefix, parent)?;

        log::debug!(
            "{prefix}: compiled ksp {} with pc {}{}",
            method.name(),
            preconditioner.name(),
            if null_space.is_some() { " and null space" } else { "" }
        );

        Ok(SolverNode {
            prefix: prefix.to_string(),
            method,
            tolerances,
            monitors,
            preconditioner,
            null_space,
        })
    }

    fn tolerances(&self, path: &str) -> Result<Tolerances, KError> {
        Ok(Tolerances {
            rtol: self.store.get_f64(&join(path, "relative_error"))?,
            atol: self.store.get_f64_or(&join(path, "absolute_error"), Tolerances::DEFAULT_ATOL)?,
            dtol: self.store.get_f64_or(&join(path, "divergence_error"), Tolerances::DEFAULT_DTOL)?,
            max_iterations: self.store.get_usize(&join(path, "max_iterations"))?,
            restart: self.store.get_usize_or(&join(path, "restart"), Tolerances::DEFAULT_RESTART)?,
        })
    }

    fn monitors(&self, path: &str) -> KspMonitors {
        let have = |name: &str| self.store.have_option(&join(path, &format!("monitors/{name}")));
        let mut monitors = KspMonitors::empty();
        monitors.set(KspMonitors::PRECONDITIONED_RESIDUAL, have("preconditioned_residual"));
        monitors.set(KspMonitors::TRUE_RESIDUAL, have("true_residual"));
        monitors.set(KspMonitors::CONVERGENCE_FILE, have("convergence_file"));
        monitors.set(KspMonitors::TEST_NULL_SPACE, have("test_null_space"));
        monitors
    }

    /// Resolve and compose the repeated `child` entries under `path` as siblings.
    fn sibling_sets(
        &self,
        path: &str,
        child: &str,
        parent: Option<&DofSubset>,
    ) -> Result<Vec<(String, IndexSet)>, KError> {
        let first_owned = self.layout.ownership_range().start;
        let mut claimed = DofSubset::new();
        let mut sets = Vec::new();
        for i in 0..self.store.option_count(&join(path, child)) {
            let entry = nth(path, child, i);
            let spec = SubsetSpec::from_options(self.store, &entry)?;
            let dofs = resolve(self.layout, &spec)?;
            let set = compose(&spec.name, &dofs, Some(&claimed), parent, first_owned, self.comm)?;
            if spec.view {
                set.view(&entry);
            }
            claimed = claimed.union(&set.subset);
            sets.push((entry, set));
        }
        Ok(sets)
    }

    fn null_space(
        &self,
        path: &str,
        prefix: &str,
        parent: Option<&DofSubset>,
    ) -> Result<Option<NullSpace>, KError> {
        let ns_path = join(path, "remove_null_space");
        if !self.store.have_option(&ns_path) {
            return Ok(None);
        }
        let sets: Vec<IndexSet> = self
            .sibling_sets(&ns_path, "null_space", parent)?
            .into_iter()
            .map(|(_, set)| set)
            .collect();
        let len = parent.map_or_else(|| self.layout.ownership_range().len(), DofSubset::len);
        let null_space = NullSpace::build(&sets, len)?;
        if let Some(ns) = &null_space {
            if self.store.have_option(&join(&ns_path, "monitors/view_null_space")) {
                ns.view(prefix);
            }
        }
        Ok(null_space)
    }

    fn preconditioner(
        &self,
        path: &str,
        prefix: &str,
        parent: Option<&DofSubset>,
    ) -> Result<PreconditionerNode, KError> {
        let name_path = join(path, "name");
        let name = self.store.get_string(&name_path)?;
        match name.as_str() {
            "ksp" => {
                let inner = self.compile(
                    &join(path, "linear_solver"),
                    &format!("{prefix}subksp_"),
                    parent,
                )?;
                Ok(PreconditionerNode::NestedSolver(Box::new(inner)))
            }
            "fieldsplit" => self.field_split(path, prefix, parent),
            "lu" => {
                let pkg_path = join(path, "factorization_package/name");
                let package =
                    FactorizationPackage::from_name(&pkg_path, &self.store.get_string(&pkg_path)?)?;
                Ok(PreconditionerNode::Direct(package))
            }
            other => Ok(PreconditionerNode::Simple(SimplePc::from_name(&name_path, other)?)),
        }
    }

    fn field_split(
        &self,
        path: &str,
        prefix: &str,
        parent: Option<&DofSubset>,
    ) -> Result<PreconditionerNode, KError> {
        let ctype_path = join(path, "composite_type/name");
        let composite = CompositeType::from_name(&ctype_path, &self.store.get_string(&ctype_path)?)?;

        let sets = self.sibling_sets(path, "fieldsplit", parent)?;
        if sets.is_empty() {
            return Err(KError::missing(join(path, "fieldsplit")));
        }
        if composite == CompositeType::Schur && sets.len() != 2 {
            return Err(KError::invalid(
                join(path, "fieldsplit"),
                format!("schur composition needs exactly 2 splits, found {}", sets.len()),
            ));
        }

        let mut splits = Vec::with_capacity(sets.len());
        for (entry, index_set) in sets {
            let solver = self.compile(
                &join(&entry, "linear_solver"),
                &format!("{prefix}{}_", index_set.name),
                Some(&index_set.subset),
            )?;
            splits.push(Split { name: index_set.name.clone(), index_set, solver });
        }
        Ok(PreconditionerNode::FieldSplit(FieldSplit { composite, splits }))
    }
}
