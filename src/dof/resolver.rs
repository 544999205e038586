//! DOF Partition Resolver: field/component/region/boundary requests to owned DOF subsets.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::config::{OptionStore, join, nth};
use crate::dof::{DofLayout, DofSubset};
use crate::error::KError;

/// One `field` entry of an index-set specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldRequest {
    pub name: String,
    /// Requested sub-components (all of them when `None`).
    pub components: Option<Vec<usize>>,
    /// Restrict to DOFs of cells carrying one of these region ids.
    pub region_ids: Option<Vec<i64>>,
    /// Restrict to DOFs of facets carrying one of these boundary ids.
    pub boundary_ids: Option<Vec<i64>>,
}

impl FieldRequest {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), ..Default::default() }
    }

    pub fn components(mut self, components: Vec<usize>) -> Self {
        self.components = Some(components);
        self
    }

    pub fn regions(mut self, ids: Vec<i64>) -> Self {
        self.region_ids = Some(ids);
        self
    }

    pub fn boundaries(mut self, ids: Vec<i64>) -> Self {
        self.boundary_ids = Some(ids);
        self
    }
}

/// A named DOF subset request, as found under a `fieldsplit` or `null_space` option.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubsetSpec {
    pub name: String,
    /// Empty means every DOF of the system.
    pub fields: Vec<FieldRequest>,
    /// Log the composed index set.
    pub view: bool,
}

impl SubsetSpec {
    pub fn new(name: &str, fields: Vec<FieldRequest>) -> Self {
        Self { name: name.to_string(), fields, view: false }
    }

    /// Read `{path}/name`, `{path}/field[j]/...` and `{path}/monitors/view_index_set`.
    pub fn from_options(store: &dyn OptionStore, path: &str) -> Result<Self, KError> {
        let name = store.get_string(&join(path, "name"))?;
        let nfields = store.option_count(&join(path, "field"));
        let mut fields = Vec::with_capacity(nfields);
        for j in 0..nfields {
            let fpath = nth(path, "field", j);
            let mut request = FieldRequest::new(&store.get_string(&join(&fpath, "name"))?);
            let cpath = join(&fpath, "components");
            if store.have_option(&cpath) {
                request.components = Some(store.get_usize_list(&cpath)?);
            }
            let rpath = join(&fpath, "region_ids");
            if store.have_option(&rpath) {
                request.region_ids = Some(store.get_int_list(&rpath)?);
            }
            let bpath = join(&fpath, "boundary_ids");
            if store.have_option(&bpath) {
                request.boundary_ids = Some(store.get_int_list(&bpath)?);
            }
            fields.push(request);
        }
        Ok(Self {
            name,
            fields,
            view: store.have_option(&join(path, "monitors/view_index_set")),
        })
    }
}

/// Compute the owned, sorted DOF subset denoted by `spec`.
///
/// Without fields this is the whole system DOF map. Each field contributes the DOFs of its
/// requested components, restricted to tagged cells and/or facets when region or boundary ids are
/// given (the two restrictions are unioned). Indices are gathered in a hash set and sorted once,
/// so the result does not depend on traversal order.
pub fn resolve(layout: &dyn DofLayout, spec: &SubsetSpec) -> Result<DofSubset, KError> {
    let owned = layout.ownership_range();
    if spec.fields.is_empty() {
        return Ok(DofSubset::from_unsorted(layout.system_dofs(), owned));
    }

    let mut dofs: FxHashSet<usize> = FxHashSet::default();
    for request in &spec.fields {
        let field = layout
            .field_index(&request.name)
            .ok_or_else(|| KError::UnknownField { name: request.name.clone() })?;
        for component in components(layout, field, request)? {
            collect_component(layout, field, component, request, &mut dofs);
        }
    }
    Ok(DofSubset::from_unsorted(dofs, owned))
}

/// Validated component selection of a field request.
fn components(
    layout: &dyn DofLayout,
    field: usize,
    request: &FieldRequest,
) -> Result<Vec<Option<usize>>, KError> {
    let num_sub_elements = layout.num_sub_elements(field);
    match &request.components {
        Some(list) => list
            .iter()
            .map(|&component| {
                if component >= num_sub_elements {
                    Err(KError::ComponentOutOfRange {
                        field: request.name.clone(),
                        component,
                        num_sub_elements,
                    })
                } else {
                    Ok(Some(component))
                }
            })
            .collect(),
        None if num_sub_elements == 0 => Ok(vec![None]),
        None => Ok((0..num_sub_elements).map(Some).collect()),
    }
}

fn collect_component(
    layout: &dyn DofLayout,
    field: usize,
    component: Option<usize>,
    request: &FieldRequest,
    dofs: &mut FxHashSet<usize>,
) {
    if request.region_ids.is_none() && request.boundary_ids.is_none() {
        dofs.extend(layout.component_dofs(field, component));
        return;
    }
    if let Some(regions) = &request.region_ids {
        for cell in 0..layout.num_cells() {
            if regions.contains(&layout.cell_region(cell)) {
                dofs.extend(layout.cell_dofs(field, component, cell));
            }
        }
    }
    if let Some(boundaries) = &request.boundary_ids {
        for facet in 0..layout.num_facets() {
            if boundaries.contains(&layout.facet_boundary(facet)) {
                dofs.extend(layout.facet_dofs(field, component, facet));
            }
        }
    }
}
