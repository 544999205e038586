//! Piecewise-linear DOF layout on a 1D interval mesh.
//!
//! `n` cells, `n + 1` vertices, every field component carries one DOF per vertex. Numbering is
//! blocked: field by field, component by component, vertex by vertex. Facets are the vertices;
//! the left end carries boundary id 1, the right end boundary id 2 and interior facets 0.

use std::ops::Range;

use super::DofLayout;

#[derive(Debug, Clone)]
struct FieldDef {
    name: String,
    num_sub_elements: usize,
    offset: usize,
}

#[derive(Debug, Clone)]
pub struct IntervalLayout {
    ncells: usize,
    fields: Vec<FieldDef>,
    regions: Vec<i64>,
    owned: Option<Range<usize>>,
}

impl IntervalLayout {
    pub fn new(ncells: usize) -> Self {
        Self { ncells, fields: Vec::new(), regions: vec![0; ncells], owned: None }
    }

    fn nverts(&self) -> usize {
        self.ncells + 1
    }

    /// Add a field with `num_sub_elements` components (0 for a scalar).
    pub fn with_field(mut self, name: &str, num_sub_elements: usize) -> Self {
        let offset = self.global_size();
        self.fields.push(FieldDef { name: name.to_string(), num_sub_elements, offset });
        self
    }

    /// Tag the cells with region ids (one per cell).
    pub fn with_regions(mut self, regions: Vec<i64>) -> Self {
        assert_eq!(regions.len(), self.ncells, "one region id per cell");
        self.regions = regions;
        self
    }

    /// Restrict ownership, as one process of a partitioned run would see it.
    pub fn with_ownership(mut self, owned: Range<usize>) -> Self {
        self.owned = Some(owned);
        self
    }

    fn dof(&self, field: usize, component: usize, vertex: usize) -> usize {
        self.fields[field].offset + component * self.nverts() + vertex
    }

    fn components(&self, field: usize, component: Option<usize>) -> Range<usize> {
        match component {
            Some(c) => c..c + 1,
            None => 0..self.fields[field].num_sub_elements.max(1),
        }
    }

    fn vertex_dofs(&self, field: usize, component: Option<usize>, verts: Range<usize>) -> Vec<usize> {
        self.components(field, component)
            .flat_map(|c| verts.clone().map(move |v| (c, v)))
            .map(|(c, v)| self.dof(field, c, v))
            .collect()
    }
}

impl DofLayout for IntervalLayout {
    fn ownership_range(&self) -> Range<usize> {
        self.owned.clone().unwrap_or(0..self.global_size())
    }

    fn global_size(&self) -> usize {
        self.fields
            .iter()
            .map(|f| f.num_sub_elements.max(1) * self.nverts())
            .sum()
    }

    fn system_dofs(&self) -> Vec<usize> {
        (0..self.global_size()).collect()
    }

    fn num_fields(&self) -> usize {
        self.fields.len()
    }

    fn field_name(&self, field: usize) -> &str {
        &self.fields[field].name
    }

    fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    fn num_sub_elements(&self, field: usize) -> usize {
        self.fields[field].num_sub_elements
    }

    fn component_dofs(&self, field: usize, component: Option<usize>) -> Vec<usize> {
        self.vertex_dofs(field, component, 0..self.nverts())
    }

    fn num_cells(&self) -> usize {
        self.ncells
    }

    fn cell_region(&self, cell: usize) -> i64 {
        self.regions[cell]
    }

    fn cell_dofs(&self, field: usize, component: Option<usize>, cell: usize) -> Vec<usize> {
        self.vertex_dofs(field, component, cell..cell + 2)
    }

    fn num_facets(&self) -> usize {
        self.nverts()
    }

    fn facet_boundary(&self, facet: usize) -> i64 {
        if facet == 0 {
            1
        } else if facet == self.ncells {
            2
        } else {
            0
        }
    }

    fn facet_dofs(&self, field: usize, component: Option<usize>, facet: usize) -> Vec<usize> {
        self.vertex_dofs(field, component, facet..facet + 1)
    }
}
