//! Instance-type catalog.
//!
//! Wraps the operator-approved allow-list in the ordering the selector
//! depends on: cpu ascending, memory ascending as tie-break. That
//! ordering is what makes "first sufficient entry" mean "smallest
//! sufficient type". Input order from the config file is not trusted —
//! the catalog sorts on construction.

use flotilla_state::InstanceType;

use crate::error::{CatalogError, CatalogResult};

/// Sorted, validated view over the allow-list.
#[derive(Debug, Clone)]
pub struct InstanceCatalog {
    entries: Vec<InstanceType>,
}

impl InstanceCatalog {
    /// Build a catalog from allow-list entries. Rejects duplicate names;
    /// sorting is stable, so entries with identical cpu/mem keep their
    /// config-file order.
    pub fn new(mut entries: Vec<InstanceType>) -> CatalogResult<Self> {
        let mut names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        names.sort_unstable();
        for pair in names.windows(2) {
            if pair[0] == pair[1] {
                return Err(CatalogError::DuplicateName(pair[0].to_string()));
            }
        }

        entries.sort_by(|a, b| {
            a.cpus
                .total_cmp(&b.cpus)
                .then_with(|| a.mem.total_cmp(&b.mem))
        });
        Ok(Self { entries })
    }

    /// All entries, cpu-ascending.
    pub fn entries(&self) -> &[InstanceType] {
        &self.entries
    }

    /// Entries for one architecture, preserving catalog order. The
    /// `arch` borrow is independent of the catalog borrow, so callers
    /// may query with a short-lived string.
    pub fn for_arch<'s, 'q>(
        &'s self,
        arch: &'q str,
    ) -> impl Iterator<Item = &'s InstanceType> + use<'s, 'q> {
        self.entries.iter().filter(move |e| e.arch == arch)
    }

    /// Lookup by type name.
    pub fn get(&self, name: &str) -> Option<&InstanceType> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
