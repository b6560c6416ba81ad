//! Instance-type selection.
//!
//! Given a per-unit demand vector and an architecture, walk the
//! cpu-ascending allow-list and take the first entry whose cpu and
//! memory both cover the demand — the smallest sufficient type. One
//! instance must be able to host at least one typical pending task; the
//! selector does not bin-pack multiple tasks per instance.
//!
//! When nothing fits, the configured fallback type (by name) is used if
//! present; otherwise selection stalls and the caller reports it without
//! launching anything.

use tracing::debug;

use flotilla_state::{InstanceType, ResourceVector};

use crate::catalog::InstanceCatalog;
use crate::error::{CatalogError, CatalogResult};

/// Pick the smallest allow-listed type for `arch` that covers `demand`.
///
/// Deterministic: identical catalog + demand always return the identical
/// entry. Ties on cpu/mem resolve to the first entry in catalog order.
pub fn select_type<'a>(
    catalog: &'a InstanceCatalog,
    demand: &ResourceVector,
    arch: &str,
    fallback: Option<&str>,
) -> CatalogResult<&'a InstanceType> {
    for entry in catalog.for_arch(arch) {
        if entry.cpus >= demand.cpus && entry.mem >= demand.mem {
            debug!(
                instance_type = %entry.name,
                arch,
                cpus = demand.cpus,
                mem = demand.mem,
                "selected instance type"
            );
            return Ok(entry);
        }
    }

    if let Some(name) = fallback
        && let Some(entry) = catalog.get(name)
    {
        debug!(instance_type = %entry.name, arch, "no sufficient type, using fallback");
        return Ok(entry);
    }

    Err(CatalogError::Stall {
        arch: arch.to_string(),
        demand: *demand,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, cpus: f64, mem: f64) -> InstanceType {
        InstanceType {
            name: name.to_string(),
            cpus,
            mem,
            arch: "x86_64".to_string(),
        }
    }

    fn two_type_catalog() -> InstanceCatalog {
        InstanceCatalog::new(vec![
            entry("t2.small", 1.0, 2048.0),
            entry("t2.large", 4.0, 8192.0),
        ])
        .unwrap()
    }

    #[test]
    fn picks_smallest_sufficient_type() {
        let catalog = two_type_catalog();
        // cpu 3 / 5 GiB overflows the small type; the large covers it.
        let demand = ResourceVector::cpu_mem(3.0, 5120.0);
        let selected = select_type(&catalog, &demand, "x86_64", None).unwrap();
        assert_eq!(selected.name, "t2.large");

        // A small task fits the small type.
        let demand = ResourceVector::cpu_mem(0.5, 1024.0);
        let selected = select_type(&catalog, &demand, "x86_64", None).unwrap();
        assert_eq!(selected.name, "t2.small");
    }

    #[test]
    fn selection_is_deterministic() {
        let catalog = two_type_catalog();
        let demand = ResourceVector::cpu_mem(2.0, 4096.0);
        let first = select_type(&catalog, &demand, "x86_64", None).unwrap().name.clone();
        for _ in 0..10 {
            let again = select_type(&catalog, &demand, "x86_64", None).unwrap();
            assert_eq!(again.name, first);
        }
    }

    #[test]
    fn identical_shapes_tie_break_on_catalog_order() {
        let catalog = InstanceCatalog::new(vec![
            entry("typeA", 2.0, 4096.0),
            entry("typeB", 2.0, 4096.0),
        ])
        .unwrap();
        let demand = ResourceVector::cpu_mem(1.0, 1024.0);
        let selected = select_type(&catalog, &demand, "x86_64", None).unwrap();
        assert_eq!(selected.name, "typeA");
    }

    #[test]
    fn stall_when_nothing_fits_and_no_fallback() {
        let catalog = two_type_catalog();
        // cpu 10 exceeds the largest type.
        let demand = ResourceVector::cpu_mem(10.0, 1024.0);
        let result = select_type(&catalog, &demand, "x86_64", None);
        assert!(matches!(result, Err(CatalogError::Stall { .. })));
    }

    #[test]
    fn fallback_used_when_nothing_fits() {
        let catalog = two_type_catalog();
        let demand = ResourceVector::cpu_mem(10.0, 1024.0);
        let selected = select_type(&catalog, &demand, "x86_64", Some("t2.large")).unwrap();
        assert_eq!(selected.name, "t2.large");
    }

    #[test]
    fn unknown_arch_stalls() {
        let catalog = two_type_catalog();
        let demand = ResourceVector::cpu_mem(1.0, 1024.0);
        let result = select_type(&catalog, &demand, "arm64", None);
        assert!(matches!(result, Err(CatalogError::Stall { .. })));
    }
}
