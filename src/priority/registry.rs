use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::config::PriorityTable;
use crate::error::ConfigError;
use crate::pass::{FusionType, FusionTypeMap, PassDescriptor};

use super::band::band_of;

/// Total execution order of every known pass, per fusion type
///
/// Configured priorities are placed first. Registered passes that the
/// configuration does not mention then use their explicit priority, or the
/// lowest free value of their band, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriorityRegistry {
    orders: FusionTypeMap<Vec<(u32, String)>>,
    index: FusionTypeMap<FxHashMap<String, u32>>,
}

impl PriorityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the orders with the configured tables alone
    ///
    /// The registry is unchanged when the tables are inconsistent.
    pub fn load(&mut self, tables: &FusionTypeMap<PriorityTable>) -> Result<(), ConfigError> {
        *self = Self::with_registrations(tables, std::iter::empty::<&PassDescriptor>())?;
        Ok(())
    }

    /// Build from configured tables plus registered passes
    pub fn with_registrations<'a>(
        tables: &FusionTypeMap<PriorityTable>,
        registrations: impl IntoIterator<Item = &'a PassDescriptor>,
    ) -> Result<Self, ConfigError> {
        let registrations: Vec<&PassDescriptor> = registrations.into_iter().collect();
        let orders = tables.try_map(|fusion_type, table| {
            let own = registrations.iter().copied().filter(|d| d.fusion_type == fusion_type);
            build_order(fusion_type, table, own)
        })?;

        let index = FusionTypeMap::from_fn(|fusion_type| {
            orders
                .get(fusion_type)
                .iter()
                .map(|(priority, name)| (name.clone(), *priority))
                .collect()
        });

        Ok(Self { orders, index })
    }

    /// Pass names of a fusion type in ascending priority
    pub fn order_for(&self, fusion_type: FusionType) -> Vec<&str> {
        self.orders
            .get(fusion_type)
            .iter()
            .map(|(_, name)| name.as_str())
            .collect()
    }

    /// `(priority, name)` pairs of a fusion type in ascending priority
    pub fn iter(&self, fusion_type: FusionType) -> impl Iterator<Item = (u32, &str)> {
        self.orders
            .get(fusion_type)
            .iter()
            .map(|(priority, name)| (*priority, name.as_str()))
    }

    /// Effective priority of a pass
    pub fn priority_of(&self, fusion_type: FusionType, name: &str) -> Option<u32> {
        self.index.get(fusion_type).get(name).copied()
    }

    /// Number of ordered passes in a fusion type
    pub fn len(&self, fusion_type: FusionType) -> usize {
        self.orders.get(fusion_type).len()
    }

    /// Check if no pass is ordered in any fusion type
    pub fn is_empty(&self) -> bool {
        self.orders.iter().all(|(_, order)| order.is_empty())
    }
}

fn claim(
    fusion_type: FusionType,
    by_value: &mut BTreeMap<u32, String>,
    priority: u32,
    name: &str,
) -> Result<(), ConfigError> {
    if let Some(first) = by_value.get(&priority) {
        return Err(ConfigError::PriorityConflict {
            fusion_type,
            priority,
            first: first.clone(),
            second: name.to_string(),
        });
    }
    by_value.insert(priority, name.to_string());
    Ok(())
}

fn build_order<'a>(
    fusion_type: FusionType,
    table: &PriorityTable,
    registrations: impl Iterator<Item = &'a PassDescriptor>,
) -> Result<Vec<(u32, String)>, ConfigError> {
    let mut by_value: BTreeMap<u32, String> = BTreeMap::new();
    for (name, entry) in table.iter() {
        claim(fusion_type, &mut by_value, entry.priority, name)?;
    }

    let mut seen: FxHashSet<&str> = FxHashSet::default();
    let mut pending = Vec::new();
    for desc in registrations {
        if table.contains(&desc.name) || !seen.insert(desc.name.as_str()) {
            continue;
        }
        let band = band_of(desc.owner, desc.level);
        match desc.priority {
            Some(priority) if !band.contains(priority) => {
                return Err(ConfigError::RegistrationOutOfBand {
                    fusion_type,
                    pass: desc.name.clone(),
                    priority,
                    band,
                });
            }
            Some(priority) => claim(fusion_type, &mut by_value, priority, &desc.name)?,
            None => pending.push((desc, band)),
        }
    }

    // allocation runs after every explicit value is claimed
    for (desc, band) in pending {
        let priority = band
            .values()
            .find(|v| !by_value.contains_key(v))
            .ok_or_else(|| ConfigError::BandExhausted {
                fusion_type,
                owner: desc.owner,
                level: desc.level,
                band,
                pass: desc.name.clone(),
            })?;
        debug!(%fusion_type, pass = %desc.name, priority, "allocated default priority");
        by_value.insert(priority, desc.name.clone());
    }

    Ok(by_value.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PriorityEntry;
    use crate::pass::{OwnerType, PriorityLevel};
    use crate::priority::PriorityBand;

    fn table(entries: &[(&str, u32, OwnerType)]) -> PriorityTable {
        let mut table = PriorityTable::new();
        for (name, priority, owner) in entries {
            table.insert_if_absent(
                name,
                PriorityEntry {
                    priority: *priority,
                    owner: *owner,
                    level: PriorityLevel::Top,
                },
            );
        }
        table
    }

    fn graph_tables(graph: PriorityTable) -> FusionTypeMap<PriorityTable> {
        FusionTypeMap {
            graph,
            buffer: PriorityTable::new(),
        }
    }

    #[test]
    fn test_order_ascending() {
        let tables = graph_tables(table(&[
            ("C", 3050, OwnerType::BuiltIn),
            ("A", 10, OwnerType::Custom),
            ("B", 3010, OwnerType::BuiltIn),
        ]));
        let mut registry = PriorityRegistry::new();
        registry.load(&tables).unwrap();

        assert_eq!(registry.order_for(FusionType::Graph), vec!["A", "B", "C"]);
        assert!(registry.order_for(FusionType::Buffer).is_empty());
        assert_eq!(registry.priority_of(FusionType::Graph, "B"), Some(3010));
    }

    #[test]
    fn test_config_priority_wins_over_registration() {
        let tables = graph_tables(table(&[("A", 5, OwnerType::Custom)]));
        let desc = PassDescriptor::graph("A").priority(8500);
        let registry = PriorityRegistry::with_registrations(&tables, [&desc]).unwrap();
        assert_eq!(registry.priority_of(FusionType::Graph, "A"), Some(5));
    }

    #[test]
    fn test_allocation_lowest_free_in_band() {
        let explicit = PassDescriptor::graph("X").priority(8000);
        let first = PassDescriptor::graph("P1");
        let second = PassDescriptor::graph("P2");
        let rule = PassDescriptor::buffer("R").custom();

        let registry = PriorityRegistry::with_registrations(
            &FusionTypeMap::default(),
            [&first, &explicit, &second, &rule],
        )
        .unwrap();

        assert_eq!(registry.priority_of(FusionType::Graph, "X"), Some(8000));
        assert_eq!(registry.priority_of(FusionType::Graph, "P1"), Some(8001));
        assert_eq!(registry.priority_of(FusionType::Graph, "P2"), Some(8002));
        assert_eq!(registry.priority_of(FusionType::Buffer, "R"), Some(7000));
        assert_eq!(registry.order_for(FusionType::Graph), vec!["X", "P1", "P2"]);
    }

    #[test]
    fn test_registration_conflict() {
        let tables = graph_tables(table(&[("A", 3010, OwnerType::BuiltIn)]));
        let desc = PassDescriptor::graph("B").level(PriorityLevel::Top).priority(3010);
        let err = PriorityRegistry::with_registrations(&tables, [&desc]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::PriorityConflict { priority: 3010, ref first, ref second, .. }
                if first == "A" && second == "B"
        ));
    }

    #[test]
    fn test_registration_out_of_band() {
        let desc = PassDescriptor::graph("B").custom().priority(8500);
        let err = PriorityRegistry::with_registrations(&FusionTypeMap::default(), [&desc]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::RegistrationOutOfBand { band, .. } if band == PriorityBand::new(6000, 7000)
        ));
    }

    #[test]
    fn test_band_exhausted() {
        let descs: Vec<PassDescriptor> = (0..1001)
            .map(|i| PassDescriptor::buffer(format!("R{i}")).custom())
            .collect();
        let err = PriorityRegistry::with_registrations(&FusionTypeMap::default(), &descs).unwrap_err();
        assert!(matches!(err, ConfigError::BandExhausted { ref pass, .. } if pass == "R1000"));
    }

    #[test]
    fn test_conflicting_tables_leave_registry_unchanged() {
        let mut registry = PriorityRegistry::new();
        registry
            .load(&graph_tables(table(&[("A", 1, OwnerType::Custom)])))
            .unwrap();

        let bad = graph_tables(table(&[("B", 2, OwnerType::Custom), ("C", 2, OwnerType::Custom)]));
        assert!(registry.load(&bad).is_err());
        assert_eq!(registry.order_for(FusionType::Graph), vec!["A"]);
    }
}
