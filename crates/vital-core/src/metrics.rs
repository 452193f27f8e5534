//! # Metric Type Mapping
//!
//! Associates local metric names with the server-side numeric type ids.
//! Immutable; loaded once at startup from this fixed table. The server's
//! `GET /api/metrics/types` endpoint returns the same ids and is only used
//! to pick up display units.

/// One server-side metric type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricType {
    pub id: i64,
    pub name: &'static str,
    pub unit: &'static str,
}

/// Fixed name → id table, mirroring the server's seeded metric types.
pub const METRIC_TYPES: &[MetricType] = &[
    MetricType { id: 1, name: "weight", unit: "kg" },
    MetricType { id: 2, name: "height", unit: "cm" },
    MetricType { id: 3, name: "body_fat", unit: "%" },
    MetricType { id: 4, name: "muscle_mass", unit: "kg" },
    MetricType { id: 5, name: "waist", unit: "cm" },
    MetricType { id: 6, name: "chest", unit: "cm" },
    MetricType { id: 7, name: "hips", unit: "cm" },
    MetricType { id: 8, name: "biceps", unit: "cm" },
    MetricType { id: 9, name: "thigh", unit: "cm" },
    MetricType { id: 10, name: "neck", unit: "cm" },
];

/// Looks up the server type id for a local metric name.
pub fn metric_type_id(name: &str) -> Option<i64> {
    METRIC_TYPES.iter().find(|t| t.name == name).map(|t| t.id)
}

/// Looks up the local metric name for a server type id.
pub fn metric_type_name(id: i64) -> Option<&'static str> {
    METRIC_TYPES.iter().find(|t| t.id == id).map(|t| t.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_is_bijective() {
        for t in METRIC_TYPES {
            assert_eq!(metric_type_id(t.name), Some(t.id));
            assert_eq!(metric_type_name(t.id), Some(t.name));
        }
    }

    #[test]
    fn test_unknown_names_map_to_none() {
        assert_eq!(metric_type_id("shoe_size"), None);
        assert_eq!(metric_type_name(999), None);
    }

    #[test]
    fn test_ids_are_unique() {
        let mut ids: Vec<i64> = METRIC_TYPES.iter().map(|t| t.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), METRIC_TYPES.len());
    }
}
