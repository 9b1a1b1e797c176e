use std::fmt;

use crate::db::schema::{
    COSTS, COURIER_STAFF, ROUTES, SHIPMENT_TRACKING, SHIPMENTS, TableSpec, WAREHOUSES,
};
use crate::error::{LoadError, Result};

/// The kinds of records the pipeline loads, one table each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Courier,
    Route,
    Warehouse,
    Shipment,
    Cost,
    TrackingEvent,
}

impl Entity {
    /// Every entity, in declaration order
    pub const ALL: [Entity; 6] = [
        Entity::Courier,
        Entity::Route,
        Entity::Warehouse,
        Entity::Shipment,
        Entity::Cost,
        Entity::TrackingEvent,
    ];

    pub fn table(self) -> &'static TableSpec {
        match self {
            Entity::Courier => &COURIER_STAFF,
            Entity::Route => &ROUTES,
            Entity::Warehouse => &WAREHOUSES,
            Entity::Shipment => &SHIPMENTS,
            Entity::Cost => &COSTS,
            Entity::TrackingEvent => &SHIPMENT_TRACKING,
        }
    }

    /// Conventional source file name under a base directory
    pub fn file_name(self) -> &'static str {
        match self {
            Entity::Courier => "courier_staff.csv",
            Entity::Route => "routes.csv",
            Entity::Warehouse => "warehouses.json",
            Entity::Shipment => "shipments.json",
            Entity::Cost => "costs.csv",
            Entity::TrackingEvent => "shipment_tracking.csv",
        }
    }

    /// Entities whose rows must exist before this one is written
    pub fn dependencies(self) -> &'static [Entity] {
        match self {
            Entity::Courier | Entity::Route | Entity::Warehouse => &[],
            Entity::Shipment => &[Entity::Courier],
            Entity::Cost | Entity::TrackingEvent => &[Entity::Shipment],
        }
    }

    /// Parse a CLI name such as `courier` or `tracking`
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "courier" | "couriers" | "courier_staff" => Some(Entity::Courier),
            "route" | "routes" => Some(Entity::Route),
            "warehouse" | "warehouses" => Some(Entity::Warehouse),
            "shipment" | "shipments" => Some(Entity::Shipment),
            "cost" | "costs" => Some(Entity::Cost),
            "tracking" | "tracking_event" | "tracking_events" | "shipment_tracking" => {
                Some(Entity::TrackingEvent)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Courier => "courier",
            Entity::Route => "route",
            Entity::Warehouse => "warehouse",
            Entity::Shipment => "shipment",
            Entity::Cost => "cost",
            Entity::TrackingEvent => "tracking event",
        };
        f.write_str(name)
    }
}

/// Order in which entities must be loaded so that referenced rows exist first
pub fn load_order() -> Result<Vec<Entity>> {
    topological_order(&Entity::ALL, |e| e.dependencies())
}

/// Kahn's algorithm, always emitting the earliest declared ready node so the
/// order is stable. Dependencies outside `nodes` are ignored.
fn topological_order<F>(nodes: &[Entity], dependencies: F) -> Result<Vec<Entity>>
where
    F: Fn(Entity) -> &'static [Entity],
{
    let mut remaining: Vec<Entity> = nodes.to_vec();
    let mut ordered = Vec::with_capacity(nodes.len());

    while !remaining.is_empty() {
        let ready = remaining.iter().position(|candidate| {
            dependencies(*candidate)
                .iter()
                .all(|dep| !remaining.contains(dep))
        });

        match ready {
            Some(idx) => ordered.push(remaining.remove(idx)),
            None => return Err(LoadError::DependencyCycle(remaining[0])),
        }
    }

    Ok(ordered)
}
