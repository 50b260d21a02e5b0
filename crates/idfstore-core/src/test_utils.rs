//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::catalog::SchemaCatalog;
use crate::config::StoreConfig;
use crate::id::ObjectHandle;
use crate::instance::Instance;
use crate::store::Store;
use std::sync::Arc;

// ===========================================================================
// Schema
// ===========================================================================

/// A small building-model schema: a unique required `Version`, zones,
/// walls that name a zone, windows that name a wall, an extensible zone
/// list and a fan with an autosizable flow rate.
pub const SCHEMA: &str = r"!IDD_Version 1.2.0

\group Simulation Parameters

Version,
       \unique-object
       \required-object
  A1 ; \field Version Identifier
       \required-field
       \default 1.2

Building,
       \unique-object
  A1 , \field Name
       \required-field
  N1 ; \field North Axis
       \units deg
       \default 0

\group Thermal Zones

Zone,
       \memo Defines a thermal zone
  A1 , \field Name
       \required-field
       \reference ZoneNames
  N1 , \field Direction of Relative North
       \units deg
       \default 0
       \minimum 0
       \maximum< 360
  N2 ; \field Multiplier
       \type integer
       \default 1
       \minimum> 0

ZoneList,
       \extensible:1
  A1 , \field Name
       \required-field
       \reference ZoneListNames
  A2 ; \field Zone 1 Name
       \begin-extensible
       \object-list ZoneNames

\group Surfaces

Wall,
       \min-fields 2
  A1 , \field Name
       \required-field
       \reference SurfaceNames
  A2 , \field Zone Name
       \required-field
       \object-list ZoneNames
  A3 ; \field Outside Boundary Condition
       \key Outdoors
       \key Ground
       \default Outdoors

Window,
  A1 , \field Name
       \required-field
       \reference SubSurfaceNames
  A2 ; \field Building Surface Name
       \required-field
       \object-list SurfaceNames

\group HVAC

Fan,
  A1 , \field Name
       \required-field
  N1 ; \field Maximum Flow Rate
       \units m3/s
       \autosizable
       \minimum> 0
";

/// A complete model over [`SCHEMA`] that validates cleanly at every
/// strictness.
pub const SAMPLE_FILE: &str = "!IDF_Version 1.2.0
! sample model

Version,
  1.2;                                !- Version Identifier

Building,
  HQ,                                 !- Name
  30;                                 !- North Axis

! ground floor
Zone,
  Z1,                                 !- Name
  0,                                  !- Direction of Relative North
  1;                                  !- Multiplier

Zone,
  Z2,                                 !- Name
  90,                                 !- Direction of Relative North
  2;                                  !- Multiplier

Wall,
  W1,                                 !- Name
  Z1,                                 !- Zone Name
  Outdoors;                           !- Outside Boundary Condition

Wall,
  W2,                                 !- Name
  Z2;                                 !- Zone Name

Window,
  Win1,                               !- Name
  W1;                                 !- Building Surface Name

ZoneList,
  All Zones,                          !- Name
  Z1,                                 !- Zone 1 Name
  Z2;                                 !- Zone 2 Name

Fan,
  Supply Fan,                         !- Name
  autosize;                           !- Maximum Flow Rate
";

pub fn catalog() -> SchemaCatalog {
    SchemaCatalog::parse(SCHEMA).expect("test schema parses")
}

pub fn shared_catalog() -> Arc<SchemaCatalog> {
    Arc::new(catalog())
}

// ===========================================================================
// Instance constructors
// ===========================================================================

/// An instance of the named type. Empty strings become absent values.
pub fn instance(store: &Store, type_name: &str, values: &[&str]) -> Instance {
    let type_id = store
        .catalog()
        .type_id(type_name)
        .unwrap_or_else(|| panic!("unknown test type {type_name}"));
    let values: Vec<Option<&str>> = values.iter().map(|v| Some(*v)).collect();
    Instance::from_values(type_id, &values)
}

// ===========================================================================
// Store builders
// ===========================================================================

pub fn empty_store() -> Store {
    Store::new(shared_catalog())
}

/// [`SAMPLE_FILE`] loaded with the default configuration.
pub fn sample_store() -> Store {
    Store::parse(SAMPLE_FILE, shared_catalog(), StoreConfig::default()).expect("sample file parses")
}

/// `zones` zones, each with `walls_per_zone` walls referencing it.
pub fn zoned_store(zones: usize, walls_per_zone: usize) -> (Store, Vec<ObjectHandle>) {
    let mut store = empty_store();
    let mut zone_handles = Vec::with_capacity(zones);
    for z in 0..zones {
        let zone_name = format!("Zone {z}");
        let zone = instance(&store, "Zone", &[&zone_name]);
        zone_handles.push(store.add(zone).expect("zone type exists"));
        for w in 0..walls_per_zone {
            let wall = instance(&store, "Wall", &[&format!("Wall {z}-{w}"), &zone_name]);
            store.add(wall).expect("wall type exists");
        }
    }
    (store, zone_handles)
}
