#![no_main]
use arbitrary::Arbitrary;
use idfstore_core::config::RemovalPolicy;
use idfstore_core::id::ObjectHandle;
use idfstore_core::test_utils::*;
use libfuzzer_sys::fuzz_target;

/// A structured store operation for fuzzing.
#[derive(Arbitrary, Debug)]
enum FuzzOp {
    AddZone { name: u8 },
    AddWall { name: u8, zone: u8 },
    AddList { name: u8, zones: Vec<u8> },
    SetField { index: u8, field: u8, value: u8 },
    PushGroup { index: u8, value: u8 },
    RemoveGroup { index: u8, group: u8 },
    Remove { index: u8, cascade: bool },
}

/// Top-level fuzz input: a sequence of operations.
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    ops: Vec<FuzzOp>,
}

fn name(n: u8) -> String {
    match n % 8 {
        7 => String::new(),
        k => format!("N{k}"),
    }
}

fuzz_target!(|input: FuzzInput| {
    let mut store = empty_store();

    // Limit operations to prevent timeouts.
    let max_ops = input.ops.len().min(200);

    for op in &input.ops[..max_ops] {
        let handles: Vec<ObjectHandle> = store.iter().map(|o| o.handle()).collect();
        let pick = |i: u8| (!handles.is_empty()).then(|| handles[i as usize % handles.len()]);
        match op {
            FuzzOp::AddZone { name: n } => {
                let zone = instance(&store, "Zone", &[&name(*n)]);
                let _ = store.add(zone);
            }
            FuzzOp::AddWall { name: n, zone } => {
                let wall = instance(&store, "Wall", &[&name(*n), &name(*zone)]);
                let _ = store.add(wall);
            }
            FuzzOp::AddList { name: n, zones } => {
                let mut values = vec![name(*n)];
                values.extend(zones.iter().take(16).map(|z| name(*z)));
                let refs: Vec<&str> = values.iter().map(String::as_str).collect();
                let list = instance(&store, "ZoneList", &refs);
                let _ = store.add(list);
            }
            FuzzOp::SetField { index, field, value } => {
                if let Some(h) = pick(*index) {
                    let _ = store.set_field(h, (*field % 8) as usize, &name(*value));
                }
            }
            FuzzOp::PushGroup { index, value } => {
                if let Some(h) = pick(*index) {
                    let _ = store.push_extensible_group(h, &[&name(*value)]);
                }
            }
            FuzzOp::RemoveGroup { index, group } => {
                if let Some(h) = pick(*index) {
                    let _ = store.remove_extensible_group(h, *group as usize);
                }
            }
            FuzzOp::Remove { index, cascade } => {
                if let Some(h) = pick(*index) {
                    let policy = if *cascade {
                        RemovalPolicy::Cascade
                    } else {
                        RemovalPolicy::Detach
                    };
                    let _ = store.remove(h, policy);
                }
            }
        }
        assert!(store.index_violations().is_empty());
    }
});
