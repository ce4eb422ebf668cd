// Property-based tests for store and coordinator invariants.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use quickslot_core::{CellLocation, ContainerKind, OwnerHandle, SlotKey};
use quickslot_engine::backend::MemoryBackend;
use quickslot_engine::coordinator::{DragPayload, DropOutcome};
use quickslot_engine::harness::CoordinatorHarness;
use quickslot_engine::migration::{migrate_document, migrate_legacy, LegacyStores};
use quickslot_engine::model::{CellRecord, DefaultLayout, State};
use quickslot_engine::resize::ResizeGesture;
use quickslot_engine::resolver::CellContext;
use quickslot_engine::store::{PersistenceManager, StoreOptions};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

fn config_64() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(64),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

const REFERENCES: usize = 6;

fn reference(i: usize) -> String {
    format!("item:{}", i)
}

/// Any cell of the default layout, weapon sets included.
fn arb_location() -> impl Strategy<Value = CellLocation> {
    prop_oneof![
        4 => (0..3usize, 0..5usize).prop_map(|(i, c)| CellLocation::new(ContainerKind::Hotbar, i, SlotKey::new(c, 0))),
        2 => (0..3usize, 0..2usize).prop_map(|(i, c)| CellLocation::new(ContainerKind::WeaponSet, i, SlotKey::new(c, 0))),
        2 => (0..3usize, 0..2usize).prop_map(|(c, r)| CellLocation::new(ContainerKind::QuickAccess, 0, SlotKey::new(c, r))),
    ]
}

fn arb_hotbar_location() -> impl Strategy<Value = CellLocation> {
    (0..3usize, 0..5usize).prop_map(|(i, c)| CellLocation::new(ContainerKind::Hotbar, i, SlotKey::new(c, 0)))
}

#[derive(Debug, Clone)]
enum Gesture {
    External { target: CellLocation, reference: usize },
    Drag { source: CellLocation, target: CellLocation },
    Remove { target: CellLocation },
    ActivateSet { index: usize },
}

fn arb_gesture() -> impl Strategy<Value = Gesture> {
    prop_oneof![
        4 => (arb_location(), 0..REFERENCES).prop_map(|(target, reference)| Gesture::External { target, reference }),
        4 => (arb_location(), arb_location()).prop_map(|(source, target)| Gesture::Drag { source, target }),
        1 => arb_location().prop_map(|target| Gesture::Remove { target }),
        1 => (0..3usize).prop_map(|index| Gesture::ActivateSet { index }),
    ]
}

fn harness() -> CoordinatorHarness {
    let h = CoordinatorHarness::new();
    for i in 0..REFERENCES {
        h.documents.add_item(&reference(i), &format!("Item {}", i));
    }
    h
}

fn apply(h: &mut CoordinatorHarness, gesture: &Gesture) -> DropOutcome {
    match gesture {
        Gesture::External { target, reference: r } => h.drop_document(&CellContext::top(*target), &reference(*r)),
        Gesture::Drag { source, target } => h.drag(&CellContext::top(*source), &CellContext::top(*target)).unwrap(),
        Gesture::Remove { target } => {
            h.coordinator.remove_cell(&CellContext::top(*target)).unwrap();
            DropOutcome::NoChange
        }
        Gesture::ActivateSet { index } => {
            h.store.set_active_weapon_set(*index).unwrap();
            DropOutcome::NoChange
        }
    }
}

/// References held outside weapon sets, with their locations.
fn duplicates_outside_sets(state: &State) -> Vec<String> {
    let mut seen = HashSet::new();
    state
        .occupied_locations()
        .into_iter()
        .filter(|(loc, _)| loc.container != ContainerKind::WeaponSet)
        .filter(|(_, r)| !seen.insert(r.reference_id.clone()))
        .map(|(loc, r)| format!("{} at {}", r.reference_id, loc))
        .collect()
}

// ---------------------------------------------------------------------------
// Uniqueness
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn uniqueness_holds_after_every_gesture(gestures in proptest::collection::vec(arb_gesture(), 1..40)) {
        let mut h = harness();
        for gesture in &gestures {
            apply(&mut h, gesture);
            let state = h.store.load().unwrap();
            let dupes = duplicates_outside_sets(&state);
            prop_assert!(dupes.is_empty(), "after {:?}: {:?}", gesture, dupes);
        }
    }
}

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn duplicate_external_drop_changes_nothing(
        first in arb_hotbar_location(),
        second in arb_hotbar_location(),
    ) {
        prop_assume!(first != second);
        let mut h = harness();
        h.drop_document(&CellContext::top(first), "item:0");
        let before = h.store.load().unwrap();
        let warnings = h.notifier.warnings().len();

        let outcome = h.drop_document(&CellContext::top(second), "item:0");
        prop_assert!(matches!(outcome, DropOutcome::Rejected(_)));
        prop_assert_eq!(h.store.load().unwrap(), before);
        prop_assert_eq!(h.notifier.warnings().len(), warnings + 1);
    }
}

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn swap_exchanges_records(a in 0..5usize, b in 0..5usize, grid in 0..3usize) {
        prop_assume!(a != b);
        let mut h = harness();
        let x = CellLocation::new(ContainerKind::Hotbar, grid, SlotKey::new(a, 0));
        let y = CellLocation::new(ContainerKind::Hotbar, grid, SlotKey::new(b, 0));
        h.drop_document(&CellContext::top(x), "item:0");
        h.drop_document(&CellContext::top(y), "item:1");

        h.coordinator.handle_drag_start(&CellContext::top(x)).unwrap();
        let outcome = h
            .coordinator
            .handle_drop(&CellContext::top(y), &DragPayload::Slot { slot_key: x.slot_key })
            .unwrap();
        prop_assert_eq!(outcome, DropOutcome::Swapped);
        prop_assert_eq!(h.store.find_reference_in_store("item:0", &[]), Some(y));
        prop_assert_eq!(h.store.find_reference_in_store("item:1", &[]), Some(x));
    }
}

// ---------------------------------------------------------------------------
// Resize conservation
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn resize_conserves_columns(
        left in 0..2usize,
        deltas in proptest::collection::vec(-12isize..12, 1..20),
        filled in proptest::collection::vec(0..5usize, 0..5),
    ) {
        let h = harness();
        for (i, col) in filled.iter().enumerate() {
            let path = CellContext::top(CellLocation::new(ContainerKind::Hotbar, left, SlotKey::new(*col, 0))).path();
            h.store.update_cell(&path, Some(CellRecord::new(format!("r{}", i), "", ""))).unwrap();
        }
        let before = h.store.load().unwrap();
        let total = before.hotbar.grids[left].cols + before.hotbar.grids[left + 1].cols;
        let occupied = before.occupied_locations().len();

        let mut gesture = ResizeGesture::begin(&h.store, left).unwrap().unwrap();
        for delta in &deltas {
            let (l, r) = gesture.update(*delta);
            prop_assert_eq!(l + r, total);
            prop_assert!(l >= 1 && r >= 1);
        }
        gesture.finish(&h.store).unwrap();

        let after = h.store.load().unwrap();
        prop_assert_eq!(after.hotbar.grids[left].cols + after.hotbar.grids[left + 1].cols, total);
        for grid in &after.hotbar.grids {
            prop_assert!(grid.items.keys().all(|k| k.fits(grid.rows, grid.cols)));
        }
        // Never more than the left grid's final capacity is lost.
        let capacity = after.hotbar.grids[left].cols;
        prop_assert!(after.occupied_locations().len() >= occupied.min(capacity));
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_64())]
    #[test]
    fn view_round_trip_restores_hotbar(
        in_a in proptest::collection::vec((arb_hotbar_location(), 0..REFERENCES), 0..8),
        in_b in proptest::collection::vec((arb_hotbar_location(), 0..REFERENCES), 0..8),
    ) {
        let mut h = harness();
        for (loc, r) in &in_a {
            h.drop_document(&CellContext::top(*loc), &reference(*r));
        }
        let hotbar_a = h.store.load().unwrap().hotbar;
        let view_a = h.store.load().unwrap().views.active_view_id;

        let view_b = h.store.create_view("B", None).unwrap();
        for (loc, r) in &in_b {
            h.drop_document(&CellContext::top(*loc), &reference(*r));
        }
        h.store.switch_view(&view_a).unwrap();
        prop_assert_eq!(&h.store.load().unwrap().hotbar, &hotbar_a);

        h.store.switch_view(&view_b).unwrap();
        h.store.switch_view(&view_a).unwrap();
        prop_assert_eq!(&h.store.load().unwrap().hotbar, &hotbar_a);
    }
}

proptest! {
    #![proptest_config(config_64())]
    #[test]
    fn last_view_always_survives(ops in proptest::collection::vec(0..3u8, 1..20)) {
        let store = PersistenceManager::new(Arc::new(MemoryBackend::new()), StoreOptions::default());
        store.bind_owner(OwnerHandle::entity("hero"));
        for op in ops {
            let views = store.views().unwrap();
            match op {
                0 => {
                    store.create_view("v", None).unwrap();
                }
                1 => {
                    let first = views.list[0].id.clone();
                    let deleted = store.delete_view(&first).unwrap();
                    prop_assert_eq!(deleted, views.list.len() > 1);
                }
                _ => {
                    let last = views.list[views.list.len() - 1].id.clone();
                    store.delete_view(&last).unwrap();
                }
            }
            let views = store.views().unwrap();
            prop_assert!(!views.list.is_empty());
            prop_assert!(views.active().is_some());
        }
    }
}

// ---------------------------------------------------------------------------
// Migration
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn migration_is_idempotent(gestures in proptest::collection::vec(arb_gesture(), 0..20)) {
        let mut h = harness();
        for gesture in &gestures {
            apply(&mut h, gesture);
        }
        let state = h.store.load().unwrap();
        let doc = serde_json::to_value(&state).unwrap();
        let migrated = migrate_document(&doc, &DefaultLayout::default());
        prop_assert!(!migrated.changed);
        prop_assert_eq!(migrated.state, state);
    }
}

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn legacy_migration_is_stable(
        hotbar_items in proptest::collection::vec((0..8usize, 0..REFERENCES), 0..6),
        active in proptest::option::of(0..5u64),
    ) {
        let items: serde_json::Map<String, serde_json::Value> = hotbar_items
            .iter()
            .map(|(col, r)| (format!("{}-0", col), serde_json::json!({ "uuid": reference(*r), "name": "x" })))
            .collect();
        let legacy = LegacyStores {
            hotbar: Some(serde_json::json!({ "grids": [{ "rows": 1, "cols": 5, "items": items }] })),
            weapon_sets: None,
            quick_access: None,
            active_set: active.map(serde_json::Value::from),
        };
        let layout = DefaultLayout::default();
        let once = migrate_legacy(&legacy, &layout);
        let twice = migrate_legacy(&legacy, &layout);
        prop_assert_eq!(&once, &twice);

        let again = migrate_document(&serde_json::to_value(&once).unwrap(), &layout);
        prop_assert!(!again.changed);
        prop_assert_eq!(again.state, once);
    }
}
