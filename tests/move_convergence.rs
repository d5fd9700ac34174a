//! Property tests: moves converge to exactly one parent
//!
//! A child moved from parent A to parent B with two separate writes ("remove
//! from A", "append to B", built from items read before either write) ends
//! up listed by B only, whichever write lands first. Atomic moves, publishes
//! and deletes are interleaved to vary the branch state the moves start from.

mod common;

use std::collections::BTreeSet;

use common::*;
use proptest::prelude::*;

const VERTICALS: usize = 4;
const UNITS: usize = 8;

#[derive(Debug, Clone)]
enum Op {
    /// Two-step move of unit `unit` to vertical `to`; `append_first` picks
    /// which parent write lands first
    SplitMove {
        unit: usize,
        to: usize,
        append_first: bool,
    },
    /// `move_item` to vertical `to` at `index`
    Move { unit: usize, to: usize, index: usize },
    /// Publish vertical `v`
    Publish(usize),
    /// Delete unit `unit`
    Delete(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..UNITS, 0..VERTICALS, any::<bool>()).prop_map(|(unit, to, append_first)| {
            Op::SplitMove { unit, to, append_first }
        }),
        3 => (0..UNITS, 0..VERTICALS, 0..4usize)
            .prop_map(|(unit, to, index)| Op::Move { unit, to, index }),
        2 => (0..VERTICALS).prop_map(Op::Publish),
        1 => (0..UNITS).prop_map(Op::Delete),
    ]
}

struct World {
    store: ModuleStore,
    course_key: CourseKey,
    deleted: BTreeSet<usize>,
}

impl World {
    fn new(policy: BackendPolicy) -> Self {
        let store = ModuleStore::with_policy(policy);
        let course = store.create_course("prop", "move", "run", &user()).unwrap();
        let course_key = course.location.course.clone();
        let chapter = store
            .create_child(&user(), &course.location, "chapter", Some("ch"))
            .unwrap();
        let seq = store
            .create_child(&user(), &chapter.location, "sequential", Some("seq"))
            .unwrap();
        for v in 0..VERTICALS {
            store
                .create_child(&user(), &seq.location, "vertical", Some(&format!("v{}", v)))
                .unwrap();
        }
        let world = Self {
            store,
            course_key,
            deleted: BTreeSet::new(),
        };
        for u in 0..UNITS {
            world
                .store
                .create_child(&user(), &world.vertical(u % VERTICALS), "html", Some(&format!("u{}", u)))
                .unwrap();
        }
        world
    }

    fn vertical(&self, v: usize) -> UsageKey {
        self.course_key.make_usage_key("vertical", &format!("v{}", v))
    }

    fn unit(&self, u: usize) -> UsageKey {
        self.course_key.make_usage_key("html", &format!("u{}", u))
    }

    fn parent(&self, key: &UsageKey) -> Option<UsageKey> {
        self.store
            .get_parent_location(key, RevisionOption::DraftPreferred)
            .unwrap()
    }

    fn apply(&mut self, op: &Op) {
        match *op {
            Op::SplitMove {
                unit,
                to,
                append_first,
            } => {
                if self.deleted.contains(&unit) {
                    return;
                }
                let child = self.unit(unit);
                let target = self.vertical(to);
                let Some(source) = self.parent(&child) else {
                    return;
                };
                if source == target {
                    return;
                }
                let mut from_item = self.store.get_item(&source).unwrap();
                let mut to_item = self.store.get_item(&target).unwrap();
                from_item.children.retain(|c| *c != child);
                to_item.children.push(child.clone());
                if append_first {
                    self.store.update_item(&to_item, &user()).unwrap();
                    self.store.update_item(&from_item, &user()).unwrap();
                } else {
                    self.store.update_item(&from_item, &user()).unwrap();
                    self.store.update_item(&to_item, &user()).unwrap();
                }
                assert_eq!(self.parent(&child), Some(target.clone()));
                assert!(!self.store.get_item(&source).unwrap().children.contains(&child));
            }
            Op::Move { unit, to, index } => {
                if self.deleted.contains(&unit) {
                    return;
                }
                let child = self.unit(unit);
                let target = self.vertical(to);
                self.store
                    .move_item(&child, &target, Some(index), &user())
                    .unwrap();
                assert_eq!(self.parent(&child), Some(target));
            }
            Op::Publish(v) => {
                self.store.publish(&self.vertical(v), &user()).unwrap();
            }
            Op::Delete(unit) => {
                if self.deleted.insert(unit) {
                    self.store.delete_item(&self.unit(unit), &user()).unwrap();
                }
            }
        }
    }

    /// Every live unit is listed by exactly one vertical in the draft view,
    /// and that vertical is what `get_parent_location` reports.
    fn check(&self) {
        for u in 0..UNITS {
            let child = self.unit(u);
            if self.deleted.contains(&u) {
                assert!(!self.store.has_item(&child), "deleted {} still visible", child);
                // A pending deletion needs a published parent whose next
                // publish drops it
                if self.store.has_item_with(&child, RevisionOption::PublishedOnly) {
                    assert!(
                        self.store
                            .get_parent_location(&child, RevisionOption::PublishedOnly)
                            .unwrap()
                            .is_some(),
                        "deleted {} stays published with no published parent",
                        child
                    );
                }
                continue;
            }
            assert!(self.store.has_item(&child), "lost {}", child);
            let listers: Vec<UsageKey> = (0..VERTICALS)
                .map(|v| self.vertical(v))
                .filter(|v| self.store.get_item(v).unwrap().children.contains(&child))
                .collect();
            assert_eq!(listers.len(), 1, "{} listed by {:?}", child, listers);
            assert_eq!(self.parent(&child).as_ref(), listers.first());
        }
        let orphans = self
            .store
            .get_orphans(&self.course_key, Branch::Draft)
            .unwrap();
        assert!(orphans.is_empty(), "draft orphans: {:?}", orphans);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn moves_converge_direct(ops in prop::collection::vec(op_strategy(), 1..24)) {
        init_tracing();
        let mut world = World::new(BackendPolicy::direct());
        for op in &ops {
            world.apply(op);
            world.check();
        }
    }

    #[test]
    fn moves_converge_versioned(ops in prop::collection::vec(op_strategy(), 1..24)) {
        init_tracing();
        let mut world = World::new(BackendPolicy::versioned());
        for op in &ops {
            world.apply(op);
            world.check();
        }
    }
}

#[test]
fn concurrent_moves_keep_one_parent() {
    init_tracing();
    let world = std::sync::Arc::new(World::new(BackendPolicy::direct()));
    let handles: Vec<_> = (0..UNITS)
        .map(|u| {
            let world = std::sync::Arc::clone(&world);
            std::thread::spawn(move || {
                let child = world.unit(u);
                for step in 0..20 {
                    let target = world.vertical((u + step) % VERTICALS);
                    world.store.move_item(&child, &target, None, &user()).unwrap();
                    if step % 5 == 0 {
                        world.store.publish(&target, &user()).unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    world.check();
}

#[test]
fn delete_after_old_parent_republished_leaves_nothing_published() {
    init_tracing();
    let mut world = World::new(BackendPolicy::direct());
    // u0 starts under v0
    world.apply(&Op::Publish(0));
    world.apply(&Op::Publish(1));
    world.apply(&Op::Move {
        unit: 0,
        to: 1,
        index: 0,
    });
    world.apply(&Op::Publish(0));
    world.apply(&Op::Delete(0));
    world.apply(&Op::Publish(1));
    world.check();

    let unit = world.unit(0);
    assert!(!world.store.has_item_with(&unit, RevisionOption::PublishedOnly));
    assert!(!world.store.has_changes(&world.vertical(0)).unwrap());
    assert!(!world.store.has_changes(&world.vertical(1)).unwrap());
    assert!(world
        .store
        .get_orphans(&world.course_key, Branch::Published)
        .unwrap()
        .is_empty());
}
