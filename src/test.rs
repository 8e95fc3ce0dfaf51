use std::cell::RefCell;
use std::rc::Rc;

use crate::family;
use crate::Component;
use crate::Entity;
use crate::EntitySpace;
use crate::FamilyCache;
use crate::Phases;
use crate::System;
use crate::SystemHandle;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[derive(Debug, Default)]
struct Health {
    current: i32,
}
impl Component for Health {}

#[derive(Debug, Default)]
struct Damage {
    amount: i32,
}
impl Component for Damage {}

#[derive(Debug, Default)]
struct MovementSpeed {
    meters_per_second: f64,
}
impl Component for MovementSpeed {}

#[derive(Debug, Default)]
struct PlayerInput {
    x: f64,
    y: f64,
}
impl Component for PlayerInput {}

family! {
    struct HealthNode {
        entity: Entity,
        health: Health,
    }
}

family! {
    struct PlayerNode {
        entity: Entity,
        input: PlayerInput,
        speed: MovementSpeed,
    }
}

type Log = Rc<RefCell<Vec<String>>>;

fn log_into(log: &Log, message: impl Into<String>) {
    log.borrow_mut().push(message.into());
}

/// Records its dispatches so tests can assert scheduler ordering
struct Recorder {
    name: &'static str,
    phases: Phases,
    log: Log,
}

impl System for Recorder {
    fn phases(&self) -> Phases {
        self.phases
    }

    fn on_init(&mut self, _space: &EntitySpace) {}

    fn on_dispose(&mut self, _space: &EntitySpace) {
        log_into(&self.log, format!("{} disposed", self.name));
    }

    fn on_update(&mut self, _space: &EntitySpace, _dt: f64) {
        log_into(&self.log, format!("{} primary", self.name));
    }

    fn on_fixed_update(&mut self, _space: &EntitySpace, _dt: f64) {
        log_into(&self.log, format!("{} fixed", self.name));
    }

    fn on_late_update(&mut self, _space: &EntitySpace, _dt: f64) {
        log_into(&self.log, format!("{} late", self.name));
    }
}

// family cache ============================================================

#[test]
fn empty_entity_matches_after_gaining_required_component() {
    init_tracing();
    let space = EntitySpace::new();
    let cache: FamilyCache<HealthNode> = space.family();

    let entity = Entity::named("bare");
    space.register_entity(&entity);
    assert!(cache.is_empty());

    entity.register_component(Health { current: 80 });

    assert_eq!(cache.len(), 1);
    let node = cache.node_for(entity.id()).unwrap();
    assert_eq!(node.entity, entity);
    assert_eq!(node.health.borrow().current, 80);
}

#[test]
fn node_removed_fires_before_entity_destroyed_completes() {
    let space = EntitySpace::new();
    let cache: FamilyCache<HealthNode> = space.family();
    let log: Log = Default::default();

    let entity = Entity::new();
    entity.register_component(Health { current: 10 });
    space.register_entity(&entity);
    assert_eq!(cache.len(), 1);

    {
        let log = Rc::clone(&log);
        cache.on_node_removed(move |_| log_into(&log, "node removed"));
    }
    {
        let log = Rc::clone(&log);
        entity
            .destroyed()
            .connect(move |_| log_into(&log, "entity destroyed"));
    }

    entity.destroy();

    assert_eq!(log.borrow().as_slice(), &["node removed", "entity destroyed"]);
    assert!(cache.is_empty());
    assert_eq!(space.entity_count(), 0);
}

#[test]
fn cache_membership_tracks_component_churn() {
    let space = EntitySpace::new();
    let cache: FamilyCache<PlayerNode> = space.family();

    let entity = Entity::new();
    space.register_entity(&entity);
    assert!(cache.is_empty());

    entity.register_component(PlayerInput::default());
    assert!(cache.is_empty());

    entity.register_component(MovementSpeed {
        meters_per_second: 3.0,
    });
    assert_eq!(cache.len(), 1);

    entity.destroy_component::<PlayerInput>();
    assert!(cache.is_empty());

    entity.register_component(PlayerInput::default());
    assert_eq!(cache.len(), 1);
}

#[test]
fn swap_to_matching_in_one_tick_adds_exactly_one_node() {
    let space = EntitySpace::new();
    let cache: FamilyCache<PlayerNode> = space.family();
    let additions = Rc::new(RefCell::new(0));
    {
        let additions = Rc::clone(&additions);
        cache.on_node_added(move |_| *additions.borrow_mut() += 1);
    }

    let entity = Entity::new();
    entity.register_component(PlayerInput::default());
    entity.register_component(Damage { amount: 1 });
    space.register_entity(&entity);
    assert!(cache.is_empty());

    // same tick: drop one component, gain the one that completes the shape
    entity.destroy_component::<Damage>();
    entity.register_component(MovementSpeed {
        meters_per_second: 1.5,
    });

    assert_eq!(cache.len(), 1);
    assert_eq!(*additions.borrow(), 1);
}

#[test]
fn node_slots_share_the_live_component_instance() {
    let space = EntitySpace::new();
    let cache: FamilyCache<HealthNode> = space.family();

    let entity = Entity::new();
    entity.register_component(Health { current: 100 });
    space.register_entity(&entity);

    let node = cache.node_for(entity.id()).unwrap();
    entity.component::<Health>().unwrap().borrow_mut().current = 25;
    assert_eq!(node.health.borrow().current, 25);

    // detaching the required component removes the node, but the caller's
    // handle keeps the instance alive
    let detached = entity.unregister_component::<Health>().unwrap();
    assert!(cache.is_empty());
    assert_eq!(detached.borrow().current, 25);
    assert_eq!(node.health.borrow().current, 25);
}

#[test]
fn cache_starts_consistent_with_existing_entities() {
    let space = EntitySpace::new();

    let entity = Entity::new();
    entity.register_component(Health { current: 7 });
    space.register_entity(&entity);

    let cache: FamilyCache<HealthNode> = space.family();
    assert_eq!(cache.len(), 1);
    assert!(cache.contains(entity.id()));
}

#[test]
fn disposed_cache_stops_reacting() {
    let space = EntitySpace::new();
    let mut cache: FamilyCache<HealthNode> = space.family();
    let additions = Rc::new(RefCell::new(0));
    {
        let additions = Rc::clone(&additions);
        cache.on_node_added(move |_| *additions.borrow_mut() += 1);
    }

    cache.dispose();

    let entity = Entity::new();
    entity.register_component(Health { current: 1 });
    space.register_entity(&entity);

    assert_eq!(*additions.borrow(), 0);
}

#[test]
#[should_panic(expected = "family cache used after dispose")]
fn node_access_after_dispose_panics() {
    let space = EntitySpace::new();
    let mut cache: FamilyCache<HealthNode> = space.family();
    cache.dispose();
    let _ = cache.nodes();
}

#[test]
#[should_panic(expected = "family cache used after dispose")]
fn listener_connection_after_dispose_panics() {
    let space = EntitySpace::new();
    let mut cache: FamilyCache<HealthNode> = space.family();
    cache.dispose();
    cache.on_node_added(|_| {});
}

// reactive listeners ======================================================

#[test]
fn node_added_listener_may_register_further_components() {
    let space = EntitySpace::new();
    let cache: FamilyCache<HealthNode> = space.family();
    cache.on_node_added(|node| node.entity.register_component(Damage { amount: 1 }));

    let entity = Entity::new();
    space.register_entity(&entity);
    entity.register_component(Health { current: 10 });

    assert_eq!(cache.len(), 1);
    assert!(entity.has::<Damage>());
}

#[test]
fn node_removed_listener_may_destroy_the_entity() {
    let space = EntitySpace::new();
    let cache: FamilyCache<PlayerNode> = space.family();
    cache.on_node_removed(|node| node.entity.destroy());

    let entity = Entity::new();
    entity.register_component(PlayerInput::default());
    entity.register_component(MovementSpeed {
        meters_per_second: 1.0,
    });
    space.register_entity(&entity);
    assert_eq!(cache.len(), 1);

    // losing a required slot removes the node; the listener's destroy then
    // cascades through the remaining component and space membership
    entity.destroy_component::<PlayerInput>();

    assert!(entity.is_destroyed());
    assert_eq!(space.entity_count(), 0);
    assert!(cache.is_empty());
}

// entity registry and deferred queue ======================================

#[test]
fn unregistering_twice_emits_one_removal() {
    let space = EntitySpace::new();
    let removals = Rc::new(RefCell::new(0));
    {
        let removals = Rc::clone(&removals);
        space
            .entity_unregistered()
            .connect(move |_| *removals.borrow_mut() += 1);
    }

    let entity = Entity::new();
    space.register_entity(&entity);
    space.unregister_entity(&entity);
    space.unregister_entity(&entity);

    assert_eq!(*removals.borrow(), 1);
}

#[test]
fn duplicate_entity_registration_is_skipped() {
    init_tracing();
    let space = EntitySpace::new();
    let entity = Entity::new();

    space.register_entity(&entity);
    space.register_entity(&entity);

    assert_eq!(space.entity_count(), 1);
}

#[test]
fn deferred_mutations_apply_in_arrival_order_at_drain() {
    let space = EntitySpace::new();
    let a = Entity::named("a");
    let b = Entity::named("b");

    space.register_entity_deferred(&a);
    space.register_entity_deferred(&b);
    space.unregister_entity_deferred(&a);

    // nothing applies before the drain point
    assert_eq!(space.entity_count(), 0);

    space.drain_deferred();

    assert_eq!(space.entity_count(), 1);
    assert!(!space.contains_entity(a.id()));
    assert!(space.contains_entity(b.id()));
}

#[test]
fn entity_moves_between_spaces_at_the_next_drain() {
    let s1 = EntitySpace::new();
    let s2 = EntitySpace::new();
    let cache_s1: FamilyCache<HealthNode> = s1.family();

    let entity = Entity::new();
    entity.register_component(Health { current: 50 });
    s1.register_entity(&entity);
    assert_eq!(cache_s1.len(), 1);

    // reparent mid-tick: both membership changes are queued, not applied
    s1.unregister_entity_deferred(&entity);
    s2.register_entity_deferred(&entity);
    assert!(s1.contains_entity(entity.id()));

    s1.drain_deferred();
    s2.drain_deferred();

    assert!(!s1.contains_entity(entity.id()));
    assert!(s2.contains_entity(entity.id()));
    assert!(cache_s1.is_empty());
}

#[test]
fn destroyed_entity_is_not_registered_from_the_queue() {
    init_tracing();
    let space = EntitySpace::new();
    let entity = Entity::new();

    space.register_entity_deferred(&entity);
    entity.destroy();
    space.drain_deferred();

    assert_eq!(space.entity_count(), 0);
}

// scheduler ===============================================================

#[test]
fn systems_dispatch_in_ascending_priority_order() {
    let log: Log = Default::default();
    let space = EntitySpace::new();

    let five = space.register_system(Recorder {
        name: "five",
        phases: Phases::PRIMARY,
        log: Rc::clone(&log),
    });
    let one = space.register_system(Recorder {
        name: "one",
        phases: Phases::PRIMARY,
        log: Rc::clone(&log),
    });
    five.set_priority(5);
    one.set_priority(1);

    space.drain_deferred();
    space.advance_primary(0.016);

    assert_eq!(log.borrow().as_slice(), &["one primary", "five primary"]);
}

#[test]
fn equal_priorities_keep_insertion_order() {
    let log: Log = Default::default();
    let space = EntitySpace::new();

    for name in ["first", "second", "third"] {
        space.register_system(Recorder {
            name,
            phases: Phases::PRIMARY,
            log: Rc::clone(&log),
        });
    }

    space.advance_primary(0.016);

    assert_eq!(
        log.borrow().as_slice(),
        &["first primary", "second primary", "third primary"]
    );
}

#[test]
fn systems_only_receive_declared_phases() {
    let log: Log = Default::default();
    let space = EntitySpace::new();

    space.register_system(Recorder {
        name: "fixed-only",
        phases: Phases::FIXED,
        log: Rc::clone(&log),
    });
    space.register_system(Recorder {
        name: "late-only",
        phases: Phases::LATE,
        log: Rc::clone(&log),
    });

    space.advance_primary(0.016);
    space.advance_fixed(0.02);
    space.advance_late(0.016);

    assert_eq!(
        log.borrow().as_slice(),
        &["fixed-only fixed", "late-only late"]
    );
}

#[test]
fn disabled_systems_are_skipped() {
    let log: Log = Default::default();
    let space = EntitySpace::new();

    let handle = space.register_system(Recorder {
        name: "sleeper",
        phases: Phases::PRIMARY,
        log: Rc::clone(&log),
    });

    handle.set_enabled(false);
    space.advance_primary(0.016);
    handle.set_enabled(true);
    space.advance_primary(0.016);

    assert_eq!(log.borrow().as_slice(), &["sleeper primary"]);
}

#[test]
fn renumbering_priorities_follows_list_order() {
    let log: Log = Default::default();
    let space = EntitySpace::new();

    let a = space.register_system(Recorder {
        name: "a",
        phases: Phases::PRIMARY,
        log: Rc::clone(&log),
    });
    let b = space.register_system(Recorder {
        name: "b",
        phases: Phases::PRIMARY,
        log: Rc::clone(&log),
    });
    a.set_priority(10);
    b.set_priority(2);

    space.advance_primary(0.016); // sorted: b, a
    space.renumber_system_priorities();

    assert_eq!(b.priority(), 0);
    assert_eq!(a.priority(), 1);
}

#[test]
fn priority_change_resorts_before_the_next_dispatch() {
    let log: Log = Default::default();
    let space = EntitySpace::new();

    let a = space.register_system(Recorder {
        name: "a",
        phases: Phases::PRIMARY,
        log: Rc::clone(&log),
    });
    space.register_system(Recorder {
        name: "b",
        phases: Phases::PRIMARY,
        log: Rc::clone(&log),
    });

    space.advance_primary(0.016);
    a.set_priority(9);
    space.advance_primary(0.016);

    assert_eq!(
        log.borrow().as_slice(),
        &["a primary", "b primary", "b primary", "a primary"]
    );
}

// systems joining a live world ============================================

/// Creates its family cache at init time like any real consumer would
struct PlayerCounter {
    players: Option<FamilyCache<PlayerNode>>,
}

impl System for PlayerCounter {
    fn phases(&self) -> Phases {
        Phases::PRIMARY
    }

    fn on_init(&mut self, space: &EntitySpace) {
        self.players = Some(space.family());
    }
}

#[test]
fn late_registered_system_backfills_existing_state() {
    let space = EntitySpace::new();

    let player = Entity::named("player");
    player.register_component(PlayerInput::default());
    player.register_component(MovementSpeed {
        meters_per_second: 2.0,
    });
    space.register_entity(&player);

    let bystander = Entity::new();
    bystander.register_component(Damage { amount: 3 });
    space.register_entity(&bystander);

    let counter = Rc::new(RefCell::new(PlayerCounter { players: None }));
    struct Proxy(Rc<RefCell<PlayerCounter>>);
    impl System for Proxy {
        fn phases(&self) -> Phases {
            Phases::PRIMARY
        }
        fn on_init(&mut self, space: &EntitySpace) {
            self.0.borrow_mut().on_init(space);
        }
    }
    space.register_system(Proxy(Rc::clone(&counter)));

    let counter = counter.borrow();
    let players = counter.players.as_ref().unwrap();
    assert_eq!(players.len(), 1);
    assert!(players.contains(player.id()));
}

/// Unregisters itself after its first run
struct OneShot {
    handle: Rc<RefCell<Option<SystemHandle>>>,
    log: Log,
}

impl System for OneShot {
    fn phases(&self) -> Phases {
        Phases::PRIMARY
    }

    fn on_init(&mut self, _space: &EntitySpace) {}

    fn on_dispose(&mut self, _space: &EntitySpace) {
        log_into(&self.log, "one-shot disposed");
    }

    fn on_update(&mut self, space: &EntitySpace, _dt: f64) {
        log_into(&self.log, "one-shot ran");
        if let Some(handle) = self.handle.borrow().as_ref() {
            space.unregister_system(handle);
        }
    }
}

#[test]
fn system_may_unregister_itself_mid_update() {
    let log: Log = Default::default();
    let space = EntitySpace::new();

    let slot = Rc::new(RefCell::new(None));
    let handle = space.register_system(OneShot {
        handle: Rc::clone(&slot),
        log: Rc::clone(&log),
    });
    *slot.borrow_mut() = Some(handle);

    space.advance_primary(0.016);
    space.advance_primary(0.016);

    assert_eq!(space.system_count(), 0);
    assert_eq!(log.borrow().as_slice(), &["one-shot ran", "one-shot disposed"]);
}

#[test]
fn space_dispose_discards_pending_and_disposes_systems() {
    let log: Log = Default::default();
    let space = EntitySpace::new();

    space.register_system(Recorder {
        name: "worker",
        phases: Phases::PRIMARY,
        log: Rc::clone(&log),
    });

    let queued = Entity::new();
    space.register_entity_deferred(&queued);

    space.dispose();

    assert_eq!(space.entity_count(), 0);
    assert_eq!(log.borrow().as_slice(), &["worker disposed"]);

    // the queue was cleared without applying, so a later drain adds nothing
    space.drain_deferred();
    assert_eq!(space.entity_count(), 0);
}
