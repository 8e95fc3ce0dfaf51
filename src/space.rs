use std::cell::Cell;
use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::rc::Rc;
use std::rc::Weak;

use tracing::debug;
use tracing::warn;

use crate::components::ComponentHandle;
use crate::components::ComponentType;
use crate::entity::ComponentEvent;
use crate::entity::Entity;
use crate::family::FamilyCache;
use crate::family::FamilyShape;
use crate::id::EntityId;
use crate::signal::ListenerId;
use crate::signal::Signal;
use crate::system::Phase;
use crate::system::Phases;
use crate::system::System;

/// Event payload republished by an [EntitySpace] whenever a component is
/// registered to or unregistered from one of its member entities
///
/// Family caches consume this to re-test the entity against their shape; by
/// the time listeners run, the entity's component set already reflects the
/// change
#[derive(Clone, Debug)]
pub struct ComponentStateChange {
    pub entity: Entity,
    pub component: ComponentHandle,
}

impl ComponentStateChange {
    pub fn component_type(&self) -> ComponentType {
        self.component.component_type()
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum PendingAction {
    Register,
    Unregister,
}

struct PendingMutation {
    entity: Entity,
    action: PendingAction,
}

struct EntitySubscription {
    registered: ListenerId,
    unregistered: ListenerId,
    destroyed: ListenerId,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
struct SystemId(u64);

struct SystemShared {
    priority: Cell<i32>,
    enabled: Cell<bool>,
}

struct SystemEntry {
    id: SystemId,
    sequence: u64,
    system: Rc<RefCell<dyn System>>,
    shared: Rc<SystemShared>,
    phases: Phases,
}

/// Handle returned by [EntitySpace::register_system]
///
/// Carries the system's mutable priority and enabled state. Priority changes
/// mark the owning space's sort flag dirty; the actual re-sort happens at the
/// next phase dispatch. Priority range validation belongs to editor tooling,
/// not to this core
#[derive(Clone)]
pub struct SystemHandle {
    id: SystemId,
    shared: Rc<SystemShared>,
    sort_dirty: Weak<Cell<bool>>,
}

impl SystemHandle {
    pub fn priority(&self) -> i32 {
        self.shared.priority.get()
    }

    pub fn set_priority(&self, priority: i32) {
        if self.shared.priority.replace(priority) != priority {
            if let Some(flag) = self.sort_dirty.upgrade() {
                flag.set(true);
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.get()
    }

    /// A disabled system stays registered and sorted but is skipped by every
    /// phase dispatch
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.set(enabled);
    }
}

struct SpaceInner {
    entities: RefCell<Vec<Entity>>,
    subscriptions: RefCell<HashMap<EntityId, EntitySubscription>>,
    pending: RefCell<VecDeque<PendingMutation>>,
    systems: RefCell<Vec<SystemEntry>>,
    // systems removed from inside their own update hook, awaiting on_dispose
    pending_disposals: RefCell<Vec<Rc<RefCell<dyn System>>>>,
    system_head: Cell<u64>,
    sort_dirty: Rc<Cell<bool>>,
    entity_registered: Signal<Entity>,
    entity_unregistered: Signal<Entity>,
    component_state_changed: Signal<ComponentStateChange>,
}

/// [EntitySpace]
///
/// Owns a population of entities and systems in isolation and drives the
/// per-tick update phases. Several spaces can coexist, each running its own
/// world; an entity is a member of at most one space at a time.
///
/// Membership changes raised while the space is mid-traversal (an entity
/// reparented between spaces during an update, say) must go through the
/// deferred queue ([EntitySpace::register_entity_deferred] and its
/// counterpart), which is drained at a single well-defined point per tick.
/// Everything downstream of an applied membership or component change is
/// synchronous: family caches react immediately, in subscription order.
///
/// The host drives a tick as: [EntitySpace::drain_deferred], then
/// [EntitySpace::advance_primary], [EntitySpace::advance_fixed] at its own
/// cadence, and [EntitySpace::advance_late]
#[derive(Clone)]
pub struct EntitySpace {
    inner: Rc<SpaceInner>,
}

impl EntitySpace {
    pub fn new() -> Self {
        EntitySpace {
            inner: Rc::new(SpaceInner {
                entities: RefCell::new(Vec::new()),
                subscriptions: RefCell::new(HashMap::new()),
                pending: RefCell::new(VecDeque::new()),
                systems: RefCell::new(Vec::new()),
                pending_disposals: RefCell::new(Vec::new()),
                system_head: Cell::new(0),
                sort_dirty: Rc::new(Cell::new(true)),
                entity_registered: Signal::new(),
                entity_unregistered: Signal::new(),
                component_state_changed: Signal::new(),
            }),
        }
    }

    // entity registry ----------------------------------------------------

    /// Add an entity to the live set, wire up its component and destruction
    /// events, and announce it. Destroyed or already-registered entities are
    /// skipped with a warning.
    ///
    /// Must not be called while the space is mid-traversal; use
    /// [EntitySpace::register_entity_deferred] from inside systems
    pub fn register_entity(&self, entity: &Entity) {
        if entity.is_destroyed() {
            warn!(entity = %entity, "refusing to register a destroyed entity");
            return;
        }
        if self.contains_entity(entity.id()) {
            warn!(entity = %entity, "entity is already registered to this space, skipping");
            return;
        }

        let registered = entity
            .component_registered()
            .connect(republish(Rc::downgrade(&self.inner)));
        let unregistered = entity
            .component_unregistered()
            .connect(republish(Rc::downgrade(&self.inner)));
        let destroyed = {
            let weak = Rc::downgrade(&self.inner);
            entity.destroyed().connect(move |entity: &Entity| {
                // components are already torn down at this point, each
                // unregistration was observed individually
                if let Some(inner) = weak.upgrade() {
                    EntitySpace { inner }.unregister_entity(entity);
                }
            })
        };

        self.inner.subscriptions.borrow_mut().insert(
            entity.id(),
            EntitySubscription {
                registered,
                unregistered,
                destroyed,
            },
        );
        self.inner.entities.borrow_mut().push(entity.clone());

        debug!(entity = %entity, "entity registered");
        self.inner.entity_registered.emit(entity);
    }

    /// Reverse of [EntitySpace::register_entity]. Safe no-op for an entity
    /// that isn't a member, so an entity queued for removal twice unwinds
    /// cleanly
    pub fn unregister_entity(&self, entity: &Entity) {
        let subscription = self.inner.subscriptions.borrow_mut().remove(&entity.id());
        let Some(subscription) = subscription else {
            return;
        };

        entity
            .component_registered()
            .disconnect(subscription.registered);
        entity
            .component_unregistered()
            .disconnect(subscription.unregistered);
        entity.destroyed().disconnect(subscription.destroyed);

        self.inner
            .entities
            .borrow_mut()
            .retain(|e| e.id() != entity.id());

        debug!(entity = %entity, "entity unregistered");
        self.inner.entity_unregistered.emit(entity);
    }

    /// Queue the entity to join this space at the next drain point
    pub fn register_entity_deferred(&self, entity: &Entity) {
        self.inner.pending.borrow_mut().push_back(PendingMutation {
            entity: entity.clone(),
            action: PendingAction::Register,
        });
    }

    /// Queue the entity to leave this space at the next drain point
    pub fn unregister_entity_deferred(&self, entity: &Entity) {
        self.inner.pending.borrow_mut().push_back(PendingMutation {
            entity: entity.clone(),
            action: PendingAction::Unregister,
        });
    }

    /// Apply all pending membership changes in strict arrival order. Each
    /// item is fully applied, including every synchronous family cache
    /// reaction, before the next is dequeued; items queued while draining are
    /// picked up in the same drain.
    ///
    /// The host calls this at the top of each tick, before any system runs
    pub fn drain_deferred(&self) {
        loop {
            let item = self.inner.pending.borrow_mut().pop_front();
            let Some(item) = item else {
                break;
            };

            match item.action {
                PendingAction::Register => self.register_entity(&item.entity),
                PendingAction::Unregister => self.unregister_entity(&item.entity),
            }
        }
    }

    pub fn contains_entity(&self, id: EntityId) -> bool {
        self.inner.subscriptions.borrow().contains_key(&id)
    }

    /// Snapshot of the live entity list in registration order
    pub fn entities(&self) -> Vec<Entity> {
        self.inner.entities.borrow().clone()
    }

    pub fn entity(&self, id: EntityId) -> Option<Entity> {
        self.inner
            .entities
            .borrow()
            .iter()
            .find(|e| e.id() == id)
            .cloned()
    }

    pub fn entity_count(&self) -> usize {
        self.inner.entities.borrow().len()
    }

    // families -----------------------------------------------------------

    /// Create a family cache for shape `T`, tracking every member entity
    /// whose component set matches. The cache starts out consistent with the
    /// entities already present
    pub fn family<T: FamilyShape>(&self) -> FamilyCache<T> {
        FamilyCache::attach(self)
    }

    /// Fired after an entity joins the live set
    pub fn entity_registered(&self) -> &Signal<Entity> {
        &self.inner.entity_registered
    }

    /// Fired after an entity leaves the live set
    pub fn entity_unregistered(&self) -> &Signal<Entity> {
        &self.inner.entity_unregistered
    }

    /// Fired after a member entity's component set changes, in both the
    /// register and unregister direction
    pub fn component_state_changed(&self) -> &Signal<ComponentStateChange> {
        &self.inner.component_state_changed
    }

    // scheduler ----------------------------------------------------------

    /// Append a system, cache its declared phase capabilities, bind it to
    /// this space, and backfill: a component-registered notification is
    /// synthesized for every component already present on every member
    /// entity, so the new system's caches see pre-existing world state
    /// instead of only catching future changes.
    ///
    /// New systems start at priority 0, enabled; adjust via the returned
    /// [SystemHandle]
    pub fn register_system<S: System>(&self, system: S) -> SystemHandle {
        let sequence = self.inner.system_head.get();
        self.inner.system_head.set(sequence + 1);

        let id = SystemId(sequence);
        let phases = system.phases();
        let shared = Rc::new(SystemShared {
            priority: Cell::new(0),
            enabled: Cell::new(true),
        });
        let system: Rc<RefCell<dyn System>> = Rc::new(RefCell::new(system));

        self.inner.systems.borrow_mut().push(SystemEntry {
            id,
            sequence,
            system: Rc::clone(&system),
            shared: Rc::clone(&shared),
            phases,
        });
        self.inner.sort_dirty.set(true);

        system.borrow_mut().on_init(self);
        self.backfill_component_state();

        SystemHandle {
            id,
            shared,
            sort_dirty: Rc::downgrade(&self.inner.sort_dirty),
        }
    }

    /// Remove a system and call its dispose hook. Unknown handles are a
    /// no-op.
    ///
    /// Safe to call from inside a system's own update hook, including by the
    /// system on itself; a self-removed system leaves the list immediately and
    /// its dispose hook runs once the current phase dispatch completes
    pub fn unregister_system(&self, handle: &SystemHandle) {
        let entry = {
            let mut systems = self.inner.systems.borrow_mut();
            let Some(position) = systems.iter().position(|e| e.id == handle.id) else {
                return;
            };
            systems.remove(position)
        };

        if let Ok(mut system) = entry.system.try_borrow_mut() {
            system.on_dispose(self);
            return;
        }
        // the system is unregistering itself from its own update hook
        self.inner.pending_disposals.borrow_mut().push(entry.system);
    }

    /// Re-derive system priorities from the current list order, numbering
    /// them 0..N-1, then mark the scheduler dirty. Tooling hook for editors
    /// that author an explicit system order
    pub fn renumber_system_priorities(&self) {
        for (index, entry) in self.inner.systems.borrow().iter().enumerate() {
            entry.shared.priority.set(index as i32);
        }
        self.inner.sort_dirty.set(true);
    }

    pub fn system_count(&self) -> usize {
        self.inner.systems.borrow().len()
    }

    /// Dispatch the primary update phase in priority order, re-sorting first
    /// if any priority changed
    pub fn advance_primary(&self, dt: f64) {
        self.sort_systems_if_dirty();
        self.dispatch(Phase::Primary, dt);
    }

    /// Dispatch the fixed-step phase; driven by the host at its own cadence
    pub fn advance_fixed(&self, dt: f64) {
        self.sort_systems_if_dirty();
        self.dispatch(Phase::Fixed, dt);
    }

    /// Dispatch the late phase, after the tick's primary updates completed
    pub fn advance_late(&self, dt: f64) {
        self.sort_systems_if_dirty();
        self.dispatch(Phase::Late, dt);
    }

    fn sort_systems_if_dirty(&self) {
        if !self.inner.sort_dirty.replace(false) {
            return;
        }

        // ascending priority, insertion order among equals
        self.inner
            .systems
            .borrow_mut()
            .sort_by_key(|entry| (entry.shared.priority.get(), entry.sequence));
        debug!("systems re-sorted");
    }

    fn dispatch(&self, phase: Phase, dt: f64) {
        // snapshot: systems may register entities or other systems while
        // running
        let snapshot: Vec<Rc<RefCell<dyn System>>> = self
            .inner
            .systems
            .borrow()
            .iter()
            .filter(|entry| entry.phases.contains(phase) && entry.shared.enabled.get())
            .map(|entry| Rc::clone(&entry.system))
            .collect();

        for system in snapshot {
            let mut system = system.borrow_mut();
            match phase {
                Phase::Primary => system.on_update(self, dt),
                Phase::Fixed => system.on_fixed_update(self, dt),
                Phase::Late => system.on_late_update(self, dt),
            }
        }

        self.flush_disposals();
    }

    fn flush_disposals(&self) {
        loop {
            let system = self.inner.pending_disposals.borrow_mut().pop();
            let Some(system) = system else {
                break;
            };
            system.borrow_mut().on_dispose(self);
        }
    }

    fn backfill_component_state(&self) {
        let entities = self.entities();
        for entity in entities {
            for component in entity.components() {
                self.inner.component_state_changed.emit(&ComponentStateChange {
                    entity: entity.clone(),
                    component,
                });
            }
        }
    }

    // teardown -----------------------------------------------------------

    /// Tear the space down: unregister every entity, drop pending mutations
    /// without applying them, and dispose every system in list order
    pub fn dispose(&self) {
        let entities = self.entities();
        for entity in &entities {
            self.unregister_entity(entity);
        }

        self.inner.pending.borrow_mut().clear();

        let systems: Vec<SystemEntry> = self.inner.systems.borrow_mut().drain(..).collect();
        for entry in systems {
            entry.system.borrow_mut().on_dispose(self);
        }
        self.flush_disposals();
    }
}

impl Default for EntitySpace {
    fn default() -> Self {
        Self::new()
    }
}

fn republish(weak: Weak<SpaceInner>) -> impl Fn(&ComponentEvent) {
    move |event: &ComponentEvent| {
        if let Some(inner) = weak.upgrade() {
            inner.component_state_changed.emit(&ComponentStateChange {
                entity: event.entity.clone(),
                component: event.component.clone(),
            });
        }
    }
}
