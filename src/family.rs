use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::components::ComponentTypeSet;
use crate::entity::Entity;
use crate::id::EntityId;
use crate::signal::ListenerId;
use crate::signal::Signal;
use crate::space::ComponentStateChange;
use crate::space::EntitySpace;

/// Declares the shape of one family node: which component types an entity
/// must carry to match, and how to project a matching entity into a node
///
/// Usually implemented through the [crate::family!] macro, though nothing
/// stops consuming code from implementing it by hand. Identity slots (fields
/// holding the [Entity] itself) are always satisfiable and never appear in
/// [FamilyShape::required_components]. There is no optional slot concept;
/// every declared component slot is mandatory
pub trait FamilyShape: Clone + 'static {
    /// The component types every matching entity must currently have
    fn required_components() -> ComponentTypeSet;

    /// Populate one node from a matching entity; `None` when a required
    /// component is missing
    fn build(entity: &Entity) -> Option<Self>;
}

struct FamilyState<T> {
    required: ComponentTypeSet,
    nodes: Vec<T>,
    index: HashMap<EntityId, usize>,
    node_added: Signal<T>,
    node_removed: Signal<T>,
}

fn compatible(required: &ComponentTypeSet, entity: &Entity) -> bool {
    required.iter().all(|ty| entity.has_type(*ty))
}

fn try_add<T: FamilyShape>(state: &Rc<RefCell<FamilyState<T>>>, entity: &Entity) {
    {
        let state = state.borrow();
        if state.index.contains_key(&entity.id()) {
            return;
        }
        if !compatible(&state.required, entity) {
            return;
        }
    }

    let Some(node) = T::build(entity) else {
        return;
    };

    // settle internal state before fanning out, listeners may read the cache
    let node_added = {
        let mut state = state.borrow_mut();
        let slot = state.nodes.len();
        state.nodes.push(node.clone());
        state.index.insert(entity.id(), slot);
        state.node_added.clone()
    };

    debug!(entity = %entity, "family node added");
    node_added.emit(&node);
}

fn try_remove<T: FamilyShape>(state: &Rc<RefCell<FamilyState<T>>>, entity: &Entity) {
    let (node, node_removed) = {
        let mut state = state.borrow_mut();
        let Some(slot) = state.index.remove(&entity.id()) else {
            return;
        };

        let node = state.nodes.remove(slot);
        for position in state.index.values_mut() {
            if *position > slot {
                *position -= 1;
            }
        }
        (node, state.node_removed.clone())
    };

    debug!(entity = %entity, "family node removed");
    node_removed.emit(&node);
}

fn on_state_changed<T: FamilyShape>(state: &Rc<RefCell<FamilyState<T>>>, entity: &Entity) {
    let cached = state.borrow().index.contains_key(&entity.id());

    if cached {
        // A cached, still-compatible entity keeps its existing node: slot
        // values are fixed at match time, so swapping in a same-typed
        // instance does not refresh them until the entity stops matching
        if !compatible(&state.borrow().required, entity) {
            try_remove(state, entity);
        }
    } else {
        try_add(state, entity);
    }
}

struct Subscription<E> {
    signal: Signal<E>,
    listener: ListenerId,
}

impl<E> Subscription<E> {
    fn cancel(self) {
        self.signal.disconnect(self.listener);
    }
}

struct Subscriptions {
    entity_registered: Subscription<Entity>,
    entity_unregistered: Subscription<Entity>,
    state_changed: Subscription<ComponentStateChange>,
}

/// [FamilyCache]
///
/// An incrementally maintained list of family nodes: one node for every
/// entity in one space whose component set is a superset of `T`'s required
/// types, in match order, plus a reverse lookup from entity to node.
///
/// The cache reacts synchronously to the space's entity registration and
/// component change events; only space-level membership is deferred, never
/// the cache's own bookkeeping. Create one with [EntitySpace::family],
/// typically from a system's `on_init`.
///
/// Dropping the cache (or calling [FamilyCache::dispose]) disconnects it from
/// the space; node access or listener connection after an explicit dispose is
/// a contract violation and panics
pub struct FamilyCache<T: FamilyShape> {
    state: Rc<RefCell<FamilyState<T>>>,
    subscriptions: Option<Subscriptions>,
}

impl<T: FamilyShape> FamilyCache<T> {
    pub(crate) fn attach(space: &EntitySpace) -> Self {
        let state = Rc::new(RefCell::new(FamilyState {
            required: T::required_components(),
            nodes: Vec::new(),
            index: HashMap::new(),
            node_added: Signal::new(),
            node_removed: Signal::new(),
        }));

        let entity_registered = {
            let signal = space.entity_registered().clone();
            let state = Rc::downgrade(&state);
            let listener = signal.connect(move |entity: &Entity| {
                if let Some(state) = state.upgrade() {
                    try_add(&state, entity);
                }
            });
            Subscription { signal, listener }
        };

        let entity_unregistered = {
            let signal = space.entity_unregistered().clone();
            let state = Rc::downgrade(&state);
            let listener = signal.connect(move |entity: &Entity| {
                if let Some(state) = state.upgrade() {
                    // no compatibility re-check, a departed entity cannot
                    // remain a member
                    try_remove(&state, entity);
                }
            });
            Subscription { signal, listener }
        };

        let state_changed = {
            let signal = space.component_state_changed().clone();
            let state = Rc::downgrade(&state);
            let listener = signal.connect(move |change: &ComponentStateChange| {
                if let Some(state) = state.upgrade() {
                    on_state_changed(&state, &change.entity);
                }
            });
            Subscription { signal, listener }
        };

        // catch up with entities that are already members of the space
        for entity in space.entities() {
            try_add(&state, &entity);
        }

        FamilyCache {
            state,
            subscriptions: Some(Subscriptions {
                entity_registered,
                entity_unregistered,
                state_changed,
            }),
        }
    }

    /// Snapshot of the current node list, in match order. Safe to iterate
    /// while the underlying cache keeps reacting to events
    pub fn nodes(&self) -> Vec<T> {
        self.assert_live();
        self.state.borrow().nodes.clone()
    }

    pub fn node_for(&self, entity: EntityId) -> Option<T> {
        self.assert_live();
        let state = self.state.borrow();
        state.index.get(&entity).map(|slot| state.nodes[*slot].clone())
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.assert_live();
        self.state.borrow().index.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.assert_live();
        self.state.borrow().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fired after a node joins the cache, once the node list already holds it
    pub fn on_node_added(&self, listener: impl Fn(&T) + 'static) -> ListenerId {
        self.assert_live();
        self.state.borrow().node_added.connect(listener)
    }

    /// Fired after a node leaves the cache. The node is only valid until this
    /// event completes; retaining it is a consumer error
    pub fn on_node_removed(&self, listener: impl Fn(&T) + 'static) -> ListenerId {
        self.assert_live();
        self.state.borrow().node_removed.connect(listener)
    }

    /// Disconnect from the space and clear the node list and lookup. Runs
    /// automatically on drop
    pub fn dispose(&mut self) {
        let Some(subscriptions) = self.subscriptions.take() else {
            return;
        };

        subscriptions.entity_registered.cancel();
        subscriptions.entity_unregistered.cancel();
        subscriptions.state_changed.cancel();

        let mut state = self.state.borrow_mut();
        state.nodes.clear();
        state.index.clear();
    }

    fn assert_live(&self) {
        assert!(
            self.subscriptions.is_some(),
            "family cache used after dispose"
        );
    }
}

impl<T: FamilyShape> Drop for FamilyCache<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}
