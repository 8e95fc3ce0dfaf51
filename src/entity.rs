use std::cell::Cell;
use std::cell::RefCell;
use std::fmt;
use std::fmt::Debug;
use std::fmt::Display;
use std::rc::Rc;

use tracing::warn;

use crate::components::Component;
use crate::components::ComponentHandle;
use crate::components::ComponentRegistry;
use crate::components::ComponentType;
use crate::components::ComponentTypeSet;
use crate::components::Shared;
use crate::error::EcsError;
use crate::id::EntityId;
use crate::signal::Signal;

/// Event payload carried by an entity's component registration signals
#[derive(Clone, Debug)]
pub struct ComponentEvent {
    pub entity: Entity,
    pub component: ComponentHandle,
}

impl ComponentEvent {
    pub fn component_type(&self) -> ComponentType {
        self.component.component_type()
    }
}

struct EntityInner {
    id: EntityId,
    label: Option<String>,
    registry: RefCell<ComponentRegistry>,
    destroyed: Cell<bool>,
    component_registered: Signal<ComponentEvent>,
    component_unregistered: Signal<ComponentEvent>,
    destroyed_signal: Signal<Entity>,
}

/// An [Entity] is an identity plus the ordered set of components attached to
/// it
///
/// The "state" of an entity is the set of component types currently attached,
/// which family caches match against, rather than any variable within. Every
/// component mutation flows through the entity's own register, unregister and
/// destroy operations so that each one emits exactly the events listeners
/// depend on.
///
/// `Entity` is a cheap-clone handle; clones refer to the same identity, which
/// is what lets an entity be handed between spaces at run time
#[derive(Clone)]
pub struct Entity {
    inner: Rc<EntityInner>,
}

impl Entity {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create an entity with a debug label used in diagnostics
    pub fn named(label: impl Into<String>) -> Self {
        Self::build(Some(label.into()))
    }

    fn build(label: Option<String>) -> Self {
        Entity {
            inner: Rc::new(EntityInner {
                id: EntityId::next(),
                label,
                registry: RefCell::new(ComponentRegistry::new()),
                destroyed: Cell::new(false),
                component_registered: Signal::new(),
                component_unregistered: Signal::new(),
                destroyed_signal: Signal::new(),
            }),
        }
    }

    pub fn id(&self) -> EntityId {
        self.inner.id
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    /// Attach a component, failing if one of the same concrete type is
    /// already attached
    pub fn try_register_component<C: Component>(&self, component: C) -> Result<(), EcsError> {
        self.try_register_handle(ComponentHandle::new(component))
    }

    /// Attach an existing shared instance, e.g. one previously unregistered
    /// from another entity
    pub fn try_register_handle(&self, handle: ComponentHandle) -> Result<(), EcsError> {
        self.inner.registry.borrow_mut().insert(handle.clone())?;

        self.inner.component_registered.emit(&ComponentEvent {
            entity: self.clone(),
            component: handle,
        });
        Ok(())
    }

    /// Attach a component, skipping with a warning when one of the same
    /// concrete type is already attached
    pub fn register_component<C: Component>(&self, component: C) {
        if let Err(err) = self.try_register_component(component) {
            warn!(entity = %self, %err, "skipping component registration");
        }
    }

    /// See [Entity::try_register_handle]; duplicates are absorbed with a
    /// warning
    pub fn register_handle(&self, handle: ComponentHandle) {
        if let Err(err) = self.try_register_handle(handle) {
            warn!(entity = %self, %err, "skipping component registration");
        }
    }

    /// Instantiate a component from its default value and attach it
    pub fn create_component<C: Component + Default>(&self) {
        self.register_component(C::default());
    }

    /// Detach a component without destroying it, handing the live instance
    /// back to the caller. `None` (and no events) if absent
    pub fn unregister_component<C: Component>(&self) -> Option<Shared<C>> {
        self.unregister_type(ComponentType::of::<C>())
            .and_then(|handle| handle.downcast::<C>())
    }

    pub(crate) fn unregister_type(&self, ty: ComponentType) -> Option<ComponentHandle> {
        let handle = self.inner.registry.borrow_mut().remove(ty)?;

        self.inner.component_unregistered.emit(&ComponentEvent {
            entity: self.clone(),
            component: handle.clone(),
        });
        Some(handle)
    }

    /// Detach and destroy a component. Destruction is releasing the entity's
    /// strong handle; the instance lives on only while other handles to it do
    pub fn destroy_component<C: Component>(&self) {
        self.destroy_component_type(ComponentType::of::<C>());
    }

    /// Typed-erased form of [Entity::destroy_component]; silent no-op if the
    /// type isn't registered
    pub fn destroy_component_type(&self, ty: ComponentType) {
        drop(self.unregister_type(ty));
    }

    /// Destroy every registered component, newest first
    pub fn destroy_all_components(&self) {
        // iterate a snapshot so destruction-triggered listeners cannot
        // corrupt the iteration
        let snapshot = self.inner.registry.borrow().handles();

        for handle in snapshot.iter().rev() {
            self.destroy_component_type(handle.component_type());
        }
    }

    pub fn has<C: Component>(&self) -> bool {
        self.has_type(ComponentType::of::<C>())
    }

    pub fn has_type(&self, ty: ComponentType) -> bool {
        self.inner.registry.borrow().contains(ty)
    }

    /// Typed lookup; `None` if no component of type `C` is registered
    pub fn component<C: Component>(&self) -> Option<Shared<C>> {
        self.inner.registry.borrow().get::<C>()
    }

    /// Snapshot of the current component list in insertion order
    pub fn components(&self) -> Vec<ComponentHandle> {
        self.inner.registry.borrow().handles()
    }

    pub fn component_types(&self) -> ComponentTypeSet {
        self.inner.registry.borrow().type_set()
    }

    pub fn component_count(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    /// Destroy the entity: every component is destroyed first (each
    /// unregistration event fires), then the destroyed notification is
    /// raised, exactly once. A second call is a no-op
    pub fn destroy(&self) {
        if self.inner.destroyed.replace(true) {
            return;
        }

        self.destroy_all_components();
        self.inner.destroyed_signal.emit(self);
    }

    /// Fired after a component has been registered
    pub fn component_registered(&self) -> &Signal<ComponentEvent> {
        &self.inner.component_registered
    }

    /// Fired after a component has been unregistered
    pub fn component_unregistered(&self) -> &Signal<ComponentEvent> {
        &self.inner.component_unregistered
    }

    /// Fired when the entity is destroyed, after its components are torn down
    pub fn destroyed(&self) -> &Signal<Entity> {
        &self.inner.destroyed_signal
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Entity {}

impl Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => write!(f, "{}#{}", label, self.id()),
            None => write!(f, "entity#{}", self.id()),
        }
    }
}

impl Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id())
            .field("label", &self.label())
            .field("components", &self.component_types().names())
            .finish()
    }
}
