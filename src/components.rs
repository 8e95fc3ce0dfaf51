use std::any::Any;
use std::any::TypeId;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Debug;
use std::fmt::Display;
use std::rc::Rc;

use itertools::Itertools;

use crate::error::EcsError;

/// The core component trait
///
/// Users implement this trait on any struct or enum they wish to attach to an
/// [crate::Entity]. A component is plain typed data; all behavior lives in
/// systems
pub trait Component: Debug + 'static {}

/// Shared handle to a single live component instance
///
/// Family nodes and consuming code hold component data in this form. The
/// instance stays alive for as long as any handle to it does, which is what
/// gives nodes their snapshot-at-match-time semantics
pub type Shared<C> = Rc<RefCell<C>>;

/// [ComponentType]
///
/// A unique identifier for a component type
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ComponentType {
    id: TypeId,
    name: &'static str,
}

impl ComponentType {
    pub fn of<C: Component>() -> Self {
        ComponentType {
            id: TypeId::of::<C>(),
            name: std::any::type_name::<C>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let split_str = self.name.rsplit_once("::");
        let substring = split_str.unwrap_or((self.name, self.name)).1;
        write!(f, "{}", substring)
    }
}

/// [ComponentTypeSet]
///
/// A unique ordered set of component types. Family shapes use one of these to
/// describe their required slots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentTypeSet(BTreeSet<ComponentType>);

impl ComponentTypeSet {
    pub fn contains(&self, component: &ComponentType) -> bool {
        self.0.contains(component)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentType> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> String {
        format!("[{}]", self.0.iter().map(|c| c.to_string()).join(", "))
    }
}

impl Display for ComponentTypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names())
    }
}

impl FromIterator<ComponentType> for ComponentTypeSet {
    fn from_iter<I: IntoIterator<Item = ComponentType>>(iter: I) -> Self {
        ComponentTypeSet(iter.into_iter().collect())
    }
}

/// [ComponentHandle]
///
/// A type-erased shared handle to one component instance, paired with the
/// [ComponentType] it was created from. The erased form is what registries
/// store and events carry; [ComponentHandle::downcast] recovers typed access
#[derive(Clone)]
pub struct ComponentHandle {
    ty: ComponentType,
    cell: Rc<dyn Any>,
}

impl ComponentHandle {
    pub fn new<C: Component>(component: C) -> Self {
        ComponentHandle {
            ty: ComponentType::of::<C>(),
            cell: Rc::new(RefCell::new(component)),
        }
    }

    /// Wrap an already-shared instance, e.g. one previously unregistered from
    /// another entity
    pub fn from_shared<C: Component>(shared: Shared<C>) -> Self {
        ComponentHandle {
            ty: ComponentType::of::<C>(),
            cell: shared,
        }
    }

    pub fn component_type(&self) -> ComponentType {
        self.ty
    }

    /// Typed access; `None` when `C` is not the concrete type behind this
    /// handle, never a mismatched value
    pub fn downcast<C: Component>(&self) -> Option<Shared<C>> {
        Rc::clone(&self.cell).downcast::<RefCell<C>>().ok()
    }
}

impl Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentHandle({})", self.ty)
    }
}

/// [ComponentRegistry]
///
/// Insertion-ordered storage for the components attached to one entity, at
/// most one component per concrete type
///
/// The registry is pure storage: the owning [crate::Entity] serializes every
/// mutation through its own register/unregister/destroy operations and emits
/// the matching events, nothing else touches a registry directly
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_type: HashMap<ComponentType, ComponentHandle>,
    ordered: Vec<ComponentHandle>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    pub(crate) fn insert(&mut self, handle: ComponentHandle) -> Result<(), EcsError> {
        let ty = handle.component_type();

        if self.by_type.contains_key(&ty) {
            return Err(EcsError::DuplicateComponent(ty));
        }

        self.by_type.insert(ty, handle.clone());
        self.ordered.push(handle);
        Ok(())
    }

    pub(crate) fn remove(&mut self, ty: ComponentType) -> Option<ComponentHandle> {
        let handle = self.by_type.remove(&ty)?;
        self.ordered.retain(|h| h.component_type() != ty);
        Some(handle)
    }

    pub fn contains(&self, ty: ComponentType) -> bool {
        self.by_type.contains_key(&ty)
    }

    pub fn get<C: Component>(&self) -> Option<Shared<C>> {
        self.by_type
            .get(&ComponentType::of::<C>())
            .and_then(ComponentHandle::downcast)
    }

    /// Snapshot of the current component list in insertion order
    pub fn handles(&self) -> Vec<ComponentHandle> {
        self.ordered.clone()
    }

    pub fn type_set(&self) -> ComponentTypeSet {
        self.ordered.iter().map(|h| h.component_type()).collect()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Health {
        current: i32,
    }
    impl Component for Health {}

    #[derive(Debug, Default)]
    struct Armor {
        rating: i32,
    }
    impl Component for Armor {}

    #[test]
    fn one_component_per_concrete_type() {
        let mut registry = ComponentRegistry::new();
        registry
            .insert(ComponentHandle::new(Health { current: 100 }))
            .unwrap();

        let duplicate = registry.insert(ComponentHandle::new(Health { current: 5 }));
        assert_eq!(
            duplicate,
            Err(EcsError::DuplicateComponent(ComponentType::of::<Health>()))
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get::<Health>().unwrap().borrow().current, 100);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = ComponentRegistry::new();
        registry
            .insert(ComponentHandle::new(Armor { rating: 3 }))
            .unwrap();

        assert!(registry.remove(ComponentType::of::<Armor>()).is_some());
        assert!(registry.remove(ComponentType::of::<Armor>()).is_none());
    }

    #[test]
    fn downcast_never_yields_a_mismatched_value() {
        let handle = ComponentHandle::new(Health { current: 1 });
        assert!(handle.downcast::<Armor>().is_none());
        assert!(handle.downcast::<Health>().is_some());
    }

    #[test]
    fn handles_preserve_insertion_order() {
        let mut registry = ComponentRegistry::new();
        registry
            .insert(ComponentHandle::new(Armor { rating: 1 }))
            .unwrap();
        registry
            .insert(ComponentHandle::new(Health { current: 2 }))
            .unwrap();

        let order: Vec<ComponentType> = registry
            .handles()
            .iter()
            .map(|h| h.component_type())
            .collect();
        assert_eq!(
            order,
            vec![ComponentType::of::<Armor>(), ComponentType::of::<Health>()]
        );
    }
}
