//!
//! Kindred is a lightweight entity component system built around incrementally
//! cached "family" nodes
//!
//! Entities are opaque identities carrying a typed component set; a family
//! shape declares which component types a system cares about, and a
//! [FamilyCache] keeps a node list for every matching entity up to date as
//! components and entities come and go. An [EntitySpace] owns the entity and
//! system population, defers membership changes raised mid-traversal to a
//! single drain point per tick, and dispatches the three update phases in
//! system priority order.
//!
//! Everything is single-threaded and synchronous: events fan out in
//! subscription order the moment state settles, and iteration over anything
//! mutable happens on snapshots
//!

pub mod components;
pub mod entity;
pub mod error;
pub mod family;
pub mod id;
pub mod signal;
pub mod space;
pub mod system;

mod macros;

pub use components::Component;
pub use components::ComponentHandle;
pub use components::ComponentRegistry;
pub use components::ComponentType;
pub use components::ComponentTypeSet;
pub use components::Shared;
pub use entity::ComponentEvent;
pub use entity::Entity;
pub use error::EcsError;
pub use family::FamilyCache;
pub use family::FamilyShape;
pub use id::EntityId;
pub use signal::ListenerId;
pub use signal::Signal;
pub use space::ComponentStateChange;
pub use space::EntitySpace;
pub use space::SystemHandle;
pub use system::Phase;
pub use system::Phases;
pub use system::System;

#[cfg(test)]
mod test;
