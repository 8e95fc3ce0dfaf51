use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::components::ComponentType;

/// Structural errors raised by the core registries
///
/// Most structural no-ops (unregistering a component or entity that isn't
/// there) are deliberately silent and idempotent. Only operations that would
/// violate an invariant if applied surface here, and the convenience entity
/// API absorbs those as logged no-ops
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    DuplicateComponent(ComponentType),
}

impl Error for EcsError {}

impl Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::DuplicateComponent(ty) => {
                write!(f, "a component of type {} is already registered", ty)
            }
        }
    }
}
