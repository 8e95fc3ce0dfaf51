use std::ops::BitOr;

use crate::space::EntitySpace;

/// One of the three per-tick dispatch phases
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Phase {
    /// The main once-per-frame update
    Primary,
    /// Fixed-step update, driven by the host at its own cadence
    Fixed,
    /// Runs after every primary update of the tick has completed
    Late,
}

/// The set of [Phase]s a system participates in
///
/// Declared once via [System::phases] and cached by the scheduler at
/// registration time, rather than re-discovered every tick
#[derive(Copy, Clone, PartialEq, Eq, Default, Debug)]
pub struct Phases(u8);

impl Phases {
    pub const NONE: Phases = Phases(0);
    pub const PRIMARY: Phases = Phases(1);
    pub const FIXED: Phases = Phases(1 << 1);
    pub const LATE: Phases = Phases(1 << 2);

    pub const fn with(self, phase: Phase) -> Phases {
        Phases(self.0 | Self::mask(phase))
    }

    pub const fn contains(self, phase: Phase) -> bool {
        self.0 & Self::mask(phase) != 0
    }

    const fn mask(phase: Phase) -> u8 {
        match phase {
            Phase::Primary => 1,
            Phase::Fixed => 1 << 1,
            Phase::Late => 1 << 2,
        }
    }
}

impl BitOr for Phases {
    type Output = Phases;

    fn bitor(self, rhs: Phases) -> Phases {
        Phases(self.0 | rhs.0)
    }
}

/// A priority-ordered unit of per-tick logic
///
/// Systems read and write component data through the [crate::FamilyCache]s
/// they create during [System::on_init]. Phase hooks default to empty bodies;
/// a system is only ever dispatched for phases it declares in
/// [System::phases], everything else is silently skipped.
///
/// Priority and enabled state live on the [crate::SystemHandle] returned by
/// [EntitySpace::register_system]
pub trait System: 'static {
    /// The phases this system wants dispatched to it
    fn phases(&self) -> Phases;

    /// Bind to a space. Family caches are created here so they can backfill
    /// against the world state that already exists
    fn on_init(&mut self, space: &EntitySpace);

    /// Unbind from the space. Caches owned by the system dispose themselves
    /// when dropped, so an empty body is usually enough
    fn on_dispose(&mut self, _space: &EntitySpace) {}

    fn on_update(&mut self, _space: &EntitySpace, _dt: f64) {}

    fn on_fixed_update(&mut self, _space: &EntitySpace, _dt: f64) {}

    fn on_late_update(&mut self, _space: &EntitySpace, _dt: f64) {}
}
