//! Unit factory registry
//!
//! Maps a stable class identifier (hash of the kernel's class name) to a
//! constructor closure producing a fresh, fully port-registered unit. The
//! registry is an explicit object owned by the session and passed by reference
//! to whatever needs to instantiate units: the control surface, the command
//! executor, the patch builder. There is no process-wide singleton.

use std::collections::HashMap;

use tracing::warn;

use crate::unit::{class_id, ClassId, UnitHandle};

type Constructor = Box<dyn Fn() -> UnitHandle + Send + Sync>;

struct Entry {
    name: &'static str,
    build: Constructor,
}

#[derive(Default)]
pub struct UnitRegistry {
    entries: HashMap<ClassId, Entry>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every builtin unit type, ready for patch building and live editing.
    pub fn with_builtins() -> Self {
        use crate::units;

        let mut reg = Self::new();
        reg.register("NoteInputUnit", units::note_input::build);
        reg.register("ConstantUnit", units::constant::build);
        reg.register("GainUnit", units::gain::build);
        reg.register("AddUnit", units::add::build);
        reg.register("MultiplyUnit", units::multiply::build);
        reg.register("OscillatorUnit", units::oscillator::build);
        reg.register("SvfFilterUnit", units::svf_filter::build);
        reg.register("AdsrUnit", units::adsr::build);
        reg.register("DelayUnit", units::delay::build);
        reg.register("NoiseUnit", units::noise::build);
        reg
    }

    /// Register a constructor under the hash of `name`.
    ///
    /// The name must match what the constructed kernel reports as its class
    /// name, or persistence lookups will miss. Hash collisions between
    /// distinct names are not resolved, only reported.
    pub fn register<F>(&mut self, name: &'static str, build: F) -> ClassId
    where
        F: Fn() -> UnitHandle + Send + Sync + 'static,
    {
        let class = class_id(name);
        if let Some(existing) = self.entries.get(&class) {
            if existing.name != name {
                warn!(
                    class,
                    old = existing.name,
                    new = name,
                    "class id collision, replacing previous registration"
                );
            }
        }
        self.entries.insert(
            class,
            Entry {
                name,
                build: Box::new(build),
            },
        );
        class
    }

    /// Instantiate a fresh unit; None for an unknown class id.
    pub fn create(&self, class: ClassId) -> Option<UnitHandle> {
        self.entries.get(&class).map(|e| (e.build)())
    }

    pub fn create_by_name(&self, name: &str) -> Option<UnitHandle> {
        self.create(class_id(name))
    }

    pub fn class_name(&self, class: ClassId) -> Option<&'static str> {
        self.entries.get(&class).map(|e| e.name)
    }

    pub fn contains(&self, class: ClassId) -> bool {
        self.entries.contains_key(&class)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered (class id, class name) pairs, for editor listings.
    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &'static str)> + '_ {
        self.entries.iter().map(|(&id, e)| (id, e.name))
    }
}
