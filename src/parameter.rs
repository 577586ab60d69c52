//! Bounded, typed, modulatable control parameters
//!
//! Every unit owns a `ParamSet`: an ordered registry of parameters addressed by
//! a small stable id. Parameters are mutated through three actions (set, add,
//! scale), all of which clamp to the declared bounds, and convert to and from
//! normalized [0, 1] control space according to their control shape.

/// Stable per-set parameter index, assigned at registration time.
pub type ParamId = usize;

/// Value domain of a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    Double,
    Int,
    Bool,
    /// Closed list of choices; the value is the active index.
    Enum(Vec<String>),
}

/// How normalized [0, 1] control maps to the raw value range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlShape {
    /// Linear over [min, max].
    Bounded,
    /// Exponential over [min, max] so wide ranges (20 Hz to 20 kHz) keep useful
    /// resolution at the low end. min is clamped positive for the mapping.
    Unbounded,
}

/// One of the three clamping mutation actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamAction {
    /// Absolute assignment.
    Set,
    /// Relative offset.
    Add,
    /// Multiplicative scaling.
    Scale,
}

/// A bounded control value owned by a unit.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    value: f64,
    min: f64,
    max: f64,
    /// Display/precision hint: the increment one UI step represents.
    step: f64,
    visible: bool,
    kind: ParamKind,
    shape: ControlShape,
}

impl Parameter {
    pub fn new(name: &str, value: f64, min: f64, max: f64, kind: ParamKind) -> Self {
        let mut p = Self {
            name: name.to_string(),
            value: 0.0,
            min,
            max,
            step: 0.01,
            visible: true,
            kind,
            shape: ControlShape::Bounded,
        };
        p.set(value);
        p
    }

    pub fn double(name: &str, value: f64, min: f64, max: f64) -> Self {
        Self::new(name, value, min, max, ParamKind::Double)
    }

    pub fn int(name: &str, value: i64, min: i64, max: i64) -> Self {
        Self::new(name, value as f64, min as f64, max as f64, ParamKind::Int)
    }

    pub fn bool(name: &str, value: bool) -> Self {
        Self::new(
            name,
            if value { 1.0 } else { 0.0 },
            0.0,
            1.0,
            ParamKind::Bool,
        )
    }

    pub fn choice(name: &str, value: usize, choices: &[&str]) -> Self {
        let n = choices.len().max(1);
        Self::new(
            name,
            value as f64,
            0.0,
            (n - 1) as f64,
            ParamKind::Enum(choices.iter().map(|c| c.to_string()).collect()),
        )
    }

    pub fn with_shape(mut self, shape: ControlShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> f64 {
        self.value
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn kind(&self) -> &ParamKind {
        &self.kind
    }

    pub fn shape(&self) -> ControlShape {
        self.shape
    }

    /// Active choice's display name, for Enum parameters.
    pub fn choice_name(&self) -> Option<&str> {
        match &self.kind {
            ParamKind::Enum(choices) => choices.get(self.value as usize).map(String::as_str),
            _ => None,
        }
    }

    fn quantize(&self, value: f64) -> f64 {
        match self.kind {
            ParamKind::Double => value,
            ParamKind::Int | ParamKind::Enum(_) => value.round(),
            ParamKind::Bool => {
                if value >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    pub fn set(&mut self, value: f64) {
        self.value = self.quantize(value).clamp(self.min, self.max);
    }

    pub fn add(&mut self, offset: f64) {
        self.set(self.value + offset);
    }

    pub fn scale(&mut self, factor: f64) {
        self.set(self.value * factor);
    }

    pub fn apply(&mut self, action: ParamAction, value: f64) {
        match action {
            ParamAction::Set => self.set(value),
            ParamAction::Add => self.add(value),
            ParamAction::Scale => self.scale(value),
        }
    }

    /// Combined multiplicative/additive adjustment for UI increment gestures.
    pub fn nudge(&mut self, log_scale: f64, lin_scale: f64) {
        self.set(self.value * log_scale + lin_scale * self.step);
    }

    /// Current value in normalized [0, 1] control space.
    pub fn norm(&self) -> f64 {
        match self.shape {
            ControlShape::Bounded => {
                if self.max > self.min {
                    (self.value - self.min) / (self.max - self.min)
                } else {
                    0.0
                }
            }
            ControlShape::Unbounded => {
                let lo = self.min.max(1e-4);
                let hi = self.max.max(lo * (1.0 + 1e-9));
                (self.value.max(lo) / lo).ln() / (hi / lo).ln()
            }
        }
        .clamp(0.0, 1.0)
    }

    /// Assign from normalized [0, 1] control space.
    pub fn set_norm(&mut self, norm: f64) {
        let norm = norm.clamp(0.0, 1.0);
        let raw = match self.shape {
            ControlShape::Bounded => self.min + (self.max - self.min) * norm,
            ControlShape::Unbounded => {
                let lo = self.min.max(1e-4);
                let hi = self.max.max(lo * (1.0 + 1e-9));
                lo * (hi / lo).powf(norm)
            }
        };
        self.set(raw);
    }
}

/// Ordered parameter registry for one unit.
///
/// Registration order is stable and defines the order of the persisted
/// (name, value) list. Invalid ids read as sentinels and never panic.
#[derive(Debug, Clone, Default)]
pub struct ParamSet {
    params: Vec<Parameter>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter. Construction time only.
    pub fn add(&mut self, param: Parameter) -> ParamId {
        self.params.push(param);
        self.params.len() - 1
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, id: ParamId) -> Option<&Parameter> {
        self.params.get(id)
    }

    pub fn get_mut(&mut self, id: ParamId) -> Option<&mut Parameter> {
        self.params.get_mut(id)
    }

    /// Hot-path read: 0.0 for an unknown id, never a panic.
    pub fn value(&self, id: ParamId) -> f64 {
        self.params.get(id).map(Parameter::get).unwrap_or(0.0)
    }

    pub fn by_name(&self, name: &str) -> Option<ParamId> {
        self.params.iter().position(|p| p.name() == name)
    }

    /// Apply a clamping action; false for an unknown id.
    pub fn apply(&mut self, id: ParamId, action: ParamAction, value: f64) -> bool {
        match self.params.get_mut(id) {
            Some(p) => {
                p.apply(action, value);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamId, &Parameter)> {
        self.params.iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actions_clamp_to_bounds() {
        let mut p = Parameter::double("gain", 1.0, 0.0, 2.0);

        p.set(5.0);
        assert_eq!(p.get(), 2.0);

        p.add(-10.0);
        assert_eq!(p.get(), 0.0);

        p.set(0.5);
        p.scale(100.0);
        assert_eq!(p.get(), 2.0);
    }

    #[test]
    fn test_int_and_bool_quantize() {
        let mut p = Parameter::int("pitch", 60, 0, 127);
        p.set(60.4);
        assert_eq!(p.get(), 60.0);
        p.set(60.6);
        assert_eq!(p.get(), 61.0);

        let mut g = Parameter::bool("gate", false);
        g.set(0.7);
        assert_eq!(g.get(), 1.0);
        g.set(0.2);
        assert_eq!(g.get(), 0.0);
    }

    #[test]
    fn test_bounded_norm_roundtrip() {
        let mut p = Parameter::double("mix", 0.0, -1.0, 1.0);
        p.set_norm(0.75);
        assert!((p.get() - 0.5).abs() < 1e-9);
        assert!((p.norm() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_unbounded_norm_is_exponential() {
        let mut p =
            Parameter::double("cutoff", 1000.0, 20.0, 20000.0).with_shape(ControlShape::Unbounded);

        p.set_norm(0.0);
        assert!((p.get() - 20.0).abs() < 1e-6);
        p.set_norm(1.0);
        assert!((p.get() - 20000.0).abs() < 1e-3);

        // Halfway lands at the geometric mean, not the arithmetic one.
        p.set_norm(0.5);
        let geometric = (20.0f64 * 20000.0).sqrt();
        assert!((p.get() - geometric).abs() / geometric < 1e-6);
    }

    #[test]
    fn test_enum_choice_name() {
        let mut p = Parameter::choice("waveform", 1, &["sine", "saw", "square"]);
        assert_eq!(p.choice_name(), Some("saw"));
        p.set(2.0);
        assert_eq!(p.choice_name(), Some("square"));
        p.set(99.0);
        assert_eq!(p.choice_name(), Some("square")); // clamped to last choice
    }

    #[test]
    fn test_nudge_combines_log_and_lin() {
        let mut p = Parameter::double("time", 0.5, 0.0, 10.0).with_step(0.1);
        p.nudge(1.0, 1.0); // one linear step up
        assert!((p.get() - 0.6).abs() < 1e-9);
        p.nudge(2.0, 0.0); // doubling gesture
        assert!((p.get() - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_param_set_sentinels() {
        let mut set = ParamSet::new();
        let id = set.add(Parameter::double("gain", 1.0, 0.0, 2.0));

        assert_eq!(set.value(id), 1.0);
        assert_eq!(set.value(42), 0.0);
        assert!(!set.apply(42, ParamAction::Set, 1.0));
        assert_eq!(set.by_name("gain"), Some(id));
        assert_eq!(set.by_name("missing"), None);
    }
}
