//! Builtin unit kernels
//!
//! Concrete implementations of the `UnitKernel` trait, one module per unit
//! type. Each module exposes the kernel struct plus a `build()` constructor
//! that registers ports and parameters and returns a ready `UnitHandle`; the
//! registry maps class ids to these constructors.
//!
//! Sources: [`note_input`], [`constant`], [`oscillator`], [`noise`].
//! Math: [`gain`], [`add`], [`multiply`].
//! Shaping: [`svf_filter`], [`adsr`].
//! Buffered: [`delay`] (the only builtin allowed to close a feedback loop).

pub mod add;
pub mod adsr;
pub mod constant;
pub mod delay;
pub mod gain;
pub mod multiply;
pub mod noise;
pub mod note_input;
pub mod oscillator;
pub mod svf_filter;
