//! This library implements the simulation core of the Blink idle RPG
//! engine.
//!
//! Programming interface is centered around the [`Sim`] structure, which
//! encapsulates simulation state. A [`Sim`] is created from a compiled
//! IR module, either as an already-deserialized [`IrModule`] or straight
//! from its JSON text. Once initialized it can be stepped through one
//! event at a time, run to completion with a step cap, or driven in
//! cooperative batches by an enclosing UI runtime.
//!
//! The crate deliberately stops at the IR boundary. The surface-language
//! compiler (BRL/BDL/BCL), DOM presentation layers and any persistence
//! of simulation state are external collaborators.
//!
//! # Determinism
//!
//! Simulation time is logical and advances only when events are popped
//! off the timeline. Event delivery follows the `(time, sequence)` pair
//! and nothing else; rules fire in IR declaration order and entities in
//! store insertion order. The random number generator is owned by the
//! facade and can be seeded, so two runs from the same IR, the same
//! external schedule calls and the same seed produce identical state.
//!
//! # Example
//!
//! ```ignore
//! use blink_core::Sim;
//!
//! let ir = std::fs::read_to_string("module.ir.json").unwrap();
//! let mut sim = Sim::from_json_str(&ir).unwrap().with_seed(42);
//! while let Some(report) = sim.step().unwrap() {
//!     println!("[{}] {}", report.time, report.event.event_type);
//! }
//! ```

#[macro_use]
extern crate serde;
#[macro_use]
extern crate log;

// reexports
pub use entity::Store;
pub use error::{Error, Result};
pub use ir::IrModule;
pub use model::SimModel;
pub use sim::Sim;
pub use timeline::{ScheduledEvent, Timeline};
pub use value::{Value, ValueType};

pub mod entity;
pub mod error;
pub mod ir;
pub mod machine;
pub mod model;
pub mod sim;
pub mod timeline;
pub mod value;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// IR format version this engine consumes.
pub const IR_VERSION: &str = "1.0";

/// Hard cap on `while` action iterations within a single rule firing.
pub const MAX_WHILE_ITERATIONS: u32 = 10_000;

/// Number of events processed between cooperative yields of the batched
/// driver loop.
pub const DEFAULT_STEP_BATCH: u32 = 10;

/// Floating point number type used throughout the library.
pub type Float = f64;
/// Integer number type used throughout the library.
pub type Int = i64;

/// Component string identifier type.
pub type CompName = String;
/// Component field string identifier type.
pub type VarName = String;
/// Event string identifier type.
pub type EventName = String;
/// Function string identifier type.
pub type FuncName = String;

/// Entity unique integer identifier type.
pub type EntityId = u32;
/// Scheduled event unique identifier type.
pub type EventUid = u64;
