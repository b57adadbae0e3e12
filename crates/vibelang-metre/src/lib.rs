//! vibelang-metre - Metre and bar scheduling for VibeLang
//!
//! Places notes inside bars of a metre with exact rational arithmetic, and
//! keeps independently started performance threads on a shared downbeat grid.
//! Features include:
//!
//! - Time-signature presets (`2/4` to `12/8`) and explicit nested metres
//! - Levels that address beats, their subdivisions and their groupings
//! - Micro-timing styles (Viennese waltz, jembe, triplet swing)
//! - Bars that check their capacity and sleep out unused time
//! - A Rhai scripting API and a CLI that renders or plays scripts
//!
//! # Usage as a Library
//!
//! ```no_run
//! use vibelang_metre::{schedule, MetreSpec, Performer, SoundOptions, VirtualPerformer};
//!
//! let performer = VirtualPerformer::new();
//! let spec: MetreSpec = "4/4".parse()?;
//! schedule::use_metre(&performer, &spec, Some("triplet_swing"))?;
//!
//! schedule::bar(&performer, || {
//!     schedule::add_note(&performer, "C4", 1, 1, &SoundOptions::new())?;
//!     schedule::add_note(&performer, "D4", 0, 3, &SoundOptions::new())?;
//!     Ok::<(), vibelang_metre::Error>(())
//! })?;
//!
//! for event in performer.events() {
//!     println!("{}", event);
//! }
//! assert_eq!(performer.current_beat(), 4.0);
//! # Ok::<(), vibelang_metre::Error>(())
//! ```

pub mod api;
pub mod bar;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod metre;
pub mod performer;
pub mod phase;
pub mod rational;
pub mod schedule;
pub mod style;
pub mod tree;

// Re-export main types
pub use bar::Bar;
pub use clock::TransportClock;
pub use config::Config;
pub use error::{Error, Result};
pub use metre::SynchronisedMetre;
pub use performer::{
    Performer, RealtimePerformer, ScheduledSound, Sound, SoundOptions, VirtualPerformer,
};
pub use phase::{PhaseAnchor, PhaseRegistry};
pub use rational::RationalDuration;
pub use schedule::NoteValue;
pub use style::MicroTimingStyle;
pub use tree::{MetreNode, MetreSpec, SubdivisionTree, TimeSignature, TreePosition};
