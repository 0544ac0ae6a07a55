//! # datagen-core
//!
//! Pure logic for backup data generation (no I/O, instant tests).
//!
//! This crate decides *what* synthetic data a site should receive and turns
//! that decision into shell commands. Nothing here touches the network or
//! the local disk.
//!
//! ## Design Philosophy
//!
//! Every generator takes its randomness from a caller-supplied [`rand::Rng`],
//! so the same seed always produces the same distribution, the same names and
//! the same command sequence. The actual execution of those commands on remote
//! containers is performed by `datagen-exec`.
//!
//! ## Example
//!
//! ```
//! use backup_datagen_core::{BackupDataGen, CommandBuilder};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let generator = BackupDataGen::new(CommandBuilder::new("/data", 30), "medium");
//! let mut rng = StdRng::seed_from_u64(7);
//! let commands = generator.generate(&mut rng);
//! assert!(commands[0].starts_with("mkdir -p /data/large/"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod category;
pub mod commands;
pub mod distribution;
pub mod names;

pub use category::SizeCategory;
pub use commands::{BackupDataGen, CategoryCommands, CommandBuilder, DataPlan};
pub use distribution::{CategorySpec, Distribution, Profile, DEFAULT_PROFILE, PROFILES};
pub use names::{random_name, MAX_NAME_LENGTH, MIN_NAME_LENGTH};

/// One kibibyte.
pub const KIB: u64 = 1024;

/// One mebibyte.
pub const MIB: u64 = 1024 * KIB;

/// One gibibyte.
pub const GIB: u64 = 1024 * MIB;
