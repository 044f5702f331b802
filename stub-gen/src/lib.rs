//! Generates the flasher stub table of esp-serial-flasher.
//!
//! Every chip the flasher supports gets one slot in a C array indexed by `target_chip_t`. The
//! slots are filled from stub descriptors (JSON documents published alongside each stub
//! release) and written to `private_include/esp_stubs.h` and `src/esp_stubs.c`.

pub mod descriptor;
pub mod emit;
pub mod enumeration;
pub mod error;
pub mod fetch;
pub mod generate;
pub mod layout;
pub mod template;

pub use descriptor::StubDescriptor;
pub use error::Error;
pub use fetch::DescriptorSource;
pub use generate::{generate, run, GeneratedArtifact, RunConfig};
pub use layout::{ChipSlot, SlotLayout};
