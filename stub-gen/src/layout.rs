use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::path::Path;

use serde::Deserialize;

use crate::error::{LayoutError, OrderingError};

/// Layouts shipped with the generator, by name.
const BUILTIN_LAYOUTS: &[(&str, &str)] = &[
    (
        "esp-flasher-stub",
        include_str!("../layouts/esp-flasher-stub.yaml"),
    ),
    (
        "esptool-legacy",
        include_str!("../layouts/esptool-legacy.yaml"),
    ),
];

/// The layout used when none is selected.
pub const DEFAULT_LAYOUT: &str = "esp-flasher-stub";

/// The ordered list of table slots.
///
/// Slot `i` of the generated table is indexed by the consumer with the enumerator of value `i`,
/// so the slot order has to follow the declaration order of the consumer's chip enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SlotLayout {
    /// Name of the consumer's chip enumeration type, e.g. `target_chip_t`.
    pub enumeration: String,
    /// The enumerator counting the chips, which sizes the table.
    pub cardinality: Cardinality,
    /// Directory below `v{version}` holding the descriptors on the remote.
    #[serde(default)]
    pub descriptor_dir: Option<String>,
    pub slots: Vec<ChipSlot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Cardinality {
    pub name: String,
    pub value: usize,
}

/// One entry of the generated table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChipSlot {
    pub index: usize,
    /// The consumer's enumerator for this chip, e.g. `ESP32_CHIP`.
    pub chip: String,
    /// The descriptor file name, or `None` for a placeholder.
    #[serde(default)]
    pub descriptor: Option<String>,
}

impl SlotLayout {
    /// Names of the built-in layouts.
    pub fn builtin_names() -> impl Iterator<Item = &'static str> {
        BUILTIN_LAYOUTS.iter().map(|(name, _)| *name)
    }

    /// Returns the built-in layout called `name`.
    pub fn builtin(name: &str) -> Result<Self, LayoutError> {
        let (_, yaml) = BUILTIN_LAYOUTS
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .ok_or_else(|| LayoutError::UnknownBuiltin(name.to_owned()))?;

        Self::from_yaml(yaml)
    }

    /// Loads a layout from a YAML file.
    pub fn from_path(path: &Path) -> Result<Self, LayoutError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| LayoutError::Read {
            path: path.to_owned(),
            source,
        })?;

        Self::from_yaml(&yaml)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, LayoutError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Resolves a `--layout` argument: a built-in name, otherwise a path to a YAML file.
    pub fn load(selector: &str) -> Result<Self, LayoutError> {
        if Self::builtin_names().any(|name| name == selector) {
            Self::builtin(selector)
        } else {
            Self::from_path(Path::new(selector))
        }
    }

    /// Checks that the layout is self-consistent: one slot per enumerator below the
    /// cardinality, in index order, each naming a distinct valid C identifier.
    pub fn validate(&self) -> Result<(), OrderingError> {
        if self.slots.len() != self.cardinality.value {
            return Err(OrderingError::SlotCount {
                constant: self.cardinality.name.clone(),
                expected: self.cardinality.value,
                actual: self.slots.len(),
            });
        }

        let mut seen = HashSet::new();
        for (position, slot) in self.slots.iter().enumerate() {
            if slot.index != position {
                return Err(OrderingError::IndexMismatch {
                    position,
                    index: slot.index,
                });
            }
            if !is_c_identifier(&slot.chip) {
                return Err(OrderingError::InvalidIdentifier(slot.chip.clone()));
            }
            if !seen.insert(slot.chip.as_str()) {
                return Err(OrderingError::DuplicateChip {
                    chip: slot.chip.clone(),
                });
            }
        }

        for name in [&self.cardinality.name, &self.enumeration] {
            if !is_c_identifier(name) {
                return Err(OrderingError::InvalidIdentifier(name.clone()));
            }
        }

        Ok(())
    }

    /// Checks the layout against the enumerator values declared by the consumer.
    pub fn check_enumeration(&self, enumerators: &HashMap<String, usize>) -> Result<(), OrderingError> {
        let expected = self
            .slots
            .iter()
            .map(|slot| (&slot.chip, slot.index))
            .chain(std::iter::once((
                &self.cardinality.name,
                self.cardinality.value,
            )));

        for (chip, index) in expected {
            match enumerators.get(chip) {
                Some(&value) if value == index => {}
                Some(&value) => {
                    return Err(OrderingError::EnumValueMismatch {
                        chip: chip.clone(),
                        index,
                        value,
                    })
                }
                None => return Err(OrderingError::MissingEnumerator { chip: chip.clone() }),
            }
        }

        Ok(())
    }

    /// C11 assertions binding every chip enumerator to its slot index, so that a reordered
    /// enumeration fails the consumer's build.
    pub fn static_asserts(&self) -> String {
        let message = format!("Stub order matches {} enumeration", self.enumeration);

        let mut out = String::from("#if __STDC_VERSION__ >= 201112L\n");
        for slot in &self.slots {
            let _ = writeln!(
                out,
                "_Static_assert({} == {}, \"{message}\");",
                slot.chip, slot.index
            );
        }
        let _ = writeln!(
            out,
            "_Static_assert({} == {}, \"{message}\");",
            self.cardinality.name,
            self.slots.len()
        );
        out.push_str("#endif\n");

        out
    }
}

fn is_c_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
