use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use futures::StreamExt;

use crate::descriptor::StubDescriptor;
use crate::emit;
use crate::enumeration::parse_enumerators;
use crate::error::{Error, SlotId};
use crate::fetch::DescriptorSource;
use crate::layout::{ChipSlot, SlotLayout};
use crate::template;

/// How many descriptor downloads may be in flight at once.
const PREFETCH: usize = 4;

const HEADER_TEMPLATE: &str = "cmake/esp_stubs.h.template";
const SOURCE_TEMPLATE: &str = "cmake/esp_stubs.c.template";
const HEADER_OUTPUT: &str = "private_include/esp_stubs.h";
const SOURCE_OUTPUT: &str = "src/esp_stubs.c";
const CONSUMER_HEADER: &str = "include/esp_loader.h";

/// Terminates the table definition opened by the source template.
const SOURCE_EPILOGUE: &str = "};\n\n#endif\n";

/// Settings of a single generation run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Version of the published stubs, without the `v` prefix.
    pub version: String,
    /// Root of the flasher library: holds the templates and receives the artifacts.
    pub root: PathBuf,
    /// Substituted for `{current_year}` in the templates.
    pub current_year: i32,
}

/// The generated header and source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    pub header: String,
    pub source: String,
}

/// Generates the stub table for `layout` and replaces the artifacts below `config.root`.
///
/// Nothing is written unless every slot was generated successfully.
pub async fn run(
    layout: &SlotLayout,
    source: &DescriptorSource,
    config: &RunConfig,
) -> Result<Vec<PathBuf>, Error> {
    let artifact = generate(layout, source, config).await?;
    artifact.write(&config.root)
}

/// Generates the stub table for `layout` in memory.
pub async fn generate(
    layout: &SlotLayout,
    source: &DescriptorSource,
    config: &RunConfig,
) -> Result<GeneratedArtifact, Error> {
    layout.validate()?;
    check_consumer_enumeration(layout, &config.root)?;

    let values = HashMap::from([
        ("current_year", config.current_year.to_string()),
        ("stub_version", config.version.clone()),
        ("max_chip_number", layout.slots.len().to_string()),
        ("static_asserts", layout.static_asserts()),
    ]);
    let header = render_template(&config.root, HEADER_TEMPLATE, &values)?;
    let mut body = render_template(&config.root, SOURCE_TEMPLATE, &values)?;

    // Downloads run ahead, but `buffered` yields them in slot order.
    let mut descriptors = futures::stream::iter(&layout.slots)
        .map(|slot| fetch_slot(source, slot))
        .buffered(PREFETCH);

    while let Some(fetched) = descriptors.next().await {
        let (slot, fetched) = fetched?;
        let fetched = fetched
            .as_ref()
            .map(|(descriptor, json)| (*descriptor, json.as_slice()));
        body.push_str(&render_slot(slot, fetched)?);
    }

    body.push_str(SOURCE_EPILOGUE);

    Ok(GeneratedArtifact {
        header,
        source: body,
    })
}

fn slot_id(slot: &ChipSlot) -> SlotId {
    SlotId {
        index: slot.index,
        chip: slot.chip.clone(),
    }
}

/// Fetches the descriptor of `slot`, paired with its file name. Placeholders fetch nothing.
async fn fetch_slot<'a>(
    source: &DescriptorSource,
    slot: &'a ChipSlot,
) -> Result<(&'a ChipSlot, Option<(&'a str, Vec<u8>)>), Error> {
    let Some(descriptor) = &slot.descriptor else {
        return Ok((slot, None));
    };

    let json = source.fetch(&slot_id(slot), descriptor).await?;
    Ok((slot, Some((descriptor.as_str(), json))))
}

/// Renders the record of one slot from its descriptor name and JSON, `None` for a placeholder.
fn render_slot(slot: &ChipSlot, fetched: Option<(&str, &[u8])>) -> Result<String, Error> {
    let Some((descriptor, json)) = fetched else {
        tracing::info!("Slot {} ({}): placeholder", slot.index, slot.chip);
        return Ok(emit::render_placeholder().to_owned());
    };

    let stub = StubDescriptor::decode(json).map_err(|source| Error::Decode {
        slot: slot_id(slot),
        source,
    })?;

    tracing::info!(
        "Slot {} ({}): {descriptor}, {} text bytes, {} data bytes",
        slot.index,
        slot.chip,
        stub.text.len(),
        stub.data.len()
    );

    Ok(emit::render_stub(descriptor, &stub))
}

fn render_template(
    root: &Path,
    name: &str,
    values: &HashMap<&str, String>,
) -> Result<String, Error> {
    let path = root.join(name);
    let text = std::fs::read_to_string(&path).map_err(Error::io(&path))?;

    template::substitute(&text, values).map_err(|source| Error::Template {
        name: name.to_owned(),
        source,
    })
}

/// Cross-checks the layout with the chip enumeration of the consumer, if its header is present.
fn check_consumer_enumeration(layout: &SlotLayout, root: &Path) -> Result<(), Error> {
    let path = root.join(CONSUMER_HEADER);
    if !path.exists() {
        tracing::warn!(
            "{} not found, skipping the {} check",
            path.display(),
            layout.enumeration
        );
        return Ok(());
    }

    let header = std::fs::read_to_string(&path).map_err(Error::io(&path))?;
    match parse_enumerators(&header, &layout.enumeration) {
        Some(enumerators) => {
            layout.check_enumeration(&enumerators)?;
            tracing::debug!("Layout matches {} in {}", layout.enumeration, path.display());
        }
        None => tracing::warn!(
            "{} does not declare {}, skipping the check",
            path.display(),
            layout.enumeration
        ),
    }

    Ok(())
}

impl GeneratedArtifact {
    /// Atomically replaces the header and source artifacts below `root`.
    ///
    /// Both files are staged next to their destination first. If the source cannot be put in
    /// place after the header was, the previous header is restored, so a failure leaves the
    /// previous artifacts untouched.
    pub fn write(&self, root: &Path) -> Result<Vec<PathBuf>, Error> {
        let header_path = root.join(HEADER_OUTPUT);
        let source_path = root.join(SOURCE_OUTPUT);

        let header = stage(&header_path, &self.header)?;
        let source = stage(&source_path, &self.source)?;
        let previous_header = back_up(&header_path)?;

        persist(header, &header_path)?;
        if let Err(error) = persist(source, &source_path) {
            restore(previous_header, &header_path);
            return Err(error);
        }

        Ok(vec![header_path, source_path])
    }
}

fn persist(file: tempfile::NamedTempFile, path: &Path) -> Result<(), Error> {
    file.persist(path)
        .map(drop)
        .map_err(|error| Error::io(path)(error.error))
}

/// Copies the current contents of `path` aside, if it exists.
fn back_up(path: &Path) -> Result<Option<tempfile::NamedTempFile>, Error> {
    if !path.exists() {
        return Ok(None);
    }

    let dir = path.parent().unwrap_or(Path::new("."));
    let backup = tempfile::NamedTempFile::new_in(dir).map_err(Error::io(dir))?;
    std::fs::copy(path, backup.path()).map_err(Error::io(path))?;

    Ok(Some(backup))
}

/// Puts `backup` back at `path`, or removes `path` if there was nothing to back up.
fn restore(backup: Option<tempfile::NamedTempFile>, path: &Path) {
    let restored = match backup {
        Some(backup) => backup.persist(path).map(drop).map_err(|error| error.error),
        None => std::fs::remove_file(path),
    };

    if let Err(error) = restored {
        tracing::warn!("Failed to restore {}: {error}", path.display());
    }
}

fn stage(path: &Path, contents: &str) -> Result<tempfile::NamedTempFile, Error> {
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(Error::io(dir))?;

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(Error::io(dir))?;
    file.write_all(contents.as_bytes())
        .and_then(|()| file.as_file().sync_all())
        .map_err(Error::io(path))?;

    Ok(file)
}

#[cfg(test)]
mod test {
    use super::*;

    fn slot(index: usize, descriptor: Option<&str>) -> ChipSlot {
        ChipSlot {
            index,
            chip: format!("CHIP{index}"),
            descriptor: descriptor.map(str::to_owned),
        }
    }

    #[test]
    fn placeholder_ignores_slot_identity() {
        let first = render_slot(&slot(0, None), None).unwrap();
        let last = render_slot(&slot(9, None), None).unwrap();

        assert_eq!(first, last);
        assert_eq!(first, emit::PLACEHOLDER);
    }

    #[test]
    fn stub_record_is_labeled_with_descriptor() {
        let json = br#"{"entry": 4, "text": "AQID", "text_start": 100, "bss_start": 200}"#;

        let record =
            render_slot(&slot(1, Some("esp32.json")), Some(("esp32.json", json))).unwrap();

        assert!(record.starts_with("    // esp32.json\n"));
        assert!(record.contains(".entrypoint = 4,"));
    }

    #[test]
    fn decode_error_names_the_slot() {
        let json = br#"{"text": "AQID", "text_start": 100, "bss_start": 200}"#;

        let error =
            render_slot(&slot(3, Some("esp32c3.json")), Some(("esp32c3.json", json))).unwrap_err();

        assert_eq!(
            error.to_string(),
            "Failed to decode the stub descriptor for slot 3 (CHIP3)"
        );
    }

    /// Parses every `.data` byte literal of a rendered record.
    fn data_literals(record: &str) -> Vec<Vec<u8>> {
        record
            .split(".data = (const uint8_t[]){")
            .skip(1)
            .map(|rest| {
                let list = &rest[..rest.find('}').unwrap()];
                list.split(", ")
                    .filter(|byte| !byte.is_empty())
                    .map(|byte| u8::from_str_radix(byte.trim_start_matches("0x"), 16).unwrap())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn decoded_text_survives_rendering() {
        use base64::Engine as _;

        let every_byte: Vec<u8> = (0..=255).collect();
        for text in [every_byte, Vec::new()] {
            let json = format!(
                r#"{{"entry": 0, "text": "{}", "text_start": 0, "bss_start": 0}}"#,
                base64::engine::general_purpose::STANDARD.encode(&text)
            );

            let record = render_slot(
                &slot(2, Some("esp32.json")),
                Some(("esp32.json", json.as_bytes())),
            )
            .unwrap();

            assert_eq!(data_literals(&record), [text, Vec::new()]);
        }
    }

    #[tokio::test]
    async fn fetched_json_is_paired_with_its_descriptor() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("esp32.json"), "{}").unwrap();
        let source = DescriptorSource::local(dir.path());

        let described = slot(1, Some("esp32.json"));
        let (_, fetched) = fetch_slot(&source, &described).await.unwrap();
        assert_eq!(fetched, Some(("esp32.json", b"{}".to_vec())));

        let placeholder = slot(0, None);
        let (_, fetched) = fetch_slot(&source, &placeholder).await.unwrap();
        assert_eq!(fetched, None);
    }

    /// Makes the source destination a non-empty directory, which no file can replace.
    fn block_source_output(root: &Path) {
        std::fs::create_dir_all(root.join(SOURCE_OUTPUT).join("keep")).unwrap();
    }

    fn artifact() -> GeneratedArtifact {
        GeneratedArtifact {
            header: "new header".to_owned(),
            source: "new source".to_owned(),
        }
    }

    #[test]
    fn failed_source_replace_restores_previous_header() {
        let root = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("private_include")).unwrap();
        std::fs::write(root.path().join(HEADER_OUTPUT), "old header").unwrap();
        block_source_output(root.path());

        let error = artifact().write(root.path()).unwrap_err();

        assert!(
            matches!(error, Error::Io { ref path, .. } if *path == root.path().join(SOURCE_OUTPUT))
        );
        assert_eq!(
            std::fs::read_to_string(root.path().join(HEADER_OUTPUT)).unwrap(),
            "old header"
        );
        // No backup or staging files are left behind.
        assert_eq!(
            std::fs::read_dir(root.path().join("private_include"))
                .unwrap()
                .count(),
            1
        );
        assert_eq!(std::fs::read_dir(root.path().join("src")).unwrap().count(), 1);
    }

    #[test]
    fn failed_source_replace_removes_new_header() {
        let root = tempfile::TempDir::new().unwrap();
        block_source_output(root.path());

        assert!(artifact().write(root.path()).is_err());

        assert!(!root.path().join(HEADER_OUTPUT).exists());
    }

    #[test]
    fn write_replaces_existing_artifacts() {
        let root = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("src")).unwrap();
        std::fs::write(root.path().join(SOURCE_OUTPUT), "old").unwrap();

        let artifact = GeneratedArtifact {
            header: "header".to_owned(),
            source: "source".to_owned(),
        };
        let written = artifact.write(root.path()).unwrap();

        assert_eq!(
            written,
            [root.path().join(HEADER_OUTPUT), root.path().join(SOURCE_OUTPUT)]
        );
        assert_eq!(
            std::fs::read_to_string(root.path().join(HEADER_OUTPUT)).unwrap(),
            "header"
        );
        assert_eq!(
            std::fs::read_to_string(root.path().join(SOURCE_OUTPUT)).unwrap(),
            "source"
        );
        // Only the artifacts remain, no staging files.
        assert_eq!(std::fs::read_dir(root.path().join("src")).unwrap().count(), 1);
    }
}
