use base64::Engine as _;
use serde::Deserialize;

use crate::error::DecodeError;

/// A decoded flasher stub descriptor.
///
/// Descriptors are published as JSON documents carrying the stub's entry point and the base64
/// encoded contents of its `.text` and (optional) `.data` segments.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StubDescriptor {
    /// Address the flashing runtime jumps to after uploading the segments.
    pub entry: u32,
    /// Load address of the text segment.
    pub text_start: u32,
    /// Contents of the text segment, in load order.
    pub text: Vec<u8>,
    /// Load address of the data segment, `0` if the stub has none.
    pub data_start: u32,
    /// Contents of the data segment, empty if the stub has none.
    pub data: Vec<u8>,
    /// Start of the zero-initialized region. Not part of the generated table.
    pub bss_start: u32,
}

impl StubDescriptor {
    /// Decodes a descriptor from the raw JSON text.
    ///
    /// Only the structure is checked: required fields must be present, the segment contents
    /// must be valid base64 and `data`/`data_start` must either both be present or both be
    /// absent. Unknown fields are ignored.
    pub fn decode(json: &[u8]) -> Result<Self, DecodeError> {
        let raw: RawDescriptor = serde_json::from_slice(json)?;

        let (data_start, data) = match (raw.data_start, raw.data) {
            (Some(data_start), Some(data)) => (data_start, data),
            (None, None) => (0, Vec::new()),
            _ => return Err(DecodeError::InconsistentDataSegment),
        };

        Ok(Self {
            entry: raw.entry,
            text_start: raw.text_start,
            text: raw.text,
            data_start,
            data,
            bss_start: raw.bss_start,
        })
    }
}

/// The descriptor as it appears on the wire.
#[derive(Debug, Deserialize)]
struct RawDescriptor {
    entry: u32,
    #[serde(deserialize_with = "deserialize")]
    text: Vec<u8>,
    text_start: u32,
    bss_start: u32,
    #[serde(default, deserialize_with = "deserialize_optional")]
    data: Option<Vec<u8>>,
    #[serde(default)]
    data_start: Option<u32>,
}

fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Base64Visitor;

    impl serde::de::Visitor<'_> for Base64Visitor {
        type Value = Vec<u8>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(formatter, "base64 ASCII text")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            base64::engine::general_purpose::STANDARD
                .decode(v)
                .map_err(serde::de::Error::custom)
        }
    }

    deserializer.deserialize_str(Base64Visitor)
}

// Only called when the field is present, absence is handled by `#[serde(default)]`.
fn deserialize_optional<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_descriptor_with_data_segment() {
        let json = br#"{
            "entry": 1074521560,
            "text": "AQID",
            "text_start": 1074520064,
            "data": "/wA=",
            "data_start": 1073605544,
            "bss_start": 1073528832
        }"#;

        let stub = StubDescriptor::decode(json).unwrap();

        assert_eq!(stub.entry, 1074521560);
        assert_eq!(stub.text_start, 1074520064);
        assert_eq!(stub.text, vec![1, 2, 3]);
        assert_eq!(stub.data_start, 1073605544);
        assert_eq!(stub.data, vec![0xff, 0x00]);
        assert_eq!(stub.bss_start, 1073528832);
    }

    #[test]
    fn missing_data_segment_defaults_to_zero() {
        let json = br#"{"entry": 4, "text": "AQID", "text_start": 100, "bss_start": 200}"#;

        let stub = StubDescriptor::decode(json).unwrap();

        assert_eq!(stub.data_start, 0);
        assert!(stub.data.is_empty());
    }

    #[test]
    fn empty_text_is_preserved() {
        let json = br#"{"entry": 0, "text": "", "text_start": 0, "bss_start": 0}"#;

        let stub = StubDescriptor::decode(json).unwrap();

        assert!(stub.text.is_empty());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = br#"{
            "entry": 4,
            "text": "AQID",
            "text_start": 100,
            "bss_start": 200,
            "irom_start": 300,
            "num_sections": 2
        }"#;

        assert!(StubDescriptor::decode(json).is_ok());
    }

    #[test]
    fn data_without_data_start_is_inconsistent() {
        let json = br#"{"entry": 4, "text": "AQID", "text_start": 100, "bss_start": 200, "data": "AQ=="}"#;

        let error = StubDescriptor::decode(json).unwrap_err();

        assert!(matches!(error, DecodeError::InconsistentDataSegment));
        assert_eq!(error.to_string(), "inconsistent data segment");
    }

    #[test]
    fn data_start_without_data_is_inconsistent() {
        let json =
            br#"{"entry": 4, "text": "AQID", "text_start": 100, "bss_start": 200, "data_start": 8}"#;

        assert!(matches!(
            StubDescriptor::decode(json),
            Err(DecodeError::InconsistentDataSegment)
        ));
    }

    #[test]
    fn missing_entry_is_rejected() {
        let json = br#"{"text": "AQID", "text_start": 100, "bss_start": 200}"#;

        let error = StubDescriptor::decode(json).unwrap_err();

        assert!(matches!(error, DecodeError::Json(_)));
        assert!(format!("{:?}", error).contains("entry"));
    }

    #[test]
    fn missing_bss_start_is_rejected() {
        let json = br#"{"entry": 4, "text": "AQID", "text_start": 100}"#;

        assert!(matches!(
            StubDescriptor::decode(json),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn malformed_base64_is_rejected() {
        let json = br#"{"entry": 4, "text": "not base64!", "text_start": 100, "bss_start": 200}"#;

        assert!(matches!(
            StubDescriptor::decode(json),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(
            StubDescriptor::decode(b"{\"entry\": 4,"),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn entry_out_of_range_is_rejected() {
        let json = br#"{"entry": 4294967296, "text": "", "text_start": 0, "bss_start": 0}"#;

        assert!(matches!(
            StubDescriptor::decode(json),
            Err(DecodeError::Json(_))
        ));
    }
}
