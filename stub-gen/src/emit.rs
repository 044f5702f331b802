//! Rendering of `esp_stub_t` initializers.
//!
//! Every record has the shape
//! `{ .header = { .entrypoint }, .segments = { text, data } }`. The flashing runtime uploads
//! `segments[0]` and `segments[1]` in that order, so the text segment must always come first.

use std::fmt::Write;

use crate::descriptor::StubDescriptor;

/// The initializer emitted for chips without a stub.
pub const PLACEHOLDER: &str = "    // placeholder\n    {},\n\n";

/// One loadable segment of a stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub addr: u32,
    pub data: &'a [u8],
}

impl StubDescriptor {
    /// The segments in upload order: text first, then data.
    pub fn segments(&self) -> [Segment<'_>; 2] {
        [
            Segment {
                addr: self.text_start,
                data: &self.text,
            },
            Segment {
                addr: self.data_start,
                data: &self.data,
            },
        ]
    }
}

/// Renders the table record for `stub`, labeled with `label` (usually the descriptor name).
pub fn render_stub(label: &str, stub: &StubDescriptor) -> String {
    let mut out = String::new();

    // Writing into a `String` cannot fail.
    let _ = writeln!(out, "    // {label}");
    out.push_str("    {\n");
    out.push_str("        .header = {\n");
    let _ = writeln!(out, "            .entrypoint = {},", stub.entry);
    out.push_str("        },\n");
    out.push_str("        .segments = {\n");
    for segment in stub.segments() {
        write_segment(&mut out, segment);
    }
    out.push_str("        },\n");
    out.push_str("    },\n");
    out.push('\n');

    out
}

/// Renders the table record for a slot without a stub.
pub fn render_placeholder() -> &'static str {
    PLACEHOLDER
}

fn write_segment(out: &mut String, segment: Segment<'_>) {
    out.push_str("            {\n");
    let _ = writeln!(out, "                .addr = {},", segment.addr);
    let _ = writeln!(out, "                .size = {},", segment.data.len());
    let _ = writeln!(
        out,
        "                .data = (const uint8_t[]){{{}}},",
        byte_list(segment.data)
    );
    out.push_str("            },\n");
}

/// Formats `bytes` as a comma separated list of hex literals, e.g. `0x1, 0xab`.
pub fn byte_list(bytes: &[u8]) -> String {
    let mut list = String::with_capacity(bytes.len() * 6);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            list.push_str(", ");
        }
        let _ = write!(list, "{byte:#x}");
    }
    list
}
