//! Extraction of enumerator values from the consumer's C header.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static COMMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").expect("valid regex"));

static ENUMERATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_]\w*)\s*(?:=\s*(\S+))?$").expect("valid regex")
});

/// Returns the enumerators of `typedef enum { ... } <name>;` in `header` with their values,
/// or `None` if the header does not declare that enumeration.
///
/// Handles implicit values, decimal and hex literals and references to earlier enumerators.
/// Enumerators with any other initializer are skipped, as are all that follow them implicitly.
pub fn parse_enumerators(header: &str, name: &str) -> Option<HashMap<String, usize>> {
    let header = COMMENTS.replace_all(header, "");
    let declaration = Regex::new(&format!(
        r"typedef\s+enum\s*(?:\w+\s*)?\{{([^{{}}]*)\}}\s*{}\s*;",
        regex::escape(name)
    ))
    .expect("valid regex");
    let body = declaration.captures(&header)?.get(1)?.as_str();

    let mut values = HashMap::new();
    let mut next = Some(0usize);
    for item in body.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let Some(captures) = ENUMERATOR.captures(item) else {
            tracing::debug!("Skipping unrecognized enumerator '{item}'");
            next = None;
            continue;
        };
        let enumerator = &captures[1];

        let value = match captures.get(2) {
            Some(initializer) => parse_initializer(initializer.as_str(), &values),
            None => next,
        };

        match value {
            Some(value) => {
                values.insert(enumerator.to_owned(), value);
                next = value.checked_add(1);
            }
            None => {
                tracing::debug!("Skipping enumerator {enumerator} with unknown value");
                next = None;
            }
        }
    }

    Some(values)
}

fn parse_initializer(initializer: &str, known: &HashMap<String, usize>) -> Option<usize> {
    if let Some(hex) = initializer
        .strip_prefix("0x")
        .or_else(|| initializer.strip_prefix("0X"))
    {
        usize::from_str_radix(hex, 16).ok()
    } else if let Ok(value) = initializer.parse() {
        Some(value)
    } else {
        known.get(initializer).copied()
    }
}
