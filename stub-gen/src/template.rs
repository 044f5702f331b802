use std::collections::HashMap;

use crate::error::TemplateError;

/// Substitutes `{name}` placeholders in `template` with the matching entry of `values`.
///
/// `{{` and `}}` produce literal braces, which lets templates contain C code. Every placeholder
/// must have a value.
pub fn substitute(template: &str, values: &HashMap<&str, String>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            '{' if chars.next_if(|&(_, next)| next == '{').is_some() => out.push('{'),
            '}' if chars.next_if(|&(_, next)| next == '}').is_some() => out.push('}'),
            '{' => {
                let start = offset + 1;
                let end = loop {
                    match chars.next() {
                        Some((end, '}')) => break end,
                        Some((_, '{')) | None => {
                            return Err(TemplateError::UnmatchedBrace { brace: '{', offset })
                        }
                        Some(_) => {}
                    }
                };

                let name = &template[start..end];
                let value = values
                    .get(name)
                    .ok_or_else(|| TemplateError::UnknownPlaceholder {
                        name: name.to_owned(),
                        offset,
                    })?;
                out.push_str(value);
            }
            '}' => return Err(TemplateError::UnmatchedBrace { brace: '}', offset }),
            c => out.push(c),
        }
    }

    Ok(out)
}
