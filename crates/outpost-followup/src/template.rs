// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Follow-up message templates.
//!
//! Recognised placeholders, each accepted as `{key}` or `{{key}}`:
//!
//! | Key                        | Value                                   |
//! |----------------------------|-----------------------------------------|
//! | `nome`, `name`             | First name from the conversation        |
//! | `responsavel`, `assignee`  | Name of the assigned team member        |
//!
//! Anything else between braces is left untouched. A known placeholder with
//! no value renders as an empty string.

use outpost_core::OutpostError;

/// Values substituted into a template.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateVars<'a> {
    pub recipient_name: Option<&'a str>,
    pub assignee_name: Option<&'a str>,
}

impl<'a> TemplateVars<'a> {
    fn lookup(&self, key: &str) -> Option<&'a str> {
        let key = key.trim();
        if key.eq_ignore_ascii_case("nome") || key.eq_ignore_ascii_case("name") {
            Some(self.recipient_name.unwrap_or(""))
        } else if key.eq_ignore_ascii_case("responsavel") || key.eq_ignore_ascii_case("assignee") {
            Some(self.assignee_name.unwrap_or(""))
        } else {
            None
        }
    }
}

/// First word of a display name, if any.
pub fn first_name(display_name: Option<&str>) -> Option<&str> {
    display_name.and_then(|n| n.split_whitespace().next())
}

/// Substitute placeholders in `template`.
///
/// The result is trimmed; a template that renders to nothing but whitespace
/// is a validation error so an empty message is never queued.
pub fn render(template: &str, vars: &TemplateVars<'_>) -> Result<String, OutpostError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match placeholder(tail).and_then(|(key, len)| vars.lookup(key).map(|v| (v, len))) {
            Some((value, len)) => {
                out.push_str(value);
                rest = &tail[len..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);

    let rendered = out.trim();
    if rendered.is_empty() {
        return Err(OutpostError::Validation(
            "follow-up template rendered to an empty message".into(),
        ));
    }
    Ok(rendered.to_string())
}

/// Parse a placeholder at the start of `s`, returning the key and the
/// number of bytes it spans.
fn placeholder(s: &str) -> Option<(&str, usize)> {
    let (open, close) = if s.starts_with("{{") { ("{{", "}}") } else { ("{", "}") };
    let inner = &s[open.len()..];
    let end = inner.find(close)?;
    let key = &inner[..end];
    let valid = !key.trim().is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ');
    valid.then_some((key, open.len() + end + close.len()))
}
