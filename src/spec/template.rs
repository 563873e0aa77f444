//! Name templates for derived attributes.
//!
//! A template such as `TOT_PROGLACIAL_SED_{tform_type}` is rendered once per
//! function identifier. Brace handling follows the usual placeholder rules:
//! `{{` and `}}` are literal braces, `{tform_type}` is substituted, and any
//! other placeholder is rejected.

use crate::error::{Result, TformError};
use regex::Regex;
use std::sync::LazyLock;

pub const TFORM_PLACEHOLDER: &str = "tform_type";

// Capture:
// 1) escaped open `{{`
// 2) escaped close `}}`
// 3) placeholder name inside `{...}`
// 4) stray brace
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\{\{)|(\}\})|\{([^{}]*)\}|([{}])").expect("invalid template token regex")
});

/// Render `template` with `tform_type` substituted for `{tform_type}`.
pub fn render(template: &str, tform_type: &str) -> Result<String> {
    let mut out = String::with_capacity(template.len() + tform_type.len());
    let mut last = 0;

    for caps in TOKEN_RE.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        if caps.get(1).is_some() {
            out.push('{');
        } else if caps.get(2).is_some() {
            out.push('}');
        } else if let Some(name) = caps.get(3) {
            if name.as_str() != TFORM_PLACEHOLDER {
                return Err(TformError::malformed(
                    template,
                    format!("unknown placeholder '{{{}}}' in name template", name.as_str()),
                ));
            }
            out.push_str(tform_type);
        } else {
            return Err(TformError::malformed(
                template,
                format!("unbalanced brace at byte {}", whole.start()),
            ));
        }
    }
    out.push_str(&template[last..]);

    Ok(out)
}
