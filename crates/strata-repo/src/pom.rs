//! POM repository-reference cleanup.
//!
//! A POM served through a virtual repository can carry `<repositories>` and
//! `<pluginRepositories>` declarations that would make downstream builds
//! bypass this server. The cleanup policy decides whether those blocks are
//! commented out before the POM leaves the virtual repository.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What to do with repository references inside served POMs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PomCleanupPolicy {
    /// Serve POMs untouched.
    #[default]
    Nothing,
    /// Comment out references in the active build section, leaving profile
    /// blocks alone.
    DiscardActiveReference,
    /// Comment out every reference, profiles included.
    DiscardAnyReference,
}

impl fmt::Display for PomCleanupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Nothing => "nothing",
            Self::DiscardActiveReference => "discard_active_reference",
            Self::DiscardAnyReference => "discard_any_reference",
        };
        f.write_str(s)
    }
}

const BLOCKS: [(&str, &str); 2] = [
    ("<repositories>", "</repositories>"),
    ("<pluginRepositories>", "</pluginRepositories>"),
];

/// Apply the cleanup policy to POM content.
///
/// Returns the (possibly rewritten) document, or the failure reason when the
/// content is not a usable POM. Callers surface a failure as an unfound
/// resource; a broken POM must never be served half-cleaned.
pub fn cleanup(policy: PomCleanupPolicy, content: &[u8]) -> Result<String, String> {
    let text = std::str::from_utf8(content).map_err(|e| format!("POM is not UTF-8: {e}"))?;
    if policy == PomCleanupPolicy::Nothing {
        return Ok(text.to_string());
    }
    if !text.contains("<project") {
        return Err("no <project> element".to_string());
    }

    let mut out = text.to_string();
    for (open, close) in BLOCKS {
        out = comment_out_blocks(&out, open, close, policy)?;
    }
    Ok(out)
}

fn comment_out_blocks(
    text: &str,
    open: &str,
    close: &str,
    policy: PomCleanupPolicy,
) -> Result<String, String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(open) {
        let Some(end_rel) = rest[start..].find(close) else {
            return Err(format!("unterminated {open} block"));
        };
        let end = start + end_rel + close.len();

        let keep = policy == PomCleanupPolicy::DiscardActiveReference
            && inside_profile(text, offset_in(text, rest) + start);

        out.push_str(&rest[..start]);
        if keep {
            out.push_str(&rest[start..end]);
        } else {
            out.push_str("<!-- ");
            // Nested comments are illegal XML; strip any the block carries.
            out.push_str(&rest[start..end].replace("<!--", "").replace("-->", ""));
            out.push_str(" -->");
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    Ok(out)
}

fn offset_in(whole: &str, part: &str) -> usize {
    whole.len() - part.len()
}

/// Whether the byte offset falls inside a `<profile>` element.
fn inside_profile(text: &str, offset: usize) -> bool {
    let before = &text[..offset];
    let opened = before.matches("<profile>").count();
    let closed = before.matches("</profile>").count();
    opened > closed
}
