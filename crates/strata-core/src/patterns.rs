/// Ant-style include/exclude path filter.
///
/// Pattern language: `**` matches any number of path segments (including
/// zero), `*` matches any run of characters within one segment, `?` matches a
/// single character. Matching rules:
///
/// - exclude wins over include;
/// - the empty path (repository root) is always accepted;
/// - a path that is a prefix of a possible include match is accepted too, so
///   directory traversal toward deeper includes is not cut off;
/// - an empty include list means "include everything".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathPatterns {
    includes: Vec<String>,
    excludes: Vec<String>,
}

impl PathPatterns {
    pub fn new(includes: Vec<String>, excludes: Vec<String>) -> Self {
        Self { includes, excludes }
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn excludes(&self) -> &[String] {
        &self.excludes
    }

    /// Whether `path` passes this filter.
    pub fn accepts(&self, path: &str) -> bool {
        if path.is_empty() {
            return true;
        }

        if self.excludes.iter().any(|p| matches(p, path)) {
            return false;
        }

        if self.includes.is_empty() {
            return true;
        }

        self.includes
            .iter()
            .any(|p| matches(p, path) || matches_start(p, path))
    }
}

/// Full ant-style match of `path` against `pattern`.
pub fn matches(pattern: &str, path: &str) -> bool {
    let pat: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match_segments(&pat, &segs)
}

/// Whether `path` could be a directory prefix of a full match of `pattern`.
pub fn matches_start(pattern: &str, path: &str) -> bool {
    let pat: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match_prefix(&pat, &segs)
}

fn match_segments(pat: &[&str], segs: &[&str]) -> bool {
    match pat.first() {
        None => segs.is_empty(),
        Some(&"**") => {
            // `**` may swallow zero or more leading segments.
            (0..=segs.len()).any(|skip| match_segments(&pat[1..], &segs[skip..]))
        }
        Some(first) => match segs.first() {
            Some(seg) if match_one(first, seg) => match_segments(&pat[1..], &segs[1..]),
            _ => false,
        },
    }
}

fn match_prefix(pat: &[&str], segs: &[&str]) -> bool {
    if segs.is_empty() {
        // Every pattern can still be reached from here, unless it is already
        // exhausted (which match_segments would have caught as a full match).
        return !pat.is_empty();
    }
    match pat.first() {
        None => false,
        Some(&"**") => true,
        Some(first) => match_one(first, segs[0]) && match_prefix(&pat[1..], &segs[1..]),
    }
}

fn match_one(pattern: &str, segment: &str) -> bool {
    glob_match(pattern.as_bytes(), segment.as_bytes())
}

fn glob_match(pat: &[u8], text: &[u8]) -> bool {
    match pat.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => (0..=text.len()).any(|skip| glob_match(rest, &text[skip..])),
        Some((b'?', rest)) => match text.split_first() {
            Some((_, t)) => glob_match(rest, t),
            None => false,
        },
        Some((c, rest)) => match text.split_first() {
            Some((t, ts)) if t == c => glob_match(rest, ts),
            _ => false,
        },
    }
}
