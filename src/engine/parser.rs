//! Block-list line syntax to URL globs.
//!
//! Only network rules that reduce to `scheme://host-glob/path-glob` are
//! kept: `||host^` anchors, explicit `*://` globs and `http(s)://` prefixes.
//! Everything else (comments, headers, cosmetic rules, exceptions, bare
//! substrings) is skipped.

use super::pattern::BlockPattern;
use rustc_hash::FxHashSet;

const COSMETIC_SEPARATORS: &[&str] = &["##", "#@#", "#?#", "#$#", "#%#"];

/// Converts one list line into the globs it stands for. Most rules give
/// one glob; a `||host/path^` rule gives three, since `^` after a path
/// matches `/`, `?` or the end of the URL. Empty if the line is not a
/// usable network rule.
pub fn parse_line(line: &str) -> Vec<BlockPattern> {
    let line = line.trim();

    // Skip comments, headers and empty lines
    if line.is_empty() || line.starts_with('!') || line.starts_with('[') || line.starts_with('#')
    {
        return vec![];
    }
    // Cosmetic / element hiding
    if COSMETIC_SEPARATORS.iter().any(|sep| line.contains(sep)) {
        return vec![];
    }
    // Exception rules never produce blocks
    if line.starts_with("@@") {
        return vec![];
    }
    // Regex rules
    if line.starts_with('/') && line.ends_with('/') {
        return vec![];
    }

    // Drop `$options`
    let rule = match line.find('$') {
        Some(idx) => &line[..idx],
        None => line,
    };
    let rule = rule.to_ascii_lowercase();

    let globs = if let Some(rest) = rule.strip_prefix("||") {
        normalize_domain_anchor(rest)
    } else if rule.starts_with("*://") {
        vec![ensure_path(&rule)]
    } else {
        let rule = rule.trim_start_matches('|');
        if rule.starts_with("http://") || rule.starts_with("https://") {
            vec![ensure_path(rule)]
        } else {
            return vec![];
        }
    };

    globs
        .iter()
        .filter_map(|g| BlockPattern::parse(&g.replace('^', "/").replace('|', "")))
        .collect()
}

/// Parses every line of a list, de-duplicating within the list. Lines that
/// do not normalise are skipped.
pub fn parse_list(text: &str) -> Vec<BlockPattern> {
    let mut seen = FxHashSet::default();
    text.lines()
        .flat_map(parse_line)
        .filter(|p| seen.insert(p.as_str().to_string()))
        .collect()
}

/// `example.com^` -> `*://*.example.com/*`; `example.com/ads^` -> the
/// exact path, the path as a directory and the path with a query;
/// `example.com/ads` -> `*://*.example.com/ads*`.
fn normalize_domain_anchor(rest: &str) -> Vec<String> {
    if rest.is_empty() || rest.starts_with('^') || rest.starts_with('/') {
        return vec![];
    }

    let glob = format!("*://*.{}", rest);
    let Some(slash) = rest.find('/') else {
        // Host only: the separator is the start of the path
        let host = rest.split('^').next().unwrap_or(rest);
        return vec![format!("*://*.{}/*", host)];
    };
    if let Some(path) = glob.strip_suffix('^') {
        if !rest[slash..].trim_end_matches('^').contains('^') {
            return vec![
                path.to_string(),
                format!("{}/*", path),
                format!("{}?*", path),
            ];
        }
    }
    match glob.find('^') {
        Some(idx) => {
            let mut glob = glob;
            glob.replace_range(idx..idx + 1, "/*");
            vec![glob]
        }
        None if glob.ends_with('*') => vec![glob],
        None => vec![format!("{}*", glob)],
    }
}

fn ensure_path(rule: &str) -> String {
    let after_scheme = rule.split_once("://").map(|(_, r)| r).unwrap_or(rule);
    if after_scheme.contains('/') || after_scheme.contains('^') {
        rule.to_string()
    } else {
        format!("{}/*", rule)
    }
}
