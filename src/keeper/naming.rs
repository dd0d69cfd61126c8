//! Unique on-disk filename allocation.
//!
//! Given a proposed filename and the set of names already in use, produces
//! a name guaranteed (case-insensitively) not to collide. Colliding names
//! get a zero-padded numeric suffix whose padding width is inherited from
//! the widest matching suffix already present, so a package full of
//! `Section0001.xhtml`..`Section0099.xhtml` keeps producing four-digit
//! names rather than resetting to `Section100.xhtml`.

use regex::RegexBuilder;

/// Returns a filename that does not collide (case-insensitively) with any
/// name in `existing`.
///
/// If `proposed` is free it is returned unchanged. Otherwise the name is
/// split into a digit-stripped prefix and an extension, all existing names
/// of the form `prefix<digits>.<extension>` are scanned for the highest
/// numeric suffix, and `highest + 1` is emitted with the padding width of
/// that highest match. With no numeric matches the counter seeds at zero
/// with a width of four.
pub fn unique_filename(proposed: &str, existing: &[String]) -> String {
    if !existing.iter().any(|name| name.eq_ignore_ascii_case(proposed)) {
        return proposed.to_string();
    }

    // The base name is everything before the first '.', mirroring how the
    // extension of "a.tar.gz" is "tar.gz".
    let (base, extension) = match proposed.split_once('.') {
        Some((base, ext)) => (base, Some(ext)),
        None => (proposed, None),
    };
    let prefix = base.trim_end_matches(|c: char| c.is_ascii_digit());

    let ext_pattern = match extension {
        Some(ext) => format!("\\.{}", regex::escape(ext)),
        None => String::new(),
    };
    // The prefix may contain regex metacharacters ("figure (2).png").
    let pattern = format!("^{}(\\d*){}$", regex::escape(prefix), ext_pattern);

    let mut max_num: Option<u64> = None;
    let mut max_width = 0usize;

    if let Ok(search) = RegexBuilder::new(&pattern).case_insensitive(true).build() {
        for name in existing {
            let Some(captures) = search.captures(name) else {
                continue;
            };
            let digits = &captures[1];
            // An empty capture means no numeric suffix; skip it.
            if let Ok(number) = digits.parse::<u64>() {
                if max_num.is_none() || number > max_num.unwrap_or(0) {
                    max_num = Some(number);
                    max_width = digits.len();
                }
            }
        }
    }

    let (max_num, width) = match max_num {
        Some(n) => (n, max_width),
        None => (0, 4),
    };

    let numbered = format!("{}{:0width$}", prefix, max_num + 1, width = width);
    match extension {
        Some(ext) => format!("{}.{}", numbered, ext),
        None => numbered,
    }
}
