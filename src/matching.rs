//! Name and time matching for the bulk-import flows.
//!
//! Spreadsheets arrive with hand-typed section, subject, teacher and time
//! cells. Matching is deliberately heuristic: an exact normalized hit wins,
//! otherwise the first candidate containing a token of the input is taken.
//! Every import previews before applying, so a human sees the resolution.

/// Uppercase, fold diacritics, drop anything that is not alphanumeric or a
/// space, collapse runs of whitespace.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for ch in raw.chars().flat_map(|c| c.to_uppercase()) {
        let folded = fold_diacritic(ch);
        if folded.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(folded);
        } else if folded.is_whitespace() {
            pending_space = true;
        }
        // Other punctuation is dropped without acting as a separator.
    }
    out
}

fn fold_diacritic(ch: char) -> char {
    match ch {
        'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => 'A',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => 'O',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'Ñ' => 'N',
        'Ç' => 'C',
        _ => ch,
    }
}

/// Minimum token length considered for substring matching. Shorter fragments
/// ("DE", "LA") hit far too many candidates.
pub const MIN_MATCH_TOKEN: usize = 3;

/// Resolve free text against known records. Exact normalized equality first;
/// failing that, the first candidate whose normalized name contains any token
/// of the input. First match wins; order-dependent by design.
pub fn match_name<'a, T>(
    raw: &str,
    candidates: &'a [T],
    name_of: impl Fn(&T) -> &str,
) -> Option<&'a T> {
    let needle = normalize(raw);
    if needle.is_empty() {
        return None;
    }
    for candidate in candidates {
        if normalize(name_of(candidate)) == needle {
            return Some(candidate);
        }
    }
    let tokens: Vec<&str> = needle
        .split(' ')
        .filter(|t| t.chars().count() >= MIN_MATCH_TOKEN)
        .collect();
    if tokens.is_empty() {
        return None;
    }
    for candidate in candidates {
        let name = normalize(name_of(candidate));
        if tokens.iter().any(|t| name.contains(t)) {
            return Some(candidate);
        }
    }
    None
}

/// Normalize free-text times like "7:00 a.m." or "2:30 p.m." to 24-hour
/// "HH:MM". Unparseable input becomes the empty string; callers treat empty
/// as unmatched.
pub fn extract_time(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0usize;
    while i < chars.len() && !chars[i].is_ascii_digit() {
        i += 1;
    }
    if i == chars.len() {
        return String::new();
    }

    let mut hour = 0u32;
    let mut hour_digits = 0usize;
    while i < chars.len() && chars[i].is_ascii_digit() && hour_digits < 2 {
        hour = hour * 10 + chars[i].to_digit(10).unwrap_or(0);
        hour_digits += 1;
        i += 1;
    }

    let mut minute = 0u32;
    if i < chars.len() && chars[i] == ':' {
        i += 1;
        let mut minute_digits = 0usize;
        while i < chars.len() && chars[i].is_ascii_digit() && minute_digits < 2 {
            minute = minute * 10 + chars[i].to_digit(10).unwrap_or(0);
            minute_digits += 1;
            i += 1;
        }
        if minute_digits == 0 {
            return String::new();
        }
    }

    let marker: String = chars[i..]
        .iter()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if marker.starts_with("pm") {
        if hour == 0 || hour > 12 {
            return String::new();
        }
        if hour != 12 {
            hour += 12;
        }
    } else if marker.starts_with("am") {
        if hour == 0 || hour > 12 {
            return String::new();
        }
        if hour == 12 {
            hour = 0;
        }
    }

    if hour > 23 || minute > 59 {
        return String::new();
    }
    format!("{:02}:{:02}", hour, minute)
}
