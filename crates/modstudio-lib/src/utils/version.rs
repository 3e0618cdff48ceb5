use std::cmp::Ordering;

/// Free-form version string with a total order.
///
/// Any string is accepted, including malformed ones. Strings are split into
/// `(value, separator)` tokens where `value` is a run of alphanumeric characters
/// and `separator` is the single character that ends the run. Tokens are compared
/// pairwise: numeric values numerically, everything else case-insensitively.
/// A `-` separator sorts before every other separator, which puts `1.0-pre`
/// below `1.0`.
#[derive(Debug, Clone)]
pub struct Version(String);

impl Version {
    pub fn new(v: &str) -> Self {
        Version(v.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split_parts(s: &str) -> Vec<Part<'_>> {
        let mut parts = Vec::new();
        let mut rest = s;

        while !rest.is_empty() {
            let run_end = rest
                .char_indices()
                .find(|(_, c)| !c.is_alphanumeric())
                .map(|(i, _)| i)
                .unwrap_or(rest.len());

            let value = &rest[..run_end];
            let tail = &rest[run_end..];
            let separator_len = tail.chars().next().map(char::len_utf8).unwrap_or(0);

            parts.push(Part {
                value,
                separator: &tail[..separator_len],
            });
            rest = &tail[separator_len..];
        }

        parts
    }
}

#[derive(Debug, Clone, Copy)]
struct Part<'a> {
    value: &'a str,
    separator: &'a str,
}

impl Part<'_> {
    fn cmp_value(&self, other: &Self) -> Ordering {
        value_key(self.value).cmp(&value_key(other.value))
    }

    fn cmp_separator(&self, other: &Self) -> Ordering {
        separator_key(self.separator).cmp(&separator_key(other.separator))
    }
}

/// Ordering class of a token value. Empty values sort first, then numbers, then text.
/// Within a class: numbers by magnitude, text case-insensitively.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum ValueKey {
    Empty,
    // (digit count without leading zeros, trimmed digits)
    Numeric(usize, String),
    Text(String),
}

fn value_key(value: &str) -> ValueKey {
    if value.is_empty() {
        return ValueKey::Empty;
    }

    if value.bytes().all(|b| b.is_ascii_digit()) {
        let trimmed = value.trim_start_matches('0');
        return ValueKey::Numeric(trimmed.len(), trimmed.to_string());
    }

    ValueKey::Text(value.to_lowercase())
}

fn separator_key(separator: &str) -> (u8, String) {
    if separator == "-" {
        (0, String::new())
    } else {
        (1, separator.to_lowercase())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let a_parts = Self::split_parts(&self.0);
        let b_parts = Self::split_parts(&other.0);

        for i in 0..a_parts.len().max(b_parts.len()) {
            let (ap, bp) = match (a_parts.get(i), b_parts.get(i)) {
                (Some(ap), Some(bp)) => (ap, bp),
                // Exhausted sequence sorts first
                (None, _) => return Ordering::Less,
                (_, None) => return Ordering::Greater,
            };

            match ap.cmp_value(bp).then_with(|| ap.cmp_separator(bp)) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }

        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

/// Compare two optional version strings. `None` sorts before any string.
pub fn compare_versions(a: Option<&str>, b: Option<&str>) -> Ordering {
    a.map(Version::new).cmp(&b.map(Version::new))
}
