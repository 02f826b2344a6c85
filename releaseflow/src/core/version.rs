//! Ordering of artifact version strings.

use std::cmp::Ordering;

#[derive(Debug, PartialEq, Eq)]
enum Token<'a> {
    Number(u64),
    Text(&'a str),
}

fn tokens(version: &str) -> Vec<Token<'_>> {
    version
        .split(['.', '-', '_'])
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<u64>().map_or(Token::Text(t), Token::Number))
        .collect()
}

/// Compares two version strings.
///
/// Versions are split on `.`, `-` and `_`. Numeric tokens compare numerically,
/// text tokens case-insensitively, and a numeric token ranks above a text one.
/// When one version is a prefix of the other the shorter one is lower, so
/// `1.0 < 1.0.1` and `1.0.0 < 1.0.0.redhat-00001`.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = tokens(a);
    let right = tokens(b);

    for (l, r) in left.iter().zip(right.iter()) {
        let ordering = match (l, r) {
            (Token::Number(x), Token::Number(y)) => x.cmp(y),
            (Token::Text(x), Token::Text(y)) => x.to_ascii_lowercase().cmp(&y.to_ascii_lowercase()),
            (Token::Number(_), Token::Text(_)) => Ordering::Greater,
            (Token::Text(_), Token::Number(_)) => Ordering::Less,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    left.len().cmp(&right.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_tokens_compare_numerically() {
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.1", "1.0"), Ordering::Greater);
        assert_eq!(compare_versions("2.0", "2.0"), Ordering::Equal);
    }

    #[test]
    fn test_longer_version_ranks_higher() {
        assert_eq!(compare_versions("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(compare_versions("1.0.0", "1.0.0.redhat-00001"), Ordering::Less);
    }

    #[test]
    fn test_build_suffixes() {
        assert_eq!(
            compare_versions("1.0.0.redhat-00002", "1.0.0.redhat-00001"),
            Ordering::Greater
        );
        assert_eq!(
            compare_versions("1.0.0.temporary-redhat-00001", "1.0.0.redhat-00001"),
            Ordering::Greater
        );
    }

    #[test]
    fn test_number_beats_text() {
        assert_eq!(compare_versions("1.1", "1.beta"), Ordering::Greater);
        assert_eq!(compare_versions("1.Final", "1.final"), Ordering::Less);
    }
}
