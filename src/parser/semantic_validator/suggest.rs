//! "Did you mean" lookups by edit distance

/// Levenshtein distance: the fewest single-character insertions, deletions
/// and substitutions that turn `a` into `b`.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, a_char) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let substitution = prev[j] + usize::from(a_char != *b_char);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// The candidate closest to `name`, compared case-insensitively, when its
/// distance is at most `max(1, longer_len / 3)`. Ties keep the first
/// candidate seen.
pub fn closest_match<'a>(
    name: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<&'a str> {
    let wanted = name.to_lowercase();
    let mut best: Option<(usize, &'a str)> = None;

    for candidate in candidates {
        if candidate == name {
            continue;
        }
        let distance = edit_distance(&wanted, &candidate.to_lowercase());
        let longer = wanted.chars().count().max(candidate.chars().count());
        let threshold = (longer / 3).max(1);
        if distance > threshold {
            continue;
        }
        if best.map_or(true, |(d, _)| distance < d) {
            best = Some((distance, candidate));
        }
    }

    best.map(|(_, candidate)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("abc", ""), 3);
        assert_eq!(edit_distance("same", "same"), 0);
        assert_eq!(edit_distance("shop", "shpo"), 2);
    }

    #[test]
    fn test_closest_within_threshold() {
        let names = ["Shop", "Mailer", "Writer"];
        assert_eq!(closest_match("Shopp", names), Some("Shop"));
        assert_eq!(closest_match("mailr", names), Some("Mailer"));
    }

    #[test]
    fn test_closest_is_case_insensitive() {
        assert_eq!(closest_match("SHOP", ["Shop"]), Some("Shop"));
    }

    #[test]
    fn test_no_match_outside_threshold() {
        // distance 2, threshold max(1, 4 / 3) = 1
        assert_eq!(closest_match("Shpo", ["Shop"]), None);
        assert_eq!(closest_match("Billing", ["Shop", "Writer"]), None);
    }

    #[test]
    fn test_prefers_smallest_distance() {
        assert_eq!(closest_match("totl", ["total", "tot"]), Some("total"));
        assert_eq!(closest_match("custmer", ["customers", "customer"]), Some("customer"));
    }
}
