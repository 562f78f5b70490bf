//! Free-text product hints to catalog names.
//!
//! The allocator only depends on [`NameResolver`]; [`SimilarityResolver`] is
//! the default approximate matcher and tests swap in closures.

/// Maps a hint onto the best candidate name. Returns `None` only when there
/// are no candidates.
pub trait NameResolver: Send + Sync {
    fn resolve(&self, hint: &str, candidates: &[&str]) -> Option<String>;
}

impl<F> NameResolver for F
where
    F: Fn(&str, &[&str]) -> Option<String> + Send + Sync,
{
    fn resolve(&self, hint: &str, candidates: &[&str]) -> Option<String> {
        self(hint, candidates)
    }
}

/// Case-insensitive similarity ranking: exact, then prefix, then substring,
/// then an ordered-subsequence score. Ties keep the earlier candidate.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimilarityResolver;

impl SimilarityResolver {
    pub fn score(hint: &str, candidate: &str) -> f64 {
        let hint = normalize(hint);
        let candidate = normalize(candidate);

        if hint.is_empty() || candidate.is_empty() {
            return 0.0;
        }
        if hint == candidate {
            return 1.0;
        }
        if candidate.starts_with(&hint) || hint.starts_with(&candidate) {
            return 0.8 + 0.1 * length_ratio(&hint, &candidate);
        }
        if candidate.contains(&hint) || hint.contains(&candidate) {
            return 0.6 + 0.1 * length_ratio(&hint, &candidate);
        }

        let forward = subsequence_score(&hint, &candidate);
        let backward = subsequence_score(&candidate, &hint);
        0.5 * forward.max(backward) + 0.05 * length_ratio(&hint, &candidate)
    }
}

impl NameResolver for SimilarityResolver {
    fn resolve(&self, hint: &str, candidates: &[&str]) -> Option<String> {
        let mut best: Option<(&str, f64)> = None;
        for &candidate in candidates {
            let score = Self::score(hint, candidate);
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((candidate, score));
            }
        }
        best.map(|(name, _)| name.to_string())
    }
}

/// Splits a comma-separated list of product hints. A bare `.` means "any
/// product", same as an empty answer.
pub fn parse_product_hints(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "." {
        return Vec::new();
    }

    trimmed
        .split(',')
        .map(str::trim)
        .filter(|hint| !hint.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn length_ratio(left: &str, right: &str) -> f64 {
    let left = left.chars().count();
    let right = right.chars().count();
    let longest = left.max(right);
    if longest == 0 {
        return 0.0;
    }
    left.min(right) as f64 / longest as f64
}

// Greedy in-order match of `pattern` inside `text` with a bonus for the
// longest consecutive run.
fn subsequence_score(pattern: &str, text: &str) -> f64 {
    let pattern_len = pattern.chars().count();
    if pattern_len == 0 || text.is_empty() {
        return 0.0;
    }

    let mut pattern_chars = pattern.chars().peekable();
    let mut text_chars = text.chars();
    let mut matches = 0usize;
    let mut consecutive = 0usize;
    let mut longest_run = 0usize;

    while let Some(expected) = pattern_chars.peek() {
        let Some(actual) = text_chars.next() else {
            break;
        };
        if *expected == actual {
            pattern_chars.next();
            matches += 1;
            consecutive += 1;
            longest_run = longest_run.max(consecutive);
        } else {
            consecutive = 0;
        }
    }

    if matches == 0 {
        return 0.0;
    }

    let match_ratio = matches as f64 / pattern_len as f64;
    let run_bonus = (longest_run as f64 / pattern_len as f64) * 0.3;
    (match_ratio + run_bonus).min(1.0)
}
