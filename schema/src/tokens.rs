//! Token similarity: split camelCase/PascalCase/snake_case/kebab-case
//! identifiers into lowercase tokens and score two identifiers by Jaccard
//! overlap (spec §4.6).

use std::collections::HashSet;

pub fn tokenize(s: &str) -> HashSet<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c == ' ' {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_numeric() || (prev.is_uppercase() && next_is_lower) {
                tokens.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens.into_iter().map(|t| t.to_lowercase()).filter(|t| !t.is_empty()).collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

pub fn token_similarity(a: &str, b: &str) -> f64 {
    jaccard(&tokenize(a), &tokenize(b))
}

pub fn best_token_similarity(t: &str, candidates: &[String]) -> f64 {
    candidates.iter().map(|c| token_similarity(t, c)).fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_pascal_case() {
        let tokens = tokenize("DataStoreInstance");
        assert_eq!(tokens, ["data", "store", "instance"].into_iter().map(String::from).collect());
    }

    #[test]
    fn splits_acronym_boundary() {
        let tokens = tokenize("HTTPEndpoint");
        assert_eq!(tokens, ["http", "endpoint"].into_iter().map(String::from).collect());
    }

    #[test]
    fn splits_snake_and_kebab_case() {
        assert_eq!(tokenize("service_name"), ["service", "name"].into_iter().map(String::from).collect());
        assert_eq!(tokenize("service-name"), ["service", "name"].into_iter().map(String::from).collect());
    }

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(token_similarity("ServiceName", "service_name"), 1.0);
    }

    #[test]
    fn disjoint_strings_score_zero() {
        assert_eq!(token_similarity("Pod", "KafkaTopic"), 0.0);
    }
}
