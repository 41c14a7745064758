//! Keyword relevance gate.
//!
//! A candidate text is relevant when it mentions at least one conflict term
//! and at least one region term. Matching is plain substring containment on
//! the lowercased text, so `"war"` also matches `"warfare"`. There is no
//! stemming and no scoring.

/// Boolean keyword filter applied to every candidate headline and body.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    conflict: Vec<String>,
    region: Vec<String>,
}

impl KeywordClassifier {
    /// Build a classifier from the two keyword sets. Keywords are lowercased
    /// and blank entries are dropped.
    pub fn new<I, J, S, T>(conflict: I, region: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            conflict: normalize(conflict),
            region: normalize(region),
        }
    }

    /// `true` when `title` + `body` contain a conflict term and a region term.
    pub fn is_relevant(&self, body: &str, title: &str) -> bool {
        let combined = format!("{title} {body}").to_lowercase();
        contains_any(&combined, &self.conflict) && contains_any(&combined, &self.region)
    }

    /// `true` when `text` contains any keyword from either set. The text is
    /// expected to be lowercased already.
    pub fn mentions_any(&self, lowered: &str) -> bool {
        contains_any(lowered, &self.conflict) || contains_any(lowered, &self.region)
    }

    /// Every keyword from both sets, conflict terms first.
    pub fn all_keywords(&self) -> impl Iterator<Item = &str> {
        self.conflict
            .iter()
            .chain(self.region.iter())
            .map(String::as_str)
    }
}

fn normalize<I, S>(keywords: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keywords
        .into_iter()
        .map(|k| k.as_ref().trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| haystack.contains(n.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> KeywordClassifier {
        KeywordClassifier::new(["strike", "missile", "war"], ["iran", "tehran"])
    }

    #[test]
    fn test_requires_both_sets() {
        let c = classifier();
        assert!(!c.is_relevant("A missile strike hit the port", ""));
        assert!(!c.is_relevant("Tehran hosts a trade fair", "Iran news"));
        assert!(c.is_relevant("A missile struck near the capital", "Iran says"));
    }

    #[test]
    fn test_case_insensitive_across_title_and_body() {
        let c = classifier();
        assert!(c.is_relevant("", "STRIKE ON TEHRAN"));
        assert!(c.is_relevant("reports from TeHrAn", "Missile Alert"));
    }

    #[test]
    fn test_substring_not_word_boundary() {
        let c = classifier();
        assert!(c.is_relevant("modern warfare in Iranian airspace", ""));
    }

    #[test]
    fn test_blank_keywords_are_ignored() {
        let c = KeywordClassifier::new(["", "  ", "Strike"], ["IRAN"]);
        assert!(!c.is_relevant("nothing to see", "headline"));
        assert!(c.is_relevant("strike in iran", ""));
        assert_eq!(c.all_keywords().collect::<Vec<_>>(), vec!["strike", "iran"]);
    }

    #[test]
    fn test_mentions_any() {
        let c = classifier();
        assert!(c.mentions_any("/world/tehran-update"));
        assert!(!c.mentions_any("/sports/football"));
    }
}
