/// Deepest numbering placeholder prefixed to a spacing variant (`\d+\.\d+\.\d+\.\d+`).
pub const MAX_PLACEHOLDER_DEPTH: usize = 4;
pub const DEFAULT_MAX_SPACING_GAPS: usize = 12;

const FLEX_SPACE: &str = r"\s*";

/// Lazy, regex-ready spelling variants of a title.
///
/// Spacing variants come first: every keep/drop choice for the gaps between
/// words, starting with the canonical fully spaced title. Each spacing variant
/// is then repeated behind the `\d+` .. `\d+\.\d+\.\d+\.\d+` placeholders. Cloning
/// the iterator restarts the sequence.
#[derive(Debug, Clone)]
pub struct TitleVariations {
    words: Vec<String>,
    spacing_count: u64,
    position: u64,
}

impl TitleVariations {
    pub fn new(title: &str) -> Self {
        Self::with_max_gaps(title, DEFAULT_MAX_SPACING_GAPS)
    }

    /// Titles with more than `max_gaps` gaps only get the fully spaced variant.
    pub fn with_max_gaps(title: &str, max_gaps: usize) -> Self {
        let words = title
            .split_whitespace()
            .map(regex::escape)
            .collect::<Vec<_>>();
        let gaps = words.len().saturating_sub(1);
        let spacing_count = if words.is_empty() {
            0
        } else if gaps > max_gaps || gaps >= 63 {
            1
        } else {
            1u64 << gaps
        };
        Self {
            words,
            spacing_count,
            position: 0,
        }
    }

    fn total(&self) -> u64 {
        self.spacing_count * (1 + MAX_PLACEHOLDER_DEPTH as u64)
    }

    fn spacing_variant(&self, index: u64) -> String {
        let gaps = self.words.len() - 1;
        let mut out = String::with_capacity(self.words.iter().map(|w| w.len() + 1).sum());
        out.push_str(&self.words[0]);
        for (gap, word) in self.words[1..].iter().enumerate() {
            // Bit set means the gap is dropped; index 0 keeps every space.
            let dropped = self.spacing_count > 1 && (index >> (gaps - 1 - gap)) & 1 == 1;
            if !dropped {
                out.push(' ');
            }
            out.push_str(word);
        }
        out
    }
}

/// `\d+`, `\d+\.\d+`, ... with `depth` components.
pub fn numbering_placeholder(depth: usize) -> String {
    vec![r"\d+"; depth.max(1)].join(r"\.")
}

impl Iterator for TitleVariations {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.position >= self.total() {
            return None;
        }
        let position = self.position;
        self.position += 1;
        if position < self.spacing_count {
            return Some(self.spacing_variant(position));
        }
        let offset = position - self.spacing_count;
        let depth = (offset % MAX_PLACEHOLDER_DEPTH as u64) as usize + 1;
        let spacing = self.spacing_variant(offset / MAX_PLACEHOLDER_DEPTH as u64);
        Some(format!("{}{FLEX_SPACE}{spacing}", numbering_placeholder(depth)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total().saturating_sub(self.position);
        let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spacing_variants_come_first() {
        let variants = TitleVariations::new("General Terms").collect::<Vec<_>>();
        assert_eq!(variants.len(), 2 * 5);
        assert_eq!(variants[0], "General Terms");
        assert_eq!(variants[1], "GeneralTerms");
        assert_eq!(variants[2], r"\d+\s*General Terms");
        assert_eq!(variants[5], r"\d+\.\d+\.\d+\.\d+\s*General Terms");
        assert_eq!(variants[6], r"\d+\s*GeneralTerms");
    }

    #[test]
    fn escapes_regex_metacharacters() {
        let first = TitleVariations::new("Costs (net) + fees").next().unwrap();
        assert_eq!(first, r"Costs \(net\) \+ fees");
        let re = regex::Regex::new(&first).unwrap();
        assert!(re.is_match("Costs (net) + fees"));
    }

    #[test]
    fn restarts_by_clone_and_handles_empty_titles() {
        let variations = TitleVariations::new("A B C");
        let first_pass = variations.clone().collect::<Vec<_>>();
        let second_pass = variations.collect::<Vec<_>>();
        assert_eq!(first_pass, second_pass);
        assert_eq!(first_pass.len(), 4 * 5);
        assert_eq!(TitleVariations::new("   ").count(), 0);
    }

    #[test]
    fn long_titles_keep_only_the_canonical_spacing() {
        let variants = TitleVariations::with_max_gaps("one two three four", 2).collect::<Vec<_>>();
        assert_eq!(variants.len(), 5);
        assert_eq!(variants[0], "one two three four");
    }
}
