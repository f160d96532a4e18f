use std::collections::{BTreeSet, HashSet};

use tracing::info;

use crate::numbering::Numbering;
use crate::segment::SectionMap;

/// Deepest numbering the candidate set opens new levels for.
pub const MAX_DEPTH: usize = 4;
/// How far ahead siblings and new children may jump.
pub const BRANCH_WIDTH: u32 = 9;

/// Every numbering accepted as a direct successor of `current`.
pub fn candidate_successors(current: &Numbering) -> BTreeSet<Numbering> {
    let mut candidates = BTreeSet::new();
    candidates.insert(current.next_sibling());

    if current.depth() < MAX_DEPTH {
        for x in 1..=BRANCH_WIDTH {
            insert_with_children(&mut candidates, current.child(x));
        }
    }
    for x in 1..=BRANCH_WIDTH {
        let sibling = current.with_last(current.last().saturating_add(x));
        insert_with_children(&mut candidates, sibling);
    }

    let parts = current.components();
    for i in 0..parts.len().saturating_sub(1) {
        for x in 1..=BRANCH_WIDTH {
            let mut higher = parts[..=i].to_vec();
            higher.push(parts[i + 1].saturating_add(x));
            candidates.extend(Numbering::new(higher));
        }
    }
    candidates.extend(Numbering::new(vec![parts[0].saturating_add(1)]));
    candidates
}

fn insert_with_children(candidates: &mut BTreeSet<Numbering>, numbering: Numbering) {
    if numbering.depth() < MAX_DEPTH {
        candidates.extend((1..=BRANCH_WIDTH).map(|y| numbering.child(y)));
    }
    candidates.insert(numbering);
}

/// Numbering of a section key: its first word, when the whole word is one.
pub fn key_numbering(key: &str) -> Option<Numbering> {
    let token = key.split(' ').next()?;
    Numbering::parse_exact(token)
}

/// Positions whose numbering is not a legal successor of the last accepted
/// numbering before them. Unnumbered positions are never flagged.
pub fn find_illogical(numberings: &[Option<Numbering>]) -> Vec<usize> {
    let mut flagged = Vec::new();
    let mut last_valid: Option<&Numbering> = None;
    for (index, numbering) in numberings.iter().enumerate() {
        let Some(numbering) = numbering else {
            continue;
        };
        match last_valid {
            Some(previous) if !candidate_successors(previous).contains(numbering) => {
                flagged.push(index);
            }
            _ => last_valid = Some(numbering),
        }
    }
    flagged
}

/// A numbering consistent with the nearest valid neighbours of a flagged entry.
pub fn reconstruct(previous: &Numbering, next: Option<&Numbering>) -> Numbering {
    match next {
        Some(next) if next.depth() > previous.depth() && next.starts_with(previous) => {
            if previous.depth() < MAX_DEPTH {
                previous.child(1)
            } else {
                previous.next_sibling()
            }
        }
        _ => previous.next_sibling(),
    }
}

/// Rewrites the numbering of every section key that breaks the sequence.
pub fn repair(sections: &SectionMap) -> SectionMap {
    let mut numberings = sections
        .keys()
        .map(|key| key_numbering(key))
        .collect::<Vec<_>>();
    let flagged = find_illogical(&numberings);
    if flagged.is_empty() {
        return sections.clone();
    }

    let flagged_set = flagged.iter().copied().collect::<HashSet<_>>();
    for &index in &flagged {
        let previous = numberings[..index].iter().rev().flatten().next().cloned();
        let next = numberings[index + 1..]
            .iter()
            .enumerate()
            .filter(|(offset, _)| !flagged_set.contains(&(index + 1 + offset)))
            .find_map(|(_, numbering)| numbering.as_ref());
        if let Some(previous) = previous {
            let rebuilt = reconstruct(&previous, next);
            numberings[index] = Some(rebuilt);
        }
    }

    let mut repaired = SectionMap::with_capacity(sections.len());
    for (index, (key, text)) in sections.iter().enumerate() {
        let key = match (&numberings[index], flagged_set.contains(&index)) {
            (Some(numbering), true) => {
                let new_key = match key.split_once(' ') {
                    Some((_, rest)) => format!("{} {}", numbering.render(), rest),
                    None => numbering.render(),
                };
                info!(from = %key, to = %new_key, "repaired section numbering");
                new_key
            }
            _ => key.clone(),
        };
        repaired.insert(key, text.clone());
    }
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(text: &str) -> Numbering {
        Numbering::parse(text).unwrap()
    }

    fn keys(titles: &[&str]) -> SectionMap {
        titles
            .iter()
            .map(|title| (title.to_string(), format!("body of {title}")))
            .collect()
    }

    #[test]
    fn candidates_cover_children_siblings_and_parents() {
        let candidates = candidate_successors(&n("1.1."));
        assert!(candidates.contains(&n("1.2.")));
        assert!(candidates.contains(&n("1.3.")));
        assert!(candidates.contains(&n("1.1.1.")));
        assert!(candidates.contains(&n("1.1.1.9.")));
        assert!(candidates.contains(&n("2.")));
        assert!(!candidates.contains(&n("2.1.")));
        assert!(!candidates.contains(&n("1.1.")));

        let deep = candidate_successors(&n("1.2.3.4."));
        assert!(deep.contains(&n("1.2.3.5.")));
        assert!(deep.contains(&n("1.2.4.")));
        assert!(deep.contains(&n("1.3.")));
        assert!(!deep.iter().any(|c| c.depth() > 4));
    }

    #[test]
    fn skipped_sibling_is_legal() {
        let input = keys(&["1. Intro", "1.1. Background", "1.3. Method"]);
        assert_eq!(repair(&input), input);
    }

    #[test]
    fn jumping_to_a_foreign_child_is_repaired() {
        let input = keys(&["1. Intro", "1.1. Background", "2.1. Oops"]);
        let repaired = repair(&input);
        let titles = repaired.keys().cloned().collect::<Vec<_>>();
        assert_eq!(titles, vec!["1. Intro", "1.1. Background", "1.2. Oops"]);
        assert_eq!(repaired["1.2. Oops"], "body of 2.1. Oops");
    }

    #[test]
    fn opens_a_child_when_the_successor_is_deeper() {
        let input = keys(&["1. Intro", "12.7. Noise", "1.2. Next"]);
        let flagged = find_illogical(&input.keys().map(|k| key_numbering(k)).collect::<Vec<_>>());
        assert_eq!(flagged, vec![1]);
        let repaired = repair(&input);
        let titles = repaired.keys().cloned().collect::<Vec<_>>();
        assert_eq!(titles, vec!["1. Intro", "1.1. Noise", "1.2. Next"]);
    }

    #[test]
    fn unnumbered_titles_pass_through() {
        let input = keys(&["Foreword", "1. Intro", "Glossary", "2. Scope"]);
        assert_eq!(repair(&input), input);
        assert_eq!(key_numbering("Foreword"), None);
        assert_eq!(key_numbering("1.2. Scope"), Some(n("1.2.")));
    }
}
