use std::fmt::Write as _;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::numbering::Numbering;
use crate::segment::SectionMap;

/// Child key holding a section's own text once it gains subsections.
pub const INTRODUCTION: &str = "introduction";

pub type SectionTree = IndexMap<String, SectionNode>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectionNode {
    Leaf(String),
    Node(SectionTree),
}

impl SectionNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    pub fn children(&self) -> Option<&SectionTree> {
        match self {
            Self::Leaf(_) => None,
            Self::Node(children) => Some(children),
        }
    }
}

/// Numbering of a canonical key (`"1.2. Title"`); keys without a dotted
/// leading run are unnumbered.
pub fn tree_numbering(key: &str) -> Option<Numbering> {
    Numbering::split(key)
        .filter(|title| title.dotted)
        .map(|title| title.numbering)
}

struct Entry<'a> {
    title: &'a str,
    text: &'a str,
    numbering: Option<Numbering>,
    children: Vec<usize>,
}

/// Nests the flat sections under their numbering parents.
///
/// Each section is attached to the first section whose numbering is its
/// parent numbering. Sections whose parent does not exist are kept together
/// in a root container named `"level <depth> for <parent>"`.
pub fn build_tree(sections: &SectionMap) -> SectionTree {
    let mut entries = sections
        .iter()
        .map(|(title, text)| Entry {
            title,
            text,
            numbering: tree_numbering(title),
            children: Vec::new(),
        })
        .collect::<Vec<_>>();

    let mut roots = Vec::new();
    let mut unnumbered = Vec::new();
    let mut orphans: IndexMap<String, Vec<usize>> = IndexMap::new();
    for index in 0..entries.len() {
        let Some(numbering) = entries[index].numbering.clone() else {
            unnumbered.push(index);
            continue;
        };
        let Some(parent) = numbering.parent() else {
            roots.push(index);
            continue;
        };
        let found = entries
            .iter()
            .position(|entry| entry.numbering.as_ref() == Some(&parent));
        match found {
            Some(parent_index) => entries[parent_index].children.push(index),
            None => orphans
                .entry(orphan_label(&numbering, &parent))
                .or_default()
                .push(index),
        }
    }

    let mut tree = SectionTree::new();
    for index in unnumbered.into_iter().chain(roots) {
        tree.insert(entries[index].title.to_string(), node(&entries, index));
    }
    for (label, members) in orphans {
        let group = members
            .into_iter()
            .map(|index| (entries[index].title.to_string(), node(&entries, index)))
            .collect();
        tree.insert(label, SectionNode::Node(group));
    }
    filter_root(tree)
}

fn orphan_label(numbering: &Numbering, parent: &Numbering) -> String {
    let prefix = parent.render();
    format!(
        "level {} for {}",
        numbering.depth(),
        prefix.trim_end_matches('.')
    )
}

fn node(entries: &[Entry<'_>], index: usize) -> SectionNode {
    let entry = &entries[index];
    if entry.children.is_empty() {
        return SectionNode::Leaf(entry.text.to_string());
    }
    let mut children = SectionTree::new();
    children.insert(
        INTRODUCTION.to_string(),
        SectionNode::Leaf(entry.text.to_string()),
    );
    for &child in &entry.children {
        children.insert(entries[child].title.to_string(), node(entries, child));
    }
    SectionNode::Node(children)
}

/// Root keeps only unnumbered and top-level sections.
pub fn filter_root(tree: SectionTree) -> SectionTree {
    tree.into_iter()
        .filter(|(key, _)| tree_numbering(key).map_or(true, |n| n.depth() == 1))
        .collect()
}

/// Pre-order `(parent title, title)` pairs, leaving out introductions.
pub fn flatten(tree: &SectionTree) -> Vec<(Option<String>, String)> {
    let mut out = Vec::new();
    flatten_into(tree, None, &mut out);
    out
}

fn flatten_into(tree: &SectionTree, parent: Option<&str>, out: &mut Vec<(Option<String>, String)>) {
    for (title, node) in tree {
        if title == INTRODUCTION && parent.is_some() {
            continue;
        }
        out.push((parent.map(str::to_string), title.clone()));
        if let SectionNode::Node(children) = node {
            flatten_into(children, Some(title), out);
        }
    }
}

/// Indented outline of the tree, one title per line.
pub fn render_outline(tree: &SectionTree) -> String {
    let mut out = String::new();
    render_into(tree, 0, &mut out);
    out
}

fn render_into(tree: &SectionTree, depth: usize, out: &mut String) {
    for (title, node) in tree {
        let marker = if node.is_leaf() { "-" } else { "+" };
        let _ = writeln!(out, "{}{marker} {title}", "  ".repeat(depth));
        if let SectionNode::Node(children) = node {
            render_into(children, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections(titles: &[&str]) -> SectionMap {
        titles
            .iter()
            .map(|title| (title.to_string(), format!("text of {title}")))
            .collect()
    }

    #[test]
    fn nests_children_with_an_introduction() {
        let tree = build_tree(&sections(&["1. Intro", "1.1. Background", "2. Scope"]));
        assert_eq!(tree.len(), 2);
        let intro = tree["1. Intro"].children().unwrap();
        assert_eq!(
            intro[INTRODUCTION],
            SectionNode::Leaf("text of 1. Intro".into())
        );
        assert_eq!(
            intro["1.1. Background"],
            SectionNode::Leaf("text of 1.1. Background".into())
        );
        assert!(tree["2. Scope"].is_leaf());
    }

    #[test]
    fn unnumbered_sections_lead_the_root() {
        let tree = build_tree(&sections(&["1. Intro", "Foreword", "2. Scope"]));
        let keys = tree.keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys, vec!["Foreword", "1. Intro", "2. Scope"]);
    }

    #[test]
    fn orphans_are_promoted_not_dropped() {
        let tree = build_tree(&sections(&["1. Intro", "3.2.1. Lost", "3.2.2. Found"]));
        let group = tree["level 3 for 3.2"].children().unwrap();
        assert_eq!(
            group.keys().cloned().collect::<Vec<_>>(),
            vec!["3.2.1. Lost", "3.2.2. Found"]
        );
    }

    #[test]
    fn parents_match_whole_numbering_not_string_prefix() {
        let tree = build_tree(&sections(&["1. A", "10. B", "10.1. C"]));
        assert!(tree["1. A"].is_leaf());
        assert!(tree["10. B"].children().unwrap().contains_key("10.1. C"));
    }

    #[test]
    fn serializes_leaves_as_strings() {
        let tree = build_tree(&sections(&["1. Intro", "1.1. Background"]));
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(
            json["1. Intro"]["1.1. Background"],
            serde_json::json!("text of 1.1. Background")
        );
        let back: SectionTree = serde_json::from_value(json).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn flatten_reports_parents() {
        let tree = build_tree(&sections(&["1. Intro", "1.1. Background", "1.1.1. Detail"]));
        assert_eq!(
            flatten(&tree),
            vec![
                (None, "1. Intro".to_string()),
                (Some("1. Intro".to_string()), "1.1. Background".to_string()),
                (
                    Some("1.1. Background".to_string()),
                    "1.1.1. Detail".to_string()
                ),
            ]
        );
    }

    #[test]
    fn outline_rendering() {
        let tree = build_tree(&sections(&["Foreword", "1. Intro", "1.1. Background", "2. Scope"]));
        insta::assert_snapshot!(render_outline(&tree).trim_end(), @r###"
        - Foreword
        + 1. Intro
          - introduction
          - 1.1. Background
        - 2. Scope
        "###);
    }
}
