//! Topic Tree Module
//!
//! Rebuilds the topic hierarchy from the flat list the data service returns.
//! The flat list stays the source of truth; the tree is a derived view.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::domain::Topic;

// == Build Tree ==
/// Groups `flat` on `parent_id` and returns the root topics.
///
/// Siblings keep their `order_index` ordering (stable for ties) and every
/// node's `level` is its depth, so a child is always one level below its
/// parent whatever the stored value was. Topics whose parent is missing from
/// the list are promoted to roots; topics only reachable through a cycle are
/// dropped.
pub fn build_tree(flat: &[Topic]) -> Vec<Topic> {
    let known: HashSet<&str> = flat.iter().map(|t| t.id.as_str()).collect();

    let mut groups: HashMap<Option<&str>, Vec<&Topic>> = HashMap::new();
    for topic in flat {
        let parent = topic
            .parent_id
            .as_deref()
            .filter(|p| *p != topic.id && known.contains(p));
        groups.entry(parent).or_default().push(topic);
    }
    for siblings in groups.values_mut() {
        siblings.sort_by_key(|t| t.order_index);
    }

    let mut visited = HashSet::new();
    let roots = attach(&groups, None, 0, &mut visited);

    if visited.len() < known.len() {
        warn!(
            "Dropped {} topic(s) unreachable from any root",
            known.len() - visited.len()
        );
    }
    roots
}

fn attach<'a>(
    groups: &HashMap<Option<&'a str>, Vec<&'a Topic>>,
    parent: Option<&'a str>,
    level: u32,
    visited: &mut HashSet<&'a str>,
) -> Vec<Topic> {
    let Some(siblings) = groups.get(&parent) else {
        return Vec::new();
    };

    let mut nodes = Vec::with_capacity(siblings.len());
    for topic in siblings {
        if !visited.insert(topic.id.as_str()) {
            continue;
        }
        let mut node = Topic {
            children: Vec::new(),
            level,
            ..(*topic).clone()
        };
        node.children = attach(groups, Some(topic.id.as_str()), level + 1, visited);
        nodes.push(node);
    }
    nodes
}

// == Flatten ==
/// Returns the tree in depth-first order with `children` emptied.
pub fn flatten(tree: &[Topic]) -> Vec<Topic> {
    let mut out = Vec::new();
    for topic in tree {
        out.push(Topic {
            children: Vec::new(),
            ..topic.clone()
        });
        out.extend(flatten(&topic.children));
    }
    out
}

// == Lookups ==
pub fn find_topic<'a>(tree: &'a [Topic], id: &str) -> Option<&'a Topic> {
    for topic in tree {
        if topic.id == id {
            return Some(topic);
        }
        if let Some(found) = find_topic(&topic.children, id) {
            return Some(found);
        }
    }
    None
}

pub fn find_topic_mut<'a>(tree: &'a mut [Topic], id: &str) -> Option<&'a mut Topic> {
    for topic in tree.iter_mut() {
        if topic.id == id {
            return Some(topic);
        }
        if let Some(found) = find_topic_mut(&mut topic.children, id) {
            return Some(found);
        }
    }
    None
}

/// Number of topics in the tree, all levels included.
pub fn count_topics(tree: &[Topic]) -> usize {
    tree.iter().map(|t| 1 + count_topics(&t.children)).sum()
}

/// Number of completed topics in the tree.
pub fn count_completed(tree: &[Topic]) -> usize {
    tree.iter()
        .map(|t| usize::from(t.completed) + count_completed(&t.children))
        .sum()
}
