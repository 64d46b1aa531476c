//! Builds parent/child trees out of flat rows.

use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode<T> {
    #[serde(flatten)]
    pub item: T,
    pub children: Vec<TreeNode<T>>,
}

/// Nest `items` by their parent key.
///
/// Children keep their input order. Items whose parent is absent become
/// roots. When parents form a cycle, the first cycle member in input order
/// is promoted to a root so every item appears exactly once.
pub fn build_tree<T, K, FI, FP>(items: Vec<T>, id_of: FI, parent_of: FP) -> Vec<TreeNode<T>>
where
    K: Eq + Hash,
    FI: Fn(&T) -> K,
    FP: Fn(&T) -> Option<K>,
{
    let mut index: HashMap<K, usize> = HashMap::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        index.entry(id_of(item)).or_insert(i);
    }

    let mut parents: Vec<Option<usize>> = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            parent_of(item)
                .and_then(|key| index.get(&key).copied())
                .filter(|p| *p != i)
        })
        .collect();

    for start in 0..items.len() {
        let mut current = parents[start];
        let mut steps = 0;
        while let Some(p) = current {
            if p == start {
                parents[start] = None;
                break;
            }
            steps += 1;
            if steps > items.len() {
                break;
            }
            current = parents[p];
        }
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); items.len()];
    let mut roots = Vec::new();
    for (i, parent) in parents.iter().enumerate() {
        match parent {
            Some(p) => children[*p].push(i),
            None => roots.push(i),
        }
    }

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    roots
        .into_iter()
        .filter_map(|i| assemble(i, &children, &mut slots))
        .collect()
}

fn assemble<T>(i: usize, children: &[Vec<usize>], slots: &mut [Option<T>]) -> Option<TreeNode<T>> {
    let item = slots[i].take()?;
    let kids = children[i]
        .iter()
        .filter_map(|&c| assemble(c, children, slots))
        .collect();
    Some(TreeNode {
        item,
        children: kids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Row {
        id: u32,
        parent: Option<u32>,
    }

    fn row(id: u32, parent: Option<u32>) -> Row {
        Row { id, parent }
    }

    fn ids(nodes: &[TreeNode<Row>]) -> Vec<u32> {
        nodes.iter().map(|n| n.item.id).collect()
    }

    fn count(nodes: &[TreeNode<Row>]) -> usize {
        nodes.iter().map(|n| 1 + count(&n.children)).sum()
    }

    #[test]
    fn nests_in_input_order() {
        let rows = vec![row(1, None), row(2, Some(1)), row(3, Some(1)), row(4, Some(3))];
        let tree = build_tree(rows, |r| r.id, |r| r.parent);
        assert_eq!(ids(&tree), vec![1]);
        assert_eq!(ids(&tree[0].children), vec![2, 3]);
        assert_eq!(ids(&tree[0].children[1].children), vec![4]);
    }

    #[test]
    fn orphans_become_roots() {
        let rows = vec![row(5, Some(99)), row(6, None)];
        let tree = build_tree(rows, |r| r.id, |r| r.parent);
        assert_eq!(ids(&tree), vec![5, 6]);
    }

    #[test]
    fn cycles_do_not_drop_or_repeat_nodes() {
        let rows = vec![row(1, Some(3)), row(2, Some(1)), row(3, Some(2)), row(4, Some(4))];
        let tree = build_tree(rows, |r| r.id, |r| r.parent);
        assert_eq!(count(&tree), 4);
        assert_eq!(ids(&tree), vec![1, 4]);
        assert_eq!(ids(&tree[0].children), vec![2]);
    }

    #[test]
    fn serializes_item_fields_inline() {
        let tree = build_tree(vec![row(1, None)], |r| r.id, |r| r.parent);
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json, serde_json::json!([{"id": 1, "parent": null, "children": []}]));
    }
}
