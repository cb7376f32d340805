//! Parent resolution for flat records that name their parent by id.

use std::{
    collections::HashMap,
    error::Error,
    fmt::{self, Display, Formatter},
};

use log::error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    NoRoot,
    TooDeep(usize),
}

impl Display for HierarchyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            HierarchyError::NoRoot => write!(f, "Unable to find scene root node"),
            HierarchyError::TooDeep(limit) => {
                write!(f, "Node hierarchy is deeper than {} levels", limit)
            }
        }
    }
}

impl Error for HierarchyError {}

/// A record that may be attached below another record.
pub trait ParentLink {
    fn id(&self) -> u32;
    fn parent_id(&self) -> Option<u32>;
}

/// Parent and child relations between records, by record index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hierarchy {
    pub roots: Vec<usize>,
    pub parents: Vec<Option<usize>>,
    pub children: Vec<Vec<usize>>,
}

/// Matches every record to the first record carrying its parent id.
///
/// A record claimed by a second parent keeps its first parent; the conflict is
/// logged. Records without a resolvable parent become roots.
pub fn resolve_parents<T: ParentLink>(records: &[T]) -> Result<Hierarchy, HierarchyError> {
    let mut by_id: HashMap<u32, Vec<usize>> = HashMap::new();
    for (index, record) in records.iter().enumerate() {
        by_id.entry(record.id()).or_default().push(index);
    }

    let mut hierarchy = Hierarchy {
        roots: Vec::new(),
        parents: vec![None; records.len()],
        children: vec![Vec::new(); records.len()],
    };
    for (index, record) in records.iter().enumerate() {
        let Some(parent_id) = record.parent_id() else {
            continue;
        };
        let candidates = by_id
            .get(&parent_id)
            .into_iter()
            .flatten()
            .filter(|candidate| **candidate != index);
        for &parent in candidates {
            if let Some(first) = hierarchy.parents[index] {
                error!(
                    "Record {} is already a child of record {}, ignoring parent {} (cross reference)",
                    index, first, parent
                );
                continue;
            }
            hierarchy.parents[index] = Some(parent);
            hierarchy.children[parent].push(index);
        }
    }

    hierarchy.roots = (0..records.len())
        .filter(|index| hierarchy.parents[*index].is_none())
        .collect();
    if hierarchy.roots.is_empty() {
        return Err(HierarchyError::NoRoot);
    }
    Ok(hierarchy)
}

impl Hierarchy {
    /// Record indices in depth-first pre-order starting from the roots.
    ///
    /// Records on a parent cycle are not reachable from any root and are left out.
    pub fn depth_first(&self, max_depth: usize) -> Result<Vec<usize>, HierarchyError> {
        let mut order = Vec::with_capacity(self.parents.len());
        let mut stack: Vec<(usize, usize)> = self.roots.iter().rev().map(|root| (*root, 0)).collect();
        while let Some((index, depth)) = stack.pop() {
            if depth > max_depth {
                return Err(HierarchyError::TooDeep(max_depth));
            }
            order.push(index);
            stack.extend(self.children[index].iter().rev().map(|child| (*child, depth + 1)));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Record(u32, Option<u32>);

    impl ParentLink for Record {
        fn id(&self) -> u32 {
            self.0
        }

        fn parent_id(&self) -> Option<u32> {
            self.1
        }
    }

    #[test]
    fn single_chain() {
        let records = [Record(3, Some(2)), Record(1, None), Record(2, Some(1))];
        let hierarchy = resolve_parents(&records).unwrap();
        assert_eq!(hierarchy.roots, [1]);
        assert_eq!(hierarchy.depth_first(1000).unwrap(), [1, 2, 0]);
    }

    #[test]
    fn no_root() {
        let records = [Record(1, Some(2)), Record(2, Some(1))];
        assert_eq!(resolve_parents(&records), Err(HierarchyError::NoRoot));
        assert!(resolve_parents::<Record>(&[]).is_err());
    }

    #[test]
    fn first_parent_wins() {
        let records = [Record(7, None), Record(7, None), Record(9, Some(7))];
        let hierarchy = resolve_parents(&records).unwrap();
        assert_eq!(hierarchy.parents[2], Some(0));
        assert_eq!(hierarchy.children[0], [2]);
        assert!(hierarchy.children[1].is_empty());
        assert_eq!(hierarchy.roots, [0, 1]);
    }

    #[test]
    fn unknown_parent_is_root_and_self_parent_ignored() {
        let records = [Record(1, Some(42)), Record(2, Some(2))];
        let hierarchy = resolve_parents(&records).unwrap();
        assert_eq!(hierarchy.roots, [0, 1]);
    }

    #[test]
    fn depth_cap() {
        let records: Vec<Record> = (0..10).map(|id| Record(id, id.checked_sub(1))).collect();
        let hierarchy = resolve_parents(&records).unwrap();
        assert_eq!(hierarchy.depth_first(3), Err(HierarchyError::TooDeep(3)));
    }
}
