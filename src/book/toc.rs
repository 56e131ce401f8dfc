//! Table of contents arena.

use std::collections::VecDeque;

use crate::error::{Error, Result};

/// KF8 position: fragment id and byte offset inside that fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosFid {
    pub fid: u32,
    pub offset: u32,
}

/// One navigation point.
///
/// Links are indices into the owning [`Toc`]. `length == 0` means the
/// extent is not known; the writer derives it from document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TocEntry {
    pub title: String,
    pub target_offset: usize,
    pub length: usize,
    pub pos_fid: Option<PosFid>,
    pub depth: u32,
    pub parent: Option<usize>,
    pub first_child: Option<usize>,
    pub last_child: Option<usize>,
    /// Periodical section/article class.
    pub class_name: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub caption: Option<String>,
    pub attribution: Option<String>,
    pub image_index: Option<u32>,
}

impl TocEntry {
    pub fn new(title: impl Into<String>, target_offset: usize) -> Self {
        Self {
            title: title.into(),
            target_offset,
            ..Default::default()
        }
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn end(&self) -> usize {
        self.target_offset.saturating_add(self.length)
    }

    pub fn is_leaf(&self) -> bool {
        self.first_child.is_none()
    }

    /// True if the entry carries any periodical-only field.
    pub fn is_periodical(&self) -> bool {
        self.class_name.is_some()
            || self.description.is_some()
            || self.author.is_some()
            || self.caption.is_some()
            || self.attribution.is_some()
            || self.image_index.is_some()
    }
}

/// Arena of [`TocEntry`] values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Toc {
    entries: Vec<TocEntry>,
}

impl Toc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap entries whose links are already set.
    pub fn from_entries(entries: Vec<TocEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TocEntry> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut TocEntry> {
        self.entries.get_mut(index)
    }

    pub fn entries(&self) -> &[TocEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &TocEntry> {
        self.entries.iter()
    }

    pub fn push_root(&mut self, mut entry: TocEntry) -> usize {
        entry.parent = None;
        entry.depth = 0;
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Append `entry` as the last child of `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not an index of this arena.
    pub fn push_child(&mut self, parent: usize, mut entry: TocEntry) -> usize {
        let index = self.entries.len();
        entry.parent = Some(parent);
        entry.depth = self.entries[parent].depth + 1;
        self.entries.push(entry);

        let p = &mut self.entries[parent];
        if p.first_child.is_none() {
            p.first_child = Some(index);
        }
        p.last_child = Some(index);
        index
    }

    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.parent.is_none())
            .map(|(i, _)| i)
    }

    /// Children of `index` in arena order.
    pub fn children(&self, index: usize) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.parent == Some(index))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn max_depth(&self) -> u32 {
        self.entries.iter().map(|e| e.depth).max().unwrap_or(0)
    }

    /// Arena indices in breadth-first order: roots, then the children of
    /// each visited entry in turn.
    pub fn breadth_first(&self) -> Vec<usize> {
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); self.entries.len()];
        let mut queue = VecDeque::new();
        for (i, e) in self.entries.iter().enumerate() {
            match e.parent {
                Some(p) if p < self.entries.len() && p != i => children[p].push(i),
                _ => queue.push_back(i),
            }
        }

        let mut order = Vec::with_capacity(self.entries.len());
        let mut seen = vec![false; self.entries.len()];
        while let Some(i) = queue.pop_front() {
            if std::mem::replace(&mut seen[i], true) {
                continue;
            }
            order.push(i);
            queue.extend(children[i].iter().copied());
        }
        order
    }

    /// Renumber breadth-first so that each parent's children occupy a
    /// contiguous run, and recompute depths and child links.
    pub fn canonical_order(&self) -> Toc {
        let order = self.breadth_first();
        let mut new_index = vec![usize::MAX; self.entries.len()];
        for (new, &old) in order.iter().enumerate() {
            new_index[old] = new;
        }

        let mut entries: Vec<TocEntry> = order
            .iter()
            .map(|&old| {
                let mut e = self.entries[old].clone();
                e.parent = e.parent.map(|p| new_index[p]);
                e.first_child = None;
                e.last_child = None;
                e
            })
            .collect();

        for i in 0..entries.len() {
            match entries[i].parent {
                Some(p) => {
                    entries[i].depth = entries[p].depth + 1;
                    let parent = &mut entries[p];
                    parent.first_child = Some(parent.first_child.map_or(i, |f| f.min(i)));
                    parent.last_child = Some(parent.last_child.map_or(i, |l| l.max(i)));
                }
                None => entries[i].depth = 0,
            }
        }

        Toc { entries }
    }

    /// Fill in unknown lengths: an entry ends where its next sibling starts,
    /// else where its parent ends, else at `text_len`.
    pub fn resolve_lengths(&mut self, text_len: usize) {
        for i in self.breadth_first() {
            if self.entries[i].length != 0 {
                continue;
            }
            let start = self.entries[i].target_offset;
            let parent = self.entries[i].parent;
            let limit = parent
                .and_then(|p| self.entries.get(p))
                .map(|p| p.end())
                .filter(|&end| end > start)
                .unwrap_or(text_len);
            let next_sibling = self
                .entries
                .iter()
                .filter(|e| e.parent == parent && e.target_offset > start)
                .map(|e| e.target_offset)
                .min()
                .unwrap_or(limit);
            self.entries[i].length = next_sibling.min(limit).saturating_sub(start);
        }
    }

    pub(crate) fn validate(&self, text_len: usize) -> Result<()> {
        let n = self.entries.len();
        let bad = |msg: String| Err(Error::InvariantViolation(msg));

        // Every link must be in range before any chain is followed.
        for (i, e) in self.entries.iter().enumerate() {
            for link in [e.parent, e.first_child, e.last_child].into_iter().flatten() {
                if link >= n || link == i {
                    return bad(format!("toc entry {i} links to invalid entry {link}"));
                }
            }
        }

        for (i, e) in self.entries.iter().enumerate() {
            if e.target_offset > text_len {
                return bad(format!(
                    "toc entry {i} targets offset {} past end of text ({text_len})",
                    e.target_offset
                ));
            }
            if e.end() > text_len {
                return bad(format!("toc entry {i} extends past end of text"));
            }
            if e.first_child.is_some() != e.last_child.is_some() {
                return bad(format!("toc entry {i} has only one of first/last child"));
            }
            if let (Some(first), Some(last)) = (e.first_child, e.last_child)
                && first > last
            {
                return bad(format!("toc entry {i} has first child after last child"));
            }

            // Parent chains must terminate.
            let mut cursor = e.parent;
            let mut steps = 0;
            while let Some(p) = cursor {
                steps += 1;
                if steps > n {
                    return bad(format!("toc entry {i} is part of a parent cycle"));
                }
                cursor = self.entries[p].parent;
            }

            if let Some(p) = e.parent {
                let parent = &self.entries[p];
                if e.target_offset < parent.target_offset
                    || (parent.length > 0 && e.length > 0 && e.end() > parent.end())
                {
                    return bad(format!("toc entry {i} does not nest under parent {p}"));
                }
            }
        }

        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); n + 1];
        for (i, e) in self.entries.iter().enumerate() {
            groups[e.parent.unwrap_or(n)].push(i);
        }
        for siblings in groups.iter_mut() {
            siblings.sort_by_key(|&i| self.entries[i].target_offset);
            for pair in siblings.windows(2) {
                let (a, b) = (&self.entries[pair[0]], &self.entries[pair[1]]);
                if a.length > 0 && a.end() > b.target_offset {
                    return bad(format!(
                        "sibling toc entries {} and {} overlap",
                        pair[0], pair[1]
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Toc {
        // Children pushed interleaved so arena order is not breadth-first.
        let mut toc = Toc::new();
        let a = toc.push_root(TocEntry::new("A", 0));
        let a1 = toc.push_child(a, TocEntry::new("A1", 10));
        let b = toc.push_root(TocEntry::new("B", 100));
        toc.push_child(a1, TocEntry::new("A1x", 20));
        toc.push_child(a, TocEntry::new("A2", 50));
        toc.push_child(b, TocEntry::new("B1", 120));
        toc
    }

    #[test]
    fn test_push_child_links() {
        let toc = sample();
        let a = toc.get(0).unwrap();
        assert_eq!(a.first_child, Some(1));
        assert_eq!(a.last_child, Some(4));
        assert_eq!(toc.get(3).unwrap().depth, 2);
        assert_eq!(toc.roots().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(toc.children(0), vec![1, 4]);
    }

    #[test]
    fn test_canonical_order_is_contiguous() {
        let toc = sample().canonical_order();
        let titles: Vec<_> = toc.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "A1", "A2", "B1", "A1x"]);

        let a = toc.get(0).unwrap();
        assert_eq!((a.first_child, a.last_child), (Some(2), Some(3)));
        let b = toc.get(1).unwrap();
        assert_eq!((b.first_child, b.last_child), (Some(4), Some(4)));
        assert_eq!(toc.get(5).unwrap().parent, Some(2));
        assert_eq!(toc.get(5).unwrap().depth, 2);
    }

    #[test]
    fn test_resolve_lengths() {
        let mut toc = sample();
        toc.resolve_lengths(200);
        let lengths: Vec<_> = toc.iter().map(|e| e.length).collect();
        // A ends at B, A1 at A2, A2 at A's end, A1x at A1's end, B1 at B's end.
        assert_eq!(lengths, vec![100, 40, 100, 30, 50, 80]);
        assert!(toc.validate(200).is_ok());
    }

    #[test]
    fn test_validate_rejects_offset_past_end() {
        let mut toc = Toc::new();
        toc.push_root(TocEntry::new("x", 11));
        assert!(matches!(
            toc.validate(10),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_overlapping_siblings() {
        let mut toc = Toc::new();
        toc.push_root(TocEntry::new("a", 0).with_length(60));
        toc.push_root(TocEntry::new("b", 50).with_length(10));
        assert!(toc.validate(100).is_err());
    }

    #[test]
    fn test_validate_rejects_parent_cycle() {
        let entries = vec![
            TocEntry {
                parent: Some(1),
                ..TocEntry::new("a", 0)
            },
            TocEntry {
                parent: Some(0),
                ..TocEntry::new("b", 0)
            },
        ];
        assert!(Toc::from_entries(entries).validate(10).is_err());
    }

    #[test]
    fn test_validate_rejects_dangling_link_on_chain() {
        // Entry 0 is valid on its own; its parent's parent is out of range.
        let entries = vec![
            TocEntry {
                parent: Some(1),
                ..TocEntry::new("a", 0)
            },
            TocEntry {
                parent: Some(99),
                ..TocEntry::new("b", 0)
            },
        ];
        assert!(matches!(
            Toc::from_entries(entries).validate(10),
            Err(Error::InvariantViolation(_))
        ));
    }
}
