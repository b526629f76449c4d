//! Disjoint sets over image indices.
//!
//! Images are identified by their position in the engine's input list. Only
//! indices that took part in at least one successful [`DisjointSets::union`]
//! are considered assigned; everything else is a singleton and never appears
//! in the final groups.

/// Arena-backed union-find with path compression and union by rank.
#[derive(Debug, Clone)]
pub struct DisjointSets {
    parent: Vec<usize>,
    rank: Vec<u8>,
    linked: Vec<bool>,
}

impl DisjointSets {
    /// Create `n` unassigned singletons.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
            linked: vec![false; n],
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Whether there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Whether `x` has been linked to any other element.
    #[must_use]
    pub fn is_linked(&self, x: usize) -> bool {
        self.linked[x]
    }

    /// Representative of the set containing `x`.
    ///
    /// # Panics
    ///
    /// Panics if `x` is out of range.
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }

        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Whether `a` and `b` are in the same set.
    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    /// Merge the sets containing `a` and `b`.
    ///
    /// Both elements become assigned. Returns `false` if they already shared
    /// a set (including `a == b`).
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        if a == b {
            return false;
        }
        self.linked[a] = true;
        self.linked[b] = true;

        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }

        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] = self.rank[ra].saturating_add(1);
            }
        }
        true
    }

    /// Components with two or more members.
    ///
    /// Members are ascending, and components are ordered by their lowest
    /// member, so position `i` in the result is group id `i + 1`.
    #[must_use]
    pub fn into_groups(mut self) -> Vec<Vec<usize>> {
        let n = self.len();
        let mut slot_of_root: Vec<Option<usize>> = vec![None; n];
        let mut groups: Vec<Vec<usize>> = Vec::new();

        for x in 0..n {
            if !self.linked[x] {
                continue;
            }
            let root = self.find(x);
            match slot_of_root[root] {
                Some(slot) => groups[slot].push(x),
                None => {
                    slot_of_root[root] = Some(groups.len());
                    groups.push(vec![x]);
                }
            }
        }

        groups.retain(|g| g.len() > 1);
        groups
    }
}
