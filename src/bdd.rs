use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::cache::Cache;
use crate::reference::Ref;
use crate::table::Table;
use crate::utils::{pairing3, MyHash};

/// Decision node `variable ? high : low`; only `low` may be complemented.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Node {
    pub variable: u32,
    pub low: Ref,
    pub high: Ref,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            variable: 0,
            low: Ref::positive(0),
            high: Ref::positive(0),
        }
    }
}

impl MyHash for Node {
    fn hash(&self) -> u64 {
        pairing3(self.variable as u64, self.low.raw() as u64, self.high.raw() as u64)
    }
}

type Storage = Table<Node>;

impl Storage {
    pub fn variable(&self, index: usize) -> u32 {
        self.value(index).variable
    }
    pub fn low(&self, index: usize) -> Ref {
        self.value(index).low
    }
    pub fn high(&self, index: usize) -> Ref {
        self.value(index).high
    }
}

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum OpKey {
    Ite(Ref, Ref, Ref),
}

impl MyHash for OpKey {
    fn hash(&self) -> u64 {
        match self {
            OpKey::Ite(f, g, h) => pairing3(f.raw() as u64, g.raw() as u64, h.raw() as u64),
        }
    }
}

/// A set of variables, used for quantification.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct VarSet {
    mask: Vec<bool>,
    max: u32,
}

impl VarSet {
    pub fn new(vars: impl IntoIterator<Item = u32>) -> Self {
        let mut mask = Vec::new();
        let mut max = 0;
        for v in vars {
            assert_ne!(v, 0, "Variable index should not be zero");
            let i = v as usize;
            if mask.len() <= i {
                mask.resize(i + 1, false);
            }
            mask[i] = true;
            max = max.max(v);
        }
        Self { mask, max }
    }

    pub fn contains(&self, v: u32) -> bool {
        self.mask.get(v as usize).copied().unwrap_or(false)
    }

    /// The largest variable in the set, or `0` for the empty set.
    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn is_empty(&self) -> bool {
        self.max == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.mask
            .iter()
            .enumerate()
            .filter(|&(_, &b)| b)
            .map(|(i, _)| i as u32)
    }
}

/// Shared BDD manager.
///
/// Every [`Ref`] produced by one manager is only meaningful for that manager.
/// All operations take `&self`; the node table and the computed table live
/// behind `RefCell`s.
pub struct Bdd {
    storage: RefCell<Storage>,
    cache: RefCell<Cache<OpKey, Ref>>,
    gc_threshold: Cell<usize>,
    gc_time: Cell<Duration>,
    gc_runs: Cell<usize>,
    /// Per-slot count of garbage collections that freed the slot.
    #[cfg(debug_assertions)]
    generations: RefCell<Vec<u32>>,
    pub zero: Ref,
    pub one: Ref,
}

impl Bdd {
    pub fn new(storage_bits: usize) -> Self {
        assert!(storage_bits <= 31, "Storage bits should be in the range 0..=31");

        let cache_bits = storage_bits.min(20);

        let mut storage = Storage::new(storage_bits);

        // Allocate the terminal node:
        let one = storage.alloc();
        assert_eq!(one, 1); // Make sure the terminal node is (1).
        let one = Ref::positive(one as u32);
        let zero = -one;

        Self {
            storage: RefCell::new(storage),
            cache: RefCell::new(Cache::new(cache_bits)),
            gc_threshold: Cell::new(1 << storage_bits),
            gc_time: Cell::new(Duration::ZERO),
            gc_runs: Cell::new(0),
            #[cfg(debug_assertions)]
            generations: RefCell::new(Vec::new()),
            zero,
            one,
        }
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new(16)
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let storage = self.storage.borrow();
        f.debug_struct("Bdd")
            .field("capacity", &storage.capacity())
            .field("size", &storage.size())
            .field("real_size", &storage.real_size())
            .finish()
    }
}

impl Bdd {
    pub fn variable(&self, index: usize) -> u32 {
        self.storage.borrow().variable(index)
    }
    pub fn low(&self, index: usize) -> Ref {
        self.storage.borrow().low(index)
    }
    pub fn high(&self, index: usize) -> Ref {
        self.storage.borrow().high(index)
    }

    /// Number of live nodes (including the terminal).
    pub fn num_nodes(&self) -> usize {
        self.storage.borrow().real_size()
    }

    /// Handle to slot `i`, stamped with the slot's generation in debug builds.
    fn handle(&self, i: usize) -> Ref {
        let node = Ref::positive(i as u32);
        #[cfg(debug_assertions)]
        let node = node.with_generation(self.generations.borrow().get(i).copied().unwrap_or(0));
        node
    }

    /// Panics in debug builds if `node` refers to a slot freed since `node` was made.
    #[inline]
    fn check(&self, node: Ref) {
        #[cfg(debug_assertions)]
        {
            let current = self.generations.borrow().get(node.index()).copied().unwrap_or(0);
            assert_eq!(
                node.generation(),
                current,
                "Stale handle {}: its node was garbage collected",
                node
            );
        }
        #[cfg(not(debug_assertions))]
        let _ = node;
    }

    #[cfg(debug_assertions)]
    fn retire(&self, i: usize) {
        let mut generations = self.generations.borrow_mut();
        if generations.len() <= i {
            generations.resize(i + 1, 0);
        }
        generations[i] += 1;
    }

    pub fn low_node(&self, node: Ref) -> Ref {
        self.check(node);
        let low = self.low(node.index());
        if node.is_negated() {
            -low
        } else {
            low
        }
    }
    pub fn high_node(&self, node: Ref) -> Ref {
        self.check(node);
        let high = self.high(node.index());
        if node.is_negated() {
            -high
        } else {
            high
        }
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero
    }
    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one
    }
    pub fn is_terminal(&self, node: Ref) -> bool {
        node.index() == self.one.index()
    }

    /// Variable at the top of `node`, or `u32::MAX` for terminals.
    pub fn level(&self, node: Ref) -> u32 {
        if self.is_terminal(node) {
            u32::MAX
        } else {
            self.check(node);
            self.variable(node.index())
        }
    }

    pub fn mk_node(&self, v: u32, low: Ref, high: Ref) -> Ref {
        assert_ne!(v, 0, "Variable index should not be zero");

        // Handle canonicity
        if high.is_negated() {
            return -self.mk_node(v, -low, -high);
        }

        // Handle duplicates
        if low == high {
            return low;
        }

        let i = self.storage.borrow_mut().put(Node { variable: v, low, high });
        self.handle(i)
    }

    pub fn mk_var(&self, v: u32) -> Ref {
        assert_ne!(v, 0, "Variable index should not be zero");
        self.mk_node(v, self.zero, self.one)
    }

    /// Conjunction of signed literals (DIMACS-style: `-v` is the negation of `v`).
    pub fn cube(&self, literals: impl IntoIterator<Item = i32>) -> Ref {
        let mut literals = literals.into_iter().collect::<Vec<_>>();
        literals.sort_by_key(|&v| std::cmp::Reverse(v.unsigned_abs()));
        debug!("cube(literals = {:?})", literals);
        let mut current = self.one;
        for lit in literals {
            assert_ne!(lit, 0, "Variable index should not be zero");
            current = if lit < 0 {
                self.mk_node(lit.unsigned_abs(), current, self.zero)
            } else {
                self.mk_node(lit as u32, self.zero, current)
            };
        }
        current
    }

    pub fn top_cofactors(&self, node: Ref, v: u32) -> (Ref, Ref) {
        assert_ne!(v, 0, "Variable index should not be zero");

        if self.is_terminal(node) || v < self.variable(node.index()) {
            return (node, node);
        }
        debug_assert_eq!(v, self.variable(node.index()));
        (self.low_node(node), self.high_node(node))
    }

    /// Apply the ITE operation to the arguments.
    ///
    /// ```text
    /// ITE(x, y, z) = (x ∧ y) ∨ (¬x ∧ z)
    /// ```
    ///
    /// # Examples
    ///
    /// ```
    /// use bdd_planner::bdd::Bdd;
    ///
    /// let bdd = Bdd::default();
    /// let x = bdd.mk_var(1);
    /// let y = bdd.mk_var(2);
    /// let z = bdd.mk_var(3);
    /// let f = bdd.apply_ite(x, y, z);
    /// let x_and_y = bdd.apply_and(x, y);
    /// let not_x_and_z = bdd.apply_and(-x, z);
    /// assert_eq!(f, bdd.apply_or(x_and_y, not_x_and_z));
    /// ```
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Ref {
        // Base cases:
        //   ite(1,G,H) => G
        //   ite(0,G,H) => H
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }

        // More base cases:
        //   ite(F,G,G) => G
        //   ite(F,1,0) => F
        //   ite(F,0,1) => ~F
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }

        // Standard triples:
        //   ite(F,F,H) => ite(F,1,H)
        //   ite(F,G,F) => ite(F,G,0)
        //   ite(F,~F,H) => ite(F,0,H)
        //   ite(F,G,~F) => ite(F,G,1)
        let (mut f, mut g, mut h) = (f, g, h);
        if g == f {
            g = self.one;
        } else if g == -f {
            g = self.zero;
        }
        if h == f {
            h = self.zero;
        } else if h == -f {
            h = self.one;
        }
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }

        let i = self.level(f);
        let j = self.level(g);
        let k = self.level(h);

        // Equivalent pairs (choose the one with the lowest top variable):
        //   ite(F,1,H) == ite(H,1,F) == F ∨ H
        //   ite(F,G,0) == ite(G,F,0) == F ∧ G
        //   ite(F,G,1) == ite(~G,~F,1) == F -> G
        //   ite(F,0,H) == ite(~H,0,~F) == ~F ∧ H
        if self.is_one(g) && k < i {
            return self.apply_ite(h, self.one, f);
        }
        if self.is_zero(h) && j < i {
            return self.apply_ite(g, f, self.zero);
        }
        if self.is_one(h) && j < i {
            return self.apply_ite(-g, -f, self.one);
        }
        if self.is_zero(g) && k < i {
            return self.apply_ite(-h, self.zero, -f);
        }

        // ite(~F,G,H) => ite(F,H,G)
        if f.is_negated() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }

        // ite(F,~G,H) => ~ite(F,G,~H)
        let mut n = false;
        if g.is_negated() {
            n = true;
            g = -g;
            h = -h;
        }

        let key = OpKey::Ite(f, g, h);
        if let Some(res) = self.cache.borrow_mut().get(&key) {
            return if n { -res } else { res };
        }

        // Determine the top variable:
        let m = i.min(j).min(k);
        debug_assert_ne!(m, u32::MAX);

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let e = self.apply_ite(f0, g0, h0);
        let t = self.apply_ite(f1, g1, h1);

        let res = self.mk_node(m, e, t);
        self.cache.borrow_mut().insert(key, res);

        if n {
            -res
        } else {
            res
        }
    }

    pub fn apply_not(&self, f: Ref) -> Ref {
        -f
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, self.one, v)
    }

    pub fn apply_xor(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, -v, v)
    }

    pub fn apply_eq(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, -v)
    }

    /// `u ∧ ¬v`
    pub fn apply_diff(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(v, self.zero, u)
    }

    /// Conjunction of all nodes, combined pairwise in a balanced tree.
    pub fn apply_and_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Ref {
        self.balanced(nodes.into_iter().collect(), self.one, |a, b| self.apply_and(a, b))
    }

    /// Disjunction of all nodes, combined pairwise in a balanced tree.
    pub fn apply_or_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Ref {
        self.balanced(nodes.into_iter().collect(), self.zero, |a, b| self.apply_or(a, b))
    }

    fn balanced(&self, mut layer: Vec<Ref>, unit: Ref, op: impl Fn(Ref, Ref) -> Ref) -> Ref {
        if layer.is_empty() {
            return unit;
        }
        while layer.len() > 1 {
            layer = layer
                .chunks(2)
                .map(|pair| if pair.len() == 2 { op(pair[0], pair[1]) } else { pair[0] })
                .collect();
        }
        layer[0]
    }

    /// Existential quantification `∃vars. f`.
    pub fn exists(&self, f: Ref, vars: &VarSet) -> Ref {
        let mut cache = HashMap::new();
        self.exists_(f, vars, &mut cache)
    }

    fn exists_(&self, f: Ref, vars: &VarSet, cache: &mut HashMap<Ref, Ref>) -> Ref {
        if self.is_terminal(f) || self.level(f) > vars.max() {
            return f;
        }
        if let Some(&res) = cache.get(&f) {
            return res;
        }

        let v = self.level(f);
        let low = self.exists_(self.low_node(f), vars, cache);
        let res = if vars.contains(v) {
            if self.is_one(low) {
                self.one
            } else {
                let high = self.exists_(self.high_node(f), vars, cache);
                self.apply_or(low, high)
            }
        } else {
            let high = self.exists_(self.high_node(f), vars, cache);
            self.mk_node(v, low, high)
        };

        cache.insert(f, res);
        res
    }

    /// Relational product `∃vars. (f ∧ g)`, without building the conjunction first.
    pub fn rel_product(&self, f: Ref, g: Ref, vars: &VarSet) -> Ref {
        let mut cache = HashMap::new();
        let mut exists_cache = HashMap::new();
        self.rel_product_(f, g, vars, &mut cache, &mut exists_cache)
    }

    fn rel_product_(
        &self,
        f: Ref,
        g: Ref,
        vars: &VarSet,
        cache: &mut HashMap<(Ref, Ref), Ref>,
        exists_cache: &mut HashMap<Ref, Ref>,
    ) -> Ref {
        if self.is_zero(f) || self.is_zero(g) || f == -g {
            return self.zero;
        }
        if self.is_one(f) {
            return self.exists_(g, vars, exists_cache);
        }
        if self.is_one(g) || f == g {
            return self.exists_(f, vars, exists_cache);
        }

        let m = self.level(f).min(self.level(g));
        if m > vars.max() {
            return self.apply_and(f, g);
        }

        // The operation is commutative:
        let key = if f.raw() <= g.raw() { (f, g) } else { (g, f) };
        if let Some(&res) = cache.get(&key) {
            return res;
        }

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);

        let low = self.rel_product_(f0, g0, vars, cache, exists_cache);
        let res = if vars.contains(m) {
            if self.is_one(low) {
                self.one
            } else {
                let high = self.rel_product_(f1, g1, vars, cache, exists_cache);
                self.apply_or(low, high)
            }
        } else {
            let high = self.rel_product_(f1, g1, vars, cache, exists_cache);
            self.mk_node(m, low, high)
        };

        cache.insert(key, res);
        res
    }

    /// Substitute variables according to `mapping` (`old -> new`).
    ///
    /// The mapping must be injective on the support of `f`, and no new variable may
    /// collide with an unmapped variable of the support.
    pub fn rename(&self, f: Ref, mapping: &HashMap<u32, u32>) -> Ref {
        let mut cache = HashMap::new();
        self.rename_(f, mapping, &mut cache)
    }

    fn rename_(&self, f: Ref, mapping: &HashMap<u32, u32>, cache: &mut HashMap<Ref, Ref>) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        if f.is_negated() {
            return -self.rename_(-f, mapping, cache);
        }
        if let Some(&res) = cache.get(&f) {
            return res;
        }

        let v = self.level(f);
        let low = self.rename_(self.low_node(f), mapping, cache);
        let high = self.rename_(self.high_node(f), mapping, cache);
        let w = mapping.get(&v).copied().unwrap_or(v);
        let res = if w < self.level(low) && w < self.level(high) {
            self.mk_node(w, low, high)
        } else {
            self.apply_ite(self.mk_var(w), high, low)
        };

        cache.insert(f, res);
        res
    }

    /// Ids of all nodes reachable from `nodes`, including the terminal.
    pub fn descendants(&self, nodes: impl IntoIterator<Item = Ref>) -> HashSet<u32> {
        let mut visited = HashSet::new();
        visited.insert(self.one.id());
        let mut queue = VecDeque::from_iter(nodes);

        while let Some(node) = queue.pop_front() {
            let i = node.index();
            if visited.insert(node.id()) {
                queue.push_back(self.low(i));
                queue.push_back(self.high(i));
            }
        }

        visited
    }

    /// Number of nodes in `f`, including the terminal.
    pub fn size(&self, f: Ref) -> u64 {
        self.descendants([f]).len() as u64
    }

    /// Total time spent in garbage collection so far.
    pub fn gc_time(&self) -> Duration {
        self.gc_time.get()
    }

    pub fn gc_runs(&self) -> usize {
        self.gc_runs.get()
    }

    pub fn set_gc_threshold(&self, nodes: usize) {
        self.gc_threshold.set(nodes.max(1));
    }

    /// Collect garbage once the node table outgrows the threshold.
    ///
    /// `roots` must contain every [`Ref`] the caller is still going to use.
    pub fn maybe_collect_garbage(&self, roots: &[Ref]) -> bool {
        if self.num_nodes() < self.gc_threshold.get() {
            return false;
        }
        self.collect_garbage(roots);
        if self.num_nodes() * 2 > self.gc_threshold.get() {
            self.gc_threshold.set(self.gc_threshold.get() * 2);
            debug!("Raising GC threshold to {}", self.gc_threshold.get());
        }
        true
    }

    /// Drop every node not reachable from `roots` and clear the computed table.
    pub fn collect_garbage(&self, roots: &[Ref]) {
        let start = Instant::now();
        let before = self.num_nodes();

        self.cache.borrow_mut().clear();

        for &root in roots {
            if !self.is_terminal(root) {
                self.check(root);
            }
        }
        let alive = self.descendants(roots.iter().copied());

        let mut storage = self.storage.borrow_mut();
        let n = storage.num_buckets();
        for i in 0..n {
            let mut index = storage.bucket(i);

            // Drop dead nodes at the head of the chain.
            while index != 0 && !alive.contains(&(index as u32)) {
                let next = storage.next(index);
                storage.drop(index);
                #[cfg(debug_assertions)]
                self.retire(index);
                index = next;
            }
            storage.set_bucket(i, index);

            // Unlink dead nodes after each alive one.
            let mut prev = index;
            while prev != 0 {
                let mut cur = storage.next(prev);
                while cur != 0 && !alive.contains(&(cur as u32)) {
                    let next = storage.next(cur);
                    storage.drop(cur);
                    #[cfg(debug_assertions)]
                    self.retire(cur);
                    cur = next;
                }
                storage.set_next(prev, cur);
                prev = cur;
            }
        }
        let after = storage.real_size();
        drop(storage);

        let elapsed = start.elapsed();
        self.gc_time.set(self.gc_time.get() + elapsed);
        self.gc_runs.set(self.gc_runs.get() + 1);
        info!(
            "Garbage collection: {} -> {} nodes in {:.3}s",
            before,
            after,
            elapsed.as_secs_f64()
        );
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_var() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1);

        assert_eq!(bdd.variable(x.index()), 1);
        assert_eq!(bdd.high_node(x), bdd.one);
        assert_eq!(bdd.low_node(x), bdd.zero);

        let not_x = -x;
        assert_eq!(bdd.high_node(not_x), bdd.zero);
        assert_eq!(bdd.low_node(not_x), bdd.one);
    }

    #[test]
    fn test_terminal() {
        let bdd = Bdd::default();

        assert!(bdd.is_terminal(bdd.zero));
        assert!(bdd.is_zero(bdd.zero));
        assert!(!bdd.is_one(bdd.zero));

        assert!(bdd.is_terminal(bdd.one));
        assert!(bdd.is_one(bdd.one));
        assert_eq!(bdd.level(bdd.one), u32::MAX);
    }

    #[test]
    fn test_cube() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1);
        let x2 = bdd.mk_var(2);
        let x3 = bdd.mk_var(3);

        let f = bdd.apply_and(bdd.apply_and(x1, -x2), x3);
        assert_eq!(f, bdd.cube([3, 1, -2]));
    }

    #[test]
    fn test_de_morgan() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);

        let f = -bdd.apply_and(x, y);
        let g = bdd.apply_or(-x, -y);
        assert_eq!(f, g);
        assert_eq!(bdd.apply_xor(x, y), -bdd.apply_eq(x, y));
        assert_eq!(bdd.apply_diff(x, y), bdd.apply_and(x, -y));
    }

    #[test]
    fn test_and_or_many() {
        let bdd = Bdd::default();
        let vars: Vec<Ref> = (1..=5).map(|v| bdd.mk_var(v)).collect();

        let conj = bdd.apply_and_many(vars.iter().copied());
        assert_eq!(conj, bdd.cube([1, 2, 3, 4, 5]));

        let disj = bdd.apply_or_many(vars.iter().copied());
        assert_eq!(disj, -bdd.cube([-1, -2, -3, -4, -5]));

        assert_eq!(bdd.apply_and_many([]), bdd.one);
        assert_eq!(bdd.apply_or_many([]), bdd.zero);
    }

    #[test]
    fn test_exists() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1);
        let x2 = bdd.mk_var(2);
        let x3 = bdd.mk_var(3);

        // ∃x2. (x1 ∧ x2) ∨ (¬x2 ∧ x3) = x1 ∨ x3
        let f = bdd.apply_or(bdd.apply_and(x1, x2), bdd.apply_and(-x2, x3));
        let g = bdd.exists(f, &VarSet::new([2]));
        assert_eq!(g, bdd.apply_or(x1, x3));

        assert_eq!(bdd.exists(f, &VarSet::new([1, 2, 3])), bdd.one);
        assert_eq!(bdd.exists(bdd.zero, &VarSet::new([1])), bdd.zero);
        assert_eq!(bdd.exists(f, &VarSet::new([])), f);
    }

    #[test]
    fn test_rel_product_matches_exists_and() {
        let bdd = Bdd::default();

        let x: Vec<Ref> = (1..=6).map(|v| bdd.mk_var(v)).collect();
        // R(x1, x2) = x2 <-> ~x1, with x3..x6 as noise.
        let r = bdd.apply_and(bdd.apply_eq(x[1], -x[0]), bdd.apply_or(x[2], x[5]));
        let s = bdd.apply_and(x[0], bdd.apply_xor(x[3], x[4]));

        for vars in [vec![1], vec![1, 3], vec![2, 4, 6], vec![1, 2, 3, 4, 5, 6]] {
            let vars = VarSet::new(vars);
            let expected = bdd.exists(bdd.apply_and(r, s), &vars);
            assert_eq!(bdd.rel_product(r, s, &vars), expected);
        }
    }

    #[test]
    fn test_rename_swaps_blocks() {
        let bdd = Bdd::default();

        // f over odd variables, rename to even ones and back.
        let f = bdd.apply_or(bdd.cube([1, -3]), bdd.cube([-1, 5]));
        let forward: HashMap<u32, u32> = [(1, 2), (3, 4), (5, 6)].into_iter().collect();
        let backward: HashMap<u32, u32> = forward.iter().map(|(&a, &b)| (b, a)).collect();

        let g = bdd.rename(f, &forward);
        assert_eq!(g, bdd.apply_or(bdd.cube([2, -4]), bdd.cube([-2, 6])));
        assert_eq!(bdd.rename(g, &backward), f);
    }

    #[test]
    fn test_rename_reversing_order() {
        let bdd = Bdd::default();

        // x1 ∧ ¬x2 with 1 -> 4, 2 -> 3 must become x4 ∧ ¬x3.
        let f = bdd.cube([1, -2]);
        let mapping: HashMap<u32, u32> = [(1, 4), (2, 3)].into_iter().collect();
        assert_eq!(bdd.rename(f, &mapping), bdd.cube([4, -3]));
    }

    #[test]
    fn test_size() {
        let bdd = Bdd::default();

        let f = bdd.apply_xor(bdd.mk_var(2), bdd.mk_var(5));
        assert_eq!(bdd.size(f), 3);
        assert_eq!(bdd.size(bdd.one), 1);
    }

    #[test]
    fn test_garbage_collection_keeps_roots() {
        let bdd = Bdd::default();

        let x: Vec<Ref> = (1..=8).map(|v| bdd.mk_var(v)).collect();
        let keep = bdd.apply_xor(x[0], bdd.apply_and(x[3], x[7]));
        for i in 0..7 {
            let _ = bdd.apply_or(bdd.apply_xor(x[i], x[i + 1]), x[(i + 3) % 8]);
        }
        let before = bdd.num_nodes();

        bdd.collect_garbage(&[keep]);
        assert!(bdd.num_nodes() < before);
        assert_eq!(bdd.num_nodes() as u64, bdd.size(keep));

        // Rebuilding yields the same canonical node.
        let x: Vec<Ref> = (1..=8).map(|v| bdd.mk_var(v)).collect();
        let again = bdd.apply_xor(x[0], bdd.apply_and(x[3], x[7]));
        assert_eq!(again, keep);
        assert_eq!(bdd.gc_runs(), 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "Stale handle")]
    fn test_collected_handle_is_rejected() {
        let bdd = Bdd::default();
        let f = bdd.apply_and(bdd.mk_var(1), bdd.mk_var(2));
        bdd.collect_garbage(&[]);
        let g = bdd.apply_or(bdd.mk_var(3), bdd.mk_var(4));
        let _ = bdd.apply_and(f, g);
    }
}
