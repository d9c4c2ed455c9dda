//! Graph algorithms over the bean collection.
//!
//! [`LinkGraph`] is a read-only view over the authoritative in-memory
//! collection. Derived indices (incoming links, blocking adjacency) are
//! rebuilt on every call instead of being cached, so results always reflect
//! the current beans.
//!
//! Two relationship graphs must stay acyclic:
//! - the parent graph (`child -> parent`)
//! - the blocking graph, the union of `blocking` edges and reversed
//!   `blocked_by` edges (`A blocks B` is the edge `A -> B` whichever side
//!   declared it)
//!
//! Dangling references ("broken links") are tolerated everywhere: traversals
//! treat them as absent and [`LinkGraph::check_all_links`] reports them.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::config::Config;
use crate::models::{Bean, LinkType};
use crate::{Error, Result};

/// A link pointing at a bean, seen from the target's side.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct IncomingLink<'a> {
    /// The bean declaring the link
    pub from: &'a Bean,
    pub link_type: LinkType,
}

/// Result of simulating a new edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleCheck {
    NoCycle,
    /// The cycle the edge would close; first and last IDs are equal
    CycleFound(Vec<String>),
}

impl CycleCheck {
    pub fn is_cycle(&self) -> bool {
        matches!(self, CycleCheck::CycleFound(_))
    }
}

/// A reference to a bean that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenLink {
    pub bean_id: String,
    pub link_type: LinkType,
    pub target: String,
}

/// A bean referencing itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelfLink {
    pub bean_id: String,
    pub link_type: LinkType,
}

/// A cycle found in one of the acyclic relationship graphs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleInfo {
    /// `Parent` for the hierarchy, `Blocking` for the blocking graph
    pub link_type: LinkType,
    /// Starts at the lexicographically smallest ID and ends where it started
    pub path: Vec<String>,
}

/// Output of a full integrity scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkCheckResult {
    pub broken_links: Vec<BrokenLink>,
    pub self_links: Vec<SelfLink>,
    pub cycles: Vec<CycleInfo>,
}

impl LinkCheckResult {
    pub fn has_issues(&self) -> bool {
        self.total_issues() > 0
    }

    pub fn total_issues(&self) -> usize {
        self.broken_links.len() + self.self_links.len() + self.cycles.len()
    }
}

/// Rotation-independent key for a cycle path.
///
/// `[a, b, c, a]`, `[b, c, a, b]` and `[c, a, b, c]` all map to `"a->b->c"`.
/// The closing element is dropped when it repeats the first one.
pub fn canonical_cycle_key(path: &[String]) -> String {
    rotate_cycle(path).join("->")
}

/// The open cycle (no closing element) rotated to start at its smallest node.
fn rotate_cycle(path: &[String]) -> Vec<String> {
    if path.len() <= 1 {
        return Vec::new();
    }
    let nodes = if path.first() == path.last() {
        &path[..path.len() - 1]
    } else {
        path
    };
    let start = nodes
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    nodes[start..]
        .iter()
        .chain(nodes[..start].iter())
        .cloned()
        .collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Read-only analysis over a bean collection.
pub struct LinkGraph<'a> {
    beans: &'a BTreeMap<String, Bean>,
    config: &'a Config,
}

impl<'a> LinkGraph<'a> {
    pub fn new(beans: &'a BTreeMap<String, Bean>, config: &'a Config) -> Self {
        Self { beans, config }
    }

    pub fn get(&self, id: &str) -> Option<&'a Bean> {
        self.beans.get(id)
    }

    fn is_resolved(&self, bean: &Bean) -> bool {
        self.config.is_resolved(&bean.status)
    }

    /// Every link pointing at `target`, in source ID order.
    ///
    /// A bean naming itself is reported like any other source, so callers
    /// see stray self-references that were written by hand. An unknown target
    /// yields an empty list.
    pub fn find_incoming_links(&self, target: &str) -> Vec<IncomingLink<'a>> {
        let mut incoming = Vec::new();
        for bean in self.beans.values() {
            for (link_type, to) in bean.links() {
                if to == target {
                    incoming.push(IncomingLink {
                        from: bean,
                        link_type,
                    });
                }
            }
        }
        incoming
    }

    /// Outgoing edges of the blocking graph, including reversed `blocked_by`.
    fn blocking_adjacency(&self) -> BTreeMap<&'a str, BTreeSet<&'a str>> {
        let mut adj: BTreeMap<&'a str, BTreeSet<&'a str>> = BTreeMap::new();
        for bean in self.beans.values() {
            for target in &bean.blocking {
                if *target != bean.id && self.beans.contains_key(target) {
                    adj.entry(bean.id.as_str()).or_default().insert(target.as_str());
                }
            }
            for blocker in &bean.blocked_by {
                if *blocker != bean.id {
                    if let Some((key, _)) = self.beans.get_key_value(blocker) {
                        adj.entry(key.as_str()).or_default().insert(bean.id.as_str());
                    }
                }
            }
        }
        adj
    }

    /// Outgoing edges of the parent graph (`child -> parent`).
    fn parent_adjacency(&self) -> BTreeMap<&'a str, BTreeSet<&'a str>> {
        let mut adj: BTreeMap<&'a str, BTreeSet<&'a str>> = BTreeMap::new();
        for bean in self.beans.values() {
            if let Some(parent) = bean.parent.as_deref() {
                if parent != bean.id {
                    if let Some((key, _)) = self.beans.get_key_value(parent) {
                        adj.entry(bean.id.as_str()).or_default().insert(key.as_str());
                    }
                }
            }
        }
        adj
    }

    /// Check whether adding the link `from --link_type--> to` would close a cycle.
    ///
    /// For `Parent` the new edge is `from -> to` (from's parent becomes to).
    /// For `Blocking` it is `from -> to`; for `BlockedBy` it is `to -> from`.
    /// Both are checked against the combined blocking graph. `Related` and
    /// `Duplicates` never form cycles, but a self-reference is reported for
    /// every link type.
    pub fn detect_cycle(&self, from: &str, link_type: LinkType, to: &str) -> CycleCheck {
        if from == to {
            return CycleCheck::CycleFound(vec![from.to_string(), to.to_string()]);
        }

        let (src, dst, adj) = match link_type {
            LinkType::Parent => (from, to, self.parent_adjacency()),
            LinkType::Blocking => (from, to, self.blocking_adjacency()),
            LinkType::BlockedBy => (to, from, self.blocking_adjacency()),
            LinkType::Related | LinkType::Duplicates => return CycleCheck::NoCycle,
        };

        match find_path(&adj, dst, src) {
            Some(path) => {
                let mut cycle = Vec::with_capacity(path.len() + 1);
                cycle.push(src.to_string());
                cycle.extend(path.into_iter().map(str::to_string));
                CycleCheck::CycleFound(cycle)
            }
            None => CycleCheck::NoCycle,
        }
    }

    /// Scan every bean for broken links, self-references and cycles.
    pub fn check_all_links(&self) -> LinkCheckResult {
        let mut result = LinkCheckResult::default();

        for bean in self.beans.values() {
            for (link_type, target) in bean.links() {
                if target == bean.id {
                    result.self_links.push(SelfLink {
                        bean_id: bean.id.clone(),
                        link_type,
                    });
                } else if !self.beans.contains_key(target) {
                    result.broken_links.push(BrokenLink {
                        bean_id: bean.id.clone(),
                        link_type,
                        target: target.to_string(),
                    });
                }
            }
        }

        for (link_type, adj) in [
            (LinkType::Parent, self.parent_adjacency()),
            (LinkType::Blocking, self.blocking_adjacency()),
        ] {
            let mut seen = HashSet::new();
            for path in find_cycles(&adj) {
                if seen.insert(canonical_cycle_key(&path)) {
                    let mut rotated = rotate_cycle(&path);
                    if let Some(first) = rotated.first().cloned() {
                        rotated.push(first);
                    }
                    result.cycles.push(CycleInfo {
                        link_type,
                        path: rotated,
                    });
                }
            }
        }

        result
    }

    /// Beans that directly block `id` and are not resolved.
    ///
    /// Blockers come from the bean's own `blocked_by` list and from other
    /// beans naming it in `blocking`, deduplicated. Missing beans do not block.
    pub fn active_blockers(&self, id: &str) -> Vec<&'a Bean> {
        let Some(bean) = self.beans.get(id) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut blockers = Vec::new();
        let declared = bean.blocked_by.iter().filter_map(|b| self.beans.get(b));
        let inverse = self
            .beans
            .values()
            .filter(|other| other.blocking.iter().any(|t| t == id));
        for blocker in declared.chain(inverse) {
            if blocker.id != id && !self.is_resolved(blocker) && seen.insert(blocker.id.as_str()) {
                blockers.push(blocker);
            }
        }
        blockers
    }

    /// True if the bean has at least one unresolved direct blocker.
    pub fn is_blocked(&self, id: &str) -> bool {
        !self.active_blockers(id).is_empty()
    }

    /// True if the bean or any of its ancestors is directly blocked.
    pub fn is_transitively_blocked(&self, id: &str) -> bool {
        self.is_blocked(id) || self.ancestors(id).iter().any(|a| self.is_blocked(&a.id))
    }

    /// Direct blockers followed by every ancestor's blockers, deduplicated.
    pub fn transitive_blockers(&self, id: &str) -> Vec<&'a Bean> {
        let mut seen = HashSet::new();
        let mut blockers = Vec::new();
        let ancestors = self.ancestors(id);
        let chain = std::iter::once(id).chain(ancestors.iter().map(|a| a.id.as_str()));
        for member in chain {
            for blocker in self.active_blockers(member) {
                if seen.insert(blocker.id.as_str()) {
                    blockers.push(blocker);
                }
            }
        }
        blockers
    }

    /// Parent chain from the direct parent up to the root.
    ///
    /// Stops at a broken link or when the chain loops back on itself.
    pub fn ancestors(&self, id: &str) -> Vec<&'a Bean> {
        let mut ancestors = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(id.to_string());

        let mut current = self.beans.get(id).and_then(|b| b.parent.as_deref());
        while let Some(parent_id) = current {
            if !visited.insert(parent_id.to_string()) {
                break;
            }
            let Some(parent) = self.beans.get(parent_id) else {
                break;
            };
            ancestors.push(parent);
            current = parent.parent.as_deref();
        }
        ancestors
    }

    /// Beans whose parent is `id`, in ID order.
    pub fn children(&self, id: &str) -> Vec<&'a Bean> {
        self.beans
            .values()
            .filter(|b| b.id != id && b.parent.as_deref() == Some(id))
            .collect()
    }

    /// Every bean below `id` in the hierarchy, breadth first.
    pub fn descendants(&self, id: &str) -> Vec<&'a Bean> {
        let mut children_of: HashMap<&str, Vec<&'a Bean>> = HashMap::new();
        for bean in self.beans.values() {
            if let Some(parent) = bean.parent.as_deref() {
                children_of.entry(parent).or_default().push(bean);
            }
        }

        let mut result = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(id);
        let mut queue = std::collections::VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for child in children_of.get(current).into_iter().flatten() {
                if visited.insert(child.id.as_str()) {
                    result.push(*child);
                    queue.push_back(child.id.as_str());
                }
            }
        }
        result
    }

    /// Check that `parent_id` is a legal parent for `bean`.
    ///
    /// A type missing from the hierarchy table may have any parent; a type
    /// mapped to an empty list may have none.
    pub fn validate_parent(&self, bean: &Bean, parent_id: &str) -> Result<()> {
        if parent_id == bean.id {
            return Err(Error::SelfLink {
                id: bean.id.clone(),
                link_type: LinkType::Parent,
            });
        }
        let parent = self
            .beans
            .get(parent_id)
            .ok_or_else(|| Error::NotFound(parent_id.to_string()))?;

        let Some(allowed) = self.config.allowed_parents(&bean.bean_type) else {
            return Ok(());
        };
        if allowed.is_empty() {
            return Err(Error::Validation(format!(
                "a {} cannot have a parent",
                bean.bean_type
            )));
        }
        if !allowed.iter().any(|t| *t == parent.bean_type) {
            return Err(Error::Validation(format!(
                "a {} can only have a parent of type {}, but {} is a {}",
                bean.bean_type,
                allowed.join(" or "),
                parent.id,
                parent.bean_type
            )));
        }
        Ok(())
    }
}

/// Depth-first search for a path from `start` to `goal`, both included.
fn find_path<'s>(
    adj: &BTreeMap<&'s str, BTreeSet<&'s str>>,
    start: &'s str,
    goal: &'s str,
) -> Option<Vec<&'s str>> {
    let mut came_from: HashMap<&str, &str> = HashMap::new();
    let mut visited = HashSet::new();
    let mut stack = vec![start];

    while let Some(current) = stack.pop() {
        if current == goal {
            let mut path = vec![current];
            let mut node = current;
            while let Some(&prev) = came_from.get(node) {
                path.push(prev);
                node = prev;
            }
            path.reverse();
            return Some(path);
        }
        if !visited.insert(current) {
            continue;
        }
        for &next in adj.get(current).into_iter().flatten().rev() {
            if !visited.contains(next) {
                came_from.entry(next).or_insert(current);
                stack.push(next);
            }
        }
    }
    None
}

/// Every cycle reachable by a coloured DFS, as closed paths.
fn find_cycles(adj: &BTreeMap<&str, BTreeSet<&str>>) -> Vec<Vec<String>> {
    fn visit<'s>(
        node: &'s str,
        adj: &BTreeMap<&'s str, BTreeSet<&'s str>>,
        color: &mut HashMap<&'s str, Color>,
        stack: &mut Vec<&'s str>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        color.insert(node, Color::Gray);
        stack.push(node);
        for &next in adj.get(node).into_iter().flatten() {
            match color.get(next).copied().unwrap_or(Color::White) {
                Color::White => visit(next, adj, color, stack, cycles),
                Color::Gray => {
                    if let Some(pos) = stack.iter().position(|n| *n == next) {
                        let mut cycle: Vec<String> =
                            stack[pos..].iter().map(|s| s.to_string()).collect();
                        cycle.push(next.to_string());
                        cycles.push(cycle);
                    }
                }
                Color::Black => {}
            }
        }
        stack.pop();
        color.insert(node, Color::Black);
    }

    let mut color = HashMap::new();
    let mut stack = Vec::new();
    let mut cycles = Vec::new();
    for &node in adj.keys() {
        if color.get(node).copied().unwrap_or(Color::White) == Color::White {
            visit(node, adj, &mut color, &mut stack, &mut cycles);
        }
    }
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bean(id: &str, bean_type: &str) -> Bean {
        let mut bean = Bean::new(id.to_string(), format!("Bean {}", id));
        bean.status = "todo".to_string();
        bean.bean_type = bean_type.to_string();
        bean
    }

    fn collection(beans: Vec<Bean>) -> BTreeMap<String, Bean> {
        beans.into_iter().map(|b| (b.id.clone(), b)).collect()
    }

    fn ids(beans: &[&Bean]) -> Vec<String> {
        beans.iter().map(|b| b.id.clone()).collect()
    }

    fn path(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_find_incoming_links() {
        let mut a = bean("a", "task");
        a.blocking = vec!["target".to_string()];
        let mut b = bean("b", "task");
        b.blocking = vec!["target".to_string()];
        let mut c = bean("c", "task");
        c.related = vec!["other".to_string()];
        let beans = collection(vec![a, b, c, bean("target", "task")]);
        let config = Config::default();
        let graph = LinkGraph::new(&beans, &config);

        let incoming = graph.find_incoming_links("target");
        assert_eq!(incoming.len(), 2);
        assert_eq!(incoming[0].from.id, "a");
        assert_eq!(incoming[1].from.id, "b");
        assert!(incoming.iter().all(|l| l.link_type == LinkType::Blocking));

        assert!(graph.find_incoming_links("a").is_empty());
        assert!(graph.find_incoming_links("missing").is_empty());
    }

    #[test]
    fn test_incoming_links_include_self_and_count_each_relation() {
        let mut a = bean("a", "task");
        a.related = vec!["a".to_string(), "t".to_string()];
        a.parent = Some("t".to_string());
        let beans = collection(vec![a, bean("t", "epic")]);
        let config = Config::default();
        let graph = LinkGraph::new(&beans, &config);

        let types: Vec<_> = graph
            .find_incoming_links("t")
            .iter()
            .map(|l| l.link_type)
            .collect();
        assert_eq!(types, vec![LinkType::Parent, LinkType::Related]);

        let own = graph.find_incoming_links("a");
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].from.id, "a");
        assert_eq!(own[0].link_type, LinkType::Related);
    }

    #[test]
    fn test_detect_cycle_blocking_chain() {
        let mut a = bean("a", "task");
        a.blocking = vec!["b".to_string()];
        let mut b = bean("b", "task");
        b.blocking = vec!["c".to_string()];
        let beans = collection(vec![a, b, bean("c", "task"), bean("d", "task")]);
        let config = Config::default();
        let graph = LinkGraph::new(&beans, &config);

        assert_eq!(
            graph.detect_cycle("c", LinkType::Blocking, "a"),
            CycleCheck::CycleFound(path(&["c", "a", "b", "c"]))
        );
        assert_eq!(graph.detect_cycle("d", LinkType::Blocking, "a"), CycleCheck::NoCycle);
        assert_eq!(graph.detect_cycle("a", LinkType::Blocking, "c"), CycleCheck::NoCycle);
    }

    #[test]
    fn test_detect_cycle_checks_blocked_by_side() {
        // b declares it is blocked by a: a -> b in the blocking graph
        let mut b = bean("b", "task");
        b.blocked_by = vec!["a".to_string()];
        let beans = collection(vec![bean("a", "task"), b]);
        let config = Config::default();
        let graph = LinkGraph::new(&beans, &config);

        assert!(graph.detect_cycle("b", LinkType::Blocking, "a").is_cycle());
        assert!(graph.detect_cycle("a", LinkType::BlockedBy, "b").is_cycle());
        assert!(!graph.detect_cycle("b", LinkType::BlockedBy, "a").is_cycle());
        assert!(!graph.detect_cycle("a", LinkType::Blocking, "b").is_cycle());
    }

    #[test]
    fn test_detect_cycle_parent_chain() {
        let a = bean("a", "milestone");
        let mut b = bean("b", "epic");
        b.parent = Some("a".to_string());
        let mut c = bean("c", "task");
        c.parent = Some("b".to_string());
        let beans = collection(vec![a, b, c]);
        let config = Config::default();
        let graph = LinkGraph::new(&beans, &config);

        // Making c the parent of a closes a -> c -> b -> a
        let CycleCheck::CycleFound(cycle) = graph.detect_cycle("a", LinkType::Parent, "c") else {
            panic!("expected a parent cycle");
        };
        assert_eq!(cycle, path(&["a", "c", "b", "a"]));
        assert!(cycle.len() >= 3);

        assert_eq!(graph.detect_cycle("c", LinkType::Parent, "a"), CycleCheck::NoCycle);
    }

    #[test]
    fn test_detect_cycle_rejects_self_for_every_type() {
        let beans = collection(vec![bean("a", "task")]);
        let config = Config::default();
        let graph = LinkGraph::new(&beans, &config);
        for lt in LinkType::all() {
            assert_eq!(
                graph.detect_cycle("a", *lt, "a"),
                CycleCheck::CycleFound(path(&["a", "a"]))
            );
        }
        assert_eq!(graph.detect_cycle("a", LinkType::Related, "b"), CycleCheck::NoCycle);
    }

    #[test]
    fn test_detect_cycle_deep_and_wide() {
        // Five levels of five beans, each level blocking every bean of the next.
        let mut beans = Vec::new();
        for level in 0..5 {
            for i in 0..5 {
                let mut b = bean(&format!("n{}{}", level, i), "task");
                if level < 4 {
                    b.blocking = (0..5).map(|j| format!("n{}{}", level + 1, j)).collect();
                }
                beans.push(b);
            }
        }
        let beans = collection(beans);
        let config = Config::default();
        let graph = LinkGraph::new(&beans, &config);

        for i in 0..5 {
            for j in 0..5 {
                let bottom = format!("n4{}", i);
                let top = format!("n0{}", j);
                assert!(graph.detect_cycle(&bottom, LinkType::Blocking, &top).is_cycle());
                assert!(graph.detect_cycle(&top, LinkType::BlockedBy, &bottom).is_cycle());
                assert!(!graph.detect_cycle(&top, LinkType::Blocking, &bottom).is_cycle());
            }
        }
    }

    #[test]
    fn test_canonical_cycle_key() {
        let key = canonical_cycle_key(&path(&["a", "b", "c", "a"]));
        assert_eq!(key, "a->b->c");
        assert_eq!(canonical_cycle_key(&path(&["b", "c", "a", "b"])), key);
        assert_eq!(canonical_cycle_key(&path(&["c", "a", "b", "c"])), key);
        assert_eq!(canonical_cycle_key(&path(&["x", "y", "x"])), "x->y");
        assert_eq!(canonical_cycle_key(&path(&["x"])), "");
        assert_eq!(canonical_cycle_key(&[]), "");
    }

    #[test]
    fn test_check_all_links() {
        let mut a = bean("aaa1", "task");
        a.blocking = vec!["bbb2".to_string(), "aaa1".to_string()];
        a.parent = Some("nonexistent".to_string());
        let mut b = bean("bbb2", "task");
        b.blocking = vec!["aaa1".to_string()];
        let beans = collection(vec![a, b]);
        let config = Config::default();
        let graph = LinkGraph::new(&beans, &config);

        let result = graph.check_all_links();
        assert_eq!(
            result.broken_links,
            vec![BrokenLink {
                bean_id: "aaa1".to_string(),
                link_type: LinkType::Parent,
                target: "nonexistent".to_string(),
            }]
        );
        assert_eq!(
            result.self_links,
            vec![SelfLink {
                bean_id: "aaa1".to_string(),
                link_type: LinkType::Blocking,
            }]
        );
        assert_eq!(result.cycles.len(), 1);
        assert_eq!(result.cycles[0].link_type, LinkType::Blocking);
        assert_eq!(result.cycles[0].path, path(&["aaa1", "bbb2", "aaa1"]));
        assert!(result.has_issues());
        assert_eq!(result.total_issues(), 3);
    }

    #[test]
    fn test_check_all_links_reports_rotations_once() {
        // Same three-cycle declared from both sides
        let mut a = bean("a", "task");
        a.blocking = vec!["b".to_string()];
        let mut b = bean("b", "task");
        b.blocking = vec!["c".to_string()];
        let mut c = bean("c", "task");
        c.blocking = vec!["a".to_string()];
        c.blocked_by = vec!["b".to_string()];
        let mut x = bean("x", "task");
        x.parent = Some("y".to_string());
        let mut y = bean("y", "task");
        y.parent = Some("x".to_string());
        let beans = collection(vec![a, b, c, x, y]);
        let config = Config::default();
        let graph = LinkGraph::new(&beans, &config);

        let result = graph.check_all_links();
        assert!(result.broken_links.is_empty());
        assert_eq!(
            result.cycles,
            vec![
                CycleInfo {
                    link_type: LinkType::Parent,
                    path: path(&["x", "y", "x"]),
                },
                CycleInfo {
                    link_type: LinkType::Blocking,
                    path: path(&["a", "b", "c", "a"]),
                },
            ]
        );
    }

    #[test]
    fn test_check_all_links_clean() {
        let mut a = bean("a", "task");
        a.blocking = vec!["b".to_string()];
        let beans = collection(vec![a, bean("b", "task")]);
        let config = Config::default();
        let result = LinkGraph::new(&beans, &config).check_all_links();
        assert!(!result.has_issues());
        assert_eq!(result.total_issues(), 0);
    }

    #[test]
    fn test_is_blocked_both_directions_and_resolution() {
        let mut a = bean("a", "task");
        a.blocking = vec!["c".to_string()];
        let b = bean("b", "task");
        let mut c = bean("c", "task");
        c.blocked_by = vec!["b".to_string(), "a".to_string(), "ghost".to_string()];
        let mut beans = collection(vec![a, b, c]);
        let config = Config::default();

        {
            let graph = LinkGraph::new(&beans, &config);
            assert!(graph.is_blocked("c"));
            assert_eq!(ids(&graph.active_blockers("c")), vec!["b", "a"]);
            assert!(!graph.is_blocked("a"));
            assert!(!graph.is_blocked("missing"));
        }

        beans.get_mut("a").unwrap().status = "completed".to_string();
        beans.get_mut("b").unwrap().status = "scrapped".to_string();
        let graph = LinkGraph::new(&beans, &config);
        assert!(!graph.is_blocked("c"));
        assert!(graph.active_blockers("c").is_empty());
    }

    #[test]
    fn test_broken_blocker_fails_open() {
        let mut a = bean("a", "task");
        a.blocked_by = vec!["ghost".to_string()];
        a.parent = Some("ghost-parent".to_string());
        let beans = collection(vec![a]);
        let config = Config::default();
        let graph = LinkGraph::new(&beans, &config);
        assert!(!graph.is_blocked("a"));
        assert!(!graph.is_transitively_blocked("a"));
        assert!(graph.ancestors("a").is_empty());
    }

    #[test]
    fn test_direct_versus_transitive_blocking() {
        let mut epic_a = bean("epic-a", "epic");
        epic_a.blocking = vec!["epic-b".to_string()];
        let epic_b = bean("epic-b", "epic");
        let mut feature = bean("feature-x", "feature");
        feature.parent = Some("epic-b".to_string());
        let mut beans = collection(vec![epic_a, epic_b, feature]);
        let config = Config::default();

        {
            let graph = LinkGraph::new(&beans, &config);
            assert!(!graph.is_blocked("feature-x"));
            assert!(graph.is_transitively_blocked("feature-x"));
            assert_eq!(ids(&graph.transitive_blockers("feature-x")), vec!["epic-a"]);
        }

        beans.get_mut("epic-a").unwrap().status = "completed".to_string();
        let graph = LinkGraph::new(&beans, &config);
        assert!(!graph.is_blocked("feature-x"));
        assert!(!graph.is_transitively_blocked("feature-x"));
        assert!(graph.transitive_blockers("feature-x").is_empty());
    }

    #[test]
    fn test_transitive_blockers_deduplicate_across_levels() {
        let mut blocker = bean("blk", "task");
        blocker.blocking = vec!["epic".to_string(), "leaf".to_string()];
        let other = bean("other", "task");
        let mut milestone = bean("ms", "milestone");
        milestone.blocked_by = vec!["other".to_string()];
        let mut epic = bean("epic", "epic");
        epic.parent = Some("ms".to_string());
        let mut leaf = bean("leaf", "task");
        leaf.parent = Some("epic".to_string());
        let beans = collection(vec![blocker, other, milestone, epic, leaf]);
        let config = Config::default();
        let graph = LinkGraph::new(&beans, &config);

        assert_eq!(ids(&graph.transitive_blockers("leaf")), vec!["blk", "other"]);
    }

    #[test]
    fn test_ancestors_survive_parent_cycle() {
        let mut x = bean("x", "task");
        x.parent = Some("y".to_string());
        let mut y = bean("y", "task");
        y.parent = Some("x".to_string());
        let beans = collection(vec![x, y]);
        let config = Config::default();
        let graph = LinkGraph::new(&beans, &config);
        assert_eq!(ids(&graph.ancestors("x")), vec!["y"]);
        assert_eq!(ids(&graph.descendants("x")), vec!["y"]);
        assert!(!graph.is_transitively_blocked("x"));
    }

    #[test]
    fn test_children_and_descendants() {
        let ms = bean("ms", "milestone");
        let mut e1 = bean("e1", "epic");
        e1.parent = Some("ms".to_string());
        let mut e2 = bean("e2", "epic");
        e2.parent = Some("ms".to_string());
        let mut t1 = bean("t1", "task");
        t1.parent = Some("e1".to_string());
        let beans = collection(vec![ms, e1, e2, t1]);
        let config = Config::default();
        let graph = LinkGraph::new(&beans, &config);

        assert_eq!(ids(&graph.children("ms")), vec!["e1", "e2"]);
        assert_eq!(ids(&graph.descendants("ms")), vec!["e1", "e2", "t1"]);
        assert!(graph.children("t1").is_empty());
    }

    #[test]
    fn test_validate_parent() {
        let beans = collection(vec![
            bean("ms", "milestone"),
            bean("ep", "epic"),
            bean("tk", "task"),
            bean("odd", "chore"),
        ]);
        let config = Config::default();
        let graph = LinkGraph::new(&beans, &config);

        assert!(graph.validate_parent(&beans["tk"], "ep").is_ok());
        assert!(graph.validate_parent(&beans["tk"], "ms").is_ok());
        assert!(graph.validate_parent(&beans["ep"], "ms").is_ok());
        assert!(matches!(
            graph.validate_parent(&beans["ep"], "tk"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            graph.validate_parent(&beans["ms"], "ep"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            graph.validate_parent(&beans["tk"], "tk"),
            Err(Error::SelfLink { .. })
        ));
        assert!(matches!(
            graph.validate_parent(&beans["tk"], "nope"),
            Err(Error::NotFound(_))
        ));
        // Types outside the hierarchy table are unrestricted
        assert!(graph.validate_parent(&beans["odd"], "tk").is_ok());
    }
}
