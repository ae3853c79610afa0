use mimedb_format::CacheHandle;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::instrument;

/// Upper bound on the number of ancestors collected for one type.
pub const MAX_ANCESTORS: usize = 1024;

/// Declared parents (sub-class-of) of every type in one layer.
#[derive(Debug, Clone, Default)]
pub struct ParentGraph {
    parents: HashMap<String, Vec<String>>,
}
impl ParentGraph {
    /// Build from `(child, parent)` edges. Parents keep their declaration
    /// order and duplicates are dropped.
    pub fn from_edges<C, P>(edges: impl IntoIterator<Item = (C, P)>) -> Self
    where
        C: Into<String>,
        P: Into<String>,
    {
        let mut graph = Self::default();
        for (child, parent) in edges {
            let (child, parent) = (child.into(), parent.into());
            let parents = graph.parents.entry(child).or_default();
            if !parents.contains(&parent) {
                parents.push(parent);
            }
        }
        graph
    }

    #[instrument(level = "debug", skip_all, fields(path = ?handle.path()))]
    pub fn from_cache(handle: &CacheHandle) -> Self {
        let edges = handle
            .parents()
            .valid()
            .flat_map(|record| record.parents.valid().map(move |parent| (record.mime, parent.0)));
        Self::from_edges(edges)
    }

    /// Declared parents of `mime`, or `None` if this layer says nothing
    /// about it.
    pub fn parents_of(&self, mime: &str) -> Option<&[String]> {
        self.parents.get(mime).map(Vec::as_slice)
    }

    /// Every type that appears as a child or a parent.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parents.iter().flat_map(|(child, parents)| std::iter::once(child).chain(parents)).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

/// Breadth-first transitive closure of `parents_of`, starting from (and
/// excluding) `mime`.
///
/// Each type is reported once, so cycles terminate; the walk also stops
/// after [`MAX_ANCESTORS`] types.
pub fn ancestors<F>(mime: &str, mut parents_of: F) -> Vec<String>
where
    F: FnMut(&str) -> Vec<String>,
{
    let mut seen = HashSet::from([mime.to_string()]);
    let mut queue = VecDeque::from([mime.to_string()]);
    let mut found = Vec::new();
    while let Some(current) = queue.pop_front() {
        for parent in parents_of(&current) {
            if found.len() >= MAX_ANCESTORS {
                tracing::warn!(mime, limit = MAX_ANCESTORS, "Type has too many ancestors; truncating");
                return found;
            }
            if seen.insert(parent.clone()) {
                found.push(parent.clone());
                queue.push_back(parent);
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimedb_format::writer::{CacheWriter, TypeDefinition};

    fn graph() -> ParentGraph {
        ParentGraph::from_edges([
            ("application/x-shellscript", "application/x-executable"),
            ("application/x-shellscript", "text/plain"),
            ("application/x-executable", "application/octet-stream"),
            ("text/plain", "application/octet-stream"),
            ("text/plain", "application/octet-stream"),
            ("x/a", "x/b"),
            ("x/b", "x/a"),
        ])
    }

    fn lookup(graph: &ParentGraph) -> impl FnMut(&str) -> Vec<String> + '_ {
        |mime| graph.parents_of(mime).map(<[String]>::to_vec).unwrap_or_default()
    }

    #[test]
    fn test_parents_keep_order_and_dedup() {
        let graph = graph();
        assert_eq!(
            graph.parents_of("application/x-shellscript").unwrap(),
            ["application/x-executable", "text/plain"]
        );
        assert_eq!(graph.parents_of("text/plain").unwrap(), ["application/octet-stream"]);
        assert!(graph.parents_of("image/png").is_none());
    }

    #[test]
    fn test_ancestors_breadth_first() {
        let graph = graph();
        let found = ancestors("application/x-shellscript", lookup(&graph));
        assert_eq!(found, ["application/x-executable", "text/plain", "application/octet-stream"]);
    }

    #[test]
    fn test_ancestors_cycle_terminates() {
        let graph = graph();
        assert_eq!(ancestors("x/a", lookup(&graph)), ["x/b"]);
    }

    #[test]
    fn test_ancestors_are_capped() {
        let found = ancestors("n/0", |mime| {
            let next: usize = mime[2..].parse().unwrap();
            vec![format!("n/{}", next + 1)]
        });
        assert_eq!(found.len(), MAX_ANCESTORS);
    }

    #[test]
    fn test_from_cache() {
        let bytes = CacheWriter::new()
            .with(
                TypeDefinition::new("application/x-shellscript")
                    .parent("application/x-executable")
                    .parent("text/plain"),
            )
            .to_bytes();
        let graph = ParentGraph::from_cache(&CacheHandle::from_bytes(bytes).unwrap());
        assert_eq!(
            graph.parents_of("application/x-shellscript").unwrap(),
            ["application/x-executable", "text/plain"]
        );
        assert!(graph.names().any(|name| name == "text/plain"));
    }
}
