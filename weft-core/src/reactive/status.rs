//! Introspection
//!
//! Relationship predicates and depth-bounded status dumps for every kind of
//! cell. A [`Status`] is plain data: `Display` renders it as indented text,
//! [`Status::to_json`] renders it for external tracing tools.

use std::fmt;

use indexmap::IndexSet;
use serde::Serialize;

use super::effect::Reaction;
use super::property::Property;
use super::runtime::{self, Runtime};
use super::track::{Trackable, Tracking, TrackingList};
use crate::graph::{with_graph, NodeId, Relation};

/// Graph-level view shared by all cells.
pub trait Introspect {
    fn node_id(&self) -> NodeId;

    /// Whether the node has an updater.
    fn is_bound(&self) -> bool {
        runtime::is_bound(self.node_id())
    }

    /// Whether `self` depends on `other`, explicitly or implicitly.
    fn is_dependent_on(&self, other: &(impl Introspect + ?Sized)) -> bool {
        let (node, target) = (self.node_id(), other.node_id());
        with_graph(|graph| graph.depends_on(node, target))
    }

    /// Whether `other` depends on `self`.
    fn is_dependency_of(&self, other: &(impl Introspect + ?Sized)) -> bool {
        let (node, dependent) = (self.node_id(), other.node_id());
        with_graph(|graph| graph.depends_on(dependent, node))
    }

    /// Whether `other` names `self` as an explicit dependency.
    fn is_explicit_dependency_of(&self, other: &(impl Introspect + ?Sized)) -> bool {
        let (node, dependent) = (self.node_id(), other.node_id());
        with_graph(|graph| graph.depends_explicitly_on(dependent, node))
    }

    /// Whether `other` read `self` during its last update.
    fn is_implicit_dependency_of(&self, other: &(impl Introspect + ?Sized)) -> bool {
        let (node, dependent) = (self.node_id(), other.node_id());
        with_graph(|graph| graph.depends_implicitly_on(dependent, node))
    }

    fn has_explicit_dependency(&self, other: &(impl Introspect + ?Sized)) -> bool {
        other.is_explicit_dependency_of(self)
    }

    fn has_implicit_dependency(&self, other: &(impl Introspect + ?Sized)) -> bool {
        other.is_implicit_dependency_of(self)
    }

    /// Number of explicit slots plus implicit dependencies.
    fn dependency_count(&self) -> usize {
        let node = self.node_id();
        with_graph(|graph| {
            graph
                .get(node)
                .map_or(0, |record| record.explicit_count() + record.implicit_count())
        })
    }

    /// Number of dependents. Tracking-list snapshots, including the one
    /// taken while a change propagates, are not counted.
    fn dependent_count(&self) -> usize {
        let node = self.node_id();
        with_graph(|graph| graph.visible_dependents(node).count())
    }

    /// Attach a debug name, shown in status dumps.
    fn set_name(&self, name: impl Into<String>) {
        let (node, name) = (self.node_id(), name.into());
        with_graph(|graph| {
            if let Some(record) = graph.get_mut(node) {
                record.set_name(Some(name));
            }
        });
    }

    fn name(&self) -> Option<String> {
        let node = self.node_id();
        with_graph(|graph| graph.get(node).and_then(|record| record.name().map(str::to_string)))
    }

    /// Dump the node and its relations, following them `depth` levels deep.
    fn status(&self, depth: usize) -> Status {
        Status::capture(self.node_id(), depth)
    }

    /// Print a status dump at the configured depth.
    fn print_status(&self) {
        println!("{}", self.status(Runtime::config().status_depth));
    }
}

impl<T: 'static> Introspect for Property<T> {
    fn node_id(&self) -> NodeId {
        self.id()
    }
}

impl Introspect for Reaction {
    fn node_id(&self) -> NodeId {
        self.id()
    }
}

impl<N: Trackable> Introspect for Tracking<N> {
    fn node_id(&self) -> NodeId {
        self.id()
    }
}

impl Introspect for TrackingList {
    fn node_id(&self) -> NodeId {
        self.id()
    }
}

/// Raw ids can outlive their node; with lifetime checks on, using a dead id
/// panics.
impl Introspect for NodeId {
    fn node_id(&self) -> NodeId {
        runtime::check_alive(*self);
        *self
    }
}

/// One relation in a status dump.
#[derive(Debug, Clone, Serialize)]
pub struct Link {
    /// `None` for an explicit slot whose node was destroyed.
    pub target: Option<NodeId>,
    pub required: bool,
    /// The target's own dump, when within depth and not already shown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Box<Status>>,
}

/// A depth-bounded dump of a node.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub node: NodeId,
    pub name: Option<String>,
    /// The value as rendered by the cell.
    pub value: String,
    pub bound: bool,
    pub explicit: Vec<Link>,
    pub implicit: Vec<Link>,
    pub dependents: Vec<Link>,
}

struct Snapshot {
    name: Option<String>,
    bound: bool,
    explicit: Vec<Relation>,
    implicit: Vec<Relation>,
    dependents: Vec<Relation>,
}

impl Status {
    /// Dump `node`. A destroyed node yields an empty, unbound dump, or a
    /// panic when lifetime checks are on.
    pub fn capture(node: NodeId, depth: usize) -> Self {
        runtime::check_alive(node);
        let mut visited = IndexSet::new();
        Self::visit(node, depth, &mut visited).unwrap_or_else(|| Self {
            node,
            name: None,
            value: "<destroyed>".to_string(),
            bound: false,
            explicit: Vec::new(),
            implicit: Vec::new(),
            dependents: Vec::new(),
        })
    }

    fn visit(node: NodeId, depth: usize, visited: &mut IndexSet<NodeId>) -> Option<Self> {
        visited.insert(node);
        let snapshot = with_graph(|graph| {
            graph.get(node).map(|record| Snapshot {
                name: record.name().map(str::to_string),
                bound: record.has_updater(),
                explicit: record.explicit_dependencies().to_vec(),
                implicit: record.implicit_dependencies().to_vec(),
                dependents: graph.visible_dependents(node).map(Relation::optional).collect(),
            })
        })?;
        // Describing calls into the cell, so the graph must not be borrowed.
        let value = runtime::resolve(node)
            .map(|cell| cell.describe())
            .unwrap_or_else(|| "<detached>".to_string());

        Some(Self {
            node,
            name: snapshot.name,
            value,
            bound: snapshot.bound,
            explicit: Self::links(&snapshot.explicit, depth, visited),
            implicit: Self::links(&snapshot.implicit, depth, visited),
            dependents: Self::links(&snapshot.dependents, depth, visited),
        })
    }

    fn links(relations: &[Relation], depth: usize, visited: &mut IndexSet<NodeId>) -> Vec<Link> {
        relations
            .iter()
            .map(|relation| {
                let status = match relation.target() {
                    Some(target) if depth > 0 && !visited.contains(&target) => {
                        Self::visit(target, depth - 1, visited).map(Box::new)
                    }
                    _ => None,
                };
                Link {
                    target: relation.target(),
                    required: relation.is_required(),
                    status,
                }
            })
            .collect()
    }

    /// Render as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        write!(f, "{pad}{}", self.node)?;
        if let Some(name) = &self.name {
            write!(f, " \"{name}\"")?;
        }
        write!(f, " = {}", self.value)?;
        if self.bound {
            write!(f, " [bound]")?;
        }
        writeln!(f)?;

        for (zone, links) in [
            ("explicit", &self.explicit),
            ("implicit", &self.implicit),
            ("dependents", &self.dependents),
        ] {
            if links.is_empty() {
                continue;
            }
            writeln!(f, "{pad}  {zone}:")?;
            for link in links {
                match link.target {
                    Some(target) => write!(f, "{pad}    {target}")?,
                    None => write!(f, "{pad}    null")?,
                }
                if link.required {
                    write!(f, " (required)")?;
                }
                writeln!(f)?;
                if let Some(status) = &link.status {
                    status.render(f, indent + 3)?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}
