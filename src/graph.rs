//! Dependency graph construction from resolver output.
//!
//! Nodes live in a flat map keyed by [`PackageIdentifier`]; edges are identifier
//! lists, so cycles need no special representation. Construction tolerates
//! duplicate edges, cycles and malformed records; the latter are skipped and
//! recorded as [`GraphWarning`]s.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::models::{Package, PackageIdentifier, Relation};

/// One side of a resolver edge, exactly as the resolver reported it.
///
/// Deserializes from either a `"name@version"` string or a `{name, version}` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawRefRepr")]
pub struct RawPackageRef {
    pub name: Option<String>,
    pub version: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRefRepr {
    Key(String),
    Parts {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },
}

impl From<RawRefRepr> for RawPackageRef {
    fn from(repr: RawRefRepr) -> Self {
        match repr {
            RawRefRepr::Key(key) => match key.rsplit_once('@') {
                Some((name, version)) => RawPackageRef::new(name, version),
                None => RawPackageRef {
                    name: Some(key),
                    version: None,
                },
            },
            RawRefRepr::Parts { name, version } => RawPackageRef { name, version },
        }
    }
}

impl RawPackageRef {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            version: Some(version.to_string()),
        }
    }

    pub fn identifier(&self) -> Option<PackageIdentifier> {
        PackageIdentifier::new(self.name.as_deref()?, self.version.as_deref()?)
    }

    pub fn describe(&self) -> String {
        format!(
            "{}@{}",
            self.name.as_deref().unwrap_or("<missing name>"),
            self.version.as_deref().unwrap_or("<missing version>")
        )
    }
}

/// A `(parent, child)` dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawEdge {
    pub parent: RawPackageRef,
    pub child: RawPackageRef,
}

impl RawEdge {
    pub fn new(parent: RawPackageRef, child: RawPackageRef) -> Self {
        Self { parent, child }
    }
}

/// Nested resolver output: a package and the packages it pulls in.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResolvedNode {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<ResolvedNode>,
}

impl ResolvedNode {
    fn raw_ref(&self) -> RawPackageRef {
        RawPackageRef {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }
}

/// Flatten a nested resolver tree into its roots and `(parent, child)` edges.
pub fn flatten_tree(tree: &[ResolvedNode]) -> (Vec<RawPackageRef>, Vec<RawEdge>) {
    fn walk(node: &ResolvedNode, edges: &mut Vec<RawEdge>) {
        let parent = node.raw_ref();
        for child in &node.dependencies {
            edges.push(RawEdge::new(parent.clone(), child.raw_ref()));
            walk(child, edges);
        }
    }

    let roots = tree.iter().map(ResolvedNode::raw_ref).collect();
    let mut edges = Vec::new();
    for node in tree {
        walk(node, &mut edges);
    }
    (roots, edges)
}

/// Recoverable problems met while building the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphWarning {
    MalformedRoot { record: String },
    MalformedEdge { parent: String, child: String },
    OrphanEdge { parent: String, child: String },
}

impl fmt::Display for GraphWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphWarning::MalformedRoot { record } => {
                write!(f, "skipped root with missing name or version: {record}")
            }
            GraphWarning::MalformedEdge { parent, child } => {
                write!(f, "skipped edge with missing name or version: {parent} -> {child}")
            }
            GraphWarning::OrphanEdge { parent, child } => {
                write!(f, "dropped edge not reachable from any root: {parent} -> {child}")
            }
        }
    }
}

/// Direct and transitive dependencies as seen from one root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootView {
    pub root: PackageIdentifier,
    pub direct: BTreeSet<PackageIdentifier>,
    pub transitive: BTreeSet<PackageIdentifier>,
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    roots: Vec<PackageIdentifier>,
    order: Vec<PackageIdentifier>,
    nodes: HashMap<PackageIdentifier, Package>,
    root_views: Vec<RootView>,
    warnings: Vec<GraphWarning>,
}

impl DependencyGraph {
    /// Roots in the order the input listed them.
    pub fn roots(&self) -> &[PackageIdentifier] {
        &self.roots
    }

    /// Every node identifier, roots first, then in discovery order.
    pub fn discovery_order(&self) -> &[PackageIdentifier] {
        &self.order
    }

    pub fn package(&self, id: &PackageIdentifier) -> Option<&Package> {
        self.nodes.get(id)
    }

    pub fn package_mut(&mut self, id: &PackageIdentifier) -> Option<&mut Package> {
        self.nodes.get_mut(id)
    }

    /// Packages in discovery order.
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn packages_mut(&mut self) -> impl Iterator<Item = &mut Package> {
        self.nodes.values_mut()
    }

    pub fn root_views(&self) -> &[RootView] {
        &self.root_views
    }

    pub fn warnings(&self) -> &[GraphWarning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// A root is a root; otherwise a package is direct if any root depends on it
    /// directly, and transitive if it is only reachable further down.
    pub fn relation(&self, id: &PackageIdentifier) -> Option<Relation> {
        if !self.nodes.contains_key(id) {
            return None;
        }
        if self.roots.contains(id) {
            return Some(Relation::Root);
        }
        if self.root_views.iter().any(|v| v.direct.contains(id)) {
            Some(Relation::Direct)
        } else {
            Some(Relation::Transitive)
        }
    }
}

/// Build a deduplicated graph from resolver edges and the ordered root list.
///
/// The first record seen for an identifier wins (its spelling becomes the
/// display name). With an empty root list, packages nobody depends on become
/// roots, in first-seen order.
pub fn build(raw_edges: &[RawEdge], roots: &[RawPackageRef]) -> DependencyGraph {
    let mut warnings = Vec::new();
    let mut names: HashMap<PackageIdentifier, String> = HashMap::new();
    let mut seen_order: Vec<PackageIdentifier> = Vec::new();
    let mut adjacency: HashMap<PackageIdentifier, Vec<PackageIdentifier>> = HashMap::new();

    let mut remember = |id: &PackageIdentifier, raw: &RawPackageRef| {
        if !names.contains_key(id) {
            let display = raw.name.as_deref().map(str::trim).unwrap_or(id.name());
            names.insert(id.clone(), display.to_string());
            seen_order.push(id.clone());
        }
    };

    let mut root_ids: Vec<PackageIdentifier> = Vec::new();
    for raw in roots {
        let Some(id) = raw.identifier() else {
            let warning = GraphWarning::MalformedRoot {
                record: raw.describe(),
            };
            warn!("{warning}");
            warnings.push(warning);
            continue;
        };
        remember(&id, raw);
        if !root_ids.contains(&id) {
            root_ids.push(id);
        }
    }

    for edge in raw_edges {
        let (Some(parent), Some(child)) = (edge.parent.identifier(), edge.child.identifier())
        else {
            let warning = GraphWarning::MalformedEdge {
                parent: edge.parent.describe(),
                child: edge.child.describe(),
            };
            warn!("{warning}");
            warnings.push(warning);
            continue;
        };
        remember(&parent, &edge.parent);
        remember(&child, &edge.child);
        if parent == child {
            debug!(package = %parent, "ignoring self-dependency");
            continue;
        }
        let children = adjacency.entry(parent).or_default();
        if !children.contains(&child) {
            children.push(child);
        }
    }

    if root_ids.is_empty() {
        let depended_on: HashSet<&PackageIdentifier> = adjacency.values().flatten().collect();
        root_ids = seen_order
            .iter()
            .filter(|id| !depended_on.contains(id))
            .cloned()
            .collect();
        info!(count = root_ids.len(), "no roots supplied; inferred roots from edges");
    }

    // Breadth-first discovery from the roots
    let mut order: Vec<PackageIdentifier> = Vec::new();
    let mut visited: HashSet<PackageIdentifier> = HashSet::new();
    let mut queue: VecDeque<PackageIdentifier> = VecDeque::new();
    for id in &root_ids {
        if visited.insert(id.clone()) {
            order.push(id.clone());
            queue.push_back(id.clone());
        }
    }
    while let Some(id) = queue.pop_front() {
        for child in adjacency.get(&id).into_iter().flatten() {
            if visited.insert(child.clone()) {
                order.push(child.clone());
                queue.push_back(child.clone());
            }
        }
    }

    for parent in &seen_order {
        if visited.contains(parent) {
            continue;
        }
        for child in adjacency.get(parent).into_iter().flatten() {
            let warning = GraphWarning::OrphanEdge {
                parent: parent.key(),
                child: child.key(),
            };
            warn!("{warning}");
            warnings.push(warning);
        }
    }

    let mut nodes: HashMap<PackageIdentifier, Package> = HashMap::with_capacity(order.len());
    for id in &order {
        let display = names.get(id).cloned().unwrap_or_else(|| id.name().to_string());
        let mut package = Package::new(id.clone(), display);
        package.direct_dependencies = adjacency
            .get(id)
            .map(|children| children.iter().cloned().collect())
            .unwrap_or_default();
        package.transitive_dependencies = transitive_closure(id, &adjacency);
        nodes.insert(id.clone(), package);
    }

    let root_views = root_ids
        .iter()
        .filter_map(|root| nodes.get(root))
        .map(|pkg| RootView {
            root: pkg.id.clone(),
            direct: pkg.direct_dependencies.clone(),
            transitive: pkg.transitive_dependencies.clone(),
        })
        .collect();

    debug!(
        nodes = nodes.len(),
        roots = root_ids.len(),
        warnings = warnings.len(),
        "dependency graph built"
    );

    DependencyGraph {
        roots: root_ids,
        order,
        nodes,
        root_views,
        warnings,
    }
}

/// Everything reachable from `start` beyond its direct children, excluding
/// the children themselves and `start`.
fn transitive_closure(
    start: &PackageIdentifier,
    adjacency: &HashMap<PackageIdentifier, Vec<PackageIdentifier>>,
) -> BTreeSet<PackageIdentifier> {
    let direct: &[PackageIdentifier] = adjacency.get(start).map(Vec::as_slice).unwrap_or(&[]);
    let mut seen: HashSet<&PackageIdentifier> = direct.iter().collect();
    seen.insert(start);
    let mut stack: Vec<&PackageIdentifier> = direct.iter().collect();
    let mut found = BTreeSet::new();

    while let Some(id) = stack.pop() {
        for child in adjacency.get(id).into_iter().flatten() {
            if seen.insert(child) {
                found.insert(child.clone());
                stack.push(child);
            }
        }
    }
    found
}
