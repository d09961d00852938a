use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::approval::rules::{judge, Subject};
use crate::enrich::Findings;
use crate::error::{CoreError, Result};
use crate::graph::DependencyGraph;
use crate::models::{ApprovalVerdict, PackageIdentifier};

pub type Verdicts = HashMap<PackageIdentifier, ApprovalVerdict>;

/// Evaluate every package, dependencies before their dependents.
///
/// Packages on a dependency cycle are evaluated together: rejection never
/// travels along an edge inside the cycle, only in from outside it.
pub fn evaluate(graph: &DependencyGraph, findings: &Findings) -> Result<Verdicts> {
    let order = graph.discovery_order();
    let position: HashMap<&PackageIdentifier, usize> =
        order.iter().enumerate().map(|(i, id)| (id, i)).collect();

    let adjacency: Vec<Vec<usize>> = order
        .iter()
        .map(|id| {
            graph
                .package(id)
                .map(|pkg| {
                    pkg.direct_dependencies
                        .iter()
                        .filter_map(|dep| position.get(dep).copied())
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect();

    let mut verdicts = Verdicts::with_capacity(order.len());

    for component in strongly_connected(&adjacency) {
        if component.len() > 1 {
            let members: Vec<String> = component.iter().map(|&i| order[i].key()).collect();
            info!(members = %members.join(", "), "dependency cycle evaluated without propagation");
        }
        let in_component: HashSet<usize> = component.iter().copied().collect();

        for &index in &component {
            let id = &order[index];
            let Some(package) = graph.package(id) else {
                continue;
            };

            let mut rejected_dependencies = Vec::new();
            for &dep in adjacency[index].iter().filter(|d| !in_component.contains(d)) {
                let dep_id = &order[dep];
                let verdict = verdicts
                    .get(dep_id)
                    .ok_or_else(|| CoreError::MissingVerdict(dep_id.key()))?;
                if verdict.is_rejected() {
                    let name = graph
                        .package(dep_id)
                        .map_or_else(|| dep_id.name().to_string(), |p| p.display_name.clone());
                    rejected_dependencies.push(name);
                }
            }

            let verdict = judge(&Subject {
                package,
                findings: findings.get(id).map(Vec::as_slice).unwrap_or_default(),
                rejected_dependencies: &rejected_dependencies,
            });
            debug!(package = %id, status = %verdict.status(), "verdict");
            verdicts.insert(id.clone(), verdict);
        }
    }

    Ok(verdicts)
}

/// Tarjan's strongly connected components, iterative. Components come out
/// with everything they depend on already emitted.
fn strongly_connected(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;

    let n = adjacency.len();
    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut stack = Vec::new();
    let mut components = Vec::new();
    let mut next_index = 0;

    for start in 0..n {
        if index[start] != UNVISITED {
            continue;
        }
        // (node, next edge to follow)
        let mut work: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(&(node, edge)) = work.last() {
            if index[node] == UNVISITED {
                index[node] = next_index;
                lowlink[node] = next_index;
                next_index += 1;
                stack.push(node);
                on_stack[node] = true;
            }

            if let Some(&next) = adjacency[node].get(edge) {
                if let Some(frame) = work.last_mut() {
                    frame.1 += 1;
                }
                if index[next] == UNVISITED {
                    work.push((next, 0));
                } else if on_stack[next] {
                    lowlink[node] = lowlink[node].min(index[next]);
                }
                continue;
            }

            work.pop();
            if let Some(&(parent, _)) = work.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[node]);
            }

            if lowlink[node] == index[node] {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                component.reverse();
                components.push(component);
            }
        }
    }

    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build, RawEdge, RawPackageRef};
    use crate::models::{ApprovalStatus, Severity, VulnerabilityFinding};

    fn r(key: &str) -> RawPackageRef {
        let (name, version) = key.rsplit_once('@').unwrap();
        RawPackageRef::new(name, version)
    }

    fn e(parent: &str, child: &str) -> RawEdge {
        RawEdge::new(r(parent), r(child))
    }

    fn id(key: &str) -> PackageIdentifier {
        PackageIdentifier::parse(key).unwrap()
    }

    fn vulnerable(key: &str) -> Findings {
        let mut findings = Findings::new();
        findings.insert(
            id(key),
            vec![VulnerabilityFinding {
                affected: id(key),
                severity: Severity::High,
                count: 1,
            }],
        );
        findings
    }

    #[test]
    fn test_rejection_travels_one_hop_at_a_time() {
        // c -> b -> a, a is vulnerable
        let graph = build(&[e("c@1", "b@1"), e("b@1", "a@1")], &[r("c@1")]);
        let verdicts = evaluate(&graph, &vulnerable("a@1")).unwrap();

        assert!(verdicts[&id("a@1")].is_rejected());
        assert_eq!(
            verdicts[&id("b@1")].reasons(),
            &["rejected direct dependencies: a".to_string()]
        );
        assert_eq!(
            verdicts[&id("c@1")].reasons(),
            &["rejected direct dependencies: b".to_string()]
        );
    }

    #[test]
    fn test_cycle_members_do_not_reject_each_other() {
        // root -> x <-> y, y is vulnerable
        let graph = build(
            &[e("root@1", "x@1"), e("x@1", "y@1"), e("y@1", "x@1")],
            &[r("root@1")],
        );
        let verdicts = evaluate(&graph, &vulnerable("y@1")).unwrap();

        assert!(verdicts[&id("y@1")].is_rejected());
        assert!(!verdicts[&id("x@1")].is_rejected());
        assert!(!verdicts[&id("root@1")].is_rejected());
    }

    #[test]
    fn test_rejection_enters_cycle_from_outside() {
        // root -> x <-> y -> leaf, leaf is vulnerable
        let graph = build(
            &[
                e("root@1", "x@1"),
                e("x@1", "y@1"),
                e("y@1", "x@1"),
                e("y@1", "leaf@1"),
            ],
            &[r("root@1")],
        );
        let verdicts = evaluate(&graph, &vulnerable("leaf@1")).unwrap();

        assert!(verdicts[&id("y@1")].is_rejected());
        assert!(!verdicts[&id("x@1")].is_rejected());
    }

    #[test]
    fn test_every_node_gets_a_non_empty_verdict() {
        let graph = build(
            &[e("a@1", "b@1"), e("a@1", "c@1"), e("b@1", "c@1")],
            &[r("a@1")],
        );
        let verdicts = evaluate(&graph, &Findings::new()).unwrap();
        assert_eq!(verdicts.len(), graph.len());
        for verdict in verdicts.values() {
            assert!(!verdict.reasons().is_empty());
            // nothing is known about any of them
            assert_eq!(verdict.status(), ApprovalStatus::Pending);
        }
    }

    #[test]
    fn test_components_come_out_leaves_first() {
        // 0 -> 1 -> 2 -> 1, 0 -> 3
        let adjacency = vec![vec![1, 3], vec![2], vec![1], vec![]];
        let components = strongly_connected(&adjacency);
        assert_eq!(components, vec![vec![1, 2], vec![3], vec![0]]);
    }
}
