//! The order in which tables must be created and dropped, computed from their
//! foreign keys.

use petgraph::{algo::toposort, graph::NodeIndex, Direction, Graph};
use std::{cmp::Reverse, collections::BinaryHeap};

use crate::sql::Table;

/// Why we couldn't order a set of tables.
#[derive(Debug, thiserror::Error)]
pub enum TableOrderError {
    /// The foreign keys form a cycle, so no table in it can be created first.
    #[error("foreign keys form a cycle through table {table}")]
    Cycle {
        /// A table on the cycle.
        table: &'static str,
    },
    /// A foreign key points at a table we don't know about.
    #[error("table {referenced_by} refers to unknown table {table}")]
    UnknownTable {
        /// The missing table.
        table: &'static str,
        /// The table with the foreign key.
        referenced_by: &'static str,
    },
}

/// Every table, placed after all the tables it refers to. Tables which don't
/// depend on each other keep their relative order from `tables`.
pub fn create_order(tables: &[Table]) -> Result<Vec<&Table>, TableOrderError> {
    // Nodes are added in declaration order, so node indices are positions
    // in `tables`. Edges run from each referenced table to its referrer.
    let mut graph = Graph::<&'static str, ()>::new();
    let nodes = tables
        .iter()
        .map(|t| graph.add_node(t.name))
        .collect::<Vec<_>>();
    for (idx, table) in tables.iter().enumerate() {
        for referenced in table.references() {
            let from = tables
                .iter()
                .position(|t| t.name == referenced)
                .ok_or(TableOrderError::UnknownTable {
                    table: referenced,
                    referenced_by: table.name,
                })?;
            graph.update_edge(nodes[from], nodes[idx], ());
        }
    }

    // `toposort` is only used to find cycles, because its order isn't
    // stable.
    toposort(&graph, None).map_err(|cycle| TableOrderError::Cycle {
        table: graph[cycle.node_id()],
    })?;

    // Kahn's algorithm, always taking the earliest declared table which is
    // ready.
    let mut unmet = nodes
        .iter()
        .map(|&n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect::<Vec<_>>();
    let mut ready = unmet
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(idx, _)| Reverse(idx))
        .collect::<BinaryHeap<_>>();
    let mut ordered = Vec::with_capacity(tables.len());
    while let Some(Reverse(idx)) = ready.pop() {
        ordered.push(&tables[idx]);
        for next in graph.neighbors_directed(NodeIndex::new(idx), Direction::Outgoing) {
            let next = next.index();
            unmet[next] -= 1;
            if unmet[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }
    debug_assert_eq!(ordered.len(), tables.len());
    Ok(ordered)
}

/// Every table, placed before all the tables it refers to. This is the
/// reverse of `create_order`.
pub fn drop_order(tables: &[Table]) -> Result<Vec<&Table>, TableOrderError> {
    let mut ordered = create_order(tables)?;
    ordered.reverse();
    Ok(ordered)
}
