//! Breadth-first connectivity over walkable grid cells.
//!
//! The adjacency map keeps every cell as a node. Unwalkable cells have no
//! edges, walkable cells link to their walkable orthogonal neighbours. Neighbour
//! order is fixed to +x, -x, +y, -y so distances and paths are reproducible.

use std::collections::{HashMap, VecDeque};

use worldgrid_protocol::GridCell;

/// A cell as seen by the connectivity engine.
pub trait ConnectivityNode {
    fn node_id(&self) -> &str;
    fn column(&self) -> u32;
    fn row(&self) -> u32;
    fn is_walkable(&self) -> bool;
}

impl ConnectivityNode for GridCell {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn column(&self) -> u32 {
        self.x
    }

    fn row(&self) -> u32 {
        self.y
    }

    fn is_walkable(&self) -> bool {
        self.walkable
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Adjacency {
    edges: HashMap<String, Vec<String>>,
}

impl Adjacency {
    pub fn build<N: ConnectivityNode>(cells: &[N]) -> Self {
        let by_coord: HashMap<(u32, u32), &N> = cells
            .iter()
            .map(|cell| ((cell.column(), cell.row()), cell))
            .collect();

        let mut edges = HashMap::with_capacity(cells.len());
        for cell in cells {
            let mut neighbors = Vec::new();
            if cell.is_walkable() {
                for coord in neighbor_coords(cell.column(), cell.row()) {
                    if let Some(other) = by_coord.get(&coord) {
                        if other.is_walkable() {
                            neighbors.push(other.node_id().to_string());
                        }
                    }
                }
            }
            edges.insert(cell.node_id().to_string(), neighbors);
        }

        Self { edges }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.edges.contains_key(id)
    }

    /// Neighbours of `id`, or `None` if the cell is not part of the graph.
    pub fn neighbors(&self, id: &str) -> Option<&[String]> {
        self.edges.get(id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

fn neighbor_coords(column: u32, row: u32) -> impl Iterator<Item = (u32, u32)> {
    [
        column.checked_add(1).map(|c| (c, row)),
        column.checked_sub(1).map(|c| (c, row)),
        row.checked_add(1).map(|r| (column, r)),
        row.checked_sub(1).map(|r| (column, r)),
    ]
    .into_iter()
    .flatten()
}

/// Hop counts from `start` to every reachable cell. Unreached cells are absent.
pub fn bfs_distances(adjacency: &Adjacency, start: &str) -> HashMap<String, u32> {
    let mut distances = HashMap::new();
    if !adjacency.contains(start) {
        return distances;
    }

    let mut queue = VecDeque::new();
    distances.insert(start.to_string(), 0);
    queue.push_back(start.to_string());

    while let Some(current) = queue.pop_front() {
        let next_distance = distances[&current] + 1;
        for neighbor in adjacency.neighbors(&current).unwrap_or_default() {
            if distances.contains_key(neighbor) {
                continue;
            }
            distances.insert(neighbor.clone(), next_distance);
            queue.push_back(neighbor.clone());
        }
    }

    distances
}

/// Shortest path from `start` to `goal` inclusive of both ends, or `None` when
/// the goal is unreachable.
pub fn bfs_shortest_path(adjacency: &Adjacency, start: &str, goal: &str) -> Option<Vec<String>> {
    if start == goal {
        return Some(vec![start.to_string()]);
    }
    if !adjacency.contains(start) {
        return None;
    }

    let mut previous: HashMap<String, String> = HashMap::new();
    let mut queue = VecDeque::new();
    queue.push_back(start.to_string());

    'search: while let Some(current) = queue.pop_front() {
        for neighbor in adjacency.neighbors(&current).unwrap_or_default() {
            if neighbor == start || previous.contains_key(neighbor) {
                continue;
            }
            previous.insert(neighbor.clone(), current.clone());
            if neighbor == goal {
                break 'search;
            }
            queue.push_back(neighbor.clone());
        }
    }

    if !previous.contains_key(goal) {
        return None;
    }

    let mut path = vec![goal.to_string()];
    let mut cursor = goal;
    while let Some(prev) = previous.get(cursor) {
        path.push(prev.clone());
        cursor = prev.as_str();
    }
    path.reverse();
    Some(path)
}
