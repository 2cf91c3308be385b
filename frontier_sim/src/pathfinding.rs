// A* pathfinding over the 8-connected cell grid.
//
// Every step costs 1, diagonals included. The open set is a `BinaryHeap`
// (min-heap via reversed ordering) keyed by cell through a `g_score` map:
// a neighbour is pushed only when its tentative `g` strictly improves on the
// best known one, and stale heap entries are skipped on pop because their
// cell is already closed. Ties on `f` go to the entry pushed first.
//
// The heuristic is Chebyshev distance by default, which is exact on an open
// grid with unit diagonal cost. `PathHeuristic::Manhattan` is kept as an
// option; it overestimates diagonal progress, so paths stay valid but may be
// longer than necessary.
//
// Obstruction comes from an `Occupancy` view of the structure map. A cell is
// passable when it is free, when it is the goal, or when it belongs to the
// structure under the goal or under the start (agents walk onto a footprint
// to reach its anchor and walk out of the building they stand in).
//
// Searches are bounded two ways: cells outside the start/goal bounding box
// grown by `search_margin` are never expanded, and more than `max_expanded`
// expansions abandons the search. Running into either bound is reported as
// `SearchAbandoned`; an open set exhausted without touching a bound is a
// proven `Unreachable`.
//
// See also: `spatial.rs` which implements `Occupancy`, `controller.rs` which
// turns cell paths into waypoints.
//
// **Critical constraint: determinism.** Search is a pure function of the
// occupancy map, endpoints and limits. The hash maps are lookup-only; their
// iteration order never influences the result.

use crate::config::{PathHeuristic, PathLimits};
use crate::types::{Point, StructureId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use thiserror::Error;

/// Read access to cell occupancy.
pub trait Occupancy {
    fn occupant(&self, cell: Point) -> Option<StructureId>;
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("no route from {start} to {goal}")]
    Unreachable { start: Point, goal: Point },

    #[error("search abandoned after {expanded} expansions")]
    SearchAbandoned { expanded: usize },
}

/// Orthogonal moves first, then diagonals.
pub const NEIGHBOR_OFFSETS: [Point; 8] = [
    Point::new(0, -1),
    Point::new(0, 1),
    Point::new(-1, 0),
    Point::new(1, 0),
    Point::new(-1, -1),
    Point::new(-1, 1),
    Point::new(1, -1),
    Point::new(1, 1),
];

struct OpenEntry {
    cell: Point,
    g: u32,
    f: u32,
    sequence: u64,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f && self.sequence == other.sequence
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap: smallest f, then earliest push, is "greatest".
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

fn heuristic(kind: PathHeuristic, from: Point, to: Point) -> u32 {
    match kind {
        PathHeuristic::Chebyshev => from.chebyshev_distance(to),
        PathHeuristic::Manhattan => from.manhattan_distance(to),
    }
}

/// Inclusive cell rectangle a search may expand into.
#[derive(Clone, Copy, Debug)]
struct Bounds {
    min: Point,
    max: Point,
}

impl Bounds {
    fn around(a: Point, b: Point, margin: i32) -> Self {
        let margin = margin.max(0);
        Self {
            min: Point::new(a.x.min(b.x) - margin, a.y.min(b.y) - margin),
            max: Point::new(a.x.max(b.x) + margin, a.y.max(b.y) + margin),
        }
    }

    fn contains(&self, p: Point) -> bool {
        (self.min.x..=self.max.x).contains(&p.x) && (self.min.y..=self.max.y).contains(&p.y)
    }
}

/// Shortest chain of 8-adjacent cells from `start` to `goal`, both included.
///
/// `start == goal` yields `[start]` without consulting the grid. The start
/// cell itself is never tested for passability.
pub fn find_path<O: Occupancy + ?Sized>(
    grid: &O,
    start: Point,
    goal: Point,
    limits: &PathLimits,
) -> Result<Vec<Point>, PathError> {
    if start == goal {
        return Ok(vec![start]);
    }

    let goal_owner = grid.occupant(goal);
    let start_owner = grid.occupant(start);
    let passable = |cell: Point| {
        if cell == goal {
            return true;
        }
        match grid.occupant(cell) {
            None => true,
            Some(id) => Some(id) == goal_owner || Some(id) == start_owner,
        }
    };

    let bounds = Bounds::around(start, goal, limits.search_margin);
    let mut g_score: FxHashMap<Point, u32> = FxHashMap::default();
    let mut came_from: FxHashMap<Point, Point> = FxHashMap::default();
    let mut closed: FxHashSet<Point> = FxHashSet::default();
    let mut open = BinaryHeap::new();
    let mut sequence = 0u64;
    let mut expanded = 0usize;
    let mut hit_bounds = false;

    g_score.insert(start, 0);
    open.push(OpenEntry {
        cell: start,
        g: 0,
        f: heuristic(limits.heuristic, start, goal),
        sequence,
    });

    while let Some(current) = open.pop() {
        if current.cell == goal {
            return Ok(reconstruct_path(&came_from, start, goal));
        }
        if !closed.insert(current.cell) {
            continue;
        }

        expanded += 1;
        if expanded > limits.max_expanded {
            return Err(PathError::SearchAbandoned { expanded });
        }

        let tentative_g = current.g + 1;
        for offset in NEIGHBOR_OFFSETS {
            let neighbor = current.cell + offset;
            if closed.contains(&neighbor) {
                continue;
            }
            if !bounds.contains(neighbor) {
                hit_bounds = true;
                continue;
            }
            if !passable(neighbor) {
                continue;
            }
            if g_score
                .get(&neighbor)
                .is_some_and(|&known| tentative_g >= known)
            {
                continue;
            }
            g_score.insert(neighbor, tentative_g);
            came_from.insert(neighbor, current.cell);
            sequence += 1;
            open.push(OpenEntry {
                cell: neighbor,
                g: tentative_g,
                f: tentative_g + heuristic(limits.heuristic, neighbor, goal),
                sequence,
            });
        }
    }

    if hit_bounds {
        Err(PathError::SearchAbandoned { expanded })
    } else {
        Err(PathError::Unreachable { start, goal })
    }
}

/// Walk parent links back from `goal` and reverse.
fn reconstruct_path(came_from: &FxHashMap<Point, Point>, start: Point, goal: Point) -> Vec<Point> {
    let mut path = vec![goal];
    let mut current = goal;
    while current != start {
        match came_from.get(&current) {
            Some(&prev) => {
                path.push(prev);
                current = prev;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

/// Number of steps in a cell path.
pub fn path_length(path: &[Point]) -> usize {
    path.len().saturating_sub(1)
}
