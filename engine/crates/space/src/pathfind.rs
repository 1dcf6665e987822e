use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use crate::grid_space::{AreaGrid, GridPos};

/// Neighbor expansion order. Fixed so that equal-cost paths come out the same every time.
const STEPS: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

/// A* search over a 4-connected grid with unit step cost and a Manhattan heuristic.
///
/// The returned path excludes `start` and ends at `goal`. It is empty when the
/// goal is blocked, out of bounds, unreachable, or equal to `start`.
/// Open-set ties on `f` are broken by discovery order.
pub fn find_path(grid: &AreaGrid, start: GridPos, goal: GridPos) -> Vec<GridPos> {
    if start == goal || !grid.is_walkable(goal) {
        return Vec::new();
    }

    // (f, discovery sequence, node)
    let mut open: BinaryHeap<Reverse<(u32, u64, GridPos)>> = BinaryHeap::new();
    let mut g_score: BTreeMap<GridPos, u32> = BTreeMap::new();
    let mut came_from: BTreeMap<GridPos, GridPos> = BTreeMap::new();
    let mut closed: BTreeSet<GridPos> = BTreeSet::new();
    let mut seq: u64 = 0;

    g_score.insert(start, 0);
    open.push(Reverse((start.manhattan(goal), seq, start)));

    while let Some(Reverse((_, _, current))) = open.pop() {
        if current == goal {
            return reconstruct(&came_from, start, goal);
        }
        if !closed.insert(current) {
            continue;
        }

        let g = g_score.get(&current).copied().unwrap_or(u32::MAX);
        for (dx, dy) in STEPS {
            let next = GridPos::new(current.x + dx, current.y + dy);
            if closed.contains(&next) || !grid.is_walkable(next) {
                continue;
            }
            let tentative = g + 1;
            if g_score.get(&next).map_or(true, |&known| tentative < known) {
                g_score.insert(next, tentative);
                came_from.insert(next, current);
                seq += 1;
                open.push(Reverse((tentative + next.manhattan(goal), seq, next)));
            }
        }
    }

    tracing::trace!(?start, ?goal, "no path");
    Vec::new()
}

fn reconstruct(came_from: &BTreeMap<GridPos, GridPos>, start: GridPos, goal: GridPos) -> Vec<GridPos> {
    let mut path = vec![goal];
    let mut node = goal;
    while let Some(&prev) = came_from.get(&node) {
        if prev == start {
            break;
        }
        path.push(prev);
        node = prev;
    }
    path.reverse();
    path
}
