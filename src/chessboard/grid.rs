//! Assembly of loose corner candidates into an ordered chessboard grid.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::{Point2, Vector2};

use super::PatternSize;

type Cell = (i32, i32);

const DIRECTIONS: [Cell; 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Neighbours considered when picking the two grid axes at a seed.
const SEED_NEIGHBOURS: usize = 8;

/// Try up to `max_seeds` seeds, closest to the candidate centroid first, and
/// return the first grid that has exactly the pattern's dimensions.
///
/// Corners come back row by row, rows running along the pattern width, with
/// the first corner being the one nearest the image origin.
pub fn assemble_grid(
    points: &[Point2<f64>],
    pattern: PatternSize,
    max_seeds: usize,
    tolerance: f64,
) -> Option<Vec<Point2<f64>>> {
    if points.len() < pattern.corner_count() || pattern.corner_count() < 4 {
        return None;
    }

    let centroid = points
        .iter()
        .fold(Vector2::zeros(), |acc: Vector2<f64>, p| acc + p.coords)
        / points.len() as f64;
    let mut seeds: Vec<usize> = (0..points.len()).collect();
    seeds.sort_by(|&a, &b| {
        (points[a].coords - centroid)
            .norm_squared()
            .total_cmp(&(points[b].coords - centroid).norm_squared())
    });

    for &seed in seeds.iter().take(max_seeds.max(1)) {
        let Some(grid) = grow_from_seed(points, seed, pattern, tolerance) else {
            continue;
        };
        if let Some(ordered) = order_grid(points, &grid, pattern) {
            log::trace!("Chessboard grid grown from seed {}", seed);
            return Some(ordered);
        }
    }
    None
}

fn grow_from_seed(
    points: &[Point2<f64>],
    seed: usize,
    pattern: PatternSize,
    tolerance: f64,
) -> Option<BTreeMap<Cell, usize>> {
    let origin = points[seed];
    let mut neighbours: Vec<usize> = (0..points.len()).filter(|&i| i != seed).collect();
    neighbours.sort_by(|&a, &b| {
        (points[a] - origin)
            .norm_squared()
            .total_cmp(&(points[b] - origin).norm_squared())
    });
    neighbours.truncate(SEED_NEIGHBOURS);

    let u_index = *neighbours.first()?;
    let u = points[u_index] - origin;
    let v_index = neighbours.iter().skip(1).copied().find(|&i| {
        let v = points[i] - origin;
        let ratio = v.norm() / u.norm();
        let cosine = u.dot(&v) / (u.norm() * v.norm());
        cosine.abs() < 0.5 && (0.5..=2.0).contains(&ratio)
    })?;

    let mut grid = BTreeMap::new();
    let mut used = vec![false; points.len()];
    for (cell, index) in [((0, 0), seed), ((1, 0), u_index), ((0, 1), v_index)] {
        grid.insert(cell, index);
        used[index] = true;
    }

    let limit = pattern.corner_count() * 4;
    loop {
        let frontier: BTreeSet<Cell> = grid
            .keys()
            .flat_map(|&(i, j)| DIRECTIONS.iter().map(move |&(di, dj)| (i + di, j + dj)))
            .filter(|cell| !grid.contains_key(cell))
            .collect();

        let mut added = false;
        for cell in frontier {
            for direction in DIRECTIONS {
                let Some((predicted, step)) = predict(points, &grid, cell, direction) else {
                    continue;
                };
                if let Some(index) = nearest_unused(points, &used, predicted, tolerance * step) {
                    grid.insert(cell, index);
                    used[index] = true;
                    added = true;
                    break;
                }
            }
        }

        if !added {
            break;
        }
        if grid.len() > limit {
            return None;
        }
    }

    Some(grid)
}

/// Predicted position of `cell` seen from the neighbour one step back along
/// `direction`, plus the local grid spacing.
fn predict(
    points: &[Point2<f64>],
    grid: &BTreeMap<Cell, usize>,
    cell: Cell,
    direction: Cell,
) -> Option<(Point2<f64>, f64)> {
    let back = |steps: i32, offset: Cell| {
        grid.get(&(
            cell.0 - direction.0 * steps + offset.0,
            cell.1 - direction.1 * steps + offset.1,
        ))
        .map(|&i| points[i])
    };

    let p1 = back(1, (0, 0))?;
    if let Some(p2) = back(2, (0, 0)) {
        let delta = p1 - p2;
        return Some((p1 + delta, delta.norm()));
    }

    let perpendiculars = [(direction.1, direction.0), (-direction.1, -direction.0)];
    for offset in perpendiculars {
        if let (Some(side), Some(side_ahead)) = (back(1, offset), back(0, offset)) {
            let delta = side_ahead - side;
            return Some((p1 + delta, delta.norm()));
        }
    }
    None
}

fn nearest_unused(points: &[Point2<f64>], used: &[bool], target: Point2<f64>, radius: f64) -> Option<usize> {
    points
        .iter()
        .enumerate()
        .filter(|(i, _)| !used[*i])
        .map(|(i, p)| (i, (p - target).norm()))
        .filter(|(_, d)| *d <= radius)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

fn order_grid(
    points: &[Point2<f64>],
    grid: &BTreeMap<Cell, usize>,
    pattern: PatternSize,
) -> Option<Vec<Point2<f64>>> {
    let min_i = grid.keys().map(|c| c.0).min()?;
    let max_i = grid.keys().map(|c| c.0).max()?;
    let min_j = grid.keys().map(|c| c.1).min()?;
    let max_j = grid.keys().map(|c| c.1).max()?;
    let cols = (max_i - min_i + 1) as usize;
    let rows = (max_j - min_j + 1) as usize;
    if grid.len() != cols * rows {
        return None;
    }

    let (width, height) = (pattern.width as usize, pattern.height as usize);
    let transposed = if cols == width && rows == height {
        false
    } else if cols == height && rows == width {
        true
    } else {
        return None;
    };

    let at = |row: usize, col: usize| -> Option<Point2<f64>> {
        let cell = if transposed {
            (min_i + row as i32, min_j + col as i32)
        } else {
            (min_i + col as i32, min_j + row as i32)
        };
        grid.get(&cell).map(|&i| points[i])
    };

    let mut best: Option<(bool, bool)> = None;
    let mut best_score = f64::INFINITY;
    for flip_rows in [false, true] {
        for flip_cols in [false, true] {
            let row = if flip_rows { height - 1 } else { 0 };
            let col = if flip_cols { width - 1 } else { 0 };
            let first = at(row, col)?;
            let score = first.x + first.y;
            if score < best_score {
                best_score = score;
                best = Some((flip_rows, flip_cols));
            }
        }
    }
    let (flip_rows, flip_cols) = best?;

    let mut ordered = Vec::with_capacity(width * height);
    for r in 0..height {
        for c in 0..width {
            let row = if flip_rows { height - 1 - r } else { r };
            let col = if flip_cols { width - 1 - c } else { c };
            ordered.push(at(row, col)?);
        }
    }
    Some(ordered)
}
