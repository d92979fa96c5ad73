use anyhow::{anyhow, bail, Context};
use crate::queue::{MutablePriorityQueue, Prioritized};

use std::collections::HashMap;
use std::fs;
use std::path::Path as FsPath;

/// Movement graph consumed by the planners.
///
/// Edges must be symmetric: if `b` is a neighbor of `a` with cost `c`, then `a`
/// is a neighbor of `b` with cost `c`. Waiting is not an edge, the search adds
/// it on its own.
pub trait Environment: Sync {
    fn contains(&self, position: (usize, usize)) -> bool;

    fn neighbors(&self, position: (usize, usize)) -> Vec<((usize, usize), usize)>;

    fn edge_cost(&self, from: (usize, usize), to: (usize, usize)) -> Option<usize> {
        self.neighbors(from)
            .into_iter()
            .find(|&(neighbor, _)| neighbor == to)
            .map(|(_, cost)| cost)
    }
}

#[derive(Debug, Clone)]
pub struct Tile {
    passable: bool,
    pub neighbors: Vec<(usize, usize)>, // Stores coordinates of accessible neighbors
}

impl Tile {
    pub fn is_passable(&self) -> bool {
        self.passable
    }
}

/// 4-connected grid with unit move costs, `grid[x][y]` with `x` the row.
#[derive(Debug, Clone)]
pub struct GridMap {
    pub height: usize,
    pub width: usize,
    pub grid: Vec<Vec<Tile>>,
}

impl GridMap {
    pub fn new(height: usize, width: usize, obstacles: &[(usize, usize)]) -> Self {
        let mut grid = vec![
            vec![
                Tile {
                    passable: true,
                    neighbors: Vec::new(),
                };
                width
            ];
            height
        ];
        for &(x, y) in obstacles {
            if x < height && y < width {
                grid[x][y].passable = false;
            }
        }

        let mut map = GridMap {
            height,
            width,
            grid,
        };
        map.initialize_neighbors();
        map
    }

    pub fn from_file<P: AsRef<FsPath>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read map file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("malformed map file {}", path.display()))
    }

    /// Parses the MovingAI `.map` format. Only `.` is passable.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let mut lines = content.lines();

        let _type = lines.next().ok_or_else(|| anyhow!("missing type line"))?;
        let height = Self::parse_header(lines.next(), "height")?;
        let width = Self::parse_header(lines.next(), "width")?;
        match lines.next() {
            Some(line) if line.trim() == "map" => {}
            other => bail!("expected `map` line, got {other:?}"),
        }

        let mut grid = Vec::with_capacity(height);
        for (row, line) in lines.take(height).enumerate() {
            let tiles_row: Vec<Tile> = line
                .trim_end()
                .chars()
                .map(|ch| Tile {
                    passable: ch == '.',
                    neighbors: Vec::new(),
                })
                .collect();
            if tiles_row.len() != width {
                bail!("row {row} has {} cells, expected {width}", tiles_row.len());
            }
            grid.push(tiles_row);
        }
        if grid.len() != height {
            bail!("map has {} rows, expected {height}", grid.len());
        }

        let mut map = GridMap {
            height,
            width,
            grid,
        };
        map.initialize_neighbors();
        Ok(map)
    }

    fn parse_header(line: Option<&str>, name: &str) -> anyhow::Result<usize> {
        let line = line.ok_or_else(|| anyhow!("missing {name} line"))?;
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(key), Some(value)) if key == name => value
                .parse::<usize>()
                .with_context(|| format!("invalid {name} value {value:?}")),
            _ => bail!("expected `{name} <n>`, got {line:?}"),
        }
    }

    fn initialize_neighbors(&mut self) {
        for x in 0..self.height {
            for y in 0..self.width {
                if self.grid[x][y].passable {
                    self.grid[x][y].neighbors = self.get_neighbors(x, y);
                }
            }
        }
    }

    pub fn get_neighbors(&self, x: usize, y: usize) -> Vec<(usize, usize)> {
        let directions = [(-1, 0), (1, 0), (0, -1), (0, 1)]; // Up, down, left, right
        let mut neighbors = Vec::new();

        for &(dx, dy) in &directions {
            let new_x = x as i64 + dx;
            let new_y = y as i64 + dy;
            if new_x >= 0
                && new_y >= 0
                && new_x < self.height as i64
                && new_y < self.width as i64
                && self.grid[new_x as usize][new_y as usize].passable
            {
                neighbors.push((new_x as usize, new_y as usize));
            }
        }

        neighbors
    }

    pub fn is_passable(&self, x: usize, y: usize) -> bool {
        x < self.height && y < self.width && self.grid[x][y].is_passable()
    }
}

impl Environment for GridMap {
    fn contains(&self, position: (usize, usize)) -> bool {
        self.is_passable(position.0, position.1)
    }

    fn neighbors(&self, position: (usize, usize)) -> Vec<((usize, usize), usize)> {
        if !self.contains(position) {
            return Vec::new();
        }
        self.grid[position.0][position.1]
            .neighbors
            .iter()
            .map(|&neighbor| (neighbor, 1))
            .collect()
    }

    fn edge_cost(&self, from: (usize, usize), to: (usize, usize)) -> Option<usize> {
        if !self.contains(from) || !self.contains(to) {
            return None;
        }
        (from.0.abs_diff(to.0) + from.1.abs_diff(to.1) == 1).then_some(1)
    }
}

/// Exact time-free distance to one goal, used as the low-level heuristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeuristicTable {
    goal: (usize, usize),
    distances: HashMap<(usize, usize), usize>,
}

// Tentative distance of a cell still in the Dijkstra frontier.
#[derive(Debug, Clone, Copy)]
struct Tentative(usize);

impl Prioritized for Tentative {
    type Priority = usize;

    fn priority(&self) -> usize {
        self.0
    }
}

impl HeuristicTable {
    /// Reverse Dijkstra from `goal`; relies on edges being symmetric.
    pub fn new<E: Environment + ?Sized>(env: &E, goal: (usize, usize)) -> Self {
        let mut distances = HashMap::new();
        let mut frontier = MutablePriorityQueue::new();

        if env.contains(goal) {
            let _ = frontier.insert(goal, Tentative(0));
        }

        while let Ok((position, Tentative(cost))) = frontier.pop_min() {
            distances.insert(position, cost);

            for (neighbor, edge_cost) in env.neighbors(position) {
                if distances.contains_key(&neighbor) {
                    continue;
                }
                let next_cost = cost + edge_cost;
                // Keys are checked first, neither call can fail.
                match frontier.get(&neighbor) {
                    Some(&Tentative(best)) if best <= next_cost => {}
                    Some(_) => {
                        let _ = frontier.update(&neighbor, |tentative| tentative.0 = next_cost);
                    }
                    None => {
                        let _ = frontier.insert(neighbor, Tentative(next_cost));
                    }
                }
            }
        }

        HeuristicTable { goal, distances }
    }

    pub fn goal(&self) -> (usize, usize) {
        self.goal
    }

    /// `None` when the goal is unreachable from `position`.
    pub fn get(&self, position: (usize, usize)) -> Option<usize> {
        self.distances.get(&position).copied()
    }
}
