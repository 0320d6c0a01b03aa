//! Compartment identity, direction slots and neighbour resolution for the
//! overland grid and the channel network.
//!
//! Every compartment (active overland cell or channel node) gets a dense
//! index.  Overland cells come first in row-major order, then channel nodes
//! link by link.  [`Topology::build`] precomputes, for each index, which
//! compartment sits in each of the eleven source slots.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ensure_len, KernelError, Result};

/// Number of source / direction slots per compartment.
pub const N_SOURCES: usize = 11;

// ── Identity ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompartmentId {
    Overland { row: usize, col: usize },
    Channel { link: usize, node: usize },
}

/// Position within a compartment's vertical column.
///
/// Solid layers are numbered from 1 (deepest) to `nstack` (surface).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    WaterColumn,
    Solid(usize),
}

impl Layer {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Layer::WaterColumn => 0,
            Layer::Solid(k) => k,
        }
    }

    pub fn from_index(i: usize) -> Self {
        if i == 0 {
            Layer::WaterColumn
        } else {
            Layer::Solid(i)
        }
    }
}

// ── Source slots ──────────────────────────────────────────────────────────────

/// Flow paths into or out of a compartment.
///
/// The eight compass slots are shared by both domains: overland cells only
/// ever populate the four cardinal ones, channel nodes populate whichever
/// slot the neighbouring node's grid cell lies in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    PointSource,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
    Floodplain,
    Boundary,
}

impl Source {
    pub const ALL: [Source; N_SOURCES] = [
        Source::PointSource,
        Source::North,
        Source::NorthEast,
        Source::East,
        Source::SouthEast,
        Source::South,
        Source::SouthWest,
        Source::West,
        Source::NorthWest,
        Source::Floodplain,
        Source::Boundary,
    ];

    pub const CARDINAL: [Source; 4] = [Source::North, Source::East, Source::South, Source::West];

    pub const COMPASS: [Source; 8] = [
        Source::North,
        Source::NorthEast,
        Source::East,
        Source::SouthEast,
        Source::South,
        Source::SouthWest,
        Source::West,
        Source::NorthWest,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Option<Self> {
        Self::ALL.get(i).copied()
    }

    pub fn is_compass(self) -> bool {
        (1..=8).contains(&self.index())
    }

    /// The slot a neighbour uses to refer back to this compartment.
    /// Non-compass slots are their own opposite.
    pub fn opposite(self) -> Self {
        if self.is_compass() {
            Self::COMPASS[(self.index() - 1 + 4) % 8]
        } else {
            self
        }
    }

    /// (row, col) step for compass slots; north is toward row 0.
    pub fn offset(self) -> Option<(isize, isize)> {
        match self {
            Source::North => Some((-1, 0)),
            Source::NorthEast => Some((-1, 1)),
            Source::East => Some((0, 1)),
            Source::SouthEast => Some((1, 1)),
            Source::South => Some((1, 0)),
            Source::SouthWest => Some((1, -1)),
            Source::West => Some((0, -1)),
            Source::NorthWest => Some((-1, -1)),
            _ => None,
        }
    }

    pub fn from_offset(dr: isize, dc: isize) -> Option<Self> {
        Self::COMPASS.iter().copied().find(|s| s.offset() == Some((dr, dc)))
    }
}

// ── Domain descriptions ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlandGrid {
    pub rows: usize,
    pub cols: usize,
    /// Cell edge length in metres.
    pub cell_size: f64,
    #[serde(default)]
    pub x_origin: f64,
    #[serde(default)]
    pub y_origin: f64,
    /// Row-major activity mask; empty means every cell is active.
    #[serde(default)]
    pub active: Vec<bool>,
    /// Cells that exchange with the domain boundary.
    #[serde(default)]
    pub outlets: Vec<(usize, usize)>,
}

impl OverlandGrid {
    pub fn new(rows: usize, cols: usize, cell_size: f64) -> Self {
        Self {
            rows,
            cols,
            cell_size,
            x_origin: 0.0,
            y_origin: 0.0,
            active: Vec::new(),
            outlets: Vec::new(),
        }
    }

    pub fn is_active(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols && (self.active.is_empty() || self.active[row * self.cols + col])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelNode {
    /// Grid cell the node occupies.
    pub row: usize,
    pub col: usize,
    pub length: f64,
    pub bottom_width: f64,
    /// Horizontal run per unit rise of the banks.
    #[serde(default)]
    pub side_slope: f64,
    #[serde(default)]
    pub bank_height: f64,
}

impl ChannelNode {
    pub fn top_width(&self) -> f64 {
        self.bottom_width + 2.0 * self.side_slope * self.bank_height
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelLink {
    /// Nodes ordered upstream to downstream.
    pub nodes: Vec<ChannelNode>,
    #[serde(default)]
    pub downstream: Option<usize>,
    /// The last node of a link without a downstream link exchanges with the
    /// domain boundary when this is set.
    #[serde(default)]
    pub outlet: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelNetwork {
    pub links: Vec<ChannelLink>,
}

// ── Resolved topology ─────────────────────────────────────────────────────────

/// Neighbours of one compartment by source slot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Neighborhood {
    slots: [Option<usize>; N_SOURCES],
    /// Declared outlet: the boundary slot is live.
    pub boundary: bool,
}

impl Neighborhood {
    #[inline]
    pub fn neighbor(&self, source: Source) -> Option<usize> {
        self.slots[source.index()]
    }

    pub fn floodplain(&self) -> Option<usize> {
        self.slots[Source::Floodplain.index()]
    }

    /// Populated compass slots.
    pub fn compass(&self) -> impl Iterator<Item = (Source, usize)> + '_ {
        Source::COMPASS
            .iter()
            .filter_map(move |&s| self.slots[s.index()].map(|n| (s, n)))
    }

    /// Whether mass can move through `source` at all.
    pub fn is_live(&self, source: Source) -> bool {
        match source {
            Source::PointSource => true,
            Source::Boundary => self.boundary,
            s => self.slots[s.index()].is_some(),
        }
    }
}

/// Plan-form geometry used to turn depths into volumes and areas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Geometry {
    /// Overland surface area net of any channel occupying the cell.
    Overland { area: f64 },
    /// Trapezoidal channel reach.
    Channel {
        length: f64,
        bottom_width: f64,
        side_slope: f64,
    },
}

impl Geometry {
    pub fn water_volume(&self, depth: f64) -> f64 {
        let d = depth.max(0.0);
        match *self {
            Geometry::Overland { area } => d * area,
            Geometry::Channel { length, bottom_width, side_slope } => {
                (bottom_width + side_slope * d) * d * length
            }
        }
    }

    /// Area across which infiltration or transmission loss occurs.
    pub fn bed_area(&self) -> f64 {
        match *self {
            Geometry::Overland { area } => area,
            Geometry::Channel { length, bottom_width, .. } => bottom_width * length,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Topology {
    ids: Vec<CompartmentId>,
    lookup: HashMap<CompartmentId, usize>,
    neighbors: Vec<Neighborhood>,
    geometry: Vec<Geometry>,
    outlets: Vec<usize>,
    n_overland: usize,
    rows: usize,
    cols: usize,
    cell_size: f64,
    x_origin: f64,
    y_origin: f64,
    link_lengths: Vec<usize>,
}

impl Topology {
    /// Resolve neighbours, floodplain partners, outlets and geometry.
    pub fn build(grid: &OverlandGrid, network: Option<&ChannelNetwork>) -> Result<Self> {
        if !grid.active.is_empty() {
            ensure_len("overland activity mask cells", grid.rows * grid.cols, grid.active.len())?;
        }
        if !(grid.cell_size > 0.0) {
            return Err(KernelError::InvalidTopology(format!(
                "cell size must be positive, got {}",
                grid.cell_size
            )));
        }

        let empty = ChannelNetwork::default();
        let links = &network.unwrap_or(&empty).links;

        let mut ids = Vec::new();
        for r in 0..grid.rows {
            for c in 0..grid.cols {
                if grid.is_active(r, c) {
                    ids.push(CompartmentId::Overland { row: r, col: c });
                }
            }
        }
        let n_overland = ids.len();

        for (l, link) in links.iter().enumerate() {
            if link.nodes.is_empty() {
                return Err(KernelError::InvalidTopology(format!("link {l} has no nodes")));
            }
            if let Some(d) = link.downstream {
                if d >= links.len() || d == l {
                    return Err(KernelError::InvalidTopology(format!(
                        "link {l} drains to invalid link {d}"
                    )));
                }
                if link.outlet {
                    return Err(KernelError::InvalidTopology(format!(
                        "link {l} is an outlet but also drains to link {d}"
                    )));
                }
            }
            ids.extend((0..link.nodes.len()).map(|n| CompartmentId::Channel { link: l, node: n }));
        }

        let lookup: HashMap<CompartmentId, usize> =
            ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        // Cell → channel node occupying it.
        let mut node_cells: HashMap<(usize, usize), (usize, &ChannelNode)> = HashMap::new();
        for (l, link) in links.iter().enumerate() {
            for (n, node) in link.nodes.iter().enumerate() {
                if node.row >= grid.rows || node.col >= grid.cols {
                    return Err(KernelError::InvalidTopology(format!(
                        "channel node ({l},{n}) lies outside the {}x{} grid",
                        grid.rows, grid.cols
                    )));
                }
                if !lookup.contains_key(&CompartmentId::Overland { row: node.row, col: node.col }) {
                    return Err(KernelError::InvalidTopology(format!(
                        "channel node ({l},{n}) lies in inactive cell ({}, {})",
                        node.row, node.col
                    )));
                }
                let idx = lookup[&CompartmentId::Channel { link: l, node: n }];
                if node_cells.insert((node.row, node.col), (idx, node)).is_some() {
                    return Err(KernelError::InvalidTopology(format!(
                        "two channel nodes occupy cell ({}, {})",
                        node.row, node.col
                    )));
                }
            }
        }

        let mut neighbors = vec![Neighborhood::default(); ids.len()];
        let mut geometry = Vec::with_capacity(ids.len());
        let mut outlets = Vec::new();

        // ── Overland cells ───────────────────────────────────────────────────
        let cell_area = grid.cell_size * grid.cell_size;
        for i in 0..n_overland {
            let CompartmentId::Overland { row, col } = ids[i] else {
                continue;
            };
            for s in Source::CARDINAL {
                let Some((dr, dc)) = s.offset() else { continue };
                let nr = row as isize + dr;
                let nc = col as isize + dc;
                if nr < 0 || nc < 0 {
                    continue;
                }
                let id = CompartmentId::Overland { row: nr as usize, col: nc as usize };
                if let Some(&n) = lookup.get(&id) {
                    neighbors[i].slots[s.index()] = Some(n);
                }
            }
            let mut area = cell_area;
            if let Some(&(ch, node)) = node_cells.get(&(row, col)) {
                neighbors[i].slots[Source::Floodplain.index()] = Some(ch);
                area -= node.top_width() * node.length;
            }
            geometry.push(Geometry::Overland { area: area.max(0.0) });
        }

        for &(r, c) in &grid.outlets {
            let Some(&i) = lookup.get(&CompartmentId::Overland { row: r, col: c }) else {
                return Err(KernelError::InvalidTopology(format!(
                    "outlet ({r}, {c}) is not an active overland cell"
                )));
            };
            neighbors[i].boundary = true;
            outlets.push(i);
        }

        // ── Channel nodes ────────────────────────────────────────────────────
        let mut upstream: Vec<Vec<usize>> = vec![Vec::new(); links.len()];
        for (l, link) in links.iter().enumerate() {
            if let Some(d) = link.downstream {
                upstream[d].push(l);
            }
        }

        for (l, link) in links.iter().enumerate() {
            let len = link.nodes.len();
            for (n, node) in link.nodes.iter().enumerate() {
                let idx = lookup[&CompartmentId::Channel { link: l, node: n }];

                let mut adjacent: Vec<(usize, usize)> = Vec::new();
                if n > 0 {
                    adjacent.push((l, n - 1));
                } else {
                    adjacent.extend(upstream[l].iter().map(|&u| (u, links[u].nodes.len() - 1)));
                }
                if n + 1 < len {
                    adjacent.push((l, n + 1));
                } else if let Some(d) = link.downstream {
                    adjacent.push((d, 0));
                }

                for (nl, nn) in adjacent {
                    let other = &links[nl].nodes[nn];
                    let dr = other.row as isize - node.row as isize;
                    let dc = other.col as isize - node.col as isize;
                    let slot = Source::from_offset(dr, dc).ok_or_else(|| {
                        KernelError::InvalidTopology(format!(
                            "channel nodes ({l},{n}) and ({nl},{nn}) are not in adjacent cells"
                        ))
                    })?;
                    neighbors[idx].slots[slot.index()] =
                        Some(lookup[&CompartmentId::Channel { link: nl, node: nn }]);
                }

                if n + 1 == len && link.outlet {
                    neighbors[idx].boundary = true;
                    outlets.push(idx);
                }
                if let Some(&ov) = lookup.get(&CompartmentId::Overland { row: node.row, col: node.col }) {
                    neighbors[idx].slots[Source::Floodplain.index()] = Some(ov);
                }
                geometry.push(Geometry::Channel {
                    length: node.length,
                    bottom_width: node.bottom_width,
                    side_slope: node.side_slope,
                });
            }
        }

        Ok(Self {
            ids,
            lookup,
            neighbors,
            geometry,
            outlets,
            n_overland,
            rows: grid.rows,
            cols: grid.cols,
            cell_size: grid.cell_size,
            x_origin: grid.x_origin,
            y_origin: grid.y_origin,
            link_lengths: links.iter().map(|l| l.nodes.len()).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn n_overland(&self) -> usize {
        self.n_overland
    }

    #[inline]
    pub fn id(&self, index: usize) -> CompartmentId {
        self.ids[index]
    }

    pub fn index_of(&self, id: CompartmentId) -> Option<usize> {
        self.lookup.get(&id).copied()
    }

    #[inline]
    pub fn neighbors(&self, index: usize) -> &Neighborhood {
        &self.neighbors[index]
    }

    #[inline]
    pub fn geometry(&self, index: usize) -> &Geometry {
        &self.geometry[index]
    }

    pub fn is_channel(&self, index: usize) -> bool {
        index >= self.n_overland
    }

    /// Outlet compartments in declaration order (overland first).
    pub fn outlets(&self) -> &[usize] {
        &self.outlets
    }

    /// (rows, cols, cell size, x origin, y origin) of the overland grid.
    pub fn grid_shape(&self) -> (usize, usize, f64, f64, f64) {
        (self.rows, self.cols, self.cell_size, self.x_origin, self.y_origin)
    }

    /// Node count of every channel link.
    pub fn link_lengths(&self) -> &[usize] {
        &self.link_lengths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(row: usize, col: usize) -> ChannelNode {
        ChannelNode {
            row,
            col,
            length: 10.0,
            bottom_width: 2.0,
            side_slope: 0.0,
            bank_height: 1.0,
        }
    }

    /// Two headwater links joining into an outlet link:
    ///
    /// ```text
    ///   0: (0,0) → (1,0) ┐
    ///                    ├→ 2: (2,1) → (3,1) → outlet
    ///   1: (0,2) → (1,2) ┘
    /// ```
    fn y_network() -> ChannelNetwork {
        ChannelNetwork {
            links: vec![
                ChannelLink { nodes: vec![node(0, 0), node(1, 0)], downstream: Some(2), outlet: false },
                ChannelLink { nodes: vec![node(0, 2), node(1, 2)], downstream: Some(2), outlet: false },
                ChannelLink { nodes: vec![node(2, 1), node(3, 1)], downstream: None, outlet: true },
            ],
        }
    }

    #[test]
    fn opposite_slots_pair_up() {
        assert_eq!(Source::North.opposite(), Source::South);
        assert_eq!(Source::NorthEast.opposite(), Source::SouthWest);
        assert_eq!(Source::West.opposite(), Source::East);
        assert_eq!(Source::Floodplain.opposite(), Source::Floodplain);
        for s in Source::COMPASS {
            assert_eq!(s.opposite().opposite(), s);
        }
    }

    #[test]
    fn overland_corner_has_two_neighbours() {
        let topo = Topology::build(&OverlandGrid::new(3, 3, 10.0), None).unwrap();
        let corner = topo.index_of(CompartmentId::Overland { row: 0, col: 0 }).unwrap();
        let live: Vec<Source> = topo.neighbors(corner).compass().map(|(s, _)| s).collect();
        assert_eq!(live, vec![Source::East, Source::South]);

        let centre = topo.index_of(CompartmentId::Overland { row: 1, col: 1 }).unwrap();
        assert_eq!(topo.neighbors(centre).compass().count(), 4);
    }

    #[test]
    fn inactive_cells_are_skipped() {
        let mut grid = OverlandGrid::new(2, 2, 10.0);
        grid.active = vec![true, false, true, true];
        let topo = Topology::build(&grid, None).unwrap();
        assert_eq!(topo.len(), 3);
        let a = topo.index_of(CompartmentId::Overland { row: 0, col: 0 }).unwrap();
        assert_eq!(topo.neighbors(a).neighbor(Source::East), None);
    }

    #[test]
    fn mask_length_mismatch_is_fatal() {
        let mut grid = OverlandGrid::new(2, 2, 10.0);
        grid.active = vec![true; 3];
        assert!(matches!(
            Topology::build(&grid, None),
            Err(KernelError::TopologyMismatch { expected: 4, found: 3, .. })
        ));
    }

    #[test]
    fn junction_resolves_branch_slots() {
        let grid = OverlandGrid::new(4, 3, 10.0);
        let topo = Topology::build(&grid, Some(&y_network())).unwrap();
        let junction = topo.index_of(CompartmentId::Channel { link: 2, node: 0 }).unwrap();
        let nb = topo.neighbors(junction);
        let from_0 = topo.index_of(CompartmentId::Channel { link: 0, node: 1 }).unwrap();
        let from_1 = topo.index_of(CompartmentId::Channel { link: 1, node: 1 }).unwrap();
        let down = topo.index_of(CompartmentId::Channel { link: 2, node: 1 }).unwrap();
        assert_eq!(nb.neighbor(Source::NorthWest), Some(from_0));
        assert_eq!(nb.neighbor(Source::NorthEast), Some(from_1));
        assert_eq!(nb.neighbor(Source::South), Some(down));
        assert!(!nb.boundary);

        // The upstream branch sees the junction in the opposite slot.
        assert_eq!(topo.neighbors(from_0).neighbor(Source::SouthEast), Some(junction));
        assert!(topo.neighbors(down).boundary);
        assert_eq!(topo.outlets(), &[down]);
    }

    #[test]
    fn dual_cells_link_floodplain_and_lose_channel_area() {
        let grid = OverlandGrid::new(4, 3, 10.0);
        let topo = Topology::build(&grid, Some(&y_network())).unwrap();
        let ov = topo.index_of(CompartmentId::Overland { row: 2, col: 1 }).unwrap();
        let ch = topo.index_of(CompartmentId::Channel { link: 2, node: 0 }).unwrap();
        assert_eq!(topo.neighbors(ov).floodplain(), Some(ch));
        assert_eq!(topo.neighbors(ch).floodplain(), Some(ov));
        assert_eq!(*topo.geometry(ov), Geometry::Overland { area: 100.0 - 2.0 * 10.0 });
        assert!(topo.is_channel(ch) && !topo.is_channel(ov));
    }

    #[test]
    fn non_adjacent_nodes_rejected() {
        let grid = OverlandGrid::new(4, 4, 10.0);
        let net = ChannelNetwork {
            links: vec![ChannelLink { nodes: vec![node(0, 0), node(2, 0)], downstream: None, outlet: true }],
        };
        assert!(matches!(Topology::build(&grid, Some(&net)), Err(KernelError::InvalidTopology(_))));
    }

    #[test]
    fn shared_cell_rejected() {
        let grid = OverlandGrid::new(4, 4, 10.0);
        let net = ChannelNetwork {
            links: vec![
                ChannelLink { nodes: vec![node(0, 0)], downstream: None, outlet: false },
                ChannelLink { nodes: vec![node(0, 0)], downstream: None, outlet: false },
            ],
        };
        assert!(Topology::build(&grid, Some(&net)).is_err());
    }

    #[test]
    fn node_in_inactive_cell_rejected() {
        let mut grid = OverlandGrid::new(2, 2, 10.0);
        grid.active = vec![true, false, true, true];
        let net = ChannelNetwork {
            links: vec![ChannelLink { nodes: vec![node(0, 0), node(0, 1)], downstream: None, outlet: true }],
        };
        assert!(matches!(
            Topology::build(&grid, Some(&net)),
            Err(KernelError::InvalidTopology(_))
        ));
    }

    #[test]
    fn trapezoid_volume() {
        let g = Geometry::Channel { length: 10.0, bottom_width: 2.0, side_slope: 1.0 };
        // (2 + 1·0.5)·0.5·10
        assert!((g.water_volume(0.5) - 12.5).abs() < 1e-12);
        assert!((g.bed_area() - 20.0).abs() < 1e-12);
        assert_eq!(g.water_volume(-1.0), 0.0);
    }
}
