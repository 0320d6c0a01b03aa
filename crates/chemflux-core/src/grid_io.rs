//! ASCII grid and channel-field text formats for concentration dumps and
//! initial conditions.
//!
//! Overland fields use the ESRI ASCII grid layout:
//!
//! ```text
//! ncols        4
//! nrows        3
//! xllcorner    0.0
//! yllcorner    0.0
//! cellsize     30.0
//! NODATA_value -9999
//! 0.1 0.2 0.3 0.4      <- row 0
//! ...
//! ```
//!
//! Channel fields list one line per link after a `links N` header:
//!
//! ```text
//! links 2
//! 0 3 1.5 1.2 0.9
//! 1 2 0.4 0.4
//! ```
//!
//! Fields handed to and returned from the kernel are flat vectors in
//! topology order; inactive cells become NODATA on write.
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use crate::error::{ensure_len, KernelError, Result};
use crate::state::ChemState;
use crate::topology::{CompartmentId, Layer, Topology};

pub const DEFAULT_NODATA: f64 = -9999.0;

fn format_error(line: usize, message: impl Into<String>) -> KernelError {
    KernelError::GridFormat { line, message: message.into() }
}

fn parse<T: FromStr>(token: &str, line: usize, what: &str) -> Result<T> {
    token
        .parse()
        .map_err(|_| format_error(line, format!("cannot parse {what} from '{token}'")))
}

// ── Overland grids ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct AsciiGrid {
    pub ncols: usize,
    pub nrows: usize,
    pub xllcorner: f64,
    pub yllcorner: f64,
    pub cellsize: f64,
    pub nodata: f64,
    /// Row-major, row 0 first.
    pub values: Vec<f64>,
}

impl AsciiGrid {
    pub fn filled(nrows: usize, ncols: usize, cellsize: f64, value: f64) -> Self {
        Self {
            ncols,
            nrows,
            xllcorner: 0.0,
            yllcorner: 0.0,
            cellsize,
            nodata: DEFAULT_NODATA,
            values: vec![value; nrows * ncols],
        }
    }

    /// Value at (row, col); `None` outside the grid or on NODATA.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.nrows || col >= self.ncols {
            return None;
        }
        let v = self.values[row * self.ncols + col];
        (v != self.nodata).then_some(v)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read(BufReader::new(File::open(path)?))
    }

    pub fn read<R: BufRead>(reader: R) -> Result<Self> {
        let mut ncols = None;
        let mut nrows = None;
        let mut xllcorner = 0.0;
        let mut yllcorner = 0.0;
        let mut cellsize = None;
        let mut nodata = DEFAULT_NODATA;
        let mut values = Vec::new();
        let mut last_line = 0;

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let n = i + 1;
            last_line = n;
            let mut tokens = line.split_whitespace().peekable();
            let Some(&first) = tokens.peek() else { continue };

            if first.starts_with(|c: char| c.is_ascii_alphabetic()) {
                if !values.is_empty() {
                    return Err(format_error(n, format!("header key '{first}' after data")));
                }
                let key = first.to_ascii_lowercase();
                tokens.next();
                let value = tokens.next().ok_or_else(|| format_error(n, format!("'{first}' has no value")))?;
                match key.as_str() {
                    "ncols" => ncols = Some(parse::<usize>(value, n, "ncols")?),
                    "nrows" => nrows = Some(parse::<usize>(value, n, "nrows")?),
                    "xllcorner" | "xllcenter" => xllcorner = parse(value, n, "xllcorner")?,
                    "yllcorner" | "yllcenter" => yllcorner = parse(value, n, "yllcorner")?,
                    "cellsize" => cellsize = Some(parse::<f64>(value, n, "cellsize")?),
                    "nodata_value" => nodata = parse(value, n, "NODATA_value")?,
                    _ => return Err(format_error(n, format!("unknown header key '{first}'"))),
                }
                continue;
            }

            let (Some(nc), Some(_)) = (ncols, nrows) else {
                return Err(format_error(n, "data before ncols and nrows"));
            };
            let row: Vec<f64> = tokens.map(|t| parse(t, n, "cell value")).collect::<Result<_>>()?;
            if row.len() != nc {
                return Err(format_error(n, format!("expected {nc} values, found {}", row.len())));
            }
            values.extend(row);
        }

        let ncols = ncols.ok_or_else(|| format_error(last_line, "missing ncols"))?;
        let nrows = nrows.ok_or_else(|| format_error(last_line, "missing nrows"))?;
        let cellsize = cellsize.ok_or_else(|| format_error(last_line, "missing cellsize"))?;
        if values.len() != nrows * ncols {
            return Err(format_error(
                last_line,
                format!("expected {nrows} rows, found {}", values.len() / ncols.max(1)),
            ));
        }
        Ok(Self { ncols, nrows, xllcorner, yllcorner, cellsize, nodata, values })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        self.write(&mut w)?;
        w.flush()?;
        Ok(())
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        writeln!(w, "ncols        {}", self.ncols)?;
        writeln!(w, "nrows        {}", self.nrows)?;
        writeln!(w, "xllcorner    {}", self.xllcorner)?;
        writeln!(w, "yllcorner    {}", self.yllcorner)?;
        writeln!(w, "cellsize     {}", self.cellsize)?;
        writeln!(w, "NODATA_value {}", self.nodata)?;
        for row in self.values.chunks(self.ncols.max(1)) {
            let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(w, "{}", line.join(" "))?;
        }
        Ok(())
    }
}

// ── Channel fields ────────────────────────────────────────────────────────────

/// Per-node values of every channel link.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelField {
    pub links: Vec<Vec<f64>>,
}

impl ChannelField {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read(BufReader::new(File::open(path)?))
    }

    pub fn read<R: BufRead>(reader: R) -> Result<Self> {
        let mut n_links = None;
        let mut links: Vec<Vec<f64>> = Vec::new();
        let mut last_line = 0;

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let n = i + 1;
            last_line = n;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            let Some(expected) = n_links else {
                if tokens.len() != 2 || !tokens[0].eq_ignore_ascii_case("links") {
                    return Err(format_error(n, "expected 'links N' header"));
                }
                n_links = Some(parse::<usize>(tokens[1], n, "link count")?);
                continue;
            };

            if links.len() == expected {
                return Err(format_error(n, format!("more than {expected} links")));
            }
            if tokens.len() < 2 {
                return Err(format_error(n, "expected 'link nnodes values...'"));
            }
            let link: usize = parse(tokens[0], n, "link index")?;
            if link != links.len() {
                return Err(format_error(n, format!("expected link {}, found {link}", links.len())));
            }
            let nnodes: usize = parse(tokens[1], n, "node count")?;
            if tokens.len() - 2 != nnodes {
                return Err(format_error(n, format!("link {link}: expected {nnodes} values, found {}", tokens.len() - 2)));
            }
            links.push(tokens[2..].iter().map(|t| parse(t, n, "node value")).collect::<Result<_>>()?);
        }

        let expected = n_links.ok_or_else(|| format_error(last_line, "missing 'links N' header"))?;
        if links.len() != expected {
            return Err(format_error(last_line, format!("expected {expected} links, found {}", links.len())));
        }
        Ok(Self { links })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        self.write(&mut w)?;
        w.flush()?;
        Ok(())
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        writeln!(w, "links {}", self.links.len())?;
        for (l, nodes) in self.links.iter().enumerate() {
            write!(w, "{l} {}", nodes.len())?;
            for v in nodes {
                write!(w, " {v}")?;
            }
            writeln!(w)?;
        }
        Ok(())
    }
}

// ── Topology-ordered fields ───────────────────────────────────────────────────

/// Lay the overland part of a topology-ordered field onto the grid.
pub fn overland_grid(topology: &Topology, values: &[f64]) -> Result<AsciiGrid> {
    ensure_len("field compartments", topology.len(), values.len())?;
    let (rows, cols, cell_size, x0, y0) = topology.grid_shape();
    let mut grid = AsciiGrid::filled(rows, cols, cell_size, DEFAULT_NODATA);
    grid.xllcorner = x0;
    grid.yllcorner = y0;
    for (i, &v) in values.iter().enumerate().take(topology.n_overland()) {
        if let CompartmentId::Overland { row, col } = topology.id(i) {
            grid.values[row * cols + col] = v;
        }
    }
    Ok(grid)
}

/// Read the overland part of a topology-ordered field from a grid.
/// Every active cell must hold data.
pub fn overland_values(topology: &Topology, grid: &AsciiGrid) -> Result<Vec<f64>> {
    let (rows, cols, ..) = topology.grid_shape();
    ensure_len("grid rows", rows, grid.nrows)?;
    ensure_len("grid columns", cols, grid.ncols)?;
    (0..topology.n_overland())
        .map(|i| match topology.id(i) {
            CompartmentId::Overland { row, col } => grid.get(row, col).ok_or_else(|| {
                // Header is six lines.
                format_error(7 + row, format!("active cell ({row}, {col}) is NODATA"))
            }),
            CompartmentId::Channel { .. } => Ok(0.0),
        })
        .collect()
}

pub fn channel_field(topology: &Topology, values: &[f64]) -> Result<ChannelField> {
    ensure_len("field compartments", topology.len(), values.len())?;
    let mut rest = &values[topology.n_overland()..];
    let mut links = Vec::with_capacity(topology.link_lengths().len());
    for &n in topology.link_lengths() {
        let (link, tail) = rest.split_at(n);
        links.push(link.to_vec());
        rest = tail;
    }
    Ok(ChannelField { links })
}

pub fn channel_values(topology: &Topology, field: &ChannelField) -> Result<Vec<f64>> {
    ensure_len("channel field links", topology.link_lengths().len(), field.links.len())?;
    let mut out = Vec::with_capacity(topology.len() - topology.n_overland());
    for (&n, link) in topology.link_lengths().iter().zip(&field.links) {
        ensure_len("channel field nodes", n, link.len())?;
        out.extend_from_slice(link);
    }
    Ok(out)
}

/// Dump one chemical's concentration in one layer.  The channel field is
/// `None` for a domain without channels.
pub fn export_layer(
    topology: &Topology,
    state: &ChemState,
    chem: usize,
    layer: Layer,
) -> Result<(AsciiGrid, Option<ChannelField>)> {
    let field = state.layer_field(chem, layer);
    let grid = overland_grid(topology, &field)?;
    let channels = if topology.link_lengths().is_empty() {
        None
    } else {
        Some(channel_field(topology, &field)?)
    };
    Ok((grid, channels))
}

/// Load one chemical's concentration in one layer.  Channel nodes are set
/// to zero when no channel field is given.
pub fn import_layer(
    topology: &Topology,
    state: &mut ChemState,
    chem: usize,
    layer: Layer,
    grid: &AsciiGrid,
    channels: Option<&ChannelField>,
) -> Result<()> {
    let mut field = overland_values(topology, grid)?;
    match channels {
        Some(ch) => field.extend(channel_values(topology, ch)?),
        None => field.resize(topology.len(), 0.0),
    }
    state.set_layer_field(chem, layer, &field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{ChannelLink, ChannelNetwork, ChannelNode, OverlandGrid};

    const SAMPLE: &str = "\
ncols 3
nrows 2
xllcorner 100.0
yllcorner 200.0
cellsize 10
NODATA_value -9999
1 2 3
4 -9999 6
";

    #[test]
    fn reads_header_and_rows() {
        let g = AsciiGrid::read(SAMPLE.as_bytes()).unwrap();
        assert_eq!((g.nrows, g.ncols), (2, 3));
        assert_eq!(g.xllcorner, 100.0);
        assert_eq!(g.get(0, 2), Some(3.0));
        assert_eq!(g.get(1, 1), None);
        assert_eq!(g.get(2, 0), None);
    }

    #[test]
    fn written_grid_reads_back() {
        let mut g = AsciiGrid::filled(2, 2, 5.0, 0.0);
        g.values = vec![0.1, 1.0e-12, 3.25, DEFAULT_NODATA];
        let mut buf = Vec::new();
        g.write(&mut buf).unwrap();
        assert_eq!(AsciiGrid::read(buf.as_slice()).unwrap(), g);
    }

    #[test]
    fn malformed_grids_name_the_line() {
        let short_row = SAMPLE.replace("4 -9999 6", "4 5");
        match AsciiGrid::read(short_row.as_bytes()) {
            Err(KernelError::GridFormat { line, .. }) => assert_eq!(line, 8),
            other => panic!("unexpected {other:?}"),
        }

        let bad_key = SAMPLE.replace("cellsize", "cellsise");
        assert!(matches!(AsciiGrid::read(bad_key.as_bytes()), Err(KernelError::GridFormat { line: 5, .. })));

        let missing_row = SAMPLE.replace("4 -9999 6\n", "");
        assert!(matches!(AsciiGrid::read(missing_row.as_bytes()), Err(KernelError::GridFormat { .. })));

        let no_dims = "cellsize 1\n1 2\n";
        assert!(matches!(AsciiGrid::read(no_dims.as_bytes()), Err(KernelError::GridFormat { line: 2, .. })));
    }

    #[test]
    fn channel_field_format() {
        let text = "links 2\n0 3 1.5 1.2 0.9\n1 1 0.4\n";
        let f = ChannelField::read(text.as_bytes()).unwrap();
        assert_eq!(f.links, vec![vec![1.5, 1.2, 0.9], vec![0.4]]);

        let mut buf = Vec::new();
        f.write(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), text);

        assert!(ChannelField::read("links 2\n0 1 1.0\n".as_bytes()).is_err());
        assert!(ChannelField::read("links 1\n0 2 1.0\n".as_bytes()).is_err());
        assert!(ChannelField::read("0 1 1.0\n".as_bytes()).is_err());
    }

    fn masked_with_channel() -> Topology {
        let mut grid = OverlandGrid::new(2, 2, 10.0);
        grid.active = vec![true, true, false, true];
        let node = |row, col| ChannelNode {
            row,
            col,
            length: 10.0,
            bottom_width: 1.0,
            side_slope: 0.0,
            bank_height: 1.0,
        };
        let net = ChannelNetwork {
            links: vec![ChannelLink { nodes: vec![node(0, 0), node(0, 1)], downstream: None, outlet: true }],
        };
        Topology::build(&grid, Some(&net)).unwrap()
    }

    #[test]
    fn layer_export_and_import() {
        let topo = masked_with_channel();
        assert_eq!(topo.len(), 5);
        let mut state = ChemState::new(1, topo.len(), 0, 0);
        state.set_layer_field(0, Layer::WaterColumn, &[1.0, 2.0, 3.0, 7.0, 8.0]).unwrap();

        let (grid, channels) = export_layer(&topo, &state, 0, Layer::WaterColumn).unwrap();
        assert_eq!(grid.values, vec![1.0, 2.0, DEFAULT_NODATA, 3.0]);
        let channels = channels.unwrap();
        assert_eq!(channels.links, vec![vec![7.0, 8.0]]);

        let mut restored = ChemState::new(1, topo.len(), 0, 0);
        import_layer(&topo, &mut restored, 0, Layer::WaterColumn, &grid, Some(&channels)).unwrap();
        assert_eq!(restored.layer_field(0, Layer::WaterColumn), state.layer_field(0, Layer::WaterColumn));

        import_layer(&topo, &mut restored, 0, Layer::WaterColumn, &grid, None).unwrap();
        assert_eq!(restored.layer_field(0, Layer::WaterColumn), vec![1.0, 2.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn import_rejects_wrong_shape_and_nodata_in_active_cells() {
        let topo = masked_with_channel();
        let mut state = ChemState::new(1, topo.len(), 0, 0);

        let wrong = AsciiGrid::filled(3, 2, 10.0, 1.0);
        assert!(matches!(
            import_layer(&topo, &mut state, 0, Layer::WaterColumn, &wrong, None),
            Err(KernelError::TopologyMismatch { expected: 2, found: 3, .. })
        ));

        let mut holes = AsciiGrid::filled(2, 2, 10.0, 1.0);
        holes.values[3] = DEFAULT_NODATA;
        assert!(matches!(
            import_layer(&topo, &mut state, 0, Layer::WaterColumn, &holes, None),
            Err(KernelError::GridFormat { line: 8, .. })
        ));

        let short = ChannelField { links: vec![vec![1.0]] };
        let full = AsciiGrid::filled(2, 2, 10.0, 1.0);
        assert!(import_layer(&topo, &mut state, 0, Layer::WaterColumn, &full, Some(&short)).is_err());
    }
}
