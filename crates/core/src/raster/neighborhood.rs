//! Neighborhood patterns for windowed and region-growing operations

/// Defines a neighborhood pattern around a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Neighborhood {
    /// 3x3 without corners (4-connectivity)
    Rook3x3,
    /// 3x3 neighborhood (8-connectivity)
    Queen3x3,
    /// Square window of given radius, `(2r+1) x (2r+1)` cells
    Square(usize),
}

impl Neighborhood {
    /// Neighborhood for a pixel connectivity of 4 or 8
    pub fn from_connectivity(connectivity: u8) -> Option<Self> {
        match connectivity {
            4 => Some(Neighborhood::Rook3x3),
            8 => Some(Neighborhood::Queen3x3),
            _ => None,
        }
    }

    /// Get the radius of the neighborhood
    pub fn radius(&self) -> usize {
        match self {
            Neighborhood::Queen3x3 | Neighborhood::Rook3x3 => 1,
            Neighborhood::Square(r) => *r,
        }
    }

    /// Get the size of the neighborhood (width and height)
    pub fn size(&self) -> usize {
        self.radius() * 2 + 1
    }

    /// Check if a relative position is within this neighborhood
    pub fn contains(&self, dr: isize, dc: isize) -> bool {
        match self {
            Neighborhood::Queen3x3 => dr.abs() <= 1 && dc.abs() <= 1,
            Neighborhood::Rook3x3 => (dr.abs() <= 1 && dc == 0) || (dr == 0 && dc.abs() <= 1),
            Neighborhood::Square(r) => {
                let r = *r as isize;
                dr.abs() <= r && dc.abs() <= r
            }
        }
    }

    /// Relative positions in this neighborhood, row-major
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        let r = self.radius() as isize;
        let mut offsets = Vec::new();

        for dr in -r..=r {
            for dc in -r..=r {
                if self.contains(dr, dc) {
                    offsets.push((dr, dc));
                }
            }
        }

        offsets
    }

    /// Offsets excluding the center cell
    pub fn offsets_no_center(&self) -> Vec<(isize, isize)> {
        self.offsets()
            .into_iter()
            .filter(|&(dr, dc)| dr != 0 || dc != 0)
            .collect()
    }

    /// In-bounds neighbors of `(row, col)` in a `rows x cols` grid, center excluded
    pub fn neighbors(&self, row: usize, col: usize, rows: usize, cols: usize) -> impl Iterator<Item = (usize, usize)> {
        self.offsets_no_center().into_iter().filter_map(move |(dr, dc)| {
            let r = row as isize + dr;
            let c = col as isize + dc;
            (r >= 0 && c >= 0 && (r as usize) < rows && (c as usize) < cols).then(|| (r as usize, c as usize))
        })
    }
}
