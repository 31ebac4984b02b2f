use crate::boundary::{Bounds, Coord, Region};
use crate::colors::Color;

/// Added to the slope denominator so a ring edge that is exactly level with
/// the test point can't divide by zero.
const SLOPE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridDims {
    pub cols: u32,
    pub rows: u32,
}

impl GridDims {
    pub const fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }

    pub const fn len(&self) -> usize {
        self.cols as usize * self.rows as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.cols == 0 || self.rows == 0
    }

    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x < self.cols && y < self.rows
    }

    /// Row-major index of `(x, y)`, or `None` when out of range.
    pub const fn index(&self, x: u32, y: u32) -> Option<usize> {
        if self.contains(x, y) {
            Some(y as usize * self.cols as usize + x as usize)
        } else {
            None
        }
    }
}

/// Geographic window the grid covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl Extent {
    /// Approximate envelope of Turkey, the default deployment.
    pub const TURKEY: Self = Self {
        min_lon: 25.0,
        max_lon: 45.0,
        min_lat: 35.5,
        max_lat: 42.1,
    };

    /// Union envelope of every vertex of every region.
    pub fn envelope(regions: &[Region]) -> Option<Self> {
        let bounds = regions
            .iter()
            .fold(Bounds::EMPTY, |acc, r| acc.union(&r.bounds));
        if bounds.is_empty() {
            return None;
        }
        Some(Self {
            min_lon: bounds.min_x,
            max_lon: bounds.max_x,
            min_lat: bounds.min_y,
            max_lat: bounds.max_y,
        })
    }

    /// Center coordinate of cell `(x, y)`. Row 0 is the northern edge.
    pub fn cell_center(&self, dims: GridDims, x: u32, y: u32) -> Coord {
        let lon = (x as f64 + 0.5) / dims.cols as f64 * (self.max_lon - self.min_lon) + self.min_lon;
        let lat = (dims.rows as f64 - y as f64 - 0.5) / dims.rows as f64
            * (self.max_lat - self.min_lat)
            + self.min_lat;
        [lon, lat]
    }
}

/// How the rasterized window is chosen. Must stay the same for the whole
/// session: switching mid-session would move every cell's geography.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtentPolicy {
    Fixed(Extent),
    Dynamic,
}

impl ExtentPolicy {
    pub fn resolve(&self, regions: &[Region]) -> Option<Extent> {
        match self {
            Self::Fixed(extent) => Some(*extent),
            Self::Dynamic => Extent::envelope(regions),
        }
    }
}

/// Even-odd ray casting test of `(x, y)` against one ring.
pub fn point_in_ring(x: f64, y: f64, ring: &[Coord]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let [xi, yi] = ring[i];
        let [xj, yj] = ring[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi + SLOPE_EPSILON) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Index of the first region (declaration order) with any ring containing the point.
///
/// Every ring is tested on its own, holes included: overlap and nesting are
/// resolved purely by order, not by area.
pub fn classify(x: f64, y: f64, regions: &[Region]) -> Option<usize> {
    regions.iter().position(|region| {
        region.bounds.contains(x, y)
            && region
                .polygons
                .iter()
                .flatten()
                .any(|ring| point_in_ring(x, y, ring))
    })
}

/// Rasterized base layer: the color and region each cell starts with.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseGrid {
    dims: GridDims,
    colors: Vec<Option<Color>>,
    cell_regions: Vec<Option<u32>>,
    region_names: Vec<String>,
}

impl BaseGrid {
    /// A grid with every cell outside all regions.
    pub fn empty(dims: GridDims) -> Self {
        Self {
            dims,
            colors: vec![None; dims.len()],
            cell_regions: vec![None; dims.len()],
            region_names: Vec::new(),
        }
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn color(&self, x: u32, y: u32) -> Option<Color> {
        self.dims.index(x, y).and_then(|i| self.colors[i])
    }

    pub fn region(&self, x: u32, y: u32) -> Option<&str> {
        let i = self.dims.index(x, y)?;
        let region = self.cell_regions[i]?;
        self.region_names.get(region as usize).map(String::as_str)
    }

    pub fn colors(&self) -> &[Option<Color>] {
        &self.colors
    }

    pub fn region_names(&self) -> &[String] {
        &self.region_names
    }

    /// Number of cells that belong to some region.
    pub fn claimable_cells(&self) -> usize {
        self.cell_regions.iter().filter(|r| r.is_some()).count()
    }
}

/// Classify every cell center of a `dims` grid over `extent`.
pub fn rasterize(regions: &[Region], dims: GridDims, extent: &Extent) -> BaseGrid {
    let mut grid = BaseGrid::empty(dims);
    grid.region_names = regions.iter().map(|r| r.name.clone()).collect();

    for y in 0..dims.rows {
        for x in 0..dims.cols {
            let [lon, lat] = extent.cell_center(dims, x, y);
            let Some(region) = classify(lon, lat, regions) else {
                continue;
            };
            let i = y as usize * dims.cols as usize + x as usize;
            grid.colors[i] = Some(regions[region].color);
            grid.cell_regions[i] = Some(region as u32);
        }
    }

    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(min: f64, max: f64) -> Vec<Coord> {
        vec![[min, min], [max, min], [max, max], [min, max], [min, min]]
    }

    fn two_regions() -> Vec<Region> {
        vec![
            Region::new("West", vec![vec![square(0.0, 4.0)]], 0),
            Region::new("East", vec![vec![square(6.0, 10.0)]], 1),
        ]
    }

    const UNIT: Extent = Extent {
        min_lon: 0.0,
        max_lon: 10.0,
        min_lat: 0.0,
        max_lat: 10.0,
    };

    #[test]
    fn ray_casting_handles_interior_exterior_and_concave_rings() {
        let l_shape = vec![[0.0, 0.0], [4.0, 0.0], [4.0, 1.0], [1.0, 1.0], [1.0, 4.0], [0.0, 4.0]];
        assert!(point_in_ring(0.5, 0.5, &l_shape));
        assert!(point_in_ring(0.5, 3.5, &l_shape));
        assert!(!point_in_ring(3.0, 3.0, &l_shape));
        assert!(!point_in_ring(-1.0, 0.5, &l_shape));
        assert!(!point_in_ring(0.5, 0.5, &l_shape[..2]));
    }

    #[test]
    fn level_edge_does_not_divide_by_zero() {
        let ring = square(0.0, 2.0);
        // y == 0.0 lies exactly on the bottom edge's level.
        assert!(point_in_ring(1.0, 0.0, &ring));
        assert!(!point_in_ring(5.0, 0.0, &ring));
        assert!(!point_in_ring(1.0, 2.5, &ring));
    }

    #[test]
    fn interior_point_classifies_to_its_region_and_far_point_is_unclaimed() {
        let regions = two_regions();
        assert_eq!(classify(2.0, 2.0, &regions), Some(0));
        assert_eq!(classify(8.0, 8.0, &regions), Some(1));
        assert_eq!(classify(500.0, -300.0, &regions), None);
        assert_eq!(classify(5.0, 5.0, &regions), None);
    }

    #[test]
    fn overlapping_regions_resolve_by_declaration_order() {
        let regions = vec![
            Region::new("First", vec![vec![square(0.0, 5.0)]], 0),
            Region::new("Second", vec![vec![square(0.0, 10.0)]], 1),
        ];
        assert_eq!(classify(2.0, 2.0, &regions), Some(0));
        assert_eq!(classify(8.0, 8.0, &regions), Some(1));
    }

    #[test]
    fn multipolygon_regions_match_any_part() {
        let regions = vec![Region::new(
            "Islands",
            vec![vec![square(0.0, 1.0)], vec![square(8.0, 9.0)]],
            0,
        )];
        assert_eq!(classify(0.5, 0.5, &regions), Some(0));
        assert_eq!(classify(8.5, 8.5, &regions), Some(0));
        assert_eq!(classify(4.5, 4.5, &regions), None);
    }

    #[test]
    fn row_zero_is_north() {
        let dims = GridDims::new(10, 10);
        let [lon, lat] = UNIT.cell_center(dims, 0, 0);
        assert!((lon - 0.5).abs() < 1e-9);
        assert!((lat - 9.5).abs() < 1e-9);
        let [_, lat_south] = UNIT.cell_center(dims, 0, 9);
        assert!((lat_south - 0.5).abs() < 1e-9);
    }

    #[test]
    fn rasterize_is_deterministic() {
        let regions = two_regions();
        let dims = GridDims::new(40, 30);
        let a = rasterize(&regions, dims, &UNIT);
        let b = rasterize(&regions, dims, &UNIT);
        assert_eq!(a, b);
        assert!(a.claimable_cells() > 0);
    }

    #[test]
    fn rasterize_assigns_region_colors_and_names() {
        let regions = two_regions();
        let dims = GridDims::new(10, 10);
        let grid = rasterize(&regions, dims, &UNIT);

        // Cell (1, 8) has center (1.5, 1.5): inside West.
        assert_eq!(grid.region(1, 8), Some("West"));
        assert_eq!(grid.color(1, 8), Some(regions[0].color));
        // Cell (8, 1) has center (8.5, 8.5): inside East.
        assert_eq!(grid.region(8, 1), Some("East"));
        // Gap between the squares.
        assert_eq!(grid.region(5, 5), None);
        assert_eq!(grid.color(5, 5), None);
        // Out of range lookups.
        assert_eq!(grid.region(10, 0), None);
        assert_eq!(grid.color(0, 10), None);
    }

    #[test]
    fn dynamic_extent_is_union_envelope() {
        let regions = two_regions();
        let extent = ExtentPolicy::Dynamic
            .resolve(&regions)
            .expect("non-empty regions have an envelope");
        assert_eq!(extent, UNIT);
        assert_eq!(
            ExtentPolicy::Fixed(Extent::TURKEY).resolve(&regions),
            Some(Extent::TURKEY)
        );
        assert_eq!(ExtentPolicy::Dynamic.resolve(&[]), None);
    }
}
