//! Board generation: uniform diamond placement plus precomputed
//! adjacency counts.

use rand::seq::SliceRandom;
use rand::Rng;

pub const MIN_FIELD_SIZE: u8 = 2;
pub const MAX_FIELD_SIZE: u8 = 5;

/// A generated board: diamond placement and the adjacent-diamond count for
/// every cell. Immutable once generated; cells are stored row-major
/// (`index = y * field_size + x`).
#[derive(Clone, Debug)]
pub struct Board {
    field_size: u8,
    diamonds: Vec<bool>,
    adjacency: Vec<u8>,
}

impl Board {
    /// Place `diamonds_count` diamonds uniformly at random on a
    /// `field_size x field_size` grid via a Fisher-Yates shuffle of all
    /// coordinates, then precompute Moore-neighborhood adjacency counts
    /// (8 neighbors, clipped at the grid boundary, no wraparound).
    ///
    /// Deterministic given the random stream. The caller validates params
    /// before calling; the preconditions are debug-asserted here.
    pub fn generate<R: Rng + ?Sized>(field_size: u8, diamonds_count: u32, rng: &mut R) -> Self {
        debug_assert!((MIN_FIELD_SIZE..=MAX_FIELD_SIZE).contains(&field_size));
        debug_assert!(diamonds_count % 2 == 1);
        debug_assert!(diamonds_count >= 1);
        debug_assert!(diamonds_count <= (field_size as u32).pow(2));

        let n = field_size as usize;

        let mut coords: Vec<(u8, u8)> = (0..field_size)
            .flat_map(|y| (0..field_size).map(move |x| (x, y)))
            .collect();
        coords.shuffle(rng);

        let mut diamonds = vec![false; n * n];
        for &(x, y) in coords.iter().take(diamonds_count as usize) {
            diamonds[y as usize * n + x as usize] = true;
        }

        let mut adjacency = vec![0u8; n * n];
        for y in 0..n {
            for x in 0..n {
                adjacency[y * n + x] = count_adjacent(&diamonds, x, y, n);
            }
        }

        Self {
            field_size,
            diamonds,
            adjacency,
        }
    }

    pub fn field_size(&self) -> u8 {
        self.field_size
    }

    pub fn is_diamond(&self, x: u8, y: u8) -> bool {
        self.diamonds[y as usize * self.field_size as usize + x as usize]
    }

    /// Adjacent-diamond count for a cell. Meaningless for diamond cells.
    pub fn adjacent_diamonds(&self, x: u8, y: u8) -> u8 {
        self.adjacency[y as usize * self.field_size as usize + x as usize]
    }

    pub fn diamond_count(&self) -> u32 {
        self.diamonds.iter().filter(|&&d| d).count() as u32
    }
}

/// Diamonds among the 8 grid neighbors of (x, y), clipped at boundaries.
fn count_adjacent(diamonds: &[bool], x: usize, y: usize, n: usize) -> u8 {
    let mut count = 0;
    for dy in -1i32..=1 {
        for dx in -1i32..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = x as i32 + dx;
            let ny = y as i32 + dy;
            if nx >= 0 && nx < n as i32 && ny >= 0 && ny < n as i32 {
                if diamonds[ny as usize * n + nx as usize] {
                    count += 1;
                }
            }
        }
    }
    count
}
