//! Per-cell terrain from 2D Perlin noise.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use protocol::Vector;
use protocol::types::{SubCell, TerrainType};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::CellCoord;

const OCTAVES: u32 = 3;
const LACUNARITY: f64 = 2.0;
const PERSISTENCE: f64 = 0.5;
/// Noise units per cell.
const CELL_SCALE: f64 = 0.5;

/// Seeded gradient noise.
#[derive(Debug, Clone)]
pub struct Perlin {
    perm: [u8; 512],
}

impl Perlin {
    pub fn new(seed: u64) -> Self {
        let mut base: Vec<u8> = (0..=255).collect();
        base.shuffle(&mut StdRng::seed_from_u64(seed));
        let mut perm = [0u8; 512];
        for (i, slot) in perm.iter_mut().enumerate() {
            *slot = base[i & 255];
        }
        Self { perm }
    }

    fn hash(&self, x: i32, y: i32) -> u8 {
        let hx = self.perm[(x & 255) as usize] as usize;
        self.perm[hx + (y & 255) as usize]
    }

    /// Noise in [-1, 1].
    pub fn noise2d(&self, x: f64, y: f64) -> f64 {
        let x0 = x.floor() as i32;
        let y0 = y.floor() as i32;
        let dx = x - x0 as f64;
        let dy = y - y0 as f64;

        let sx = fade(dx);
        let sy = fade(dy);

        let n00 = grad2(self.hash(x0, y0), dx, dy);
        let n10 = grad2(self.hash(x0 + 1, y0), dx - 1.0, dy);
        let n01 = grad2(self.hash(x0, y0 + 1), dx, dy - 1.0);
        let n11 = grad2(self.hash(x0 + 1, y0 + 1), dx - 1.0, dy - 1.0);

        let nx0 = lerp(n00, n10, sx);
        let nx1 = lerp(n01, n11, sx);
        lerp(nx0, nx1, sy).clamp(-1.0, 1.0)
    }

    /// Fractal sum of several octaves, normalised to [-1, 1].
    pub fn fbm(&self, x: f64, y: f64) -> f64 {
        let mut value = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        let mut max_value = 0.0;

        for _ in 0..OCTAVES {
            value += self.noise2d(x * frequency, y * frequency) * amplitude;
            max_value += amplitude;
            amplitude *= PERSISTENCE;
            frequency *= LACUNARITY;
        }

        value / max_value
    }
}

fn grad2(hash: u8, x: f64, y: f64) -> f64 {
    match hash & 7 {
        0 => x + y,
        1 => -x + y,
        2 => x - y,
        3 => -x - y,
        4 => x,
        5 => -x,
        6 => y,
        _ => -y,
    }
}

fn fade(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + t * (b - a)
}

/// Classify an absolute noise value.
pub fn terrain_for(noise: f64) -> TerrainType {
    if noise < 0.35 {
        TerrainType::Grass
    } else if noise < 0.45 {
        TerrainType::Sand
    } else if noise < 0.49 {
        TerrainType::ShallowWater
    } else {
        TerrainType::Water
    }
}

/// Terrain of one cell.
#[derive(Debug, Clone)]
pub struct Terrain {
    pub sub_cells: Vec<SubCell>,
    /// One terrain code byte per sub-cell, row by row, base64 encoded.
    pub minimap: String,
}

impl Terrain {
    /// Sample `resolution x resolution` sub-cells of the cell at `coord`.
    pub fn generate(noise: &Perlin, coord: CellCoord, resolution: i32) -> Self {
        let resolution = resolution.max(1);
        let step = 1.0 / resolution as f64;
        let mut sub_cells = Vec::with_capacity((resolution * resolution) as usize);

        for y in 0..resolution {
            for x in 0..resolution {
                let nx = (coord.x as f64 + x as f64 * step) * CELL_SCALE;
                let ny = (coord.y as f64 + y as f64 * step) * CELL_SCALE;
                sub_cells.push(SubCell {
                    pos: Vector::new(x, y),
                    terrain_type: terrain_for(noise.fbm(nx, ny).abs()),
                });
            }
        }

        let codes: Vec<u8> = sub_cells.iter().map(|s| s.terrain_type.code()).collect();
        Self { sub_cells, minimap: STANDARD.encode(codes) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds() {
        assert_eq!(terrain_for(0.0), TerrainType::Grass);
        assert_eq!(terrain_for(0.349), TerrainType::Grass);
        assert_eq!(terrain_for(0.4), TerrainType::Sand);
        assert_eq!(terrain_for(0.47), TerrainType::ShallowWater);
        assert_eq!(terrain_for(0.49), TerrainType::Water);
    }

    #[test]
    fn test_noise_range() {
        let noise = Perlin::new(7);
        for i in 0..200 {
            let v = noise.fbm(i as f64 * 0.37, i as f64 * -0.11);
            assert!((-1.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_terrain_is_deterministic() {
        let noise = Perlin::new(54000);
        let a = Terrain::generate(&noise, CellCoord::new(3, -2), 20);
        let b = Terrain::generate(&Perlin::new(54000), CellCoord::new(3, -2), 20);
        assert_eq!(a.sub_cells.len(), 400);
        assert_eq!(a.sub_cells, b.sub_cells);
        assert_eq!(a.minimap, b.minimap);

        let decoded = STANDARD.decode(&a.minimap).unwrap();
        assert_eq!(decoded.len(), 400);
        assert_eq!(decoded[21], a.sub_cells[21].terrain_type.code());
    }
}
