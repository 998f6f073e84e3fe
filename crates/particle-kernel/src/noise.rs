//! Hashing and gradient noise
//!
//! CPU reference versions of the functions in the simulation's
//! `common.wgsl`. Both sides must stay bit-for-bit equivalent in their integer
//! paths (hashes) and numerically equivalent in the float paths.

use glam::{UVec3, Vec3};

/// PCG-style integer hash of a particle index, mapped to `[0, 1]`
pub fn hash_index(index: u32) -> f32 {
    let state = index.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    let result = (word >> 22) ^ word;
    result as f32 * (1.0 / 4_294_967_296.0)
}

fn mix_final(mut a: u32, mut b: u32, mut c: u32) -> u32 {
    c ^= b;
    c = c.wrapping_sub(b.rotate_left(14));
    a ^= c;
    a = a.wrapping_sub(c.rotate_left(11));
    b ^= a;
    b = b.wrapping_sub(a.rotate_left(25));
    c ^= b;
    c = c.wrapping_sub(b.rotate_left(16));
    a ^= c;
    a = a.wrapping_sub(c.rotate_left(4));
    b ^= a;
    b = b.wrapping_sub(a.rotate_left(14));
    c ^= b;
    c = c.wrapping_sub(b.rotate_left(24));
    c
}

/// Lookup3 final mix of an integer lattice cell
pub fn hash_cell(x: i32, y: i32, z: i32) -> u32 {
    let seed = 0xdead_beef_u32.wrapping_add(3 << 2).wrapping_add(13);
    let a = seed.wrapping_add(x as u32);
    let b = seed.wrapping_add(y as u32);
    let c = seed.wrapping_add(z as u32);
    mix_final(a, b, c)
}

/// Three independent 8-bit hashes of a lattice cell
fn hash_cell_vec3(x: i32, y: i32, z: i32) -> UVec3 {
    let h = hash_cell(x, y, z);
    UVec3::new(h & 0xff, (h >> 8) & 0xff, (h >> 16) & 0xff)
}

fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn gradient(hash: u32, x: f32, y: f32, z: f32) -> f32 {
    let h = hash & 15;
    let u = if h < 8 { x } else { y };
    let v = if h < 4 {
        y
    } else if h == 12 || h == 14 {
        x
    } else {
        z
    };
    let u = if h & 1 != 0 { -u } else { u };
    let v = if h & 2 != 0 { -v } else { v };
    u + v
}

fn trilerp<T>(corners: [T; 8], s: f32, t: f32, r: f32) -> T
where
    T: Copy + std::ops::Mul<f32, Output = T> + std::ops::Add<Output = T>,
{
    let bilerp = |v0: T, v1: T, v2: T, v3: T| {
        let s1 = 1.0 - s;
        (v0 * s1 + v1 * s) * (1.0 - t) + (v2 * s1 + v3 * s) * t
    };
    let near = bilerp(corners[0], corners[1], corners[2], corners[3]);
    let far = bilerp(corners[4], corners[5], corners[6], corners[7]);
    near * (1.0 - r) + far * r
}

const GRADIENT_SCALE_3D: f32 = 0.982;

const CORNERS: [[i32; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [0, 1, 0],
    [1, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [0, 1, 1],
    [1, 1, 1],
];

/// Scalar 3D gradient noise, roughly in `[-1, 1]`
pub fn perlin_noise(p: Vec3) -> f32 {
    let cell = p.floor();
    let f = p - cell;
    let (cx, cy, cz) = (cell.x as i32, cell.y as i32, cell.z as i32);

    let corners = CORNERS.map(|[dx, dy, dz]| {
        gradient(
            hash_cell(cx + dx, cy + dy, cz + dz),
            f.x - dx as f32,
            f.y - dy as f32,
            f.z - dz as f32,
        )
    });

    GRADIENT_SCALE_3D * trilerp(corners, fade(f.x), fade(f.y), fade(f.z))
}

/// Three decorrelated channels of 3D gradient noise
pub fn perlin_noise_vec3(p: Vec3) -> Vec3 {
    let cell = p.floor();
    let f = p - cell;
    let (cx, cy, cz) = (cell.x as i32, cell.y as i32, cell.z as i32);

    let corners = CORNERS.map(|[dx, dy, dz]| {
        let h = hash_cell_vec3(cx + dx, cy + dy, cz + dz);
        let (x, y, z) = (f.x - dx as f32, f.y - dy as f32, f.z - dz as f32);
        Vec3::new(
            gradient(h.x, x, y, z),
            gradient(h.y, x, y, z),
            gradient(h.z, x, y, z),
        )
    });

    GRADIENT_SCALE_3D * trilerp(corners, fade(f.x), fade(f.y), fade(f.z))
}

/// Fractal sum of `octaves` noise layers, each `gain` times weaker and
/// `lacunarity` times finer than the previous, scaled by `amplitude`
pub fn fractal_noise(p: Vec3, octaves: u32, lacunarity: f32, gain: f32, amplitude: f32) -> f32 {
    let mut result = 0.0;
    let mut weight = 1.0;
    let mut p = p;
    for _ in 0..octaves {
        result += weight * perlin_noise(p);
        weight *= gain;
        p *= lacunarity;
    }
    result * amplitude
}

/// Vector-valued [`fractal_noise`], used as the turbulence field
pub fn fractal_noise_vec3(
    p: Vec3,
    octaves: u32,
    lacunarity: f32,
    gain: f32,
    amplitude: f32,
) -> Vec3 {
    let mut result = Vec3::ZERO;
    let mut weight = 1.0;
    let mut p = p;
    for _ in 0..octaves {
        result += weight * perlin_noise_vec3(p);
        weight *= gain;
        p *= lacunarity;
    }
    result * amplitude
}
