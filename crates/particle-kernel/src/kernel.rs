//! CPU reference implementations of the update and spawn compute passes
//!
//! These mirror `update.wgsl` and `spawn.wgsl` line for line and exist for
//! documentation and testing. The GPU pipelines are what actually run.

use std::f32::consts::{PI, TAU};

use glam::Vec3;

use crate::color::instance_color;
use crate::constants::{
    LINK_ALPHA_EXPONENT, LINK_VERTICES_PER_PARTICLE, NEIGHBOR_SEARCH_START, SLOW_MOTION,
    TURBULENCE_LIFE_EPSILON, VERTICES_PER_LINK,
};
use crate::noise::{fractal_noise_vec3, hash_index};
use crate::particle::{LinkColor, LinkVertex, ParticleState, ParticleVelocity};

/// Simulation timestep for a frame: `frame_delta * 0.1 * time_scale`
pub fn step_dt(frame_delta: f32, time_scale: f32) -> f32 {
    frame_delta * SLOW_MOTION * time_scale
}

/// Fractal noise field that pushes particles around
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Turbulence {
    pub frequency: f32,
    pub amplitude: f32,
    pub octaves: u32,
    pub lacunarity: f32,
    pub gain: f32,
    pub friction: f32,
}

impl Default for Turbulence {
    fn default() -> Self {
        Self {
            frequency: 0.5,
            amplitude: 0.5,
            octaves: 2,
            lacunarity: 2.0,
            gain: 0.5,
            friction: 0.01,
        }
    }
}

impl Turbulence {
    /// Velocity kick at `position` for a particle with `life` remaining
    pub fn sample(&self, position: Vec3, life: f32) -> Vec3 {
        fractal_noise_vec3(
            position * self.frequency,
            self.octaves,
            self.lacunarity,
            self.gain,
            self.amplitude,
        ) * (life + TURBULENCE_LIFE_EPSILON)
    }
}

/// Inputs of one update pass
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpdateParams {
    /// Already scaled timestep, see [`step_dt`]
    pub dt: f32,
    pub lifetime: f32,
    pub links_width: f32,
    pub color_offset: f32,
    pub color_variance: f32,
    pub turbulence: Turbulence,
}

/// One entry of the two-nearest-neighbour search
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance_sq: f32,
    pub position: Vec3,
    pub life: f32,
}

/// Streaming top-2 search over `snapshot` for particle `index` at `position`.
///
/// Only live particles other than `index` at a strictly positive distance are
/// candidates. A strictly closer candidate takes the first slot and pushes the
/// old first entry into the second. Equal distances keep the earlier index.
pub fn find_nearest_two(
    snapshot: &[ParticleState],
    index: usize,
    position: Vec3,
) -> [Option<Neighbor>; 2] {
    let mut best = [NEIGHBOR_SEARCH_START; 2];
    let mut found: [Option<Neighbor>; 2] = [None, None];

    for (j, other) in snapshot.iter().enumerate() {
        if j == index || !other.is_alive() {
            continue;
        }
        let other_position = other.position();
        let distance_sq = position.distance_squared(other_position);
        if distance_sq <= 0.0 {
            continue;
        }

        let candidate = Neighbor {
            index: j,
            distance_sq,
            position: other_position,
            life: other.life(),
        };
        if distance_sq < best[0] {
            best[1] = best[0];
            found[1] = found[0];
            best[0] = distance_sq;
            found[0] = Some(candidate);
        } else if distance_sq < best[1] {
            best[1] = distance_sq;
            found[1] = Some(candidate);
        }
    }

    found
}

/// Opacity of a link between a particle and its neighbour
pub fn link_alpha(own_life: f32, neighbor_life: f32) -> f32 {
    let base = own_life.min(neighbor_life).max(0.0);
    if base > 0.0 {
        base.powf(LINK_ALPHA_EXPONENT)
    } else {
        0.0
    }
}

/// The 8 link vertices and colours owned by particle `index`.
///
/// A missing neighbour links to the origin with zero life, which makes the
/// quad fully transparent.
pub fn emit_links(
    index: u32,
    position: Vec3,
    life: f32,
    neighbors: &[Option<Neighbor>; 2],
    params: &UpdateParams,
) -> (
    [LinkVertex; LINK_VERTICES_PER_PARTICLE as usize],
    [LinkColor; LINK_VERTICES_PER_PARTICLE as usize],
) {
    let offset = Vec3::new(0.0, params.links_width, 0.0);
    let rgb = instance_color(index, params.color_offset, params.color_variance);

    let mut vertices = [LinkVertex::default(); LINK_VERTICES_PER_PARTICLE as usize];
    let mut colors = [LinkColor::default(); LINK_VERTICES_PER_PARTICLE as usize];

    for (quad, neighbor) in neighbors.iter().enumerate() {
        let (nb_position, nb_life) = neighbor
            .map(|n| (n.position, n.life))
            .unwrap_or((Vec3::ZERO, 0.0));
        let base = quad * VERTICES_PER_LINK as usize;

        vertices[base] = LinkVertex::new(position + offset);
        vertices[base + 1] = LinkVertex::new(position - offset);
        vertices[base + 2] = LinkVertex::new(nb_position - offset);
        vertices[base + 3] = LinkVertex::new(nb_position + offset);

        let color = LinkColor::new(rgb, link_alpha(life, nb_life));
        colors[base..base + VERTICES_PER_LINK as usize].fill(color);
    }

    (vertices, colors)
}

/// Run the update pass over every slot.
///
/// `snapshot` is the start-of-frame position buffer and is never written;
/// results land in `output`. Inert slots are copied through and leave their
/// velocity and link records untouched.
pub fn update_particles(
    snapshot: &[ParticleState],
    output: &mut [ParticleState],
    velocities: &mut [ParticleVelocity],
    link_vertices: &mut [LinkVertex],
    link_colors: &mut [LinkColor],
    params: &UpdateParams,
) {
    let stride = LINK_VERTICES_PER_PARTICLE as usize;

    for (i, state) in snapshot.iter().enumerate() {
        if !state.is_alive() {
            output[i] = *state;
            continue;
        }

        let mut position = state.position();
        let mut life = state.life();
        let mut velocity = velocities[i].get();

        velocity += params.turbulence.sample(position, life);
        velocity *= 1.0 - params.turbulence.friction;
        position += velocity * params.dt;
        life -= params.dt / params.lifetime;

        let neighbors = find_nearest_two(snapshot, i, position);
        let (vertices, colors) = emit_links(i as u32, position, life, &neighbors, params);
        link_vertices[i * stride..(i + 1) * stride].copy_from_slice(&vertices);
        link_colors[i * stride..(i + 1) * stride].copy_from_slice(&colors);

        output[i] = ParticleState::new(position, life);
        velocities[i] = ParticleVelocity::new(velocity);
    }
}

/// Inputs of one spawn pass
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnParams {
    pub spawn_index: u32,
    pub nb_to_spawn: u32,
    pub previous_position: Vec3,
    pub position: Vec3,
    pub radius: f32,
    pub speed: f32,
}

/// Unit jitter direction of a spawn slot
pub fn spawn_direction(slot: u32) -> Vec3 {
    let theta = hash_index(slot) * TAU;
    let phi = hash_index(slot.wrapping_add(1)) * PI;
    Vec3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos())
}

/// Interpolation factor of the `local`-th particle of a batch of `count`
pub fn spawn_fraction(local: u32, count: u32) -> f32 {
    if count <= 1 {
        return 0.0;
    }
    (local as f32 / (count - 1) as f32).clamp(0.0, 1.0)
}

/// Batch size actually dispatched: never more than the capacity
pub fn spawn_batch(nb_to_spawn: u32, capacity: u32) -> u32 {
    nb_to_spawn.min(capacity)
}

/// Emit a batch into the ring buffer along the cursor segment.
///
/// Returns the slots written, in batch order.
pub fn spawn_particles(
    positions: &mut [ParticleState],
    velocities: &mut [ParticleVelocity],
    params: &SpawnParams,
) -> Vec<u32> {
    let capacity = positions.len() as u32;
    if capacity == 0 {
        return Vec::new();
    }
    let count = spawn_batch(params.nb_to_spawn, capacity);

    (0..count)
        .map(|local| {
            let slot = (params.spawn_index + local) % capacity;
            let dir = spawn_direction(slot);
            let t = spawn_fraction(local, count);
            let center = params.previous_position.lerp(params.position, t);

            positions[slot as usize] = ParticleState::spawned(center + dir * params.radius);
            velocities[slot as usize] = ParticleVelocity::new(dir * params.speed);
            slot
        })
        .collect()
}

/// Static index buffer for the link mesh: two quads per particle
pub fn link_indices(capacity: u32) -> Vec<u32> {
    (0..capacity * 2)
        .flat_map(|quad| {
            let o = quad * VERTICES_PER_LINK;
            [o, o + 1, o + 2, o, o + 2, o + 3]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::LINK_INDICES_PER_PARTICLE;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn still_params(dt: f32, lifetime: f32) -> UpdateParams {
        UpdateParams {
            dt,
            lifetime,
            links_width: 0.005,
            color_offset: 0.0,
            color_variance: 2.0,
            turbulence: Turbulence {
                amplitude: 0.0,
                friction: 0.0,
                ..Default::default()
            },
        }
    }

    struct Buffers {
        positions: Vec<ParticleState>,
        output: Vec<ParticleState>,
        velocities: Vec<ParticleVelocity>,
        link_vertices: Vec<LinkVertex>,
        link_colors: Vec<LinkColor>,
    }

    impl Buffers {
        fn new(n: usize) -> Self {
            let links = n * LINK_VERTICES_PER_PARTICLE as usize;
            Self {
                positions: vec![ParticleState::INERT; n],
                output: vec![ParticleState::INERT; n],
                velocities: vec![ParticleVelocity::default(); n],
                link_vertices: vec![LinkVertex::default(); links],
                link_colors: vec![LinkColor::default(); links],
            }
        }

        /// One update pass followed by the ping-pong swap
        fn update(&mut self, params: &UpdateParams) {
            update_particles(
                &self.positions,
                &mut self.output,
                &mut self.velocities,
                &mut self.link_vertices,
                &mut self.link_colors,
                params,
            );
            std::mem::swap(&mut self.positions, &mut self.output);
        }
    }

    #[test]
    fn test_step_dt() {
        assert!((step_dt(0.016, 1.0) - 0.0016).abs() < 1e-7);
        assert_eq!(step_dt(0.1, 0.0), 0.0);
    }

    #[test]
    fn test_inert_particles_are_copied_through() {
        let mut b = Buffers::new(4);
        b.positions[1] = ParticleState::new(Vec3::new(1.0, 2.0, 3.0), 0.0);
        b.velocities[1] = ParticleVelocity::new(Vec3::X);
        b.link_colors[8] = LinkColor::new(Vec3::ONE, 0.5);

        b.update(&still_params(0.1, 0.5));

        assert_eq!(b.positions[0], ParticleState::INERT);
        assert_eq!(b.positions[1], ParticleState::new(Vec3::new(1.0, 2.0, 3.0), 0.0));
        assert_eq!(b.velocities[1].get(), Vec3::X);
        assert_eq!(b.link_colors[8].alpha(), 0.5);
    }

    #[test]
    fn test_life_decay_and_integration() {
        let mut b = Buffers::new(2);
        b.positions[0] = ParticleState::new(Vec3::ZERO, 1.0);
        b.velocities[0] = ParticleVelocity::new(Vec3::new(2.0, 0.0, 0.0));

        let mut params = still_params(0.125, 0.5);
        params.turbulence.friction = 0.5;
        b.update(&params);

        // v' = v * (1 - friction), p' = p + v' * dt, life' = life - dt / lifetime
        assert_eq!(b.velocities[0].get(), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(b.positions[0].position(), Vec3::new(0.125, 0.0, 0.0));
        assert_eq!(b.positions[0].life(), 0.75);
    }

    #[test]
    fn test_turbulence_scales_with_life() {
        let turbulence = Turbulence::default();
        let p = Vec3::new(0.37, -1.2, 2.9);
        let young = turbulence.sample(p, 1.0);
        let old = turbulence.sample(p, 0.0);
        assert!((young - old * 101.0).abs().max_element() < 1e-3);
    }

    fn alive(position: Vec3) -> ParticleState {
        ParticleState::new(position, 1.0)
    }

    #[test]
    fn test_nearest_two_excludes_self_dead_and_coincident() {
        let snapshot = vec![
            alive(Vec3::ZERO),                                // self
            alive(Vec3::ZERO),                                // coincident
            ParticleState::new(Vec3::new(0.1, 0.0, 0.0), 0.0), // dead
            alive(Vec3::new(3.0, 0.0, 0.0)),
            alive(Vec3::new(5.0, 0.0, 0.0)),
        ];
        let [first, second] = find_nearest_two(&snapshot, 0, Vec3::ZERO);
        assert_eq!(first.map(|n| n.index), Some(3));
        assert_eq!(second.map(|n| n.index), Some(4));
        assert_eq!(first.map(|n| n.distance_sq), Some(9.0));
    }

    #[test]
    fn test_nearest_two_tie_keeps_lower_index() {
        let snapshot = vec![
            alive(Vec3::new(1.0, 0.0, 0.0)),
            alive(Vec3::new(-1.0, 0.0, 0.0)),
            alive(Vec3::new(0.0, 1.0, 0.0)),
            alive(Vec3::new(0.0, 0.0, 0.0)),
        ];
        let [first, second] = find_nearest_two(&snapshot, 3, Vec3::ZERO);
        assert_eq!(first.map(|n| n.index), Some(0));
        assert_eq!(second.map(|n| n.index), Some(1));
    }

    #[test]
    fn test_nearest_two_demotes_previous_first() {
        // The far candidate is seen first, then pushed into slot two
        let snapshot = vec![
            alive(Vec3::ZERO),
            alive(Vec3::new(5.0, 0.0, 0.0)),
            alive(Vec3::new(1.0, 0.0, 0.0)),
        ];
        let [first, second] = find_nearest_two(&snapshot, 0, Vec3::ZERO);
        assert_eq!(first.map(|n| n.index), Some(2));
        assert_eq!(second.map(|n| n.index), Some(1));
        assert_eq!(second.map(|n| n.distance_sq), Some(25.0));
    }

    #[test]
    fn test_nearest_two_closing_in_scan_order() {
        let snapshot = vec![
            alive(Vec3::ZERO),
            alive(Vec3::new(3.0, 0.0, 0.0)),
            alive(Vec3::new(0.0, 2.0, 0.0)),
            alive(Vec3::new(0.0, 0.0, 1.0)),
        ];
        let [first, second] = find_nearest_two(&snapshot, 0, Vec3::ZERO);
        assert_eq!(first.map(|n| (n.index, n.distance_sq)), Some((3, 1.0)));
        assert_eq!(second.map(|n| (n.index, n.distance_sq)), Some((2, 4.0)));
    }

    #[test]
    fn test_nearest_two_ignores_far_candidates() {
        let snapshot = vec![alive(Vec3::ZERO), alive(Vec3::splat(200.0))];
        assert_eq!(find_nearest_two(&snapshot, 0, Vec3::ZERO), [None, None]);
    }

    #[test]
    fn test_nearest_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..50 {
            let n: usize = rng.random_range(2..64);
            let snapshot: Vec<ParticleState> = (0..n)
                .map(|_| {
                    let p = Vec3::new(
                        rng.random_range(-10.0..10.0),
                        rng.random_range(-10.0..10.0),
                        rng.random_range(-10.0..10.0),
                    );
                    let life = if rng.random_bool(0.8) { 1.0 } else { -1.0 };
                    ParticleState::new(p, life)
                })
                .collect();
            let index = rng.random_range(0..n);
            let position = snapshot[index].position() + Vec3::splat(0.01);

            let mut candidates: Vec<(f32, usize)> = snapshot
                .iter()
                .enumerate()
                .filter(|(j, s)| *j != index && s.is_alive())
                .map(|(j, s)| (position.distance_squared(s.position()), j))
                .filter(|(d, _)| *d > 0.0 && *d < NEIGHBOR_SEARCH_START)
                .collect();
            candidates.sort_by(|a, b| a.partial_cmp(b).unwrap());

            let [first, second] = find_nearest_two(&snapshot, index, position);
            assert_eq!(first.map(|n| n.index), candidates.first().map(|c| c.1));

            assert_eq!(second.map(|n| n.index), candidates.get(1).map(|c| c.1));
        }
    }

    #[test]
    fn test_link_alpha_law() {
        assert_eq!(link_alpha(1.0, 1.0), 1.0);
        assert!((link_alpha(0.5, 0.9) - 0.5f32.powf(0.8)).abs() < 1e-6);
        assert!((link_alpha(0.9, 0.5) - 0.5f32.powf(0.8)).abs() < 1e-6);
        assert_eq!(link_alpha(0.7, 0.0), 0.0);
        assert_eq!(link_alpha(-0.2, 0.7), 0.0);
        assert_eq!(link_alpha(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_emit_links_geometry() {
        let params = still_params(0.1, 0.5);
        let own = Vec3::new(1.0, 2.0, 3.0);
        let nb = Neighbor {
            index: 4,
            distance_sq: 1.0,
            position: Vec3::new(1.0, 2.0, 4.0),
            life: 0.5,
        };
        let (vertices, colors) = emit_links(7, own, 0.9, &[Some(nb), None], &params);

        let w = Vec3::new(0.0, params.links_width, 0.0);
        assert_eq!(vertices[0].position(), own + w);
        assert_eq!(vertices[1].position(), own - w);
        assert_eq!(vertices[2].position(), nb.position - w);
        assert_eq!(vertices[3].position(), nb.position + w);
        assert_eq!(vertices[6].position(), Vec3::ZERO - w);

        let rgb = instance_color(7, params.color_offset, params.color_variance);
        for c in &colors[0..4] {
            assert_eq!(c.rgb(), rgb);
            assert_eq!(c.alpha(), link_alpha(0.9, 0.5));
        }
        for c in &colors[4..8] {
            assert_eq!(c.alpha(), 0.0);
        }
    }

    fn spawn_params(spawn_index: u32, nb_to_spawn: u32) -> SpawnParams {
        SpawnParams {
            spawn_index,
            nb_to_spawn,
            previous_position: Vec3::ZERO,
            position: Vec3::ZERO,
            radius: 0.01,
            speed: 5.0,
        }
    }

    #[test]
    fn test_spawn_direction_is_unit() {
        for slot in 0..256 {
            assert!((spawn_direction(slot).length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_spawn_fraction() {
        assert_eq!(spawn_fraction(0, 1), 0.0);
        assert_eq!(spawn_fraction(0, 5), 0.0);
        assert_eq!(spawn_fraction(2, 5), 0.5);
        assert_eq!(spawn_fraction(4, 5), 1.0);
    }

    #[test]
    fn test_spawn_writes_live_particles_on_segment() {
        let mut b = Buffers::new(16);
        let params = SpawnParams {
            previous_position: Vec3::ZERO,
            position: Vec3::new(4.0, 0.0, 0.0),
            radius: 0.0,
            ..spawn_params(14, 5)
        };
        let slots = spawn_particles(&mut b.positions, &mut b.velocities, &params);

        assert_eq!(slots, vec![14, 15, 0, 1, 2]);
        for (local, slot) in slots.iter().enumerate() {
            let p = b.positions[*slot as usize];
            assert_eq!(p.life(), 1.0);
            assert_eq!(p.position(), Vec3::new(local as f32, 0.0, 0.0));
            let v = b.velocities[*slot as usize].get();
            assert!((v - spawn_direction(*slot) * 5.0).length() < 1e-5);
        }
        assert!(!b.positions[3].is_alive());
    }

    #[test]
    fn test_spawn_jitter_radius() {
        let mut b = Buffers::new(8);
        let slots = spawn_particles(&mut b.positions, &mut b.velocities, &spawn_params(0, 3));
        for slot in slots {
            let distance = b.positions[slot as usize].position().length();
            assert!((distance - 0.01).abs() < 1e-6);
        }
    }

    #[test]
    fn test_spawn_batch_clamped_to_capacity() {
        let mut b = Buffers::new(4);
        let slots = spawn_particles(&mut b.positions, &mut b.velocities, &spawn_params(2, 10));
        assert_eq!(slots, vec![2, 3, 0, 1]);
    }

    #[test]
    fn test_ring_coverage() {
        let n = 64u32;
        let nb = 8u32;
        let mut b = Buffers::new(n as usize);
        let mut hits = vec![0u32; n as usize];
        let mut spawn_index = 0;

        for _ in 0..n / nb {
            let slots =
                spawn_particles(&mut b.positions, &mut b.velocities, &spawn_params(spawn_index, nb));
            for slot in slots {
                hits[slot as usize] += 1;
            }
            spawn_index = (spawn_index + nb) % n;
        }

        assert!(hits.iter().all(|&h| h == 1));
        assert_eq!(spawn_index, 0);
        assert!(b.positions.iter().all(|p| p.is_alive()));
    }

    #[test]
    fn test_link_indices() {
        let indices = link_indices(2);
        assert_eq!(indices.len(), 2 * LINK_INDICES_PER_PARTICLE as usize);
        assert_eq!(&indices[0..6], &[0, 1, 2, 0, 2, 3]);
        assert_eq!(&indices[6..12], &[4, 5, 6, 4, 6, 7]);
        assert_eq!(&indices[12..18], &[8, 9, 10, 8, 10, 11]);
        assert_eq!(*indices.iter().max().unwrap(), 15);
    }

    #[test]
    fn test_eight_particle_lifecycle() {
        let n = 8;
        let mut b = Buffers::new(n);
        let params = still_params(0.125, 0.5);
        let spawn = SpawnParams {
            radius: 0.0,
            ..spawn_params(0, 8)
        };

        // Frame 1: empty update, then the whole ring spawns at the origin
        b.update(&params);
        assert!(b.positions.iter().all(|p| !p.is_alive()));
        spawn_particles(&mut b.positions, &mut b.velocities, &spawn);
        assert!(b.positions.iter().all(|p| p.life() == 1.0));

        // Frame 2: everyone moves off the origin and links to the others there
        b.update(&params);
        for (i, p) in b.positions.iter().enumerate() {
            assert_eq!(p.life(), 0.75);
            let expected = spawn_direction(i as u32) * 5.0 * 0.125;
            assert!((p.position() - expected).length() < 1e-5);
        }
        let expected_alpha = link_alpha(0.75, 1.0);
        for (i, c) in b.link_colors.iter().enumerate() {
            assert_eq!(c.alpha(), expected_alpha, "link vertex {i}");
        }
        // All candidates tie at the origin, so the lowest indices win
        assert_eq!(b.link_vertices[2].position(), Vec3::new(0.0, -0.005, 0.0));
        assert_eq!(b.link_vertices[8 + 2].position(), Vec3::new(0.0, -0.005, 0.0));

        // Frames 3-5: life reaches exactly zero and links fade out
        for _ in 0..3 {
            b.update(&params);
        }
        assert!(b.positions.iter().all(|p| p.life() == 0.0));
        assert!(b.link_colors.iter().all(|c| c.alpha() == 0.0));

        // Frame 6: dead particles are frozen
        let before = b.positions.clone();
        b.update(&params);
        assert_eq!(b.positions, before);
    }
}
