use std::f32::consts::FRAC_PI_2;

use crate::body::Body;
use crate::joint::wrap_into_window;
use crate::physics::PhysicsWorld;

/// Torso measurements the score is computed from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RootReading {
    pub x: f32,
    pub height: f32,
    /// Absolute lean from vertical, in radians.
    pub tilt: f32,
}

impl RootReading {
    pub fn of(body: &Body, world: &dyn PhysicsWorld) -> Self {
        let position = body.get_position(world);
        Self {
            x: position.x,
            height: position.y,
            tilt: wrap_into_window(body.get_orientation_angle(world), 0.0).abs(),
        }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.height.is_finite() && self.tilt.is_finite()
    }
}

/// Accumulates forward progress weighted by how upright the torso was while
/// making it. Fitness never decreases.
#[derive(Clone, Debug)]
pub struct FitnessCalculator {
    tilt_cutoff: f32,
    origin: Option<RootReading>,
    max_distance: f32,
    scaled_distance: f32,
}

impl FitnessCalculator {
    pub fn new(tilt_cutoff: f32) -> Self {
        Self {
            tilt_cutoff,
            origin: None,
            max_distance: 0.0,
            scaled_distance: 0.0,
        }
    }

    pub fn update(&mut self, body: &Body, world: &dyn PhysicsWorld) {
        self.record(RootReading::of(body, world));
    }

    /// Feeds one reading. The first finite reading fixes the starting offset
    /// and the standing height; non-finite readings are ignored.
    pub fn record(&mut self, reading: RootReading) {
        if !reading.is_finite() {
            return;
        }
        let origin = *self.origin.get_or_insert(reading);
        let distance = reading.x - origin.x;
        if distance > self.max_distance {
            let multiplier = self.uprightness(reading, origin.height);
            self.scaled_distance += multiplier * (distance - self.max_distance);
            self.max_distance = distance;
        }
    }

    /// Weight in [0, 1]: zero past the tilt cutoff, otherwise a cosine taper
    /// of the tilt scaled by how much of the standing height is kept.
    pub fn uprightness(&self, reading: RootReading, standing_height: f32) -> f32 {
        if reading.tilt > self.tilt_cutoff {
            return 0.0;
        }
        let taper = (reading.tilt * FRAC_PI_2 / self.tilt_cutoff).cos().max(0.0);
        let height_factor = if standing_height <= 0.0 || reading.height >= standing_height {
            1.0
        } else {
            (reading.height / standing_height).clamp(0.0, 1.0)
        };
        taper * height_factor
    }

    pub fn get_fitness(&self) -> f32 {
        self.scaled_distance
    }

    pub fn max_distance(&self) -> f32 {
        self.max_distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    const CUTOFF: f32 = std::f32::consts::PI / 6.0;

    fn reading(x: f32, height: f32, tilt: f32) -> RootReading {
        RootReading { x, height, tilt }
    }

    #[test]
    fn upright_progress_is_credited_in_full() {
        let mut fitness = FitnessCalculator::new(CUTOFF);
        fitness.record(reading(3.0, 1.0, 0.0));
        fitness.record(reading(3.5, 1.0, 0.0));
        fitness.record(reading(4.25, 1.2, 0.0));
        assert_relative_eq!(fitness.get_fitness(), 1.25, epsilon = 1e-6);
        assert_relative_eq!(fitness.max_distance(), 1.25, epsilon = 1e-6);
    }

    #[test]
    fn regression_earns_nothing_until_max_is_passed() {
        let mut fitness = FitnessCalculator::new(CUTOFF);
        fitness.record(reading(0.0, 1.0, 0.0));
        fitness.record(reading(1.0, 1.0, 0.0));
        fitness.record(reading(0.2, 1.0, 0.0));
        assert_relative_eq!(fitness.get_fitness(), 1.0, epsilon = 1e-6);
        fitness.record(reading(1.5, 1.0, 0.0));
        assert_relative_eq!(fitness.get_fitness(), 1.5, epsilon = 1e-6);
    }

    #[test]
    fn progress_past_cutoff_is_not_credited() {
        let mut fitness = FitnessCalculator::new(CUTOFF);
        fitness.record(reading(0.0, 1.0, 0.0));
        fitness.record(reading(2.0, 1.0, CUTOFF + 0.01));
        assert_eq!(fitness.get_fitness(), 0.0);
        assert_relative_eq!(fitness.max_distance(), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn tilt_and_height_scale_credit() {
        let mut fitness = FitnessCalculator::new(CUTOFF);
        fitness.record(reading(0.0, 1.0, 0.0));
        // Half the cutoff gives cos(pi/4); half the height halves it again.
        fitness.record(reading(1.0, 0.5, CUTOFF / 2.0));
        assert_relative_eq!(
            fitness.get_fitness(),
            std::f32::consts::FRAC_1_SQRT_2 * 0.5,
            epsilon = 1e-6
        );
    }

    #[test]
    fn non_finite_readings_are_ignored() {
        let mut fitness = FitnessCalculator::new(CUTOFF);
        fitness.record(reading(f32::NAN, 1.0, 0.0));
        fitness.record(reading(5.0, 1.0, 0.0));
        fitness.record(reading(f32::INFINITY, 1.0, 0.0));
        fitness.record(reading(6.0, 1.0, f32::NAN));
        assert_eq!(fitness.get_fitness(), 0.0);
    }

    #[test]
    fn fitness_never_decreases() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..50 {
            let mut fitness = FitnessCalculator::new(CUTOFF);
            let mut previous = fitness.get_fitness();
            let mut x = 0.0;
            for _ in 0..200 {
                x += rng.random_range(-0.5..0.6);
                fitness.record(reading(
                    x,
                    rng.random_range(-0.2..1.5),
                    rng.random_range(0.0..1.2),
                ));
                let current = fitness.get_fitness();
                assert!(current >= previous, "{current} < {previous}");
                previous = current;
            }
        }
    }
}
