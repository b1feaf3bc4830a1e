use std::f32::consts::PI;
use std::time::Duration;

use rand::Rng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

use crate::body::{BodyCommand, BodyState};

pub trait Policy {
    fn act(&mut self, state: &BodyState) -> BodyCommand;
}

impl<F> Policy for F
where
    F: FnMut(&BodyState) -> BodyCommand,
{
    fn act(&mut self, state: &BodyState) -> BodyCommand {
        self(state)
    }
}

/// Leaves every motor idle.
#[derive(Clone, Copy, Debug)]
pub struct ZeroPolicy {
    pub joints: usize,
}

impl Policy for ZeroPolicy {
    fn act(&mut self, _state: &BodyState) -> BodyCommand {
        BodyCommand::zeros(self.joints)
    }
}

/// Open-loop drive for one joint: a sinusoid plus its second harmonic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OscillatorGene {
    pub amp: f32,
    /// Angular frequency in rad/s.
    pub freq: f32,
    pub phase: f32,
    pub bias: f32,
    #[serde(default)]
    pub harm2_amp: f32,
    #[serde(default)]
    pub harm2_phase: f32,
}

impl OscillatorGene {
    pub fn random(rng: &mut SmallRng) -> Self {
        Self {
            amp: rng_range(rng, 0.2, 1.0),
            freq: rng_range(rng, 0.55, 4.4),
            phase: rng_range(rng, 0.0, PI * 2.0),
            bias: rng_range(rng, -0.3, 0.3),
            harm2_amp: rng_range(rng, 0.0, 0.25),
            harm2_phase: rng_range(rng, 0.0, PI * 2.0),
        }
    }

    pub fn signal(&self, sim_time: f32) -> f32 {
        let theta = self.freq * sim_time + self.phase;
        self.bias + self.amp * theta.sin() + self.harm2_amp * (2.0 * theta + self.harm2_phase).sin()
    }
}

/// Drives each joint with its own oscillator, timed by an internal step
/// clock so the output depends only on how many steps have been taken.
#[derive(Clone, Debug)]
pub struct OscillatorPolicy {
    genes: Vec<OscillatorGene>,
    timestep: Duration,
    steps: u64,
    output_scale: f32,
}

impl OscillatorPolicy {
    pub fn new(genes: Vec<OscillatorGene>, timestep: Duration) -> Self {
        Self {
            genes,
            timestep,
            steps: 0,
            output_scale: 1.0,
        }
    }

    pub fn random(joints: usize, timestep: Duration, rng: &mut SmallRng) -> Self {
        let genes = (0..joints).map(|_| OscillatorGene::random(rng)).collect();
        Self::new(genes, timestep)
    }

    /// Multiplies every output; rate-controlled bodies typically use 3.
    pub fn with_output_scale(mut self, scale: f32) -> Self {
        self.output_scale = scale;
        self
    }

    pub fn genes(&self) -> &[OscillatorGene] {
        &self.genes
    }

    fn sim_time(&self) -> f32 {
        self.timestep.as_secs_f32() * self.steps as f32
    }
}

impl Policy for OscillatorPolicy {
    fn act(&mut self, _state: &BodyState) -> BodyCommand {
        let sim_time = self.sim_time();
        self.steps += 1;
        BodyCommand(
            self.genes
                .iter()
                .map(|gene| gene.signal(sim_time) * self.output_scale)
                .collect(),
        )
    }
}

fn rng_range(rng: &mut SmallRng, min: f32, max: f32) -> f32 {
    min + rng.random::<f32>() * (max - min)
}
