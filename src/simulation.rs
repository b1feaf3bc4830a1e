use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::body::{Body, BodyState, JointReading};
use crate::config::TrialConfig;
use crate::error::Result;
use crate::fitness::FitnessCalculator;
use crate::joint::JointTuning;
use crate::physics::{CollisionCategory, ContactRules, PhysicsWorld, RapierWorld};
use crate::plan::BodyPlan;
use crate::policy::Policy;
use crate::termination::{RunTerminator, TerminationReason};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialOutcome {
    pub fitness: f32,
    pub reason: TerminationReason,
    pub sim_seconds: f32,
    pub steps: u64,
    pub max_distance: f32,
    pub fall_seconds: Option<f32>,
}

/// Contact setup shared by every trial: body parts pass through each other,
/// and the upper body touching the ground is reported as a fall.
pub fn trial_contact_rules() -> ContactRules {
    use CollisionCategory::{Ground, Lower, Upper};
    ContactRules::new()
        .deny(Upper, Upper)
        .deny(Lower, Lower)
        .deny(Upper, Lower)
        .notify(Upper, Ground)
}

/// Runs single trials of one body plan under one configuration. Every trial
/// gets a fresh world and body.
#[derive(Clone, Debug)]
pub struct SimulationLoop {
    config: TrialConfig,
    plan: BodyPlan,
}

impl SimulationLoop {
    pub fn new(config: TrialConfig, plan: BodyPlan) -> Result<Self> {
        config.validate()?;
        plan.layout()?;
        Ok(Self { config, plan })
    }

    pub fn config(&self) -> &TrialConfig {
        &self.config
    }

    pub fn plan(&self) -> &BodyPlan {
        &self.plan
    }

    pub fn command_len(&self) -> usize {
        self.plan.actuated_joint_names().len()
    }

    /// Width of `BodyState::to_inputs` under this configuration.
    pub fn input_len(&self) -> usize {
        let state = BodyState {
            joints: vec![JointReading::default(); self.command_len()],
            ..BodyState::default()
        };
        state.to_inputs(self.config.state_includes_rates).len()
    }

    pub fn run_trial(&self, policy: &mut dyn Policy) -> Result<TrialOutcome> {
        let mut world = RapierWorld::new(&self.config);
        self.run_trial_in(&mut world, policy)
    }

    /// Runs one trial inside `world`, which must be empty.
    pub fn run_trial_in(
        &self,
        world: &mut dyn PhysicsWorld,
        policy: &mut dyn Policy,
    ) -> Result<TrialOutcome> {
        world.add_ground(self.config.ground_friction);
        world.set_contact_rules(trial_contact_rules());

        let mut body = Body::create_tuned(&self.plan, JointTuning::from(&self.config))?;
        body.add_to_world(world)?;

        let mut fitness = FitnessCalculator::new(self.config.tilt_cutoff());
        let mut terminator = RunTerminator::new(
            self.config.stagnation_timeout(),
            self.config.fall_grace(),
            self.config.max_trial(),
        );
        let timestep = self.config.timestep();
        let mut now = Duration::ZERO;
        let mut steps = 0_u64;

        info!(
            "trial start: {} segments, {} actuated joints, {} Hz",
            body.segments().len(),
            body.actuated_joint_count(),
            self.config.timestep_hz
        );

        let reason = loop {
            let state = body.get_state(world);
            let command = policy.act(&state);
            if !command.is_finite() {
                warn!(
                    "policy produced a non-finite command at {:.2}s; ending trial",
                    now.as_secs_f32()
                );
                terminator.fail();
                break TerminationReason::PolicyFault;
            }
            body.set_command(world, &command)?;

            fitness.update(&body, world);
            terminator.update(now, fitness.get_fitness());
            if let Some(reason) = terminator.reason() {
                break reason;
            }

            let contacts = world.step(timestep);
            steps += 1;
            now += timestep;

            if contacts
                .iter()
                .any(|contact| contact.involves(CollisionCategory::Upper, CollisionCategory::Ground))
            {
                terminator.fall(now);
            }
            if !body.torso().pose(world).is_finite() {
                warn!("torso pose is no longer finite at {:.2}s", now.as_secs_f32());
                terminator.fall(now);
            }
        };

        let outcome = TrialOutcome {
            fitness: fitness.get_fitness(),
            reason,
            sim_seconds: now.as_secs_f32(),
            steps,
            max_distance: fitness.max_distance(),
            fall_seconds: terminator.fall_time().map(|fell_at| fell_at.as_secs_f32()),
        };
        debug!("trial outcome: {outcome:?}");
        info!(
            "trial end: fitness {:.3} after {:.2}s ({:?})",
            outcome.fitness, outcome.sim_seconds, outcome.reason
        );
        Ok(outcome)
    }
}
