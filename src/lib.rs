//! Scores control policies for a planar humanoid ragdoll by how far and how
//! upright it travels before falling over or stalling.

pub mod body;
pub mod config;
pub mod error;
pub mod fitness;
pub mod joint;
pub mod physics;
pub mod plan;
pub mod policy;
pub mod segment;
pub mod simulation;
pub mod termination;

pub use body::{Body, BodyCommand, BodyState, JointReading};
pub use config::TrialConfig;
pub use error::{Result, SimError};
pub use fitness::{FitnessCalculator, RootReading};
pub use joint::{Joint, JointCommand, JointTuning};
pub use physics::{PhysicsWorld, RapierWorld};
pub use plan::{BodyPlan, ControlMode, StartingPose};
pub use policy::{OscillatorGene, OscillatorPolicy, Policy, ZeroPolicy};
pub use segment::{Segment, SegmentId};
pub use simulation::{SimulationLoop, TrialOutcome};
pub use termination::{RunState, RunTerminator, TerminationReason};
