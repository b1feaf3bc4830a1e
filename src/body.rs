use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::joint::{Joint, JointTuning};
use crate::physics::{PhysicsWorld, Vec2};
use crate::plan::{BodyPlan, ControlMode};
use crate::segment::{Segment, SegmentId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JointReading {
    pub angle: f32,
    pub rate: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyState {
    pub torso_angle: f32,
    pub torso_rate: f32,
    pub joints: Vec<JointReading>,
}

impl BodyState {
    /// Flattens the state into the policy's input vector:
    /// `[torso_angle, angle_0, angle_1, ...]`, or with rates
    /// `[torso_angle, torso_rate, angle_0, rate_0, ...]`.
    pub fn to_inputs(&self, include_rates: bool) -> Vec<f32> {
        let per_entry = if include_rates { 2 } else { 1 };
        let mut inputs = Vec::with_capacity((self.joints.len() + 1) * per_entry);
        inputs.push(self.torso_angle);
        if include_rates {
            inputs.push(self.torso_rate);
        }
        for reading in &self.joints {
            inputs.push(reading.angle);
            if include_rates {
                inputs.push(reading.rate);
            }
        }
        inputs
    }
}

/// One value per actuated joint: a torque fraction in torque mode, an angular
/// velocity in rate mode.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyCommand(pub Vec<f32>);

impl BodyCommand {
    pub fn zeros(joints: usize) -> Self {
        Self(vec![0.0; joints])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|value| value.is_finite())
    }
}

impl From<Vec<f32>> for BodyCommand {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

#[derive(Clone, Debug)]
pub struct Body {
    segments: Vec<Segment>,
    joints: Vec<Joint>,
    joint_names: Vec<String>,
    actuated: Vec<usize>,
    control: ControlMode,
    in_world: bool,
}

impl Body {
    pub fn create(plan: &BodyPlan) -> Result<Self> {
        Self::create_tuned(plan, JointTuning::default())
    }

    /// Builds every segment and joint of `plan`, parents first. Each child
    /// starts at its parent's end (or start) and is rotated by the joint's
    /// starting angle relative to the parent.
    pub fn create_tuned(plan: &BodyPlan, tuning: JointTuning) -> Result<Self> {
        let placements = plan.layout()?;

        let mut segments = Vec::with_capacity(placements.len());
        for (index, (placement, segment_plan)) in placements.iter().zip(plan.segments()).enumerate()
        {
            let segment = Segment::create(
                segment_plan.mass,
                segment_plan.length,
                placement.start,
                placement.angle,
                segment_plan.category,
            )?
            .with_id(SegmentId(index));
            segments.push(segment);
        }

        let mut joints = Vec::with_capacity(plan.limbs.len());
        let mut joint_names = Vec::with_capacity(plan.limbs.len());
        let mut actuated = Vec::new();
        for (limb_index, (limb, placement)) in plan.limbs.iter().zip(&placements[1..]).enumerate() {
            let Some(parent) = placement.parent else {
                return Err(SimError::InvalidPlan(format!(
                    "limb '{}' has no parent",
                    limb.segment.name
                )));
            };
            let joint = Joint::create_tuned(
                &segments[parent],
                &segments[limb_index + 1],
                limb.joint.range,
                limb.attach_to_end,
                limb.joint.max_torque,
                tuning,
            )
            .map_err(|err| match err {
                SimError::InvalidJoint(reason) => {
                    SimError::InvalidJoint(format!("{}: {reason}", limb.joint.name))
                }
                other => other,
            })?;
            if limb.joint.actuated {
                actuated.push(joints.len());
            }
            joints.push(joint);
            joint_names.push(limb.joint.name.clone());
        }

        Ok(Self {
            segments,
            joints,
            joint_names,
            actuated,
            control: plan.control,
            in_world: false,
        })
    }

    /// Registers every segment and joint with `world`. A body lives in
    /// exactly one world for its whole life.
    pub fn add_to_world(&mut self, world: &mut dyn PhysicsWorld) -> Result<()> {
        if self.in_world {
            return Err(SimError::AlreadyInWorld);
        }
        let handles: Vec<_> = self
            .segments
            .iter_mut()
            .map(|segment| segment.add_to_world(world))
            .collect();
        for joint in &mut self.joints {
            let base = handles[joint.base().0];
            let branch = handles[joint.branch().0];
            joint.add_to_world(world, base, branch)?;
        }
        self.in_world = true;
        Ok(())
    }

    pub fn is_in_world(&self) -> bool {
        self.in_world
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn control_mode(&self) -> ControlMode {
        self.control
    }

    /// Names of the actuated joints in state/command order.
    pub fn joint_names(&self) -> Vec<&str> {
        self.actuated
            .iter()
            .map(|&index| self.joint_names[index].as_str())
            .collect()
    }

    pub fn actuated_joint_count(&self) -> usize {
        self.actuated.len()
    }

    pub fn actuated_joints(&self) -> impl Iterator<Item = &Joint> {
        self.actuated.iter().map(|&index| &self.joints[index])
    }

    pub fn torso(&self) -> &Segment {
        &self.segments[0]
    }

    pub fn get_state(&self, world: &dyn PhysicsWorld) -> BodyState {
        let torso = self.torso();
        BodyState {
            torso_angle: torso.angle(world),
            torso_rate: torso.angular_rate(world),
            joints: self
                .actuated_joints()
                .map(|joint| JointReading {
                    angle: joint.get_angle(world),
                    rate: joint.get_rate(world),
                })
                .collect(),
        }
    }

    /// Applies one value per actuated joint. A command of the wrong length is
    /// rejected before any joint is touched.
    pub fn set_command(&mut self, world: &mut dyn PhysicsWorld, command: &BodyCommand) -> Result<()> {
        if command.len() != self.actuated.len() {
            return Err(SimError::InvalidCommand {
                expected: self.actuated.len(),
                actual: command.len(),
            });
        }
        for (&index, &value) in self.actuated.iter().zip(command.values()) {
            let joint = &mut self.joints[index];
            match self.control {
                ControlMode::Torque => joint.set_torque(world, value),
                ControlMode::Rate => joint.set_rate(world, value),
            }
        }
        Ok(())
    }

    pub fn get_position(&self, world: &dyn PhysicsWorld) -> Vec2 {
        self.torso().pose(world).position
    }

    pub fn get_height(&self, world: &dyn PhysicsWorld) -> f32 {
        self.get_position(world).y
    }

    pub fn get_orientation_angle(&self, world: &dyn PhysicsWorld) -> f32 {
        self.torso().angle(world)
    }
}
