use std::f32::consts::{PI, TAU};

use crate::config::TrialConfig;
use crate::error::{Result, SimError};
use crate::physics::{
    AngularRange, BodyHandle, ConstraintHandle, JointDesc, MotorDrive, PhysicsWorld, Vec2,
};
use crate::segment::{Segment, SegmentId};

/// Knobs shared by every joint of a body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointTuning {
    /// Limit strength as a multiple of the motor's max torque. Must exceed 1
    /// or the motor can push the joint out of its range.
    pub limit_strength_ratio: f32,
    /// Rate commanded in torque mode; large enough that the torque cap, not
    /// the rate, is what limits the motor.
    pub torque_mode_rate: f32,
    /// Factor applied to relative angular velocity before a policy sees it.
    pub rate_scale: f32,
}

impl Default for JointTuning {
    fn default() -> Self {
        Self {
            limit_strength_ratio: 2.0,
            torque_mode_rate: 100.0,
            rate_scale: 0.1,
        }
    }
}

impl From<&TrialConfig> for JointTuning {
    fn from(config: &TrialConfig) -> Self {
        Self {
            limit_strength_ratio: config.limit_strength_ratio,
            torque_mode_rate: config.torque_mode_rate,
            rate_scale: config.rate_scale,
        }
    }
}

/// Last command a joint received, after clamping.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JointCommand {
    Idle,
    Rate(f32),
    Torque(f32),
}

#[derive(Clone, Copy, Debug)]
struct Attachment {
    base: BodyHandle,
    branch: BodyHandle,
    constraint: ConstraintHandle,
}

/// Pivot, angular limit and motor between a base segment and a branch
/// segment. The branch's start point is pinned to the base's end (or start).
#[derive(Clone, Debug)]
pub struct Joint {
    base: SegmentId,
    branch: SegmentId,
    base_length: f32,
    branch_length: f32,
    attach_to_end: bool,
    range: AngularRange,
    max_torque: f32,
    limit_strength: f32,
    rest_angle: f32,
    tuning: JointTuning,
    command: JointCommand,
    drive: MotorDrive,
    attachment: Option<Attachment>,
}

impl Joint {
    pub fn create(
        base: &Segment,
        branch: &Segment,
        range: AngularRange,
        attach_to_end: bool,
        max_torque: f32,
    ) -> Result<Self> {
        Self::create_tuned(
            base,
            branch,
            range,
            attach_to_end,
            max_torque,
            JointTuning::default(),
        )
    }

    pub fn create_tuned(
        base: &Segment,
        branch: &Segment,
        range: AngularRange,
        attach_to_end: bool,
        max_torque: f32,
        tuning: JointTuning,
    ) -> Result<Self> {
        if !(range.min.is_finite() && range.max.is_finite() && range.min <= range.max) {
            return Err(SimError::InvalidJoint(format!(
                "angular range [{}, {}] is not an ordered finite interval",
                range.min, range.max
            )));
        }
        if range.width() >= TAU {
            return Err(SimError::InvalidJoint(format!(
                "angular range [{}, {}] spans a full turn",
                range.min, range.max
            )));
        }
        if !(max_torque.is_finite() && max_torque > 0.0) {
            return Err(SimError::InvalidJoint(format!(
                "max torque must be positive; got {max_torque}"
            )));
        }
        let limit_strength = max_torque * tuning.limit_strength_ratio;
        if !(limit_strength.is_finite() && limit_strength > max_torque) {
            return Err(SimError::InvalidJoint(format!(
                "limit strength {limit_strength} must exceed motor torque {max_torque}"
            )));
        }

        let rest_angle = wrap_into_window(
            branch.initial_pose().angle - base.initial_pose().angle,
            range.midpoint(),
        );
        Ok(Self {
            base: base.id(),
            branch: branch.id(),
            base_length: base.length(),
            branch_length: branch.length(),
            attach_to_end,
            range,
            max_torque,
            limit_strength,
            rest_angle,
            tuning,
            command: JointCommand::Idle,
            drive: MotorDrive::IDLE,
            attachment: None,
        })
    }

    pub fn base(&self) -> SegmentId {
        self.base
    }

    pub fn branch(&self) -> SegmentId {
        self.branch
    }

    pub fn attach_to_end(&self) -> bool {
        self.attach_to_end
    }

    pub fn range(&self) -> AngularRange {
        self.range
    }

    pub fn max_torque(&self) -> f32 {
        self.max_torque
    }

    pub fn limit_strength(&self) -> f32 {
        self.limit_strength
    }

    pub fn command(&self) -> JointCommand {
        self.command
    }

    pub fn drive(&self) -> MotorDrive {
        self.drive
    }

    /// Pivot location in the base and branch frames respectively.
    pub fn anchors(&self) -> (Vec2, Vec2) {
        let half_base = self.base_length * 0.5;
        let base_anchor = if self.attach_to_end {
            Vec2::new(0.0, -half_base)
        } else {
            Vec2::new(0.0, half_base)
        };
        (base_anchor, Vec2::new(0.0, self.branch_length * 0.5))
    }

    pub(crate) fn add_to_world(
        &mut self,
        world: &mut dyn PhysicsWorld,
        base: BodyHandle,
        branch: BodyHandle,
    ) -> Result<()> {
        let (base_anchor, branch_anchor) = self.anchors();
        let constraint = world
            .add_joint(&JointDesc {
                base,
                branch,
                base_anchor,
                branch_anchor,
                range: self.range,
                limit_strength: self.limit_strength,
                motor: self.drive,
            })
            .ok_or_else(|| {
                SimError::InvalidJoint(format!(
                    "bodies {} and {} are not in this world",
                    base.index(),
                    branch.index()
                ))
            })?;
        self.attachment = Some(Attachment {
            base,
            branch,
            constraint,
        });
        Ok(())
    }

    /// Commands an angular velocity directly; the motor may use up to its
    /// full max torque to hold it.
    pub fn set_rate(&mut self, world: &mut dyn PhysicsWorld, rate: f32) {
        self.command = JointCommand::Rate(rate);
        self.apply(
            world,
            MotorDrive {
                rate,
                max_force: self.max_torque,
            },
        );
    }

    /// Torque control: `fraction` is clamped to [-1, 1] and scales the motor's
    /// force cap while the motor chases a large rate in the same direction.
    pub fn set_torque(&mut self, world: &mut dyn PhysicsWorld, fraction: f32) {
        let fraction = fraction.clamp(-1.0, 1.0);
        let rate = if fraction == 0.0 {
            0.0
        } else {
            fraction.signum() * self.tuning.torque_mode_rate
        };
        self.command = JointCommand::Torque(fraction);
        self.apply(
            world,
            MotorDrive {
                rate,
                max_force: fraction.abs() * self.max_torque,
            },
        );
    }

    fn apply(&mut self, world: &mut dyn PhysicsWorld, drive: MotorDrive) {
        self.drive = drive;
        if let Some(attachment) = self.attachment {
            world.drive_motor(attachment.constraint, drive);
        }
    }

    /// Branch angle minus base angle, expressed in the full turn centred on
    /// the middle of the joint range so readings inside the range are
    /// continuous.
    pub fn get_angle(&self, world: &dyn PhysicsWorld) -> f32 {
        let Some(attachment) = self.attachment else {
            return self.rest_angle;
        };
        match (world.pose(attachment.base), world.pose(attachment.branch)) {
            (Some(base), Some(branch)) => {
                wrap_into_window(branch.angle - base.angle, self.range.midpoint())
            }
            _ => self.rest_angle,
        }
    }

    pub fn relative_rate(&self, world: &dyn PhysicsWorld) -> f32 {
        let Some(attachment) = self.attachment else {
            return 0.0;
        };
        match (
            world.angular_velocity(attachment.base),
            world.angular_velocity(attachment.branch),
        ) {
            (Some(base), Some(branch)) => branch - base,
            _ => 0.0,
        }
    }

    pub fn get_rate(&self, world: &dyn PhysicsWorld) -> f32 {
        self.relative_rate(world) * self.tuning.rate_scale
    }
}

/// Maps `angle` into `[center - pi, center + pi)`.
pub fn wrap_into_window(angle: f32, center: f32) -> f32 {
    center + (angle - center + PI).rem_euclid(TAU) - PI
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{CollisionCategory, ContactBegin, ContactRules, Pose, SegmentDesc};
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_4;
    use std::time::Duration;

    /// World that remembers motor drives and never moves anything.
    #[derive(Default)]
    struct FrozenWorld {
        poses: Vec<Pose>,
        drives: Vec<MotorDrive>,
    }

    impl PhysicsWorld for FrozenWorld {
        fn add_ground(&mut self, _friction: f32) {}

        fn add_segment(&mut self, desc: &SegmentDesc) -> BodyHandle {
            self.poses.push(desc.pose);
            BodyHandle::from_index(self.poses.len() - 1)
        }

        fn add_joint(&mut self, desc: &JointDesc) -> Option<ConstraintHandle> {
            if desc.base.index().max(desc.branch.index()) >= self.poses.len() {
                return None;
            }
            self.drives.push(desc.motor);
            Some(ConstraintHandle::from_index(self.drives.len() - 1))
        }

        fn set_contact_rules(&mut self, _rules: ContactRules) {}

        fn pose(&self, body: BodyHandle) -> Option<Pose> {
            self.poses.get(body.index()).copied()
        }

        fn angular_velocity(&self, _body: BodyHandle) -> Option<f32> {
            Some(0.0)
        }

        fn drive_motor(&mut self, joint: ConstraintHandle, drive: MotorDrive) {
            self.drives[joint.index()] = drive;
        }

        fn step(&mut self, _dt: Duration) -> Vec<ContactBegin> {
            Vec::new()
        }
    }

    fn thigh_and_calf() -> (Segment, Segment) {
        let thigh = Segment::create(
            7.0,
            0.44,
            Vec2::new(0.0, 0.9),
            0.0,
            CollisionCategory::Upper,
        )
        .unwrap()
        .with_id(SegmentId(0));
        let calf = Segment::create(
            3.0,
            0.4,
            thigh.initial_end_point(),
            -FRAC_PI_4,
            CollisionCategory::Lower,
        )
        .unwrap()
        .with_id(SegmentId(1));
        (thigh, calf)
    }

    fn attached_knee(world: &mut FrozenWorld) -> Joint {
        let (mut thigh, mut calf) = thigh_and_calf();
        let mut knee = Joint::create(
            &thigh,
            &calf,
            AngularRange::new(-2.3, 0.0),
            true,
            200.0,
        )
        .unwrap();
        let base = thigh.add_to_world(world);
        let branch = calf.add_to_world(world);
        knee.add_to_world(world, base, branch).unwrap();
        knee
    }

    #[test]
    fn joint_between_unknown_bodies_is_an_error() {
        let mut world = FrozenWorld::default();
        let (mut thigh, calf) = thigh_and_calf();
        let mut knee =
            Joint::create(&thigh, &calf, AngularRange::new(-2.3, 0.0), true, 200.0).unwrap();
        let base = thigh.add_to_world(&mut world);

        let result = knee.add_to_world(&mut world, base, BodyHandle::from_index(4));
        assert!(matches!(result, Err(SimError::InvalidJoint(_))));
        assert!(world.drives.is_empty());
    }

    #[test]
    fn torque_fraction_is_clamped() {
        let mut world = FrozenWorld::default();
        let mut knee = attached_knee(&mut world);

        knee.set_torque(&mut world, 5.0);
        let saturated = world.drives[0];
        assert_eq!(knee.command(), JointCommand::Torque(1.0));

        knee.set_torque(&mut world, 1.0);
        assert_eq!(world.drives[0], saturated);
        assert_eq!(saturated.max_force, 200.0);
        assert_eq!(saturated.rate, 100.0);

        knee.set_torque(&mut world, -0.25);
        assert_eq!(world.drives[0].max_force, 50.0);
        assert_eq!(world.drives[0].rate, -100.0);
        assert_eq!(knee.command(), JointCommand::Torque(-0.25));
    }

    #[test]
    fn zero_torque_releases_motor() {
        let mut world = FrozenWorld::default();
        let mut knee = attached_knee(&mut world);
        knee.set_torque(&mut world, 0.0);
        assert_eq!(world.drives[0], MotorDrive::IDLE);
    }

    #[test]
    fn rate_mode_uses_full_torque() {
        let mut world = FrozenWorld::default();
        let mut knee = attached_knee(&mut world);
        knee.set_rate(&mut world, -3.0);
        assert_eq!(
            world.drives[0],
            MotorDrive {
                rate: -3.0,
                max_force: 200.0
            }
        );
        assert_eq!(knee.command(), JointCommand::Rate(-3.0));
    }

    #[test]
    fn limits_are_stronger_than_motor() {
        let (thigh, calf) = thigh_and_calf();
        let knee =
            Joint::create(&thigh, &calf, AngularRange::new(-2.3, 0.0), true, 150.0).unwrap();
        assert!(knee.limit_strength() > knee.max_torque());

        let weak = JointTuning {
            limit_strength_ratio: 0.5,
            ..JointTuning::default()
        };
        let result =
            Joint::create_tuned(&thigh, &calf, AngularRange::new(-2.3, 0.0), true, 150.0, weak);
        assert!(matches!(result, Err(SimError::InvalidJoint(_))));
    }

    #[test]
    fn rejects_bad_ranges_and_torques() {
        let (thigh, calf) = thigh_and_calf();
        assert!(Joint::create(&thigh, &calf, AngularRange::new(1.0, -1.0), true, 1.0).is_err());
        assert!(Joint::create(&thigh, &calf, AngularRange::new(-4.0, 4.0), true, 1.0).is_err());
        assert!(Joint::create(&thigh, &calf, AngularRange::new(-1.0, 1.0), true, 0.0).is_err());
    }

    #[test]
    fn angle_reads_relative_orientation() {
        let mut world = FrozenWorld::default();
        let knee = attached_knee(&mut world);
        assert_relative_eq!(knee.get_angle(&world), -FRAC_PI_4, epsilon = 1e-6);
        assert!(knee.range().contains(knee.get_angle(&world)));
    }

    #[test]
    fn detached_joint_reports_rest_angle() {
        let (thigh, calf) = thigh_and_calf();
        let knee =
            Joint::create(&thigh, &calf, AngularRange::new(-2.3, 0.0), true, 150.0).unwrap();
        let world = FrozenWorld::default();
        assert_relative_eq!(knee.get_angle(&world), -FRAC_PI_4, epsilon = 1e-6);
        assert_eq!(knee.get_rate(&world), 0.0);
    }

    #[test]
    fn anchors_follow_attachment_topology() {
        let (thigh, calf) = thigh_and_calf();
        let hip_like =
            Joint::create(&thigh, &calf, AngularRange::new(-1.0, 1.0), false, 10.0).unwrap();
        assert_relative_eq!(hip_like.anchors().0, Vec2::new(0.0, 0.22), epsilon = 1e-6);
        assert_relative_eq!(hip_like.anchors().1, Vec2::new(0.0, 0.2), epsilon = 1e-6);

        let knee = Joint::create(&thigh, &calf, AngularRange::new(-1.0, 1.0), true, 10.0).unwrap();
        assert_relative_eq!(knee.anchors().0, Vec2::new(0.0, -0.22), epsilon = 1e-6);
    }

    #[test]
    fn wrapping_keeps_readings_near_range_center() {
        // A head pointing straight up reads pi, not -pi.
        assert_relative_eq!(wrap_into_window(-PI + 0.1, PI), PI + 0.1, epsilon = 1e-5);
        assert_relative_eq!(wrap_into_window(0.3, 0.0), 0.3, epsilon = 1e-6);
        assert_relative_eq!(wrap_into_window(0.3 + TAU, 0.0), 0.3, epsilon = 1e-5);
    }
}
