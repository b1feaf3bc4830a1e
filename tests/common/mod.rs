#![allow(dead_code)]

use std::time::Duration;

use ragdoll_walker::physics::{
    AngularRange, BodyHandle, CollisionCategory, ConstraintHandle, ContactBegin, ContactRules,
    JointDesc, MotorDrive, PhysicsWorld, Pose, SegmentDesc, Vec2,
};
use ragdoll_walker::plan::{JointPlan, LimbPlan, SegmentPlan, TORSO};
use ragdoll_walker::{BodyPlan, ControlMode};

pub type Trajectory = Box<dyn Fn(Duration) -> Pose>;

/// Torso follows a closed-form trajectory; every other segment stays put.
pub struct ScriptedWorld {
    clock: Duration,
    torso: Trajectory,
    segments: Vec<SegmentDesc>,
    pub drives: Vec<MotorDrive>,
    /// Times at which an upper-body/ground contact begins.
    pub falls: Vec<Duration>,
    pub steps: usize,
    pub ground_added: bool,
    pub rules: Option<ContactRules>,
}

impl ScriptedWorld {
    pub fn new(torso: Trajectory) -> Self {
        Self {
            clock: Duration::ZERO,
            torso,
            segments: Vec::new(),
            drives: Vec::new(),
            falls: Vec::new(),
            steps: 0,
            ground_added: false,
            rules: None,
        }
    }

    pub fn with_falls(mut self, falls: &[Duration]) -> Self {
        self.falls = falls.to_vec();
        self
    }

    pub fn clock(&self) -> Duration {
        self.clock
    }
}

impl PhysicsWorld for ScriptedWorld {
    fn add_ground(&mut self, _friction: f32) {
        self.ground_added = true;
    }

    fn add_segment(&mut self, desc: &SegmentDesc) -> BodyHandle {
        self.segments.push(*desc);
        BodyHandle::from_index(self.segments.len() - 1)
    }

    fn add_joint(&mut self, desc: &JointDesc) -> Option<ConstraintHandle> {
        self.drives.push(desc.motor);
        Some(ConstraintHandle::from_index(self.drives.len() - 1))
    }

    fn set_contact_rules(&mut self, rules: ContactRules) {
        self.rules = Some(rules);
    }

    fn pose(&self, body: BodyHandle) -> Option<Pose> {
        match body.index() {
            0 => Some((self.torso)(self.clock)),
            index => self.segments.get(index).map(|desc| desc.pose),
        }
    }

    fn angular_velocity(&self, body: BodyHandle) -> Option<f32> {
        (body.index() < self.segments.len()).then_some(0.0)
    }

    fn drive_motor(&mut self, joint: ConstraintHandle, drive: MotorDrive) {
        if let Some(slot) = self.drives.get_mut(joint.index()) {
            *slot = drive;
        }
    }

    fn step(&mut self, dt: Duration) -> Vec<ContactBegin> {
        let previous = self.clock;
        self.clock += dt;
        self.steps += 1;
        self.falls
            .iter()
            .filter(|&&at| at > previous && at <= self.clock)
            .map(|_| ContactBegin {
                first: CollisionCategory::Upper,
                second: CollisionCategory::Ground,
            })
            .collect()
    }
}

/// Torso with a single two-joint leg (hip and knee).
pub fn torso_and_leg() -> BodyPlan {
    let segment = |name: &str, mass: f32, length: f32, category| SegmentPlan {
        name: name.into(),
        mass,
        length,
        category,
    };
    let joint = |name: &str, min: f32, max: f32| JointPlan {
        name: name.into(),
        range: AngularRange::new(min, max),
        max_torque: 150.0,
        starting_angle: 0.0,
        actuated: true,
    };
    BodyPlan {
        torso: segment(TORSO, 40.0, 0.6, CollisionCategory::Upper),
        torso_start: [0.0, 1.5],
        torso_angle: 0.0,
        limbs: vec![
            LimbPlan {
                parent: TORSO.into(),
                attach_to_end: true,
                segment: segment("thigh", 8.0, 0.45, CollisionCategory::Upper),
                joint: joint("hip", -0.4, 1.5),
            },
            LimbPlan {
                parent: "thigh".into(),
                attach_to_end: true,
                segment: segment("calf", 4.0, 0.45, CollisionCategory::Lower),
                joint: joint("knee", -2.3, 0.0),
            },
        ],
        control: ControlMode::Torque,
    }
}

/// Torso center of `torso_and_leg` before anything moves.
pub fn torso_center() -> Vec2 {
    Vec2::new(0.0, 1.2)
}
