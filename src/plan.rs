use std::collections::HashMap;
use std::f32::consts::PI;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::physics::{AngularRange, CollisionCategory, Pose, Vec2};
use crate::segment::{end_point_of, start_point_of};

pub const TORSO: &str = "torso";

const HUMANOID_MASS: f32 = 70.0;
const HUMANOID_HEIGHT: f32 = 1.75;
const HUMANOID_BASE_STRENGTH: f32 = 250.0;
const HUMANOID_GROUND_CLEARANCE: f32 = 0.03;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    #[default]
    Torque,
    Rate,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentPlan {
    pub name: String,
    pub mass: f32,
    pub length: f32,
    pub category: CollisionCategory,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JointPlan {
    pub name: String,
    pub range: AngularRange,
    pub max_torque: f32,
    /// Starting angle relative to the parent segment.
    pub starting_angle: f32,
    /// Unactuated joints are left out of the state and command vectors.
    #[serde(default = "default_actuated")]
    pub actuated: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimbPlan {
    pub parent: String,
    #[serde(default = "default_attach_to_end")]
    pub attach_to_end: bool,
    pub segment: SegmentPlan,
    pub joint: JointPlan,
}

/// A torso plus limbs listed parent-before-child. Every limb names a parent
/// that is the torso or an earlier limb.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyPlan {
    pub torso: SegmentPlan,
    /// World position of the torso's start (top) point.
    pub torso_start: [f32; 2],
    #[serde(default)]
    pub torso_angle: f32,
    #[serde(default)]
    pub limbs: Vec<LimbPlan>,
    #[serde(default)]
    pub control: ControlMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartingPose {
    /// Mid-stride, one leg forward.
    Walking,
    /// Straight legs, hips leaning just enough to tip forward.
    Standing,
}

impl std::str::FromStr for StartingPose {
    type Err = SimError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            "walking" => Ok(Self::Walking),
            "standing" => Ok(Self::Standing),
            other => Err(SimError::Config(format!(
                "unknown starting pose '{other}'; expected walking or standing"
            ))),
        }
    }
}

/// Where a plan places one segment before simulation starts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Placement {
    pub parent: Option<usize>,
    pub start: Vec2,
    pub angle: f32,
}

impl BodyPlan {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let plan: BodyPlan = serde_json::from_str(&raw)?;
        plan.layout()?;
        Ok(plan)
    }

    pub fn actuated_joint_names(&self) -> Vec<&str> {
        self.limbs
            .iter()
            .filter(|limb| limb.joint.actuated)
            .map(|limb| limb.joint.name.as_str())
            .collect()
    }

    pub fn segments(&self) -> impl Iterator<Item = &SegmentPlan> {
        std::iter::once(&self.torso).chain(self.limbs.iter().map(|limb| &limb.segment))
    }

    /// Resolves every segment's start point and absolute angle, each from
    /// its already-placed parent.
    pub(crate) fn layout(&self) -> Result<Vec<Placement>> {
        if self.limbs.is_empty() {
            return Err(SimError::InvalidPlan(format!(
                "plan has only the torso '{}' and no limbs",
                self.torso.name
            )));
        }
        if !self.limbs.iter().any(|limb| limb.joint.actuated) {
            return Err(SimError::InvalidPlan("plan has no actuated joints".into()));
        }
        let mut index_by_name: HashMap<&str, usize> = HashMap::new();
        index_by_name.insert(self.torso.name.as_str(), 0);

        let mut placements = Vec::with_capacity(self.limbs.len() + 1);
        placements.push(Placement {
            parent: None,
            start: Vec2::new(self.torso_start[0], self.torso_start[1]),
            angle: self.torso_angle,
        });
        let mut lengths = vec![self.torso.length];

        for (limb_index, limb) in self.limbs.iter().enumerate() {
            let Some(&parent) = index_by_name.get(limb.parent.as_str()) else {
                return Err(SimError::InvalidPlan(format!(
                    "limb '{}' refers to '{}', which is not placed before it",
                    limb.segment.name, limb.parent
                )));
            };
            let parent_placement = placements[parent];
            let parent_length = lengths[parent];
            let parent_pose = pose_from_start(
                parent_placement.start,
                parent_placement.angle,
                parent_length,
            );
            let start = if limb.attach_to_end {
                end_point_of(&parent_pose, parent_length)
            } else {
                start_point_of(&parent_pose, parent_length)
            };
            placements.push(Placement {
                parent: Some(parent),
                start,
                angle: parent_placement.angle + limb.joint.starting_angle,
            });
            lengths.push(limb.segment.length);

            if index_by_name
                .insert(limb.segment.name.as_str(), limb_index + 1)
                .is_some()
            {
                return Err(SimError::InvalidPlan(format!(
                    "segment name '{}' is used twice",
                    limb.segment.name
                )));
            }
        }
        Ok(placements)
    }

    pub fn lowest_point(&self) -> Result<f32> {
        let placements = self.layout()?;
        let lowest = placements
            .iter()
            .zip(self.segments())
            .flat_map(|(placement, segment)| {
                let pose = pose_from_start(placement.start, placement.angle, segment.length);
                [
                    start_point_of(&pose, segment.length).y,
                    end_point_of(&pose, segment.length).y,
                ]
            })
            .fold(f32::INFINITY, f32::min);
        Ok(lowest)
    }

    /// Shifts the body vertically so its lowest point sits `clearance` above
    /// the ground.
    pub fn rest_on_ground(mut self, clearance: f32) -> Result<Self> {
        let lowest = self.lowest_point()?;
        self.torso_start[1] += clearance - lowest;
        Ok(self)
    }

    /// Twelve-segment ragdoll: torso, head, two two-link arms and two
    /// three-link legs. Actuated joint order is left shoulder, left elbow,
    /// right shoulder, right elbow, left hip, left knee, left ankle, right
    /// hip, right knee, right ankle.
    pub fn humanoid(pose: StartingPose) -> Self {
        let angles = HumanoidAngles::for_pose(pose);
        let segment = |name: &str, part: BodyPart| SegmentPlan {
            name: name.to_string(),
            mass: part.mass_fraction() * HUMANOID_MASS,
            length: part.height_fraction() * HUMANOID_HEIGHT,
            category: part.category(),
        };
        let limb = |parent: &str,
                    attach_to_end: bool,
                    name: &str,
                    part: BodyPart,
                    joint_name: &str,
                    kind: JointKind,
                    starting_angle: f32| LimbPlan {
            parent: parent.to_string(),
            attach_to_end,
            segment: segment(name, part),
            joint: JointPlan {
                name: joint_name.to_string(),
                range: kind.range(),
                max_torque: kind.strength_fraction() * HUMANOID_BASE_STRENGTH,
                starting_angle,
                actuated: kind != JointKind::Neck,
            },
        };

        let mut limbs = vec![limb(
            TORSO,
            false,
            "head",
            BodyPart::Head,
            "neck",
            JointKind::Neck,
            angles.neck,
        )];
        for (side, shoulder, elbow) in [
            ("left", angles.left_shoulder, angles.left_elbow),
            ("right", angles.right_shoulder, angles.right_elbow),
        ] {
            let upper_arm = format!("{side}_upper_arm");
            limbs.push(limb(
                TORSO,
                false,
                &upper_arm,
                BodyPart::UpperArm,
                &format!("{side}_shoulder"),
                JointKind::Shoulder,
                shoulder,
            ));
            limbs.push(limb(
                &upper_arm,
                true,
                &format!("{side}_forearm"),
                BodyPart::Forearm,
                &format!("{side}_elbow"),
                JointKind::Elbow,
                elbow,
            ));
        }
        for (side, hip, knee, ankle) in [
            ("left", angles.left_hip, angles.left_knee, angles.left_ankle),
            ("right", angles.right_hip, angles.right_knee, angles.right_ankle),
        ] {
            let thigh = format!("{side}_thigh");
            let calf = format!("{side}_calf");
            limbs.push(limb(
                TORSO,
                true,
                &thigh,
                BodyPart::Thigh,
                &format!("{side}_hip"),
                JointKind::Hip,
                hip,
            ));
            limbs.push(limb(
                &thigh,
                true,
                &calf,
                BodyPart::Calf,
                &format!("{side}_knee"),
                JointKind::Knee,
                knee,
            ));
            limbs.push(limb(
                &calf,
                true,
                &format!("{side}_foot"),
                BodyPart::Foot,
                &format!("{side}_ankle"),
                JointKind::Ankle,
                ankle,
            ));
        }

        let standing_height = (BodyPart::Torso.height_fraction()
            + BodyPart::Thigh.height_fraction()
            + BodyPart::Calf.height_fraction())
            * HUMANOID_HEIGHT;
        let plan = Self {
            torso: segment(TORSO, BodyPart::Torso),
            torso_start: [0.0, standing_height],
            torso_angle: 0.0,
            limbs,
            control: ControlMode::Torque,
        };
        let lowest = plan.lowest_point().unwrap_or(0.0);
        Self {
            torso_start: [0.0, standing_height + HUMANOID_GROUND_CLEARANCE - lowest],
            ..plan
        }
    }
}

pub(crate) fn pose_from_start(start: Vec2, angle: f32, length: f32) -> Pose {
    let axis = Pose::new(Vec2::zeros(), angle).start_axis();
    Pose::new(start - axis * (length * 0.5), angle)
}

fn default_actuated() -> bool {
    true
}

fn default_attach_to_end() -> bool {
    true
}

#[derive(Clone, Copy, Debug)]
enum BodyPart {
    Head,
    Torso,
    UpperArm,
    Forearm,
    Thigh,
    Calf,
    Foot,
}

impl BodyPart {
    fn mass_fraction(self) -> f32 {
        match self {
            Self::Head => 0.0826,
            Self::Torso => 0.551,
            Self::UpperArm => 0.0325,
            // forearm and hand
            Self::Forearm => 0.0187 + 0.0065,
            Self::Thigh => 0.105,
            Self::Calf => 0.0475,
            Self::Foot => 0.0143,
        }
    }

    fn height_fraction(self) -> f32 {
        match self {
            Self::Head => 0.2,
            Self::Torso => 0.3,
            Self::UpperArm => 0.172,
            Self::Forearm => 0.157 + 0.057,
            Self::Thigh => 0.25,
            Self::Calf => 0.23,
            // foot length, not height
            Self::Foot => 0.1,
        }
    }

    fn category(self) -> CollisionCategory {
        match self {
            Self::Calf | Self::Foot => CollisionCategory::Lower,
            _ => CollisionCategory::Upper,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum JointKind {
    Neck,
    Shoulder,
    Elbow,
    Hip,
    Knee,
    Ankle,
}

impl JointKind {
    fn range(self) -> AngularRange {
        match self {
            Self::Neck => AngularRange::new(3.0 * PI / 4.0, 5.0 * PI / 4.0),
            Self::Shoulder => AngularRange::new(-PI / 2.0, PI),
            Self::Elbow => AngularRange::new(0.0, 3.0 * PI / 4.0),
            Self::Hip => AngularRange::new(-PI / 8.0, PI / 2.0),
            Self::Knee => AngularRange::new(-3.0 * PI / 4.0, 0.0),
            Self::Ankle => AngularRange::new(0.0, 2.0 * PI / 3.0),
        }
    }

    fn strength_fraction(self) -> f32 {
        match self {
            Self::Neck => 0.15,
            Self::Shoulder => 0.5,
            Self::Elbow => 0.3,
            Self::Hip | Self::Knee => 0.8,
            Self::Ankle => 0.4,
        }
    }
}

struct HumanoidAngles {
    neck: f32,
    left_shoulder: f32,
    left_elbow: f32,
    right_shoulder: f32,
    right_elbow: f32,
    left_hip: f32,
    left_knee: f32,
    left_ankle: f32,
    right_hip: f32,
    right_knee: f32,
    right_ankle: f32,
}

impl HumanoidAngles {
    fn for_pose(pose: StartingPose) -> Self {
        match pose {
            StartingPose::Walking => Self {
                neck: PI,
                left_shoulder: -PI / 4.0,
                left_elbow: PI / 4.0,
                right_shoulder: PI / 4.0,
                right_elbow: PI / 4.0,
                left_hip: PI / 6.0,
                left_knee: -PI / 6.0,
                left_ankle: PI / 2.0,
                right_hip: -PI / 12.0,
                right_knee: 0.0,
                right_ankle: PI / 2.0,
            },
            StartingPose::Standing => Self {
                neck: PI,
                left_shoulder: 0.0,
                left_elbow: 0.0,
                right_shoulder: 0.0,
                right_elbow: 0.0,
                left_hip: -PI / 128.0,
                left_knee: 0.0,
                left_ankle: PI / 2.0,
                right_hip: -PI / 128.0,
                right_knee: 0.0,
                right_ankle: PI / 2.0,
            },
        }
    }
}
