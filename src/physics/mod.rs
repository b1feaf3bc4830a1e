use std::time::Duration;

use rapier2d::na::Vector2;
use serde::{Deserialize, Serialize};

pub mod rapier;

pub use rapier::RapierWorld;

pub type Vec2 = Vector2<f32>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionCategory {
    Upper,
    Lower,
    Ground,
}

impl CollisionCategory {
    pub const ALL: [CollisionCategory; 3] = [Self::Upper, Self::Lower, Self::Ground];

    pub fn to_bits(self) -> u128 {
        match self {
            Self::Upper => 1,
            Self::Lower => 2,
            Self::Ground => 3,
        }
    }

    pub fn from_bits(bits: u128) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.to_bits() == bits)
    }
}

/// Center position and absolute angle of a rigid body. Angle 0 means the
/// body's long axis is vertical with its start point on top.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: Vec2,
    pub angle: f32,
}

impl Pose {
    pub fn new(position: Vec2, angle: f32) -> Self {
        Self { position, angle }
    }

    pub fn start_axis(&self) -> Vec2 {
        Vec2::new(-self.angle.sin(), self.angle.cos())
    }

    pub fn is_finite(&self) -> bool {
        self.position.x.is_finite() && self.position.y.is_finite() && self.angle.is_finite()
    }
}

/// Allowed interval for the relative angle (branch minus base) of a joint.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AngularRange {
    pub min: f32,
    pub max: f32,
}

impl AngularRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn midpoint(&self) -> f32 {
        0.5 * (self.min + self.max)
    }

    pub fn width(&self) -> f32 {
        self.max - self.min
    }

    pub fn contains(&self, angle: f32) -> bool {
        angle >= self.min && angle <= self.max
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyHandle(u32);

impl BodyHandle {
    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConstraintHandle(u32);

impl ConstraintHandle {
    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentDesc {
    pub pose: Pose,
    pub mass: f32,
    pub inertia: f32,
    pub length: f32,
    pub category: CollisionCategory,
}

/// Target angular velocity of a joint motor and the largest torque it may
/// apply to reach it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotorDrive {
    pub rate: f32,
    pub max_force: f32,
}

impl MotorDrive {
    pub const IDLE: MotorDrive = MotorDrive {
        rate: 0.0,
        max_force: 0.0,
    };
}

/// Pivot + angular limit + motor between two registered bodies. Anchors are
/// in each body's local frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointDesc {
    pub base: BodyHandle,
    pub branch: BodyHandle,
    pub base_anchor: Vec2,
    pub branch_anchor: Vec2,
    pub range: AngularRange,
    pub limit_strength: f32,
    pub motor: MotorDrive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactFilter {
    Allow,
    Deny,
}

/// Contact filtering and contact notification for category pairs. Pairs are
/// unordered. Unlisted pairs collide and stay silent.
#[derive(Clone, Debug, Default)]
pub struct ContactRules {
    filters: Vec<(CollisionCategory, CollisionCategory, ContactFilter)>,
    notify: Vec<(CollisionCategory, CollisionCategory)>,
}

fn same_pair(
    pair: (CollisionCategory, CollisionCategory),
    a: CollisionCategory,
    b: CollisionCategory,
) -> bool {
    (pair.0 == a && pair.1 == b) || (pair.0 == b && pair.1 == a)
}

impl ContactRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(mut self, a: CollisionCategory, b: CollisionCategory) -> Self {
        self.filters.push((a, b, ContactFilter::Deny));
        self
    }

    pub fn allow(mut self, a: CollisionCategory, b: CollisionCategory) -> Self {
        self.filters.push((a, b, ContactFilter::Allow));
        self
    }

    pub fn notify(mut self, a: CollisionCategory, b: CollisionCategory) -> Self {
        self.notify.push((a, b));
        self
    }

    /// The most recently registered filter for the pair wins.
    pub fn filter(&self, a: CollisionCategory, b: CollisionCategory) -> ContactFilter {
        self.filters
            .iter()
            .rev()
            .find(|(x, y, _)| same_pair((*x, *y), a, b))
            .map(|(_, _, filter)| *filter)
            .unwrap_or(ContactFilter::Allow)
    }

    pub fn notifies(&self, a: CollisionCategory, b: CollisionCategory) -> bool {
        self.notify.iter().any(|pair| same_pair(*pair, a, b))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContactBegin {
    pub first: CollisionCategory,
    pub second: CollisionCategory,
}

impl ContactBegin {
    pub fn involves(&self, a: CollisionCategory, b: CollisionCategory) -> bool {
        same_pair((self.first, self.second), a, b)
    }
}

pub trait PhysicsWorld {
    /// Static ground surface along y = 0.
    fn add_ground(&mut self, friction: f32);

    fn add_segment(&mut self, desc: &SegmentDesc) -> BodyHandle;

    /// `None` when either body handle was not issued by this world.
    fn add_joint(&mut self, desc: &JointDesc) -> Option<ConstraintHandle>;

    fn set_contact_rules(&mut self, rules: ContactRules);

    fn pose(&self, body: BodyHandle) -> Option<Pose>;

    fn angular_velocity(&self, body: BodyHandle) -> Option<f32>;

    fn drive_motor(&mut self, joint: ConstraintHandle, drive: MotorDrive);

    /// Advances by exactly `dt` and returns the begin-contact notifications
    /// raised for watched pairs during that interval.
    fn step(&mut self, dt: Duration) -> Vec<ContactBegin>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_are_symmetric_and_default_to_allow() {
        let rules = ContactRules::new()
            .deny(CollisionCategory::Lower, CollisionCategory::Upper)
            .notify(CollisionCategory::Upper, CollisionCategory::Ground);

        assert_eq!(
            rules.filter(CollisionCategory::Upper, CollisionCategory::Lower),
            ContactFilter::Deny
        );
        assert_eq!(
            rules.filter(CollisionCategory::Lower, CollisionCategory::Ground),
            ContactFilter::Allow
        );
        assert!(rules.notifies(CollisionCategory::Ground, CollisionCategory::Upper));
        assert!(!rules.notifies(CollisionCategory::Lower, CollisionCategory::Ground));
    }

    #[test]
    fn later_filter_overrides_earlier() {
        let rules = ContactRules::new()
            .deny(CollisionCategory::Upper, CollisionCategory::Upper)
            .allow(CollisionCategory::Upper, CollisionCategory::Upper);
        assert_eq!(
            rules.filter(CollisionCategory::Upper, CollisionCategory::Upper),
            ContactFilter::Allow
        );
    }

    #[test]
    fn category_bits_round_trip() {
        for category in CollisionCategory::ALL {
            assert_eq!(CollisionCategory::from_bits(category.to_bits()), Some(category));
        }
        assert_eq!(CollisionCategory::from_bits(0), None);
    }
}
