use crate::error::{Result, SimError};
use crate::physics::{BodyHandle, CollisionCategory, PhysicsWorld, Pose, SegmentDesc, Vec2};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SegmentId(pub usize);

/// Moment of inertia of a thin rod about its center.
pub fn rod_inertia(mass: f32, length: f32) -> f32 {
    mass * length * length / 12.0
}

/// One rigid link of the body. The segment's start end sits at
/// `center + start_axis * length / 2` and its end on the opposite side.
#[derive(Clone, Debug)]
pub struct Segment {
    id: SegmentId,
    mass: f32,
    length: f32,
    category: CollisionCategory,
    initial: Pose,
    handle: Option<BodyHandle>,
}

impl Segment {
    /// Creates a segment whose start point is `start_position`, oriented at
    /// the absolute `angle`.
    pub fn create(
        mass: f32,
        length: f32,
        start_position: Vec2,
        angle: f32,
        category: CollisionCategory,
    ) -> Result<Self> {
        if !(mass.is_finite() && mass > 0.0 && length.is_finite() && length > 0.0) {
            return Err(SimError::InvalidGeometry { mass, length });
        }
        let axis = Pose::new(Vec2::zeros(), angle).start_axis();
        let center = start_position - axis * (length * 0.5);
        Ok(Self {
            id: SegmentId::default(),
            mass,
            length,
            category,
            initial: Pose::new(center, angle),
            handle: None,
        })
    }

    pub(crate) fn with_id(mut self, id: SegmentId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn inertia(&self) -> f32 {
        rod_inertia(self.mass, self.length)
    }

    pub fn category(&self) -> CollisionCategory {
        self.category
    }

    pub fn handle(&self) -> Option<BodyHandle> {
        self.handle
    }

    pub fn initial_pose(&self) -> Pose {
        self.initial
    }

    pub fn local_start(&self) -> Vec2 {
        Vec2::new(0.0, self.length * 0.5)
    }

    pub fn local_end(&self) -> Vec2 {
        Vec2::new(0.0, -self.length * 0.5)
    }

    pub(crate) fn add_to_world(&mut self, world: &mut dyn PhysicsWorld) -> BodyHandle {
        let handle = world.add_segment(&SegmentDesc {
            pose: self.initial,
            mass: self.mass,
            inertia: self.inertia(),
            length: self.length,
            category: self.category,
        });
        self.handle = Some(handle);
        handle
    }

    /// Live pose; a segment that is not simulated yet rests at its initial pose.
    pub fn pose(&self, world: &dyn PhysicsWorld) -> Pose {
        self.handle
            .and_then(|handle| world.pose(handle))
            .unwrap_or(self.initial)
    }

    pub fn angle(&self, world: &dyn PhysicsWorld) -> f32 {
        self.pose(world).angle
    }

    pub fn angular_rate(&self, world: &dyn PhysicsWorld) -> f32 {
        self.handle
            .and_then(|handle| world.angular_velocity(handle))
            .unwrap_or(0.0)
    }

    pub fn start_point(&self, world: &dyn PhysicsWorld) -> Vec2 {
        start_point_of(&self.pose(world), self.length)
    }

    pub fn end_point(&self, world: &dyn PhysicsWorld) -> Vec2 {
        end_point_of(&self.pose(world), self.length)
    }

    pub fn initial_start_point(&self) -> Vec2 {
        start_point_of(&self.initial, self.length)
    }

    pub fn initial_end_point(&self) -> Vec2 {
        end_point_of(&self.initial, self.length)
    }
}

pub fn start_point_of(pose: &Pose, length: f32) -> Vec2 {
    pose.position + pose.start_axis() * (length * 0.5)
}

pub fn end_point_of(pose: &Pose, length: f32) -> Vec2 {
    pose.position - pose.start_axis() * (length * 0.5)
}
