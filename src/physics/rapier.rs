use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use rapier2d::na::UnitComplex;
use rapier2d::prelude::*;
use tracing::{debug, warn};

use super::{
    BodyHandle, CollisionCategory, ConstraintHandle, ContactBegin, ContactFilter, ContactRules,
    JointDesc, MotorDrive, PhysicsWorld, Pose, SegmentDesc, Vec2,
};
use crate::config::TrialConfig;

const GROUND_HALF_WIDTH: f32 = 1000.0;
const GROUND_HALF_DEPTH: f32 = 5.0;
const SEGMENT_LINEAR_DAMPING: f32 = 0.05;
const SEGMENT_ANGULAR_DAMPING: f32 = 0.1;
const SEGMENT_RESTITUTION: f32 = 0.0;
// Velocity gain of the joint motors. The motor saturates at its max force
// long before this gain matters, which is what makes torque control work.
const MOTOR_DAMPING: f32 = 1.0e4;
const SOLVER_ITERATIONS: NonZeroUsize = NonZeroUsize::MIN.saturating_add(15);

struct CategoryFilter {
    rules: ContactRules,
}

impl PhysicsHooks for CategoryFilter {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        let first = collider_category(context.colliders, context.collider1);
        let second = collider_category(context.colliders, context.collider2);
        if let (Some(a), Some(b)) = (first, second)
            && self.rules.filter(a, b) == ContactFilter::Deny
        {
            return None;
        }
        Some(SolverFlags::COMPUTE_IMPULSES)
    }
}

#[derive(Default)]
struct ContactCollector {
    started: Mutex<Vec<(ColliderHandle, ColliderHandle)>>,
}

impl EventHandler for ContactCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        if let CollisionEvent::Started(first, second, _) = event
            && let Ok(mut started) = self.started.lock()
        {
            started.push((first, second));
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

fn collider_category(colliders: &ColliderSet, handle: ColliderHandle) -> Option<CollisionCategory> {
    colliders
        .get(handle)
        .and_then(|collider| CollisionCategory::from_bits(collider.user_data))
}

/// Registered joint plus what the motor was last asked to do.
#[derive(Clone, Copy, Debug)]
struct JointSlot {
    handle: ImpulseJointHandle,
    base: RigidBodyHandle,
    branch: RigidBodyHandle,
    reference: f32,
    half_width: f32,
    limit_strength: f32,
    drive: MotorDrive,
}

/// Planar rapier world holding one ground and the bodies of a single trial.
pub struct RapierWorld {
    pipeline: PhysicsPipeline,
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    hooks: CategoryFilter,
    events: ContactCollector,
    segments: Vec<RigidBodyHandle>,
    joints: Vec<JointSlot>,
    substeps: u32,
    segment_radius: f32,
    segment_friction: f32,
    max_linear_speed: f32,
    max_angular_speed: f32,
}

impl RapierWorld {
    pub fn new(config: &TrialConfig) -> Self {
        let substeps = config.solver_substeps.max(1);
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = config.timestep().as_secs_f32() / substeps as f32;
        integration_parameters.max_ccd_substeps = 4;
        integration_parameters.num_solver_iterations = SOLVER_ITERATIONS;
        integration_parameters.num_internal_pgs_iterations = 4;
        integration_parameters.num_internal_stabilization_iterations = 4;

        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: vector![0.0, config.gravity],
            integration_parameters,
            island_manager: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            hooks: CategoryFilter {
                rules: ContactRules::new(),
            },
            events: ContactCollector::default(),
            segments: Vec::new(),
            joints: Vec::new(),
            substeps,
            segment_radius: config.segment_radius,
            segment_friction: config.segment_friction,
            max_linear_speed: config.max_linear_speed,
            max_angular_speed: config.max_angular_speed,
        }
    }

    fn segment_body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        let rigid_handle = *self.segments.get(handle.index())?;
        self.bodies.get(rigid_handle)
    }

    /// Joint angle measured from the middle of its range, in (-pi, pi].
    fn joint_offset(&self, slot: &JointSlot) -> Option<f32> {
        let base = self.bodies.get(slot.base)?;
        let branch = self.bodies.get(slot.branch)?;
        let relative = base.rotation().inverse() * branch.rotation();
        Some((relative * UnitComplex::new(-slot.reference)).angle())
    }

    /// What the motor actually runs this substep. Rapier only engages an
    /// angular limit once it has been crossed, so the commanded rate is
    /// capped to what closes the remaining gap in one substep, and a joint
    /// found past its limit is servoed back with the limit's strength.
    fn limited_drive(&self, slot: &JointSlot, dt: f32) -> MotorDrive {
        let Some(offset) = self.joint_offset(slot) else {
            return slot.drive;
        };
        let upper_gap = slot.half_width - offset;
        let lower_gap = offset + slot.half_width;
        if upper_gap < 0.0 || lower_gap < 0.0 {
            let correction = if upper_gap < 0.0 { upper_gap } else { -lower_gap };
            return MotorDrive {
                rate: correction / dt,
                max_force: slot.limit_strength,
            };
        }
        MotorDrive {
            rate: slot.drive.rate.clamp(-lower_gap / dt, upper_gap / dt),
            max_force: slot.drive.max_force,
        }
    }

    fn apply_joint_limits(&mut self) {
        let dt = self.integration_parameters.dt;
        for index in 0..self.joints.len() {
            let slot = self.joints[index];
            let drive = self.limited_drive(&slot, dt);
            if let Some(joint) = self.impulse_joints.get_mut(slot.handle, true) {
                joint
                    .data
                    .set_motor_velocity(JointAxis::AngX, drive.rate, MOTOR_DAMPING);
                joint
                    .data
                    .set_motor_max_force(JointAxis::AngX, drive.max_force);
            }
        }
    }

    fn clamp_velocities(&mut self) {
        for handle in &self.segments {
            if let Some(body) = self.bodies.get_mut(*handle) {
                let angvel = body.angvel();
                if angvel.abs() > self.max_angular_speed {
                    body.set_angvel(angvel.signum() * self.max_angular_speed, true);
                }
                let linvel = *body.linvel();
                let speed = linvel.norm();
                if speed > self.max_linear_speed {
                    body.set_linvel(linvel * (self.max_linear_speed / speed), true);
                }
            }
        }
    }

    fn drain_contacts(&mut self) -> Vec<ContactBegin> {
        let started = match self.events.started.lock() {
            Ok(mut started) => std::mem::take(&mut *started),
            Err(_) => return Vec::new(),
        };
        started
            .into_iter()
            .filter_map(|(first, second)| {
                let first = collider_category(&self.colliders, first)?;
                let second = collider_category(&self.colliders, second)?;
                self.hooks
                    .rules
                    .notifies(first, second)
                    .then_some(ContactBegin { first, second })
            })
            .collect()
    }
}

impl PhysicsWorld for RapierWorld {
    fn add_ground(&mut self, friction: f32) {
        let ground_handle = self.bodies.insert(RigidBodyBuilder::fixed().build());
        let ground_collider = ColliderBuilder::cuboid(GROUND_HALF_WIDTH, GROUND_HALF_DEPTH)
            .translation(vector![0.0, -GROUND_HALF_DEPTH])
            .friction(friction)
            .restitution(SEGMENT_RESTITUTION)
            .user_data(CollisionCategory::Ground.to_bits())
            .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        self.colliders
            .insert_with_parent(ground_collider, ground_handle, &mut self.bodies);
    }

    fn add_segment(&mut self, desc: &SegmentDesc) -> BodyHandle {
        // Mass and inertia come from the rod model, not from the collider shape.
        let body = RigidBodyBuilder::dynamic()
            .translation(vector![desc.pose.position.x, desc.pose.position.y])
            .rotation(desc.pose.angle)
            .additional_mass_properties(MassProperties::new(
                point![0.0, 0.0],
                desc.mass,
                desc.inertia,
            ))
            .linear_damping(SEGMENT_LINEAR_DAMPING)
            .angular_damping(SEGMENT_ANGULAR_DAMPING)
            .ccd_enabled(true)
            .build();
        let rigid_handle = self.bodies.insert(body);
        let collider = ColliderBuilder::capsule_y(desc.length * 0.5, self.segment_radius)
            .density(0.0)
            .friction(self.segment_friction)
            .restitution(SEGMENT_RESTITUTION)
            .user_data(desc.category.to_bits())
            .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        self.colliders
            .insert_with_parent(collider, rigid_handle, &mut self.bodies);

        self.segments.push(rigid_handle);
        BodyHandle::from_index(self.segments.len() - 1)
    }

    fn add_joint(&mut self, desc: &JointDesc) -> Option<ConstraintHandle> {
        let Some((base, branch)) = self
            .segments
            .get(desc.base.index())
            .zip(self.segments.get(desc.branch.index()))
            .map(|(base, branch)| (*base, *branch))
        else {
            warn!(
                "joint refers to bodies {} and {}, which this world does not own",
                desc.base.index(),
                desc.branch.index()
            );
            return None;
        };
        // Frame 1 is rotated to the middle of the range so the limits sit
        // symmetrically around zero and never straddle the +-pi wrap.
        let reference = desc.range.midpoint();
        let half_width = desc.range.width() * 0.5;
        let mut joint = RevoluteJointBuilder::new()
            .local_anchor1(point![desc.base_anchor.x, desc.base_anchor.y])
            .local_anchor2(point![desc.branch_anchor.x, desc.branch_anchor.y])
            .limits([-half_width, half_width])
            .motor_model(MotorModel::ForceBased)
            .motor_velocity(desc.motor.rate, MOTOR_DAMPING)
            .motor_max_force(desc.motor.max_force)
            .contacts_enabled(false)
            .build();
        joint.data.local_frame1.rotation = UnitComplex::new(reference);

        let handle = self.impulse_joints.insert(base, branch, joint, true);
        self.joints.push(JointSlot {
            handle,
            base,
            branch,
            reference,
            half_width,
            limit_strength: desc.limit_strength,
            drive: desc.motor,
        });
        debug!(
            joint = self.joints.len() - 1,
            min = desc.range.min,
            max = desc.range.max,
            limit_strength = desc.limit_strength,
            "registered revolute joint"
        );
        Some(ConstraintHandle::from_index(self.joints.len() - 1))
    }

    fn set_contact_rules(&mut self, rules: ContactRules) {
        self.hooks.rules = rules;
    }

    fn pose(&self, body: BodyHandle) -> Option<Pose> {
        let body = self.segment_body(body)?;
        let translation = body.translation();
        Some(Pose::new(
            Vec2::new(translation.x, translation.y),
            body.rotation().angle(),
        ))
    }

    fn angular_velocity(&self, body: BodyHandle) -> Option<f32> {
        self.segment_body(body).map(|body| body.angvel())
    }

    fn drive_motor(&mut self, joint: ConstraintHandle, drive: MotorDrive) {
        if let Some(slot) = self.joints.get_mut(joint.index()) {
            slot.drive = drive;
        }
    }

    fn step(&mut self, dt: Duration) -> Vec<ContactBegin> {
        self.integration_parameters.dt = dt.as_secs_f32() / self.substeps as f32;
        let mut contacts = Vec::new();
        for _ in 0..self.substeps {
            self.apply_joint_limits();
            self.pipeline.step(
                &self.gravity,
                &self.integration_parameters,
                &mut self.island_manager,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.bodies,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                &mut self.ccd_solver,
                &self.hooks,
                &self.events,
            );
            self.clamp_velocities();
            contacts.extend(self.drain_contacts());
        }
        contacts
    }
}
