//! Rigid-body contact backends.
//!
//! A [`PhysicsBackend`] can replace the sphere-tree walk as the narrow phase
//! of the collision engine: bodies are registered once, moved with
//! [`PhysicsBackend::set_pose`] and queried pairwise.
//!
//! # Example
//!
//! ```
//! use u_cellpack::ingredient::{Pose, SphereTree};
//! use u_cellpack::physics::{PhysicsBackend, SphereContactBackend};
//! use u_cellpack_core::geometry::Pt3;
//!
//! let mut backend = SphereContactBackend::new();
//! let a = backend.add_rigid_body(&SphereTree::single(1.0), &Pose::at(Pt3::origin()));
//! let b = backend.add_rigid_body(&SphereTree::single(1.0), &Pose::at(Pt3::new(1.5, 0.0, 0.0)));
//! assert!(backend.test_contact(a, b).unwrap());
//! ```

use crate::ingredient::{Pose, SphereTree};
use u_cellpack_core::{Error, Result};

/// Handle to a registered body.
pub type BodyHandle = usize;

/// Contact queries between posed rigid bodies.
pub trait PhysicsBackend: Send {
    /// Registers a body with `shape` at `pose`.
    fn add_rigid_body(&mut self, shape: &SphereTree, pose: &Pose) -> BodyHandle;

    /// Moves a body.
    fn set_pose(&mut self, body: BodyHandle, pose: &Pose) -> Result<()>;

    /// Unregisters a body.
    fn remove_rigid_body(&mut self, body: BodyHandle) -> Result<()>;

    /// Whether two bodies interpenetrate.
    fn test_contact(&self, a: BodyHandle, b: BodyHandle) -> Result<bool>;

    /// Live body count.
    fn body_count(&self) -> usize;
}

#[derive(Debug, Clone)]
struct Body {
    shape: SphereTree,
    pose: Pose,
}

/// Contact solver over sphere hierarchies.
#[derive(Debug, Clone, Default)]
pub struct SphereContactBackend {
    bodies: Vec<Option<Body>>,
}

impl SphereContactBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn body(&self, handle: BodyHandle) -> Result<&Body> {
        self.bodies
            .get(handle)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::GridInconsistency(format!("unknown rigid body {handle}")))
    }
}

impl PhysicsBackend for SphereContactBackend {
    fn add_rigid_body(&mut self, shape: &SphereTree, pose: &Pose) -> BodyHandle {
        self.bodies.push(Some(Body {
            shape: shape.clone(),
            pose: *pose,
        }));
        self.bodies.len() - 1
    }

    fn set_pose(&mut self, body: BodyHandle, pose: &Pose) -> Result<()> {
        match self.bodies.get_mut(body).and_then(Option::as_mut) {
            Some(b) => {
                b.pose = *pose;
                Ok(())
            }
            None => Err(Error::GridInconsistency(format!("unknown rigid body {body}"))),
        }
    }

    fn remove_rigid_body(&mut self, body: BodyHandle) -> Result<()> {
        match self.bodies.get_mut(body) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                Ok(())
            }
            _ => Err(Error::GridInconsistency(format!("unknown rigid body {body}"))),
        }
    }

    fn test_contact(&self, a: BodyHandle, b: BodyHandle) -> Result<bool> {
        let (a, b) = (self.body(a)?, self.body(b)?);
        Ok(a.shape.overlaps(&a.pose, &b.shape, &b.pose))
    }

    fn body_count(&self) -> usize {
        self.bodies.iter().filter(|b| b.is_some()).count()
    }
}
