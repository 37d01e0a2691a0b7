//! Rig extrinsics.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::Iso3;

/// One pose per camera mapping camera coordinates into the reference
/// camera (camera 0) frame. Camera 0 is the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraRigExtrinsics {
    pub ref_se3_cam: Vec<Iso3>,
}

impl CameraRigExtrinsics {
    /// All cameras at the identity.
    pub fn new(camera_count: usize) -> Self {
        Self {
            ref_se3_cam: vec![Iso3::identity(); camera_count],
        }
    }

    pub fn camera_count(&self) -> usize {
        self.ref_se3_cam.len()
    }

    pub fn get(&self, camera: usize) -> Option<&Iso3> {
        self.ref_se3_cam.get(camera)
    }

    pub fn set(&mut self, camera: usize, ref_se3_cam: Iso3) -> Result<()> {
        ensure!(
            camera < self.ref_se3_cam.len(),
            "camera {} out of range ({} cameras)",
            camera,
            self.ref_se3_cam.len()
        );
        self.ref_se3_cam[camera] = ref_se3_cam;
        Ok(())
    }

    /// Force the reference camera back to the identity.
    pub fn reset_reference(&mut self) {
        if let Some(reference) = self.ref_se3_cam.first_mut() {
            *reference = Iso3::identity();
        }
    }

    /// Every camera back to the identity.
    pub fn reset(&mut self) {
        self.ref_se3_cam.fill(Iso3::identity());
    }

    pub fn poses(&self) -> &[Iso3] {
        &self.ref_se3_cam
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vec3;

    #[test]
    fn set_and_reset() {
        let mut ext = CameraRigExtrinsics::new(3);
        let pose = Iso3::new(Vec3::new(0.1, 0.0, 0.0), Vec3::new(0.0, 0.3, 0.0));
        ext.set(2, pose).unwrap();
        ext.set(0, pose).unwrap();
        assert!(ext.set(3, pose).is_err());

        ext.reset_reference();
        assert_eq!(ext.get(0), Some(&Iso3::identity()));
        assert_eq!(ext.get(2), Some(&pose));

        ext.reset();
        assert!(ext.poses().iter().all(|p| *p == Iso3::identity()));
    }
}
