use anyhow::{ensure, Result};
use infracal_core::PinholeCamera;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier for a parameter block in the IR.
///
/// Stable within a `ProblemIR` instance; residual blocks use it to reference
/// their parameter dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(pub usize);

/// Supported manifold types for parameter blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifoldKind {
    /// Standard Euclidean vector space.
    Euclidean,
    /// SO(3) rotation stored as quaternion `[qx, qy, qz, qw]`.
    SO3,
}

impl ManifoldKind {
    /// Returns `true` if the given ambient dimension matches the manifold storage.
    pub fn compatible_dim(self, dim: usize) -> bool {
        match self {
            ManifoldKind::Euclidean => dim > 0,
            ManifoldKind::SO3 => dim == 4,
        }
    }
}

/// Fixed parameter mask for a block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FixedMask {
    fixed_indices: BTreeSet<usize>,
}

impl FixedMask {
    pub fn all_free() -> Self {
        Self::default()
    }

    pub fn all_fixed(dim: usize) -> Self {
        Self {
            fixed_indices: (0..dim).collect(),
        }
    }

    pub fn fix_indices(indices: &[usize]) -> Self {
        Self {
            fixed_indices: indices.iter().copied().collect(),
        }
    }

    pub fn is_fixed(&self, idx: usize) -> bool {
        self.fixed_indices.contains(&idx)
    }

    /// Returns `true` if all indices `[0, dim)` are fixed.
    pub fn is_all_fixed(&self, dim: usize) -> bool {
        (0..dim).all(|i| self.fixed_indices.contains(&i))
    }

    /// Fixed indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.fixed_indices.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.fixed_indices.is_empty()
    }
}

/// Robust loss applied to a residual block.
///
/// One residual block per observation, so losses act per observation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum RobustLoss {
    #[default]
    None,
    Huber {
        scale: f64,
    },
    Cauchy {
        scale: f64,
    },
}

/// Backend-agnostic factor kinds.
///
/// Each kind implies its parameter layout and residual dimension. The camera
/// model is known data carried by the factor.
#[derive(Debug, Clone, PartialEq)]
pub enum FactorKind {
    /// Pixel residual of a fixed world point seen by a rig camera.
    ///
    /// Parameters: `[ext_rot (SO3), ext_trans (3), odo_pos (3), odo_att (3)]`.
    ReprojOdometryExtrinsics {
        pw: [f64; 3],
        uv: [f64; 2],
        w: f64,
        camera: PinholeCamera,
    },
    /// Same residual with the world point as a parameter.
    ///
    /// Parameters: `[ext_rot, ext_trans, odo_pos, odo_att, point (3)]`.
    ReprojOdometryExtrinsicsPoint {
        uv: [f64; 2],
        w: f64,
        camera: PinholeCamera,
    },
}

impl FactorKind {
    /// Residual dimension implied by the factor.
    pub fn residual_dim(&self) -> usize {
        match self {
            FactorKind::ReprojOdometryExtrinsics { .. } => 2,
            FactorKind::ReprojOdometryExtrinsicsPoint { .. } => 2,
        }
    }

    /// Expected `(dim, manifold)` of each parameter, in order.
    fn param_layout(&self) -> &'static [(usize, ManifoldKind)] {
        const ODO_EXT: [(usize, ManifoldKind); 4] = [
            (4, ManifoldKind::SO3),
            (3, ManifoldKind::Euclidean),
            (3, ManifoldKind::Euclidean),
            (3, ManifoldKind::Euclidean),
        ];
        const ODO_EXT_POINT: [(usize, ManifoldKind); 5] = [
            (4, ManifoldKind::SO3),
            (3, ManifoldKind::Euclidean),
            (3, ManifoldKind::Euclidean),
            (3, ManifoldKind::Euclidean),
            (3, ManifoldKind::Euclidean),
        ];
        match self {
            FactorKind::ReprojOdometryExtrinsics { .. } => &ODO_EXT,
            FactorKind::ReprojOdometryExtrinsicsPoint { .. } => &ODO_EXT_POINT,
        }
    }
}

/// Parameter block definition in the IR.
#[derive(Debug, Clone)]
pub struct ParamBlock {
    pub id: ParamId,
    pub name: String,
    pub dim: usize,
    pub manifold: ManifoldKind,
    pub fixed: FixedMask,
}

/// Residual block definition in the IR.
///
/// The order of `params` must match the factor's expected parameter order.
#[derive(Debug, Clone)]
pub struct ResidualBlock {
    pub params: Vec<ParamId>,
    pub loss: RobustLoss,
    pub factor: FactorKind,
    pub residual_dim: usize,
}

/// Backend-agnostic optimization problem representation.
#[derive(Debug, Default, Clone)]
pub struct ProblemIR {
    pub params: Vec<ParamBlock>,
    pub residuals: Vec<ResidualBlock>,
}

impl ProblemIR {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter block and returns its `ParamId`.
    pub fn add_param_block(
        &mut self,
        name: impl Into<String>,
        dim: usize,
        manifold: ManifoldKind,
        fixed: FixedMask,
    ) -> ParamId {
        let id = ParamId(self.params.len());
        self.params.push(ParamBlock {
            id,
            name: name.into(),
            dim,
            manifold,
            fixed,
        });
        id
    }

    pub fn add_residual_block(&mut self, residual: ResidualBlock) {
        self.residuals.push(residual);
    }

    pub fn param_by_name(&self, name: &str) -> Option<ParamId> {
        self.params.iter().find(|p| p.name == name).map(|p| p.id)
    }

    /// Validates internal consistency and factor expectations.
    pub fn validate(&self) -> Result<()> {
        for (idx, param) in self.params.iter().enumerate() {
            ensure!(
                param.id.0 == idx,
                "param id mismatch: expected {}, got {:?}",
                idx,
                param.id
            );
            ensure!(
                param.manifold.compatible_dim(param.dim),
                "param {} manifold {:?} incompatible with dim {}",
                param.name,
                param.manifold,
                param.dim
            );
            for fixed_idx in param.fixed.iter() {
                ensure!(
                    fixed_idx < param.dim,
                    "param {} fixed index {} out of range",
                    param.name,
                    fixed_idx
                );
            }
        }

        for (r_idx, residual) in self.residuals.iter().enumerate() {
            ensure!(
                residual.residual_dim == residual.factor.residual_dim(),
                "residual {} dim {} does not match factor expectation {}",
                r_idx,
                residual.residual_dim,
                residual.factor.residual_dim()
            );
            if let RobustLoss::Huber { scale } | RobustLoss::Cauchy { scale } = residual.loss {
                ensure!(scale > 0.0, "residual {} robust loss scale must be positive", r_idx);
            }

            let layout = residual.factor.param_layout();
            ensure!(
                residual.params.len() == layout.len(),
                "residual {} expects {} params, got {}",
                r_idx,
                layout.len(),
                residual.params.len()
            );
            for (slot, (param, &(dim, manifold))) in residual.params.iter().zip(layout).enumerate() {
                let block = self.params.get(param.0).ok_or_else(|| {
                    anyhow::anyhow!("residual {} references missing param {:?}", r_idx, param)
                })?;
                ensure!(
                    block.dim == dim && block.manifold == manifold,
                    "residual {} param {} ({}) expects {}D {:?}, got {}D {:?}",
                    r_idx,
                    slot,
                    block.name,
                    dim,
                    manifold,
                    block.dim,
                    block.manifold
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infracal_core::CameraIntrinsics;

    fn camera() -> PinholeCamera {
        PinholeCamera::new(CameraIntrinsics {
            fx: 300.0,
            fy: 300.0,
            cx: 320.0,
            cy: 240.0,
            skew: 0.0,
        })
    }

    fn factor() -> FactorKind {
        FactorKind::ReprojOdometryExtrinsics {
            pw: [0.0, 0.0, 5.0],
            uv: [320.0, 240.0],
            w: 1.0,
            camera: camera(),
        }
    }

    #[test]
    fn fixed_mask_queries() {
        let mask = FixedMask::fix_indices(&[2, 0]);
        assert!(mask.is_fixed(0) && mask.is_fixed(2) && !mask.is_fixed(1));
        assert!(!mask.is_all_fixed(3));
        assert!(FixedMask::all_fixed(4).is_all_fixed(4));
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0, 2]);
        assert!(FixedMask::all_free().is_empty());
    }

    #[test]
    fn validate_accepts_matching_layout() {
        let mut ir = ProblemIR::new();
        let rot = ir.add_param_block("ext_rot/1", 4, ManifoldKind::SO3, FixedMask::all_free());
        let trans = ir.add_param_block("ext_trans/1", 3, ManifoldKind::Euclidean, FixedMask::all_free());
        let pos = ir.add_param_block("odo_pos/0", 3, ManifoldKind::Euclidean, FixedMask::all_free());
        let att = ir.add_param_block("odo_att/0", 3, ManifoldKind::Euclidean, FixedMask::all_free());
        ir.add_residual_block(ResidualBlock {
            params: vec![rot, trans, pos, att],
            loss: RobustLoss::Cauchy { scale: 1.0 },
            factor: factor(),
            residual_dim: 2,
        });
        ir.validate().unwrap();
        assert_eq!(ir.param_by_name("odo_att/0"), Some(att));
    }

    #[test]
    fn validate_rejects_wrong_layout() {
        let mut ir = ProblemIR::new();
        let a = ir.add_param_block("a", 3, ManifoldKind::Euclidean, FixedMask::all_free());
        ir.add_residual_block(ResidualBlock {
            params: vec![a, a, a, a],
            loss: RobustLoss::None,
            factor: factor(),
            residual_dim: 2,
        });
        assert!(ir.validate().is_err());

        let mut ir = ProblemIR::new();
        ir.add_param_block("q", 3, ManifoldKind::SO3, FixedMask::all_free());
        assert!(ir.validate().is_err());
    }
}
