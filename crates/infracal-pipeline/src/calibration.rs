//! Infrastructure-based calibration of a multi-camera rig.
//!
//! Usage:
//! 1. [`InfrastructureCalibration::load_map`] (or `set_reference_map`),
//! 2. [`InfrastructureCalibration::add_frame_set`] for every synchronized
//!    image set (or `load_frame_sets` to replay a session),
//! 3. [`InfrastructureCalibration::run`], which initializes and refines the
//!    extrinsics and returns a [`CalibrationReport`].

use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use image::GrayImage;
use infracal_core::{
    frame_error, frame_pnp_error, mean_frame_pnp_error, session_error, CameraRigExtrinsics,
    ErrorStats, Frame, FrameGraph, FrameSet, Iso3, Odometry, PinholeCamera, PointMap,
};
use parking_lot::{Mutex, MutexGuard};

use crate::assembler::{collect_frame_set, keyframe_gate, localize_cameras, GateDecision};
use crate::config::InfrastructureConfig;
use crate::estimator::{Capabilities, FramePoseEstimator};
use crate::initializer::{initialize_extrinsics, Initialization};
use crate::session_log::{LogEntry, Operation};
use crate::odometry::OdometryDistance;
use crate::refiner::{refine_session, RefineSummary};
use crate::report::CalibrationReport;
use crate::store::{frame_sets_to_graph, graph_to_frame_sets, read_graph_file, write_graph_file};

/// File name of the reference map inside a map directory.
pub const REFERENCE_MAP_FILE: &str = "frames_3.sg";

pub struct InfrastructureCalibration {
    cameras: Vec<PinholeCamera>,
    config: InfrastructureConfig,
    capabilities: Capabilities,
    reference: Option<FrameGraph>,
    point_map: Mutex<PointMap>,
    frame_sets: Vec<FrameSet>,
    extrinsics: CameraRigExtrinsics,
    odometry: OdometryDistance,
    initialization: Option<Initialization>,
    log: Vec<LogEntry>,
}

impl InfrastructureCalibration {
    pub fn new(cameras: Vec<PinholeCamera>, config: InfrastructureConfig, capabilities: Capabilities) -> Result<Self> {
        ensure!(!cameras.is_empty(), "need at least one camera");
        config.validate()?;
        let extrinsics = CameraRigExtrinsics::new(cameras.len());
        Ok(Self {
            cameras,
            config,
            capabilities,
            reference: None,
            point_map: Mutex::new(PointMap::new()),
            frame_sets: Vec::new(),
            extrinsics,
            odometry: OdometryDistance::new(),
            initialization: None,
            log: Vec::new(),
        })
    }

    pub fn cameras(&self) -> &[PinholeCamera] {
        &self.cameras
    }

    pub fn config(&self) -> &InfrastructureConfig {
        &self.config
    }

    pub fn reference_map(&self) -> Option<&FrameGraph> {
        self.reference.as_ref()
    }

    /// Committed frame sets in arrival order.
    pub fn frame_sets(&self) -> &[FrameSet] {
        &self.frame_sets
    }

    pub fn extrinsics(&self) -> &CameraRigExtrinsics {
        &self.extrinsics
    }

    /// Session points.
    pub fn point_map(&self) -> MutexGuard<'_, PointMap> {
        self.point_map.lock()
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// Load `<dir>/frames_3.sg` as the reference map.
    pub fn load_map(&mut self, dir: &Path) -> Result<()> {
        let path = dir.join(REFERENCE_MAP_FILE);
        let graph = match read_graph_file(&path) {
            Ok(graph) => graph,
            Err(err) => {
                log::error!("cannot read reference map {}: {}", path.display(), err);
                self.log
                    .push(LogEntry::failure(Operation::LoadMap, err.to_string()));
                return Err(err).with_context(|| format!("reading reference map {}", path.display()));
            }
        };
        self.set_reference_map(graph)?;
        log::info!("loaded reference map from {}", path.display());
        Ok(())
    }

    /// Attach a reference map, index it for place recognition and reset the
    /// session.
    pub fn set_reference_map(&mut self, graph: FrameGraph) -> Result<()> {
        if let Err(err) = graph.validate() {
            self.log
                .push(LogEntry::failure(Operation::LoadMap, err.to_string()));
            return Err(err.context("invalid reference map"));
        }
        ensure!(
            graph.camera_count() <= self.cameras.len(),
            "reference map has {} cameras, rig has {}",
            graph.camera_count(),
            self.cameras.len()
        );
        self.capabilities.recognizer.setup(&graph);
        self.log.push(LogEntry::success_with_notes(
            Operation::LoadMap,
            format!("{} frames, {} points", graph.frame_count(), graph.points.len()),
        ));
        self.reference = Some(graph);
        self.reset();
        Ok(())
    }

    /// Localize one synchronized image set and commit it if at least two
    /// cameras were localized and the rig moved far enough since the last
    /// committed set. Returns whether the set was committed.
    pub fn add_frame_set(&mut self, images: &[GrayImage], timestamp: u64, preprocess: bool) -> bool {
        if images.len() != self.cameras.len() {
            log::warn!(
                "t={}: got {} images for {} cameras, skipping",
                timestamp,
                images.len(),
                self.cameras.len()
            );
            self.log.push(LogEntry::failure(
                Operation::AddFrameSet,
                format!("image count {} != camera count {}", images.len(), self.cameras.len()),
            ));
            return false;
        }
        let Some(reference) = self.reference.as_ref() else {
            log::warn!("t={}: no reference map loaded, skipping", timestamp);
            self.log
                .push(LogEntry::failure(Operation::AddFrameSet, "no reference map"));
            return false;
        };

        let estimator = FramePoseEstimator {
            config: &self.config,
            reference,
            capabilities: &self.capabilities,
            point_map: &self.point_map,
        };
        let frames = localize_cameras(&estimator, &self.cameras, images, timestamp, preprocess);

        let Some(frame_set) = collect_frame_set(timestamp, frames) else {
            return false;
        };

        let decision = keyframe_gate(
            self.frame_sets.last(),
            &frame_set,
            self.config.min_keyframe_distance,
        );
        match decision {
            GateDecision::TooClose(d) => {
                log::info!("t={}: skipping frame set, keyframe distance {:.3} too small", timestamp, d);
                return false;
            }
            GateDecision::NoSharedCamera => {
                log::info!("t={}: skipping frame set, no camera shared with the previous set", timestamp);
                return false;
            }
            GateDecision::First | GateDecision::Accepted(_) => {}
        }

        let cameras: Vec<usize> = frame_set.cameras().collect();
        self.frame_sets.push(frame_set);
        log::info!(
            "added frame set {} {:?} t={}",
            self.frame_sets.len(),
            cameras,
            timestamp
        );
        self.log.push(LogEntry::success_with_notes(
            Operation::AddFrameSet,
            format!("t={} cameras {:?}", timestamp, cameras),
        ));
        true
    }

    pub fn add_odometry(&mut self, x: f64, y: f64, yaw: f64, timestamp: u64) {
        self.odometry.add(x, y, yaw, timestamp);
    }

    pub fn odometry_distance(&self) -> f64 {
        self.odometry.distance()
    }

    /// Drop the session: points, frame sets, odometry distance and
    /// extrinsics. The reference map stays.
    pub fn reset(&mut self) {
        self.point_map.get_mut().clear();
        self.frame_sets.clear();
        self.odometry.reset();
        self.extrinsics.reset();
        self.initialization = None;
    }

    /// Seed extrinsics and per-set odometry from the best complete frame set.
    pub fn initialize(&mut self) -> Result<&Initialization> {
        self.extrinsics.reset_reference();
        let points = self.point_map.get_mut();
        match initialize_extrinsics(&self.cameras, &mut self.frame_sets, points.points()) {
            Ok(init) => {
                self.extrinsics = init.extrinsics.clone();
                self.log.push(LogEntry::success_with_notes(
                    Operation::Initialize,
                    format!("frame set {}: {}", init.frame_set, init.error),
                ));
                Ok(&*self.initialization.insert(init))
            }
            Err(err) => {
                log::error!("initialization failed: {}", err);
                self.log
                    .push(LogEntry::failure(Operation::Initialize, err.to_string()));
                Err(err)
            }
        }
    }

    /// Jointly refine extrinsics, odometry and optionally scene points.
    pub fn optimize(&mut self, optimize_scene_points: bool) -> Result<RefineSummary> {
        let result = refine_session(
            &self.cameras,
            &mut self.frame_sets,
            self.point_map.get_mut(),
            &mut self.extrinsics,
            &self.config.refine,
            optimize_scene_points,
        );
        match &result {
            Ok(summary) => self.log.push(LogEntry::success_with_notes(
                Operation::Optimize,
                format!("{} -> {}", summary.initial, summary.refined),
            )),
            Err(err) => {
                log::error!("refinement failed: {:#}", err);
                self.log
                    .push(LogEntry::failure(Operation::Optimize, format!("{:#}", err)));
            }
        }
        result
    }

    /// Initialize, refine and report.
    pub fn run(&mut self) -> Result<CalibrationReport> {
        if self.frame_sets.is_empty() {
            bail!("no frame sets to calibrate");
        }

        let mean_pnp_error = {
            let points = self.point_map.get_mut();
            mean_frame_pnp_error(&self.cameras, &self.frame_sets, points.points())
        };
        let frames: usize = self.frame_sets.iter().map(FrameSet::len).sum();
        log::info!("average per-frame PnP reprojection error: {:.4} px", mean_pnp_error);
        log::info!(
            "average number of frames per set: {:.2}",
            frames as f64 / self.frame_sets.len() as f64
        );

        let (chosen_frame_set, hypotheses) = {
            let init = self.initialize()?;
            (init.frame_set, init.hypotheses.clone())
        };
        let summary = self.optimize(self.config.refine.optimize_scene_points)?;
        log::info!("odometry distance: {:.3} m", self.odometry.distance());

        Ok(CalibrationReport {
            frame_set_count: self.frame_sets.len(),
            chosen_frame_set,
            mean_pnp_error,
            hypotheses,
            initial_error: summary.initial,
            refined_error: summary.refined,
            final_cost: summary.final_cost,
            iterations: summary.iterations,
            extrinsics: self.extrinsics.clone(),
            odometry_distance: self.odometry.distance(),
        })
    }

    /// Whole-session reprojection error under the current extrinsics and
    /// odometry.
    pub fn reprojection_error(&self) -> ErrorStats {
        let points = self.point_map.lock();
        session_error(&self.cameras, &self.frame_sets, points.points(), &self.extrinsics)
    }

    /// Error of a frame's own PnP pose.
    pub fn frame_pnp_error(&self, frame: &Frame) -> ErrorStats {
        let Some(camera) = self.cameras.get(frame.camera) else {
            return ErrorStats::default();
        };
        frame_pnp_error(camera, frame, self.point_map.lock().points())
    }

    /// Error of a frame under the given odometry and extrinsic.
    pub fn frame_error(&self, frame: &Frame, odometry: &Odometry, ref_se3_cam: &Iso3) -> ErrorStats {
        let Some(camera) = self.cameras.get(frame.camera) else {
            return ErrorStats::default();
        };
        frame_error(camera, frame, self.point_map.lock().points(), odometry, ref_se3_cam)
    }

    /// Replace the session with frame sets stored at `path`.
    pub fn load_frame_sets(&mut self, path: &Path) -> Result<()> {
        let graph = match read_graph_file(path) {
            Ok(graph) => graph,
            Err(err) => {
                log::error!("cannot read frame sets {}: {}", path.display(), err);
                self.log
                    .push(LogEntry::failure(Operation::LoadFrameSets, err.to_string()));
                return Err(err).with_context(|| format!("reading frame sets {}", path.display()));
            }
        };
        ensure!(
            graph.camera_count() <= self.cameras.len(),
            "frame sets cover {} cameras, rig has {}",
            graph.camera_count(),
            self.cameras.len()
        );

        self.frame_sets = graph_to_frame_sets(&graph);
        *self.point_map.get_mut() = PointMap::from_points(graph.points);
        self.initialization = None;
        log::info!(
            "loaded {} frame sets from {}",
            self.frame_sets.len(),
            path.display()
        );
        self.log.push(LogEntry::success_with_notes(
            Operation::LoadFrameSets,
            format!("{} frame sets", self.frame_sets.len()),
        ));
        Ok(())
    }

    /// Persist the committed frame sets and session points to `path`.
    pub fn save_frame_sets(&mut self, path: &Path) -> Result<()> {
        let graph = frame_sets_to_graph(
            &self.frame_sets,
            self.cameras.len(),
            self.point_map.get_mut().points(),
        );
        if let Err(err) = write_graph_file(path, &graph) {
            log::error!("cannot write frame sets {}: {}", path.display(), err);
            self.log
                .push(LogEntry::failure(Operation::SaveFrameSets, err.to_string()));
            return Err(err).with_context(|| format!("writing frame sets {}", path.display()));
        }
        log::info!(
            "wrote {} frame sets to {}",
            self.frame_sets.len(),
            path.display()
        );
        self.log.push(LogEntry::success_with_notes(
            Operation::SaveFrameSets,
            format!("{} frame sets", self.frame_sets.len()),
        ));
        Ok(())
    }
}
