//! Binary frame-graph format.
//!
//! Little-endian layout:
//! - header: magic `IFGR`, version `u32`,
//! - `camera_count: u32`; per camera `segment_count: u32`; per segment
//!   `frame_count: u32` followed by the frames,
//! - frame: `camera: u32`, `timestamp: u64`, pose flag `u8` (+ `qx qy qz qw
//!   tx ty tz` as `f64`), `feature_count: u32` followed by the features,
//! - feature: `index: u32`, keypoint (`x y: f64`, `size angle response:
//!   f32`, `octave: i32`), descriptor (kind `u8`, `len: u32`, payload),
//!   association flag `u8` (+ point index `u32`),
//! - `point_count: u32`; per point `x y z: f64`, source flag `u8` (+ `u64`).
//!
//! Point observations are not stored; they are rebuilt from the frame
//! associations when reading.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use infracal_core::{
    Descriptor, Frame, FrameGraph, Iso3, Keypoint, Point2DFeature, Point3DFeature, PointId, Pt3,
    Vec3,
};
use nalgebra::{Quaternion, UnitQuaternion};
use thiserror::Error;

const MAGIC: &[u8; 4] = b"IFGR";
pub const VERSION: u32 = 1;

/// Upper bound on speculative preallocation from untrusted counts.
const MAX_PREALLOC: usize = 1 << 16;

#[derive(Debug, Error)]
pub enum GraphIoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    #[error("version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

fn invalid(msg: impl Into<String>) -> GraphIoError {
    GraphIoError::InvalidFormat(msg.into())
}

fn len_u32(len: usize, what: &str) -> Result<u32, GraphIoError> {
    u32::try_from(len).map_err(|_| invalid(format!("{} count {} exceeds u32", what, len)))
}

struct Encoder<W: Write> {
    inner: W,
}

impl<W: Write> Encoder<W> {
    fn bytes(&mut self, b: &[u8]) -> Result<(), GraphIoError> {
        self.inner.write_all(b)?;
        Ok(())
    }

    fn u8(&mut self, v: u8) -> Result<(), GraphIoError> {
        self.bytes(&[v])
    }

    fn u32(&mut self, v: u32) -> Result<(), GraphIoError> {
        self.bytes(&v.to_le_bytes())
    }

    fn i32(&mut self, v: i32) -> Result<(), GraphIoError> {
        self.bytes(&v.to_le_bytes())
    }

    fn u64(&mut self, v: u64) -> Result<(), GraphIoError> {
        self.bytes(&v.to_le_bytes())
    }

    fn f32(&mut self, v: f32) -> Result<(), GraphIoError> {
        self.bytes(&v.to_le_bytes())
    }

    fn f64(&mut self, v: f64) -> Result<(), GraphIoError> {
        self.bytes(&v.to_le_bytes())
    }

    fn count(&mut self, len: usize, what: &str) -> Result<(), GraphIoError> {
        self.u32(len_u32(len, what)?)
    }
}

struct Decoder<R: Read> {
    inner: R,
}

impl<R: Read> Decoder<R> {
    fn array<const N: usize>(&mut self) -> Result<[u8; N], GraphIoError> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8, GraphIoError> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, GraphIoError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32, GraphIoError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, GraphIoError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32, GraphIoError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64, GraphIoError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    fn count(&mut self) -> Result<usize, GraphIoError> {
        Ok(self.u32()? as usize)
    }

    fn flag(&mut self, what: &str) -> Result<bool, GraphIoError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(invalid(format!("{} flag must be 0 or 1, got {}", what, other))),
        }
    }
}

fn write_pose<W: Write>(enc: &mut Encoder<W>, pose: &Iso3) -> Result<(), GraphIoError> {
    let q = pose.rotation.quaternion();
    for v in [q.i, q.j, q.k, q.w] {
        enc.f64(v)?;
    }
    let t = pose.translation.vector;
    for v in [t.x, t.y, t.z] {
        enc.f64(v)?;
    }
    Ok(())
}

fn read_pose<R: Read>(dec: &mut Decoder<R>) -> Result<Iso3, GraphIoError> {
    let (x, y, z, w) = (dec.f64()?, dec.f64()?, dec.f64()?, dec.f64()?);
    let t = Vec3::new(dec.f64()?, dec.f64()?, dec.f64()?);
    let q = Quaternion::new(w, x, y, z);
    let norm = q.norm();
    if !norm.is_finite() || (norm - 1.0).abs() > 1e-6 {
        return Err(invalid(format!("pose quaternion has norm {}", norm)));
    }
    Ok(Iso3::from_parts(t.into(), UnitQuaternion::new_unchecked(q)))
}

fn write_descriptor<W: Write>(enc: &mut Encoder<W>, descriptor: &Descriptor) -> Result<(), GraphIoError> {
    match descriptor {
        Descriptor::Binary(bytes) => {
            enc.u8(0)?;
            enc.count(bytes.len(), "descriptor")?;
            enc.bytes(bytes)
        }
        Descriptor::Float(values) => {
            enc.u8(1)?;
            enc.count(values.len(), "descriptor")?;
            values.iter().try_for_each(|&v| enc.f32(v))
        }
    }
}

fn read_descriptor<R: Read>(dec: &mut Decoder<R>) -> Result<Descriptor, GraphIoError> {
    let kind = dec.u8()?;
    let len = dec.count()?;
    match kind {
        0 => {
            let mut bytes = Vec::with_capacity(len.min(MAX_PREALLOC));
            for _ in 0..len {
                bytes.push(dec.u8()?);
            }
            Ok(Descriptor::Binary(bytes))
        }
        1 => {
            let mut values = Vec::with_capacity(len.min(MAX_PREALLOC));
            for _ in 0..len {
                values.push(dec.f32()?);
            }
            Ok(Descriptor::Float(values))
        }
        other => Err(invalid(format!("unknown descriptor kind {}", other))),
    }
}

fn write_feature<W: Write>(enc: &mut Encoder<W>, feature: &Point2DFeature) -> Result<(), GraphIoError> {
    enc.count(feature.index, "feature index")?;
    let kp = &feature.keypoint;
    enc.f64(kp.x)?;
    enc.f64(kp.y)?;
    enc.f32(kp.size)?;
    enc.f32(kp.angle)?;
    enc.f32(kp.response)?;
    enc.i32(kp.octave)?;
    write_descriptor(enc, &feature.descriptor)?;
    match feature.feature3d {
        Some(pid) => {
            enc.u8(1)?;
            enc.count(pid.0, "point index")
        }
        None => enc.u8(0),
    }
}

fn read_feature<R: Read>(dec: &mut Decoder<R>) -> Result<Point2DFeature, GraphIoError> {
    let index = dec.count()?;
    let keypoint = Keypoint {
        x: dec.f64()?,
        y: dec.f64()?,
        size: dec.f32()?,
        angle: dec.f32()?,
        response: dec.f32()?,
        octave: dec.i32()?,
    };
    let descriptor = read_descriptor(dec)?;
    let mut feature = Point2DFeature::new(index, keypoint, descriptor);
    if dec.flag("association")? {
        feature.feature3d = Some(PointId(dec.count()?));
    }
    Ok(feature)
}

fn write_frame<W: Write>(enc: &mut Encoder<W>, frame: &Frame) -> Result<(), GraphIoError> {
    enc.count(frame.camera, "camera index")?;
    enc.u64(frame.timestamp)?;
    match &frame.cam_se3_world {
        Some(pose) => {
            enc.u8(1)?;
            write_pose(enc, pose)?;
        }
        None => enc.u8(0)?,
    }
    enc.count(frame.features.len(), "feature")?;
    frame.features.iter().try_for_each(|f| write_feature(enc, f))
}

fn read_frame<R: Read>(dec: &mut Decoder<R>) -> Result<Frame, GraphIoError> {
    let camera = dec.count()?;
    let timestamp = dec.u64()?;
    let pose = if dec.flag("pose")? {
        Some(read_pose(dec)?)
    } else {
        None
    };
    let count = dec.count()?;
    let mut features = Vec::with_capacity(count.min(MAX_PREALLOC));
    for _ in 0..count {
        features.push(read_feature(dec)?);
    }
    let mut frame = Frame::new(camera, timestamp, features);
    frame.cam_se3_world = pose;
    Ok(frame)
}

/// Serialize `graph`.
pub fn write_graph<W: Write>(writer: W, graph: &FrameGraph) -> Result<(), GraphIoError> {
    let mut enc = Encoder { inner: writer };
    enc.bytes(MAGIC)?;
    enc.u32(VERSION)?;

    enc.count(graph.segments.len(), "camera")?;
    for segments in &graph.segments {
        enc.count(segments.len(), "segment")?;
        for frames in segments {
            enc.count(frames.len(), "frame")?;
            frames.iter().try_for_each(|f| write_frame(&mut enc, f))?;
        }
    }

    enc.count(graph.points.len(), "point")?;
    for point in &graph.points {
        enc.f64(point.position.x)?;
        enc.f64(point.position.y)?;
        enc.f64(point.position.z)?;
        match point.source {
            Some(source) => {
                enc.u8(1)?;
                enc.u64(source.0 as u64)?;
            }
            None => enc.u8(0)?,
        }
    }
    enc.inner.flush()?;
    Ok(())
}

/// Deserialize a graph and rebuild its point observations.
pub fn read_graph<R: Read>(reader: R) -> Result<FrameGraph, GraphIoError> {
    let mut dec = Decoder { inner: reader };
    let magic: [u8; 4] = dec.array()?;
    if &magic != MAGIC {
        return Err(invalid(format!("bad magic {:?}", magic)));
    }
    let version = dec.u32()?;
    if version != VERSION {
        return Err(GraphIoError::VersionMismatch {
            expected: VERSION,
            found: version,
        });
    }

    let camera_count = dec.count()?;
    let mut graph = FrameGraph::new(0);
    for camera in 0..camera_count {
        let segment_count = dec.count()?;
        let mut segments = Vec::with_capacity(segment_count.min(MAX_PREALLOC));
        for _ in 0..segment_count {
            let frame_count = dec.count()?;
            let mut frames = Vec::with_capacity(frame_count.min(MAX_PREALLOC));
            for _ in 0..frame_count {
                let frame = read_frame(&mut dec)?;
                if frame.camera != camera {
                    return Err(invalid(format!(
                        "frame t={} tagged camera {} stored under camera {}",
                        frame.timestamp, frame.camera, camera
                    )));
                }
                frames.push(frame);
            }
            segments.push(frames);
        }
        graph.segments.push(segments);
    }

    let point_count = dec.count()?;
    let mut points = Vec::with_capacity(point_count.min(MAX_PREALLOC));
    for _ in 0..point_count {
        let position = Pt3::new(dec.f64()?, dec.f64()?, dec.f64()?);
        let mut point = Point3DFeature::new(position);
        if dec.flag("source")? {
            let source = dec.u64()?;
            let source = usize::try_from(source)
                .map_err(|_| invalid(format!("point source {} exceeds usize", source)))?;
            point.source = Some(PointId(source));
        }
        points.push(point);
    }
    graph.points = points;

    for frame in graph.segments.iter().flatten().flatten() {
        for feature in &frame.features {
            if let Some(pid) = feature.feature3d {
                if pid.0 >= point_count {
                    return Err(invalid(format!(
                        "feature {} of frame (camera {}, t={}) references point {} of {}",
                        feature.index, frame.camera, frame.timestamp, pid.0, point_count
                    )));
                }
            }
        }
    }

    graph.rebuild_observations();
    Ok(graph)
}

pub fn write_graph_file(path: &Path, graph: &FrameGraph) -> Result<(), GraphIoError> {
    let file = File::create(path)?;
    write_graph(BufWriter::new(file), graph)
}

pub fn read_graph_file(path: &Path) -> Result<FrameGraph, GraphIoError> {
    let file = File::open(path)?;
    read_graph(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use infracal_core::synthetic::infrastructure::{reference_map, trajectory, Scene, SyntheticRig};

    fn sample_graph() -> FrameGraph {
        let scene = Scene::corridor(120, 20.0, 9);
        let rig = SyntheticRig::three_cameras();
        let mut graph = reference_map(&scene, &rig, &trajectory(2, 0.0, 1.0));
        graph.points[3].source = Some(PointId(77));

        let mut unposed = Frame::new(1, 5_000, Vec::new());
        unposed.features.push(Point2DFeature::new(
            4,
            Keypoint {
                x: 10.5,
                y: 20.25,
                size: 3.0,
                angle: 45.0,
                response: 0.5,
                octave: 2,
            },
            Descriptor::Binary(vec![0xAB, 0x01]),
        ));
        graph.segments[1].push(vec![unposed]);
        graph
    }

    #[test]
    fn roundtrip_is_lossless() {
        let graph = sample_graph();
        let mut buf = Vec::new();
        write_graph(&mut buf, &graph).unwrap();
        let back = read_graph(buf.as_slice()).unwrap();
        assert_eq!(back, graph);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = Vec::new();
        write_graph(&mut buf, &sample_graph()).unwrap();
        buf[0] = b'X';
        assert!(matches!(
            read_graph(buf.as_slice()),
            Err(GraphIoError::InvalidFormat(_))
        ));
    }

    #[test]
    fn rejects_other_version() {
        let mut buf = Vec::new();
        write_graph(&mut buf, &sample_graph()).unwrap();
        buf[4..8].copy_from_slice(&7u32.to_le_bytes());
        match read_graph(buf.as_slice()) {
            Err(GraphIoError::VersionMismatch { expected, found }) => {
                assert_eq!(expected, VERSION);
                assert_eq!(found, 7);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_out_of_range_association() {
        let mut graph = sample_graph();
        graph.points.truncate(2);
        let mut buf = Vec::new();
        write_graph(&mut buf, &graph).unwrap();
        let err = read_graph(buf.as_slice()).unwrap_err();
        assert!(err.to_string().contains("references point"), "{}", err);
    }

    #[test]
    fn truncated_input_is_io_error() {
        let mut buf = Vec::new();
        write_graph(&mut buf, &sample_graph()).unwrap();
        buf.truncate(buf.len() / 2);
        assert!(matches!(read_graph(buf.as_slice()), Err(GraphIoError::Io(_))));
    }
}
