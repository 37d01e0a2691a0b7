use infracal_core::synthetic::infrastructure::{trajectory, visible, Scene, SyntheticRig};
use infracal_core::{Iso3, Pt3, Vec2};
use infracal_linear::{dlt_ransac, normalized_residual, PnpError, PnpRansacOptions};

fn correspondences() -> (Iso3, Vec<Pt3>, Vec<Vec2>) {
    let scene = Scene::corridor(400, 50.0, 11);
    let rig = SyntheticRig::three_cameras();
    let odo = trajectory(3, 2.0, 1.0)[2];
    let pose = rig.cam_se3_world(1, &odo);
    let camera = &rig.cameras[1];

    let mut world = Vec::new();
    let mut image = Vec::new();
    for (pid, uv) in visible(camera, &pose, &scene.points) {
        let ray = camera.lift_projective(&uv).unwrap();
        world.push(scene.points[pid]);
        image.push(Vec2::new(ray.x, ray.y));
    }
    (pose, world, image)
}

#[test]
fn ransac_rejects_gross_outliers() {
    let (gt, world, mut image) = correspondences();
    assert!(world.len() > 100, "only {} correspondences", world.len());

    let outliers: Vec<usize> = (0..world.len()).step_by(5).collect();
    for &i in &outliers {
        image[i] += Vec2::new(0.3, -0.2);
    }

    let (pose, inliers) = dlt_ransac(&world, &image, &PnpRansacOptions::default()).unwrap();
    assert!(pose.rotation.angle_to(&gt.rotation) < 1e-6);
    assert!((pose.translation.vector - gt.translation.vector).norm() < 1e-5);

    assert_eq!(inliers.len(), world.len() - outliers.len());
    assert!(inliers.iter().all(|i| !outliers.contains(i)));
    for &i in &inliers {
        assert!(normalized_residual(&pose, &world[i], &image[i]) < 1e-6);
    }
}

#[test]
fn ransac_fails_without_consensus() {
    let (_, world, image) = correspondences();
    let shuffled: Vec<Vec2> = image.iter().rev().copied().collect();
    let opts = PnpRansacOptions {
        threshold: 1e-6,
        ..PnpRansacOptions::default()
    };
    assert!(matches!(
        dlt_ransac(&world[..40], &shuffled[..40], &opts),
        Err(PnpError::RansacFailed)
    ));
    assert!(matches!(
        dlt_ransac(&world[..3], &image[..3], &opts),
        Err(PnpError::NotEnoughPoints(3))
    ));
}
