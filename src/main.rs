use complot as plt;
use rayfire_qoi::*;
use skyangle::SkyAngle::*;
use std::{error::Error, sync::Arc, time::Instant};
use triangle_rs::Builder;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let radius = 1f64;
    let perimeter = 2. * std::f64::consts::PI * radius;
    let delta = 5e-2;
    let n = (perimeter / delta).ceil() as usize;
    let nodes: Vec<_> = (0..n)
        .flat_map(|i| {
            let o = 2. * std::f64::consts::PI * i as f64 / n as f64;
            vec![radius * o.cos(), radius * o.sin()]
        })
        .collect();
    let tri = {
        let mut builder = Builder::new();
        builder.add_polygon(&nodes).set_switches("QDqa0.002");
        builder.build()
    };
    let mesh = Arc::new(UnstructuredMesh::try_from(&tri)?);
    println!(
        "Pupil mesh: {} elements, {} vertices, area {:.6}/{:.6}",
        mesh.n_elements(),
        mesh.n_vertices(),
        mesh.area(),
        std::f64::consts::PI * radius * radius
    );

    // Zernike mode sampled at the mesh vertices
    let (j, n, m) = zernike::jnm(3);
    let (jz, nz, mz) = (j[3], n[3], m[3]);
    let snapshot = SystemSnapshot::interpolate(mesh.clone(), |v| {
        let r = v[0].hypot(v[1]);
        let o = v[1].atan2(v[0]);
        zernike::zernike(jz, nz, mz, r, o)
    });
    println!("Zernike mode #{}", jz);

    let origin = [0.1, 0.05];
    let u: Arc<dyn FieldFunction> = Arc::new(SolutionPolynomial::new(vec![0., 1.]));
    let mut rays = CompositeQoi::new("fan");
    for k in 0..12 {
        let spec = new_ray()
            .point_of_origin(origin)
            .direction_angle(Degree(30. * k as f64).to_radians())
            .build()?;
        rays.push(IntegratedLineFunctional::new(
            4,
            u.clone(),
            spec,
            &format!("ray#{:02}", k),
        ));
    }
    rays.push(InteriorIntegral::new(2, u.clone(), "pupil"));
    rays.init(&snapshot)?;

    let now = Instant::now();
    let values = QoiValues::assemble(&mut rays, &snapshot)?;
    println!("{}", values);
    let total = assemble_qoi_par(&rays, &snapshot)?;
    log::info!(
        "sequential/parallel totals: {:.9e}/{:.9e} in {}ms",
        values.total(),
        total,
        now.elapsed().as_millis()
    );

    let mut chief = RayfireConfig {
        name: "chief".to_string(),
        origin,
        terminus: None,
        angle_deg: Some(45.),
        p_level: 4,
    }
    .build(u)?;
    chief.init(&snapshot)?;
    if let Some(rayfire) = chief.rayfire() {
        print!("{}", rayfire);
    }
    let dq = assemble_qoi_derivative(&mut chief, &snapshot)?;
    log::info!(
        "chief ray: {:.9e}, derivative norm: {:.6e}",
        assemble_qoi(&mut chief, &snapshot)?,
        dq.norm()
    );

    let fig = plt::png_canvas("zernike.png");
    let mut ax = plt::chart([-radius, radius, -radius, radius], &fig);
    plt::trimap(&tri.x(), &tri.y(), &snapshot.solution().as_slice().to_vec(), &mut ax);

    let fig = plt::png_canvas("chief_ray_derivative.png");
    let mut ax = plt::chart([-radius, radius, -radius, radius], &fig);
    plt::trimap(&tri.x(), &tri.y(), &dq.as_slice().to_vec(), &mut ax);

    let fig = plt::canvas("pupil.svg");
    let mut ax = plt::chart([-radius, radius, -radius, radius], &fig);
    plt::trimesh(&tri.x(), &tri.y(), [0; 3], &mut ax);

    Ok(())
}
