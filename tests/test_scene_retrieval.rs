use aotinv::core::scene::statistics;
use aotinv::core::{BlockOutcome, RejectReason};
use aotinv::io::{ChannelSpectra, ReferenceSpectra};
use aotinv::lut::{AtmosphericTerms, LutAxes};
use aotinv::{
    AerosolLut, AotError, CancellationToken, Geometry, GriddedLut, PixelRecord, RetrievalConfig, RetrievalSetup,
    SceneInputs, SceneRetrieval, SurfaceEstimate,
};
use ndarray::Array2;
use std::f64::consts::PI;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

const TRUE_AOT: f64 = 0.3;
const TRUE_PARAMS: [f64; 2] = [0.6, 0.3];
const PATH_COEFFS: [f64; 4] = [0.03, 0.025, 0.015, 0.005];
const SZA: f32 = 30.0;

/// Piecewise-constant soil and vegetation spectra, 400-1800 nm
fn spectra_table() -> String {
    let mut text = String::from("# wavelength soil vegetation\n");
    for w in (400..=1800).step_by(10) {
        let (soil, veg) = match w {
            w if w < 540 => (0.1, 0.05),
            w if w < 740 => (0.15, 0.08),
            w if w < 1200 => (0.2, 0.4),
            _ => (0.25, 0.3),
        };
        text.push_str(&format!("{} {} {}\n", w, soil, veg));
    }
    text
}

fn write_config(dir: &Path) -> std::path::PathBuf {
    let spectra_path = dir.join("surface_spectra.txt");
    std::fs::write(&spectra_path, spectra_table()).unwrap();

    let config = serde_json::json!({
        "instrument": "vgt",
        "band_centers": [450.0, 645.0, 835.0, 1665.0],
        "band_widths": [40.0, 70.0, 110.0, 170.0],
        "fit_weights": [1.0, 1.0, 0.5, 0.1],
        "dual_view": false,
        "angles": "zenith",
        "units": "reflectance",
        "ndvi": "band",
        "surface_model": "spectral",
        "scale": 9,
        "surface_spectra": spectra_path,
        "diagnostics": true
    });

    let config_path = dir.join("retrieval.json");
    let mut file = std::fs::File::create(&config_path).unwrap();
    file.write_all(config.to_string().as_bytes()).unwrap();
    config_path
}

fn gridded_lut(n_channels: usize) -> GriddedLut {
    let axes = LutAxes {
        pressure: vec![500.0, 1013.25],
        vza: vec![0.0, 30.0, 60.0],
        sza: vec![0.0, 30.0, 60.0, 75.0],
        razi: vec![0.0, 90.0, 180.0],
        aot: vec![0.0, 0.5, 1.0, 2.0],
    };
    let wavelengths = vec![450.0, 645.0, 835.0, 1665.0][..n_channels].to_vec();
    GriddedLut::from_fn(axes, wavelengths, |c, node| AtmosphericTerms {
        path_reflectance: (PATH_COEFFS[c] * node.aot) as f32,
        transmission: 0.8,
        spherical_albedo: 0.1,
        direct_fraction: 0.7,
    })
    .unwrap()
}

fn channel_spectra() -> ChannelSpectra {
    let config = RetrievalConfig::for_instrument(aotinv::Instrument::Vgt);
    let bands = aotinv::SpectralBands::new(config.band_centers, config.band_widths).unwrap();
    ReferenceSpectra::parse(&spectra_table(), 2).unwrap().resample(&bands).unwrap()
}

/// TOA reflectance that inverts exactly to the mixture surface at `TRUE_AOT`
fn forward_toa(lut: &GriddedLut, geometry: &Geometry) -> Vec<f32> {
    let spectra = channel_spectra();
    let cos_sza = geometry.cos_sza();
    (0..4)
        .map(|c| {
            let rho = TRUE_PARAMS[0] * spectra.vegetation[c] + TRUE_PARAMS[1] * spectra.soil[c];
            let t = lut.terms(c, 1000.0, geometry, TRUE_AOT);
            let rho_path = t.path_reflectance as f64 * PI / cos_sza;
            let transmission = t.transmission as f64 / cos_sza;
            let x = rho / (1.0 - t.spherical_albedo as f64 * rho);
            (rho_path + transmission * x) as f32
        })
        .collect()
}

/// 9x18 scene: the left block is vegetated, the right one bare
fn scene(lut: &GriddedLut) -> SceneInputs {
    let shape = (9, 18);
    let field = |v: f32| Array2::from_elem(shape, v);
    let geometry = Geometry::from_zenith_angles(SZA as f64, 0.0, 10.0, 90.0);
    let toa = forward_toa(lut, &geometry);
    let ndvi = Array2::from_shape_fn(shape, |(_, c)| if c < 9 { 0.5 } else { 0.0 });

    SceneInputs::new(
        vec![field(SZA), field(0.0), field(10.0), field(90.0)],
        toa.iter().map(|&v| field(v)).collect(),
        field(1000.0),
        field(300.0),
        Some(ndvi),
        Array2::from_elem(shape, true),
    )
    .unwrap()
}

fn setup(dir: &Path) -> Arc<RetrievalSetup> {
    let config = RetrievalConfig::from_json_file(write_config(dir)).unwrap();
    Arc::new(config.validate().unwrap())
}

#[test]
fn test_scene_round_trip() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();

    let lut = gridded_lut(4);
    let inputs = scene(&lut);
    let lut: Arc<dyn AerosolLut> = Arc::new(lut);
    let retrieval = SceneRetrieval::new(setup(dir.path()), lut).unwrap();

    let product = retrieval.run(&inputs).unwrap();
    println!("AOT: {:?}", product.aot);
    println!("Uncertainty: {:?}", product.aot_uncertainty);

    assert_eq!(product.aot.dim(), (1, 2));
    // f32 inputs and output limit the recovery to a few ulps of the signal
    assert!((product.aot[[0, 0]] as f64 - TRUE_AOT).abs() < 1e-5, "retrieved {}", product.aot[[0, 0]]);
    assert!((product.aot_uncertainty[[0, 0]] as f64 - 0.03).abs() < 1e-3);

    // Bare block is rejected and written as no-data everywhere
    assert_eq!(product.aot[[0, 1]], -1.0);
    assert_eq!(product.aot_uncertainty[[0, 1]], -1.0);

    let residual = product.fit_residual.as_ref().expect("diagnostics enabled");
    let curvature = product.curvature.as_ref().expect("diagnostics enabled");
    assert!(residual[[0, 0]] >= 0.0);
    assert!(curvature[[0, 0]] > 0.0);
    assert_eq!(residual[[0, 1]], -1.0);
    assert_eq!(curvature[[0, 1]], -1.0);
}

#[test]
fn test_block_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let lut = gridded_lut(4);
    let inputs = scene(&lut);
    let lut: Arc<dyn AerosolLut> = Arc::new(lut);
    let retrieval = SceneRetrieval::new(setup(dir.path()), lut).unwrap();

    let outcomes = vec![
        retrieval.retrieve_block(&inputs.block(0, 0, 9)).unwrap(),
        retrieval.retrieve_block(&inputs.block(0, 9, 9)).unwrap(),
    ];
    assert!(outcomes[0].retrieved().is_some());
    assert_eq!(outcomes[1], BlockOutcome::Rejected(RejectReason::NotVegetated));

    let stats = statistics(&outcomes);
    assert_eq!((stats.retrieved, stats.failed, stats.rejected), (1, 0, 1));
}

#[test]
fn test_cancelled_run_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let lut = gridded_lut(4);
    let inputs = scene(&lut);
    let lut: Arc<dyn AerosolLut> = Arc::new(lut);

    let token = CancellationToken::new();
    let retrieval = SceneRetrieval::new(setup(dir.path()), lut)
        .unwrap()
        .with_cancellation(token.clone());
    token.cancel();

    assert!(retrieval.cancellation_token().is_cancelled());
    assert!(matches!(retrieval.run(&inputs), Err(AotError::Cancelled)));
}

/// Over-corrects every channel, whatever the AOT
struct DarkLut;

impl AerosolLut for DarkLut {
    fn invert(&self, record: &PixelRecord, _aot: f64, out: &mut SurfaceEstimate) {
        out.reset(record.n_channels());
    }

    fn is_inside_domain(&self, _record: &PixelRecord) -> bool {
        true
    }
}

#[test]
fn test_failed_blocks_written_as_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = scene(&gridded_lut(4));
    let retrieval = SceneRetrieval::new(setup(dir.path()), Arc::new(DarkLut)).unwrap();

    match retrieval.retrieve_block(&inputs.block(0, 0, 9)).unwrap() {
        BlockOutcome::Retrieved(result) => {
            assert!(result.failed);
            assert!(result.aot <= 0.01);
        }
        other => panic!("unexpected {:?}", other),
    }

    let product = retrieval.run(&inputs).unwrap();
    assert!(product.aot.iter().all(|&v| v == -1.0));
    assert!(product.aot_uncertainty.iter().all(|&v| v == -1.0));
    assert!(product.fit_residual.unwrap().iter().all(|&v| v == -1.0));
}

#[test]
fn test_setup_mismatches_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let setup = setup(dir.path());

    let two_channel: Arc<dyn AerosolLut> = Arc::new(gridded_lut(2));
    assert!(matches!(
        SceneRetrieval::new(setup.clone(), two_channel),
        Err(AotError::Config(_))
    ));

    let lut = gridded_lut(4);
    let mut inputs = scene(&lut);
    inputs.channels.pop();
    let retrieval = SceneRetrieval::new(setup, Arc::new(lut)).unwrap();
    assert!(matches!(retrieval.run(&inputs), Err(AotError::InconsistentInputs(_))));
}
