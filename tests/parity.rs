//! The parity harness over the golden catalog, on the current target.
use std::fs;
use std::path::PathBuf;

use rasterflow::kernel;
use rasterflow::parity::{
    compare_directories, current_target, golden_catalog, run_catalog,
};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join("rasterflow-parity")
        .join(format!("{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

#[test]
fn catalog_runs_and_self_compares_clean() {
    let dir = scratch_dir("self");
    let artifacts = run_catalog(&dir).unwrap();

    // kernels x goldens x {u8, f32}
    let expected = kernel::registered_kernels().len() * golden_catalog().len() * 2;
    assert_eq!(artifacts.len(), expected);

    // Naming convention: {kernel}_{input}_{target}_{bitdepth}.png + sidecar.
    for artifact in &artifacts {
        let file = artifact.path.file_name().unwrap().to_str().unwrap();
        assert!(file.contains(artifact.kernel));
        assert!(file.contains(artifact.input_id));
        assert!(file.contains(artifact.target));
        assert!(file.ends_with(&format!("{}.png", artifact.bitdepth)));
        let sidecar = artifact.path.with_extension("json");
        let text = fs::read_to_string(sidecar).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["kernel"], artifact.kernel);
        assert_eq!(doc["input_id"], artifact.input_id);
        assert_eq!(doc["target"], current_target());
        assert!(doc["param_hash"].as_str().unwrap().len() == 16);
    }

    // A directory always agrees with itself bit for bit; the tolerance is
    // zero, not configurable.
    let mismatches =
        compare_directories(&dir, &dir, current_target(), current_target()).unwrap();
    assert!(mismatches.is_empty(), "mismatches: {:?}", mismatches);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn reruns_are_bit_identical() {
    // Two independent runs of the whole catalog in different directories
    // must agree: kernels have no hidden state, clocks, or RNG.
    let first = scratch_dir("first");
    let second = scratch_dir("second");
    run_catalog(&first).unwrap();
    run_catalog(&second).unwrap();

    let mismatches =
        compare_directories(&first, &second, current_target(), current_target()).unwrap();
    assert!(mismatches.is_empty(), "mismatches: {:?}", mismatches);

    let _ = fs::remove_dir_all(&first);
    let _ = fs::remove_dir_all(&second);
}

#[test]
fn tampering_is_detected_and_visualized() {
    let left = scratch_dir("left");
    let right = scratch_dir("right");
    run_catalog(&left).unwrap();
    run_catalog(&right).unwrap();

    // Corrupt one right-hand artifact by re-encoding a tweaked decode.
    let victim = right.join(format!(
        "invert_gradient_{}_u8.png",
        current_target()
    ));
    let bytes = fs::read(&victim).unwrap();
    let (mut pixels, _) = rasterflow::codec::decode(&bytes, Some(rasterflow::Codec::Png)).unwrap();
    {
        let data = pixels.as_u8_mut().unwrap();
        data[0] ^= 0xff;
    }
    let tampered =
        rasterflow::codec::encode(&pixels, rasterflow::Codec::Png, None, rasterflow::Color::BLACK)
            .unwrap();
    fs::write(&victim, tampered).unwrap();

    let mismatches =
        compare_directories(&left, &right, current_target(), current_target()).unwrap();
    assert_eq!(mismatches.len(), 1);
    assert!(mismatches[0].stem.starts_with("invert_gradient"));
    assert!(mismatches[0].differing_bytes > 0);
    // The failure wrote a per-pixel diff visualization.
    let diff = mismatches[0].diff_path.as_ref().unwrap();
    assert!(diff.exists());

    let _ = fs::remove_dir_all(&left);
    let _ = fs::remove_dir_all(&right);
}
