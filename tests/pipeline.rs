mod common;

use std::path::Path;

use itertools::Itertools;
use tilestitch::{
    manifest::Manifest,
    pipeline::{Pipeline, PipelineError},
    source::{DataKind, SourceEnumerationError, TileIndex},
};

use common::{tile_file_name, tile_manifest};

const HDF5_SIGNATURE: &[u8] = b"\x89HDF\r\n\x1a\n";

/// Write `nx` × `ny` tile files with reference documents alongside.
fn write_tiles(dir: &Path, nx: u64, ny: u64, block: u64) -> std::io::Result<()> {
    for (x, y) in (0..nx).cartesian_product(0..ny) {
        let tile = TileIndex::new(x, y);
        let file_name = tile_file_name("rico", tile);
        std::fs::write(dir.join(&file_name), HDF5_SIGNATURE)?;
        let reference = tile_manifest("rico", tile, block)
            .to_reference_json()
            .map_err(std::io::Error::other)?;
        std::fs::write(dir.join(format!("{file_name}.json")), reference)?;
    }
    Ok(())
}

#[test]
fn pipeline_volumetric() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::TempDir::new()?;
    let source_dir = tmp.path().join("rico");
    std::fs::create_dir(&source_dir)?;
    write_tiles(&source_dir, 2, 3, 32)?;

    let output = Pipeline::new()
        .with_retries(0)
        .run(&source_dir, "rico", DataKind::Volumetric)?;
    let destination = tmp.path().join("rico__zarr");
    assert_eq!(output.manifest_path, destination.join("rico.json"));
    for subset in ["xt_yt", "xm_yt", "xt_ym"] {
        assert!(destination
            .join(format!("src_refs__3d/rico/3d/{subset}.json"))
            .is_file());
    }

    let manifest = Manifest::from_reference_json(&std::fs::read(&output.manifest_path)?)?;
    assert_eq!(&manifest, output.dataset.manifest());
    assert_eq!(output.dataset.dimension_len("xt"), Some(64));
    assert_eq!(output.dataset.dimension_len("yt"), Some(96));
    assert_eq!(output.dataset.dimension_len("xm"), Some(64));
    assert_eq!(output.dataset.dimension_len("ym"), Some(96));
    assert_eq!(manifest.array("v").unwrap().shape(), &[2, 4, 96, 64]);

    // cached subset manifests are reused even if the reference documents are gone
    for (x, y) in (0..2).cartesian_product(0..3) {
        let file_name = tile_file_name("rico", TileIndex::new(x, y));
        std::fs::remove_file(source_dir.join(format!("{file_name}.json")))?;
    }
    let rerun = Pipeline::new().run(&source_dir, "rico", DataKind::Volumetric)?;
    assert_eq!(rerun.dataset, output.dataset);

    assert!(Pipeline::new()
        .with_retries(0)
        .with_refresh(true)
        .run(&source_dir, "rico", DataKind::Volumetric)
        .is_err());
    Ok(())
}

#[test]
fn pipeline_cropped() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::TempDir::new()?;
    let source_dir = tmp.path().join("rico");
    std::fs::create_dir(&source_dir)?;
    write_tiles(&source_dir, 3, 3, 16)?;

    let output = Pipeline::new().run(
        &source_dir,
        "rico",
        DataKind::VolumetricCropped { nx: 1, ny: 2 },
    )?;
    assert_eq!(output.dataset.dimension_len("xt"), Some(16));
    assert_eq!(output.dataset.dimension_len("yt"), Some(32));
    assert!(tmp
        .path()
        .join("rico__zarr/src_refs__3d__first_1x2/rico/3d__first_1x2/xt_yt.json")
        .is_file());

    let result = Pipeline::new().run(
        &source_dir,
        "rico",
        DataKind::VolumetricCropped { nx: 4, ny: 2 },
    );
    assert!(matches!(
        result,
        Err(PipelineError::SourceEnumeration(
            SourceEnumerationError::Order(_)
        ))
    ));
    Ok(())
}
