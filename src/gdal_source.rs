use gdal::errors::GdalError;
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::vector::{geometry_type_to_name, LayerAccess};
use gdal::Dataset;
use std::path::Path;
use tracing::debug;

use crate::error::{EnhanceError, Result};
use crate::model::{
    extension_of, Bounds, CrsId, DataSourceFacts, Organization, SourceKind, GEOGRAPHIC_EPSG,
};
use crate::source::{CoordinateTransform, FactSource};

/// GDAL/OGR でデータファイルを読み、PROJ で座標変換する
#[derive(Debug, Default, Clone, Copy)]
pub struct GdalSource {}

impl GdalSource {
    pub fn new() -> Self {
        Self {}
    }
}

impl FactSource for GdalSource {
    fn read_facts(&self, path: &Path, kind: SourceKind) -> Result<DataSourceFacts> {
        // データセットはこの関数を抜けるときに閉じられる
        let dataset = Dataset::open(path).map_err(|e| EnhanceError::DataSourceOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!("Opened {:?} with driver {}", path, dataset.driver().short_name());

        let (organization, crs, bounds) = match kind {
            SourceKind::Vector => read_vector(&dataset, path)?,
            SourceKind::Raster => read_raster(&dataset, path)?,
        };

        Ok(DataSourceFacts {
            extension: extension_of(path),
            organization,
            crs,
            bounds,
        })
    }
}

type RawFacts = (Organization, Option<CrsId>, Option<Bounds>);

fn read_vector(dataset: &Dataset, path: &Path) -> Result<RawFacts> {
    let layer = dataset.layer(0).map_err(|e| fault(path, e))?;

    // ジオメトリ型（最初のジオメトリフィールド）
    let geometry = layer
        .defn()
        .geom_fields()
        .next()
        .map(|field| fgdc_geometry_name(&geometry_type_to_name(field.field_type())))
        .unwrap_or_else(|| "Unknown".to_string());

    let features = layer.feature_count();

    let bounds = match layer.get_extent() {
        Ok(envelope) => Some(Bounds::new(
            envelope.MinX,
            envelope.MinY,
            envelope.MaxX,
            envelope.MaxY,
        )),
        Err(e) => {
            debug!("No extent for {:?}: {}", path, e);
            None
        }
    };

    let crs = match layer.spatial_ref() {
        Some(srs) => Some(crs_id(srs).map_err(|e| fault(path, e))?),
        None => None,
    };

    Ok((Organization::Vector { geometry, features }, crs, bounds))
}

fn read_raster(dataset: &Dataset, path: &Path) -> Result<RawFacts> {
    let (cols, rows) = dataset.raster_size();

    // ジオトランスフォームの四隅から範囲を求める（回転がある場合も含む）
    let bounds = dataset.geo_transform().ok().and_then(|gt| {
        let corner = |col: f64, row: f64| {
            (
                gt[0] + col * gt[1] + row * gt[2],
                gt[3] + col * gt[4] + row * gt[5],
            )
        };
        let (w, h) = (cols as f64, rows as f64);
        Bounds::enclosing(&[corner(0.0, 0.0), corner(w, 0.0), corner(0.0, h), corner(w, h)])
    });

    // 投影法が設定されていないだけなら座標系なしとして扱う
    let crs = match dataset.spatial_ref() {
        Ok(srs) => Some(crs_id(srs).map_err(|e| fault(path, e))?),
        Err(e) => {
            debug!("No spatial reference for {:?}: {}", path, e);
            None
        }
    };

    Ok((Organization::Raster { rows, cols }, crs, bounds))
}

fn crs_id(mut srs: SpatialRef) -> std::result::Result<CrsId, GdalError> {
    // .prj のようにAUTHORITYを持たない定義からEPSGコードを推定する
    if let Err(e) = srs.auto_identify_epsg() {
        debug!("Could not identify an EPSG code: {}", e);
    }

    let epsg = match srs.auth_name() {
        Some(name) if name.eq_ignore_ascii_case("EPSG") => {
            srs.auth_code().ok().and_then(|code| u32::try_from(code).ok())
        }
        _ => None,
    };

    Ok(CrsId {
        epsg,
        proj4: srs.to_proj4().unwrap_or_default(),
        wkt: srs.to_wkt()?,
    })
}

/// OGRの型名をFGDCの sdtstype で使われてきた表記にする（`Multi Polygon` → `MultiPolygon`）
fn fgdc_geometry_name(ogr_name: &str) -> String {
    let (prefix, rest) = match ogr_name.strip_prefix("3D ") {
        Some(rest) => ("3D ", rest),
        None => ("", ogr_name),
    };
    // 混在ジオメトリは `Unknown (any)` になる
    if rest.starts_with("Unknown") {
        return format!("{}Unknown", prefix);
    }
    format!("{}{}", prefix, rest.replace(' ', ""))
}

fn fault(path: &Path, err: GdalError) -> EnhanceError {
    EnhanceError::DataSourceFault {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

impl CoordinateTransform for GdalSource {
    fn to_geographic(&self, crs: &CrsId, points: &[(f64, f64)]) -> Result<Vec<(f64, f64)>> {
        let transform_error = |e: GdalError| EnhanceError::Transform(e.to_string());

        let mut source = if !crs.wkt.is_empty() {
            SpatialRef::from_wkt(&crs.wkt)
        } else if let Some(code) = crs.epsg {
            SpatialRef::from_epsg(code)
        } else {
            SpatialRef::from_proj4(&crs.proj4)
        }
        .map_err(transform_error)?;
        let mut target = SpatialRef::from_epsg(GEOGRAPHIC_EPSG).map_err(transform_error)?;

        // 経度・緯度の順で扱う
        source.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
        target.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

        let transform = CoordTransform::new(&source, &target).map_err(transform_error)?;

        let mut xs: Vec<f64> = points.iter().map(|&(x, _)| x).collect();
        let mut ys: Vec<f64> = points.iter().map(|&(_, y)| y).collect();
        let mut zs = vec![0.0; points.len()];
        transform
            .transform_coords(&mut xs, &mut ys, &mut zs)
            .map_err(transform_error)?;

        Ok(xs.into_iter().zip(ys).collect())
    }
}
