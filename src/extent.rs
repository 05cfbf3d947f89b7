use tracing::debug;

use crate::error::{EnhanceError, Result};
use crate::model::{BoundingBox, Bounds, CrsId};
use crate::source::CoordinateTransform;

/// 地図プレビューで見える最小の幅・高さ（度）
pub const MIN_EXTENT: f64 = 0.001;

// 丸め誤差で最小幅を下回らないための余裕
const ROUNDING_SLACK: f64 = 1e-9;

/// `BoundsSampling::Edges` の1辺あたりの分割数の上限
pub const MAX_EDGE_SEGMENTS: usize = 1024;

/// 範囲を再投影するときに変換する点の取り方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundsSampling {
    /// 南西と北東の2点のみ
    #[default]
    Corners,
    /// 各辺を等分した点。非等角な投影でも外接範囲を取りこぼしにくい
    Edges(usize),
}

impl BoundsSampling {
    fn points(&self, bounds: &Bounds) -> Vec<(f64, f64)> {
        match *self {
            BoundsSampling::Corners => vec![
                (bounds.min_x, bounds.min_y),
                (bounds.max_x, bounds.max_y),
            ],
            BoundsSampling::Edges(segments) => {
                let segments = segments.clamp(1, MAX_EDGE_SEGMENTS);
                let mut points = Vec::with_capacity(4 * (segments + 1));
                for i in 0..=segments {
                    let t = i as f64 / segments as f64;
                    let x = bounds.min_x + t * (bounds.max_x - bounds.min_x);
                    let y = bounds.min_y + t * (bounds.max_y - bounds.min_y);
                    points.push((x, bounds.min_y));
                    points.push((x, bounds.max_y));
                    points.push((bounds.min_x, y));
                    points.push((bounds.max_x, y));
                }
                points
            }
        }
    }
}

/// ネイティブ座標系の範囲を地理座標に変換し、幅のない範囲を補正する
pub fn normalize_extent(
    bounds: &Bounds,
    crs: &CrsId,
    transform: &dyn CoordinateTransform,
    sampling: BoundsSampling,
) -> Result<BoundingBox> {
    let geographic = if crs.is_geographic_wgs84() {
        ensure_finite(bounds, crs)?
    } else {
        reproject(bounds, crs, transform, sampling)?
    };
    Ok(repair_degenerate(&geographic))
}

pub fn reproject(
    bounds: &Bounds,
    crs: &CrsId,
    transform: &dyn CoordinateTransform,
    sampling: BoundsSampling,
) -> Result<Bounds> {
    let points = sampling.points(&ensure_finite(bounds, crs)?);
    let transformed = transform.to_geographic(crs, &points)?;

    if transformed.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
        return Err(EnhanceError::Transform(format!(
            "non-finite coordinates reprojecting bounds from {}",
            crs.compact()
        )));
    }

    let geographic = Bounds::enclosing(&transformed).ok_or_else(|| {
        EnhanceError::Transform("coordinate transform returned no points".to_string())
    })?;
    debug!(
        "Reprojected bounds from {}: {:?} -> {:?}",
        crs.compact(),
        bounds,
        geographic
    );
    Ok(geographic)
}

fn ensure_finite(bounds: &Bounds, crs: &CrsId) -> Result<Bounds> {
    let Bounds {
        min_x,
        min_y,
        max_x,
        max_y,
    } = *bounds;
    if [min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
        Ok(*bounds)
    } else {
        Err(EnhanceError::Transform(format!(
            "non-finite bounds {:?} in {}",
            bounds,
            crs.compact()
        )))
    }
}

/// 幅・高さが `MIN_EXTENT` 未満なら両側に半分ずつ広げる
pub fn repair_degenerate(bounds: &Bounds) -> BoundingBox {
    let (west, east) = widen_axis(bounds.min_x, bounds.max_x, 180.0);
    let (south, north) = widen_axis(bounds.min_y, bounds.max_y, 90.0);
    BoundingBox {
        west,
        east,
        north,
        south,
    }
}

fn widen_axis(a: f64, b: f64, limit: f64) -> (f64, f64) {
    let mut lo = a.min(b).clamp(-limit, limit);
    let mut hi = a.max(b).clamp(-limit, limit);

    if hi - lo < MIN_EXTENT {
        lo -= MIN_EXTENT / 2.0;
        hi += MIN_EXTENT / 2.0;

        // 範囲外にはみ出した分は縮めずにずらす
        if hi > limit {
            lo -= hi - limit;
            hi = limit;
        } else if lo < -limit {
            hi += -limit - lo;
            lo = -limit;
        }

        if hi - lo < MIN_EXTENT {
            if hi >= limit {
                lo = hi - MIN_EXTENT - ROUNDING_SLACK;
            } else {
                hi = lo + MIN_EXTENT + ROUNDING_SLACK;
            }
        }
    }

    (lo, hi)
}
