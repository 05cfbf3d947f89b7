use std::path::Path;

use crate::error::Result;
use crate::model::{CrsId, DataSourceFacts, SourceKind};

/// データファイルから事実を取り出す。
///
/// 開けなかった場合は `EnhanceError::DataSourceOpen`、開けたのに読み取りに
/// 失敗した場合は `EnhanceError::DataSourceFault` を返すこと。
/// ファイルハンドルは呼び出しの中で閉じる。
pub trait FactSource {
    fn read_facts(&self, path: &Path, kind: SourceKind) -> Result<DataSourceFacts>;
}

/// 地理座標系（EPSG:4326、経度が先）への座標変換
pub trait CoordinateTransform {
    fn to_geographic(&self, crs: &CrsId, points: &[(f64, f64)]) -> Result<Vec<(f64, f64)>>;
}
