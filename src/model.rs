use std::path::Path;

/// 正規化後の地理座標系（WGS84）のEPSGコード
pub const GEOGRAPHIC_EPSG: u32 = 4326;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Vector,
    Raster,
}

impl SourceKind {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "shp" | "geojson" | "e00" => Some(SourceKind::Vector),
            "tif" => Some(SourceKind::Raster),
            _ => None,
        }
    }
}

/// データファイルの拡張子（小文字）。拡張子がなければ空文字列
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Organization {
    Vector { geometry: String, features: u64 },
    Raster { rows: usize, cols: usize },
}

/// ネイティブ座標系での範囲 (min_x, min_y, max_x, max_y)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// 点群を囲む範囲
    pub fn enclosing(points: &[(f64, f64)]) -> Option<Self> {
        let (&(x, y), rest) = points.split_first()?;
        Some(rest.iter().fold(Self::new(x, y, x, y), |b, &(x, y)| Self {
            min_x: b.min_x.min(x),
            min_y: b.min_y.min(y),
            max_x: b.max_x.max(x),
            max_y: b.max_y.max(y),
        }))
    }
}

/// 座標参照系の識別情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrsId {
    pub epsg: Option<u32>,
    pub proj4: String,
    pub wkt: String,
}

impl CrsId {
    pub fn from_epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            proj4: String::new(),
            wkt: String::new(),
        }
    }

    /// `EPSG:xxxx`、EPSGコードがなければPROJ文字列
    pub fn compact(&self) -> String {
        match self.epsg {
            Some(code) => format!("EPSG:{}", code),
            None => self.proj4.trim().to_string(),
        }
    }

    pub fn is_geographic_wgs84(&self) -> bool {
        self.epsg == Some(GEOGRAPHIC_EPSG)
    }
}

/// データファイルから取り出した事実。1回の処理で一度だけ作られる
#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceFacts {
    pub extension: String,
    pub organization: Organization,
    pub crs: Option<CrsId>,
    pub bounds: Option<Bounds>,
}

/// 正規化済みの地理座標範囲（10進度）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub east: f64,
    pub north: f64,
    pub south: f64,
}
