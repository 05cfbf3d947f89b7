//! 座標参照系から FGDC の `<spref>` を組み立てる。
//!
//! よく使われる座標系は測地系・投影パラメータを固定の表から出力し、
//! それ以外は `<local>` にPROJ定義とWKTをそのまま書き出す。

use tracing::warn;

use crate::fragment::Section;
use crate::model::CrsId;
use crate::xml::Element;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpatialReferenceDescriptor {
    KnownEpsg(u32),
    Unknown { definition: String, wkt: String },
}

impl SpatialReferenceDescriptor {
    pub fn from_crs(crs: &CrsId) -> Self {
        match crs.epsg {
            Some(code) if horizontal_system(code).is_some() => Self::KnownEpsg(code),
            _ => Self::Unknown {
                definition: crs.compact(),
                wkt: crs.wkt.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geodetic {
    datum: &'static str,
    ellipsoid: &'static str,
    semi_major_axis: &'static str,
    flattening_ratio: &'static str,
}

const WGS84: Geodetic = Geodetic {
    datum: "D_WGS_1984",
    ellipsoid: "WGS_1984",
    semi_major_axis: "6378137.000000",
    flattening_ratio: "298.257224",
};

const NAD83_GEOGRAPHIC: Geodetic = Geodetic {
    datum: "North American Datum of 1983",
    ellipsoid: "GRS1980",
    semi_major_axis: "6378137.0",
    flattening_ratio: "298.257222",
};

const NAD83: Geodetic = Geodetic {
    datum: "North American Datum of 1983",
    ellipsoid: "Geodetic Reference System 80",
    semi_major_axis: "6378137.000000",
    flattening_ratio: "298.257222",
};

// ニューヨーク州平面直角座標系の既存メタデータに合わせた値
const NAD83_STATE_PLANE: Geodetic = Geodetic {
    datum: "North American Datum of 1983",
    ellipsoid: "Geodetic Reference System 80",
    semi_major_axis: "6378206",
    flattening_ratio: "294.9786982",
};

const NAD27: Geodetic = Geodetic {
    datum: "North American Datum of 1927",
    ellipsoid: "Clarke 1866",
    semi_major_axis: "6378206.400000",
    flattening_ratio: "294.978698",
};

#[derive(Debug, Clone, PartialEq)]
struct TransverseMercator {
    scale_factor: String,
    central_meridian: String,
    origin_latitude: String,
    false_easting: String,
    false_northing: String,
}

#[derive(Debug, Clone, PartialEq)]
enum GridSystem {
    Utm {
        zone: u32,
        projection: TransverseMercator,
    },
    StatePlane {
        zone: &'static str,
        projection: TransverseMercator,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlanarCoordinates {
    encoding: &'static str,
    resolution: &'static str,
    units: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
enum HorizontalSystem {
    Geographic {
        geodetic: Geodetic,
    },
    Planar {
        grid: GridSystem,
        coordinates: PlanarCoordinates,
        geodetic: Geodetic,
    },
    Local {
        description: String,
        georeference: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hemisphere {
    North,
    South,
}

/// UTMの系列ごとの測地系と座標分解能
#[derive(Debug, Clone, Copy)]
struct UtmFamily {
    geodetic: Geodetic,
    resolution: &'static str,
}

const NAD27_UTM: UtmFamily = UtmFamily {
    geodetic: NAD27,
    resolution: "0.000256",
};

const NAD83_UTM: UtmFamily = UtmFamily {
    geodetic: NAD83,
    resolution: "0.000512",
};

const WGS84_UTM: UtmFamily = UtmFamily {
    geodetic: WGS84,
    resolution: "0.000000",
};

fn horizontal_system(epsg: u32) -> Option<HorizontalSystem> {
    match epsg {
        4326 => Some(HorizontalSystem::Geographic { geodetic: WGS84 }),
        4269 => Some(HorizontalSystem::Geographic {
            geodetic: NAD83_GEOGRAPHIC,
        }),
        2261 => Some(new_york_central()),
        26701..=26722 => Some(utm(epsg - 26700, Hemisphere::North, NAD27_UTM)),
        26901..=26923 => Some(utm(epsg - 26900, Hemisphere::North, NAD83_UTM)),
        32601..=32660 => Some(utm(epsg - 32600, Hemisphere::North, WGS84_UTM)),
        32701..=32760 => Some(utm(epsg - 32700, Hemisphere::South, WGS84_UTM)),
        _ => None,
    }
}

fn utm(zone: u32, hemisphere: Hemisphere, family: UtmFamily) -> HorizontalSystem {
    let central_meridian = -183.0 + 6.0 * f64::from(zone);
    let false_northing = match hemisphere {
        Hemisphere::North => 0.0,
        Hemisphere::South => 10_000_000.0,
    };

    HorizontalSystem::Planar {
        grid: GridSystem::Utm {
            zone,
            projection: TransverseMercator {
                scale_factor: "0.999600".to_string(),
                central_meridian: format!("{:.6}", central_meridian),
                origin_latitude: "0.000000".to_string(),
                false_easting: "500000.000000".to_string(),
                false_northing: format!("{:.6}", false_northing),
            },
        },
        coordinates: PlanarCoordinates {
            encoding: "coordinate pair",
            resolution: family.resolution,
            units: "meters",
        },
        geodetic: family.geodetic,
    }
}

/// EPSG:2261 NAD83 / New York Central (ftUS)
fn new_york_central() -> HorizontalSystem {
    HorizontalSystem::Planar {
        grid: GridSystem::StatePlane {
            zone: "3102",
            projection: TransverseMercator {
                scale_factor: "0.9999375".to_string(),
                central_meridian: "-76.5833333334".to_string(),
                origin_latitude: "40".to_string(),
                false_easting: "250000".to_string(),
                false_northing: "0".to_string(),
            },
        },
        coordinates: PlanarCoordinates {
            encoding: "Coordinate Pair",
            resolution: "1",
            units: "US survey feet",
        },
        geodetic: NAD83_STATE_PLANE,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpatialReference {
    descriptor: SpatialReferenceDescriptor,
    horizontal: HorizontalSystem,
}

impl SpatialReference {
    pub fn descriptor(&self) -> &SpatialReferenceDescriptor {
        &self.descriptor
    }
}

/// 座標系を `<spref>` に対応付ける。表にない座標系でも必ず何かを返す
pub fn classify_spatial_reference(crs: &CrsId) -> SpatialReference {
    let descriptor = SpatialReferenceDescriptor::from_crs(crs);
    let horizontal = match &descriptor {
        SpatialReferenceDescriptor::KnownEpsg(code) => horizontal_system(*code),
        SpatialReferenceDescriptor::Unknown { .. } => None,
    };

    let horizontal = horizontal.unwrap_or_else(|| {
        warn!(
            "No FGDC template for CRS {}; writing a local description",
            crs.compact()
        );
        HorizontalSystem::Local {
            description: crs.compact(),
            georeference: crs.wkt.clone(),
        }
    });

    SpatialReference {
        descriptor,
        horizontal,
    }
}

impl Section for SpatialReference {
    const TAG: &'static str = "spref";
    const SCOPE: &'static str = "";
    const ANCHORS: &'static [&'static str] = &["idinfo", "dataqual", "spdoinfo"];

    fn to_element(&self) -> Element {
        Element::new(Self::TAG).with_child(horizsys(&self.horizontal))
    }
}

fn horizsys(system: &HorizontalSystem) -> Element {
    let horizsys = Element::new("horizsys");
    match system {
        HorizontalSystem::Geographic { geodetic } => horizsys
            .with_child(
                Element::new("geograph")
                    .with_child(Element::leaf("latres", "0.000001"))
                    .with_child(Element::leaf("longres", "0.000001"))
                    .with_child(Element::leaf("geogunit", "Decimal degrees")),
            )
            .with_child(geodetic_element(geodetic)),
        HorizontalSystem::Planar {
            grid,
            coordinates,
            geodetic,
        } => horizsys
            .with_child(
                Element::new("planar")
                    .with_child(gridsys(grid))
                    .with_child(planci(coordinates)),
            )
            .with_child(geodetic_element(geodetic)),
        HorizontalSystem::Local {
            description,
            georeference,
        } => horizsys.with_child(
            Element::new("local")
                .with_child(Element::leaf("localdes", description.as_str()))
                .with_child(Element::leaf("localgeo", georeference.as_str())),
        ),
    }
}

fn gridsys(grid: &GridSystem) -> Element {
    match grid {
        GridSystem::Utm { zone, projection } => Element::new("gridsys")
            .with_child(Element::leaf("gridsysn", "Universal Transverse Mercator"))
            .with_child(
                Element::new("utm")
                    .with_child(Element::leaf("utmzone", zone.to_string()))
                    .with_child(transmer(projection)),
            ),
        GridSystem::StatePlane { zone, projection } => Element::new("gridsys")
            .with_child(Element::leaf(
                "gridsysn",
                "State Plane Coordinate System 1983",
            ))
            .with_child(
                Element::new("spcs")
                    .with_child(Element::leaf("spcszone", *zone))
                    .with_child(transmer(projection)),
            ),
    }
}

fn transmer(projection: &TransverseMercator) -> Element {
    Element::new("transmer")
        .with_child(Element::leaf("sfctrmer", projection.scale_factor.as_str()))
        .with_child(Element::leaf("longcm", projection.central_meridian.as_str()))
        .with_child(Element::leaf("latprjo", projection.origin_latitude.as_str()))
        .with_child(Element::leaf("feast", projection.false_easting.as_str()))
        .with_child(Element::leaf("fnorth", projection.false_northing.as_str()))
}

fn planci(coordinates: &PlanarCoordinates) -> Element {
    Element::new("planci")
        .with_child(Element::leaf("plance", coordinates.encoding))
        .with_child(
            Element::new("coordrep")
                .with_child(Element::leaf("absres", coordinates.resolution))
                .with_child(Element::leaf("ordres", coordinates.resolution)),
        )
        .with_child(Element::leaf("plandu", coordinates.units))
}

fn geodetic_element(geodetic: &Geodetic) -> Element {
    Element::new("geodetic")
        .with_child(Element::leaf("horizdn", geodetic.datum))
        .with_child(Element::leaf("ellips", geodetic.ellipsoid))
        .with_child(Element::leaf("semiaxis", geodetic.semi_major_axis))
        .with_child(Element::leaf("denflat", geodetic.flattening_ratio))
}
