use crate::error::{EnhanceError, Result};
use crate::fragment::Section;
use crate::surgery::replace_section;
use crate::xml::Element;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geoform {
    VectorDigitalData,
    RasterDigitalData,
}

impl Geoform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Geoform::VectorDigitalData => "vector digital data",
            Geoform::RasterDigitalData => "raster digital data",
        }
    }
}

pub fn classify_geoform(extension: &str) -> Option<Geoform> {
    match extension.to_ascii_lowercase().as_str() {
        "shp" | "geojson" | "e00" => Some(Geoform::VectorDigitalData),
        "tif" => Some(Geoform::RasterDigitalData),
        _ => None,
    }
}

impl Section for Geoform {
    const TAG: &'static str = "geoform";
    const SCOPE: &'static str = "idinfo/citation/citeinfo";
    const ANCHORS: &'static [&'static str] = &["title", "edition"];

    fn to_element(&self) -> Element {
        Element::leaf(Self::TAG, self.as_str())
    }
}

/// ファイル形式からgeoformを決めて置き換える。未知の形式なら何もしない
pub fn apply_geoform(root: &mut Element, extension: &str) -> Result<Geoform> {
    let geoform =
        classify_geoform(extension).ok_or_else(|| EnhanceError::UnrecognizedClassification {
            what: "geoform for file type",
            value: extension.to_string(),
        })?;
    replace_section(root, &geoform)?;
    Ok(geoform)
}
