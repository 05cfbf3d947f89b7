use chrono::{Local, NaiveDate};
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::error::{EnhanceError, Result};
use crate::extent::{normalize_extent, BoundsSampling};
use crate::gdal_source::GdalSource;
use crate::geoform::apply_geoform;
use crate::model::{extension_of, DataSourceFacts, Organization, SourceKind};
use crate::source::{CoordinateTransform, FactSource};
use crate::spref::classify_spatial_reference;
use crate::surgery::{find_mut, replace_section, Path as XmlPath};
use crate::xml::{Element, Node};

#[derive(Debug, Clone, Default)]
pub struct EnhanceOptions {
    /// 範囲の再投影で変換する点の取り方
    pub sampling: BoundsSampling,
    /// `metd` に書く日付。`None` なら今日
    pub date: Option<NaiveDate>,
}

/// 呼び出し側が追加する処理（カテゴリ、配布情報など機関ごとのセクション）。
/// 日付の更新の直前に登録順で実行される
pub trait Stage {
    fn name(&self) -> &str;
    fn apply(&self, root: &mut Element, facts: Option<&DataSourceFacts>) -> Result<()>;
}

#[derive(Debug)]
pub struct Outcome {
    pub xml: String,
    /// 警告として吸収した問題と、予期しない内部エラー
    pub issues: Vec<EnhanceError>,
}

impl Outcome {
    pub fn faults(&self) -> impl Iterator<Item = &EnhanceError> {
        self.issues.iter().filter(|issue| issue.is_fault())
    }
}

pub struct Enhancer {
    source: Box<dyn FactSource>,
    transform: Box<dyn CoordinateTransform>,
    options: EnhanceOptions,
    stages: Vec<Box<dyn Stage>>,
}

impl Enhancer {
    pub fn new(
        source: impl FactSource + 'static,
        transform: impl CoordinateTransform + 'static,
    ) -> Self {
        Self {
            source: Box::new(source),
            transform: Box::new(transform),
            options: EnhanceOptions::default(),
            stages: Vec::new(),
        }
    }

    pub fn with_gdal() -> Self {
        Self::new(GdalSource::new(), GdalSource::new())
    }

    pub fn with_options(mut self, options: EnhanceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// XMLを解析して拡充し、FGDCのDOCTYPE付きで返す。
    /// 解析の失敗だけがエラーになり、それ以外は `Outcome::issues` に残る
    pub fn run(&self, xml: &str, datafile: &Path) -> Result<Outcome> {
        let mut root = Element::parse(xml)?;
        let issues = self.enhance_tree(&mut root, datafile);
        let xml = root.to_fgdc_string()?;
        Ok(Outcome { xml, issues })
    }

    pub fn enhance_tree(&self, root: &mut Element, datafile: &Path) -> Vec<EnhanceError> {
        let mut issues = Issues::default();
        let extension = extension_of(datafile);

        if let Some(geoform) = issues.absorb("geoform", apply_geoform(root, &extension)) {
            debug!("Set geoform to {:?}", geoform.as_str());
        }

        let facts = match SourceKind::from_extension(&extension) {
            Some(kind) => issues.absorb("data source", self.source.read_facts(datafile, kind)),
            None => {
                info!(
                    "No reader for {:?} files; leaving spatial information unchanged",
                    extension
                );
                None
            }
        };

        if let Some(facts) = &facts {
            self.apply_spatial(root, facts, datafile, &mut issues);
        }

        for stage in &self.stages {
            issues.absorb(stage.name(), stage.apply(root, facts.as_ref()));
        }

        let date = self.options.date.unwrap_or_else(|| Local::now().date_naive());
        issues.absorb("metadata date", stamp_metadata_date(root, date));

        issues.0
    }

    fn apply_spatial(
        &self,
        root: &mut Element,
        facts: &DataSourceFacts,
        datafile: &Path,
        issues: &mut Issues,
    ) {
        if let Organization::Vector { geometry, .. } = &facts.organization {
            // 意図しないマルチ型や3Dかもしれない
            if geometry.contains("Multi") || geometry.contains("3D") {
                warn!("Geometry type of {:?} is {}", datafile, geometry);
            }
        }
        issues.absorb("spdoinfo", replace_section(root, &facts.organization));

        let Some(crs) = &facts.crs else {
            issues.absorb::<()>(
                "spref",
                Err(EnhanceError::MissingFact {
                    path: datafile.to_path_buf(),
                    what: "coordinate reference system",
                }),
            );
            return;
        };
        issues.absorb("spref", replace_section(root, &classify_spatial_reference(crs)));

        let Some(bounds) = &facts.bounds else {
            issues.absorb::<()>(
                "spdom",
                Err(EnhanceError::MissingFact {
                    path: datafile.to_path_buf(),
                    what: "spatial extent",
                }),
            );
            return;
        };
        let bbox = normalize_extent(bounds, crs, self.transform.as_ref(), self.options.sampling);
        if let Some(bbox) = issues.absorb("spdom", bbox) {
            issues.absorb("spdom", replace_section(root, &bbox));
        }
    }
}

/// `metainfo/metd` を `YYYYMMDD` で更新する。`metd` がなければ `metainfo` の先頭に作る
pub fn stamp_metadata_date(root: &mut Element, date: NaiveDate) -> Result<()> {
    let stamp = date.format("%Y%m%d").to_string();

    if let Some(metd) = find_mut(root, &XmlPath::new("metainfo/metd")) {
        metd.set_text(stamp);
        return Ok(());
    }

    let root_name = root.name.clone();
    let metainfo = root
        .child_mut("metainfo")
        .ok_or(EnhanceError::StructuralPrecondition {
            scope: root_name,
            candidates: "metainfo".to_string(),
        })?;
    metainfo
        .children
        .insert(0, Node::Element(Element::leaf("metd", stamp)));
    Ok(())
}

/// 吸収した問題。ひとつにつき1行のログを出す
#[derive(Default)]
struct Issues(Vec<EnhanceError>);

impl Issues {
    fn absorb<T>(&mut self, stage: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                if err.is_fault() {
                    error!("{}: {}", stage, err);
                } else {
                    warn!("{}: {}", stage, err);
                }
                self.0.push(err);
                None
            }
        }
    }
}

/// GDALで読み取って拡充する。XMLが解析できなければ入力をそのまま返す
pub fn enhance(xml: &str, datafile: impl AsRef<Path>) -> String {
    match Enhancer::with_gdal().run(xml, datafile.as_ref()) {
        Ok(outcome) => outcome.xml,
        Err(err) => {
            error!("{}; returning the metadata unchanged", err);
            xml.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bounds, CrsId};
    use crate::surgery::find;
    use std::cell::Cell;
    use std::rc::Rc;

    const METADATA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <idinfo>
    <citation>
      <citeinfo>
        <origin>Cornell University Geospatial Information Repository</origin>
        <pubdate>2019</pubdate>
        <title>Tompkins County Roads</title>
        <pubinfo><pubplace>Ithaca, NY</pubplace></pubinfo>
      </citeinfo>
    </citation>
    <descript><abstract>Road centerlines.</abstract></descript>
    <status><progress>Complete</progress></status>
    <spdom><bounding><westbc>0</westbc><eastbc>0</eastbc><northbc>0</northbc><southbc>0</southbc></bounding></spdom>
    <keywords><theme><themekt>none</themekt><themekey>roads</themekey></theme></keywords>
  </idinfo>
  <dataqual><lineage/></dataqual>
  <spdoinfo><direct>Point</direct></spdoinfo>
  <eainfo/>
  <metainfo>
    <metd>20010101</metd>
    <metc/>
  </metainfo>
</metadata>"#;

    #[derive(Clone)]
    struct FakeSource {
        facts: Option<DataSourceFacts>,
        opened: Rc<Cell<usize>>,
    }

    impl FakeSource {
        fn new(organization: Organization, crs: Option<CrsId>, bounds: Option<Bounds>) -> Self {
            Self {
                facts: Some(DataSourceFacts {
                    extension: String::new(),
                    organization,
                    crs,
                    bounds,
                }),
                opened: Rc::new(Cell::new(0)),
            }
        }

        fn unreadable() -> Self {
            Self {
                facts: None,
                opened: Rc::new(Cell::new(0)),
            }
        }
    }

    impl FactSource for FakeSource {
        fn read_facts(&self, path: &Path, _kind: SourceKind) -> Result<DataSourceFacts> {
            self.opened.set(self.opened.get() + 1);
            self.facts.clone().ok_or_else(|| EnhanceError::DataSourceOpen {
                path: path.to_path_buf(),
                reason: "not recognized as a supported file format".to_string(),
            })
        }
    }

    /// 開けたのに座標系が読めないソース
    struct FaultySource;

    impl FactSource for FaultySource {
        fn read_facts(&self, path: &Path, _kind: SourceKind) -> Result<DataSourceFacts> {
            Err(EnhanceError::DataSourceFault {
                path: path.to_path_buf(),
                reason: "OGR Error: Corrupt data".to_string(),
            })
        }
    }

    /// 投影座標を1000で割って度として返す
    struct ScaleTransform;

    impl CoordinateTransform for ScaleTransform {
        fn to_geographic(&self, _crs: &CrsId, points: &[(f64, f64)]) -> Result<Vec<(f64, f64)>> {
            Ok(points.iter().map(|&(x, y)| (x / 1000.0, y / 1000.0)).collect())
        }
    }

    fn date() -> EnhanceOptions {
        EnhanceOptions {
            date: NaiveDate::from_ymd_opt(2024, 3, 9),
            ..Default::default()
        }
    }

    fn vector_enhancer() -> Enhancer {
        Enhancer::new(
            FakeSource::new(
                Organization::Vector {
                    geometry: "LineString".to_string(),
                    features: 1234,
                },
                Some(CrsId::from_epsg(26918)),
                Some(Bounds::new(-76600.0, 42300.0, -76400.0, 42500.0)),
            ),
            ScaleTransform,
        )
        .with_options(date())
    }

    fn text_at(root: &Element, path: &str) -> String {
        find(root, &XmlPath::new(path))
            .unwrap_or_else(|| panic!("missing {}", path))
            .text()
    }

    fn names(el: &Element) -> Vec<&str> {
        el.elements().map(|child| child.name.as_str()).collect()
    }

    #[test]
    fn test_vector_pipeline() {
        let outcome = vector_enhancer().run(METADATA, Path::new("roads.shp")).unwrap();
        assert!(outcome.issues.is_empty(), "{:?}", outcome.issues);

        let root = Element::parse(&outcome.xml).unwrap();
        assert_eq!(
            names(&root),
            vec!["idinfo", "dataqual", "spdoinfo", "spref", "eainfo", "metainfo"]
        );
        assert_eq!(
            text_at(&root, "idinfo/citation/citeinfo/geoform"),
            "vector digital data"
        );
        assert_eq!(text_at(&root, "spdoinfo/direct"), "Vector");
        assert_eq!(text_at(&root, "spdoinfo/ptvctinf/sdtsterm/sdtstype"), "LineString");
        assert_eq!(text_at(&root, "spdoinfo/ptvctinf/sdtsterm/ptvctcnt"), "1234");
        assert_eq!(text_at(&root, "spref/horizsys/planar/gridsys/utm/utmzone"), "18");
        assert_eq!(text_at(&root, "idinfo/spdom/bounding/westbc"), "-76.6");
        assert_eq!(text_at(&root, "idinfo/spdom/bounding/eastbc"), "-76.4");
        assert_eq!(text_at(&root, "idinfo/spdom/bounding/northbc"), "42.5");
        assert_eq!(text_at(&root, "idinfo/spdom/bounding/southbc"), "42.3");
        assert_eq!(text_at(&root, "metainfo/metd"), "20240309");

        let idinfo = find(&root, &XmlPath::new("idinfo")).unwrap();
        assert_eq!(
            names(idinfo),
            vec!["citation", "descript", "status", "spdom", "keywords"]
        );
    }

    #[test]
    fn test_output_starts_with_fgdc_doctype() {
        let outcome = vector_enhancer().run(METADATA, Path::new("roads.shp")).unwrap();
        assert!(outcome.xml.starts_with(
            "<!DOCTYPE metadata SYSTEM \"http://fgdc.gov/metadata/fgdc-std-001-1998.dtd\">\n<metadata>"
        ));
    }

    #[test]
    fn test_running_twice_is_idempotent() {
        let enhancer = vector_enhancer();
        let once = enhancer.run(METADATA, Path::new("roads.shp")).unwrap().xml;
        let twice = enhancer.run(&once, Path::new("roads.shp")).unwrap().xml;
        assert_eq!(once, twice);

        let root = Element::parse(&twice).unwrap();
        let citeinfo = find(&root, &XmlPath::new("idinfo/citation/citeinfo")).unwrap();
        assert_eq!(citeinfo.elements().filter(|el| el.name == "geoform").count(), 1);
        assert_eq!(root.elements().filter(|el| el.name == "spref").count(), 1);
        assert_eq!(root.elements().filter(|el| el.name == "spdoinfo").count(), 1);
    }

    #[test]
    fn test_raster_geoform_and_spdoinfo() {
        let enhancer = Enhancer::new(
            FakeSource::new(
                Organization::Raster { rows: 300, cols: 200 },
                Some(CrsId::from_epsg(4326)),
                Some(Bounds::new(-76.5, 42.4, -76.4, 42.5)),
            ),
            ScaleTransform,
        )
        .with_options(date());
        let outcome = enhancer.run(METADATA, Path::new("dem.tif")).unwrap();
        let root = Element::parse(&outcome.xml).unwrap();

        let citeinfo = find(&root, &XmlPath::new("idinfo/citation/citeinfo")).unwrap();
        assert_eq!(names(citeinfo), vec!["origin", "pubdate", "title", "geoform", "pubinfo"]);
        assert_eq!(
            text_at(&root, "idinfo/citation/citeinfo/geoform"),
            "raster digital data"
        );
        assert_eq!(text_at(&root, "spdoinfo/rastinfo/rowcount"), "300");
        assert_eq!(text_at(&root, "spdoinfo/rastinfo/colcount"), "200");
        assert_eq!(text_at(&root, "spref/horizsys/geodetic/horizdn"), "D_WGS_1984");
        // 地理座標系なので変換しない
        assert_eq!(text_at(&root, "idinfo/spdom/bounding/westbc"), "-76.5");
    }

    #[test]
    fn test_degenerate_projected_extent_is_widened() {
        let enhancer = Enhancer::new(
            FakeSource::new(
                Organization::Vector {
                    geometry: "Point".to_string(),
                    features: 1,
                },
                Some(CrsId::from_epsg(32618)),
                Some(Bounds::new(10000.0, 10000.0, 10000.1, 20000.0)),
            ),
            ScaleTransform,
        )
        .with_options(date());
        let outcome = enhancer.run(METADATA, Path::new("well.geojson")).unwrap();
        let root = Element::parse(&outcome.xml).unwrap();

        let west: f64 = text_at(&root, "idinfo/spdom/bounding/westbc").parse().unwrap();
        let east: f64 = text_at(&root, "idinfo/spdom/bounding/eastbc").parse().unwrap();
        assert!(east - west >= 0.001, "west {} east {}", west, east);
    }

    #[test]
    fn test_unreadable_source_keeps_spatial_sections() {
        let source = FakeSource::unreadable();
        let opened = source.opened.clone();
        let enhancer = Enhancer::new(source, ScaleTransform).with_options(date());

        let outcome = enhancer.run(METADATA, Path::new("broken.shp")).unwrap();
        let root = Element::parse(&outcome.xml).unwrap();

        assert_eq!(opened.get(), 1);
        assert_eq!(outcome.issues.len(), 1);
        assert!(matches!(outcome.issues[0], EnhanceError::DataSourceOpen { .. }));
        assert_eq!(outcome.faults().count(), 0);
        assert_eq!(text_at(&root, "spdoinfo/direct"), "Point");
        assert_eq!(text_at(&root, "idinfo/spdom/bounding/westbc"), "0");
        assert!(find(&root, &XmlPath::new("spref")).is_none());
        // geoformと日付は更新される
        assert_eq!(
            text_at(&root, "idinfo/citation/citeinfo/geoform"),
            "vector digital data"
        );
        assert_eq!(text_at(&root, "metainfo/metd"), "20240309");
    }

    #[test]
    fn test_source_fault_is_reported_as_fault() {
        let enhancer = Enhancer::new(FaultySource, ScaleTransform).with_options(date());

        let outcome = enhancer.run(METADATA, Path::new("ortho.tif")).unwrap();
        let root = Element::parse(&outcome.xml).unwrap();

        assert_eq!(outcome.faults().count(), 1);
        assert!(!outcome
            .issues
            .iter()
            .any(|issue| matches!(issue, EnhanceError::MissingFact { .. })));
        assert_eq!(text_at(&root, "spdoinfo/direct"), "Point");
        assert!(find(&root, &XmlPath::new("spref")).is_none());
        assert_eq!(text_at(&root, "metainfo/metd"), "20240309");
    }

    #[test]
    fn test_unsupported_extension_only_stamps_date() {
        let source = FakeSource::unreadable();
        let opened = source.opened.clone();
        let enhancer = Enhancer::new(source, ScaleTransform).with_options(date());

        let outcome = enhancer.run(METADATA, Path::new("table.csv")).unwrap();
        let root = Element::parse(&outcome.xml).unwrap();

        assert_eq!(opened.get(), 0);
        assert!(matches!(
            outcome.issues.as_slice(),
            [EnhanceError::UnrecognizedClassification { .. }]
        ));
        assert!(find(&root, &XmlPath::new("idinfo/citation/citeinfo/geoform")).is_none());
        assert_eq!(text_at(&root, "spdoinfo/direct"), "Point");
        assert_eq!(text_at(&root, "metainfo/metd"), "20240309");
    }

    #[test]
    fn test_missing_crs_skips_spref_and_spdom() {
        let enhancer = Enhancer::new(
            FakeSource::new(Organization::Raster { rows: 2, cols: 3 }, None, None),
            ScaleTransform,
        )
        .with_options(date());

        let outcome = enhancer.run(METADATA, Path::new("scan.tif")).unwrap();
        let root = Element::parse(&outcome.xml).unwrap();

        assert!(matches!(
            outcome.issues.as_slice(),
            [EnhanceError::MissingFact { .. }]
        ));
        assert_eq!(text_at(&root, "spdoinfo/rastinfo/rowcount"), "2");
        assert!(find(&root, &XmlPath::new("spref")).is_none());
        assert_eq!(text_at(&root, "idinfo/spdom/bounding/westbc"), "0");
    }

    #[test]
    fn test_missing_anchor_aborts_only_that_insertion() {
        let xml = "<metadata><idinfo><citation><citeinfo><title>T</title></citeinfo></citation></idinfo><metainfo><metd/></metainfo></metadata>";
        let outcome = vector_enhancer().run(xml, Path::new("roads.shp")).unwrap();
        let root = Element::parse(&outcome.xml).unwrap();

        // idinfo に status がないので spdom は挿入できない
        assert!(outcome
            .issues
            .iter()
            .any(|issue| matches!(issue, EnhanceError::StructuralPrecondition { candidates, .. } if candidates == "status")));
        assert!(find(&root, &XmlPath::new("idinfo/spdom")).is_none());
        assert_eq!(names(&root), vec!["idinfo", "spdoinfo", "spref", "metainfo"]);
        assert_eq!(text_at(&root, "metainfo/metd"), "20240309");
    }

    #[test]
    fn test_parse_failure_is_surfaced() {
        let result = vector_enhancer().run("<metadata><idinfo>", Path::new("roads.shp"));
        assert!(matches!(result, Err(EnhanceError::XmlParse(_))));
    }

    #[test]
    fn test_enhance_returns_input_on_parse_failure() {
        let broken = "<metadata><idinfo></metadata>";
        assert_eq!(enhance(broken, "roads.shp"), broken);
    }

    #[test]
    fn test_metd_created_when_missing() {
        let mut root = Element::parse("<metadata><metainfo><metc/></metainfo></metadata>").unwrap();
        stamp_metadata_date(&mut root, NaiveDate::from_ymd_opt(2020, 12, 31).unwrap()).unwrap();

        let metainfo = root.child("metainfo").unwrap();
        assert_eq!(names(metainfo), vec!["metd", "metc"]);
        assert_eq!(metainfo.child("metd").unwrap().text(), "20201231");
    }

    #[test]
    fn test_missing_metainfo_is_reported() {
        let mut root = Element::parse("<metadata><idinfo/></metadata>").unwrap();
        let result = stamp_metadata_date(&mut root, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert!(matches!(
            result,
            Err(EnhanceError::StructuralPrecondition { .. })
        ));
    }

    struct Category;

    impl Stage for Category {
        fn name(&self) -> &str {
            "category"
        }

        fn apply(&self, root: &mut Element, facts: Option<&DataSourceFacts>) -> Result<()> {
            let idinfo = find_mut(root, &XmlPath::new("idinfo")).ok_or(
                EnhanceError::StructuralPrecondition {
                    scope: "metadata".to_string(),
                    candidates: "idinfo".to_string(),
                },
            )?;
            let term = match facts.map(|f| &f.organization) {
                Some(Organization::Raster { .. }) => "imageryBaseMapsEarthCover",
                _ => "transportation",
            };
            crate::surgery::remove_matching(idinfo, &XmlPath::new("keywords/theme/themekey"));
            let theme = find_mut(idinfo, &XmlPath::new("keywords/theme")).ok_or(
                EnhanceError::StructuralPrecondition {
                    scope: "idinfo".to_string(),
                    candidates: "keywords".to_string(),
                },
            )?;
            crate::surgery::insert_xml_after_last(
                theme,
                &format!("<themekey>{}</themekey>", term),
                &crate::surgery::Anchors::parse("themekt"),
            )
        }
    }

    #[test]
    fn test_registered_stage_runs_before_date_stamp() {
        let enhancer = vector_enhancer().with_stage(Category);
        let outcome = enhancer.run(METADATA, Path::new("roads.shp")).unwrap();
        let root = Element::parse(&outcome.xml).unwrap();

        assert!(outcome.issues.is_empty(), "{:?}", outcome.issues);
        assert_eq!(
            text_at(&root, "idinfo/keywords/theme/themekey"),
            "transportation"
        );
    }
}
