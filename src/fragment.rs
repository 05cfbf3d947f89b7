//! FGDCの各セクションを型付きで組み立てる。
//!
//! セクションは自分のタグ名、親要素へのパス、スキーマ上の直前の兄弟要素を
//! 知っているので、`surgery::replace_section` に渡すだけで
//! 「取り除いてから挿入する」置き換えができる。

use crate::model::{BoundingBox, Organization};
use crate::xml::Element;

pub trait Section {
    /// セクションのタグ名
    const TAG: &'static str;
    /// ルートから親要素へのパス（空ならルート直下）
    const SCOPE: &'static str;
    /// スキーマ上でこのセクションの直前に来る兄弟要素
    const ANCHORS: &'static [&'static str];

    fn to_element(&self) -> Element;
}

impl Section for Organization {
    const TAG: &'static str = "spdoinfo";
    const SCOPE: &'static str = "";
    const ANCHORS: &'static [&'static str] = &["idinfo", "dataqual"];

    fn to_element(&self) -> Element {
        match self {
            Organization::Vector { geometry, features } => Element::new(Self::TAG)
                .with_child(Element::leaf("direct", "Vector"))
                .with_child(
                    Element::new("ptvctinf").with_child(
                        Element::new("sdtsterm")
                            .with_child(Element::leaf("sdtstype", geometry.as_str()))
                            .with_child(Element::leaf("ptvctcnt", features.to_string())),
                    ),
                ),
            Organization::Raster { rows, cols } => Element::new(Self::TAG)
                .with_child(Element::leaf("direct", "Raster"))
                .with_child(
                    Element::new("rastinfo")
                        .with_child(Element::leaf("rasttype", "Grid Cell"))
                        .with_child(Element::leaf("rowcount", rows.to_string()))
                        .with_child(Element::leaf("colcount", cols.to_string())),
                ),
        }
    }
}

impl Section for BoundingBox {
    const TAG: &'static str = "spdom";
    const SCOPE: &'static str = "idinfo";
    const ANCHORS: &'static [&'static str] = &["status"];

    // FGDCの順序は west, east, north, south
    fn to_element(&self) -> Element {
        Element::new(Self::TAG).with_child(
            Element::new("bounding")
                .with_child(Element::leaf("westbc", degrees(self.west)))
                .with_child(Element::leaf("eastbc", degrees(self.east)))
                .with_child(Element::leaf("northbc", degrees(self.north)))
                .with_child(Element::leaf("southbc", degrees(self.south))),
        )
    }
}

/// 往復可能な最短表記。整数値でも小数点を付ける（`-75.0`）
pub fn degrees(value: f64) -> String {
    format!("{:?}", value)
}
