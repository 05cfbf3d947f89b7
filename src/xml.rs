use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesCData, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Write;

use crate::error::{EnhanceError, Result};

/// FGDC CSDGM 1998 のDOCTYPE宣言（`<!DOCTYPE` と `>` を除いた部分）
pub const FGDC_DOCTYPE: &str =
    r#"metadata SYSTEM "http://fgdc.gov/metadata/fgdc-std-001-1998.dtd""#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// テキストだけを持つ要素
    pub fn leaf(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name).with_text(text)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|el| el.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements_mut().find(|el| el.name == name)
    }

    /// 直下のテキストを連結して返す
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) | Node::CData(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// 子ノードをすべて置き換えてテキストのみにする
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![Node::Text(text.into())];
    }

    /// XML文字列を解析する。空白だけのテキストノードは捨てる
    pub fn parse(xml: &str) -> Result<Element> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    return Err(EnhanceError::XmlParse(format!(
                        "{} at position {}",
                        e,
                        reader.buffer_position()
                    )))
                }
            };

            match event {
                Event::Start(e) => stack.push(start_element(&e)?),
                Event::Empty(e) => {
                    let el = start_element(&e)?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::End(_) => {
                    let el = stack.pop().ok_or_else(|| {
                        EnhanceError::XmlParse("unexpected closing tag".to_string())
                    })?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::Text(e) => {
                    let text = e.unescape()?;
                    if text.trim().is_empty() {
                        continue;
                    }
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Text(text.into_owned())),
                        None => {
                            return Err(EnhanceError::XmlParse(
                                "text content outside of the root element".to_string(),
                            ))
                        }
                    }
                }
                Event::CData(e) => {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::CData(text)),
                        None => {
                            return Err(EnhanceError::XmlParse(
                                "CDATA outside of the root element".to_string(),
                            ))
                        }
                    }
                }
                // ルート外のコメントや処理命令は出力に含めない
                Event::Comment(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&e).into_owned();
                        parent.children.push(Node::Comment(text));
                    }
                }
                Event::PI(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&e).into_owned();
                        parent.children.push(Node::ProcessingInstruction(text));
                    }
                }
                Event::Decl(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
        }

        if let Some(open) = stack.last() {
            return Err(EnhanceError::XmlParse(format!(
                "unclosed element <{}>",
                open.name
            )));
        }

        root.ok_or_else(|| EnhanceError::XmlParse("document has no root element".to_string()))
    }

    /// 挿入用の断片を解析する（ルート要素がひとつだけの文書として扱う）
    pub fn parse_fragment(xml: &str) -> Result<Element> {
        Self::parse(xml)
    }

    /// FGDCのDOCTYPE付きで整形済みのXML文字列にする
    pub fn to_fgdc_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::DocType(BytesText::from_escaped(FGDC_DOCTYPE)))?;
        self.write_to(&mut writer)?;

        let mut xml = String::from_utf8(writer.into_inner())
            .map_err(|e| EnhanceError::XmlParse(e.to_string()))?;
        xml.push('\n');
        Ok(xml)
    }

    /// DOCTYPEなしで整形済みのXML文字列にする
    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        self.write_to(&mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(|e| EnhanceError::XmlParse(e.to_string()))
    }

    fn write_to<W: Write>(&self, writer: &mut Writer<W>) -> std::io::Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            return writer.write_event(Event::Empty(start));
        }

        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            match child {
                Node::Element(el) => el.write_to(writer)?,
                Node::Text(text) => {
                    writer.write_event(Event::Text(BytesText::from_escaped(partial_escape(text.as_str()))))?
                }
                Node::CData(text) => writer.write_event(Event::CData(BytesCData::new(text.as_str())))?,
                Node::Comment(text) => {
                    writer.write_event(Event::Comment(BytesText::from_escaped(text.as_str())))?
                }
                Node::ProcessingInstruction(text) => {
                    writer.write_event(Event::PI(BytesPI::new(text.as_str())))?
                }
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))
    }
}

fn start_element(start: &BytesStart) -> Result<Element> {
    let mut el = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(el));
        return Ok(());
    }
    if root.is_some() {
        return Err(EnhanceError::XmlParse(
            "document has more than one root element".to_string(),
        ));
    }
    *root = Some(el);
    Ok(())
}
