use std::fmt;

use crate::error::{EnhanceError, Result};
use crate::fragment::Section;
use crate::xml::{Element, Node};

/// 挿入位置の候補となる兄弟要素のタグ名（`title|edition` のような選択）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchors(Vec<String>);

impl Anchors {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tags.into_iter().map(Into::into).collect())
    }

    /// `a|b|c` 形式を解析する
    pub fn parse(alternation: &str) -> Self {
        Self::new(
            alternation
                .split('|')
                .map(str::trim)
                .filter(|tag| !tag.is_empty()),
        )
    }

    pub fn matches(&self, name: &str) -> bool {
        self.0.iter().any(|tag| tag == name)
    }
}

impl From<&[&str]> for Anchors {
    fn from(tags: &[&str]) -> Self {
        Self::new(tags.iter().copied())
    }
}

impl fmt::Display for Anchors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("|"))
    }
}

/// スコープ要素からの相対パス。`./idinfo/spdom` や `title|edition` を受け付ける
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    steps: Vec<Anchors>,
}

impl Path {
    pub fn new(path: &str) -> Self {
        let steps = path
            .split('/')
            .map(str::trim)
            .filter(|step| !step.is_empty() && *step != ".")
            .map(Anchors::parse)
            .collect();
        Self { steps }
    }

    /// スコープ自身を指す空のパスか
    pub fn is_self(&self) -> bool {
        self.steps.is_empty()
    }
}

impl From<&str> for Path {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self.steps.iter().map(ToString::to_string).collect();
        write!(f, "./{}", steps.join("/"))
    }
}

/// 文書順で最初に一致する要素
pub fn find<'a>(scope: &'a Element, path: &Path) -> Option<&'a Element> {
    find_in(scope, &path.steps)
}

pub fn find_mut<'a>(scope: &'a mut Element, path: &Path) -> Option<&'a mut Element> {
    find_in_mut(scope, &path.steps)
}

fn find_in<'a>(el: &'a Element, steps: &[Anchors]) -> Option<&'a Element> {
    let Some((first, rest)) = steps.split_first() else {
        return Some(el);
    };
    el.elements()
        .filter(|child| first.matches(&child.name))
        .find_map(|child| find_in(child, rest))
}

fn find_in_mut<'a>(el: &'a mut Element, steps: &[Anchors]) -> Option<&'a mut Element> {
    let Some((first, rest)) = steps.split_first() else {
        return Some(el);
    };
    for child in el.elements_mut() {
        if first.matches(&child.name) {
            if let Some(found) = find_in_mut(child, rest) {
                return Some(found);
            }
        }
    }
    None
}

/// パスに一致する要素をすべて親から取り除き、取り除いた数を返す
pub fn remove_matching(scope: &mut Element, path: &Path) -> usize {
    remove_in(scope, &path.steps)
}

fn remove_in(el: &mut Element, steps: &[Anchors]) -> usize {
    match steps {
        [] => 0,
        [last] => {
            let before = el.children.len();
            el.children
                .retain(|node| !matches!(node, Node::Element(child) if last.matches(&child.name)));
            before - el.children.len()
        }
        [first, rest @ ..] => el
            .elements_mut()
            .filter(|child| first.matches(&child.name))
            .map(|child| remove_in(child, rest))
            .sum(),
    }
}

/// 候補のうち最後に現れる子要素の直後に `fragment` を挿入する。
/// 候補がひとつもなければ `StructuralPrecondition`
pub fn insert_after_last(scope: &mut Element, fragment: Element, candidates: &Anchors) -> Result<()> {
    let index = last_anchor_index(scope, candidates)?;
    scope.children.insert(index + 1, Node::Element(fragment));
    Ok(())
}

/// XML文字列の断片を解析してから挿入する
pub fn insert_xml_after_last(scope: &mut Element, fragment_xml: &str, candidates: &Anchors) -> Result<()> {
    let fragment = Element::parse_fragment(fragment_xml)?;
    insert_after_last(scope, fragment, candidates)
}

fn last_anchor_index(scope: &Element, candidates: &Anchors) -> Result<usize> {
    scope
        .children
        .iter()
        .rposition(|node| matches!(node, Node::Element(child) if candidates.matches(&child.name)))
        .ok_or_else(|| EnhanceError::StructuralPrecondition {
            scope: scope.name.clone(),
            candidates: candidates.to_string(),
        })
}

/// 既存のセクションを取り除いてから正しい位置に挿入し直す。
/// スコープや挿入位置の候補が見つからない場合は文書を変更しない
pub fn replace_section<S: Section>(root: &mut Element, section: &S) -> Result<()> {
    let root_name = root.name.clone();
    let scope_path = Path::new(S::SCOPE);
    let scope = find_mut(root, &scope_path).ok_or_else(|| EnhanceError::StructuralPrecondition {
        scope: root_name,
        candidates: scope_path.to_string(),
    })?;

    let anchors = Anchors::from(S::ANCHORS);
    last_anchor_index(scope, &anchors)?;

    remove_matching(scope, &Path::new(S::TAG));
    insert_after_last(scope, section.to_element(), &anchors)
}
