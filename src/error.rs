use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnhanceError {
    #[error("failed to parse metadata XML: {0}")]
    XmlParse(String),

    #[error("unable to open data source {path:?}: {reason}")]
    DataSourceOpen { path: PathBuf, reason: String },

    #[error("unexpected fault reading data source {path:?}: {reason}")]
    DataSourceFault { path: PathBuf, reason: String },

    #[error("FGDC metadata lacks one of {candidates} in <{scope}>")]
    StructuralPrecondition { scope: String, candidates: String },

    #[error("data source {path:?} has no {what}")]
    MissingFact { what: &'static str, path: PathBuf },

    #[error("coordinate transform failed: {0}")]
    Transform(String),

    #[error("unable to classify {what} {value:?}")]
    UnrecognizedClassification { what: &'static str, value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EnhanceError {
    /// 予期しない内部エラーかどうか（ログレベルの判定に使う）
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            EnhanceError::DataSourceFault { .. } | EnhanceError::Transform(_) | EnhanceError::Io(_)
        )
    }
}

impl From<quick_xml::Error> for EnhanceError {
    fn from(err: quick_xml::Error) -> Self {
        EnhanceError::XmlParse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for EnhanceError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        EnhanceError::XmlParse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EnhanceError>;
