use pyo3::prelude::*;

#[pymodule]
fn fgdc_enhance(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(enhance, m)?)?;
    m.add_function(wrap_pyfunction!(enhance_file, m)?)?;
    Ok(())
}

/// メタデータXMLの文字列を拡充して返す。解析できなければ入力をそのまま返す
#[pyfunction]
pub fn enhance(py: Python<'_>, xml: &str, datafile: &str) -> String {
    // GDALの読み込み中はGILを手放す
    py.allow_threads(|| ::fgdc_enhance::enhance(xml, datafile))
}

/// XMLファイルを読み込んで拡充し、`output_path` があれば書き出す
#[pyfunction]
#[pyo3(signature = (xml_path, datafile, output_path=None))]
pub fn enhance_file(
    py: Python<'_>,
    xml_path: &str,
    datafile: &str,
    output_path: Option<&str>,
) -> PyResult<String> {
    let xml = std::fs::read_to_string(xml_path).map_err(|e| {
        PyErr::new::<pyo3::exceptions::PyIOError, _>(format!("Failed to open file: {}", e))
    })?;

    let enhanced = py.allow_threads(|| ::fgdc_enhance::enhance(&xml, datafile));

    if let Some(path) = output_path {
        std::fs::write(path, &enhanced).map_err(|e| {
            PyErr::new::<pyo3::exceptions::PyIOError, _>(format!(
                "Failed to write file: {}",
                e
            ))
        })?;
    }
    Ok(enhanced)
}
