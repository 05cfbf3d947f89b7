use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use fgdc_enhance::extent::MAX_EDGE_SEGMENTS;
use fgdc_enhance::{BoundsSampling, EnhanceError, EnhanceOptions, Enhancer};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn, Level};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 入力のFGDCメタデータXMLファイル
    #[arg(value_name = "XML")]
    xml: PathBuf,

    /// メタデータが記述するデータファイル（shp, geojson, e00, tif）
    #[arg(value_name = "DATA")]
    data: PathBuf,

    /// 出力ファイル（デフォルト: 標準出力）
    #[arg(short, long, value_name = "FILE")]
    out: Option<PathBuf>,

    /// 範囲の再投影で各辺をN等分した点を使う（デフォルト: 2隅のみ）
    #[arg(
        long,
        value_name = "N",
        value_parser = clap::value_parser!(u16).range(1..=MAX_EDGE_SEGMENTS as i64)
    )]
    densify: Option<u16>,

    /// metd に書く日付 YYYYMMDD（デフォルト: 今日）
    #[arg(long, value_name = "YYYYMMDD", value_parser = parse_date)]
    date: Option<NaiveDate>,

    /// デバッグログを出力
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn options(&self) -> EnhanceOptions {
        EnhanceOptions {
            sampling: self
                .densify
                .map(|n| BoundsSampling::Edges(usize::from(n)))
                .unwrap_or_default(),
            date: self.date,
        }
    }
}

fn parse_date(value: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y%m%d").map_err(|e| format!("{}: {}", value, e))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // ログの初期化（標準出力はXML用に空けておく）
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let enhancer = Enhancer::with_gdal().with_options(args.options());
    let mut stdout = std::io::stdout().lock();
    process(
        &enhancer,
        &args.xml,
        &args.data,
        args.out.as_deref(),
        &mut stdout,
    )
}

/// XMLを拡充して `out` か `console` に書き出す。
/// XMLが解析できなければ元のテキストを書き出してからエラーを返す
fn process(
    enhancer: &Enhancer,
    xml_path: &Path,
    data: &Path,
    out: Option<&Path>,
    console: &mut impl Write,
) -> Result<()> {
    let input = fs::read_to_string(xml_path)
        .with_context(|| format!("Failed to read metadata file {:?}", xml_path))?;

    info!("Enhancing {:?} from {:?}", xml_path, data);
    match enhancer.run(&input, data) {
        Ok(outcome) => {
            write_output(out, &outcome.xml, console)?;

            let faults = outcome.faults().count();
            if faults > 0 {
                error!("{} unexpected faults while enhancing {:?}", faults, xml_path);
            } else if !outcome.issues.is_empty() {
                warn!("{} sections were left unchanged", outcome.issues.len());
            }
            Ok(())
        }
        Err(e @ EnhanceError::XmlParse(_)) => {
            // パイプラインを止めないよう元のテキストを出力してから失敗する
            write_output(out, &input, console)?;
            anyhow::bail!("Failed to enhance {:?}: {}", xml_path, e)
        }
        Err(e) => Err(e.into()),
    }
}

fn write_output(out: Option<&Path>, xml: &str, console: &mut impl Write) -> Result<()> {
    match out {
        Some(path) => {
            fs::write(path, xml)
                .with_context(|| format!("Failed to write output file {:?}", path))?;
            writeln!(console, "Enhanced xml written to file {}", path.display())?;
        }
        None => console.write_all(xml.as_bytes())?,
    }
    console.flush()?;
    Ok(())
}
