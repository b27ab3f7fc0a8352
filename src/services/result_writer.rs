use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Local;

use crate::models::screening::{SelectionResult, SelectionRow};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const MAX_SAME_SECOND: usize = 1000;

/// 选股结果写入 CSV（带 BOM，Excel 直接打开不乱码）
pub struct ResultWriter {
    output_dir: PathBuf,
}

impl ResultWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into() }
    }

    /// 没有任何入选股票时不生成文件。写入失败只记录日志。
    pub fn persist(&self, result: &SelectionResult) -> Option<PathBuf> {
        let rows = result.rows();
        if rows.is_empty() {
            log::info!("没有满足条件的股票，不生成结果文件");
            return None;
        }

        let stem = format!("选股结果_{}", Local::now().format("%Y%m%d_%H%M%S"));
        match write_rows(&self.output_dir, &stem, &rows) {
            Ok(path) => {
                log::info!("结果已保存到文件: {}", path.display());
                Some(path)
            }
            Err(e) => {
                log::error!("保存结果时发生错误: {:#}", e);
                None
            }
        }
    }

    /// 读回结果文件
    pub fn load(path: &Path) -> Result<Vec<SelectionRow>> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("读取结果文件失败: {}", path.display()))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let mut rows = Vec::new();
        for record in reader.deserialize() {
            let row: SelectionRow = record.context("结果文件格式错误")?;
            rows.push(row);
        }
        Ok(rows)
    }
}

fn write_rows(dir: &Path, stem: &str, rows: &[SelectionRow]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("创建输出目录失败: {}", dir.display()))?;
    let (path, mut file) = create_unique(dir, stem)?;
    file.write_all(UTF8_BOM)?;

    let mut writer = csv::Writer::from_writer(file);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(path)
}

/// 同一秒内多次保存时依次加 `_1`、`_2` 后缀，已有文件不会被覆盖
fn create_unique(dir: &Path, stem: &str) -> Result<(PathBuf, File)> {
    for n in 0..MAX_SAME_SECOND {
        let name = if n == 0 { format!("{}.csv", stem) } else { format!("{}_{}.csv", stem, n) };
        let path = dir.join(name);
        match File::options().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e).with_context(|| format!("创建文件失败: {}", path.display())),
        }
    }
    Err(anyhow!("{} 下同名结果文件过多", dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, day).unwrap()
    }

    #[test]
    fn test_persist_and_load_rows() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path());

        let mut result = SelectionResult::new();
        result.insert(d(5), vec!["002693".parse().unwrap()]);
        result.insert(d(6), vec![]);

        let path = writer.persist(&result).expect("应生成结果文件");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("选股结果_") && name.ends_with(".csv"));

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        assert_eq!(text.lines().next(), Some("日期,股票代码"));
        assert_eq!(text.lines().nth(1), Some("2024-08-05,002693"));

        let rows = ResultWriter::load(&path).unwrap();
        assert_eq!(rows, vec![SelectionRow { date: d(5), code: "002693".parse().unwrap() }]);
    }

    #[test]
    fn test_no_rows_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path());

        let mut result = SelectionResult::new();
        result.insert(d(5), vec![]);
        assert!(writer.persist(&result).is_none());
        assert!(writer.persist(&SelectionResult::new()).is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "x").unwrap();
        let writer = ResultWriter::new(blocker.join("out"));

        let mut result = SelectionResult::new();
        result.insert(d(5), vec!["600001".parse().unwrap()]);
        assert!(writer.persist(&result).is_none());
    }

    #[test]
    fn test_repeated_persist_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path());

        let mut first = SelectionResult::new();
        first.insert(d(5), vec!["600001".parse().unwrap()]);
        let mut second = SelectionResult::new();
        second.insert(d(6), vec!["000002".parse().unwrap()]);

        let a = writer.persist(&first).unwrap();
        let b = writer.persist(&second).unwrap();
        assert_ne!(a, b);
        assert_eq!(ResultWriter::load(&a).unwrap()[0].code.as_str(), "600001");
        assert_eq!(ResultWriter::load(&b).unwrap()[0].code.as_str(), "000002");
    }

    #[test]
    fn test_create_unique_adds_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("选股结果_x.csv"), "old").unwrap();

        let (path, _file) = create_unique(dir.path(), "选股结果_x").unwrap();
        assert_eq!(path.file_name().unwrap().to_string_lossy(), "选股结果_x_1.csv");
        assert_eq!(std::fs::read_to_string(dir.path().join("选股结果_x.csv")).unwrap(), "old");
    }
}
