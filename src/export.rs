//! Extraction result export: the human-editable translation workbook and a
//! CSV fallback with the same columns.
//!
//! Column order matters: the back-fill loader reads tables by position
//! (source = second column, translation = third), so the provenance columns
//! (kind, handle, layer, position, height, rotation, style) all come after
//! the translation column. A translator fills in the third column and feeds
//! the same file straight back.

use crate::extract::TextRecord;
use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook};
use std::collections::BTreeMap;
use std::path::Path;

const HEADERS: &[&str] = &[
    "序号", "原文", "译文", "类型", "句柄", "图层", "位置", "高度", "旋转角度", "样式",
];

const COLUMN_WIDTHS: &[f64] = &[8.0, 30.0, 30.0, 12.0, 15.0, 15.0, 20.0, 10.0, 12.0, 15.0];

fn position_cell(record: &TextRecord) -> String {
    match record.position {
        Some(p) => format!("({:.2}, {:.2})", p.x, p.y),
        None => "N/A".to_string(),
    }
}

fn kind_cell(record: &TextRecord) -> &str {
    record.kind.map(|k| k.as_str()).unwrap_or("RAW")
}

/// Per-kind counts for the summary sheet.
fn kind_stats(records: &[TextRecord]) -> BTreeMap<&str, usize> {
    let mut stats = BTreeMap::new();
    for record in records {
        *stats.entry(kind_cell(record)).or_insert(0) += 1;
    }
    stats
}

/// Write the records into an xlsx workbook with a blank translation column.
pub fn export_xlsx(records: &[TextRecord], source_label: &str, output: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let header_fmt = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet.set_name("文本提取")?;

    for (col, header) in HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &header_fmt)?;
    }
    for (col, width) in COLUMN_WIDTHS.iter().enumerate() {
        sheet.set_column_width(col as u16, *width)?;
    }

    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_number(row, 0, (i + 1) as f64)?;
        sheet.write_string(row, 1, &record.text)?;
        sheet.write_string(row, 2, "")?;
        sheet.write_string(row, 3, kind_cell(record))?;
        sheet.write_string(row, 4, record.handle.as_deref().unwrap_or(""))?;
        sheet.write_string(row, 5, &record.layer)?;
        sheet.write_string(row, 6, &position_cell(record))?;
        sheet.write_number(row, 7, record.height)?;
        sheet.write_number(row, 8, record.rotation)?;
        sheet.write_string(row, 9, &record.style)?;
    }

    // Summary tab: where the texts came from and how many of each kind.
    let summary = workbook.add_worksheet();
    summary.set_name("统计")?;
    summary.write_string_with_format(0, 0, "来源", &header_fmt)?;
    summary.write_string(0, 1, source_label)?;
    summary.write_string_with_format(1, 0, "生成时间", &header_fmt)?;
    summary.write_string(
        1,
        1,
        &chrono::Local::now().format("%Y-%m-%d %H:%M").to_string(),
    )?;
    summary.write_string_with_format(2, 0, "文本总数", &header_fmt)?;
    summary.write_number(2, 1, records.len() as f64)?;
    let mut row = 4u32;
    for (kind, count) in kind_stats(records) {
        summary.write_string(row, 0, kind)?;
        summary.write_number(row, 1, count as f64)?;
        row += 1;
    }
    summary.set_column_width(0, 15.0)?;
    summary.set_column_width(1, 40.0)?;

    workbook
        .save(output)
        .with_context(|| format!("failed to save workbook {}", output.display()))?;
    log::info!("exported {} texts to {}", records.len(), output.display());
    Ok(())
}

/// Write the records to CSV with the same columns as the workbook.
pub fn export_csv(records: &[TextRecord], output: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    writer.write_record(HEADERS)?;
    for (i, record) in records.iter().enumerate() {
        writer.write_record(&[
            (i + 1).to_string(),
            record.text.clone(),
            String::new(),
            kind_cell(record).to_string(),
            record.handle.clone().unwrap_or_default(),
            record.layer.clone(),
            position_cell(record),
            record.height.to_string(),
            record.rotation.to_string(),
            record.style.clone(),
        ])?;
    }
    writer.flush()?;
    log::info!("exported {} texts to {}", records.len(), output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{EntityKind, Point3};
    use crate::extract::SourceRegion;

    fn sample_records() -> Vec<TextRecord> {
        vec![
            TextRecord {
                region: SourceRegion::ModelSpace,
                handle: Some("1A0".to_string()),
                text: "总平面图".to_string(),
                layer: "0".to_string(),
                position: Some(Point3::new(12.345, 67.891, 0.0)),
                height: 5.0,
                rotation: 0.0,
                style: "Standard".to_string(),
                kind: Some(EntityKind::Text),
            },
            TextRecord {
                region: SourceRegion::RawRecord,
                handle: None,
                text: "残损图纸文本".to_string(),
                layer: String::new(),
                position: None,
                height: 0.0,
                rotation: 0.0,
                style: String::new(),
                kind: None,
            },
        ]
    }

    #[test]
    fn test_export_csv_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("texts.csv");
        export_csv(&sample_records(), &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[1], "原文");
        assert_eq!(&headers[2], "译文");

        let rows: Vec<csv::StringRecord> =
            reader.records().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "总平面图");
        assert_eq!(&rows[0][6], "(12.35, 67.89)");
        assert_eq!(&rows[1][4], "");
        assert_eq!(&rows[1][6], "N/A");
    }

    #[test]
    fn test_filled_export_feeds_translation_loader() {
        let dir = tempfile::tempdir().unwrap();
        let exported = dir.path().join("texts.csv");
        export_csv(&sample_records(), &exported).unwrap();

        // Simulate the translator filling in the third column.
        let mut reader = csv::Reader::from_path(&exported).unwrap();
        let headers = reader.headers().unwrap().clone();
        let filled = dir.path().join("filled.csv");
        let mut writer = csv::Writer::from_path(&filled).unwrap();
        writer.write_record(&headers).unwrap();
        for row in reader.records() {
            let row = row.unwrap();
            let mut cells: Vec<String> = row.iter().map(|s| s.to_string()).collect();
            if cells[1] == "总平面图" {
                cells[2] = "General layout".to_string();
            }
            writer.write_record(&cells).unwrap();
        }
        writer.flush().unwrap();

        let map = crate::translate::load_csv(&filled);
        assert_eq!(map.len(), 1);
        assert_eq!(
            map.get("总平面图").map(String::as_str),
            Some("General layout")
        );
    }

    #[test]
    fn test_export_xlsx_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("texts.xlsx");
        export_xlsx(&sample_records(), "site.dxf", &path).unwrap();
        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
