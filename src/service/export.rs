use actix_web::HttpResponse;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use serde::Deserialize;

/// `?format=csv` on any report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

/// Something that can be flattened into a CSV row.
pub trait CsvRow {
    fn columns() -> &'static [&'static str];
    fn cells(&self) -> Vec<String>;
}

fn looks_numeric(cell: &str) -> bool {
    cell.parse::<f64>().is_ok()
}

/// Quotes fields that need it and defuses spreadsheet formulas.
pub fn escape_cell(cell: &str) -> String {
    let mut value = cell.to_string();
    if value.starts_with(['=', '+', '-', '@']) && !looks_numeric(&value) {
        value.insert(0, '\'');
    }
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value
    }
}

pub fn to_csv(columns: &[&str], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    let header: Vec<String> = columns.iter().map(|c| escape_cell(c)).collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for row in rows {
        let cells: Vec<String> = row.iter().map(|c| escape_cell(c)).collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

pub fn rows_to_csv<T: CsvRow>(rows: &[T]) -> String {
    let cells: Vec<Vec<String>> = rows.iter().map(CsvRow::cells).collect();
    to_csv(T::columns(), &cells)
}

/// Two-column `metric,value` sheet for reports that are a single record.
pub fn metrics_csv(metrics: &[(&str, String)]) -> String {
    let rows: Vec<Vec<String>> = metrics
        .iter()
        .map(|(name, value)| vec![name.to_string(), value.clone()])
        .collect();
    to_csv(&["metric", "value"], &rows)
}

/// `text/csv` attachment named `<name>.csv`.
pub fn csv_response(name: &str, body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(format!("{name}.csv"))],
        })
        .body(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_cells_pass_through() {
        assert_eq!(escape_cell("Sugar"), "Sugar");
        assert_eq!(escape_cell("12.50"), "12.50");
        assert_eq!(escape_cell("-3"), "-3");
    }

    #[test]
    fn separators_and_quotes_are_quoted() {
        assert_eq!(escape_cell("Salt, fine"), "\"Salt, fine\"");
        assert_eq!(escape_cell("5\" nails"), "\"5\"\" nails\"");
        assert_eq!(escape_cell("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn formulas_are_neutralised() {
        assert_eq!(escape_cell("=SUM(A1:A9)"), "'=SUM(A1:A9)");
        assert_eq!(escape_cell("@cmd"), "'@cmd");
        assert_eq!(escape_cell("+x,y"), "\"'+x,y\"");
    }

    #[test]
    fn csv_has_header_then_rows() {
        let csv = to_csv(
            &["method", "total"],
            &[vec!["cash".into(), "200".into()], vec!["card".into(), "300.5".into()]],
        );
        assert_eq!(csv, "method,total\ncash,200\ncard,300.5\n");
    }

    #[test]
    fn metrics_sheet_is_two_columns() {
        let csv = metrics_csv(&[("total_sales", "120.5".into()), ("count", "3".into())]);
        assert_eq!(csv, "metric,value\ntotal_sales,120.5\ncount,3\n");
    }
}
