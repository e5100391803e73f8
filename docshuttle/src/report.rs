use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use time::macros::format_description;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("time formatting error: {0}")]
    Format(#[from] time::error::Format),
    #[error("no handler available to open {0}")]
    NoHandler(PathBuf),
}

/// Column-titled table of failed items, rendered once per failed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub column_titles: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Rendered HTML ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport(String);

impl RenderedReport {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ErrorReport {
    pub fn new(column_titles: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            column_titles,
            rows,
        }
    }

    /// Cell values are placed into the table verbatim, without HTML
    /// escaping.
    pub fn build(&self) -> RenderedReport {
        let mut html = String::from(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Transfer errors</title>\n\
             <style>table{border-collapse:collapse}th,td{border:1px solid #999;padding:4px 8px;text-align:left}</style>\n\
             </head>\n<body>\n<table>\n<thead>\n<tr>",
        );
        for title in &self.column_titles {
            html.push_str("<th>");
            html.push_str(title);
            html.push_str("</th>");
        }
        html.push_str("</tr>\n</thead>\n<tbody>\n");
        for row in &self.rows {
            html.push_str("<tr>");
            for cell in row {
                html.push_str("<td>");
                html.push_str(cell);
                html.push_str("</td>");
            }
            html.push_str("</tr>\n");
        }
        html.push_str("</tbody>\n</table>\n</body>\n</html>\n");
        RenderedReport(html)
    }
}

/// Writes `report` into `dir` under a timestamped name and returns the path.
pub async fn save(report: &RenderedReport, dir: &Path) -> Result<PathBuf, ReportError> {
    tokio::fs::create_dir_all(dir).await?;
    let stamp = OffsetDateTime::now_utc().format(format_description!(
        "[year][month][day]-[hour][minute][second]-[subsecond digits:9]"
    ))?;
    let mut suffix = 0u32;
    loop {
        let name = if suffix == 0 {
            format!("docshuttle-errors-{stamp}.html")
        } else {
            format!("docshuttle-errors-{stamp}-{suffix}.html")
        };
        let path = dir.join(name);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                file.write_all(report.as_str().as_bytes()).await?;
                file.flush().await?;
                return Ok(path);
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => suffix += 1,
            Err(err) => return Err(err.into()),
        }
    }
}

/// Opens `path` with the desktop's default handler.
pub fn open_report(path: &Path) -> Result<(), ReportError> {
    let mut command = if cfg!(target_os = "windows") {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", ""]);
        command
    } else if cfg!(target_os = "macos") {
        Command::new("open")
    } else {
        Command::new("xdg-open")
    };
    match command.arg(path).spawn() {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(ReportError::NoHandler(path.to_path_buf())),
        Err(err) => Err(err.into()),
    }
}
