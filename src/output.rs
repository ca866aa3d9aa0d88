use std::io::{self, Write};

use serde::Serialize;

use crate::app::RunSummary;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub fn print_text_summary(summary: &RunSummary) {
    let green = "\x1b[32m";
    let red = "\x1b[31m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}estat-fetch summary{reset}");
    println!(
        "{green}downloaded: {} of {}{reset}",
        summary.completed.len(),
        summary.total()
    );
    for item in &summary.completed {
        println!(
            "{green}  {} ({} rows) md5={}{reset}",
            item.dataset, item.rows, item.md5sum
        );
    }
    if !summary.failed.is_empty() {
        println!("{red}failed: {}{reset}", summary.failed.len());
        for item in &summary.failed {
            println!("{red}  {}: {}{reset}", item.dataset, item.error);
        }
    }
}
