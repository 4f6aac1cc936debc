//! Command-line arguments.

use clap::{Parser, Subcommand};
use kurbo::Vec2;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Parser)]
#[command(name = "pdfink", version, about = "Move and edit PDF objects through a pdfink backend")]
pub struct Cli {
    /// Backend base URL (overrides PDFINK_BACKEND_URL).
    #[arg(long, global = true)]
    pub backend: Option<String>,

    /// Request timeout in seconds (overrides PDFINK_TIMEOUT_SECS).
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List pages, editable objects and their surface placement.
    Inspect {
        file: PathBuf,
    },
    /// Drag an object by a pixel offset and save the result.
    Move {
        file: PathBuf,
        /// Object to move, as PAGE:ID.
        #[arg(long)]
        object: ObjectRef,
        /// Offset in surface pixels, as DX,DY (y grows downward).
        #[arg(long, allow_hyphen_values = true, value_parser = parse_offset)]
        by: Vec2,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replace the text of a text object and save the result.
    ReplaceText {
        file: PathBuf,
        #[arg(long)]
        object: ObjectRef,
        #[arg(long)]
        text: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

/// `PAGE:ID` reference to a page object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub page: usize,
    pub id: String,
}

impl FromStr for ObjectRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (page, id) = s
            .split_once(':')
            .ok_or_else(|| format!("expected PAGE:ID, got {:?}", s))?;
        let page = page
            .parse()
            .map_err(|_| format!("invalid page index {:?}", page))?;
        if id.is_empty() {
            return Err("object id is empty".to_string());
        }
        Ok(Self { page, id: id.to_string() })
    }
}

/// Parse `DX,DY`.
pub fn parse_offset(s: &str) -> Result<Vec2, String> {
    let (dx, dy) = s
        .split_once(',')
        .ok_or_else(|| format!("expected DX,DY, got {:?}", s))?;
    let dx: f64 = dx.trim().parse().map_err(|_| format!("invalid DX {:?}", dx))?;
    let dy: f64 = dy.trim().parse().map_err(|_| format!("invalid DY {:?}", dy))?;
    if !dx.is_finite() || !dy.is_finite() {
        return Err("offset must be finite".to_string());
    }
    Ok(Vec2::new(dx, dy))
}

/// Default output path: `name.pdf` becomes `name.edited.pdf`.
pub fn default_output(input: &std::path::Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    input.with_file_name(format!("{}.edited.pdf", stem))
}
