use anyhow::{Result, anyhow};
use clap::Parser;
use log::info;
use pdfoutlinescopy::utils::{get_basic_pdf_doc, get_basic_pdf_doc_with_outline, trivial_outline};
use std::path::Path;

/// Generate a PDF document with random content, to try out `pdfoutlinescopy`. The pages have for
/// title the name of the document and the page number. Optionally every page gets a bookmark.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Output path
    #[arg(short = 'o')]
    output_path: String,
    /// Number of pages of the document
    #[arg(short = 'n')]
    num_pages: u8,
    /// Provide the document with one top-level bookmark `Page k` per page
    #[arg(short, long)]
    with_outline: bool,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    if let Err(err) = generate_sample_pdf_doc(&cli.output_path, cli.num_pages, cli.with_outline) {
        eprintln!("Error encountered: {err:#}");
        std::process::exit(1);
    }
}

fn generate_sample_pdf_doc(
    output_path: impl AsRef<Path>,
    num_pages: u8,
    with_outline: bool,
) -> Result<()> {
    let output_path = output_path.as_ref();

    if std::fs::exists(output_path)? {
        return Err(anyhow!(
            "A file at location '{}' exists already",
            output_path.display()
        ));
    }

    let doc_name = output_path
        .file_name()
        .ok_or(anyhow!(
            "The output path provided does not present a filename"
        ))?
        .to_string_lossy()
        .to_string();

    let mut sample_doc = if with_outline {
        get_basic_pdf_doc_with_outline(&doc_name, num_pages, &trivial_outline(num_pages))?
    } else {
        get_basic_pdf_doc(&doc_name, num_pages)?
    };

    let mut buffer = Vec::new();
    sample_doc.save_to(&mut buffer)?;
    std::fs::write(output_path, buffer)?;
    info!("Sample document saved as '{}'", output_path.display());

    println!("{}", output_path.display());

    Ok(())
}
