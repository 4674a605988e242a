use anyhow::{Result, anyhow};
use clap::Parser;
use log::info;
use pdfoutlinescopy::get_doc_with_copied_outlines;
use std::path::{Path, PathBuf};

const DEFAULT_OUTPUT_SUFFIX: &str = ".add_outline.pdf";
const USAGE_EXIT_CODE: i32 = -1;

/// Copy the outlines (bookmarks) of the PDF document `src` into the PDF document `dst`, after the
/// outlines `dst` already has. Every bookmarked page is shifted by `offset`, which accounts for the
/// pages preceding the copied content in `dst`. The result is written to `<dst>.add_outline.pdf`,
/// the input files are never modified.
///
/// Pages are counted from 0 in the page tree of each document, and every shifted page must exist
/// in `dst`.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Source PDF file whose outlines are copied
    src: String,
    /// Destination PDF file receiving the outlines
    dst: String,
    /// Offset (+/-) added to the page of every copied bookmark
    #[arg(default_value_t = 0, allow_negative_numbers = true)]
    offset: i64,
    /// Output path (defaults to `<dst>.add_outline.pdf`)
    #[arg(short = 'o')]
    output_path: Option<String>,
    /// Overwrite the output file if it exists already
    #[arg(short, long)]
    force: bool,
    /// Compress the streams of the output file
    #[arg(short, long)]
    compress: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if err.use_stderr() => {
            let _ = err.print();
            std::process::exit(USAGE_EXIT_CODE);
        }
        Err(err) => err.exit(),
    };

    env_logger::init();

    match run(cli) {
        Ok(output_path) => println!("{}", output_path.display()),
        Err(err) => {
            eprintln!("Application error: {err:#}");
            std::process::exit(1);
        }
    }
}

pub fn run(cli: Cli) -> Result<PathBuf> {
    let output_path = PathBuf::from(
        cli.output_path
            .unwrap_or(format!("{}{DEFAULT_OUTPUT_SUFFIX}", cli.dst)),
    );

    for input_path in [&cli.src, &cli.dst] {
        if points_to_same_file(&output_path, Path::new(input_path)) {
            return Err(anyhow!(
                "The output file cannot be one of the input files: '{}'",
                output_path.display()
            ));
        }
    }

    if !cli.force && std::fs::exists(&output_path)? {
        return Err(anyhow!(
            "A file '{}' is already present (use --force to overwrite it)",
            output_path.display()
        ));
    }

    let mut doc = get_doc_with_copied_outlines(&cli.src, &cli.dst, cli.offset)?;

    if cli.compress {
        doc.compress();
    }

    // Serialise in memory first, so that a failure leaves no partial file behind
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;
    std::fs::write(&output_path, buffer)?;
    info!("Output document saved as '{}'", output_path.display());

    Ok(output_path)
}

fn points_to_same_file(path: &Path, other: &Path) -> bool {
    match (path.canonicalize(), other.canonicalize()) {
        (Ok(path), Ok(other)) => path == other,
        _ => path == other,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use lopdf::{Document, Object, dictionary};
    use pdfoutlinescopy::{OutlineError, OutlineItem, outline, utils};

    const TEST_DIR: &str = "dev-playground/test";

    fn get_virgin_test_dir(dir_name: impl AsRef<Path>) -> Result<String> {
        let dir_path = format!("{TEST_DIR}/{}", dir_name.as_ref().display());

        if std::fs::exists(&dir_path)? {
            std::fs::remove_dir_all(&dir_path)?;
        }

        std::fs::create_dir_all(&dir_path)?;
        Ok(dir_path)
    }

    fn save(doc: &mut Document, path: &str) -> Result<()> {
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)?;
        std::fs::write(path, buffer)?;
        Ok(())
    }

    fn cli(args: &[&str]) -> Result<Cli> {
        Ok(Cli::try_parse_from(
            std::iter::once("pdfoutlinescopy").chain(args.iter().copied()),
        )?)
    }

    #[test]
    fn parse_positional_arguments() -> Result<()> {
        let parsed = cli(&["src.pdf", "dst.pdf", "-3"])?;
        assert_eq!(parsed.offset, -3);

        let parsed = cli(&["src.pdf", "dst.pdf"])?;
        assert_eq!(parsed.offset, 0);
        assert_eq!(parsed.output_path, None);

        assert!(cli(&["src.pdf"]).is_err());
        assert!(cli(&["src.pdf", "dst.pdf", "two"]).is_err());

        Ok(())
    }

    #[test]
    fn copy_into_default_output_path() -> Result<()> {
        let test_dir = get_virgin_test_dir("copy_into_default_output_path")?;
        let src_path = format!("{test_dir}/src.pdf");
        let dst_path = format!("{test_dir}/dst.pdf");

        let items = vec![
            OutlineItem::new("Chapter 1", 5).with_children(vec![OutlineItem::new("Section 1.1", 6)]),
        ];
        save(&mut utils::get_basic_pdf_doc_with_outline("src.pdf", 7, &items)?, &src_path)?;
        save(&mut utils::get_basic_pdf_doc("dst.pdf", 20)?, &dst_path)?;
        let dst_before = std::fs::read(&dst_path)?;

        let output_path = run(cli(&[&src_path, &dst_path, "10"])?)?;

        assert_eq!(output_path, PathBuf::from(format!("{dst_path}.add_outline.pdf")));
        assert_eq!(std::fs::read(&dst_path)?, dst_before);

        let output = Document::load(&output_path)?;
        assert_eq!(
            outline::read_outline(&output)?,
            vec![OutlineItem::new("Chapter 1", 15).with_children(vec![OutlineItem::new("Section 1.1", 16)])]
        );

        Ok(())
    }

    #[test]
    fn unresolved_destination_writes_no_output() -> Result<()> {
        let test_dir = get_virgin_test_dir("unresolved_destination_writes_no_output")?;
        let src_path = format!("{test_dir}/src.pdf");
        let dst_path = format!("{test_dir}/dst.pdf");

        let mut src = utils::get_basic_pdf_doc("src.pdf", 2)?;
        utils::equip_with_raw_outline_items(
            &mut src,
            vec![dictionary! {
                "Title" => Object::string_literal("Dangling"),
                "Dest" => vec![Object::Reference((4242, 0)), "Fit".into()],
            }],
        )?;
        save(&mut src, &src_path)?;
        save(&mut utils::get_basic_pdf_doc("dst.pdf", 2)?, &dst_path)?;

        let err = run(cli(&[&src_path, &dst_path])?).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<OutlineError>(),
            Some(OutlineError::UnresolvedDestination { .. })
        ));
        assert!(!std::fs::exists(format!("{dst_path}.add_outline.pdf"))?);

        Ok(())
    }

    #[test]
    fn existing_output_requires_force() -> Result<()> {
        let test_dir = get_virgin_test_dir("existing_output_requires_force")?;
        let src_path = format!("{test_dir}/src.pdf");
        let dst_path = format!("{test_dir}/dst.pdf");
        let output_path = format!("{test_dir}/out.pdf");

        save(
            &mut utils::get_basic_pdf_doc_with_outline("src.pdf", 3, &utils::trivial_outline(3))?,
            &src_path,
        )?;
        save(&mut utils::get_basic_pdf_doc("dst.pdf", 3)?, &dst_path)?;
        std::fs::write(&output_path, b"placeholder")?;

        assert!(run(cli(&[&src_path, &dst_path, "-o", &output_path])?).is_err());
        assert_eq!(std::fs::read(&output_path)?, b"placeholder");

        run(cli(&[&src_path, &dst_path, "-o", &output_path, "--force", "--compress"])?)?;
        let output = Document::load(&output_path)?;
        assert_eq!(outline::read_outline(&output)?, utils::trivial_outline(3));

        Ok(())
    }

    #[test]
    fn output_cannot_overwrite_an_input() -> Result<()> {
        let test_dir = get_virgin_test_dir("output_cannot_overwrite_an_input")?;
        let src_path = format!("{test_dir}/src.pdf");
        let dst_path = format!("{test_dir}/dst.pdf");

        save(&mut utils::get_basic_pdf_doc("src.pdf", 1)?, &src_path)?;
        save(&mut utils::get_basic_pdf_doc("dst.pdf", 1)?, &dst_path)?;

        assert!(run(cli(&[&src_path, &dst_path, "-o", &dst_path, "--force"])?).is_err());
        assert!(run(cli(&[&src_path, &dst_path, "-o", &src_path, "--force"])?).is_err());

        Ok(())
    }
}
