use anyhow::Context;
use clap::Parser;
use deckpress::DeckPress;
use std::path::PathBuf;

/// deckpress: lays out the Fluxx card templates onto a printable PDF and onto
/// PNG sprite atlases
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Directory holding actions.txt, keepers.txt, goals.txt and rules.txt
    #[clap(short, long, default_value = ".")]
    templates: PathBuf,

    /// Directory the template image names are resolved against
    #[clap(short, long, default_value = ".")]
    images: PathBuf,

    /// Output directory, created if missing
    #[clap(short, long, default_value = ".")]
    out: PathBuf,

    /// File name stem for `{stem}.pdf` and `{stem}-NN.png`
    #[clap(long, default_value = "fluxx")]
    stem: String,

    /// Extra font directory; may be repeated
    #[clap(long = "font-dir")]
    font_dirs: Vec<PathBuf>,

    /// Do not look for Serif, Sans and Arial Black among installed fonts
    #[clap(long)]
    no_system_fonts: bool,

    /// Write uncompressed PDF streams
    #[clap(long)]
    no_compress: bool,

    #[clap(long)]
    skip_pdf: bool,

    #[clap(long)]
    skip_atlas: bool,

    /// Write JSONL layout events to this file
    #[clap(long)]
    debug_log: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut builder = DeckPress::builder()
        .system_fonts(!args.no_system_fonts)
        .compress(!args.no_compress)
        .title(args.stem.clone());
    for dir in &args.font_dirs {
        builder = builder.register_font_dir(dir);
    }
    if let Some(path) = &args.debug_log {
        builder = builder.debug_log(path);
    }
    let press = builder.build().context("invalid deckpress configuration")?;

    let deck = press
        .load_deck(&args.templates, &args.images)
        .with_context(|| format!("failed to load templates from {}", args.templates.display()))?;

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;

    if !args.skip_pdf {
        let path = args.out.join(format!("{}.pdf", args.stem));
        press
            .render_pdf_to_file(&deck, &path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("wrote {}", path.display());
    }
    if !args.skip_atlas {
        let written = press
            .render_atlas_to_dir(&deck, &args.out, &args.stem)
            .context("failed to render the sprite atlas")?;
        for path in written {
            log::info!("wrote {}", path.display());
        }
    }
    Ok(())
}
