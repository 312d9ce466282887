use anyhow::{Context, Result};
use clap::Parser;
use pyg_ninja::project::Loader;
use pyg_ninja::settings::Settings;
use pyg_ninja::{debug_log, ninja};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pyg")]
#[command(version)]
#[command(about = "Translates GYP-style JSON project files into a Ninja build manifest")]
struct Cli {
    /// Root project file to translate (e.g. project.gyp)
    file: PathBuf,

    /// Directory build outputs are written under
    #[arg(long, value_name = "DIR", default_value = "build")]
    builddir: PathBuf,

    /// Directory stripped from source paths when printing the manifest.
    /// Defaults to the current working directory.
    #[arg(long, value_name = "DIR")]
    deprefix: Option<PathBuf>,

    /// Output backend; only "ninja" is currently supported
    #[arg(long, value_name = "NAME", default_value = "ninja")]
    generator: String,

    /// Write the manifest here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.generator != "ninja" {
        anyhow::bail!("unsupported generator '{}': only 'ninja' is implemented", cli.generator);
    }

    let deprefix = match cli.deprefix {
        Some(p) => p,
        None => std::env::current_dir().context("failed to get current directory")?,
    };

    debug_log!("loading project graph from {}", cli.file.display());
    let (loader, _root) = Loader::load_root(&cli.file)
        .with_context(|| format!("failed to load project file {}", cli.file.display()))?;

    let settings = Settings::new(cli.builddir, deprefix);
    let manifest = ninja::generate(&loader, &settings)
        .with_context(|| format!("failed to generate ninja manifest for {}", cli.file.display()))?;

    match cli.output {
        Some(path) => {
            std::fs::write(&path, manifest)
                .with_context(|| format!("failed to write manifest to {}", path.display()))?;
        }
        None => {
            print!("{manifest}");
        }
    }

    Ok(())
}
