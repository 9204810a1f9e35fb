use std::path::PathBuf;

use clap::Parser;
use tuf_gate_server::{generate::SampleRepository, init_tracing};

#[derive(Debug, Parser)]
#[command(name = "tuf-gate-generate")]
#[command(about = "Write a freshly signed sample repository", long_about = None)]
struct Cli {
    /// Directory to write the repository into
    #[arg(long, env = "TUF_REPO_PATH", default_value = "testdata/repository")]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let sample = SampleRepository::generate()?;
    sample.store(&cli.out)?;

    tracing::info!(
        directory = %cli.out.display(),
        delegated = sample.metadata.delegated.len(),
        files = sample.files.len(),
        "wrote sample repository"
    );
    Ok(())
}
