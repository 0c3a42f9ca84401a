use clap::Parser;
use std::path::PathBuf;

/// Run the particle simulation headless for a fixed number of frames.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Particles spawned before the first frame
    #[arg(short, long, default_value_t = 10_000)]
    pub entities: usize,

    /// Frames to simulate before shutting down
    #[arg(short, long, default_value_t = 600)]
    pub frames: u64,

    /// JSON engine settings; defaults apply when omitted
    pub settings: Option<PathBuf>,
}
