use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "imagepress")]
#[command(about = "Image compression worker", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $IMAGEPRESS_CONFIG or config/imagepress.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Consume image tasks until interrupted
    Worker,
    /// Publish an image task to the task channel
    Enqueue(EnqueueArgs),
    /// Print dead-letter records as JSON lines
    DeadLetters(DeadLettersArgs),
    /// Print the committed image list of a task
    Record(RecordArgs),
}

#[derive(clap::Args, Debug)]
pub struct EnqueueArgs {
    #[arg(long)]
    pub task_id: String,

    /// Source image URLs
    #[arg(required = true)]
    pub urls: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct DeadLettersArgs {
    /// First offset to print
    #[arg(long, default_value_t = 0)]
    pub from: u64,

    #[arg(long, default_value_t = 100)]
    pub limit: usize,
}

#[derive(clap::Args, Debug)]
pub struct RecordArgs {
    pub task_id: String,
}
