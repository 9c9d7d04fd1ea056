use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "arcscope", version, about = "Drive and observe ARC-AGI agent runs")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of ~/.arcscope/config.toml.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Override `backend.base_url`.
    #[arg(long, global = true)]
    pub backend_url: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Puzzle or game identifier, e.g. `ls20`.
    #[arg(long)]
    pub target: String,

    /// Agent or model identity.
    #[arg(long)]
    pub agent: String,

    #[arg(long, group = "prompt", default_value = "")]
    pub instructions: String,

    #[arg(long, group = "prompt")]
    pub instructions_file: Option<String>,

    #[arg(long, default_value_t = 10)]
    pub max_turns: u32,

    /// Provider credential forwarded to the backend. Never logged.
    #[arg(long, env = "ARCSCOPE_CREDENTIAL", hide_env_values = true)]
    pub credential: Option<String>,

    /// Read operator commands from stdin whenever the run pauses.
    #[arg(long)]
    pub interactive: bool,

    /// Final report format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ReplayArgs {
    /// Captured `data: <json>` stream.
    #[arg(long)]
    pub events: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Feed the file in chunks of this many bytes.
    #[arg(long, default_value_t = 4096)]
    pub chunk_bytes: usize,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Run(RunArgs),
    Replay(ReplayArgs),
}
