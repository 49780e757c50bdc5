use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, builder::{Styles, styling::{AnsiColor, Effects}}, crate_description, crate_version};
use clap_complete::Shell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DecompileModeCli {
    Pseudo,
    Listing,
    Annotate,
}

#[derive(Parser)]
#[command(name = "emcdec",
    version = crate_version!(),
    about = crate_description!(),
    styles = Styles::styled()
        .header(AnsiColor::BrightGreen.on_default() | Effects::BOLD | Effects::UNDERLINE)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default()))]
pub struct Cli {
    /// Log parser and codegen decisions
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<TopLevel>,
}

#[derive(Subcommand)]
pub enum TopLevel {
    /// Decompiles EMC script disassembly into pseudocode
    Decompile {
        #[command(subcommand)]
        command: DecompileCommand,
    },
    /// Lists the builtin functions known to the decompiler
    Builtins {
        /// TOML file with extra builtin signatures
        #[arg(long)]
        builtins: Option<PathBuf>,
    },
    /// Generate shell completion
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct CommonArgs {
    /// Output mode
    #[arg(long, value_enum, default_value_t = DecompileModeCli::Pseudo)]
    pub mode: DecompileModeCli,

    /// TOML file with extra builtin signatures
    #[arg(long)]
    pub builtins: Option<PathBuf>,

    /// Script string table, one string per line (annotate mode)
    #[arg(long)]
    pub strings: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum DecompileCommand {
    /// Decompiles a single disassembly file
    File {
        /// Path to the disassembly listing
        path: PathBuf,

        /// Write the output here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Decompiles several disassembly files, skipping the ones that fail
    Batch {
        /// Paths to the disassembly listings
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Directory receiving one `<name>.pseudo` file per script (default: stdout)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,
    },
}
