//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// Stager - build, stage and package a Clang/LLVM toolchain
#[derive(Parser)]
#[command(name = "stager")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Source checkout root (defaults to the current directory)
    #[arg(long, global = true, env = "STAGER_ROOT")]
    pub root: Option<PathBuf>,

    /// Configuration file (defaults to <root>/stager.toml)
    #[arg(long, global = true, env = "STAGER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the build pipeline
    Build(BuildArgs),

    /// Show the resolved flags and CMake defines of a builder
    Flags(FlagsArgs),

    /// List the configurations a builder builds
    Configs(ConfigsArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Build only these builders
    #[arg(long, num_args = 1.., value_delimiter = ',', conflicts_with = "skip")]
    pub build: Vec<String>,

    /// Build everything except these builders
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Build nothing; only package the existing install tree
    #[arg(long)]
    pub skip_build: bool,

    /// Don't package the toolchain
    #[arg(long)]
    pub skip_package: bool,

    /// Don't build the runtime libraries
    #[arg(long)]
    pub skip_runtimes: bool,

    /// Don't strip packaged binaries
    #[arg(long)]
    pub no_strip: bool,

    /// Disable ThinLTO in stage2
    #[arg(long)]
    pub no_lto: bool,

    /// Build a debug stage2 (no LTO, not stripped)
    #[arg(long)]
    pub debug: bool,

    /// Build stage2 with assertions
    #[arg(long)]
    pub enable_assertions: bool,

    /// Build an instrumented stage2 for PGO profile collection
    #[arg(long)]
    pub build_instrumented: bool,

    /// Fail if the PGO profile for this revision is missing
    #[arg(long)]
    pub check_pgo_profile: bool,

    /// Build LLDB and its host dependencies
    #[arg(long)]
    pub build_lldb: bool,

    /// Host components not to build
    #[arg(long, value_delimiter = ',', value_parser = ["linux"])]
    pub no_build: Vec<String>,

    /// Name of the packaged toolchain
    #[arg(long, default_value = "benzo")]
    pub build_name: String,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Args)]
pub struct FlagsArgs {
    /// Builder to show flags for
    pub builder: String,

    /// Show compiler and linker flags only
    #[arg(long)]
    pub no_defines: bool,
}

#[derive(Args)]
pub struct ConfigsArgs {
    /// Builder to list (all builders if omitted)
    pub builder: Option<String>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
