use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};

use nuclide_facts::format::{write_facts_dir, OutputFormat};
use nuclide_facts::hints::{load_code_blocks_file, load_hints_file};
use nuclide_facts::loader::load_modules;
use nuclide_facts::parser::GoblinParser;
use nuclide_facts::strategy::Strategy;
use nuclide_facts::{Address, Architecture, BinaryParser, Module};

#[derive(Parser)]
#[command(author, version, about = "Decode binaries into relational instruction facts.")]
struct Args {
    /// Binaries to load
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    #[arg(long, value_enum, default_value_t = Strategy::Blind)]
    strategy: Strategy,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Write formatted facts here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Write one `<relation>.facts` file per relation into this directory
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Tab-separated user hints added to every module
    #[arg(long)]
    hints: Option<PathBuf>,

    /// Extra code blocks (`address<TAB>size` per line) for the code-block scan
    #[arg(long)]
    code_blocks: Option<PathBuf>,

    /// Treat inputs as headerless code for this architecture
    #[arg(long, value_parser = parse_architecture)]
    raw: Option<Architecture>,

    /// Load address of headerless inputs
    #[arg(long, default_value = "0", value_parser = parse_base)]
    base: Address,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_architecture(s: &str) -> Result<Architecture, String> {
    match s.to_lowercase().as_str() {
        "x86" | "x86-32" | "i386" => Ok(Architecture::X86_32),
        "x86-64" | "x86_64" | "amd64" => Ok(Architecture::X86_64),
        "arm" | "arm32" => Ok(Architecture::Arm),
        "aarch64" | "arm64" => Ok(Architecture::AArch64),
        _ => Err(format!("unsupported raw architecture '{}'", s)),
    }
}

fn parse_base(s: &str) -> Result<Address, String> {
    nuclide_facts::hints::parse_address(s).ok_or_else(|| format!("invalid address '{}'", s))
}

fn read_module(path: &Path, args: &Args) -> Result<Module> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut module = match args.raw {
        Some(arch) => Module::raw(name.clone(), arch, args.base, data),
        None => GoblinParser::new()
            .parse(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?,
    };
    module.name = name;
    if let Some(blocks) = &args.code_blocks {
        load_code_blocks_file(blocks, &mut module)
            .with_context(|| format!("Failed to load code blocks from {}", blocks.display()))?;
    }
    Ok(module)
}

/// Per-module fact directory; the input index keeps equal file names apart.
fn debug_subdir(dir: &Path, index: usize, name: &str, count: usize) -> PathBuf {
    if count > 1 {
        dir.join(format!("{}-{}", index, name))
    } else {
        dir.to_path_buf()
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let modules = args
        .inputs
        .iter()
        .map(|path| read_module(path, &args))
        .collect::<Result<Vec<_>>>()?;
    info!("Loading {} module(s) with {}", modules.len(), args.strategy);

    let results = load_modules(&modules, args.strategy);
    let formatter = args.format.get_formatter();
    let mut rendered = String::new();
    let mut failures = 0;
    for (index, (module, result)) in modules.iter().zip(results).enumerate() {
        let mut db = match result {
            Ok(db) => db,
            Err(e) => {
                warn!("{}: {}", module.name, e);
                failures += 1;
                continue;
            }
        };
        if let Some(hints) = &args.hints {
            load_hints_file(hints, &mut db)
                .with_context(|| format!("Failed to load hints from {}", hints.display()))?;
        }
        if let Some(dir) = &args.debug_dir {
            write_facts_dir(&db, &debug_subdir(dir, index, &module.name, modules.len()))?;
        }
        rendered.push_str(&formatter.format(&db)?);
    }

    match &args.output {
        Some(path) => fs::write(path, &rendered)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => io::stdout().lock().write_all(rendered.as_bytes())?,
    }

    if failures > 0 {
        bail!("{} of {} module(s) failed to load", failures, modules.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_subdir_keeps_equal_names_apart() {
        let dir = Path::new("facts");
        assert_eq!(debug_subdir(dir, 0, "ls", 1), PathBuf::from("facts"));
        assert_eq!(debug_subdir(dir, 0, "ls", 2), PathBuf::from("facts/0-ls"));
        assert_eq!(debug_subdir(dir, 1, "ls", 2), PathBuf::from("facts/1-ls"));
    }

    #[test]
    fn test_code_blocks_flag() {
        let args = Args::parse_from(["nuclide-facts", "a.out", "--strategy", "code-blocks", "--code-blocks", "blocks.tsv"]);
        assert_eq!(args.strategy, Strategy::CodeBlocks);
        assert_eq!(args.code_blocks, Some(PathBuf::from("blocks.tsv")));
    }

    #[test]
    fn test_raw_architectures() {
        assert_eq!(parse_architecture("arm"), Ok(Architecture::Arm));
        assert_eq!(parse_architecture("ARM64"), Ok(Architecture::AArch64));
        assert!(parse_architecture("mips").is_err());
    }
}
