use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser};
use emcdec_lib::{BuiltinRegistry, DecompileMode, DecompileOptions};
use log::info;

use crate::cli::{Cli, CommonArgs, DecompileCommand, DecompileModeCli, TopLevel};

mod cli;

fn load_registry(extra: Option<&Path>) -> Result<BuiltinRegistry, String> {
    let mut registry = BuiltinRegistry::builtin();
    if let Some(path) = extra {
        let text = std::fs::read_to_string(path).map_err(|e| format!("failed to read {path:?}: {e}"))?;
        let overlay = BuiltinRegistry::from_toml_str(&text).map_err(|e| format!("{}: {e}", path.display()))?;
        info!("loaded {} builtin signatures from {}", overlay.len(), path.display());
        registry.extend(overlay);
    }
    Ok(registry)
}

fn options(common: &CommonArgs) -> Result<DecompileOptions, String> {
    let mode = match common.mode {
        DecompileModeCli::Pseudo => DecompileMode::Pseudo,
        DecompileModeCli::Listing => DecompileMode::Listing,
        DecompileModeCli::Annotate => DecompileMode::Annotate,
    };
    let strings = match &common.strings {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| format!("failed to read {path:?}: {e}"))?;
            let strings: Vec<String> = text.lines().map(str::to_string).collect();
            info!("loaded {} strings from {}", strings.len(), path.display());
            Some(strings)
        }
        None => None,
    };
    Ok(DecompileOptions { mode, strings })
}

fn decompile_file(path: &Path, registry: &BuiltinRegistry, options: &DecompileOptions) -> Result<String, String> {
    let source = std::fs::read_to_string(path).map_err(|e| format!("failed to read {path:?}: {e}"))?;
    emcdec_lib::decompile_with_options(&source, registry, options).map_err(|e| format!("{}: {e}", path.display()))
}

fn out_path(out_dir: &Path, script: &Path) -> PathBuf {
    let stem = script.file_stem().map(|s| s.to_os_string()).unwrap_or_else(|| "script".into());
    let mut name = stem;
    name.push(".pseudo");
    out_dir.join(name)
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Some(TopLevel::Decompile { command }) => match command {
            DecompileCommand::File { path, output, common } => {
                let registry = load_registry(common.builtins.as_deref())?;
                let out = decompile_file(&path, &registry, &options(&common)?)?;
                match output {
                    Some(dst) => std::fs::write(&dst, out).map_err(|e| format!("failed to write {dst:?}: {e}"))?,
                    None => print!("{out}"),
                }
                Ok(())
            }
            DecompileCommand::Batch { paths, out_dir, common } => {
                let registry = load_registry(common.builtins.as_deref())?;
                let opts = options(&common)?;
                if let Some(dir) = &out_dir {
                    std::fs::create_dir_all(dir).map_err(|e| format!("failed to create {dir:?}: {e}"))?;
                }

                let mut failed = 0usize;
                for path in &paths {
                    let out = match decompile_file(path, &registry, &opts) {
                        Ok(out) => out,
                        Err(e) => {
                            eprintln!("decompile error: {e}");
                            failed += 1;
                            continue;
                        }
                    };
                    match &out_dir {
                        Some(dir) => {
                            let dst = out_path(dir, path);
                            if let Err(e) = std::fs::write(&dst, out) {
                                eprintln!("failed to write {dst:?}: {e}");
                                failed += 1;
                            }
                        }
                        None => {
                            println!("// {}", path.display());
                            print!("{out}");
                        }
                    }
                }

                if failed > 0 {
                    return Err(format!("{failed} of {} scripts failed", paths.len()));
                }
                Ok(())
            }
        },
        Some(TopLevel::Builtins { builtins }) => {
            let registry = load_registry(builtins.as_deref())?;
            for (name, sig) in registry.iter() {
                println!("{name}{sig}");
            }
            Ok(())
        }
        Some(TopLevel::Completion { shell }) => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
            Ok(())
        }
        None => Cli::command().print_help().map_err(|e| e.to_string()),
    }
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    if let Err(e) = run(cli) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
