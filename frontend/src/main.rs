use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use marquee_core::core::storage::NvramStorage;
use marquee_core::device::nvram::NvramStore;
use marquee_core::device::slapstic::SlapsticProtection;
use marquee_machines::{BoardEntry, BoardProfile, registry};

mod config;
mod storage;

use config::Config;
use storage::FileStorage;

#[derive(Parser)]
#[command(name = "marquee", version, about = "Shared Atari raster-board engine")]
struct Cli {
    /// Configuration file (default: marquee/marquee.toml in the config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the registered boards
    List,

    /// Print a board's profile as TOML, with config overrides applied
    Describe { board: String },

    /// Write a board's factory NVRAM image
    NvramInit {
        board: String,

        /// Directory to write `<board>.nvram` into (default: configured nvram_dir)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Feed word offsets to a slapstic and print the bank after each access
    Slapstic {
        /// Chip number, e.g. 104 for 137412-104
        chip: u16,

        /// Word offsets within the window (decimal or 0x-prefixed hex)
        #[arg(required = true, value_parser = parse_offset)]
        offsets: Vec<u16>,
    },
}

fn parse_offset(text: &str) -> Result<u16, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid offset `{text}`: {e}"))
}

fn find_board(name: &str) -> Result<&'static BoardEntry> {
    match registry::find(name) {
        Some(entry) => Ok(entry),
        None => {
            let names: Vec<_> = registry::all().iter().map(|e| e.name).collect();
            bail!("unknown board `{name}` (available: {})", names.join(", "))
        }
    }
}

fn load_profile(config: &Config, name: &str) -> Result<BoardProfile> {
    let mut profile = (find_board(name)?.profile)();
    config.apply(&mut profile);
    Ok(profile)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match cli.config.clone().or_else(Config::default_path) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::List => {
            for entry in registry::all() {
                println!("{:<12} {}", entry.name, entry.description);
            }
        }
        Command::Describe { board } => {
            let profile = load_profile(&config, &board)?;
            let text = toml::to_string_pretty(&profile)
                .with_context(|| format!("serializing profile `{board}`"))?;
            print!("{text}");
        }
        Command::NvramInit { board, out } => {
            let profile = load_profile(&config, &board)?;
            let nv = &profile.nvram;
            let store = NvramStore::new(nv.size, nv.default.clone(), nv.gate)?;
            let mut storage = FileStorage::new(out.unwrap_or_else(|| config.nvram_dir()));
            storage.save(&profile.name, &store.default_image())?;
            println!(
                "wrote {} bytes to {}",
                store.len(),
                storage.path_for(&profile.name)?.display()
            );
        }
        Command::Slapstic { chip, offsets } => {
            let mut slapstic = SlapsticProtection::new(chip, 0)?;
            println!("137412-{chip}: start bank {}", slapstic.bank());
            for offset in offsets {
                let bank = slapstic.tweak(offset);
                println!("{offset:#06x} -> bank {bank} ({:?})", slapstic.mode());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_parse_decimal_and_hex() {
        assert_eq!(parse_offset("32"), Ok(32));
        assert_eq!(parse_offset("0x20"), Ok(0x20));
        assert_eq!(parse_offset("0X3fff"), Ok(0x3FFF));
        assert!(parse_offset("0xZZ").is_err());
        assert!(parse_offset("70000").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn unknown_board_lists_alternatives() {
        let err = find_board("joust").err().unwrap().to_string();
        assert!(err.contains("gauntlet"));
        assert!(err.contains("xybots"));
    }

    #[test]
    fn every_profile_serializes_to_toml() {
        for entry in registry::all() {
            let profile = (entry.profile)();
            let text = toml::to_string_pretty(&profile).unwrap();
            let back: BoardProfile = toml::from_str(&text).unwrap();
            assert_eq!(back, profile, "{}", entry.name);
        }
    }
}
