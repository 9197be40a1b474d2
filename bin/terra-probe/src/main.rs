use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use colored::Colorize;
use log::info;

use terra_core::{Layout, Slot, STORE_COOKIE};
use terra_linux::setup::{self, CookieState};
use terra_store::SlotStore;

#[derive(Parser)]
struct Cli {
    #[arg(long, default_value = "terra-eeprom.bin")] state: PathBuf,
    /// Write one slot, e.g. --set skipped_updates=0
    #[arg(long)] set: Option<String>,
    /// Invalidate the cookie and zero every slot
    #[arg(long)] erase: bool,
}

fn parse_assignment(text: &str) -> anyhow::Result<(Slot, u32)> {
    let Some((name, value)) = text.split_once('=') else {
        bail!("expected <slot>=<value>, got '{}'", text);
    };
    let slot = Slot::ALL
        .into_iter()
        .find(|s| s.name() == name.trim())
        .with_context(|| format!("unknown slot '{}'", name))?;
    let value = value.trim().parse().with_context(|| format!("bad value '{}'", value))?;
    Ok((slot, value))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    info!("Probing {}", cli.state.display());

    let eeprom = setup::open_eeprom(&cli.state)?;
    let mut store = SlotStore::new(eeprom, Layout::EEPROM)?;
    store.begin()?;

    if cli.erase {
        store.erase().context("erase failed")?;
        println!("{}", "store erased".yellow());
        return Ok(());
    }

    if let Some(text) = &cli.set {
        let (slot, value) = parse_assignment(text)?;
        store.set_slot(slot, value).with_context(|| format!("cannot write {}", slot.name()))?;
        println!("{} <- {}", slot.name(), value);
    }

    // Whatever --set left behind, not what was there at open.
    let cookie = store.stored_cookie()?;
    let status = match CookieState::classify(cookie, Layout::EEPROM) {
        CookieState::Valid => format!("cookie {} (valid)", cookie).green(),
        CookieState::Erased => "cookie absent (erased)".yellow(),
        CookieState::Foreign(c) => format!("cookie {} (expected {})", c, STORE_COOKIE).red(),
    };
    println!("{}  {}", cli.state.display().to_string().bold(), status);

    for slot in Slot::ALL {
        let offset = Layout::EEPROM.slot_offset(slot.index())?;
        match store.get_slot(slot) {
            Ok(v) => println!("  [{:>2}] {:<22} {:>10}  0x{:08x}", offset, slot.name(), v, v),
            Err(e) => println!("  [{:>2}] {:<22} {}", offset, slot.name(), e.to_string().dimmed()),
        }
    }
    Ok(())
}
